use crate::gc::Address;
use crate::gc::heap::Heap;
use crate::gc::root::Slot;
use crate::gc::scavenge::promotion::PromotionManager;

/// Referent lives in eden or from-space. Slots already pointing into
/// to-space were updated before and are left alone.
#[inline(always)]
pub fn should_scavenge(heap: &Heap, obj: Address) -> bool {
    heap.is_in_young(obj) && !heap.is_in_to_space(obj)
}

/// Copies the referent of `slot` unless another visitor did already, stores
/// the new address into the slot and dirties the card of an old slot that
/// still refers to a young object.
#[inline(always)]
pub fn copy_and_push_safe_barrier<const PROMOTE_IMMEDIATELY: bool>(
    pm: &mut PromotionManager<'_>,
    slot: Slot,
) -> Address {
    let heap = pm.heap();
    let obj = slot.load(heap.oops());
    debug_assert!(should_scavenge(heap, obj), "{} not in collected spaces", obj);

    let new_obj = match obj.to_obj().header().forwardee() {
        Some(forwardee) => forwardee,
        None => pm.copy_to_survivor_space::<PROMOTE_IMMEDIATELY>(obj),
    };

    slot.store(heap.oops(), new_obj);

    // roots and class metadata live outside the reserved heap and have no card
    let slot_address = slot.address();
    if !heap.is_in_young(slot_address)
        && heap.is_in_reserved(slot_address)
        && heap.is_in_young(new_obj)
    {
        heap.card_table().dirty(slot_address);
    }

    new_obj
}
