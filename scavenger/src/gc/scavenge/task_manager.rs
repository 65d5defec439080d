use std::collections::VecDeque;

use crossbeam_deque::Worker;
use parking_lot::Mutex;
use scoped_threadpool::Pool;

use crate::gc::root::Slot;
use crate::gc::scavenge::promotion::{PromotionManager, PromotionStats};
use crate::gc::scavenge::tasks::{GcContext, GcTask, TaskReport};

/// FIFO of tasks shared by all workers of one scavenge.
#[derive(Default)]
pub struct GcTaskQueue {
    tasks: Mutex<VecDeque<GcTask>>,
}

impl GcTaskQueue {
    pub fn new() -> GcTaskQueue {
        GcTaskQueue::default()
    }

    pub fn enqueue(&self, task: GcTask) {
        self.tasks.lock().push_back(task);
    }

    pub fn dequeue(&self) -> Option<GcTask> {
        self.tasks.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    pub fn tasks(&self) -> Vec<GcTask> {
        self.tasks.lock().iter().copied().collect()
    }
}

pub struct WorkerResult {
    pub reports: Vec<TaskReport>,
    pub stats: PromotionStats,
    pub tasks: usize,
}

/// Runs a task queue on a fixed pool of GC threads. Every thread owns one
/// promotion manager and pulls tasks until the queue is empty.
pub struct GcTaskManager {
    pool: Pool,
}

impl GcTaskManager {
    pub fn new(workers: usize) -> GcTaskManager {
        assert!(workers > 0);

        GcTaskManager {
            pool: Pool::new(workers as u32),
        }
    }

    pub fn workers(&self) -> usize {
        self.pool.thread_count() as usize
    }

    /// Results are returned in worker order.
    pub fn execute(
        &mut self,
        queue: &GcTaskQueue,
        ctx: &GcContext,
        tenuring_threshold: u32,
    ) -> Vec<WorkerResult> {
        let number_workers = self.workers();
        let mut workers = Vec::with_capacity(number_workers);
        let mut stealers = Vec::with_capacity(number_workers);

        for _ in 0..number_workers {
            let w: Worker<Slot> = Worker::new_lifo();
            let s = w.stealer();
            workers.push(w);
            stealers.push(s);
        }

        let results: Mutex<Vec<Option<WorkerResult>>> =
            Mutex::new((0..number_workers).map(|_| None).collect());

        {
            let stealers = &stealers;
            let results = &results;

            self.pool.scoped(|scoped| {
                for (which, worker) in workers.into_iter().enumerate() {
                    scoped.execute(move || {
                        let mut pm = PromotionManager::new(
                            which,
                            ctx.heap,
                            worker,
                            stealers,
                            tenuring_threshold,
                        );
                        let mut reports = Vec::new();
                        let mut tasks = 0;

                        while let Some(task) = queue.dequeue() {
                            task.do_it(ctx, &mut pm, &mut reports);
                            tasks += 1;
                        }

                        pm.flush();

                        results.lock()[which] = Some(WorkerResult {
                            reports,
                            stats: pm.stats(),
                            tasks,
                        });
                    });
                }
            });
        }

        results
            .into_inner()
            .into_iter()
            .enumerate()
            .map(|(which, result)| match result {
                Some(result) => result,
                None => panic!("GC worker {} did not report", which),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::census::RootCategory;

    #[test]
    fn test_queue_is_fifo() {
        let queue = GcTaskQueue::new();
        queue.enqueue(GcTask::ScavengeRoots(RootCategory::GlobalRoots));
        queue.enqueue(GcTask::Steal);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dequeue(), Some(GcTask::ScavengeRoots(RootCategory::GlobalRoots)));
        assert_eq!(queue.dequeue(), Some(GcTask::Steal));
        assert!(queue.dequeue().is_none());
        assert!(queue.is_empty());
    }
}
