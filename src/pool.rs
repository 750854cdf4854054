use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, warn};
use threadpool::ThreadPool;

use crate::error::WaxPulseError;

/// Hard cap on pool size; the remote rate limit is the bottleneck, so more
/// local concurrency than this buys nothing.
pub const MAX_POOL_SIZE: usize = 16;

pub type TaskId = u64;

/// A completed task paired with the id it was submitted under. Completion
/// order never affects this pairing.
#[derive(Debug)]
pub struct TaskResult<R> {
    pub task_id: TaskId,
    pub outcome: Result<R, WaxPulseError>,
}

struct Envelope<T, R> {
    task_id: TaskId,
    payload: T,
    reply: Sender<Result<R, WaxPulseError>>,
}

/// Resolves when some idle worker finishes the task.
pub struct TaskHandle<R> {
    task_id: TaskId,
    reply: Receiver<Result<R, WaxPulseError>>,
}

impl<R> TaskHandle<R> {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Blocks until the task completes. A task dropped without being
    /// dispatched (pool terminated first) resolves as cancelled.
    pub fn wait(self) -> TaskResult<R> {
        let outcome = match self.reply.recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(WaxPulseError::TaskCancelled),
        };
        TaskResult {
            task_id: self.task_id,
            outcome,
        }
    }
}

/// Fixed-size pool of worker threads draining a shared FIFO queue. Each
/// worker runs one task at a time and sends the result back on the task's
/// own reply channel; a handler error or panic fails that task only and
/// the worker moves on to the next one.
pub struct WorkerPool<T, R> {
    sender: Mutex<Option<Sender<Envelope<T, R>>>>,
    workers: ThreadPool,
    next_id: AtomicU64,
    shutdown: Arc<AtomicBool>,
}

impl<T, R> WorkerPool<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub fn new<F>(handler: F, size: usize) -> Self
    where
        F: Fn(&T) -> Result<R, WaxPulseError> + Send + Sync + 'static,
    {
        let size = size.clamp(1, MAX_POOL_SIZE);
        let workers = ThreadPool::new(size);
        let handler = Arc::new(handler);

        let (sender, receiver) = unbounded::<Envelope<T, R>>();
        let shutdown = Arc::new(AtomicBool::new(false));

        for worker_index in 0..size {
            // Each worker loops until the queue sender is dropped
            let receiver = receiver.clone();
            let handler = Arc::clone(&handler);
            let shutdown = Arc::clone(&shutdown);

            workers.execute(move || {
                while let Ok(envelope) = receiver.recv() {
                    // Queued work found after terminate is drained without
                    // running; dropping the envelope cancels its handle
                    if shutdown.load(Ordering::Acquire) {
                        continue;
                    }

                    let result =
                        catch_unwind(AssertUnwindSafe(|| handler(&envelope.payload)));

                    let outcome = match result {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            warn!(
                                "Worker {} caught a panic in task {}",
                                worker_index, envelope.task_id
                            );
                            Err(WaxPulseError::Error(format!(
                                "Task {} panicked in its handler",
                                envelope.task_id
                            )))
                        }
                    };

                    // The submitter may have given up on the handle; that
                    // is not the worker's problem
                    let _ = envelope.reply.send(outcome);
                }
                debug!("Worker {} exiting", worker_index);
            });
        }

        Self {
            sender: Mutex::new(Some(sender)),
            workers,
            next_id: AtomicU64::new(1),
            shutdown,
        }
    }

    /// Enqueues one task. Returns a handle that resolves on completion;
    /// after `terminate`, the handle resolves as cancelled.
    pub fn submit(&self, payload: T) -> TaskHandle<R> {
        let task_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = bounded(1);

        let envelope = Envelope {
            task_id,
            payload,
            reply: reply_tx,
        };

        // Holding the lock only for the send; an envelope dropped here
        // (pool already terminated) disconnects the reply channel, which
        // the handle reports as cancellation
        if let Ok(guard) = self.sender.lock() {
            if let Some(sender) = guard.as_ref() {
                let _ = sender.send(envelope);
            }
        }

        TaskHandle {
            task_id,
            reply: reply_rx,
        }
    }

    /// Submits every task, then blocks until all have completed. Results
    /// come back in submission order, each carrying its own task id.
    pub fn submit_batch(&self, payloads: Vec<T>) -> Vec<TaskResult<R>> {
        let handles: Vec<TaskHandle<R>> =
            payloads.into_iter().map(|p| self.submit(p)).collect();
        handles.into_iter().map(TaskHandle::wait).collect()
    }

    /// Stops accepting work and waits for in-flight tasks to finish.
    /// Queued-but-undispatched tasks are dropped; their handles resolve as
    /// cancelled. Safe to call repeatedly.
    pub fn terminate(&self) {
        self.shutdown.store(true, Ordering::Release);
        let taken = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if taken.is_some() {
            drop(taken);
            self.workers.join();
        }
    }
}

impl<T, R> Drop for WorkerPool<T, R> {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.sender.lock() {
            guard.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn all_tasks_complete_exactly_once() {
        let pool = WorkerPool::new(|n: &i64| Ok(n * 2), 4);

        let results = pool.submit_batch((0..40).collect());
        assert_eq!(results.len(), 40);

        let ids: HashSet<TaskId> = results.iter().map(|r| r.task_id).collect();
        assert_eq!(ids.len(), 40, "each task id appears exactly once");

        for (i, result) in results.iter().enumerate() {
            assert_eq!(*result.outcome.as_ref().unwrap(), (i as i64) * 2);
        }
    }

    #[test]
    fn at_most_n_tasks_in_flight() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));

        let in_flight_h = Arc::clone(&in_flight);
        let high_water_h = Arc::clone(&high_water);

        let pool = WorkerPool::new(
            move |_: &u32| {
                let now = in_flight_h.fetch_add(1, Ordering::SeqCst) + 1;
                high_water_h.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                in_flight_h.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            },
            3,
        );

        let results = pool.submit_batch((0..24).collect());
        assert_eq!(results.len(), 24);
        assert!(results.iter().all(|r| r.outcome.is_ok()));

        let observed_max = high_water.load(Ordering::SeqCst);
        assert!(
            observed_max <= 3,
            "observed {} concurrent tasks in a pool of 3",
            observed_max
        );
    }

    #[test]
    fn results_pair_with_task_ids_regardless_of_completion_order() {
        // The first payload takes far longer than the rest, so later
        // submissions complete first
        let pool = WorkerPool::new(
            |n: &u64| {
                if *n == 0 {
                    thread::sleep(Duration::from_millis(60));
                }
                Ok(*n + 100)
            },
            4,
        );

        let handles: Vec<_> = (0..8u64).map(|n| pool.submit(n)).collect();
        for (expected, handle) in (0..8u64).zip(handles) {
            let result = handle.wait();
            assert_eq!(result.outcome.unwrap(), expected + 100);
        }
    }

    #[test]
    fn a_failing_task_does_not_crash_the_pool() {
        let pool = WorkerPool::new(
            |n: &i64| {
                if n % 2 == 1 {
                    Err(WaxPulseError::Error(format!("task {} failed", n)))
                } else {
                    Ok(*n)
                }
            },
            2,
        );

        let results = pool.submit_batch((0..10).collect());
        let failures = results.iter().filter(|r| r.outcome.is_err()).count();
        let successes = results.iter().filter(|r| r.outcome.is_ok()).count();
        assert_eq!(failures, 5);
        assert_eq!(successes, 5);
    }

    #[test]
    fn a_panicking_task_is_reported_and_the_worker_survives() {
        let pool = WorkerPool::new(
            |n: &i64| {
                if *n == 3 {
                    panic!("boom");
                }
                Ok(*n)
            },
            1,
        );

        // Single worker: if the panic killed it, the later tasks would
        // never resolve
        let results = pool.submit_batch(vec![1, 2, 3, 4, 5]);
        assert!(results[2].outcome.is_err());
        assert_eq!(*results[4].outcome.as_ref().unwrap(), 5);
    }

    #[test]
    fn terminate_is_idempotent_and_cancels_pending_submissions() {
        let pool: WorkerPool<u32, ()> = WorkerPool::new(|_| Ok(()), 2);

        pool.terminate();
        pool.terminate();

        let handle = pool.submit(1);
        let result = handle.wait();
        assert!(matches!(result.outcome, Err(WaxPulseError::TaskCancelled)));
    }
}
