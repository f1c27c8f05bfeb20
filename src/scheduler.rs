//! Bounded parallel execution of independent work items.
//!
//! [`Scheduler::map`] runs one closure per item on a private rayon pool and
//! returns the results in the same order as the input. There is no
//! cancellation: every item runs, and per-item failures are values in the
//! result vector, so one failing item never hides the others.

use rayon::prelude::*;

/// Worker pool for one invocation.
#[derive(Debug)]
pub struct Scheduler {
    pool: Option<rayon::ThreadPool>,
    jobs: usize,
}

impl Scheduler {
    /// Create a scheduler with `jobs` workers (default: one per CPU).
    ///
    /// If the pool cannot be created, work runs sequentially on the calling
    /// thread.
    pub fn new(jobs: Option<usize>) -> Self {
        let jobs = jobs
            .filter(|&j| j > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            });

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|i| format!("toolforge-worker-{}", i))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                tracing::warn!("failed to create thread pool ({e}), running sequentially");
                None
            }
        };

        Scheduler { pool, jobs }
    }

    /// A scheduler that runs everything on the calling thread.
    pub fn sequential() -> Self {
        Scheduler {
            pool: None,
            jobs: 1,
        }
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Apply `f` to every item concurrently; `result[i]` belongs to `items[i]`.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        match &self.pool {
            Some(pool) if items.len() > 1 => {
                pool.install(|| items.par_iter().map(|item| f(item)).collect())
            }
            _ => items.iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_results_follow_input_order() {
        let scheduler = Scheduler::new(Some(4));
        let items: Vec<u64> = (0..32).collect();

        // Later items finish first.
        let out = scheduler.map(&items, |&i| {
            std::thread::sleep(Duration::from_millis(32 - i));
            i * 10
        });

        assert_eq!(out, items.iter().map(|i| i * 10).collect::<Vec<_>>());
    }

    #[test]
    fn test_failures_do_not_short_circuit() {
        let scheduler = Scheduler::new(Some(3));
        let items = ["a", "b", "c"];
        let ran = AtomicUsize::new(0);

        let out: Vec<Result<&str, String>> = scheduler.map(&items, |&name| {
            ran.fetch_add(1, Ordering::SeqCst);
            if name == "b" {
                Err(format!("{} failed", name))
            } else {
                Ok(name)
            }
        });

        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert_eq!(out.len(), 3);
        assert!(out[0].is_ok() && out[1].is_err() && out[2].is_ok());
    }

    #[test]
    fn test_empty_batch() {
        let scheduler = Scheduler::new(None);
        let out: Vec<u8> = scheduler.map(&Vec::<u8>::new(), |&b| b);
        assert!(out.is_empty());
        assert!(scheduler.jobs() >= 1);
    }

    #[test]
    fn test_sequential() {
        let scheduler = Scheduler::sequential();
        assert_eq!(scheduler.map(&[1, 2, 3], |x| x + 1), vec![2, 3, 4]);
    }
}
