//! A single-consumer serializing execution context, in the spirit of a
//! `boost::asio::strand`: user callbacks are posted here instead of being
//! invoked directly from the client's receive loop, so they never run
//! concurrently with each other and never run on the same poll turn as the
//! code that posted them.

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Posts closures for sequential, out-of-line execution.
///
/// Dropping the `Strand` stops the background task once the queue drains;
/// jobs already posted still run.
pub struct Strand {
    tx: mpsc::UnboundedSender<Job>,
}

impl Strand {
    /// Spawns the background task that drains posted jobs in order.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
        });
        Strand { tx }
    }

    /// Enqueue `f` for execution after every job posted before it. Returns
    /// immediately; never blocks and never runs `f` inline.
    pub fn post(&self, f: impl FnOnce() + Send + 'static) {
        // The receiver side only stops pulling once every sender (including
        // the one that spawned the task) is gone, so this can't fail while
        // `self` is alive.
        let _ = self.tx.send(Box::new(f));
    }
}

impl Default for Strand {
    fn default() -> Self {
        Strand::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn posted_jobs_run_in_order() {
        let strand = Strand::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let seen = Arc::clone(&seen);
            strand.post(move || seen.lock().unwrap().push(i));
        }

        // Give the background task a chance to drain the queue.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }
}
