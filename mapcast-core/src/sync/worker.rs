//! Dedicated single-thread workers draining a [`DropOldestQueue`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::MapcastError;

use super::queue::DropOldestQueue;

/// One OS thread consuming one queue until it is closed.
pub struct Worker {
    name: String,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a thread that calls `handle` for every popped unit.
    pub fn spawn<U, F>(
        name: &str,
        queue: Arc<DropOldestQueue<U>>,
        mut handle: F,
    ) -> Result<Self, MapcastError>
    where
        U: Send + 'static,
        F: FnMut(U) + Send + 'static,
    {
        let thread = thread::Builder::new()
            .name(format!("mapcast-{name}"))
            .spawn(move || {
                while let Some(unit) = queue.pop() {
                    handle(unit);
                }
            })?;
        Ok(Self {
            name: name.to_string(),
            handle: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait up to `grace` for the thread to exit, then detach it.
    ///
    /// Returns `true` if the thread exited in time.
    pub fn join_within(mut self, grace: Duration) -> bool {
        match self.handle.take() {
            Some(handle) => join_within(&self.name, handle, grace),
            None => true,
        }
    }
}

/// Join `handle` if it finishes within `grace`; otherwise leave it running.
pub(crate) fn join_within(name: &str, handle: JoinHandle<()>, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!(thread = name, "thread did not stop in time; abandoning it");
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
    if handle.join().is_err() {
        tracing::error!(thread = name, "thread panicked");
    }
    true
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn processes_until_closed() {
        let queue = Arc::new(DropOldestQueue::new(8));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let worker = Worker::spawn("test", Arc::clone(&queue), move |v: u32| {
            sink.lock().unwrap().push(v);
        })
        .unwrap();
        for v in 0..5 {
            queue.push(v);
        }
        queue.close();
        assert!(worker.join_within(Duration::from_secs(2)));
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn stuck_worker_is_abandoned() {
        let queue = Arc::new(DropOldestQueue::new(1));
        let worker = Worker::spawn("slow", Arc::clone(&queue), |_: ()| {
            thread::sleep(Duration::from_millis(300));
        })
        .unwrap();
        queue.push(());
        thread::sleep(Duration::from_millis(20));
        queue.abort();
        let start = Instant::now();
        assert!(!worker.join_within(Duration::from_millis(20)));
        assert!(start.elapsed() < Duration::from_millis(200));
    }
}
