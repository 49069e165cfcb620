//! Cancellable background worker
//!
//! Every pipeline thread in this crate is the same shape: a named thread
//! looping on a cooperative stop flag, joined before its owner releases any
//! state the loop borrowed. This wraps that shape once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Handed to the worker body; the loop polls it at the top of each iteration
#[derive(Clone)]
pub struct StopToken {
    running: Arc<AtomicBool>,
}

impl StopToken {
    pub fn should_run(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// A named background thread with cooperative shutdown
pub struct Worker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body` on a named thread. The body is expected to return once
    /// its token reports stop.
    pub fn spawn<F>(name: &str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(StopToken) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let token = StopToken {
            running: running.clone(),
        };

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(token))?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Set the stop flag and join. The loop notices the flag within one
    /// sleep interval, which bounds shutdown latency.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}
