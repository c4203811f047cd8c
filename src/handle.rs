//! A future-like handle for asynchronous replies over [`crate::thread`]
//! channels, used for Store calls, node-cache misses, `sync_to`, and
//! indexer events (`spec.md` §5). Grounded on the teacher's `Writer::request`
//! request/response shape, pulled out into its own reusable wrapper since
//! several callers (not just `Thread`) need to hand a caller something to
//! wait on.

use std::sync::mpsc;
use std::time::Duration;

use crate::error::{Error, Result};

/// A pending call's result, delivered once over an `mpsc` channel.
pub struct CallHandle<T> {
    rx: mpsc::Receiver<Result<T>>,
}

impl<T> CallHandle<T> {
    pub fn new(rx: mpsc::Receiver<Result<T>>) -> CallHandle<T> {
        CallHandle { rx }
    }

    /// Spawns the pending side of the pair: returns a handle and the sender
    /// the worker thread should fulfill exactly once.
    pub fn pair() -> (mpsc::Sender<Result<T>>, CallHandle<T>) {
        let (tx, rx) = mpsc::channel();
        (tx, CallHandle::new(rx))
    }

    pub fn wait(self) -> Result<T> {
        self.rx
            .recv()
            .map_err(|err| Error::ConnectionError(err.to_string()))?
    }

    pub fn wait_timeout(self, dur: Duration) -> Result<T> {
        self.rx.recv_timeout(dur)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wait_returns_the_fulfilled_value() {
        let (tx, handle) = CallHandle::pair();
        thread::spawn(move || {
            tx.send(Ok::<_, Error>(42)).unwrap();
        })
        .join()
        .unwrap();
        assert_eq!(handle.wait().unwrap(), 42);
    }

    #[test]
    fn wait_timeout_errors_when_nothing_replies() {
        let (_tx, handle) = CallHandle::<i32>::pair();
        let err = handle.wait_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
