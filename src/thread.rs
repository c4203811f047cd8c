//! Generic multi-threading pattern used by [`crate::indexer`] and
//! [`crate::session`]: the gen-server model from Erlang, where every thread
//! owns its state and all inter-thread communication goes through channels.
//! Adapted directly from the teacher's own `thread.rs` — this crate has no
//! async runtime, so suspension points (node-cache misses, indexer ticks,
//! listener dispatch) are all modeled this way instead of with `async fn`.

use std::sync::{mpsc, Arc};
use std::thread;

use log::error;

use crate::error::{Error, Result};

enum Tx<Q, R> {
    N(mpsc::Sender<(Q, Option<mpsc::Sender<R>>)>),
    S(mpsc::SyncSender<(Q, Option<mpsc::Sender<R>>)>),
}

impl<Q, R> Clone for Tx<Q, R> {
    fn clone(&self) -> Self {
        match self {
            Tx::N(tx) => Tx::N(tx.clone()),
            Tx::S(tx) => Tx::S(tx.clone()),
        }
    }
}

pub type Rx<Q, R> = mpsc::Receiver<(Q, Option<mpsc::Sender<R>>)>;

/// A running gen-server thread. Dropping it closes its input channel and
/// joins the thread, same as the teacher's `Thread::close_wait` semantics.
pub struct Thread<Q, R, T> {
    inner: Option<Inner<Q, R, T>>,
    refn: Arc<bool>,
}

struct Inner<Q, R, T> {
    tx: Tx<Q, R>,
    handle: thread::JoinHandle<Result<T>>,
}

impl<Q, R, T> Inner<Q, R, T> {
    fn close_wait(self) -> Result<T> {
        std::mem::drop(self.tx);
        self.handle
            .join()
            .map_err(|_| Error::UnexpectedError("thread panicked".into()))?
    }
}

impl<Q, R, T> Drop for Thread<Q, R, T> {
    fn drop(&mut self) {
        loop {
            match Arc::get_mut(&mut self.refn) {
                Some(_) => {
                    if let Some(inner) = self.inner.take() {
                        let _ = inner.close_wait();
                    }
                    break;
                }
                None => {
                    error!(target: "thread", "dropped Thread with outstanding Writer handles");
                    break;
                }
            }
        }
    }
}

impl<Q, R, T> Thread<Q, R, T> {
    /// Spawns `main_loop` with an unbounded input channel.
    pub fn new<F, N>(main_loop: F) -> Thread<Q, R, T>
    where
        F: 'static + FnOnce(Rx<Q, R>) -> N + Send,
        N: 'static + Send + FnOnce() -> Result<T>,
        T: 'static + Send,
    {
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(main_loop(rx));
        Thread {
            inner: Some(Inner { tx: Tx::N(tx), handle }),
            refn: Arc::new(true),
        }
    }

    /// Spawns `main_loop` with a bounded input channel of `channel_size`,
    /// used where a slow consumer should apply backpressure to posters
    /// (the indexer's `reindex-max` trigger).
    pub fn new_sync<F, N>(main_loop: F, channel_size: usize) -> Thread<Q, R, T>
    where
        F: 'static + FnOnce(Rx<Q, R>) -> N + Send,
        N: 'static + Send + FnOnce() -> Result<T>,
        T: 'static + Send,
    {
        let (tx, rx) = mpsc::sync_channel(channel_size);
        let handle = thread::spawn(main_loop(rx));
        Thread {
            inner: Some(Inner { tx: Tx::S(tx), handle }),
            refn: Arc::new(true),
        }
    }

    pub fn to_writer(&self) -> Writer<Q, R> {
        let refn = Arc::clone(&self.refn);
        Writer {
            tx: self.inner.as_ref().unwrap().tx.clone(),
            _refn: refn,
        }
    }

    pub fn post(&self, msg: Q) -> Result<()> {
        let inner = self
            .inner
            .as_ref()
            .ok_or_else(|| Error::UnexpectedError("Thread.post() on a closed thread".into()))?;
        send(&inner.tx, msg, None)
    }

    pub fn request(&self, request: Q) -> Result<R> {
        let inner = self
            .inner
            .as_ref()
            .ok_or_else(|| Error::UnexpectedError("Thread.request() on a closed thread".into()))?;
        let (tx, rx) = mpsc::channel();
        send(&inner.tx, request, Some(tx))?;
        rx.recv()
            .map_err(|err| Error::ConnectionError(err.to_string()))
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.refn)
    }

    /// Exits the thread and returns its final state, same as what `Drop`
    /// does but surfacing the join error instead of swallowing it.
    pub fn close_wait(mut self) -> Result<T> {
        match self.inner.take() {
            Some(inner) => inner.close_wait(),
            None => Err(Error::UnexpectedError("Thread already closed".into())),
        }
    }
}

fn send<Q, R>(tx: &Tx<Q, R>, msg: Q, reply: Option<mpsc::Sender<R>>) -> Result<()> {
    let res = match tx {
        Tx::N(thread_tx) => thread_tx.send((msg, reply)),
        Tx::S(thread_tx) => thread_tx.send((msg, reply)),
    };
    res.map_err(|_| Error::ConnectionError("thread is no longer receiving".into()))
}

/// A cloneable write handle to a running [`Thread`]. The thread only exits
/// once every `Writer` derived from it has been dropped.
pub struct Writer<Q, R> {
    tx: Tx<Q, R>,
    _refn: Arc<bool>,
}

impl<Q, R> Writer<Q, R> {
    pub fn post(&self, msg: Q) -> Result<()> {
        send(&self.tx, msg, None)
    }

    pub fn request(&self, request: Q) -> Result<R> {
        let (tx, rx) = mpsc::channel();
        send(&self.tx, request, Some(tx))?;
        rx.recv()
            .map_err(|err| Error::ConnectionError(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_response_roundtrips() {
        let t: Thread<i32, i32, ()> = Thread::new(|rx: Rx<i32, i32>| {
            move || -> Result<()> {
                while let Ok((q, reply)) = rx.recv() {
                    if let Some(tx) = reply {
                        let _ = tx.send(q * 2);
                    }
                }
                Ok(())
            }
        });
        assert_eq!(t.request(21).unwrap(), 42);
        t.close_wait().unwrap();
    }

    #[test]
    fn writer_handle_keeps_thread_alive_until_dropped() {
        let t: Thread<i32, i32, ()> = Thread::new(|rx: Rx<i32, i32>| {
            move || -> Result<()> {
                while let Ok((q, reply)) = rx.recv() {
                    if let Some(tx) = reply {
                        let _ = tx.send(q + 1);
                    }
                }
                Ok(())
            }
        });
        let writer = t.to_writer();
        assert_eq!(writer.request(1).unwrap(), 2);
        drop(writer);
        t.close_wait().unwrap();
    }
}
