//! Shared message handles and the single-shot ready signal.
//!
//! A [`SharedMessage`] is the caller-facing handle to a [`Message`] that
//! is populated by someone else: the decoder fills a registered response
//! in place while the caller awaits the ready signal. The signal is a
//! binary-semaphore shape (at most one stored permit, at most one
//! waiter); chunked messages release it once per arriving chunk while the
//! message is still non-terminal, so consumers check
//! [`SharedMessage::is_finished`] independently of the signal itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use super::message::{Kind, Message};

#[derive(Debug)]
struct Shared {
    state: Mutex<Message>,
    ready: Notify,
    finished: AtomicBool,
    signaled: AtomicBool,
}

/// A cloneable handle to a message populated across task boundaries.
#[derive(Debug, Clone)]
pub struct SharedMessage {
    inner: Arc<Shared>,
}

impl SharedMessage {
    pub fn new(kind: Kind) -> Self {
        Self::from_message(Message::new(kind))
    }

    pub fn from_message(message: Message) -> Self {
        Self {
            inner: Arc::new(Shared {
                state: Mutex::new(message),
                ready: Notify::new(),
                finished: AtomicBool::new(false),
                signaled: AtomicBool::new(false),
            }),
        }
    }

    /// Lock the underlying message. The critical sections are short and
    /// never held across an await point.
    pub fn lock(&self) -> MutexGuard<'_, Message> {
        self.inner.state.lock().unwrap()
    }

    /// Release the ready signal. `finished` marks the message terminal;
    /// chunked messages release with `false` once per chunk and with
    /// `true` at the end.
    pub fn set_ready(&self, finished: bool) {
        if finished {
            self.inner.finished.store(true, Ordering::Release);
            self.lock().set_finished(true);
        }
        self.inner.signaled.store(true, Ordering::Release);
        self.inner.ready.notify_one();
    }

    /// Wait for the next signal release. A release that happened before
    /// the call is observed immediately.
    pub async fn ready(&self) {
        self.inner.ready.notified().await;
    }

    /// Whether the message is terminal, independent of signal arming.
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    /// Whether the signal has ever been released.
    pub fn was_signaled(&self) -> bool {
        self.inner.signaled.load(Ordering::Acquire)
    }

    /// Have this handle's message adopt all wire-derived state from
    /// `source`. The handle's own signal is untouched.
    pub fn adopt(&self, source: Message) {
        self.lock().adopt(source);
    }

    /// Take the message out of the handle. The sole-owner case moves it
    /// without copying; otherwise the contents are taken and an empty
    /// shell is left behind for the other holders.
    pub fn into_message(self) -> Message {
        match Arc::try_unwrap(self.inner) {
            Ok(shared) => shared.state.into_inner().unwrap(),
            Err(inner) => {
                let mut guard = inner.state.lock().unwrap();
                std::mem::take(&mut *guard)
            }
        }
    }

    /// Adopt the contents of another handle, as when a caller-supplied
    /// message replaces one the decoder had already started populating.
    /// The source's signal is not transferred, but if it had been
    /// released this handle's signal is released immediately.
    pub fn adopt_shared(&self, source: &SharedMessage) {
        if Arc::ptr_eq(&self.inner, &source.inner) {
            return;
        }
        let contents = {
            let mut guard = source.lock();
            std::mem::take(&mut *guard)
        };
        self.lock().adopt(contents);
        if source.was_signaled() {
            self.set_ready(source.is_finished());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Blob;

    #[tokio::test]
    async fn signal_release_before_wait_is_observed() {
        let message = SharedMessage::new(Kind::Response);
        message.set_ready(true);
        // Must not hang: the permit was stored.
        message.ready().await;
        assert!(message.is_finished());
    }

    #[tokio::test]
    async fn chunk_release_is_not_terminal() {
        let message = SharedMessage::new(Kind::Response);
        message.set_ready(false);
        message.ready().await;
        assert!(message.was_signaled());
        assert!(!message.is_finished());

        message.set_ready(true);
        message.ready().await;
        assert!(message.is_finished());
        assert!(message.lock().is_finished());
    }

    #[tokio::test]
    async fn waiter_is_woken_by_release() {
        let message = SharedMessage::new(Kind::Response);
        let waiter = message.clone();
        let task = tokio::spawn(async move {
            waiter.ready().await;
            waiter.is_finished()
        });

        tokio::task::yield_now().await;
        message.lock().set_status_code(200);
        message.set_ready(true);
        assert!(task.await.unwrap());
    }

    #[test]
    fn adopt_shared_moves_contents_and_signal_state() {
        let source = SharedMessage::new(Kind::Response);
        source.lock().set_status_code(200).set_reason("OK");
        source.lock().set_body(Blob::from_bytes(b"hi"));
        source.set_ready(true);

        let target = SharedMessage::new(Kind::Response);
        target.adopt_shared(&source);

        assert_eq!(target.lock().status_code(), 200);
        assert_eq!(*target.lock().body(), b"hi"[..]);
        assert!(target.was_signaled());
        assert!(target.is_finished());
    }
}
