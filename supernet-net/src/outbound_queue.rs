//! Per-peer outbound send queue: a blocking FIFO with cooperative
//! cancellation and a sender-supplied send-failed callback.
//!
//! Grounded on `send_message`/`broadcast_message` outbound helpers in shape
//! (one queue owns framing and delivery for its peer) but restructured from
//! one-shot sends into a persistent blocking FIFO.

use {
    std::sync::Arc,
    supernet_codec::Message,
    tokio::sync::{mpsc, watch},
};

/// A cooperative cancellation signal, shared by cloning.
///
/// Grounded on the same `tokio::sync::watch` edge-triggered-barrier idiom
/// used by [`supernet_supernet::SupernetTracker`]'s bootstrap handle.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// The trigger side of a [`CancelToken`].
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

/// Create a linked cancel source and token pair.
pub fn cancel_pair() -> (CancelSource, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSource { tx }, CancelToken { rx })
}

impl CancelSource {
    /// Signal cancellation to every clone of the linked [`CancelToken`].
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancelToken {
    /// A token that never cancels, for call sites with no cancellation source.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        rx.into()
    }

    /// `true` iff cancellation has already been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is signalled.
    pub async fn cancelled(&mut self) {
        if self.is_cancelled() {
            return;
        }
        let _ = self.rx.changed().await;
    }
}

impl From<watch::Receiver<bool>> for CancelToken {
    fn from(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }
}

/// Invoked with a message that could not be delivered because the queue was
/// closed before it could be sent.
pub type SendFailedCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// A peer's outbound message queue.
///
/// `Push` blocks until there is capacity, the supplied [`CancelToken`] fires,
/// or the queue is closed. `Pop`/`PopNow` drain it on the connection-writer
/// side. Once closed, `Push` fails immediately and `Pop` returns `None`.
pub struct OutboundQueue {
    tx: mpsc::Sender<Message>,
    rx: mpsc::Receiver<Message>,
    closed: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
    on_send_failed: Option<SendFailedCallback>,
}

impl OutboundQueue {
    /// Create a new queue with the given bounded capacity.
    pub fn new(capacity: usize, on_send_failed: Option<SendFailedCallback>) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (closed, closed_rx) = watch::channel(false);
        Self {
            tx,
            rx,
            closed,
            closed_rx,
            on_send_failed,
        }
    }

    /// A cloneable handle producers can use to [`QueueHandle::push`] without
    /// holding the draining half.
    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            tx: self.tx.clone(),
            closed_rx: self.closed_rx.clone(),
            on_send_failed: self.on_send_failed.clone(),
        }
    }

    /// Blocking, non-cancellable pop: waits until a message is available or
    /// the queue is closed. Already-queued messages are still delivered
    /// after close; `None` is returned once the queue is both closed and
    /// empty.
    pub async fn pop(&mut self) -> Option<Message> {
        if let Ok(msg) = self.rx.try_recv() {
            return Some(msg);
        }
        if self.is_closed() {
            return None;
        }
        let mut closed_rx = self.closed_rx.clone();
        tokio::select! {
            biased;
            msg = self.rx.recv() => msg,
            _ = closed_rx.changed() => None,
        }
    }

    /// Non-blocking pop.
    pub fn pop_now(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// Close the queue. Any `Push` already in flight observes `false` from
    /// then on; already-queued messages remain poppable.
    pub fn close(&self) {
        let _ = self.closed.send(true);
    }

    /// `true` iff the queue has been closed.
    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }
}

/// A cloneable producer-side handle to an [`OutboundQueue`].
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::Sender<Message>,
    closed_rx: watch::Receiver<bool>,
    on_send_failed: Option<SendFailedCallback>,
}

impl QueueHandle {
    /// Push a message, blocking until capacity frees up, `cancel` fires, or
    /// the queue closes. Returns `true` iff the message was enqueued.
    pub async fn push(&self, msg: Message, mut cancel: CancelToken) -> bool {
        if *self.closed_rx.borrow() {
            self.fail(msg);
            return false;
        }
        let mut closed_rx = self.closed_rx.clone();
        tokio::select! {
            biased;
            _ = closed_rx.changed() => {
                self.fail(msg);
                false
            }
            _ = cancel.cancelled() => {
                false
            }
            result = self.tx.send(msg) => {
                result.is_ok()
            }
        }
    }

    fn fail(&self, msg: Message) {
        if let Some(cb) = &self.on_send_failed {
            cb(msg);
        }
    }
}
