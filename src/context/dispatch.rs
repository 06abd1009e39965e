//! Frame fan-out: one inbound sink per context, filtered sub-streams out
//!
//! The driver pushes every frame the slot emits into the context's [`FrameSink`].
//! Delivery is a synchronous, in-order callback on the producer's thread: the
//! dispatcher walks its subscriber list and forwards the frame to every
//! subscriber whose device address matches. Non-matching frames are invisible
//! to a subscriber, never delayed or reordered.
//!
//! Sub-streams are unbounded crossbeam channels, so a slow consumer never
//! stalls the producer or any other subscriber. Dropping a [`FrameStream`]
//! removes exactly its dispatch entry before releasing its context
//! reservation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use super::frame::Frame;
use super::registry::ContextHandle;

struct SubscriberEntry {
    id: u64,
    address: u32,
    tx: Sender<Frame>,
}

/// Per-context frame dispatcher
///
/// Shared between the context (which registers subscribers) and the sink the
/// driver holds (which delivers frames).
pub(crate) struct Dispatcher {
    subscribers: Mutex<Vec<SubscriberEntry>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a filtered subscriber. Returns its id and the receiving end.
    pub(crate) fn subscribe(&self, address: u32) -> (u64, Receiver<Frame>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap()
            .push(SubscriberEntry { id, address, tx });
        debug!(id, address, "frame subscriber registered");
        (id, rx)
    }

    /// Remove exactly the subscriber registered under `id`.
    ///
    /// Synchronous with respect to `deliver` (same lock), so a detached
    /// subscriber never sees another frame and in-flight frames to other
    /// subscribers are unaffected.
    pub(crate) fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().unwrap().retain(|s| s.id != id);
        debug!(id, "frame subscriber removed");
    }

    /// Fan a frame out to every subscriber whose address matches.
    ///
    /// Runs on the producer's thread. Sends are unbounded and never block;
    /// entries whose receiver is gone are pruned in place.
    pub(crate) fn deliver(&self, frame: &Frame) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|s| {
            if s.address != frame.address {
                return true;
            }
            s.tx.send(frame.clone()).is_ok()
        });
    }

    /// Drop all subscriber senders so their streams see end-of-stream once
    /// buffered frames are drained. Called when the driver releases its sink.
    fn close(&self) {
        let dropped = {
            let mut subscribers = self.subscribers.lock().unwrap();
            let n = subscribers.len();
            subscribers.clear();
            n
        };
        if dropped > 0 {
            debug!(subscribers = dropped, "frame sink closed, streams ended");
        }
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

struct SinkShared {
    dispatcher: Arc<Dispatcher>,
}

impl Drop for SinkShared {
    fn drop(&mut self) {
        self.dispatcher.close();
    }
}

/// Frame delivery handle held by the driver
///
/// Cloneable; when the driver drops its last clone, every open sub-stream on
/// the context ends after draining frames already delivered.
#[derive(Clone)]
pub struct FrameSink {
    shared: Arc<SinkShared>,
}

impl FrameSink {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            shared: Arc::new(SinkShared { dispatcher }),
        }
    }

    /// Deliver one frame to the context's subscribers, in arrival order.
    pub fn deliver(&self, frame: Frame) {
        self.shared.dispatcher.deliver(&frame);
    }
}

/// A lazy, unbounded sub-stream of frames for one device address
///
/// Produced by [`ContextHandle::subscribe`]. Holding the stream keeps the
/// underlying context reserved; dropping it detaches the dispatch entry first
/// and releases the reservation afterwards.
pub struct FrameStream {
    rx: Receiver<Frame>,
    id: u64,
    address: u32,
    dispatcher: Arc<Dispatcher>,
    // Released after the dispatch entry is removed (declared last, dropped last)
    _handle: ContextHandle,
}

impl std::fmt::Debug for FrameStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameStream")
            .field("id", &self.id)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl FrameStream {
    pub(crate) fn new(
        rx: Receiver<Frame>,
        id: u64,
        address: u32,
        dispatcher: Arc<Dispatcher>,
        handle: ContextHandle,
    ) -> Self {
        Self {
            rx,
            id,
            address,
            dispatcher,
            _handle: handle,
        }
    }

    /// Device address this stream is filtered on
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Blocking receive. Returns `None` once the context's frame sink is gone
    /// and all buffered frames have been drained.
    pub fn recv(&self) -> Option<Frame> {
        self.rx.recv().ok()
    }

    /// Non-blocking receive. Returns `None` when no frame is ready.
    pub fn try_recv(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    /// Receive with a timeout. Returns `None` on timeout or end-of-stream.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Frame> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Iterate frames until end-of-stream.
    pub fn iter(&self) -> impl Iterator<Item = Frame> + '_ {
        self.rx.iter()
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        // Detach the handler before the context reservation is released
        self.dispatcher.unsubscribe(self.id);
    }
}
