//! Connection registry and publish-subscribe broker.
//!
//! The broker is the single piece of state shared across connections: a map
//! of connection ids to send-capable handles and a per-channel subscriber
//! table. Every operation is safe under arbitrary concurrent callers.
//! Broadcasts snapshot the subscriber set before fanning out, so no lock is
//! held across outbound sends and a subscriber leaving mid-broadcast cannot
//! corrupt the table.

use bytes::Bytes;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stompd_protocol::Frame;

/// Identifies one accepted connection for the lifetime of the process.
pub type ConnectionId = u64;

/// Client-chosen identifier of one channel membership.
pub type SubscriptionId = u64;

/// Send side of one connection's outbound byte queue.
///
/// `send` is fire-and-forget: it queues bytes for the connection's writer
/// and never blocks waiting for the remote peer. It returns `false` once
/// the writer is gone.
pub trait SendHandle: Send + Sync {
    fn send(&self, bytes: Bytes) -> bool;
}

/// Shared connection registry and channel subscription table.
pub struct Broker {
    /// Registered send handles by connection id.
    handles: DashMap<ConnectionId, Arc<dyn SendHandle>>,
    /// Channel name -> (connection id -> subscription id).
    channels: DashMap<String, HashMap<ConnectionId, SubscriptionId>>,
    /// Advanced once per broadcast, shared by all copies of that broadcast.
    message_seq: AtomicU64,
}

impl Broker {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            channels: DashMap::new(),
            message_seq: AtomicU64::new(0),
        }
    }

    /// Registers a connection's send handle. Overwrites any existing handle
    /// for the same id.
    pub fn register(&self, id: ConnectionId, handle: Arc<dyn SendHandle>) {
        self.handles.insert(id, handle);
    }

    /// Queues raw bytes for one connection.
    ///
    /// Returns `false` without error when the id is not registered or its
    /// writer has shut down; delivery is fire-and-forget at this layer.
    pub fn send_to(&self, id: ConnectionId, bytes: Bytes) -> bool {
        match self.handles.get(&id) {
            Some(handle) => handle.send(bytes),
            None => false,
        }
    }

    /// Encodes and queues a frame for one connection.
    pub fn send_frame(&self, id: ConnectionId, frame: &Frame) -> bool {
        self.send_to(id, frame.encode().freeze())
    }

    /// Broadcasts a body to every subscriber of a channel.
    ///
    /// One `message-id` is allocated per broadcast and stamped on every
    /// copy. The recipient set is snapshotted up front: a subscriber joining
    /// mid-broadcast may or may not receive this message, and one that left
    /// just before fan-out fails silently via `send_to`.
    pub fn broadcast(&self, channel: &str, body: Bytes) {
        let recipients: Vec<(ConnectionId, SubscriptionId)> = match self.channels.get(channel) {
            Some(subscribers) => subscribers.iter().map(|(&id, &sub)| (id, sub)).collect(),
            None => return,
        };
        if recipients.is_empty() {
            return;
        }

        let message_id = self.message_seq.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            channel,
            message_id,
            recipients = recipients.len(),
            "broadcasting"
        );

        for (id, sub_id) in recipients {
            let frame = Frame::message(sub_id, message_id, channel, body.clone());
            if !self.send_frame(id, &frame) {
                tracing::debug!(connection = id, channel, "dropping copy for dead connection");
            }
        }
    }

    /// Records a subscription for a (channel, connection) pair.
    ///
    /// A connection holds at most one subscription id per channel; a later
    /// subscribe overwrites the id silently.
    pub fn subscribe(&self, id: ConnectionId, sub_id: SubscriptionId, channel: &str) {
        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(id, sub_id);
    }

    /// Removes the subscription for a (channel, connection) pair. No-op if
    /// absent.
    pub fn unsubscribe(&self, id: ConnectionId, channel: &str) {
        if let Some(mut subscribers) = self.channels.get_mut(channel) {
            subscribers.remove(&id);
        }
    }

    /// Removes the connection's registry entry and sweeps every channel.
    ///
    /// Returns the number of channel memberships cleared. Safe to call more
    /// than once; the second call is a no-op.
    pub fn disconnect(&self, id: ConnectionId) -> usize {
        let had_handle = self.handles.remove(&id).is_some();

        let mut cleared = 0;
        for mut entry in self.channels.iter_mut() {
            if entry.value_mut().remove(&id).is_some() {
                cleared += 1;
            }
        }

        if had_handle || cleared > 0 {
            tracing::debug!(connection = id, cleared, "connection removed from broker");
        }
        cleared
    }

    /// Returns whether a connection id is currently registered.
    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.handles.contains_key(&id)
    }

    /// Returns the subscription id a connection holds on a channel, if any.
    pub fn subscription_id(&self, id: ConnectionId, channel: &str) -> Option<SubscriptionId> {
        self.channels
            .get(channel)
            .and_then(|subscribers| subscribers.get(&id).copied())
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use stompd_protocol::FrameCodec;

    /// Records every queued byte chunk for later frame-level inspection.
    struct RecordingHandle {
        sent: Mutex<Vec<Bytes>>,
        alive: std::sync::atomic::AtomicBool,
    }

    impl RecordingHandle {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                alive: std::sync::atomic::AtomicBool::new(true),
            })
        }

        fn kill(&self) {
            self.alive.store(false, Ordering::SeqCst);
        }

        fn frames(&self) -> Vec<Frame> {
            let mut codec = FrameCodec::new();
            for chunk in self.sent.lock().iter() {
                codec.extend(chunk);
            }
            let mut frames = Vec::new();
            while let Some(frame) = codec.decode_frame().unwrap() {
                frames.push(frame);
            }
            frames
        }
    }

    impl SendHandle for RecordingHandle {
        fn send(&self, bytes: Bytes) -> bool {
            if !self.alive.load(Ordering::SeqCst) {
                return false;
            }
            self.sent.lock().push(bytes);
            true
        }
    }

    #[test]
    fn test_send_to_unknown_is_silent_false() {
        let broker = Broker::new();
        assert!(!broker.send_to(99, Bytes::from_static(b"x")));
    }

    #[test]
    fn test_register_and_send() {
        let broker = Broker::new();
        let handle = RecordingHandle::new();
        broker.register(1, handle.clone());

        assert!(broker.send_frame(1, &Frame::receipt("r-1")));
        let frames = handle.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header("receipt-id"), Some("r-1"));
    }

    #[test]
    fn test_broadcast_stamps_shared_message_id() {
        let broker = Broker::new();
        let h1 = RecordingHandle::new();
        let h7 = RecordingHandle::new();
        broker.register(1, h1.clone());
        broker.register(2, h7.clone());
        broker.subscribe(1, 1, "news");
        broker.subscribe(2, 7, "news");

        broker.broadcast("news", Bytes::from_static(b"breaking"));

        let f1 = &h1.frames()[0];
        let f7 = &h7.frames()[0];
        assert_eq!(f1.command, "MESSAGE");
        assert_eq!(f1.header("destination"), Some("news"));
        assert_eq!(f1.header("subscription"), Some("1"));
        assert_eq!(f7.header("subscription"), Some("7"));
        assert_eq!(f1.header("message-id"), f7.header("message-id"));
        assert_eq!(&f1.body[..], b"breaking");
    }

    #[test]
    fn test_message_id_advances_per_broadcast() {
        let broker = Broker::new();
        let handle = RecordingHandle::new();
        broker.register(1, handle.clone());
        broker.subscribe(1, 1, "news");

        broker.broadcast("news", Bytes::from_static(b"a"));
        broker.broadcast("news", Bytes::from_static(b"b"));

        let frames = handle.frames();
        assert_ne!(frames[0].header("message-id"), frames[1].header("message-id"));
    }

    #[test]
    fn test_broadcast_to_empty_channel_is_noop() {
        let broker = Broker::new();
        broker.broadcast("ghost-town", Bytes::from_static(b"anyone?"));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let broker = Broker::new();
        let h1 = RecordingHandle::new();
        let h7 = RecordingHandle::new();
        broker.register(1, h1.clone());
        broker.register(2, h7.clone());
        broker.subscribe(1, 1, "news");
        broker.subscribe(2, 7, "news");

        broker.unsubscribe(1, "news");
        broker.broadcast("news", Bytes::from_static(b"update"));

        assert!(h1.frames().is_empty());
        assert_eq!(h7.frames().len(), 1);
    }

    #[test]
    fn test_unsubscribe_absent_is_noop() {
        let broker = Broker::new();
        broker.unsubscribe(1, "nothing");
    }

    #[test]
    fn test_subscribe_overwrites_sub_id() {
        let broker = Broker::new();
        broker.subscribe(1, 3, "news");
        broker.subscribe(1, 9, "news");
        assert_eq!(broker.subscription_id(1, "news"), Some(9));
    }

    #[test]
    fn test_disconnect_sweeps_all_channels() {
        let broker = Broker::new();
        let handle = RecordingHandle::new();
        broker.register(1, handle.clone());
        broker.subscribe(1, 1, "news");
        broker.subscribe(1, 2, "sports");

        assert_eq!(broker.disconnect(1), 2);
        assert!(!broker.is_registered(1));

        broker.broadcast("news", Bytes::from_static(b"x"));
        broker.broadcast("sports", Bytes::from_static(b"y"));
        assert!(handle.frames().is_empty());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let broker = Broker::new();
        broker.register(1, RecordingHandle::new());
        broker.subscribe(1, 1, "news");

        assert_eq!(broker.disconnect(1), 1);
        assert_eq!(broker.disconnect(1), 0);
    }

    #[test]
    fn test_broadcast_survives_dead_handle() {
        let broker = Broker::new();
        let dead = RecordingHandle::new();
        let live = RecordingHandle::new();
        broker.register(1, dead.clone());
        broker.register(2, live.clone());
        broker.subscribe(1, 1, "news");
        broker.subscribe(2, 2, "news");

        dead.kill();
        broker.broadcast("news", Bytes::from_static(b"still here"));

        assert!(dead.frames().is_empty());
        assert_eq!(live.frames().len(), 1);
    }

    #[test]
    fn test_concurrent_broadcast_and_churn() {
        let broker = Arc::new(Broker::new());
        for id in 0..8 {
            broker.register(id, RecordingHandle::new());
            broker.subscribe(id, id, "busy");
        }

        let publisher = {
            let broker = broker.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    broker.broadcast("busy", Bytes::from_static(b"tick"));
                }
            })
        };
        let churn = {
            let broker = broker.clone();
            std::thread::spawn(move || {
                for round in 0..200u64 {
                    let id = round % 8;
                    broker.unsubscribe(id, "busy");
                    broker.subscribe(id, id, "busy");
                    if round % 16 == 0 {
                        broker.disconnect(id);
                        broker.register(id, RecordingHandle::new());
                    }
                }
            })
        };

        publisher.join().unwrap();
        churn.join().unwrap();
    }
}
