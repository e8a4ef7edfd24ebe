//! Per-session ordered event gateway
//!
//! Fans progress events out to subscribed clients. Delivery guarantees:
//!
//! - FIFO per session: a subscriber receives events in emit order
//! - Slow consumers never block the producer: each subscriber owns a
//!   bounded queue (default 256); overflow drops the oldest frame and the
//!   subscriber later receives a synthetic `dropped_events` counter frame
//! - Frames larger than 5 MiB are replaced by a truncation notice carrying
//!   `{truncated, size_bytes, truncated_at}` metadata
//! - Send failures mark the subscriber disconnected and remove it; nothing
//!   propagates back to the producer

pub mod ws;

use crate::events::ProgressEvent;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;
use uuid::Uuid;

/// Default per-subscriber queue bound
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Frames above this size are truncated
pub const MAX_PAYLOAD_BYTES: usize = 5 * 1024 * 1024;

struct SubscriberQueue {
    id: Uuid,
    session_id: String,
    queue: parking_lot::Mutex<VecDeque<Value>>,
    capacity: usize,
    /// Frames dropped since the last synthetic notice was delivered
    dropped_pending: AtomicU64,
    dropped_total: AtomicU64,
    notify: Notify,
    disconnected: AtomicBool,
}

impl SubscriberQueue {
    fn enqueue(&self, frame: Value) {
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                queue.pop_front();
                self.dropped_pending.fetch_add(1, Ordering::Relaxed);
                self.dropped_total.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(frame);
        }
        self.notify.notify_one();
    }
}

/// Receiving end of one subscription
pub struct Subscriber {
    inner: Arc<SubscriberQueue>,
}

impl Subscriber {
    /// Subscriber identity, used for unregistration
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Total frames dropped for this subscriber
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped_total.load(Ordering::Relaxed)
    }

    /// Receive the next frame in order
    ///
    /// Returns `None` once the subscriber is disconnected and drained.
    /// After an overflow, the next received frame is the synthetic
    /// `dropped_events` notice.
    pub async fn recv(&self) -> Option<Value> {
        loop {
            let pending = self.inner.dropped_pending.swap(0, Ordering::Relaxed);
            if pending > 0 {
                let notice = ProgressEvent::dropped_events(&self.inner.session_id, pending);
                return serde_json::to_value(notice).ok();
            }

            if let Some(frame) = self.inner.queue.lock().pop_front() {
                return Some(frame);
            }

            if self.inner.disconnected.load(Ordering::SeqCst) {
                return None;
            }

            self.inner.notify.notified().await;
        }
    }
}

/// Ordered per-session event fan-out
pub struct EventGateway {
    sessions: DashMap<String, Vec<Arc<SubscriberQueue>>>,
    queue_capacity: usize,
    max_payload_bytes: usize,
}

impl EventGateway {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY, MAX_PAYLOAD_BYTES)
    }

    pub fn with_capacity(queue_capacity: usize, max_payload_bytes: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            queue_capacity,
            max_payload_bytes,
        }
    }

    /// Attach a subscriber to a session's event stream
    pub fn register(&self, session_id: &str) -> Subscriber {
        let inner = Arc::new(SubscriberQueue {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            queue: parking_lot::Mutex::new(VecDeque::new()),
            capacity: self.queue_capacity,
            dropped_pending: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
            notify: Notify::new(),
            disconnected: AtomicBool::new(false),
        });
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .push(inner.clone());
        Subscriber { inner }
    }

    /// Detach a subscriber; pending frames are dropped
    pub fn unregister(&self, session_id: &str, subscriber_id: Uuid) {
        if let Some(mut subscribers) = self.sessions.get_mut(session_id) {
            if let Some(pos) = subscribers.iter().position(|s| s.id == subscriber_id) {
                let removed = subscribers.remove(pos);
                removed.disconnected.store(true, Ordering::SeqCst);
                removed.notify.notify_waiters();
            }
            if subscribers.is_empty() {
                drop(subscribers);
                self.sessions.remove_if(session_id, |_, subs| subs.is_empty());
            }
        }
    }

    /// Number of subscribers attached to a session
    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.sessions
            .get(session_id)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Deliver an event to all subscribers of the session
    ///
    /// Synchronous and non-blocking: the subscriber list is copied under a
    /// short-held lock and enqueueing never waits on consumers.
    pub fn emit(&self, session_id: &str, event: &ProgressEvent) {
        let frame = match self.encode(event) {
            Some(frame) => frame,
            None => return,
        };

        let subscribers: Vec<Arc<SubscriberQueue>> = match self.sessions.get(session_id) {
            Some(subs) => subs.value().clone(),
            None => return,
        };

        for subscriber in subscribers {
            subscriber.enqueue(frame.clone());
        }
    }

    fn encode(&self, event: &ProgressEvent) -> Option<Value> {
        let bytes = match serde_json::to_vec(event) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(error = %error, "progress event serialization failed, dropping");
                return None;
            }
        };

        if bytes.len() <= self.max_payload_bytes {
            return serde_json::from_slice(&bytes).ok();
        }

        // Oversized payloads keep their envelope but lose the data body
        let mut truncated = event.clone();
        truncated.data = Value::Null;
        truncated.meta.insert("truncated".to_string(), json!(true));
        truncated
            .meta
            .insert("size_bytes".to_string(), json!(bytes.len()));
        truncated
            .meta
            .insert("truncated_at".to_string(), json!(self.max_payload_bytes));
        serde_json::to_value(truncated).ok()
    }
}

impl Default for EventGateway {
    fn default() -> Self {
        Self::new()
    }
}
