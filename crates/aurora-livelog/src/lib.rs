// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-process live-log distribution for a builder.
//!
//! Each package under build is a topic on the [`LiveLog`] bus; the worker
//! publishes status transitions and stdout/stderr chunks, and WebSocket
//! clients subscribe through the endpoint in [`server`].
//!
//! Publishing never blocks the builder: subscriptions are bounded and a
//! subscriber that cannot keep up loses its oldest frames (the drop-oldest
//! resolution of the head-of-line-blocking question; the original design
//! blocked the publisher instead).
#![deny(unsafe_code)]

pub mod server;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

/// Frames per subscription a slow consumer may fall behind before losing
/// the oldest.
const SUBSCRIPTION_CAPACITY: usize = 64;

/// One frame of a package's live stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Frame {
    /// A package status transition.
    Status(String),
    /// A chunk of build output.
    Log(String),
    /// Sent once to a subscriber whose topic has no publisher yet,
    /// distinguishing "no logs yet" from a dead stream.
    EmptyChannel,
}

struct Topic {
    sender: broadcast::Sender<Frame>,
    published: bool,
}

impl Topic {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIPTION_CAPACITY);
        Self {
            sender,
            published: false,
        }
    }
}

/// Topic-keyed pub/sub connecting one builder's workers to its WebSocket
/// clients.
#[derive(Default)]
pub struct LiveLog {
    topics: Mutex<HashMap<String, Topic>>,
}

impl LiveLog {
    /// An empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `topic`.
    ///
    /// The boolean is `true` iff the topic has received a publish before,
    /// i.e. there is (or was) a builder on the other end. Unsubscribing is
    /// dropping the returned [`Subscription`].
    pub fn subscribe(&self, topic: &str) -> (Subscription, bool) {
        let mut topics = self.topics.lock().expect("livelog lock poisoned");
        let entry = topics
            .entry(topic.to_string())
            .or_insert_with(Topic::new);

        (
            Subscription {
                rx: entry.sender.subscribe(),
            },
            entry.published,
        )
    }

    /// Publish `frame` to every subscriber of `topic`, without blocking.
    pub fn publish(&self, topic: &str, frame: Frame) {
        let mut topics = self.topics.lock().expect("livelog lock poisoned");
        let entry = topics
            .entry(topic.to_string())
            .or_insert_with(Topic::new);

        entry.published = true;
        // No subscribers is fine; frames just go nowhere.
        let _ = entry.sender.send(frame);
    }

    /// Disconnect every subscriber of `topic` and forget it.
    pub fn close(&self, topic: &str) {
        let mut topics = self.topics.lock().expect("livelog lock poisoned");
        topics.remove(topic);
    }
}

/// Receiving end of one topic subscription.
pub struct Subscription {
    rx: broadcast::Receiver<Frame>,
}

impl Subscription {
    /// The next frame, or `None` once the topic is closed.
    ///
    /// Frames lost to lag are skipped (and counted in the log); per-topic
    /// order of the delivered frames is preserved.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            match self.rx.recv().await {
                Ok(frame) => return Some(frame),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(dropped = n, "slow live-log subscriber lost frames");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
