//! Ingress transport seam.
//!
//! The pipeline does not know where marker batches come from. It is handed a
//! `MarkerTransport` at construction, subscribes its `MarkerSink` under the
//! configured topic and unsubscribes again on shutdown. `LocalTransport` is
//! an in-process implementation: any thread holding a clone can publish.

use std::collections::HashMap;

use log::{debug, warn};
use thiserror::Error;

use super::{marker::MarkerBatch, marker_queue::MarkerSink};
use crate::core::MtResource;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("invalid topic name: {0:?}")]
    InvalidTopic(String),
}

/// A push source of marker batches, addressed by topic.
pub trait MarkerTransport {
    /// Starts delivering batches published on `topic` to `sink`.
    fn subscribe(&mut self, topic: &str, sink: MarkerSink) -> Result<(), TransportError>;

    /// Stops delivering batches published on `topic`.
    fn unsubscribe(&mut self, topic: &str);
}

#[derive(Default)]
struct TopicTable {
    subscribers: HashMap<String, Vec<MarkerSink>>,
    closed: bool,
}

/// In-process topic transport.
#[derive(Clone)]
pub struct LocalTransport {
    topics: MtResource<TopicTable>,
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalTransport {
    pub fn new() -> Self {
        LocalTransport {
            topics: MtResource::new(TopicTable::default()),
        }
    }

    /// Delivers `batch` to every subscriber of `topic`.
    ///
    /// # Returns
    /// The number of subscribers the batch was delivered to
    pub fn publish(&self, topic: &str, batch: MarkerBatch) -> usize {
        let sinks = match self.topics.get().subscribers.get(topic) {
            Some(sinks) => sinks.clone(),
            None => {
                debug!("No subscriber on {}, dropping batch.", topic);
                return 0;
            }
        };

        for sink in &sinks {
            sink.on_message_received(batch.clone());
        }
        sinks.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get()
            .subscribers
            .get(topic)
            .map_or(0, |sinks| sinks.len())
    }

    /// Shuts the transport down. Existing subscriptions are dropped and any
    /// later `subscribe` fails.
    pub fn close(&self) {
        let mut topics = self.topics.get_mut();
        topics.closed = true;
        topics.subscribers.clear();
    }
}

impl MarkerTransport for LocalTransport {
    fn subscribe(&mut self, topic: &str, sink: MarkerSink) -> Result<(), TransportError> {
        if topic.trim().is_empty() {
            return Err(TransportError::InvalidTopic(topic.to_string()));
        }

        let mut topics = self.topics.get_mut();
        if topics.closed {
            return Err(TransportError::Closed);
        }
        topics
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(sink);
        debug!("Subscribed to {}", topic);
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) {
        if self.topics.get_mut().subscribers.remove(topic).is_none() {
            warn!("Unsubscribing from {}, which has no subscribers.", topic);
        }
    }
}
