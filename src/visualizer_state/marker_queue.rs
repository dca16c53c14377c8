//! The unbounded FIFO between the transport and the dispatch loop.
//!
//! The queue is the only state touched by both the producer callback and the
//! scheduler tick, so it lives in an `MtResource` and the producer side
//! (`MarkerSink`) can be cloned onto a transport thread.

use std::{collections::VecDeque, sync::Arc};

use log::warn;

use super::{
    analysis::{PerformanceSink, MESSAGE_KEY},
    marker::MarkerBatch,
};
use crate::core::MtResource;

/// Consumer side of the marker queue, owned by the dispatch loop.
pub struct MarkerQueue {
    batches: MtResource<VecDeque<MarkerBatch>>,
    analysis: Arc<dyn PerformanceSink>,
}

impl MarkerQueue {
    pub fn new(analysis: Arc<dyn PerformanceSink>) -> Self {
        MarkerQueue {
            batches: MtResource::new(VecDeque::new()),
            analysis,
        }
    }

    /// Creates a producer handle feeding this queue.
    pub fn sink(&self) -> MarkerSink {
        MarkerSink {
            batches: self.batches.clone(),
            analysis: self.analysis.clone(),
        }
    }

    /// Takes the head batch.
    pub fn pop(&self) -> Option<MarkerBatch> {
        self.batches.get_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.batches.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.get().is_empty()
    }
}

/// Producer side of the marker queue, handed to the transport.
#[derive(Clone)]
pub struct MarkerSink {
    batches: MtResource<VecDeque<MarkerBatch>>,
    analysis: Arc<dyn PerformanceSink>,
}

impl MarkerSink {
    /// Appends `batch` to the tail of the queue.
    ///
    /// A batch without markers is logged and dropped. Never fails.
    pub fn on_message_received(&self, batch: MarkerBatch) {
        if batch.is_empty() {
            warn!("Received empty marker batch, ignoring.");
            return;
        }

        self.batches.get_mut().push_back(batch);
        self.analysis.tick(MESSAGE_KEY);
    }
}
