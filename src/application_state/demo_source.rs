//! A synthetic marker producer for the demo binary.
//!
//! Runs on its own thread and publishes random triangle-list batches on a
//! `LocalTransport` topic at a fixed interval, the way an external robotics
//! source would push them.

use std::{
    sync::mpsc::{channel, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
};

use log::{debug, info};
use web_time::Duration;

use crate::visualizer_state::{
    marker::{Marker, MarkerBatch, MarkerType, RawColor, RawPoint},
    transport::LocalTransport,
};

/// Largest point count of a generated marker.
const MAX_POINTS: usize = 1200;

/// Builds one random batch of `marker_count` markers.
///
/// Roughly one marker in ten is of a non-renderable type, and colors are
/// often given for only a prefix of the points so the propagation path is
/// exercised.
pub fn random_batch(marker_count: usize) -> MarkerBatch {
    let markers = (0..marker_count).map(|_| random_marker()).collect();
    MarkerBatch::new(markers)
}

fn random_marker() -> Marker {
    let point_count = fastrand::usize(1..=MAX_POINTS);
    let origin = [
        fastrand::f64() * 10.0 - 5.0,
        fastrand::f64() * 10.0 - 5.0,
        fastrand::f64() * 2.0,
    ];

    let points = (0..point_count)
        .map(|_| {
            RawPoint::new(
                origin[0] + fastrand::f64(),
                origin[1] + fastrand::f64(),
                origin[2] + fastrand::f64(),
            )
        })
        .collect();

    let color_count = fastrand::usize(0..=point_count);
    let colors = (0..color_count)
        .map(|_| RawColor::new(fastrand::f32(), fastrand::f32(), fastrand::f32(), 1.0))
        .collect();

    let mut marker = Marker::triangle_list(points, colors);
    if fastrand::u8(0..10) == 0 {
        marker.marker_type = MarkerType::SPHERE;
    }
    marker
}

/// Handle to the producer thread. Stops the thread when dropped.
pub struct DemoProducer {
    stop_sender: Option<Sender<()>>,
    worker: Option<JoinHandle<usize>>,
}

impl DemoProducer {
    /// Starts publishing a batch of `marker_count` markers on `topic` every
    /// `interval`.
    pub fn spawn(
        transport: LocalTransport,
        topic: String,
        marker_count: usize,
        interval: Duration,
    ) -> Self {
        let (stop_sender, stop_receiver) = channel::<()>();

        let worker = thread::spawn(move || {
            let mut published = 0;
            while let Err(RecvTimeoutError::Timeout) = stop_receiver.recv_timeout(interval) {
                let delivered = transport.publish(&topic, random_batch(marker_count));
                debug!("Published batch {} to {} subscriber(s)", published, delivered);
                published += 1;
            }
            published
        });

        DemoProducer {
            stop_sender: Some(stop_sender),
            worker: Some(worker),
        }
    }

    /// Stops the thread and waits for it.
    ///
    /// # Returns
    /// The number of batches published
    pub fn stop(&mut self) -> usize {
        if let Some(stop_sender) = self.stop_sender.take() {
            let _ = stop_sender.send(());
        }
        let published = self
            .worker
            .take()
            .and_then(|worker| worker.join().ok())
            .unwrap_or(0);
        info!("Demo producer stopped after {} batch(es)", published);
        published
    }
}

impl Drop for DemoProducer {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}
