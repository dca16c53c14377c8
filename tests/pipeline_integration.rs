//! End-to-end tests driving the visualizer through its public API.
//!
//! Batches enter through a `LocalTransport`, the scheduler is ticked with a
//! synthetic clock, and commits are observed on a recording surface.

use std::{cell::RefCell, rc::Rc, thread};

use marker_mesh_visualizer::{
    Accelerator, AcceleratorError, LocalTransport, Marker, MarkerBatch, Mesh, ProcessingStrategy,
    RawColor, RawPoint, RenderSurface, RenderTarget, VertexRecord, VisualizerConfig,
    VisualizerState,
};
use web_time::{Duration, Instant};

const TOPIC: &str = "/object_markers";
const FRAME: Duration = Duration::from_millis(16);

type CommitLog = Rc<RefCell<Vec<(String, Mesh)>>>;

struct RecordingTarget {
    name: String,
    commits: CommitLog,
}

impl RenderTarget for RecordingTarget {
    fn commit(&mut self, mesh: &Mesh) {
        self.commits
            .borrow_mut()
            .push((self.name.clone(), mesh.clone()));
    }

    fn set_visible(&mut self, _visible: bool) {}
}

#[derive(Default)]
struct RecordingSurface {
    commits: CommitLog,
}

impl RenderSurface for RecordingSurface {
    fn create_target(&mut self, _parent: &str, name: &str) -> Option<Box<dyn RenderTarget>> {
        Some(Box::new(RecordingTarget {
            name: name.to_string(),
            commits: self.commits.clone(),
        }))
    }
}

/// The kernel's arithmetic, run on the CPU.
struct SoftwareAccelerator;

impl Accelerator for SoftwareAccelerator {
    fn remap(&mut self, records: &mut [VertexRecord]) -> Result<(), AcceleratorError> {
        records.iter_mut().for_each(VertexRecord::remap);
        Ok(())
    }
}

struct FailingAccelerator;

impl Accelerator for FailingAccelerator {
    fn remap(&mut self, _records: &mut [VertexRecord]) -> Result<(), AcceleratorError> {
        Err(AcceleratorError::MapCallbackDropped)
    }
}

fn marker(point_count: usize, seed: f64) -> Marker {
    let points = (0..point_count)
        .map(|i| {
            let t = i as f64 * 0.37 + seed;
            RawPoint::new(t.sin() * 3.0, t.cos() * 1.5, t * 0.01 - 2.0)
        })
        .collect();
    let colors = (0..point_count / 2)
        .map(|i| RawColor::new(i as f32 / point_count as f32, 0.5, 0.25, 1.0))
        .collect();
    Marker::triangle_list(points, colors)
}

/// Ticks until the queue is drained and the gate is open.
fn drain(visualizer: &mut VisualizerState, clock: &mut Instant) {
    for _ in 0..10_000 {
        *clock += FRAME;
        visualizer.tick(*clock);
        if visualizer.queue_len() == 0 && visualizer.is_gate_open() {
            return;
        }
    }
    panic!("pipeline did not drain");
}

#[test]
fn test_batches_from_producer_thread_commit_in_order() {
    let transport = LocalTransport::new();
    let mut surface = RecordingSurface::default();
    let config = VisualizerConfig {
        slot_count: 2,
        release_delay: 0.02,
        ..Default::default()
    };
    let mut visualizer =
        VisualizerState::new(config, Box::new(transport.clone()), &mut surface, None).unwrap();

    let producer = {
        let transport = transport.clone();
        thread::spawn(move || {
            for batch_index in 1..=8usize {
                let batch = MarkerBatch::new(vec![
                    marker(batch_index * 50, batch_index as f64),
                    marker(batch_index * 3, 0.0),
                ]);
                assert_eq!(transport.publish(TOPIC, batch), 1);
            }
        })
    };
    producer.join().unwrap();
    assert_eq!(visualizer.queue_len(), 8);

    let mut clock = Instant::now();
    drain(&mut visualizer, &mut clock);

    let commits = surface.commits.borrow();
    assert_eq!(commits.len(), 16);
    let first_slot: Vec<usize> = commits
        .iter()
        .filter(|(name, _)| name == "0")
        .map(|(_, mesh)| mesh.vertex_count())
        .collect();
    assert_eq!(first_slot, vec![50, 100, 150, 200, 250, 300, 350, 400]);

    for (_, mesh) in commits.iter() {
        assert_eq!(mesh.indices.len(), 3 * (mesh.vertex_count() / 3));
        assert_eq!(mesh.normals.len(), mesh.vertex_count());
    }
}

#[test]
fn test_accelerated_strategy_matches_time_sliced() {
    let batch = MarkerBatch::new(vec![marker(1000, 0.5)]);

    let mut cpu_surface = RecordingSurface::default();
    let mut cpu = VisualizerState::new(
        VisualizerConfig::default(),
        Box::new(LocalTransport::new()),
        &mut cpu_surface,
        None,
    )
    .unwrap();
    assert_eq!(cpu.strategy(), ProcessingStrategy::TimeSliced);

    let mut gpu_surface = RecordingSurface::default();
    let mut gpu = VisualizerState::new(
        VisualizerConfig::default(),
        Box::new(LocalTransport::new()),
        &mut gpu_surface,
        Some(Box::new(SoftwareAccelerator)),
    )
    .unwrap();
    assert_eq!(gpu.strategy(), ProcessingStrategy::Accelerated);

    cpu.on_message_received(batch.clone());
    gpu.on_message_received(batch);
    let mut clock = Instant::now();
    drain(&mut cpu, &mut clock);
    drain(&mut gpu, &mut clock);

    let cpu_commits = cpu_surface.commits.borrow();
    let gpu_commits = gpu_surface.commits.borrow();
    assert_eq!(cpu_commits.len(), 1);
    assert_eq!(gpu_commits.len(), 1);
    assert_eq!(cpu_commits[0].1, gpu_commits[0].1);
}

#[test]
fn test_accelerated_strategy_finishes_in_fewer_ticks() {
    let count_ticks = |accelerator: Option<Box<dyn Accelerator>>| {
        let mut surface = RecordingSurface::default();
        let config = VisualizerConfig {
            release_delay: 0.0,
            ..Default::default()
        };
        let mut visualizer =
            VisualizerState::new(config, Box::new(LocalTransport::new()), &mut surface, accelerator)
                .unwrap();
        visualizer.on_message_received(MarkerBatch::new(vec![marker(250, 0.0)]));

        let mut clock = Instant::now();
        let mut ticks = 0;
        while surface.commits.borrow().is_empty() {
            clock += FRAME;
            visualizer.tick(clock);
            ticks += 1;
        }
        ticks
    };

    // Packing yields at 0, 100 and 200 on both strategies; only the CPU
    // build yields again after point 0.
    assert_eq!(count_ticks(Some(Box::new(SoftwareAccelerator))), 4);
    assert_eq!(count_ticks(None), 5);
}

#[test]
fn test_accelerator_failure_keeps_pipeline_flowing() {
    let mut surface = RecordingSurface::default();
    let config = VisualizerConfig {
        release_delay: 30.0,
        ..Default::default()
    };
    let mut visualizer = VisualizerState::new(
        config,
        Box::new(LocalTransport::new()),
        &mut surface,
        Some(Box::new(FailingAccelerator)),
    )
    .unwrap();
    visualizer.on_message_received(MarkerBatch::new(vec![marker(9, 0.0)]));
    visualizer.on_message_received(MarkerBatch::new(vec![marker(9, 1.0)]));

    let mut clock = Instant::now();
    drain(&mut visualizer, &mut clock);

    assert!(surface.commits.borrow().is_empty());
    assert_eq!(visualizer.tasks_in_flight(), 0);
}

#[test]
fn test_instrumentation_report_written_on_shutdown() {
    let directory = std::env::temp_dir().join(format!(
        "marker_mesh_integration_{}",
        std::process::id()
    ));
    std::fs::create_dir_all(&directory).unwrap();

    let mut surface = RecordingSurface::default();
    let config = VisualizerConfig {
        enable_instrumentation: true,
        analysis_directory: directory.clone(),
        analysis_label: Some("integration".to_string()),
        release_delay: 0.0,
        ..Default::default()
    };
    let mut visualizer =
        VisualizerState::new(config, Box::new(LocalTransport::new()), &mut surface, None).unwrap();
    for seed in 0..3 {
        visualizer.on_message_received(MarkerBatch::new(vec![marker(12, seed as f64)]));
    }
    let mut clock = Instant::now();
    drain(&mut visualizer, &mut clock);
    visualizer.shutdown();

    let reports: Vec<_> = std::fs::read_dir(&directory)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(reports.len(), 1);
    let file_name = reports[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("PerformanceAnalysis_"));
    assert!(file_name.ends_with("_integration.json"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&reports[0]).unwrap()).unwrap();
    let names: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Conversion 0", "Mesh", "Message"]);
    assert_eq!(json["data"][0]["tickTimes"].as_array().unwrap().len(), 3);
    assert_eq!(json["data"][2]["tickTimes"].as_array().unwrap().len(), 2);

    std::fs::remove_dir_all(&directory).unwrap();
}
