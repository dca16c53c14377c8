//! Marker to mesh conversion.
//!
//! Conversion happens in two resumable passes so a large point cloud can be
//! spread over several frames:
//!
//! 1. `VertexPacking` walks the marker's points, propagates colors and packs
//!    `VertexRecord`s. On the time-sliced strategy it also applies the
//!    coordinate remap; on the accelerated strategy it leaves the records in
//!    source space for the kernel.
//! 2. `MeshBuild` walks the records, splits them into the vertex buffer and
//!    emits one triangle for every aligned triple of points.
//!
//! Each pass reports `Progress::Yield` at its stride boundaries. The caller
//! (a scheduler task) decides when to resume it. `MeshProcessingUnit` owns the
//! stride configuration and, when present, the accelerator.
//!
//! # Triangulation
//! For point index `i` with `i % 3 == 0` and `i + 2 < n` the triangle
//! `(i, i + 1, i + 2)` is emitted. A trailing one or two points stay in the
//! vertex buffer unreferenced, so an `n` point marker yields `3 * (n / 3)`
//! indices.

mod accelerator;
mod buffer_state;

pub use accelerator::{workgroup_count, Accelerator, AcceleratorError, WgpuAccelerator};
pub use accelerator::{KERNEL_ENTRY_POINT, WORKGROUP_SIZE};

use log::debug;

use super::{
    mesh::Mesh,
    vertex::{TriangleIndex, VertexBuffer, VertexRecord},
};
use crate::visualizer_state::marker::{Marker, RawColor};

/// Outcome of running a pass until its next yield point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The pass stopped at a stride boundary and wants to be resumed later
    Yield,
    /// The pass has processed every point
    Done,
}

/// Execution strategy for the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStrategy {
    /// Remap and build on the CPU, yielding at fixed strides
    TimeSliced,
    /// Remap on the accelerator in one dispatch, build without yielding
    Accelerated,
}

/// Returns the triangle starting at point `index`, if one starts there.
pub fn triangle_at(index: usize, vertex_count: usize) -> Option<[u32; 3]> {
    if index % 3 == 0 && index + 2 < vertex_count {
        let i = index as u32;
        Some([i, i + 1, i + 2])
    } else {
        None
    }
}

/// Builds the full triangle index for `vertex_count` points in one go.
pub fn triangulate(vertex_count: usize) -> TriangleIndex {
    (0..vertex_count)
        .filter_map(|i| triangle_at(i, vertex_count))
        .flatten()
        .collect()
}

/// Coordinate pass: packs a marker's points into records.
///
/// Yields *before* processing every `stride`-th point, including point zero,
/// so a freshly started conversion always gives control back once before
/// touching any data.
#[derive(Debug)]
pub struct VertexPacking {
    records: Vec<VertexRecord>,
    next: usize,
    parked_at: Option<usize>,
    last_color: RawColor,
    remap: bool,
    stride: usize,
}

impl VertexPacking {
    pub fn new(vertex_count: usize, stride: usize, remap: bool) -> Self {
        VertexPacking {
            records: Vec::with_capacity(vertex_count),
            next: 0,
            parked_at: None,
            last_color: RawColor::CYAN,
            remap,
            stride: stride.max(1),
        }
    }

    /// Packs points until the next stride boundary or the end of the marker.
    pub fn step(&mut self, marker: &Marker) -> Progress {
        while self.next < marker.points.len() {
            let index = self.next;
            if index % self.stride == 0 && self.parked_at != Some(index) {
                self.parked_at = Some(index);
                return Progress::Yield;
            }

            if let Some(color) = marker.colors.get(index) {
                self.last_color = *color;
            }

            let point = &marker.points[index];
            let record = if self.remap {
                VertexRecord::remapped(point, self.last_color)
            } else {
                VertexRecord::from_source(point, self.last_color)
            };
            self.records.push(record);
            self.next += 1;
        }

        Progress::Done
    }

    /// Runs the pass to completion, ignoring yield points.
    pub fn run_to_end(mut self, marker: &Marker) -> Vec<VertexRecord> {
        while self.step(marker) == Progress::Yield {}
        self.records
    }

    pub fn processed(&self) -> usize {
        self.next
    }

    pub fn into_records(self) -> Vec<VertexRecord> {
        self.records
    }
}

/// Mesh build pass: splits records into the vertex buffer and triangulates.
///
/// With a stride, yields *after* processing every `stride`-th point. Without
/// one it runs in a single synchronous step.
#[derive(Debug)]
pub struct MeshBuild {
    records: Vec<VertexRecord>,
    vertices: VertexBuffer,
    indices: TriangleIndex,
    next: usize,
    stride: Option<usize>,
}

impl MeshBuild {
    pub fn new(records: Vec<VertexRecord>, stride: Option<usize>) -> Self {
        let vertex_count = records.len();
        MeshBuild {
            vertices: VertexBuffer::with_capacity(vertex_count),
            indices: Vec::with_capacity(vertex_count / 3 * 3),
            records,
            next: 0,
            stride: stride.map(|stride| stride.max(1)),
        }
    }

    /// Processes records until the next stride boundary or the end.
    pub fn step(&mut self) -> Progress {
        let vertex_count = self.records.len();
        while self.next < vertex_count {
            let index = self.next;
            self.vertices.push(&self.records[index]);
            if let Some(triangle) = triangle_at(index, vertex_count) {
                self.indices.extend_from_slice(&triangle);
            }
            self.next += 1;

            if matches!(self.stride, Some(stride) if index % stride == 0) {
                return Progress::Yield;
            }
        }

        Progress::Done
    }

    /// Clears `mesh` and repopulates it, then recomputes normals and bounds.
    ///
    /// Must only be called once `step` has returned `Progress::Done`.
    pub fn apply(self, mesh: &mut Mesh) {
        mesh.clear();
        mesh.set_geometry(self.vertices, self.indices);
        mesh.recalculate_normals();
        mesh.recalculate_bounds();
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.records.len()
    }
}

/// Owns the conversion settings shared by every slot's conversion.
pub struct MeshProcessingUnit {
    remap_stride: usize,
    mesh_stride: usize,
    accelerator: Option<Box<dyn Accelerator>>,
}

impl MeshProcessingUnit {
    /// Creates a unit that converts on the CPU, yielding every `remap_stride`
    /// points in the coordinate pass and every `mesh_stride` points in the
    /// mesh build.
    pub fn time_sliced(remap_stride: usize, mesh_stride: usize) -> Self {
        MeshProcessingUnit {
            remap_stride,
            mesh_stride,
            accelerator: None,
        }
    }

    /// Creates a unit that offloads the remap to `accelerator`.
    pub fn accelerated(remap_stride: usize, accelerator: Box<dyn Accelerator>) -> Self {
        MeshProcessingUnit {
            remap_stride,
            mesh_stride: usize::MAX,
            accelerator: Some(accelerator),
        }
    }

    pub fn strategy(&self) -> ProcessingStrategy {
        if self.accelerator.is_some() {
            ProcessingStrategy::Accelerated
        } else {
            ProcessingStrategy::TimeSliced
        }
    }

    /// Starts the coordinate pass for `marker`.
    pub fn begin_packing(&self, marker: &Marker) -> VertexPacking {
        let remap_on_cpu = self.strategy() == ProcessingStrategy::TimeSliced;
        VertexPacking::new(marker.vertex_count(), self.remap_stride, remap_on_cpu)
    }

    /// Runs the accelerator over source-space records. A no-op on the
    /// time-sliced strategy, whose records are already remapped.
    pub fn transform(&mut self, records: &mut [VertexRecord]) -> Result<(), AcceleratorError> {
        match self.accelerator.as_mut() {
            Some(accelerator) => {
                debug!("Using accelerator for {} vertices.", records.len());
                accelerator.remap(records)
            }
            None => Ok(()),
        }
    }

    /// Starts the mesh build for transformed records.
    pub fn begin_build(&self, records: Vec<VertexRecord>) -> MeshBuild {
        let stride = match self.strategy() {
            ProcessingStrategy::TimeSliced => Some(self.mesh_stride),
            ProcessingStrategy::Accelerated => None,
        };
        MeshBuild::new(records, stride)
    }

    /// Converts `marker` into `mesh` in one synchronous call.
    pub fn convert_blocking(
        &mut self,
        marker: &Marker,
        mesh: &mut Mesh,
    ) -> Result<(), AcceleratorError> {
        let mut records = self.begin_packing(marker).run_to_end(marker);
        self.transform(&mut records)?;
        let mut build = self.begin_build(records);
        while build.step() == Progress::Yield {}
        build.apply(mesh);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualizer_state::marker::RawPoint;

    /// Applies the kernel's arithmetic on the CPU.
    struct SoftwareAccelerator {
        dispatches: usize,
    }

    impl Accelerator for SoftwareAccelerator {
        fn remap(&mut self, records: &mut [VertexRecord]) -> Result<(), AcceleratorError> {
            self.dispatches += 1;
            records.iter_mut().for_each(VertexRecord::remap);
            Ok(())
        }
    }

    fn marker_with(n: usize, colors: Vec<RawColor>) -> Marker {
        let points = (0..n)
            .map(|i| RawPoint::new(i as f64 * 0.5, i as f64 * -1.25, i as f64 + 0.1))
            .collect();
        Marker::triangle_list(points, colors)
    }

    #[test]
    fn test_index_length_is_three_times_whole_triangles() {
        for n in 0..20 {
            let expected = if n >= 3 { 3 * (n / 3) } else { 0 };
            assert_eq!(triangulate(n).len(), expected, "n = {}", n);
        }
        assert_eq!(triangulate(7), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_one_or_two_points_produce_no_triangles() {
        let mut unit = MeshProcessingUnit::time_sliced(100, 300);
        for n in 1..3 {
            let mut mesh = Mesh::new();
            unit.convert_blocking(&marker_with(n, Vec::new()), &mut mesh)
                .unwrap();
            assert_eq!(mesh.vertex_count(), n);
            assert!(mesh.indices.is_empty());
        }
    }

    #[test]
    fn test_remap_is_exact() {
        let marker = marker_with(9, Vec::new());
        let mut unit = MeshProcessingUnit::time_sliced(100, 300);
        let mut mesh = Mesh::new();
        unit.convert_blocking(&marker, &mut mesh).unwrap();

        for (point, position) in marker.points.iter().zip(&mesh.positions) {
            assert_eq!(*position, [point.x as f32, point.z as f32, -(point.y as f32)]);
        }
    }

    #[test]
    fn test_last_defined_color_propagates() {
        let red = RawColor::new(1.0, 0.0, 0.0, 1.0);
        let green = RawColor::new(0.0, 1.0, 0.0, 0.5);
        let marker = marker_with(6, vec![red, green]);

        let records = VertexPacking::new(6, 100, true).run_to_end(&marker);
        assert_eq!(records[0].color, red.to_array());
        for record in &records[1..] {
            assert_eq!(record.color, green.to_array());
        }
    }

    #[test]
    fn test_missing_colors_default_to_cyan() {
        let records = VertexPacking::new(4, 100, true).run_to_end(&marker_with(4, Vec::new()));
        assert!(records.iter().all(|r| r.color == RawColor::CYAN.to_array()));
    }

    #[test]
    fn test_packing_yields_before_each_stride_boundary() {
        let marker = marker_with(250, Vec::new());
        let mut packing = VertexPacking::new(250, 100, true);

        let mut yields = 0;
        while packing.step(&marker) == Progress::Yield {
            yields += 1;
        }
        // before points 0, 100 and 200
        assert_eq!(yields, 3);
        assert_eq!(packing.processed(), 250);
    }

    #[test]
    fn test_packing_first_step_touches_nothing() {
        let marker = marker_with(5, Vec::new());
        let mut packing = VertexPacking::new(5, 100, true);
        assert_eq!(packing.step(&marker), Progress::Yield);
        assert_eq!(packing.processed(), 0);
        assert_eq!(packing.step(&marker), Progress::Done);
        assert_eq!(packing.processed(), 5);
    }

    #[test]
    fn test_build_yields_after_each_stride_boundary() {
        let records = VertexPacking::new(601, 100, true).run_to_end(&marker_with(601, Vec::new()));
        let mut build = MeshBuild::new(records, Some(300));

        let mut yields = 0;
        while build.step() == Progress::Yield {
            yields += 1;
        }
        // after points 0, 300 and 600; the last one leaves nothing to do
        assert_eq!(yields, 3);
        assert!(build.is_finished());
    }

    #[test]
    fn test_build_without_stride_is_single_step() {
        let records = VertexPacking::new(1000, 100, true).run_to_end(&marker_with(1000, Vec::new()));
        let mut build = MeshBuild::new(records, None);
        assert_eq!(build.step(), Progress::Done);
    }

    #[test]
    fn test_accelerated_matches_time_sliced() {
        let red = RawColor::new(1.0, 0.0, 0.0, 1.0);
        let marker = marker_with(1000, vec![red; 10]);

        let mut cpu = MeshProcessingUnit::time_sliced(100, 300);
        let mut cpu_mesh = Mesh::new();
        cpu.convert_blocking(&marker, &mut cpu_mesh).unwrap();

        let mut gpu = MeshProcessingUnit::accelerated(
            100,
            Box::new(SoftwareAccelerator { dispatches: 0 }),
        );
        assert_eq!(gpu.strategy(), ProcessingStrategy::Accelerated);
        let mut gpu_mesh = Mesh::new();
        gpu.convert_blocking(&marker, &mut gpu_mesh).unwrap();

        assert_eq!(cpu_mesh, gpu_mesh);
        assert_eq!(gpu_mesh.triangle_count(), 333);
    }

    #[test]
    fn test_accelerated_packing_stays_in_source_space() {
        let marker = marker_with(3, Vec::new());
        let unit = MeshProcessingUnit::accelerated(
            100,
            Box::new(SoftwareAccelerator { dispatches: 0 }),
        );
        let records = unit.begin_packing(&marker).run_to_end(&marker);
        let point = marker.points[2];
        assert_eq!(
            records[2].position,
            [point.x as f32, point.y as f32, point.z as f32]
        );
    }
}
