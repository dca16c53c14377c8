//! Vertex data structures and layouts for marker meshes.
//!
//! `VertexRecord` is the unit the pipeline moves in bulk: it is what the
//! coordinate pass produces, what the accelerator uploads and downloads, and
//! what a render sink may upload as an interleaved vertex buffer.

use crate::visualizer_state::marker::{RawColor, RawPoint};

/// A packed position + color pair.
///
/// # Memory Layout
/// - Position: 3x f32 (12 bytes)
/// - Color: 4x f32 (16 bytes)
///
/// Total size: 28 bytes, seven floats with no padding. The accelerator kernel
/// indexes the buffer with a stride of seven floats, so this layout is part of
/// its contract.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VertexRecord {
    /// Position, either in source space or already remapped
    pub position: [f32; 3],
    /// RGBA color, 0-1
    pub color: [f32; 4],
}

/// Number of floats in one packed record.
pub const FLOATS_PER_RECORD: usize = 7;

impl VertexRecord {
    /// Packs a source point without remapping it.
    ///
    /// The `f64` to `f32` narrowing happens here for both execution strategies,
    /// which keeps the CPU and accelerator results bit-identical.
    pub fn from_source(point: &RawPoint, color: RawColor) -> Self {
        VertexRecord {
            position: [point.x as f32, point.y as f32, point.z as f32],
            color: color.to_array(),
        }
    }

    /// Packs a source point and remaps it into target space.
    pub fn remapped(point: &RawPoint, color: RawColor) -> Self {
        let mut record = Self::from_source(point, color);
        record.remap();
        record
    }

    /// Applies the fixed source to target remap in place: `(x, y, z)` becomes
    /// `(x, z, -y)`.
    pub fn remap(&mut self) {
        let [x, y, z] = self.position;
        self.position = [x, z, -y];
    }
}

/// Parallel position and color arrays, same length, index-addressable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexBuffer {
    pub positions: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 4]>,
}

impl VertexBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        VertexBuffer {
            positions: Vec::with_capacity(capacity),
            colors: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: &VertexRecord) {
        self.positions.push(record.position);
        self.colors.push(record.color);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Triangle index buffer; every consecutive triple is one triangle.
pub type TriangleIndex = Vec<u32>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_seven_packed_floats() {
        assert_eq!(
            std::mem::size_of::<VertexRecord>(),
            FLOATS_PER_RECORD * std::mem::size_of::<f32>()
        );
    }

    #[test]
    fn test_remap_swaps_up_axis_and_inverts() {
        let record = VertexRecord::remapped(&RawPoint::new(1.5, -2.25, 3.0), RawColor::CYAN);
        assert_eq!(record.position, [1.5, 3.0, 2.25]);
        assert_eq!(record.color, [0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_remap_narrows_before_negating() {
        let point = RawPoint::new(0.1, 0.1, 0.1);
        let record = VertexRecord::remapped(&point, RawColor::CYAN);
        assert_eq!(record.position[2].to_bits(), (-(0.1f64 as f32)).to_bits());
    }
}
