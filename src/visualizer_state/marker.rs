//! Marker messages as delivered by the transport.
//!
//! The layout mirrors the ROS `visualization_msgs/Marker` fields the pipeline
//! consumes: a type discriminant, a point list in source space (`f64`) and an
//! optional parallel color list (`f32`, 0-1). Everything else on the wire is
//! the transport's business.

use serde::{Deserialize, Serialize};

/// A point in source coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RawPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl RawPoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        RawPoint { x, y, z }
    }
}

/// An RGBA color with channels in the 0-1 range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl RawColor {
    /// Color used for every point of a marker that carries no colors at all.
    pub const CYAN: RawColor = RawColor {
        r: 0.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };

    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        RawColor { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for RawColor {
    fn default() -> Self {
        RawColor::CYAN
    }
}

/// Marker type discriminant, numbered as in ROS.
///
/// Kept as an open newtype so unknown discriminants survive deserialization
/// and are rejected by the dispatch loop instead of the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerType(pub i32);

impl MarkerType {
    pub const ARROW: MarkerType = MarkerType(0);
    pub const CUBE: MarkerType = MarkerType(1);
    pub const SPHERE: MarkerType = MarkerType(2);
    pub const CYLINDER: MarkerType = MarkerType(3);
    pub const LINE_STRIP: MarkerType = MarkerType(4);
    pub const LINE_LIST: MarkerType = MarkerType(5);
    pub const CUBE_LIST: MarkerType = MarkerType(6);
    pub const SPHERE_LIST: MarkerType = MarkerType(7);
    pub const POINTS: MarkerType = MarkerType(8);
    pub const TEXT_VIEW_FACING: MarkerType = MarkerType(9);
    pub const MESH_RESOURCE: MarkerType = MarkerType(10);
    pub const TRIANGLE_LIST: MarkerType = MarkerType(11);
}

/// One triangle-list point cloud inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    #[serde(rename = "type")]
    pub marker_type: MarkerType,
    #[serde(default)]
    pub points: Vec<RawPoint>,
    #[serde(default)]
    pub colors: Vec<RawColor>,
}

impl Marker {
    pub fn triangle_list(points: Vec<RawPoint>, colors: Vec<RawColor>) -> Self {
        Marker {
            marker_type: MarkerType::TRIANGLE_LIST,
            points,
            colors,
        }
    }

    /// Whether the dispatch loop may start a conversion for this marker.
    pub fn is_renderable(&self) -> bool {
        self.marker_type == MarkerType::TRIANGLE_LIST && !self.points.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.points.len()
    }
}

/// The atomic set of markers delivered by one ingress push.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarkerBatch {
    pub markers: Vec<Marker>,
}

impl MarkerBatch {
    pub fn new(markers: Vec<Marker>) -> Self {
        MarkerBatch { markers }
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }
}
