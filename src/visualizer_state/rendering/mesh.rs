//! The destination mesh object a render slot owns.
//!
//! A `Mesh` is what gets committed to a render target: positions, per-vertex
//! colors, the triangle index buffer, and the normals and bounds derived from
//! them. It is cleared and repopulated in place by every conversion.

use cgmath::{InnerSpace, Point3, Vector3, Zero};

use super::vertex::{TriangleIndex, VertexBuffer};

/// Axis-aligned bounding box in target space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    /// A degenerate box at the origin, the bounds of an empty mesh.
    pub fn empty() -> Self {
        Aabb {
            min: Point3::new(0.0, 0.0, 0.0),
            max: Point3::new(0.0, 0.0, 0.0),
        }
    }

    pub fn center(&self) -> Point3<f32> {
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Aabb::empty()
    }
}

/// A renderable triangle mesh with flat per-vertex color.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// Vertex positions in target space
    pub positions: Vec<[f32; 3]>,
    /// RGBA color per vertex
    pub colors: Vec<[f32; 4]>,
    /// Triangle indices, length is a multiple of three
    pub indices: TriangleIndex,
    /// Per-vertex normals, recomputed from the triangles
    pub normals: Vec<[f32; 3]>,
    /// Bounds over every vertex, referenced or not
    pub bounds: Aabb,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all geometry while keeping allocations for the next conversion.
    pub fn clear(&mut self) {
        self.positions.clear();
        self.colors.clear();
        self.indices.clear();
        self.normals.clear();
        self.bounds = Aabb::empty();
    }

    /// Replaces the vertex arrays and the index buffer.
    ///
    /// Normals and bounds are left stale until `recalculate_normals` and
    /// `recalculate_bounds` are called.
    pub fn set_geometry(&mut self, vertices: VertexBuffer, indices: TriangleIndex) {
        self.positions = vertices.positions;
        self.colors = vertices.colors;
        self.indices = indices;
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Recomputes per-vertex normals as the normalized sum of the
    /// area-weighted face normals touching each vertex.
    ///
    /// Vertices not referenced by any triangle, or only by degenerate ones,
    /// get a zero normal.
    pub fn recalculate_normals(&mut self) {
        let mut accumulated = vec![Vector3::<f32>::zero(); self.positions.len()];

        for triangle in self.indices.chunks_exact(3) {
            let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
            let (pa, pb, pc) = (
                Point3::from(self.positions[a]),
                Point3::from(self.positions[b]),
                Point3::from(self.positions[c]),
            );
            let face_normal = (pb - pa).cross(pc - pa);
            accumulated[a] += face_normal;
            accumulated[b] += face_normal;
            accumulated[c] += face_normal;
        }

        self.normals = accumulated
            .into_iter()
            .map(|normal| {
                if normal.magnitude2() > 0.0 {
                    normal.normalize().into()
                } else {
                    [0.0, 0.0, 0.0]
                }
            })
            .collect();
    }

    /// Recomputes the bounding box over all vertex positions.
    pub fn recalculate_bounds(&mut self) {
        let mut positions = self.positions.iter();
        let Some(first) = positions.next() else {
            self.bounds = Aabb::empty();
            return;
        };

        let mut min = Point3::from(*first);
        let mut max = min;
        for position in positions {
            min.x = min.x.min(position[0]);
            min.y = min.y.min(position[1]);
            min.z = min.z.min(position[2]);
            max.x = max.x.max(position[0]);
            max.y = max.y.max(position[1]);
            max.z = max.z.max(position[2]);
        }

        self.bounds = Aabb { min, max };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_triangle() -> Mesh {
        let mut mesh = Mesh::new();
        let vertices = VertexBuffer {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [5.0, 5.0, 5.0]],
            colors: vec![[1.0; 4]; 4],
        };
        mesh.set_geometry(vertices, vec![0, 1, 2]);
        mesh
    }

    #[test]
    fn test_normals_follow_winding() {
        let mut mesh = single_triangle();
        mesh.recalculate_normals();

        assert_eq!(mesh.normals.len(), 4);
        for normal in &mesh.normals[..3] {
            assert_eq!(*normal, [0.0, 0.0, 1.0]);
        }
        // unreferenced
        assert_eq!(mesh.normals[3], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_bounds_cover_unreferenced_vertices() {
        let mut mesh = single_triangle();
        mesh.recalculate_bounds();

        assert_eq!(mesh.bounds.min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(mesh.bounds.max, Point3::new(5.0, 5.0, 5.0));
        assert_eq!(mesh.bounds.center(), Point3::new(2.5, 2.5, 2.5));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut mesh = single_triangle();
        mesh.recalculate_normals();
        mesh.recalculate_bounds();
        mesh.clear();

        assert_eq!(mesh, Mesh::new());
        assert_eq!(mesh.triangle_count(), 0);
    }
}
