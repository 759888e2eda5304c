use std::collections::HashMap;
use glam::{Vec2, Vec3};
use crate::renderer::resources::vertex::Vertex;

/// Indexed triangle list with deduplicated vertices.
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Builds an indexed mesh from a raw triangle-list vertex stream,
    /// collapsing records that compare equal under the vertex identity.
    pub fn deduplicated(raw: impl IntoIterator<Item = Vertex>) -> Self {
        let mut unique = HashMap::new();
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for vertex in raw {
            if let Some(&index) = unique.get(&vertex) {
                indices.push(index);
            } else {
                let index = vertices.len() as u32;
                unique.insert(vertex, index);
                vertices.push(vertex);
                indices.push(index);
            }
        }

        Self { vertices, indices }
    }

    /// Concatenates meshes into one, rebasing indices past the vertices
    /// already merged in.
    pub fn merged(meshes: impl IntoIterator<Item = Mesh>) -> Self {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for mesh in meshes {
            let base = vertices.len() as u32;
            vertices.extend(mesh.vertices);
            indices.extend(mesh.indices.into_iter().map(|index| base + index));
        }

        Self { vertices, indices }
    }

    /// Axis-aligned cube with per-face colors and normals, used as the
    /// stand-in model until asset loading is wired up.
    pub fn cube(half_extent: f32) -> Self {
        let h = half_extent;
        let faces: [(Vec3, Vec3, Vec3, Vec3); 6] = [
            // (normal, tangent u, tangent v, face color)
            (Vec3::X, Vec3::NEG_Z, Vec3::Y, Vec3::new(0.9, 0.2, 0.2)),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y, Vec3::new(0.2, 0.9, 0.2)),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z, Vec3::new(0.2, 0.2, 0.9)),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z, Vec3::new(0.9, 0.9, 0.2)),
            (Vec3::Z, Vec3::X, Vec3::Y, Vec3::new(0.2, 0.9, 0.9)),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y, Vec3::new(0.9, 0.2, 0.9)),
        ];

        let mut raw = Vec::with_capacity(faces.len() * 6);
        for (normal, u, v, color) in faces {
            let center = normal * h;
            let corner = |su: f32, sv: f32| Vertex {
                position: center + u * (su * h) + v * (sv * h),
                color,
                tex_coord: Vec2::new((su + 1.0) * 0.5, (sv + 1.0) * 0.5),
                normal,
            };
            let quad = [
                corner(-1.0, -1.0),
                corner(1.0, -1.0),
                corner(1.0, 1.0),
                corner(-1.0, 1.0),
            ];
            for index in [0, 1, 2, 2, 3, 0] {
                raw.push(quad[index]);
            }
        }

        Self::deduplicated(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(position: Vec3, normal: Vec3) -> Vertex {
        Vertex {
            position,
            color: Vec3::ONE,
            tex_coord: Vec2::ZERO,
            normal,
        }
    }

    #[test]
    fn deduplication_merges_equal_records() {
        let mesh = Mesh::deduplicated([
            vertex(Vec3::ZERO, Vec3::X),
            vertex(Vec3::ONE, Vec3::X),
            // Same position/color/uv as the first record; only the normal
            // differs, so it must reuse index 0.
            vertex(Vec3::ZERO, Vec3::Y),
        ]);

        assert_eq!(mesh.vertices.len(), 2);
        assert_eq!(mesh.indices, vec![0, 1, 0]);
    }

    #[test]
    fn merged_rebases_indices() {
        let a = Mesh {
            vertices: vec![vertex(Vec3::ZERO, Vec3::X), vertex(Vec3::ONE, Vec3::X)],
            indices: vec![0, 1, 1],
        };
        let b = Mesh {
            vertices: vec![vertex(Vec3::NEG_ONE, Vec3::X)],
            indices: vec![0, 0, 0],
        };

        let merged = Mesh::merged([a, b]);
        assert_eq!(merged.vertices.len(), 3);
        assert_eq!(merged.indices, vec![0, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn cube_is_indexed_per_face() {
        let cube = Mesh::cube(0.5);
        // Six faces of two triangles each; corners shared within a face,
        // but distinct face colors keep faces from merging across edges.
        assert_eq!(cube.indices.len(), 36);
        assert_eq!(cube.vertices.len(), 24);
    }
}
