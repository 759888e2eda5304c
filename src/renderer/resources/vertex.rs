use std::hash::{Hash, Hasher};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Interleaved vertex record matching the mesh shader's input block.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub tex_coord: Vec2,
    pub normal: Vec3,
}

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
        [
            vk::VertexInputAttributeDescription::default()
                .location(0)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(std::mem::offset_of!(Vertex, position) as u32),
            vk::VertexInputAttributeDescription::default()
                .location(1)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(std::mem::offset_of!(Vertex, color) as u32),
            vk::VertexInputAttributeDescription::default()
                .location(2)
                .binding(0)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(std::mem::offset_of!(Vertex, tex_coord) as u32),
            vk::VertexInputAttributeDescription::default()
                .location(3)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(std::mem::offset_of!(Vertex, normal) as u32),
        ]
    }
}

// Deduplication identity: two records are the same vertex when position,
// color, and texture coordinate agree. The normal is excluded so that
// faces meeting at a shared corner collapse into one record.
impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
            && self.color == other.color
            && self.tex_coord == other.tex_coord
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for float in self.position.to_array() {
            float.to_bits().hash(state);
        }
        for float in self.color.to_array() {
            float.to_bits().hash(state);
        }
        for float in self.tex_coord.to_array() {
            float.to_bits().hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn base() -> Vertex {
        Vertex {
            position: Vec3::new(1.0, 2.0, 3.0),
            color: Vec3::new(0.5, 0.5, 0.5),
            tex_coord: Vec2::new(0.25, 0.75),
            normal: Vec3::Z,
        }
    }

    fn hash_of(vertex: &Vertex) -> u64 {
        let mut hasher = DefaultHasher::new();
        vertex.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn normals_do_not_split_vertices() {
        let a = base();
        let b = Vertex { normal: Vec3::NEG_X, ..base() };
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn position_distinguishes_vertices() {
        let a = base();
        let b = Vertex { position: Vec3::new(1.0, 2.0, 3.5), ..base() };
        assert_ne!(a, b);
    }

    #[test]
    fn color_distinguishes_vertices() {
        let a = base();
        let b = Vertex { color: Vec3::new(0.5, 0.4, 0.5), ..base() };
        assert_ne!(a, b);
    }

    #[test]
    fn tex_coord_distinguishes_vertices() {
        let a = base();
        let b = Vertex { tex_coord: Vec2::new(0.25, 0.5), ..base() };
        assert_ne!(a, b);
    }

    #[test]
    fn attribute_layout_matches_record() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 44);

        let attributes = Vertex::attribute_descriptions();
        assert_eq!(attributes.len(), 4);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[2].offset, 24);
        assert_eq!(attributes[3].offset, 32);
    }
}
