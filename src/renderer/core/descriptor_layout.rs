use ash::vk;

use crate::renderer::core::support::DestroyGuard;
use crate::renderer::error::{creation, RenderError};

/// Builds a descriptor-set layout with binding indices assigned in
/// insertion order, starting at 0. The sequence is fixed at build time and
/// never reordered or renumbered.
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    pub fn add_binding(
        mut self,
        descriptor_type: vk::DescriptorType,
        descriptor_count: u32,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        let binding = vk::DescriptorSetLayoutBinding::default()
            .binding(self.bindings.len() as u32)
            .descriptor_type(descriptor_type)
            .descriptor_count(descriptor_count)
            .stage_flags(stages);
        self.bindings.push(binding);
        self
    }

    pub fn build(self, device: &ash::Device) -> Result<vk::DescriptorSetLayout, RenderError> {
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);
        unsafe {
            device
                .create_descriptor_set_layout(&info, None)
                .map_err(creation("descriptor set layout"))
        }
    }

    #[cfg(test)]
    fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }
}

/// The engine's per-draw binding declaration: transform uniform buffer,
/// five material maps, and the light list.
///
/// The shape is fixed at seven bindings per draw call. That is a known
/// scaling limit: moving materials to a descriptor-indexed set is the
/// planned replacement, which is what the device's reserved
/// descriptor-indexing features are for.
pub struct BindingLayout {
    pub layout: vk::DescriptorSetLayout,
    teardown: DestroyGuard,
}

const MATERIAL_MAP_COUNT: usize = 5;

impl BindingLayout {
    pub fn new(device: &ash::Device) -> Result<Self, RenderError> {
        let layout = Self::engine_bindings().build(device)?;
        Ok(Self {
            layout,
            teardown: DestroyGuard::default(),
        })
    }

    /// Binding 0: per-draw transforms, vertex stage. Bindings 1-5:
    /// diffuse, normal, roughness, metallic, and ambient-occlusion maps,
    /// fragment stage. Binding 6: variable-length light list, fragment
    /// stage.
    fn engine_bindings() -> DescriptorSetLayoutBuilder {
        let mut builder = DescriptorSetLayoutBuilder::new().add_binding(
            vk::DescriptorType::UNIFORM_BUFFER,
            1,
            vk::ShaderStageFlags::VERTEX,
        );
        for _ in 0..MATERIAL_MAP_COUNT {
            builder = builder.add_binding(
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                1,
                vk::ShaderStageFlags::FRAGMENT,
            );
        }
        builder.add_binding(
            vk::DescriptorType::STORAGE_BUFFER,
            1,
            vk::ShaderStageFlags::FRAGMENT,
        )
    }

    /// Must run after the pipeline layout referencing this layout is gone,
    /// and before the logical device.
    pub fn destroy(&mut self, device: &ash::Device) {
        if !self.teardown.arm() {
            return;
        }
        unsafe {
            device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assigns_sequential_indices() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_binding(
                vk::DescriptorType::UNIFORM_BUFFER,
                1,
                vk::ShaderStageFlags::VERTEX,
            )
            .add_binding(
                vk::DescriptorType::STORAGE_BUFFER,
                1,
                vk::ShaderStageFlags::FRAGMENT,
            )
            .add_binding(
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                4,
                vk::ShaderStageFlags::FRAGMENT,
            );

        let indices = builder
            .bindings()
            .iter()
            .map(|binding| binding.binding)
            .collect::<Vec<_>>();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn engine_layout_has_the_fixed_seven_binding_shape() {
        let builder = BindingLayout::engine_bindings();
        let bindings = builder.bindings();
        assert_eq!(bindings.len(), 7);

        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::VERTEX);

        for binding in &bindings[1..6] {
            assert_eq!(
                binding.descriptor_type,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            );
            assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
            assert_eq!(binding.descriptor_count, 1);
        }

        assert_eq!(bindings[6].descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(bindings[6].stage_flags, vk::ShaderStageFlags::FRAGMENT);

        let indices = bindings.iter().map(|b| b.binding).collect::<Vec<_>>();
        assert_eq!(indices, (0..7).collect::<Vec<_>>());
    }
}
