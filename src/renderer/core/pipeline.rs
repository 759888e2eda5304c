use std::path::Path;

use ash::vk;

use crate::renderer::core::descriptor_layout::BindingLayout;
use crate::renderer::core::render_pass::RenderTargetPass;
use crate::renderer::core::support::DestroyGuard;
use crate::renderer::error::{creation, RenderError};
use crate::renderer::resources::vertex::Vertex;

/// The compiled, immutable combination of shader stages and fixed-function
/// draw state, plus the pipeline layout used to bind resources at draw
/// time. Both are created together and destroyed together.
pub struct Pipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    teardown: DestroyGuard,
}

impl Pipeline {
    pub fn new(
        device: &ash::Device,
        shaders_dir: &Path,
        extent: vk::Extent2D,
        render_pass: &RenderTargetPass,
        binding_layout: &BindingLayout,
    ) -> Result<Self, RenderError> {
        let vert_module = load_shader_module(device, &shaders_dir.join("mesh.vert.spv"))?;
        let frag_module = match load_shader_module(device, &shaders_dir.join("mesh.frag.spv")) {
            Ok(module) => module,
            Err(err) => {
                unsafe {
                    device.destroy_shader_module(vert_module, None);
                }
                return Err(err);
            }
        };

        let result = Self::build(
            device,
            vert_module,
            frag_module,
            extent,
            render_pass,
            binding_layout,
        );

        // The modules are only inputs to pipeline compilation; they are
        // not needed once the pipeline exists, and not worth keeping on
        // failure either.
        unsafe {
            device.destroy_shader_module(vert_module, None);
            device.destroy_shader_module(frag_module, None);
        }

        result
    }

    fn build(
        device: &ash::Device,
        vert_module: vk::ShaderModule,
        frag_module: vk::ShaderModule,
        extent: vk::Extent2D,
        render_pass: &RenderTargetPass,
        binding_layout: &BindingLayout,
    ) -> Result<Self, RenderError> {
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(c"main"),
        ];

        let binding_descriptions = [Vertex::binding_description()];
        let attribute_descriptions = Vertex::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false)
            .alpha_to_coverage_enable(false);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let blend_attachments = [color_blend_attachment()];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let set_layouts = [binding_layout.layout];
        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(creation("pipeline layout"))?
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .layout(layout)
            .render_pass(render_pass.pass)
            .subpass(0);

        let compiled = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        let pipeline = match compiled {
            Ok(pipelines) => pipelines[0],
            Err((_, source)) => {
                unsafe {
                    device.destroy_pipeline_layout(layout, None);
                }
                return Err(creation("graphics pipeline")(source));
            }
        };

        Ok(Self {
            pipeline,
            layout,
            teardown: DestroyGuard::default(),
        })
    }

    /// Destroys the pipeline, then its layout. Must run before the render
    /// pass and binding layout it was compiled against.
    pub fn destroy(&mut self, device: &ash::Device) {
        if !self.teardown.arm() {
            return;
        }
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Standard alpha blending over all four channels: source-alpha weighted
/// color, pass-through alpha.
fn color_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
}

/// Reads a compiled SPIR-V binary and wraps it in a shader module.
fn load_shader_module(
    device: &ash::Device,
    path: &Path,
) -> Result<vk::ShaderModule, RenderError> {
    let code = load_spirv(path)?;
    let info = vk::ShaderModuleCreateInfo::default().code(&code);
    unsafe {
        device
            .create_shader_module(&info, None)
            .map_err(creation("shader module"))
    }
}

/// Reads a SPIR-V file into words, rejecting binaries whose length is not
/// word-aligned or that lack the magic number.
fn load_spirv(path: &Path) -> Result<Vec<u32>, RenderError> {
    let mut file = std::fs::File::open(path).map_err(|source| RenderError::asset(path, source))?;
    ash::util::read_spv(&mut file).map_err(|source| RenderError::asset(path, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_state_uses_standard_alpha_factors() {
        let state = color_blend_attachment();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            state.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
        assert_eq!(state.src_alpha_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(state.dst_alpha_blend_factor, vk::BlendFactor::ZERO);
    }

    #[test]
    fn missing_shader_binary_is_an_asset_failure() {
        let err = load_spirv(Path::new("shaders-built/does-not-exist.spv")).unwrap_err();
        assert!(matches!(err, RenderError::Asset { .. }));
        assert!(err.to_string().contains("does-not-exist.spv"));
    }

    #[test]
    fn truncated_shader_binary_is_an_asset_failure() {
        // Length not divisible by the SPIR-V word size.
        let path = std::env::temp_dir().join("kiln-truncated-shader.spv");
        std::fs::write(&path, [0u8; 6]).unwrap();
        let err = load_spirv(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, RenderError::Asset { .. }));
    }

    #[test]
    fn shader_binary_without_magic_is_an_asset_failure() {
        let path = std::env::temp_dir().join("kiln-unmagical-shader.spv");
        std::fs::write(&path, [0u8; 8]).unwrap();
        let err = load_spirv(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, RenderError::Asset { .. }));
    }
}
