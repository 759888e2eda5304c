use std::path::Path;
use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::Allocator;

use crate::renderer::core::transfer::TransferContext;
use crate::renderer::error::{creation, RenderError};
use crate::renderer::resources::image::Image;

/// A sampled material map: device-local image plus the sampler it is read
/// through.
pub struct Texture {
    pub image: Image,
    pub sampler: vk::Sampler,
    device: Arc<ash::Device>,
}

impl Texture {
    /// Uploads raw RGBA8 pixels. `max_anisotropy` comes from the device's
    /// reported limits.
    pub fn from_pixels(
        pixels: &[u8],
        width: u32,
        height: u32,
        max_anisotropy: f32,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
        transfer: &TransferContext,
    ) -> Result<Self, RenderError> {
        let image = Image::new_color_image(
            pixels,
            width,
            height,
            memory_allocator,
            device.clone(),
            transfer,
        )?;
        let sampler = create_sampler(&device, max_anisotropy)?;
        Ok(Self {
            image,
            sampler,
            device,
        })
    }

    /// Decodes an image file and uploads it. Failure to read or decode is
    /// fatal, like every other asset failure.
    pub fn from_file(
        path: &Path,
        max_anisotropy: f32,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
        transfer: &TransferContext,
    ) -> Result<Self, RenderError> {
        let (pixels, width, height) = read_rgba(path)?;
        Self::from_pixels(
            &pixels,
            width,
            height,
            max_anisotropy,
            memory_allocator,
            device,
            transfer,
        )
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Reads an image file and decodes it into tightly packed RGBA8.
fn read_rgba(path: &Path) -> Result<(Vec<u8>, u32, u32), RenderError> {
    let bytes = std::fs::read(path).map_err(|source| RenderError::asset(path, source))?;
    decode_rgba(&bytes, path)
}

/// Decodes any supported image format into tightly packed RGBA8.
fn decode_rgba(bytes: &[u8], path: &Path) -> Result<(Vec<u8>, u32, u32), RenderError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|source| RenderError::asset(path, source))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    Ok((decoded.into_raw(), width, height))
}

fn create_sampler(device: &ash::Device, max_anisotropy: f32) -> Result<vk::Sampler, RenderError> {
    let info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(max_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR);
    unsafe {
        device
            .create_sampler(&info, None)
            .map_err(creation("texture sampler"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn decode_recovers_dimensions_and_pixel_count() {
        let mut encoded = Vec::new();
        let source = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        source
            .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
            .unwrap();

        let (pixels, width, height) =
            decode_rgba(&encoded, Path::new("test.png")).unwrap();
        assert_eq!((width, height), (3, 2));
        assert_eq!(pixels.len(), 3 * 2 * 4);
        assert_eq!(&pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn garbage_bytes_are_an_asset_failure() {
        let err = decode_rgba(&[0, 1, 2, 3], Path::new("broken.png")).unwrap_err();
        assert!(matches!(err, RenderError::Asset { .. }));
    }

    #[test]
    fn material_file_round_trips_through_disk() {
        let mut encoded = Vec::new();
        let source = image::RgbaImage::from_pixel(2, 2, image::Rgba([200, 100, 50, 255]));
        source
            .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
            .unwrap();

        let path = std::env::temp_dir().join("kiln-material-roundtrip.png");
        std::fs::write(&path, &encoded).unwrap();
        let (pixels, width, height) = read_rgba(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!((width, height), (2, 2));
        assert_eq!(&pixels[..4], &[200, 100, 50, 255]);
    }

    #[test]
    fn missing_material_file_is_an_asset_failure() {
        let err = read_rgba(Path::new("no-such-material.png")).unwrap_err();
        assert!(matches!(err, RenderError::Asset { .. }));
        assert!(err.to_string().contains("no-such-material.png"));
    }
}
