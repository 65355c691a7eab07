use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::warn;

use crate::entity::{ImageData, RenderableEntity};
use crate::error::InspectError;

/// Monotonic source of context generations; each [`TextureManager`]
/// samples one at construction. Handles stamped with an older generation
/// are stale.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// GPU-resident texture handle owned by an entity. Valid only while the
/// generation matches the live manager's; never persisted.
#[derive(Debug, Clone)]
pub struct GpuTexture {
    pub generation: u64,
    pub bind_group: Arc<wgpu::BindGroup>,
}

/// Uploads decoded images to the GPU, one texture per entity.
///
/// Owns the texture bind-group layout, the shared sampler, and a 1x1 white
/// fallback used whenever an entity has no usable texture.
pub struct TextureManager {
    generation: u64,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    fallback: Arc<wgpu::BindGroup>,
}

impl TextureManager {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("entity-texture-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("entity-texture-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let white = ImageData {
            width: 1,
            height: 1,
            pixels: vec![255, 255, 255, 255],
        };
        let fallback = Arc::new(
            build_bind_group(device, queue, &layout, &sampler, &white, "no-texture")
                .expect("1x1 fallback texture is always valid"),
        );

        Self {
            generation,
            layout,
            sampler,
            fallback,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    /// Bind group drawn when an entity has no texture (or no UVs).
    pub fn fallback(&self) -> Arc<wgpu::BindGroup> {
        Arc::clone(&self.fallback)
    }

    /// Uploads the entity's image, idempotently per context generation.
    ///
    /// No-op without image data. On failure the handle is cleared so the
    /// entity renders untextured; nothing propagates to the caller.
    pub fn upload(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        entity: &mut RenderableEntity,
    ) {
        if !needs_upload(entity, self.generation) {
            return;
        }
        let image = entity.texture_image.as_ref().expect("checked by needs_upload");
        match build_bind_group(device, queue, &self.layout, &self.sampler, image, &entity.name) {
            Ok(bind_group) => {
                entity.gpu_texture = Some(GpuTexture {
                    generation: self.generation,
                    bind_group: Arc::new(bind_group),
                });
            }
            Err(reason) => {
                warn!(
                    "{}",
                    InspectError::TextureUpload {
                        name: entity.name.clone(),
                        reason,
                    }
                );
                entity.gpu_texture = None;
            }
        }
    }
}

/// True when the entity has image data and no handle for `generation`.
fn needs_upload(entity: &RenderableEntity, generation: u64) -> bool {
    if entity.texture_image.is_none() {
        return false;
    }
    entity
        .gpu_texture
        .as_ref()
        .map_or(true, |texture| texture.generation != generation)
}

fn build_bind_group(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    image: &ImageData,
    label: &str,
) -> Result<wgpu::BindGroup, String> {
    if image.width == 0 || image.height == 0 {
        return Err(format!("image has zero area ({}x{})", image.width, image.height));
    }
    let expected = (image.width as usize)
        .checked_mul(image.height as usize)
        .and_then(|count| count.checked_mul(4))
        .ok_or_else(|| "image dimensions overflow".to_string())?;
    if image.pixels.len() != expected {
        return Err(format!(
            "pixel buffer length {} does not match {}x{} RGBA",
            image.pixels.len(),
            image.width,
            image.height
        ));
    }

    let size = wgpu::Extent3d {
        width: image.width,
        height: image.height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    // Rows are packed tight; write_texture takes the exact byte pitch.
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &image.pixels,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * image.width),
            rows_per_image: Some(image.height),
        },
        size,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::RenderableEntity;

    fn image_entity() -> RenderableEntity {
        RenderableEntity::texture(
            "skin",
            Arc::new(ImageData {
                width: 1,
                height: 1,
                pixels: vec![0, 0, 0, 255],
            }),
            None,
        )
    }

    #[test]
    fn entities_without_images_never_need_uploads() {
        let entity = RenderableEntity::script("notes", test_raw());
        assert!(!needs_upload(&entity, 1));
    }

    #[test]
    fn entities_with_images_need_an_initial_upload() {
        let entity = image_entity();
        assert!(needs_upload(&entity, 1));
    }

    fn test_raw() -> Arc<crate::archive::ArchiveObject> {
        use crate::archive::{ArchiveObject, ObjectContent, TypeTag};
        Arc::new(ArchiveObject::new(1, TypeTag::TextAsset, None, || {
            Ok(ObjectContent::Text(String::new()))
        }))
    }
}
