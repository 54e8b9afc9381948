//! 2D textures and cube maps.
//!
//! Decode failures never abort: the texture object is still created at a
//! fallback size and left unpopulated, so the scene renders with wrong
//! (zeroed) texels instead of crashing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

const FALLBACK_SIZE: u32 = 1;

/// Decoded RGBA8 pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Pixels {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Pixels {
    pub fn solid(color: [f32; 4]) -> Self {
        let rgba = color
            .iter()
            .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        Self {
            width: 1,
            height: 1,
            rgba,
        }
    }
}

/// Decodes an image file into RGBA8.
pub fn decode_rgba8(path: &Path) -> Result<Pixels, String> {
    let img = image::open(path)
        .map_err(|e| format!("Failed to decode image {}: {e}", path.display()))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    Ok(Pixels {
        width,
        height,
        rgba: img.into_raw(),
    })
}

/// Where a texture's pixels come from.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSource {
    File(PathBuf),
    Color([f32; 4]),
}

impl TextureSource {
    /// `None` means the source could not be decoded.
    fn pixels(&self) -> Option<Pixels> {
        match self {
            Self::File(path) => match decode_rgba8(path) {
                Ok(pixels) => Some(pixels),
                Err(e) => {
                    log::error!("{e}");
                    None
                }
            },
            Self::Color(c) => Some(Pixels::solid(*c)),
        }
    }
}

fn format_for(srgb: bool) -> wgpu::TextureFormat {
    if srgb {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    }
}

pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: (u32, u32),
}

impl Texture {
    fn allocate(device: &wgpu::Device, label: &str, width: u32, height: u32, srgb: bool) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: format_for(srgb),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size: (width, height),
        }
    }

    pub fn from_pixels(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        pixels: &Pixels,
        srgb: bool,
    ) -> Self {
        let tex = Self::allocate(device, label, pixels.width, pixels.height, srgb);
        write_layer(queue, &tex.texture, 0, pixels);
        tex
    }

    /// Loads `source`; on decode failure the texture exists but holds no data.
    pub fn load(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        source: &TextureSource,
        srgb: bool,
    ) -> Self {
        match source.pixels() {
            Some(pixels) => Self::from_pixels(device, queue, label, &pixels, srgb),
            None => Self::allocate(device, label, FALLBACK_SIZE, FALLBACK_SIZE, srgb),
        }
    }

    pub fn destroy(&self) {
        self.texture.destroy();
    }
}

fn write_layer(queue: &wgpu::Queue, texture: &wgpu::Texture, layer: u32, pixels: &Pixels) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: 0,
                y: 0,
                z: layer,
            },
            aspect: wgpu::TextureAspect::All,
        },
        &pixels.rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * pixels.width),
            rows_per_image: Some(pixels.height),
        },
        wgpu::Extent3d {
            width: pixels.width,
            height: pixels.height,
            depth_or_array_layers: 1,
        },
    );
}

/// Six-face cube texture, faces in +X, -X, +Y, -Y, +Z, -Z order.
pub struct Cubemap {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl Cubemap {
    /// Faces must share one square size; the first decodable face sets it.
    /// Faces that fail to decode or mismatch are logged and left empty.
    pub fn load(device: &wgpu::Device, queue: &wgpu::Queue, faces: &[TextureSource; 6]) -> Self {
        let decoded: Vec<Option<Pixels>> = faces.iter().map(TextureSource::pixels).collect();
        let size = decoded
            .iter()
            .flatten()
            .map(|p| p.width)
            .next()
            .unwrap_or(FALLBACK_SIZE);

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Skybox Cubemap"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: format_for(true),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (layer, face) in decoded.iter().enumerate() {
            match face {
                Some(p) if p.width == size && p.height == size => {
                    write_layer(queue, &texture, layer as u32, p);
                }
                Some(p) => log::error!(
                    "Skybox face {layer} is {}x{}, expected {size}x{size}",
                    p.width,
                    p.height
                ),
                None => {}
            }
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Skybox Cubemap View"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        Self { texture, view }
    }

    pub fn destroy(&self) {
        self.texture.destroy();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// Named textures referenced by mesh materials.
#[derive(Default)]
pub struct TextureTable {
    textures: Vec<Texture>,
    names: HashMap<String, TextureId>,
}

impl TextureTable {
    pub fn insert(&mut self, name: &str, texture: Texture) -> TextureId {
        let id = TextureId(self.textures.len() as u32);
        self.textures.push(texture);
        if self.names.insert(name.to_string(), id).is_some() {
            log::warn!("Texture name {name} registered twice; the later one wins");
        }
        id
    }

    pub fn id(&self, name: &str) -> Option<TextureId> {
        self.names.get(name).copied()
    }

    pub fn get(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id.0 as usize)
    }

    pub fn contains(&self, id: TextureId) -> bool {
        (id.0 as usize) < self.textures.len()
    }

    pub fn destroy_all(&mut self) {
        for t in self.textures.drain(..) {
            t.destroy();
        }
        self.names.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file_path(name_hint: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "prism_texture_test_{}_{}_{}.png",
            name_hint,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn solid_color_quantizes_to_bytes() {
        let p = Pixels::solid([1.0, 0.5, 0.0, 2.0]);
        assert_eq!((p.width, p.height), (1, 1));
        assert_eq!(p.rgba, vec![255, 128, 0, 255]);
    }

    #[test]
    fn decodes_png_written_to_disk() {
        let path = temp_file_path("decode");
        let img = image::RgbaImage::from_fn(3, 2, |x, y| image::Rgba([x as u8, y as u8, 7, 255]));
        img.save(&path).expect("write png");

        let pixels = decode_rgba8(&path).expect("should decode");
        assert_eq!((pixels.width, pixels.height), (3, 2));
        assert_eq!(pixels.rgba.len(), 3 * 2 * 4);
        assert_eq!(&pixels.rgba[4..8], &[1, 0, 7, 255]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file_is_an_error_not_a_panic() {
        let path = temp_file_path("missing");
        let err = decode_rgba8(&path).expect_err("should fail");
        assert!(err.contains("Failed to decode image"));
        assert!(TextureSource::File(path).pixels().is_none());
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let path = temp_file_path("garbage");
        std::fs::write(&path, b"not a png").expect("write temp file");
        assert!(decode_rgba8(&path).is_err());
        let _ = std::fs::remove_file(path);
    }
}
