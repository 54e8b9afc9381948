use std::sync::Arc;
use winit::window::Window;

pub struct GpuContext {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub surface_format: wgpu::TextureFormat,
    pub size: (u32, u32),
}

/// What the frame loop does after failing to acquire a surface texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRecovery {
    /// Reconfigure with the current size and skip this frame.
    Reconfigure,
    SkipFrame,
    Fatal,
}

impl SurfaceRecovery {
    pub fn for_error(err: &wgpu::SurfaceError) -> Self {
        match err {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => Self::Reconfigure,
            wgpu::SurfaceError::OutOfMemory => Self::Fatal,
            _ => Self::SkipFrame,
        }
    }
}

/// Gamma is applied by the composite pass, so a linear swapchain format wins
/// over the platform's preferred one.
pub fn pick_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .copied()
        .find(|f| !f.is_srgb())
        .or_else(|| formats.first().copied())
}

impl GpuContext {
    /// Missing adapter, device or surface support is fatal.
    pub fn new(window: Arc<Window>) -> Self {
        let inner = window.inner_size();
        let size = (inner.width.max(1), inner.height.max(1));
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .expect("Failed to create surface");

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .expect("No GPU adapter can present to this window");
        let info = adapter.get_info();
        log::info!("GPU adapter: {} ({:?})", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Prism Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            },
            None,
        ))
        .expect("Failed to create device");

        let caps = surface.get_capabilities(&adapter);
        let surface_format =
            pick_surface_format(&caps.formats).expect("Surface reports no texture formats");
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        log::info!("Surface format: {surface_format:?}, alpha {alpha_mode:?}");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.0,
            height: size.1,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: Vec::new(),
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Self {
            surface,
            device,
            queue,
            config,
            surface_format,
            size,
        }
    }

    /// Zero extents (a minimized window) keep the previous configuration.
    /// Returns whether the surface was reconfigured.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 || (width, height) == self.size {
            return false;
        }
        self.size = (width, height);
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        true
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.size.0 as f32 / self.size.1 as f32
    }

    /// Acquires the next swapchain texture, or `None` when this frame should
    /// be skipped. Running out of GPU memory is fatal.
    pub fn begin_frame(&self) -> Option<(wgpu::SurfaceTexture, wgpu::TextureView)> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(err) => {
                match SurfaceRecovery::for_error(&err) {
                    SurfaceRecovery::Reconfigure => {
                        log::debug!("Surface {err:?}, reconfiguring at {:?}", self.size);
                        self.surface.configure(&self.device, &self.config);
                    }
                    SurfaceRecovery::SkipFrame => log::warn!("Skipping frame: {err}"),
                    SurfaceRecovery::Fatal => panic!("Surface acquisition failed: {err}"),
                }
                return None;
            }
        };
        if output.suboptimal {
            log::debug!("Suboptimal surface texture at {:?}", self.size);
        }
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Some((output, view))
    }
}

/// Runs `f` inside a validation error scope and returns the first error it
/// raised, if any.
pub fn with_validation<T>(device: &wgpu::Device, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    let error = pollster::block_on(device.pop_error_scope());
    (value, error)
}

/// Creates render targets and logs, rather than propagates, validation
/// failures. Draws into an invalid target are wrong but do not abort.
pub fn create_logged<T>(device: &wgpu::Device, what: &str, f: impl FnOnce() -> T) -> T {
    let (value, error) = with_validation(device, f);
    if let Some(e) = error {
        log::error!("{what} is incomplete: {e}");
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::TextureFormat;

    #[test]
    fn lost_and_outdated_surfaces_are_reconfigured() {
        assert_eq!(
            SurfaceRecovery::for_error(&wgpu::SurfaceError::Lost),
            SurfaceRecovery::Reconfigure
        );
        assert_eq!(
            SurfaceRecovery::for_error(&wgpu::SurfaceError::Outdated),
            SurfaceRecovery::Reconfigure
        );
    }

    #[test]
    fn timeout_skips_and_out_of_memory_is_fatal() {
        assert_eq!(
            SurfaceRecovery::for_error(&wgpu::SurfaceError::Timeout),
            SurfaceRecovery::SkipFrame
        );
        assert_eq!(
            SurfaceRecovery::for_error(&wgpu::SurfaceError::OutOfMemory),
            SurfaceRecovery::Fatal
        );
    }

    #[test]
    fn linear_surface_format_is_preferred() {
        let formats = [TextureFormat::Bgra8UnormSrgb, TextureFormat::Bgra8Unorm];
        assert_eq!(pick_surface_format(&formats), Some(TextureFormat::Bgra8Unorm));
    }

    #[test]
    fn srgb_only_surface_falls_back_to_first_format() {
        let formats = [TextureFormat::Rgba8UnormSrgb, TextureFormat::Bgra8UnormSrgb];
        assert_eq!(pick_surface_format(&formats), Some(TextureFormat::Rgba8UnormSrgb));
        assert_eq!(pick_surface_format(&[]), None);
    }
}
