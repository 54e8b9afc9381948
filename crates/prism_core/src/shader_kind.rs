/// Identifies one shader program. Each program is built from a single source
/// file in the shader directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderKind {
    /// Textured Blinn-Phong with shadows and optional normal mapping.
    Lit,
    /// Flat-colored geometry for point-light markers.
    Light,
    /// Flat color for the selection outline.
    Outline,
    /// Depth-only light-space pass.
    Shadow,
    Skybox,
    /// Single-axis gaussian blur used by bloom.
    Blur,
    /// Tone mapping, gamma and bloom resolve to the swapchain.
    Composite,
    /// Shadow-map visualization inset.
    DepthDebug,
}

impl ShaderKind {
    pub const ALL: &'static [ShaderKind] = &[
        ShaderKind::Lit,
        ShaderKind::Light,
        ShaderKind::Outline,
        ShaderKind::Shadow,
        ShaderKind::Skybox,
        ShaderKind::Blur,
        ShaderKind::Composite,
        ShaderKind::DepthDebug,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Lit => "lit.wgsl",
            Self::Light => "light.wgsl",
            Self::Outline => "outline.wgsl",
            Self::Shadow => "shadow.wgsl",
            Self::Skybox => "skybox.wgsl",
            Self::Blur => "blur.wgsl",
            Self::Composite => "composite.wgsl",
            Self::DepthDebug => "depth_debug.wgsl",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Lit => "lit",
            Self::Light => "light",
            Self::Outline => "outline",
            Self::Shadow => "shadow",
            Self::Skybox => "skybox",
            Self::Blur => "blur",
            Self::Composite => "composite",
            Self::DepthDebug => "depth_debug",
        }
    }

    /// Maps a watched file name back to its program.
    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.file_name() == name)
    }

    /// Programs drawn into the HDR scene target.
    pub fn is_scene_pass(self) -> bool {
        matches!(
            self,
            Self::Lit | Self::Light | Self::Outline | Self::Skybox
        )
    }

    /// Programs without a fragment stage.
    pub fn is_depth_only(self) -> bool {
        self == Self::Shadow
    }
}

impl std::fmt::Display for ShaderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
