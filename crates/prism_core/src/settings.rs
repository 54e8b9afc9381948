//! Run-time rendering toggles and inspector selection.
//!
//! Built once at startup and handed by reference to the scheduler, renderer
//! and overlay. Nothing here changes simulation outcomes.

use serde::Deserialize;

use crate::entity::EntityHandle;

/// Boolean switches exposed in the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Toggle {
    NormalMapping,
    Multisampling,
    Bloom,
    ToneMapping,
    GammaCorrection,
    ShadowMapDebug,
    Interpolation,
}

impl Toggle {
    /// All toggles in display order.
    pub const ALL: &'static [Toggle] = &[
        Toggle::NormalMapping,
        Toggle::Multisampling,
        Toggle::Bloom,
        Toggle::ToneMapping,
        Toggle::GammaCorrection,
        Toggle::ShadowMapDebug,
        Toggle::Interpolation,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::NormalMapping => "Normal mapping",
            Self::Multisampling => "Multisampling (4x)",
            Self::Bloom => "Bloom",
            Self::ToneMapping => "Tone mapping",
            Self::GammaCorrection => "Gamma correction",
            Self::ShadowMapDebug => "Show shadow map",
            Self::Interpolation => "Interpolation",
        }
    }
}

impl std::fmt::Display for Toggle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub normal_mapping: bool,
    pub multisampling: bool,
    pub bloom: bool,
    pub tone_mapping: bool,
    pub gamma_correction: bool,
    pub shadow_map_debug: bool,
    pub interpolation: bool,

    pub exposure: f32,
    pub bloom_threshold: f32,
    /// Blur passes per frame; alternates horizontal and vertical.
    pub bloom_iterations: u32,
    /// UV step between PCF taps.
    pub shadow_texel_offset: f32,
    /// Side of the square PCF window, in taps. Odd values center the window.
    pub pcf_window_side: u32,
    pub outline_scale: f32,
    pub outline_color: [f32; 3],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            normal_mapping: true,
            multisampling: false,
            bloom: true,
            tone_mapping: true,
            gamma_correction: true,
            shadow_map_debug: false,
            interpolation: true,
            exposure: 1.0,
            bloom_threshold: 1.0,
            bloom_iterations: 10,
            shadow_texel_offset: 1.0 / 2048.0,
            pcf_window_side: 3,
            outline_scale: 1.04,
            outline_color: [1.0, 0.6, 0.1],
        }
    }
}

impl RenderSettings {
    pub fn is_enabled(&self, toggle: Toggle) -> bool {
        match toggle {
            Toggle::NormalMapping => self.normal_mapping,
            Toggle::Multisampling => self.multisampling,
            Toggle::Bloom => self.bloom,
            Toggle::ToneMapping => self.tone_mapping,
            Toggle::GammaCorrection => self.gamma_correction,
            Toggle::ShadowMapDebug => self.shadow_map_debug,
            Toggle::Interpolation => self.interpolation,
        }
    }

    pub fn flag_mut(&mut self, toggle: Toggle) -> &mut bool {
        match toggle {
            Toggle::NormalMapping => &mut self.normal_mapping,
            Toggle::Multisampling => &mut self.multisampling,
            Toggle::Bloom => &mut self.bloom,
            Toggle::ToneMapping => &mut self.tone_mapping,
            Toggle::GammaCorrection => &mut self.gamma_correction,
            Toggle::ShadowMapDebug => &mut self.shadow_map_debug,
            Toggle::Interpolation => &mut self.interpolation,
        }
    }

    pub fn toggle(&mut self, toggle: Toggle) {
        let flag = self.flag_mut(toggle);
        *flag = !*flag;
    }

    /// Sample count of the HDR scene target.
    pub fn sample_count(&self) -> u32 {
        if self.multisampling {
            4
        } else {
            1
        }
    }

    /// Blur passes that will actually run this frame.
    pub fn effective_bloom_iterations(&self) -> u32 {
        if self.bloom {
            self.bloom_iterations
        } else {
            0
        }
    }
}

/// Inspector-owned state that outlives a single overlay frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InspectorState {
    pub overlay_visible: bool,
    pub selected: Option<EntityHandle>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_outline_scale_is_four_percent() {
        assert!((RenderSettings::default().outline_scale - 1.04).abs() < 1e-6);
    }

    #[test]
    fn toggle_flips_only_the_named_flag() {
        let mut settings = RenderSettings::default();
        let before = settings.clone();
        settings.toggle(Toggle::Bloom);
        assert_eq!(settings.bloom, !before.bloom);
        for &t in Toggle::ALL.iter().filter(|&&t| t != Toggle::Bloom) {
            assert_eq!(settings.is_enabled(t), before.is_enabled(t), "{t}");
        }
    }

    #[test]
    fn disabling_bloom_runs_no_blur_passes() {
        let mut settings = RenderSettings::default();
        assert_eq!(settings.effective_bloom_iterations(), 10);
        settings.bloom = false;
        assert_eq!(settings.effective_bloom_iterations(), 0);
    }

    #[test]
    fn sample_count_follows_multisampling() {
        let mut settings = RenderSettings::default();
        assert_eq!(settings.sample_count(), 1);
        settings.toggle(Toggle::Multisampling);
        assert_eq!(settings.sample_count(), 4);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: RenderSettings =
            serde_json::from_str(r#"{ "bloom": false, "exposure": 2.5 }"#).unwrap();
        assert!(!settings.bloom);
        assert!((settings.exposure - 2.5).abs() < 1e-6);
        assert_eq!(settings.bloom_iterations, 10);
        assert!(settings.tone_mapping);
    }

    #[test]
    fn display_matches_label() {
        for &t in Toggle::ALL {
            assert_eq!(format!("{t}"), t.label());
        }
    }
}
