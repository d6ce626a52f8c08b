//! Hysteresis coupling of `audioToHue` to camera activation and `videoMix`.
//!
//! Inside `band` of the threshold the camera is requested and `videoMix` ramps
//! to 1 at the center. Outside the band a second ramp of the same width brings
//! it back toward 0, and past `OUTER_CUTOFF * band` the camera is released.

use crate::logi;
use crate::video::VideoSourceKind;

pub const DEFAULT_THRESHOLD: f32 = 0.48;
pub const DEFAULT_BAND: f32 = 0.05;
pub const OUTER_CUTOFF: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AutoMixDecision {
    pub activate: bool,
    pub deactivate: bool,
    /// New `videoMix`, or `None` to leave it untouched.
    pub video_mix: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct AutoMix {
    threshold: f32,
    band: f32,
    camera_active: bool,
}

impl Default for AutoMix {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_BAND)
    }
}

impl AutoMix {
    /// A non-positive `band` falls back to the default width.
    pub fn new(threshold: f32, band: f32) -> Self {
        let band = if band > 0.0 && band.is_finite() { band } else { DEFAULT_BAND };
        Self {
            threshold,
            band,
            camera_active: false,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn band(&self) -> f32 {
        self.band
    }

    pub fn camera_active(&self) -> bool {
        self.camera_active
    }

    /// Evaluate one `audioToHue` update. `source` is what the video
    /// collaborator reports right now.
    pub fn on_audio_to_hue(&self, v: f32, source: VideoSourceKind) -> AutoMixDecision {
        let distance = (v - self.threshold).abs();
        let live = source == VideoSourceKind::Camera;

        if distance < self.band {
            return AutoMixDecision {
                activate: !live,
                deactivate: false,
                video_mix: Some((1.0 - distance / self.band).clamp(0.0, 1.0)),
            };
        }

        if !live {
            return AutoMixDecision::default();
        }

        if distance > OUTER_CUTOFF * self.band {
            AutoMixDecision {
                activate: false,
                deactivate: true,
                video_mix: Some(0.0),
            }
        } else {
            AutoMixDecision {
                activate: false,
                deactivate: false,
                video_mix: Some((1.0 - (distance - self.band) / self.band).clamp(0.0, 1.0)),
            }
        }
    }

    /// Record what the collaborator actually did with a decision.
    pub fn confirm(&mut self, camera_active: bool) {
        if camera_active != self.camera_active {
            logi!("AUTOMIX", "camera {}", if camera_active { "active" } else { "inactive" });
        }
        self.camera_active = camera_active;
    }
}
