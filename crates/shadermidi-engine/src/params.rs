//! Closed parameter vocabulary and the flat parameter table.
//!
//! The table is the only channel between control input and rendering. Every
//! parameter has a default, a kind, and a range; names outside the vocabulary
//! are rejected at the lookup boundary ([`ParamId::from_name`]).

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamId {
    Vibrance,
    Hue,
    Saturation,
    Grayscale,
    Contrast,
    Brightness,
    Zoom,
    Speed,
    Mirror,
    VideoMix,
    AudioIntensity,
    AudioToHue,
    AudioToSaturation,
    AudioToBrightness,
    AudioToZoom,
    WaveX,
    WaveY,
    WaveRadial,
    ScreenSplit,
    VideoRotation,
    VideoKaleido,
    VideoPixelate,
    VideoBlur,
    VideoEdge,
    VideoRgbShift,
    VideoInvert,
    VideoChromaKey,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    Continuous { min: f32, max: f32 },
    Toggle,
    /// Small integer / mode parameter. Both bounds inclusive.
    Integer { min: i32, max: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Bool(bool),
    Int(i32),
}

impl ParamValue {
    /// Value as uploaded to the GPU (booleans become 0.0 / 1.0).
    pub fn as_f32(self) -> f32 {
        match self {
            ParamValue::Float(v) => v,
            ParamValue::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            ParamValue::Int(i) => i as f32,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub id: ParamId,
    pub name: &'static str,
    pub uniform: &'static str,
    pub kind: ParamKind,
    pub default: ParamValue,
}

const fn cont(id: ParamId, name: &'static str, uniform: &'static str, min: f32, max: f32, default: f32) -> ParamSpec {
    ParamSpec {
        id,
        name,
        uniform,
        kind: ParamKind::Continuous { min, max },
        default: ParamValue::Float(default),
    }
}

const fn toggle(id: ParamId, name: &'static str, uniform: &'static str) -> ParamSpec {
    ParamSpec {
        id,
        name,
        uniform,
        kind: ParamKind::Toggle,
        default: ParamValue::Bool(false),
    }
}

const fn int(id: ParamId, name: &'static str, uniform: &'static str, min: i32, max: i32) -> ParamSpec {
    ParamSpec {
        id,
        name,
        uniform,
        kind: ParamKind::Integer { min, max },
        default: ParamValue::Int(min),
    }
}

/// Indexed by `ParamId as usize`; order must match the enum.
const SPECS: [ParamSpec; ParamId::COUNT] = [
    cont(ParamId::Vibrance, "vibrance", "u_vibrance", 0.0, 1.0, 0.0),
    cont(ParamId::Hue, "hue", "u_hue", 0.0, 360.0, 0.0),
    cont(ParamId::Saturation, "saturation", "u_saturation", 0.0, 1.0, 1.0),
    cont(ParamId::Grayscale, "grayscale", "u_grayscale", 0.0, 1.0, 0.0),
    cont(ParamId::Contrast, "contrast", "u_contrast", 0.0, 2.0, 1.0),
    cont(ParamId::Brightness, "brightness", "u_brightness", 0.0, 2.0, 1.0),
    cont(ParamId::Zoom, "zoom", "u_zoom", 0.1, 5.0, 1.0),
    cont(ParamId::Speed, "speed", "u_speed", 0.0, 4.0, 1.0),
    toggle(ParamId::Mirror, "mirror", "u_mirror"),
    cont(ParamId::VideoMix, "videoMix", "u_videoMix", 0.0, 1.0, 0.0),
    cont(ParamId::AudioIntensity, "audioIntensity", "u_audioIntensity", 0.0, 1.0, 0.0),
    cont(ParamId::AudioToHue, "audioToHue", "u_audioToHue", 0.0, 1.0, 0.0),
    cont(ParamId::AudioToSaturation, "audioToSaturation", "u_audioToSaturation", 0.0, 1.0, 0.0),
    cont(ParamId::AudioToBrightness, "audioToBrightness", "u_audioToBrightness", 0.0, 1.0, 0.0),
    cont(ParamId::AudioToZoom, "audioToZoom", "u_audioToZoom", 0.0, 1.0, 0.0),
    cont(ParamId::WaveX, "waveX", "u_waveX", 0.0, 1.0, 0.0),
    cont(ParamId::WaveY, "waveY", "u_waveY", 0.0, 1.0, 0.0),
    cont(ParamId::WaveRadial, "waveRadial", "u_waveRadial", 0.0, 1.0, 0.0),
    int(ParamId::ScreenSplit, "screenSplit", "u_screenSplit", 0, 3),
    cont(ParamId::VideoRotation, "videoRotation", "u_videoRotation", 0.0, 360.0, 0.0),
    int(ParamId::VideoKaleido, "videoKaleido", "u_videoKaleido", 0, 12),
    cont(ParamId::VideoPixelate, "videoPixelate", "u_videoPixelate", 0.0, 1.0, 0.0),
    cont(ParamId::VideoBlur, "videoBlur", "u_videoBlur", 0.0, 1.0, 0.0),
    cont(ParamId::VideoEdge, "videoEdge", "u_videoEdge", 0.0, 1.0, 0.0),
    cont(ParamId::VideoRgbShift, "videoRgbShift", "u_videoRgbShift", 0.0, 1.0, 0.0),
    toggle(ParamId::VideoInvert, "videoInvert", "u_videoInvert"),
    cont(ParamId::VideoChromaKey, "videoChromaKey", "u_videoChromaKey", 0.0, 1.0, 0.0),
];

impl ParamId {
    pub const COUNT: usize = 27;

    pub const ALL: [ParamId; ParamId::COUNT] = [
        ParamId::Vibrance,
        ParamId::Hue,
        ParamId::Saturation,
        ParamId::Grayscale,
        ParamId::Contrast,
        ParamId::Brightness,
        ParamId::Zoom,
        ParamId::Speed,
        ParamId::Mirror,
        ParamId::VideoMix,
        ParamId::AudioIntensity,
        ParamId::AudioToHue,
        ParamId::AudioToSaturation,
        ParamId::AudioToBrightness,
        ParamId::AudioToZoom,
        ParamId::WaveX,
        ParamId::WaveY,
        ParamId::WaveRadial,
        ParamId::ScreenSplit,
        ParamId::VideoRotation,
        ParamId::VideoKaleido,
        ParamId::VideoPixelate,
        ParamId::VideoBlur,
        ParamId::VideoEdge,
        ParamId::VideoRgbShift,
        ParamId::VideoInvert,
        ParamId::VideoChromaKey,
    ];

    pub fn spec(self) -> &'static ParamSpec {
        &SPECS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn uniform(self) -> &'static str {
        self.spec().uniform
    }

    pub fn kind(self) -> ParamKind {
        self.spec().kind
    }

    /// Accepts the vocabulary name (`audioToHue`) or its uniform (`u_audioToHue`).
    pub fn from_name(name: &str) -> Result<ParamId, EngineError> {
        let bare = name.strip_prefix("u_").unwrap_or(name);
        SPECS
            .iter()
            .find(|s| s.name == bare)
            .map(|s| s.id)
            .ok_or_else(|| EngineError::UnknownParameter { name: name.to_string() })
    }
}

/// Current value of every parameter. Owned by the composition pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTable {
    values: [ParamValue; ParamId::COUNT],
}

impl Default for ParamTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamTable {
    pub fn new() -> Self {
        let mut values = [ParamValue::Float(0.0); ParamId::COUNT];
        for spec in &SPECS {
            values[spec.id as usize] = spec.default;
        }
        Self { values }
    }

    pub fn get(&self, id: ParamId) -> ParamValue {
        self.values[id as usize]
    }

    pub fn get_f32(&self, id: ParamId) -> f32 {
        self.get(id).as_f32()
    }

    pub fn get_bool(&self, id: ParamId) -> bool {
        match self.get(id) {
            ParamValue::Bool(b) => b,
            other => other.as_f32() > 0.5,
        }
    }

    pub fn get_int(&self, id: ParamId) -> i32 {
        match self.get(id) {
            ParamValue::Int(i) => i,
            other => other.as_f32().floor() as i32,
        }
    }

    /// Store a value, coerced to the parameter's kind.
    ///
    /// Continuous values clamp into range. Integer parameters never clamp: an
    /// out-of-range value is an error (quantization is the mapping layer's job).
    /// Returns the value actually stored.
    pub fn set(&mut self, id: ParamId, value: ParamValue) -> Result<ParamValue, EngineError> {
        let stored = match (id.kind(), value) {
            (ParamKind::Continuous { min, max }, v @ (ParamValue::Float(_) | ParamValue::Int(_))) => {
                let x = v.as_f32();
                if x.is_nan() {
                    return Err(EngineError::InvalidValue { param: id.name(), msg: "NaN".into() });
                }
                ParamValue::Float(x.clamp(min, max))
            }
            (ParamKind::Continuous { min, max }, ParamValue::Bool(b)) => {
                ParamValue::Float(if b { max } else { min })
            }
            (ParamKind::Toggle, ParamValue::Bool(b)) => ParamValue::Bool(b),
            (ParamKind::Toggle, v) => ParamValue::Bool(v.as_f32() > 0.5),
            (ParamKind::Integer { min, max }, ParamValue::Int(i)) => {
                if i < min || i > max {
                    return Err(EngineError::InvalidValue {
                        param: id.name(),
                        msg: format!("{i} outside {min}..={max}"),
                    });
                }
                ParamValue::Int(i)
            }
            (ParamKind::Integer { .. }, other) => {
                return Err(EngineError::InvalidValue {
                    param: id.name(),
                    msg: format!("expected an integer, got {other:?}"),
                });
            }
        };
        self.values[id as usize] = stored;
        Ok(stored)
    }

    pub fn set_by_name(&mut self, name: &str, value: ParamValue) -> Result<ParamValue, EngineError> {
        let id = ParamId::from_name(name)?;
        self.set(id, value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, ParamValue)> + '_ {
        ParamId::ALL.iter().map(move |&id| (id, self.values[id as usize]))
    }
}
