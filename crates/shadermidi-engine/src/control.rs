//! Control mapping layer: discrete control-surface events -> parameter updates
//! or catalog navigation.
//!
//! The mapping table is static once built. The only runtime state is a per-control
//! latch for navigation buttons, so a continuous controller held above the
//! threshold fires once per crossing instead of once per message.

use std::collections::HashMap;

use crate::error::EngineError;
use crate::params::{ParamId, ParamKind, ParamValue};

/// Channel wildcard used in the mapping key when an entry listens on any channel.
pub const ANY_CHANNEL: u8 = 255;

/// Navigation and toggle threshold on the scaled value. Strictly greater fires.
pub const TRIGGER_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlEvent {
    NoteOn { channel: u8, note: u8 },
    NoteOff { channel: u8, note: u8 },
    /// `value` is the 7-bit controller value normalized to `0..=1`.
    ControlChange { channel: u8, cc: u8, value: f32 },
}

impl ControlEvent {
    /// Decode a raw MIDI channel message. Anything other than note / CC is `None`.
    pub fn from_midi(msg: &[u8]) -> Option<ControlEvent> {
        if msg.len() != 3 {
            return None;
        }
        let channel = msg[0] & 0x0F;
        match msg[0] & 0xF0 {
            0x90 if msg[2] > 0 => Some(ControlEvent::NoteOn { channel, note: msg[1] & 0x7F }),
            // Note-on with zero velocity is a note-off by convention.
            0x90 | 0x80 => Some(ControlEvent::NoteOff { channel, note: msg[1] & 0x7F }),
            0xB0 => Some(ControlEvent::ControlChange {
                channel,
                cc: msg[1] & 0x7F,
                value: (msg[2] & 0x7F) as f32 / 127.0,
            }),
            _ => None,
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            ControlEvent::NoteOn { channel, .. }
            | ControlEvent::NoteOff { channel, .. }
            | ControlEvent::ControlChange { channel, .. } => channel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transfer {
    /// `lo + v * (hi - lo)`
    Scale { lo: f32, hi: f32 },
    /// `v > 0.5`
    Threshold,
    /// `lo + floor(v * (hi - lo + 1))`, capped at `hi`. Both bounds inclusive.
    Quantize { lo: i32, hi: i32 },
}

impl Transfer {
    pub fn apply(&self, v: f32) -> ParamValue {
        let v = v.clamp(0.0, 1.0);
        match *self {
            Transfer::Scale { lo, hi } => ParamValue::Float(lo + v * (hi - lo)),
            Transfer::Threshold => ParamValue::Bool(v > TRIGGER_THRESHOLD),
            Transfer::Quantize { lo, hi } => {
                let buckets = (hi - lo + 1) as f32;
                let step = (v * buckets).floor() as i32;
                ParamValue::Int((lo + step).min(hi))
            }
        }
    }

    /// Scalar used for navigation triggering.
    fn scaled(&self, v: f32) -> f32 {
        match self.apply(v) {
            ParamValue::Float(x) => x,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlTarget {
    Param(ParamId),
    PreviousShader,
    NextShader,
}

impl ControlTarget {
    pub fn from_name(name: &str) -> Result<ControlTarget, EngineError> {
        match name {
            "prev_shader" | "shaderPrev" => Ok(ControlTarget::PreviousShader),
            "next_shader" | "shaderNext" => Ok(ControlTarget::NextShader),
            other => ParamId::from_name(other).map(ControlTarget::Param),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControlTarget::Param(id) => id.name(),
            ControlTarget::PreviousShader => "prev_shader",
            ControlTarget::NextShader => "next_shader",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlMappingEntry {
    pub target: ControlTarget,
    pub cc: u8,
    /// `None` listens on every channel.
    pub channel: Option<u8>,
    pub transfer: Transfer,
}

impl ControlMappingEntry {
    pub const fn new(target: ControlTarget, cc: u8, transfer: Transfer) -> Self {
        Self {
            target,
            cc,
            channel: None,
            transfer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlAction {
    SetParam { id: ParamId, value: ParamValue },
    SelectShader(usize),
    NextShader,
    PreviousShader,
    Ignored,
}

/// Accept 1-based (1..16) channels from JSON; pass through anything else (wildcard 255).
pub fn normalize_midi_channel(ch: u8) -> u8 {
    match ch {
        1..=16 => ch - 1,
        _ => ch,
    }
}

#[derive(Debug, Clone)]
pub struct ControlMapper {
    mappings: HashMap<(u8, u8), ControlMappingEntry>,
    channel_filter: Option<u8>,
    /// Navigation fires once per rising edge across 0.5, not on every value above it.
    latched: HashMap<(u8, u8), bool>,
}

impl ControlMapper {
    /// Later entries win on duplicate (channel, cc) keys; `validate` flags those.
    pub fn new(entries: &[ControlMappingEntry], channel_filter: Option<u8>) -> Self {
        let mut mappings = HashMap::new();
        for e in entries {
            let ch = e.channel.unwrap_or(ANY_CHANNEL);
            mappings.insert((ch, e.cc), *e);
        }
        Self {
            mappings,
            channel_filter,
            latched: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Resolve one event into an action. `catalog_len` maps note numbers onto
    /// catalog indices.
    pub fn handle_event(&mut self, event: ControlEvent, catalog_len: usize) -> ControlAction {
        if let Some(ch) = self.channel_filter {
            if event.channel() != ch {
                return ControlAction::Ignored;
            }
        }

        match event {
            ControlEvent::NoteOn { note, .. } => {
                if catalog_len == 0 {
                    return ControlAction::Ignored;
                }
                let index = ((note as f32 / 128.0) * catalog_len as f32).floor() as usize;
                ControlAction::SelectShader(index)
            }
            ControlEvent::NoteOff { .. } => ControlAction::Ignored,
            ControlEvent::ControlChange { channel, cc, value } => {
                let (key, entry) = match self.lookup(channel, cc) {
                    Some(found) => found,
                    None => return ControlAction::Ignored,
                };
                match entry.target {
                    ControlTarget::Param(id) => ControlAction::SetParam {
                        id,
                        value: entry.transfer.apply(value),
                    },
                    ControlTarget::PreviousShader | ControlTarget::NextShader => {
                        let above = entry.transfer.scaled(value) > TRIGGER_THRESHOLD;
                        let was_above = self.latched.insert(key, above).unwrap_or(false);
                        if above && !was_above {
                            if entry.target == ControlTarget::NextShader {
                                ControlAction::NextShader
                            } else {
                                ControlAction::PreviousShader
                            }
                        } else {
                            ControlAction::Ignored
                        }
                    }
                }
            }
        }
    }

    fn lookup(&self, channel: u8, cc: u8) -> Option<((u8, u8), ControlMappingEntry)> {
        self.mappings
            .get(&(channel, cc))
            .map(|e| ((channel, cc), *e))
            .or_else(|| self.mappings.get(&(ANY_CHANNEL, cc)).map(|e| ((ANY_CHANNEL, cc), *e)))
    }
}

/// The transfer function a parameter gets when config does not name one.
pub fn default_transfer(id: ParamId) -> Transfer {
    match id.kind() {
        ParamKind::Continuous { min, max } => Transfer::Scale { lo: min, hi: max },
        ParamKind::Toggle => Transfer::Threshold,
        ParamKind::Integer { min, max } => Transfer::Quantize { lo: min, hi: max },
    }
}

/// Reference layout for a nanoKONTROL2-style surface.
pub fn default_entries() -> Vec<ControlMappingEntry> {
    use ControlTarget::{NextShader, Param, PreviousShader};

    let params: [(u8, ParamId); 27] = [
        // faders
        (0, ParamId::Vibrance),
        (1, ParamId::Hue),
        (2, ParamId::Saturation),
        (3, ParamId::Grayscale),
        (4, ParamId::Contrast),
        (5, ParamId::Brightness),
        (6, ParamId::Zoom),
        (7, ParamId::VideoMix),
        // knobs
        (16, ParamId::Speed),
        (17, ParamId::AudioIntensity),
        (18, ParamId::ScreenSplit),
        (19, ParamId::WaveX),
        (20, ParamId::WaveY),
        (21, ParamId::WaveRadial),
        (22, ParamId::VideoRotation),
        (23, ParamId::AudioToHue),
        (24, ParamId::AudioToSaturation),
        (25, ParamId::AudioToBrightness),
        (26, ParamId::AudioToZoom),
        (27, ParamId::VideoKaleido),
        (28, ParamId::VideoPixelate),
        (29, ParamId::VideoBlur),
        (30, ParamId::VideoEdge),
        (31, ParamId::VideoRgbShift),
        (32, ParamId::VideoChromaKey),
        // buttons
        (48, ParamId::Mirror),
        (49, ParamId::VideoInvert),
    ];

    let mut out: Vec<ControlMappingEntry> = params
        .iter()
        .map(|&(cc, id)| ControlMappingEntry::new(Param(id), cc, default_transfer(id)))
        .collect();
    out.push(ControlMappingEntry::new(PreviousShader, 43, Transfer::Threshold));
    out.push(ControlMappingEntry::new(NextShader, 44, Transfer::Threshold));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    fn cc(cc: u8, value: f32) -> ControlEvent {
        ControlEvent::ControlChange { channel: 0, cc, value }
    }

    fn mapper() -> ControlMapper {
        ControlMapper::new(&default_entries(), None)
    }

    #[test]
    fn scale_is_linear_and_monotonic() {
        let t = Transfer::Scale { lo: 0.1, hi: 5.0 };
        let mut prev = f32::MIN;
        for i in 0..=127 {
            let v = i as f32 / 127.0;
            let ParamValue::Float(out) = t.apply(v) else { panic!("scale yields floats") };
            assert!(approx_eq(out, 0.1 + v * 4.9));
            assert!(out >= prev);
            prev = out;
        }
    }

    #[test]
    fn quantize_floors_into_inclusive_range() {
        let t = Transfer::Quantize { lo: 0, hi: 3 };
        assert_eq!(t.apply(0.0), ParamValue::Int(0));
        assert_eq!(t.apply(0.2499), ParamValue::Int(0));
        assert_eq!(t.apply(0.25), ParamValue::Int(1));
        assert_eq!(t.apply(0.9999), ParamValue::Int(3));
        assert_eq!(t.apply(1.0), ParamValue::Int(3));
        assert_eq!(t.apply(7.0), ParamValue::Int(3));
    }

    #[test]
    fn threshold_is_strictly_greater_than_half() {
        assert_eq!(Transfer::Threshold.apply(0.5), ParamValue::Bool(false));
        assert_eq!(Transfer::Threshold.apply(0.5001), ParamValue::Bool(true));
    }

    #[test]
    fn navigation_fires_only_above_half() {
        let mut m = mapper();
        assert_eq!(m.handle_event(cc(44, 0.5), 4), ControlAction::Ignored);
        assert_eq!(m.handle_event(cc(44, 0.51), 4), ControlAction::NextShader);
        assert_eq!(m.handle_event(cc(43, 1.0), 4), ControlAction::PreviousShader);
    }

    #[test]
    fn navigation_does_not_repeat_while_held() {
        let mut m = mapper();
        assert_eq!(m.handle_event(cc(44, 0.7), 4), ControlAction::NextShader);
        assert_eq!(m.handle_event(cc(44, 0.8), 4), ControlAction::Ignored);
        assert_eq!(m.handle_event(cc(44, 0.0), 4), ControlAction::Ignored);
        assert_eq!(m.handle_event(cc(44, 1.0), 4), ControlAction::NextShader);
    }

    #[test]
    fn unmapped_controllers_are_ignored() {
        let mut m = mapper();
        assert_eq!(m.handle_event(cc(99, 1.0), 4), ControlAction::Ignored);
    }

    #[test]
    fn hue_fader_maps_to_degrees() {
        let mut m = mapper();
        match m.handle_event(cc(1, 0.5), 4) {
            ControlAction::SetParam { id, value: ParamValue::Float(v) } => {
                assert_eq!(id, ParamId::Hue);
                assert!(approx_eq(v, 180.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn screen_split_knob_quantizes() {
        let mut m = mapper();
        assert_eq!(
            m.handle_event(cc(18, 0.9999), 4),
            ControlAction::SetParam { id: ParamId::ScreenSplit, value: ParamValue::Int(3) }
        );
        assert_eq!(
            m.handle_event(cc(18, 0.0), 4),
            ControlAction::SetParam { id: ParamId::ScreenSplit, value: ParamValue::Int(0) }
        );
    }

    #[test]
    fn note_on_maps_linearly_onto_catalog() {
        let mut m = mapper();
        let note = |n| ControlEvent::NoteOn { channel: 0, note: n };
        assert_eq!(m.handle_event(note(0), 4), ControlAction::SelectShader(0));
        assert_eq!(m.handle_event(note(64), 4), ControlAction::SelectShader(2));
        assert_eq!(m.handle_event(note(127), 4), ControlAction::SelectShader(3));
        assert_eq!(m.handle_event(note(60), 0), ControlAction::Ignored);
    }

    #[test]
    fn channel_filter_drops_other_channels() {
        let mut m = ControlMapper::new(&default_entries(), Some(2));
        let ev = ControlEvent::ControlChange { channel: 3, cc: 1, value: 1.0 };
        assert_eq!(m.handle_event(ev, 4), ControlAction::Ignored);
    }

    #[test]
    fn channel_specific_entry_wins_over_wildcard() {
        let mut entries = default_entries();
        entries.push(ControlMappingEntry {
            target: ControlTarget::Param(ParamId::Grayscale),
            cc: 1,
            channel: Some(5),
            transfer: Transfer::Scale { lo: 0.0, hi: 1.0 },
        });
        let mut m = ControlMapper::new(&entries, None);
        let ev = ControlEvent::ControlChange { channel: 5, cc: 1, value: 1.0 };
        assert!(matches!(
            m.handle_event(ev, 1),
            ControlAction::SetParam { id: ParamId::Grayscale, .. }
        ));
    }

    #[test]
    fn decodes_raw_midi() {
        assert_eq!(
            ControlEvent::from_midi(&[0xB1, 7, 127]),
            Some(ControlEvent::ControlChange { channel: 1, cc: 7, value: 1.0 })
        );
        assert_eq!(ControlEvent::from_midi(&[0x90, 60, 100]), Some(ControlEvent::NoteOn { channel: 0, note: 60 }));
        assert_eq!(ControlEvent::from_midi(&[0x90, 60, 0]), Some(ControlEvent::NoteOff { channel: 0, note: 60 }));
        assert_eq!(ControlEvent::from_midi(&[0xE0, 0, 64]), None);
        assert_eq!(ControlEvent::from_midi(&[0xF8]), None);
    }
}
