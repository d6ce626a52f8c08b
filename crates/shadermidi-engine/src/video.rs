//! Video capture collaborator seam.
//!
//! The engine never talks to camera hardware. It issues activation requests
//! through [`VideoCapture`] and reads back whatever frame is newest.

use std::sync::Arc;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSourceKind {
    None,
    /// Live capture device.
    Camera,
    /// Static or looping file. Counts as "not live" for auto-mix.
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceChoice {
    /// Let the collaborator pick.
    Default,
    Device(String),
}

impl DeviceChoice {
    pub fn label(&self) -> &str {
        match self {
            DeviceChoice::Default => "default",
            DeviceChoice::Device(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
}

/// One RGBA8 frame, tightly packed, rows top to bottom.
///
/// `seq` increases every time the producer has a new image; consumers
/// compare it to skip redundant uploads.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub seq: u64,
    pub rgba: Arc<[u8]>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, seq: u64, rgba: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            seq,
            rgba: rgba.into(),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.rgba.len() == (self.width as usize) * (self.height as usize) * 4
    }
}

pub trait VideoCapture {
    /// Start capturing. Implementations must release any current capture
    /// before opening the new device.
    fn activate(&mut self, choice: DeviceChoice) -> Result<(), EngineError>;

    fn deactivate(&mut self);

    fn current_frame(&self) -> Option<VideoFrame>;

    fn source_kind(&self) -> VideoSourceKind;

    /// Device id of the active capture, if any.
    fn current_device(&self) -> Option<String>;

    fn devices(&self) -> Vec<DeviceInfo>;
}

/// Preference order: last selected device (if still listed), then the first
/// device whose label contains `preference` (case-insensitive), then the first
/// device, then [`DeviceChoice::Default`].
pub fn choose_device(devices: &[DeviceInfo], previous: Option<&str>, preference: Option<&str>) -> DeviceChoice {
    if let Some(prev) = previous {
        if devices.iter().any(|d| d.id == prev) {
            return DeviceChoice::Device(prev.to_string());
        }
    }
    if let Some(pref) = preference.map(str::to_lowercase).filter(|p| !p.is_empty()) {
        if let Some(d) = devices.iter().find(|d| d.label.to_lowercase().contains(&pref)) {
            return DeviceChoice::Device(d.id.clone());
        }
    }
    match devices.first() {
        Some(d) => DeviceChoice::Device(d.id.clone()),
        None => DeviceChoice::Default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(id: &str, label: &str) -> DeviceInfo {
        DeviceInfo {
            id: id.into(),
            label: label.into(),
        }
    }

    #[test]
    fn previous_device_wins_when_present() {
        let ds = [dev("a", "Built-in"), dev("b", "USB Cam")];
        assert_eq!(choose_device(&ds, Some("b"), Some("built")), DeviceChoice::Device("b".into()));
    }

    #[test]
    fn stale_previous_falls_through_to_preference() {
        let ds = [dev("a", "Built-in"), dev("b", "USB Cam")];
        assert_eq!(choose_device(&ds, Some("gone"), Some("usb")), DeviceChoice::Device("b".into()));
    }

    #[test]
    fn first_device_then_default() {
        let ds = [dev("a", "Built-in")];
        assert_eq!(choose_device(&ds, None, Some("nothing")), DeviceChoice::Device("a".into()));
        assert_eq!(choose_device(&[], None, None), DeviceChoice::Default);
    }

    #[test]
    fn frame_shape_check() {
        assert!(VideoFrame::new(2, 2, 0, vec![0u8; 16]).is_well_formed());
        assert!(!VideoFrame::new(2, 2, 0, vec![0u8; 15]).is_well_formed());
    }
}
