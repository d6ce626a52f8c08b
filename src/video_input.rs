//! Video collaborators the binary can hand to the session.
//!
//! `TestPatternCamera` stands in for a webcam: it lists one device and, while
//! active, produces animated colour bars from the wall clock. `NoCamera` has
//! no devices at all, so every auto-mix activation fails cleanly. File
//! playback lives in `video_file`.

use std::cell::Cell;
use std::time::Instant;

use shadermidi_engine::video::{DeviceChoice, DeviceInfo, VideoCapture, VideoFrame, VideoSourceKind};
use shadermidi_engine::{logi, EngineError};

use crate::video_file::FileVideo;

pub const TEST_PATTERN_ID: &str = "test-pattern";

const WIDTH: u32 = 320;
const HEIGHT: u32 = 180;
const FPS: f32 = 30.0;

pub struct TestPatternCamera {
    active: Option<Instant>,
    last: Cell<Option<VideoFrame>>,
}

impl TestPatternCamera {
    pub fn new() -> Self {
        Self {
            active: None,
            last: Cell::new(None),
        }
    }
}

impl Default for TestPatternCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoCapture for TestPatternCamera {
    fn activate(&mut self, choice: DeviceChoice) -> Result<(), EngineError> {
        if let DeviceChoice::Device(id) = &choice {
            if id != TEST_PATTERN_ID {
                return Err(EngineError::VideoAcquire {
                    device: id.clone(),
                    msg: "no such device".into(),
                });
            }
        }
        self.deactivate();
        self.active = Some(Instant::now());
        logi!("VIDEO", "test pattern started");
        Ok(())
    }

    fn deactivate(&mut self) {
        if self.active.take().is_some() {
            self.last.set(None);
            logi!("VIDEO", "test pattern stopped");
        }
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        let started = self.active?;
        let seq = (started.elapsed().as_secs_f32() * FPS) as u64 + 1;

        let cached = self.last.take();
        let frame = match cached {
            Some(f) if f.seq == seq => f,
            _ => pattern_frame(WIDTH, HEIGHT, seq),
        };
        self.last.set(Some(frame.clone()));
        Some(frame)
    }

    fn source_kind(&self) -> VideoSourceKind {
        if self.active.is_some() {
            VideoSourceKind::Camera
        } else {
            VideoSourceKind::None
        }
    }

    fn current_device(&self) -> Option<String> {
        self.active.map(|_| TEST_PATTERN_ID.to_string())
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        vec![DeviceInfo {
            id: TEST_PATTERN_ID.into(),
            label: "Test Pattern".into(),
        }]
    }
}

/// Eight vertical colour bars scrolling sideways, one pixel per frame, with
/// a bright horizontal sweep line.
pub fn pattern_frame(width: u32, height: u32, seq: u64) -> VideoFrame {
    const BARS: [[u8; 3]; 8] = [
        [235, 235, 235],
        [235, 235, 16],
        [16, 235, 235],
        [16, 235, 16],
        [235, 16, 235],
        [235, 16, 16],
        [16, 16, 235],
        [16, 16, 16],
    ];

    let (w, h) = (width as usize, height as usize);
    let bar_w = (w / BARS.len()).max(1);
    let shift = seq as usize % w.max(1);
    let sweep = (seq as usize * 2) % h.max(1);

    let mut rgba = vec![0u8; w * h * 4];
    for (y, row) in rgba.chunks_exact_mut(w * 4).enumerate() {
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let c = if y == sweep {
                [255, 255, 255]
            } else {
                BARS[((x + shift) / bar_w) % BARS.len()]
            };
            px.copy_from_slice(&[c[0], c[1], c[2], 255]);
        }
    }
    VideoFrame::new(width, height, seq, rgba)
}

#[derive(Default)]
pub struct NoCamera;

impl VideoCapture for NoCamera {
    fn activate(&mut self, choice: DeviceChoice) -> Result<(), EngineError> {
        Err(EngineError::VideoAcquire {
            device: choice.label().to_string(),
            msg: "camera input disabled (--camera none)".into(),
        })
    }

    fn deactivate(&mut self) {}

    fn current_frame(&self) -> Option<VideoFrame> {
        None
    }

    fn source_kind(&self) -> VideoSourceKind {
        VideoSourceKind::None
    }

    fn current_device(&self) -> Option<String> {
        None
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        Vec::new()
    }
}

/// Runtime choice of collaborator.
pub enum Camera {
    TestPattern(TestPatternCamera),
    File(FileVideo),
    Disabled(NoCamera),
}

impl Camera {
    fn inner(&self) -> &dyn VideoCapture {
        match self {
            Camera::TestPattern(c) => c,
            Camera::File(c) => c,
            Camera::Disabled(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn VideoCapture {
        match self {
            Camera::TestPattern(c) => c,
            Camera::File(c) => c,
            Camera::Disabled(c) => c,
        }
    }
}

impl VideoCapture for Camera {
    fn activate(&mut self, choice: DeviceChoice) -> Result<(), EngineError> {
        self.inner_mut().activate(choice)
    }

    fn deactivate(&mut self) {
        self.inner_mut().deactivate()
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        self.inner().current_frame()
    }

    fn source_kind(&self) -> VideoSourceKind {
        self.inner().source_kind()
    }

    fn current_device(&self) -> Option<String> {
        self.inner().current_device()
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        self.inner().devices()
    }
}
