//! File-backed video: a still image, an animated GIF, or a directory of
//! numbered frames, decoded up front and looped from memory.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;

use shadermidi_engine::video::{DeviceChoice, DeviceInfo, VideoCapture, VideoFrame, VideoSourceKind};
use shadermidi_engine::{logi, logw, EngineError};

/// Frame rate assumed for image-sequence directories.
pub const SEQUENCE_FPS: f32 = 30.0;

/// GIF delays below this are treated as 100 ms, as browsers do.
const MIN_GIF_DELAY: Duration = Duration::from_millis(20);
const DEFAULT_GIF_DELAY: Duration = Duration::from_millis(100);

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

struct ClipFrame {
    rgba: Arc<[u8]>,
    hold: Duration,
}

pub struct FileVideo {
    id: String,
    label: String,
    width: u32,
    height: u32,
    frames: Vec<ClipFrame>,
    total: Duration,
    started: Option<Instant>,
}

impl FileVideo {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let frames = if path.is_dir() {
            decode_sequence(path)?
        } else if has_extension(path, "gif") {
            decode_gif(path)?
        } else {
            let img = image::open(path)
                .with_context(|| format!("decode {}", path.display()))?
                .to_rgba8();
            vec![(img.width(), img.height(), img.into_raw(), Duration::ZERO)]
        };

        let clip = Self::from_frames(format!("file:{label}"), label, frames)?;
        logi!(
            "VIDEO",
            "{}: {} frame(s) {}x{}, loop {:.2}s",
            path.display(),
            clip.frame_count(),
            clip.width,
            clip.height,
            clip.total.as_secs_f32()
        );
        Ok(clip)
    }

    /// Build a clip from decoded `(width, height, rgba, hold)` frames. Frames
    /// whose size differs from the first are dropped.
    pub fn from_frames(id: String, label: String, decoded: Vec<(u32, u32, Vec<u8>, Duration)>) -> anyhow::Result<Self> {
        let Some(&(width, height, _, _)) = decoded.first() else {
            bail!("{label}: no frames");
        };
        if width == 0 || height == 0 {
            bail!("{label}: zero extent ({width}x{height})");
        }

        let mut frames = Vec::with_capacity(decoded.len());
        for (i, (w, h, rgba, hold)) in decoded.into_iter().enumerate() {
            if (w, h) != (width, height) || rgba.len() != (w as usize) * (h as usize) * 4 {
                logw!("VIDEO", "{label}: frame {i} is {w}x{h}, expected {width}x{height}; skipped");
                continue;
            }
            frames.push(ClipFrame {
                rgba: rgba.into(),
                hold,
            });
        }
        let total = frames.iter().map(|f| f.hold).sum();

        Ok(Self {
            id,
            label,
            width,
            height,
            frames,
            total,
            started: None,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Frame index and upload sequence number `elapsed` into playback.
    /// `seq` keeps counting across loops so every shown frame is new.
    pub fn position(&self, elapsed: Duration) -> (usize, u64) {
        let n = self.frames.len();
        if n <= 1 || self.total.is_zero() {
            return (0, 1);
        }
        let total = self.total.as_nanos();
        let loops = (elapsed.as_nanos() / total) as u64;
        let mut rem = elapsed.as_nanos() % total;

        let mut index = n - 1;
        for (i, f) in self.frames.iter().enumerate() {
            let hold = f.hold.as_nanos();
            if rem < hold {
                index = i;
                break;
            }
            rem -= hold;
        }
        (index, loops * n as u64 + index as u64 + 1)
    }
}

impl VideoCapture for FileVideo {
    /// Re-activating a clip that is already playing keeps its position.
    fn activate(&mut self, choice: DeviceChoice) -> Result<(), EngineError> {
        if let DeviceChoice::Device(id) = &choice {
            if *id != self.id {
                return Err(EngineError::VideoAcquire {
                    device: id.clone(),
                    msg: "no such device".into(),
                });
            }
        }
        if self.started.is_none() {
            self.started = Some(Instant::now());
            logi!("VIDEO", "playing {}", self.label);
        }
        Ok(())
    }

    fn deactivate(&mut self) {
        if self.started.take().is_some() {
            logi!("VIDEO", "stopped {}", self.label);
        }
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        let started = self.started?;
        let (index, seq) = self.position(started.elapsed());
        let frame = self.frames.get(index)?;
        Some(VideoFrame::new(self.width, self.height, seq, frame.rgba.clone()))
    }

    fn source_kind(&self) -> VideoSourceKind {
        if self.started.is_some() {
            VideoSourceKind::File
        } else {
            VideoSourceKind::None
        }
    }

    fn current_device(&self) -> Option<String> {
        self.started.map(|_| self.id.clone())
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        vec![DeviceInfo {
            id: self.id.clone(),
            label: self.label.clone(),
        }]
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn decode_sequence(dir: &Path) -> anyhow::Result<Vec<(u32, u32, Vec<u8>, Duration)>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| FRAME_EXTENSIONS.iter().any(|ext| has_extension(p, ext)))
        .collect();
    paths.sort();
    if paths.is_empty() {
        bail!("{}: no png or jpeg frames", dir.display());
    }

    let hold = Duration::from_secs_f32(1.0 / SEQUENCE_FPS);
    let mut out = Vec::with_capacity(paths.len());
    for p in &paths {
        let img = image::open(p).with_context(|| format!("decode {}", p.display()))?.to_rgba8();
        out.push((img.width(), img.height(), img.into_raw(), hold));
    }
    Ok(out)
}

fn decode_gif(path: &Path) -> anyhow::Result<Vec<(u32, u32, Vec<u8>, Duration)>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let frames = GifDecoder::new(BufReader::new(file))
        .and_then(|d| d.into_frames().collect_frames())
        .with_context(|| format!("decode {}", path.display()))?;

    Ok(frames
        .into_iter()
        .map(|f| {
            let (numer, denom) = f.delay().numer_denom_ms();
            let ms = if denom == 0 { 0.0 } else { numer as f64 / denom as f64 };
            let mut hold = Duration::from_secs_f64(ms / 1000.0);
            if hold < MIN_GIF_DELAY {
                hold = DEFAULT_GIF_DELAY;
            }
            let img = f.into_buffer();
            (img.width(), img.height(), img.into_raw(), hold)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadermidi_engine::automix::AutoMix;

    fn solid(w: u32, h: u32, v: u8, hold_ms: u64) -> (u32, u32, Vec<u8>, Duration) {
        (w, h, vec![v; (w * h * 4) as usize], Duration::from_millis(hold_ms))
    }

    fn clip(frames: Vec<(u32, u32, Vec<u8>, Duration)>) -> FileVideo {
        FileVideo::from_frames("file:clip".into(), "clip".into(), frames).unwrap()
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let d = std::env::temp_dir().join(format!("shadermidi-video-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&d);
        std::fs::create_dir_all(&d).unwrap();
        d
    }

    #[test]
    fn position_walks_holds_and_loops() {
        let c = clip(vec![solid(2, 2, 0, 100), solid(2, 2, 1, 50), solid(2, 2, 2, 50)]);
        assert_eq!(c.position(Duration::from_millis(0)), (0, 1));
        assert_eq!(c.position(Duration::from_millis(120)), (1, 2));
        assert_eq!(c.position(Duration::from_millis(160)), (2, 3));
        // second pass keeps counting
        assert_eq!(c.position(Duration::from_millis(210)), (0, 4));
        assert_eq!(c.position(Duration::from_millis(370)), (2, 6));
    }

    #[test]
    fn still_image_never_changes_seq() {
        let c = clip(vec![solid(3, 1, 9, 0)]);
        assert_eq!(c.position(Duration::ZERO), (0, 1));
        assert_eq!(c.position(Duration::from_secs(30)), (0, 1));
    }

    #[test]
    fn mismatched_frames_are_dropped() {
        let c = clip(vec![solid(2, 2, 0, 10), solid(4, 4, 1, 10), solid(2, 2, 2, 10)]);
        assert_eq!(c.frame_count(), 2);
        assert!(FileVideo::from_frames("x".into(), "x".into(), Vec::new()).is_err());
        assert!(FileVideo::from_frames("x".into(), "x".into(), vec![solid(0, 2, 0, 10)]).is_err());
    }

    #[test]
    fn playback_reports_file_source() {
        let mut c = clip(vec![solid(2, 2, 7, 40), solid(2, 2, 8, 40)]);
        assert_eq!(c.source_kind(), VideoSourceKind::None);
        assert!(c.current_frame().is_none());

        c.activate(DeviceChoice::Default).unwrap();
        assert_eq!(c.source_kind(), VideoSourceKind::File);
        assert_eq!(c.current_device().as_deref(), Some("file:clip"));
        let f = c.current_frame().unwrap();
        assert!(f.is_well_formed());

        assert!(c.activate(DeviceChoice::Device("cam0".into())).is_err());
        c.deactivate();
        assert_eq!(c.source_kind(), VideoSourceKind::None);
    }

    #[test]
    fn playing_file_still_lets_automix_ask_for_a_camera() {
        let mut c = clip(vec![solid(2, 2, 7, 40)]);
        c.activate(DeviceChoice::Default).unwrap();
        assert!(AutoMix::default().on_audio_to_hue(0.48, c.source_kind()).activate);
    }

    #[test]
    fn reactivation_keeps_position() {
        let mut c = clip(vec![solid(2, 2, 7, 40)]);
        c.activate(DeviceChoice::Default).unwrap();
        let first = c.started;
        c.activate(DeviceChoice::Device("file:clip".into())).unwrap();
        assert_eq!(c.started, first);
    }

    #[test]
    fn directory_frames_load_in_name_order() {
        let d = scratch_dir("seq");
        image::RgbaImage::from_pixel(4, 2, image::Rgba([200, 0, 0, 255])).save(d.join("frame_002.png")).unwrap();
        image::RgbaImage::from_pixel(4, 2, image::Rgba([0, 200, 0, 255])).save(d.join("frame_001.png")).unwrap();
        std::fs::write(d.join("notes.txt"), "ignored").unwrap();

        let v = FileVideo::open(&d).unwrap();
        assert_eq!(v.frame_count(), 2);
        assert_eq!((v.width, v.height), (4, 2));
        assert_eq!(&v.frames[0].rgba[..4], &[0, 200, 0, 255]);
        assert_eq!(&v.frames[1].rgba[..4], &[200, 0, 0, 255]);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let d = scratch_dir("empty");
        assert!(FileVideo::open(&d).is_err());
    }

    #[test]
    fn single_image_file_loads() {
        let d = scratch_dir("still");
        let p = d.join("still.png");
        image::RgbaImage::from_pixel(3, 3, image::Rgba([1, 2, 3, 255])).save(&p).unwrap();
        let v = FileVideo::open(&p).unwrap();
        assert_eq!(v.frame_count(), 1);
        assert_eq!(v.devices()[0].id, "file:still.png");
    }
}
