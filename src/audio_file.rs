//! Audio file source: decode once, loop it through the default output device,
//! analyse the window at the current playback position.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use shadermidi_engine::audio::{AnalyserSettings, SpectrumAnalyser, SpectrumSource, FFT_SIZE};
use shadermidi_engine::{logi, logw, EngineError};

pub const MIN_RATE: f32 = 0.25;
pub const MAX_RATE: f32 = 4.0;

pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode any supported file to mono f32.
pub fn decode_audio(path: &Path) -> Result<AudioData> {
    let file = std::fs::File::open(path).with_context(|| format!("open audio file {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("probe audio format")?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .context("no audio track")?;
    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
    let sample_rate = track.codec_params.sample_rate.context("unknown sample rate")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("create audio decoder")?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let mut buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        downmix_into(buf.samples(), channels, &mut samples);
    }

    if samples.is_empty() {
        return Err(anyhow!("{} decoded to zero samples", path.display()));
    }

    logi!(
        "AUDIO",
        "decoded {}: {} samples, {} Hz, {:.1}s",
        path.display(),
        samples.len(),
        sample_rate,
        samples.len() as f32 / sample_rate as f32
    );

    Ok(AudioData { samples, sample_rate })
}

fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    for frame in interleaved.chunks(channels) {
        out.push(frame.iter().sum::<f32>() / channels as f32);
    }
}

pub fn clamp_rate(speed: f32) -> f32 {
    if speed.is_finite() {
        speed.clamp(MIN_RATE, MAX_RATE)
    } else {
        1.0
    }
}

/// State shared between the output callback and the render thread.
struct Playback {
    /// Fractional sample index into the decoded buffer, as f64 bits.
    position: AtomicU64,
    /// Playback rate, as f32 bits.
    rate: AtomicU32,
    failed: AtomicBool,
}

impl Playback {
    fn position(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Relaxed))
    }

    fn rate(&self) -> f32 {
        f32::from_bits(self.rate.load(Ordering::Relaxed))
    }
}

/// Render-thread handle for adjusting the playback rate.
#[derive(Clone)]
pub struct PlaybackHandle(Arc<Playback>);

impl PlaybackHandle {
    pub fn set_rate(&self, speed: f32) {
        self.0.rate.store(clamp_rate(speed).to_bits(), Ordering::Relaxed);
    }

    pub fn rate(&self) -> f32 {
        self.0.rate()
    }
}

pub struct FileSource {
    label: String,
    _stream: cpal::Stream,
    samples: Arc<[f32]>,
    shared: Arc<Playback>,
    window: Vec<f32>,
    analyser: SpectrumAnalyser,
}

impl FileSource {
    pub fn open(path: &Path, settings: AnalyserSettings) -> Result<(Self, PlaybackHandle)> {
        let data = decode_audio(path)?;
        let samples: Arc<[f32]> = data.samples.into();

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| anyhow!("no default output device found"))?;
        let supported = device.default_output_config().context("get default output config")?;
        let out_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.clone().into();

        let shared = Arc::new(Playback {
            position: AtomicU64::new(0f64.to_bits()),
            rate: AtomicU32::new(1f32.to_bits()),
            failed: AtomicBool::new(false),
        });

        let step = data.sample_rate as f64 / out_rate as f64;
        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_output::<f32>(&device, &config, channels, step, &samples, &shared)?,
            SampleFormat::I16 => build_output::<i16>(&device, &config, channels, step, &samples, &shared)?,
            SampleFormat::U16 => build_output::<u16>(&device, &config, channels, step, &samples, &shared)?,
            fmt => return Err(anyhow!("unsupported output sample format: {fmt:?}")),
        };
        stream.play().context("start output stream")?;

        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("file").to_string();
        logi!("AUDIO", "playing '{name}' in a loop ({out_rate} Hz out)");

        let handle = PlaybackHandle(Arc::clone(&shared));
        Ok((
            Self {
                label: format!("file:{name}"),
                _stream: stream,
                samples,
                shared,
                window: vec![0.0; FFT_SIZE],
                analyser: SpectrumAnalyser::new(settings),
            },
            handle,
        ))
    }
}

impl SpectrumSource for FileSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn fill_magnitudes(&mut self, out: &mut [f32]) -> Result<(), EngineError> {
        if self.shared.failed.load(Ordering::Relaxed) {
            return Err(EngineError::AudioAcquire {
                source_label: self.label.clone(),
                msg: "output stream stopped".into(),
            });
        }
        window_ending_at(&self.samples, self.shared.position() as usize, &mut self.window);
        self.analyser.process(&self.window, out);
        Ok(())
    }
}

/// Copy the `out.len()` samples before `end` (wrapping, since playback loops).
fn window_ending_at(samples: &[f32], end: usize, out: &mut [f32]) {
    let len = samples.len();
    if len == 0 {
        out.iter_mut().for_each(|v| *v = 0.0);
        return;
    }
    let n = out.len();
    let end = end % len;
    for (i, slot) in out.iter_mut().enumerate() {
        let back = (n - i) % len;
        *slot = samples[(end + len - back) % len];
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    step: f64,
    samples: &Arc<[f32]>,
    shared: &Arc<Playback>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = channels.max(1);
    let samples = Arc::clone(samples);
    let shared_cb = Arc::clone(shared);
    let shared_err = Arc::clone(shared);
    let len = samples.len() as f64;

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let mut pos = shared_cb.position();
            let adv = step * shared_cb.rate() as f64;
            for frame in data.chunks_mut(channels) {
                let v = samples[(pos as usize).min(samples.len() - 1)];
                for s in frame.iter_mut() {
                    *s = T::from_sample(v);
                }
                pos += adv;
                if pos >= len {
                    pos -= len;
                }
            }
            shared_cb.position.store(pos.to_bits(), Ordering::Relaxed);
        },
        move |err| {
            logw!("AUDIO", "output stream error: {err}");
            shared_err.failed.store(true, Ordering::Relaxed);
        },
        None,
    )?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_is_clamped() {
        assert_eq!(clamp_rate(0.0), MIN_RATE);
        assert_eq!(clamp_rate(10.0), MAX_RATE);
        assert_eq!(clamp_rate(1.5), 1.5);
        assert_eq!(clamp_rate(f32::NAN), 1.0);
    }

    #[test]
    fn downmix_averages_channels() {
        let mut out = Vec::new();
        downmix_into(&[1.0, 0.0, 0.5, 0.5], 2, &mut out);
        assert_eq!(out, vec![0.5, 0.5]);
    }

    #[test]
    fn window_wraps_around_loop_start() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let mut out = [0.0; 4];
        window_ending_at(&samples, 2, &mut out);
        assert_eq!(out, [8.0, 9.0, 0.0, 1.0]);
        window_ending_at(&samples, 6, &mut out);
        assert_eq!(out, [2.0, 3.0, 4.0, 5.0]);
    }
}
