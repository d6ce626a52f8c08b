//! Live audio input (microphone / line-in) via cpal.
//!
//! The capture callback downmixes to mono and pushes into a lock-free ring
//! buffer; the render thread pops whatever arrived since the last frame and
//! analyses the newest window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat};
use ringbuf::traits::{Consumer as _, Observer as _, Producer as _, Split as _};
use ringbuf::HeapRb;

use shadermidi_engine::audio::{AnalyserSettings, SpectrumAnalyser, SpectrumSource, FFT_SIZE};
use shadermidi_engine::{logi, logw, EngineError};

pub struct MicSource {
    label: String,
    _stream: cpal::Stream,
    cons: ringbuf::HeapCons<f32>,
    failed: Arc<AtomicBool>,
    scratch: Vec<f32>,
    history: Vec<f32>,
    analyser: SpectrumAnalyser,
}

impl MicSource {
    pub fn open(device_query: Option<&str>, settings: AnalyserSettings) -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = select_input_device(&host, device_query)?;
        let name = device.name().unwrap_or_else(|_| "unknown input".into());
        let supported = device.default_input_config().context("get default input config")?;
        let sample_rate_hz = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.clone().into();

        // A second of audio is plenty; the reader drains every frame.
        let rb = HeapRb::<f32>::new((sample_rate_hz as usize).max(FFT_SIZE * 4));
        let (mut prod, cons) = rb.split();

        let failed = Arc::new(AtomicBool::new(false));
        let failed_cb = Arc::clone(&failed);
        let err_fn = move |err| {
            logw!("AUDIO", "input stream error: {err}");
            failed_cb.store(true, Ordering::Relaxed);
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            fmt => return Err(anyhow!("unsupported sample format: {fmt:?}")),
        };
        stream.play().context("start input stream")?;

        logi!("AUDIO", "capturing '{name}' ({sample_rate_hz} Hz, {channels} ch)");

        Ok(Self {
            label: format!("mic:{name}"),
            _stream: stream,
            cons,
            failed,
            scratch: vec![0.0; 4096],
            history: Vec::with_capacity(FFT_SIZE * 2),
            analyser: SpectrumAnalyser::new(settings),
        })
    }
}

impl SpectrumSource for MicSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn fill_magnitudes(&mut self, out: &mut [f32]) -> Result<(), EngineError> {
        if self.failed.load(Ordering::Relaxed) {
            return Err(EngineError::AudioAcquire {
                source_label: self.label.clone(),
                msg: "input stream stopped".into(),
            });
        }

        while self.cons.occupied_len() > 0 {
            let n = self.cons.pop_slice(&mut self.scratch);
            if n == 0 {
                break;
            }
            self.history.extend_from_slice(&self.scratch[..n]);
            if self.history.len() > FFT_SIZE {
                let excess = self.history.len() - FFT_SIZE;
                self.history.drain(..excess);
            }
        }

        self.analyser.process(&self.history, out);
        Ok(())
    }
}

fn select_input_device(host: &cpal::Host, device_query: Option<&str>) -> anyhow::Result<cpal::Device> {
    let want = device_query.map(str::to_lowercase).filter(|s| !s.is_empty());
    if let Some(want) = want.as_deref() {
        let devices = host.input_devices().context("enumerate input devices")?.collect::<Vec<_>>();
        if let Some(dev) = devices
            .iter()
            .find(|d| d.name().map(|n| n.to_lowercase().contains(want)).unwrap_or(false))
        {
            return Ok(dev.clone());
        }
        return Err(anyhow!("no input device matching: {want}"));
    }

    host.default_input_device().ok_or_else(|| anyhow!("no default input device found"))
}

fn push_interleaved<T: Sample<Float = f32> + Copy>(data: &[T], channels: usize, prod: &mut ringbuf::HeapProd<f32>) {
    let channels = channels.max(1);
    for frame in data.chunks(channels) {
        let acc: f32 = frame.iter().map(|s| s.to_float_sample()).sum();
        let _ = prod.try_push(acc / channels as f32);
    }
}
