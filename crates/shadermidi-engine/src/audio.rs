//! Audio band analysis.
//!
//! A [`SpectrumSource`] yields a normalized magnitude vector of [`SPECTRUM_BINS`]
//! bins. [`AudioAnalyzer::sample`] reduces it to bass / mid / treble averages over
//! fixed bin ranges, recomputed on every call.
//!
//! [`SpectrumAnalyser`] turns raw time-domain samples into that vector with the
//! usual analyser settings (FFT 256, Blackman window, 0.8 smoothing, -100..-30 dB).

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::error::EngineError;
use crate::{logi, logw};

pub const FFT_SIZE: usize = 256;
pub const SPECTRUM_BINS: usize = FFT_SIZE / 2;

pub const BASS_BINS: std::ops::Range<usize> = 0..10;
pub const MID_BINS: std::ops::Range<usize> = 10..50;
pub const TREBLE_BINS: std::ops::Range<usize> = 50..128;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioBands {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub intensity: f32,
}

impl AudioBands {
    pub const ZERO: AudioBands = AudioBands {
        bass: 0.0,
        mid: 0.0,
        treble: 0.0,
        intensity: 0.0,
    };

    /// Reduce a normalized spectrum to band averages. Bins past the end of
    /// `bins` count as zero; the divisor is always the nominal range width.
    pub fn from_spectrum(bins: &[f32]) -> AudioBands {
        let bass = band_average(bins, BASS_BINS);
        let mid = band_average(bins, MID_BINS);
        let treble = band_average(bins, TREBLE_BINS);
        AudioBands {
            bass,
            mid,
            treble,
            intensity: (bass + mid + treble) / 3.0,
        }
    }
}

fn band_average(bins: &[f32], range: std::ops::Range<usize>) -> f32 {
    let width = range.len() as f32;
    let sum: f32 = bins
        .iter()
        .skip(range.start)
        .take(range.len())
        .map(|v| v.clamp(0.0, 1.0))
        .sum();
    sum / width
}

/// Something that can produce a normalized magnitude spectrum on demand.
pub trait SpectrumSource {
    /// Human-readable source name for logs.
    fn label(&self) -> &str;

    /// Fill `out` (length [`SPECTRUM_BINS`]) with magnitudes in `0..=1`.
    fn fill_magnitudes(&mut self, out: &mut [f32]) -> Result<(), EngineError>;
}

/// Owns the active audio source (if any) and computes bands per frame.
pub struct AudioAnalyzer {
    source: Option<Box<dyn SpectrumSource>>,
    bins: Vec<f32>,
}

impl Default for AudioAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioAnalyzer {
    pub fn new() -> Self {
        Self {
            source: None,
            bins: vec![0.0; SPECTRUM_BINS],
        }
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn source_label(&self) -> Option<&str> {
        self.source.as_deref().map(|s| s.label())
    }

    /// Replace the active source. The previous one is dropped first so its
    /// device is released before the new one is stored.
    pub fn attach(&mut self, source: Box<dyn SpectrumSource>) {
        self.detach();
        logi!("AUDIO", "source attached: {}", source.label());
        self.source = Some(source);
    }

    pub fn detach(&mut self) {
        if let Some(old) = self.source.take() {
            logi!("AUDIO", "source detached: {}", old.label());
            drop(old);
        }
        self.bins.iter_mut().for_each(|b| *b = 0.0);
    }

    /// Never fails: with no source, or after a source error, bands are zero.
    pub fn sample(&mut self) -> AudioBands {
        let Some(source) = self.source.as_mut() else {
            return AudioBands::ZERO;
        };
        match source.fill_magnitudes(&mut self.bins) {
            Ok(()) => AudioBands::from_spectrum(&self.bins),
            Err(e) => {
                logw!("AUDIO", "source failed, detaching: {e}");
                self.detach();
                AudioBands::ZERO
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserSettings {
    pub smoothing: f32,
    pub min_db: f32,
    pub max_db: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
        }
    }
}

/// Time-domain window -> smoothed, dB-normalized spectrum.
pub struct SpectrumAnalyser {
    settings: AnalyserSettings,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buf: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyser {
    pub fn new(settings: AnalyserSettings) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        Self {
            settings,
            fft,
            window: blackman_window(FFT_SIZE),
            buf: vec![Complex { re: 0.0, im: 0.0 }; FFT_SIZE],
            smoothed: vec![0.0; SPECTRUM_BINS],
        }
    }

    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Analyse the most recent `FFT_SIZE` samples of `samples` (zero-padded at
    /// the front when shorter) into `out`.
    pub fn process(&mut self, samples: &[f32], out: &mut [f32]) {
        let start = samples.len().saturating_sub(FFT_SIZE);
        let tail = &samples[start..];
        let pad = FFT_SIZE - tail.len();

        for (i, slot) in self.buf.iter_mut().enumerate() {
            let s = if i < pad { 0.0 } else { tail[i - pad] };
            *slot = Complex { re: s * self.window[i], im: 0.0 };
        }
        self.fft.process(&mut self.buf);

        let s = self.settings.smoothing.clamp(0.0, 1.0);
        let range = (self.settings.max_db - self.settings.min_db).max(f32::EPSILON);
        for (k, o) in out.iter_mut().enumerate().take(SPECTRUM_BINS) {
            let mag = self.buf[k].norm() / FFT_SIZE as f32;
            self.smoothed[k] = s * self.smoothed[k] + (1.0 - s) * mag;
            let db = 20.0 * self.smoothed[k].max(1e-12).log10();
            *o = ((db - self.settings.min_db) / range).clamp(0.0, 1.0);
        }
    }
}

fn blackman_window(n: usize) -> Vec<f32> {
    let a0 = 0.42;
    let a1 = 0.5;
    let a2 = 0.08;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    struct Fixed(Vec<f32>);

    impl SpectrumSource for Fixed {
        fn label(&self) -> &str {
            "fixed"
        }
        fn fill_magnitudes(&mut self, out: &mut [f32]) -> Result<(), EngineError> {
            out.copy_from_slice(&self.0);
            Ok(())
        }
    }

    struct Broken;

    impl SpectrumSource for Broken {
        fn label(&self) -> &str {
            "broken"
        }
        fn fill_magnitudes(&mut self, _out: &mut [f32]) -> Result<(), EngineError> {
            Err(EngineError::AudioAcquire {
                source_label: "broken".into(),
                msg: "device unplugged".into(),
            })
        }
    }

    #[test]
    fn no_source_yields_exact_zero() {
        let mut a = AudioAnalyzer::new();
        assert_eq!(a.sample(), AudioBands { bass: 0.0, mid: 0.0, treble: 0.0, intensity: 0.0 });
    }

    #[test]
    fn bands_average_fixed_ranges() {
        let mut bins = vec![0.0; SPECTRUM_BINS];
        bins[..10].iter_mut().for_each(|b| *b = 1.0);
        bins[10..50].iter_mut().for_each(|b| *b = 0.5);
        let mut a = AudioAnalyzer::new();
        a.attach(Box::new(Fixed(bins)));
        let b = a.sample();
        assert!(approx_eq(b.bass, 1.0));
        assert!(approx_eq(b.mid, 0.5));
        assert!(approx_eq(b.treble, 0.0));
        assert!(approx_eq(b.intensity, 0.5));
    }

    #[test]
    fn failing_source_detaches_and_reads_zero() {
        let mut a = AudioAnalyzer::new();
        a.attach(Box::new(Broken));
        assert_eq!(a.sample(), AudioBands::ZERO);
        assert!(!a.has_source());
        assert_eq!(a.sample(), AudioBands::ZERO);
    }

    #[test]
    fn silence_analyses_to_zero() {
        let mut an = SpectrumAnalyser::new(AnalyserSettings::default());
        let mut out = vec![1.0; SPECTRUM_BINS];
        an.process(&[0.0; FFT_SIZE], &mut out);
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn low_sine_lands_in_bass_band() {
        let mut an = SpectrumAnalyser::new(AnalyserSettings { smoothing: 0.0, ..Default::default() });
        // Bin 4 of a 256-point FFT.
        let samples: Vec<f32> = (0..FFT_SIZE)
            .map(|i| (2.0 * PI * 4.0 * i as f32 / FFT_SIZE as f32).sin())
            .collect();
        let mut out = vec![0.0; SPECTRUM_BINS];
        an.process(&samples, &mut out);
        let bands = AudioBands::from_spectrum(&out);
        assert!(bands.bass > bands.treble);
        assert!(out[4] > 0.9);
    }
}
