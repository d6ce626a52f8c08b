//! Shader composition pipeline.
//!
//! The pipeline owns the parameter table, the latest audio bands and video
//! frame, the accumulated time, and the active GPU program. The GPU itself sits
//! behind [`RenderBackend`] so the rest of the engine runs without a context.

use crate::audio::AudioBands;
use crate::catalog::ShadingProgram;
use crate::error::EngineError;
use crate::params::{ParamId, ParamTable, ParamValue};
use crate::shader::{compose, ComposedShader};
use crate::video::VideoFrame;
use crate::{loge, logi, logw};

/// Everything a backend needs to bind for one draw.
#[derive(Debug, Clone, Copy)]
pub struct FrameUniforms<'a> {
    pub time: f32,
    pub time_delta: f32,
    pub frame: i32,
    pub resolution: [f32; 2],
    pub params: &'a ParamTable,
    /// Already multiplied by `audioIntensity`.
    pub audio: AudioBands,
    pub has_video: bool,
}

pub trait RenderBackend {
    type Program;

    fn compile(&mut self, shader: &ComposedShader) -> Result<Self::Program, EngineError>;

    fn dispose(&mut self, program: Self::Program);

    fn upload_video(&mut self, frame: &VideoFrame) -> Result<(), EngineError>;

    fn clear_video(&mut self);

    fn draw(&mut self, program: &Self::Program, uniforms: &FrameUniforms<'_>) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered { frame: u64 },
    /// No program loaded; nothing drawn.
    Idle,
    /// The backend failed this draw. State is untouched and the next frame retries.
    Skipped,
}

struct ActiveProgram<P> {
    name: String,
    program: P,
}

pub struct Pipeline<B: RenderBackend> {
    backend: B,
    active: Option<ActiveProgram<B::Program>>,
    params: ParamTable,
    bands: AudioBands,
    video: Option<VideoFrame>,
    uploaded_seq: Option<u64>,
    resolution: [f32; 2],
    base_time: f64,
    frame: u64,
}

impl<B: RenderBackend> Pipeline<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            active: None,
            params: ParamTable::new(),
            bands: AudioBands::ZERO,
            video: None,
            uploaded_seq: None,
            resolution: [1.0, 1.0],
            base_time: 0.0,
            frame: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn params(&self) -> &ParamTable {
        &self.params
    }

    pub fn active_program(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.name.as_str())
    }

    pub fn time(&self) -> f32 {
        self.base_time as f32
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Compose, compile and swap in `program`.
    ///
    /// On failure the previous program (if any) stays active. On success the
    /// previous GPU program is disposed inside this call.
    pub fn load_program(&mut self, program: &ShadingProgram) -> Result<(), EngineError> {
        let composed = compose(program).map_err(|e| {
            loge!("SHADER", "{e}");
            e
        })?;

        let compiled = match self.backend.compile(&composed) {
            Ok(p) => p,
            Err(EngineError::Compile { program: name, log }) => {
                let e = EngineError::Compile {
                    program: name,
                    log: composed.translate_log(&log),
                };
                loge!("SHADER", "{e}");
                return Err(e);
            }
            Err(e) => {
                loge!("SHADER", "{e}");
                return Err(e);
            }
        };

        let next = ActiveProgram {
            name: program.name.clone(),
            program: compiled,
        };
        if let Some(old) = self.active.replace(next) {
            self.backend.dispose(old.program);
        }
        self.frame = 0;
        logi!("SHADER", "loaded: {}", program.name);
        Ok(())
    }

    /// Drop the active program. Rendering idles until the next load.
    pub fn unload(&mut self) {
        if let Some(old) = self.active.take() {
            self.backend.dispose(old.program);
        }
        if self.uploaded_seq.take().is_some() {
            self.backend.clear_video();
        }
    }

    /// The single write path into parameter state.
    pub fn set_parameter(&mut self, id: ParamId, value: ParamValue) -> Result<ParamValue, EngineError> {
        self.params.set(id, value)
    }

    pub fn set_audio_bands(&mut self, bands: AudioBands) {
        self.bands = bands;
    }

    pub fn set_video_frame(&mut self, frame: Option<VideoFrame>) {
        self.video = frame;
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.resolution = [width.max(1) as f32, height.max(1) as f32];
    }

    fn sync_video(&mut self) {
        let Some(f) = self.video.as_ref() else {
            if self.uploaded_seq.take().is_some() {
                self.backend.clear_video();
            }
            return;
        };
        if Some(f.seq) == self.uploaded_seq {
            return;
        }
        if !f.is_well_formed() {
            logw!("VIDEO", "dropping malformed frame {}x{} ({} bytes)", f.width, f.height, f.rgba.len());
            self.video = None;
            return;
        }
        match self.backend.upload_video(f) {
            Ok(()) => self.uploaded_seq = Some(f.seq),
            Err(e) => {
                logw!("VIDEO", "upload failed: {e}");
                self.backend.clear_video();
                self.uploaded_seq = None;
            }
        }
    }

    /// Advance time by `dt * speed` and draw one frame. Never fails.
    pub fn render_frame(&mut self, dt: f32) -> FrameOutcome {
        if self.active.is_none() {
            return FrameOutcome::Idle;
        }

        self.sync_video();

        let speed = self.params.get_f32(ParamId::Speed);
        let step = if dt.is_finite() { dt.max(0.0) * speed } else { 0.0 };
        self.base_time += step as f64;

        let gain = self.params.get_f32(ParamId::AudioIntensity);
        let audio = AudioBands {
            bass: self.bands.bass * gain,
            mid: self.bands.mid * gain,
            treble: self.bands.treble * gain,
            intensity: self.bands.intensity * gain,
        };

        let uniforms = FrameUniforms {
            time: self.base_time as f32,
            time_delta: step,
            frame: self.frame.min(i32::MAX as u64) as i32,
            resolution: self.resolution,
            params: &self.params,
            audio,
            has_video: self.uploaded_seq.is_some(),
        };

        let Some(active) = self.active.as_ref() else {
            return FrameOutcome::Idle;
        };
        match self.backend.draw(&active.program, &uniforms) {
            Ok(()) => {
                let drawn = self.frame;
                self.frame += 1;
                FrameOutcome::Rendered { frame: drawn }
            }
            Err(e) => {
                logw!("RENDER", "draw failed: {e}");
                FrameOutcome::Skipped
            }
        }
    }
}
