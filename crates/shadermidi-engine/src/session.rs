//! Session: the one place engine state is mutated.
//!
//! A host feeds it control events and frame ticks from a single thread. The
//! session routes control actions, runs auto-mix whenever `audioToHue` changes,
//! pulls audio bands and the newest video frame each tick and renders.

use crate::audio::{AudioAnalyzer, AudioBands, SpectrumSource};
use crate::automix::AutoMix;
use crate::catalog::ShaderCatalog;
use crate::config::ControlsConfig;
use crate::control::{ControlAction, ControlEvent, ControlMapper};
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::params::{ParamId, ParamTable, ParamValue};
use crate::pipeline::{FrameOutcome, Pipeline, RenderBackend};
use crate::video::{choose_device, VideoCapture, VideoSourceKind};
use crate::{loge, logi, logw};

pub struct Session<B: RenderBackend, V: VideoCapture> {
    catalog: ShaderCatalog,
    mapper: ControlMapper,
    automix: AutoMix,
    camera_preference: Option<String>,
    last_device: Option<String>,
    analyzer: AudioAnalyzer,
    last_bands: AudioBands,
    video: V,
    pipeline: Pipeline<B>,
    events: Vec<EngineEvent>,
}

impl<B: RenderBackend, V: VideoCapture> Session<B, V> {
    pub fn new(catalog: ShaderCatalog, controls: &ControlsConfig, backend: B, video: V) -> Self {
        let mapper = ControlMapper::new(&controls.entries, controls.channel);
        let mut events = Vec::new();
        if let Some((path, error)) = &controls.load_error {
            events.push(EngineEvent::ConfigError {
                path: path.clone(),
                error: error.clone(),
            });
        }
        events.push(EngineEvent::ConfigLoaded {
            path: controls.path.clone(),
            mappings: mapper.len(),
        });
        Self {
            catalog,
            mapper,
            automix: AutoMix::new(controls.automix.threshold, controls.automix.band),
            camera_preference: controls.automix.camera_preference.clone(),
            last_device: None,
            analyzer: AudioAnalyzer::new(),
            last_bands: AudioBands::ZERO,
            video,
            pipeline: Pipeline::new(backend),
            events,
        }
    }

    /// Load the first program. An empty catalog leaves the session idle.
    pub fn start(&mut self) -> bool {
        if self.catalog.is_empty() {
            loge!("SHADER", "no shading programs found; nothing will render");
            return false;
        }
        self.load_current()
    }

    pub fn catalog(&self) -> &ShaderCatalog {
        &self.catalog
    }

    pub fn params(&self) -> &ParamTable {
        self.pipeline.params()
    }

    pub fn pipeline(&self) -> &Pipeline<B> {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline<B> {
        &mut self.pipeline
    }

    pub fn video(&self) -> &V {
        &self.video
    }

    pub fn video_mut(&mut self) -> &mut V {
        &mut self.video
    }

    pub fn automix(&self) -> &AutoMix {
        &self.automix
    }

    pub fn mapper(&self) -> &ControlMapper {
        &self.mapper
    }

    /// Bands from the most recent [`frame`](Self::frame), before `audioIntensity`.
    pub fn last_bands(&self) -> AudioBands {
        self.last_bands
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn attach_audio(&mut self, source: Box<dyn SpectrumSource>) {
        self.analyzer.attach(source);
    }

    pub fn detach_audio(&mut self) {
        self.analyzer.detach();
    }

    pub fn audio_source(&self) -> Option<&str> {
        self.analyzer.source_label()
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.pipeline.set_resolution(width, height);
    }

    /// Route one control-surface event. Unmapped input is ignored.
    pub fn handle_control(&mut self, event: ControlEvent) -> ControlAction {
        let action = self.mapper.handle_event(event, self.catalog.len());
        match action {
            ControlAction::SetParam { id, value } => {
                if let Err(e) = self.set_parameter(id, value) {
                    logw!("PARAMS", "{e}");
                }
            }
            ControlAction::SelectShader(i) => {
                self.select_shader(i);
            }
            ControlAction::NextShader => {
                self.next_shader();
            }
            ControlAction::PreviousShader => {
                self.previous_shader();
            }
            ControlAction::Ignored => {}
        }
        action
    }

    /// Write one parameter. Setting `audioToHue` also runs auto-mix.
    pub fn set_parameter(&mut self, id: ParamId, value: ParamValue) -> Result<ParamValue, EngineError> {
        let stored = self.pipeline.set_parameter(id, value)?;
        logi!("PARAMS", "{} = {:.2}", id.name(), stored.as_f32());
        self.events.push(EngineEvent::ParamChanged { id, value: stored });
        if id == ParamId::AudioToHue {
            self.run_automix(stored.as_f32());
        }
        Ok(stored)
    }

    pub fn set_parameter_by_name(&mut self, name: &str, value: ParamValue) -> Result<ParamValue, EngineError> {
        let id = ParamId::from_name(name)?;
        self.set_parameter(id, value)
    }

    fn run_automix(&mut self, v: f32) {
        let decision = self.automix.on_audio_to_hue(v, self.video.source_kind());

        if decision.activate {
            let choice = choose_device(&self.video.devices(), self.last_device.as_deref(), self.camera_preference.as_deref());
            logi!("AUTOMIX", "audioToHue {v:.2} -> activating camera '{}'", choice.label());
            if self.video.source_kind() != VideoSourceKind::None {
                self.video.deactivate();
            }
            match self.video.activate(choice.clone()) {
                Ok(()) => {
                    let device = self.video.current_device().unwrap_or_else(|| choice.label().to_string());
                    self.last_device = Some(device.clone());
                    self.events.push(EngineEvent::CameraActivated { device });
                }
                Err(e) => {
                    logw!("VIDEO", "{e}");
                    self.video.deactivate();
                    self.events.push(EngineEvent::CameraFailed {
                        device: choice.label().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if decision.deactivate {
            logi!("AUTOMIX", "audioToHue {v:.2} -> releasing camera");
            self.video.deactivate();
            self.events.push(EngineEvent::CameraDeactivated);
        }

        if let Some(mix) = decision.video_mix {
            match self.pipeline.set_parameter(ParamId::VideoMix, ParamValue::Float(mix)) {
                Ok(stored) => self.events.push(EngineEvent::ParamChanged {
                    id: ParamId::VideoMix,
                    value: stored,
                }),
                Err(e) => logw!("AUTOMIX", "{e}"),
            }
        }

        self.automix.confirm(self.video.source_kind() == VideoSourceKind::Camera);
    }

    pub fn next_shader(&mut self) -> bool {
        if self.catalog.next().is_none() {
            return false;
        }
        self.load_current()
    }

    pub fn previous_shader(&mut self) -> bool {
        if self.catalog.previous().is_none() {
            return false;
        }
        self.load_current()
    }

    /// Out-of-range indices are ignored.
    pub fn select_shader(&mut self, index: usize) -> bool {
        if self.catalog.select_index(index).is_none() {
            return false;
        }
        self.load_current()
    }

    /// The catalog index moves even when loading fails; the previous program
    /// keeps rendering.
    fn load_current(&mut self) -> bool {
        let Some(program) = self.catalog.current().cloned() else {
            return false;
        };
        match self.pipeline.load_program(&program) {
            Ok(()) => {
                self.events.push(EngineEvent::ShaderLoaded {
                    name: program.name,
                    index: self.catalog.index().unwrap_or(0),
                    count: self.catalog.len(),
                });
                true
            }
            Err(e) => {
                self.events.push(EngineEvent::ShaderFailed {
                    name: program.name,
                    error: e.to_string(),
                });
                false
            }
        }
    }

    /// One render tick.
    pub fn frame(&mut self, dt: f32) -> FrameOutcome {
        self.last_bands = self.analyzer.sample();
        self.pipeline.set_audio_bands(self.last_bands);

        let frame = match self.video.source_kind() {
            VideoSourceKind::None => None,
            VideoSourceKind::Camera | VideoSourceKind::File => self.video.current_frame(),
        };
        self.pipeline.set_video_frame(frame);

        self.pipeline.render_frame(dt)
    }

    /// Release every device and GPU object.
    pub fn shutdown(&mut self) {
        self.pipeline.unload();
        self.video.deactivate();
        self.analyzer.detach();
        logi!("INIT", "session shut down");
    }
}
