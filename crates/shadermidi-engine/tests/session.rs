use std::cell::RefCell;
use std::rc::Rc;

use shadermidi_engine::audio::{SpectrumSource, SPECTRUM_BINS};
use shadermidi_engine::catalog::{ShaderCatalog, ShadingProgram};
use shadermidi_engine::config::ControlsConfig;
use shadermidi_engine::control::{ControlAction, ControlEvent};
use shadermidi_engine::error::EngineError;
use shadermidi_engine::events::EngineEvent;
use shadermidi_engine::params::{ParamId, ParamValue};
use shadermidi_engine::pipeline::{FrameOutcome, FrameUniforms, RenderBackend};
use shadermidi_engine::session::Session;
use shadermidi_engine::shader::ComposedShader;
use shadermidi_engine::video::{DeviceChoice, DeviceInfo, VideoCapture, VideoFrame, VideoSourceKind};

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

#[derive(Default)]
struct Draw {
    time: f32,
    bass: f32,
    has_video: bool,
    video_mix: f32,
}

/// Records what the session asks of the GPU. Programs whose source contains
/// `BROKEN` fail to compile.
#[derive(Default)]
struct FakeBackend {
    next_id: u32,
    live: Vec<u32>,
    draws: Vec<Draw>,
    uploads: usize,
}

impl RenderBackend for FakeBackend {
    type Program = u32;

    fn compile(&mut self, shader: &ComposedShader) -> Result<u32, EngineError> {
        if shader.fragment.contains("BROKEN") {
            return Err(EngineError::Compile {
                program: shader.program_name.clone(),
                log: format!("0:{}(1): error: syntax error", shader.user_line_offset + 2),
            });
        }
        self.next_id += 1;
        self.live.push(self.next_id);
        Ok(self.next_id)
    }

    fn dispose(&mut self, program: u32) {
        self.live.retain(|&p| p != program);
    }

    fn upload_video(&mut self, _frame: &VideoFrame) -> Result<(), EngineError> {
        self.uploads += 1;
        Ok(())
    }

    fn clear_video(&mut self) {}

    fn draw(&mut self, _program: &u32, u: &FrameUniforms<'_>) -> Result<(), EngineError> {
        self.draws.push(Draw {
            time: u.time,
            bass: u.audio.bass,
            has_video: u.has_video,
            video_mix: u.params.get_f32(ParamId::VideoMix),
        });
        Ok(())
    }
}

/// Shared log of activate / deactivate calls so tests can check ordering.
type CallLog = Rc<RefCell<Vec<String>>>;

struct FakeCamera {
    devices: Vec<DeviceInfo>,
    active: Option<String>,
    fail: bool,
    seq: u64,
    calls: CallLog,
}

impl FakeCamera {
    fn new(calls: CallLog) -> Self {
        Self {
            devices: vec![
                DeviceInfo { id: "cam0".into(), label: "Built-in Camera".into() },
                DeviceInfo { id: "cam1".into(), label: "Logitech BRIO".into() },
            ],
            active: None,
            fail: false,
            seq: 0,
            calls,
        }
    }
}

impl VideoCapture for FakeCamera {
    fn activate(&mut self, choice: DeviceChoice) -> Result<(), EngineError> {
        self.calls.borrow_mut().push(format!("activate:{}", choice.label()));
        if self.fail {
            return Err(EngineError::VideoAcquire {
                device: choice.label().into(),
                msg: "permission denied".into(),
            });
        }
        self.active = Some(choice.label().to_string());
        Ok(())
    }

    fn deactivate(&mut self) {
        self.calls.borrow_mut().push("deactivate".into());
        self.active = None;
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        self.active.as_ref().map(|_| VideoFrame::new(2, 2, self.seq, vec![255u8; 16]))
    }

    fn source_kind(&self) -> VideoSourceKind {
        if self.active.is_some() {
            VideoSourceKind::Camera
        } else {
            VideoSourceKind::None
        }
    }

    fn current_device(&self) -> Option<String> {
        self.active.clone()
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        self.devices.clone()
    }
}

struct Loud;

impl SpectrumSource for Loud {
    fn label(&self) -> &str {
        "loud"
    }
    fn fill_magnitudes(&mut self, out: &mut [f32]) -> Result<(), EngineError> {
        assert_eq!(out.len(), SPECTRUM_BINS);
        out.iter_mut().for_each(|v| *v = 1.0);
        Ok(())
    }
}

const GOOD: &str = "void mainImage(out vec4 fragColor, in vec2 fragCoord) {\n    fragColor = vec4(1.0);\n}\n";
const BROKEN: &str = "void mainImage(out vec4 fragColor, in vec2 fragCoord) {\n    fragColor = BROKEN;\n}\n";

fn catalog(sources: &[(&str, &str)]) -> ShaderCatalog {
    ShaderCatalog::new(sources.iter().map(|(n, s)| ShadingProgram::new(*n, *s)).collect())
}

fn session(sources: &[(&str, &str)]) -> (Session<FakeBackend, FakeCamera>, CallLog) {
    let calls: CallLog = Rc::new(RefCell::new(Vec::new()));
    let mut s = Session::new(
        catalog(sources),
        &ControlsConfig::default(),
        FakeBackend::default(),
        FakeCamera::new(calls.clone()),
    );
    s.start();
    (s, calls)
}

fn cc(cc: u8, raw: u8) -> ControlEvent {
    ControlEvent::ControlChange {
        channel: 0,
        cc,
        value: raw as f32 / 127.0,
    }
}

#[test]
fn lenient_config_fallback_surfaces_as_event() {
    let calls: CallLog = Rc::new(RefCell::new(Vec::new()));
    let controls = ControlsConfig {
        load_error: Some(("assets/controls.json".into(), "expected value at line 1 column 3".into())),
        ..ControlsConfig::default()
    };
    let mut s = Session::new(catalog(&[("a.glsl", GOOD)]), &controls, FakeBackend::default(), FakeCamera::new(calls));
    let events = s.drain_events();
    assert_eq!(
        events[0],
        EngineEvent::ConfigError {
            path: "assets/controls.json".into(),
            error: "expected value at line 1 column 3".into(),
        }
    );
    assert!(matches!(events[1], EngineEvent::ConfigLoaded { path: None, .. }));
}

#[test]
fn clean_config_emits_no_error() {
    let (mut s, _) = session(&[("a.glsl", GOOD)]);
    assert!(!s.drain_events().iter().any(|e| matches!(e, EngineEvent::ConfigError { .. })));
}

#[test]
fn empty_catalog_idles_every_frame() {
    let (mut s, _) = session(&[]);
    for _ in 0..3 {
        assert_eq!(s.frame(0.016), FrameOutcome::Idle);
    }
    assert!(!s.next_shader());
    assert_eq!(s.handle_control(ControlEvent::NoteOn { channel: 0, note: 60 }), ControlAction::Ignored);
}

#[test]
fn audio_to_hue_at_threshold_activates_camera_at_full_mix() {
    let (mut s, calls) = session(&[("a.glsl", GOOD)]);
    s.set_parameter(ParamId::AudioToHue, ParamValue::Float(0.48)).unwrap();

    assert!(s.automix().camera_active());
    assert!(approx_eq(s.params().get_f32(ParamId::VideoMix), 1.0));
    assert_eq!(calls.borrow().as_slice(), ["activate:cam0"]);

    assert!(matches!(s.frame(0.016), FrameOutcome::Rendered { .. }));
    let d = s.pipeline().backend().draws.last().unwrap();
    assert!(d.has_video);
    assert!(approx_eq(d.video_mix, 1.0));
}

#[test]
fn far_from_threshold_releases_camera_and_zeroes_mix() {
    let (mut s, calls) = session(&[("a.glsl", GOOD)]);
    s.set_parameter(ParamId::AudioToHue, ParamValue::Float(0.48)).unwrap();
    s.set_parameter(ParamId::AudioToHue, ParamValue::Float(0.60)).unwrap();

    assert!(!s.automix().camera_active());
    assert!(approx_eq(s.params().get_f32(ParamId::VideoMix), 0.0));
    assert_eq!(calls.borrow().last().map(String::as_str), Some("deactivate"));
    assert_eq!(s.video().source_kind(), VideoSourceKind::None);
}

#[test]
fn hysteresis_keeps_camera_between_band_and_cutoff() {
    let (mut s, calls) = session(&[("a.glsl", GOOD)]);
    s.set_parameter(ParamId::AudioToHue, ParamValue::Float(0.47)).unwrap();
    s.set_parameter(ParamId::AudioToHue, ParamValue::Float(0.54)).unwrap();

    assert!(s.automix().camera_active());
    assert!(approx_eq(s.params().get_f32(ParamId::VideoMix), 0.8));
    // re-entering the band with a live camera must not re-acquire it
    s.set_parameter(ParamId::AudioToHue, ParamValue::Float(0.49)).unwrap();
    assert_eq!(calls.borrow().iter().filter(|c| c.starts_with("activate")).count(), 1);
}

#[test]
fn reactivation_prefers_previous_device() {
    let calls: CallLog = Rc::new(RefCell::new(Vec::new()));
    let mut controls = ControlsConfig::default();
    controls.automix.camera_preference = Some("logitech".into());
    let mut s = Session::new(catalog(&[("a.glsl", GOOD)]), &controls, FakeBackend::default(), FakeCamera::new(calls.clone()));
    s.start();

    s.set_parameter(ParamId::AudioToHue, ParamValue::Float(0.48)).unwrap();
    s.set_parameter(ParamId::AudioToHue, ParamValue::Float(0.9)).unwrap();
    s.set_parameter(ParamId::AudioToHue, ParamValue::Float(0.48)).unwrap();

    let log = calls.borrow();
    assert_eq!(log[0], "activate:cam1");
    assert_eq!(log.last().map(String::as_str), Some("activate:cam1"));
}

#[test]
fn camera_failure_resets_to_none_and_keeps_rendering() {
    let (mut s, _) = session(&[("a.glsl", GOOD)]);
    s.video_mut().fail = true;
    s.set_parameter(ParamId::AudioToHue, ParamValue::Float(0.48)).unwrap();

    assert!(!s.automix().camera_active());
    assert_eq!(s.video().source_kind(), VideoSourceKind::None);
    assert!(s.drain_events().iter().any(|e| matches!(e, EngineEvent::CameraFailed { .. })));
    assert!(matches!(s.frame(0.016), FrameOutcome::Rendered { .. }));
    assert!(!s.pipeline().backend().draws.last().unwrap().has_video);
}

#[test]
fn compile_failure_keeps_previous_program() {
    let (mut s, _) = session(&[("a.glsl", GOOD), ("b.glsl", BROKEN)]);
    assert!(!s.next_shader());

    assert_eq!(s.catalog().index(), Some(1));
    assert_eq!(s.pipeline().active_program(), Some("a.glsl"));
    assert!(matches!(s.frame(0.016), FrameOutcome::Rendered { .. }));

    let failed = s.drain_events().into_iter().find_map(|e| match e {
        EngineEvent::ShaderFailed { name, error } => Some((name, error)),
        _ => None,
    });
    let (name, error) = failed.unwrap();
    assert_eq!(name, "b.glsl");
    assert!(error.contains("b.glsl:2"), "{error}");
}

#[test]
fn navigation_disposes_previous_gpu_program() {
    let (mut s, _) = session(&[("a.glsl", GOOD), ("b.glsl", GOOD), ("c.glsl", GOOD)]);
    s.next_shader();
    s.next_shader();
    s.previous_shader();
    assert_eq!(s.pipeline().backend().live.len(), 1);
    assert_eq!(s.pipeline().active_program(), Some("b.glsl"));
}

#[test]
fn time_accumulates_with_speed() {
    let (mut s, _) = session(&[("a.glsl", GOOD)]);
    s.frame(0.5);
    s.set_parameter(ParamId::Speed, ParamValue::Float(3.0)).unwrap();
    s.frame(0.5);
    let d = &s.pipeline().backend().draws;
    assert!(approx_eq(d[0].time, 0.5));
    assert!(approx_eq(d[1].time, 2.0));
}

#[test]
fn midi_controls_drive_parameters_and_navigation() {
    let (mut s, _) = session(&[("a.glsl", GOOD), ("b.glsl", GOOD)]);

    s.handle_control(cc(1, 127));
    assert!(approx_eq(s.params().get_f32(ParamId::Hue), 360.0));

    s.handle_control(cc(18, 127));
    assert_eq!(s.params().get_int(ParamId::ScreenSplit), 3);

    // next_shader button: press, hold, release, press
    s.handle_control(cc(44, 127));
    s.handle_control(cc(44, 127));
    assert_eq!(s.catalog().index(), Some(1));
    s.handle_control(cc(44, 0));
    s.handle_control(cc(44, 127));
    assert_eq!(s.catalog().index(), Some(0));

    assert_eq!(s.handle_control(cc(100, 64)), ControlAction::Ignored);
}

#[test]
fn notes_select_programs_proportionally() {
    let (mut s, _) = session(&[("a.glsl", GOOD), ("b.glsl", GOOD), ("c.glsl", GOOD), ("d.glsl", GOOD)]);
    s.handle_control(ControlEvent::NoteOn { channel: 0, note: 64 });
    assert_eq!(s.catalog().index(), Some(2));
    s.handle_control(ControlEvent::NoteOn { channel: 0, note: 127 });
    assert_eq!(s.catalog().index(), Some(3));
}

#[test]
fn audio_bands_reach_the_backend_scaled_by_intensity() {
    let (mut s, _) = session(&[("a.glsl", GOOD)]);
    s.attach_audio(Box::new(Loud));
    s.frame(0.016);
    s.set_parameter(ParamId::AudioIntensity, ParamValue::Float(0.25)).unwrap();
    s.frame(0.016);

    assert!(approx_eq(s.last_bands().bass, 1.0));
    let d = &s.pipeline().backend().draws;
    assert!(approx_eq(d[0].bass, 0.0));
    assert!(approx_eq(d[1].bass, 0.25));
}

#[test]
fn unchanged_video_frame_is_uploaded_once() {
    let (mut s, _) = session(&[("a.glsl", GOOD)]);
    s.set_parameter(ParamId::AudioToHue, ParamValue::Float(0.48)).unwrap();
    s.frame(0.016);
    s.frame(0.016);
    s.frame(0.016);
    assert_eq!(s.pipeline().backend().uploads, 1);
}

#[test]
fn shutdown_releases_everything() {
    let (mut s, calls) = session(&[("a.glsl", GOOD)]);
    s.attach_audio(Box::new(Loud));
    s.set_parameter(ParamId::AudioToHue, ParamValue::Float(0.48)).unwrap();
    s.shutdown();

    assert!(s.pipeline().backend().live.is_empty());
    assert_eq!(s.video().source_kind(), VideoSourceKind::None);
    assert!(s.audio_source().is_none());
    assert_eq!(calls.borrow().last().map(String::as_str), Some("deactivate"));
    assert_eq!(s.frame(0.016), FrameOutcome::Idle);
}
