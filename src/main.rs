use anyhow::{anyhow, Context};
use clap::Parser;
use glutin::config::ConfigTemplateBuilder;
use glutin::context::{ContextApi, ContextAttributesBuilder, NotCurrentContext, Version};
use glutin::display::GetGlDisplay;
use glutin::prelude::*;
use glutin::surface::{SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use glutin_winit::DisplayBuilder;

use raw_window_handle::HasRawWindowHandle;

use std::ffi::CString;
use std::num::NonZeroU32;
use std::time::Instant;

use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Fullscreen, Window};

use shadermidi_engine::assets::{discover_shaders, AssetsRoot};
use shadermidi_engine::catalog::ShaderCatalog;
use shadermidi_engine::config::{load_controls, ConfigMode};
use shadermidi_engine::control::{ControlAction, ControlEvent};
use shadermidi_engine::events::EngineEvent;
use shadermidi_engine::params::ParamId;
use shadermidi_engine::session::Session;
use shadermidi_engine::video::VideoCapture;
use shadermidi_engine::{logging, loge, logi, logw};

mod audio_file;
mod audio_input;
mod cli;
mod gl_backend;
mod midi;
mod video_file;
mod video_input;

use audio_file::{FileSource, PlaybackHandle};
use audio_input::MicSource;
use cli::{Args, AudioArg, CameraArg};
use gl_backend::GlBackend;
use video_file::FileVideo;
use video_input::{Camera, NoCamera, TestPatternCamera};

/// MIDI events logged verbatim at startup before going quiet.
const MIDI_LOG_FIRST: u32 = 32;

type AppSession = Session<GlBackend, Camera>;

fn nz(v: u32) -> NonZeroU32 {
    NonZeroU32::new(v).unwrap_or(NonZeroU32::MIN)
}

fn attach_audio(session: &mut AppSession, args: &Args, settings: shadermidi_engine::audio::AnalyserSettings) -> Option<PlaybackHandle> {
    match &args.audio {
        AudioArg::None => {
            logi!("AUDIO", "no audio source; bands read zero");
            None
        }
        AudioArg::Mic => {
            match MicSource::open(args.audio_device.as_deref(), settings) {
                Ok(src) => session.attach_audio(Box::new(src)),
                Err(e) => logw!("AUDIO", "microphone unavailable: {e:#}"),
            }
            None
        }
        AudioArg::File(path) => match FileSource::open(path, settings) {
            Ok((src, handle)) => {
                session.attach_audio(Box::new(src));
                Some(handle)
            }
            Err(e) => {
                logw!("AUDIO", "audio file unavailable: {e:#}");
                None
            }
        },
    }
}

fn open_camera(args: &Args) -> Camera {
    if let Some(path) = &args.video {
        match FileVideo::open(path) {
            Ok(clip) => return Camera::File(clip),
            Err(e) => logw!("VIDEO", "video file unavailable, using --camera: {e:#}"),
        }
    }
    match args.camera {
        CameraArg::TestPattern => Camera::TestPattern(TestPatternCamera::new()),
        CameraArg::None => Camera::Disabled(NoCamera),
    }
}

struct TitleState {
    shader: String,
    failed: bool,
    show_info: bool,
    fps: f32,
}

impl TitleState {
    fn render(&self, session: &AppSession) -> String {
        let mut t = format!("shadermidi - {}", self.shader);
        if self.failed {
            t.push_str(" (compile error)");
        }
        if self.show_info {
            t.push_str(&format!(
                " | {:.0} fps | audio: {} | video: {:?} | mix {:.2}",
                self.fps,
                session.audio_source().unwrap_or("none"),
                session.video().source_kind(),
                session.params().get_f32(ParamId::VideoMix),
            ));
        }
        t
    }
}

fn apply_events(events: Vec<EngineEvent>, title: &mut TitleState) -> bool {
    let mut changed = false;
    for ev in events {
        match ev {
            EngineEvent::ConfigLoaded { path, mappings } => match path {
                Some(p) => logi!("CONFIG", "{} control mappings from {}", mappings, p.display()),
                None => logi!("CONFIG", "{mappings} built-in control mappings"),
            },
            EngineEvent::ConfigError { path, error } => loge!("CONFIG", "{}: {error}", path.display()),
            EngineEvent::ShaderLoaded { name, index, count } => {
                logi!("SHADER", "[{}/{count}] {name}", index + 1);
                title.shader = format!("{name} ({}/{count})", index + 1);
                title.failed = false;
                changed = true;
            }
            EngineEvent::ShaderFailed { name, error } => {
                loge!("SHADER", "{name}: {error}");
                title.failed = true;
                changed = true;
            }
            EngineEvent::CameraActivated { .. } | EngineEvent::CameraDeactivated | EngineEvent::CameraFailed { .. } => {
                changed = true;
            }
            EngineEvent::ParamChanged { .. } => {}
        }
    }
    changed
}

fn toggle_fullscreen(window: &Window) {
    if window.fullscreen().is_some() {
        window.set_fullscreen(None);
    } else {
        window.set_fullscreen(Some(Fullscreen::Borderless(None)));
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let run_id = logging::init(args.log_file.clone());
    logi!("INIT", "shadermidi {} run={run_id}", env!("CARGO_PKG_VERSION"));

    let assets = match &args.assets {
        Some(dir) => AssetsRoot::at(dir.clone())?,
        None => AssetsRoot::discover(&std::env::current_dir().context("current dir")?)?,
    };
    logi!("INIT", "assets: {}", assets.path().display());

    let mode = if args.strict { ConfigMode::Strict } else { ConfigMode::Lenient };
    let controls = load_controls(&assets, mode)?;

    let programs = match discover_shaders(&assets.shaders_dir()) {
        Ok(p) => p,
        Err(e) => {
            loge!("SHADER", "{e}");
            Vec::new()
        }
    };
    let catalog = ShaderCatalog::new(programs);
    logi!("SHADER", "{} shading programs: {}", catalog.len(), catalog.names().collect::<Vec<_>>().join(", "));

    let event_loop = EventLoop::new().context("create event loop")?;
    let window_builder = winit::window::WindowBuilder::new()
        .with_title("shadermidi")
        .with_inner_size(PhysicalSize::new(args.width, args.height));

    let template = ConfigTemplateBuilder::new().with_alpha_size(8).with_depth_size(0);
    let display_builder = DisplayBuilder::new().with_window_builder(Some(window_builder));

    let (window, gl_config) = display_builder
        .build(&event_loop, template, |configs| {
            // glutin only calls the picker with a non-empty set.
            configs
                .reduce(|a, b| if a.num_samples() > b.num_samples() { a } else { b })
                .expect("display offered no GL configs")
        })
        .map_err(|e| anyhow!("build display: {e}"))?;
    let window = window.ok_or_else(|| anyhow!("no window created"))?;

    let raw_window_handle = window.raw_window_handle();
    let gl_display = gl_config.display();

    let context_attributes = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
        .build(Some(raw_window_handle));

    let not_current_gl_context: NotCurrentContext =
        unsafe { gl_display.create_context(&gl_config, &context_attributes) }.context("create GL context")?;

    let size = window.inner_size();
    let attrs =
        SurfaceAttributesBuilder::<WindowSurface>::new().build(raw_window_handle, nz(size.width), nz(size.height));
    let gl_surface =
        unsafe { gl_display.create_window_surface(&gl_config, &attrs) }.context("create window surface")?;
    let gl_context = not_current_gl_context.make_current(&gl_surface).context("make GL context current")?;

    if let Err(e) = gl_surface.set_swap_interval(&gl_context, SwapInterval::Wait(nz(1))) {
        logw!("RENDER", "vsync unavailable: {e}");
    }

    let gl = unsafe {
        glow::Context::from_loader_function(|s| match CString::new(s) {
            Ok(name) => gl_display.get_proc_address(&name) as *const _,
            Err(_) => std::ptr::null(),
        })
    };
    let backend = GlBackend::new(gl)?;

    let camera = open_camera(&args);

    let mut session = Session::new(catalog, &controls, backend, camera);
    session.set_resolution(size.width, size.height);
    let playback = attach_audio(&mut session, &args, controls.audio);
    session.start();

    let (midi_tx, midi_rx) = crossbeam_channel::unbounded::<ControlEvent>();
    let _midi_conn = midi::connect_midi(controls.preferred_device_contains.as_deref(), midi_tx);
    let mut midi_seen: u32 = 0;

    let mut title = TitleState {
        shader: "no shader".into(),
        failed: false,
        show_info: false,
        fps: 0.0,
    };
    if apply_events(session.drain_events(), &mut title) {
        window.set_title(&title.render(&session));
    }

    let mut last_frame = Instant::now();
    let mut last_title = Instant::now();

    event_loop
        .run(move |event, target| {
            target.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => target.exit(),

                    WindowEvent::KeyboardInput { event, .. } => {
                        if event.state.is_pressed() && !event.repeat {
                            if let PhysicalKey::Code(code) = event.physical_key {
                                match code {
                                    KeyCode::ArrowRight | KeyCode::KeyN => {
                                        session.next_shader();
                                    }
                                    KeyCode::ArrowLeft | KeyCode::KeyP => {
                                        session.previous_shader();
                                    }
                                    KeyCode::KeyF => toggle_fullscreen(&window),
                                    KeyCode::KeyH => {
                                        title.show_info = !title.show_info;
                                        window.set_title(&title.render(&session));
                                    }
                                    KeyCode::Escape => target.exit(),
                                    _ => {}
                                }
                            }
                        }
                    }

                    WindowEvent::Resized(new_size) => {
                        gl_surface.resize(&gl_context, nz(new_size.width), nz(new_size.height));
                        session.set_resolution(new_size.width, new_size.height);
                    }

                    WindowEvent::RedrawRequested => {
                        for ev in midi_rx.try_iter() {
                            midi_seen = midi_seen.saturating_add(1);
                            if midi_seen <= MIDI_LOG_FIRST {
                                logi!("MIDI", "{ev:?}");
                            }
                            let action = session.handle_control(ev);
                            if let (ControlAction::Ignored, ControlEvent::ControlChange { channel, cc, .. }) = (action, ev) {
                                logi!("MIDI", "unmapped cc {cc} on channel {}", channel + 1);
                            }
                        }

                        let now = Instant::now();
                        let dt = now.duration_since(last_frame).as_secs_f32();
                        last_frame = now;
                        if dt > 0.0 {
                            title.fps = title.fps * 0.9 + (1.0 / dt) * 0.1;
                        }

                        session.frame(dt);

                        if let Some(h) = &playback {
                            h.set_rate(session.params().get_f32(ParamId::Speed));
                        }

                        let changed = apply_events(session.drain_events(), &mut title);
                        if changed || (title.show_info && last_title.elapsed().as_secs_f32() > 0.5) {
                            window.set_title(&title.render(&session));
                            last_title = Instant::now();
                        }

                        if let Err(e) = gl_surface.swap_buffers(&gl_context) {
                            loge!("RENDER", "swap_buffers failed: {e}");
                            target.exit();
                        }
                    }

                    _ => {}
                },

                Event::AboutToWait => {
                    window.request_redraw();
                }

                Event::LoopExiting => {
                    session.shutdown();
                    session.pipeline_mut().backend_mut().destroy();
                }

                _ => {}
            }
        })
        .context("event loop")?;

    Ok(())
}
