//! OpenGL 3.3 core implementation of the engine's render backend, via glow.

use glow::HasContext;

use shadermidi_engine::params::{ParamId, ParamKind, ParamValue};
use shadermidi_engine::pipeline::{FrameUniforms, RenderBackend};
use shadermidi_engine::shader::{ComposedShader, VERT_SRC};
use shadermidi_engine::video::VideoFrame;
use shadermidi_engine::EngineError;

pub struct GlBackend {
    gl: glow::Context,
    vao: glow::NativeVertexArray,
    video_tex: glow::NativeTexture,
    video_size: Option<(u32, u32)>,
}

impl GlBackend {
    pub fn new(gl: glow::Context) -> anyhow::Result<Self> {
        unsafe {
            let vao = gl.create_vertex_array().map_err(anyhow::Error::msg)?;
            let video_tex = gl.create_texture().map_err(anyhow::Error::msg)?;
            gl.bind_texture(glow::TEXTURE_2D, Some(video_tex));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            gl.bind_texture(glow::TEXTURE_2D, None);

            Ok(Self {
                gl,
                vao,
                video_tex,
                video_size: None,
            })
        }
    }

    /// Free the backend's own objects. Programs are disposed by the pipeline.
    pub fn destroy(&mut self) {
        unsafe {
            self.gl.delete_texture(self.video_tex);
            self.gl.delete_vertex_array(self.vao);
        }
    }
}

unsafe fn compile_stage(gl: &glow::Context, kind: u32, src: &str) -> Result<glow::NativeShader, String> {
    let sh = gl.create_shader(kind)?;
    gl.shader_source(sh, src);
    gl.compile_shader(sh);
    if !gl.get_shader_compile_status(sh) {
        let log = gl.get_shader_info_log(sh);
        gl.delete_shader(sh);
        return Err(log);
    }
    Ok(sh)
}

unsafe fn compile_program(gl: &glow::Context, vert_src: &str, frag_src: &str) -> Result<glow::NativeProgram, String> {
    let vs = compile_stage(gl, glow::VERTEX_SHADER, vert_src).map_err(|log| format!("vertex stage: {log}"))?;
    let fs = match compile_stage(gl, glow::FRAGMENT_SHADER, frag_src) {
        Ok(fs) => fs,
        Err(log) => {
            gl.delete_shader(vs);
            return Err(log);
        }
    };

    let program = match gl.create_program() {
        Ok(p) => p,
        Err(e) => {
            gl.delete_shader(vs);
            gl.delete_shader(fs);
            return Err(e);
        }
    };
    gl.attach_shader(program, vs);
    gl.attach_shader(program, fs);
    gl.link_program(program);
    let linked = gl.get_program_link_status(program);

    gl.detach_shader(program, vs);
    gl.detach_shader(program, fs);
    gl.delete_shader(vs);
    gl.delete_shader(fs);

    if !linked {
        let log = gl.get_program_info_log(program);
        gl.delete_program(program);
        return Err(log);
    }
    Ok(program)
}

unsafe fn set_f32(gl: &glow::Context, prog: glow::NativeProgram, name: &str, v: f32) {
    if let Some(loc) = gl.get_uniform_location(prog, name) {
        gl.uniform_1_f32(Some(&loc), v);
    }
}

unsafe fn set_i32(gl: &glow::Context, prog: glow::NativeProgram, name: &str, v: i32) {
    if let Some(loc) = gl.get_uniform_location(prog, name) {
        gl.uniform_1_i32(Some(&loc), v);
    }
}

unsafe fn set_param(gl: &glow::Context, prog: glow::NativeProgram, id: ParamId, value: ParamValue) {
    match (id.kind(), value) {
        (ParamKind::Integer { .. }, ParamValue::Int(i)) => set_i32(gl, prog, id.uniform(), i),
        (ParamKind::Integer { .. }, v) => set_i32(gl, prog, id.uniform(), v.as_f32().round() as i32),
        (_, v) => set_f32(gl, prog, id.uniform(), v.as_f32()),
    }
}

impl RenderBackend for GlBackend {
    type Program = glow::NativeProgram;

    fn compile(&mut self, shader: &ComposedShader) -> Result<Self::Program, EngineError> {
        unsafe { compile_program(&self.gl, VERT_SRC, &shader.fragment) }.map_err(|log| EngineError::Compile {
            program: shader.program_name.clone(),
            log,
        })
    }

    fn dispose(&mut self, program: Self::Program) {
        unsafe { self.gl.delete_program(program) }
    }

    fn upload_video(&mut self, frame: &VideoFrame) -> Result<(), EngineError> {
        let (w, h) = (frame.width as i32, frame.height as i32);
        unsafe {
            let gl = &self.gl;
            gl.bind_texture(glow::TEXTURE_2D, Some(self.video_tex));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            if self.video_size == Some((frame.width, frame.height)) {
                gl.tex_sub_image_2d(
                    glow::TEXTURE_2D,
                    0,
                    0,
                    0,
                    w,
                    h,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    glow::PixelUnpackData::Slice(Some(&frame.rgba[..])),
                );
            } else {
                gl.tex_image_2d(
                    glow::TEXTURE_2D,
                    0,
                    glow::RGBA8 as i32,
                    w,
                    h,
                    0,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    glow::PixelUnpackData::Slice(Some(&frame.rgba[..])),
                );
                self.video_size = Some((frame.width, frame.height));
            }
            gl.bind_texture(glow::TEXTURE_2D, None);

            let err = gl.get_error();
            if err != glow::NO_ERROR {
                self.video_size = None;
                return Err(EngineError::Backend {
                    msg: format!("video upload {w}x{h}: GL error 0x{err:04x}"),
                });
            }
        }
        Ok(())
    }

    fn clear_video(&mut self) {
        // The texture stays allocated; `u_hasVideo` gates sampling.
        self.video_size = None;
    }

    fn draw(&mut self, program: &Self::Program, u: &FrameUniforms<'_>) -> Result<(), EngineError> {
        let prog = *program;
        unsafe {
            let gl = &self.gl;
            gl.viewport(0, 0, u.resolution[0] as i32, u.resolution[1] as i32);
            gl.clear_color(0.0, 0.0, 0.0, 1.0);
            gl.clear(glow::COLOR_BUFFER_BIT);

            gl.use_program(Some(prog));
            gl.bind_vertex_array(Some(self.vao));

            set_f32(gl, prog, "iTime", u.time);
            set_f32(gl, prog, "iTimeDelta", u.time_delta);
            set_i32(gl, prog, "iFrame", u.frame);
            if let Some(loc) = gl.get_uniform_location(prog, "iResolution") {
                gl.uniform_2_f32(Some(&loc), u.resolution[0], u.resolution[1]);
            }

            for (id, value) in u.params.iter() {
                set_param(gl, prog, id, value);
            }

            set_f32(gl, prog, "u_audioBass", u.audio.bass);
            set_f32(gl, prog, "u_audioMid", u.audio.mid);
            set_f32(gl, prog, "u_audioTreble", u.audio.treble);

            set_i32(gl, prog, "u_hasVideo", i32::from(u.has_video));
            set_i32(gl, prog, "u_videoTexture", 0);
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(self.video_tex));

            gl.draw_arrays(glow::TRIANGLES, 0, 3);

            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.bind_vertex_array(None);
            gl.use_program(None);

            let err = gl.get_error();
            if err != glow::NO_ERROR {
                return Err(EngineError::Backend {
                    msg: format!("draw: GL error 0x{err:04x}"),
                });
            }
        }
        Ok(())
    }
}
