//! Fragment program template.
//!
//! A user program supplies exactly one thing: `mainImage(out vec4, in vec2)`.
//! [`compose`] splices it unmodified between a fixed prelude (version,
//! uniforms, HSL helpers) and the fixed post stage in `shaders/post.glsl`.

use crate::catalog::ShadingProgram;
use crate::error::EngineError;
use crate::params::{ParamId, ParamKind};

pub const POST_STAGE: &str = include_str!("shaders/post.glsl");

// Fullscreen triangle vertex shader
pub const VERT_SRC: &str = r#"#version 330 core
void main() {
    vec2 pos;
    if (gl_VertexID == 0) pos = vec2(-1.0, -1.0);
    else if (gl_VertexID == 1) pos = vec2( 3.0, -1.0);
    else pos = vec2(-1.0,  3.0);
    gl_Position = vec4(pos, 0.0, 1.0);
}"#;

const HSL_HELPERS: &str = r#"
vec3 rgb2hsl(vec3 color) {
    float maxc = max(max(color.r, color.g), color.b);
    float minc = min(min(color.r, color.g), color.b);
    float l = (maxc + minc) / 2.0;
    if (maxc == minc) {
        return vec3(0.0, 0.0, l);
    }
    float delta = maxc - minc;
    float s = l > 0.5 ? delta / (2.0 - maxc - minc) : delta / (maxc + minc);
    float h;
    if (color.r == maxc) {
        h = (color.g - color.b) / delta + (color.g < color.b ? 6.0 : 0.0);
    } else if (color.g == maxc) {
        h = (color.b - color.r) / delta + 2.0;
    } else {
        h = (color.r - color.g) / delta + 4.0;
    }
    return vec3(h / 6.0, s, l);
}

vec3 hsl2rgb(vec3 hsl) {
    float h = hsl.x;
    float s = hsl.y;
    float l = hsl.z;
    float c = (1.0 - abs(2.0 * l - 1.0)) * s;
    float x = c * (1.0 - abs(mod(h * 6.0, 2.0) - 1.0));
    float m = l - c / 2.0;
    vec3 rgb;
    if (h < 1.0 / 6.0) rgb = vec3(c, x, 0.0);
    else if (h < 2.0 / 6.0) rgb = vec3(x, c, 0.0);
    else if (h < 3.0 / 6.0) rgb = vec3(0.0, c, x);
    else if (h < 4.0 / 6.0) rgb = vec3(0.0, x, c);
    else if (h < 5.0 / 6.0) rgb = vec3(x, 0.0, c);
    else rgb = vec3(c, 0.0, x);
    return rgb + m;
}
"#;

/// Output of [`compose`]: ready for a backend to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedShader {
    pub program_name: String,
    pub fragment: String,
    /// Number of lines before the first user line.
    pub user_line_offset: usize,
    pub user_line_count: usize,
}

impl ComposedShader {
    /// Rewrite `0:<line>` / `0(<line>)` references in a driver log so lines
    /// inside the user program read as `<name>:<user line>`.
    pub fn translate_log(&self, log: &str) -> String {
        log.lines()
            .map(|line| self.translate_line(line))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn translate_line(&self, line: &str) -> String {
        let Some((start, end, n)) = find_line_ref(line) else {
            return line.to_string();
        };
        let first = self.user_line_offset + 1;
        let last = self.user_line_offset + self.user_line_count;
        if n < first || n > last {
            return line.to_string();
        }
        format!("{}{}:{}{}", &line[..start], self.program_name, n - self.user_line_offset, &line[end..])
    }
}

/// Locate the first `0:N` or `0(N)` token. Returns byte range and N.
fn find_line_ref(line: &str) -> Option<(usize, usize, usize)> {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i + 2 < bytes.len() {
        let boundary = i == 0 || !bytes[i - 1].is_ascii_alphanumeric();
        if boundary && bytes[i] == b'0' && (bytes[i + 1] == b':' || bytes[i + 1] == b'(') {
            let open = bytes[i + 1];
            let digits_start = i + 2;
            let mut j = digits_start;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j > digits_start {
                let n = line[digits_start..j].parse().ok()?;
                let end = if open == b'(' && j < bytes.len() && bytes[j] == b')' { j + 1 } else { j };
                return Some((i, end, n));
            }
        }
        i += 1;
    }
    None
}

/// Check the user text against the wrapper contract.
pub fn validate_user_source(program: &ShadingProgram) -> Result<(), EngineError> {
    let code = strip_comments(&program.source);
    let src = code.as_str();
    let reject = |msg: &str| EngineError::InvalidProgram {
        program: program.name.clone(),
        msg: msg.to_string(),
    };

    if src.trim().is_empty() {
        return Err(reject("empty source"));
    }
    if src.lines().any(|l| l.trim_start().starts_with("#version")) {
        return Err(reject("must not declare #version; the wrapper supplies it"));
    }
    if has_main(src) {
        return Err(reject("must not define main(); implement mainImage instead"));
    }
    if !has_main_image(src) {
        return Err(reject("missing entry point mainImage(out vec4, in vec2)"));
    }
    Ok(())
}

/// Blank out `//` and `/* */` comments. Newlines inside block comments
/// are kept so line-based checks still line up.
fn strip_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    while let Some(c) = chars.next() {
        let next = chars.peek().copied();
        match (c, next) {
            ('/', Some('/')) => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    if n == '\n' {
                        out.push('\n');
                    }
                    prev = n;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

fn squash(src: &str) -> String {
    src.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn has_main(src: &str) -> bool {
    let s = squash(src).replace(" (", "(");
    s.contains("void main(")
}

fn has_main_image(src: &str) -> bool {
    let s = squash(src).replace(" (", "(").replace("( ", "(");
    let Some(pos) = s.find("mainImage(") else {
        return false;
    };
    let args = &s[pos + "mainImage(".len()..];
    let Some(close) = args.find(')') else {
        return false;
    };
    let parts: Vec<&str> = args[..close].split(',').map(str::trim).collect();
    parts.len() == 2 && parts[0].starts_with("out vec4") && (parts[1].starts_with("in vec2") || parts[1].starts_with("vec2"))
}

fn prelude() -> String {
    let mut s = String::with_capacity(4096);
    s.push_str("#version 330 core\n");
    s.push_str("#define texture2D texture\n");
    s.push_str("out vec4 sm_fragColor;\n");
    s.push_str("uniform float iTime;\n");
    s.push_str("uniform float iTimeDelta;\n");
    s.push_str("uniform int iFrame;\n");
    s.push_str("uniform vec2 iResolution;\n");
    for id in ParamId::ALL {
        let ty = match id.kind() {
            ParamKind::Integer { .. } => "int",
            ParamKind::Continuous { .. } | ParamKind::Toggle => "float",
        };
        s.push_str(&format!("uniform {ty} {};\n", id.uniform()));
    }
    s.push_str("uniform sampler2D u_videoTexture;\n");
    s.push_str("uniform bool u_hasVideo;\n");
    s.push_str("uniform float u_audioBass;\n");
    s.push_str("uniform float u_audioMid;\n");
    s.push_str("uniform float u_audioTreble;\n");
    s.push_str(HSL_HELPERS);
    s
}

/// Build the full fragment program around `program`.
pub fn compose(program: &ShadingProgram) -> Result<ComposedShader, EngineError> {
    validate_user_source(program)?;

    let mut fragment = prelude();
    if !fragment.ends_with('\n') {
        fragment.push('\n');
    }
    let user_line_offset = fragment.lines().count();
    let user: &str = &program.source;
    fragment.push_str(user);
    if !user.ends_with('\n') {
        fragment.push('\n');
    }
    fragment.push_str(POST_STAGE);

    Ok(ComposedShader {
        program_name: program.name.clone(),
        fragment,
        user_line_offset,
        user_line_count: user.lines().count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLASMA: &str = "void mainImage(out vec4 fragColor, in vec2 fragCoord) {\n    vec2 uv = fragCoord / iResolution;\n    fragColor = vec4(uv, 0.5 + 0.5 * sin(iTime), 1.0);\n}\n";

    fn prog(src: &str) -> ShadingProgram {
        ShadingProgram::new("plasma.glsl", src)
    }

    #[test]
    fn user_text_is_spliced_unmodified() {
        let c = compose(&prog(PLASMA)).unwrap();
        assert!(c.fragment.contains(PLASMA));
        let user_first = c.fragment.lines().nth(c.user_line_offset).unwrap();
        assert_eq!(user_first, PLASMA.lines().next().unwrap());
    }

    #[test]
    fn every_param_uniform_is_declared() {
        let c = compose(&prog(PLASMA)).unwrap();
        for id in ParamId::ALL {
            assert!(c.fragment.contains(&format!(" {};", id.uniform())), "{}", id.uniform());
        }
        assert!(c.fragment.contains("uniform int u_screenSplit;"));
        assert!(c.fragment.contains("uniform float u_mirror;"));
    }

    #[test]
    fn post_stage_follows_user_code() {
        let c = compose(&prog(PLASMA)).unwrap();
        let user_at = c.fragment.find("void mainImage").unwrap();
        let main_at = c.fragment.find("void main()").unwrap();
        assert!(user_at < main_at);
    }

    #[test]
    fn rejects_contract_violations() {
        assert!(matches!(compose(&prog("")), Err(EngineError::InvalidProgram { .. })));
        assert!(compose(&prog("#version 300 es\nvoid mainImage(out vec4 c, in vec2 p) {}")).is_err());
        assert!(compose(&prog("void main() { gl_FragColor = vec4(1.0); }")).is_err());
        assert!(compose(&prog("void mainImage(vec4 c) {}")).is_err());
    }

    #[test]
    fn accepts_whitespace_variants() {
        let src = "void mainImage( out vec4 c,\n   in vec2 p )\n{ c = vec4(p, 0.0, 1.0); }";
        assert!(compose(&prog(src)).is_ok());
    }

    #[test]
    fn comments_do_not_count_as_code() {
        let src = "// no void main() here, see mainImage below\n/* void main( ) { } */\nvoid mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }\n";
        assert!(compose(&prog(src)).is_ok());

        let hidden = "// void mainImage(out vec4 c, in vec2 p) {}\nvoid image(out vec4 c, in vec2 p) {}\n";
        assert!(compose(&prog(hidden)).is_err());
    }

    #[test]
    fn comment_stripping_keeps_line_breaks() {
        let out = strip_comments("a // x\nb /* y\nz */ c\n");
        assert_eq!(out.lines().count(), 3);
        assert!(out.contains('a') && out.contains('b') && out.contains('c'));
        assert!(!out.contains('x') && !out.contains('y') && !out.contains('z'));
    }

    #[test]
    fn post_stages_run_in_fixed_order() {
        let c = compose(&prog(PLASMA)).unwrap();
        let post = c.fragment.find("void main()").unwrap();
        let markers = [
            "// 1. wave distortion",
            "// 2. screen subdivision",
            "// 3. zoom / mirror",
            "mainImage(color, fragCoord);",
            "// 5. tone",
            "// 6. video",
            "sm_fragColor =",
        ];
        let mut last = post;
        for m in markers {
            let at = c.fragment[post..].find(m).map(|i| i + post).unwrap_or_else(|| panic!("missing {m}"));
            assert!(at > last, "{m} out of order");
            last = at;
        }
    }

    #[test]
    fn rgb_shift_reuses_the_filtered_sample() {
        let c = compose(&prog(PLASMA)).unwrap();
        let shift = c.fragment.find("if (u_videoRgbShift > 0.0)").unwrap();
        let tail = &c.fragment[shift..];
        let block = &tail[..tail.find("if (u_videoInvert").unwrap()];
        assert!(block.contains("sm_video_sample(uv + s, texel).r"));
        assert!(block.contains("sm_video_sample(uv - s, texel).b"));
        assert!(!block.contains("texture(u_videoTexture"));
    }

    #[test]
    fn log_lines_map_back_to_user_numbering() {
        let c = compose(&prog(PLASMA)).unwrap();
        let n = c.user_line_offset + 2;
        let mesa = format!("0:{n}(12): error: `uvx' undeclared");
        assert_eq!(c.translate_log(&mesa), "plasma.glsl:2(12): error: `uvx' undeclared");
        let nv = format!("0({n}) : error C1008: undefined variable");
        assert_eq!(c.translate_log(&nv), "plasma.glsl:2 : error C1008: undefined variable");
        // prelude lines are left alone
        assert_eq!(c.translate_log("0:3(1): error: x"), "0:3(1): error: x");
    }
}
