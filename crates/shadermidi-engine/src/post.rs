//! CPU mirror of the scalar math in `shaders/post.glsl`.
//!
//! The GPU runs the real thing. These functions exist so the color and
//! coordinate transforms can be checked without a GL context, and they must
//! stay formula-for-formula identical to the GLSL.

use std::f32::consts::PI;

pub type Rgb = [f32; 3];
/// `[h, s, l]`, hue in turns (`0..1`).
pub type Hsl = [f32; 3];

pub fn rgb_to_hsl(c: Rgb) -> Hsl {
    let [r, g, b] = c;
    let maxc = r.max(g).max(b);
    let minc = r.min(g).min(b);
    let l = (maxc + minc) / 2.0;

    if maxc == minc {
        return [0.0, 0.0, l];
    }

    let delta = maxc - minc;
    let s = if l > 0.5 {
        delta / (2.0 - maxc - minc)
    } else {
        delta / (maxc + minc)
    };

    let h = if r == maxc {
        (g - b) / delta + if g < b { 6.0 } else { 0.0 }
    } else if g == maxc {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };

    [h / 6.0, s, l]
}

/// Six 60-degree sectors.
pub fn hsl_to_rgb(hsl: Hsl) -> Rgb {
    let [h, s, l] = hsl;
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - (glsl_mod(h * 6.0, 2.0) - 1.0).abs());
    let m = l - c / 2.0;

    let rgb = if h < 1.0 / 6.0 {
        [c, x, 0.0]
    } else if h < 2.0 / 6.0 {
        [x, c, 0.0]
    } else if h < 3.0 / 6.0 {
        [0.0, c, x]
    } else if h < 4.0 / 6.0 {
        [0.0, x, c]
    } else if h < 5.0 / 6.0 {
        [x, 0.0, c]
    } else {
        [c, 0.0, x]
    };

    [rgb[0] + m, rgb[1] + m, rgb[2] + m]
}

/// GLSL `mod`: result takes the sign of `y`.
pub fn glsl_mod(x: f32, y: f32) -> f32 {
    x - y * (x / y).floor()
}

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Inputs to the tone stage. `bass` is already scaled by `audioIntensity`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneInputs {
    pub brightness: f32,
    pub contrast: f32,
    pub hue_deg: f32,
    pub saturation: f32,
    pub vibrance: f32,
    pub grayscale: f32,
    pub audio_to_brightness: f32,
    pub audio_to_hue: f32,
    pub audio_to_saturation: f32,
    pub bass: f32,
}

impl Default for ToneInputs {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            hue_deg: 0.0,
            saturation: 1.0,
            vibrance: 0.0,
            grayscale: 0.0,
            audio_to_brightness: 0.0,
            audio_to_hue: 0.0,
            audio_to_saturation: 0.0,
            bass: 0.0,
        }
    }
}

pub fn apply_tone(c: Rgb, t: &ToneInputs) -> Rgb {
    let gain = t.brightness + t.bass * t.audio_to_brightness;
    let mut col = c.map(|v| (v * gain - 0.5) * t.contrast + 0.5);

    let mut hsl = rgb_to_hsl(col);
    let hue = t.hue_deg + t.bass * t.audio_to_hue * 360.0;
    hsl[0] = glsl_mod(hsl[0] + hue / 360.0, 1.0);

    let sat = t.saturation + t.bass * t.audio_to_saturation;
    hsl[1] *= sat.clamp(0.0, 2.0);
    hsl[1] = (hsl[1] + (1.0 - hsl[1]) * t.vibrance).clamp(0.0, 1.0);

    col = hsl_to_rgb(hsl);

    let gray = col[0] * 0.299 + col[1] * 0.587 + col[2] * 0.114;
    col.map(|v| mix(v, gray, t.grayscale))
}

/// Zoom about the center (with the audio term) then fold the right half
/// onto the left when `mirror` is set. Coordinates are in pixels.
pub fn zoom_mirror(coord: [f32; 2], resolution: [f32; 2], zoom: f32, audio_to_zoom: f32, bass: f32, mirror: bool) -> [f32; 2] {
    let z = (zoom + bass * audio_to_zoom * 2.0).max(1e-3);
    let cx = resolution[0] * 0.5;
    let cy = resolution[1] * 0.5;
    let mut x = (coord[0] - cx) / z + cx;
    let y = (coord[1] - cy) / z + cy;
    if mirror && x > cx {
        x = cx - (x - cx);
    }
    [x, y]
}

/// Fold a centered coordinate into the first kaleidoscope wedge, mirroring
/// every other segment. `segments < 2` is the identity.
pub fn kaleido_fold(p: [f32; 2], segments: i32) -> [f32; 2] {
    if segments < 2 {
        return p;
    }
    let wedge = 2.0 * PI / segments as f32;
    let r = (p[0] * p[0] + p[1] * p[1]).sqrt();
    let a = glsl_mod(p[1].atan2(p[0]), 2.0 * PI);
    let idx = (a / wedge).floor();
    let mut local = (a - idx * wedge).clamp(0.0, wedge);
    if glsl_mod(idx, 2.0) >= 1.0 {
        local = wedge - local;
    }
    [r * local.cos(), r * local.sin()]
}

/// Block size in pixels for `videoPixelate`; 0 disables.
pub fn pixelate_block(amount: f32) -> f32 {
    if amount <= 0.0 {
        0.0
    } else {
        (amount * 64.0).floor().max(1.0)
    }
}

/// Snap a video uv to the center of its pixelate block.
pub fn pixelate_uv(uv: [f32; 2], resolution: [f32; 2], amount: f32) -> [f32; 2] {
    let block = pixelate_block(amount);
    if block <= 0.0 {
        return uv;
    }
    let cx = resolution[0] / block;
    let cy = resolution[1] / block;
    [((uv[0] * cx).floor() + 0.5) / cx, ((uv[1] * cy).floor() + 0.5) / cy]
}

/// Wave distortion amounts. `bass` is already scaled by `audioIntensity`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WaveInputs {
    pub wave_x: f32,
    pub wave_y: f32,
    pub wave_radial: f32,
    pub bass: f32,
    pub time: f32,
}

/// Stage 1. Each wave runs only when its amount is positive; x runs before
/// y and y sees the displaced x.
pub fn wave_offset(coord: [f32; 2], resolution: [f32; 2], w: &WaveInputs) -> [f32; 2] {
    let [mut x, mut y] = coord;
    if w.wave_x > 0.0 {
        x += (y * 0.02 + w.time * 3.0).sin() * w.bass * w.wave_x * 50.0;
    }
    if w.wave_y > 0.0 {
        y += (x * 0.02 + w.time * 3.0).sin() * w.bass * w.wave_y * 50.0;
    }
    if w.wave_radial > 0.0 {
        let dx = x - resolution[0] * 0.5;
        let dy = y - resolution[1] * 0.5;
        let r = (dx * dx + dy * dy).sqrt();
        if r > 0.0 {
            let k = (r * 0.05 - w.time * 4.0).sin() * w.bass * w.wave_radial * 30.0;
            x += dx / r * k;
            y += dy / r * k;
        }
    }
    [x, y]
}

/// Band levels feeding the split stage.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SplitBands {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

fn rotate(p: [f32; 2], a: f32) -> [f32; 2] {
    let (s, c) = a.sin_cos();
    [c * p[0] - s * p[1], s * p[0] + c * p[1]]
}

/// Stage 2. Mode 1 is eight jittered strips, 2 is four counter-rotating
/// quadrants, 3 is a 4x4 grid zoomed by band. Anything else passes through.
pub fn split_coord(coord: [f32; 2], resolution: [f32; 2], mode: i32, bands: SplitBands, time: f32) -> [f32; 2] {
    let [rx, ry] = resolution;
    match mode {
        1 => {
            let strips = 8.0;
            let w = rx / strips;
            let idx = (coord[0] / w).floor();
            let e = mix(bands.bass, bands.treble, idx / (strips - 1.0));
            let x = (coord[0] / w).fract() * rx;
            let y = glsl_mod(coord[1] + (idx * 1.7 + time * 2.0).sin() * e * ry * 0.25, ry);
            [x, y]
        }
        2 => {
            let hx = rx * 0.5;
            let hy = ry * 0.5;
            let qi = (coord[0] / hx).floor() + (coord[1] / hy).floor() * 2.0;
            let lx = glsl_mod(coord[0], hx) / hx;
            let ly = glsl_mod(coord[1], hy) / hy;
            let dir = if glsl_mod(qi, 2.0) < 1.0 { 1.0 } else { -1.0 };
            let ang = dir * bands.bass * PI * (0.25 + 0.25 * qi);
            let p = rotate([(lx - 0.5) * rx, (ly - 0.5) * ry], ang);
            [p[0] + hx, p[1] + hy]
        }
        3 => {
            let cx = rx / 4.0;
            let cy = ry / 4.0;
            let k = glsl_mod((coord[0] / cx).floor() + (coord[1] / cy).floor() * 4.0, 3.0);
            let e = if k < 1.0 {
                bands.bass
            } else if k < 2.0 {
                bands.mid
            } else {
                bands.treble
            };
            let lx = glsl_mod(coord[0], cx) / cx;
            let ly = glsl_mod(coord[1], cy) / cy;
            let z = 1.0 + e * 2.0;
            [(lx - 0.5) * rx / z + rx * 0.5, (ly - 0.5) * ry / z + ry * 0.5]
        }
        _ => coord,
    }
}

/// Per-sample video filters, in the order the shader applies them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VideoFilters {
    pub blur: f32,
    pub edge: f32,
    pub rgb_shift: f32,
}

fn luma(c: Rgb) -> f32 {
    c[0] * 0.299 + c[1] * 0.587 + c[2] * 0.114
}

fn mix_rgb(a: Rgb, b: Rgb, t: f32) -> Rgb {
    [mix(a[0], b[0], t), mix(a[1], b[1], t), mix(a[2], b[2], t)]
}

/// One texture read followed by blur and edge, as `sm_video_sample`.
pub fn video_sample<T: Fn([f32; 2]) -> Rgb>(tex: &T, uv: [f32; 2], texel: [f32; 2], f: &VideoFilters) -> Rgb {
    let at = |dx: f32, dy: f32| tex([uv[0] + dx * texel[0], uv[1] + dy * texel[1]]);
    let mut vid = tex(uv);

    if f.blur > 0.0 {
        let spread = 1.0 + f.blur * 2.0;
        let mut acc = [0.0; 3];
        for i in -2..=2 {
            for j in -2..=2 {
                let c = at(i as f32 * spread, j as f32 * spread);
                acc = [acc[0] + c[0], acc[1] + c[1], acc[2] + c[2]];
            }
        }
        vid = mix_rgb(vid, acc.map(|v| v / 25.0), f.blur);
    }

    if f.edge > 0.0 {
        let l = |dx, dy| luma(at(dx, dy));
        let (tl, tc, tr) = (l(-1.0, 1.0), l(0.0, 1.0), l(1.0, 1.0));
        let (ml, mr) = (l(-1.0, 0.0), l(1.0, 0.0));
        let (bl, bc, br) = (l(-1.0, -1.0), l(0.0, -1.0), l(1.0, -1.0));
        let gx = -tl - 2.0 * ml - bl + tr + 2.0 * mr + br;
        let gy = -tl - 2.0 * tc - tr + bl + 2.0 * bc + br;
        let e = (gx * gx + gy * gy).sqrt().clamp(0.0, 1.0);
        vid = mix_rgb(vid, [e; 3], f.edge);
    }

    vid
}

/// Filtered sample with the RGB shift applied: red and blue come from the
/// filtered image at `uv +/- shift`, green from `uv`.
pub fn shifted_video_sample<T: Fn([f32; 2]) -> Rgb>(tex: &T, uv: [f32; 2], texel: [f32; 2], f: &VideoFilters) -> Rgb {
    let mut vid = video_sample(tex, uv, texel, f);
    if f.rgb_shift > 0.0 {
        let s = f.rgb_shift * 0.05;
        vid[0] = video_sample(tex, [uv[0] + s, uv[1]], texel, f)[0];
        vid[2] = video_sample(tex, [uv[0] - s, uv[1]], texel, f)[2];
    }
    vid
}

/// Chroma-key mask against pure green: 1 keeps the video pixel, 0 drops it.
/// `amount` widens the soft threshold; 0 keeps everything.
pub fn chroma_mask(c: Rgb, amount: f32) -> f32 {
    if amount <= 0.0 {
        return 1.0;
    }
    let d = ((c[0]).powi(2) + (c[1] - 1.0).powi(2) + (c[2]).powi(2)).sqrt();
    let edge = amount * 0.8;
    smoothstep(edge, edge + 0.2, d)
}

pub fn smoothstep(e0: f32, e1: f32, x: f32) -> f32 {
    let t = ((x - e0) / (e1 - e0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
