use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(name = "shadermidi", version, about = "Audio and MIDI reactive fragment shader player")]
pub struct Args {
    /// Assets directory (overrides SHADERMIDI_ASSETS and upward discovery).
    #[arg(long)]
    pub assets: Option<PathBuf>,

    /// Audio source: `mic`, `file:<path>` or `none`.
    #[arg(long, default_value = "none")]
    pub audio: AudioArg,

    /// Substring of the input device name used with `--audio mic`.
    #[arg(long)]
    pub audio_device: Option<String>,

    #[arg(long, value_enum, default_value_t = CameraArg::TestPattern)]
    pub camera: CameraArg,

    /// Play an image, animated GIF or directory of png/jpeg frames as the
    /// video source. Falls back to `--camera` when it cannot be decoded.
    #[arg(long)]
    pub video: Option<PathBuf>,

    /// Fail at startup on any controls.json validation error.
    #[arg(long, default_value_t = false)]
    pub strict: bool,

    /// Also append log lines to this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    #[arg(long, default_value_t = 720)]
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioArg {
    Mic,
    File(PathBuf),
    None,
}

impl FromStr for AudioArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mic" => Ok(AudioArg::Mic),
            "none" | "off" => Ok(AudioArg::None),
            _ => match s.strip_prefix("file:") {
                Some(p) if !p.is_empty() => Ok(AudioArg::File(PathBuf::from(p))),
                _ => Err(format!("expected mic, file:<path> or none (got '{s}')")),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CameraArg {
    TestPattern,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_arg_forms() {
        assert_eq!("mic".parse::<AudioArg>().unwrap(), AudioArg::Mic);
        assert_eq!("none".parse::<AudioArg>().unwrap(), AudioArg::None);
        assert_eq!(
            "file:music/loop.mp3".parse::<AudioArg>().unwrap(),
            AudioArg::File(PathBuf::from("music/loop.mp3"))
        );
        assert!("file:".parse::<AudioArg>().is_err());
        assert!("speaker".parse::<AudioArg>().is_err());
    }

    #[test]
    fn defaults_parse() {
        let args = Args::try_parse_from(["shadermidi"]).unwrap();
        assert_eq!(args.audio, AudioArg::None);
        assert_eq!(args.camera, CameraArg::TestPattern);
        assert!(args.video.is_none());
        assert!(!args.strict);
    }

    #[test]
    fn camera_flag_is_kebab_case() {
        let args = Args::try_parse_from(["shadermidi", "--camera", "none", "--audio", "mic"]).unwrap();
        assert_eq!(args.camera, CameraArg::None);
        assert_eq!(args.audio, AudioArg::Mic);
    }

    #[test]
    fn video_path_is_optional() {
        let args = Args::try_parse_from(["shadermidi", "--video", "clips/loop.gif"]).unwrap();
        assert_eq!(args.video, Some(PathBuf::from("clips/loop.gif")));
        assert_eq!(args.camera, CameraArg::TestPattern);
    }
}
