//! Audio / MIDI reactive shader engine.
//!
//! Device and GPU free: hosts supply a [`pipeline::RenderBackend`], a
//! [`video::VideoCapture`] and optionally an [`audio::SpectrumSource`], then
//! drive a [`session::Session`] from one thread.

pub mod logging;

pub mod assets;
pub mod audio;
pub mod automix;
pub mod catalog;
pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod params;
pub mod pipeline;
pub mod post;
pub mod session;
pub mod shader;
pub mod validate;
pub mod video;

pub use error::EngineError;
