//! In-process Whisper inference and model artifact management.

mod model;
mod transcriber;
mod whisper;

pub use model::*;
pub use transcriber::*;
pub use whisper::*;
