//! Transcription pipeline passes
//!
//! Each pass reads the products of the previous ones from `AudioState`
//! and stores its own. Running a pass out of order is a pipeline error.

pub mod pass_0;
pub mod pass_1;
pub mod pass_2;
pub mod pass_3;
pub mod pass_4;
pub mod pass_5;
