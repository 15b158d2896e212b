//! Media extraction engines
//!
//! The runner talks to [`ExtractionEngine`] only; [`YtDlpEngine`] is the
//! production adapter.

pub mod error;
pub mod traits;
pub mod types;
pub mod ytdlp;

pub use error::{EngineError, FatalReason, classify};
pub use traits::ExtractionEngine;
pub use types::{Artifact, AudioExtraction, EngineRequest, FormatSpec};
pub use ytdlp::YtDlpEngine;
