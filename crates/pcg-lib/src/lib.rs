pub mod config;
pub mod detectors;
pub mod error;
pub mod filters;
pub mod ingest;
pub mod io;
pub mod metrics;
pub mod monitor;
pub mod pipeline;
pub mod plot;
pub mod signal;
pub mod synth;

pub use config::PcgOptions;
pub use detectors::*;
pub use error::{PcgError, Result};
pub use metrics::*;
pub use pipeline::{PcgSnapshot, Phonocardiogram, SoundKind};
pub use signal::*;
