// src/lib.rs
pub mod player {
    pub use crate::core::{run_play, run_scan, PlayOptions, ScanOptions};
    pub use crate::logging::init_logging;
}

pub mod config;
pub mod constants;
pub mod error;
pub mod network;
pub mod parsers;
pub mod pipeline;
pub mod processor;
pub mod psi;
pub mod report;
pub mod session;
pub mod setup;
pub mod stats;
pub mod tuner;
pub mod types;

mod core;
mod logging;

pub use error::{DecodeError, SectionError, SessionError, TunerError};
pub use psi::parse_tvct;
pub use types::{ChannelIdentity, SessionEvent, SessionState};
