//! Elementary stream parsers used by the probe decoder.

mod utils;
mod video;

pub use video::{find_sps, parse_h264_sps};
