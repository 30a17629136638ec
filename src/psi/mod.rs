pub mod section;
pub mod descriptor;
pub mod mss;
pub mod tvct;
pub mod pat;
pub mod pmt;

pub use section::{validate_section, SectionHeader};
pub use descriptor::{scan_descriptors, Descriptor};
pub use mss::{decode_multiple_string, StringSegment};
pub use tvct::parse_tvct;
pub use pat::{parse_pat, PatSection};
pub use pmt::{parse_pmt, PmtSection};
