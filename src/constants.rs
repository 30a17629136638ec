//! Constants for MPEG-TS demultiplexing and ATSC PSIP parsing

/// MPEG-TS packet constants
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_SYNC_BYTE: u8 = 0x47;

/// PES packet constants
pub const PES_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];
pub const PTS_CLOCK_HZ: u64 = 90_000; // 90 kHz

/// Well-known PIDs
pub const PAT_PID: u16 = 0x0000;
pub const PSIP_BASE_PID: u16 = 0x1FFB; // ATSC A/65 base PID (MGT, TVCT, STT, ...)
pub const NULL_PID: u16 = 0x1FFF;

/// Table ids
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;
pub const TABLE_ID_TVCT: u8 = 0xC8;

/// Stream types (ISO/IEC 13818-1 + ATSC A/53)
pub const STREAM_TYPE_MPEG2_VIDEO: u8 = 0x02;
pub const STREAM_TYPE_AVC: u8 = 0x1B;
pub const STREAM_TYPE_MPEG1_AUDIO: u8 = 0x03;
pub const STREAM_TYPE_MPEG2_AUDIO: u8 = 0x04;
pub const STREAM_TYPE_AAC_ADTS: u8 = 0x0F;
pub const STREAM_TYPE_AC3: u8 = 0x81;

/// Section layout
pub const SECTION_HEADER_LEN: usize = 3; // table_id + section_length
pub const MIN_SECTION_LEN: usize = 13; // long-form header + CRC
pub const STUFFING_BYTE: u8 = 0xFF;

/// One-channel TVCT record layout (A/65 6.4)
pub const TVCT_MIN_LEN: usize = 48;
pub const TVCT_NUM_CHANNELS_OFFSET: usize = 9;
pub const TVCT_SHORT_NAME_OFFSET: usize = 10;
pub const TVCT_SHORT_NAME_LEN: usize = 14; // 7 UTF-16 code units
pub const TVCT_CHANNEL_NUMBER_OFFSET: usize = 24;
pub const TVCT_DESCRIPTORS_LENGTH_OFFSET: usize = 40;
pub const TVCT_DESCRIPTORS_OFFSET: usize = 42;

/// Descriptors (A/65 6.9)
pub const DESCRIPTOR_TAG_EXTENDED_CHANNEL_NAME: u8 = 0xA0;

/// Multiple string structure (A/65 6.10)
pub const COMPRESSION_TYPE_NO_COMPRESSION: u8 = 0x00;
pub const MODE_UTF16: u8 = 0x3F;
pub const MSS_MIN_LEN: usize = 8; // number_strings + one string header + one segment header

/// Decoder MIME types
pub const MIME_VIDEO_AVC: &str = "video/avc";
