//! H.264 sequence parameter set parsing

use bitstream_io::{BigEndian, BitRead, BitReader};

use super::utils::{remove_ep, se, ue};
use crate::types::VideoInfo;

const NAL_TYPE_SPS: u8 = 7;

/// Returns the RBSP-escaped SPS payload (after the NAL header byte) of the
/// first SPS NAL unit in an Annex B byte stream.
pub fn find_sps(data: &[u8]) -> Option<&[u8]> {
    let mut i = 0;
    while i + 3 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            let header = data[i + 3];
            if header & 0x1F == NAL_TYPE_SPS {
                let body = &data[i + 4..];
                let end = next_start_code(body).unwrap_or(body.len());
                return Some(&body[..end]);
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    None
}

fn next_start_code(data: &[u8]) -> Option<usize> {
    data.windows(3).position(|w| w == [0, 0, 1]).map(|pos| {
        // a 4-byte start code owns the preceding zero
        if pos > 0 && data[pos - 1] == 0 { pos - 1 } else { pos }
    })
}

/// Parses the first H.264 SPS found in `data` into display geometry.
pub fn parse_h264_sps(data: &[u8]) -> Option<VideoInfo> {
    let rbsp = remove_ep(find_sps(data)?);
    let mut br = BitReader::endian(&rbsp[..], BigEndian);

    let profile_idc = br.read::<8, u8>().ok()?;
    br.skip(16).ok()?; // constraint flags, level_idc
    ue(&mut br)?; // seq_parameter_set_id

    let mut chroma_format_idc = 1;
    if matches!(profile_idc, 100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135) {
        chroma_format_idc = ue(&mut br)?;
        if chroma_format_idc == 3 {
            br.skip(1).ok()?;
        }
        ue(&mut br)?; // bit_depth_luma_minus8
        ue(&mut br)?; // bit_depth_chroma_minus8
        br.skip(1).ok()?;
        if br.read_bit().ok()? {
            skip_scaling_lists(&mut br, if chroma_format_idc == 3 { 12 } else { 8 })?;
        }
    }

    ue(&mut br)?; // log2_max_frame_num_minus4
    match ue(&mut br)? {
        0 => {
            ue(&mut br)?;
        }
        1 => {
            br.skip(1).ok()?;
            se(&mut br)?;
            se(&mut br)?;
            for _ in 0..ue(&mut br)? {
                se(&mut br)?;
            }
        }
        _ => {}
    }
    ue(&mut br)?; // max_num_ref_frames
    br.skip(1).ok()?;

    let width_mbs = ue(&mut br)?.checked_add(1)?;
    let height_map_units = ue(&mut br)?.checked_add(1)?;
    let frame_mbs_only = br.read_bit().ok()?;
    if !frame_mbs_only {
        br.skip(1).ok()?;
    }
    br.skip(1).ok()?; // direct_8x8_inference_flag

    let crop = if br.read_bit().ok()? {
        [ue(&mut br)?, ue(&mut br)?, ue(&mut br)?, ue(&mut br)?]
    } else {
        [0; 4]
    };

    let fps = if br.read_bit().ok()? { vui_frame_rate(&mut br).unwrap_or(0.0) } else { 0.0 };

    let field_factor = if frame_mbs_only { 1 } else { 2 };
    let (unit_x, unit_y) = match chroma_format_idc {
        0 => (1, field_factor),
        1 => (2, 2 * field_factor),
        2 => (2, field_factor),
        _ => (1, field_factor),
    };
    // every size below comes from the stream
    let crop_x = crop[0].checked_add(crop[1])?.checked_mul(unit_x)?;
    let crop_y = crop[2].checked_add(crop[3])?.checked_mul(unit_y)?;
    let width = width_mbs.checked_mul(16)?.checked_sub(crop_x)?;
    let height = height_map_units.checked_mul(field_factor * 16)?.checked_sub(crop_y)?;

    Some(VideoInfo {
        codec:  "H.264".to_string(),
        width:  u16::try_from(width).ok()?,
        height: u16::try_from(height).ok()?,
        fps,
        chroma: match chroma_format_idc {
            0 => "4:0:0",
            1 => "4:2:0",
            2 => "4:2:2",
            _ => "4:4:4",
        }
        .to_string(),
    })
}

fn skip_scaling_lists<R: std::io::Read>(br: &mut BitReader<R, BigEndian>, lists: usize) -> Option<()> {
    for idx in 0..lists {
        if !br.read_bit().ok()? {
            continue;
        }
        let size = if idx < 6 { 16 } else { 64 };
        let mut last = 8i32;
        let mut next = 8i32;
        for _ in 0..size {
            if next != 0 {
                next = (last + se(br)? + 256) % 256;
            }
            if next != 0 {
                last = next;
            }
        }
    }
    Some(())
}

/// Frame rate from VUI timing info, `None` when absent or implausible.
fn vui_frame_rate<R: std::io::Read>(br: &mut BitReader<R, BigEndian>) -> Option<f32> {
    if br.read_bit().ok()? && br.read::<8, u8>().ok()? == 255 {
        br.skip(32).ok()?; // sar_width, sar_height
    }
    if br.read_bit().ok()? {
        br.skip(1).ok()?; // overscan_appropriate_flag
    }
    if br.read_bit().ok()? {
        br.skip(4).ok()?; // video_format, video_full_range_flag
        if br.read_bit().ok()? {
            br.skip(24).ok()?;
        }
    }
    if br.read_bit().ok()? {
        ue(br)?;
        ue(br)?;
    }
    if !br.read_bit().ok()? {
        return None;
    }
    let num_units_in_tick = br.read::<32, u32>().ok()?;
    let time_scale = br.read::<32, u32>().ok()?;
    if num_units_in_tick == 0 || time_scale == 0 {
        return None;
    }
    let fps = time_scale as f32 / (2.0 * num_units_in_tick as f32);
    (1.0..=120.0).contains(&fps).then_some(fps)
}
