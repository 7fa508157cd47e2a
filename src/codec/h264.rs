//! H.264 Annex B parsing: NAL unit splitting and sequence parameter sets.
//!
//! There is no H.264 decoder in the built-in backend. This is only what the
//! transport stream probe needs to describe a stream.

use crate::av::{CodecId, CodecParameters, PixelFormat, Rational, VideoParams};
use crate::utils::{unescape_rbsp, BitReader};
use crate::{AvError, Result};

/// Coded slice of a non-IDR picture.
pub const NAL_SLICE: u8 = 1;
/// Coded slice of an IDR picture.
pub const NAL_IDR_SLICE: u8 = 5;
/// Supplemental enhancement information.
pub const NAL_SEI: u8 = 6;
/// Sequence parameter set.
pub const NAL_SPS: u8 = 7;
/// Picture parameter set.
pub const NAL_PPS: u8 = 8;
/// Access unit delimiter.
pub const NAL_AUD: u8 = 9;

/// One NAL unit, borrowed from an Annex B byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit<'a> {
    /// `nal_unit_type`, the low five bits of the header
    pub nal_type: u8,
    /// `nal_ref_idc`, non-zero for reference pictures
    pub nal_ref_idc: u8,
    /// Header byte included, emulation prevention still in place
    pub data: &'a [u8],
}

impl<'a> NalUnit<'a> {
    fn new(data: &'a [u8]) -> Option<Self> {
        let header = *data.first()?;
        Some(Self {
            nal_type: header & 0x1F,
            nal_ref_idc: (header >> 5) & 0x03,
            data,
        })
    }

    /// Returns true for IDR slices and parameter sets.
    pub fn is_keyframe(&self) -> bool {
        matches!(self.nal_type, NAL_IDR_SLICE | NAL_SPS | NAL_PPS)
    }
}

/// Splits an Annex B stream on `00 00 01` / `00 00 00 01` start codes.
pub fn split_annex_b(data: &[u8]) -> impl Iterator<Item = NalUnit<'_>> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }
    let mut units = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let mut end = starts.get(n + 1).map_or(data.len(), |&next| next - 3);
        // Trailing zeros belong to the next four-byte start code.
        while end > start && data[end - 1] == 0 {
            end -= 1;
        }
        if let Some(unit) = NalUnit::new(&data[start..end]) {
            units.push(unit);
        }
    }
    units.into_iter()
}

/// Returns true if the access unit contains an IDR slice.
pub fn contains_idr(data: &[u8]) -> bool {
    split_annex_b(data).any(|nal| nal.nal_type == NAL_IDR_SLICE)
}

/// The parts of a sequence parameter set that describe the picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    /// `profile_idc`
    pub profile_idc: u8,
    /// `level_idc`
    pub level_idc: u8,
    /// 0 monochrome, 1 for 4:2:0, 2 for 4:2:2, 3 for 4:4:4
    pub chroma_format_idc: u32,
    /// Luma bit depth
    pub bit_depth_luma: u32,
    /// Width after cropping
    pub width: u32,
    /// Height after cropping
    pub height: u32,
    /// Frame rate from VUI timing info, when present
    pub frame_rate: Option<Rational>,
}

fn skip_scaling_list(reader: &mut BitReader<'_>, size: usize) -> Result<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = reader.read_signed_golomb()?;
            next_scale = (last_scale + delta + 256).rem_euclid(256);
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

const HIGH_PROFILES: [u8; 12] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134];

impl Sps {
    /// Parses an SPS NAL unit, header byte included.
    pub fn parse(nal: &[u8]) -> Result<Self> {
        match nal.first() {
            Some(header) if header & 0x1F == NAL_SPS => {}
            _ => return Err(AvError::Codec("not an SPS NAL unit".into())),
        }
        let rbsp = unescape_rbsp(&nal[1..]);
        let mut r = BitReader::new(&rbsp);

        let profile_idc = r.read_bits(8)? as u8;
        r.skip_bits(8)?; // constraint flags
        let level_idc = r.read_bits(8)? as u8;
        r.read_golomb()?; // seq_parameter_set_id

        let mut chroma_format_idc = 1;
        let mut separate_colour_plane = false;
        let mut bit_depth_luma = 8;
        if HIGH_PROFILES.contains(&profile_idc) {
            chroma_format_idc = r.read_golomb()?;
            if chroma_format_idc == 3 {
                separate_colour_plane = r.read_flag()?;
            }
            bit_depth_luma = r.read_golomb()? + 8;
            r.read_golomb()?; // bit_depth_chroma_minus8
            r.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag
            if r.read_flag()? {
                let lists = if chroma_format_idc == 3 { 12 } else { 8 };
                for i in 0..lists {
                    if r.read_flag()? {
                        skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                    }
                }
            }
        }

        r.read_golomb()?; // log2_max_frame_num_minus4
        match r.read_golomb()? {
            0 => {
                r.read_golomb()?; // log2_max_pic_order_cnt_lsb_minus4
            }
            1 => {
                r.skip_bits(1)?;
                r.read_signed_golomb()?;
                r.read_signed_golomb()?;
                for _ in 0..r.read_golomb()? {
                    r.read_signed_golomb()?;
                }
            }
            _ => {}
        }
        r.read_golomb()?; // max_num_ref_frames
        r.skip_bits(1)?; // gaps_in_frame_num_value_allowed_flag

        let width_mbs = r.read_golomb()? + 1;
        let height_map_units = r.read_golomb()? + 1;
        let frame_mbs_only = r.read_flag()?;
        if !frame_mbs_only {
            r.skip_bits(1)?; // mb_adaptive_frame_field_flag
        }
        r.skip_bits(1)?; // direct_8x8_inference_flag

        let mut width = width_mbs * 16;
        let mut height = height_map_units * 16 * if frame_mbs_only { 1 } else { 2 };
        if r.read_flag()? {
            let (left, right, top, bottom) =
                (r.read_golomb()?, r.read_golomb()?, r.read_golomb()?, r.read_golomb()?);
            let chroma_array_type = if separate_colour_plane { 0 } else { chroma_format_idc };
            let (unit_x, unit_y) = match chroma_array_type {
                1 => (2, 2),
                2 => (2, 1),
                _ => (1, 1),
            };
            let unit_y = unit_y * if frame_mbs_only { 1 } else { 2 };
            width = width.saturating_sub((left + right) * unit_x);
            height = height.saturating_sub((top + bottom) * unit_y);
        }

        let frame_rate = if r.read_flag()? {
            // A VUI that ends early only loses the frame rate.
            parse_vui_timing(&mut r).ok().flatten()
        } else {
            None
        };

        Ok(Sps {
            profile_idc,
            level_idc,
            chroma_format_idc,
            bit_depth_luma,
            width,
            height,
            frame_rate,
        })
    }

    /// Pixel format of decoded pictures, for the 8-bit formats avpipe knows.
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        if self.bit_depth_luma != 8 {
            return None;
        }
        match self.chroma_format_idc {
            0 => Some(PixelFormat::Gray8),
            1 => Some(PixelFormat::Yuv420p),
            2 => Some(PixelFormat::Yuv422p),
            3 => Some(PixelFormat::Yuv444p),
            _ => None,
        }
    }

    /// Stream parameters, with the SPS as Annex B extradata.
    pub fn codec_parameters(&self, nal: &[u8]) -> CodecParameters {
        let video = VideoParams {
            width: self.width,
            height: self.height,
            pixel_format: self.pixel_format(),
            frame_rate: self.frame_rate,
            ..VideoParams::default()
        };
        let mut extradata = vec![0, 0, 0, 1];
        extradata.extend_from_slice(nal);
        CodecParameters::video(CodecId::H264, video).with_extradata(extradata)
    }
}

/// Reads VUI fields up to the timing info.
fn parse_vui_timing(r: &mut BitReader<'_>) -> Result<Option<Rational>> {
    if r.read_flag()? {
        // aspect_ratio_info
        if r.read_bits(8)? == 255 {
            r.skip_bits(32)?;
        }
    }
    if r.read_flag()? {
        r.skip_bits(1)?; // overscan_appropriate_flag
    }
    if r.read_flag()? {
        r.skip_bits(4)?; // video_format, video_full_range_flag
        if r.read_flag()? {
            r.skip_bits(24)?; // colour description
        }
    }
    if r.read_flag()? {
        r.read_golomb()?;
        r.read_golomb()?;
    }
    if !r.read_flag()? {
        return Ok(None);
    }
    let units_in_tick = r.read_bits(32)?;
    let time_scale = r.read_bits(32)?;
    if units_in_tick == 0 || time_scale == 0 {
        return Ok(None);
    }
    // Two fields per frame.
    let num = i32::try_from(time_scale).ok();
    let den = units_in_tick.checked_mul(2).and_then(|d| i32::try_from(d).ok());
    Ok(num.zip(den).map(|(num, den)| Rational::new(num, den)))
}

/// Finds the first SPS in an access unit.
pub fn find_sps(data: &[u8]) -> Option<(Sps, &[u8])> {
    split_annex_b(data)
        .filter(|nal| nal.nal_type == NAL_SPS)
        .find_map(|nal| Sps::parse(nal.data).ok().map(|sps| (sps, nal.data)))
}
