//! # Bitstream helpers
//!
//! Small building blocks shared by the transport stream demuxer and the codec
//! header parsers:
//!
//! - [`BitReader`]: MSB-first bit access with Exp-Golomb codes
//! - [`unescape_rbsp`]: emulation prevention removal for NAL units
//! - [`Crc32Mpeg2`]: the checksum of MPEG-TS PSI sections

mod bits;
mod crc;

pub use bits::{unescape_rbsp, BitReader};
pub use crc::Crc32Mpeg2;
