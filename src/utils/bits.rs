use crate::{AvError, Result};

/// MSB-first bit reader over codec headers (SPS, ADTS).
///
/// ```
/// use avpipe::utils::BitReader;
///
/// let mut reader = BitReader::new(&[0b1011_0011]);
/// assert!(reader.read_flag().unwrap());
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011);
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

fn exhausted() -> AvError {
    AvError::Codec("bitstream ended early".into())
}

impl<'a> BitReader<'a> {
    /// Starts reading at the first bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Reads one bit as a boolean.
    pub fn read_flag(&mut self) -> Result<bool> {
        let byte = *self.data.get(self.byte_offset).ok_or_else(exhausted)?;
        let bit = (byte >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;
        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }
        Ok(bit == 1)
    }

    /// Reads `n` bits, big-endian. `n` may be at most 32.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(AvError::Codec(format!("cannot read {n} bits at once")));
        }
        if n as usize > self.bits_left() {
            return Err(exhausted());
        }
        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | u64::from(self.read_flag()?);
        }
        Ok(value as u32)
    }

    /// Unsigned Exp-Golomb code, `ue(v)`.
    pub fn read_golomb(&mut self) -> Result<u32> {
        let mut leading_zeros = 0u32;
        while !self.read_flag()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(AvError::Codec("Exp-Golomb code longer than 32 bits".into()));
            }
        }
        if leading_zeros == 0 {
            return Ok(0);
        }
        let info = self.read_bits(leading_zeros)?;
        Ok(((1u64 << leading_zeros) + u64::from(info) - 1) as u32)
    }

    /// Signed Exp-Golomb code, `se(v)`: odd codes are positive.
    pub fn read_signed_golomb(&mut self) -> Result<i32> {
        let k = self.read_golomb()?;
        let magnitude = k.div_ceil(2) as i32;
        Ok(if k & 1 == 1 { magnitude } else { -magnitude })
    }

    /// Skips `n` bits.
    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        if n as usize > self.bits_left() {
            return Err(exhausted());
        }
        let bits = self.bit_offset as usize + n as usize;
        self.byte_offset += bits / 8;
        self.bit_offset = (bits % 8) as u8;
        Ok(())
    }

    /// Moves to the next byte boundary.
    pub fn align_byte(&mut self) {
        if self.bit_offset != 0 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }
    }

    /// Bits not yet consumed.
    pub fn bits_left(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.byte_offset * 8 + self.bit_offset as usize)
    }
}

/// Strips H.264/H.265 emulation prevention bytes (`00 00 03` becomes
/// `00 00`), turning a NAL payload into its raw byte sequence.
pub fn unescape_rbsp(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}
