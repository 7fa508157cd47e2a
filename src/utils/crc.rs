/// Generator polynomial of CRC-32/MPEG-2 (ISO/IEC 13818-1 annex A).
const POLYNOMIAL: u32 = 0x04C1_1DB7;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC-32/MPEG-2 as carried at the end of PSI sections: MSB first, initial
/// value all ones, no final xor.
///
/// ```
/// use avpipe::utils::Crc32Mpeg2;
///
/// assert_eq!(Crc32Mpeg2::checksum(&[0x01, 0x01]), 0xD66F_B816);
/// ```
pub struct Crc32Mpeg2;

impl Crc32Mpeg2 {
    /// CRC of `data`.
    pub fn checksum(data: &[u8]) -> u32 {
        data.iter().fold(0xFFFF_FFFF, |crc, &byte| {
            (crc << 8) ^ TABLE[(((crc >> 24) ^ u32::from(byte)) & 0xFF) as usize]
        })
    }

    /// Checks a section whose last four bytes are its big-endian CRC.
    pub fn verify(section: &[u8]) -> bool {
        section.len() >= 4 && Self::checksum(section) == 0
    }
}
