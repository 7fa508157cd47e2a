//! BT.601 limited-range conversions in fixed point.

/// How the three color channels of a pixel are to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColorModel {
    /// Y, U, V in limited range (16..=235 luma, 16..=240 chroma)
    Yuv,
    /// R, G, B in full range
    Rgb,
    /// Full-range luminance in the first channel
    Gray,
}

fn clamp(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

pub(crate) fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = 298 * (i32::from(y) - 16);
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;
    [
        clamp((c + 409 * e + 128) >> 8),
        clamp((c - 100 * d - 208 * e + 128) >> 8),
        clamp((c + 516 * d + 128) >> 8),
    ]
}

pub(crate) fn rgb_to_yuv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
    [
        clamp(((66 * r + 129 * g + 25 * b + 128) >> 8) + 16),
        clamp(((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128),
        clamp(((112 * r - 94 * g - 18 * b + 128) >> 8) + 128),
    ]
}

pub(crate) fn rgb_to_gray(r: u8, g: u8, b: u8) -> u8 {
    ((77 * u32::from(r) + 150 * u32::from(g) + 29 * u32::from(b) + 128) >> 8) as u8
}

fn gray_to_luma(gray: u8) -> u8 {
    (16 + (u32::from(gray) * 219 + 127) / 255) as u8
}

fn luma_to_gray(y: u8) -> u8 {
    clamp(((i32::from(y) - 16) * 255 + 109) / 219)
}

/// Converts one pixel; the fourth channel (alpha) passes through.
pub(crate) fn convert(pixel: [u8; 4], from: ColorModel, to: ColorModel) -> [u8; 4] {
    let [a, b, c, alpha] = pixel;
    let [x, y, z] = match (from, to) {
        (ColorModel::Yuv, ColorModel::Yuv)
        | (ColorModel::Rgb, ColorModel::Rgb)
        | (ColorModel::Gray, ColorModel::Gray) => [a, b, c],
        (ColorModel::Yuv, ColorModel::Rgb) => yuv_to_rgb(a, b, c),
        (ColorModel::Rgb, ColorModel::Yuv) => rgb_to_yuv(a, b, c),
        (ColorModel::Rgb, ColorModel::Gray) => [rgb_to_gray(a, b, c), 0, 0],
        (ColorModel::Gray, ColorModel::Rgb) => [a, a, a],
        (ColorModel::Yuv, ColorModel::Gray) => [luma_to_gray(a), 0, 0],
        (ColorModel::Gray, ColorModel::Yuv) => [gray_to_luma(a), 128, 128],
    };
    [x, y, z, alpha]
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_reference_colors() {
        assert_eq!(yuv_to_rgb(16, 128, 128), [0, 0, 0]);
        assert_eq!(yuv_to_rgb(235, 128, 128), [255, 255, 255]);
        assert_eq!(rgb_to_yuv(0, 0, 0), [16, 128, 128]);
        assert_eq!(rgb_to_yuv(255, 255, 255), [235, 128, 128]);
        let red = yuv_to_rgb(81, 90, 240);
        assert!(red[0] >= 253 && red[1] <= 2 && red[2] <= 2, "{red:?}");
    }

    #[test]
    fn test_gray_paths() {
        assert_eq!(convert([0, 9, 9, 7], ColorModel::Gray, ColorModel::Yuv), [16, 128, 128, 7]);
        assert_eq!(convert([255, 0, 0, 0], ColorModel::Gray, ColorModel::Yuv)[0], 235);
        assert_eq!(convert([235, 128, 128, 255], ColorModel::Yuv, ColorModel::Gray)[0], 255);
        assert_eq!(convert([200, 200, 200, 1], ColorModel::Rgb, ColorModel::Gray)[0], 200);
    }

    #[quickcheck]
    fn gray_survives_rgb_round_trip(value: u8) -> bool {
        let rgb = convert([value, 0, 0, 255], ColorModel::Gray, ColorModel::Rgb);
        convert(rgb, ColorModel::Rgb, ColorModel::Gray)[0] == value
    }

    #[quickcheck]
    fn rgb_round_trip_is_close(r: u8, g: u8, b: u8) -> bool {
        let [y, u, v] = rgb_to_yuv(r, g, b);
        let back = yuv_to_rgb(y, u, v);
        back.iter()
            .zip([r, g, b])
            .all(|(&x, y)| (i32::from(x) - i32::from(y)).abs() <= 5)
    }
}
