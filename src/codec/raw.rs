use super::{Decoder, DecoderFactory, DecoderOptions, ReceiveStatus, SendStatus};
use crate::av::{CodecId, CodecParameters, Frame, FrameFormat, Packet, PixelFormat, Rational};
use crate::{AvError, Result};
use bytes::Bytes;
use std::collections::VecDeque;

pub(crate) struct RawVideoFactory;

impl DecoderFactory for RawVideoFactory {
    fn name(&self) -> &'static str {
        "rawvideo"
    }

    fn supports(&self, codec: CodecId) -> bool {
        codec == CodecId::RawVideo
    }

    fn create(
        &self,
        params: &CodecParameters,
        time_base: Rational,
        options: &DecoderOptions,
    ) -> Result<Box<dyn Decoder>> {
        let video = params
            .as_video()
            .ok_or_else(|| AvError::Codec("raw video decoder needs video parameters".into()))?;
        let pixel_format = video
            .pixel_format
            .ok_or_else(|| AvError::Codec("raw video stream has no pixel format".into()))?;
        if video.width == 0 || video.height == 0 {
            return Err(AvError::Codec(format!(
                "raw video stream has no geometry ({}x{})",
                video.width, video.height
            )));
        }
        Ok(Box::new(RawVideoDecoder {
            format: FrameFormat::video(video.width, video.height, pixel_format),
            pixel_format,
            width: video.width,
            height: video.height,
            bottom_up: video.bottom_up,
            swap_uv: video.swap_uv,
            align: options.frame_alignment,
            depth: options.queue_depth.max(1),
            time_base,
            queue: VecDeque::new(),
            flushing: false,
        }))
    }
}

struct Queued {
    data: Bytes,
    pts: Option<i64>,
    keyframe: bool,
}

/// Copies uncompressed pictures into frames. Packets are queued on send and
/// converted on receive, straight into the caller's frame.
struct RawVideoDecoder {
    format: FrameFormat,
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
    bottom_up: bool,
    swap_uv: bool,
    align: usize,
    depth: usize,
    time_base: Rational,
    queue: VecDeque<Queued>,
    flushing: bool,
}

impl RawVideoDecoder {
    /// Offset and stride of every plane in a packet of `len` bytes.
    ///
    /// Packed formats may pad rows (bottom-up DIBs pad to four bytes); the
    /// stride is then inferred from the packet length.
    fn source_layout(&self, len: usize) -> Result<Vec<(usize, usize)>> {
        let pf = self.pixel_format;
        let tight = pf.image_size(self.width, self.height);
        let mut layout = Vec::with_capacity(pf.plane_count());
        let mut offset: usize = 0;
        for plane in 0..pf.plane_count() {
            let (row_bytes, rows) = pf.plane_dimensions(plane, self.width, self.height);
            let stride = if pf.plane_count() == 1 && Some(len) != tight && len % rows == 0 && len / rows > row_bytes {
                len / rows
            } else {
                row_bytes
            };
            layout.push((offset, stride));
            offset = offset.saturating_add(stride.saturating_mul(rows));
        }
        if len < offset {
            return Err(AvError::Codec(format!(
                "raw {} frame of {len} bytes, expected {offset}",
                self.pixel_format
            )));
        }
        Ok(layout)
    }

    fn convert(&self, packet: &Queued, frame: &mut Frame) -> Result<()> {
        let layout = self.source_layout(packet.data.len())?;
        frame.ensure_allocated(self.format, self.align)?;
        for plane in 0..self.pixel_format.plane_count() {
            // YV12 stores V before U
            let source = match plane {
                1 | 2 if self.swap_uv => 3 - plane,
                _ => plane,
            };
            let (offset, stride) = layout[source];
            let (row_bytes, rows) = self.pixel_format.plane_dimensions(plane, self.width, self.height);
            for y in 0..rows {
                let sy = if self.bottom_up { rows - 1 - y } else { y };
                let start = offset + sy * stride;
                frame
                    .row_mut(plane, y)?
                    .copy_from_slice(&packet.data[start..start + row_bytes]);
            }
        }
        frame.pts = packet.pts;
        frame.time_base = self.time_base;
        frame.keyframe = packet.keyframe;
        Ok(())
    }
}

impl Decoder for RawVideoDecoder {
    fn send_packet(&mut self, packet: Option<&Packet>) -> Result<SendStatus> {
        if self.flushing {
            return Err(AvError::contract("raw video decoder is flushing"));
        }
        let Some(packet) = packet else {
            self.flushing = true;
            return Ok(SendStatus::Accepted);
        };
        if self.queue.len() >= self.depth {
            return Ok(SendStatus::Busy);
        }
        self.queue.push_back(Queued {
            data: Bytes::copy_from_slice(packet.data()),
            pts: packet.pts.or(packet.dts),
            keyframe: packet.flags.keyframe,
        });
        Ok(SendStatus::Accepted)
    }

    fn receive_frame(&mut self, frame: &mut Frame) -> Result<ReceiveStatus> {
        match self.queue.pop_front() {
            Some(packet) => {
                self.convert(&packet, frame)?;
                Ok(ReceiveStatus::Produced)
            }
            None if self.flushing => Ok(ReceiveStatus::EndOfStream),
            None => Ok(ReceiveStatus::NeedsMoreInput),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::VideoParams;
    use pretty_assertions::assert_eq;

    fn decoder(width: u32, height: u32, format: PixelFormat, tweak: impl FnOnce(&mut VideoParams)) -> Box<dyn Decoder> {
        let mut video = VideoParams {
            width,
            height,
            pixel_format: Some(format),
            ..VideoParams::default()
        };
        tweak(&mut video);
        let options = DecoderOptions {
            queue_depth: 2,
            ..DecoderOptions::default()
        };
        RawVideoFactory
            .create(
                &CodecParameters::video(CodecId::RawVideo, video),
                Rational::new(1, 25),
                &options,
            )
            .unwrap()
    }

    fn rows(frame: &Frame, plane: usize) -> Vec<Vec<u8>> {
        let rows = frame.plane_layout(plane).unwrap().rows;
        (0..rows).map(|y| frame.row(plane, y).unwrap().to_vec()).collect()
    }

    #[test]
    fn test_gray_frame() {
        let mut dec = decoder(4, 2, PixelFormat::Gray8, |_| {});
        let packet = Packet::from_data(&[1, 2, 3, 4, 5, 6, 7, 8]).with_pts(3).with_key_flag(true);
        assert_eq!(dec.send_packet(Some(&packet)).unwrap(), SendStatus::Accepted);

        let mut frame = Frame::new();
        assert_eq!(dec.receive_frame(&mut frame).unwrap(), ReceiveStatus::Produced);
        assert_eq!(rows(&frame, 0), vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
        assert_eq!(frame.pts, Some(3));
        assert_eq!(frame.time_base, Rational::new(1, 25));
        assert!(frame.keyframe);
        assert_eq!(dec.receive_frame(&mut frame).unwrap(), ReceiveStatus::NeedsMoreInput);
    }

    #[test]
    fn test_bottom_up_padded_rows() {
        let mut dec = decoder(2, 2, PixelFormat::Bgr24, |v| v.bottom_up = true);
        // Two rows of six bytes, each padded to eight; last row first
        let data = [7, 7, 7, 8, 8, 8, 0, 0, 1, 1, 1, 2, 2, 2, 0, 0];
        dec.send_packet(Some(&Packet::from_data(&data))).unwrap();
        let mut frame = Frame::new();
        dec.receive_frame(&mut frame).unwrap();
        assert_eq!(rows(&frame, 0), vec![vec![1, 1, 1, 2, 2, 2], vec![7, 7, 7, 8, 8, 8]]);
    }

    #[test]
    fn test_swapped_chroma() {
        let mut dec = decoder(4, 2, PixelFormat::Yuv420p, |v| v.swap_uv = true);
        let mut data = vec![16u8; 8];
        data.extend_from_slice(&[200, 201, 50, 51]);
        dec.send_packet(Some(&Packet::from_data(&data))).unwrap();
        let mut frame = Frame::new();
        dec.receive_frame(&mut frame).unwrap();
        assert_eq!(frame.row(1, 0).unwrap(), &[50, 51]);
        assert_eq!(frame.row(2, 0).unwrap(), &[200, 201]);
    }

    #[test]
    fn test_queue_and_flush() {
        let mut dec = decoder(1, 1, PixelFormat::Gray8, |_| {});
        let packet = Packet::from_data(&[9]);
        assert_eq!(dec.send_packet(Some(&packet)).unwrap(), SendStatus::Accepted);
        assert_eq!(dec.send_packet(Some(&packet)).unwrap(), SendStatus::Accepted);
        assert_eq!(dec.send_packet(Some(&packet)).unwrap(), SendStatus::Busy);

        let mut frame = Frame::new();
        assert_eq!(dec.receive_frame(&mut frame).unwrap(), ReceiveStatus::Produced);
        assert_eq!(dec.send_packet(Some(&packet)).unwrap(), SendStatus::Accepted);
        assert_eq!(dec.send_packet(None).unwrap(), SendStatus::Accepted);
        assert!(dec.send_packet(Some(&packet)).unwrap_err().is_contract_violation());

        assert_eq!(dec.receive_frame(&mut frame).unwrap(), ReceiveStatus::Produced);
        assert_eq!(dec.receive_frame(&mut frame).unwrap(), ReceiveStatus::Produced);
        assert_eq!(dec.receive_frame(&mut frame).unwrap(), ReceiveStatus::EndOfStream);
    }

    #[test]
    fn test_short_packet_is_a_codec_error() {
        let mut dec = decoder(4, 4, PixelFormat::Yuv420p, |_| {});
        dec.send_packet(Some(&Packet::from_data(&[0; 20]))).unwrap();
        let err = dec.receive_frame(&mut Frame::new()).unwrap_err();
        assert!(matches!(err, AvError::Codec(_)));
    }

    #[test]
    fn test_frame_memory_is_reused() {
        let mut dec = decoder(2, 1, PixelFormat::Gray8, |_| {});
        let mut frame = Frame::new();
        dec.send_packet(Some(&Packet::from_data(&[1, 2]))).unwrap();
        dec.receive_frame(&mut frame).unwrap();
        let first = frame.plane(0).unwrap().as_ptr();
        dec.send_packet(Some(&Packet::from_data(&[3, 4]))).unwrap();
        dec.receive_frame(&mut frame).unwrap();
        assert_eq!(frame.plane(0).unwrap().as_ptr(), first);
        assert_eq!(frame.row(0, 0).unwrap(), &[3, 4]);

        let shared = frame.clone();
        dec.send_packet(Some(&Packet::from_data(&[5, 6]))).unwrap();
        dec.receive_frame(&mut frame).unwrap();
        assert_eq!(shared.row(0, 0).unwrap(), &[3, 4]);
        assert_eq!(frame.row(0, 0).unwrap(), &[5, 6]);
    }
}
