use super::{Decoder, DecoderFactory, DecoderOptions, ReceiveStatus, SendStatus};
use crate::av::{
    ChannelLayout, CodecId, CodecParameters, Frame, FrameFormat, Packet, Rational, SampleFormat,
};
use crate::{AvError, Result};
use bytes::Bytes;

pub(crate) struct PcmFactory;

impl DecoderFactory for PcmFactory {
    fn name(&self) -> &'static str {
        "pcm"
    }

    fn supports(&self, codec: CodecId) -> bool {
        codec.is_pcm()
    }

    fn create(
        &self,
        params: &CodecParameters,
        time_base: Rational,
        options: &DecoderOptions,
    ) -> Result<Box<dyn Decoder>> {
        let codec = params.codec_id;
        let (Some(sample_bytes), Some(output)) = (codec.pcm_sample_bytes(), codec.pcm_sample_format())
        else {
            return Err(AvError::UnsupportedCodec(codec));
        };
        let audio = params
            .as_audio()
            .ok_or_else(|| AvError::Codec(format!("{codec} decoder needs audio parameters")))?;
        let sample_rate = audio
            .sample_rate
            .filter(|&rate| rate > 0)
            .ok_or_else(|| AvError::Codec(format!("{codec} stream has no sample rate")))?;
        let layout = audio
            .channel_layout
            .filter(|layout| layout.channels() > 0)
            .ok_or_else(|| AvError::Codec(format!("{codec} stream has no channel layout")))?;

        let channels = layout.channels() as usize;
        let block_align = if audio.block_align >= channels * sample_bytes {
            audio.block_align
        } else {
            channels * sample_bytes
        };

        Ok(Box::new(PcmDecoder {
            sample_bytes,
            output,
            sample_rate,
            layout,
            block_align,
            time_base,
            frame_samples: options.audio_frame_samples.max(1),
            align: options.frame_alignment,
            pending: None,
            flushing: false,
        }))
    }
}

struct Pending {
    data: Bytes,
    pts: Option<i64>,
    keyframe: bool,
    /// Sample blocks already emitted
    consumed: usize,
}

impl Pending {
    fn blocks(&self, block_align: usize) -> usize {
        self.data.len() / block_align
    }
}

/// Splits interleaved little-endian PCM into frames of at most
/// `frame_samples` samples per channel.
struct PcmDecoder {
    sample_bytes: usize,
    output: SampleFormat,
    sample_rate: u32,
    layout: ChannelLayout,
    block_align: usize,
    time_base: Rational,
    frame_samples: usize,
    align: usize,
    pending: Option<Pending>,
    flushing: bool,
}

impl PcmDecoder {
    fn emit(&self, pending: &Pending, samples: usize, frame: &mut Frame) -> Result<()> {
        let format = FrameFormat::audio(samples, self.sample_rate, self.output, self.layout);
        frame.ensure_allocated(format, self.align)?;

        let channels = self.layout.channels() as usize;
        let out_bytes = self.output.bytes_per_sample();
        let first = pending.consumed * self.block_align;
        let src = &pending.data[first..first + samples * self.block_align];
        let dst = frame.row_mut(0, 0)?;

        if self.block_align == channels * self.sample_bytes && self.sample_bytes == out_bytes {
            dst.copy_from_slice(src);
        } else {
            for (block, out) in src
                .chunks_exact(self.block_align)
                .zip(dst.chunks_exact_mut(channels * out_bytes))
            {
                for ch in 0..channels {
                    let sample = &block[ch * self.sample_bytes..(ch + 1) * self.sample_bytes];
                    let target = &mut out[ch * out_bytes..(ch + 1) * out_bytes];
                    if self.sample_bytes == 3 {
                        let widened =
                            i32::from_le_bytes([0, sample[0], sample[1], sample[2]]);
                        target.copy_from_slice(&widened.to_le_bytes());
                    } else {
                        target.copy_from_slice(sample);
                    }
                }
            }
        }

        frame.pts = pending.pts.map(|pts| {
            pts + Rational::new(1, self.sample_rate as i32)
                .rescale(pending.consumed as i64, self.time_base)
        });
        frame.time_base = self.time_base;
        frame.keyframe = pending.keyframe;
        Ok(())
    }
}

impl Decoder for PcmDecoder {
    fn send_packet(&mut self, packet: Option<&Packet>) -> Result<SendStatus> {
        if self.flushing {
            return Err(AvError::contract("pcm decoder is flushing"));
        }
        let Some(packet) = packet else {
            self.flushing = true;
            return Ok(SendStatus::Accepted);
        };
        if self.pending.is_some() {
            return Ok(SendStatus::Busy);
        }
        // A trailing partial block cannot be decoded and is dropped
        self.pending = Some(Pending {
            data: Bytes::copy_from_slice(packet.data()),
            pts: packet.pts.or(packet.dts),
            keyframe: packet.flags.keyframe,
            consumed: 0,
        });
        Ok(SendStatus::Accepted)
    }

    fn receive_frame(&mut self, frame: &mut Frame) -> Result<ReceiveStatus> {
        if let Some(mut pending) = self.pending.take() {
            let remaining = pending.blocks(self.block_align) - pending.consumed;
            if remaining > 0 {
                let samples = remaining.min(self.frame_samples);
                self.emit(&pending, samples, frame)?;
                pending.consumed += samples;
                if pending.consumed < pending.blocks(self.block_align) {
                    self.pending = Some(pending);
                }
                return Ok(ReceiveStatus::Produced);
            }
        }
        if self.flushing {
            Ok(ReceiveStatus::EndOfStream)
        } else {
            Ok(ReceiveStatus::NeedsMoreInput)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::AudioParams;
    use pretty_assertions::assert_eq;

    fn decoder(codec: CodecId, rate: u32, layout: ChannelLayout, frame_samples: usize) -> Box<dyn Decoder> {
        let params = CodecParameters::audio(
            codec,
            AudioParams {
                sample_rate: Some(rate),
                channel_layout: Some(layout),
                ..AudioParams::default()
            },
        );
        let options = DecoderOptions {
            audio_frame_samples: frame_samples,
            ..DecoderOptions::default()
        };
        PcmFactory
            .create(&params, Rational::new(1, rate as i32), &options)
            .unwrap()
    }

    #[test]
    fn test_splits_into_frames() {
        let mut dec = decoder(CodecId::PcmS16Le, 8000, ChannelLayout::Stereo, 256);
        let data: Vec<u8> = (0..1000u32 * 4).map(|i| i as u8).collect();
        let packet = Packet::from_data(&data).with_pts(100).with_key_flag(true);
        assert_eq!(dec.send_packet(Some(&packet)).unwrap(), SendStatus::Accepted);
        assert_eq!(dec.send_packet(Some(&packet)).unwrap(), SendStatus::Busy);

        let mut frame = Frame::new();
        let mut produced = Vec::new();
        while dec.receive_frame(&mut frame).unwrap() == ReceiveStatus::Produced {
            produced.push((frame.samples(), frame.pts));
            assert_eq!(frame.sample_format(), Some(SampleFormat::S16));
            assert_eq!(frame.sample_rate(), Some(8000));
        }
        assert_eq!(
            produced,
            vec![(256, Some(100)), (256, Some(356)), (256, Some(612)), (232, Some(868))]
        );
        assert_eq!(frame.row(0, 0).unwrap()[..4], data[768 * 4..768 * 4 + 4]);
        assert_eq!(dec.send_packet(Some(&packet)).unwrap(), SendStatus::Accepted);
    }

    #[test]
    fn test_widens_24_bit() {
        let mut dec = decoder(CodecId::PcmS24Le, 48000, ChannelLayout::Mono, 1024);
        dec.send_packet(Some(&Packet::from_data(&[0x01, 0x02, 0x03, 0x00, 0x00, 0x80])))
            .unwrap();
        let mut frame = Frame::new();
        assert_eq!(dec.receive_frame(&mut frame).unwrap(), ReceiveStatus::Produced);
        assert_eq!(frame.sample_format(), Some(SampleFormat::S32));
        let row = frame.row(0, 0).unwrap();
        assert_eq!(i32::from_le_bytes([row[0], row[1], row[2], row[3]]), 0x0302_0100);
        assert_eq!(i32::from_le_bytes([row[4], row[5], row[6], row[7]]), i32::MIN);
    }

    #[test]
    fn test_partial_block_and_flush() {
        let mut dec = decoder(CodecId::PcmS16Le, 44100, ChannelLayout::Stereo, 1024);
        // One complete block plus two stray bytes
        dec.send_packet(Some(&Packet::from_data(&[1, 0, 2, 0, 9, 9]))).unwrap();
        let mut frame = Frame::new();
        assert_eq!(dec.receive_frame(&mut frame).unwrap(), ReceiveStatus::Produced);
        assert_eq!(frame.samples(), 1);
        assert_eq!(dec.receive_frame(&mut frame).unwrap(), ReceiveStatus::NeedsMoreInput);

        dec.send_packet(Some(&Packet::from_data(&[7]))).unwrap();
        assert_eq!(dec.receive_frame(&mut frame).unwrap(), ReceiveStatus::NeedsMoreInput);

        dec.send_packet(None).unwrap();
        assert_eq!(dec.receive_frame(&mut frame).unwrap(), ReceiveStatus::EndOfStream);
        assert!(dec.send_packet(None).unwrap_err().is_contract_violation());
    }

    #[test]
    fn test_pts_in_coarser_time_base() {
        let params = CodecParameters::audio(
            CodecId::PcmU8,
            AudioParams {
                sample_rate: Some(8000),
                channel_layout: Some(ChannelLayout::Mono),
                ..AudioParams::default()
            },
        );
        let options = DecoderOptions {
            audio_frame_samples: 400,
            ..DecoderOptions::default()
        };
        let mut dec = PcmFactory
            .create(&params, Rational::new(1, 1000), &options)
            .unwrap();
        dec.send_packet(Some(&Packet::from_data(&[128; 800]).with_pts(10)))
            .unwrap();
        let mut frame = Frame::new();
        dec.receive_frame(&mut frame).unwrap();
        assert_eq!(frame.pts, Some(10));
        dec.receive_frame(&mut frame).unwrap();
        assert_eq!(frame.pts, Some(60));
        assert_eq!(frame.time_base, Rational::new(1, 1000));
    }

    #[test]
    fn test_missing_parameters() {
        let params = CodecParameters::audio(CodecId::PcmS16Le, AudioParams::default());
        let err = PcmFactory
            .create(&params, Rational::new(1, 44100), &DecoderOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, AvError::Codec(_)));
    }
}
