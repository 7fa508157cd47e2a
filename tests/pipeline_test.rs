mod common;

use avpipe::av::{ChannelLayout, Frame, MediaKind, PixelFormat, SampleFormat};
use avpipe::codec::DecoderStats;
use avpipe::config::Config;
use avpipe::format::{ContainerSession, ProbeBudget};
use avpipe::io::{CallbackSource, SourceBinding};
use avpipe::logging::Logger;
use avpipe::pipeline::{Flow, Pipeline};
use avpipe::transform::{AudioSpec, Geometry, Resampler, ScaleAlgorithm, Scaler};
use common::*;
use pretty_assertions::assert_eq;
use std::io;

fn pipeline(data: Vec<u8>) -> Pipeline {
    Pipeline::new(open(data), Config::default(), Logger::discard())
}

fn s16_samples(frame: &Frame) -> Vec<i16> {
    frame
        .row(0, 0)
        .unwrap()
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

#[test]
fn test_avi_decodes_video_and_audio() {
    let streams = vec![
        riff_list(b"strl", &[avi_stream_header(b"vids", 1, 25, 2), avi_bitmap(2, 2, 24)]),
        riff_list(
            b"strl",
            &[avi_stream_header(b"auds", 1, 8_000, 4), riff_chunk(b"strf", &wave_format(1, 8_000, 16))],
        ),
    ];
    // Bottom-up BGR rows padded to 4 bytes
    let picture = [[7, 8, 9, 10, 11, 12, 0, 0], [1, 2, 3, 4, 5, 6, 0, 0]].concat();
    let movi = vec![
        riff_chunk(b"00db", &picture),
        riff_chunk(b"01wb", &[1, 0, 2, 0]),
        riff_chunk(b"00db", &picture),
        riff_chunk(b"01wb", &[3, 0, 4, 0]),
    ];

    let mut seen = Vec::new();
    let mut audio = Vec::new();
    let stats = pipeline(avi(streams, movi))
        .run(|stream, frame| {
            seen.push((stream, frame.pts));
            match stream {
                0 => {
                    assert_eq!(frame.pixel_format(), Some(PixelFormat::Bgr24));
                    assert_eq!(frame.row(0, 0).unwrap(), &[1, 2, 3, 4, 5, 6]);
                    assert_eq!(frame.row(0, 1).unwrap(), &[7, 8, 9, 10, 11, 12]);
                }
                _ => audio.extend(s16_samples(frame)),
            }
            Ok(Flow::Continue)
        })
        .unwrap();

    assert_eq!(seen, vec![(0, Some(0)), (1, Some(0)), (0, Some(1)), (1, Some(2))]);
    assert_eq!(audio, vec![1, 2, 3, 4]);
    assert_eq!(stats.packets_read, 4);
    assert_eq!(stats.packets_skipped, 0);
    assert_eq!(stats.frames, 4);
    let per_decoder = DecoderStats {
        packets: 2,
        frames: 2,
        end_of_stream: 1,
    };
    assert_eq!(stats.decoders.get(&0), Some(&per_decoder));
    assert_eq!(stats.decoders.get(&1), Some(&per_decoder));
}

#[test]
fn test_select_skips_other_kinds() {
    let streams = vec![
        riff_list(b"strl", &[avi_stream_header(b"vids", 1, 25, 1), avi_bitmap(2, 2, 24)]),
        riff_list(
            b"strl",
            &[avi_stream_header(b"auds", 1, 8_000, 2), riff_chunk(b"strf", &wave_format(1, 8_000, 16))],
        ),
    ];
    let movi = vec![riff_chunk(b"00db", &[0; 16]), riff_chunk(b"01wb", &[0; 4])];

    let mut streams_seen = Vec::new();
    let stats = pipeline(avi(streams, movi))
        .select(&[MediaKind::Audio])
        .run(|stream, _| {
            streams_seen.push(stream);
            Ok(Flow::Continue)
        })
        .unwrap();
    assert_eq!(streams_seen, vec![1]);
    assert_eq!(stats.packets_skipped, 1);
    assert_eq!(stats.decoders.keys().copied().collect::<Vec<_>>(), vec![1]);
}

#[test]
fn test_y4m_black_thumbnail() {
    let black = yuv420_frame(320, 240, 16, 128, 128);
    let data = y4m(320, 240, "420jpeg", &[black.clone(), black]);
    let scaler = Scaler::new(
        Geometry::new(320, 240, PixelFormat::Yuv420p),
        Geometry::new(50, 50, PixelFormat::Rgba),
        ScaleAlgorithm::Bilinear,
    )
    .unwrap();

    let mut pictures = 0;
    let stats = pipeline(data)
        .with_scaler(0, scaler)
        .run(|_, frame| {
            pictures += 1;
            assert_eq!((frame.width(), frame.height()), (50, 50));
            let rows: Vec<&[u8]> = (0..).map_while(|y| frame.row(0, y)).collect();
            assert_eq!(rows.len(), 50);
            for row in rows {
                assert!(row.chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
            }
            Ok(Flow::Continue)
        })
        .unwrap();
    assert_eq!(pictures, 2);
    assert_eq!(stats.frames, 2);
}

#[test]
fn test_thumbnail_exports_to_png() {
    let gray = yuv420_frame(8, 8, 235, 128, 128);
    let scaler = Scaler::new(
        Geometry::new(8, 8, PixelFormat::Yuv420p),
        Geometry::new(4, 4, PixelFormat::Rgb24),
        ScaleAlgorithm::Point,
    )
    .unwrap();

    let mut png = Vec::new();
    pipeline(y4m(8, 8, "420", &[gray]))
        .with_scaler(0, scaler)
        .run(|_, frame| {
            png = avpipe::av::image::encode_png(&frame.to_image()?)?;
            Ok(Flow::Stop)
        })
        .unwrap();

    let decoded = avpipe::av::image::decode_png(&png).unwrap();
    let frame = Frame::from_image(&decoded, 32).unwrap();
    assert_eq!(frame.pixel_format(), Some(PixelFormat::Rgb24));
    assert_eq!(frame.row(0, 3).unwrap(), &[255; 12]);
}

#[test]
fn test_stop_skips_flush() {
    let frames: Vec<Vec<u8>> = (0..3u8).map(|i| vec![i; 4]).collect();
    let mut count = 0;
    let stats = pipeline(y4m(2, 2, "mono", &frames))
        .run(|_, _| {
            count += 1;
            Ok(Flow::Stop)
        })
        .unwrap();
    assert_eq!(count, 1);
    assert!(stats.stopped);
    assert_eq!(stats.packets_read, 1);
    assert_eq!(stats.decoders[&0].end_of_stream, 0);
}

#[test]
fn test_resampler_is_drained_at_end_of_stream() {
    let samples: Vec<i16> = (0..100).map(|i| i * 100).collect();
    let output = AudioSpec::new(16_000, SampleFormat::S16, ChannelLayout::Stereo);

    let mut chunks = Vec::new();
    let mut total = Vec::new();
    pipeline(wav(1, 8_000, &samples))
        .with_resampler(0, Resampler::new(), output)
        .run(|_, frame| {
            assert_eq!(AudioSpec::of(frame), Some(output));
            chunks.push((frame.samples(), frame.pts));
            total.extend(s16_samples(frame));
            Ok(Flow::Continue)
        })
        .unwrap();

    assert_eq!(chunks, vec![(198, Some(0)), (2, Some(198))]);
    assert_eq!(total.len(), 400);
    // Interpolated halfway between the first two input samples, on both channels
    assert_eq!(&total[..6], &[0, 0, 50, 50, 100, 100]);
}

#[test]
fn test_read_error_still_flushes_decoders() {
    let data = wav(1, 8_000, &[10, 20, 30, 40, 50, 60, 70, 80]);
    // Header plus eight bytes of samples, then the source fails
    let limit = data.len() - 8;
    let mut offset = 0;
    let source = CallbackSource::new(move |buf: &mut [u8]| {
        if offset == limit {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "link dropped"));
        }
        let n = buf.len().min(limit - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        offset += n;
        Ok(n)
    });
    let config = Config {
        audio_packet_samples: 2,
        ..Config::default()
    };
    let session =
        ContainerSession::open(SourceBinding::owned(source), Some("wav"), &config, Logger::discard()).unwrap();

    let mut samples = Vec::new();
    let spec = AudioSpec::new(8_000, SampleFormat::S16, ChannelLayout::Mono);
    let err = Pipeline::new(session, config, Logger::discard())
        .with_resampler(0, Resampler::new(), spec)
        .run(|_, frame| {
            samples.extend(s16_samples(frame));
            Ok(Flow::Continue)
        })
        .unwrap_err();

    assert!(err.is_io(), "{err:?}");
    // The held-back last sample only arrives through the flush
    assert_eq!(samples, vec![10, 20, 30, 40]);
}

#[test]
fn test_sink_error_is_returned() {
    let frames = vec![vec![0u8; 4], vec![1u8; 4]];
    let err = pipeline(y4m(2, 2, "mono", &frames))
        .run(|_, _| Err(avpipe::AvError::Codec("sink full".into())))
        .unwrap_err();
    assert!(matches!(err, avpipe::AvError::Codec(ref m) if m == "sink full"), "{err:?}");
}

#[test]
fn test_transport_stream_without_decoders() {
    let mut writer = TsWriter::default();
    writer.pat(&[(1, 0x1000)]);
    writer.pmt(0x1000, 1, &[(STREAM_TYPE_H264, 0x100), (STREAM_TYPE_AAC, 0x101)]);
    writer.pes(0x101, 0xC0, 0, &adts_frame(32));
    writer.pes(0x100, 0xE0, 3_000, &[0, 0, 1, 0x41, 0x9A]);
    writer.pes(0x101, 0xC0, 1_920, &adts_frame(32));

    let mut session = open(writer.finish());
    assert_eq!(session.programs().len(), 1);
    assert_eq!(session.programs()[0].streams, vec![0, 1]);
    session.probe_streams(ProbeBudget::default()).unwrap();
    let audio = session.streams()[1].params.as_audio().unwrap();
    assert_eq!(audio.sample_rate, Some(48_000));
    assert_eq!(audio.channel_layout, Some(ChannelLayout::Stereo));

    let mut frames = 0;
    let stats = Pipeline::new(session, Config::default(), Logger::discard())
        .run(|_, _| {
            frames += 1;
            Ok(Flow::Continue)
        })
        .unwrap();
    assert_eq!(frames, 0);
    assert_eq!(stats.packets_read, 3);
    assert_eq!(stats.packets_skipped, 3);
    assert!(stats.decoders.is_empty());
}
