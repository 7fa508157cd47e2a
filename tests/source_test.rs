mod common;

use avpipe::av::{CodecId, MediaKind, Packet};
use avpipe::config::Config;
use avpipe::format::{ContainerSession, ReadStatus};
use avpipe::io::dir::{open_directory, DirEntryKind, DirOptions};
use avpipe::io::{share, ByteSource, CallbackSource, FileSource, MemorySource, SourceBinding};
use avpipe::logging::Logger;
use common::*;
use pretty_assertions::assert_eq;
use std::io::SeekFrom;

fn drain(source: &mut dyn ByteSource) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 3];
    loop {
        let n = source.read(&mut buf).unwrap();
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}

fn packet_count(session: &mut ContainerSession) -> usize {
    let mut cursor = session.cursor();
    let mut packet = Packet::new();
    let mut count = 0;
    while cursor.next(&mut packet).unwrap() == ReadStatus::Populated {
        packet.unref();
        count += 1;
    }
    count
}

#[test]
fn test_end_of_stream_repeats_for_every_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bytes.bin");
    std::fs::write(&path, b"abcdefg").unwrap();

    let payload = b"abcdefg".to_vec();
    let mut offset = 0;
    let callback = CallbackSource::new(move |buf: &mut [u8]| {
        let n = buf.len().min(payload.len() - offset);
        buf[..n].copy_from_slice(&payload[offset..offset + n]);
        offset += n;
        Ok(n)
    });
    let mut sources: Vec<Box<dyn ByteSource>> = vec![
        Box::new(MemorySource::new(&b"abcdefg"[..])),
        Box::new(FileSource::open(&path).unwrap()),
        Box::new(callback),
    ];

    for source in sources.iter_mut() {
        assert_eq!(drain(source.as_mut()), b"abcdefg");
        let mut buf = [0u8; 8];
        for _ in 0..3 {
            assert_eq!(source.read(&mut buf).unwrap(), 0, "{}", source.describe());
        }
        assert_eq!(source.position(), 7);
    }
}

#[test]
fn test_seek_rules() {
    let mut memory = MemorySource::new(&b"0123456789"[..]);
    assert_eq!(memory.seek(SeekFrom::Start(8)).unwrap(), 8);
    assert_eq!(drain(&mut memory), b"89");
    assert!(memory.seek(SeekFrom::Current(-20)).is_err());

    let mut sequential = CallbackSource::new(|_: &mut [u8]| Ok(0)).with_name("pipe:0");
    let err = sequential.seek(SeekFrom::Start(0)).unwrap_err();
    assert!(err.is_contract_violation(), "{err:?}");
    assert!(err.to_string().contains("pipe:0"));
}

#[test]
fn test_open_path_detects_content() {
    let dir = tempfile::tempdir().unwrap();
    // The extension is misleading; content detection wins.
    let path = dir.path().join("tone.y4m");
    std::fs::write(&path, wav(2, 44_100, &[0; 64])).unwrap();

    let mut session = ContainerSession::open_path(&path, None, &Config::default(), Logger::discard()).unwrap();
    assert_eq!(session.format_name(), "wav");
    assert!(session.resource().contains("tone.y4m"));
    assert_eq!(session.streams()[0].params.codec_id, CodecId::PcmS16Le);
    assert_eq!(session.best_stream(MediaKind::Audio), Some(0));
    assert_eq!(session.best_stream(MediaKind::Video), None);
    assert_eq!(packet_count(&mut session), 1);
    session.close().unwrap();
    assert!(session.close().unwrap_err().is_contract_violation());
}

#[test]
fn test_open_missing_file_names_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.avi");
    let err = ContainerSession::open_path(&path, None, &Config::default(), Logger::discard()).unwrap_err();
    assert!(err.is_io());
    assert!(err.to_string().contains("absent.avi"), "{err}");
}

#[test]
fn test_sequential_source_is_detected_and_replayed() {
    let data = y4m(2, 2, "mono", &[vec![1; 4], vec![2; 4], vec![3; 4]]);
    let mut offset = 0;
    let source = CallbackSource::new(move |buf: &mut [u8]| {
        // Trickle the stream to exercise partial reads
        let n = buf.len().min(5).min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        offset += n;
        Ok(n)
    });

    let mut session =
        ContainerSession::open(SourceBinding::owned(source), None, &Config::default(), Logger::discard()).unwrap();
    assert_eq!(session.format_name(), "y4m");
    assert_eq!(packet_count(&mut session), 3);
}

#[test]
fn test_shared_source_outlives_session() {
    let shared = share(MemorySource::new(wav(1, 8_000, &[5; 16])));
    let binding = SourceBinding::Shared(shared.clone());
    let mut session = ContainerSession::open(binding, None, &Config::default(), Logger::discard()).unwrap();
    assert_eq!(packet_count(&mut session), 1);
    session.close().unwrap();

    let mut source = shared.lock();
    assert_eq!(source.seek(SeekFrom::Start(0)).unwrap(), 0);
    let mut magic = [0u8; 4];
    assert_eq!(source.read(&mut magic).unwrap(), 4);
    assert_eq!(&magic, b"RIFF");
}

#[test]
fn test_directory_of_clips() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.wav"), wav(1, 8_000, &[0; 8])).unwrap();
    std::fs::write(dir.path().join("b.y4m"), y4m(2, 2, "mono", &[vec![0; 4]])).unwrap();
    std::fs::create_dir(dir.path().join("c")).unwrap();

    let mut handle = open_directory(dir.path(), DirOptions::default(), Logger::discard()).unwrap();
    assert_eq!(handle.path(), dir.path());
    let mut formats = Vec::new();
    let mut kinds = Vec::new();
    while let Some(entry) = handle.next_entry().unwrap() {
        kinds.push((entry.name.clone(), entry.kind));
        if entry.kind == DirEntryKind::File {
            let session =
                ContainerSession::open_path(&entry.path, None, &Config::default(), Logger::discard()).unwrap();
            formats.push(session.format_name());
        }
    }
    handle.close();

    assert_eq!(
        kinds,
        vec![
            ("a.wav".to_string(), DirEntryKind::File),
            ("b.y4m".to_string(), DirEntryKind::File),
            ("c".to_string(), DirEntryKind::Directory),
        ]
    );
    assert_eq!(formats, vec!["wav", "y4m"]);
}
