use super::{ByteSource, SourceCaps};
use crate::{AvError, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// A byte source backed by a file on disk.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    path: PathBuf,
    position: u64,
}

impl FileSource {
    /// Opens `path` for reading. Errors name the path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| AvError::resource_io(&path, e))?;
        Ok(Self {
            file,
            path,
            position: 0,
        })
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.file.read(buf) {
                Ok(n) => {
                    self.position += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(AvError::resource_io(&self.path, e)),
            }
        }
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let position = self
            .file
            .seek(pos)
            .map_err(|e| AvError::resource_io(&self.path, e))?;
        self.position = position;
        Ok(position)
    }

    fn size(&mut self) -> Option<u64> {
        self.file.metadata().ok().map(|m| m.len())
    }

    fn capabilities(&self) -> SourceCaps {
        SourceCaps::SEEKABLE
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_seek_and_eof() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();

        let mut source = FileSource::open(tmp.path()).unwrap();
        assert_eq!(source.size(), Some(10));

        let mut buf = [0u8; 4];
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(source.seek(SeekFrom::Current(4)).unwrap(), 8);
        assert_eq!(source.read(&mut buf).unwrap(), 2);
        assert_eq!(source.read(&mut buf).unwrap(), 0);
        assert_eq!(source.read(&mut buf).unwrap(), 0);
        assert_eq!(source.position(), 10);
    }

    #[test]
    fn test_open_missing_names_path() {
        let err = FileSource::open("/definitely/not/here.wav").unwrap_err();
        assert!(err.is_io());
        assert!(err.to_string().contains("/definitely/not/here.wav"));
    }
}
