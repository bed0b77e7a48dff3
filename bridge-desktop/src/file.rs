//! File Byte Source Implementation using std::fs

use bridge_traits::{
    error::{BridgeError, Result},
    source::ByteSource,
};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Local file byte source
///
/// Blocking reads through `std::fs::File`; the engine calls it from its
/// prefetch thread so the decode path never waits on disk.
pub struct FileSource {
    path: PathBuf,
    file: Option<File>,
    length: u64,
    position: u64,
    at_end: bool,
}

impl FileSource {
    /// Open a file for streaming
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(Self::map_io_error)?;
        let length = file.metadata().map_err(Self::map_io_error)?.len();

        debug!(path = ?path, length, "Opened file source");

        Ok(Self {
            path,
            file: Some(file),
            length,
            position: 0,
            at_end: length == 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| BridgeError::NotAvailable("file source is closed".to_string()))
    }
}

impl ByteSource for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.file_mut()?.read(buf).map_err(Self::map_io_error)?;
        self.position += n as u64;
        self.at_end = n == 0 && !buf.is_empty();
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let position = self.file_mut()?.seek(pos).map_err(Self::map_io_error)?;
        self.position = position;
        self.at_end = position >= self.length;
        Ok(position)
    }

    fn length(&self) -> Option<u64> {
        Some(self.length)
    }

    fn at_end(&self) -> bool {
        self.at_end
    }

    fn close(&mut self) -> Result<()> {
        if self.file.take().is_some() {
            debug!(path = ?self.path, position = self.position, "Closed file source");
        }
        Ok(())
    }

    fn description(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;

    fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
        let path = env::temp_dir().join(format!("{}-{}", std::process::id(), name));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[test]
    fn test_open_missing_file() {
        let result = FileSource::open(env::temp_dir().join("definitely-missing-track.mp3"));
        assert!(matches!(result, Err(BridgeError::Io(_))));
    }

    #[test]
    fn test_read_seek_and_end() {
        let path = temp_file("file-source-read.bin", &[10, 20, 30, 40, 50]);
        let mut source = FileSource::open(&path).unwrap();
        assert_eq!(source.length(), Some(5));
        assert_eq!(source.description(), path.file_name().unwrap().to_string_lossy());

        let mut buf = [0u8; 3];
        assert_eq!(source.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [10, 20, 30]);

        assert_eq!(source.seek(SeekFrom::Start(4)).unwrap(), 4);
        assert_eq!(source.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 50);
        assert!(!source.at_end());
        assert_eq!(source.read(&mut buf).unwrap(), 0);
        assert!(source.at_end());

        source.close().unwrap();
        assert!(source.read(&mut buf).is_err());
        let _ = std::fs::remove_file(path);
    }
}
