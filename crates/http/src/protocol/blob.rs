//! Variant storage for message bodies.
//!
//! A [`Blob`] holds body bytes either in memory or spilled into a temp
//! file. The parser starts every body in memory and calls
//! [`Blob::convert_to_file`] once the accumulated size crosses the
//! configured limit, so arbitrarily large bodies never pin the heap.
//!
//! The backing temp file is created in the OS temp directory and removed
//! when the blob is dropped.

use std::fmt;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};

use bytes::{BufMut, Bytes, BytesMut};
use tempfile::NamedTempFile;

/// Default prefix for spilled temp files.
const TEMP_PREFIX: &str = "swell-";

/// A message body: in-memory bytes or a temp-file-backed spill.
#[derive(Debug)]
pub enum Blob {
    InMemory(BytesMut),
    OnDisk(NamedTempFile),
}

impl Default for Blob {
    fn default() -> Self {
        Self::new()
    }
}

impl Blob {
    /// An empty in-memory blob.
    pub fn new() -> Self {
        Blob::InMemory(BytesMut::new())
    }

    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        Blob::InMemory(BytesMut::from(bytes.as_ref()))
    }

    pub fn from_file(file: NamedTempFile) -> Self {
        Blob::OnDisk(file)
    }

    #[inline]
    pub fn is_in_memory(&self) -> bool {
        matches!(self, Blob::InMemory(_))
    }

    #[inline]
    pub fn is_on_disk(&self) -> bool {
        matches!(self, Blob::OnDisk(_))
    }

    /// Byte count. A failed stat on the on-disk variant reads as 0; use
    /// [`Blob::checked_size`] when the error matters.
    pub fn size(&self) -> u64 {
        self.checked_size().unwrap_or(0)
    }

    /// Byte count, propagating a failed stat on the on-disk variant.
    pub fn checked_size(&self) -> io::Result<u64> {
        match self {
            Blob::InMemory(bytes) => Ok(bytes.len() as u64),
            Blob::OnDisk(file) => Ok(file.as_file().metadata()?.len()),
        }
    }

    /// Append bytes, growing the buffer or the backing file.
    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Blob::InMemory(bytes) => {
                bytes.put_slice(data);
                Ok(())
            }
            Blob::OnDisk(file) => {
                let f = file.as_file_mut();
                f.seek(SeekFrom::End(0))?;
                f.write_all(data)
            }
        }
    }

    /// Replace the contents.
    pub fn truncate(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Blob::InMemory(bytes) => {
                bytes.clear();
                bytes.put_slice(data);
                Ok(())
            }
            Blob::OnDisk(file) => {
                let f = file.as_file_mut();
                f.set_len(0)?;
                f.seek(SeekFrom::Start(0))?;
                f.write_all(data)
            }
        }
    }

    /// Spill the blob to a temp file. Idempotent: the on-disk variant is
    /// returned untouched. The tag flips only after the contents have been
    /// written out successfully.
    pub fn convert_to_file(&mut self) -> io::Result<()> {
        self.convert_to_file_with_prefix(TEMP_PREFIX)
    }

    /// As [`Blob::convert_to_file`], with a caller-supplied file name prefix.
    pub fn convert_to_file_with_prefix(&mut self, prefix: &str) -> io::Result<()> {
        let bytes = match self {
            Blob::OnDisk(_) => return Ok(()),
            Blob::InMemory(bytes) => bytes,
        };

        let mut file = tempfile::Builder::new().prefix(prefix).tempfile()?;
        file.as_file_mut().write_all(bytes)?;
        *self = Blob::OnDisk(file);
        Ok(())
    }

    /// Read the full contents out, regardless of variant.
    pub fn contents(&self) -> io::Result<Bytes> {
        match self {
            Blob::InMemory(bytes) => Ok(Bytes::copy_from_slice(bytes)),
            Blob::OnDisk(file) => {
                let mut f = file.as_file();
                f.seek(SeekFrom::Start(0))?;
                let mut buffer = Vec::new();
                f.read_to_end(&mut buffer)?;
                Ok(Bytes::from(buffer))
            }
        }
    }

    /// Serialize the contents into an output buffer.
    pub fn write_to(&self, dst: &mut BytesMut) -> io::Result<()> {
        match self {
            Blob::InMemory(bytes) => {
                dst.put_slice(bytes);
                Ok(())
            }
            Blob::OnDisk(_) => {
                dst.put_slice(&self.contents()?);
                Ok(())
            }
        }
    }
}

impl From<&[u8]> for Blob {
    fn from(data: &[u8]) -> Self {
        Blob::from_bytes(data)
    }
}

impl From<Bytes> for Blob {
    fn from(data: Bytes) -> Self {
        Blob::InMemory(BytesMut::from(&data[..]))
    }
}

/// Value equality against a byte sequence, in both variants. An unreadable
/// backing file compares unequal.
impl PartialEq<[u8]> for Blob {
    fn eq(&self, other: &[u8]) -> bool {
        match self {
            Blob::InMemory(bytes) => &bytes[..] == other,
            Blob::OnDisk(file) => match fs::read(file.path()) {
                Ok(contents) => contents == other,
                Err(_) => false,
            },
        }
    }
}

impl PartialEq<&[u8]> for Blob {
    fn eq(&self, other: &&[u8]) -> bool {
        self == *other
    }
}

impl fmt::Display for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.contents() {
            Ok(bytes) => write!(f, "{}", String::from_utf8_lossy(&bytes)),
            Err(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty_in_memory() {
        let blob = Blob::new();
        assert!(blob.is_in_memory());
        assert_eq!(blob.size(), 0);
        assert_eq!(blob.checked_size().unwrap(), 0);
        assert_eq!(blob, &b""[..]);
    }

    #[test]
    fn from_bytes() {
        let blob = Blob::from_bytes(b"ab");
        assert!(blob.is_in_memory());
        assert_eq!(blob.size(), 2);
        assert_eq!(blob, &b"ab"[..]);
    }

    #[test]
    fn from_file() {
        let mut file = tempfile::Builder::new().prefix("swell-test-").tempfile().unwrap();
        file.as_file_mut().write_all(b"ab").unwrap();

        let blob = Blob::from_file(file);
        assert!(blob.is_on_disk());
        assert_eq!(blob.checked_size().unwrap(), 2);
        assert_eq!(blob, &b"ab"[..]);
    }

    #[test]
    fn append_both_variants() {
        let mut blob = Blob::from_bytes(b"a");
        blob.append(b"b").unwrap();
        assert_eq!(blob, &b"ab"[..]);

        blob.convert_to_file().unwrap();
        assert!(blob.is_on_disk());
        assert_eq!(blob, &b"ab"[..]);

        blob.append(b"c").unwrap();
        assert_eq!(blob, &b"abc"[..]);
        assert_eq!(blob.size(), 3);
    }

    #[test]
    fn truncate_both_variants() {
        let mut blob = Blob::from_bytes(b"abc");
        assert_eq!(blob.size(), 3);
        blob.truncate(b"hello").unwrap();
        assert_eq!(blob.size(), 5);
        assert_eq!(blob, &b"hello"[..]);

        blob.convert_to_file().unwrap();
        blob.truncate(b"hi").unwrap();
        assert_eq!(blob.size(), 2);
        assert_eq!(blob, &b"hi"[..]);
    }

    #[test]
    fn convert_is_idempotent() {
        let mut blob = Blob::from_bytes(b"a");
        blob.convert_to_file().unwrap();
        assert!(blob.is_on_disk());
        let path = match &blob {
            Blob::OnDisk(file) => file.path().to_path_buf(),
            _ => unreachable!(),
        };

        blob.convert_to_file().unwrap();
        match &blob {
            Blob::OnDisk(file) => assert_eq!(file.path(), path),
            _ => panic!("blob reverted to memory"),
        }
    }

    #[test]
    fn temp_file_removed_on_drop() {
        let path = {
            let mut blob = Blob::from_bytes(b"gone");
            blob.convert_to_file().unwrap();
            match &blob {
                Blob::OnDisk(file) => file.path().to_path_buf(),
                _ => unreachable!(),
            }
        };
        assert!(!path.exists());
    }

    #[test]
    fn write_to_buffer() {
        let mut blob = Blob::from_bytes(b"payload");
        let mut dst = BytesMut::new();
        blob.write_to(&mut dst).unwrap();
        assert_eq!(&dst[..], b"payload");

        blob.convert_to_file().unwrap();
        let mut dst = BytesMut::new();
        blob.write_to(&mut dst).unwrap();
        assert_eq!(&dst[..], b"payload");
    }
}
