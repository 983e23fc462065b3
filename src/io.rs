use crate::errors::{CsvFlowError, CsvFlowResult, Position};
use clap::ValueEnum;
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::Path;
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Sniff the gzip magic bytes.
    #[default]
    Auto,
    Gzip,
    None,
}

/// Pull-based cursor over decompressed bytes.
///
/// Owns the underlying handle; dropping the stream closes it. The position
/// only moves forward.
pub struct ByteStream {
    inner: Box<dyn Read + Send>,
    position: u64,
    compressed_len: Option<u64>,
    gzip: bool,
}

impl ByteStream {
    pub fn open<P: AsRef<Path>>(path: P, compression: Compression) -> CsvFlowResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CsvFlowError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let compressed_len = file.metadata().ok().map(|m| m.len());
        let mut stream = Self::from_reader(Box::new(file), compression)?;
        stream.compressed_len = compressed_len;
        debug!(
            "Opened {:?} (gzip: {}, size: {:?})",
            path, stream.gzip, compressed_len
        );
        Ok(stream)
    }

    pub fn from_reader(
        mut reader: Box<dyn Read + Send>,
        compression: Compression,
    ) -> CsvFlowResult<Self> {
        let gzip = match compression {
            Compression::Gzip => true,
            Compression::None => false,
            Compression::Auto => {
                let mut magic = [0u8; 2];
                let n = read_prefix(&mut reader, &mut magic)?;
                let prefix = Cursor::new(magic[..n].to_vec());
                reader = Box::new(prefix.chain(reader));
                n == GZIP_MAGIC.len() && magic == GZIP_MAGIC
            }
        };

        let inner: Box<dyn Read + Send> = if gzip {
            Box::new(MultiGzDecoder::new(reader))
        } else {
            reader
        };

        Ok(Self {
            inner,
            position: 0,
            compressed_len: None,
            gzip,
        })
    }

    /// Decompressed bytes delivered so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Size of the source file, when opened from a path.
    pub fn compressed_len(&self) -> Option<u64> {
        self.compressed_len
    }

    pub fn is_gzip(&self) -> bool {
        self.gzip
    }
}

impl Read for ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

fn read_prefix(reader: &mut dyn Read, buf: &mut [u8]) -> CsvFlowResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(CsvFlowError::Io {
                    position: Position::default(),
                    source,
                })
            }
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    fn read_all(stream: &mut ByteStream) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        stream.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_auto_detects_gzip() {
        let data = gzip(b"a,b\n1,2\n");
        let mut stream = ByteStream::from_reader(Box::new(Cursor::new(data)), Compression::Auto)
            .unwrap();
        assert!(stream.is_gzip());
        assert_eq!(read_all(&mut stream).unwrap(), b"a,b\n1,2\n");
        assert_eq!(stream.position(), 8);
    }

    #[test]
    fn test_auto_passes_plain_text_through() {
        let mut stream =
            ByteStream::from_reader(Box::new(Cursor::new(b"x\n".to_vec())), Compression::Auto)
                .unwrap();
        assert!(!stream.is_gzip());
        assert_eq!(read_all(&mut stream).unwrap(), b"x\n");
    }

    #[test]
    fn test_concatenated_members_decode_fully() {
        let mut data = gzip(b"a\n1\n");
        data.extend(gzip(b"2\n"));
        let mut stream =
            ByteStream::from_reader(Box::new(Cursor::new(data)), Compression::Gzip).unwrap();
        assert_eq!(read_all(&mut stream).unwrap(), b"a\n1\n2\n");
    }

    #[test]
    fn test_corrupt_gzip_is_an_error() {
        let mut data = gzip(b"a,b\n1,2\n3,4\n");
        let mid = data.len() / 2;
        data.truncate(mid);
        let mut stream =
            ByteStream::from_reader(Box::new(Cursor::new(data)), Compression::Auto).unwrap();
        assert!(read_all(&mut stream).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = ByteStream::open("/definitely/not/here.csv.gz", Compression::Auto)
            .err()
            .unwrap();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Io);
    }
}
