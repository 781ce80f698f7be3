// src/compression/mod.rs

//! Compression layer for package archives
//!
//! A .kpkg file is a tar stream optionally wrapped in xz or gzip. Detection
//! probes in a fixed order (xz, then gzip, then raw) by inspecting magic
//! bytes, so the same code path opens all three encodings.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

/// Supported archive compression formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionFormat {
    /// No outer layer (raw tar)
    #[default]
    None,
    /// Gzip (.gz)
    Gzip,
    /// XZ/LZMA (.xz)
    Xz,
}

impl CompressionFormat {
    /// Detect the compression format from magic bytes
    ///
    /// Probes xz first, then gzip; anything else is treated as raw tar.
    ///
    /// Magic bytes:
    /// - XZ: `fd 37 7a 58 5a 00` (FD + "7zXZ" + NUL)
    /// - Gzip: `1f 8b`
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.len() >= 6
            && data[0] == 0xfd
            && data[1] == 0x37
            && data[2] == 0x7a
            && data[3] == 0x58
            && data[4] == 0x5a
            && data[5] == 0x00
        {
            Self::Xz
        } else if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
            Self::Gzip
        } else {
            Self::None
        }
    }

    /// Parse a format name as given on the command line
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "gzip" | "gz" => Ok(Self::Gzip),
            "xz" => Ok(Self::Xz),
            other => Err(Error::InitError(format!(
                "unsupported compression format {:?}",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
        }
    }
}

impl fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Detect the format of a seekable stream, resetting the cursor afterwards
pub fn detect_format<R: Read + Seek>(reader: &mut R) -> Result<CompressionFormat> {
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| Error::IoError(format!("Failed to seek to stream start: {e}")))?;

    let mut magic = [0u8; 6];
    let mut filled = 0;
    while filled < magic.len() {
        let n = reader
            .read(&mut magic[filled..])
            .map_err(|e| Error::IoError(format!("Failed to read magic bytes: {e}")))?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| Error::IoError(format!("Failed to rewind stream: {e}")))?;

    Ok(CompressionFormat::from_magic_bytes(&magic[..filled]))
}

/// Wrap a reader in the decoder for the given format
pub fn create_decoder<'a, R: Read + 'a>(reader: R, format: CompressionFormat) -> Box<dyn Read + 'a> {
    match format {
        CompressionFormat::None => Box::new(reader),
        CompressionFormat::Gzip => Box::new(GzDecoder::new(reader)),
        CompressionFormat::Xz => Box::new(XzDecoder::new(reader)),
    }
}

/// Writer that applies the chosen compression and can be finalized
///
/// Both gzip and xz need an explicit finish to flush their trailers, so the
/// encoder is an enum rather than a boxed `Write`.
pub enum Compressor<W: Write> {
    None(W),
    Gzip(GzEncoder<W>),
    Xz(XzEncoder<W>),
}

impl<W: Write> Compressor<W> {
    pub fn new(writer: W, format: CompressionFormat) -> Self {
        match format {
            CompressionFormat::None => Self::None(writer),
            CompressionFormat::Gzip => Self::Gzip(GzEncoder::new(writer, flate2::Compression::default())),
            CompressionFormat::Xz => Self::Xz(XzEncoder::new(writer, 6)),
        }
    }

    /// Flush any trailer bytes and return the inner writer
    pub fn finish(self) -> Result<W> {
        match self {
            Self::None(w) => Ok(w),
            Self::Gzip(enc) => enc
                .finish()
                .map_err(|e| Error::IoError(format!("Failed to finish gzip stream: {e}"))),
            Self::Xz(enc) => enc
                .finish()
                .map_err(|e| Error::IoError(format!("Failed to finish xz stream: {e}"))),
        }
    }
}

impl<W: Write> Write for Compressor<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::None(w) => w.write(buf),
            Self::Gzip(enc) => enc.write(buf),
            Self::Xz(enc) => enc.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::None(w) => w.flush(),
            Self::Gzip(enc) => enc.flush(),
            Self::Xz(enc) => enc.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x1f, 0x8b, 0x08, 0x00]),
            CompressionFormat::Gzip
        );
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]),
            CompressionFormat::Xz
        );
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x00, 0x00, 0x00, 0x00]),
            CompressionFormat::None
        );
        // Too short for any magic
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x1f]),
            CompressionFormat::None
        );
    }

    #[test]
    fn test_parse_format_names() {
        assert_eq!(CompressionFormat::parse("gzip").unwrap(), CompressionFormat::Gzip);
        assert_eq!(CompressionFormat::parse("gz").unwrap(), CompressionFormat::Gzip);
        assert_eq!(CompressionFormat::parse("xz").unwrap(), CompressionFormat::Xz);
        assert_eq!(CompressionFormat::parse("none").unwrap(), CompressionFormat::None);
        assert!(CompressionFormat::parse("zstd").is_err());
    }

    #[test]
    fn test_round_trip_all_formats() {
        let payload = b"some archive payload, long enough to be worth compressing";

        for format in [
            CompressionFormat::None,
            CompressionFormat::Gzip,
            CompressionFormat::Xz,
        ] {
            let mut encoder = Compressor::new(Vec::new(), format);
            encoder.write_all(payload).unwrap();
            let encoded = encoder.finish().unwrap();

            let mut cursor = Cursor::new(encoded);
            let detected = detect_format(&mut cursor).unwrap();
            assert_eq!(detected, format, "detection mismatch for {}", format);

            let mut decoder = create_decoder(cursor, detected);
            let mut decoded = Vec::new();
            decoder.read_to_end(&mut decoded).unwrap();
            assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn test_detect_resets_cursor() {
        let mut cursor = Cursor::new(vec![0x1f, 0x8b, 0x08, 0x00, 0x01, 0x02, 0x03]);
        detect_format(&mut cursor).unwrap();
        assert_eq!(cursor.position(), 0);
    }
}
