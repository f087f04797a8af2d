//! Compression formats for index files and package archive members.

use crate::{AptRepositoryError, Result};
use std::io::{Read, Write};
use std::path::Path;

/// Compression formats seen on index files and `.deb` members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    None,
    Gzip,
    /// Written at level 9.
    Bzip2,
    Xz,
    Lzma,
    Zstd,
    /// Recognized by name only; there is no codec for it.
    Lzip,
}

impl Compression {
    /// Get the file extension for this compression format, including the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => ".gz",
            Compression::Bzip2 => ".bz2",
            Compression::Xz => ".xz",
            Compression::Lzma => ".lzma",
            Compression::Zstd => ".zst",
            Compression::Lzip => ".lz",
        }
    }

    /// Pick the format from a file name's extension; anything unrecognized is uncompressed.
    pub fn from_filename<P: AsRef<Path>>(path: P) -> Self {
        let extension = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match extension {
            "gz" => Compression::Gzip,
            "bz2" => Compression::Bzip2,
            "xz" => Compression::Xz,
            "lzma" => Compression::Lzma,
            "zst" => Compression::Zstd,
            "lz" => Compression::Lzip,
            _ => Compression::None,
        }
    }

    fn unsupported(&self) -> AptRepositoryError {
        AptRepositoryError::Compression(format!("{} is not supported", self))
    }

    /// Wrap `reader` in a decompressor.
    pub fn reader<'a, R: Read + 'a>(self, reader: R) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Compression::None => Box::new(reader),
            Compression::Gzip => Box::new(flate2::read::GzDecoder::new(reader)),
            Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(reader)),
            Compression::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
            Compression::Lzma => {
                let stream = xz2::stream::Stream::new_lzma_decoder(u64::MAX)
                    .map_err(|e| AptRepositoryError::Compression(e.to_string()))?;
                Box::new(xz2::read::XzDecoder::new_stream(reader, stream))
            }
            Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(reader)?),
            Compression::Lzip => return Err(self.unsupported()),
        })
    }

    /// Compress data using this compression format.
    ///
    /// Output is deterministic: the gzip header carries no timestamp or file name.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut compressed = Vec::new();
        match self {
            Compression::None => compressed.extend_from_slice(data),
            Compression::Gzip => {
                let mut encoder = flate2::GzBuilder::new()
                    .mtime(0)
                    .write(&mut compressed, flate2::Compression::default());
                encoder.write_all(data)?;
                encoder.finish()?;
            }
            Compression::Bzip2 => {
                let mut encoder =
                    bzip2::write::BzEncoder::new(&mut compressed, bzip2::Compression::best());
                encoder.write_all(data)?;
                encoder.finish()?;
            }
            Compression::Xz => {
                let mut encoder = xz2::write::XzEncoder::new(&mut compressed, 6);
                encoder.write_all(data)?;
                encoder.finish()?;
            }
            Compression::Lzma => {
                let options = xz2::stream::LzmaOptions::new_preset(6)
                    .map_err(|e| AptRepositoryError::Compression(e.to_string()))?;
                let stream = xz2::stream::Stream::new_lzma_encoder(&options)
                    .map_err(|e| AptRepositoryError::Compression(e.to_string()))?;
                let mut encoder = xz2::write::XzEncoder::new_stream(&mut compressed, stream);
                encoder.write_all(data)?;
                encoder.finish()?;
            }
            Compression::Zstd => {
                compressed = zstd::stream::encode_all(data, 0)?;
            }
            Compression::Lzip => return Err(self.unsupported()),
        }
        Ok(compressed)
    }

    /// Decompress data using this compression format.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decompressed = Vec::new();
        self.reader(data)?
            .read_to_end(&mut decompressed)
            .map_err(|e| AptRepositoryError::Compression(format!("{}: {}", self, e)))?;
        Ok(decompressed)
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Bzip2 => "bzip2",
            Compression::Xz => "xz",
            Compression::Lzma => "lzma",
            Compression::Zstd => "zstd",
            Compression::Lzip => "lzip",
        })
    }
}

/// Write `data` to `path` with this format's extension appended, returning the written path.
pub fn write_compressed<P: AsRef<Path>>(
    path: P,
    compression: Compression,
    data: &[u8],
) -> Result<std::path::PathBuf> {
    let mut target = path.as_ref().as_os_str().to_owned();
    target.push(compression.extension());
    let target = std::path::PathBuf::from(target);
    std::fs::write(&target, compression.compress(data)?)?;
    Ok(target)
}

/// Read a possibly compressed file, choosing the codec from its extension.
pub fn read_decompressed<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let compression = Compression::from_filename(path);
    let data = std::fs::read(path)?;
    compression.decompress(&data)
}
