//! Optional zlib wrap/unwrap for the legacy opaque-blob column.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::ContainerError;
use crate::format::CompressionFormat;

/// Compress `data` according to `format`, returning `data` unchanged for
/// [`CompressionFormat::None`].
pub fn compress(format: CompressionFormat, data: &[u8]) -> Result<Vec<u8>, ContainerError> {
    match format {
        CompressionFormat::None => Ok(data.to_vec()),
        CompressionFormat::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(data)
                .map_err(|e| ContainerError::SerializationError(e.to_string()))?;
            encoder
                .finish()
                .map_err(|e| ContainerError::SerializationError(e.to_string()))
        }
    }
}

/// Reverse of [`compress`].
pub fn decompress(format: CompressionFormat, data: &[u8]) -> Result<Vec<u8>, ContainerError> {
    match format {
        CompressionFormat::None => Ok(data.to_vec()),
        CompressionFormat::Zlib => {
            let mut decoder = ZlibDecoder::new(data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| ContainerError::SerializationError(e.to_string()))?;
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_identity() {
        let data = b"hello world";
        let compressed = compress(CompressionFormat::None, data).unwrap();
        assert_eq!(compressed, data);
        let restored = decompress(CompressionFormat::None, &compressed).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn zlib_round_trips() {
        let data = b"{\"timestamp_desc\":\"mtime\",\"path\":\"/a/b/c\"}".repeat(4);
        let compressed = compress(CompressionFormat::Zlib, &data).unwrap();
        assert_ne!(compressed, data);
        let restored = decompress(CompressionFormat::Zlib, &compressed).unwrap();
        assert_eq!(restored, data);
    }
}
