use tiledb_common::Result;

/// The codec applied to a `.tdt`/`.bkp` file's bytes before they hit the
/// `Vfs` (§6 "Output files may be gzip-wrapped when the consumer's format
/// string ends in `.gz`; the reader sniffs the suffix").
pub trait Compressor {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>>;
    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>>;
    fn suffix(&self) -> &str;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoneCompressor;

impl Compressor for NoneCompressor {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn suffix(&self) -> &str {
        ""
    }
}

/// Picks the right compressor for a file name by sniffing its suffix
/// (§6), falling back to no compression.
pub fn compressor_for(name: &str, gzip_suffix: &str) -> Box<dyn Compressor> {
    if name.ends_with(gzip_suffix) {
        Box::new(gzip::GzipCompressor)
    } else {
        Box::new(NoneCompressor)
    }
}

#[cfg(feature = "gzip")]
mod gzip {
    use std::io::{Read, Write};

    use flate2::read::GzDecoder;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    use tiledb_common::Result;

    use super::Compressor;
    use crate::error::StorageError;

    #[derive(Clone, Copy, Debug, Default)]
    pub struct GzipCompressor;

    impl Compressor for GzipCompressor {
        fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(bytes).map_err(StorageError::Io)?;
            encoder.finish().map_err(|e| StorageError::Io(e).into())
        }

        fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
            let mut decoder = GzDecoder::new(bytes);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(StorageError::Io)?;
            Ok(out)
        }

        fn suffix(&self) -> &str {
            ".gz"
        }
    }
}

#[cfg(not(feature = "gzip"))]
mod gzip {
    use tiledb_common::Result;

    use super::Compressor;
    use crate::error::StorageError;

    #[derive(Clone, Copy, Debug, Default)]
    pub struct GzipCompressor;

    impl Compressor for GzipCompressor {
        fn compress(&self, _bytes: &[u8]) -> Result<Vec<u8>> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "gzip support was not compiled in",
            ))
            .into())
        }

        fn decompress(&self, _bytes: &[u8]) -> Result<Vec<u8>> {
            self.compress(_bytes)
        }

        fn suffix(&self) -> &str {
            ".gz"
        }
    }
}

pub use gzip::GzipCompressor;
