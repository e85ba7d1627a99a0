//! Compression codecs
//!
//! Inputs are decompressed according to their file extension. Outputs are
//! compressed with the codec class named in the job configuration, and the
//! codec's extension is appended to the file name.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::{MultiGzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};

/// A Hadoop compression codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionCodec {
    /// zlib stream, `.deflate`
    Deflate,
    /// `.gz`
    Gzip,
    /// `.bz2`
    BZip2,
}

impl CompressionCodec {
    pub const DEFAULT_CODEC_CLASS: &'static str = "org.apache.hadoop.io.compress.DefaultCodec";

    /// Codec for a file, chosen by its extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "gz" => Some(CompressionCodec::Gzip),
            "bz2" => Some(CompressionCodec::BZip2),
            "deflate" => Some(CompressionCodec::Deflate),
            _ => None,
        }
    }

    /// Codec for a Hadoop codec class name
    pub fn from_class_name(name: &str) -> Option<Self> {
        let simple = name.trim().rsplit('.').next().unwrap_or(name);
        match simple {
            "DefaultCodec" | "DeflateCodec" => Some(CompressionCodec::Deflate),
            "GzipCodec" => Some(CompressionCodec::Gzip),
            "BZip2Codec" => Some(CompressionCodec::BZip2),
            _ => None,
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            CompressionCodec::Deflate => Self::DEFAULT_CODEC_CLASS,
            CompressionCodec::Gzip => "org.apache.hadoop.io.compress.GzipCodec",
            CompressionCodec::BZip2 => "org.apache.hadoop.io.compress.BZip2Codec",
        }
    }

    /// File extension including the dot
    pub fn extension(&self) -> &'static str {
        match self {
            CompressionCodec::Deflate => ".deflate",
            CompressionCodec::Gzip => ".gz",
            CompressionCodec::BZip2 => ".bz2",
        }
    }

    /// Wrap `reader` in this codec's decoder. Concatenated gzip and bzip2
    /// members are read as one stream.
    pub fn decoder<'a, R: Read + 'a>(&self, reader: R) -> Box<dyn Read + 'a> {
        match self {
            CompressionCodec::Deflate => Box::new(ZlibDecoder::new(reader)),
            CompressionCodec::Gzip => Box::new(MultiGzDecoder::new(reader)),
            CompressionCodec::BZip2 => Box::new(MultiBzDecoder::new(reader)),
        }
    }

    /// Compress `data` into `writer`
    pub fn compress<W: Write>(&self, data: &[u8], writer: W) -> io::Result<W> {
        match self {
            CompressionCodec::Deflate => {
                let mut encoder = ZlibEncoder::new(writer, flate2::Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            CompressionCodec::Gzip => {
                let mut encoder = GzEncoder::new(writer, flate2::Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            CompressionCodec::BZip2 => {
                let mut encoder = BzEncoder::new(writer, bzip2::Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
        }
    }
}

/// Read a whole file, decompressing it when its extension names a codec
pub fn read_input(path: &Path) -> io::Result<Vec<u8>> {
    let file = BufReader::new(File::open(path)?);
    let mut reader: Box<dyn Read> = match CompressionCodec::from_path(path) {
        Some(codec) => {
            log::debug!("decompressing {} with {:?}", path.display(), codec);
            codec.decoder(file)
        }
        None => Box::new(file),
    };
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_codec_by_extension() {
        assert_eq!(
            CompressionCodec::from_path(&PathBuf::from("a/b.xlsx.gz")),
            Some(CompressionCodec::Gzip)
        );
        assert_eq!(
            CompressionCodec::from_path(&PathBuf::from("b.xls.BZ2")),
            Some(CompressionCodec::BZip2)
        );
        assert_eq!(CompressionCodec::from_path(&PathBuf::from("b.xlsx")), None);
    }

    #[test]
    fn test_codec_by_class_name() {
        assert_eq!(
            CompressionCodec::from_class_name("org.apache.hadoop.io.compress.GzipCodec"),
            Some(CompressionCodec::Gzip)
        );
        assert_eq!(
            CompressionCodec::from_class_name(CompressionCodec::DEFAULT_CODEC_CLASS),
            Some(CompressionCodec::Deflate)
        );
        assert_eq!(CompressionCodec::from_class_name("org.example.SnappyCodec"), None);
    }

    #[test]
    fn test_compress_and_decode() {
        let data = b"row1\nrow2\nrow3".repeat(50);
        for codec in [
            CompressionCodec::Deflate,
            CompressionCodec::Gzip,
            CompressionCodec::BZip2,
        ] {
            let compressed = codec.compress(&data, Vec::new()).unwrap();
            let mut decoded = Vec::new();
            codec
                .decoder(compressed.as_slice())
                .read_to_end(&mut decoded)
                .unwrap();
            assert_eq!(decoded, data, "{codec:?}");
        }
    }

    #[test]
    fn test_concatenated_gzip_members() {
        let mut data = CompressionCodec::Gzip.compress(b"first ", Vec::new()).unwrap();
        data.extend(CompressionCodec::Gzip.compress(b"second", Vec::new()).unwrap());
        let mut decoded = String::new();
        CompressionCodec::Gzip
            .decoder(data.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "first second");
    }
}
