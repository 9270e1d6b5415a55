use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use eyre::{ensure, Result, WrapErr};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

pub enum DecompressedStream {
    PlainText(File),
    Gzip(MultiGzDecoder<File>),
}

impl DecompressedStream {
    pub fn box_bufread(self) -> Box<dyn BufRead + Send + Sync + 'static> {
        match self {
            DecompressedStream::PlainText(file) => Box::new(BufReader::new(file)),
            DecompressedStream::Gzip(decoder) => Box::new(BufReader::new(decoder)),
        }
    }
}

pub fn read_file(path: impl AsRef<Path>) -> Result<DecompressedStream> {
    let path = path.as_ref();
    ensure!(path.exists(), "File {} does not exist", path.display());

    let kind = match infer::get_from_path(path)? {
        Some(kind) => kind,
        None => return Ok(DecompressedStream::PlainText(File::open(path)?)),
    };

    let stream = match (kind.extension(), kind.mime_type()) {
        ("gz", "application/gzip") => DecompressedStream::Gzip(MultiGzDecoder::new(File::open(path)?)),
        // Always assume plain text if there is no clear match
        _ => DecompressedStream::PlainText(File::open(path)?),
    };
    Ok(stream)
}

pub enum CompressedStream {
    PlainText(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl CompressedStream {
    /// Flush and close the stream, writing the gzip trailer if needed.
    pub fn finish(self) -> Result<()> {
        match self {
            CompressedStream::PlainText(mut file) => file.flush()?,
            CompressedStream::Gzip(encoder) => encoder.finish()?.flush()?,
        };
        Ok(())
    }
}

impl Write for CompressedStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            CompressedStream::PlainText(x) => x.write(buf),
            CompressedStream::Gzip(x) => x.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            CompressedStream::PlainText(x) => x.flush(),
            CompressedStream::Gzip(x) => x.flush(),
        }
    }
}

/// Create a file for writing. The compression is inferred from the extension: `.gz` files are
/// gzip-compressed, everything else is plain text.
pub fn create_file(path: impl AsRef<Path>) -> Result<CompressedStream> {
    let path = path.as_ref();
    let file = File::create(path).wrap_err_with(|| format!("Failed to create {}", path.display()))?;
    let file = BufWriter::new(file);

    let stream = match path.extension().and_then(|x| x.to_str()) {
        Some("gz") => CompressedStream::Gzip(GzEncoder::new(file, flate2::Compression::default())),
        _ => CompressedStream::PlainText(file),
    };
    Ok(stream)
}
