use std::io::Write;
use std::marker::PhantomData;
use std::path::Path;

use eyre::{ensure, Result};
use itertools::Itertools;

use crate::compression::{self, CompressedStream};
use crate::WriteRecord;

/// Missing value marker used across all tabular outputs.
pub const NA: &str = "NA";

/// Records that can be written as a single TSV row.
pub trait TsvRecord {
    fn fields(&self) -> Vec<String>;
}

impl TsvRecord for Vec<String> {
    fn fields(&self) -> Vec<String> {
        self.clone()
    }
}

/// Fixed-precision float formatting shared by every table.
pub fn float(value: f64) -> String {
    format!("{value:.6}")
}

/// Format an optional value, missing values become [`NA`].
pub fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|x| x.to_string()).unwrap_or_else(|| NA.to_string())
}

pub fn optional_float(value: Option<f64>) -> String {
    value.map(float).unwrap_or_else(|| NA.to_string())
}

/// TSV writer with a header row. Every record must have as many fields as the header.
pub struct Writer<W, R> {
    writer: W,
    columns: usize,
    _phantom: PhantomData<R>,
}

impl<W: Write, R> Writer<W, R> {
    pub fn new(mut writer: W, header: &[impl AsRef<str>]) -> Result<Self> {
        ensure!(!header.is_empty(), "TSV header must not be empty");
        writeln!(writer, "{}", header.iter().map(|x| x.as_ref()).join("\t"))?;
        Ok(Self {
            writer,
            columns: header.len(),
            _phantom: PhantomData,
        })
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<R: TsvRecord> Writer<CompressedStream, R> {
    /// Create a new TSV file. The compression is inferred from the file extension.
    pub fn from_path(path: impl AsRef<Path>, header: &[impl AsRef<str>]) -> Result<Self> {
        let stream = compression::create_file(path)?;
        Writer::new(stream, header)
    }

    /// Flush all pending rows and close the file.
    pub fn finish(self) -> Result<()> {
        self.writer.finish()
    }
}

impl<W: Write, R: TsvRecord> WriteRecord for Writer<W, R> {
    type Record = R;

    fn write_record(&mut self, record: &Self::Record) -> Result<()> {
        let fields = record.fields();
        ensure!(
            fields.len() == self.columns,
            "TSV record has {} fields, expected {}: {}",
            fields.len(),
            self.columns,
            fields.join("\t")
        );
        writeln!(self.writer, "{}", fields.join("\t"))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
