use eyre::Result;
use impl_tools::autoimpl;

/// A trait for writing structured records. Modeled after the `Write` trait in the std.
#[autoimpl(for<T: trait + ?Sized> &mut T, Box<T>)]
pub trait WriteRecord {
    type Record;

    /// Write a single record.
    fn write_record(&mut self, record: &Self::Record) -> Result<()>;

    /// Write a slice of records, stopping at the first error.
    fn write_records(&mut self, records: &[Self::Record]) -> Result<()> {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }

    /// Flush the output.
    fn flush(&mut self) -> Result<()>;
}
