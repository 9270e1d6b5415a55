use std::fs::File;
use std::io::Read;
use std::path::Path;

use eyre::{eyre, OptionExt, Result, WrapErr};
use metabit_core_rs::loc::Strand;
use metabit_core_rs::record::{AlignmentRecord, Segment};
use noodles::bam;
use noodles::sam::alignment::record::data::field::{Tag, Value};

use super::projection::project;

/// Sequential BAM reader yielding [`AlignmentRecord`]s.
///
/// Unmapped, secondary and supplementary alignments are skipped. Records that can't be converted
/// (e.g. a CIGAR inconsistent with the sequence or a bad NM tag) are counted as malformed and
/// skipped as well, only I/O failures end the iteration. Target names are taken from the BAM header
/// and resolved against the reference index downstream.
pub struct Reader<R> {
    inner: bam::io::Reader<R>,
    targets: Vec<String>,
    buffer: bam::Record,
    skipped: u64,
    malformed: u64,
}

impl Reader<()> {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Reader<impl Read>> {
        let path = path.as_ref();
        let file = File::open(path).wrap_err_with(|| format!("Failed to open BAM file {}", path.display()))?;
        let mut inner = bam::io::Reader::new(file);
        let header = inner
            .read_header()
            .wrap_err_with(|| format!("Failed to read BAM header from {}", path.display()))?;
        let targets = header
            .reference_sequences()
            .keys()
            .map(|name| name.to_string())
            .collect();

        Ok(Reader {
            inner,
            targets,
            buffer: bam::Record::default(),
            skipped: 0,
            malformed: 0,
        })
    }
}

impl<R: Read> Reader<R> {
    /// Number of unmapped, secondary or supplementary records skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Number of records dropped because they couldn't be converted.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    fn next_record(&mut self) -> Result<Option<AlignmentRecord>> {
        loop {
            if self.inner.read_record(&mut self.buffer)? == 0 {
                log::info!(
                    "BAM reading finished: {} records skipped, {} malformed",
                    self.skipped,
                    self.malformed
                );
                return Ok(None);
            }

            let flags = self.buffer.flags();
            if flags.is_unmapped() || flags.is_secondary() || flags.is_supplementary() {
                self.skipped += 1;
                continue;
            }
            match convert(&self.buffer, &self.targets) {
                Ok(record) => return Ok(Some(record)),
                Err(err) => {
                    log::warn!("Skipping malformed BAM record: {err:#}");
                    self.malformed += 1;
                }
            }
        }
    }
}

impl<R: Read> Iterator for Reader<R> {
    type Item = Result<AlignmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

fn convert(record: &bam::Record, targets: &[String]) -> Result<AlignmentRecord> {
    let read = record
        .name()
        .map(|x| x.to_string())
        .ok_or_eyre("BAM record without a read name")?;
    let wrap = || format!("Failed to convert BAM record {read}");

    let target = record
        .reference_sequence_id()
        .transpose()?
        .ok_or_eyre("Mapped BAM record without a reference sequence")
        .wrap_err_with(wrap)?;
    let target = targets
        .get(target)
        .ok_or_else(|| eyre!("Reference sequence {target} is missing from the BAM header"))?
        .clone();

    let start = record
        .alignment_start()
        .transpose()?
        .ok_or_eyre("Mapped BAM record without an alignment start")
        .wrap_err_with(wrap)?;
    let start = u32::try_from(usize::from(start) - 1).wrap_err_with(wrap)?;

    let flags = record.flags();
    let strand = match flags.is_reverse_complemented() {
        true => Strand::Reverse,
        false => Strand::Forward,
    };
    let segment = if !flags.is_segmented() {
        Segment::Single
    } else if flags.is_first_segment() {
        Segment::First
    } else if flags.is_last_segment() {
        Segment::Last
    } else {
        Segment::Single
    };
    let mapq = record.mapping_quality().map(|x| x.get()).unwrap_or(u8::MAX);
    let edit_distance = edit_distance(record).wrap_err_with(wrap)?;

    let ops = record
        .cigar()
        .iter()
        .map(|op| op.map(|op| (op.kind(), op.len())))
        .collect::<std::io::Result<Vec<_>>>()?;
    let sequence: Vec<u8> = record.sequence().iter().collect();
    let (bases, qualities) = project(ops, &sequence, record.quality_scores().as_ref()).wrap_err_with(wrap)?;

    Ok(AlignmentRecord::new(
        read,
        target,
        start,
        strand,
        mapq,
        edit_distance,
        bases,
        qualities,
    )
    .with_segment(segment))
}

/// Edit distance from the NM tag, records without it are treated as perfect matches.
fn edit_distance(record: &bam::Record) -> Result<u32> {
    let data = record.data();
    let value = match data.get(&Tag::EDIT_DISTANCE) {
        None => return Ok(0),
        Some(value) => value?,
    };
    let value: i64 = match value {
        Value::Int8(x) => x as i64,
        Value::UInt8(x) => x as i64,
        Value::Int16(x) => x as i64,
        Value::UInt16(x) => x as i64,
        Value::Int32(x) => x as i64,
        Value::UInt32(x) => x as i64,
        _ => return Err(eyre!("NM tag must be an integer")),
    };
    u32::try_from(value).map_err(|_| eyre!("NM tag must be non-negative, got {value}"))
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use noodles::core::Position;
    use noodles::sam::alignment::io::Write as _;
    use noodles::sam::alignment::record::cigar::op::{Kind, Op};
    use noodles::sam::alignment::record::{Flags, MappingQuality};
    use noodles::sam::alignment::record_buf::data::field::Value as BufValue;
    use noodles::sam::alignment::record_buf::{Cigar, QualityScores, Sequence};
    use noodles::sam::alignment::RecordBuf;
    use noodles::sam::header::record::value::map::ReferenceSequence;
    use noodles::sam::header::record::value::Map;
    use noodles::sam::{self, Header};

    use super::*;

    fn header() -> Header {
        let length = NonZeroUsize::new(1000).unwrap();
        sam::Header::builder()
            .add_reference_sequence("c1", Map::<ReferenceSequence>::new(length))
            .add_reference_sequence("c2", Map::<ReferenceSequence>::new(length))
            .build()
    }

    fn record(name: &str, flags: Flags, target: usize, start: usize, nm: Option<BufValue>) -> RecordBuf {
        let mut builder = RecordBuf::builder()
            .set_name(name)
            .set_flags(flags)
            .set_reference_sequence_id(target)
            .set_alignment_start(Position::new(start).unwrap())
            .set_mapping_quality(MappingQuality::new(30).unwrap())
            .set_cigar(Cigar::from(vec![Op::new(Kind::Match, 2), Op::new(Kind::Deletion, 1), Op::new(Kind::Match, 2)]))
            .set_sequence(Sequence::from(b"ACGT".to_vec()))
            .set_quality_scores(QualityScores::from(vec![10, 20, 30, 40]));
        if let Some(nm) = nm {
            builder = builder.set_data([(Tag::EDIT_DISTANCE, nm)].into_iter().collect());
        }
        builder.build()
    }

    #[test]
    fn test_read_bam() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sample.bam");

        let header = header();
        {
            let mut writer = bam::io::Writer::new(File::create(&path)?);
            writer.write_header(&header)?;
            let records = [
                record("plain", Flags::empty(), 0, 11, Some(BufValue::UInt8(2))),
                record("unmapped", Flags::UNMAPPED, 0, 11, None),
                record("secondary", Flags::SECONDARY, 0, 11, None),
                record("supplementary", Flags::SUPPLEMENTARY, 0, 11, None),
                record("negative", Flags::empty(), 0, 11, Some(BufValue::Int8(-1))),
                record("text", Flags::empty(), 0, 11, Some(BufValue::Character(b'x'))),
                record(
                    "pair",
                    Flags::SEGMENTED | Flags::FIRST_SEGMENT | Flags::REVERSE_COMPLEMENTED,
                    1,
                    1,
                    None,
                ),
                record("pair", Flags::SEGMENTED | Flags::LAST_SEGMENT, 1, 300, Some(BufValue::Int32(1))),
            ];
            for record in &records {
                writer.write_alignment_record(&header, record)?;
            }
            writer.try_finish()?;
        }

        let mut reader = Reader::from_path(&path)?;
        let records = reader.by_ref().collect::<Result<Vec<_>>>()?;
        assert_eq!(reader.skipped(), 3);
        assert_eq!(reader.malformed(), 2);
        assert_eq!(records.len(), 3);

        let plain = &records[0];
        assert_eq!(plain.read(), "plain");
        assert_eq!(plain.target(), "c1");
        assert_eq!(*plain.start(), 10);
        assert_eq!(*plain.strand(), Strand::Forward);
        assert_eq!(*plain.mapq(), 30);
        assert_eq!(*plain.edit_distance(), 2);
        assert_eq!(plain.bases(), b"AC-GT");
        assert_eq!(plain.qualities(), &vec![10, 20, u8::MAX, 30, 40]);
        assert_eq!(*plain.segment(), Segment::Single);

        let (first, last) = (&records[1], &records[2]);
        assert_eq!(first.target(), "c2");
        assert_eq!(*first.start(), 0);
        assert_eq!(*first.strand(), Strand::Reverse);
        assert_eq!(*first.edit_distance(), 0);
        assert_eq!(*first.segment(), Segment::First);
        assert_eq!(*last.start(), 299);
        assert_eq!(*last.edit_distance(), 1);
        assert_eq!(*last.segment(), Segment::Last);
        Ok(())
    }
}
