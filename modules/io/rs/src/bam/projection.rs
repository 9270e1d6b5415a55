use eyre::{bail, ensure, Result};
use metabit_core_rs::nucleotide::GAP;
use noodles::sam::alignment::record::cigar::op::Kind;

/// Quality assigned to reference positions without a sequenced base (deletions, skips).
const NO_QUALITY: u8 = u8::MAX;

/// Project read bases and qualities onto reference positions following the CIGAR operations.
///
/// Matches (M, =, X) copy read bases, deletions and skips (D, N) emit gaps, insertions and soft
/// clips (I, S) only consume read bases, hard clips and padding consume nothing. Missing base
/// qualities (an empty slice) are treated as unknown and never fail a quality threshold.
pub fn project(
    ops: impl IntoIterator<Item = (Kind, usize)>,
    sequence: &[u8],
    qualities: &[u8],
) -> Result<(Vec<u8>, Vec<u8>)> {
    let has_qualities = !qualities.is_empty();
    ensure!(
        !has_qualities || qualities.len() == sequence.len(),
        "Read has {} bases but {} base qualities",
        sequence.len(),
        qualities.len()
    );

    let mut bases = Vec::with_capacity(sequence.len());
    let mut quals = Vec::with_capacity(sequence.len());
    let mut cursor = 0;
    for (kind, len) in ops {
        match kind {
            Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch => {
                ensure!(
                    cursor + len <= sequence.len(),
                    "CIGAR consumes more bases than the read has ({})",
                    sequence.len()
                );
                bases.extend_from_slice(&sequence[cursor..cursor + len]);
                if has_qualities {
                    quals.extend_from_slice(&qualities[cursor..cursor + len]);
                } else {
                    quals.extend(std::iter::repeat_n(NO_QUALITY, len));
                }
                cursor += len;
            }
            Kind::Deletion | Kind::Skip => {
                bases.extend(std::iter::repeat_n(GAP, len));
                quals.extend(std::iter::repeat_n(NO_QUALITY, len));
            }
            Kind::Insertion | Kind::SoftClip => {
                cursor += len;
            }
            Kind::HardClip | Kind::Pad => {}
        }
    }
    if cursor != sequence.len() {
        bail!(
            "CIGAR consumes {cursor} read bases, but the read has {}",
            sequence.len()
        );
    }
    Ok((bases, quals))
}
