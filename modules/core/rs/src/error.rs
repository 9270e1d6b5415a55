use derive_more::{Display, Error};

/// Domain failures that callers may want to recover from. They travel inside `eyre::Report` and
/// can be recovered with `report.downcast_ref::<Error>()`.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum Error {
    #[display("Reference target is missing from the database index: {target}")]
    MissingReferenceEntry { target: String },

    #[display("Database index is corrupted for target {target}: {reason}")]
    CorruptDatabaseIndex { target: String, reason: String },

    /// `scope` names what the samples disagree on: a species or the whole merge set.
    #[display("Samples were profiled against incompatible references for {scope}: {reason}")]
    MergeSetMismatch { scope: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::Report;

    #[test]
    fn test_error_downcast() {
        let report = Report::new(Error::MissingReferenceEntry {
            target: "contig_1".to_string(),
        });
        assert_eq!(
            report.to_string(),
            "Reference target is missing from the database index: contig_1"
        );
        assert!(matches!(
            report.downcast_ref::<Error>(),
            Some(Error::MissingReferenceEntry { .. })
        ));
    }
}
