//! Terminal outcomes of a pipeline run

use crate::adapter::{AdapterError, ItemError};
use crate::dedup::DuplicateReason;
use crate::feed::FeedError;
use crate::record::TimeWindow;
use crate::storage::{CanonicalReport, StorageError};
use std::fmt;

/// The error kinds a run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    FeedFetch,
    FeedParse,
    RecordValidation,
    Geometry,
    /// The report store failed
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FeedFetch => "feed_fetch",
            Self::FeedParse => "feed_parse",
            Self::RecordValidation => "record_validation",
            Self::Geometry => "geometry",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&FeedError> for ErrorKind {
    fn from(error: &FeedError) -> Self {
        if error.is_parse() {
            Self::FeedParse
        } else {
            Self::FeedFetch
        }
    }
}

impl From<&ItemError> for ErrorKind {
    fn from(error: &ItemError) -> Self {
        match error {
            ItemError::Record(_) => Self::RecordValidation,
            ItemError::Geometry { .. } => Self::Geometry,
        }
    }
}

impl From<&AdapterError> for ErrorKind {
    fn from(error: &AdapterError) -> Self {
        match error {
            AdapterError::Item(item) => item.into(),
            AdapterError::InvalidInput(_) | AdapterError::Payload(_) | AdapterError::UnknownAdapter(_) => {
                Self::FeedParse
            }
        }
    }
}

impl From<&StorageError> for ErrorKind {
    fn from(_: &StorageError) -> Self {
        Self::Storage
    }
}

/// What happened to one record, or to one part of it.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accepted(CanonicalReport),
    RejectedTemporal(TimeWindow),
    RejectedDuplicate(DuplicateReason),
    Error { kind: ErrorKind, message: String },
}

impl Outcome {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// An outcome tagged with the record it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    pub record_id: String,
    /// Part index for outcomes decided after decomposition
    pub part: Option<usize>,
    pub outcome: Outcome,
}

/// Everything that happened to one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub source: String,
    pub report_type: String,
    /// Set when the whole source was skipped; `outcomes` then holds what
    /// was decided before the failure, usually nothing
    pub failure: Option<(ErrorKind, String)>,
    /// Items dropped by a provider filter
    pub filtered: usize,
    pub outcomes: Vec<RecordOutcome>,
}

impl SourceReport {
    pub fn new(source: impl Into<String>, report_type: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            report_type: report_type.into(),
            failure: None,
            filtered: 0,
            outcomes: Vec::new(),
        }
    }

    pub(crate) fn failed(mut self, kind: ErrorKind, message: impl Into<String>) -> Self {
        self.failure = Some((kind, message.into()));
        self
    }

    pub(crate) fn push(&mut self, record_id: &str, part: Option<usize>, outcome: Outcome) {
        self.outcomes.push(RecordOutcome {
            record_id: record_id.to_string(),
            part,
            outcome,
        });
    }

    pub fn accepted(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Accepted(_)))
    }

    pub fn rejected_temporal(&self) -> usize {
        self.count(|o| matches!(o, Outcome::RejectedTemporal(_)))
    }

    pub fn rejected_duplicate(&self) -> usize {
        self.count(|o| matches!(o, Outcome::RejectedDuplicate(_)))
    }

    pub fn errors(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Error { .. }))
    }

    /// Reports committed for this source.
    pub fn committed(&self) -> Vec<&CanonicalReport> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.outcome {
                Outcome::Accepted(report) => Some(report),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }
}

/// Per-source reports of a run, in processing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub sources: Vec<SourceReport>,
}

impl RunSummary {
    pub fn source(&self, name: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source == name)
    }

    pub fn accepted(&self) -> usize {
        self.sources.iter().map(SourceReport::accepted).sum()
    }

    pub fn rejected_temporal(&self) -> usize {
        self.sources.iter().map(SourceReport::rejected_temporal).sum()
    }

    pub fn rejected_duplicate(&self) -> usize {
        self.sources.iter().map(SourceReport::rejected_duplicate).sum()
    }

    pub fn errors(&self) -> usize {
        self.sources.iter().map(SourceReport::errors).sum()
    }

    /// Sources skipped as a whole.
    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.failure.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryError;
    use crate::record::RecordError;

    #[test]
    fn error_kinds_follow_the_taxonomy() {
        assert_eq!(ErrorKind::from(&FeedError::Fetch("timeout".into())), ErrorKind::FeedFetch);
        assert_eq!(
            ErrorKind::from(&FeedError::Http { status: 503, url: "u".into() }),
            ErrorKind::FeedFetch
        );
        assert_eq!(ErrorKind::from(&FeedError::Parse("eof".into())), ErrorKind::FeedParse);
        assert_eq!(
            ErrorKind::from(&AdapterError::Payload("no features".into())),
            ErrorKind::FeedParse
        );

        let record = ItemError::Record(RecordError::missing("1", "recordid"));
        assert_eq!(ErrorKind::from(&record), ErrorKind::RecordValidation);
        let geometry = ItemError::geometry("1", GeometryError::Malformed("x".into()));
        assert_eq!(ErrorKind::from(&AdapterError::Item(geometry)), ErrorKind::Geometry);
    }

    #[test]
    fn source_report_counts_by_outcome() {
        let mut report = SourceReport::new("paris", "interrupt");
        report.push("1", Some(0), Outcome::RejectedDuplicate(DuplicateReason::SamePosition));
        report.push("2", None, Outcome::error(ErrorKind::Geometry, "bad"));
        report.push("3", Some(1), Outcome::RejectedDuplicate(DuplicateReason::WithinBuffer { distance: 3.0 }));

        assert_eq!(report.rejected_duplicate(), 2);
        assert_eq!(report.errors(), 1);
        assert_eq!(report.accepted(), 0);
        assert!(report.committed().is_empty());

        let summary = RunSummary {
            sources: vec![report, SourceReport::new("lyon", "interrupt").failed(ErrorKind::FeedFetch, "down")],
        };
        assert_eq!(summary.rejected_duplicate(), 2);
        assert_eq!(summary.failed_sources(), 1);
        assert!(summary.source("lyon").is_some());
    }
}
