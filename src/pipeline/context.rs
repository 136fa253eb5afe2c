//! Collaborators handed to the pipeline

use crate::feed::FeedFetcher;
use crate::storage::{ActiveReportQuery, ReportWriter};
use std::sync::Arc;

/// The external collaborators of a pipeline run.
///
/// Passed explicitly to the driver; nothing in the pipeline reaches for a
/// global connection.
#[derive(Clone)]
pub struct PipelineContext {
    pub fetcher: Arc<dyn FeedFetcher>,
    pub active_reports: Arc<dyn ActiveReportQuery>,
    pub writer: Arc<dyn ReportWriter>,
}

impl PipelineContext {
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        active_reports: Arc<dyn ActiveReportQuery>,
        writer: Arc<dyn ReportWriter>,
    ) -> Self {
        Self {
            fetcher,
            active_reports,
            writer,
        }
    }

    /// Use one store for both the read and the write side.
    pub fn with_store<S>(fetcher: Arc<dyn FeedFetcher>, store: Arc<S>) -> Self
    where
        S: ActiveReportQuery + ReportWriter + 'static,
    {
        Self {
            fetcher,
            active_reports: store.clone(),
            writer: store,
        }
    }
}
