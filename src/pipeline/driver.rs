//! The pipeline driver
//!
//! Per source: fetch → adapter → for each record: temporal validation →
//! geometry decomposition → for each part: dedup → commit.
//!
//! A failing source is reported and skipped; a failing record is reported
//! and skipped. Nothing short of a bad configuration stops a run.

use super::context::PipelineContext;
use super::outcome::{ErrorKind, Outcome, RunSummary, SourceReport};
use crate::adapter::{AdapterInput, AdapterRegistry};
use crate::config::{ConfigError, PipelineConfig, SnapshotPolicy, SourceConfig};
use crate::dedup::{ActiveReportSnapshot, DedupEngine};
use crate::feed::RawPayload;
use crate::geometry::{normalize_geometry, MetricProjection};
use crate::record::{validate, ExpiryPolicy, NormalizedRecord, Validation};
use crate::storage::NewReport;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

pub struct Pipeline {
    config: PipelineConfig,
    registry: AdapterRegistry,
    context: PipelineContext,
    tz: Tz,
    dedup: DedupEngine,
}

impl Pipeline {
    /// Build a pipeline, checking that every configured source has an adapter.
    pub fn new(
        config: PipelineConfig,
        registry: AdapterRegistry,
        context: PipelineContext,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let tz = config.tz()?;
        if let Some(source) = config.sources.iter().find(|s| !registry.contains(&s.adapter)) {
            return Err(ConfigError::UnknownAdapter {
                source_name: source.name.clone(),
                adapter: source.adapter.clone(),
            });
        }
        let dedup = DedupEngine::new(MetricProjection::new(&config.projection), config.buffer_meters);

        Ok(Self {
            config,
            registry,
            context,
            tz,
            dedup,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process every enabled source, in configuration order.
    pub async fn run(&self) -> RunSummary {
        self.run_at(Utc::now()).await
    }

    /// `run` with an explicit processing time.
    pub async fn run_at(&self, now: DateTime<Utc>) -> RunSummary {
        let mut summary = RunSummary::default();
        for source in self.config.enabled_sources() {
            summary.sources.push(self.run_source(source, now).await);
        }
        tracing::info!(
            sources = summary.sources.len(),
            accepted = summary.accepted(),
            duplicates = summary.rejected_duplicate(),
            inactive = summary.rejected_temporal(),
            errors = summary.errors(),
            failed_sources = summary.failed_sources(),
            "Run complete"
        );
        summary
    }

    /// Fetch and process one source. Fetch failures are reported, never raised.
    pub async fn run_source(&self, source: &SourceConfig, now: DateTime<Utc>) -> SourceReport {
        tracing::info!(source = %source.name, url = %source.url, "Processing opendata");

        match self.context.fetcher.fetch(source).await {
            Ok(payload) => self.process_payload(source, &payload, now),
            Err(e) => {
                tracing::warn!(source = %source.name, error = %e, "Failed to fetch feed, skipping source");
                SourceReport::new(&source.name, &source.report_type).failed((&e).into(), e.to_string())
            }
        }
    }

    /// Process an already fetched payload.
    pub fn process_payload(&self, source: &SourceConfig, payload: &RawPayload, now: DateTime<Utc>) -> SourceReport {
        let mut report = SourceReport::new(&source.name, &source.report_type);
        let local_now = now.with_timezone(&self.tz);

        let input = AdapterInput::new(&source.name, payload, local_now).raising(self.config.raise_on_error);
        let normalized = match self.registry.normalize(&source.adapter, &input) {
            Ok(normalized) => normalized,
            Err(e) => {
                tracing::warn!(source = %source.name, error = %e, "Failed to normalize feed, skipping source");
                return report.failed((&e).into(), e.to_string());
            }
        };

        let mut snapshot = match ActiveReportSnapshot::load(
            self.context.active_reports.as_ref(),
            &source.report_type,
            now,
            self.dedup.projection(),
        ) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(source = %source.name, error = %e, "Failed to load active reports, skipping source");
                return report.failed((&e).into(), e.to_string());
            }
        };
        tracing::debug!(
            source = %source.name,
            report_type = %source.report_type,
            active = snapshot.len(),
            "Loaded active reports"
        );

        report.filtered = normalized.filtered;
        for rejected in &normalized.rejected {
            report.push(rejected.record_id(), None, Outcome::error(rejected.into(), rejected.to_string()));
        }

        let policy = self.config.expiry_policy(&source.report_type);
        for record in normalized.records {
            self.process_record(source, record, policy, local_now, &mut snapshot, &mut report);
        }

        tracing::info!(
            source = %source.name,
            accepted = report.accepted(),
            duplicates = report.rejected_duplicate(),
            inactive = report.rejected_temporal(),
            errors = report.errors(),
            filtered = report.filtered,
            "Source processed"
        );
        report
    }

    fn process_record(
        &self,
        source: &SourceConfig,
        record: NormalizedRecord,
        policy: ExpiryPolicy,
        now: DateTime<Tz>,
        snapshot: &mut ActiveReportSnapshot,
        report: &mut SourceReport,
    ) {
        let record_id = record.record_id.clone();

        let validated = match validate(record, policy, now) {
            Ok(Validation::Active(validated)) => validated,
            Ok(Validation::Inactive(window)) => {
                tracing::info!(
                    source = %source.name,
                    record = %record_id,
                    start = %window.start,
                    end = %window.end,
                    "Ignored record, not in progress"
                );
                report.push(&record_id, None, Outcome::RejectedTemporal(window));
                return;
            }
            Err(e) => {
                tracing::warn!(source = %source.name, record = %record_id, error = %e, "Invalid record, skipping");
                report.push(&record_id, None, Outcome::error(ErrorKind::RecordValidation, e.to_string()));
                return;
            }
        };

        let parts = match normalize_geometry(&validated.record) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(source = %source.name, record = %record_id, error = %e, "Invalid geometry, skipping");
                report.push(&record_id, None, Outcome::error(ErrorKind::Geometry, e.to_string()));
                return;
            }
        };

        let expiration = validated.window.expiration();
        for part in parts {
            if let Some(reason) = self.dedup.check(&part, snapshot) {
                tracing::info!(
                    source = %source.name,
                    record = %record_id,
                    part = part.index,
                    ?reason,
                    "Ignored record, report already exists"
                );
                report.push(&record_id, Some(part.index), Outcome::RejectedDuplicate(reason));
                continue;
            }

            let new_report = NewReport {
                report_type: source.report_type.clone(),
                lat: part.position.lat,
                lng: part.position.lng,
                expiration_time: Some(expiration),
                source: validated.record.source.clone(),
                shape_geojson: part.shape.to_geojson_string(),
            };
            match self.context.writer.create(new_report) {
                Ok(committed) => {
                    tracing::info!(
                        source = %source.name,
                        record = %record_id,
                        part = part.index,
                        id = committed.id,
                        lat = committed.lat,
                        lng = committed.lng,
                        "Added new report"
                    );
                    if self.config.snapshot == SnapshotPolicy::IncludeCommitted {
                        snapshot.insert(part.position, committed.expiration_time, self.dedup.projection());
                    }
                    report.push(&record_id, Some(part.index), Outcome::Accepted(committed));
                }
                Err(e) => {
                    tracing::warn!(source = %source.name, record = %record_id, error = %e, "Failed to commit report");
                    report.push(&record_id, Some(part.index), Outcome::error(ErrorKind::Storage, e.to_string()));
                }
            }
        }
    }
}
