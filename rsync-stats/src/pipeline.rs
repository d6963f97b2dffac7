use std::io;

use metrics::counter;
use thiserror::Error;
use tracing::{info, info_span, warn, Span};

use crate::anonymize::hosthash;
use crate::correlate::{Correlator, TransferOutcome};
use crate::enrich::Enricher;
use crate::metrics_consts::{
    CONNECTIONS_REPLACED, EVENTS_COMPLETED, LINES_READ, LINES_UNMATCHED, TRANSFERS_ORPHANED,
};
use crate::parse::{parse_line, ParsedLine};
use crate::source::LineSource;
use crate::types::CompletedEvent;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to open {source_name}: {error}")]
    OpenError {
        source_name: String,
        error: io::Error,
    },
    #[error("failed to read {source_name}: {error}")]
    ReadError {
        source_name: String,
        error: io::Error,
    },
}

/// Counts for one parse run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseReport {
    pub lines: u64,
    pub unmatched: u64,
    pub connections: u64,
    pub transfers: u64,
    pub replaced: u64,
    pub orphaned: u64,
    pub geo_fallbacks: u64,
    pub events: u64,
    /// Connections still waiting for a transfer summary when the source ran out.
    pub pending: u64,
}

#[derive(Debug)]
pub struct ParseOutcome {
    pub events: Vec<CompletedEvent>,
    pub report: ParseReport,
}

/// Turns a log source into enriched, anonymized events.
///
/// Every call to `parse` owns its own correlation state, so one pipeline can be
/// reused across files without sessions leaking between them.
pub struct Pipeline {
    enricher: Enricher,
    span: Span,
}

impl Pipeline {
    pub fn new(enricher: Enricher) -> Self {
        Self {
            enricher,
            span: info_span!("rsync_stats"),
        }
    }

    /// Runs every parse under `span`, so the host decides where pipeline logs go.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn parse(&self, source: &LineSource) -> Result<ParseOutcome, PipelineError> {
        let span = info_span!(parent: &self.span, "parse", source = %source);
        let _entered = span.enter();

        let lines = source.lines().map_err(|error| PipelineError::OpenError {
            source_name: source.to_string(),
            error,
        })?;

        let mut correlator = Correlator::new();
        let mut report = ParseReport::default();
        let mut events = Vec::new();

        for line in lines {
            let line = line.map_err(|error| PipelineError::ReadError {
                source_name: source.to_string(),
                error,
            })?;
            report.lines += 1;

            match parse_line(&line) {
                ParsedLine::Unmatched => report.unmatched += 1,
                ParsedLine::Connection(connection) => {
                    report.connections += 1;
                    if correlator.observe_connection(connection) {
                        report.replaced += 1;
                    }
                }
                ParsedLine::Transfer(transfer) => {
                    report.transfers += 1;
                    match correlator.observe_transfer(transfer) {
                        TransferOutcome::Orphaned => report.orphaned += 1,
                        TransferOutcome::Completed(session) => {
                            let located = self.enricher.locate(&session.connection.clientip);
                            if located.fallback {
                                report.geo_fallbacks += 1;
                            }
                            let hash = hosthash(&session.connection.hostname);
                            events.push(CompletedEvent::new(session, located.tag, hash));
                        }
                    }
                }
            }
        }

        report.events = events.len() as u64;
        report.pending = correlator.pending() as u64;

        if report.pending > 0 {
            warn!(
                pending = report.pending,
                "connections without a transfer summary were not accounted"
            );
        }
        info!(
            lines = report.lines,
            events = report.events,
            orphaned = report.orphaned,
            geo_fallbacks = report.geo_fallbacks,
            "parsed rsync log"
        );

        counter!(LINES_READ).increment(report.lines);
        counter!(LINES_UNMATCHED).increment(report.unmatched);
        counter!(CONNECTIONS_REPLACED).increment(report.replaced);
        counter!(TRANSFERS_ORPHANED).increment(report.orphaned);
        counter!(EVENTS_COMPLETED).increment(report.events);

        Ok(ParseOutcome { events, report })
    }
}
