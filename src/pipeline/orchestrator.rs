// Import orchestrator: drives decoder -> session and applies the failure policy
use crate::data_importer::{BulkLoadSession, BulkStore};
use crate::error::{PgfeedError, Result};
use crate::monitoring::ProgressMonitor;
use crate::record_decoder::{
    CountedInput, Decoded, DelimitedDecoder, DelimitedOptions, JsonDocumentDecoder,
    JsonLinesDecoder, RecordDecoder,
};
use crate::schema_deriver::SchemaDeriver;
use crate::types::{Column, ImportConfig, ImportReport, InputFormat};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle of one import run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Initializing,
    DerivingSchema,
    Streaming,
    Finalizing,
    Committed,
    RolledBack,
    /// Terminal failure before any session was opened
    Failed,
}

/// Runs a single import: one input, one destination, one transaction.
///
/// Rejected raw lines go to `diagnostics` when the ignore-errors policy is
/// active; nothing else is ever written there.
pub struct Orchestrator<W: Write> {
    config: ImportConfig,
    diagnostics: W,
    cancelled: Arc<AtomicBool>,
    monitor: ProgressMonitor,
    state: ImportState,
    line_cursor: u64,
    accepted: u64,
    rejected: u64,
}

impl<W: Write> Orchestrator<W> {
    pub fn new(config: ImportConfig, diagnostics: W) -> Self {
        Self {
            config,
            diagnostics,
            cancelled: Arc::new(AtomicBool::new(false)),
            monitor: ProgressMonitor::disabled(),
            state: ImportState::Initializing,
            line_cursor: 0,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Abort the run at the next record once `flag` is set
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    pub fn with_monitor(mut self, monitor: ProgressMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    /// Line of the most recently attempted record
    pub fn line_cursor(&self) -> u64 {
        self.line_cursor
    }

    pub fn diagnostics(&self) -> &W {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> W {
        self.diagnostics
    }

    fn transition(&mut self, next: ImportState) {
        debug!(from = ?self.state, to = ?next, "Import state transition");
        self.state = next;
    }

    fn report(&self) -> ImportReport {
        ImportReport {
            accepted: self.accepted,
            rejected: self.rejected,
            destination: self.config.destination.to_string(),
        }
    }

    /// Import everything from `input` into `store` under one transaction
    pub async fn run<S: BulkStore>(&mut self, input: CountedInput, store: S) -> Result<ImportReport> {
        self.transition(ImportState::DerivingSchema);
        let (columns, mut decoder) = match self.derive_schema(input) {
            Ok(derived) => derived,
            Err(e) => {
                error!("Schema derivation failed: {}", e);
                self.transition(ImportState::Failed);
                return Err(e);
            }
        };
        self.line_cursor = decoder.lines_read();

        let mut session =
            match BulkLoadSession::open(store, self.config.destination.clone(), columns).await {
                Ok(session) => session,
                Err(e) => {
                    error!("Could not open bulk load session: {}", e);
                    self.transition(ImportState::Failed);
                    return Err(e);
                }
            };

        self.transition(ImportState::Streaming);
        if let Err(e) = self.stream(decoder.as_mut(), &mut session).await {
            let e = self.at_cursor(e);
            error!(line = self.line_cursor, "Import aborted: {}", e);
            self.transition(ImportState::RolledBack);
            if let Err(rollback_error) = session.rollback().await {
                error!("Rollback failed: {}", rollback_error);
            }
            return Err(e);
        }

        self.transition(ImportState::Finalizing);
        match session.commit().await {
            Ok(rows) => {
                self.transition(ImportState::Committed);
                info!(
                    accepted = self.accepted,
                    rejected = self.rejected,
                    rows,
                    destination = %self.config.destination,
                    "Import committed"
                );
                Ok(self.report())
            }
            Err(e) => {
                let e = self.at_cursor(e);
                error!("Commit failed: {}", e);
                self.transition(ImportState::RolledBack);
                Err(e)
            }
        }
    }

    /// Attach the line cursor to an error that does not carry a line yet
    fn at_cursor(&self, e: PgfeedError) -> PgfeedError {
        if e.line().is_some() {
            return e;
        }
        PgfeedError::Terminated {
            line: self.line_cursor,
            cause: Box::new(e),
        }
    }

    /// Pick the decoder for the configured format and derive the columns.
    /// A header, when present, is consumed here.
    fn derive_schema(&self, input: CountedInput) -> Result<(Vec<Column>, Box<dyn RecordDecoder>)> {
        let deriver = SchemaDeriver::new(&self.config);
        match self.config.format {
            InputFormat::Delimited => {
                let mut decoder = DelimitedDecoder::new(
                    input,
                    DelimitedOptions {
                        delimiter: self.config.delimiter,
                        line_terminator: self.config.line_terminator,
                        null_value: self.config.null_value.clone(),
                    },
                );
                let columns = deriver.derive_delimited(&mut decoder)?;
                decoder.set_expected_fields(columns.len());
                Ok((columns, Box::new(decoder)))
            }
            InputFormat::JsonLines => Ok((deriver.derive_json()?, Box::new(JsonLinesDecoder::new(input)))),
            InputFormat::JsonDocument => {
                Ok((deriver.derive_json()?, Box::new(JsonDocumentDecoder::new(input))))
            }
        }
    }

    async fn stream<S: BulkStore>(
        &mut self,
        decoder: &mut dyn RecordDecoder,
        session: &mut BulkLoadSession<S>,
    ) -> Result<()> {
        loop {
            if self.cancelled.load(Ordering::Relaxed) {
                warn!(line = self.line_cursor, "Import cancelled");
                return Err(PgfeedError::Cancelled {
                    line: self.line_cursor,
                });
            }

            let Some(Decoded {
                line,
                raw,
                terminator,
                outcome,
            }) = decoder.next_record()?
            else {
                break;
            };
            self.line_cursor = line;

            let result = match outcome {
                Ok(record) => session.add_row(&record).await,
                Err(e) => Err(PgfeedError::from(e)),
            };

            match result {
                Ok(()) => self.accepted += 1,
                Err(e) if e.is_record_level() && self.config.ignore_errors => {
                    self.rejected += 1;
                    warn!(line, "Skipping record: {}", e);
                    self.diagnostics.write_all(&raw)?;
                    self.diagnostics.write_all(terminator)?;
                }
                Err(e) => {
                    if e.is_record_level() {
                        self.rejected += 1;
                    }
                    return Err(PgfeedError::Aborted {
                        line,
                        cause: Box::new(e),
                        raw: String::from_utf8_lossy(&raw).into_owned(),
                    });
                }
            }

            self.monitor
                .observe(decoder.bytes_read(), self.accepted + self.rejected);
        }

        self.diagnostics.flush()?;
        self.monitor
            .finish(decoder.bytes_read(), self.accepted + self.rejected);
        Ok(())
    }
}
