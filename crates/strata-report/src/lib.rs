use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::mpsc::{self, SyncSender};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use console::Style;
use serde::Serialize;
use strata_domain::Coordinate;
use tracing::error;

mod error;
mod options;
mod redaction;

pub use error::ReportError;
pub use options::{ColorChoice, RenderOptions};
pub use redaction::{collect_secret_values, redact_secrets};

const RECORD_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportState {
    Success,
    Error,
    Excluded,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detail {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl Detail {
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct Record {
    #[serde(rename = "type")]
    kind: &'static str,
    time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<Coordinate>,
    state: ReportState,
    details: Vec<Detail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Record {
    fn deployment(
        config: Coordinate,
        state: ReportState,
        details: Vec<Detail>,
        error: Option<String>,
    ) -> Self {
        Self {
            kind: "DEPLOY",
            time: Utc::now().timestamp().to_string(),
            config: Some(config),
            state,
            details,
            error,
        }
    }

    fn loading(error: String) -> Self {
        Self {
            kind: "LOAD",
            time: Utc::now().timestamp().to_string(),
            config: None,
            state: ReportState::Error,
            details: Vec::new(),
            error: Some(error),
        }
    }
}

/// Sink for structured deploy events. The active reporter travels with the
/// deploy context; there is no global instance.
pub trait Reporter: Send + Sync {
    /// Record the outcome of one config deployment. Fire-and-forget: the
    /// write is acknowledged no later than [`Reporter::stop`].
    fn report_deployment(
        &self,
        config: Coordinate,
        state: ReportState,
        details: Vec<Detail>,
        error: Option<String>,
    );

    /// Record an error that occurred before any deployment started.
    fn report_loading(&self, error: String);

    fn summary(&self) -> DeploySummary;

    /// Drain the queue and flush the sink. Must be called exactly once,
    /// after the last producer is done.
    fn stop(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySummary {
    pub successes: usize,
    pub errors: usize,
    pub excluded: usize,
    pub skipped: usize,
    pub loading_errors: usize,
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
}

impl DeploySummary {
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.errors > 0 || self.loading_errors > 0
    }

    #[must_use]
    pub fn render(&self, options: &RenderOptions) -> String {
        let style = SummaryStyle::new(options.color);
        let mut output = String::new();

        let _ = writeln!(
            output,
            "{} {}",
            style.heading("Deploy:"),
            self.render_tally(&style)
        );

        if options.verbose {
            let duration = self.ended.signed_duration_since(self.started);
            let _ = writeln!(
                output,
                "  {}",
                style.dim(&format!(
                    "started {} finished {} ({}s)",
                    self.started.format("%Y%m%d-%H%M%S"),
                    self.ended.format("%Y%m%d-%H%M%S"),
                    duration.num_seconds()
                ))
            );
        }

        let verdict = if self.has_failures() {
            style.failure("The deployment finished with errors.")
        } else {
            style.success("The deployment finished without errors.")
        };
        let _ = writeln!(output, "{verdict}");

        output
    }

    fn render_tally(&self, style: &SummaryStyle) -> String {
        let mut parts = Vec::new();
        if self.successes > 0 {
            parts.push(style.success(&format!("{} deployed", self.successes)));
        }
        if self.errors > 0 {
            parts.push(style.failure(&format!("{} failed", self.errors)));
        }
        if self.loading_errors > 0 {
            parts.push(style.failure(&format!("{} loading errors", self.loading_errors)));
        }
        if self.excluded > 0 {
            parts.push(style.dim(&format!("{} excluded", self.excluded)));
        }
        if self.skipped > 0 {
            parts.push(style.dim(&format!("{} skipped", self.skipped)));
        }
        if parts.is_empty() {
            return "nothing to do".to_string();
        }
        parts.join(", ")
    }
}

#[derive(Debug, Default)]
struct Counters {
    successes: usize,
    errors: usize,
    excluded: usize,
    skipped: usize,
    loading_errors: usize,
    ended: Option<DateTime<Utc>>,
}

/// Default reporter: appends JSON-lines records to a file from a dedicated
/// writer thread behind a bounded queue.
pub struct FileReporter {
    sender: Mutex<Option<SyncSender<Record>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    counters: Mutex<Counters>,
    started: DateTime<Utc>,
}

impl FileReporter {
    /// Open `path` for truncating write and start the writer thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the report file cannot be created.
    pub fn create(path: &Path) -> Result<Self, ReportError> {
        let file = File::create(path).map_err(|source| ReportError::OpenFile {
            path: path.to_path_buf(),
            source,
        })?;

        let (sender, receiver) = mpsc::sync_channel::<Record>(RECORD_QUEUE_DEPTH);
        let report_path = path.to_path_buf();
        let writer = std::thread::spawn(move || {
            let mut out = BufWriter::new(file);
            for record in receiver {
                if let Err(write_error) = write_record(&mut out, &record) {
                    error!("unable to write report record to {}: {write_error}", report_path.display());
                }
            }
            if let Err(flush_error) = out.flush() {
                error!("unable to flush report file {}: {flush_error}", report_path.display());
            }
        });

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            writer: Mutex::new(Some(writer)),
            counters: Mutex::new(Counters::default()),
            started: Utc::now(),
        })
    }

    fn enqueue(&self, record: Record) {
        let sender = match self.sender.lock() {
            Ok(guard) => guard.as_ref().cloned(),
            Err(_) => None,
        };
        if let Some(sender) = sender
            && sender.send(record).is_err()
        {
            error!("report writer stopped before the last record was enqueued");
        }
    }

    fn count(&self, record: &Record) {
        let Ok(mut counters) = self.counters.lock() else {
            return;
        };
        counters.ended = Some(Utc::now());
        match (record.kind, record.state) {
            ("LOAD", _) => counters.loading_errors += 1,
            (_, ReportState::Success) => counters.successes += 1,
            (_, ReportState::Error) => counters.errors += 1,
            (_, ReportState::Excluded) => counters.excluded += 1,
            (_, ReportState::Skipped) => counters.skipped += 1,
        }
    }
}

fn write_record(out: &mut BufWriter<File>, record: &Record) -> io::Result<()> {
    let line = serde_json::to_string(record)?;
    writeln!(out, "{line}")
}

impl Reporter for FileReporter {
    fn report_deployment(
        &self,
        config: Coordinate,
        state: ReportState,
        details: Vec<Detail>,
        error: Option<String>,
    ) {
        let record = Record::deployment(config, state, details, error);
        self.count(&record);
        self.enqueue(record);
    }

    fn report_loading(&self, error: String) {
        let record = Record::loading(error);
        self.count(&record);
        self.enqueue(record);
    }

    fn summary(&self) -> DeploySummary {
        let counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        DeploySummary {
            successes: counters.successes,
            errors: counters.errors,
            excluded: counters.excluded,
            skipped: counters.skipped,
            loading_errors: counters.loading_errors,
            started: self.started,
            ended: counters.ended.unwrap_or(self.started),
        }
    }

    fn stop(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let writer = match self.writer.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(writer) = writer
            && writer.join().is_err()
        {
            error!("report writer thread panicked");
        }
    }
}

/// Reporter used when no report file was requested.
#[derive(Debug, Default)]
pub struct DiscardReporter {
    counters: Mutex<Counters>,
    started: DateTime<Utc>,
}

impl DiscardReporter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            started: Utc::now(),
        }
    }
}

impl Reporter for DiscardReporter {
    fn report_deployment(
        &self,
        config: Coordinate,
        state: ReportState,
        details: Vec<Detail>,
        error: Option<String>,
    ) {
        let record = Record::deployment(config, state, details, error);
        if let Ok(mut counters) = self.counters.lock() {
            counters.ended = Some(Utc::now());
            match record.state {
                ReportState::Success => counters.successes += 1,
                ReportState::Error => counters.errors += 1,
                ReportState::Excluded => counters.excluded += 1,
                ReportState::Skipped => counters.skipped += 1,
            }
        }
    }

    fn report_loading(&self, _error: String) {
        if let Ok(mut counters) = self.counters.lock() {
            counters.ended = Some(Utc::now());
            counters.loading_errors += 1;
        }
    }

    fn summary(&self) -> DeploySummary {
        let counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        DeploySummary {
            successes: counters.successes,
            errors: counters.errors,
            excluded: counters.excluded,
            skipped: counters.skipped,
            loading_errors: counters.loading_errors,
            started: self.started,
            ended: counters.ended.unwrap_or(self.started),
        }
    }

    fn stop(&self) {}
}

struct SummaryStyle {
    color_enabled: bool,
    heading_style: Style,
    success_style: Style,
    failure_style: Style,
    dim_style: Style,
}

impl SummaryStyle {
    fn new(choice: ColorChoice) -> Self {
        Self {
            color_enabled: should_color(choice),
            heading_style: Style::new().white().bold(),
            success_style: Style::new().green(),
            failure_style: Style::new().red(),
            dim_style: Style::new().dim(),
        }
    }

    fn paint(&self, style: &Style, text: &str) -> String {
        if self.color_enabled {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint(&self.heading_style, text)
    }

    fn success(&self, text: &str) -> String {
        self.paint(&self.success_style, text)
    }

    fn failure(&self, text: &str) -> String {
        self.paint(&self.failure_style, text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint(&self.dim_style, text)
    }
}

fn should_color(choice: ColorChoice) -> bool {
    match choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => io::stdout().is_terminal(),
    }
}
