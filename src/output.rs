//! Output writers: pretty JSON files and the Markdown report for `e2e`.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};

/// Serialize `value` with a four-space indent.
pub fn to_pretty_json(value: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser).context("Failed to serialize JSON")?;
    String::from_utf8(buf).context("Serialized JSON was not UTF-8")
}

pub fn write_json(path: &Path, value: &Value) -> Result<()> {
    let mut text = to_pretty_json(value)?;
    text.push('\n');
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

/// One line of the run's progress log.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub elapsed: Duration,
    pub message: String,
}

/// Wall-clock progress log. Each `mark` prints `{secs}s\t{message}` to
/// its sink (stdout unless built with `with_writer`) and keeps the step
/// for the report.
#[derive(Debug)]
pub struct Timeline<W = io::Stdout> {
    start: Instant,
    steps: Vec<Step>,
    out: W,
}

impl Timeline {
    pub fn start() -> Self {
        Timeline::with_writer(io::stdout())
    }
}

impl<W: Write> Timeline<W> {
    pub fn with_writer(out: W) -> Self {
        Timeline {
            start: Instant::now(),
            steps: Vec::new(),
            out,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Keep a step for the report without printing it yet.
    pub fn record(&mut self, message: impl Into<String>) -> Step {
        let step = Step {
            elapsed: self.elapsed(),
            message: message.into(),
        };
        self.steps.push(step.clone());
        step
    }

    pub fn print(&mut self, step: &Step) {
        // Progress output is best effort.
        let _ = writeln!(self.out, "{:.1}s\t{}", step.elapsed.as_secs_f64(), step.message);
    }

    pub fn mark(&mut self, message: impl Into<String>) {
        let step = self.record(message);
        self.print(&step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn writer(&self) -> &W {
        &self.out
    }
}

/// Everything the `e2e` Markdown report shows.
#[derive(Debug, Clone)]
pub struct E2eReport {
    pub file_name: String,
    pub file_kind: String,
    pub file_size: String,
    pub sample_id: String,
    pub sample_link: String,
    pub generated_at: String,
    pub steps: Vec<Step>,
    pub total: Duration,
    pub summary: Value,
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

impl E2eReport {
    pub fn render_markdown(&self) -> Result<String> {
        let mut md = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(md, "# NetworkSage sample report\n");
        let _ = writeln!(
            md,
            "- **File:** {} ({}, {})",
            self.file_name, self.file_kind, self.file_size
        );
        let _ = writeln!(md, "- **Sample:** [{}]({})", self.sample_id, self.sample_link);
        let _ = writeln!(md, "- **Generated:** {}", self.generated_at);
        let _ = writeln!(md, "- **Elapsed:** {:.1}s\n", self.total.as_secs_f64());

        let _ = writeln!(md, "## Timeline\n");
        let _ = writeln!(md, "| Elapsed | Step |");
        let _ = writeln!(md, "|--------:|------|");
        for step in &self.steps {
            let _ = writeln!(
                md,
                "| {:.1}s | {} |",
                step.elapsed.as_secs_f64(),
                escape_cell(&step.message)
            );
        }
        md.push('\n');

        let _ = writeln!(md, "## Summary\n");
        for (key, label) in [
            ("verdict", "Verdict"),
            ("confidence", "Confidence"),
            ("summary", "Summary"),
            ("details", "Details"),
        ] {
            if let Some(v) = self.summary.get(key) {
                let _ = writeln!(md, "**{}:** {}\n", label, field_text(v));
            }
        }

        let _ = writeln!(md, "## Raw summary\n");
        let _ = writeln!(md, "```json\n{}\n```", to_pretty_json(&self.summary)?);
        Ok(md)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let md = self.render_markdown()?;
        fs::write(path, md).with_context(|| format!("Failed to write {}", path.display()))
    }
}
