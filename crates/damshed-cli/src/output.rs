//! Human and JSON output.
//!
//! In JSON mode stdout carries exactly one document, written by
//! [`OutputWriter::result`]; status lines and tables are human-only and
//! warnings go to stderr.

use console::style;
use serde::Serialize;
use std::fmt::Display;
use tabled::{settings::Style, Table, Tabled};

/// Output format mode
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Human,
    Json,
}

pub struct OutputWriter {
    format: OutputFormat,
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            format: if json { OutputFormat::Json } else { OutputFormat::Human },
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    pub fn success(&self, message: impl Display) {
        if !self.is_json() {
            println!("{} {}", style("✓").green().bold(), message);
        }
    }

    pub fn info(&self, message: impl Display) {
        if !self.is_json() {
            println!("{} {}", style("ℹ").blue().bold(), message);
        }
    }

    pub fn warning(&self, message: impl Display) {
        match self.format {
            OutputFormat::Human => eprintln!("{} {}", style("⚠").yellow().bold(), message),
            OutputFormat::Json => eprintln!(
                "{}",
                pretty(&serde_json::json!({ "status": "warning", "message": message.to_string() }))
            ),
        }
    }

    pub fn kv(&self, key: impl Display, value: impl Display) {
        if !self.is_json() {
            println!("{}: {}", style(key).bold(), value);
        }
    }

    pub fn section(&self, title: impl Display) {
        if !self.is_json() {
            println!("\n{}", style(title).bold().underlined());
        }
    }

    pub fn table<T: Tabled>(&self, rows: Vec<T>) {
        if self.is_json() {
            return;
        }
        if rows.is_empty() {
            println!("{}", style("(no data)").dim());
        } else {
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{}", table);
        }
    }

    /// Emit the command's result document
    pub fn result<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        let data = serde_json::to_value(data)?;
        let document = match self.format {
            OutputFormat::Human => data,
            OutputFormat::Json => serde_json::json!({ "status": "success", "data": data }),
        };
        println!("{}", pretty(&document));
        Ok(())
    }
}
