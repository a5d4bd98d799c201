//! Report rendering: plain, csv, json.

use clap::ValueEnum;
use loadwatch::Report;
use serde_json::Value;

/// Output format for the final report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
	/// Human-readable text (default)
	#[default]
	Plain,
	/// One `name,value` line per metric
	Csv,
	/// The full report as a JSON object
	Json,
}

impl std::str::FromStr for ReportFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"plain" => Ok(ReportFormat::Plain),
			"csv" => Ok(ReportFormat::Csv),
			"json" => Ok(ReportFormat::Json),
			_ => Err(format!("unknown format: {s}")),
		}
	}
}

impl std::fmt::Display for ReportFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ReportFormat::Plain => write!(f, "plain"),
			ReportFormat::Csv => write!(f, "csv"),
			ReportFormat::Json => write!(f, "json"),
		}
	}
}

/// Renders a report in the requested format.
pub fn render(report: &Report, format: ReportFormat) -> String {
	match format {
		ReportFormat::Plain => render_plain(report),
		ReportFormat::Csv => render_csv(report),
		ReportFormat::Json => serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string()),
	}
}

fn render_plain(report: &Report) -> String {
	let mut out = String::new();
	out.push_str(&report.url);
	out.push('\n');
	for (name, value) in &report.metrics {
		out.push_str(&format!("{name}: {}\n", scalar(value)));
	}
	if !report.notices.is_empty() {
		out.push('\n');
		for notice in &report.notices {
			out.push_str(notice);
			out.push('\n');
		}
	}
	out
}

fn render_csv(report: &Report) -> String {
	let mut out = String::new();
	for (name, value) in &report.metrics {
		out.push_str(&format!("{},{}\n", csv_field(name), csv_field(&scalar(value))));
	}
	out
}

fn scalar(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}

fn csv_field(raw: &str) -> String {
	if raw.contains([',', '"', '\n']) {
		format!("\"{}\"", raw.replace('"', "\"\""))
	} else {
		raw.to_string()
	}
}
