//! Named metric values and free-text notices collected during a session.

use std::collections::BTreeMap;

use serde_json::Value;

/// Append/overwrite store for metrics and notices; nothing is ever removed.
#[derive(Debug, Default)]
pub struct MetricsStore {
	metrics: BTreeMap<String, Value>,
	notices: Vec<String>,
}

impl MetricsStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Overwrites `name`. A null value is stored as `0`.
	pub fn set(&mut self, name: &str, value: impl Into<Value>) {
		let value = value.into();
		let value = if value.is_null() { Value::from(0) } else { value };
		self.metrics.insert(name.to_string(), value);
	}

	/// Adds `by` to the current value, treating missing or non-numeric as 0.
	pub fn incr(&mut self, name: &str, by: i64) {
		let current = self.metrics.get(name).and_then(Value::as_i64).unwrap_or(0);
		self.metrics.insert(name.to_string(), Value::from(current + by));
	}

	pub fn get(&self, name: &str) -> Option<&Value> {
		self.metrics.get(name)
	}

	pub fn add_notice(&mut self, text: impl Into<String>) {
		self.notices.push(text.into());
	}

	pub fn metrics(&self) -> &BTreeMap<String, Value> {
		&self.metrics
	}

	pub fn notices(&self) -> &[String] {
		&self.notices
	}

	pub fn len(&self) -> usize {
		self.metrics.len()
	}

	pub fn is_empty(&self) -> bool {
		self.metrics.is_empty()
	}
}
