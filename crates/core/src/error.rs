//! Error taxonomy and process exit codes.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised during a profiling session.
///
/// Observer-load and metric errors are recovered where they occur; the rest
/// terminate the session through teardown with a distinct exit code.
#[derive(Debug, Error)]
pub enum Error {
	/// No target URL was provided.
	#[error("target url must be provided")]
	MissingUrl,

	/// Configuration source could not be read or parsed.
	#[error("invalid configuration: {0}")]
	Config(String),

	/// Cookie specification was malformed or rejected by the engine.
	#[error("invalid cookie: {0}")]
	Cookie(String),

	/// An observer failed to initialize.
	#[error("observer {name} failed to load: {message}")]
	ObserverLoad { name: String, message: String },

	/// The engine reported a non-success page load.
	#[error("page load failed: {0}")]
	LoadFailed(String),

	/// The helper scope could not be registered in the page context.
	#[error("scope injection failed: {0}")]
	ScopeInjection(String),

	/// Browser engine transport or process failure.
	#[error("engine failure: {0}")]
	Engine(String),

	/// In-page evaluation failed.
	#[error("evaluation failed: {0}")]
	Evaluate(String),
}

impl Error {
	/// Process exit code for this failure.
	///
	/// Load failure, scope injection, and configuration faults keep their
	/// historical codes; everything else maps to the generic failure code.
	pub fn exit_code(&self) -> i32 {
		match self {
			Error::LoadFailed(_) => 2,
			Error::ScopeInjection(_) => 3,
			Error::MissingUrl | Error::Config(_) | Error::Cookie(_) => 4,
			Error::ObserverLoad { .. } | Error::Engine(_) | Error::Evaluate(_) => 1,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exit_codes_are_distinct_per_fatal_category() {
		assert_eq!(Error::LoadFailed("fail".into()).exit_code(), 2);
		assert_eq!(Error::ScopeInjection("refused".into()).exit_code(), 3);
		assert_eq!(Error::MissingUrl.exit_code(), 4);
		assert_eq!(Error::Config("bad json".into()).exit_code(), 4);
		assert_eq!(Error::Cookie("missing value".into()).exit_code(), 4);
	}

	#[test]
	fn infrastructure_failures_use_generic_code() {
		assert_eq!(Error::Engine("gone".into()).exit_code(), 1);
		assert_eq!(Error::Evaluate("boom".into()).exit_code(), 1);
	}
}
