//! Document configuration, read from TOML.
//!
//! ```toml
//! language = "wiki"
//! headings-as-aliases-depth = 2
//! lock-timeout-ms = 40000
//! read-only = false
//!
//! [executor]
//! name = "quire-update"
//! queue-count = 3
//! execute-timeout-ms = 240000
//! shutdown-timeout-ms = 120000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use quire_worker::ExecutorConfig;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to parse document config: {0}")]
	Parse(#[from] toml::de::Error),
	#[error("invalid document config: {0}")]
	Invalid(String),
}

/// Settings shared by every page of one document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct DocumentConfig {
	/// Markup language handed to the parser.
	pub language: String,
	/// Headings up to this level become alias match terms; 0 disables.
	pub headings_as_aliases_depth: u8,
	/// Maximum wait for any page lock; 0 waits forever.
	pub lock_timeout_ms: u64,
	/// Makes every page effectively read-only.
	pub read_only: bool,
	pub executor: ExecutorConfig,
}

impl Default for DocumentConfig {
	fn default() -> Self {
		Self {
			language: quire_syntax::wiki::WIKI_LANGUAGE.to_string(),
			headings_as_aliases_depth: 0,
			lock_timeout_ms: 40_000,
			read_only: false,
			executor: ExecutorConfig::default(),
		}
	}
}

impl DocumentConfig {
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		let config = Self::from_toml_str(&input)?;
		tracing::debug!(path = %path.display(), "document config loaded");
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.executor.queue_count == 0 {
			return Err(ConfigError::Invalid("executor.queue-count must be at least 1".into()));
		}
		if self.language.trim().is_empty() {
			return Err(ConfigError::Invalid("language must not be empty".into()));
		}
		Ok(())
	}

	/// Page lock bound; `None` means unbounded.
	pub fn lock_timeout(&self) -> Option<Duration> {
		(self.lock_timeout_ms > 0).then(|| Duration::from_millis(self.lock_timeout_ms))
	}
}
