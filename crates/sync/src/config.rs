use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::fs;

use super::error::ConfigError;

/// Sync tunables, grouped by the component they drive. Every field has a default, so an empty
/// document is a valid config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
	pub scheduler: SchedulerConfig,
	pub retry: RetryConfig,
	pub events: EventConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
	/// Seconds between periodic drains.
	pub tick_interval_secs: u64,
	/// Interactive submissions try to reach the remote right away.
	pub fast_path: bool,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			tick_interval_secs: 30,
			fast_path: true,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	/// Failed attempts after which an intent is dropped and reported.
	pub max_attempts: u32,
	/// Fixed pause between attempts, no backoff.
	pub delay_ms: u64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			delay_ms: 2000,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
	pub capacity: usize,
}

impl Default for EventConfig {
	fn default() -> Self {
		Self { capacity: 256 }
	}
}

impl SyncConfig {
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		toml::from_str(source).map_err(Into::into)
	}

	pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();

		let source = fs::read_to_string(path)
			.await
			.map_err(|source| ConfigError::Io {
				path: path.to_path_buf(),
				source,
			})?;

		Self::from_toml_str(&source)
	}

	#[must_use]
	pub fn tick_interval(&self) -> Duration {
		// tokio intervals panic on a zero period
		Duration::from_secs(self.scheduler.tick_interval_secs.max(1))
	}

	#[must_use]
	pub const fn retry_delay(&self) -> Duration {
		Duration::from_millis(self.retry.delay_ms)
	}

	#[must_use]
	pub fn max_attempts(&self) -> u32 {
		self.retry.max_attempts.max(1)
	}

	#[must_use]
	pub fn event_capacity(&self) -> usize {
		self.events.capacity.max(1)
	}
}
