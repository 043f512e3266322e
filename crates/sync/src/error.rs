use std::{io, path::PathBuf};

use serde::{Deserialize, Serialize};
use tally_ordering::ValidationError;
use thiserror::Error;

use super::intent::EntityKind;

/// Failures reported by a [`RemoteSyncClient`](crate::RemoteSyncClient).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum RemoteError {
	#[error("transient remote failure: {0}")]
	Transient(String),
	#[error("remote call timed out")]
	Timeout,
	#[error("remote rejected the operation: {0}")]
	Rejected(String),
}

impl RemoteError {
	/// Transient failures are retried up to the configured ceiling, rejections never are.
	#[must_use]
	pub const fn is_transient(&self) -> bool {
		!matches!(self, Self::Rejected(_))
	}
}

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("queue store I/O error <path='{}'>: {source}", .path.display())]
	Io { path: PathBuf, source: io::Error },
	#[error("failed to encode queued intent: {0}")]
	Encode(#[from] rmp_serde::encode::Error),
	#[error("corrupt queue entry <path='{}'>: {source}", .path.display())]
	Corrupt {
		path: PathBuf,
		source: rmp_serde::decode::Error,
	},
}

impl StoreError {
	pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
		Self::Io {
			path: path.into(),
			source,
		}
	}
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read sync config <path='{}'>: {source}", .path.display())]
	Io { path: PathBuf, source: io::Error },
	#[error("invalid sync config: {0}")]
	Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum SeedError {
	#[error(transparent)]
	Validation(#[from] ValidationError),
	#[error("entity kind carries no rank: {0}")]
	Unrankable(EntityKind),
}
