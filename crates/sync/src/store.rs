//! Durable storage for queued intents, so that anything not yet confirmed by the remote survives
//! a restart.

use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{fs, sync::RwLock};
use tracing::{debug, instrument, warn};

use super::{
	error::StoreError,
	intent::{ChangeIntent, IntentId},
};

const INTENT_EXTENSION: &str = "intent";
const TEMP_EXTENSION: &str = "intent.tmp";
const CORRUPT_EXTENSION: &str = "corrupt";

#[async_trait]
pub trait QueueStore: Send + Sync {
	/// Inserts or overwrites the entry for `intent.id`.
	async fn put(&self, intent: &ChangeIntent) -> Result<(), StoreError>;

	/// Removing an absent entry is not an error.
	async fn remove(&self, id: IntentId) -> Result<(), StoreError>;

	/// Every readable entry, oldest first.
	async fn load_all(&self) -> Result<Vec<ChangeIntent>, StoreError>;

	async fn clear(&self) -> Result<(), StoreError>;
}

fn sort_oldest_first(intents: &mut [ChangeIntent]) {
	intents.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
}

#[derive(Debug, Default)]
pub struct MemoryStore {
	intents: RwLock<BTreeMap<IntentId, ChangeIntent>>,
}

impl MemoryStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl QueueStore for MemoryStore {
	async fn put(&self, intent: &ChangeIntent) -> Result<(), StoreError> {
		self.intents.write().await.insert(intent.id, intent.clone());
		Ok(())
	}

	async fn remove(&self, id: IntentId) -> Result<(), StoreError> {
		self.intents.write().await.remove(&id);
		Ok(())
	}

	async fn load_all(&self) -> Result<Vec<ChangeIntent>, StoreError> {
		let mut intents = self.intents.read().await.values().cloned().collect::<Vec<_>>();
		sort_oldest_first(&mut intents);
		Ok(intents)
	}

	async fn clear(&self) -> Result<(), StoreError> {
		self.intents.write().await.clear();
		Ok(())
	}
}

/// One MessagePack file per intent inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
	dir: PathBuf,
}

impl FileStore {
	pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let dir = dir.into();

		fs::create_dir_all(&dir)
			.await
			.map_err(|e| StoreError::io(&dir, e))?;

		Ok(Self { dir })
	}

	#[must_use]
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	fn entry_path(&self, id: IntentId) -> PathBuf {
		self.dir.join(format!("{id}.{INTENT_EXTENSION}"))
	}

	async fn read_entry(path: &Path) -> Result<ChangeIntent, StoreError> {
		let bytes = fs::read(path).await.map_err(|e| StoreError::io(path, e))?;

		rmp_serde::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
			path: path.to_path_buf(),
			source,
		})
	}

	async fn quarantine(path: &Path) {
		let target = path.with_extension(CORRUPT_EXTENSION);

		if let Err(e) = fs::rename(path, &target).await {
			warn!(path = %path.display(), ?e, "Failed to quarantine corrupt queue entry;");
		}
	}

	async fn entry_paths(&self) -> Result<Vec<PathBuf>, StoreError> {
		let mut entries = fs::read_dir(&self.dir)
			.await
			.map_err(|e| StoreError::io(&self.dir, e))?;

		let mut paths = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StoreError::io(&self.dir, e))?
		{
			let path = entry.path();
			if path.extension().is_some_and(|ext| ext == INTENT_EXTENSION) {
				paths.push(path);
			}
		}

		Ok(paths)
	}
}

#[async_trait]
impl QueueStore for FileStore {
	async fn put(&self, intent: &ChangeIntent) -> Result<(), StoreError> {
		let path = self.entry_path(intent.id);
		let temp = path.with_extension(TEMP_EXTENSION);

		let bytes = rmp_serde::to_vec_named(intent)?;

		fs::write(&temp, bytes)
			.await
			.map_err(|e| StoreError::io(&temp, e))?;
		fs::rename(&temp, &path)
			.await
			.map_err(|e| StoreError::io(&path, e))
	}

	async fn remove(&self, id: IntentId) -> Result<(), StoreError> {
		let path = self.entry_path(id);

		match fs::remove_file(&path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StoreError::io(path, e)),
		}
	}

	#[instrument(skip(self), fields(dir = %self.dir.display()))]
	async fn load_all(&self) -> Result<Vec<ChangeIntent>, StoreError> {
		let mut intents = Vec::new();

		for path in self.entry_paths().await? {
			match Self::read_entry(&path).await {
				Ok(intent) => intents.push(intent),
				Err(e @ StoreError::Corrupt { .. }) => {
					warn!(?e, "Skipping corrupt queue entry;");
					Self::quarantine(&path).await;
				}
				Err(e) => return Err(e),
			}
		}

		sort_oldest_first(&mut intents);

		debug!(count = intents.len(), "Loaded persisted queue;");

		Ok(intents)
	}

	async fn clear(&self) -> Result<(), StoreError> {
		for path in self.entry_paths().await? {
			match fs::remove_file(&path).await {
				Ok(()) => {}
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
				Err(e) => return Err(StoreError::io(path, e)),
			}
		}

		Ok(())
	}
}
