#![allow(dead_code)]

use tally_sync::{
	Ack, ChangeIntent, EntityKind, IntentId, MemoryStore, MutationQueue, Payload, QueueStore,
	RemoteError, RemoteSyncClient, StoreError, SyncConfig, SyncEvent, SyncScheduler,
	TrackedItemFields,
};

use std::{
	collections::{HashMap, VecDeque},
	sync::{Arc, Mutex},
	time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::broadcast, time};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
	Upsert { entity_id: Uuid, payload: Payload },
	Delete { kind: EntityKind, entity_id: Uuid },
}

impl Call {
	pub const fn entity_id(&self) -> Uuid {
		match self {
			Self::Upsert { entity_id, .. } | Self::Delete { entity_id, .. } => *entity_id,
		}
	}
}

/// Records every call and answers from a script: queued one-off failures first, then
/// per-entity failures, otherwise success.
#[derive(Debug, Default)]
pub struct MockClient {
	calls: Mutex<Vec<Call>>,
	scripted: Mutex<VecDeque<RemoteError>>,
	failing: Mutex<HashMap<Uuid, RemoteError>>,
	latency: Mutex<Option<Duration>>,
}

impl MockClient {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn fail_next(&self, error: RemoteError) {
		self.scripted.lock().unwrap().push_back(error);
	}

	pub fn fail_entity(&self, entity_id: Uuid, error: RemoteError) {
		self.failing.lock().unwrap().insert(entity_id, error);
	}

	pub fn set_latency(&self, latency: Duration) {
		*self.latency.lock().unwrap() = Some(latency);
	}

	pub fn calls(&self) -> Vec<Call> {
		self.calls.lock().unwrap().clone()
	}

	pub fn called_entities(&self) -> Vec<Uuid> {
		self.calls().iter().map(Call::entity_id).collect()
	}

	async fn answer(&self, call: Call) -> Result<Ack, RemoteError> {
		let latency = *self.latency.lock().unwrap();
		if let Some(latency) = latency {
			time::sleep(latency).await;
		}

		let entity_id = call.entity_id();
		self.calls.lock().unwrap().push(call);

		if let Some(error) = self.scripted.lock().unwrap().pop_front() {
			return Err(error);
		}

		if let Some(error) = self.failing.lock().unwrap().get(&entity_id) {
			return Err(error.clone());
		}

		Ok(Ack { version: Some(1) })
	}
}

#[async_trait]
impl RemoteSyncClient for MockClient {
	async fn upsert(&self, entity_id: Uuid, payload: &Payload) -> Result<Ack, RemoteError> {
		self.answer(Call::Upsert {
			entity_id,
			payload: payload.clone(),
		})
		.await
	}

	async fn delete(&self, kind: EntityKind, entity_id: Uuid) -> Result<Ack, RemoteError> {
		self.answer(Call::Delete { kind, entity_id }).await
	}
}

/// Memory store whose writes take `put_delay` to land.
#[derive(Debug, Default)]
pub struct SlowStore {
	inner: MemoryStore,
	put_delay: Duration,
}

impl SlowStore {
	pub fn new(put_delay: Duration) -> Arc<Self> {
		Arc::new(Self {
			inner: MemoryStore::new(),
			put_delay,
		})
	}
}

#[async_trait]
impl QueueStore for SlowStore {
	async fn put(&self, intent: &ChangeIntent) -> Result<(), StoreError> {
		time::sleep(self.put_delay).await;
		self.inner.put(intent).await
	}

	async fn remove(&self, id: IntentId) -> Result<(), StoreError> {
		self.inner.remove(id).await
	}

	async fn load_all(&self) -> Result<Vec<ChangeIntent>, StoreError> {
		self.inner.load_all().await
	}

	async fn clear(&self) -> Result<(), StoreError> {
		self.inner.clear().await
	}
}

pub fn item(name: &str) -> Payload {
	Payload::TrackedItem(TrackedItemFields {
		name: Some(name.to_string()),
		..Default::default()
	})
}

pub fn scheduler(config: SyncConfig, client: Arc<MockClient>) -> SyncScheduler {
	scheduler_with_store(config, client, Arc::new(MemoryStore::new()))
}

pub fn scheduler_with_store(
	config: SyncConfig,
	client: Arc<MockClient>,
	store: Arc<dyn QueueStore>,
) -> SyncScheduler {
	SyncScheduler::new(config, MutationQueue::new(), client, store)
}

/// Waits for the first event matching `predicate`, failing the test if none shows up.
pub async fn wait_for(
	events: &mut broadcast::Receiver<SyncEvent>,
	predicate: impl Fn(&SyncEvent) -> bool,
) -> SyncEvent {
	time::timeout(Duration::from_secs(60), async {
		loop {
			let event = events.recv().await.unwrap();
			if predicate(&event) {
				return event;
			}
		}
	})
	.await
	.unwrap()
}

pub async fn drain_finished(events: &mut broadcast::Receiver<SyncEvent>) -> SyncEvent {
	wait_for(events, |event| matches!(event, SyncEvent::DrainFinished { .. })).await
}
