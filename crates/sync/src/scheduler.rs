//! Replays the mutation queue against the remote.
//!
//! Drains are strictly sequential: one remote call at a time, in queue order, under a single
//! drain lock. A periodic tick and explicit [`SyncScheduler::sync_now`] calls start drains,
//! connectivity gates them, and interactive submissions may take a fast path that dispatches a
//! single intent right away. Every queue change is written through to the [`QueueStore`] before
//! the queue lock is released, so the store never trails the queue.

use std::{
	mem,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::{
	runtime::Handle,
	sync::{broadcast, watch, Mutex},
	task::JoinHandle,
	time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, instrument, trace, warn};

use super::{
	client::RemoteSyncClient,
	config::SyncConfig,
	error::{RemoteError, StoreError},
	event::{SyncEvent, SyncEventBus},
	intent::{ChangeIntent, IntentDraft, IntentId},
	queue::{EnqueueOutcome, MutationQueue},
	store::QueueStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SchedulerState {
	Idle,
	Ticking,
	Draining,
	Offline,
}

impl SchedulerState {
	#[must_use]
	pub const fn is_syncing(self) -> bool {
		matches!(self, Self::Ticking | Self::Draining)
	}
}

/// Read-only projection for status surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
	pub queue_length: usize,
	pub is_syncing: bool,
	pub is_online: bool,
	pub last_error: Option<String>,
	pub last_sync_at: Option<DateTime<Utc>>,
}

/// An intent that left the queue without being applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedIntent {
	pub intent: ChangeIntent,
	pub attempts: u32,
	pub error: RemoteError,
	pub dropped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
	pub applied: usize,
	pub dropped: usize,
	/// Snapshot entries cancelled or superseded before they were dispatched.
	pub skipped: usize,
	/// Queue length when the pass ended.
	pub remaining: usize,
	/// The pass stopped early because connectivity was lost.
	pub interrupted: bool,
}

impl DrainReport {
	const fn merge(self, next: Self) -> Self {
		Self {
			applied: self.applied + next.applied,
			dropped: self.dropped + next.dropped,
			skipped: self.skipped + next.skipped,
			remaining: next.remaining,
			interrupted: next.interrupted,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FastPath {
	Applied,
	/// Transient failure, the intent waits for the next drain.
	Deferred,
	Dropped,
	/// Disabled, offline, discarded by the queue, or a drain was already running.
	NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
	pub outcome: EnqueueOutcome,
	pub fast_path: FastPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Processed {
	Applied,
	Dropped,
	Skipped,
	Interrupted,
}

#[derive(Debug, Clone, Default)]
struct Progress {
	last_error: Option<String>,
	last_sync_at: Option<DateTime<Utc>>,
}

struct Inner {
	config: SyncConfig,
	queue: Mutex<MutationQueue>,
	client: Arc<dyn RemoteSyncClient>,
	store: Arc<dyn QueueStore>,
	events: SyncEventBus,
	state: watch::Sender<SchedulerState>,
	online: AtomicBool,
	drain_lock: Mutex<()>,
	rerun: AtomicBool,
	progress: Mutex<Progress>,
	dropped: Mutex<Vec<DroppedIntent>>,
	is_running: AtomicBool,
	shutdown_tx: Mutex<Option<broadcast::Sender<()>>>,
}

/// Cheap to clone, all clones drive the same queue.
#[derive(Clone)]
pub struct SyncScheduler {
	inner: Arc<Inner>,
}

impl SyncScheduler {
	pub fn new(
		config: SyncConfig,
		queue: MutationQueue,
		client: Arc<dyn RemoteSyncClient>,
		store: Arc<dyn QueueStore>,
	) -> Self {
		info!(
			tick_interval = ?config.tick_interval(),
			max_attempts = config.max_attempts(),
			retry_delay = ?config.retry_delay(),
			fast_path = config.scheduler.fast_path,
			"Created sync scheduler;"
		);

		let events = SyncEventBus::new(config.event_capacity());
		let (state, _) = watch::channel(SchedulerState::Idle);

		Self {
			inner: Arc::new(Inner {
				config,
				queue: Mutex::new(queue),
				client,
				store,
				events,
				state,
				online: AtomicBool::new(true),
				drain_lock: Mutex::new(()),
				rerun: AtomicBool::new(false),
				progress: Mutex::new(Progress::default()),
				dropped: Mutex::new(Vec::new()),
				is_running: AtomicBool::new(false),
				shutdown_tx: Mutex::new(None),
			}),
		}
	}

	#[must_use]
	pub fn config(&self) -> &SyncConfig {
		&self.inner.config
	}

	/// Loads persisted intents into the queue, purging entries that collapse away. Returns the
	/// queue length afterwards.
	pub async fn restore(&self) -> Result<usize, StoreError> {
		let mut persisted = self.inner.store.load_all().await?;

		let len = {
			let mut queue = self.inner.queue.lock().await;
			persisted.retain(|intent| queue.get(intent.id).is_none());
			for id in queue.restore(persisted) {
				self.forget(id).await;
			}
			queue.len()
		};

		info!(queue_length = len, "Restored sync queue;");

		Ok(len)
	}

	pub async fn enqueue(&self, draft: IntentDraft) -> EnqueueOutcome {
		let mut queue = self.inner.queue.lock().await;
		let outcome = queue.enqueue(draft);

		// new entry first, a crash in between leaves duplicates that restore collapses
		if let Some(intent) = outcome.accepted().and_then(|id| queue.get(id)) {
			self.persist(intent).await;
		}
		for &id in outcome.removed() {
			self.forget(id).await;
		}

		outcome
	}

	/// Enqueues a user-initiated change and, when possible, dispatches it right away. A
	/// transient failure here does not count against the intent's retry budget.
	#[instrument(skip_all)]
	pub async fn submit_interactive(&self, draft: IntentDraft) -> Submission {
		let outcome = self.enqueue(draft).await;

		let fast_path = match outcome.accepted() {
			Some(id) if self.inner.config.scheduler.fast_path && self.is_online() => {
				self.fast_path(id).await
			}
			_ => FastPath::NotAttempted,
		};

		Submission { outcome, fast_path }
	}

	async fn fast_path(&self, id: IntentId) -> FastPath {
		let Ok(guard) = self.inner.drain_lock.try_lock() else {
			self.inner.rerun.store(true, Ordering::SeqCst);
			debug!(intent_id = %id, "Drain in progress, fast path deferred to it;");
			return FastPath::NotAttempted;
		};

		let Some(intent) = self.inner.queue.lock().await.get(id).cloned() else {
			return FastPath::NotAttempted;
		};

		self.set_state(SchedulerState::Draining);

		let result = self.inner.client.apply(&intent).await;

		let fast_path = match result {
			Ok(_) => {
				self.complete(&intent).await;
				FastPath::Applied
			}
			Err(e) if !e.is_transient() => {
				let attempts = intent.retry_count + 1;
				if self.drop_intent(intent, attempts, e).await {
					FastPath::Dropped
				} else {
					FastPath::NotAttempted
				}
			}
			Err(e) => {
				warn!(intent_id = %id, ?e, "Fast path attempt failed, intent stays queued;");
				self.record_error(&e).await;
				FastPath::Deferred
			}
		};

		self.settle_state();
		drop(guard);

		if self.inner.rerun.swap(false, Ordering::SeqCst) {
			self.spawn_trigger(true);
		}

		fast_path
	}

	/// Drains now. When a drain is already running, a follow-up pass is requested from it
	/// instead and `None` is returned; `None` as well when offline.
	#[instrument(skip(self))]
	pub async fn sync_now(&self) -> Option<DrainReport> {
		self.trigger(true).await
	}

	/// A single drain pass, without follow-ups. `None` when offline or already draining.
	pub async fn drain(&self) -> Option<DrainReport> {
		if !self.is_online() {
			debug!("Offline, skipping drain;");
			return None;
		}

		let Ok(_guard) = self.inner.drain_lock.try_lock() else {
			debug!("Drain already running;");
			return None;
		};

		let report = self.drain_pass().await;
		self.settle_state();

		Some(report)
	}

	async fn trigger(&self, request_followup: bool) -> Option<DrainReport> {
		let mut report: Option<DrainReport> = None;

		loop {
			if !self.is_online() {
				debug!("Offline, skipping drain;");
				break;
			}

			let Ok(guard) = self.inner.drain_lock.try_lock() else {
				if request_followup {
					self.inner.rerun.store(true, Ordering::SeqCst);
				}
				debug!("Drain already running;");
				break;
			};

			self.inner.rerun.store(false, Ordering::SeqCst);
			self.set_state(SchedulerState::Ticking);

			let pass = self.drain_pass().await;

			self.settle_state();
			drop(guard);

			report = Some(report.map_or(pass, |report| report.merge(pass)));

			if !self.inner.rerun.load(Ordering::SeqCst) {
				break;
			}
		}

		report
	}

	async fn drain_pass(&self) -> DrainReport {
		self.set_state(SchedulerState::Draining);

		let snapshot = self.inner.queue.lock().await.peek_all();
		let mut report = DrainReport::default();

		debug!(entries = snapshot.len(), "Starting drain;");

		for intent in snapshot {
			if !self.is_online() {
				report.interrupted = true;
				break;
			}

			match self.process(intent.id).await {
				Processed::Applied => report.applied += 1,
				Processed::Dropped => report.dropped += 1,
				Processed::Skipped => report.skipped += 1,
				Processed::Interrupted => {
					report.interrupted = true;
					break;
				}
			}
		}

		report.remaining = self.inner.queue.lock().await.len();

		{
			let mut progress = self.inner.progress.lock().await;
			if !report.interrupted {
				progress.last_sync_at = Some(Utc::now());
				if report.dropped == 0 {
					progress.last_error = None;
				}
			}
		}

		info!(
			applied = report.applied,
			dropped = report.dropped,
			skipped = report.skipped,
			remaining = report.remaining,
			interrupted = report.interrupted,
			"Drain finished;"
		);

		self.inner.events.emit(SyncEvent::DrainFinished {
			applied: report.applied,
			dropped: report.dropped,
			remaining: report.remaining,
		});

		report
	}

	#[instrument(skip_all, fields(intent_id = %id))]
	async fn process(&self, id: IntentId) -> Processed {
		let max_attempts = self.inner.config.max_attempts();

		loop {
			// cancelled or superseded since the snapshot was taken
			let Some(intent) = self.inner.queue.lock().await.get(id).cloned() else {
				debug!("Intent left the queue before dispatch;");
				return Processed::Skipped;
			};

			trace!(
				operation = %intent.operation,
				entity_kind = %intent.entity_kind(),
				entity_id = %intent.entity_id,
				"Dispatching intent;"
			);

			let error = match self.inner.client.apply(&intent).await {
				Ok(_) => {
					self.complete(&intent).await;
					return Processed::Applied;
				}
				Err(e) => e,
			};

			if !error.is_transient() {
				let attempts = intent.retry_count + 1;
				return if self.drop_intent(intent, attempts, error).await {
					Processed::Dropped
				} else {
					Processed::Skipped
				};
			}

			let Some(failed) = self.register_failure(id).await else {
				return Processed::Skipped;
			};
			self.record_error(&error).await;

			let attempt = failed.retry_count;
			if attempt >= max_attempts {
				return if self.drop_intent(failed, attempt, error).await {
					Processed::Dropped
				} else {
					Processed::Skipped
				};
			}

			warn!(attempt, max_attempts, ?error, "Transient sync failure, retrying;");

			self.inner.events.emit(SyncEvent::IntentRetrying {
				id,
				attempt,
				error,
			});

			time::sleep(self.inner.config.retry_delay()).await;

			if !self.is_online() {
				debug!(attempt, "Connectivity lost, intent stays queued;");
				return Processed::Interrupted;
			}
		}
	}

	async fn complete(&self, intent: &ChangeIntent) {
		{
			let mut queue = self.inner.queue.lock().await;
			if queue.dequeue_succeeded(intent.id).is_some() {
				self.forget(intent.id).await;
			}
		}

		debug!(
			intent_id = %intent.id,
			entity_kind = %intent.entity_kind(),
			entity_id = %intent.entity_id,
			"Applied intent;"
		);

		self.inner.events.emit(SyncEvent::IntentApplied {
			id: intent.id,
			entity_kind: intent.entity_kind(),
			entity_id: intent.entity_id,
		});
	}

	async fn register_failure(&self, id: IntentId) -> Option<ChangeIntent> {
		let mut queue = self.inner.queue.lock().await;
		queue.mark_failed(id)?;
		let failed = queue.get(id)?.clone();

		self.persist(&failed).await;

		Some(failed)
	}

	/// Returns `false` when the intent was already gone, superseded while its call was in flight.
	async fn drop_intent(&self, intent: ChangeIntent, attempts: u32, error: RemoteError) -> bool {
		{
			let mut queue = self.inner.queue.lock().await;
			if queue.remove(intent.id).is_none() {
				debug!(intent_id = %intent.id, "Failed intent was superseded, nothing to drop;");
				return false;
			}
			self.forget(intent.id).await;
		}
		self.record_error(&error).await;

		if error.is_transient() {
			warn!(intent_id = %intent.id, attempts, ?error, "Dropping intent after exhausting retries;");
		} else {
			error!(intent_id = %intent.id, attempts, ?error, "Remote rejected intent, dropping it;");
		}

		self.inner.dropped.lock().await.push(DroppedIntent {
			intent: intent.clone(),
			attempts,
			error: error.clone(),
			dropped_at: Utc::now(),
		});

		self.inner.events.emit(SyncEvent::IntentDropped {
			intent,
			attempts,
			error,
		});

		true
	}

	async fn record_error(&self, error: &RemoteError) {
		self.inner.progress.lock().await.last_error = Some(error.to_string());
	}

	async fn persist(&self, intent: &ChangeIntent) {
		if let Err(e) = self.inner.store.put(intent).await {
			warn!(intent_id = %intent.id, ?e, "Failed to persist queued intent;");
		}
	}

	async fn forget(&self, id: IntentId) {
		if let Err(e) = self.inner.store.remove(id).await {
			warn!(intent_id = %id, ?e, "Failed to remove persisted intent;");
		}
	}

	/// Removes an intent that has not been dispatched yet. A call already in flight is not
	/// interrupted.
	pub async fn cancel(&self, id: IntentId) -> Option<ChangeIntent> {
		let mut queue = self.inner.queue.lock().await;
		let removed = queue.remove(id)?;

		self.forget(id).await;
		drop(queue);

		debug!(intent_id = %id, "Cancelled queued intent;");

		Some(removed)
	}

	/// Empties the queue and its persisted copy, e.g. on logout.
	pub async fn clear(&self) {
		let cleared = {
			let mut queue = self.inner.queue.lock().await;
			let len = queue.len();
			queue.clear();

			if let Err(e) = self.inner.store.clear().await {
				warn!(?e, "Failed to clear persisted queue;");
			}

			len
		};

		info!(cleared, "Cleared sync queue;");
	}

	/// Applies a connectivity transition. Coming back online spawns a drain on the current
	/// runtime.
	pub fn set_online(&self, online: bool) {
		if self.inner.online.swap(online, Ordering::SeqCst) == online {
			return;
		}

		if online {
			info!("Connectivity restored;");
			self.set_state(SchedulerState::Idle);
			self.spawn_trigger(true);
		} else {
			info!("Connectivity lost;");
			self.set_state(SchedulerState::Offline);
		}
	}

	fn spawn_trigger(&self, request_followup: bool) {
		let Ok(handle) = Handle::try_current() else {
			warn!("No async runtime to drain on, waiting for the next tick;");
			return;
		};

		let scheduler = self.clone();
		handle.spawn(async move {
			scheduler.trigger(request_followup).await;
		});
	}

	fn set_state(&self, to: SchedulerState) {
		let from = self.inner.state.send_replace(to);

		if from != to {
			debug!(%from, %to, "Sync scheduler state changed;");
			self.inner.events.emit(SyncEvent::StateChanged { from, to });
		}
	}

	fn settle_state(&self) {
		self.set_state(if self.is_online() {
			SchedulerState::Idle
		} else {
			SchedulerState::Offline
		});
	}

	/// Runs the periodic loop until [`shutdown`](Self::shutdown), following `connectivity` for
	/// online/offline transitions. `None` if the loop is already running.
	pub async fn spawn(&self, connectivity: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
		if self.inner.is_running.swap(true, Ordering::SeqCst) {
			warn!("Sync scheduler already running;");
			return None;
		}

		let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
		*self.inner.shutdown_tx.lock().await = Some(shutdown_tx);

		info!("Sync scheduler started;");

		Some(tokio::spawn(self.clone().run(connectivity, shutdown_rx)))
	}

	pub async fn shutdown(&self) {
		if !self.inner.is_running.load(Ordering::SeqCst) {
			return;
		}

		info!("Stopping sync scheduler;");

		if let Some(shutdown_tx) = self.inner.shutdown_tx.lock().await.take() {
			let _ = shutdown_tx.send(());
		}
	}

	async fn run(
		self,
		mut connectivity: watch::Receiver<bool>,
		mut shutdown_rx: broadcast::Receiver<()>,
	) {
		let initial = *connectivity.borrow_and_update();
		self.set_online(initial);

		let mut interval = time::interval(self.inner.config.tick_interval());
		interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

		let mut watching = true;

		loop {
			tokio::select! {
				_ = interval.tick() => {
					trace!("Sync tick;");
					self.spawn_trigger(false);
				}

				changed = connectivity.changed(), if watching => {
					if changed.is_ok() {
						let online = *connectivity.borrow_and_update();
						self.set_online(online);
					} else {
						debug!("Connectivity source closed, keeping last known state;");
						watching = false;
					}
				}

				_ = shutdown_rx.recv() => {
					info!("Sync scheduler shutdown signal received;");
					break;
				}
			}
		}

		self.inner.is_running.store(false, Ordering::SeqCst);
		info!("Sync scheduler stopped;");
	}

	#[must_use]
	pub fn state(&self) -> SchedulerState {
		*self.inner.state.borrow()
	}

	/// Receiver that observes every state change.
	#[must_use]
	pub fn watch_state(&self) -> watch::Receiver<SchedulerState> {
		self.inner.state.subscribe()
	}

	#[must_use]
	pub fn is_online(&self) -> bool {
		self.inner.online.load(Ordering::SeqCst)
	}

	#[must_use]
	pub fn is_running(&self) -> bool {
		self.inner.is_running.load(Ordering::SeqCst)
	}

	pub async fn status(&self) -> SyncStatus {
		let queue_length = self.inner.queue.lock().await.len();
		let Progress {
			last_error,
			last_sync_at,
		} = self.inner.progress.lock().await.clone();

		SyncStatus {
			queue_length,
			is_syncing: self.state().is_syncing(),
			is_online: self.is_online(),
			last_error,
			last_sync_at,
		}
	}

	#[must_use]
	pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
		self.inner.events.subscribe()
	}

	/// Dropped intents reported since the last call.
	pub async fn take_dropped(&self) -> Vec<DroppedIntent> {
		mem::take(&mut *self.inner.dropped.lock().await)
	}

	/// Snapshot of the queue in dispatch order.
	pub async fn pending(&self) -> Vec<ChangeIntent> {
		self.inner.queue.lock().await.peek_all()
	}
}
