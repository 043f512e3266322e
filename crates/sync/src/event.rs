//! Broadcast of scheduler activity for status surfaces and for callers that need to know about
//! dropped intents.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
	error::RemoteError,
	intent::{ChangeIntent, EntityKind, IntentId},
	scheduler::SchedulerState,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
	StateChanged {
		from: SchedulerState,
		to: SchedulerState,
	},

	IntentApplied {
		id: IntentId,
		entity_kind: EntityKind,
		entity_id: Uuid,
	},

	/// A transient failure, the intent stays queued.
	IntentRetrying {
		id: IntentId,
		attempt: u32,
		error: RemoteError,
	},

	/// The intent left the queue without being applied. Carries everything needed to re-issue
	/// the underlying user action.
	IntentDropped {
		intent: ChangeIntent,
		attempts: u32,
		error: RemoteError,
	},

	DrainFinished {
		applied: usize,
		dropped: usize,
		remaining: usize,
	},
}

impl SyncEvent {
	#[must_use]
	pub const fn event_type(&self) -> &'static str {
		match self {
			Self::StateChanged { .. } => "StateChanged",
			Self::IntentApplied { .. } => "IntentApplied",
			Self::IntentRetrying { .. } => "IntentRetrying",
			Self::IntentDropped { .. } => "IntentDropped",
			Self::DrainFinished { .. } => "DrainFinished",
		}
	}

	/// Events whose loss means a user action silently disappears.
	#[must_use]
	pub const fn is_critical(&self) -> bool {
		matches!(self, Self::IntentDropped { .. })
	}
}

#[derive(Debug, Clone)]
pub struct SyncEventBus {
	sender: broadcast::Sender<SyncEvent>,
}

impl SyncEventBus {
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		debug!(capacity, "Created sync event bus;");
		Self { sender }
	}

	/// Returns how many subscribers received the event.
	pub fn emit(&self, event: SyncEvent) -> usize {
		let event_type = event.event_type();
		let critical = event.is_critical();

		if let Ok(count) = self.sender.send(event) {
			debug!(event_type, subscribers = count, "Sync event emitted;");
			count
		} else {
			if critical {
				warn!(event_type, "Critical sync event emitted without subscribers;");
			} else {
				debug!(event_type, "Sync event emitted without subscribers;");
			}
			0
		}
	}

	#[must_use]
	pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
		self.sender.subscribe()
	}

	#[must_use]
	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;
	use tracing_test::traced_test;

	#[test]
	#[traced_test]
	fn emitting_without_subscribers() {
		let bus = SyncEventBus::new(8);

		let count = bus.emit(SyncEvent::DrainFinished {
			applied: 0,
			dropped: 0,
			remaining: 0,
		});

		assert_eq!(count, 0);
		assert!(!logs_contain("Critical sync event"));
	}

	#[tokio::test]
	async fn subscribers_receive_events_in_order() {
		let bus = SyncEventBus::new(8);
		let mut first = bus.subscribe();
		let mut second = bus.subscribe();
		assert_eq!(bus.subscriber_count(), 2);

		let applied = SyncEvent::IntentApplied {
			id: Uuid::now_v7(),
			entity_kind: EntityKind::Record,
			entity_id: Uuid::new_v4(),
		};
		let finished = SyncEvent::DrainFinished {
			applied: 1,
			dropped: 0,
			remaining: 0,
		};

		assert_eq!(bus.emit(applied.clone()), 2);
		assert_eq!(bus.emit(finished.clone()), 2);

		for receiver in [&mut first, &mut second] {
			assert_eq!(receiver.recv().await.unwrap(), applied);
			assert_eq!(receiver.recv().await.unwrap(), finished);
		}
	}

	#[test]
	fn serializes_with_type_tag() {
		let event = SyncEvent::StateChanged {
			from: SchedulerState::Idle,
			to: SchedulerState::Offline,
		};

		let json = serde_json::to_value(&event).unwrap();
		assert_eq!(
			json,
			serde_json::json!({ "type": "state_changed", "from": "idle", "to": "offline" })
		);
	}
}
