//! Pending change intents with insertion-time collapsing.
//!
//! Per entity the queue holds at most one unkeyed intent; what happens to a new one is decided by
//! [`collapse`]. Intents carrying an [`IdempotencyKey`](crate::IdempotencyKey) replace the queued
//! intent with the same key and are otherwise left alone by the table, except by deletes: a
//! delete clears everything queued for its entity, and nothing keyed is accepted after it.

use std::mem;

use strum::Display;
use tracing::trace;
use uuid::Uuid;

use super::intent::{ChangeIntent, EntityKind, IntentDraft, IntentId, OperationKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Collapse {
	/// No conflicting intent, the new one goes to the back of the queue.
	Append,
	/// The new intent takes the queue position of the one it supersedes.
	Replace,
	/// The queued intent wins and the new one is discarded.
	Keep,
}

/// Priority table for a new intent against the queued one for the same entity.
#[must_use]
pub const fn collapse(new: OperationKind, existing: Option<OperationKind>) -> Collapse {
	use OperationKind::{Create, Delete, Update};

	match (new, existing) {
		(_, None) => Collapse::Append,
		(Create, Some(Create)) | (Update, Some(Create | Update)) | (Delete, Some(_)) => {
			Collapse::Replace
		}
		(Create, Some(Update | Delete)) | (Update, Some(Delete)) => Collapse::Keep,
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
	Appended { id: IntentId },
	Replaced { id: IntentId, superseded: Vec<IntentId> },
	Discarded { kept: IntentId },
}

impl EnqueueOutcome {
	/// Id of the new intent if it made it into the queue.
	#[must_use]
	pub const fn accepted(&self) -> Option<IntentId> {
		match self {
			Self::Appended { id } | Self::Replaced { id, .. } => Some(*id),
			Self::Discarded { .. } => None,
		}
	}

	/// Ids no longer in the queue because of this enqueue.
	#[must_use]
	pub fn removed(&self) -> &[IntentId] {
		match self {
			Self::Replaced { superseded, .. } => superseded,
			Self::Appended { .. } | Self::Discarded { .. } => &[],
		}
	}
}

/// FIFO of pending intents. Purely in memory, durability is the caller's concern.
#[derive(Debug, Default)]
pub struct MutationQueue {
	intents: Vec<ChangeIntent>,
}

impl MutationQueue {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn enqueue(&mut self, draft: IntentDraft) -> EnqueueOutcome {
		self.insert(ChangeIntent::from_draft(draft))
	}

	/// Rebuilds the queue from persisted intents, oldest first, keeping their ids and retry
	/// counts. Returns the ids that collapsed away and should be purged from storage.
	pub fn restore(&mut self, mut intents: Vec<ChangeIntent>) -> Vec<IntentId> {
		intents.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

		let mut purged = Vec::new();
		for intent in intents {
			let id = intent.id;
			match self.insert(intent) {
				EnqueueOutcome::Appended { .. } => {}
				EnqueueOutcome::Replaced { superseded, .. } => purged.extend(superseded),
				EnqueueOutcome::Discarded { .. } => purged.push(id),
			}
		}

		purged
	}

	fn insert(&mut self, intent: ChangeIntent) -> EnqueueOutcome {
		let id = intent.id;

		let (kind, entity_id) = intent.entity();
		let same_entity = self
			.intents
			.iter()
			.enumerate()
			.filter(|(_, queued)| queued.entity() == (kind, entity_id))
			.map(|(pos, _)| pos)
			.collect::<Vec<_>>();

		if intent.operation == OperationKind::Delete {
			return self.insert_delete(intent, &same_entity);
		}

		if let Some(key) = &intent.idempotency_key {
			if let Some(&pos) = same_entity
				.iter()
				.find(|&&pos| self.intents[pos].operation == OperationKind::Delete)
			{
				trace!(%id, kept = %self.intents[pos].id, "Discarded keyed intent for deleted entity;");
				return EnqueueOutcome::Discarded {
					kept: self.intents[pos].id,
				};
			}

			if let Some(pos) = self
				.intents
				.iter()
				.position(|queued| queued.idempotency_key.as_ref() == Some(key))
			{
				let superseded = self.supersede(pos, intent);
				trace!(%id, %superseded, "Replaced intent sharing idempotency key;");
				return EnqueueOutcome::Replaced {
					id,
					superseded: vec![superseded],
				};
			}

			self.intents.push(intent);
			return EnqueueOutcome::Appended { id };
		}

		let existing = same_entity
			.iter()
			.copied()
			.find(|&pos| !self.intents[pos].is_keyed());

		let decision = collapse(
			intent.operation,
			existing.map(|pos| self.intents[pos].operation),
		);

		trace!(%id, operation = %intent.operation, %kind, %entity_id, %decision, "Collapsing intent;");

		match (decision, existing) {
			(Collapse::Replace, Some(pos)) => {
				let superseded = self.supersede(pos, intent);
				EnqueueOutcome::Replaced {
					id,
					superseded: vec![superseded],
				}
			}
			(Collapse::Keep, Some(pos)) => EnqueueOutcome::Discarded {
				kept: self.intents[pos].id,
			},
			_ => {
				self.intents.push(intent);
				EnqueueOutcome::Appended { id }
			}
		}
	}

	fn insert_delete(&mut self, intent: ChangeIntent, same_entity: &[usize]) -> EnqueueOutcome {
		let id = intent.id;

		let Some((&first, rest)) = same_entity.split_first() else {
			self.intents.push(intent);
			return EnqueueOutcome::Appended { id };
		};

		// back to front so earlier positions stay valid
		let mut superseded = rest
			.iter()
			.rev()
			.map(|&pos| self.intents.remove(pos).id)
			.collect::<Vec<_>>();
		superseded.push(self.supersede(first, intent));
		superseded.reverse();

		trace!(%id, superseded = superseded.len(), "Delete superseded queued intents;");

		EnqueueOutcome::Replaced { id, superseded }
	}

	/// Puts `intent` at `pos`, inheriting the queue position's timestamp so that ordering by
	/// `created_at` reproduces queue order after a restore. Between non-deletes the superseded
	/// payload is merged underneath the new one, as payloads only carry the fields that changed.
	fn supersede(&mut self, pos: usize, mut intent: ChangeIntent) -> IntentId {
		intent.created_at = self.intents[pos].created_at;
		let superseded = mem::replace(&mut self.intents[pos], intent);

		let current = &mut self.intents[pos];
		if current.operation != OperationKind::Delete
			&& superseded.operation != OperationKind::Delete
		{
			current.payload.merge(superseded.payload);
		}

		superseded.id
	}

	/// Removes an intent after its remote application was confirmed.
	pub fn dequeue_succeeded(&mut self, id: IntentId) -> Option<ChangeIntent> {
		self.remove(id)
	}

	/// Bumps the retry count, returning the new value. `None` if the intent is gone, e.g. it was
	/// superseded while its remote call was in flight.
	pub fn mark_failed(&mut self, id: IntentId) -> Option<u32> {
		self.intents
			.iter_mut()
			.find(|intent| intent.id == id)
			.map(|intent| {
				intent.retry_count += 1;
				intent.retry_count
			})
	}

	pub fn remove(&mut self, id: IntentId) -> Option<ChangeIntent> {
		self.intents
			.iter()
			.position(|intent| intent.id == id)
			.map(|pos| self.intents.remove(pos))
	}

	/// Snapshot in insertion order.
	#[must_use]
	pub fn peek_all(&self) -> Vec<ChangeIntent> {
		self.intents.clone()
	}

	#[must_use]
	pub fn get(&self, id: IntentId) -> Option<&ChangeIntent> {
		self.intents.iter().find(|intent| intent.id == id)
	}

	pub fn pending_for(
		&self,
		kind: EntityKind,
		entity_id: Uuid,
	) -> impl Iterator<Item = &ChangeIntent> + '_ {
		self.intents
			.iter()
			.filter(move |intent| intent.entity() == (kind, entity_id))
	}

	pub fn clear(&mut self) {
		self.intents.clear();
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.intents.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.intents.is_empty()
	}
}
