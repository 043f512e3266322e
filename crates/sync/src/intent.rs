//! Change intents: queued descriptions of local mutations awaiting remote application.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tally_ordering::{Rank, SeparatorKind};
use uuid::Uuid;

pub type IntentId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
	Create,
	Update,
	Delete,
}

#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Hash,
	Serialize,
	Deserialize,
	Display,
	EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
	TrackedItem,
	Record,
	LayoutSeparator,
	User,
}

impl EntityKind {
	/// Kinds that live in drag-reorderable lists and carry a rank.
	#[must_use]
	pub const fn is_ranked(self) -> bool {
		matches!(self, Self::TrackedItem | Self::LayoutSeparator)
	}
}

// Payload fields are partial: `None` leaves the remote column untouched on upsert.

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItemFields {
	pub name: Option<String>,
	pub rank: Option<Rank>,
	pub hidden: Option<bool>,
	pub archived: Option<bool>,
	pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFields {
	pub item_id: Option<Uuid>,
	pub value: Option<serde_json::Value>,
	pub recorded_at: Option<DateTime<Utc>>,
	pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeparatorFields {
	pub style: Option<SeparatorKind>,
	pub rank: Option<Rank>,
	pub hidden: Option<bool>,
	pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserFields {
	pub display_name: Option<String>,
	pub preferences: Option<serde_json::Value>,
}

impl TrackedItemFields {
	fn merge(&mut self, older: Self) {
		self.name = self.name.take().or(older.name);
		self.rank = self.rank.take().or(older.rank);
		self.hidden = self.hidden.or(older.hidden);
		self.archived = self.archived.or(older.archived);
		self.deleted_at = self.deleted_at.or(older.deleted_at);
	}
}

impl RecordFields {
	fn merge(&mut self, older: Self) {
		self.item_id = self.item_id.or(older.item_id);
		self.value = self.value.take().or(older.value);
		self.recorded_at = self.recorded_at.or(older.recorded_at);
		self.note = self.note.take().or(older.note);
	}
}

impl SeparatorFields {
	fn merge(&mut self, older: Self) {
		self.style = self.style.or(older.style);
		self.rank = self.rank.take().or(older.rank);
		self.hidden = self.hidden.or(older.hidden);
		self.deleted_at = self.deleted_at.or(older.deleted_at);
	}
}

impl UserFields {
	fn merge(&mut self, older: Self) {
		self.display_name = self.display_name.take().or(older.display_name);
		self.preferences = self.preferences.take().or(older.preferences);
	}
}

/// Operation data, one variant per [`EntityKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "fields", rename_all = "snake_case")]
pub enum Payload {
	TrackedItem(TrackedItemFields),
	Record(RecordFields),
	LayoutSeparator(SeparatorFields),
	User(UserFields),
}

impl Payload {
	#[must_use]
	pub const fn entity_kind(&self) -> EntityKind {
		match self {
			Self::TrackedItem(_) => EntityKind::TrackedItem,
			Self::Record(_) => EntityKind::Record,
			Self::LayoutSeparator(_) => EntityKind::LayoutSeparator,
			Self::User(_) => EntityKind::User,
		}
	}

	/// Payload without any field set, carried by deletes.
	#[must_use]
	pub fn empty(kind: EntityKind) -> Self {
		match kind {
			EntityKind::TrackedItem => Self::TrackedItem(TrackedItemFields::default()),
			EntityKind::Record => Self::Record(RecordFields::default()),
			EntityKind::LayoutSeparator => Self::LayoutSeparator(SeparatorFields::default()),
			EntityKind::User => Self::User(UserFields::default()),
		}
	}

	/// A payload that only moves the entity, for kinds that live in ordered lists.
	#[must_use]
	pub fn with_rank(kind: EntityKind, rank: Rank) -> Option<Self> {
		match kind {
			EntityKind::TrackedItem => Some(Self::TrackedItem(TrackedItemFields {
				rank: Some(rank),
				..Default::default()
			})),
			EntityKind::LayoutSeparator => Some(Self::LayoutSeparator(SeparatorFields {
				rank: Some(rank),
				..Default::default()
			})),
			EntityKind::Record | EntityKind::User => None,
		}
	}

	/// Fills every field left unset here from `older`. Payloads of different kinds are left as
	/// they are.
	pub fn merge(&mut self, older: Self) {
		match (self, older) {
			(Self::TrackedItem(fields), Self::TrackedItem(older)) => fields.merge(older),
			(Self::Record(fields), Self::Record(older)) => fields.merge(older),
			(Self::LayoutSeparator(fields), Self::LayoutSeparator(older)) => fields.merge(older),
			(Self::User(fields), Self::User(older)) => fields.merge(older),
			_ => {}
		}
	}

	#[must_use]
	pub const fn rank(&self) -> Option<&Rank> {
		match self {
			Self::TrackedItem(fields) => fields.rank.as_ref(),
			Self::LayoutSeparator(fields) => fields.rank.as_ref(),
			Self::Record(_) | Self::User(_) => None,
		}
	}
}

/// Caller-supplied identity of semantically equivalent intents; only the latest one survives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
	#[must_use]
	pub fn new(key: impl Into<String>) -> Self {
		Self(key.into())
	}

	/// Key shared by every reorder of one entity, so rapid drags collapse into a single call.
	#[must_use]
	pub fn reorder(kind: EntityKind, entity_id: Uuid) -> Self {
		Self(format!("reorder:{kind}:{entity_id}"))
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for IdempotencyKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// What a caller hands to the queue; identity, timestamps and retry bookkeeping are assigned on
/// enqueue.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentDraft {
	pub operation: OperationKind,
	pub entity_id: Uuid,
	pub payload: Payload,
	pub idempotency_key: Option<IdempotencyKey>,
}

impl IntentDraft {
	#[must_use]
	pub const fn create(entity_id: Uuid, payload: Payload) -> Self {
		Self {
			operation: OperationKind::Create,
			entity_id,
			payload,
			idempotency_key: None,
		}
	}

	#[must_use]
	pub const fn update(entity_id: Uuid, payload: Payload) -> Self {
		Self {
			operation: OperationKind::Update,
			entity_id,
			payload,
			idempotency_key: None,
		}
	}

	#[must_use]
	pub fn delete(kind: EntityKind, entity_id: Uuid) -> Self {
		Self {
			operation: OperationKind::Delete,
			entity_id,
			payload: Payload::empty(kind),
			idempotency_key: None,
		}
	}

	/// A rank-only update keyed by [`IdempotencyKey::reorder`]. `None` for kinds without a rank.
	#[must_use]
	pub fn reorder(kind: EntityKind, entity_id: Uuid, rank: Rank) -> Option<Self> {
		Payload::with_rank(kind, rank).map(|payload| {
			Self::update(entity_id, payload)
				.with_idempotency_key(IdempotencyKey::reorder(kind, entity_id))
		})
	}

	#[must_use]
	pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
		self.idempotency_key = Some(key);
		self
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeIntent {
	pub id: IntentId,
	pub operation: OperationKind,
	pub entity_id: Uuid,
	pub payload: Payload,
	/// When this queue position was first taken. A replacement keeps the timestamp of the intent
	/// it supersedes.
	pub created_at: DateTime<Utc>,
	pub retry_count: u32,
	pub idempotency_key: Option<IdempotencyKey>,
}

impl ChangeIntent {
	pub(crate) fn from_draft(draft: IntentDraft) -> Self {
		let IntentDraft {
			operation,
			entity_id,
			payload,
			idempotency_key,
		} = draft;

		Self {
			id: Uuid::now_v7(),
			operation,
			entity_id,
			payload,
			created_at: Utc::now(),
			retry_count: 0,
			idempotency_key,
		}
	}

	#[must_use]
	pub const fn entity_kind(&self) -> EntityKind {
		self.payload.entity_kind()
	}

	#[must_use]
	pub const fn entity(&self) -> (EntityKind, Uuid) {
		(self.entity_kind(), self.entity_id)
	}

	#[must_use]
	pub const fn is_keyed(&self) -> bool {
		self.idempotency_key.is_some()
	}
}
