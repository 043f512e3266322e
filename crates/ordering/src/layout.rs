use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::Rank;

/// Non-content layout items. Declaration order is removal priority: when two different
/// separators end up adjacent, the earlier variant is the one that goes.
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
pub enum SeparatorKind {
	Spacer,
	Divider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "style", rename_all = "snake_case")]
pub enum ItemKind {
	Content,
	Separator(SeparatorKind),
}

impl ItemKind {
	#[must_use]
	pub const fn is_separator(self) -> bool {
		matches!(self, Self::Separator(_))
	}
}

/// An entry of a drag-reorderable list: a tracked content item or a separator between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutItem {
	pub id: Uuid,
	pub kind: ItemKind,
	pub rank: Rank,
	pub hidden: bool,
	pub archived: bool,
	/// Soft deletion; the item keeps its rank so it can be restored in place.
	pub deleted_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
}

impl LayoutItem {
	#[must_use]
	pub fn new(kind: ItemKind, rank: Rank) -> Self {
		Self {
			id: Uuid::now_v7(),
			kind,
			rank,
			hidden: false,
			archived: false,
			deleted_at: None,
			created_at: Utc::now(),
		}
	}

	#[must_use]
	pub fn content(rank: Rank) -> Self {
		Self::new(ItemKind::Content, rank)
	}

	#[must_use]
	pub fn separator(kind: SeparatorKind, rank: Rank) -> Self {
		Self::new(ItemKind::Separator(kind), rank)
	}

	#[must_use]
	pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
		self.created_at = created_at;
		self
	}

	#[must_use]
	pub const fn is_separator(&self) -> bool {
		self.kind.is_separator()
	}

	/// Whether the item takes part in the visible, rank-sorted sequence.
	#[must_use]
	pub const fn is_active(&self) -> bool {
		!self.hidden && !self.archived && self.deleted_at.is_none()
	}
}
