//! Placement rules for mixed layouts of content items and separators.
//!
//! Rules apply over the rank-sorted sequence of active items (see [`LayoutItem::is_active`]):
//! no separator first or last, no two separators adjacent, and never more separators than
//! `content - 1`. Everything here is pure; [`repair`] returns a new list.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;
use uuid::Uuid;

use crate::{rank, ItemKind, LayoutItem, Rank, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Violation {
	LeadingSeparator { id: Uuid },
	TrailingSeparator { id: Uuid },
	AdjacentSeparators { first: Uuid, second: Uuid },
	TooManySeparators { separators: usize, allowed: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
	pub violations: Vec<Violation>,
}

impl Validation {
	#[must_use]
	pub fn is_valid(&self) -> bool {
		self.violations.is_empty()
	}
}

/// What happens to the items a repair decides against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RepairMode {
	/// Losing items are removed from the returned list.
	Delete,
	/// Losing items stay but are marked hidden, for read-only projections of shared data.
	Hide,
}

/// Active items in rank order.
pub fn arrange(items: &[LayoutItem]) -> Result<Vec<&LayoutItem>, ValidationError> {
	let mut sequence = items
		.iter()
		.filter(|item| item.is_active())
		.collect::<Vec<_>>();

	sequence.sort_by(|a, b| a.rank.cmp(&b.rank));

	if let Some(pair) = sequence.windows(2).find(|pair| pair[0].rank == pair[1].rank) {
		return Err(ValidationError::DuplicateRank {
			rank: pair[0].rank.clone(),
		});
	}

	Ok(sequence)
}

fn slots(sequence: &[&LayoutItem]) -> Vec<(Uuid, ItemKind)> {
	sequence.iter().map(|item| (item.id, item.kind)).collect()
}

fn check(sequence: &[(Uuid, ItemKind)]) -> Vec<Violation> {
	let mut violations = Vec::new();

	if let Some(&(id, kind)) = sequence.first() {
		if kind.is_separator() {
			violations.push(Violation::LeadingSeparator { id });
		}
	}

	if let Some(&(id, kind)) = sequence.last() {
		if kind.is_separator() {
			violations.push(Violation::TrailingSeparator { id });
		}
	}

	violations.extend(
		sequence
			.windows(2)
			.filter(|pair| pair[0].1.is_separator() && pair[1].1.is_separator())
			.map(|pair| Violation::AdjacentSeparators {
				first: pair[0].0,
				second: pair[1].0,
			}),
	);

	let separators = sequence
		.iter()
		.filter(|(_, kind)| kind.is_separator())
		.count();
	let allowed = (sequence.len() - separators).saturating_sub(1);

	if separators > allowed {
		violations.push(Violation::TooManySeparators {
			separators,
			allowed,
		});
	}

	violations
}

pub fn validate(items: &[LayoutItem]) -> Result<Validation, ValidationError> {
	let sequence = arrange(items)?;

	Ok(Validation {
		violations: check(&slots(&sequence)),
	})
}

/// Decides which of two adjacent separators goes: a spacer before a divider, otherwise the more
/// recently created one, and the first of the pair when both were created at the same instant.
fn evicts_first(first: &LayoutItem, second: &LayoutItem) -> bool {
	match (first.kind, second.kind) {
		(ItemKind::Separator(a), ItemKind::Separator(b)) if a != b => a < b,
		_ => first.created_at >= second.created_at,
	}
}

/// Deterministically fixes every violation. Items outside the active sequence pass through
/// untouched and the input order is preserved, so `repair` is idempotent.
pub fn repair(items: &[LayoutItem], mode: RepairMode) -> Result<Vec<LayoutItem>, ValidationError> {
	let mut sequence = arrange(items)?;
	let mut losers = HashSet::new();

	while sequence.first().is_some_and(|item| item.is_separator()) {
		losers.insert(sequence.remove(0).id);
	}

	while sequence.last().is_some_and(|item| item.is_separator()) {
		if let Some(item) = sequence.pop() {
			losers.insert(item.id);
		}
	}

	let mut pos = 0;
	while pos + 1 < sequence.len() {
		let (first, second) = (sequence[pos], sequence[pos + 1]);

		if first.is_separator() && second.is_separator() {
			let loser = if evicts_first(first, second) {
				pos
			} else {
				pos + 1
			};
			losers.insert(sequence.remove(loser).id);
		} else {
			pos += 1;
		}
	}

	let separators = sequence
		.iter()
		.filter(|item| item.is_separator())
		.collect::<Vec<_>>();
	let allowed = (sequence.len() - separators.len()).saturating_sub(1);
	losers.extend(separators.iter().skip(allowed).map(|item| item.id));

	if !losers.is_empty() {
		debug!(%mode, affected = losers.len(), "Repaired layout;");
	}

	Ok(match mode {
		RepairMode::Delete => items
			.iter()
			.filter(|item| !losers.contains(&item.id))
			.cloned()
			.collect(),
		RepairMode::Hide => items
			.iter()
			.cloned()
			.map(|mut item| {
				if losers.contains(&item.id) {
					item.hidden = true;
				}
				item
			})
			.collect(),
	})
}

/// First interior index where an item of `kind` could be inserted without breaking any rule.
///
/// The index counts positions in the active items sorted by rank, not in `items`: hidden,
/// archived and soft-deleted items are skipped and the slice order is ignored. Pass it to
/// [`rank_for_insert`] with the same `items` to get the rank for that slot. The first and last
/// positions are never offered.
pub fn first_valid_insert_position(
	items: &[LayoutItem],
	kind: ItemKind,
) -> Result<Option<usize>, ValidationError> {
	let sequence = slots(&arrange(items)?);

	Ok((1..sequence.len()).find(|&index| {
		let mut candidate = sequence.clone();
		candidate.insert(index, (Uuid::nil(), kind));
		check(&candidate).is_empty()
	}))
}

/// Rank for an item inserted at `index` of the active sequence. Ranks still held by hidden,
/// archived or soft-deleted items are never handed out again.
pub fn rank_for_insert(items: &[LayoutItem], index: usize) -> Result<Rank, ValidationError> {
	let sequence = arrange(items)?;

	let lower = index
		.checked_sub(1)
		.and_then(|i| sequence.get(i))
		.map(|item| &item.rank);
	let upper = sequence.get(index).map(|item| &item.rank);

	let candidate = rank::between(lower, upper)?;
	let taken = items
		.iter()
		.map(|item| item.rank.clone())
		.collect::<BTreeSet<_>>();

	Ok(rank::resolve_conflict(&candidate, &taken))
}
