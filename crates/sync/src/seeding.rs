//! One-shot backfill of ranks for records created before ranks existed, so the allocator always
//! works against fully ranked lists.

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

use serde::{Deserialize, Serialize};
use tally_ordering::{rank, Rank, ValidationError};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
	client::RemoteSyncClient,
	error::SeedError,
	intent::{EntityKind, Payload},
};

/// A record as currently displayed, possibly without a rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedRecord {
	pub entity_id: Uuid,
	pub kind: EntityKind,
	pub rank: Option<Rank>,
}

impl RankedRecord {
	#[must_use]
	pub const fn new(entity_id: Uuid, kind: EntityKind, rank: Option<Rank>) -> Self {
		Self {
			entity_id,
			kind,
			rank,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededRank {
	pub entity_id: Uuid,
	pub kind: EntityKind,
	pub rank: Rank,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
	pub assigned: usize,
	pub failed: Vec<Uuid>,
	/// Records that already had a rank.
	pub skipped: usize,
}

pub struct SeedingReconciler {
	client: Arc<dyn RemoteSyncClient>,
	completed: AtomicBool,
}

impl SeedingReconciler {
	pub fn new(client: Arc<dyn RemoteSyncClient>) -> Self {
		Self {
			client,
			completed: AtomicBool::new(false),
		}
	}

	#[must_use]
	pub fn is_complete(&self) -> bool {
		self.completed.load(Ordering::SeqCst)
	}

	/// Ranks for every unranked record in `records`, which must be in display order. Existing
	/// ranks are kept and must already ascend; each run of unranked records is spread between
	/// its ranked neighbours.
	pub fn plan(records: &[RankedRecord]) -> Result<Vec<SeededRank>, SeedError> {
		fn flush(
			lower: Option<&Rank>,
			upper: Option<&Rank>,
			pending: &mut Vec<&RankedRecord>,
			planned: &mut Vec<SeededRank>,
		) -> Result<(), ValidationError> {
			if pending.is_empty() {
				return Ok(());
			}

			let ranks = rank::spread(lower, upper, pending.len())?;
			planned.extend(pending.drain(..).zip(ranks).map(|(record, rank)| SeededRank {
				entity_id: record.entity_id,
				kind: record.kind,
				rank,
			}));

			Ok(())
		}

		let mut planned = Vec::new();
		let mut pending = Vec::new();
		let mut lower: Option<&Rank> = None;

		for record in records {
			match &record.rank {
				None if !record.kind.is_ranked() => {
					return Err(SeedError::Unrankable(record.kind));
				}
				None => pending.push(record),
				Some(current) => {
					if let Some(previous) = lower.filter(|previous| *previous >= current) {
						return Err(ValidationError::BoundsOutOfOrder {
							lower: previous.clone(),
							upper: current.clone(),
						}
						.into());
					}

					flush(lower, Some(current), &mut pending, &mut planned)?;
					lower = Some(current);
				}
			}
		}

		flush(lower, None, &mut pending, &mut planned)?;

		Ok(planned)
	}

	/// Pushes planned ranks to the remote. Marks the reconciler complete only if every write
	/// succeeded; once complete, further calls do nothing.
	#[instrument(skip_all, fields(records = records.len()))]
	pub async fn reconcile(&self, records: &[RankedRecord]) -> Result<SeedReport, SeedError> {
		if self.is_complete() {
			debug!("Rank seeding already complete;");
			return Ok(SeedReport::default());
		}

		let planned = Self::plan(records)?;

		let mut report = SeedReport {
			skipped: records.len() - planned.len(),
			..Default::default()
		};

		for SeededRank {
			entity_id,
			kind,
			rank,
		} in planned
		{
			let payload = Payload::with_rank(kind, rank).ok_or(SeedError::Unrankable(kind))?;

			match self.client.upsert(entity_id, &payload).await {
				Ok(_) => report.assigned += 1,
				Err(e) => {
					warn!(%entity_id, %kind, ?e, "Failed to seed rank;");
					report.failed.push(entity_id);
				}
			}
		}

		if report.failed.is_empty() {
			self.completed.store(true, Ordering::SeqCst);
			info!(
				assigned = report.assigned,
				skipped = report.skipped,
				"Rank seeding complete;"
			);
		} else {
			warn!(
				assigned = report.assigned,
				failed = report.failed.len(),
				"Rank seeding incomplete, will run again;"
			);
		}

		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;

	fn record(rank: Option<&str>) -> RankedRecord {
		RankedRecord::new(
			Uuid::new_v4(),
			EntityKind::TrackedItem,
			rank.map(|rank| Rank::parse(rank).unwrap()),
		)
	}

	fn assert_ascending(records: &[RankedRecord], planned: &[SeededRank]) {
		let ranks = records
			.iter()
			.map(|record| {
				record.rank.clone().unwrap_or_else(|| {
					planned
						.iter()
						.find(|seeded| seeded.entity_id == record.entity_id)
						.unwrap()
						.rank
						.clone()
				})
			})
			.collect::<Vec<_>>();

		assert!(ranks.windows(2).all(|pair| pair[0] < pair[1]), "{ranks:?}");
	}

	#[test]
	fn fills_gaps_between_existing_ranks() {
		let records = vec![
			record(None),
			record(Some("5")),
			record(None),
			record(None),
			record(Some("7")),
			record(None),
		];

		let planned = SeedingReconciler::plan(&records).unwrap();

		assert_eq!(planned.len(), 4);
		assert_ascending(&records, &planned);
	}

	#[test]
	fn fully_unranked_list_is_spread_over_the_whole_space() {
		let records = (0..20).map(|_| record(None)).collect::<Vec<_>>();

		let planned = SeedingReconciler::plan(&records).unwrap();

		assert_eq!(planned.len(), 20);
		assert_ascending(&records, &planned);
	}

	#[test]
	fn ranked_lists_plan_nothing() {
		let records = vec![record(Some("1")), record(Some("V")), record(Some("x"))];

		assert!(SeedingReconciler::plan(&records).unwrap().is_empty());
	}

	#[test]
	fn rejects_records_without_rank_support() {
		let records = vec![RankedRecord::new(Uuid::new_v4(), EntityKind::User, None)];

		assert!(matches!(
			SeedingReconciler::plan(&records),
			Err(SeedError::Unrankable(EntityKind::User))
		));
	}

	#[test]
	fn rejects_descending_existing_ranks() {
		let records = vec![record(Some("7")), record(None), record(Some("5"))];

		assert!(matches!(
			SeedingReconciler::plan(&records),
			Err(SeedError::Validation(ValidationError::BoundsOutOfOrder { .. }))
		));
	}
}
