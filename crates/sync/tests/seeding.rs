use tally_sync::{
	ordering::Rank, EntityKind, Payload, RankedRecord, RemoteError, SeedingReconciler,
};

use pretty_assertions::assert_eq;
use tracing_test::traced_test;
use uuid::Uuid;

mod common;

use common::{Call, MockClient};

fn records(ranks: &[Option<&str>]) -> Vec<RankedRecord> {
	ranks
		.iter()
		.map(|rank| {
			RankedRecord::new(
				Uuid::new_v4(),
				EntityKind::TrackedItem,
				rank.map(|rank| Rank::parse(rank).unwrap()),
			)
		})
		.collect()
}

#[tokio::test]
#[traced_test]
async fn seeds_missing_ranks_once() {
	let client = MockClient::new();
	let reconciler = SeedingReconciler::new(client.clone());
	let records = records(&[None, Some("5"), None, Some("7")]);

	let report = reconciler.reconcile(&records).await.unwrap();

	assert_eq!(report.assigned, 2);
	assert_eq!(report.skipped, 2);
	assert!(report.failed.is_empty());
	assert!(reconciler.is_complete());
	assert!(logs_contain("Rank seeding complete;"));

	let seeded = client
		.calls()
		.into_iter()
		.map(|call| match call {
			Call::Upsert {
				entity_id,
				payload: Payload::TrackedItem(fields),
			} => (entity_id, fields.rank.unwrap()),
			other => panic!("unexpected call: {other:?}"),
		})
		.collect::<Vec<_>>();

	assert_eq!(seeded.len(), 2);
	assert_eq!(seeded[0].0, records[0].entity_id);
	assert!(seeded[0].1 < Rank::parse("5").unwrap());
	assert_eq!(seeded[1].0, records[2].entity_id);
	assert!(seeded[1].1 > Rank::parse("5").unwrap());
	assert!(seeded[1].1 < Rank::parse("7").unwrap());

	let again = reconciler.reconcile(&records).await.unwrap();
	assert_eq!(again.assigned, 0);
	assert_eq!(client.calls().len(), 2);
}

#[tokio::test]
async fn incomplete_runs_are_repeated() {
	let client = MockClient::new();
	let reconciler = SeedingReconciler::new(client.clone());
	let records = records(&[None, None]);

	client.fail_entity(records[1].entity_id, RemoteError::Timeout);

	let report = reconciler.reconcile(&records).await.unwrap();

	assert_eq!(report.assigned, 1);
	assert_eq!(report.failed, vec![records[1].entity_id]);
	assert!(!reconciler.is_complete());

	let second = reconciler.reconcile(&records).await.unwrap();
	assert_eq!(second.failed.len(), 1);
	assert_eq!(client.calls().len(), 4);
}

#[tokio::test]
async fn already_ranked_data_needs_no_writes() {
	let client = MockClient::new();
	let reconciler = SeedingReconciler::new(client.clone());

	let report = reconciler
		.reconcile(&records(&[Some("1"), Some("2"), Some("3")]))
		.await
		.unwrap();

	assert_eq!(report.assigned, 0);
	assert_eq!(report.skipped, 3);
	assert!(reconciler.is_complete());
	assert!(client.calls().is_empty());
}
