#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

//! Offline-first replay of local mutations.
//!
//! Local changes are recorded as [`ChangeIntent`]s in a [`MutationQueue`], which collapses
//! redundant work before anything touches the network. A [`SyncScheduler`] replays the queue
//! against a [`RemoteSyncClient`] in order, gated by connectivity, with a fixed retry budget per
//! intent and durable write-through to a [`QueueStore`]. The [`SeedingReconciler`] backfills ranks
//! for records that predate them.

mod client;
mod config;
mod error;
mod event;
mod intent;
mod queue;
mod scheduler;
mod seeding;
mod store;

pub use client::{Ack, RemoteSyncClient};
pub use config::{EventConfig, RetryConfig, SchedulerConfig, SyncConfig};
pub use error::{ConfigError, RemoteError, SeedError, StoreError};
pub use event::{SyncEvent, SyncEventBus};
pub use intent::{
	ChangeIntent, EntityKind, IdempotencyKey, IntentDraft, IntentId, OperationKind, Payload,
	RecordFields, SeparatorFields, TrackedItemFields, UserFields,
};
pub use queue::{collapse, Collapse, EnqueueOutcome, MutationQueue};
pub use scheduler::{
	DrainReport, DroppedIntent, FastPath, SchedulerState, Submission, SyncScheduler, SyncStatus,
};
pub use seeding::{RankedRecord, SeedReport, SeededRank, SeedingReconciler};
pub use store::{FileStore, MemoryStore, QueueStore};

pub use tally_ordering as ordering;
