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

//! Ordering primitives for drag-reorderable lists.
//!
//! - [`rank`]: lexicographic order keys that never require renumbering neighbours
//! - [`validator`]: placement rules for mixed content/separator layouts and their auto-repair

mod error;
mod layout;

pub mod rank;
pub mod validator;

pub use error::ValidationError;
pub use layout::{ItemKind, LayoutItem, SeparatorKind};
pub use rank::Rank;
pub use validator::{RepairMode, Validation, Violation};
