use thiserror::Error;

use super::Rank;

/// Caller invariant breaches detected while computing or checking an ordering.
///
/// These are programmer errors: they are returned synchronously and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
	#[error("rank bounds out of order <lower='{lower}', upper='{upper}'>")]
	BoundsOutOfOrder { lower: Rank, upper: Rank },
	#[error("rank must not be empty")]
	Empty,
	#[error("invalid rank symbol <rank='{rank}', symbol={symbol:?}>")]
	InvalidSymbol { rank: String, symbol: char },
	#[error("rank must not end with the minimum symbol <rank='{rank}'>")]
	TrailingMinimum { rank: String },
	#[error("two active items share a rank <rank='{rank}'>")]
	DuplicateRank { rank: Rank },
}
