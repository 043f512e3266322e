//! Lexicographic order keys.
//!
//! A [`Rank`] is a string over the 62 ASCII alphanumerics. Byte order of the alphabet matches
//! its digit order, so comparing two ranks as plain strings reproduces list order. New keys are
//! always computed from their neighbours; existing keys are never rewritten.

use std::{cmp::Ordering, collections::BTreeSet, fmt, ops::Bound, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::ValidationError;

pub const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const BASE: u8 = 62;
const MAX: u8 = BASE - 1;
/// `'V'`, the key handed out for an empty list and appended when two bounds leave no room.
const MID: u8 = BASE / 2;

/// An ordering key.
///
/// Invariants: non-empty, only alphabet symbols, never ends with `'0'`. The last one guarantees
/// there is always room below any rank.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rank(String);

impl Rank {
	pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
		let value = value.into();

		if value.is_empty() {
			return Err(ValidationError::Empty);
		}

		if let Some(symbol) = value.chars().find(|c| !c.is_ascii_alphanumeric()) {
			return Err(ValidationError::InvalidSymbol {
				rank: value,
				symbol,
			});
		}

		if value.ends_with('0') {
			return Err(ValidationError::TrailingMinimum { rank: value });
		}

		Ok(Self(value))
	}

	/// The key of the first item ever placed in an empty list.
	#[must_use]
	pub fn midpoint() -> Self {
		Self::from_digits(&[MID])
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}

	fn digits(&self) -> Vec<u8> {
		self.0.bytes().map(value_of).collect()
	}

	fn from_digits(digits: &[u8]) -> Self {
		Self(
			digits
				.iter()
				.map(|&digit| char::from(ALPHABET[usize::from(digit)]))
				.collect(),
		)
	}
}

impl fmt::Display for Rank {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for Rank {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl TryFrom<String> for Rank {
	type Error = ValidationError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(value)
	}
}

impl From<Rank> for String {
	fn from(rank: Rank) -> Self {
		rank.0
	}
}

impl AsRef<str> for Rank {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

const fn value_of(symbol: u8) -> u8 {
	match symbol {
		b'0'..=b'9' => symbol - b'0',
		b'A'..=b'Z' => symbol - b'A' + 10,
		_ => symbol - b'a' + 36,
	}
}

/// Shortest digit string strictly between `lower` and `upper`, where a missing lower digit reads
/// as the minimum symbol and a missing `upper` is the open upper bound.
///
/// Callers guarantee `lower < upper`.
fn midpoint(lower: &[u8], upper: Option<&[u8]>) -> Vec<u8> {
	if let Some(upper) = upper {
		let shared = upper
			.iter()
			.enumerate()
			.take_while(|&(i, &digit)| lower.get(i).copied().unwrap_or(0) == digit)
			.count();

		if shared > 0 {
			let mut key = upper[..shared].to_vec();
			key.extend(midpoint(
				lower.get(shared..).unwrap_or_default(),
				Some(&upper[shared..]),
			));
			return key;
		}
	}

	let low = lower.first().copied().unwrap_or(0);
	let high = upper.map_or(BASE, |upper| upper.first().copied().unwrap_or(BASE));

	if high.saturating_sub(low) > 1 {
		return vec![(low + high) / 2];
	}

	// Adjacent symbols. A longer upper bound still leaves room right at its first symbol.
	if let Some(upper) = upper.filter(|upper| upper.len() > 1) {
		return vec![upper[0]];
	}

	let mut key = vec![low];
	key.extend(midpoint(lower.get(1..).unwrap_or_default(), None));
	key
}

fn bisect(lower: Option<&Rank>, upper: Option<&Rank>) -> Rank {
	let low = lower.map(Rank::digits).unwrap_or_default();
	let high = upper.map(Rank::digits);

	Rank::from_digits(&midpoint(&low, high.as_deref()))
}

fn check_bounds(lower: Option<&Rank>, upper: Option<&Rank>) -> Result<(), ValidationError> {
	match (lower, upper) {
		(Some(lower), Some(upper)) if lower >= upper => Err(ValidationError::BoundsOutOfOrder {
			lower: lower.clone(),
			upper: upper.clone(),
		}),
		_ => Ok(()),
	}
}

/// Returns a key sorting strictly between `lower` and `upper`; `None` is the open bound on
/// either side. With both bounds open the result is always [`Rank::midpoint`].
pub fn between(lower: Option<&Rank>, upper: Option<&Rank>) -> Result<Rank, ValidationError> {
	check_bounds(lower, upper)?;

	let rank = bisect(lower, upper);

	trace!(?lower, ?upper, %rank, "Computed rank between bounds;");

	Ok(rank)
}

/// A key sorting before `upper`: its last symbol decremented, extended by the midpoint symbol
/// when the decrement reaches the minimum.
#[must_use]
pub fn before(upper: &Rank) -> Rank {
	let mut digits = upper.digits();

	if let Some(last) = digits.last_mut() {
		// never the minimum symbol, see `Rank`
		*last -= 1;

		if *last == 0 {
			digits.push(MID);
		}
	}

	Rank::from_digits(&digits)
}

/// A key sorting after `lower`: the rightmost non-maximal symbol incremented with everything
/// past it dropped, or `lower` extended by the midpoint symbol when every symbol is maximal.
#[must_use]
pub fn after(lower: &Rank) -> Rank {
	let mut digits = lower.digits();

	match digits.iter().rposition(|&digit| digit < MAX) {
		Some(pos) => {
			digits.truncate(pos + 1);
			digits[pos] += 1;
		}
		None => digits.push(MID),
	}

	Rank::from_digits(&digits)
}

/// Lexicographic comparison where a missing rank sorts lowest.
#[must_use]
pub fn compare(a: Option<&Rank>, b: Option<&Rank>) -> Ordering {
	a.map_or("", Rank::as_str).cmp(b.map_or("", Rank::as_str))
}

/// Returns `desired` if it is free, otherwise a fresh key placed right after it among `existing`.
#[must_use]
pub fn resolve_conflict(desired: &Rank, existing: &BTreeSet<Rank>) -> Rank {
	if !existing.contains(desired) {
		return desired.clone();
	}

	let resolved = existing
		.range((Bound::Excluded(desired), Bound::Unbounded))
		.next()
		.map_or_else(
			|| after(desired),
			|next| bisect(Some(desired), Some(next)),
		);

	trace!(%desired, %resolved, "Resolved rank conflict;");

	resolved
}

/// `count` ascending keys strictly between `lower` and `upper`, placed by repeated bisection so
/// key length grows with the logarithm of `count`.
pub fn spread(
	lower: Option<&Rank>,
	upper: Option<&Rank>,
	count: usize,
) -> Result<Vec<Rank>, ValidationError> {
	fn fill(lower: Option<&Rank>, upper: Option<&Rank>, count: usize, out: &mut Vec<Rank>) {
		if count == 0 {
			return;
		}

		let mid = bisect(lower, upper);
		let left = (count - 1) / 2;

		fill(lower, Some(&mid), left, out);
		out.push(mid.clone());
		fill(Some(&mid), upper, count - 1 - left, out);
	}

	check_bounds(lower, upper)?;

	let mut ranks = Vec::with_capacity(count);
	fill(lower, upper, count, &mut ranks);

	Ok(ranks)
}

#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;
	use proptest::prelude::*;

	fn rank(value: &str) -> Rank {
		Rank::parse(value).unwrap()
	}

	#[test]
	fn open_bounds_yield_midpoint() {
		assert_eq!(between(None, None).unwrap(), rank("V"));
		assert_eq!(between(None, None).unwrap(), between(None, None).unwrap());
	}

	#[test]
	fn picks_single_symbol_when_there_is_room() {
		assert_eq!(between(Some(&rank("5")), Some(&rank("7"))).unwrap(), rank("6"));
		assert_eq!(between(Some(&rank("A")), None).unwrap(), rank("a"));
		assert_eq!(between(None, Some(&rank("V"))).unwrap(), rank("F"));
	}

	#[test]
	fn extends_length_between_adjacent_symbols() {
		let key = between(Some(&rank("5")), Some(&rank("6"))).unwrap();

		assert_eq!(key, rank("5V"));
		assert!(rank("5") < key && key < rank("6"));
	}

	#[test]
	fn uses_longer_upper_bound_prefix() {
		assert_eq!(between(Some(&rank("5")), Some(&rank("6V"))).unwrap(), rank("6"));
		assert_eq!(between(Some(&rank("5")), Some(&rank("50V"))).unwrap(), rank("50F"));
	}

	#[test]
	fn rejects_unordered_bounds() {
		assert!(matches!(
			between(Some(&rank("7")), Some(&rank("5"))),
			Err(ValidationError::BoundsOutOfOrder { .. })
		));
		assert!(matches!(
			between(Some(&rank("7")), Some(&rank("7"))),
			Err(ValidationError::BoundsOutOfOrder { .. })
		));
	}

	#[test]
	fn parse_rejects_malformed_keys() {
		assert_eq!(Rank::parse(""), Err(ValidationError::Empty));
		assert!(matches!(
			Rank::parse("a-b"),
			Err(ValidationError::InvalidSymbol { symbol: '-', .. })
		));
		assert!(matches!(
			Rank::parse("50"),
			Err(ValidationError::TrailingMinimum { .. })
		));
	}

	#[test]
	fn before_and_after_step_symbols() {
		assert_eq!(before(&rank("6")), rank("5"));
		assert_eq!(before(&rank("1")), rank("0V"));
		assert_eq!(before(&rank("5V")), rank("5U"));

		assert_eq!(after(&rank("5")), rank("6"));
		assert_eq!(after(&rank("5z")), rank("6"));
		assert_eq!(after(&rank("zz")), rank("zzV"));
	}

	#[test]
	fn compare_treats_missing_as_lowest() {
		assert_eq!(compare(None, Some(&rank("0V"))), Ordering::Less);
		assert_eq!(compare(None, None), Ordering::Equal);
		assert_eq!(compare(Some(&rank("b")), Some(&rank("B"))), Ordering::Greater);
	}

	#[test]
	fn resolve_conflict_finds_free_slot() {
		let existing = BTreeSet::from([rank("5"), rank("6"), rank("9")]);

		assert_eq!(resolve_conflict(&rank("7"), &existing), rank("7"));
		assert_eq!(resolve_conflict(&rank("5"), &existing), rank("5V"));
		assert_eq!(resolve_conflict(&rank("6"), &existing), rank("7"));
		assert_eq!(resolve_conflict(&rank("9"), &existing), rank("A"));
	}

	#[test]
	fn spread_is_ascending_and_bounded() {
		let lower = rank("1");
		let upper = rank("2");
		let ranks = spread(Some(&lower), Some(&upper), 100).unwrap();

		assert_eq!(ranks.len(), 100);
		assert!(ranks.windows(2).all(|pair| pair[0] < pair[1]));
		assert!(ranks.iter().all(|r| &lower < r && r < &upper));
		assert!(ranks.iter().all(|r| r.as_str().len() <= 4));
	}

	#[test]
	fn serde_round_trips_as_plain_string() {
		let json = serde_json::to_string(&rank("aZ")).unwrap();
		assert_eq!(json, "\"aZ\"");
		assert!(serde_json::from_str::<Rank>("\"a0\"").is_err());
	}

	fn arb_rank() -> impl Strategy<Value = Rank> {
		"[0-9A-Za-z]{0,6}[1-9A-Za-z]".prop_map(|s| Rank::parse(s).unwrap())
	}

	proptest! {
		#[test]
		fn between_is_strictly_inside(a in arb_rank(), b in arb_rank()) {
			prop_assume!(a != b);
			let (lower, upper) = if a < b { (a, b) } else { (b, a) };

			let key = between(Some(&lower), Some(&upper)).unwrap();

			prop_assert!(lower < key, "{lower} < {key}");
			prop_assert!(key < upper, "{key} < {upper}");
			prop_assert!(Rank::parse(key.as_str()).is_ok());
		}

		#[test]
		fn open_sided_keys_respect_their_bound(a in arb_rank()) {
			prop_assert!(before(&a) < a);
			prop_assert!(after(&a) > a);
			prop_assert!(between(None, Some(&a)).unwrap() < a);
			prop_assert!(between(Some(&a), None).unwrap() > a);
		}

		#[test]
		fn resolved_rank_is_never_taken(
			existing in prop::collection::btree_set(arb_rank(), 0..32),
			desired in arb_rank(),
		) {
			let resolved = resolve_conflict(&desired, &existing);
			prop_assert!(!existing.contains(&resolved));
		}
	}
}
