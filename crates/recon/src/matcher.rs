use std::collections::BTreeMap;

use tracing::trace;

use crate::blocking::BlockingIndex;
use crate::config::BlockingConfig;
use crate::model::MatchResult;
use crate::similarity::{ratio, token_set_ratio};

/// Best-match-per-left search over a blocked right-hand key set.
///
/// Each left key is scored independently against its bucket (or every right
/// key when the bucket is absent). Among equal token-set scores a candidate
/// whose canonical key equals the left key wins, then the higher plain ratio,
/// then the lowest right index.
pub struct Matcher<'a> {
    right_keys: &'a [String],
    index: BlockingIndex,
    threshold: u8,
}

impl<'a> Matcher<'a> {
    pub fn new(right_keys: &'a [String], blocking: &BlockingConfig, threshold: u8) -> Self {
        Self {
            right_keys,
            index: BlockingIndex::build(right_keys, blocking),
            threshold,
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Best candidate for one left key. Below-threshold bests are reported
    /// as unmatched with score 0.
    pub fn best_match(&self, left: usize, key: &str) -> MatchResult {
        let candidates = self.index.candidates(key);
        if candidates.is_fallback() {
            trace!(left, key, "block empty on right side; scanning all candidates");
        }
        select_best(left, key, candidates.indices(), self.right_keys, self.threshold)
    }

    pub fn match_all<S: AsRef<str>>(&self, left_keys: &[S]) -> Vec<MatchResult> {
        left_keys
            .iter()
            .enumerate()
            .map(|(i, k)| self.best_match(i, k.as_ref()))
            .collect()
    }
}

/// Unblocked reference search over every right key.
pub fn full_scan_match(left: usize, key: &str, right_keys: &[String], threshold: u8) -> MatchResult {
    if key.is_empty() {
        return MatchResult::unmatched(left);
    }
    let all: Vec<usize> = (0..right_keys.len())
        .filter(|&i| !right_keys[i].is_empty())
        .collect();
    select_best(left, key, &all, right_keys, threshold)
}

/// Candidate ranking. Field order is the comparison order: token-set score,
/// then exact canonical equality, then plain ratio. Equal ranks fall back to
/// candidate order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Rank {
    score: u8,
    exact: bool,
    ratio: u8,
}

impl Rank {
    fn of(key: &str, candidate: &str) -> Self {
        let exact = key == candidate;
        Self {
            score: token_set_ratio(key, candidate),
            exact,
            ratio: if exact { 100 } else { ratio(key, candidate) },
        }
    }
}

fn select_best(
    left: usize,
    key: &str,
    candidates: &[usize],
    right_keys: &[String],
    threshold: u8,
) -> MatchResult {
    let mut best: Option<(usize, Rank)> = None;
    for &ri in candidates {
        let rank = Rank::of(key, &right_keys[ri]);
        // strict: the earlier candidate keeps a tie
        if best.map_or(true, |(_, b)| rank > b) {
            best = Some((ri, rank));
            if rank.exact {
                break;
            }
        }
    }

    match best {
        Some((ri, rank)) if rank.score >= threshold => MatchResult {
            left,
            right: Some(ri),
            score: rank.score,
        },
        _ => MatchResult::unmatched(left),
    }
}

/// Pair keys by exact equality; the first right occurrence wins.
/// Empty keys never match.
pub fn match_exact<S: AsRef<str>, T: AsRef<str>>(left_keys: &[S], right_keys: &[T]) -> Vec<MatchResult> {
    let mut first: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, k) in right_keys.iter().enumerate() {
        let k = k.as_ref();
        if !k.is_empty() {
            first.entry(k).or_insert(i);
        }
    }

    left_keys
        .iter()
        .enumerate()
        .map(|(li, k)| match first.get(k.as_ref()) {
            Some(&ri) => MatchResult {
                left: li,
                right: Some(ri),
                score: 100,
            },
            None => MatchResult::unmatched(li),
        })
        .collect()
}
