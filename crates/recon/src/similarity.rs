//! Token-set similarity on canonical keys.
//!
//! Scores are integers in `0..=100`. Each partial ratio is
//! `100 * (lensum - indel) / lensum`, truncated, so `score >= t` holds exactly
//! when the underlying ratio is `>= t` for an integer threshold `t`.

use std::collections::BTreeSet;

/// Order-insensitive similarity that scores 100 when one key's tokens are a
/// subset of the other's (and the intersection is non-empty).
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0;
    }

    let intersect: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let diff_ab: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let diff_ba: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !intersect.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100;
    }

    // BTreeSet iteration is sorted, so the joins are the sorted token strings.
    let sect = intersect.join(" ");
    let ab = diff_ab.join(" ");
    let ba = diff_ba.join(" ");

    let sect_len = sect.len();
    let sep = usize::from(sect_len != 0);
    let sect_ab_len = sect_len + sep + ab.len();
    let sect_ba_len = sect_len + sep + ba.len();

    // "<sect> <ab>" vs "<sect> <ba>": the shared prefix costs nothing.
    let mut best = ratio_from_distance(indel_distance(&ab, &ba), sect_ab_len + sect_ba_len);
    if sect_len == 0 {
        return best;
    }

    // "<sect>" vs "<sect> <ab>": only the appended part differs.
    best = best.max(ratio_from_distance(sep + ab.len(), sect_len + sect_ab_len));
    best = best.max(ratio_from_distance(sep + ba.len(), sect_len + sect_ba_len));
    best
}

/// Plain normalized indel similarity of two strings, `0..=100`.
pub fn ratio(a: &str, b: &str) -> u8 {
    let lensum = a.chars().count() + b.chars().count();
    if lensum == 0 {
        return 100;
    }
    ratio_from_distance(indel_distance(a, b), lensum)
}

fn ratio_from_distance(dist: usize, lensum: usize) -> u8 {
    if lensum == 0 {
        return 0;
    }
    let similar = lensum.saturating_sub(dist);
    // similar <= lensum, so the quotient is at most 100
    (similar * 100 / lensum) as u8
}

/// Insertions + deletions needed to turn `a` into `b`: `|a| + |b| - 2*LCS`.
pub fn indel_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    a.len() + b.len() - 2 * lcs_len(&a, &b)
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    // Single rolling row over the shorter string.
    let (outer, inner) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut row = vec![0usize; inner.len() + 1];
    for &oc in outer {
        let mut diag = 0;
        for (j, &ic) in inner.iter().enumerate() {
            let up = row[j + 1];
            row[j + 1] = if oc == ic { diag + 1 } else { up.max(row[j]) };
            diag = up;
        }
    }
    row[inner.len()]
}
