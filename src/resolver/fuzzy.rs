//! Rapidfuzz-style similarity scorers on a 0-100 scale, built on the
//! Levenshtein primitive from `strsim`.

use std::collections::BTreeSet;

/// Plain normalized edit-distance ratio.
pub fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b) * 100.0
}

/// Ratio over whitespace tokens sorted alphabetically, so word order does
/// not matter ("Milan AC" vs "AC Milan" -> 100).
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

/// Ratio over token intersection/difference combinations; a name that is
/// a token-subset of another scores 100.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 100.0;
    }

    let intersection: Vec<&str> = set_a.intersection(&set_b).copied().collect();
    let diff_ab: Vec<&str> = set_a.difference(&set_b).copied().collect();
    let diff_ba: Vec<&str> = set_b.difference(&set_a).copied().collect();

    let t0 = intersection.join(" ");
    let t1 = join_nonempty(&t0, &diff_ab.join(" "));
    let t2 = join_nonempty(&t0, &diff_ba.join(" "));

    ratio(&t0, &t1).max(ratio(&t0, &t2)).max(ratio(&t1, &t2))
}

/// Best ratio of the shorter string against every same-length window of
/// the longer one; high when one name is contained in the other.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let long_chars: Vec<char> = longer.chars().collect();
    let window = shorter.chars().count();

    let mut best = 0.0f64;
    for start in 0..=(long_chars.len() - window) {
        let slice: String = long_chars[start..start + window].iter().collect();
        let score = ratio(shorter, &slice);
        if score > best {
            best = score;
        }
        if best >= 100.0 {
            break;
        }
    }
    best
}

/// Best-scoring candidate at or above `cutoff`, as (index, score).
pub fn extract_one<'a, I>(
    query: &str,
    candidates: I,
    scorer: fn(&str, &str) -> f64,
    cutoff: f64,
) -> Option<(usize, f64)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in candidates.into_iter().enumerate() {
        let score = scorer(query, candidate);
        if score < cutoff {
            continue;
        }
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((idx, score));
        }
    }
    best
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn join_nonempty(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{} {}", a, b),
    }
}
