//! Delimiter detection.
//!
//! Works on a sample of up to ten non-blank lines starting at the
//! header. Multi-character candidates are checked first with an exact
//! column-count test; single-character candidates are then scored by
//! column-count consistency, with ties broken by a fixed priority order.

/// Multi-character candidates, tried before any single character.
const MULTI_CHAR_CANDIDATES: [&str; 2] = ["||", ";;"];

/// Single-character candidates in priority order.
const SINGLE_CHAR_CANDIDATES: [char; 6] = [';', ',', '\t', '|', ':', ' '];

/// Maximum number of sample lines considered.
pub const MAX_SAMPLE_LINES: usize = 10;

/// Detect the field delimiter from sample lines.
///
/// Returns `None` when no candidate splits every sample line into at
/// least two columns; callers treat that as a structural failure.
pub fn detect_delimiter(samples: &[String]) -> Option<String> {
    if samples.is_empty() {
        return None;
    }

    for candidate in MULTI_CHAR_CANDIDATES {
        let mut counts = samples.iter().map(|line| line.split(candidate).count());
        if let Some(first) = counts.next() {
            if first > 1 && counts.all(|c| c == first) {
                return Some(candidate.to_string());
            }
        }
    }

    let mut best: Option<(f64, char)> = None;
    for candidate in SINGLE_CHAR_CANDIDATES {
        let counts: Vec<usize> = samples
            .iter()
            .map(|line| line.split(candidate).map(str::trim).count())
            .collect();

        if counts.iter().any(|&c| c < 2) {
            continue;
        }

        let score = 1.0 / (1.0 + variance(&counts));
        // Strict comparison keeps the earlier (higher-priority) candidate
        // on ties.
        if best.map(|(s, _)| score > s).unwrap_or(true) {
            best = Some((score, candidate));
        }
    }

    best.map(|(_, c)| c.to_string())
}

fn variance(counts: &[usize]) -> f64 {
    let n = counts.len() as f64;
    let mean = counts.iter().sum::<usize>() as f64 / n;
    counts
        .iter()
        .map(|&c| {
            let d = c as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n
}
