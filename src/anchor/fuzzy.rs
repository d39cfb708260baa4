//! Whitespace-insensitive matching of an approximate text block against
//! file content.
//!
//! Deterministic and free of I/O. Lines are normalized by dropping all
//! whitespace and unifying quote characters, blank lines are ignored, and
//! windows of non-blank lines are scored with normalized Levenshtein
//! similarity. Windows are scored best-first by a cheap character and
//! bigram bound, so only the few that can win are ever compared in full.

use crate::cancel::CancellationToken;
use crate::config::AnchorConfig;
use crate::index::model::Span;
use std::cmp::Ordering;
use std::collections::HashMap;
use strsim::normalized_levenshtein;

/// Approximate text to locate, with optional surrounding lines used only to
/// break ties.
#[derive(Debug, Clone, Copy)]
pub struct AnchorQuery<'a> {
    pub text: &'a str,
    pub context_before: Option<&'a str>,
    pub context_after: Option<&'a str>,
}

impl<'a> AnchorQuery<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            context_before: None,
            context_after: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// First line start to last line end, terminator excluded
    pub span: Span,
    pub score: f64,
    /// Positions in the non-blank line list
    first: usize,
    last: usize,
}

impl Candidate {
    fn overlaps(&self, other: &Candidate) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FuzzyOutcome {
    Found(Candidate),
    Ambiguous { score: f64, candidates: Vec<Span> },
    NotFound { best_score: f64 },
    Cancelled,
}

/// Strip whitespace and unify `'` and `` ` `` to `"`. Case is kept.
pub fn normalize_line(line: &str) -> String {
    line.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '\'' | '`' => '"',
            other => other,
        })
        .collect()
}

/// Normalized, non-blank lines of `text`.
pub fn normalize_block(text: &str) -> Vec<String> {
    text.lines()
        .map(normalize_line)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Similarity in [0, 1] between two normalized blocks.
pub fn similarity(a: &[String], b: &[String]) -> f64 {
    normalized_levenshtein(&a.join("\n"), &b.join("\n"))
}

struct Line {
    start: usize,
    end: usize,
    normalized: String,
}

fn lines_of(content: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut start = 0;
    for raw in content.split_inclusive('\n') {
        let body = raw
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(raw);
        lines.push(Line {
            start,
            end: start + body.len(),
            normalized: normalize_line(body),
        });
        start += raw.len();
    }
    lines
}

/// Window sizes tried for an anchor of `n` non-blank lines.
pub fn window_sizes(n: usize, tolerance: f64) -> (usize, usize) {
    let n_f = n as f64;
    let min = ((n_f * (1.0 - tolerance)) + 1e-9).floor().max(1.0) as usize;
    let max = ((n_f * (1.0 + tolerance)) - 1e-9).ceil().max(1.0) as usize;
    (min, max.max(min))
}

/// Symbols of the needle mapped to dense slots. Symbols the needle never
/// uses get no slot and can never be shared.
#[derive(Default)]
struct Alphabet {
    chars: HashMap<char, usize>,
    pairs: HashMap<(char, char), usize>,
}

/// Slots of one normalized line, one entry per occurrence.
struct Profile {
    len: usize,
    chars: Vec<usize>,
    pairs: Vec<usize>,
}

impl Alphabet {
    fn learn(needle: &[String]) -> Self {
        let mut alphabet = Self::default();
        for line in needle {
            let chars: Vec<char> = line.chars().collect();
            for &c in &chars {
                let next = alphabet.chars.len();
                alphabet.chars.entry(c).or_insert(next);
            }
            for pair in chars.windows(2) {
                let next = alphabet.pairs.len();
                alphabet.pairs.entry((pair[0], pair[1])).or_insert(next);
            }
        }
        alphabet
    }

    fn profile(&self, line: &str) -> Profile {
        let chars: Vec<char> = line.chars().collect();
        Profile {
            len: chars.len(),
            chars: chars.iter().filter_map(|c| self.chars.get(c).copied()).collect(),
            pairs: chars
                .windows(2)
                .filter_map(|p| self.pairs.get(&(p[0], p[1])).copied())
                .collect(),
        }
    }
}

/// Multiset intersection size between the needle and a growing window.
struct Bag {
    needle: Vec<usize>,
    window: Vec<usize>,
    common: usize,
}

impl Bag {
    fn new(size: usize, needle: impl Iterator<Item = usize>) -> Self {
        let mut counts = vec![0; size];
        for slot in needle {
            counts[slot] += 1;
        }
        Self {
            needle: counts,
            window: vec![0; size],
            common: 0,
        }
    }

    fn clear(&mut self) {
        self.window.fill(0);
        self.common = 0;
    }

    fn add(&mut self, slots: &[usize]) {
        for &slot in slots {
            if self.window[slot] < self.needle[slot] {
                self.common += 1;
            }
            self.window[slot] += 1;
        }
    }
}

/// Upper bound on the similarity between the needle and a window of lines
/// joined by `\n`, grown one line at a time.
///
/// Two lower bounds on the edit distance `d`, with `L` the longer length:
/// every unmatched character costs an edit, so `d >= L - shared_chars`;
/// and every edit destroys at most two bigrams, so
/// `d >= (L - 1 - shared_bigrams) / 2`. Separators are counted as shared
/// whenever both sides have them, which keeps both bounds sound.
struct Bounds {
    needle_len: usize,
    needle_lines: usize,
    chars: Bag,
    pairs: Bag,
    window_len: usize,
    window_lines: usize,
}

impl Bounds {
    fn new(needle: &[String], alphabet: &Alphabet) -> Self {
        let profiles: Vec<Profile> = needle.iter().map(|line| alphabet.profile(line)).collect();
        Self {
            needle_len: profiles.iter().map(|p| p.len).sum::<usize>()
                + needle.len().saturating_sub(1),
            needle_lines: needle.len(),
            chars: Bag::new(
                alphabet.chars.len(),
                profiles.iter().flat_map(|p| p.chars.iter().copied()),
            ),
            pairs: Bag::new(
                alphabet.pairs.len(),
                profiles.iter().flat_map(|p| p.pairs.iter().copied()),
            ),
            window_len: 0,
            window_lines: 0,
        }
    }

    fn clear(&mut self) {
        self.chars.clear();
        self.pairs.clear();
        self.window_len = 0;
        self.window_lines = 0;
    }

    fn push(&mut self, line: &Profile) {
        if self.window_lines > 0 {
            self.window_len += 1;
        }
        self.window_len += line.len;
        self.window_lines += 1;
        self.chars.add(&line.chars);
        self.pairs.add(&line.pairs);
    }

    /// Never below `normalized_levenshtein` of the needle and the window.
    fn similarity(&self) -> f64 {
        let longest = self.needle_len.max(self.window_len);
        if longest == 0 {
            return 1.0;
        }
        let separators = self.needle_lines.min(self.window_lines).saturating_sub(1);
        let by_chars = longest.saturating_sub(self.chars.common + separators);
        let shared_pairs = self.pairs.common + 2 * separators;
        let by_pairs = (longest.saturating_sub(1).saturating_sub(shared_pairs) + 1) / 2;
        1.0 - (by_chars.max(by_pairs) as f64) / (longest as f64)
    }
}

/// A window of non-blank lines waiting to be scored.
struct Window {
    bound: f64,
    first: usize,
    len: usize,
}

/// Locate `query` in `content`. Checks `cancel` once per start line and
/// before each scored window.
pub fn find(
    content: &str,
    query: &AnchorQuery<'_>,
    config: &AnchorConfig,
    cancel: &CancellationToken,
) -> FuzzyOutcome {
    search(content, query, config, cancel).0
}

/// [`find`], plus the number of windows actually scored.
fn search(
    content: &str,
    query: &AnchorQuery<'_>,
    config: &AnchorConfig,
    cancel: &CancellationToken,
) -> (FuzzyOutcome, usize) {
    let needle = normalize_block(query.text);
    if needle.is_empty() {
        return (FuzzyOutcome::NotFound { best_score: 0.0 }, 0);
    }
    let needle_text = needle.join("\n");

    let lines = lines_of(content);
    let nonblank: Vec<&Line> = lines.iter().filter(|l| !l.normalized.is_empty()).collect();
    let (min_k, max_k) = window_sizes(needle.len(), config.window_tolerance);

    let alphabet = Alphabet::learn(&needle);
    let profiles: Vec<Profile> = nonblank
        .iter()
        .map(|line| alphabet.profile(&line.normalized))
        .collect();
    let mut bounds = Bounds::new(&needle, &alphabet);

    let mut windows: Vec<Window> = Vec::new();
    for first in 0..nonblank.len() {
        if cancel.is_cancelled() {
            return (FuzzyOutcome::Cancelled, 0);
        }
        bounds.clear();
        for (len, profile) in profiles[first..].iter().take(max_k).enumerate() {
            bounds.push(profile);
            if len + 1 >= min_k {
                windows.push(Window {
                    bound: bounds.similarity(),
                    first,
                    len: len + 1,
                });
            }
        }
    }
    windows.sort_by(|a, b| {
        b.bound
            .total_cmp(&a.bound)
            .then(a.first.cmp(&b.first))
            .then(a.len.cmp(&b.len))
    });

    // Best-first: once no remaining bound can reach the threshold or the
    // tie margin of the best score, nothing left can change the outcome.
    let mut best_score: f64 = 0.0;
    let mut scored = 0;
    let mut best_per_start: Vec<Option<Candidate>> = vec![None; nonblank.len()];
    for window in &windows {
        let cutoff = config
            .similarity_threshold
            .max(best_score - config.tie_margin);
        if scored > 0 && window.bound < cutoff {
            break;
        }
        if cancel.is_cancelled() {
            return (FuzzyOutcome::Cancelled, scored);
        }
        let last = window.first + window.len - 1;
        let hay = nonblank[window.first..=last]
            .iter()
            .map(|l| l.normalized.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let score = normalized_levenshtein(&needle_text, &hay);
        scored += 1;
        best_score = best_score.max(score);
        if score < config.similarity_threshold {
            continue;
        }

        let slot = &mut best_per_start[window.first];
        let better = match slot {
            None => true,
            Some(current) => match score.total_cmp(&current.score) {
                Ordering::Greater => true,
                Ordering::Equal => last < current.last,
                Ordering::Less => false,
            },
        };
        if better {
            *slot = Some(Candidate {
                span: Span::new(nonblank[window.first].start, nonblank[last].end),
                score,
                first: window.first,
                last,
            });
        }
    }
    tracing::trace!(windows = windows.len(), scored, "anchor search");

    let mut candidates: Vec<Candidate> = best_per_start.into_iter().flatten().collect();
    if candidates.is_empty() {
        return (FuzzyOutcome::NotFound { best_score }, scored);
    }

    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.span.start.cmp(&b.span.start))
    });

    // Greedy non-overlapping set of contenders within the tie margin.
    let top = candidates[0].score;
    let mut contenders: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if top - candidate.score > config.tie_margin {
            break;
        }
        if contenders.iter().all(|c| !c.overlaps(&candidate)) {
            contenders.push(candidate);
        }
    }

    let outcome = if contenders.len() == 1 {
        FuzzyOutcome::Found(contenders[0])
    } else {
        match break_tie(&contenders, &nonblank, query, config.tie_margin) {
            Some(winner) => FuzzyOutcome::Found(winner),
            None => {
                let mut spans: Vec<Span> = contenders.iter().map(|c| c.span).collect();
                spans.sort();
                FuzzyOutcome::Ambiguous {
                    score: top,
                    candidates: spans,
                }
            }
        }
    };
    (outcome, scored)
}

/// Re-rank tied candidates by how well the lines around them match the
/// query's context. Returns a winner only when it is clearly ahead.
fn break_tie(
    contenders: &[Candidate],
    nonblank: &[&Line],
    query: &AnchorQuery<'_>,
    margin: f64,
) -> Option<Candidate> {
    let before = query.context_before.map(normalize_block).unwrap_or_default();
    let after = query.context_after.map(normalize_block).unwrap_or_default();
    if before.is_empty() && after.is_empty() {
        return None;
    }

    let surrounding = |from: usize, to: usize| -> Vec<String> {
        nonblank[from..to]
            .iter()
            .map(|l| l.normalized.clone())
            .collect()
    };

    let mut ranked: Vec<(f64, Candidate)> = contenders
        .iter()
        .map(|c| {
            let mut total = 0.0;
            let mut parts = 0.0;
            if !before.is_empty() {
                let from = c.first.saturating_sub(before.len());
                total += similarity(&before, &surrounding(from, c.first));
                parts += 1.0;
            }
            if !after.is_empty() {
                let to = (c.last + 1 + after.len()).min(nonblank.len());
                total += similarity(&after, &surrounding(c.last + 1, to));
                parts += 1.0;
            }
            (total / parts, *c)
        })
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let (winner_score, winner) = ranked[0];
    let runner_up = ranked[1].0;
    (winner_score - runner_up > margin).then_some(winner)
}
