use crate::anchor::errors::AnchorError;
use crate::anchor::spec::{AnchorSpec, Occurrence, StructuralMarker};
use crate::cache;
use crate::scope::ScopeScanner;
use std::fmt;
use tracing::debug;

/// Minimum normalized similarity for a line to be offered as a hint.
const HINT_THRESHOLD: f64 = 0.6;

/// Locator strategy that produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Exact,
    Flexible,
    Structural,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Exact => write!(f, "exact"),
            Strategy::Flexible => write!(f, "whitespace-flexible"),
            Strategy::Structural => write!(f, "structural"),
        }
    }
}

/// A located anchor: byte span `[start, end)` in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorMatch {
    pub start: usize,
    pub end: usize,
    pub strategy: Strategy,
    /// Opening delimiter verified by the structural strategy.
    pub opener: Option<usize>,
}

impl AnchorMatch {
    pub fn text<'a>(&self, buffer: &'a str) -> &'a str {
        &buffer[self.start..self.end]
    }
}

/// Locate exactly one anchor in `buffer`, searching from `start_offset`.
///
/// Without an occurrence selector, more than one match is an
/// [`AnchorError::AmbiguousMatch`]; the locator never picks the first one on
/// its own.
pub fn locate(
    buffer: &str,
    spec: &AnchorSpec,
    start_offset: usize,
) -> Result<AnchorMatch, AnchorError> {
    let (strategy, mut matches) = locate_all(buffer, spec, start_offset)?;
    let count = matches.len();

    if count == 0 {
        return Err(AnchorError::NotFound {
            anchor: spec.to_string(),
            hint: nearest_line_hint(buffer, spec),
        });
    }

    let selected = match spec.occurrence {
        None if count == 1 => matches.pop(),
        None => {
            return Err(AnchorError::AmbiguousMatch {
                anchor: spec.to_string(),
                count,
            })
        }
        Some(Occurrence::First) => matches.into_iter().next(),
        Some(Occurrence::Last) => matches.pop(),
        Some(Occurrence::Nth(n)) if n >= 1 && n <= count => matches.into_iter().nth(n - 1),
        Some(Occurrence::Nth(n)) => {
            return Err(AnchorError::NotFound {
                anchor: spec.to_string(),
                hint: Some(format!("occurrence {n} requested, {count} matched")),
            })
        }
    };

    let Some(found) = selected else {
        return Err(AnchorError::NotFound {
            anchor: spec.to_string(),
            hint: None,
        });
    };

    debug!(
        anchor = %spec.label(),
        %strategy,
        start = found.start,
        end = found.end,
        candidates = count,
        "anchor located"
    );
    Ok(found)
}

/// All matches of the first strategy that finds any.
///
/// Returns the winning strategy with its matches in buffer order; the list is
/// empty when no strategy matched.
pub fn locate_all(
    buffer: &str,
    spec: &AnchorSpec,
    start_offset: usize,
) -> Result<(Strategy, Vec<AnchorMatch>), AnchorError> {
    let start = match &spec.after {
        Some(preceding) => locate(buffer, preceding, start_offset)?.end,
        None => start_offset.min(buffer.len()),
    };

    let Some(haystack) = buffer.get(start..) else {
        return Ok((Strategy::Exact, Vec::new()));
    };

    if !spec.text.is_empty() {
        let exact: Vec<AnchorMatch> = haystack
            .match_indices(spec.text.as_str())
            .map(|(idx, matched)| AnchorMatch {
                start: start + idx,
                end: start + idx + matched.len(),
                strategy: Strategy::Exact,
                opener: None,
            })
            .collect();
        if !exact.is_empty() {
            return Ok((Strategy::Exact, exact));
        }

        if spec.flexible && !spec.text.trim().is_empty() {
            let flexible = regex_matches(haystack, start, &flexible_pattern(&spec.text), spec)?;
            if !flexible.is_empty() {
                return Ok((Strategy::Flexible, flexible));
            }
        }
    }

    if let Some(marker) = &spec.structural {
        let structural = structural_matches(buffer, start, marker, spec)?;
        if !structural.is_empty() {
            return Ok((Strategy::Structural, structural));
        }
    }

    Ok((Strategy::Exact, Vec::new()))
}

/// Regex for `text` where every whitespace run matches any whitespace run.
pub fn flexible_pattern(text: &str) -> String {
    text.split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+")
}

/// Word-bounded, whitespace-flexible regex for a structural token.
fn token_pattern(token: &str) -> String {
    let token = token.trim();
    let mut pattern = String::new();
    if token.chars().next().is_some_and(is_word_char) {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&flexible_pattern(token));
    if token.chars().last().is_some_and(is_word_char) {
        pattern.push_str(r"\b");
    }
    pattern
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn regex_matches(
    haystack: &str,
    base: usize,
    pattern: &str,
    spec: &AnchorSpec,
) -> Result<Vec<AnchorMatch>, AnchorError> {
    let re = cache::get_or_compile(pattern).map_err(|e| AnchorError::InvalidPattern {
        anchor: spec.label(),
        message: e.to_string(),
    })?;

    Ok(re
        .find_iter(haystack)
        .map(|m| AnchorMatch {
            start: base + m.start(),
            end: base + m.end(),
            strategy: Strategy::Flexible,
            opener: None,
        })
        .collect())
}

fn structural_matches(
    buffer: &str,
    start: usize,
    marker: &StructuralMarker,
    spec: &AnchorSpec,
) -> Result<Vec<AnchorMatch>, AnchorError> {
    if marker.token.trim().is_empty() {
        return Ok(Vec::new());
    }

    let scanner = ScopeScanner::new(marker.delimiter);
    let candidates = regex_matches(&buffer[start..], start, &token_pattern(&marker.token), spec)?;

    Ok(candidates
        .into_iter()
        .filter_map(|candidate| {
            let opener = scanner.opens_block_after(buffer, candidate.end)?;
            Some(AnchorMatch {
                strategy: Strategy::Structural,
                opener: Some(opener),
                ..candidate
            })
        })
        .collect())
}

/// Describe the line most similar to the anchor, if any is close enough.
fn nearest_line_hint(buffer: &str, spec: &AnchorSpec) -> Option<String> {
    let needle = spec
        .text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .or_else(|| spec.structural.as_ref().map(|m| m.token.trim()))?;

    let (line_no, line, score) = buffer
        .lines()
        .enumerate()
        .map(|(idx, line)| {
            let trimmed = line.trim();
            (idx + 1, trimmed, strsim::normalized_levenshtein(needle, trimmed))
        })
        .filter(|(_, line, _)| !line.is_empty())
        .max_by(|a, b| a.2.total_cmp(&b.2))?;

    (score >= HINT_THRESHOLD).then(|| format!("closest line {line_no}: {line:?}"))
}
