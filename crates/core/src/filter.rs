use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{Row, ValidatedRow};

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_two_digits, r"^[0-9]{2}$");

/// How a row of two-digit tokens is reduced to its validated numbers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterStrategy {
    /// Keep a token only if it is >= every number already kept in the row.
    #[default]
    Ascending,
    /// Keep every token except those equal to the last token, unless the last
    /// token is also the row maximum.
    TrailingMaximum,
}

impl std::str::FromStr for FilterStrategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ascending" => Ok(FilterStrategy::Ascending),
            "trailing_maximum" => Ok(FilterStrategy::TrailingMaximum),
            other => Err(format!("Unknown filter strategy: '{other}'")),
        }
    }
}

/// Split raw OCR output into tokens on any whitespace, including newlines.
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

/// Whether a token is exactly two ASCII digits.
pub fn is_two_digit(token: &str) -> bool {
    re_two_digits().is_match(token)
}

/// Reduce a row's raw tokens (reading order) to its validated numbers.
pub fn filter_row<S: AsRef<str>>(tokens: &[S], strategy: FilterStrategy) -> ValidatedRow {
    let candidates: Vec<(&str, u8)> = tokens
        .iter()
        .map(|t| t.as_ref())
        .filter(|t| is_two_digit(t))
        .filter_map(|t| t.parse::<u8>().ok().map(|v| (t, v)))
        .collect();

    let kept: Vec<String> = match strategy {
        FilterStrategy::Ascending => {
            let mut accepted: Vec<String> = Vec::with_capacity(candidates.len());
            let mut ceiling: Option<u8> = None;
            for (text, value) in candidates {
                if ceiling.map_or(true, |max| value >= max) {
                    ceiling = Some(value);
                    accepted.push(text.to_string());
                }
            }
            accepted
        }
        FilterStrategy::TrailingMaximum => match candidates.last().copied() {
            None => Vec::new(),
            Some((last, last_value)) => {
                let max = candidates.iter().map(|&(_, v)| v).max().unwrap_or(last_value);
                candidates
                    .iter()
                    .filter(|&&(text, _)| text != last || last_value == max)
                    .map(|&(text, _)| text.to_string())
                    .collect()
            }
        },
    };

    ValidatedRow(kept)
}

/// Tokenize every cell of a recognised row in column order, then filter.
pub fn validate_row(row: &Row, strategy: FilterStrategy) -> ValidatedRow {
    let tokens: Vec<&str> = row.tokens.iter().flat_map(|t| tokenize(&t.text)).collect();
    let validated = filter_row(&tokens, strategy);
    tracing::debug!(
        row = row.index,
        raw = tokens.len(),
        kept = validated.len(),
        confidence = row.mean_confidence(),
        "row filtered"
    );
    validated
}
