use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw text recognised for one cell, with the engine's confidence (0.0–1.0).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OcrToken {
    pub text: String,
    pub confidence: f32,
}

impl OcrToken {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self { text: text.into(), confidence: confidence.clamp(0.0, 1.0) }
    }

    /// A cell the engine could not read.
    pub fn empty() -> Self {
        Self::new(String::new(), 0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Position of a cell in the segmented grid (both zero-based).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellIndex {
    pub row: usize,
    pub column: usize,
}

/// The recognised tokens of one printed row, left to right.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Row {
    pub index: usize,
    pub tokens: Vec<OcrToken>,
}

impl Row {
    pub fn new(index: usize) -> Self {
        Self { index, tokens: Vec::new() }
    }

    /// Mean confidence over cells that produced text, 0.0 if none did.
    pub fn mean_confidence(&self) -> f32 {
        let read: Vec<f32> = self
            .tokens
            .iter()
            .filter(|t| !t.is_empty())
            .map(|t| t.confidence)
            .collect();
        if read.is_empty() {
            0.0
        } else {
            read.iter().sum::<f32>() / read.len() as f32
        }
    }
}

/// Accepted two-digit numbers of one row, in reading order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatedRow(pub Vec<String>);

impl ValidatedRow {
    pub fn numbers(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for ValidatedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

/// Output of one pipeline run: one entry per segmented row, empty rows kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionResult {
    pub rows: Vec<ValidatedRow>,
    /// Whether a document boundary was found and the image rectified.
    pub rectified: bool,
}

impl ExtractionResult {
    /// Reply text: numbers space-separated, rows newline-separated.
    pub fn to_reply(&self) -> String {
        self.rows
            .iter()
            .map(ValidatedRow::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn number_count(&self) -> usize {
        self.rows.iter().map(ValidatedRow::len).sum()
    }
}

impl fmt::Display for ExtractionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_reply())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(nums: &[&str]) -> ValidatedRow {
        ValidatedRow(nums.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn token_clamps_confidence() {
        assert_eq!(OcrToken::new("12", 1.5).confidence, 1.0);
        assert_eq!(OcrToken::new("12", -0.2).confidence, 0.0);
    }

    #[test]
    fn whitespace_token_is_empty() {
        assert!(OcrToken::new(" \n", 0.9).is_empty());
        assert!(!OcrToken::new("07", 0.9).is_empty());
    }

    #[test]
    fn mean_confidence_ignores_unread_cells() {
        let r = Row {
            index: 0,
            tokens: vec![OcrToken::new("04", 0.8), OcrToken::empty(), OcrToken::new("12", 0.6)],
        };
        assert!((r.mean_confidence() - 0.7).abs() < 1e-6);
        assert_eq!(Row::new(1).mean_confidence(), 0.0);
    }

    #[test]
    fn reply_joins_rows_and_keeps_empty_ones() {
        let result = ExtractionResult {
            rows: vec![row(&["04", "12", "23"]), row(&[]), row(&["01", "45"])],
            rectified: true,
        };
        assert_eq!(result.to_reply(), "04 12 23\n\n01 45");
        assert_eq!(result.to_string(), result.to_reply());
        assert_eq!(result.number_count(), 5);
    }

    #[test]
    fn empty_result_has_empty_reply() {
        assert_eq!(ExtractionResult::default().to_reply(), "");
    }
}
