//! SCAN Data Tools
//!
//! Helpers for preparing SCAN-style command/action data and for checking
//! predictions made with placeholder words.
//!
//! ## Line Format
//!
//! ```text
//! IN: jump twice after walk OUT: I_WALK I_JUMP I_JUMP
//! ```
//!
//! ## Placeholder Recovery
//!
//! Templated data replaces primitive words with placeholders (`W_1`, ...)
//! and stores a per-line word map such as `{"jump": "W_1"}`. After
//! prediction, [`fill_back`] maps each placeholder back to its word and the
//! word to its action:
//!
//! ```text
//! prediction:  I_WALK W_1 W_1
//! word map:    {"jump": "W_1"}
//! filled:      I_WALK I_JUMP I_JUMP
//! ```

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

static SCAN_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*?IN:\s*(.*?)\s*OUT:\s*(.*)$").expect("Invalid SCAN line regex"));

/// Which half of a SCAN line to keep
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanSide {
    Input,
    Output,
}

/// Split `... IN: <command> OUT: <actions>` into its two trimmed halves
///
/// Returns `None` for lines without both markers.
pub fn split_scan_line(line: &str) -> Option<(String, String)> {
    let caps = SCAN_LINE.captures(line.trim())?;
    Some((caps[1].trim().to_string(), caps[2].trim().to_string()))
}

/// Extract one side from every line of `text`
///
/// Blank and malformed lines are skipped, as are lines whose selected half
/// is empty.
pub fn split_scan_lines(text: &str, side: ScanSide) -> Vec<String> {
    text.lines()
        .filter_map(split_scan_line)
        .map(|(input, output)| match side {
            ScanSide::Input => input,
            ScanSide::Output => output,
        })
        .filter(|part| !part.is_empty())
        .collect()
}

/// Primitive words and the actions they stand for, in annotation order
pub fn default_hints() -> Vec<(String, String)> {
    [
        ("jump", "I_JUMP"),
        ("look", "I_LOOK"),
        ("walk", "I_WALK"),
        ("run", "I_RUN"),
    ]
    .iter()
    .map(|&(w, a)| (w.to_string(), a.to_string()))
    .collect()
}

/// Word -> action map used to fill placeholders back in
pub fn default_actions() -> HashMap<String, String> {
    [
        ("jump", "I_JUMP"),
        ("walk", "I_WALK"),
        ("look", "I_LOOK"),
        ("run", "I_RUN"),
        ("right", "I_TURN_RIGHT"),
        ("left", "I_TURN_LEFT"),
    ]
    .iter()
    .map(|&(w, a)| (w.to_string(), a.to_string()))
    .collect()
}

/// Append ` || word -> ACTION, ...` for every hint word present in `line`
///
/// The hint list is written in hint order; the separator is written even
/// when no hint applies.
pub fn annotate_source(line: &str, hints: &[(String, String)]) -> String {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let selected: Vec<String> = hints
        .iter()
        .filter(|(word, _)| tokens.contains(&word.as_str()))
        .map(|(word, action)| format!("{} -> {}", word, action))
        .collect();
    format!("{} || {}", tokens.join(" "), selected.join(", "))
}

/// Replace `W_*` placeholders of `prediction` through a line's word map
///
/// A placeholder whose word has no action is dropped. Tokens that are not
/// placeholders of this line pass through unchanged.
pub fn fill_back(
    prediction: &str,
    word_map: &HashMap<String, String>,
    actions: &HashMap<String, String>,
) -> String {
    let placeholders: HashMap<&str, &str> = word_map
        .iter()
        .map(|(word, placeholder)| (placeholder.as_str(), word.as_str()))
        .collect();

    prediction
        .split_whitespace()
        .filter_map(|token| match placeholders.get(token) {
            Some(word) if token.starts_with("W_") => actions.get(*word).map(String::as_str),
            _ => Some(token),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read per-line word maps stored as a JSON array of objects
pub fn load_word_maps<P: AsRef<Path>>(path: P) -> Result<Vec<HashMap<String, String>>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Fill every prediction line through the word map at the same index
pub fn fill_back_lines(
    predictions: &[String],
    word_maps: &[HashMap<String, String>],
    actions: &HashMap<String, String>,
) -> Result<Vec<String>> {
    predictions
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let word_map = word_maps.get(i).ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "no word map for prediction line {} ({} maps)",
                    i + 1,
                    word_maps.len()
                ))
            })?;
            Ok(fill_back(line, word_map, actions))
        })
        .collect()
}

/// Exact line-level agreement between a reference and a prediction file
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineMatch {
    pub total: usize,
    pub matched: usize,
    /// `(reference, prediction)` for every differing pair
    pub mismatches: Vec<(String, String)>,
}

impl LineMatch {
    /// Compare trimmed lines pairwise; extra lines on either side are ignored
    pub fn compare<R: AsRef<str>, P: AsRef<str>>(reference: &[R], predicted: &[P]) -> Self {
        let mut result = Self::default();
        for (r, p) in reference.iter().zip(predicted) {
            let (r, p) = (r.as_ref().trim(), p.as_ref().trim());
            result.total += 1;
            if r == p {
                result.matched += 1;
            } else {
                result.mismatches.push((r.to_string(), p.to_string()));
            }
        }
        result
    }

    /// Matched lines as a percentage (0.0 for no lines)
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.matched as f64 * 100.0 / self.total as f64
        }
    }
}

impl fmt::Display for LineMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TOTAL: {}, MATCHED : {}, ACCURACY: {:.2}",
            self.total,
            self.matched,
            self.accuracy()
        )
    }
}

/// Each filled line above its reference line, every pair followed by a blank line
pub fn paired_lines<F: AsRef<str>, R: AsRef<str>>(filled: &[F], reference: &[R]) -> String {
    filled
        .iter()
        .zip(reference)
        .map(|(f, r)| format!("{}\n{}\n\n", f.as_ref(), r.as_ref().trim()))
        .collect()
}

/// Every line of a file, trimmed, blank lines included
pub fn read_raw_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text.lines().map(|l| l.trim().to_string()).collect())
}
