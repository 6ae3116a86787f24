//! Diagnostic Text Extraction
//!
//! `mlir-opt` reports the generated transform script and its timing on the
//! diagnostic channel as semi-structured text. Two anchored patterns pull a
//! typed record out of that stream:
//! - the first `module … { … }` block (outer wrapping lines stripped)
//! - the first `Time taken: <float> seconds.` marker
//!
//! First occurrence wins in both cases, even when later matches exist.

use regex::Regex;
use thiserror::Error;

/// Extraction failures over diagnostic text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// No `module { … }` block was present.
    #[error("no module block found in diagnostic output")]
    NoScriptBlock,

    /// No `Time taken: …` marker was present.
    #[error("no timing information found in diagnostic output")]
    NoTimingFound,
}

/// Extract the interior of the first `module … { … }` block.
///
/// The opening `module …` line and the closing `}` line are structural and
/// are removed; the lines between them are returned verbatim. The scan
/// assumes the closing brace of the block sits alone at column zero (nested
/// regions are indented), which holds for printed MLIR modules.
pub fn extract_script_block(text: &str) -> Result<String, ExtractError> {
    // Non-greedy across newlines: the first `module` and the first
    // column-zero closing brace after it delimit the block.
    let module_pattern = Regex::new(r"(?s)module.*?\{.*?\n\}").unwrap();

    let block = module_pattern
        .find(text)
        .map(|m| m.as_str())
        .ok_or(ExtractError::NoScriptBlock)?;

    let lines: Vec<&str> = block.lines().collect();
    Ok(lines[1..lines.len() - 1].join("\n"))
}

/// Extract the first reported timing, in seconds.
pub fn extract_timing(text: &str) -> Result<f64, ExtractError> {
    let time_pattern = Regex::new(r"Time taken:\s*(\d+\.\d+e[+-]?\d+)\s*seconds\.").unwrap();

    let captures = time_pattern
        .captures(text)
        .ok_or(ExtractError::NoTimingFound)?;

    captures[1].parse().map_err(|_| ExtractError::NoTimingFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIAG: &str = "\
some compiler noise
module attributes {transform.with_named_sequence} {
  transform.named_sequence @__transform_main(%arg0: !transform.any_op) {
    transform.yield
  }
}
Time taken: 4.2e-05 seconds.
trailing noise
";

    #[test]
    fn extracts_block_interior() {
        let block = extract_script_block(DIAG).unwrap();
        assert!(block.starts_with("  transform.named_sequence"));
        assert!(block.ends_with("  }"));
        assert!(!block.contains("module"));
    }

    #[test]
    fn first_module_block_wins() {
        let text = format!("{}\nmodule {{\n  later\n}}\n", DIAG);
        let block = extract_script_block(&text).unwrap();
        assert!(block.contains("named_sequence"));
        assert!(!block.contains("later"));
    }

    #[test]
    fn missing_block_is_reported() {
        assert_eq!(
            extract_script_block("no transform script here"),
            Err(ExtractError::NoScriptBlock)
        );
    }

    #[test]
    fn parses_timing_marker() {
        let time = extract_timing(DIAG).unwrap();
        assert!((time - 4.2e-5).abs() < 1e-12);
    }

    #[test]
    fn timing_round_trips_through_the_marker() {
        for (marker, expected) in [
            ("1.0e0", 1.0),
            ("3.25e-2", 3.25e-2),
            ("7.5e+3", 7.5e3),
            ("9.999e-9", 9.999e-9),
        ] {
            let text = format!("prefix\nTime taken: {} seconds.\n", marker);
            let parsed = extract_timing(&text).unwrap();
            assert!(
                (parsed - expected).abs() <= expected.abs() * 1e-12,
                "round trip failed for {marker}: got {parsed}"
            );
        }
    }

    #[test]
    fn first_timing_marker_wins() {
        let text = "Time taken: 1.0e0 seconds.\nTime taken: 2.0e0 seconds.\n";
        assert_eq!(extract_timing(text), Ok(1.0));
    }

    #[test]
    fn missing_timing_is_reported() {
        assert_eq!(
            extract_timing("Time taken: forever"),
            Err(ExtractError::NoTimingFound)
        );
    }
}
