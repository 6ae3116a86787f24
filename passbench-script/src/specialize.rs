//! Transform-Script Specialization
//!
//! Turns a parametric transform script into a concrete one:
//! 1. every binding token is replaced by its value, longest token first so a
//!    token that is a prefix of another can never clobber it
//! 2. the first `tile_using_for` invocation gets its result signature
//!    corrected for the number of zero tile sizes (a zero tile factor leaves
//!    that dimension untiled and produces no loop handle)
//!
//! Only the first tiling invocation is rewritten; later ones pass through
//! unchanged.

use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error;

/// The tiling operation whose result arity depends on its tile sizes.
const TILING_OP: &str = "tile_using_for";

/// Specialization failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecializeError {
    /// A tiling invocation did not carry a well-formed 4-entry tile list.
    #[error("malformed tiling arguments in line: {line}")]
    MalformedTilingArgs {
        /// The offending script line.
        line: String,
    },
}

/// Specialize `template` with `bindings`, then fix tiling result arity.
///
/// Substitution is plain textual replacement, applied longest-token-first
/// (ties broken lexicographically) so the outcome is deterministic for a
/// fixed binding set.
pub fn specialize(
    template: &str,
    bindings: &BTreeMap<String, String>,
) -> Result<String, SpecializeError> {
    let mut tokens: Vec<&String> = bindings.keys().collect();
    tokens.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

    let mut script = template.to_string();
    for token in tokens {
        script = script.replace(token.as_str(), &bindings[token]);
    }

    rewrite_tiling_arity(&script)
}

/// Rewrite the first tiling invocation to declare one result handle for the
/// tiled operation plus one loop handle per non-zero tile size.
///
/// A line mentioning the tiling operation without a parseable target handle
/// and 4-entry numeric tile list is a hard error; guessing here would produce
/// a script the compiler rejects with a far less useful message.
pub fn rewrite_tiling_arity(script: &str) -> Result<String, SpecializeError> {
    let tile_list = Regex::new(r"\[(\d+),\s*(\d+),\s*(\d+),\s*(\d+)\]").unwrap();
    let target_handle = Regex::new(&format!(r"{}\s+(%[\w.$-]+)", TILING_OP)).unwrap();

    let mut lines: Vec<String> = script.lines().map(str::to_string).collect();

    for line in lines.iter_mut() {
        if !line.contains(TILING_OP) {
            continue;
        }

        let sizes = tile_list
            .captures(line)
            .ok_or_else(|| SpecializeError::MalformedTilingArgs { line: line.clone() })?;
        let target = target_handle
            .captures(line)
            .map(|c| c[1].to_string())
            .ok_or_else(|| SpecializeError::MalformedTilingArgs { line: line.clone() })?;

        // \d+ guarantees these parse.
        let sizes: Vec<u64> = (1..=4usize).map(|i| sizes[i].parse().unwrap()).collect();
        let loops = sizes.iter().filter(|&&s| s != 0).count();

        let results = if loops == 0 {
            "%tiled_op".to_string()
        } else {
            format!("%tiled_op, %loops:{}", loops)
        };
        let mut rewritten = format!(
            "{} = transform.structured.{} {} [{}, {}, {}, {}] : (!transform.any_op) -> (!transform.any_op",
            results, TILING_OP, target, sizes[0], sizes[1], sizes[2], sizes[3]
        );
        for _ in 0..loops {
            rewritten.push_str(", !transform.any_op");
        }
        rewritten.push(')');

        *line = rewritten;
        // Only the first tiling invocation is corrected.
        break;
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Count result types declared after the `->`.
    fn result_type_count(line: &str) -> usize {
        let results = line.split("->").nth(1).unwrap();
        results.matches("!transform.any_op").count()
    }

    #[test]
    fn empty_bindings_leave_plain_scripts_unchanged() {
        let template = "transform.named_sequence @main {\n  transform.yield\n}";
        let script = specialize(template, &BTreeMap::new()).unwrap();
        assert_eq!(script, template);
    }

    #[test]
    fn substitutes_every_token_occurrence() {
        let template = "tile sizes [TILE_A, TILE_B, TILE_A, 0]";
        let script = specialize(template, &bindings(&[("TILE_A", "4"), ("TILE_B", "8")])).unwrap();
        assert_eq!(script, "tile sizes [4, 8, 4, 0]");
    }

    #[test]
    fn longer_tokens_substitute_before_their_prefixes() {
        let template = "P0 P0_OUTER";
        let script = specialize(template, &bindings(&[("P0", "2"), ("P0_OUTER", "16")])).unwrap();
        assert_eq!(script, "2 16");
    }

    #[test]
    fn one_zero_tile_size_drops_one_loop_handle() {
        let template = "%t = transform.structured.tile_using_for %matmul [4,4,0,8]";
        let script = rewrite_tiling_arity(template).unwrap();
        assert!(script.starts_with("%tiled_op, %loops:3 = "));
        assert!(script.contains("%matmul [4, 4, 0, 8]"));
        // One tiled-op handle plus three loop handles.
        assert_eq!(result_type_count(&script), 4);
    }

    #[test]
    fn all_zero_tile_sizes_leave_only_the_tiled_op_handle() {
        let template = "%t = transform.structured.tile_using_for %conv [0,0,0,0]";
        let script = rewrite_tiling_arity(template).unwrap();
        assert!(script.starts_with("%tiled_op = "));
        assert!(!script.contains("%loops"));
        assert_eq!(result_type_count(&script), 1);
    }

    #[test]
    fn only_the_first_tiling_invocation_is_rewritten() {
        let template = "\
%a = transform.structured.tile_using_for %x [1,2,3,4]
%b = transform.structured.tile_using_for %y [0,0,0,0]";
        let script = rewrite_tiling_arity(template).unwrap();
        let lines: Vec<&str> = script.lines().collect();
        assert!(lines[0].starts_with("%tiled_op, %loops:4"));
        assert_eq!(lines[1], "%b = transform.structured.tile_using_for %y [0,0,0,0]");
    }

    #[test]
    fn scripts_without_tiling_pass_through() {
        let template = "transform.structured.vectorize %f";
        assert_eq!(rewrite_tiling_arity(template).unwrap(), template);
    }

    #[test]
    fn wrong_arity_tile_list_is_rejected() {
        let template = "%t = transform.structured.tile_using_for %m [4,8]";
        assert!(matches!(
            rewrite_tiling_arity(template),
            Err(SpecializeError::MalformedTilingArgs { .. })
        ));
    }

    #[test]
    fn substituted_parameters_feed_the_arity_rewrite() {
        let template = "%t = transform.structured.tile_using_for %m [T0,T1,T2,T3]";
        let script = specialize(
            template,
            &bindings(&[("T0", "32"), ("T1", "0"), ("T2", "0"), ("T3", "8")]),
        )
        .unwrap();
        assert!(script.starts_with("%tiled_op, %loops:2 = "));
        assert!(script.contains("[32, 0, 0, 8]"));
    }
}
