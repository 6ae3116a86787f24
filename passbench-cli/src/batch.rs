//! Batch Directive Preprocessing
//!
//! Test files carry declarative `// RUN:` lines naming compiler invocations.
//! Each such line that invokes `mlir-opt` becomes one or more benchmark
//! configurations:
//! - the `%s` placeholder (the current input file) is stripped
//! - anything from a `|` onward (FileCheck plumbing) is cut
//! - a `-split-input-file` flag partitions the input on `// -----` separator
//!   lines, yielding one configuration per segment
//!
//! Configurations come out in directive order, split segments left-to-right.

use crate::driver::{BenchConfig, InputSource};

/// Marker prefix of a run directive.
const RUN_MARKER: &str = "// RUN:";

/// Separator line between segments of a multi-segment input.
const SEGMENT_SEPARATOR: &str = "// -----";

/// Flag requesting multi-segment splitting.
const SPLIT_FLAG: &str = "-split-input-file";

/// Placeholder for the current input file in a directive.
const INPUT_PLACEHOLDER: &str = "%s";

/// Preprocess a directive file into benchmark configurations.
///
/// Directives that do not invoke `mlir-opt` are skipped. An empty result
/// means the file had no usable directives; the caller decides whether that
/// is an error.
pub fn preprocess_directive_file(text: &str) -> Vec<BenchConfig> {
    let mut configs = Vec::new();
    let mut directive_index = 0usize;

    for line in text.lines() {
        let Some(directive) = line.trim_start().strip_prefix(RUN_MARKER) else {
            continue;
        };
        let directive = directive.trim();
        let Some(pipeline) = directive.strip_prefix("mlir-opt") else {
            continue;
        };

        let mut pipeline = pipeline.to_string();
        let split_input = pipeline.contains(SPLIT_FLAG);
        if split_input {
            pipeline = pipeline.replace(SPLIT_FLAG, "");
        }
        pipeline = pipeline.replace(INPUT_PLACEHOLDER, "");
        if let Some(pipe) = pipeline.find('|') {
            pipeline.truncate(pipe);
        }
        let pipeline: Vec<String> = pipeline.split_whitespace().map(str::to_string).collect();

        let segments: Vec<&str> = if split_input {
            text.split(SEGMENT_SEPARATOR).collect()
        } else {
            vec![text]
        };

        for (segment_index, segment) in segments.iter().enumerate() {
            let label = if split_input {
                format!("directive {} segment {}", directive_index, segment_index)
            } else {
                format!("directive {}", directive_index)
            };
            configs.push(BenchConfig {
                input: InputSource::Text {
                    label,
                    content: segment.to_string(),
                },
                pipeline: pipeline.clone(),
                transform_script: None,
            });
        }
        directive_index += 1;
    }

    configs
}
