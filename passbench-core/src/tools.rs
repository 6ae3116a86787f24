//! Compiler tool discovery.
//!
//! Search order:
//! 1. Explicitly configured path
//! 2. `$LLVM_DIR/build/bin/<tool>`
//! 3. Common system locations
//! 4. `PATH` (via `which`)

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Failure to locate an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A configured path does not point at an existing file.
    #[error("configured path for {tool} does not exist: {path}")]
    ConfiguredMissing {
        /// Tool name.
        tool: String,
        /// The configured, missing path.
        path: PathBuf,
    },

    /// The tool was not found anywhere.
    #[error("{tool} not found (searched: {searched:?}); hint: set LLVM_DIR or configure [tools] in passbench.toml")]
    NotFound {
        /// Tool name.
        tool: String,
        /// Locations that were checked.
        searched: Vec<String>,
    },
}

/// Locate `tool`, preferring an explicitly configured path.
pub fn find_tool(tool: &str, configured: Option<&Path>) -> Result<PathBuf, ToolError> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(ToolError::ConfiguredMissing {
            tool: tool.to_string(),
            path: path.to_path_buf(),
        });
    }

    let mut locations = Vec::new();
    if let Ok(llvm_dir) = std::env::var("LLVM_DIR") {
        locations.push(format!("{}/build/bin/{}", llvm_dir, tool));
    }
    locations.push(format!("/usr/local/bin/{}", tool));
    locations.push(format!("/usr/bin/{}", tool));

    for loc in &locations {
        let path = PathBuf::from(loc);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Ok(output) = Command::new("which").arg(tool).output() {
        if output.status.success() {
            let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path_str.is_empty() {
                return Ok(PathBuf::from(path_str));
            }
        }
    }

    Err(ToolError::NotFound {
        tool: tool.to_string(),
        searched: locations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_path_wins() {
        let path = find_tool("anything", Some(Path::new("/bin/sh"))).unwrap();
        assert_eq!(path, PathBuf::from("/bin/sh"));
    }

    #[test]
    fn missing_configured_path_is_an_error() {
        let err = find_tool("anything", Some(Path::new("/no/such/tool"))).unwrap_err();
        assert!(matches!(err, ToolError::ConfiguredMissing { .. }));
    }

    #[test]
    fn unknown_tool_reports_searched_locations() {
        let err = find_tool("definitely-not-a-real-tool-name", None).unwrap_err();
        match err {
            ToolError::NotFound { searched, .. } => assert!(!searched.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
