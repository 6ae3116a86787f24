#![warn(missing_docs)]
//! Passbench Script Logic
//!
//! Pure text operations over compiler diagnostics and transform scripts:
//! - Extraction of the embedded transform-script module and the timing marker
//!   from semi-structured diagnostic output
//! - Specialization of a parametric transform script: token substitution and
//!   the dynamic-arity correction for tiling invocations
//!
//! Everything in this crate is side-effect free, which keeps the fragile
//! pattern-matching behind a narrow, independently testable seam.

mod extract;
mod specialize;

pub use extract::{ExtractError, extract_script_block, extract_timing};
pub use specialize::{SpecializeError, rewrite_tiling_arity, specialize};
