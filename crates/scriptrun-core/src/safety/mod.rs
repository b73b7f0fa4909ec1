//! Pre-execution safety checks.
//!
//! The screen is a lexical denylist match over the script text. It is not a
//! security boundary: aliased or dynamically built calls pass it, and a
//! denylisted word inside a string literal or comment is still rejected.

pub mod screener;

pub use screener::{RiskVerdict, Screener};
