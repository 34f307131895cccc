//! The single diagnostic sink that every source-level error kind funnels through.
//!
//! Internal compiler errors (an unreachable match arm the type checker should
//! already have ruled out) are not diagnostics: they are bugs, and are raised
//! as ordinary panics rather than accumulated here.

use std::fmt;
use crate::span::{LineMap, Pos};

/// One reported problem with the source program.
#[derive(Debug, Clone)]
pub struct Diagnostic {
  /// Where the problem was found.
  pub pos: Pos,
  /// Human-readable description.
  pub message: String,
}

/// Accumulates source-level diagnostics during resolution and type checking.
///
/// Every non-internal error (lex, parse, resolve, type) is reported through
/// [`Diagnostics::error`], which increments a monotonic counter. Later passes
/// consult [`Diagnostics::has_errors`] and skip lowering rather than unwind.
#[derive(Debug, Default)]
pub struct Diagnostics {
  reported: Vec<Diagnostic>,
}

impl Diagnostics {
  /// Create an empty sink.
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Report an error at `pos`. `message` should not include the position;
  /// callers render positions via [`Diagnostics::render`].
  pub fn error(&mut self, pos: Pos, message: impl Into<String>) {
    log::debug!("diagnostic at {pos}: reporting error");
    self.reported.push(Diagnostic { pos, message: message.into() });
  }

  /// Number of errors reported so far.
  #[must_use] pub fn error_count(&self) -> usize { self.reported.len() }

  /// Whether any error has been reported.
  #[must_use] pub fn has_errors(&self) -> bool { !self.reported.is_empty() }

  /// All diagnostics reported so far, in report order.
  #[must_use] pub fn diagnostics(&self) -> &[Diagnostic] { &self.reported }

  /// Render every diagnostic as `line:col: message`, resolving positions against `map`.
  #[must_use] pub fn render(&self, map: &LineMap) -> String {
    use fmt::Write;
    let mut out = String::new();
    for d in &self.reported {
      let lc = map.resolve(d.pos);
      let _ = writeln!(out, "{lc}: error: {}", d.message);
    }
    out
  }
}

/// Errors the driver itself can fail with, distinct from source-level diagnostics:
/// these represent conditions the compiler cannot recover from (bad CLI usage, I/O
/// failure) and are propagated immediately via `?` rather than accumulated.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
  /// Could not read the source file.
  #[error("could not read {path}: {source}")]
  ReadSource {
    /// The path that failed to open.
    path: String,
    /// The underlying I/O error.
    #[source] source: std::io::Error,
  },
  /// Could not write the output object file.
  #[error("could not write {path}: {source}")]
  WriteOutput {
    /// The path that failed to open for writing.
    path: String,
    /// The underlying I/O error.
    #[source] source: std::io::Error,
  },
  /// The external parser failed to produce an AST.
  #[error("parse failed: {0}")]
  Parse(String),
  /// One or more source-level diagnostics were reported; compilation stops here.
  #[error("{count} error(s) reported")]
  SourceErrors {
    /// Number of diagnostics reported.
    count: usize,
  },
}
