//! Trait contracts for the out-of-scope collaborators named in §4.7/§6: the
//! tokenizer/parser, the instruction selector, and the object writer. None
//! of these are implemented here — the core pipeline only needs their
//! shape, so each is a trait plus a minimal test double sufficient to drive
//! the pipeline end to end in tests.

use crate::types::ast::Module;
use crate::types::vcode;

/// The boundary the (external, out-of-scope) lexer/parser crosses: in
/// practice the core only ever consumes a finished [`Module`], so this
/// trait models that handoff rather than a live token stream. Implementors
/// own their own diagnostics for lex/parse-stage errors (§7, Lex/Parse).
pub trait SourceTokens {
  /// Parse-stage failure, surfaced to the driver as a [`crate::diag::DriverError::Parse`].
  type Error: std::fmt::Display;
  /// Parse `src` into a [`Module`] ready for name resolution.
  fn parse(&mut self, src: &str) -> Result<Module, Self::Error>;
}

/// Consumes a 2AC module and produces architecture-specific machine code.
/// Register allocation and encoding are entirely out of scope; the core's
/// only observable dependence on this boundary is the 2AC opcode set.
pub trait InstructionSelector {
  /// Opaque machine-code artifact for one function body.
  type Artifact;
  /// Select and encode instructions for one lowered function body.
  fn select(&mut self, body: &vcode::FuncBody) -> Self::Artifact;
}

/// Consumes the finished machine code (keyed by symbol name) and produces a
/// relocatable object file. The real implementation would emit ELF64; here
/// it's just a trait plus [`RecordingWriter`] for tests.
pub trait ObjectWriter {
  /// Write-stage failure (e.g. I/O).
  type Error: std::fmt::Display;
  /// Record one named symbol's machine code.
  fn write_symbol(&mut self, name: &str, code: &[u8]) -> Result<(), Self::Error>;
  /// Finish writing and return the finished object bytes.
  fn finish(self) -> Result<Vec<u8>, Self::Error>;
}

/// An [`InstructionSelector`] that emits no real machine code, only counting
/// how many instructions it was asked to select. Enough to validate a 2AC
/// module's shape without pulling in a real backend.
#[derive(Debug, Default)]
pub struct NullSelector {
  /// Total instruction count across every [`NullSelector::select`] call.
  pub instrs_seen: usize,
}

impl InstructionSelector for NullSelector {
  type Artifact = usize;
  fn select(&mut self, body: &vcode::FuncBody) -> usize {
    self.instrs_seen += body.instrs.len();
    body.instrs.len()
  }
}

/// An in-memory [`ObjectWriter`] that just records what it was asked to
/// write, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingWriter {
  /// `(name, code)` pairs in the order they were written.
  pub symbols: Vec<(String, Vec<u8>)>,
}

impl ObjectWriter for RecordingWriter {
  type Error = std::convert::Infallible;
  fn write_symbol(&mut self, name: &str, code: &[u8]) -> Result<(), Self::Error> {
    self.symbols.push((name.to_string(), code.to_vec()));
    Ok(())
  }
  fn finish(self) -> Result<Vec<u8>, Self::Error> {
    Ok(self.symbols.iter().flat_map(|(_, code)| code.iter().copied()).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn null_selector_counts_instructions() {
    let mut sel = NullSelector::default();
    let body = vcode::FuncBody {
      locals: Default::default(), nparams: 0, nlabels: 1,
      instrs: vec![vcode::Instr::Label(crate::types::mir::BlockId(0))],
    };
    sel.select(&body);
    assert_eq!(sel.instrs_seen, 1);
  }

  #[test]
  fn recording_writer_concatenates_symbols() {
    let mut w = RecordingWriter::default();
    w.write_symbol("f", &[1, 2]).unwrap();
    w.write_symbol("g", &[3]).unwrap();
    assert_eq!(w.finish().unwrap(), vec![1, 2, 3]);
  }
}
