//! An ahead-of-time compiler front end for a small procedural language:
//! name resolution, type checking, and lowering through 3AC to 2AC.
//!
//! The tokenizer/parser, register allocator, and object writer are out of
//! scope (§4.7) and represented only as trait contracts in [`external`].
//! Everything from a parsed [`types::ast::Module`] onward is implemented
//! here; [`Compiler::compile`] runs the whole pipeline in order, stopping
//! at the first phase that reports a diagnostic.

pub mod diag;
pub mod span;
pub mod symbol;
pub mod types;
pub mod resolve;
pub mod typeck;
pub mod linker;
pub mod build_mir;
pub mod build_vcode;
pub mod external;

use crate::diag::{DriverError, Diagnostics};
use crate::linker::SymTable;
use crate::types::ast::Module;
use crate::types::ty::TypeRegistry;

/// The whole-compilation context threaded through the pipeline (§5): owns
/// the diagnostic sink and the type registry. Stands in for the source
/// compiler's process-wide `tokens`/`ast` globals, kept here as
/// single-writer fields on one value instead.
#[derive(Debug, Default)]
pub struct Compiler {
  /// Accumulated source-level diagnostics across every phase run so far.
  pub diags: Diagnostics,
  /// Every type constructed while resolving type annotations.
  pub reg: TypeRegistry,
}

impl Compiler {
  /// A fresh compilation context with empty diagnostics and an empty type registry.
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Resolve, type-check, and lower `module` through 3AC to 2AC. Stops and
  /// returns [`DriverError::SourceErrors`] after resolution or type
  /// checking if either reported a diagnostic; lowering itself cannot fail
  /// on a module that reached it (§4.4's failure semantics).
  pub fn compile(&mut self, module: &mut Module) -> Result<SymTable, DriverError> {
    log::debug!("resolving names");
    resolve::resolve_module(module, &mut self.diags);
    if self.diags.has_errors() {
      log::info!("stopping after resolve: {} error(s)", self.diags.error_count());
      return Err(DriverError::SourceErrors { count: self.diags.error_count() });
    }

    log::debug!("type checking");
    let decl_types = typeck::Checker::check_module(&mut self.reg, &mut self.diags, module);
    if self.diags.has_errors() {
      log::info!("stopping after type check: {} error(s)", self.diags.error_count());
      return Err(DriverError::SourceErrors { count: self.diags.error_count() });
    }

    log::debug!("lowering to 3AC");
    let mut table = build_mir::build_module(&mut self.reg, module, &decl_types);
    log::info!("3AC: {} symbol(s)", table.syms.len());

    log::debug!("lowering to 2AC");
    build_vcode::lower_module(&mut table);
    log::info!("2AC lowering complete");

    Ok(table)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbol::intern;
  use crate::types::ast::*;
  use crate::types::entity::PrimType;

  #[test]
  fn compile_stops_after_resolve_errors() {
    let mut module = Module {
      decls: vec![Decl {
        pos: Pos::NONE, name: intern("v"), id: None,
        kind: DeclKind::Var { ty: None, init: Expr::new(Pos::NONE, ExprKind::Name(intern("nope"), None)) },
      }],
    };
    let mut compiler = Compiler::new();
    let err = compiler.compile(&mut module).unwrap_err();
    assert!(matches!(err, DriverError::SourceErrors { count: 1 }));
  }

  #[test]
  fn compile_succeeds_on_well_typed_module() {
    let mut module = Module {
      decls: vec![Decl {
        pos: Pos::NONE, name: intern("main"), id: None,
        kind: DeclKind::Func {
          params: vec![],
          ret: TypeExpr { pos: Pos::NONE, kind: TypeExprKind::Prim(PrimType::Int32) },
          body: Block { stmts: vec![Stmt::Return(Expr::new(Pos::NONE, ExprKind::Int(0)))] },
        },
      }],
    };
    let mut compiler = Compiler::new();
    let table = compiler.compile(&mut module).expect("well-typed module compiles");
    assert_eq!(table.syms.len(), 1);
    assert_eq!(table.pending_relocs(), 0);
  }
}
