//! The symbol/relocation table (§4.6): owns every emitted symbol (function,
//! constant blob, or aggregate descriptor) and the list of forward-reference
//! call sites awaiting their callee's eventual symbol index.
//!
//! Grounded on the source compiler's `bytecode` global state and
//! `patch_relocs`: declarations are assigned symbol indices in source
//! order as they are lowered, and any call whose callee was not yet
//! assigned an index registers a [`Reloc`] instead of failing.

use crate::symbol::Symbol;
use crate::types::ast::DeclId;
use crate::types::mir::{CalleeRef, FuncBody, SymId};
use crate::types::ty::TypeId;
use crate::types::IdxVec;

/// One symbol-table entry.
#[derive(Debug)]
pub enum SymKind {
  /// A function body, still in 3AC form. [`crate::build_vcode::lower_module`]
  /// replaces each of these with a [`SymKind::VCode`] entry in place.
  Func(FuncBody),
  /// A function body already lowered to 2AC, ready for the (external)
  /// instruction selector.
  VCode(crate::types::vcode::FuncBody),
  /// A read-only byte buffer emitted for a compile-time-known initializer.
  Blob { bytes: Vec<u8>, align: u32 },
  /// A struct's field types in declaration order, consulted by `OffsetOf`
  /// lowering and by the (external) object writer.
  Aggregate { fields: Vec<TypeId> },
}

/// A deferred patch: write `sym_in`'s eventual symbol index into the call
/// instruction identified by `(sym_in, instr_index)` once every declaration
/// has been assigned an id.
#[derive(Debug, Clone, Copy)]
pub struct Reloc {
  /// The symbol (function) containing the call site.
  pub sym_in: SymId,
  /// Index, within `sym_in`'s entry/exit block list, of the block holding the call.
  pub block: crate::types::mir::BlockId,
  /// Index of the `Call` instruction within that block.
  pub instr: usize,
  /// The declaration whose eventual symbol index is being waited on.
  pub ref_decl: DeclId,
}

/// Owns the whole module's symbol table: names, bodies, and pending relocations.
#[derive(Debug, Default)]
pub struct SymTable {
  /// Source identifier for each symbol, parallel to `syms`. Blob symbols
  /// get a synthetic name of the form `.G<hex>`.
  pub names: IdxVec<SymId, Symbol>,
  /// The symbols themselves.
  pub syms: IdxVec<SymId, SymKind>,
  /// Maps a top-level declaration to the symbol index it was assigned.
  pub decl_to_sym: hashbrown::HashMap<DeclId, SymId>,
  relocs: Vec<Reloc>,
  next_blob: u32,
}

impl SymTable {
  /// An empty table.
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Reserve the next symbol index for `decl`, without yet supplying its
  /// body; used so that forward references within the same module can
  /// record a [`CalleeRef::Known`] once the callee's declaration has been
  /// walked, even if its body hasn't been lowered yet.
  pub fn reserve(&mut self, decl: DeclId, name: Symbol) -> SymId {
    let id = self.names.next_idx();
    debug_assert_eq!(id, self.syms.next_idx());
    self.names.push(name);
    self.decl_to_sym.insert(decl, id);
    id
  }

  /// Attach the finished symbol body to a previously [`SymTable::reserve`]d id.
  pub fn define(&mut self, id: SymId, kind: SymKind) {
    let pushed = self.syms.push(kind);
    debug_assert_eq!(pushed, id);
  }

  /// The symbol index already assigned to `decl`, if any.
  #[must_use] pub fn sym_of_decl(&self, decl: DeclId) -> Option<SymId> {
    self.decl_to_sym.get(&decl).copied()
  }

  /// Create a new `.G<hex>`-named blob symbol and return its index.
  pub fn new_blob(&mut self, bytes: Vec<u8>, align: u32) -> SymId {
    let name = crate::symbol::intern(&format!(".G{:x}", self.next_blob));
    self.next_blob += 1;
    let id = self.names.push(name);
    let pushed = self.syms.push(SymKind::Blob { bytes, align });
    debug_assert_eq!(pushed, id);
    id
  }

  /// Resolve `decl` to a [`CalleeRef`]: `Known` if it already has a symbol
  /// index, `Pending` (and a registered [`Reloc`]) otherwise.
  pub fn callee_ref(
    &mut self, caller: SymId, block: crate::types::mir::BlockId, instr: usize, decl: DeclId,
  ) -> CalleeRef {
    if let Some(sym) = self.sym_of_decl(decl) {
      log::trace!("callee {decl:?} already has symbol {sym:?}");
      CalleeRef::Known(sym)
    } else {
      log::debug!("registering forward-reference relocation for {decl:?} in {caller:?}");
      self.relocs.push(Reloc { sym_in: caller, block, instr, ref_decl: decl });
      CalleeRef::Pending(decl)
    }
  }

  /// Rewrite every registered relocation's `Call` instruction from
  /// `CalleeRef::Pending` to `CalleeRef::Known`, now that every declaration
  /// has been assigned a symbol index. Panics if a pending relocation's
  /// declaration was never defined — this indicates the resolver let an
  /// undeclared name through, a front-end bug rather than a user error.
  pub fn patch_relocs(&mut self) {
    let relocs = std::mem::take(&mut self.relocs);
    for r in relocs {
      let target = self.sym_of_decl(r.ref_decl)
        .unwrap_or_else(|| unreachable!("relocation for undefined decl {:?}", r.ref_decl));
      let SymKind::Func(body) = &mut self.syms[r.sym_in] else {
        unreachable!("relocation source is not a function body")
      };
      let Some(crate::types::mir::Instr::Call { callee, .. }) =
        body.cfg.blocks[r.block].instrs.get_mut(r.instr)
      else {
        unreachable!("relocation does not point at a Call instruction")
      };
      log::debug!("patched relocation: {:?} -> {target:?}", r.ref_decl);
      *callee = CalleeRef::Known(target);
    }
  }

  /// Number of relocations still pending (for diagnostics/tests only;
  /// always `0` after [`SymTable::patch_relocs`]).
  #[must_use] pub fn pending_relocs(&self) -> usize { self.relocs.len() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::mir::{BasicBlock, Cfg, Instr};

  #[test]
  fn forward_reference_is_patched() {
    let mut table = SymTable::new();
    let caller_decl = DeclId(0);
    let callee_decl = DeclId(1);
    let caller = table.reserve(caller_decl, crate::symbol::intern("f"));
    let callee_ref = table.callee_ref(caller, crate::types::mir::Cfg::ENTRY, 0, callee_decl);
    assert!(matches!(callee_ref, CalleeRef::Pending(_)));
    let mut block = BasicBlock::default();
    block.instrs.push(Instr::Call {
      to: crate::types::mir::LocalId(0), callee: callee_ref, args: vec![],
    });
    let mut cfg = Cfg::default();
    cfg.blocks.push(block);
    table.define(caller, SymKind::Func(crate::types::mir::FuncBody {
      locals: Default::default(), nparams: 0, cfg,
    }));
    let callee = table.reserve(callee_decl, crate::symbol::intern("g"));
    table.define(callee, SymKind::Func(Default::default()));

    assert_eq!(table.pending_relocs(), 1);
    table.patch_relocs();
    assert_eq!(table.pending_relocs(), 0);
    let SymKind::Func(body) = &table.syms[caller] else { unreachable!() };
    let Instr::Call { callee: resolved, .. } = &body.cfg.blocks[Cfg::ENTRY].instrs[0] else {
      unreachable!()
    };
    assert_eq!(*resolved, CalleeRef::Known(callee));
  }
}
