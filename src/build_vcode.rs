//! Lower a 3AC module to 2AC (§4.5).
//!
//! Grounded on the source compiler's `ir2_decl_func` (`original_source/src/3ac.c`):
//! each former basic block becomes a `Label` marker followed by its
//! instructions flattened into one stream, each binary arithmetic
//! instruction is split into a `Copy` into the destination followed by the
//! in-place op (`to == l` becomes an invariant rather than incidental), and
//! each `Br` loses its "else" target, which becomes an explicit `Goto`
//! immediately after. The input [`crate::types::mir::FuncBody`] is consumed
//! by value; nothing is cloned.

use crate::types::mir;
use crate::types::vcode::{FuncBody, Instr};

/// Lower every function body in `table` from 3AC to 2AC, replacing each
/// [`crate::linker::SymKind::Func`] entry with [`crate::linker::SymKind::VCode`] in place.
pub fn lower_module(table: &mut crate::linker::SymTable) {
  for sym in table.syms.iter_mut() {
    if let crate::linker::SymKind::Func(body) = sym {
      let lowered = lower_func(std::mem::take(body));
      *sym = crate::linker::SymKind::VCode(lowered);
    }
  }
}

/// Lower one function body. Exposed separately from [`lower_module`] so
/// tests can check a single function's shape without building a whole
/// symbol table.
#[must_use] pub fn lower_func(src: mir::FuncBody) -> FuncBody {
  let nlabels = src.cfg.blocks.len() as u32;
  let mut instrs = Vec::new();
  for (block_id, block) in src.cfg.blocks.into_iter_enum() {
    instrs.push(Instr::Label(block_id));
    for instr in block.instrs {
      lower_instr(instr, &mut instrs);
    }
  }
  FuncBody { locals: src.locals, nparams: src.nparams, nlabels, instrs }
}

fn lower_instr(instr: mir::Instr, out: &mut Vec<Instr>) {
  match instr {
    mir::Instr::Imm { to, value } => out.push(Instr::Imm { to, value }),
    mir::Instr::Bool { to, value } => out.push(Instr::Bool { to, value }),
    mir::Instr::Add { to, l, r } => { out.push(Instr::Copy { to, from: l }); out.push(Instr::Add { to, r }); }
    mir::Instr::Sub { to, l, r } => { out.push(Instr::Copy { to, from: l }); out.push(Instr::Sub { to, r }); }
    mir::Instr::Mul { to, l, r } => { out.push(Instr::Copy { to, from: l }); out.push(Instr::Mul { to, r }); }
    mir::Instr::Set { to, cc, l, r } => out.push(Instr::Set { to, cc, l, r }),
    mir::Instr::BoolNeg { to, inner } => out.push(Instr::BoolNeg { to, inner }),
    mir::Instr::Copy { to, from } => out.push(Instr::Copy { to, from }),
    mir::Instr::Arg { to, index } => out.push(Instr::Arg { to, index }),
    mir::Instr::Call { to, callee, args } => out.push(Instr::Call { to, callee, args }),
    mir::Instr::Ret { value } => out.push(Instr::Ret { value }),
    mir::Instr::Goto { target } => out.push(Instr::Goto { target }),
    mir::Instr::Br { cc, l, r, then_blk, else_blk } => {
      out.push(Instr::Br { cc, l, r, target: then_blk });
      out.push(Instr::Goto { target: else_blk });
    }
    mir::Instr::Load { to, addr } => out.push(Instr::Load { to, addr }),
    mir::Instr::Store { addr, value } => out.push(Instr::Store { addr, value }),
    mir::Instr::Address { to, of } => out.push(Instr::Address { to, of }),
    mir::Instr::MemCopy { to, addr, size } => out.push(Instr::MemCopy { to, addr, size }),
    mir::Instr::GlobalRef { to, sym } => out.push(Instr::GlobalRef { to, sym }),
    mir::Instr::Convert { to, from, to_kind, from_kind } =>
      out.push(Instr::Convert { to, from, to_kind, from_kind }),
    mir::Instr::OffsetOf { to, struct_ty, field } => out.push(Instr::OffsetOf { to, struct_ty, field }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::ast::CC;
  use crate::types::entity::PrimType;
  use crate::types::mir::{BasicBlock, BlockId, Cfg};
  use crate::types::ty::TypeRegistry;

  fn sample_body() -> mir::FuncBody {
    let mut reg = TypeRegistry::new();
    let i32_ty = reg.prim(PrimType::Int32);
    let mut locals = crate::types::IdxVec::new();
    let a = locals.push(i32_ty);
    let b = locals.push(i32_ty);
    let c = locals.push(i32_ty);
    let mut entry = BasicBlock::default();
    entry.instrs.push(mir::Instr::Add { to: c, l: a, r: b });
    entry.instrs.push(mir::Instr::Br {
      cc: CC::Eq, l: a, r: b, then_blk: BlockId(1), else_blk: BlockId(2),
    });
    let mut blocks = crate::types::IdxVec::new();
    blocks.push(entry);
    blocks.push(BasicBlock::default());
    blocks.push(BasicBlock::default());
    mir::FuncBody { locals, nparams: 2, cfg: Cfg { blocks } }
  }

  #[test]
  fn arithmetic_gets_explicit_copy() {
    let lowered = lower_func(sample_body());
    assert!(matches!(lowered.instrs[1], Instr::Copy { .. }));
    assert!(matches!(lowered.instrs[2], Instr::Add { .. }));
  }

  #[test]
  fn branch_splits_into_br_and_goto() {
    let lowered = lower_func(sample_body());
    let br_pos = lowered.instrs.iter().position(|i| matches!(i, Instr::Br { .. })).unwrap();
    assert!(matches!(lowered.instrs[br_pos + 1], Instr::Goto { .. }));
  }

  #[test]
  fn one_label_per_former_block() {
    let lowered = lower_func(sample_body());
    assert_eq!(lowered.nlabels, 3);
    let labels = lowered.instrs.iter().filter(|i| matches!(i, Instr::Label(_))).count();
    assert_eq!(labels, 3);
  }

  #[test]
  fn locals_and_param_count_survive_unchanged() {
    let src = sample_body();
    let (nparams, nlocals) = (src.nparams, src.locals.len());
    let lowered = lower_func(src);
    assert_eq!(lowered.nparams, nparams);
    assert_eq!(lowered.locals.len(), nlocals);
  }
}
