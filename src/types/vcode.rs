//! The two-address code (2AC) representation produced by the 2AC lowerer
//! (§4.5): a single flat instruction stream per function, with explicit
//! `Label` instructions marking former block boundaries, binary arithmetic
//! expanded to a `Copy`+`Op` pair, and conditional branches expanded to a
//! (`Br` to the "then" target, `Goto` to the "else" target) pair.

use crate::symbol::Symbol;
use crate::types::ast::CC;
use crate::types::entity::PrimType;
use crate::types::mir::{BlockId, CalleeRef, LocalId, SymId};
use crate::types::ty::TypeId;
use crate::types::IdxVec;

/// A single 2AC instruction. Variants correspond one-to-one with
/// [`crate::types::mir::Instr`] except: arithmetic instructions are always
/// preceded by an explicit `Copy` into the destination (so `to == l`
/// thereafter is an invariant, not merely the common case), `Br` carries
/// only its "then" target (the "else" edge is the following `Goto`), and
/// `Label` is new, marking the start of each former basic block.
#[derive(Debug, Clone)]
pub enum Instr {
  /// Marks the start of former block `BlockId`.
  Label(BlockId),
  /// Materialize an integer literal.
  Imm { to: LocalId, value: i64 },
  /// Materialize a boolean literal.
  Bool { to: LocalId, value: bool },
  /// `to = to + r`, always immediately preceded by `Copy { to, from: l }`.
  Add { to: LocalId, r: LocalId },
  /// `to = to - r`, always immediately preceded by `Copy { to, from: l }`.
  Sub { to: LocalId, r: LocalId },
  /// `to = to * r`, always immediately preceded by `Copy { to, from: l }`.
  Mul { to: LocalId, r: LocalId },
  /// `to = (l cc r)`.
  Set { to: LocalId, cc: CC, l: LocalId, r: LocalId },
  /// `to = !inner`
  BoolNeg { to: LocalId, inner: LocalId },
  /// `to = from`
  Copy { to: LocalId, from: LocalId },
  /// Bind parameter `index` to `to` at function entry.
  Arg { to: LocalId, index: u32 },
  /// `to = callee(args...)`.
  Call { to: LocalId, callee: CalleeRef, args: Vec<LocalId> },
  /// Return `value` from the enclosing function.
  Ret { value: LocalId },
  /// Unconditional jump.
  Goto { target: BlockId },
  /// Jump to `target` if `l cc r` holds; otherwise falls through to the
  /// immediately following instruction (which the lowerer always emits as
  /// `Goto` to the original else target).
  Br { cc: CC, l: LocalId, r: LocalId, target: BlockId },
  /// Load a primitive-sized value from the address held in `addr`.
  Load { to: LocalId, addr: LocalId },
  /// Store `value` to the address held in `addr`.
  Store { addr: LocalId, value: LocalId },
  /// `to = &of`.
  Address { to: LocalId, of: LocalId },
  /// Copy `size` bytes from the address in `addr` into `to`'s storage.
  MemCopy { to: LocalId, addr: LocalId, size: u32 },
  /// `to = &sym`.
  GlobalRef { to: LocalId, sym: SymId },
  /// Reinterpret/truncate `from` between primitive kinds.
  Convert { to: LocalId, from: LocalId, to_kind: PrimType, from_kind: PrimType },
  /// `to = offsetof(struct_ty, field)`.
  OffsetOf { to: LocalId, struct_ty: TypeId, field: Symbol },
}

/// A function body in 2AC form: a single flat instruction stream with
/// `Label` markers where the source 3AC had block boundaries.
#[derive(Debug, Clone, Default)]
pub struct FuncBody {
  /// The type of every local, indexed by [`LocalId`] (unchanged from 3AC).
  pub locals: IdxVec<LocalId, TypeId>,
  /// Number of parameters.
  pub nparams: u32,
  /// Number of former basic blocks (number of distinct `Label` instructions).
  pub nlabels: u32,
  /// The flattened instruction stream.
  pub instrs: Vec<Instr>,
}
