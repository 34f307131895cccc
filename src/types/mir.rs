//! The three-address code (3AC) representation built by the 3AC builder
//! (§4.4) and consumed by the 2AC lowerer (§4.5).
//!
//! The source compiler stores instructions as a single flat 4-byte-record
//! stream with basic blocks addressed by `{begin, end}` offsets into it,
//! because that stream is serialized byte-for-byte. Our in-memory
//! representation keeps each basic block's instructions in its own `Vec`
//! instead — the flat-stream/offset shape is an artifact of the (out of
//! scope) object-emission boundary, not a property the core passes need.
//! The 2AC lowerer still produces the flattened, `Label`-delimited stream
//! shape the source compiler emits, in [`crate::types::vcode`].

use crate::symbol::Symbol;
use crate::types::ast::CC;
use crate::types::entity::PrimType;
use crate::types::ty::TypeId;
use crate::types::{mk_id, IdxVec};

mk_id! {
  /// A numbered value within a function body (`%n` in the spec's notation).
  LocalId;
  /// A basic block, addressed as a branch target (a label).
  BlockId;
  /// A symbol-table entry: a function, constant blob, or aggregate descriptor.
  SymId;
}

/// The callee of a `Call` instruction: either already assigned a symbol
/// index, or awaiting one because the callee is declared later in the file.
/// A pending callee always has a matching entry in the module's relocation
/// list (see [`crate::linker`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalleeRef {
  /// The callee's symbol index is already known.
  Known(SymId),
  /// The callee is a forward reference; patched once the whole module's
  /// declarations have been assigned symbol indices.
  Pending(crate::types::ast::DeclId),
}

/// A single 3AC instruction.
#[derive(Debug, Clone)]
pub enum Instr {
  /// Materialize an integer literal.
  Imm { to: LocalId, value: i64 },
  /// Materialize a boolean literal.
  Bool { to: LocalId, value: bool },
  /// `to = l + r`
  Add { to: LocalId, l: LocalId, r: LocalId },
  /// `to = l - r`
  Sub { to: LocalId, l: LocalId, r: LocalId },
  /// `to = l * r`
  Mul { to: LocalId, l: LocalId, r: LocalId },
  /// `to = (l cc r)`, a boolean result.
  Set { to: LocalId, cc: CC, l: LocalId, r: LocalId },
  /// `to = !inner`
  BoolNeg { to: LocalId, inner: LocalId },
  /// `to = from`
  Copy { to: LocalId, from: LocalId },
  /// Bind parameter `index` to `to` at function entry.
  Arg { to: LocalId, index: u32 },
  /// `to = callee(args...)`. Argument packing into one-byte-per-argument
  /// extension words is an object-emission-time concern; here `args` is an
  /// ordinary list, matching the source's acknowledged équivalent
  /// representation (see Design Notes on packed arguments).
  Call { to: LocalId, callee: CalleeRef, args: Vec<LocalId> },
  /// Return `value` from the enclosing function.
  Ret { value: LocalId },
  /// Unconditional jump to `target`.
  Goto { target: BlockId },
  /// Jump to `then_blk` if `l cc r` holds, otherwise to `else_blk`.
  Br { cc: CC, l: LocalId, r: LocalId, then_blk: BlockId, else_blk: BlockId },
  /// Load a primitive-sized value from the address held in `addr`.
  Load { to: LocalId, addr: LocalId },
  /// Store `value` to the address held in `addr`.
  Store { addr: LocalId, value: LocalId },
  /// `to = &of` for a named variable `of`.
  Address { to: LocalId, of: LocalId },
  /// Copy `size` bytes from the address in `addr` into `to`'s storage
  /// (used for struct/array-valued loads and initializer-list copies).
  MemCopy { to: LocalId, addr: LocalId, size: u32 },
  /// `to = &sym`, the address of a blob or aggregate symbol.
  GlobalRef { to: LocalId, sym: SymId },
  /// Reinterpret/truncate `from` between primitive kinds.
  Convert { to: LocalId, from: LocalId, to_kind: PrimType, from_kind: PrimType },
  /// `to = offsetof(struct_ty, field)`, resolved against the type registry's
  /// struct layout at lowering time (the aggregate descriptor is what the
  /// (external) object writer would use to recompute this independently).
  OffsetOf { to: LocalId, struct_ty: TypeId, field: Symbol },
}

/// A basic block: a straight-line instruction sequence ending in `Goto`,
/// `Br`, or `Ret` (except possibly the synthesized, unreachable block after
/// an `if`/`else` whose both arms return).
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
  /// Instructions, in execution order.
  pub instrs: Vec<Instr>,
}

/// The control-flow graph of a function body: an ordered sequence of basic
/// blocks, addressed by [`BlockId`].
#[derive(Debug, Clone, Default)]
pub struct Cfg {
  /// Blocks in emission order. Block 0 is always the function's entry block.
  pub blocks: IdxVec<BlockId, BasicBlock>,
}

impl Cfg {
  /// The entry block.
  pub const ENTRY: BlockId = BlockId(0);
}

/// A function body in 3AC form.
#[derive(Debug, Clone, Default)]
pub struct FuncBody {
  /// The type of every local (`%n`), indexed by [`LocalId`]. Locals
  /// `0..nparams` are the function's parameters.
  pub locals: IdxVec<LocalId, TypeId>,
  /// Number of parameters.
  pub nparams: u32,
  /// The control-flow graph.
  pub cfg: Cfg,
}
