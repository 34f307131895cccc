//! Build the three-address code (3AC) representation from a resolved,
//! type-checked AST (§4.4).
//!
//! Grounded on the source compiler's `convert_to_3ac`/`ir3_decl_func`/
//! `ir3_expr`/`ir3_stmt` (`original_source/src/3ac.c`): declarations are
//! assigned symbol indices in source order before any body is lowered (so
//! forward references resolve), each function gets its own fresh local
//! numbering, and control flow is built by reserving block ids up front and
//! filling their instruction lists in afterward rather than patching byte
//! offsets after the fact (our `Instr::Br`/`Instr::Goto` address blocks
//! directly by [`BlockId`] instead of the source's offset-based labels).
//!
//! Call sites whose callee has no symbol index yet register a relocation
//! through [`crate::linker::SymTable::callee_ref`] rather than leaving a
//! placeholder to patch in this module; [`build_module`] calls
//! [`crate::linker::SymTable::patch_relocs`] once every declaration has a
//! body.

use std::collections::HashMap;
use crate::linker::{SymKind, SymTable};
use crate::types::ast::*;
use crate::types::entity::PrimType;
use crate::types::mir::{BasicBlock, BlockId, CalleeRef, Cfg, FuncBody, Instr, LocalId};
use crate::types::ty::{self, TypeId, TypeKind, TypeRegistry};

/// Lower every declaration in `module` to 3AC, returning the finished
/// symbol table with all relocations patched. `decl_types` is the map
/// produced by [`crate::typeck::Checker::check_module`]; `module` must
/// already be free of diagnostics (the caller checks `Diagnostics::has_errors`
/// before calling this).
pub fn build_module(
  reg: &mut TypeRegistry, module: &Module, decl_types: &HashMap<DeclId, TypeId>,
) -> SymTable {
  let mut table = SymTable::new();
  for decl in &module.decls {
    table.reserve(decl.id.expect("resolved"), decl.name);
  }
  for decl in &module.decls {
    let sym = table.sym_of_decl(decl.id.expect("resolved")).expect("reserved above");
    match &decl.kind {
      DeclKind::Func { params, body, .. } => {
        log::debug!("lowering function `{}` to 3AC", decl.name);
        let func_body = build_func(reg, &mut table, decl_types, sym, params, body);
        table.define(sym, SymKind::Func(func_body));
      }
      DeclKind::Var { init, .. } => {
        let ty = *decl_types.get(&decl.id.expect("resolved")).expect("typed");
        let (_, align) = reg.complete(ty);
        let bytes = serialize_const(reg, init);
        table.define(sym, SymKind::Blob { bytes, align });
      }
      DeclKind::Struct { .. } => {
        let ty = *decl_types.get(&decl.id.expect("resolved")).expect("typed");
        let TypeKind::Struct { fields } = reg.get(ty).kind.clone() else {
          unreachable!("struct decl's type is not TypeKind::Struct")
        };
        table.define(sym, SymKind::Aggregate { fields: fields.iter().map(|f| f.ty).collect() });
      }
    }
  }
  table.patch_relocs();
  table
}

/// Serialize a constant initializer (integer/boolean literal or nested
/// `InitList`) into its little-endian byte representation, per the element
/// type's width. Called only on expressions the type checker has already
/// folded to literals; any other shape reaching here is a compiler bug.
fn serialize_const(reg: &TypeRegistry, e: &Expr) -> Vec<u8> {
  match &e.kind {
    ExprKind::InitList(args) => args.iter().flat_map(|a| serialize_const(reg, a)).collect(),
    ExprKind::Int(v) => {
      let width = match e.ty.map(|t| reg.get(t).kind.clone()) {
        Some(TypeKind::Prim(p)) => ty::int_width(p),
        _ => 64,
      };
      match width {
        8 => vec![*v as u8],
        32 => (*v as u32).to_le_bytes().to_vec(),
        _ => v.to_le_bytes().to_vec(),
      }
    }
    ExprKind::Bool(b) => vec![u8::from(*b)],
    _ => unreachable!("non-constant initializer should have been rejected by the type checker"),
  }
}

fn build_func(
  reg: &mut TypeRegistry, table: &mut SymTable, decl_types: &HashMap<DeclId, TypeId>,
  sym: crate::types::mir::SymId, params: &[Param], body: &Block,
) -> FuncBody {
  let mut b = Builder {
    reg, table, decl_types, sym,
    locals: Default::default(), decl_local: HashMap::new(),
    blocks: Default::default(), cur: BlockId(0),
  };
  b.blocks.push(BasicBlock::default());
  for (i, p) in params.iter().enumerate() {
    let id = p.id.expect("resolved");
    let ty = *b.decl_types.get(&id).expect("typed");
    let local = b.locals.push(ty);
    b.decl_local.insert(id, local);
    b.emit(Instr::Arg { to: local, index: i as u32 });
  }
  let nparams = params.len() as u32;
  b.lower_block(body);
  FuncBody { locals: b.locals, nparams, cfg: Cfg { blocks: b.blocks } }
}

struct Builder<'a> {
  reg: &'a mut TypeRegistry,
  table: &'a mut SymTable,
  decl_types: &'a HashMap<DeclId, TypeId>,
  sym: crate::types::mir::SymId,
  locals: crate::types::IdxVec<LocalId, TypeId>,
  decl_local: HashMap<DeclId, LocalId>,
  blocks: crate::types::IdxVec<BlockId, BasicBlock>,
  cur: BlockId,
}

impl<'a> Builder<'a> {
  fn emit(&mut self, instr: Instr) {
    self.blocks[self.cur].instrs.push(instr);
  }

  fn lower_block(&mut self, block: &Block) {
    for stmt in &block.stmts {
      self.lower_stmt(stmt);
    }
  }

  fn lower_stmt(&mut self, stmt: &Stmt) {
    match stmt {
      Stmt::Expr(e) => { self.lower_expr(e, None); }
      Stmt::Assign(l, r) => {
        let rv = self.lower_expr(r, None);
        self.lower_expr(l, Some(rv));
      }
      Stmt::Decl(d) => self.lower_local_decl(d),
      Stmt::Return(e) => {
        let v = self.lower_expr(e, None);
        self.emit(Instr::Ret { value: v });
      }
      Stmt::IfElse(cond, then, els) => self.lower_if(cond, then, els.as_ref()),
      Stmt::While(cond, body) => self.lower_while(cond, body),
    }
  }

  fn lower_local_decl(&mut self, d: &Decl) {
    let DeclKind::Var { init, .. } = &d.kind else { unreachable!("local decl is always Var") };
    let id = d.id.expect("resolved");
    let ty = *self.decl_types.get(&id).expect("typed");
    if let ExprKind::Name(_, Some(src)) = &init.kind {
      if let Some(&src_local) = self.decl_local.get(src) {
        let local = self.locals.push(ty);
        self.emit(Instr::Copy { to: local, from: src_local });
        self.decl_local.insert(id, local);
        return;
      }
    }
    let v = self.lower_expr(init, None);
    self.decl_local.insert(id, v);
  }

  /// Lower `cond; if then` into `entry -> {then, else} -> post`, matching
  /// the source's `Br NE, %c, %f` shape: branch to `then` when `c != 0`.
  fn lower_if(&mut self, cond: &Expr, then: &Block, els: Option<&Block>) {
    let c = self.lower_expr(cond, None);
    let bool_ty = self.reg.prim(PrimType::Bool);
    let f = self.locals.push(bool_ty);
    self.emit(Instr::Bool { to: f, value: false });
    let then_id = self.blocks.push(BasicBlock::default());
    let else_id = els.map(|_| self.blocks.push(BasicBlock::default()));
    let post_id = self.blocks.push(BasicBlock::default());
    let else_blk = else_id.unwrap_or(post_id);
    self.emit(Instr::Br { cc: CC::Ne, l: c, r: f, then_blk: then_id, else_blk });
    self.cur = then_id;
    self.lower_block(then);
    self.emit(Instr::Goto { target: post_id });
    if let Some(els) = els {
      self.cur = else_id.expect("reserved above");
      self.lower_block(els);
      self.emit(Instr::Goto { target: post_id });
    }
    self.cur = post_id;
  }

  /// Lower `while cond { body }` into the reversed shape: `entry -> cond`,
  /// `body -> cond`, `cond -> {post, body}` so the test runs once per
  /// iteration behind a single backward branch.
  fn lower_while(&mut self, cond: &Expr, body: &Block) {
    let body_id = self.blocks.push(BasicBlock::default());
    let cond_id = self.blocks.push(BasicBlock::default());
    let post_id = self.blocks.push(BasicBlock::default());
    self.emit(Instr::Goto { target: cond_id });
    self.cur = body_id;
    self.lower_block(body);
    self.emit(Instr::Goto { target: cond_id });
    self.cur = cond_id;
    let c = self.lower_expr(cond, None);
    let bool_ty = self.reg.prim(PrimType::Bool);
    let f = self.locals.push(bool_ty);
    self.emit(Instr::Bool { to: f, value: false });
    self.emit(Instr::Br { cc: CC::Eq, l: c, r: f, then_blk: post_id, else_blk: body_id });
    self.cur = post_id;
  }

  /// Lower an expression. `rvalue`, when given, is the value being stored
  /// into `e`'s location (`e` is being used as an lvalue); it is only
  /// honored by the `Deref`/`Index`/`Field` cases.
  fn lower_expr(&mut self, e: &Expr, rvalue: Option<LocalId>) -> LocalId {
    match &e.kind {
      ExprKind::Int(v) => {
        let ty = e.ty.expect("typed");
        let to = self.locals.push(ty);
        self.emit(Instr::Imm { to, value: *v as i64 });
        to
      }
      ExprKind::Bool(v) => {
        let ty = e.ty.expect("typed");
        let to = self.locals.push(ty);
        self.emit(Instr::Bool { to, value: *v });
        to
      }
      ExprKind::Name(_, id) => self.lower_name_read(id.expect("resolved")),
      ExprKind::Call(callee, args) => {
        let ExprKind::Name(_, Some(callee_decl)) = &callee.kind else {
          unreachable!("call target is always a resolved name")
        };
        let arg_locals: Vec<LocalId> = args.iter().map(|a| self.lower_expr(a, None)).collect();
        let to = self.locals.push(e.ty.expect("typed"));
        let instr_index = self.blocks[self.cur].instrs.len();
        let callee_ref = self.table.callee_ref(self.sym, self.cur, instr_index, *callee_decl);
        self.emit(Instr::Call { to, callee: callee_ref, args: arg_locals });
        to
      }
      ExprKind::Binary(op, l, r) => {
        let ll = self.lower_expr(l, None);
        let rr = self.lower_expr(r, None);
        let to = self.locals.push(e.ty.expect("typed"));
        match op {
          BinOp::Add => self.emit(Instr::Add { to, l: ll, r: rr }),
          BinOp::Sub => self.emit(Instr::Sub { to, l: ll, r: rr }),
          BinOp::Mul => self.emit(Instr::Mul { to, l: ll, r: rr }),
          BinOp::Cmp(cc) => self.emit(Instr::Set { to, cc: *cc, l: ll, r: rr }),
        }
        to
      }
      ExprKind::LogNot(inner) => {
        let iv = self.lower_expr(inner, None);
        let to = self.locals.push(e.ty.expect("typed"));
        self.emit(Instr::BoolNeg { to, inner: iv });
        to
      }
      ExprKind::Address(inner) => self.lower_address(inner),
      ExprKind::Deref(inner) => {
        let addr = self.lower_expr(inner, None);
        self.load_or_store(e.ty.expect("typed"), addr, rvalue)
      }
      ExprKind::Index(..) | ExprKind::Field(..) => {
        let addr = self.lower_address(e);
        self.load_or_store(e.ty.expect("typed"), addr, rvalue)
      }
      ExprKind::InitList(_) => {
        let ty = e.ty.expect("typed");
        let (size, align) = self.reg.complete(ty);
        let bytes = serialize_const(self.reg, e);
        let blob = self.table.new_blob(bytes, align);
        let ptr_ty = self.reg.ptr(ty);
        let addr = self.locals.push(ptr_ty);
        self.emit(Instr::GlobalRef { to: addr, sym: blob });
        let to = self.locals.push(ty);
        self.emit(Instr::MemCopy { to, addr, size });
        to
      }
      ExprKind::Convert(inner, target) => {
        let target = *target;
        let from_ty = inner.ty.expect("typed");
        let from_local = self.lower_expr(inner, None);
        let to = self.locals.push(target);
        let (TypeKind::Prim(from_kind), TypeKind::Prim(to_kind)) =
          (self.reg.get(from_ty).kind.clone(), self.reg.get(target).kind.clone())
        else {
          unreachable!("Convert only ever connects primitive types")
        };
        self.emit(Instr::Convert { to, from: from_local, to_kind, from_kind });
        to
      }
      ExprKind::Undef => self.locals.push(e.ty.expect("typed")),
    }
  }

  fn load_or_store(&mut self, ty: TypeId, addr: LocalId, rvalue: Option<LocalId>) -> LocalId {
    if let Some(rv) = rvalue {
      self.emit(Instr::Store { addr, value: rv });
      return rv;
    }
    let (size, _) = self.reg.complete(ty);
    let to = self.locals.push(ty);
    if size <= 8 {
      self.emit(Instr::Load { to, addr });
    } else {
      self.emit(Instr::MemCopy { to, addr, size });
    }
    to
  }

  fn lower_name_read(&mut self, id: DeclId) -> LocalId {
    if let Some(&local) = self.decl_local.get(&id) { return local }
    let ty = *self.decl_types.get(&id).expect("typed");
    let sym = self.table.sym_of_decl(id).expect("global declarations are reserved up front");
    let ptr_ty = self.reg.ptr(ty);
    let addr = self.locals.push(ptr_ty);
    self.emit(Instr::GlobalRef { to: addr, sym });
    self.load_or_store(ty, addr, None)
  }

  /// Compute the address of an lvalue expression, per §4.4's
  /// `Address(sub)` cases.
  fn lower_address(&mut self, e: &Expr) -> LocalId {
    match &e.kind {
      ExprKind::Name(_, id) => {
        let id = id.expect("resolved");
        if let Some(&of) = self.decl_local.get(&id) {
          let ty = self.locals[of];
          let to = self.locals.push(self.reg.ptr(ty));
          self.emit(Instr::Address { to, of });
          return to;
        }
        // A global has no local of its own to take the address of; its
        // storage is the symbol itself, so address-of is a `GlobalRef`,
        // not `Address` over a freshly loaded copy (see `lower_name_read`,
        // which always materializes a throwaway copy of the current value).
        let ty = *self.decl_types.get(&id).expect("typed");
        let sym = self.table.sym_of_decl(id).expect("global declarations are reserved up front");
        let to = self.locals.push(self.reg.ptr(ty));
        self.emit(Instr::GlobalRef { to, sym });
        to
      }
      ExprKind::Deref(inner) => self.lower_expr(inner, None),
      ExprKind::Index(base, args) => {
        let base_addr = self.lower_address(base);
        let TypeKind::Array { base: elem, sizes } = self.reg.get(base.ty.expect("typed")).kind.clone() else {
          unreachable!("indexed expression is always an array after type checking")
        };
        let (elem_size, _) = self.reg.complete(elem);
        let i64_ty = self.reg.prim(PrimType::Int64);
        let mut offset: Option<LocalId> = None;
        for (i, idx_expr) in args.iter().enumerate() {
          let idx = self.lower_expr(idx_expr, None);
          let stride: u64 = sizes[i + 1..].iter().product::<u64>() * u64::from(elem_size);
          let stride_local = self.locals.push(i64_ty);
          self.emit(Instr::Imm { to: stride_local, value: stride as i64 });
          let term = self.locals.push(i64_ty);
          self.emit(Instr::Mul { to: term, l: idx, r: stride_local });
          offset = Some(match offset {
            None => term,
            Some(acc) => {
              let sum = self.locals.push(i64_ty);
              self.emit(Instr::Add { to: sum, l: acc, r: term });
              sum
            }
          });
        }
        let offset = offset.expect("index expression has at least one argument");
        let to = self.locals.push(self.reg.ptr(elem));
        self.emit(Instr::Add { to, l: base_addr, r: offset });
        to
      }
      ExprKind::Field(base, field) => {
        let base_addr = self.lower_address(base);
        let struct_ty = base.ty.expect("typed");
        let TypeKind::Struct { fields } = self.reg.get(struct_ty).kind.clone() else {
          unreachable!("field access base is always a struct after type checking")
        };
        let field_ty = fields.iter().find(|f| f.name == *field).expect("field exists").ty;
        let i64_ty = self.reg.prim(PrimType::Int64);
        let off = self.locals.push(i64_ty);
        self.emit(Instr::OffsetOf { to: off, struct_ty, field: *field });
        let to = self.locals.push(self.reg.ptr(field_ty));
        self.emit(Instr::Add { to, l: base_addr, r: off });
        to
      }
      _ => unreachable!("address-of a non-lvalue expression"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::diag::Diagnostics;
  use crate::span::Pos;
  use crate::symbol::intern;
  use crate::typeck::Checker;

  fn compile(mut module: Module) -> (TypeRegistry, SymTable) {
    let mut diags = Diagnostics::new();
    crate::resolve::resolve_module(&mut module, &mut diags);
    assert!(!diags.has_errors(), "resolve errors: {diags:?}");
    let mut reg = TypeRegistry::new();
    let decl_types = Checker::check_module(&mut reg, &mut diags, &mut module);
    assert!(!diags.has_errors(), "type errors: {diags:?}");
    let table = build_module(&mut reg, &module, &decl_types);
    (reg, table)
  }

  fn i32_ty() -> TypeExpr { TypeExpr { pos: Pos::NONE, kind: TypeExprKind::Prim(PrimType::Int32) } }

  #[test]
  fn trivial_return_lowers_to_imm_and_ret() {
    let module = Module {
      decls: vec![Decl {
        pos: Pos::NONE, name: intern("main"), id: None,
        kind: DeclKind::Func {
          params: vec![], ret: i32_ty(),
          body: Block { stmts: vec![Stmt::Return(Expr::new(Pos::NONE, ExprKind::Int(42)))] },
        },
      }],
    };
    let (_, table) = compile(module);
    let SymKind::Func(body) = &table.syms[crate::types::mir::SymId(0)] else { unreachable!() };
    assert_eq!(body.locals.len(), 1);
    let instrs = &body.cfg.blocks[Cfg::ENTRY].instrs;
    assert!(matches!(instrs[0], Instr::Imm { value: 42, .. }));
    assert!(matches!(instrs[1], Instr::Ret { .. }));
  }

  #[test]
  fn if_else_produces_four_blocks() {
    let module = Module {
      decls: vec![Decl {
        pos: Pos::NONE, name: intern("g"), id: None,
        kind: DeclKind::Func {
          params: vec![Param { name: intern("x"), pos: Pos::NONE, ty: i32_ty(), id: None }],
          ret: i32_ty(),
          body: Block { stmts: vec![Stmt::IfElse(
            Expr::new(Pos::NONE, ExprKind::Binary(BinOp::Cmp(CC::Eq),
              Box::new(Expr::new(Pos::NONE, ExprKind::Name(intern("x"), None))),
              Box::new(Expr::new(Pos::NONE, ExprKind::Int(0))))),
            Block { stmts: vec![Stmt::Return(Expr::new(Pos::NONE, ExprKind::Int(1)))] },
            Some(Block { stmts: vec![Stmt::Return(Expr::new(Pos::NONE, ExprKind::Int(2)))] }),
          )] },
        },
      }],
    };
    let (_, table) = compile(module);
    let SymKind::Func(body) = &table.syms[crate::types::mir::SymId(0)] else { unreachable!() };
    assert_eq!(body.cfg.blocks.len(), 4);
    let Instr::Br { then_blk, else_blk, .. } = body.cfg.blocks[Cfg::ENTRY].instrs.last().unwrap() else {
      unreachable!("entry block must end in Br")
    };
    assert!(matches!(body.cfg.blocks[*then_blk].instrs.last(), Some(Instr::Goto { .. })));
    assert!(matches!(body.cfg.blocks[*else_blk].instrs.last(), Some(Instr::Goto { .. })));
  }

  #[test]
  fn while_loop_uses_reversed_shape() {
    let module = Module {
      decls: vec![Decl {
        pos: Pos::NONE, name: intern("h"), id: None,
        kind: DeclKind::Func {
          params: vec![], ret: i32_ty(),
          body: Block { stmts: vec![
            Stmt::Decl(Decl {
              pos: Pos::NONE, name: intern("i"), id: None,
              kind: DeclKind::Var { ty: None, init: Expr::new(Pos::NONE, ExprKind::Int(0)) },
            }),
            Stmt::While(
              Expr::new(Pos::NONE, ExprKind::Binary(BinOp::Cmp(CC::Lt),
                Box::new(Expr::new(Pos::NONE, ExprKind::Name(intern("i"), None))),
                Box::new(Expr::new(Pos::NONE, ExprKind::Int(10))))),
              Block { stmts: vec![Stmt::Assign(
                Expr::new(Pos::NONE, ExprKind::Name(intern("i"), None)),
                Expr::new(Pos::NONE, ExprKind::Binary(BinOp::Add,
                  Box::new(Expr::new(Pos::NONE, ExprKind::Name(intern("i"), None))),
                  Box::new(Expr::new(Pos::NONE, ExprKind::Int(1))))),
              )] },
            ),
            Stmt::Return(Expr::new(Pos::NONE, ExprKind::Name(intern("i"), None))),
          ] },
        },
      }],
    };
    let (_, table) = compile(module);
    let SymKind::Func(body) = &table.syms[crate::types::mir::SymId(0)] else { unreachable!() };
    assert_eq!(body.cfg.blocks.len(), 4);
    assert!(matches!(body.cfg.blocks[Cfg::ENTRY].instrs.last(), Some(Instr::Goto { .. })));
  }

  #[test]
  fn forward_reference_is_resolved_after_patching() {
    let module = Module {
      decls: vec![
        Decl {
          pos: Pos::NONE, name: intern("f"), id: None,
          kind: DeclKind::Func {
            params: vec![], ret: i32_ty(),
            body: Block { stmts: vec![Stmt::Return(Expr::new(
              Pos::NONE, ExprKind::Call(Box::new(Expr::new(Pos::NONE, ExprKind::Name(intern("g"), None))), vec![]),
            ))] },
          },
        },
        Decl {
          pos: Pos::NONE, name: intern("g"), id: None,
          kind: DeclKind::Func {
            params: vec![], ret: i32_ty(),
            body: Block { stmts: vec![Stmt::Return(Expr::new(Pos::NONE, ExprKind::Int(0)))] },
          },
        },
      ],
    };
    let (_, table) = compile(module);
    assert_eq!(table.pending_relocs(), 0);
    let SymKind::Func(f_body) = &table.syms[crate::types::mir::SymId(0)] else { unreachable!() };
    let Instr::Call { callee, .. } = &f_body.cfg.blocks[Cfg::ENTRY].instrs[0] else {
      unreachable!("call is the first instruction emitted in f's body")
    };
    assert_eq!(*callee, CalleeRef::Known(crate::types::mir::SymId(1)));
  }

  #[test]
  fn address_of_global_emits_global_ref_not_address() {
    let ptr_i32 = TypeExpr { pos: Pos::NONE, kind: TypeExprKind::Ptr(Box::new(i32_ty())) };
    let module = Module {
      decls: vec![
        Decl {
          pos: Pos::NONE, name: intern("g"), id: None,
          kind: DeclKind::Var { ty: Some(i32_ty()), init: Expr::new(Pos::NONE, ExprKind::Int(5)) },
        },
        Decl {
          pos: Pos::NONE, name: intern("f"), id: None,
          kind: DeclKind::Func {
            params: vec![], ret: ptr_i32,
            body: Block { stmts: vec![Stmt::Return(Expr::new(
              Pos::NONE,
              ExprKind::Address(Box::new(Expr::new(Pos::NONE, ExprKind::Name(intern("g"), None)))),
            ))] },
          },
        },
      ],
    };
    let (_, table) = compile(module);
    let SymKind::Func(body) = &table.syms[crate::types::mir::SymId(1)] else { unreachable!() };
    let instrs = &body.cfg.blocks[Cfg::ENTRY].instrs;
    let Instr::GlobalRef { sym, .. } = &instrs[0] else {
      panic!("address-of a global must lower to GlobalRef against the global's own symbol, \
              not Address over a freshly loaded copy")
    };
    assert_eq!(*sym, crate::types::mir::SymId(0));
  }
}
