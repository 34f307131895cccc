//! The type checker (§4.3): assigns every expression a type, inserts
//! implicit `Convert` nodes, and folds constant subexpressions in place.
//!
//! Grounded on the source compiler's `type_check_expr`/`type_check_stmt`:
//! two-pass over top-level declarations (signatures first, so a function
//! may call one declared later in the file; see [`crate::resolve`] for why
//! `DeclId`s are globally unique rather than scope-local), then bodies.

use std::collections::HashMap;
use crate::diag::Diagnostics;
use crate::span::Pos;
use crate::symbol::Symbol;
use crate::types::ast::*;
use crate::types::entity::PrimType;
use crate::types::ty::{self, Field, Param as TyParam, TypeId, TypeKind, TypeRegistry};

/// Whether an expression is being checked in a context that writes to it
/// (the left side of `=`, the operand of `&`) or merely reads it.
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Category { LValue, RValue }

/// Shared state threaded through the whole type-checking pass.
pub struct Checker<'a> {
  /// Owns every constructed type.
  pub reg: &'a mut TypeRegistry,
  /// Diagnostic sink; type errors are reported here and checking continues
  /// with the `None` sentinel type rather than aborting.
  pub diags: &'a mut Diagnostics,
  /// The type assigned to each declaration (top-level, parameter, or local),
  /// keyed by the globally unique `DeclId` the resolver assigned.
  decl_types: HashMap<DeclId, TypeId>,
  /// Top-level struct types, keyed by declared name, used to resolve
  /// `TypeExprKind::Name` references.
  struct_types: HashMap<Symbol, TypeId>,
  /// The return type of the function currently being checked.
  cur_ret: Option<TypeId>,
}

impl<'a> Checker<'a> {
  /// Type-check every declaration in `module`, returning the type assigned
  /// to each declaration (top-level, parameter, or local) for the 3AC
  /// builder to consult when allocating locals.
  pub fn check_module(
    reg: &'a mut TypeRegistry, diags: &'a mut Diagnostics, module: &mut Module,
  ) -> HashMap<DeclId, TypeId> {
    let mut ck = Checker {
      reg, diags, decl_types: HashMap::new(), struct_types: HashMap::new(), cur_ret: None,
    };
    ck.declare_struct_signatures(module);
    ck.declare_signatures(module);
    for decl in &mut module.decls {
      ck.check_decl_body(decl);
    }
    ck.decl_types
  }

  fn declare_struct_signatures(&mut self, module: &mut Module) {
    for decl in &module.decls {
      if let DeclKind::Struct { fields } = &decl.kind {
        let field_tys: Vec<Field> = fields.iter()
          .map(|(name, te)| Field { name: *name, ty: self.resolve_type_expr(te) })
          .collect();
        let id = self.reg.new_struct(field_tys);
        self.reg.complete(id);
        self.struct_types.insert(decl.name, id);
        self.decl_types.insert(decl.id.expect("resolved"), id);
      }
    }
  }

  fn declare_signatures(&mut self, module: &mut Module) {
    for decl in &mut module.decls {
      match &mut decl.kind {
        DeclKind::Func { params, ret, .. } => {
          let param_tys: Vec<TyParam> = params.iter().map(|p| TyParam {
            name: p.name, ty: self.resolve_type_expr(&p.ty),
          }).collect();
          for (p, ty) in params.iter_mut().zip(param_tys.iter()) {
            self.decl_types.insert(p.id.expect("resolved"), ty.ty);
          }
          let ret_ty = self.resolve_type_expr(ret);
          let fn_ty = self.reg.func(param_tys, ret_ty);
          self.decl_types.insert(decl.id.expect("resolved"), fn_ty);
        }
        DeclKind::Var { ty: Some(te), .. } => {
          let t = self.resolve_type_expr(te);
          self.decl_types.insert(decl.id.expect("resolved"), t);
        }
        DeclKind::Var { ty: None, .. } | DeclKind::Struct { .. } => {}
      }
    }
  }

  fn check_decl_body(&mut self, decl: &mut Decl) {
    match &mut decl.kind {
      DeclKind::Var { ty, init } => {
        let expected = self.decl_types.get(&decl.id.expect("resolved")).copied();
        let t = self.check_expr(init, expected, Category::RValue, true);
        if ty.is_none() {
          self.decl_types.insert(decl.id.expect("resolved"), t);
        }
      }
      DeclKind::Func { ret, body, .. } => {
        let ret_ty = self.resolve_type_expr(ret);
        self.cur_ret = Some(ret_ty);
        self.check_block(body);
        self.cur_ret = None;
      }
      DeclKind::Struct { .. } => {}
    }
  }

  fn check_block(&mut self, block: &mut Block) {
    for stmt in &mut block.stmts {
      self.check_stmt(stmt);
    }
  }

  fn check_stmt(&mut self, stmt: &mut Stmt) {
    match stmt {
      Stmt::Expr(e) => { self.check_expr(e, None, Category::RValue, false); }
      Stmt::Assign(l, r) => {
        let lt = self.check_expr(l, None, Category::LValue, false);
        self.check_expr(r, Some(lt), Category::RValue, false);
      }
      Stmt::Decl(d) => {
        if let DeclKind::Var { ty, init } = &mut d.kind {
          let expected = ty.as_ref().map(|te| self.resolve_type_expr(te));
          let t = self.check_expr(init, expected, Category::RValue, false);
          let final_ty = expected.unwrap_or(t);
          self.decl_types.insert(d.id.expect("resolved"), final_ty);
        }
      }
      Stmt::Return(e) => {
        let expected = self.cur_ret;
        self.check_expr(e, expected, Category::RValue, false);
      }
      Stmt::IfElse(cond, then, els) => {
        let b = self.reg.prim(PrimType::Bool);
        self.check_expr(cond, Some(b), Category::RValue, false);
        self.check_block(then);
        if let Some(els) = els { self.check_block(els) }
      }
      Stmt::While(cond, body) => {
        let b = self.reg.prim(PrimType::Bool);
        self.check_expr(cond, Some(b), Category::RValue, false);
        self.check_block(body);
      }
    }
  }

  /// Resolve a source type annotation into a registry [`TypeId`], completing
  /// it so size/alignment are available. Array dimension expressions are
  /// checked and folded to integer literals as a side effect.
  fn resolve_type_expr(&mut self, te: &TypeExpr) -> TypeId {
    match &te.kind {
      TypeExprKind::Prim(p) => self.reg.prim(*p),
      TypeExprKind::Name(name) => match self.struct_types.get(name) {
        Some(&t) => t,
        None => {
          self.diags.error(te.pos, format!("unknown type `{name}`"));
          self.reg.none()
        }
      },
      TypeExprKind::Ptr(base) => { let b = self.resolve_type_expr(base); self.reg.ptr(b) }
      TypeExprKind::Array(base, dims) => {
        let b = self.resolve_type_expr(base);
        let mut sizes = Vec::with_capacity(dims.len());
        for d in dims {
          let mut d = d.clone();
          let i64_ty = self.reg.prim(PrimType::Int64);
          self.check_expr(&mut d, Some(i64_ty), Category::RValue, true);
          match d.kind {
            ExprKind::Int(v) => sizes.push(v),
            _ => {
              self.diags.error(d.pos, "array dimension must be a constant integer".to_string());
              sizes.push(0);
            }
          }
        }
        let arr = self.reg.array(b, sizes);
        self.reg.complete(arr);
        arr
      }
    }
  }

  /// Type-check (and possibly fold) `e`, verifying strong compatibility
  /// against `expected` when given, inserting an implicit `Convert` if the
  /// checked type differs in kind from `expected`.
  fn check_expr(&mut self, e: &mut Expr, expected: Option<TypeId>, cat: Category, fold: bool) -> TypeId {
    let literal = matches!(e.kind, ExprKind::Int(_));
    let lit_value = if let ExprKind::Int(v) = e.kind { Some(v) } else { None };
    let raw = self.check_expr_inner(e, expected, cat, fold);

    let Some(expected) = expected else {
      e.ty = Some(raw);
      return raw;
    };
    if self.reg.is_none(raw) || self.reg.is_none(expected) {
      e.ty = Some(raw);
      return raw;
    }
    if compatible_strong(self.reg, raw, expected, if literal { lit_value } else { None }) {
      if !ty::same_type(self.reg, raw, expected) && !matches!(e.kind, ExprKind::Convert(..)) {
        insert_convert(e, raw, expected, fold);
      }
      e.ty = Some(expected);
      expected
    } else {
      self.diags.error(e.pos, "incompatible types".to_string());
      e.ty = Some(self.reg.none());
      self.reg.none()
    }
  }

  #[allow(clippy::too_many_lines)]
  fn check_expr_inner(&mut self, e: &mut Expr, expected: Option<TypeId>, cat: Category, fold: bool) -> TypeId {
    match &mut e.kind {
      ExprKind::Int(v) => {
        if cat == Category::LValue {
          self.diags.error(e.pos, "integer literal is not an lvalue".to_string());
          return self.reg.none();
        }
        match expected {
          Some(t) if ty::is_integer(self.reg, t) && fits(self.reg, t, *v) => t,
          _ => narrowest_fitting(self.reg, *v),
        }
      }
      ExprKind::Bool(_) => {
        if cat == Category::LValue {
          self.diags.error(e.pos, "boolean literal is not an lvalue".to_string());
          return self.reg.none();
        }
        self.reg.prim(PrimType::Bool)
      }
      ExprKind::Name(name, id) => {
        let Some(id) = id else { return self.reg.none() };
        match self.decl_types.get(id).copied() {
          Some(t) => t,
          None => {
            self.diags.error(e.pos, format!("use of `{name}` before its type is known"));
            self.reg.none()
          }
        }
      }
      ExprKind::Call(callee, args) => {
        let callee_ty = self.check_expr(callee, None, Category::RValue, false);
        let TypeKind::Func { params, ret } = self.reg.get(callee_ty).kind.clone() else {
          if !self.reg.is_none(callee_ty) {
            self.diags.error(e.pos, "called expression is not a function".to_string());
          }
          return self.reg.none();
        };
        if args.len() != params.len() {
          self.diags.error(e.pos, format!("expected {} argument(s), found {}", params.len(), args.len()));
        }
        for (a, p) in args.iter_mut().zip(params.iter()) {
          self.check_expr(a, Some(p.ty), Category::RValue, false);
        }
        ret
      }
      ExprKind::Binary(..) => {
        let ExprKind::Binary(op, mut l, mut r) =
          std::mem::replace(&mut e.kind, ExprKind::Undef)
        else { unreachable!() };
        let (ty, folded) = self.check_binary(e.pos, op, &mut l, &mut r, fold);
        e.kind = folded.unwrap_or(ExprKind::Binary(op, l, r));
        ty
      }
      ExprKind::LogNot(inner) => {
        let b = self.reg.prim(PrimType::Bool);
        self.check_expr(inner, Some(b), Category::RValue, fold);
        if fold {
          if let ExprKind::Bool(v) = inner.kind {
            e.kind = ExprKind::Bool(!v);
          }
        }
        b
      }
      ExprKind::Address(inner) => {
        if fold {
          self.diags.error(e.pos, "address-of is not a constant expression".to_string());
        }
        let t = self.check_expr(inner, None, Category::LValue, false);
        if self.reg.is_none(t) { t } else { self.reg.ptr(t) }
      }
      ExprKind::Deref(inner) => {
        let t = self.check_expr(inner, None, Category::RValue, false);
        match self.reg.get(t).kind.clone() {
          TypeKind::Ptr { base } => base,
          _ if self.reg.is_none(t) => t,
          _ => { self.diags.error(e.pos, "dereferenced expression is not a pointer".to_string()); self.reg.none() }
        }
      }
      ExprKind::Index(base, args) => {
        let bt = self.check_expr(base, None, cat, false);
        let TypeKind::Array { base: elem, sizes } = self.reg.get(bt).kind.clone() else {
          if !self.reg.is_none(bt) {
            self.diags.error(e.pos, "indexed expression is not an array".to_string());
          }
          return self.reg.none();
        };
        if args.len() != sizes.len() {
          self.diags.error(e.pos, format!("expected {} index/indices, found {}", sizes.len(), args.len()));
        }
        let i64_ty = self.reg.prim(PrimType::Int64);
        for a in args.iter_mut() { self.check_expr(a, Some(i64_ty), Category::RValue, false); }
        elem
      }
      ExprKind::Field(base, field) => {
        let bt = self.check_expr(base, None, cat, false);
        let TypeKind::Struct { fields } = self.reg.get(bt).kind.clone() else {
          if !self.reg.is_none(bt) {
            self.diags.error(e.pos, "field access on non-struct type".to_string());
          }
          return self.reg.none();
        };
        match fields.iter().find(|f| f.name == *field) {
          Some(f) => f.ty,
          None => { self.diags.error(e.pos, format!("no field `{field}`")); self.reg.none() }
        }
      }
      ExprKind::InitList(args) => {
        let Some(expected) = expected else {
          self.diags.error(e.pos, "initializer list has no expected type".to_string());
          return self.reg.none();
        };
        let TypeKind::Array { base, sizes } = self.reg.get(expected).kind.clone() else {
          self.diags.error(e.pos, "initializer list used where an array type is not expected".to_string());
          return self.reg.none();
        };
        let Some(&dim) = sizes.first() else { return expected };
        if args.len() as u64 != dim {
          self.diags.error(e.pos, format!("expected {dim} initializer(s), found {}", args.len()));
        }
        let elem_expected = if sizes.len() > 1 {
          self.reg.array(base, sizes[1..].to_vec())
        } else { base };
        for a in args.iter_mut() {
          self.check_expr(a, Some(elem_expected), Category::RValue, fold);
        }
        expected
      }
      ExprKind::Convert(inner, target) => {
        let target = *target;
        let it = self.check_expr(inner, None, Category::RValue, fold);
        if !weak_compatible(self.reg, it, target) && !self.reg.is_none(it) {
          self.diags.error(e.pos, "invalid conversion".to_string());
        }
        if fold {
          if let ExprKind::Int(v) = inner.kind {
            if let TypeKind::Prim(p) = self.reg.get(target).kind {
              e.kind = ExprKind::Int(truncate(v, ty::int_width(p)));
            }
          }
        }
        target
      }
      ExprKind::Undef => {
        if cat == Category::LValue {
          self.diags.error(e.pos, "`undef` is not an lvalue".to_string());
          return self.reg.none();
        }
        expected.unwrap_or_else(|| self.reg.none())
      }
    }
  }

  /// Returns the result type, and, if `fold` is set and both operands are
  /// now literals, the folded replacement for the whole `Binary` node.
  fn check_binary(
    &mut self, pos: Pos, op: BinOp, l: &mut Expr, r: &mut Expr, fold: bool,
  ) -> (TypeId, Option<ExprKind>) {
    let lt = self.check_expr(l, None, Category::RValue, fold);
    let rt = self.check_expr(r, None, Category::RValue, fold);
    if self.reg.is_none(lt) || self.reg.is_none(rt) {
      let t = if op.is_cmp() { self.reg.prim(PrimType::Bool) } else { self.reg.none() };
      return (t, None);
    }
    if !ty::is_integer(self.reg, lt) || !ty::is_integer(self.reg, rt) {
      self.diags.error(pos, "operands of a binary operator must be integers".to_string());
      let t = if op.is_cmp() { self.reg.prim(PrimType::Bool) } else { self.reg.none() };
      return (t, None);
    }
    let (wl, wr) = (width_of(self.reg, lt), width_of(self.reg, rt));
    let wide = if wl >= wr { lt } else { rt };
    if wl < wr { insert_convert(l, lt, wide, fold) } else if wr < wl { insert_convert(r, rt, wide, fold) }

    let mut folded = None;
    if fold {
      if let (ExprKind::Int(a), ExprKind::Int(b)) = (&l.kind, &r.kind) {
        let (a, b) = (*a, *b);
        folded = match op {
          BinOp::Add => Some(ExprKind::Int(a.wrapping_add(b))),
          BinOp::Sub => Some(ExprKind::Int(a.wrapping_sub(b))),
          BinOp::Mul => Some(ExprKind::Int(a.wrapping_mul(b))),
          BinOp::Cmp(cc) => Some(ExprKind::Bool(eval_cc(cc, a, b))),
        };
      }
    }
    (if op.is_cmp() { self.reg.prim(PrimType::Bool) } else { wide }, folded)
  }
}

fn eval_cc(cc: CC, a: u64, b: u64) -> bool {
  match cc {
    CC::Eq => a == b, CC::Ne => a != b,
    CC::Lt => a < b, CC::Le => a <= b,
    CC::Gt => a > b, CC::Ge => a >= b,
  }
}

fn width_of(reg: &TypeRegistry, t: TypeId) -> u32 {
  match reg.get(t).kind { TypeKind::Prim(p) => ty::int_width(p), _ => 0 }
}

fn truncate(v: u64, width: u32) -> u64 {
  if width >= 64 { v } else { v & ((1u64 << width) - 1) }
}

fn max_for_width(width: u32) -> u64 {
  if width >= 64 { u64::MAX } else { (1u64 << width) - 1 }
}

fn fits(reg: &TypeRegistry, t: TypeId, v: u64) -> bool {
  match reg.get(t).kind { TypeKind::Prim(p) => v <= max_for_width(ty::int_width(p)), _ => false }
}

/// The narrowest of `Int8`/`Int32`/`Int64` whose max value holds `v`.
fn narrowest_fitting(reg: &mut TypeRegistry, v: u64) -> TypeId {
  if v <= max_for_width(8) { reg.prim(PrimType::Int8) }
  else if v <= max_for_width(32) { reg.prim(PrimType::Int32) }
  else { reg.prim(PrimType::Int64) }
}

/// Same type, integer widening, or (for a literal) a value that fits.
fn compatible_strong(reg: &TypeRegistry, actual: TypeId, expected: TypeId, literal: Option<u64>) -> bool {
  if ty::same_type(reg, actual, expected) { return true }
  if ty::is_integer(reg, actual) && ty::is_integer(reg, expected)
    && width_of(reg, actual) <= width_of(reg, expected) { return true }
  if let Some(v) = literal {
    if ty::is_integer(reg, expected) && fits(reg, expected, v) { return true }
  }
  false
}

/// Any primitive-to-primitive pair is weakly compatible; anything else
/// requires identity. Used only by the explicit `Convert` operator.
fn weak_compatible(reg: &TypeRegistry, a: TypeId, b: TypeId) -> bool {
  if ty::same_type(reg, a, b) { return true }
  matches!(reg.get(a).kind, TypeKind::Prim(_)) && matches!(reg.get(b).kind, TypeKind::Prim(_))
}

/// Wrap `e` in an explicit `Convert` node to `target`. If `fold` is set and
/// `e` is already a literal, fold the conversion immediately rather than
/// waiting for a second pass over the newly wrapped node.
fn insert_convert(e: &mut Expr, _from: TypeId, target: TypeId, fold: bool) {
  let pos = e.pos;
  let inner = std::mem::replace(e, Expr::new(pos, ExprKind::Undef));
  if fold {
    if let ExprKind::Int(v) = inner.kind {
      *e = Expr { pos, ty: Some(target), kind: ExprKind::Int(v) };
      return;
    }
  }
  *e = Expr { pos, ty: Some(target), kind: ExprKind::Convert(Box::new(inner), target) };
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbol::intern;

  fn int_ty_name(p: PrimType) -> TypeExpr {
    TypeExpr { pos: Pos::NONE, kind: TypeExprKind::Prim(p) }
  }

  #[test]
  fn int_literal_picks_narrowest_width() {
    let mut reg = TypeRegistry::new();
    let mut diags = Diagnostics::new();
    let mut e = Expr::new(Pos::NONE, ExprKind::Int(300));
    let mut ck = Checker { reg: &mut reg, diags: &mut diags, decl_types: HashMap::new(), struct_types: HashMap::new(), cur_ret: None };
    let t = ck.check_expr(&mut e, None, Category::RValue, false);
    assert!(matches!(ck.reg.get(t).kind, TypeKind::Prim(PrimType::Int32)));
  }

  #[test]
  fn widening_inserts_convert() {
    let mut reg = TypeRegistry::new();
    let mut diags = Diagnostics::new();
    let mut module = Module {
      decls: vec![Decl {
        pos: Pos::NONE, name: intern("f"), id: Some(DeclId(0)),
        kind: DeclKind::Func {
          params: vec![Param { name: intern("a"), pos: Pos::NONE, id: Some(DeclId(1)),
            ty: int_ty_name(PrimType::Int8) }],
          ret: int_ty_name(PrimType::Int32),
          body: Block { stmts: vec![Stmt::Return(Expr::new(
            Pos::NONE,
            ExprKind::Binary(BinOp::Add,
              Box::new(Expr::new(Pos::NONE, ExprKind::Name(intern("a"), Some(DeclId(1))))),
              Box::new(Expr::new(Pos::NONE, ExprKind::Int(5)))),
          ))] },
        },
      }],
    };
    Checker::check_module(&mut reg, &mut diags, &mut module);
    assert!(!diags.has_errors());
    let DeclKind::Func { body, .. } = &module.decls[0].kind else { unreachable!() };
    let Stmt::Return(ret_expr) = &body.stmts[0] else { unreachable!() };
    let ExprKind::Binary(_, l, _) = &ret_expr.kind else { unreachable!() };
    assert!(matches!(l.kind, ExprKind::Convert(..)));
  }

  #[test]
  fn mismatched_return_type_is_reported() {
    let mut reg = TypeRegistry::new();
    let mut diags = Diagnostics::new();
    let mut module = Module {
      decls: vec![Decl {
        pos: Pos::NONE, name: intern("f"), id: Some(DeclId(0)),
        kind: DeclKind::Func {
          params: vec![],
          ret: int_ty_name(PrimType::Int32),
          body: Block { stmts: vec![Stmt::Return(Expr::new(Pos::NONE, ExprKind::Bool(true)))] },
        },
      }],
    };
    Checker::check_module(&mut reg, &mut diags, &mut module);
    assert!(diags.has_errors());
  }
}
