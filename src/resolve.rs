//! Name resolution (§4.2): walks the AST top-down, builds the scope tree,
//! and attaches a [`DeclId`] to every name reference.
//!
//! Top-level declarations are gathered in a pre-pass so that mutual
//! references (a function calling one declared later in the file) resolve
//! without a second parse. Each `Block` statement opens a fresh child scope
//! of the scope it appears in, matching the source compiler's scope-tree
//! shape. `DeclId`s are unique across the whole module (not just within one
//! scope): a single counter assigns top-level declarations their ids first,
//! then parameters and local declarations as they're encountered, so the
//! type checker can key a single `DeclId -> TypeId` map without scope
//! qualification. Top-level symbol indices (used for the linker's relocation
//! table) are a separate, later-assigned concept — see [`crate::linker`].

use crate::diag::Diagnostics;
use crate::types::ast::*;
use crate::types::scope::{ScopeId, ScopeTree};

/// Resolve every name in `module`, attaching [`DeclId`]s to `Expr::Name`
/// nodes and to every declaration (top-level, parameter, and local).
/// Returns the scope tree, rooted at the returned global scope id.
pub fn resolve_module(module: &mut Module, diags: &mut Diagnostics) -> (ScopeTree, ScopeId) {
  let (mut tree, global) = ScopeTree::new();
  let mut next_id = 0u32;

  for decl in module.decls.iter_mut() {
    let id = DeclId(next_id);
    next_id += 1;
    decl.id = Some(id);
    if !tree.declare(global, decl.name, id) {
      diags.error(decl.pos, format!("duplicate declaration of `{}`", decl.name));
    }
  }

  for decl in &mut module.decls {
    resolve_decl_body(decl, &mut tree, global, &mut next_id, diags);
  }

  (tree, global)
}

fn resolve_decl_body(
  decl: &mut Decl, tree: &mut ScopeTree, global: ScopeId, next_id: &mut u32,
  diags: &mut Diagnostics,
) {
  match &mut decl.kind {
    DeclKind::Var { init, .. } => resolve_expr(init, tree, global, diags),
    DeclKind::Func { params, body, .. } => {
      let fn_scope = tree.new_child(global);
      for p in params.iter_mut() {
        let id = DeclId(*next_id);
        *next_id += 1;
        p.id = Some(id);
        if !tree.declare(fn_scope, p.name, id) {
          diags.error(p.pos, format!("duplicate parameter `{}`", p.name));
        }
      }
      resolve_block(body, tree, fn_scope, next_id, diags);
    }
    DeclKind::Struct { .. } => {}
  }
}

fn resolve_block(
  block: &mut Block, tree: &mut ScopeTree, scope: ScopeId, next_id: &mut u32,
  diags: &mut Diagnostics,
) {
  for stmt in &mut block.stmts {
    resolve_stmt(stmt, tree, scope, next_id, diags);
  }
}

fn resolve_stmt(
  stmt: &mut Stmt, tree: &mut ScopeTree, scope: ScopeId, next_id: &mut u32,
  diags: &mut Diagnostics,
) {
  match stmt {
    Stmt::Expr(e) => resolve_expr(e, tree, scope, diags),
    Stmt::Assign(l, r) => {
      resolve_expr(l, tree, scope, diags);
      resolve_expr(r, tree, scope, diags);
    }
    Stmt::Decl(d) => {
      if let DeclKind::Var { init, .. } = &mut d.kind {
        resolve_expr(init, tree, scope, diags);
      }
      let id = DeclId(*next_id);
      *next_id += 1;
      d.id = Some(id);
      if !tree.declare(scope, d.name, id) {
        diags.error(d.pos, format!("duplicate declaration of `{}`", d.name));
      }
    }
    Stmt::Return(e) => resolve_expr(e, tree, scope, diags),
    Stmt::IfElse(cond, then, els) => {
      resolve_expr(cond, tree, scope, diags);
      let then_scope = tree.new_child(scope);
      resolve_block(then, tree, then_scope, next_id, diags);
      if let Some(els) = els {
        let else_scope = tree.new_child(scope);
        resolve_block(els, tree, else_scope, next_id, diags);
      }
    }
    Stmt::While(cond, body) => {
      resolve_expr(cond, tree, scope, diags);
      let body_scope = tree.new_child(scope);
      resolve_block(body, tree, body_scope, next_id, diags);
    }
  }
}

fn resolve_expr(e: &mut Expr, tree: &ScopeTree, scope: ScopeId, diags: &mut Diagnostics) {
  match &mut e.kind {
    ExprKind::Int(_) | ExprKind::Bool(_) | ExprKind::Undef => {}
    ExprKind::Name(name, id) => match tree.lookup(scope, *name) {
      Some(found) => *id = Some(found),
      None => diags.error(e.pos, format!("undeclared name `{name}`")),
    },
    ExprKind::Call(callee, args) => {
      resolve_expr(callee, tree, scope, diags);
      for a in args { resolve_expr(a, tree, scope, diags) }
    }
    ExprKind::Binary(_, l, r) => {
      resolve_expr(l, tree, scope, diags);
      resolve_expr(r, tree, scope, diags);
    }
    ExprKind::LogNot(x) | ExprKind::Address(x) | ExprKind::Deref(x) =>
      resolve_expr(x, tree, scope, diags),
    ExprKind::Index(base, args) => {
      resolve_expr(base, tree, scope, diags);
      for a in args { resolve_expr(a, tree, scope, diags) }
    }
    ExprKind::Field(base, _) => resolve_expr(base, tree, scope, diags),
    ExprKind::InitList(args) => { for a in args { resolve_expr(a, tree, scope, diags) } }
    ExprKind::Convert(x, _) => resolve_expr(x, tree, scope, diags),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::span::Pos;
  use crate::symbol::intern;

  fn name(s: &str) -> Expr { Expr::new(Pos::NONE, ExprKind::Name(intern(s), None)) }

  #[test]
  fn forward_reference_to_later_function_resolves() {
    let mut module = Module {
      decls: vec![
        Decl {
          pos: Pos::NONE, name: intern("f"), id: None,
          kind: DeclKind::Func {
            params: vec![],
            ret: TypeExpr { pos: Pos::NONE, kind: TypeExprKind::Prim(crate::types::entity::PrimType::Int32) },
            body: Block { stmts: vec![Stmt::Return(Expr::new(
              Pos::NONE, ExprKind::Call(Box::new(name("g")), vec![]),
            ))] },
          },
        },
        Decl {
          pos: Pos::NONE, name: intern("g"), id: None,
          kind: DeclKind::Func {
            params: vec![],
            ret: TypeExpr { pos: Pos::NONE, kind: TypeExprKind::Prim(crate::types::entity::PrimType::Int32) },
            body: Block { stmts: vec![Stmt::Return(Expr::new(Pos::NONE, ExprKind::Int(0)))] },
          },
        },
      ],
    };
    let mut diags = Diagnostics::new();
    resolve_module(&mut module, &mut diags);
    assert!(!diags.has_errors());
    let DeclKind::Func { body, .. } = &module.decls[0].kind else { unreachable!() };
    let Stmt::Return(Expr { kind: ExprKind::Call(callee, _), .. }) = &body.stmts[0] else { unreachable!() };
    let ExprKind::Name(_, resolved) = &callee.kind else { unreachable!() };
    assert_eq!(*resolved, Some(DeclId(1)));
  }

  #[test]
  fn undeclared_name_is_reported() {
    let mut module = Module {
      decls: vec![Decl {
        pos: Pos::NONE, name: intern("v"), id: None,
        kind: DeclKind::Var { ty: None, init: name("nope") },
      }],
    };
    let mut diags = Diagnostics::new();
    resolve_module(&mut module, &mut diags);
    assert!(diags.has_errors());
  }

  #[test]
  fn duplicate_top_level_declaration_is_reported() {
    let mut module = Module {
      decls: vec![
        Decl { pos: Pos::NONE, name: intern("dup"), id: None,
          kind: DeclKind::Var { ty: None, init: Expr::new(Pos::NONE, ExprKind::Int(1)) } },
        Decl { pos: Pos::NONE, name: intern("dup"), id: None,
          kind: DeclKind::Var { ty: None, init: Expr::new(Pos::NONE, ExprKind::Int(2)) } },
      ],
    };
    let mut diags = Diagnostics::new();
    resolve_module(&mut module, &mut diags);
    assert_eq!(diags.error_count(), 1);
  }
}
