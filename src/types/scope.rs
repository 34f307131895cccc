//! The scope tree produced by name resolution (§4.2).
//!
//! Scopes are stored in a single flat arena and addressed by [`ScopeId`]
//! rather than nested as owned trees of `Scope` values — resolving a block
//! needs to both look up through ancestor scopes and append further child
//! scopes as it goes, which a pointer/owned-tree shape fights the borrow
//! checker over for no real benefit. This mirrors the same stable-index
//! trick used for declarations ([`crate::types::ast::DeclId`]) and types
//! ([`crate::types::ty::TypeId`]).

use std::collections::HashMap;
use crate::symbol::Symbol;
use crate::types::ast::DeclId;
use crate::types::{mk_id, Idx, IdxVec};

mk_id! {
  /// A lexical scope: the global scope, one per function/struct body, and
  /// one per nested `Block` statement.
  ScopeId;
}

#[derive(Debug, Default)]
struct ScopeData {
  parent: Option<ScopeId>,
  refs: HashMap<Symbol, DeclId>,
}

/// The whole program's scope tree, built once by [`crate::resolve::resolve_module`]
/// and read thereafter by the type checker and 3AC builder.
#[derive(Debug, Default)]
pub struct ScopeTree {
  scopes: IdxVec<ScopeId, ScopeData>,
}

impl ScopeTree {
  /// A tree containing only the (empty) global scope, returned as `(tree, global)`.
  #[must_use] pub fn new() -> (Self, ScopeId) {
    let mut scopes = IdxVec::new();
    let global = scopes.push(ScopeData::default());
    (Self { scopes }, global)
  }

  /// Open a new child scope of `parent` and return its id.
  pub fn new_child(&mut self, parent: ScopeId) -> ScopeId {
    self.scopes.push(ScopeData { parent: Some(parent), refs: HashMap::new() })
  }

  /// Introduce `name -> id` directly in `scope`. Returns `false` (without
  /// inserting) if `name` is already bound directly in `scope` — duplicate
  /// declaration in the same scope is a resolve error.
  pub fn declare(&mut self, scope: ScopeId, name: Symbol, id: DeclId) -> bool {
    if self.scopes[scope].refs.contains_key(&name) { return false }
    self.scopes[scope].refs.insert(name, id);
    true
  }

  /// Resolve `name` starting at `scope` and walking outward through parents.
  #[must_use] pub fn lookup(&self, scope: ScopeId, name: Symbol) -> Option<DeclId> {
    let mut cur = Some(scope);
    while let Some(s) = cur {
      if let Some(&id) = self.scopes[s].refs.get(&name) { return Some(id) }
      cur = self.scopes[s].parent;
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn duplicate_declaration_in_same_scope_fails() {
    let (mut tree, global) = ScopeTree::new();
    assert!(tree.declare(global, crate::symbol::intern("x"), DeclId(0)));
    assert!(!tree.declare(global, crate::symbol::intern("x"), DeclId(1)));
  }

  #[test]
  fn lookup_prefers_innermost_scope() {
    let (mut tree, global) = ScopeTree::new();
    let x = crate::symbol::intern("x");
    tree.declare(global, x, DeclId(0));
    let inner = tree.new_child(global);
    tree.declare(inner, x, DeclId(1));
    assert_eq!(tree.lookup(inner, x), Some(DeclId(1)));
    assert_eq!(tree.lookup(global, x), Some(DeclId(0)));
  }

  #[test]
  fn lookup_falls_back_to_ancestor() {
    let (mut tree, global) = ScopeTree::new();
    let y = crate::symbol::intern("y");
    tree.declare(global, y, DeclId(7));
    let inner = tree.new_child(global);
    assert_eq!(tree.lookup(inner, y), Some(DeclId(7)));
  }
}
