//! Identifier interning.
//!
//! Mirrors the source compiler's global identifier table: every identifier
//! encountered by the (external) tokenizer is interned once, so that equality
//! and hashing of identifiers anywhere downstream is a pointer/index compare.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::LazyLock;

/// An interned identifier. Two symbols are equal iff the strings they were
/// interned from are equal; comparing them never touches the backing string.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u32);

impl std::fmt::Debug for Symbol {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:?}", self.as_str())
  }
}

impl std::fmt::Display for Symbol {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl Symbol {
  /// Convert this symbol to a dense `usize` index, suitable for use as a key
  /// into a `Vec`-backed sparse map (see [`init_dense_symbol_map`]).
  #[must_use] pub fn into_usize(self) -> usize { self.0 as usize }

  /// Look up the string this symbol was interned from.
  #[must_use] pub fn as_str(self) -> &'static str {
    INTERNER.lock().unwrap_or_else(std::sync::PoisonError::into_inner).resolve(self)
  }
}

/// The process-wide identifier interner.
pub struct Interner {
  map: HashMap<&'static str, Symbol>,
  strings: Vec<&'static str>,
}

impl Default for Interner {
  fn default() -> Self { Self { map: HashMap::new(), strings: Vec::new() } }
}

impl Interner {
  /// Intern `s`, returning a stable symbol. Interning the same string twice
  /// returns the same symbol.
  pub fn intern(&mut self, s: &str) -> Symbol {
    if let Some(&sym) = self.map.get(s) { return sym }
    let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
    let sym = Symbol(self.strings.len() as u32);
    self.strings.push(leaked);
    self.map.insert(leaked, sym);
    sym
  }

  fn resolve(&self, sym: Symbol) -> &'static str { self.strings[sym.0 as usize] }
}

static INTERNER: LazyLock<Mutex<Interner>> = LazyLock::new(|| Mutex::new(Interner::default()));

/// Intern a string in the global interner.
pub fn intern(s: &str) -> Symbol {
  INTERNER.lock().unwrap_or_else(std::sync::PoisonError::into_inner).intern(s)
}

/// Build a dense lookup table from symbol to `T`, indexed by [`Symbol::into_usize`].
/// Used by keyword/primitive tables that need `Symbol -> enum variant` lookup without
/// a hash map on the hot path.
pub fn init_dense_symbol_map<T: Copy>(pairs: &[(Symbol, T)]) -> Box<[Option<T>]> {
  let len = pairs.iter().map(|(s, _)| s.into_usize() + 1).max().unwrap_or(0);
  let mut v = vec![None; len];
  for &(s, t) in pairs { v[s.into_usize()] = Some(t) }
  v.into_boxed_slice()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interning_is_idempotent() {
    let a = intern("frobnicate");
    let b = intern("frobnicate");
    assert_eq!(a, b);
    assert_eq!(a.as_str(), "frobnicate");
  }

  #[test]
  fn distinct_strings_are_distinct() {
    assert_ne!(intern("foo123"), intern("bar456"));
  }
}
