//! Primitive type keywords and declaration-kind keywords recognized by the
//! front end.

use crate::symbol::{Symbol, intern, init_dense_symbol_map};

macro_rules! make_prims {
  {$($(#[$attr0:meta])* enum $name:ident {
    $($(#[$attr:meta])* $x:ident: $e:expr,)*
  })* } => {
    $(
      $(#[$attr0])*
      #[derive(Debug, PartialEq, Eq, Copy, Clone)]
      pub enum $name { $($(#[$attr])* $x),* }

      impl $name {
        /// Evaluate a function on all elements of the type, with their keyword spelling.
        pub fn scan(#[allow(unused)] mut f: impl FnMut(Self, &'static str)) {
          $(f($name::$x, $e);)*
        }
        /// Convert a keyword spelling into this type.
        #[allow(clippy::should_implement_trait)]
        #[must_use] pub fn from_str(s: &str) -> Option<Self> {
          match s {
            $($e => Some(Self::$x),)*
            _ => None
          }
        }

        /// Get the variant for an interned symbol, if it names one.
        #[must_use] pub fn from_symbol(s: Symbol) -> Option<Self> {
          use std::sync::LazyLock;
          static SYMBOL_MAP: LazyLock<Box<[Option<$name>]>> = LazyLock::new(|| {
            init_dense_symbol_map(&[$((intern($e), $name::$x)),*])
          });
          SYMBOL_MAP.get(s.into_usize()).copied().flatten()
        }

        /// Get the interned symbol for this keyword.
        #[must_use] pub fn as_symbol(self) -> Symbol {
          use std::sync::LazyLock;
          static INTERNED: LazyLock<[Symbol; <[()]>::len(&[$(()),*])]> =
            LazyLock::new(|| [$(intern($e)),*]);
          INTERNED[self as usize]
        }
      }
    )*
  }
}

make_prims! {
  /// The primitive (unconstructed) types: every other type is built from
  /// these by `Ptr`, `Array`, `Func`, or `Struct`.
  enum PrimType {
    /// `bool`, the type of `true`/`false`; `sizeof bool = 1`.
    Bool: "bool",
    /// `int8`, an 8-bit integer; `sizeof int8 = 1`.
    Int8: "int8",
    /// `int32`, a 32-bit integer; `sizeof int32 = 4`.
    Int32: "int32",
    /// `int64`, a 64-bit integer; `sizeof int64 = 8`.
    Int64: "int64",
  }

  /// Keywords introducing a top-level or block-level declaration.
  enum DeclKeyword {
    /// `decl name: T = init;` or `decl name func(...): T { ... }`.
    Decl: "decl",
    /// Introduces the parameter/return-type list of a function declaration.
    Func: "func",
    /// `struct name { ... }`.
    Struct: "struct",
  }

  /// Statement-introducing keywords.
  enum StmtKeyword {
    /// `return e;`
    Return: "return",
    /// `if (cond) { ... } else { ... }`
    If: "if",
    /// The `else` clause of an `if`.
    Else: "else",
    /// `while (cond) { ... }`
    While: "while",
  }

  /// Boolean literal keywords.
  enum BoolLit {
    /// `true`
    True: "true",
    /// `false`
    False: "false",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn prim_type_round_trips_through_symbol() {
    let sym = intern("int32");
    assert_eq!(PrimType::from_symbol(sym), Some(PrimType::Int32));
    assert_eq!(PrimType::Int32.as_symbol(), sym);
  }

  #[test]
  fn unrelated_symbol_is_not_a_prim_type() {
    assert_eq!(PrimType::from_symbol(intern("banana")), None);
  }

  #[test]
  fn from_str_matches_scan() {
    let mut seen = Vec::new();
    StmtKeyword::scan(|k, s| seen.push((k, s)));
    for (k, s) in seen {
      assert_eq!(StmtKeyword::from_str(s), Some(k));
    }
  }
}
