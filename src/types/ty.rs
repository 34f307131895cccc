//! The type registry (§4.1): interned primitive/pointer/array/function types,
//! plus non-interned struct types, with on-demand size/alignment completion.

use std::collections::HashMap;
use crate::symbol::Symbol;
use crate::types::{mk_id, Idx, IdxVec};
use crate::types::entity::PrimType;

mk_id! {
  /// An index into the type registry's arena of constructed types.
  TypeId;
}

/// A field of a struct type, in declaration order.
#[derive(Debug, Clone)]
pub struct Field {
  /// The field's name.
  pub name: Symbol,
  /// The field's type.
  pub ty: TypeId,
}

/// A parameter of a function type.
#[derive(Debug, Clone)]
pub struct Param {
  /// The parameter's name (used only for diagnostics; function types are
  /// structurally compared without regard to parameter names).
  pub name: Symbol,
  /// The parameter's type.
  pub ty: TypeId,
}

/// The shape of a constructed type. `size`/`align` are `None` until
/// [`TypeRegistry::complete`] has run on this type.
#[derive(Debug, Clone)]
pub struct TypeData {
  /// The constructor and its constituents.
  pub kind: TypeKind,
  /// Size in bytes, once completed.
  pub size: Option<u32>,
  /// Alignment in bytes, once completed.
  pub align: Option<u32>,
}

/// The constructor of a type.
#[derive(Debug, Clone)]
pub enum TypeKind {
  /// The error sentinel: always compatible with everything, never emitted
  /// to 3AC. Produced when a type error leaves an expression's type unknown.
  None,
  /// A primitive scalar.
  Prim(PrimType),
  /// `*base`.
  Ptr { base: TypeId },
  /// An `n`-dimensional array; `sizes[i]` is the literal extent of dimension `i`.
  Array { base: TypeId, sizes: Vec<u64> },
  /// A function signature.
  Func { params: Vec<Param>, ret: TypeId },
  /// A struct, keyed by declaration order. Never interned: each syntactic
  /// `struct` declaration produces a fresh [`TypeId`] even if structurally
  /// identical to another.
  Struct { fields: Vec<Field> },
}

/// Owns every constructed type reachable from the program, and interns
/// primitive/pointer/array/function types so that structurally equal types
/// compare equal by `TypeId`.
#[derive(Debug, Default)]
pub struct TypeRegistry {
  types: IdxVec<TypeId, TypeData>,
  prim_cache: HashMap<PrimType, TypeId>,
  ptr_cache: HashMap<TypeId, TypeId>,
  array_cache: HashMap<(TypeId, Vec<u64>), TypeId>,
  func_cache: HashMap<(Vec<(Symbol, TypeId)>, TypeId), TypeId>,
  none: Option<TypeId>,
}

impl TypeRegistry {
  /// An empty registry.
  #[must_use] pub fn new() -> Self { Self::default() }

  fn insert(&mut self, kind: TypeKind, size: Option<u32>, align: Option<u32>) -> TypeId {
    self.types.push(TypeData { kind, size, align })
  }

  /// The error sentinel type. Interned once per registry.
  pub fn none(&mut self) -> TypeId {
    if let Some(id) = self.none { return id }
    let id = self.insert(TypeKind::None, Some(0), Some(1));
    self.none = Some(id);
    id
  }

  /// The interned type for a primitive keyword.
  pub fn prim(&mut self, p: PrimType) -> TypeId {
    if let Some(&id) = self.prim_cache.get(&p) { return id }
    let (size, align) = match p {
      PrimType::Bool | PrimType::Int8 => (1, 1),
      PrimType::Int32 => (4, 4),
      PrimType::Int64 => (8, 8),
    };
    let id = self.insert(TypeKind::Prim(p), Some(size), Some(align));
    self.prim_cache.insert(p, id);
    id
  }

  /// The interned pointer-to-`base` type.
  pub fn ptr(&mut self, base: TypeId) -> TypeId {
    if let Some(&id) = self.ptr_cache.get(&base) { return id }
    let id = self.insert(TypeKind::Ptr { base }, Some(8), Some(8));
    self.ptr_cache.insert(base, id);
    id
  }

  /// The interned array type with the given base element type and dimension
  /// extents (outermost dimension first). Size/align are left uncompleted
  /// (`None`) until [`TypeRegistry::complete`] runs, mirroring the source
  /// compiler's on-demand `complete_type`.
  pub fn array(&mut self, base: TypeId, sizes: Vec<u64>) -> TypeId {
    let key = (base, sizes.clone());
    if let Some(&id) = self.array_cache.get(&key) { return id }
    let id = self.insert(TypeKind::Array { base, sizes }, None, None);
    self.array_cache.insert(key, id);
    id
  }

  /// The interned function type.
  pub fn func(&mut self, params: Vec<Param>, ret: TypeId) -> TypeId {
    let key = (params.iter().map(|p| (p.name, p.ty)).collect::<Vec<_>>(), ret);
    if let Some(&id) = self.func_cache.get(&key) { return id }
    let id = self.insert(TypeKind::Func { params, ret }, Some(0), Some(1));
    self.func_cache.insert(key, id);
    id
  }

  /// A fresh (non-interned) struct type with the given fields, in declaration order.
  pub fn new_struct(&mut self, fields: Vec<Field>) -> TypeId {
    self.insert(TypeKind::Struct { fields }, None, None)
  }

  /// Borrow a type's data.
  #[must_use] pub fn get(&self, id: TypeId) -> &TypeData { &self.types[id] }

  /// Whether `id` is the error sentinel, which is always compatible with
  /// everything and never emitted to 3AC.
  #[must_use] pub fn is_none(&self, id: TypeId) -> bool { matches!(self.types[id].kind, TypeKind::None) }

  /// Recursively compute `size`/`align` for `id` and everything it references,
  /// memoized on `TypeData::size`. Mirrors `complete_type` in the source
  /// compiler: arrays multiply per-dimension extents into the base size,
  /// structs lay out fields in declaration order with minimal padding, and
  /// the total size is rounded up to the struct's alignment.
  pub fn complete(&mut self, id: TypeId) -> (u32, u32) {
    if let (Some(s), Some(a)) = (self.types[id].size, self.types[id].align) { return (s, a) }
    let (size, align) = match self.types[id].kind.clone() {
      TypeKind::None | TypeKind::Prim(_) | TypeKind::Ptr { .. } | TypeKind::Func { .. } =>
        unreachable!("primitives/ptr/func are always pre-completed"),
      TypeKind::Array { base, sizes } => {
        let (base_size, base_align) = self.complete(base);
        let count: u64 = sizes.iter().product();
        ((base_size as u64 * count) as u32, base_align)
      }
      TypeKind::Struct { fields } => {
        let mut offset: u32 = 0;
        let mut align: u32 = 1;
        for f in &fields {
          let (fsize, falign) = self.complete(f.ty);
          align = align.max(falign);
          offset = round_up(offset, falign) + fsize;
        }
        (round_up(offset, align), align)
      }
    };
    self.types[id].size = Some(size);
    self.types[id].align = Some(align);
    (size, align)
  }

  /// Byte offset of `field_name` within a completed struct type. Panics if
  /// `id` does not name a struct or the field does not exist; callers
  /// (`OffsetOf` lowering) only ever call this after the type checker has
  /// already validated field existence.
  pub fn field_offset(&mut self, id: TypeId, field_name: Symbol) -> u32 {
    self.complete(id);
    let TypeKind::Struct { fields } = self.types[id].kind.clone() else {
      unreachable!("field_offset on non-struct")
    };
    let mut offset = 0u32;
    let mut align = 1u32;
    for f in &fields {
      let (fsize, falign) = self.complete(f.ty);
      align = align.max(falign);
      offset = round_up(offset, falign);
      if f.name == field_name { return offset }
      offset += fsize;
    }
    unreachable!("field {field_name:?} not found, type checker should have rejected this")
  }
}

fn round_up(x: u32, align: u32) -> u32 {
  if align == 0 { x } else { x.div_ceil(align) * align }
}

/// Structural equality of two types, following pointer/array/func/struct
/// constituents recursively. `None` is equal only to itself (it is the
/// sentinel, compatibility with `None` is handled separately by the type
/// checker's compatibility predicates, not by `same_type`).
#[must_use] pub fn same_type(reg: &TypeRegistry, a: TypeId, b: TypeId) -> bool {
  if a == b { return true }
  match (&reg.get(a).kind, &reg.get(b).kind) {
    (TypeKind::Prim(x), TypeKind::Prim(y)) => x == y,
    (TypeKind::Ptr { base: x }, TypeKind::Ptr { base: y }) => same_type(reg, *x, *y),
    (TypeKind::Array { base: bx, sizes: sx }, TypeKind::Array { base: by, sizes: sy }) =>
      sx == sy && same_type(reg, *bx, *by),
    (TypeKind::Func { params: px, ret: rx }, TypeKind::Func { params: py, ret: ry }) =>
      px.len() == py.len()
        && px.iter().zip(py).all(|(a, b)| same_type(reg, a.ty, b.ty))
        && same_type(reg, *rx, *ry),
    (TypeKind::Struct { .. }, TypeKind::Struct { .. }) => false,
    _ => false,
  }
}

/// True if `t` names an integer primitive (`Int8`/`Int32`/`Int64`), used
/// pervasively by the checker to gate arithmetic and the `Convert` operator.
#[must_use] pub fn is_integer(reg: &TypeRegistry, t: TypeId) -> bool {
  matches!(reg.get(t).kind, TypeKind::Prim(PrimType::Int8 | PrimType::Int32 | PrimType::Int64))
}

/// Bit width of an integer primitive.
#[must_use] pub fn int_width(p: PrimType) -> u32 {
  match p {
    PrimType::Bool | PrimType::Int8 => 8,
    PrimType::Int32 => 32,
    PrimType::Int64 => 64,
  }
}
