//! Integration tests driving the whole pipeline from a hand-built AST (the
//! tokenizer/parser is out of scope, so these stand in for source text)
//! through resolution, type checking, 3AC, and 2AC lowering.

use nyanc::linker::SymKind;
use nyanc::span::Pos;
use nyanc::symbol::intern;
use nyanc::types::ast::*;
use nyanc::types::entity::PrimType;
use nyanc::types::mir::SymId;
use nyanc::types::vcode;
use nyanc::Compiler;

fn i32_ty() -> TypeExpr { TypeExpr { pos: Pos::NONE, kind: TypeExprKind::Prim(PrimType::Int32) } }
fn i8_ty() -> TypeExpr { TypeExpr { pos: Pos::NONE, kind: TypeExprKind::Prim(PrimType::Int8) } }

/// Scenario 2: widening addition, checked all the way through 2AC.
#[test]
fn widening_addition_survives_to_2ac() {
  let mut module = Module {
    decls: vec![Decl {
      pos: Pos::NONE, name: intern("f"), id: None,
      kind: DeclKind::Func {
        params: vec![
          Param { name: intern("a"), pos: Pos::NONE, ty: i8_ty(), id: None },
          Param { name: intern("b"), pos: Pos::NONE, ty: i32_ty(), id: None },
        ],
        ret: i32_ty(),
        body: Block { stmts: vec![Stmt::Return(Expr::new(
          Pos::NONE,
          ExprKind::Binary(BinOp::Add,
            Box::new(Expr::new(Pos::NONE, ExprKind::Name(intern("a"), None))),
            Box::new(Expr::new(Pos::NONE, ExprKind::Name(intern("b"), None)))),
        ))] },
      },
    }],
  };
  let mut compiler = Compiler::new();
  let table = compiler.compile(&mut module).expect("well-typed module compiles");
  let SymKind::VCode(body) = &table.syms[SymId(0)] else { panic!("expected a lowered function") };
  let kinds: Vec<&str> = body.instrs.iter().map(|i| match i {
    vcode::Instr::Label(_) => "Label",
    vcode::Instr::Arg { .. } => "Arg",
    vcode::Instr::Convert { .. } => "Convert",
    vcode::Instr::Copy { .. } => "Copy",
    vcode::Instr::Add { .. } => "Add",
    vcode::Instr::Ret { .. } => "Ret",
    _ => "other",
  }).collect();
  assert_eq!(kinds, vec!["Label", "Arg", "Arg", "Convert", "Copy", "Add", "Ret"]);
}

/// Scenario 5: nested array initializer lowers to a blob symbol plus a
/// `GlobalRef`/`MemCopy` pair at the variable's definition site.
#[test]
fn nested_array_initializer_emits_blob_and_memcopy() {
  let rows = |vals: [u64; 3]| Expr::new(Pos::NONE, ExprKind::InitList(
    vals.iter().map(|&v| Expr::new(Pos::NONE, ExprKind::Int(v))).collect(),
  ));
  let init = Expr::new(Pos::NONE, ExprKind::InitList(vec![rows([1, 2, 3]), rows([4, 5, 6])]));
  let ty = TypeExpr {
    pos: Pos::NONE,
    kind: TypeExprKind::Array(
      Box::new(i32_ty()),
      vec![Expr::new(Pos::NONE, ExprKind::Int(2)), Expr::new(Pos::NONE, ExprKind::Int(3))],
    ),
  };
  let mut module = Module {
    decls: vec![Decl {
      pos: Pos::NONE, name: intern("a"), id: None,
      kind: DeclKind::Var { ty: Some(ty), init },
    }],
  };
  let mut compiler = Compiler::new();
  let table = compiler.compile(&mut module).expect("well-typed module compiles");

  // The variable itself is a Blob symbol (its own constant initializer),
  // not a function; there is no second, separately-registered blob since
  // the whole initializer folds into the variable's own storage.
  let SymKind::Blob { bytes, align } = &table.syms[SymId(0)] else { panic!("expected a blob symbol") };
  assert_eq!(*align, 4);
  let expected: Vec<u8> = [1u32, 2, 3, 4, 5, 6].iter().flat_map(|v| v.to_le_bytes()).collect();
  assert_eq!(*bytes, expected);
}

/// Scenario 6: a call to a function declared later in the file is resolved
/// to a symbol index only after every declaration has been lowered.
#[test]
fn forward_call_resolves_through_the_whole_pipeline() {
  let mut module = Module {
    decls: vec![
      Decl {
        pos: Pos::NONE, name: intern("f"), id: None,
        kind: DeclKind::Func {
          params: vec![], ret: i32_ty(),
          body: Block { stmts: vec![Stmt::Return(Expr::new(
            Pos::NONE,
            ExprKind::Call(Box::new(Expr::new(Pos::NONE, ExprKind::Name(intern("g"), None))), vec![]),
          ))] },
        },
      },
      Decl {
        pos: Pos::NONE, name: intern("g"), id: None,
        kind: DeclKind::Func {
          params: vec![], ret: i32_ty(),
          body: Block { stmts: vec![Stmt::Return(Expr::new(Pos::NONE, ExprKind::Int(7)))] },
        },
      },
    ],
  };
  let mut compiler = Compiler::new();
  let table = compiler.compile(&mut module).expect("well-typed module compiles");
  assert_eq!(table.pending_relocs(), 0);
  assert_eq!(table.names.len(), 2);
}

/// A program with a resolve error never reaches 3AC; the driver-facing
/// error surfaces the number of diagnostics rather than panicking.
#[test]
fn ill_typed_program_stops_before_lowering() {
  let mut module = Module {
    decls: vec![Decl {
      pos: Pos::NONE, name: intern("f"), id: None,
      kind: DeclKind::Func {
        params: vec![], ret: i32_ty(),
        body: Block { stmts: vec![Stmt::Return(Expr::new(Pos::NONE, ExprKind::Bool(true)))] },
      },
    }],
  };
  let mut compiler = Compiler::new();
  let err = compiler.compile(&mut module).unwrap_err();
  assert!(matches!(err, nyanc::diag::DriverError::SourceErrors { count: 1 }));
}
