use crate::lexer::token::Pos;

/// An expression node together with the source position of its first token.
/// The interpreter re-attaches the position to runtime errors.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
  pub kind: ExprKind,
  pub pos: Pos,
}

impl Expr {
  pub fn new(kind: ExprKind, pos: Pos) -> Self {
    Self { kind, pos }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
  // Literals
  None,
  Bool(bool),
  Int(i64),
  Float(f64),
  Str(String),
  Name(String),

  // Postfix access
  GetAttr {
    obj: Box<Expr>,
    name: String,
  },
  GetItem {
    obj: Box<Expr>,
    key: Box<Expr>,
  },
  Slice {
    obj: Box<Expr>,
    start: Option<Box<Expr>>,
    stop: Option<Box<Expr>>,
    step: Option<Box<Expr>>,
  },

  Unary {
    op: UnaryOp,
    expr: Box<Expr>,
  },
  Binary {
    op: BinaryOp,
    left: Box<Expr>,
    right: Box<Expr>,
  },

  // `a if cond else b`; the else arm may be omitted and defaults to none
  Ternary {
    cond: Box<Expr>,
    then: Box<Expr>,
    otherwise: Option<Box<Expr>>,
  },

  Call {
    callee: Box<Expr>,
    args: Vec<Expr>,
    kwargs: Vec<(String, Expr)>,
  },

  // One node per `|` stage
  Filter {
    input: Box<Expr>,
    name: String,
    args: Vec<Expr>,
    kwargs: Vec<(String, Expr)>,
  },

  // `is` / `is not`
  Test {
    input: Box<Expr>,
    name: String,
    args: Vec<Expr>,
    negated: bool,
  },

  List(Vec<Expr>),
  Tuple(Vec<Expr>),
  Dict(Vec<(Expr, Expr)>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
  Not,
  Neg,
  Pos,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
  // Arithmetic
  Add,
  Subtract,
  Multiply,
  Divide,
  FloorDivide,
  Modulo,
  Power,

  // String concatenation (`~`)
  Concat,

  // Comparison
  Equal,
  NotEqual,
  Less,
  LessEqual,
  Greater,
  GreaterEqual,

  // Logical
  And,
  Or,

  // Membership
  In,
  NotIn,
}

/// Assignment target of `set` and the loop variable(s) of `for`.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
  Name(String),
  Tuple(Vec<String>),
  /// `ns.field`: assignment through a namespace object.
  Attr { obj: String, name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroParam {
  pub name: String,
  pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
  // Literal text, emitted verbatim
  Text(String),

  // `{{ expr }}`
  Output(Expr),

  If {
    branches: Vec<(Expr, Vec<Stmt>)>,
    else_body: Vec<Stmt>,
  },

  For {
    target: AssignTarget,
    iter: Expr,
    filter: Option<Expr>,
    body: Vec<Stmt>,
    else_body: Vec<Stmt>,
  },

  // `{% set x = expr %}`
  Set {
    target: AssignTarget,
    value: Expr,
  },

  // `{% set x %} ... {% endset %}`
  SetBlock {
    name: String,
    body: Vec<Stmt>,
  },

  MacroDef {
    name: String,
    params: Vec<MacroParam>,
    body: Vec<Stmt>,
  },

  // `{% call macro(args) %} ... {% endcall %}`
  CallBlock {
    call: Expr,
    body: Vec<Stmt>,
  },
}
