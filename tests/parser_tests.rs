use tinja::error::ErrorKind;
use tinja::lexer::Lexer;
use tinja::parser::{
  ast::{AssignTarget, BinaryOp, Expr, ExprKind, Stmt},
  Parser,
};

fn parse(source: &str) -> Vec<Stmt> {
  let mut lexer = Lexer::new(source);
  let tokens = lexer.tokenize().expect("lexing should succeed");
  let mut parser = Parser::new(tokens);
  parser.parse().expect("parsing should succeed")
}

fn parse_err(source: &str) -> tinja::TemplateError {
  let mut lexer = Lexer::new(source);
  let tokens = lexer.tokenize().expect("lexing should succeed");
  let mut parser = Parser::new(tokens);
  parser.parse().expect_err("parsing should fail")
}

fn parse_output(source: &str) -> Expr {
  match parse(source).into_iter().next() {
    Some(Stmt::Output(expr)) => expr,
    other => panic!("expected output statement, found {:?}", other),
  }
}

#[test]
fn parses_arithmetic_precedence() {
  let expr = parse_output("{{ 1 + 2 * 3 }}");

  match expr.kind {
    ExprKind::Binary { op, right, .. } => {
      assert_eq!(op, BinaryOp::Add);
      assert!(matches!(
        right.kind,
        ExprKind::Binary {
          op: BinaryOp::Multiply,
          ..
        }
      ));
    }
    other => panic!("expected binary expression, found {:?}", other),
  }
}

#[test]
fn filter_binds_looser_than_arithmetic() {
  // `x + 1 | string` applies the filter to the whole sum
  let expr = parse_output("{{ x + 1 | string }}");

  match expr.kind {
    ExprKind::Filter { input, name, .. } => {
      assert_eq!(name, "string");
      assert!(matches!(
        input.kind,
        ExprKind::Binary {
          op: BinaryOp::Add,
          ..
        }
      ));
    }
    other => panic!("expected filter expression, found {:?}", other),
  }
}

#[test]
fn filter_binds_tighter_than_comparison() {
  let expr = parse_output("{{ a == b | string }}");

  match expr.kind {
    ExprKind::Binary { op, right, .. } => {
      assert_eq!(op, BinaryOp::Equal);
      assert!(matches!(right.kind, ExprKind::Filter { .. }));
    }
    other => panic!("expected comparison, found {:?}", other),
  }
}

#[test]
fn power_is_right_associative() {
  let expr = parse_output("{{ 2 ** 3 ** 2 }}");

  match expr.kind {
    ExprKind::Binary { op, left, right } => {
      assert_eq!(op, BinaryOp::Power);
      assert!(matches!(left.kind, ExprKind::Int(2)));
      assert!(matches!(
        right.kind,
        ExprKind::Binary {
          op: BinaryOp::Power,
          ..
        }
      ));
    }
    other => panic!("expected power expression, found {:?}", other),
  }
}

#[test]
fn parses_ternary_expression() {
  let expr = parse_output("{{ 'a' if cond else 'b' }}");

  match expr.kind {
    ExprKind::Ternary {
      cond, otherwise, ..
    } => {
      assert!(matches!(cond.kind, ExprKind::Name(_)));
      assert!(otherwise.is_some());
    }
    other => panic!("expected ternary, found {:?}", other),
  }
}

#[test]
fn parses_tests_with_negation() {
  let expr = parse_output("{{ x is not none }}");

  match expr.kind {
    ExprKind::Test { name, negated, .. } => {
      assert_eq!(name, "none");
      assert!(negated);
    }
    other => panic!("expected test, found {:?}", other),
  }
}

#[test]
fn parses_membership_operators() {
  let expr = parse_output("{{ a not in b }}");
  assert!(matches!(
    expr.kind,
    ExprKind::Binary {
      op: BinaryOp::NotIn,
      ..
    }
  ));
}

#[test]
fn parses_slices() {
  let expr = parse_output("{{ xs[1:2:3] }}");
  match expr.kind {
    ExprKind::Slice {
      start, stop, step, ..
    } => {
      assert!(start.is_some());
      assert!(stop.is_some());
      assert!(step.is_some());
    }
    other => panic!("expected slice, found {:?}", other),
  }

  let expr = parse_output("{{ xs[::-1] }}");
  match expr.kind {
    ExprKind::Slice {
      start, stop, step, ..
    } => {
      assert!(start.is_none());
      assert!(stop.is_none());
      assert!(step.is_some());
    }
    other => panic!("expected slice, found {:?}", other),
  }
}

#[test]
fn parses_calls_with_keyword_arguments() {
  let expr = parse_output("{{ dict(a=1, b=2) }}");

  match expr.kind {
    ExprKind::Call { args, kwargs, .. } => {
      assert!(args.is_empty());
      assert_eq!(kwargs.len(), 2);
      assert_eq!(kwargs[0].0, "a");
      assert_eq!(kwargs[1].0, "b");
    }
    other => panic!("expected call, found {:?}", other),
  }
}

#[test]
fn parses_if_elif_else_chain() {
  let stmts = parse("{% if a %}1{% elif b %}2{% elif c %}3{% else %}4{% endif %}");

  match &stmts[0] {
    Stmt::If {
      branches,
      else_body,
    } => {
      assert_eq!(branches.len(), 3);
      assert_eq!(else_body.len(), 1);
    }
    other => panic!("expected if statement, found {:?}", other),
  }
}

#[test]
fn parses_for_with_filter_and_else() {
  let stmts = parse("{% for x in xs if x %}{{ x }}{% else %}empty{% endfor %}");

  match &stmts[0] {
    Stmt::For {
      target,
      filter,
      else_body,
      ..
    } => {
      assert_eq!(*target, AssignTarget::Name("x".to_string()));
      assert!(filter.is_some());
      assert_eq!(else_body.len(), 1);
    }
    other => panic!("expected for statement, found {:?}", other),
  }
}

#[test]
fn parses_tuple_unpacking_target() {
  let stmts = parse("{% for k, v in items %}{{ k }}{% endfor %}");

  match &stmts[0] {
    Stmt::For { target, .. } => {
      assert_eq!(
        *target,
        AssignTarget::Tuple(vec!["k".to_string(), "v".to_string()])
      );
    }
    other => panic!("expected for statement, found {:?}", other),
  }
}

#[test]
fn parses_set_forms() {
  let stmts = parse("{% set x = 1 %}{% set ns.flag = true %}{% set y %}text{% endset %}");

  assert!(matches!(
    &stmts[0],
    Stmt::Set {
      target: AssignTarget::Name(_),
      ..
    }
  ));
  match &stmts[1] {
    Stmt::Set {
      target: AssignTarget::Attr { obj, name },
      ..
    } => {
      assert_eq!(obj, "ns");
      assert_eq!(name, "flag");
    }
    other => panic!("expected namespace set, found {:?}", other),
  }
  assert!(matches!(&stmts[2], Stmt::SetBlock { .. }));
}

#[test]
fn parses_macro_with_defaults() {
  let stmts = parse("{% macro greet(name, punct='!') %}Hi {{ name }}{{ punct }}{% endmacro %}");

  match &stmts[0] {
    Stmt::MacroDef { name, params, .. } => {
      assert_eq!(name, "greet");
      assert_eq!(params.len(), 2);
      assert!(params[0].default.is_none());
      assert!(params[1].default.is_some());
    }
    other => panic!("expected macro definition, found {:?}", other),
  }
}

#[test]
fn parses_call_blocks() {
  let stmts = parse("{% call wrap(1) %}inner{% endcall %}");

  match &stmts[0] {
    Stmt::CallBlock { call, body } => {
      assert!(matches!(call.kind, ExprKind::Call { .. }));
      assert_eq!(body.len(), 1);
    }
    other => panic!("expected call block, found {:?}", other),
  }
}

#[test]
fn reports_unknown_tags() {
  let err = parse_err("{% include 'other' %}");

  assert_eq!(err.kind, ErrorKind::Syntax);
  assert!(err.message.contains("Unknown tag 'include'"));
}

#[test]
fn reports_unterminated_blocks() {
  let err = parse_err("{% if x %}never closed");

  assert_eq!(err.kind, ErrorKind::Syntax);
  assert!(err.message.contains("endif"));
}

#[test]
fn reports_stray_end_tags() {
  let err = parse_err("text{% endfor %}");

  assert_eq!(err.kind, ErrorKind::Syntax);
  assert!(err.message.contains("endfor"));
}

#[test]
fn reports_mismatched_end_tags() {
  let err = parse_err("{% if x %}a{% endfor %}");

  assert_eq!(err.kind, ErrorKind::Syntax);
  assert!(err.message.contains("endfor"));
}

#[test]
fn error_positions_point_into_the_source() {
  let err = parse_err("line one\n{% bogus %}");

  assert_eq!(err.kind, ErrorKind::Syntax);
  assert_eq!(err.line, 2);
  assert!(err.offset <= "line one\n{% bogus %}".len());
}
