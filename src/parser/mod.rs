pub mod ast;

use crate::error::TemplateError;
use crate::lexer::token::{Pos, Token, TokenType};
use ast::*;

pub struct Parser {
  tokens: Vec<Token>,
  current: usize,
}

impl Parser {
  pub fn new(tokens: Vec<Token>) -> Self {
    Self { tokens, current: 0 }
  }

  fn current_token(&self) -> &Token {
    &self.tokens[self.current]
  }

  fn current_pos(&self) -> Pos {
    self.current_token().pos
  }

  fn is_at_end(&self) -> bool {
    self.current_token().token_type == TokenType::Eof
  }

  fn peek(&self) -> &Token {
    if self.current + 1 < self.tokens.len() {
      &self.tokens[self.current + 1]
    } else {
      &self.tokens[self.current]
    }
  }

  fn advance(&mut self) -> &Token {
    if !self.is_at_end() {
      self.current += 1;
    }
    &self.tokens[self.current - 1]
  }

  fn check(&self, token_type: TokenType) -> bool {
    self.current_token().token_type == token_type
  }

  fn match_token(&mut self, types: &[TokenType]) -> bool {
    for t in types {
      if self.check(t.clone()) {
        self.advance();
        return true;
      }
    }
    false
  }

  fn consume(&mut self, token_type: TokenType, message: &str) -> Result<&Token, TemplateError> {
    if self.check(token_type) {
      Ok(self.advance())
    } else {
      Err(TemplateError::syntax(
        format!("{}. Got {:?}", message, self.current_token().token_type),
        self.current_pos(),
      ))
    }
  }

  fn consume_ident(&mut self, message: &str) -> Result<String, TemplateError> {
    Ok(self.consume(TokenType::Ident, message)?.lexeme.clone())
  }

  // Main parsing entry point
  pub fn parse(&mut self) -> Result<Vec<Stmt>, TemplateError> {
    let stmts = self.parse_block(&[], "")?;
    if !self.is_at_end() {
      return Err(TemplateError::syntax(
        format!("Unexpected token {:?}", self.current_token().token_type),
        self.current_pos(),
      ));
    }
    Ok(stmts)
  }

  /// Parse statements until one of `enders` follows a `{%`, leaving the
  /// cursor on that `{%`. With no enders, parses to end of input.
  fn parse_block(
    &mut self,
    enders: &[TokenType],
    end_tag: &str,
  ) -> Result<Vec<Stmt>, TemplateError> {
    let mut stmts = Vec::new();

    loop {
      match self.current_token().token_type {
        TokenType::Eof => {
          if enders.is_empty() {
            return Ok(stmts);
          }
          return Err(TemplateError::syntax(
            format!("Unterminated block: expected '{{% {} %}}'", end_tag),
            self.current_pos(),
          ));
        }

        TokenType::Text => {
          let text = self.advance().lexeme.clone();
          stmts.push(Stmt::Text(text));
        }

        TokenType::ExprStart => {
          self.advance();
          let expr = self.expression()?;
          self.consume(TokenType::ExprEnd, "Expected '}}' after expression")?;
          stmts.push(Stmt::Output(expr));
        }

        TokenType::StmtStart => {
          if enders.contains(&self.peek().token_type) {
            return Ok(stmts);
          }
          self.advance();
          stmts.push(self.statement()?);
        }

        _ => {
          return Err(TemplateError::syntax(
            format!("Unexpected token {:?}", self.current_token().token_type),
            self.current_pos(),
          ));
        }
      }
    }
  }

  /// Parse one statement; the opening `{%` has been consumed.
  fn statement(&mut self) -> Result<Stmt, TemplateError> {
    let pos = self.current_pos();
    match self.current_token().token_type.clone() {
      TokenType::If => {
        self.advance();
        self.if_statement()
      }
      TokenType::For => {
        self.advance();
        self.for_statement()
      }
      TokenType::Set => {
        self.advance();
        self.set_statement()
      }
      TokenType::Macro => {
        self.advance();
        self.macro_statement()
      }
      TokenType::Call => {
        self.advance();
        self.call_statement()
      }
      TokenType::Elif
      | TokenType::Else
      | TokenType::EndIf
      | TokenType::EndFor
      | TokenType::EndSet
      | TokenType::EndMacro
      | TokenType::EndCall => Err(TemplateError::syntax(
        format!("Unexpected '{}' outside its block", self.current_token().lexeme),
        pos,
      )),
      TokenType::Ident => Err(TemplateError::syntax(
        format!("Unknown tag '{}'", self.current_token().lexeme),
        pos,
      )),
      ref other => Err(TemplateError::syntax(
        format!("Expected statement keyword. Got {:?}", other),
        pos,
      )),
    }
  }

  fn consume_end_tag(&mut self, token_type: TokenType, name: &str) -> Result<(), TemplateError> {
    self.consume(
      TokenType::StmtStart,
      &format!("Expected '{{% {} %}}'", name),
    )?;
    self.consume(token_type, &format!("Expected '{}'", name))?;
    self.consume(TokenType::StmtEnd, &format!("Expected '%}}' after {}", name))?;
    Ok(())
  }

  fn if_statement(&mut self) -> Result<Stmt, TemplateError> {
    let enders = [TokenType::Elif, TokenType::Else, TokenType::EndIf];
    let mut branches = Vec::new();

    let cond = self.expression()?;
    self.consume(TokenType::StmtEnd, "Expected '%}' after if condition")?;
    let body = self.parse_block(&enders, "endif")?;
    branches.push((cond, body));

    loop {
      self.consume(TokenType::StmtStart, "Expected '{% endif %}'")?;

      if self.match_token(&[TokenType::Elif]) {
        let cond = self.expression()?;
        self.consume(TokenType::StmtEnd, "Expected '%}' after elif condition")?;
        let body = self.parse_block(&enders, "endif")?;
        branches.push((cond, body));
        continue;
      }

      if self.match_token(&[TokenType::Else]) {
        self.consume(TokenType::StmtEnd, "Expected '%}' after else")?;
        let else_body = self.parse_block(&[TokenType::EndIf], "endif")?;
        self.consume_end_tag(TokenType::EndIf, "endif")?;
        return Ok(Stmt::If {
          branches,
          else_body,
        });
      }

      self.consume(TokenType::EndIf, "Expected 'endif'")?;
      self.consume(TokenType::StmtEnd, "Expected '%}' after endif")?;
      return Ok(Stmt::If {
        branches,
        else_body: Vec::new(),
      });
    }
  }

  fn for_statement(&mut self) -> Result<Stmt, TemplateError> {
    let target = self.assign_target(false)?;
    self.consume(TokenType::In, "Expected 'in' after loop variable")?;

    // The iterable is parsed without the conditional form so a trailing
    // `if` starts the loop filter instead of a ternary.
    let iter = self.or_expr()?;

    let filter = if self.match_token(&[TokenType::If]) {
      Some(self.expression()?)
    } else {
      None
    };
    self.consume(TokenType::StmtEnd, "Expected '%}' after for header")?;

    let body = self.parse_block(&[TokenType::Else, TokenType::EndFor], "endfor")?;

    self.consume(TokenType::StmtStart, "Expected '{% endfor %}'")?;
    let else_body = if self.match_token(&[TokenType::Else]) {
      self.consume(TokenType::StmtEnd, "Expected '%}' after else")?;
      let else_body = self.parse_block(&[TokenType::EndFor], "endfor")?;
      self.consume_end_tag(TokenType::EndFor, "endfor")?;
      else_body
    } else {
      self.consume(TokenType::EndFor, "Expected 'endfor'")?;
      self.consume(TokenType::StmtEnd, "Expected '%}' after endfor")?;
      Vec::new()
    };

    Ok(Stmt::For {
      target,
      iter,
      filter,
      body,
      else_body,
    })
  }

  fn set_statement(&mut self) -> Result<Stmt, TemplateError> {
    let target_pos = self.current_pos();
    let target = self.assign_target(true)?;

    if self.match_token(&[TokenType::Assign]) {
      let value = self.expression()?;
      // `set a, b = x, y`: a bare comma on the right builds a tuple.
      let value = if self.check(TokenType::Comma) {
        let pos = value.pos;
        let mut elements = vec![value];
        while self.match_token(&[TokenType::Comma]) {
          elements.push(self.expression()?);
        }
        Expr::new(ExprKind::Tuple(elements), pos)
      } else {
        value
      };
      self.consume(TokenType::StmtEnd, "Expected '%}' after set value")?;
      return Ok(Stmt::Set { target, value });
    }

    // Block form: {% set name %} ... {% endset %}
    let name = match target {
      AssignTarget::Name(name) => name,
      _ => {
        return Err(TemplateError::syntax(
          "Block set requires a single name".to_string(),
          target_pos,
        ));
      }
    };
    self.consume(TokenType::StmtEnd, "Expected '%}' after set name")?;
    let body = self.parse_block(&[TokenType::EndSet], "endset")?;
    self.consume_end_tag(TokenType::EndSet, "endset")?;
    Ok(Stmt::SetBlock { name, body })
  }

  fn macro_statement(&mut self) -> Result<Stmt, TemplateError> {
    let name = self.consume_ident("Expected macro name")?;
    self.consume(TokenType::LParen, "Expected '(' after macro name")?;

    let mut params = Vec::new();
    if !self.check(TokenType::RParen) {
      loop {
        let param_name = self.consume_ident("Expected parameter name")?;
        let default = if self.match_token(&[TokenType::Assign]) {
          Some(self.expression()?)
        } else {
          None
        };
        params.push(MacroParam {
          name: param_name,
          default,
        });

        if !self.match_token(&[TokenType::Comma]) {
          break;
        }
      }
    }
    self.consume(TokenType::RParen, "Expected ')' after parameters")?;
    self.consume(TokenType::StmtEnd, "Expected '%}' after macro header")?;

    let body = self.parse_block(&[TokenType::EndMacro], "endmacro")?;
    self.consume_end_tag(TokenType::EndMacro, "endmacro")?;

    Ok(Stmt::MacroDef { name, params, body })
  }

  fn call_statement(&mut self) -> Result<Stmt, TemplateError> {
    let call_pos = self.current_pos();
    let call = self.expression()?;
    if !matches!(call.kind, ExprKind::Call { .. }) {
      return Err(TemplateError::syntax(
        "Expected a macro call after 'call'".to_string(),
        call_pos,
      ));
    }
    self.consume(TokenType::StmtEnd, "Expected '%}' after call header")?;

    let body = self.parse_block(&[TokenType::EndCall], "endcall")?;
    self.consume_end_tag(TokenType::EndCall, "endcall")?;

    Ok(Stmt::CallBlock { call, body })
  }

  fn assign_target(&mut self, allow_attr: bool) -> Result<AssignTarget, TemplateError> {
    let name = self.consume_ident("Expected a name to assign to")?;

    if allow_attr && self.match_token(&[TokenType::Dot]) {
      let field = self.consume_ident("Expected attribute name after '.'")?;
      return Ok(AssignTarget::Attr { obj: name, name: field });
    }

    if self.check(TokenType::Comma) {
      let mut names = vec![name];
      while self.match_token(&[TokenType::Comma]) {
        names.push(self.consume_ident("Expected a name after ','")?);
      }
      return Ok(AssignTarget::Tuple(names));
    }

    Ok(AssignTarget::Name(name))
  }

  // Expression parsing. Precedence, loosest first: ternary, or, and, not,
  // comparison (with tests and membership), filter pipeline, additive and
  // `~`, multiplicative, unary sign, power, postfix, primary.

  pub fn expression(&mut self) -> Result<Expr, TemplateError> {
    self.ternary()
  }

  fn ternary(&mut self) -> Result<Expr, TemplateError> {
    let expr = self.or_expr()?;

    if self.match_token(&[TokenType::If]) {
      let cond = self.or_expr()?;
      let otherwise = if self.match_token(&[TokenType::Else]) {
        Some(Box::new(self.ternary()?))
      } else {
        None
      };
      let pos = expr.pos;
      return Ok(Expr::new(
        ExprKind::Ternary {
          cond: Box::new(cond),
          then: Box::new(expr),
          otherwise,
        },
        pos,
      ));
    }

    Ok(expr)
  }

  fn or_expr(&mut self) -> Result<Expr, TemplateError> {
    let mut expr = self.and_expr()?;

    while self.match_token(&[TokenType::Or]) {
      let right = self.and_expr()?;
      let pos = expr.pos;
      expr = Expr::new(
        ExprKind::Binary {
          op: BinaryOp::Or,
          left: Box::new(expr),
          right: Box::new(right),
        },
        pos,
      );
    }

    Ok(expr)
  }

  fn and_expr(&mut self) -> Result<Expr, TemplateError> {
    let mut expr = self.not_expr()?;

    while self.match_token(&[TokenType::And]) {
      let right = self.not_expr()?;
      let pos = expr.pos;
      expr = Expr::new(
        ExprKind::Binary {
          op: BinaryOp::And,
          left: Box::new(expr),
          right: Box::new(right),
        },
        pos,
      );
    }

    Ok(expr)
  }

  fn not_expr(&mut self) -> Result<Expr, TemplateError> {
    if self.check(TokenType::Not) && self.peek().token_type != TokenType::In {
      let pos = self.current_pos();
      self.advance();
      let expr = self.not_expr()?;
      return Ok(Expr::new(
        ExprKind::Unary {
          op: UnaryOp::Not,
          expr: Box::new(expr),
        },
        pos,
      ));
    }

    self.comparison()
  }

  fn comparison(&mut self) -> Result<Expr, TemplateError> {
    let mut expr = self.filter_expr()?;

    loop {
      let op = match self.current_token().token_type {
        TokenType::EqEq => Some(BinaryOp::Equal),
        TokenType::NotEq => Some(BinaryOp::NotEqual),
        TokenType::Lt => Some(BinaryOp::Less),
        TokenType::LtEq => Some(BinaryOp::LessEqual),
        TokenType::Gt => Some(BinaryOp::Greater),
        TokenType::GtEq => Some(BinaryOp::GreaterEqual),
        TokenType::In => Some(BinaryOp::In),
        _ => None,
      };

      if let Some(op) = op {
        self.advance();
        let right = self.filter_expr()?;
        let pos = expr.pos;
        expr = Expr::new(
          ExprKind::Binary {
            op,
            left: Box::new(expr),
            right: Box::new(right),
          },
          pos,
        );
        continue;
      }

      if self.check(TokenType::Not) && self.peek().token_type == TokenType::In {
        self.advance();
        self.advance();
        let right = self.filter_expr()?;
        let pos = expr.pos;
        expr = Expr::new(
          ExprKind::Binary {
            op: BinaryOp::NotIn,
            left: Box::new(expr),
            right: Box::new(right),
          },
          pos,
        );
        continue;
      }

      if self.match_token(&[TokenType::Is]) {
        let negated = self.match_token(&[TokenType::Not]);
        let name = self.test_name()?;
        let args = if self.match_token(&[TokenType::LParen]) {
          self.argument_exprs()?
        } else {
          Vec::new()
        };
        let pos = expr.pos;
        expr = Expr::new(
          ExprKind::Test {
            input: Box::new(expr),
            name,
            args,
            negated,
          },
          pos,
        );
        continue;
      }

      break;
    }

    Ok(expr)
  }

  /// Test names are identifiers, plus the keywords that double as test
  /// names (`x is none`, `x is true`, `x is in(seq)`).
  fn test_name(&mut self) -> Result<String, TemplateError> {
    let name = match self.current_token().token_type {
      TokenType::Ident => self.current_token().lexeme.clone(),
      TokenType::None => "none".to_string(),
      TokenType::True => "true".to_string(),
      TokenType::False => "false".to_string(),
      TokenType::In => "in".to_string(),
      ref other => {
        return Err(TemplateError::syntax(
          format!("Expected test name after 'is'. Got {:?}", other),
          self.current_pos(),
        ));
      }
    };
    self.advance();
    Ok(name)
  }

  fn filter_expr(&mut self) -> Result<Expr, TemplateError> {
    let mut expr = self.additive()?;

    while self.match_token(&[TokenType::Pipe]) {
      let name = self.consume_ident("Expected filter name after '|'")?;
      let (args, kwargs) = if self.match_token(&[TokenType::LParen]) {
        self.call_args()?
      } else {
        (Vec::new(), Vec::new())
      };
      let pos = expr.pos;
      expr = Expr::new(
        ExprKind::Filter {
          input: Box::new(expr),
          name,
          args,
          kwargs,
        },
        pos,
      );
    }

    Ok(expr)
  }

  fn additive(&mut self) -> Result<Expr, TemplateError> {
    let mut expr = self.multiplicative()?;

    loop {
      let op = match self.current_token().token_type {
        TokenType::Tilde => BinaryOp::Concat,
        TokenType::Plus => BinaryOp::Add,
        TokenType::Minus => BinaryOp::Subtract,
        _ => break,
      };
      self.advance();
      let right = self.multiplicative()?;
      let pos = expr.pos;
      expr = Expr::new(
        ExprKind::Binary {
          op,
          left: Box::new(expr),
          right: Box::new(right),
        },
        pos,
      );
    }

    Ok(expr)
  }

  fn multiplicative(&mut self) -> Result<Expr, TemplateError> {
    let mut expr = self.unary()?;

    loop {
      let op = match self.current_token().token_type {
        TokenType::Star => BinaryOp::Multiply,
        TokenType::Slash => BinaryOp::Divide,
        TokenType::SlashSlash => BinaryOp::FloorDivide,
        TokenType::Percent => BinaryOp::Modulo,
        _ => break,
      };
      self.advance();
      let right = self.unary()?;
      let pos = expr.pos;
      expr = Expr::new(
        ExprKind::Binary {
          op,
          left: Box::new(expr),
          right: Box::new(right),
        },
        pos,
      );
    }

    Ok(expr)
  }

  fn unary(&mut self) -> Result<Expr, TemplateError> {
    let op = match self.current_token().token_type {
      TokenType::Plus => Some(UnaryOp::Pos),
      TokenType::Minus => Some(UnaryOp::Neg),
      _ => None,
    };

    if let Some(op) = op {
      let pos = self.current_pos();
      self.advance();
      let expr = self.unary()?;
      return Ok(Expr::new(
        ExprKind::Unary {
          op,
          expr: Box::new(expr),
        },
        pos,
      ));
    }

    self.power()
  }

  fn power(&mut self) -> Result<Expr, TemplateError> {
    let expr = self.postfix()?;

    if self.match_token(&[TokenType::StarStar]) {
      // Right-associative: the exponent descends through unary again.
      let right = self.unary()?;
      let pos = expr.pos;
      return Ok(Expr::new(
        ExprKind::Binary {
          op: BinaryOp::Power,
          left: Box::new(expr),
          right: Box::new(right),
        },
        pos,
      ));
    }

    Ok(expr)
  }

  fn postfix(&mut self) -> Result<Expr, TemplateError> {
    let mut expr = self.primary()?;

    loop {
      if self.match_token(&[TokenType::Dot]) {
        let name = self.consume_ident("Expected attribute name after '.'")?;
        let pos = expr.pos;
        expr = Expr::new(
          ExprKind::GetAttr {
            obj: Box::new(expr),
            name,
          },
          pos,
        );
        continue;
      }

      if self.check(TokenType::LBracket) {
        let bracket_pos = self.current_pos();
        self.advance();
        expr = self.index_or_slice(expr, bracket_pos)?;
        continue;
      }

      if self.match_token(&[TokenType::LParen]) {
        let (args, kwargs) = self.call_args()?;
        let pos = expr.pos;
        expr = Expr::new(
          ExprKind::Call {
            callee: Box::new(expr),
            args,
            kwargs,
          },
          pos,
        );
        continue;
      }

      break;
    }

    Ok(expr)
  }

  fn index_or_slice(&mut self, obj: Expr, bracket_pos: Pos) -> Result<Expr, TemplateError> {
    let start = if self.check(TokenType::Colon) {
      None
    } else {
      Some(self.expression()?)
    };

    if self.match_token(&[TokenType::Colon]) {
      let stop = if self.check(TokenType::Colon) || self.check(TokenType::RBracket) {
        None
      } else {
        Some(self.expression()?)
      };
      let step = if self.match_token(&[TokenType::Colon]) {
        if self.check(TokenType::RBracket) {
          None
        } else {
          Some(self.expression()?)
        }
      } else {
        None
      };
      self.consume(TokenType::RBracket, "Expected ']' after slice")?;
      return Ok(Expr::new(
        ExprKind::Slice {
          obj: Box::new(obj),
          start: start.map(Box::new),
          stop: stop.map(Box::new),
          step: step.map(Box::new),
        },
        bracket_pos,
      ));
    }

    self.consume(TokenType::RBracket, "Expected ']' after index")?;
    let key = start.ok_or_else(|| {
      TemplateError::syntax("Expected expression inside '[]'".to_string(), bracket_pos)
    })?;
    Ok(Expr::new(
      ExprKind::GetItem {
        obj: Box::new(obj),
        key: Box::new(key),
      },
      bracket_pos,
    ))
  }

  /// Positional expressions only, up to the closing paren (test arguments).
  fn argument_exprs(&mut self) -> Result<Vec<Expr>, TemplateError> {
    let mut args = Vec::new();
    if !self.check(TokenType::RParen) {
      loop {
        args.push(self.expression()?);
        if !self.match_token(&[TokenType::Comma]) {
          break;
        }
      }
    }
    self.consume(TokenType::RParen, "Expected ')' after arguments")?;
    Ok(args)
  }

  /// Positional and `name=value` keyword arguments; the opening paren has
  /// been consumed.
  fn call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), TemplateError> {
    let mut args = Vec::new();
    let mut kwargs = Vec::new();

    if !self.check(TokenType::RParen) {
      loop {
        if self.check(TokenType::Ident) && self.peek().token_type == TokenType::Assign {
          let name = self.advance().lexeme.clone();
          self.advance(); // =
          let value = self.expression()?;
          kwargs.push((name, value));
        } else {
          if !kwargs.is_empty() {
            return Err(TemplateError::syntax(
              "Positional argument follows keyword argument".to_string(),
              self.current_pos(),
            ));
          }
          args.push(self.expression()?);
        }

        if !self.match_token(&[TokenType::Comma]) {
          break;
        }
      }
    }

    self.consume(TokenType::RParen, "Expected ')' after arguments")?;
    Ok((args, kwargs))
  }

  fn primary(&mut self) -> Result<Expr, TemplateError> {
    let pos = self.current_pos();

    if self.match_token(&[TokenType::True]) {
      return Ok(Expr::new(ExprKind::Bool(true), pos));
    }
    if self.match_token(&[TokenType::False]) {
      return Ok(Expr::new(ExprKind::Bool(false), pos));
    }
    if self.match_token(&[TokenType::None]) {
      return Ok(Expr::new(ExprKind::None, pos));
    }

    if self.check(TokenType::Int) {
      let value = self
        .advance()
        .lexeme
        .parse::<i64>()
        .map_err(|e| TemplateError::syntax(format!("Invalid integer: {}", e), pos))?;
      return Ok(Expr::new(ExprKind::Int(value), pos));
    }

    if self.check(TokenType::Float) {
      let value = self
        .advance()
        .lexeme
        .parse::<f64>()
        .map_err(|e| TemplateError::syntax(format!("Invalid float: {}", e), pos))?;
      return Ok(Expr::new(ExprKind::Float(value), pos));
    }

    if self.check(TokenType::Str) {
      let value = self.advance().lexeme.clone();
      return Ok(Expr::new(ExprKind::Str(value), pos));
    }

    if self.check(TokenType::Ident) {
      let name = self.advance().lexeme.clone();
      return Ok(Expr::new(ExprKind::Name(name), pos));
    }

    // List literal
    if self.match_token(&[TokenType::LBracket]) {
      let mut elements = Vec::new();
      while !self.check(TokenType::RBracket) {
        elements.push(self.expression()?);
        if !self.match_token(&[TokenType::Comma]) {
          break;
        }
      }
      self.consume(TokenType::RBracket, "Expected ']' after list elements")?;
      return Ok(Expr::new(ExprKind::List(elements), pos));
    }

    // Dict literal
    if self.match_token(&[TokenType::LBrace]) {
      let mut pairs = Vec::new();
      while !self.check(TokenType::RBrace) {
        let key = self.expression()?;
        self.consume(TokenType::Colon, "Expected ':' after dict key")?;
        let value = self.expression()?;
        pairs.push((key, value));

        if !self.match_token(&[TokenType::Comma]) {
          break;
        }
      }
      self.consume(TokenType::RBrace, "Expected '}' after dict literal")?;
      return Ok(Expr::new(ExprKind::Dict(pairs), pos));
    }

    // Grouping or tuple literal
    if self.match_token(&[TokenType::LParen]) {
      if self.match_token(&[TokenType::RParen]) {
        return Ok(Expr::new(ExprKind::Tuple(Vec::new()), pos));
      }

      let first = self.expression()?;
      if self.match_token(&[TokenType::Comma]) {
        let mut elements = vec![first];
        while !self.check(TokenType::RParen) {
          elements.push(self.expression()?);
          if !self.match_token(&[TokenType::Comma]) {
            break;
          }
        }
        self.consume(TokenType::RParen, "Expected ')' after tuple elements")?;
        return Ok(Expr::new(ExprKind::Tuple(elements), pos));
      }

      self.consume(TokenType::RParen, "Expected ')' after expression")?;
      return Ok(first);
    }

    Err(TemplateError::syntax(
      format!("Unexpected token {:?}", self.current_token().token_type),
      pos,
    ))
  }
}
