pub mod builtins;
pub mod value;

use indexmap::IndexMap;
use std::rc::Rc;

use crate::error::TemplateError;
use crate::lexer::token::Pos;
use crate::parser::ast::*;
use builtins::{apply_filter, apply_test, call_global, call_method};
use value::{CallerValue, Environment, MacroValue, Value};

/// Converts runaway macro recursion into a runtime error instead of
/// exhausting the stack.
const MAX_CALL_DEPTH: usize = 200;

pub struct Evaluator {
  pub environment: Environment,
  call_depth: usize,
}

impl Evaluator {
  pub fn new(environment: Environment) -> Self {
    Self {
      environment,
      call_depth: 0,
    }
  }

  pub fn render(&mut self, ast: &[Stmt], capacity: usize) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(capacity);
    self.eval_block(ast, &mut out)?;
    Ok(out)
  }

  fn eval_block(&mut self, stmts: &[Stmt], out: &mut String) -> Result<(), TemplateError> {
    for stmt in stmts {
      self.eval_stmt(stmt, out)?;
    }
    Ok(())
  }

  fn eval_stmt(&mut self, stmt: &Stmt, out: &mut String) -> Result<(), TemplateError> {
    match stmt {
      Stmt::Text(text) => {
        out.push_str(text);
        Ok(())
      }

      Stmt::Output(expr) => {
        let value = self.eval_expr(expr)?;
        out.push_str(&value.render_string());
        Ok(())
      }

      Stmt::If {
        branches,
        else_body,
      } => {
        for (cond, body) in branches {
          if self.eval_expr(cond)?.is_truthy() {
            return self.eval_block(body, out);
          }
        }
        self.eval_block(else_body, out)
      }

      Stmt::For {
        target,
        iter,
        filter,
        body,
        else_body,
      } => self.eval_for(target, iter, filter.as_ref(), body, else_body, out),

      Stmt::Set { target, value } => {
        let evaluated = self.eval_expr(value)?;
        self.bind_target(target, evaluated, value.pos)
      }

      Stmt::SetBlock { name, body } => {
        let mut buf = String::new();
        self.eval_block(body, &mut buf)?;
        self.environment.define(name.clone(), Value::String(buf));
        Ok(())
      }

      Stmt::MacroDef { name, params, body } => {
        let mac = MacroValue {
          name: name.clone(),
          params: params.clone(),
          body: body.clone(),
          closure: self.environment.clone(),
        };
        self
          .environment
          .define(name.clone(), Value::Macro(Rc::new(mac)));
        Ok(())
      }

      Stmt::CallBlock { call, body } => {
        let (callee, args, kwargs) = match &call.kind {
          ExprKind::Call {
            callee,
            args,
            kwargs,
          } => (callee, args, kwargs),
          _ => unreachable!("parser only accepts call expressions here"),
        };

        let callee_val = self.eval_expr(callee)?;
        let mac = match callee_val {
          Value::Macro(mac) => mac,
          other => {
            return Err(TemplateError::runtime(
              format!("'call' target must be a macro, got {}", other.type_name()),
              call.pos,
            ));
          }
        };

        let args = self.eval_args(args)?;
        let kwargs = self.eval_kwargs(kwargs)?;
        let caller = CallerValue {
          body: body.clone(),
          closure: self.environment.clone(),
        };
        let rendered = self.call_macro(&mac, args, kwargs, Some(caller), call.pos)?;
        out.push_str(&rendered);
        Ok(())
      }
    }
  }

  fn eval_for(
    &mut self,
    target: &AssignTarget,
    iter: &Expr,
    filter: Option<&Expr>,
    body: &[Stmt],
    else_body: &[Stmt],
    out: &mut String,
  ) -> Result<(), TemplateError> {
    let iter_val = self.eval_expr(iter)?;

    let items: Vec<Value> = match iter_val {
      Value::List(items) => items,
      Value::Map(map) => map.keys().cloned().map(Value::String).collect(),
      Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
      Value::Namespace(ns) => ns
        .borrow()
        .keys()
        .cloned()
        .map(Value::String)
        .collect(),
      other => {
        return Err(TemplateError::runtime(
          format!("Cannot iterate over a value of type {}", other.type_name()),
          iter.pos,
        ));
      }
    };

    let items = match filter {
      Some(filter) => {
        let mut kept = Vec::new();
        for item in items {
          self.environment.push_scope();
          self.bind_target(target, item.clone(), iter.pos)?;
          let keep = self.eval_expr(filter)?.is_truthy();
          self.environment.pop_scope();
          if keep {
            kept.push(item);
          }
        }
        kept
      }
      Option::None => items,
    };

    if items.is_empty() {
      return self.eval_block(else_body, out);
    }

    let len = items.len();
    for (i, item) in items.iter().enumerate() {
      self.environment.push_scope();
      self.bind_target(target, item.clone(), iter.pos)?;

      let mut loop_map = IndexMap::new();
      loop_map.insert("index".to_string(), Value::Int((i + 1) as i64));
      loop_map.insert("index0".to_string(), Value::Int(i as i64));
      loop_map.insert("revindex".to_string(), Value::Int((len - i) as i64));
      loop_map.insert("revindex0".to_string(), Value::Int((len - i - 1) as i64));
      loop_map.insert("first".to_string(), Value::Bool(i == 0));
      loop_map.insert("last".to_string(), Value::Bool(i == len - 1));
      loop_map.insert("length".to_string(), Value::Int(len as i64));
      if i > 0 {
        loop_map.insert("previtem".to_string(), items[i - 1].clone());
      }
      if i + 1 < len {
        loop_map.insert("nextitem".to_string(), items[i + 1].clone());
      }
      loop_map.insert("cycle".to_string(), Value::Cycle { index: i });
      self
        .environment
        .define("loop".to_string(), Value::Map(loop_map));

      self.eval_block(body, out)?;
      self.environment.pop_scope();
    }

    Ok(())
  }

  fn bind_target(
    &mut self,
    target: &AssignTarget,
    value: Value,
    pos: Pos,
  ) -> Result<(), TemplateError> {
    match target {
      AssignTarget::Name(name) => {
        self.environment.define(name.clone(), value);
        Ok(())
      }

      AssignTarget::Tuple(names) => {
        let items = match value {
          Value::List(items) => items,
          other => {
            return Err(TemplateError::runtime(
              format!(
                "Cannot unpack a value of type {} into {} names",
                other.type_name(),
                names.len()
              ),
              pos,
            ));
          }
        };
        if items.len() != names.len() {
          return Err(TemplateError::runtime(
            format!(
              "Cannot unpack {} values into {} names",
              items.len(),
              names.len()
            ),
            pos,
          ));
        }
        for (name, item) in names.iter().zip(items) {
          self.environment.define(name.clone(), item);
        }
        Ok(())
      }

      AssignTarget::Attr { obj, name } => match self.environment.get(obj) {
        Some(Value::Namespace(ns)) => {
          ns.borrow_mut().insert(name.clone(), value);
          Ok(())
        }
        Some(other) => Err(TemplateError::runtime(
          format!(
            "Can only assign attributes on namespace objects, got {}",
            other.type_name()
          ),
          pos,
        )),
        Option::None => Err(TemplateError::runtime(
          format!("'{}' is undefined", obj),
          pos,
        )),
      },
    }
  }

  pub fn eval_expr(&mut self, expr: &Expr) -> Result<Value, TemplateError> {
    match &expr.kind {
      ExprKind::None => Ok(Value::None),
      ExprKind::Bool(b) => Ok(Value::Bool(*b)),
      ExprKind::Int(n) => Ok(Value::Int(*n)),
      ExprKind::Float(f) => Ok(Value::Float(*f)),
      ExprKind::Str(s) => Ok(Value::String(s.clone())),

      // Unbound names evaluate to none; chat templates rely on this
      // instead of strict lookups.
      ExprKind::Name(name) => Ok(self.environment.get(name).unwrap_or(Value::None)),

      ExprKind::GetAttr { obj, name } => {
        let value = self.eval_expr(obj)?;
        Ok(attr_value(&value, name).unwrap_or(Value::None))
      }

      ExprKind::GetItem { obj, key } => {
        let value = self.eval_expr(obj)?;
        let key = self.eval_expr(key)?;
        Ok(item_value(&value, &key).unwrap_or(Value::None))
      }

      ExprKind::Slice {
        obj,
        start,
        stop,
        step,
      } => self.eval_slice(obj, start.as_deref(), stop.as_deref(), step.as_deref(), expr.pos),

      ExprKind::Unary { op, expr: operand } => {
        let value = self.eval_expr(operand)?;
        match (op, value) {
          (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
          (UnaryOp::Neg, Value::Int(n)) => Ok(Value::Int(-n)),
          (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
          (UnaryOp::Pos, value @ (Value::Int(_) | Value::Float(_))) => Ok(value),
          (op, value) => Err(TemplateError::runtime(
            format!("Invalid operand for unary {:?}: {}", op, value.type_name()),
            expr.pos,
          )),
        }
      }

      ExprKind::Binary { op, left, right } => match op {
        // Short-circuit: the deciding operand is returned as-is.
        BinaryOp::And => {
          let left_val = self.eval_expr(left)?;
          if !left_val.is_truthy() {
            Ok(left_val)
          } else {
            self.eval_expr(right)
          }
        }
        BinaryOp::Or => {
          let left_val = self.eval_expr(left)?;
          if left_val.is_truthy() {
            Ok(left_val)
          } else {
            self.eval_expr(right)
          }
        }
        op => {
          let left_val = self.eval_expr(left)?;
          let right_val = self.eval_expr(right)?;
          eval_binary_op(*op, left_val, right_val, expr.pos)
        }
      },

      ExprKind::Ternary {
        cond,
        then,
        otherwise,
      } => {
        if self.eval_expr(cond)?.is_truthy() {
          self.eval_expr(then)
        } else {
          match otherwise {
            Some(otherwise) => self.eval_expr(otherwise),
            Option::None => Ok(Value::None),
          }
        }
      }

      ExprKind::Call {
        callee,
        args,
        kwargs,
      } => self.eval_call(callee, args, kwargs, expr.pos),

      ExprKind::Filter {
        input,
        name,
        args,
        kwargs,
      } => {
        let input = self.eval_expr(input)?;
        let args = self.eval_args(args)?;
        let kwargs = self.eval_kwargs(kwargs)?;
        apply_filter(name, input, &args, &kwargs)
          .map_err(|msg| TemplateError::runtime(msg, expr.pos))
      }

      ExprKind::Test {
        input,
        name,
        args,
        negated,
      } => {
        // defined/undefined look at the binding itself; evaluating the
        // input would erase the distinction with a bound none.
        if name == "defined" || name == "undefined" {
          let defined = self.expr_is_defined(input)?;
          let result = if name == "defined" { defined } else { !defined };
          return Ok(Value::Bool(result != *negated));
        }

        let value = self.eval_expr(input)?;
        let args = self.eval_args(args)?;
        let result =
          apply_test(name, &value, &args).map_err(|msg| TemplateError::runtime(msg, expr.pos))?;
        Ok(Value::Bool(result != *negated))
      }

      ExprKind::List(elements) => {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
          values.push(self.eval_expr(element)?);
        }
        Ok(Value::List(values))
      }

      // Tuples are lists at runtime.
      ExprKind::Tuple(elements) => {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
          values.push(self.eval_expr(element)?);
        }
        Ok(Value::List(values))
      }

      ExprKind::Dict(pairs) => {
        let mut map = IndexMap::new();
        for (key_expr, value_expr) in pairs {
          let key = match self.eval_expr(key_expr)? {
            Value::String(s) => s,
            other => other.render_string(),
          };
          let value = self.eval_expr(value_expr)?;
          map.insert(key, value);
        }
        Ok(Value::Map(map))
      }
    }
  }

  fn eval_slice(
    &mut self,
    obj: &Expr,
    start: Option<&Expr>,
    stop: Option<&Expr>,
    step: Option<&Expr>,
    pos: Pos,
  ) -> Result<Value, TemplateError> {
    let value = self.eval_expr(obj)?;
    let start = self.eval_slice_index(start, pos)?;
    let stop = self.eval_slice_index(stop, pos)?;
    let step = self.eval_slice_index(step, pos)?.unwrap_or(1);
    if step == 0 {
      return Err(TemplateError::runtime(
        "Slice step cannot be zero".to_string(),
        pos,
      ));
    }

    match value {
      Value::List(items) => {
        let indices = slice_indices(items.len() as i64, start, stop, step);
        Ok(Value::List(
          indices
            .into_iter()
            .map(|i| items[i as usize].clone())
            .collect(),
        ))
      }
      Value::String(s) => {
        let chars: Vec<char> = s.chars().collect();
        let indices = slice_indices(chars.len() as i64, start, stop, step);
        Ok(Value::String(
          indices.into_iter().map(|i| chars[i as usize]).collect(),
        ))
      }
      _ => Ok(Value::None),
    }
  }

  fn eval_slice_index(
    &mut self,
    expr: Option<&Expr>,
    pos: Pos,
  ) -> Result<Option<i64>, TemplateError> {
    match expr {
      Option::None => Ok(Option::None),
      Some(expr) => match self.eval_expr(expr)? {
        Value::Int(n) => Ok(Some(n)),
        Value::None => Ok(Option::None),
        other => Err(TemplateError::runtime(
          format!("Slice indices must be integers, got {}", other.type_name()),
          pos,
        )),
      },
    }
  }

  fn eval_call(
    &mut self,
    callee: &Expr,
    args: &[Expr],
    kwargs: &[(String, Expr)],
    pos: Pos,
  ) -> Result<Value, TemplateError> {
    // Calls through attribute access reach value methods, unless the
    // attribute holds a callable of its own.
    if let ExprKind::GetAttr { obj, name } = &callee.kind {
      let receiver = self.eval_expr(obj)?;
      match attr_value(&receiver, name) {
        Some(value) if value.is_callable() => {
          return self.call_value(value, args, kwargs, pos);
        }
        _ => {
          if !kwargs.is_empty() {
            return Err(TemplateError::runtime(
              format!("Method '{}' takes no keyword arguments", name),
              pos,
            ));
          }
          let args = self.eval_args(args)?;
          return call_method(&receiver, name, &args)
            .map_err(|msg| TemplateError::runtime(msg, pos));
        }
      }
    }

    let callee_val = self.eval_expr(callee)?;
    self.call_value(callee_val, args, kwargs, pos)
  }

  fn call_value(
    &mut self,
    callee: Value,
    args: &[Expr],
    kwargs: &[(String, Expr)],
    pos: Pos,
  ) -> Result<Value, TemplateError> {
    match callee {
      Value::Macro(mac) => {
        let args = self.eval_args(args)?;
        let kwargs = self.eval_kwargs(kwargs)?;
        let rendered = self.call_macro(&mac, args, kwargs, Option::None, pos)?;
        Ok(Value::String(rendered))
      }

      Value::Caller(caller) => {
        let rendered = self.call_caller(&caller, pos)?;
        Ok(Value::String(rendered))
      }

      Value::Builtin(name) => {
        let args = self.eval_args(args)?;
        let kwargs = self.eval_kwargs(kwargs)?;
        call_global(name, &args, &kwargs).map_err(|msg| TemplateError::runtime(msg, pos))
      }

      Value::Native { name, func } => {
        if !kwargs.is_empty() {
          return Err(TemplateError::runtime(
            format!("Function '{}' takes no keyword arguments", name),
            pos,
          ));
        }
        let args = self.eval_args(args)?;
        func(&args).map_err(|msg| TemplateError::runtime(msg, pos))
      }

      Value::Cycle { index } => {
        let args = self.eval_args(args)?;
        if args.is_empty() {
          return Err(TemplateError::runtime(
            "cycle requires at least one argument".to_string(),
            pos,
          ));
        }
        Ok(args[index % args.len()].clone())
      }

      other => Err(TemplateError::runtime(
        format!("Cannot call a value of type {}", other.type_name()),
        pos,
      )),
    }
  }

  fn call_macro(
    &mut self,
    mac: &Rc<MacroValue>,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    caller: Option<CallerValue>,
    pos: Pos,
  ) -> Result<String, TemplateError> {
    if self.call_depth >= MAX_CALL_DEPTH {
      return Err(TemplateError::runtime(
        format!("Maximum call depth exceeded in macro '{}'", mac.name),
        pos,
      ));
    }

    if args.len() > mac.params.len() {
      return Err(TemplateError::runtime(
        format!(
          "Macro '{}' expects at most {} arguments, got {}",
          mac.name,
          mac.params.len(),
          args.len()
        ),
        pos,
      ));
    }
    for (name, _) in &kwargs {
      if !mac.params.iter().any(|p| p.name == *name) {
        return Err(TemplateError::runtime(
          format!("Macro '{}' got an unexpected keyword argument '{}'", mac.name, name),
          pos,
        ));
      }
    }

    // Run in the captured definition environment.
    let saved = std::mem::replace(&mut self.environment, mac.closure.clone());
    self.environment.push_scope();
    self.call_depth += 1;

    let result = self.run_macro_body(mac, args, kwargs, caller, pos);

    self.call_depth -= 1;
    self.environment = saved;
    result
  }

  fn run_macro_body(
    &mut self,
    mac: &Rc<MacroValue>,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    caller: Option<CallerValue>,
    pos: Pos,
  ) -> Result<String, TemplateError> {
    // The macro can call itself even though the closure predates its
    // own definition.
    self
      .environment
      .define(mac.name.clone(), Value::Macro(mac.clone()));

    for (i, param) in mac.params.iter().enumerate() {
      let from_kwargs = kwargs
        .iter()
        .find(|(name, _)| *name == param.name)
        .map(|(_, value)| value.clone());

      let value = if i < args.len() {
        if from_kwargs.is_some() {
          return Err(TemplateError::runtime(
            format!(
              "Macro '{}' got multiple values for argument '{}'",
              mac.name, param.name
            ),
            pos,
          ));
        }
        args[i].clone()
      } else if let Some(value) = from_kwargs {
        value
      } else if let Some(default) = &param.default {
        self.eval_expr(default)?
      } else {
        Value::None
      };

      self.environment.define(param.name.clone(), value);
    }

    if let Some(caller) = caller {
      self
        .environment
        .define("caller".to_string(), Value::Caller(Rc::new(caller)));
    }

    let mut buf = String::new();
    self.eval_block(&mac.body, &mut buf)?;
    Ok(buf)
  }

  fn call_caller(&mut self, caller: &Rc<CallerValue>, pos: Pos) -> Result<String, TemplateError> {
    if self.call_depth >= MAX_CALL_DEPTH {
      return Err(TemplateError::runtime(
        "Maximum call depth exceeded in call block".to_string(),
        pos,
      ));
    }

    let saved = std::mem::replace(&mut self.environment, caller.closure.clone());
    self.environment.push_scope();
    self.call_depth += 1;

    let mut buf = String::new();
    let result = self.eval_block(&caller.body, &mut buf).map(|_| buf);

    self.call_depth -= 1;
    self.environment = saved;
    result
  }

  fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, TemplateError> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
      values.push(self.eval_expr(arg)?);
    }
    Ok(values)
  }

  fn eval_kwargs(
    &mut self,
    kwargs: &[(String, Expr)],
  ) -> Result<Vec<(String, Value)>, TemplateError> {
    let mut values = Vec::with_capacity(kwargs.len());
    for (name, expr) in kwargs {
      values.push((name.clone(), self.eval_expr(expr)?));
    }
    Ok(values)
  }

  /// Binding presence for `is defined` / `is not defined`, without the
  /// permissive none-coercion of a normal lookup.
  fn expr_is_defined(&mut self, expr: &Expr) -> Result<bool, TemplateError> {
    match &expr.kind {
      ExprKind::Name(name) => Ok(self.environment.get(name).is_some()),

      ExprKind::GetAttr { obj, name } => {
        if !self.expr_is_defined(obj)? {
          return Ok(false);
        }
        let value = self.eval_expr(obj)?;
        Ok(attr_value(&value, name).is_some())
      }

      ExprKind::GetItem { obj, key } => {
        if !self.expr_is_defined(obj)? {
          return Ok(false);
        }
        let value = self.eval_expr(obj)?;
        let key = self.eval_expr(key)?;
        Ok(item_value(&value, &key).is_some())
      }

      _ => Ok(true),
    }
  }
}

/// Attribute lookup: on maps and namespaces attribute and item access are
/// the same string-key lookup.
fn attr_value(value: &Value, name: &str) -> Option<Value> {
  match value {
    Value::Map(map) => map.get(name).cloned(),
    Value::Namespace(ns) => ns.borrow().get(name).cloned(),
    _ => Option::None,
  }
}

fn item_value(value: &Value, key: &Value) -> Option<Value> {
  match (value, key) {
    (Value::Map(map), Value::String(k)) => map.get(k).cloned(),
    (Value::Map(map), Value::Int(n)) => map.get(&n.to_string()).cloned(),
    (Value::Namespace(ns), Value::String(k)) => ns.borrow().get(k).cloned(),
    (Value::List(items), Value::Int(n)) => {
      let idx = normalize_index(*n, items.len())?;
      items.get(idx).cloned()
    }
    (Value::String(s), Value::Int(n)) => {
      let chars: Vec<char> = s.chars().collect();
      let idx = normalize_index(*n, chars.len())?;
      chars.get(idx).map(|c| Value::String(c.to_string()))
    }
    _ => Option::None,
  }
}

/// Negative indices count from the end, Python style.
fn normalize_index(index: i64, len: usize) -> Option<usize> {
  let len = len as i64;
  let idx = if index < 0 { index + len } else { index };
  if idx < 0 || idx >= len {
    Option::None
  } else {
    Some(idx as usize)
  }
}

fn slice_indices(len: i64, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<i64> {
  let normalize = |i: i64| if i < 0 { i + len } else { i };
  let mut indices = Vec::new();

  if step > 0 {
    let mut i = start.map(normalize).map(|v| v.clamp(0, len)).unwrap_or(0);
    let stop = stop.map(normalize).map(|v| v.clamp(0, len)).unwrap_or(len);
    while i < stop {
      indices.push(i);
      i += step;
    }
  } else {
    let mut i = start
      .map(normalize)
      .map(|v| v.clamp(-1, len - 1))
      .unwrap_or(len - 1);
    let stop = stop
      .map(normalize)
      .map(|v| v.clamp(-1, len - 1))
      .unwrap_or(-1);
    while i > stop {
      indices.push(i);
      i += step;
    }
  }

  indices
}

fn eval_binary_op(
  op: BinaryOp,
  left: Value,
  right: Value,
  pos: Pos,
) -> Result<Value, TemplateError> {
  let type_error = |left: &Value, right: &Value| {
    TemplateError::runtime(
      format!(
        "Invalid operands for {:?}: {} and {}",
        op,
        left.type_name(),
        right.type_name()
      ),
      pos,
    )
  };

  match op {
    BinaryOp::Add => match (left, right) {
      (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
      (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
      (Value::Int(a), Value::Float(b)) => Ok(Value::Float(a as f64 + b)),
      (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + b as f64)),
      (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
      (Value::List(mut a), Value::List(b)) => {
        a.extend(b);
        Ok(Value::List(a))
      }
      (left, right) => Err(type_error(&left, &right)),
    },

    BinaryOp::Subtract => match (left, right) {
      (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
      (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
      (Value::Int(a), Value::Float(b)) => Ok(Value::Float(a as f64 - b)),
      (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a - b as f64)),
      (left, right) => Err(type_error(&left, &right)),
    },

    BinaryOp::Multiply => match (left, right) {
      (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
      (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
      (Value::Int(a), Value::Float(b)) => Ok(Value::Float(a as f64 * b)),
      (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a * b as f64)),
      (left, right) => Err(type_error(&left, &right)),
    },

    // True division always yields a float.
    BinaryOp::Divide => match (left.as_f64(), right.as_f64()) {
      (Some(a), Some(b)) => {
        if b == 0.0 {
          Err(TemplateError::runtime("Division by zero".to_string(), pos))
        } else {
          Ok(Value::Float(a / b))
        }
      }
      _ => Err(type_error(&left, &right)),
    },

    BinaryOp::FloorDivide => match (left, right) {
      (Value::Int(a), Value::Int(b)) => {
        if b == 0 {
          return Err(TemplateError::runtime("Division by zero".to_string(), pos));
        }
        let quotient = a / b;
        let remainder = a % b;
        if remainder != 0 && (remainder < 0) != (b < 0) {
          Ok(Value::Int(quotient - 1))
        } else {
          Ok(Value::Int(quotient))
        }
      }
      (left, right) => match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => {
          if b == 0.0 {
            Err(TemplateError::runtime("Division by zero".to_string(), pos))
          } else {
            Ok(Value::Float((a / b).floor()))
          }
        }
        _ => Err(type_error(&left, &right)),
      },
    },

    // Modulo takes the sign of the divisor.
    BinaryOp::Modulo => match (left, right) {
      (Value::Int(a), Value::Int(b)) => {
        if b == 0 {
          return Err(TemplateError::runtime("Modulo by zero".to_string(), pos));
        }
        let remainder = a % b;
        if remainder != 0 && (remainder < 0) != (b < 0) {
          Ok(Value::Int(remainder + b))
        } else {
          Ok(Value::Int(remainder))
        }
      }
      (left, right) => match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => {
          if b == 0.0 {
            return Err(TemplateError::runtime("Modulo by zero".to_string(), pos));
          }
          let remainder = a % b;
          if remainder != 0.0 && (remainder < 0.0) != (b < 0.0) {
            Ok(Value::Float(remainder + b))
          } else {
            Ok(Value::Float(remainder))
          }
        }
        _ => Err(type_error(&left, &right)),
      },
    },

    BinaryOp::Power => match (left, right) {
      (Value::Int(a), Value::Int(b)) if b >= 0 => match u32::try_from(b)
        .ok()
        .and_then(|exp| a.checked_pow(exp))
      {
        Some(result) => Ok(Value::Int(result)),
        Option::None => Ok(Value::Float((a as f64).powf(b as f64))),
      },
      (left, right) => match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::Float(a.powf(b))),
        _ => Err(type_error(&left, &right)),
      },
    },

    BinaryOp::Concat => Ok(Value::String(
      left.render_string() + &right.render_string(),
    )),

    BinaryOp::Equal => Ok(Value::Bool(left == right)),
    BinaryOp::NotEqual => Ok(Value::Bool(left != right)),

    BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
      match value::compare_values(&left, &right) {
        Some(ordering) => {
          let result = match op {
            BinaryOp::Less => ordering.is_lt(),
            BinaryOp::LessEqual => ordering.is_le(),
            BinaryOp::Greater => ordering.is_gt(),
            _ => ordering.is_ge(),
          };
          Ok(Value::Bool(result))
        }
        Option::None => Err(TemplateError::runtime(
          format!(
            "Cannot compare {} with {}",
            left.type_name(),
            right.type_name()
          ),
          pos,
        )),
      }
    }

    BinaryOp::In | BinaryOp::NotIn => {
      let contained = value_contains(&right, &left)
        .ok_or_else(|| type_error(&left, &right))?;
      let result = if op == BinaryOp::In {
        contained
      } else {
        !contained
      };
      Ok(Value::Bool(result))
    }

    BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit ops are handled in eval_expr"),
  }
}

/// Membership: substring for strings, element for lists, key for maps.
pub(crate) fn value_contains(container: &Value, needle: &Value) -> Option<bool> {
  match (container, needle) {
    (Value::String(haystack), Value::String(needle)) => Some(haystack.contains(needle.as_str())),
    (Value::List(items), needle) => Some(items.contains(needle)),
    (Value::Map(map), Value::String(key)) => Some(map.contains_key(key)),
    (Value::Namespace(ns), Value::String(key)) => Some(ns.borrow().contains_key(key)),
    _ => Option::None,
  }
}
