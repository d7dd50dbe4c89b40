use indexmap::IndexMap;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::parser::ast::{MacroParam, Stmt};

/// Host-registered callable. `Arc` so the registry can be shared by
/// concurrent renders of the same template.
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// A macro bound by `{% macro %}`. Captures the environment it was defined
/// in, so free names keep resolving against that chain even after the
/// defining scope is gone.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroValue {
  pub name: String,
  pub params: Vec<MacroParam>,
  pub body: Vec<Stmt>,
  pub closure: Environment,
}

/// The `caller` binding inside a macro invoked through `{% call %}`:
/// renders the call-block body in the caller's captured environment.
#[derive(Debug, Clone, PartialEq)]
pub struct CallerValue {
  pub body: Vec<Stmt>,
  pub closure: Environment,
}

#[derive(Clone)]
pub enum Value {
  None,
  Bool(bool),
  Int(i64),
  Float(f64),
  String(String),
  List(Vec<Value>),
  Map(IndexMap<String, Value>),

  /// Built-in global, dispatched by name (`range`, `dict`, `namespace`,
  /// `strftime_now`, `raise_exception`).
  Builtin(&'static str),
  /// Host-registered function.
  Native { name: String, func: NativeFn },
  Macro(Rc<MacroValue>),
  Caller(Rc<CallerValue>),
  /// `loop.cycle`, bound to one loop iteration.
  Cycle { index: usize },
  /// `namespace()` object: the one value whose fields can be re-assigned,
  /// which is how loop bodies write to outer state.
  Namespace(Rc<RefCell<IndexMap<String, Value>>>),
}

impl Value {
  pub fn is_truthy(&self) -> bool {
    match self {
      Value::None => false,
      Value::Bool(b) => *b,
      Value::Int(n) => *n != 0,
      Value::Float(f) => *f != 0.0,
      Value::String(s) => !s.is_empty(),
      Value::List(items) => !items.is_empty(),
      Value::Map(map) => !map.is_empty(),
      _ => true,
    }
  }

  pub fn type_name(&self) -> &'static str {
    match self {
      Value::None => "none",
      Value::Bool(_) => "bool",
      Value::Int(_) => "int",
      Value::Float(_) => "float",
      Value::String(_) => "string",
      Value::List(_) => "list",
      Value::Map(_) => "map",
      Value::Builtin(_) | Value::Native { .. } => "function",
      Value::Macro(_) => "macro",
      Value::Caller(_) => "caller",
      Value::Cycle { .. } => "function",
      Value::Namespace(_) => "namespace",
    }
  }

  pub fn is_callable(&self) -> bool {
    matches!(
      self,
      Value::Builtin(_)
        | Value::Native { .. }
        | Value::Macro(_)
        | Value::Caller(_)
        | Value::Cycle { .. }
    )
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Int(n) => Some(*n as f64),
      Value::Float(f) => Some(*f),
      _ => None,
    }
  }

  /// The form `{{ ... }}` emits: none renders as nothing, strings render
  /// bare, containers render in their repr form.
  pub fn render_string(&self) -> String {
    match self {
      Value::None => String::new(),
      Value::String(s) => s.clone(),
      _ => self.repr(),
    }
  }

  /// Python-repr-like form used inside containers: single-quoted strings,
  /// `True`/`False`/`None`, `", "` between items, `": "` after keys.
  pub fn repr(&self) -> String {
    match self {
      Value::None => "None".to_string(),
      Value::Bool(true) => "True".to_string(),
      Value::Bool(false) => "False".to_string(),
      Value::Int(n) => n.to_string(),
      Value::Float(f) => format_float(*f),
      Value::String(s) => repr_string(s),
      Value::List(items) => {
        let parts: Vec<String> = items.iter().map(|v| v.repr()).collect();
        format!("[{}]", parts.join(", "))
      }
      Value::Map(map) => {
        let parts: Vec<String> = map
          .iter()
          .map(|(k, v)| format!("{}: {}", repr_string(k), v.repr()))
          .collect();
        format!("{{{}}}", parts.join(", "))
      }
      Value::Namespace(ns) => {
        let parts: Vec<String> = ns
          .borrow()
          .iter()
          .map(|(k, v)| format!("{}: {}", repr_string(k), v.repr()))
          .collect();
        format!("namespace({})", parts.join(", "))
      }
      Value::Builtin(name) => format!("<function {}>", name),
      Value::Native { name, .. } => format!("<function {}>", name),
      Value::Macro(m) => format!("<macro {}>", m.name),
      Value::Caller(_) => "<caller>".to_string(),
      Value::Cycle { .. } => "<function cycle>".to_string(),
    }
  }

  /// JSON text with Python `json.dumps` spacing: `", "` and `": "`
  /// separators compact, `","` and `": "` with an indent width.
  pub fn to_json(&self, indent: Option<usize>) -> String {
    let mut out = String::new();
    self.write_json(&mut out, indent, 0);
    out
  }

  fn write_json(&self, out: &mut String, indent: Option<usize>, depth: usize) {
    match self {
      Value::None | Value::Builtin(_) | Value::Native { .. } | Value::Macro(_)
      | Value::Caller(_) | Value::Cycle { .. } => out.push_str("null"),
      Value::Bool(true) => out.push_str("true"),
      Value::Bool(false) => out.push_str("false"),
      Value::Int(n) => out.push_str(&n.to_string()),
      Value::Float(f) => out.push_str(&format_float(*f)),
      Value::String(s) => write_json_string(out, s),
      Value::List(items) => {
        if items.is_empty() {
          out.push_str("[]");
          return;
        }
        out.push('[');
        for (i, item) in items.iter().enumerate() {
          if i > 0 {
            out.push(',');
            if indent.is_none() {
              out.push(' ');
            }
          }
          push_json_newline(out, indent, depth + 1);
          item.write_json(out, indent, depth + 1);
        }
        push_json_newline(out, indent, depth);
        out.push(']');
      }
      Value::Map(map) => write_json_map(out, map.iter(), indent, depth),
      Value::Namespace(ns) => write_json_map(out, ns.borrow().iter(), indent, depth),
    }
  }
}

fn write_json_map<'a>(
  out: &mut String,
  entries: impl Iterator<Item = (&'a String, &'a Value)>,
  indent: Option<usize>,
  depth: usize,
) {
  let mut first = true;
  let start = out.len();
  out.push('{');
  for (key, value) in entries {
    if !first {
      out.push(',');
      if indent.is_none() {
        out.push(' ');
      }
    }
    first = false;
    push_json_newline(out, indent, depth + 1);
    write_json_string(out, key);
    out.push_str(": ");
    value.write_json(out, indent, depth + 1);
  }
  if first {
    out.truncate(start);
    out.push_str("{}");
    return;
  }
  push_json_newline(out, indent, depth);
  out.push('}');
}

fn push_json_newline(out: &mut String, indent: Option<usize>, depth: usize) {
  if let Some(width) = indent {
    out.push('\n');
    for _ in 0..depth * width {
      out.push(' ');
    }
  }
}

fn write_json_string(out: &mut String, s: &str) {
  out.push('"');
  for ch in s.chars() {
    match ch {
      '"' => out.push_str("\\\""),
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      '\t' => out.push_str("\\t"),
      '\u{0008}' => out.push_str("\\b"),
      '\u{000c}' => out.push_str("\\f"),
      ch if (ch as u32) < 0x20 => {
        out.push_str(&format!("\\u{:04x}", ch as u32));
      }
      ch => out.push(ch),
    }
  }
  out.push('"');
}

fn repr_string(s: &str) -> String {
  let mut out = String::with_capacity(s.len() + 2);
  out.push('\'');
  for ch in s.chars() {
    match ch {
      '\\' => out.push_str("\\\\"),
      '\'' => out.push_str("\\'"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      '\t' => out.push_str("\\t"),
      ch => out.push(ch),
    }
  }
  out.push('\'');
  out
}

/// Whole floats keep a trailing `.0` so `1.0` does not render as `1`.
pub fn format_float(f: f64) -> String {
  if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
    format!("{:.1}", f)
  } else {
    format!("{}", f)
  }
}

/// Ordering for comparisons and `sort`: defined between numerics and
/// between strings only.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
  match (a, b) {
    (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
    (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
    (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
    _ => {
      let x = a.as_f64()?;
      let y = b.as_f64()?;
      x.partial_cmp(&y)
    }
  }
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Value::None, Value::None) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Int(a), Value::Int(b)) => a == b,
      (Value::Float(a), Value::Float(b)) => a == b,
      (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
      (Value::String(a), Value::String(b)) => a == b,
      (Value::List(a), Value::List(b)) => a == b,
      // Structural map equality, independent of insertion order.
      (Value::Map(a), Value::Map(b)) => {
        a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
      }
      (Value::Namespace(a), Value::Namespace(b)) => {
        Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
      }
      (Value::Macro(a), Value::Macro(b)) => Rc::ptr_eq(a, b),
      (Value::Builtin(a), Value::Builtin(b)) => a == b,
      (Value::Native { name: a, .. }, Value::Native { name: b, .. }) => a == b,
      (Value::Cycle { index: a }, Value::Cycle { index: b }) => a == b,
      _ => false,
    }
  }
}

impl fmt::Debug for Value {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.repr())
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.render_string())
  }
}

// Environment for name scoping: a stack of insertion-ordered scopes,
// innermost last.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
  scopes: Vec<IndexMap<String, Value>>,
}

impl Default for Environment {
  fn default() -> Self {
    Self::new()
  }
}

impl Environment {
  pub fn new() -> Self {
    Self {
      scopes: vec![IndexMap::new()],
    }
  }

  pub fn push_scope(&mut self) {
    self.scopes.push(IndexMap::new());
  }

  pub fn pop_scope(&mut self) {
    if self.scopes.len() > 1 {
      self.scopes.pop();
    }
  }

  /// Bind in the innermost scope. `set` always writes here; outer writes
  /// go through a `namespace()` object instead.
  pub fn define(&mut self, name: String, value: Value) {
    if let Some(scope) = self.scopes.last_mut() {
      scope.insert(name, value);
    }
  }

  pub fn get(&self, name: &str) -> Option<Value> {
    // Search from innermost to outermost scope
    for scope in self.scopes.iter().rev() {
      if let Some(value) = scope.get(name) {
        return Some(value.clone());
      }
    }
    None
  }
}
