//! A lightweight Jinja2-style template engine for LLM chat templates.
//!
//! Renders the template subset that ships inside tokenizer configurations
//! of models like Qwen 3 and Llama 3: expression output, if/elif/else,
//! for loops with `loop` state, set, macros and call blocks, filters,
//! tests, and whitespace control. Contexts are JSON value trees.
//!
//! ```
//! use tinja::Template;
//!
//! let template = Template::new("Hi {{ name }}!", &serde_json::json!({})).unwrap();
//! let out = template.render(&serde_json::json!({ "name": "Ada" })).unwrap();
//! assert_eq!(out, "Hi Ada!");
//! ```

pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod parser;

use std::collections::HashMap;
use std::sync::Arc;

use evaluator::value::{Environment, NativeFn};
use evaluator::{builtins, Evaluator};
use lexer::Lexer;
use parser::ast::Stmt;
use parser::Parser;

pub use error::{ErrorKind, TemplateError};
pub use evaluator::value::Value;

/// A compiled template: the parsed AST plus a frozen default context and
/// the registered host functions.
///
/// Immutable after construction, so one `Template` can be shared across
/// threads and rendered concurrently; every render allocates its own
/// scopes, output buffer, and loop state.
pub struct Template {
  ast: Vec<Stmt>,
  defaults: serde_json::Map<String, serde_json::Value>,
  functions: HashMap<String, NativeFn>,
  source_len: usize,
}

impl std::fmt::Debug for Template {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Template")
      .field("ast", &self.ast)
      .field("defaults", &self.defaults)
      .field("functions", &self.functions.keys().collect::<Vec<_>>())
      .field("source_len", &self.source_len)
      .finish()
  }
}

impl Template {
  /// Compile a template. `default_context` holds global variables such as
  /// `bos_token` or fixed `tools`; per-render context keys override them.
  ///
  /// Fails with a `Syntax` error on malformed templates.
  pub fn new(
    source: &str,
    default_context: &serde_json::Value,
  ) -> Result<Self, TemplateError> {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.tokenize()?;
    let mut parser = Parser::new(tokens);
    let ast = parser.parse()?;

    let defaults = match default_context {
      serde_json::Value::Object(map) => map.clone(),
      _ => serde_json::Map::new(),
    };

    Ok(Self {
      ast,
      defaults,
      functions: HashMap::new(),
      source_len: source.len(),
    })
  }

  /// Register a host callable, reachable from the template by name. A
  /// registered function shadows the built-in global of the same name,
  /// which is how hosts pin `strftime_now` for deterministic output.
  ///
  /// Takes `&mut self`: registration cannot race a concurrent render.
  pub fn add_function<F>(&mut self, name: impl Into<String>, func: F)
  where
    F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
  {
    self.functions.insert(name.into(), Arc::new(func));
  }

  /// Render with `context` merged over the default context (shallow,
  /// per root key). Fails with a `Runtime` error.
  pub fn render(&self, context: &serde_json::Value) -> Result<String, TemplateError> {
    let mut environment = Environment::new();

    for name in builtins::GLOBAL_NAMES.iter().copied() {
      environment.define(name.to_string(), Value::Builtin(name));
    }
    for (name, value) in &self.defaults {
      environment.define(name.clone(), json_to_value(value));
    }
    for (name, func) in &self.functions {
      environment.define(
        name.clone(),
        Value::Native {
          name: name.clone(),
          func: func.clone(),
        },
      );
    }
    if let serde_json::Value::Object(map) = context {
      for (name, value) in map {
        environment.define(name.clone(), json_to_value(value));
      }
    }

    let mut evaluator = Evaluator::new(environment);
    evaluator.render(&self.ast, self.source_len)
  }

  /// Assemble `{messages, add_generation_prompt, tools, ...extra}` and
  /// render, mirroring the shape of HuggingFace's `apply_chat_template`.
  /// `tools` is only inserted when non-null so `tools is defined` keeps
  /// working in templates that branch on it.
  pub fn apply_chat_template(
    &self,
    messages: &serde_json::Value,
    add_generation_prompt: bool,
    tools: &serde_json::Value,
    extra_context: &serde_json::Value,
  ) -> Result<String, TemplateError> {
    let mut context = serde_json::Map::new();
    context.insert("messages".to_string(), messages.clone());
    context.insert(
      "add_generation_prompt".to_string(),
      serde_json::Value::Bool(add_generation_prompt),
    );
    if !tools.is_null() {
      context.insert("tools".to_string(), tools.clone());
    }
    if let serde_json::Value::Object(extra) = extra_context {
      for (name, value) in extra {
        context.insert(name.clone(), value.clone());
      }
    }

    self.render(&serde_json::Value::Object(context))
  }
}

/// JSON ingestion: whole numbers that fit i64 become ints, everything
/// else with a fractional part becomes a float. Object order is
/// preserved.
fn json_to_value(json: &serde_json::Value) -> Value {
  match json {
    serde_json::Value::Null => Value::None,
    serde_json::Value::Bool(b) => Value::Bool(*b),
    serde_json::Value::Number(n) => {
      if let Some(i) = n.as_i64() {
        Value::Int(i)
      } else {
        Value::Float(n.as_f64().unwrap_or(0.0))
      }
    }
    serde_json::Value::String(s) => Value::String(s.clone()),
    serde_json::Value::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
    serde_json::Value::Object(map) => {
      let mut result = indexmap::IndexMap::new();
      for (key, value) in map {
        result.insert(key.clone(), json_to_value(value));
      }
      Value::Map(result)
    }
  }
}
