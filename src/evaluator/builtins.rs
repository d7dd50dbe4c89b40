use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

use super::value::{compare_values, Value};
use super::value_contains;

/// Built-in globals seeded into the root scope of every render.
pub const GLOBAL_NAMES: &[&str] = &[
  "range",
  "dict",
  "namespace",
  "strftime_now",
  "raise_exception",
];

const MAX_RANGE_SIZE: i64 = 10_000_000;

fn kwarg<'a>(kwargs: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
  kwargs
    .iter()
    .find(|(key, _)| key == name)
    .map(|(_, value)| value)
}

/// Attribute projection for `sort`, `map`, `selectattr` and friends.
/// Dotted paths walk nested maps; anything missing yields none.
fn lookup_attr(value: &Value, path: &str) -> Value {
  let mut current = value.clone();
  for part in path.split('.') {
    current = match &current {
      Value::Map(map) => map.get(part).cloned().unwrap_or(Value::None),
      Value::Namespace(ns) => ns.borrow().get(part).cloned().unwrap_or(Value::None),
      Value::List(items) => part
        .parse::<usize>()
        .ok()
        .and_then(|i| items.get(i).cloned())
        .unwrap_or(Value::None),
      _ => Value::None,
    };
  }
  current
}

fn as_list(value: &Value, what: &str) -> Result<Vec<Value>, String> {
  match value {
    Value::List(items) => Ok(items.clone()),
    Value::Map(map) => Ok(map.keys().cloned().map(Value::String).collect()),
    Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
    other => Err(format!("{} expects a sequence, got {}", what, other.type_name())),
  }
}

fn capitalize_str(s: &str) -> String {
  let mut chars = s.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
    Option::None => String::new(),
  }
}

fn title_str(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut at_word_start = true;
  for ch in s.chars() {
    if ch.is_alphanumeric() {
      if at_word_start {
        out.extend(ch.to_uppercase());
      } else {
        out.extend(ch.to_lowercase());
      }
      at_word_start = false;
    } else {
      out.push(ch);
      at_word_start = true;
    }
  }
  out
}

pub fn apply_filter(
  name: &str,
  input: Value,
  args: &[Value],
  kwargs: &[(String, Value)],
) -> Result<Value, String> {
  match name {
    "length" | "count" => match &input {
      Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
      Value::List(items) => Ok(Value::Int(items.len() as i64)),
      Value::Map(map) => Ok(Value::Int(map.len() as i64)),
      other => Err(format!("Cannot take the length of {}", other.type_name())),
    },

    "upper" => Ok(Value::String(input.render_string().to_uppercase())),
    "lower" => Ok(Value::String(input.render_string().to_lowercase())),
    "capitalize" => Ok(Value::String(capitalize_str(&input.render_string()))),
    "title" => Ok(Value::String(title_str(&input.render_string()))),
    "trim" => Ok(Value::String(input.render_string().trim().to_string())),

    "replace" => {
      let (old, new) = match (args.first(), args.get(1)) {
        (Some(Value::String(old)), Some(Value::String(new))) => (old, new),
        _ => return Err("replace expects two string arguments".to_string()),
      };
      Ok(Value::String(input.render_string().replace(old.as_str(), new)))
    }

    "default" | "d" => {
      let fallback = args.first().cloned().unwrap_or(Value::String(String::new()));
      let boolean = match (args.get(1), kwarg(kwargs, "boolean")) {
        (Some(flag), _) | (_, Some(flag)) => flag.is_truthy(),
        _ => false,
      };
      let use_fallback = if boolean {
        !input.is_truthy()
      } else {
        matches!(input, Value::None)
      };
      Ok(if use_fallback { fallback } else { input })
    }

    "join" => {
      let sep = match args.first() {
        Some(Value::String(sep)) => sep.clone(),
        Some(other) => other.render_string(),
        Option::None => String::new(),
      };
      let items = as_list(&input, "join")?;
      let parts: Vec<String> = items.iter().map(|v| v.render_string()).collect();
      Ok(Value::String(parts.join(&sep)))
    }

    "list" => Ok(Value::List(as_list(&input, "list")?)),

    "string" => Ok(Value::String(input.render_string())),

    "int" => {
      let fallback = match args.first() {
        Some(Value::Int(n)) => *n,
        _ => 0,
      };
      let result = match &input {
        Value::Int(n) => *n,
        Value::Float(f) => *f as i64,
        Value::Bool(b) => *b as i64,
        Value::String(s) => {
          let trimmed = s.trim();
          trimmed
            .parse::<i64>()
            .ok()
            .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
            .unwrap_or(fallback)
        }
        _ => fallback,
      };
      Ok(Value::Int(result))
    }

    "float" => {
      let fallback = match args.first() {
        Some(value) => value.as_f64().unwrap_or(0.0),
        Option::None => 0.0,
      };
      let result = match &input {
        Value::Int(n) => *n as f64,
        Value::Float(f) => *f,
        Value::Bool(b) => *b as i64 as f64,
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(fallback),
        _ => fallback,
      };
      Ok(Value::Float(result))
    }

    "round" => {
      let value = input
        .as_f64()
        .ok_or_else(|| format!("Cannot round {}", input.type_name()))?;
      let precision = match (args.first(), kwarg(kwargs, "precision")) {
        (Some(Value::Int(n)), _) | (_, Some(Value::Int(n))) => *n,
        _ => 0,
      };
      let factor = 10f64.powi(precision as i32);
      Ok(Value::Float((value * factor).round() / factor))
    }

    "abs" => match input {
      Value::Int(n) => Ok(Value::Int(n.abs())),
      Value::Float(f) => Ok(Value::Float(f.abs())),
      other => Err(format!("Cannot take the absolute value of {}", other.type_name())),
    },

    "first" => Ok(as_list(&input, "first")?.first().cloned().unwrap_or(Value::None)),
    "last" => Ok(as_list(&input, "last")?.last().cloned().unwrap_or(Value::None)),

    "reverse" => match &input {
      Value::List(items) => Ok(Value::List(items.iter().rev().cloned().collect())),
      Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
      other => Err(format!("Cannot reverse {}", other.type_name())),
    },

    "sort" => {
      let mut items = as_list(&input, "sort")?;
      let reverse = match (args.first(), kwarg(kwargs, "reverse")) {
        (Some(flag), _) | (_, Some(flag)) => flag.is_truthy(),
        _ => false,
      };
      let attribute = match kwarg(kwargs, "attribute") {
        Some(Value::String(attr)) => Some(attr.clone()),
        _ => Option::None,
      };
      items.sort_by(|a, b| {
        let (a, b) = match &attribute {
          Some(attr) => (lookup_attr(a, attr), lookup_attr(b, attr)),
          Option::None => (a.clone(), b.clone()),
        };
        compare_values(&a, &b).unwrap_or(std::cmp::Ordering::Equal)
      });
      if reverse {
        items.reverse();
      }
      Ok(Value::List(items))
    }

    "unique" => {
      let items = as_list(&input, "unique")?;
      let mut seen: Vec<Value> = Vec::new();
      for item in items {
        if !seen.contains(&item) {
          seen.push(item);
        }
      }
      Ok(Value::List(seen))
    }

    "min" => {
      let items = as_list(&input, "min")?;
      Ok(
        items
          .into_iter()
          .reduce(|best, item| {
            match compare_values(&item, &best) {
              Some(std::cmp::Ordering::Less) => item,
              _ => best,
            }
          })
          .unwrap_or(Value::None),
      )
    }

    "max" => {
      let items = as_list(&input, "max")?;
      Ok(
        items
          .into_iter()
          .reduce(|best, item| {
            match compare_values(&item, &best) {
              Some(std::cmp::Ordering::Greater) => item,
              _ => best,
            }
          })
          .unwrap_or(Value::None),
      )
    }

    "sum" => {
      let items = as_list(&input, "sum")?;
      let mut int_total: i64 = 0;
      let mut float_total: f64 = 0.0;
      let mut is_float = false;
      for item in &items {
        match item {
          Value::Int(n) => {
            int_total += n;
            float_total += *n as f64;
          }
          Value::Float(f) => {
            is_float = true;
            float_total += f;
          }
          other => return Err(format!("Cannot sum {}", other.type_name())),
        }
      }
      if is_float {
        Ok(Value::Float(float_total))
      } else {
        Ok(Value::Int(int_total))
      }
    }

    "map" => {
      let items = as_list(&input, "map")?;
      if let Some(Value::String(attr)) = kwarg(kwargs, "attribute") {
        let fallback = kwarg(kwargs, "default").cloned();
        let mapped = items
          .iter()
          .map(|item| {
            let projected = lookup_attr(item, attr);
            match (&projected, &fallback) {
              (Value::None, Some(fallback)) => fallback.clone(),
              _ => projected,
            }
          })
          .collect();
        return Ok(Value::List(mapped));
      }

      let filter_name = match args.first() {
        Some(Value::String(name)) => name.clone(),
        _ => return Err("map expects a filter name or an attribute".to_string()),
      };
      let mut mapped = Vec::with_capacity(items.len());
      for item in items {
        mapped.push(apply_filter(&filter_name, item, &args[1..], &[])?);
      }
      Ok(Value::List(mapped))
    }

    "select" | "reject" => {
      let items = as_list(&input, name)?;
      let keep_selected = name == "select";
      let mut kept = Vec::new();
      for item in items {
        let selected = match args.first() {
          Some(Value::String(test_name)) => apply_test(test_name, &item, &args[1..])?,
          Option::None => item.is_truthy(),
          Some(other) => {
            return Err(format!("{} expects a test name, got {}", name, other.type_name()));
          }
        };
        if selected == keep_selected {
          kept.push(item);
        }
      }
      Ok(Value::List(kept))
    }

    "selectattr" | "rejectattr" => {
      let items = as_list(&input, name)?;
      let keep_selected = name == "selectattr";
      let attr = match args.first() {
        Some(Value::String(attr)) => attr.clone(),
        _ => return Err(format!("{} expects an attribute name", name)),
      };
      let mut kept = Vec::new();
      for item in items {
        let projected = lookup_attr(&item, &attr);
        let selected = match args.get(1) {
          Some(Value::String(test_name)) => apply_test(test_name, &projected, &args[2..])?,
          Option::None => projected.is_truthy(),
          Some(other) => {
            return Err(format!("{} expects a test name, got {}", name, other.type_name()));
          }
        };
        if selected == keep_selected {
          kept.push(item);
        }
      }
      Ok(Value::List(kept))
    }

    "tojson" => {
      let indent = match (args.first(), kwarg(kwargs, "indent")) {
        (Some(Value::Int(n)), _) | (_, Some(Value::Int(n))) if *n >= 0 => Some(*n as usize),
        _ => Option::None,
      };
      Ok(Value::String(input.to_json(indent)))
    }

    "items" => match &input {
      Value::Map(map) => Ok(Value::List(
        map
          .iter()
          .map(|(k, v)| Value::List(vec![Value::String(k.clone()), v.clone()]))
          .collect(),
      )),
      Value::Namespace(ns) => Ok(Value::List(
        ns.borrow()
          .iter()
          .map(|(k, v)| Value::List(vec![Value::String(k.clone()), v.clone()]))
          .collect(),
      )),
      Value::None => Ok(Value::List(Vec::new())),
      other => Err(format!("Cannot get items of {}", other.type_name())),
    },

    "keys" => match &input {
      Value::Map(map) => Ok(Value::List(map.keys().cloned().map(Value::String).collect())),
      Value::None => Ok(Value::List(Vec::new())),
      other => Err(format!("Cannot get keys of {}", other.type_name())),
    },

    "values" => match &input {
      Value::Map(map) => Ok(Value::List(map.values().cloned().collect())),
      Value::None => Ok(Value::List(Vec::new())),
      other => Err(format!("Cannot get values of {}", other.type_name())),
    },

    // Auto-escaping is not implemented, so safe is the identity.
    "safe" => Ok(input),

    _ => Err(format!("Unknown filter '{}'", name)),
  }
}

pub fn apply_test(name: &str, value: &Value, args: &[Value]) -> Result<bool, String> {
  match name {
    // On a plain value, defined-ness collapses to "is not none": the
    // permissive lookups already turned missing attributes into none.
    "defined" => Ok(!matches!(value, Value::None)),
    "undefined" => Ok(matches!(value, Value::None)),

    "none" => Ok(matches!(value, Value::None)),
    "string" => Ok(matches!(value, Value::String(_))),
    "number" => Ok(matches!(value, Value::Int(_) | Value::Float(_))),
    "mapping" => Ok(matches!(value, Value::Map(_) | Value::Namespace(_))),
    "sequence" => Ok(matches!(
      value,
      Value::List(_) | Value::String(_) | Value::Map(_)
    )),
    "iterable" => Ok(matches!(
      value,
      Value::List(_) | Value::String(_) | Value::Map(_) | Value::Namespace(_)
    )),
    "boolean" => Ok(matches!(value, Value::Bool(_))),
    "true" => Ok(matches!(value, Value::Bool(true))),
    "false" => Ok(matches!(value, Value::Bool(false))),

    "even" => match value {
      Value::Int(n) => Ok(n % 2 == 0),
      other => Err(format!("'even' expects an integer, got {}", other.type_name())),
    },
    "odd" => match value {
      Value::Int(n) => Ok(n % 2 != 0),
      other => Err(format!("'odd' expects an integer, got {}", other.type_name())),
    },

    "divisibleby" => match (value, args.first()) {
      (Value::Int(n), Some(Value::Int(d))) => {
        if *d == 0 {
          Err("'divisibleby' divisor cannot be zero".to_string())
        } else {
          Ok(n % d == 0)
        }
      }
      _ => Err("'divisibleby' expects integer operands".to_string()),
    },

    "equalto" | "eq" => match args.first() {
      Some(other) => Ok(value == other),
      Option::None => Err("'equalto' expects one argument".to_string()),
    },

    "in" => match args.first() {
      Some(container) => value_contains(container, value)
        .ok_or_else(|| {
          format!(
            "Cannot test membership of {} in {}",
            value.type_name(),
            container.type_name()
          )
        }),
      Option::None => Err("'in' expects one argument".to_string()),
    },

    _ => Err(format!("Unknown test '{}'", name)),
  }
}

pub fn call_global(
  name: &str,
  args: &[Value],
  kwargs: &[(String, Value)],
) -> Result<Value, String> {
  match name {
    "range" => {
      let mut bounds = [0i64; 3];
      if args.is_empty() || args.len() > 3 {
        return Err(format!("range expects 1 to 3 arguments, got {}", args.len()));
      }
      for (i, arg) in args.iter().enumerate() {
        match arg {
          Value::Int(n) => bounds[i] = *n,
          other => return Err(format!("range expects integers, got {}", other.type_name())),
        }
      }
      let (start, stop, step) = match args.len() {
        1 => (0, bounds[0], 1),
        2 => (bounds[0], bounds[1], 1),
        _ => (bounds[0], bounds[1], bounds[2]),
      };
      if step == 0 {
        return Err("range step cannot be zero".to_string());
      }

      // Widen to i128 so extreme bounds cannot overflow.
      let span = stop as i128 - start as i128;
      let step_abs = (step as i128).abs();
      let size = if (step > 0 && span <= 0) || (step < 0 && span >= 0) {
        0
      } else {
        (span.abs() + step_abs - 1) / step_abs
      };
      if size > MAX_RANGE_SIZE as i128 {
        return Err(format!("Range too large: {} items", size));
      }

      let mut items = Vec::with_capacity(size as usize);
      let mut current = start as i128;
      for _ in 0..size {
        items.push(Value::Int(current as i64));
        current += step as i128;
      }
      Ok(Value::List(items))
    }

    "dict" => {
      let mut map = IndexMap::new();
      if let Some(Value::Map(base)) = args.first() {
        map.extend(base.clone());
      }
      for (key, value) in kwargs {
        map.insert(key.clone(), value.clone());
      }
      Ok(Value::Map(map))
    }

    "namespace" => {
      let mut map = IndexMap::new();
      if let Some(Value::Map(base)) = args.first() {
        map.extend(base.clone());
      }
      for (key, value) in kwargs {
        map.insert(key.clone(), value.clone());
      }
      Ok(Value::Namespace(Rc::new(RefCell::new(map))))
    }

    "strftime_now" => {
      let fmt = match args.first() {
        Some(Value::String(fmt)) => fmt.clone(),
        _ => return Err("strftime_now expects a format string".to_string()),
      };
      strftime_now(&fmt)
    }

    "raise_exception" => {
      let message = match args.first() {
        Some(Value::String(message)) => message.clone(),
        Some(other) => other.render_string(),
        Option::None => "raise_exception".to_string(),
      };
      Err(message)
    }

    _ => Err(format!("Unknown function '{}'", name)),
  }
}

fn strftime_now(fmt: &str) -> Result<Value, String> {
  let items: Vec<Item> = StrftimeItems::new(fmt).collect();
  if items.iter().any(|item| matches!(item, Item::Error)) {
    return Err(format!("Invalid strftime format '{}'", fmt));
  }
  let formatted = Local::now().format_with_items(items.into_iter()).to_string();
  Ok(Value::String(formatted))
}

/// Python-flavored methods that vendor chat templates call on values.
pub fn call_method(receiver: &Value, name: &str, args: &[Value]) -> Result<Value, String> {
  match receiver {
    Value::String(s) => string_method(s, name, args),

    Value::Map(map) => match name {
      "items" => Ok(Value::List(
        map
          .iter()
          .map(|(k, v)| Value::List(vec![Value::String(k.clone()), v.clone()]))
          .collect(),
      )),
      "keys" => Ok(Value::List(map.keys().cloned().map(Value::String).collect())),
      "values" => Ok(Value::List(map.values().cloned().collect())),
      "get" => {
        let key = match args.first() {
          Some(Value::String(key)) => key,
          _ => return Err("get expects a string key".to_string()),
        };
        Ok(
          map
            .get(key)
            .cloned()
            .or_else(|| args.get(1).cloned())
            .unwrap_or(Value::None),
        )
      }
      _ => Err(format!("Unknown method '{}' for type map", name)),
    },

    Value::Namespace(ns) => {
      let map = Value::Map(ns.borrow().clone());
      call_method(&map, name, args)
    }

    other => Err(format!(
      "Unknown method '{}' for type {}",
      name,
      other.type_name()
    )),
  }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Result<Value, String> {
  match name {
    "upper" => Ok(Value::String(s.to_uppercase())),
    "lower" => Ok(Value::String(s.to_lowercase())),
    "title" => Ok(Value::String(title_str(s))),
    "capitalize" => Ok(Value::String(capitalize_str(s))),
    "strip" => Ok(Value::String(s.trim().to_string())),
    "lstrip" => Ok(Value::String(s.trim_start().to_string())),
    "rstrip" => Ok(Value::String(s.trim_end().to_string())),

    "startswith" => match args.first() {
      Some(Value::String(prefix)) => Ok(Value::Bool(s.starts_with(prefix.as_str()))),
      _ => Err("startswith expects a string argument".to_string()),
    },

    "endswith" => match args.first() {
      Some(Value::String(suffix)) => Ok(Value::Bool(s.ends_with(suffix.as_str()))),
      _ => Err("endswith expects a string argument".to_string()),
    },

    "replace" => match (args.first(), args.get(1)) {
      (Some(Value::String(old)), Some(Value::String(new))) => {
        Ok(Value::String(s.replace(old.as_str(), new)))
      }
      _ => Err("replace expects two string arguments".to_string()),
    },

    "split" => match args.first() {
      Some(Value::String(sep)) => Ok(Value::List(
        s.split(sep.as_str())
          .map(|part| Value::String(part.to_string()))
          .collect(),
      )),
      Option::None => Ok(Value::List(
        s.split_whitespace()
          .map(|part| Value::String(part.to_string()))
          .collect(),
      )),
      Some(other) => Err(format!("split expects a string separator, got {}", other.type_name())),
    },

    _ => Err(format!("Unknown method '{}' for type string", name)),
  }
}
