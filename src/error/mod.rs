use crate::lexer::token::Pos;

#[derive(Debug, Clone)]
pub struct TemplateError {
  pub kind: ErrorKind,
  pub message: String,
  pub line: usize,
  pub column: usize,
  pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Syntax,
  Runtime,
}

impl TemplateError {
  pub fn new(kind: ErrorKind, message: String, pos: Pos) -> Self {
    Self {
      kind,
      message,
      line: pos.line,
      column: pos.column,
      offset: pos.offset,
    }
  }

  pub fn syntax(message: String, pos: Pos) -> Self {
    Self::new(ErrorKind::Syntax, message, pos)
  }

  pub fn runtime(message: String, pos: Pos) -> Self {
    Self::new(ErrorKind::Runtime, message, pos)
  }

  pub fn format(&self) -> String {
    let kind_str = match self.kind {
      ErrorKind::Syntax => "Syntax Error",
      ErrorKind::Runtime => "Runtime Error",
    };

    format!(
      "{} at line {}:{}\n  {}",
      kind_str, self.line, self.column, self.message
    )
  }
}

impl std::fmt::Display for TemplateError {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "{}", self.format())
  }
}

impl std::error::Error for TemplateError {}
