pub mod token;

use crate::error::TemplateError;
use token::{keyword_or_ident, Pos, Token, TokenType};

/// Modal lexer for the template language.
///
/// Text mode produces one `Text` token per contiguous literal run and
/// switches into tag mode on `{{`, `{%` or `{#`. Tag mode splits the tag
/// contents into expression tokens until the matching close delimiter.
/// Whitespace-control markers (`{%-`, `-%}`, `{{-`, `-}}`, `{#-`, `-#}`)
/// are resolved here, so the parser never sees them.
pub struct Lexer {
  input: Vec<char>,
  position: usize,
  line: usize,
  column: usize,
  offset: usize,
}

impl Lexer {
  pub fn new(input: &str) -> Self {
    Self {
      input: input.chars().collect(),
      position: 0,
      line: 1,
      column: 1,
      offset: 0,
    }
  }

  fn current_char(&self) -> Option<char> {
    self.input.get(self.position).copied()
  }

  fn peek_char(&self) -> Option<char> {
    self.input.get(self.position + 1).copied()
  }

  fn peek_char_at(&self, n: usize) -> Option<char> {
    self.input.get(self.position + n).copied()
  }

  fn advance(&mut self) -> Option<char> {
    let ch = self.current_char()?;
    self.position += 1;
    self.offset += ch.len_utf8();
    if ch == '\n' {
      self.line += 1;
      self.column = 1;
    } else {
      self.column += 1;
    }
    Some(ch)
  }

  fn pos(&self) -> Pos {
    Pos {
      line: self.line,
      column: self.column,
      offset: self.offset,
    }
  }

  fn snapshot(&self) -> (usize, usize, usize, usize) {
    (self.position, self.line, self.column, self.offset)
  }

  fn restore(&mut self, state: (usize, usize, usize, usize)) {
    self.position = state.0;
    self.line = state.1;
    self.column = state.2;
    self.offset = state.3;
  }

  fn skip_whitespace(&mut self) {
    while self.current_char().map_or(false, |c| c.is_whitespace()) {
      self.advance();
    }
  }

  fn at_tag_start(&self) -> bool {
    self.current_char() == Some('{')
      && matches!(self.peek_char(), Some('{') | Some('%') | Some('#'))
  }

  pub fn tokenize(&mut self) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();

    loop {
      // Text mode: accumulate a literal run up to the next tag.
      let text_pos = self.pos();
      let mut text = String::new();
      while self.current_char().is_some() && !self.at_tag_start() {
        text.push(self.advance().unwrap());
      }

      if self.current_char().is_none() {
        if !text.is_empty() {
          tokens.push(Token::new(TokenType::Text, text, text_pos));
        }
        tokens.push(Token::new(TokenType::Eof, String::new(), self.pos()));
        return Ok(tokens);
      }

      let tag_pos = self.pos();
      self.advance(); // {
      let kind = self.advance().unwrap(); // one of { % #

      if self.current_char() == Some('-') {
        self.advance();
        text.truncate(text.trim_end().len());
      }

      if !text.is_empty() {
        tokens.push(Token::new(TokenType::Text, text, text_pos));
      }

      match kind {
        '#' => self.skip_comment(tag_pos)?,
        '{' => {
          tokens.push(Token::new(TokenType::ExprStart, "{{".to_string(), tag_pos));
          self.tokenize_tag(&mut tokens, TokenType::ExprEnd, tag_pos)?;
        }
        _ => {
          // Raw blocks are resolved here so tag interpretation stays off
          // until the matching endraw.
          if self.try_raw_block(&mut tokens, tag_pos)? {
            continue;
          }
          tokens.push(Token::new(TokenType::StmtStart, "{%".to_string(), tag_pos));
          self.tokenize_tag(&mut tokens, TokenType::StmtEnd, tag_pos)?;
        }
      }
    }
  }

  /// Skip a `{# ... #}` comment. The opening delimiter has been consumed.
  fn skip_comment(&mut self, open_pos: Pos) -> Result<(), TemplateError> {
    loop {
      match self.current_char() {
        Option::None => {
          return Err(TemplateError::syntax(
            "Unterminated comment".to_string(),
            open_pos,
          ));
        }
        Some('-') if self.peek_char() == Some('#') && self.peek_char_at(2) == Some('}') => {
          self.advance();
          self.advance();
          self.advance();
          self.skip_whitespace();
          return Ok(());
        }
        Some('#') if self.peek_char() == Some('}') => {
          self.advance();
          self.advance();
          return Ok(());
        }
        _ => {
          self.advance();
        }
      }
    }
  }

  /// If the statement tag whose `{%` (and optional `-`) was just consumed is
  /// `{% raw %}`, consume everything through `{% endraw %}` and emit the
  /// payload as a single Text token. Returns false (with the cursor
  /// restored) when the tag is anything else.
  fn try_raw_block(
    &mut self,
    tokens: &mut Vec<Token>,
    open_pos: Pos,
  ) -> Result<bool, TemplateError> {
    let state = self.snapshot();
    self.skip_whitespace();
    let word = self.read_word();
    if word != "raw" {
      self.restore(state);
      return Ok(false);
    }

    self.skip_whitespace();
    self.expect_tag_close(open_pos)?;

    let text_pos = self.pos();
    let mut payload = String::new();
    loop {
      match self.current_char() {
        Option::None => {
          return Err(TemplateError::syntax(
            "Unterminated raw block".to_string(),
            open_pos,
          ));
        }
        Some('{') if self.peek_char() == Some('%') => {
          let state = self.snapshot();
          self.advance();
          self.advance();
          let left_trim = self.current_char() == Some('-');
          if left_trim {
            self.advance();
          }
          self.skip_whitespace();
          if self.read_word() == "endraw" {
            self.skip_whitespace();
            self.expect_tag_close(open_pos)?;
            if left_trim {
              payload.truncate(payload.trim_end().len());
            }
            if !payload.is_empty() {
              tokens.push(Token::new(TokenType::Text, payload, text_pos));
            }
            return Ok(true);
          }
          // Not endraw: the tag text is part of the raw payload.
          self.restore(state);
          payload.push(self.advance().unwrap());
        }
        Some(_) => {
          payload.push(self.advance().unwrap());
        }
      }
    }
  }

  /// Consume `%}` or `-%}`, applying the right-trim to the following text.
  fn expect_tag_close(&mut self, open_pos: Pos) -> Result<(), TemplateError> {
    let trim = self.current_char() == Some('-');
    if trim {
      self.advance();
    }
    if self.current_char() != Some('%') || self.peek_char() != Some('}') {
      return Err(TemplateError::syntax(
        "Expected '%}' to close tag".to_string(),
        open_pos,
      ));
    }
    self.advance();
    self.advance();
    if trim {
      self.skip_whitespace();
    }
    Ok(())
  }

  fn read_word(&mut self) -> String {
    let mut word = String::new();
    while let Some(ch) = self.current_char() {
      if ch.is_ascii_alphanumeric() || ch == '_' {
        word.push(ch);
        self.advance();
      } else {
        break;
      }
    }
    word
  }

  /// Tokenize the inside of a `{{ ... }}` or `{% ... %}` tag up to and
  /// including the close delimiter (with optional `-` trim marker).
  fn tokenize_tag(
    &mut self,
    tokens: &mut Vec<Token>,
    end: TokenType,
    open_pos: Pos,
  ) -> Result<(), TemplateError> {
    let close = if end == TokenType::ExprEnd { '}' } else { '%' };

    loop {
      self.skip_whitespace();

      let pos = self.pos();
      let ch = match self.current_char() {
        Some(ch) => ch,
        Option::None => {
          return Err(TemplateError::syntax(
            "Unterminated template tag".to_string(),
            open_pos,
          ));
        }
      };

      // Close delimiter, with or without the whitespace-trim marker.
      let trim_close = ch == '-' && self.peek_char() == Some(close) && self.peek_char_at(2) == Some('}');
      if trim_close || (ch == close && self.peek_char() == Some('}')) {
        if trim_close {
          self.advance();
        }
        self.advance();
        self.advance();
        let lexeme = if close == '}' { "}}" } else { "%}" };
        tokens.push(Token::new(end, lexeme.to_string(), pos));
        if trim_close {
          self.skip_whitespace();
        }
        return Ok(());
      }

      let token = match ch {
        ch if ch.is_ascii_digit() => self.read_number(),

        '\'' | '"' => self.read_string()?,

        ch if ch.is_ascii_alphabetic() || ch == '_' => self.read_identifier(),

        '+' => self.single(TokenType::Plus, "+"),
        '-' => self.single(TokenType::Minus, "-"),
        '~' => self.single(TokenType::Tilde, "~"),
        '|' => self.single(TokenType::Pipe, "|"),
        '.' => self.single(TokenType::Dot, "."),
        ',' => self.single(TokenType::Comma, ","),
        ':' => self.single(TokenType::Colon, ":"),
        '(' => self.single(TokenType::LParen, "("),
        ')' => self.single(TokenType::RParen, ")"),
        '[' => self.single(TokenType::LBracket, "["),
        ']' => self.single(TokenType::RBracket, "]"),
        '{' => self.single(TokenType::LBrace, "{"),
        '}' => self.single(TokenType::RBrace, "}"),
        '%' => self.single(TokenType::Percent, "%"),

        '*' => {
          self.advance();
          if self.current_char() == Some('*') {
            self.advance();
            Token::new(TokenType::StarStar, "**".to_string(), pos)
          } else {
            Token::new(TokenType::Star, "*".to_string(), pos)
          }
        }

        '/' => {
          self.advance();
          if self.current_char() == Some('/') {
            self.advance();
            Token::new(TokenType::SlashSlash, "//".to_string(), pos)
          } else {
            Token::new(TokenType::Slash, "/".to_string(), pos)
          }
        }

        '=' => {
          self.advance();
          if self.current_char() == Some('=') {
            self.advance();
            Token::new(TokenType::EqEq, "==".to_string(), pos)
          } else {
            Token::new(TokenType::Assign, "=".to_string(), pos)
          }
        }

        '!' => {
          self.advance();
          if self.current_char() == Some('=') {
            self.advance();
            Token::new(TokenType::NotEq, "!=".to_string(), pos)
          } else {
            return Err(TemplateError::syntax(
              "Unexpected character '!', expected '!='".to_string(),
              pos,
            ));
          }
        }

        '<' => {
          self.advance();
          if self.current_char() == Some('=') {
            self.advance();
            Token::new(TokenType::LtEq, "<=".to_string(), pos)
          } else {
            Token::new(TokenType::Lt, "<".to_string(), pos)
          }
        }

        '>' => {
          self.advance();
          if self.current_char() == Some('=') {
            self.advance();
            Token::new(TokenType::GtEq, ">=".to_string(), pos)
          } else {
            Token::new(TokenType::Gt, ">".to_string(), pos)
          }
        }

        ch => {
          return Err(TemplateError::syntax(
            format!("Unexpected character '{}' in template tag", ch),
            pos,
          ));
        }
      };

      tokens.push(token);
    }
  }

  fn single(&mut self, token_type: TokenType, lexeme: &str) -> Token {
    let pos = self.pos();
    self.advance();
    Token::new(token_type, lexeme.to_string(), pos)
  }

  fn read_number(&mut self) -> Token {
    let pos = self.pos();
    let mut num = String::new();
    let mut is_float = false;

    while let Some(ch) = self.current_char() {
      if ch.is_ascii_digit() {
        num.push(ch);
        self.advance();
      } else if ch == '.'
        && !is_float
        && self
          .peek_char()
          .map(|c| c.is_ascii_digit())
          .unwrap_or(false)
      {
        is_float = true;
        num.push(ch);
        self.advance();
      } else if (ch == 'e' || ch == 'E')
        && self
          .peek_char()
          .map(|c| c.is_ascii_digit() || c == '+' || c == '-')
          .unwrap_or(false)
      {
        is_float = true;
        num.push(ch);
        self.advance();
        if matches!(self.current_char(), Some('+') | Some('-')) {
          num.push(self.advance().unwrap());
        }
        while self.current_char().map_or(false, |c| c.is_ascii_digit()) {
          num.push(self.advance().unwrap());
        }
        break;
      } else {
        break;
      }
    }

    let token_type = if is_float {
      TokenType::Float
    } else {
      TokenType::Int
    };
    Token::new(token_type, num, pos)
  }

  fn read_string(&mut self) -> Result<Token, TemplateError> {
    let pos = self.pos();
    let quote = self.advance().unwrap();
    let mut string = String::new();

    loop {
      match self.current_char() {
        Option::None => {
          return Err(TemplateError::syntax(
            "Unterminated string literal".to_string(),
            pos,
          ));
        }
        Some(ch) if ch == quote => {
          self.advance();
          return Ok(Token::new(TokenType::Str, string, pos));
        }
        Some('\\') => {
          self.advance();
          let escaped = match self.current_char() {
            Some(ch) => ch,
            Option::None => {
              return Err(TemplateError::syntax(
                "Unterminated string literal".to_string(),
                pos,
              ));
            }
          };
          match escaped {
            'n' => {
              string.push('\n');
              self.advance();
            }
            't' => {
              string.push('\t');
              self.advance();
            }
            'r' => {
              string.push('\r');
              self.advance();
            }
            '\\' => {
              string.push('\\');
              self.advance();
            }
            '\'' => {
              string.push('\'');
              self.advance();
            }
            '"' => {
              string.push('"');
              self.advance();
            }
            'x' => {
              self.advance();
              let code = self.read_hex_escape(2, pos)?;
              string.push(code);
            }
            'u' => {
              self.advance();
              let code = self.read_hex_escape(4, pos)?;
              string.push(code);
            }
            _ => {
              string.push('\\');
              string.push(escaped);
              self.advance();
            }
          }
        }
        Some(ch) => {
          string.push(ch);
          self.advance();
        }
      }
    }
  }

  fn read_hex_escape(&mut self, digits: usize, string_pos: Pos) -> Result<char, TemplateError> {
    let mut value: u32 = 0;
    for _ in 0..digits {
      let ch = self.current_char().ok_or_else(|| {
        TemplateError::syntax("Unterminated string literal".to_string(), string_pos)
      })?;
      let digit = ch.to_digit(16).ok_or_else(|| {
        TemplateError::syntax(
          format!("Invalid hex digit '{}' in string escape", ch),
          self.pos(),
        )
      })?;
      value = value * 16 + digit;
      self.advance();
    }
    char::from_u32(value).ok_or_else(|| {
      TemplateError::syntax(
        format!("Invalid character escape \\u{:04x}", value),
        string_pos,
      )
    })
  }

  fn read_identifier(&mut self) -> Token {
    let pos = self.pos();
    let mut ident = String::new();

    while let Some(ch) = self.current_char() {
      if ch.is_ascii_alphanumeric() || ch == '_' {
        ident.push(ch);
        self.advance();
      } else {
        break;
      }
    }

    let token_type = keyword_or_ident(&ident);
    Token::new(token_type, ident, pos)
  }
}
