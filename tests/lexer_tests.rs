use tinja::error::ErrorKind;
use tinja::lexer::{token::TokenType, Lexer};

fn tokenize_types(source: &str) -> Vec<TokenType> {
  let mut lexer = Lexer::new(source);
  lexer
    .tokenize()
    .expect("lexer should succeed")
    .into_iter()
    .map(|token| token.token_type)
    .collect()
}

#[test]
fn lexes_text_and_expression_tags() {
  let tokens = tokenize_types("Hi {{ name }}!");

  assert_eq!(
    tokens,
    vec![
      TokenType::Text,
      TokenType::ExprStart,
      TokenType::Ident,
      TokenType::ExprEnd,
      TokenType::Text,
      TokenType::Eof,
    ]
  );
}

#[test]
fn lexes_statement_tags_and_keywords() {
  let tokens = tokenize_types("{% if x and not y %}a{% endif %}");

  assert_eq!(
    tokens,
    vec![
      TokenType::StmtStart,
      TokenType::If,
      TokenType::Ident,
      TokenType::And,
      TokenType::Not,
      TokenType::Ident,
      TokenType::StmtEnd,
      TokenType::Text,
      TokenType::StmtStart,
      TokenType::EndIf,
      TokenType::StmtEnd,
      TokenType::Eof,
    ]
  );
}

#[test]
fn recognizes_python_style_keyword_literals() {
  let tokens = tokenize_types("{{ True }}{{ None }}{{ false }}");

  assert_eq!(tokens[1], TokenType::True);
  assert_eq!(tokens[4], TokenType::None);
  assert_eq!(tokens[7], TokenType::False);
}

#[test]
fn lexes_numbers() {
  let mut lexer = Lexer::new("{{ 42 3.14 1e3 }}");
  let tokens = lexer.tokenize().unwrap();

  assert_eq!(tokens[1].token_type, TokenType::Int);
  assert_eq!(tokens[1].lexeme, "42");
  assert_eq!(tokens[2].token_type, TokenType::Float);
  assert_eq!(tokens[2].lexeme, "3.14");
  assert_eq!(tokens[3].token_type, TokenType::Float);
  assert_eq!(tokens[3].lexeme, "1e3");
}

#[test]
fn lexes_two_character_operators() {
  let tokens = tokenize_types("{{ a ** b // c != d <= e }}");

  assert!(tokens.contains(&TokenType::StarStar));
  assert!(tokens.contains(&TokenType::SlashSlash));
  assert!(tokens.contains(&TokenType::NotEq));
  assert!(tokens.contains(&TokenType::LtEq));
}

#[test]
fn decodes_string_escapes() {
  let mut lexer = Lexer::new(r#"{{ "a\nb" '\x41é' }}"#);
  let tokens = lexer.tokenize().unwrap();

  assert_eq!(tokens[1].token_type, TokenType::Str);
  assert_eq!(tokens[1].lexeme, "a\nb");
  assert_eq!(tokens[2].lexeme, "A\u{e9}");
}

#[test]
fn trims_whitespace_around_marked_tags() {
  let mut lexer = Lexer::new("a  \n{%- if x -%}  \n  b");
  let tokens = lexer.tokenize().unwrap();

  assert_eq!(tokens[0].token_type, TokenType::Text);
  assert_eq!(tokens[0].lexeme, "a");
  let last_text = &tokens[tokens.len() - 2];
  assert_eq!(last_text.token_type, TokenType::Text);
  assert_eq!(last_text.lexeme, "b");
}

#[test]
fn comments_produce_no_tokens() {
  let tokens = tokenize_types("a{# a note #}b");

  assert_eq!(
    tokens,
    vec![TokenType::Text, TokenType::Text, TokenType::Eof]
  );
}

#[test]
fn raw_blocks_disable_tag_interpretation() {
  let mut lexer = Lexer::new("{% raw %}{{ not parsed }}{% endraw %}x");
  let tokens = lexer.tokenize().unwrap();

  assert_eq!(tokens[0].token_type, TokenType::Text);
  assert_eq!(tokens[0].lexeme, "{{ not parsed }}");
  assert_eq!(tokens[1].lexeme, "x");
}

#[test]
fn tracks_line_and_column_positions() {
  let mut lexer = Lexer::new("a\nb{{ x }}");
  let tokens = lexer.tokenize().unwrap();

  // `x` sits on line 2
  let name = tokens
    .iter()
    .find(|t| t.token_type == TokenType::Ident)
    .unwrap();
  assert_eq!(name.pos.line, 2);
  assert_eq!(name.lexeme, "x");
  assert!(name.pos.offset > 0);
}

#[test]
fn reports_unterminated_strings() {
  let mut lexer = Lexer::new("{{ 'abc }}");
  let err = lexer.tokenize().unwrap_err();

  assert_eq!(err.kind, ErrorKind::Syntax);
  assert!(err.message.contains("Unterminated string literal"));
}

#[test]
fn reports_unterminated_comments() {
  let mut lexer = Lexer::new("a{# never closed");
  let err = lexer.tokenize().unwrap_err();

  assert_eq!(err.kind, ErrorKind::Syntax);
  assert!(err.message.contains("Unterminated comment"));
}

#[test]
fn reports_unterminated_tags() {
  let mut lexer = Lexer::new("{{ x");
  let err = lexer.tokenize().unwrap_err();

  assert_eq!(err.kind, ErrorKind::Syntax);
  assert!(err.message.contains("Unterminated template tag"));
}

#[test]
fn reports_unexpected_characters() {
  let mut lexer = Lexer::new("{{ @ }}");
  let err = lexer.tokenize().unwrap_err();

  assert_eq!(err.kind, ErrorKind::Syntax);
  assert!(err.message.contains("Unexpected character '@'"));
}
