#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
  pub line: usize,
  pub column: usize,
  pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
  // Literal text between tags
  Text,

  // Tag delimiters
  ExprStart, // {{
  ExprEnd,   // }}
  StmtStart, // {%
  StmtEnd,   // %}

  // Literals
  Int,
  Float,
  Str,
  True,
  False,
  None,

  // Identifiers and keywords
  Ident,

  // Keywords
  If,
  Elif,
  Else,
  EndIf,
  For,
  EndFor,
  In,
  Is,
  And,
  Or,
  Not,
  Set,
  EndSet,
  Macro,
  EndMacro,
  Call,
  EndCall,

  // Operators
  Plus,       // +
  Minus,      // -
  Star,       // *
  StarStar,   // **
  Slash,      // /
  SlashSlash, // //
  Percent,    // %
  Tilde,      // ~

  Assign, // =
  EqEq,   // ==
  NotEq,  // !=
  Lt,     // <
  LtEq,   // <=
  Gt,     // >
  GtEq,   // >=

  Pipe, // |

  // Delimiters
  Dot,      // .
  Comma,    // ,
  Colon,    // :
  LParen,   // (
  RParen,   // )
  LBracket, // [
  RBracket, // ]
  LBrace,   // {
  RBrace,   // }

  // Special
  Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
  pub token_type: TokenType,
  pub lexeme: String,
  pub pos: Pos,
}

impl Token {
  pub fn new(token_type: TokenType, lexeme: String, pos: Pos) -> Self {
    Self {
      token_type,
      lexeme,
      pos,
    }
  }
}

pub fn keyword_or_ident(word: &str) -> TokenType {
  match word {
    "if" => TokenType::If,
    "elif" => TokenType::Elif,
    "else" => TokenType::Else,
    "endif" => TokenType::EndIf,
    "for" => TokenType::For,
    "endfor" => TokenType::EndFor,
    "in" => TokenType::In,
    "is" => TokenType::Is,
    "and" => TokenType::And,
    "or" => TokenType::Or,
    "not" => TokenType::Not,
    "set" => TokenType::Set,
    "endset" => TokenType::EndSet,
    "macro" => TokenType::Macro,
    "endmacro" => TokenType::EndMacro,
    "call" => TokenType::Call,
    "endcall" => TokenType::EndCall,
    "true" | "True" => TokenType::True,
    "false" | "False" => TokenType::False,
    "none" | "None" => TokenType::None,
    _ => TokenType::Ident,
  }
}
