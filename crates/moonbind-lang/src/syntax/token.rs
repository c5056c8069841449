#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Integer(i64),
    Number(f64),
    Str(String),
    Ident(String),

    // Keywords
    And,
    Break,
    Do,
    Else,
    ElseIf,
    End,
    False,
    For,
    Function,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,

    // Operators
    Plus,       // +
    Minus,      // -
    Star,       // *
    Slash,      // /
    SlashSlash, // //
    Percent,    // %
    Caret,      // ^
    Hash,       // #
    EqEq,       // ==
    TildeEq,    // ~=
    Lt,         // <
    LtEq,       // <=
    Gt,         // >
    GtEq,       // >=
    Eq,         // =
    DotDot,     // ..
    Ellipsis,   // ...

    // Punctuation
    LParen,     // (
    RParen,     // )
    LBrace,     // {
    RBrace,     // }
    LBracket,   // [
    RBracket,   // ]
    Semicolon,  // ;
    Colon,      // :
    Comma,      // ,
    Dot,        // .

    Eof,
}

impl TokenKind {
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Self::Integer(_) | Self::Number(_) | Self::Str(_) | Self::Nil | Self::True | Self::False
        )
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            Self::Plus | Self::Minus | Self::Star | Self::Slash | Self::SlashSlash | Self::Percent | Self::Caret
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(self, Self::EqEq | Self::TildeEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq)
    }

    /// Tokens that close a block. A `return` must be the last statement
    /// before one of these.
    pub fn is_block_end(&self) -> bool {
        matches!(self, Self::End | Self::Else | Self::ElseIf | Self::Until | Self::Eof)
    }

    /// Human-readable form for diagnostics: `'end'`, `identifier 'x'`, `<eof>`.
    pub fn describe(&self) -> String {
        match self {
            Self::Integer(n) => format!("number {n}"),
            Self::Number(n)  => format!("number {n}"),
            Self::Str(s)     => format!("string \"{s}\""),
            Self::Ident(s)   => format!("identifier '{s}'"),
            Self::Eof        => "<eof>".to_string(),
            other            => format!("'{}'", other.lexeme()),
        }
    }

    fn lexeme(&self) -> &'static str {
        match self {
            Self::And => "and", Self::Break => "break", Self::Do => "do",
            Self::Else => "else", Self::ElseIf => "elseif", Self::End => "end",
            Self::False => "false", Self::For => "for", Self::Function => "function",
            Self::If => "if", Self::In => "in", Self::Local => "local",
            Self::Nil => "nil", Self::Not => "not", Self::Or => "or",
            Self::Repeat => "repeat", Self::Return => "return", Self::Then => "then",
            Self::True => "true", Self::Until => "until", Self::While => "while",
            Self::Plus => "+", Self::Minus => "-", Self::Star => "*",
            Self::Slash => "/", Self::SlashSlash => "//", Self::Percent => "%",
            Self::Caret => "^", Self::Hash => "#", Self::EqEq => "==",
            Self::TildeEq => "~=", Self::Lt => "<", Self::LtEq => "<=",
            Self::Gt => ">", Self::GtEq => ">=", Self::Eq => "=",
            Self::DotDot => "..", Self::Ellipsis => "...",
            Self::LParen => "(", Self::RParen => ")", Self::LBrace => "{",
            Self::RBrace => "}", Self::LBracket => "[", Self::RBracket => "]",
            Self::Semicolon => ";", Self::Colon => ":", Self::Comma => ",",
            Self::Dot => ".",
            Self::Integer(_) | Self::Number(_) | Self::Str(_) | Self::Ident(_) | Self::Eof => "",
        }
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Self::And | Self::Break | Self::Do | Self::Else | Self::ElseIf | Self::End
            | Self::False | Self::For | Self::Function | Self::If | Self::In | Self::Local
            | Self::Nil | Self::Not | Self::Or | Self::Repeat | Self::Return | Self::Then
            | Self::True | Self::Until | Self::While
        )
    }
}

/// Maps an identifier string to its keyword token, or returns `Ident`.
pub fn keyword_or_ident(s: String) -> TokenKind {
    match s.as_str() {
        "and"      => TokenKind::And,
        "break"    => TokenKind::Break,
        "do"       => TokenKind::Do,
        "else"     => TokenKind::Else,
        "elseif"   => TokenKind::ElseIf,
        "end"      => TokenKind::End,
        "false"    => TokenKind::False,
        "for"      => TokenKind::For,
        "function" => TokenKind::Function,
        "if"       => TokenKind::If,
        "in"       => TokenKind::In,
        "local"    => TokenKind::Local,
        "nil"      => TokenKind::Nil,
        "not"      => TokenKind::Not,
        "or"       => TokenKind::Or,
        "repeat"   => TokenKind::Repeat,
        "return"   => TokenKind::Return,
        "then"     => TokenKind::Then,
        "true"     => TokenKind::True,
        "until"    => TokenKind::Until,
        "while"    => TokenKind::While,
        _          => TokenKind::Ident(s),
    }
}

// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }
}
