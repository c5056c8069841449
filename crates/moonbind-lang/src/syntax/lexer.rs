use crate::error::{Error, ErrorCode};
use crate::syntax::token::{Token, TokenKind, keyword_or_ident};

pub struct Lexer<'a> {
    source: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source: source.as_bytes(), pos: 0, line: 1, column: 1 }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Vec<Error>> {
        let mut tokens = Vec::new();
        let mut errors = Vec::new();

        loop {
            if let Err(e) = self.skip_trivia() {
                errors.push(e);
            }

            if self.is_at_end() {
                tokens.push(Token::new(TokenKind::Eof, self.line, self.column));
                break;
            }

            match self.next_token() {
                Ok(tok) => tokens.push(tok),
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() { Ok(tokens) } else { Err(errors) }
    }

    fn next_token(&mut self) -> Result<Token, Error> {
        let line = self.line;
        let col = self.column;
        let ch = self.advance();

        let kind = match ch {
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'%' => TokenKind::Percent,
            b'^' => TokenKind::Caret,
            b'#' => TokenKind::Hash,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b']' => TokenKind::RBracket,
            b';' => TokenKind::Semicolon,
            b',' => TokenKind::Comma,

            b'/' => {
                if self.peek() == b'/' { self.advance(); TokenKind::SlashSlash }
                else { TokenKind::Slash }
            }
            b'=' => {
                if self.peek() == b'=' { self.advance(); TokenKind::EqEq }
                else { TokenKind::Eq }
            }
            b'~' => {
                if self.peek() == b'=' { self.advance(); TokenKind::TildeEq }
                else {
                    return Err(Error::new(ErrorCode::L001, line, col,
                        "expected `~=`, bare `~` is not valid"));
                }
            }
            b'<' => {
                if self.peek() == b'=' { self.advance(); TokenKind::LtEq }
                else { TokenKind::Lt }
            }
            b'>' => {
                if self.peek() == b'=' { self.advance(); TokenKind::GtEq }
                else { TokenKind::Gt }
            }
            b':' => TokenKind::Colon,
            b'.' => {
                if self.peek() == b'.' {
                    self.advance();
                    if self.peek() == b'.' { self.advance(); TokenKind::Ellipsis }
                    else { TokenKind::DotDot }
                } else if self.peek().is_ascii_digit() {
                    self.read_number(ch, line, col)?
                } else {
                    TokenKind::Dot
                }
            }
            b'[' => {
                match self.long_bracket_level() {
                    Some(level) => TokenKind::Str(self.read_long_string(level, line, col)?),
                    None => TokenKind::LBracket,
                }
            }

            b'"' | b'\'' => TokenKind::Str(self.read_string(ch, line, col)?),
            b'0'..=b'9' => self.read_number(ch, line, col)?,
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => keyword_or_ident(self.read_ident(ch)),

            other => {
                return Err(Error::new(ErrorCode::L001, line, col,
                    format!("unexpected character `{}`", other as char)));
            }
        };

        Ok(Token::new(kind, line, col))
    }

    // ─── Primitives ──────────────────────────────────────────────────────────

    fn advance(&mut self) -> u8 {
        let ch = self.source[self.pos];
        self.pos += 1;
        if ch == b'\n' { self.line += 1; self.column = 1; }
        else { self.column += 1; }
        ch
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() { 0 } else { self.source[self.pos] }
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.source.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    /// Skip whitespace and comments. A malformed block comment is reported
    /// but lexing continues from the end of input.
    fn skip_trivia(&mut self) -> Result<(), Error> {
        while !self.is_at_end() {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => { self.advance(); }
                b'-' if self.peek_at(1) == b'-' => {
                    let (line, col) = (self.line, self.column);
                    self.advance();
                    self.advance();
                    if self.peek() == b'[' {
                        self.advance();
                        if let Some(level) = self.long_bracket_level() {
                            self.read_long_string(level, line, col)?;
                            continue;
                        }
                    }
                    self.skip_line();
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn skip_line(&mut self) {
        while !self.is_at_end() && self.peek() != b'\n' { self.advance(); }
    }

    // ─── Readers ─────────────────────────────────────────────────────────────

    /// Called just after a `[`. If it opens a long bracket (`[[`, `[==[`),
    /// consume the opener and return its level.
    fn long_bracket_level(&mut self) -> Option<usize> {
        let mut level = 0;
        while self.peek_at(level) == b'=' { level += 1; }
        if self.peek_at(level) != b'[' { return None; }
        for _ in 0..=level { self.advance(); }
        Some(level)
    }

    fn read_long_string(&mut self, level: usize, line: usize, col: usize) -> Result<String, Error> {
        // a newline right after the opener is skipped
        if self.peek() == b'\r' { self.advance(); }
        if self.peek() == b'\n' { self.advance(); }
        let mut bytes = Vec::new();
        loop {
            if self.is_at_end() {
                return Err(Error::new(ErrorCode::L002, line, col, "unfinished long string or comment"));
            }
            let ch = self.advance();
            if ch == b']' {
                let closes = (0..level).all(|i| self.peek_at(i) == b'=') && self.peek_at(level) == b']';
                if closes {
                    for _ in 0..=level { self.advance(); }
                    break;
                }
            }
            bytes.push(ch);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_string(&mut self, quote: u8, start_line: usize, start_col: usize) -> Result<String, Error> {
        let mut bytes = Vec::new();
        let mut error: Option<Error> = None;
        loop {
            if self.is_at_end() || self.peek() == b'\n' {
                return Err(Error::new(ErrorCode::L002, start_line, start_col,
                    "unterminated string literal"));
            }
            let ch = self.advance();
            if ch == quote { break; }
            if ch != b'\\' {
                bytes.push(ch);
                continue;
            }
            let esc_line = self.line;
            let esc_col  = self.column;
            if self.is_at_end() { continue; }
            match self.advance() {
                b'n'  => bytes.push(b'\n'),
                b't'  => bytes.push(b'\t'),
                b'r'  => bytes.push(b'\r'),
                b'a'  => bytes.push(0x07),
                b'b'  => bytes.push(0x08),
                b'f'  => bytes.push(0x0c),
                b'v'  => bytes.push(0x0b),
                b'\\' => bytes.push(b'\\'),
                b'"'  => bytes.push(b'"'),
                b'\'' => bytes.push(b'\''),
                b'\n' => bytes.push(b'\n'),
                d @ b'0'..=b'9' => {
                    let mut n = u32::from(d - b'0');
                    for _ in 0..2 {
                        if !self.peek().is_ascii_digit() { break; }
                        n = n * 10 + u32::from(self.advance() - b'0');
                    }
                    match u8::try_from(n) {
                        Ok(b) => bytes.push(b),
                        Err(_) => if error.is_none() {
                            error = Some(Error::new(ErrorCode::L003, esc_line, esc_col,
                                "decimal escape too large"));
                        },
                    }
                }
                other => {
                    // Record the first escape error but keep consuming so the
                    // rest of the string does not cascade into more errors.
                    if error.is_none() {
                        error = Some(Error::new(ErrorCode::L003, esc_line, esc_col,
                            format!("unknown escape sequence `\\{}`", other as char)));
                    }
                }
            }
        }
        if let Some(e) = error { return Err(e); }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_number(&mut self, first: u8, line: usize, col: usize) -> Result<TokenKind, Error> {
        if first == b'0' && matches!(self.peek(), b'x' | b'X') {
            self.advance();
            let mut s = String::new();
            while self.peek().is_ascii_hexdigit() {
                s.push(self.advance() as char);
            }
            // hex literals wrap around on overflow
            return u64::from_str_radix(&s, 16)
                .map(|n| TokenKind::Integer(n as i64))
                .map_err(|_| Error::new(ErrorCode::L004, line, col, format!("malformed number `0x{s}`")));
        }

        let mut s = String::new();
        s.push(first as char);
        let mut is_float = first == b'.';
        while self.peek().is_ascii_digit() {
            s.push(self.advance() as char);
        }
        // `1..2` is a concat, not a decimal point
        if !is_float && self.peek() == b'.' && self.peek_at(1) != b'.' {
            is_float = true;
            s.push(self.advance() as char);
            while self.peek().is_ascii_digit() {
                s.push(self.advance() as char);
            }
        }
        if matches!(self.peek(), b'e' | b'E') {
            is_float = true;
            s.push(self.advance() as char);
            if matches!(self.peek(), b'+' | b'-') {
                s.push(self.advance() as char);
            }
            while self.peek().is_ascii_digit() {
                s.push(self.advance() as char);
            }
        }
        if self.peek().is_ascii_alphabetic() || self.peek() == b'_' {
            while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
                s.push(self.advance() as char);
            }
            return Err(Error::new(ErrorCode::L004, line, col, format!("malformed number `{s}`")));
        }

        if !is_float {
            if let Ok(n) = s.parse::<i64>() {
                return Ok(TokenKind::Integer(n));
            }
        }
        s.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| Error::new(ErrorCode::L004, line, col, format!("malformed number `{s}`")))
    }

    fn read_ident(&mut self, first: u8) -> String {
        let mut s = String::new();
        s.push(first as char);
        while !self.is_at_end() && (self.peek().is_ascii_alphanumeric() || self.peek() == b'_') {
            s.push(self.advance() as char);
        }
        s
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn lex_err(src: &str) -> Vec<Error> {
        Lexer::new(src).tokenize().unwrap_err()
    }

    #[test]
    fn empty() {
        assert_eq!(lex(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn integer_literal() {
        assert_eq!(lex("42"), vec![TokenKind::Integer(42), TokenKind::Eof]);
    }

    #[test]
    fn float_literal() {
        assert_eq!(lex("3.5"), vec![TokenKind::Number(3.5), TokenKind::Eof]);
        assert_eq!(lex("1e3"), vec![TokenKind::Number(1000.0), TokenKind::Eof]);
        assert_eq!(lex(".5"), vec![TokenKind::Number(0.5), TokenKind::Eof]);
    }

    #[test]
    fn hex_literal() {
        assert_eq!(lex("0xff"), vec![TokenKind::Integer(255), TokenKind::Eof]);
    }

    #[test]
    fn concat_not_consumed_by_number() {
        assert_eq!(
            lex("1..2"),
            vec![TokenKind::Integer(1), TokenKind::DotDot, TokenKind::Integer(2), TokenKind::Eof]
        );
    }

    #[test]
    fn dot_colon_and_ellipsis() {
        assert_eq!(
            lex("a.b:c(...)"),
            vec![
                TokenKind::Ident("a".into()), TokenKind::Dot, TokenKind::Ident("b".into()),
                TokenKind::Colon, TokenKind::Ident("c".into()),
                TokenKind::LParen, TokenKind::Ellipsis, TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords() {
        assert_eq!(lex("local"),    vec![TokenKind::Local,    TokenKind::Eof]);
        assert_eq!(lex("function"), vec![TokenKind::Function, TokenKind::Eof]);
        assert_eq!(lex("elseif"),   vec![TokenKind::ElseIf,   TokenKind::Eof]);
        assert_eq!(lex("nil"),      vec![TokenKind::Nil,      TokenKind::Eof]);
        assert_eq!(lex("until"),    vec![TokenKind::Until,    TokenKind::Eof]);
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(lex("=="), vec![TokenKind::EqEq,       TokenKind::Eof]);
        assert_eq!(lex("~="), vec![TokenKind::TildeEq,    TokenKind::Eof]);
        assert_eq!(lex("<="), vec![TokenKind::LtEq,       TokenKind::Eof]);
        assert_eq!(lex(">="), vec![TokenKind::GtEq,       TokenKind::Eof]);
        assert_eq!(lex("//"), vec![TokenKind::SlashSlash, TokenKind::Eof]);
        assert_eq!(lex(".."), vec![TokenKind::DotDot,     TokenKind::Eof]);
    }

    #[test]
    fn line_comment_skipped() {
        assert_eq!(lex("-- comment\n42"), vec![TokenKind::Integer(42), TokenKind::Eof]);
    }

    #[test]
    fn block_comment_skipped() {
        assert_eq!(lex("--[[ a\nb ]]42"), vec![TokenKind::Integer(42), TokenKind::Eof]);
        assert_eq!(lex("--[==[ ]] ]==]7"), vec![TokenKind::Integer(7), TokenKind::Eof]);
    }

    #[test]
    fn minus_is_not_a_comment() {
        assert_eq!(lex("-1"), vec![TokenKind::Minus, TokenKind::Integer(1), TokenKind::Eof]);
    }

    #[test]
    fn string_literals() {
        assert_eq!(lex(r#""hello""#), vec![TokenKind::Str("hello".into()), TokenKind::Eof]);
        assert_eq!(lex("'hi'"), vec![TokenKind::Str("hi".into()), TokenKind::Eof]);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(lex(r#""a\nb""#), vec![TokenKind::Str("a\nb".into()), TokenKind::Eof]);
        assert_eq!(lex(r#"'it\'s'"#), vec![TokenKind::Str("it's".into()), TokenKind::Eof]);
        assert_eq!(lex(r#""\65""#), vec![TokenKind::Str("A".into()), TokenKind::Eof]);
    }

    #[test]
    fn utf8_string_survives() {
        assert_eq!(lex("\"héllo\""), vec![TokenKind::Str("héllo".into()), TokenKind::Eof]);
    }

    #[test]
    fn long_string() {
        assert_eq!(lex("[[\nline]]"), vec![TokenKind::Str("line".into()), TokenKind::Eof]);
    }

    #[test]
    fn unterminated_string_error() {
        let errs = lex_err(r#""oops"#);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].code, ErrorCode::L002);
    }

    #[test]
    fn invalid_escape_error() {
        let errs = lex_err(r#""\q""#);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].code, ErrorCode::L003);
    }

    #[test]
    fn malformed_number_error() {
        let errs = lex_err("3abc");
        assert_eq!(errs[0].code, ErrorCode::L004);
    }

    #[test]
    fn bare_tilde_error() {
        let errs = lex_err("~");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].code, ErrorCode::L001);
    }

    #[test]
    fn line_and_column_tracking() {
        let tokens = Lexer::new("a\n  b").tokenize().unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }

    #[test]
    fn local_declaration() {
        assert_eq!(
            lex("local x = 3"),
            vec![TokenKind::Local, TokenKind::Ident("x".into()), TokenKind::Eq, TokenKind::Integer(3), TokenKind::Eof]
        );
    }

    #[test]
    fn token_kind_helpers() {
        assert!(TokenKind::Plus.is_arithmetic());
        assert!(TokenKind::TildeEq.is_comparison());
        assert!(TokenKind::Integer(1).is_literal());
        assert!(TokenKind::End.is_block_end());
        assert!(TokenKind::Function.is_keyword());
        assert!(!TokenKind::Ident("x".into()).is_keyword());
    }
}
