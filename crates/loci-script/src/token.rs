use loci_error::{LociResult, loci_err};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    IntLit(i64),
    FloatLit(f64),
    StrLit(String),

    If,
    Else,
    Do,
    While,
    For,
    In,
    Next,
    Break,
    Return,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Colon,
    Semicolon,
    Comma,
    Dot,
    Assign,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Not,
    And,
    Or,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::IntLit(v) => format!("integer literal {}", v),
            TokenKind::FloatLit(v) => format!("float literal {}", v),
            TokenKind::StrLit(_) => "string literal".to_string(),
            TokenKind::If => "'if'".to_string(),
            TokenKind::Else => "'else'".to_string(),
            TokenKind::Do => "'do'".to_string(),
            TokenKind::While => "'while'".to_string(),
            TokenKind::For => "'for'".to_string(),
            TokenKind::In => "'in'".to_string(),
            TokenKind::Next => "'next'".to_string(),
            TokenKind::Break => "'break'".to_string(),
            TokenKind::Return => "'return'".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Star => "'*'".to_string(),
            TokenKind::Slash => "'/'".to_string(),
            TokenKind::Percent => "'%'".to_string(),
            TokenKind::Caret => "'^'".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Semicolon => "';'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::Assign => "'='".to_string(),
            TokenKind::Eq => "'=='".to_string(),
            TokenKind::NotEq => "'!='".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::LtEq => "'<='".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::GtEq => "'>='".to_string(),
            TokenKind::Not => "'!'".to_string(),
            TokenKind::And => "'&'".to_string(),
            TokenKind::Or => "'|'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::Eof => "end of script".to_string(),
        }
    }
}

/// One token and the byte offset of its first character in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

impl Token {
    pub fn new(kind: TokenKind, pos: usize) -> Self {
        Token { kind, pos }
    }
}

pub fn tokenize(source: &str) -> LociResult<Vec<Token>> {
    Tokenizer::new(source).run()
}

struct Tokenizer {
    chars: Vec<(usize, char)>,
    idx: usize,
    len: usize,
}

impl Tokenizer {
    fn new(source: &str) -> Self {
        Tokenizer {
            chars: source.char_indices().collect(),
            idx: 0,
            len: source.len(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).map(|&(_, c)| c)
    }

    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.chars.get(self.idx + n).map(|&(_, c)| c)
    }

    fn pos(&self) -> usize {
        self.chars.get(self.idx).map(|&(p, _)| p).unwrap_or(self.len)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.idx += 1;
        }
        c
    }

    fn run(mut self) -> LociResult<Vec<Token>> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek() {
            let start = self.pos();

            if c.is_whitespace() {
                self.bump();
                continue;
            }

            if c == '/' {
                match self.peek_ahead(1) {
                    Some('/') => {
                        while let Some(c) = self.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.bump();
                        }
                        continue;
                    }
                    Some('*') => {
                        self.bump();
                        self.bump();
                        self.skip_block_comment(start)?;
                        continue;
                    }
                    _ => {}
                }
            }

            if c.is_ascii_digit() {
                tokens.push(self.scan_number(start)?);
                continue;
            }

            if c.is_ascii_alphabetic() || c == '_' {
                tokens.push(self.scan_identifier(start));
                continue;
            }

            if c == '\'' || c == '"' {
                tokens.push(self.scan_string(start, c)?);
                continue;
            }

            // Heredoc: << raw text >>
            if c == '<' && self.peek_ahead(1) == Some('<') {
                self.bump();
                self.bump();
                tokens.push(self.scan_heredoc(start)?);
                continue;
            }

            let kind = self.scan_operator(start)?;
            tokens.push(Token::new(kind, start));
        }

        tokens.push(Token::new(TokenKind::Eof, self.len));
        Ok(tokens)
    }

    fn skip_block_comment(&mut self, start: usize) -> LociResult<()> {
        loop {
            match self.bump() {
                Some('*') if self.peek() == Some('/') => {
                    self.bump();
                    return Ok(());
                }
                Some(_) => {}
                None => return Err(loci_err!(Tokenize: "unterminated block comment").at(start)),
            }
        }
    }

    fn scan_identifier(&mut self, start: usize) -> Token {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }

        let kind = match name.as_str() {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "do" => TokenKind::Do,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "next" => TokenKind::Next,
            "break" => TokenKind::Break,
            "return" => TokenKind::Return,
            _ => TokenKind::Ident(name),
        };
        Token::new(kind, start)
    }

    /// Decimal literals. A fraction or a negative exponent always gives a
    /// float; an `e` exponent gives an int when the expanded value fits
    /// signed 64-bit, and falls back to float otherwise. Plain digit runs
    /// outside signed 64-bit range are rejected outright.
    fn scan_number(&mut self, start: usize) -> LociResult<Token> {
        let mut lexeme = String::new();
        let mut has_dot = false;
        let mut exponent: Option<String> = None;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                lexeme.push(c);
                self.bump();
            } else {
                break;
            }
        }

        if self.peek() == Some('.') && self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit()) {
            has_dot = true;
            lexeme.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    lexeme.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }

        if self.peek() == Some('e') || self.peek() == Some('E') {
            let next = self.peek_ahead(1);
            let signed = matches!(next, Some('+') | Some('-'))
                && self.peek_ahead(2).is_some_and(|c| c.is_ascii_digit());
            let bare = next.is_some_and(|c| c.is_ascii_digit());
            if signed || bare {
                self.bump();
                let mut exp = String::new();
                if signed {
                    exp.push(self.bump().unwrap());
                }
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        exp.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                exponent = Some(exp);
            }
        }

        if has_dot || exponent.as_deref().is_some_and(|e| e.starts_with('-')) {
            let text = match &exponent {
                Some(exp) => format!("{}e{}", lexeme, exp),
                None => lexeme,
            };
            let v = text
                .parse::<f64>()
                .map_err(|_| loci_err!(Tokenize: "malformed float literal '{}'", text).at(start))?;
            return Ok(Token::new(TokenKind::FloatLit(v), start));
        }

        match &exponent {
            None => match lexeme.parse::<i64>() {
                Ok(v) => Ok(Token::new(TokenKind::IntLit(v), start)),
                Err(_) => Err(loci_err!(
                    Tokenize: "integer literal '{}' is out of signed 64-bit range", lexeme
                )
                .at(start)),
            },
            Some(exp) => {
                let expanded = lexeme
                    .parse::<i128>()
                    .ok()
                    .and_then(|mantissa| {
                        let e = exp.trim_start_matches('+').parse::<u32>().ok()?;
                        mantissa.checked_mul(10i128.checked_pow(e)?)
                    })
                    .filter(|v| i64::try_from(*v).is_ok());
                match expanded {
                    Some(v) => Ok(Token::new(TokenKind::IntLit(v as i64), start)),
                    None => {
                        let text = format!("{}e{}", lexeme, exp);
                        let v = text.parse::<f64>().map_err(|_| {
                            loci_err!(Tokenize: "malformed float literal '{}'", text).at(start)
                        })?;
                        Ok(Token::new(TokenKind::FloatLit(v), start))
                    }
                }
            }
        }
    }

    fn scan_string(&mut self, start: usize, quote: char) -> LociResult<Token> {
        self.bump();
        let mut out = String::new();

        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(loci_err!(Tokenize: "unterminated string literal").at(start));
                }
                Some('\\') => match self.bump() {
                    Some('t') => out.push('\t'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('\'') => out.push('\''),
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some(c) => {
                        return Err(
                            loci_err!(Tokenize: "illegal escape sequence '\\{}'", c).at(start)
                        );
                    }
                    None => {
                        return Err(loci_err!(Tokenize: "unterminated string literal").at(start));
                    }
                },
                Some(c) if c == quote => return Ok(Token::new(TokenKind::StrLit(out), start)),
                Some(c) => out.push(c),
            }
        }
    }

    /// `<<` raw text `>>`; no escape processing, newlines allowed.
    fn scan_heredoc(&mut self, start: usize) -> LociResult<Token> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('>') if self.peek() == Some('>') => {
                    self.bump();
                    return Ok(Token::new(TokenKind::StrLit(out), start));
                }
                Some(c) => out.push(c),
                None => return Err(loci_err!(Tokenize: "unterminated here document").at(start)),
            }
        }
    }

    fn scan_operator(&mut self, start: usize) -> LociResult<TokenKind> {
        let c = self.bump().unwrap();
        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '^' => TokenKind::Caret,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '&' => TokenKind::And,
            '|' => TokenKind::Or,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '=' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Eq
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::NotEq
                } else {
                    TokenKind::Not
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            _ => return Err(loci_err!(Tokenize: "unrecognized token '{}'", c).at(start)),
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loci_error::ErrorCode;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_stream() {
        assert_eq!(
            kinds("x = 1 + 2;"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Assign,
                TokenKind::IntLit(1),
                TokenKind::Plus,
                TokenKind::IntLit(2),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_number_classification() {
        assert_eq!(kinds("5")[0], TokenKind::IntLit(5));
        assert_eq!(kinds("5.25")[0], TokenKind::FloatLit(5.25));
        assert_eq!(kinds("1e3")[0], TokenKind::IntLit(1000));
        assert_eq!(kinds("1e-3")[0], TokenKind::FloatLit(0.001));
        assert_eq!(kinds("1.5e3")[0], TokenKind::FloatLit(1500.0));
        assert_eq!(kinds("1e30")[0], TokenKind::FloatLit(1e30));
    }

    #[test]
    fn test_out_of_range_integer_rejected() {
        let err = tokenize("99999999999999999999").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Tokenize);
        assert_eq!(err.pos(), Some(0));
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(kinds(r#""a\tb""#)[0], TokenKind::StrLit("a\tb".into()));
        assert_eq!(kinds(r#"'it\'s'"#)[0], TokenKind::StrLit("it's".into()));

        let err = tokenize(r#"  "bad\qescape""#).unwrap_err();
        assert_eq!(err.pos(), Some(2));
        assert!(err.message().contains("illegal escape"));

        let err = tokenize("\"open").unwrap_err();
        assert!(err.message().contains("unterminated"));
    }

    #[test]
    fn test_heredoc() {
        assert_eq!(
            kinds("<<line one\nline two>>")[0],
            TokenKind::StrLit("line one\nline two".into())
        );
        assert!(tokenize("<<never closed").is_err());
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("1 // trailing\n/* block\nstill */ 2"),
            vec![TokenKind::IntLit(1), TokenKind::IntLit(2), TokenKind::Eof]
        );
    }

    #[test]
    fn test_operators_and_keywords() {
        assert_eq!(
            kinds("if (a <= b) next; else break;"),
            vec![
                TokenKind::If,
                TokenKind::LParen,
                TokenKind::Ident("a".into()),
                TokenKind::LtEq,
                TokenKind::Ident("b".into()),
                TokenKind::RParen,
                TokenKind::Next,
                TokenKind::Semicolon,
                TokenKind::Else,
                TokenKind::Break,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unrecognized_token() {
        let err = tokenize("a # b").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Tokenize);
        assert_eq!(err.pos(), Some(2));
    }
}
