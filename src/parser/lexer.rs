use logos::Logos;

/// Token kinds for the Basalt language.
///
/// `Error` carries its message in the token lexeme and is consumed by the
/// parser like any other token; `Eof` is synthesized when the source is
/// exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Minus,
    Plus,
    Colon,
    Semicolon,
    Slash,
    Star,
    At,
    Question,
    // One or two character tokens
    QuestionDot,
    QuestionColon,
    Bang,
    BangEqual,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    // Literals
    Identifier,
    Str,
    Number,
    // Keywords
    And,
    Class,
    Else,
    False,
    Final,
    Fn,
    For,
    Getter,
    If,
    Import,
    In,
    Inline,
    Let,
    Magic,
    Null,
    Or,
    Private,
    Public,
    Return,
    Setter,
    Static,
    True,
    While,

    Error,
    Eof,
}

/// Numeric kind inferred by the scanner from a literal's suffix or
/// fractional form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Int,
    Long,
    Float,
    Double,
}

/// Lexical token with its source slice and line
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub number_kind: Option<NumberKind>,
}

impl Token {
    pub fn eof(line: usize) -> Self {
        Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            line,
            number_kind: None,
        }
    }

    fn error(message: &str, line: usize) -> Self {
        Token {
            kind: TokenKind::Error,
            lexeme: message.to_string(),
            line,
            number_kind: None,
        }
    }
}

/// Raw token automaton. The public [`Scanner`] wraps this with lexeme
/// slicing, line tracking and error-token production.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("-")]
    Minus,
    #[token("+")]
    Plus,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token("/")]
    Slash,
    #[token("*")]
    Star,
    #[token("@")]
    At,
    #[token("?")]
    Question,
    #[token("?.")]
    QuestionDot,
    #[token("?:")]
    QuestionColon,
    #[token("!")]
    Bang,
    #[token("!=")]
    BangEqual,
    #[token("+=")]
    PlusEqual,
    #[token("-=")]
    MinusEqual,
    #[token("*=")]
    StarEqual,
    #[token("/=")]
    SlashEqual,
    #[token("=")]
    Equal,
    #[token("==")]
    EqualEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,

    #[token("and")]
    And,
    #[token("class")]
    Class,
    #[token("else")]
    Else,
    #[token("false")]
    False,
    #[token("final")]
    Final,
    #[token("fn")]
    Fn,
    #[token("for")]
    For,
    #[token("getter")]
    Getter,
    #[token("if")]
    If,
    #[token("import")]
    Import,
    #[token("in")]
    In,
    #[token("inline")]
    Inline,
    #[token("let")]
    Let,
    #[token("magic")]
    Magic,
    #[token("null")]
    Null,
    #[token("or")]
    Or,
    #[token("private")]
    Private,
    #[token("public")]
    Public,
    #[token("return")]
    Return,
    #[token("setter")]
    Setter,
    #[token("static")]
    Static,
    #[token("true")]
    True,
    #[token("while")]
    While,

    #[regex(r#""[^"]*""#)]
    Str,
    #[regex(r"[0-9]+\.[0-9]+[fd]?")]
    #[regex(r"[0-9]+[lfd]?")]
    Number,
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Identifier,

    #[regex(r"//[^\n]*")]
    LineComment,
    #[regex(r"[ \t\r\n]+")]
    Whitespace,
}

impl Lexeme {
    fn kind(self) -> TokenKind {
        match self {
            Lexeme::LeftParen => TokenKind::LeftParen,
            Lexeme::RightParen => TokenKind::RightParen,
            Lexeme::LeftBrace => TokenKind::LeftBrace,
            Lexeme::RightBrace => TokenKind::RightBrace,
            Lexeme::LeftBracket => TokenKind::LeftBracket,
            Lexeme::RightBracket => TokenKind::RightBracket,
            Lexeme::Comma => TokenKind::Comma,
            Lexeme::Dot => TokenKind::Dot,
            Lexeme::Minus => TokenKind::Minus,
            Lexeme::Plus => TokenKind::Plus,
            Lexeme::Colon => TokenKind::Colon,
            Lexeme::Semicolon => TokenKind::Semicolon,
            Lexeme::Slash => TokenKind::Slash,
            Lexeme::Star => TokenKind::Star,
            Lexeme::At => TokenKind::At,
            Lexeme::Question => TokenKind::Question,
            Lexeme::QuestionDot => TokenKind::QuestionDot,
            Lexeme::QuestionColon => TokenKind::QuestionColon,
            Lexeme::Bang => TokenKind::Bang,
            Lexeme::BangEqual => TokenKind::BangEqual,
            Lexeme::PlusEqual => TokenKind::PlusEqual,
            Lexeme::MinusEqual => TokenKind::MinusEqual,
            Lexeme::StarEqual => TokenKind::StarEqual,
            Lexeme::SlashEqual => TokenKind::SlashEqual,
            Lexeme::Equal => TokenKind::Equal,
            Lexeme::EqualEqual => TokenKind::EqualEqual,
            Lexeme::Greater => TokenKind::Greater,
            Lexeme::GreaterEqual => TokenKind::GreaterEqual,
            Lexeme::Less => TokenKind::Less,
            Lexeme::LessEqual => TokenKind::LessEqual,
            Lexeme::And => TokenKind::And,
            Lexeme::Class => TokenKind::Class,
            Lexeme::Else => TokenKind::Else,
            Lexeme::False => TokenKind::False,
            Lexeme::Final => TokenKind::Final,
            Lexeme::Fn => TokenKind::Fn,
            Lexeme::For => TokenKind::For,
            Lexeme::Getter => TokenKind::Getter,
            Lexeme::If => TokenKind::If,
            Lexeme::Import => TokenKind::Import,
            Lexeme::In => TokenKind::In,
            Lexeme::Inline => TokenKind::Inline,
            Lexeme::Let => TokenKind::Let,
            Lexeme::Magic => TokenKind::Magic,
            Lexeme::Null => TokenKind::Null,
            Lexeme::Or => TokenKind::Or,
            Lexeme::Private => TokenKind::Private,
            Lexeme::Public => TokenKind::Public,
            Lexeme::Return => TokenKind::Return,
            Lexeme::Setter => TokenKind::Setter,
            Lexeme::Static => TokenKind::Static,
            Lexeme::True => TokenKind::True,
            Lexeme::While => TokenKind::While,
            Lexeme::Str => TokenKind::Str,
            Lexeme::Number => TokenKind::Number,
            Lexeme::Identifier => TokenKind::Identifier,
            Lexeme::LineComment | Lexeme::Whitespace => TokenKind::Error,
        }
    }
}

fn number_kind_of(lexeme: &str) -> NumberKind {
    let fractional = lexeme.contains('.');
    match lexeme.as_bytes().last() {
        Some(b'l') => NumberKind::Long,
        Some(b'f') => NumberKind::Float,
        Some(b'd') => NumberKind::Double,
        _ if fractional => NumberKind::Double,
        _ => NumberKind::Int,
    }
}

/// Scanner over one compilation unit's source text.
///
/// Produces tokens lazily; whitespace and line comments are skipped,
/// lexical failures come back as error tokens carrying a message.
pub struct Scanner<'a> {
    inner: logos::Lexer<'a, Lexeme>,
    line: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            inner: Lexeme::lexer(source),
            line: 1,
        }
    }

    /// Scan the next significant token
    pub fn next_token(&mut self) -> Token {
        loop {
            let Some(result) = self.inner.next() else {
                return Token::eof(self.line);
            };
            let slice = self.inner.slice();
            let start_line = self.line;
            self.line += slice.bytes().filter(|b| *b == b'\n').count();

            match result {
                Ok(Lexeme::Whitespace) | Ok(Lexeme::LineComment) => continue,
                Ok(lexeme) => {
                    let number_kind = match lexeme {
                        Lexeme::Number => Some(number_kind_of(slice)),
                        _ => None,
                    };
                    return Token {
                        kind: lexeme.kind(),
                        lexeme: slice.to_string(),
                        line: start_line,
                        number_kind,
                    };
                }
                Err(()) => {
                    let message = if slice.starts_with('"') {
                        "Unterminated string."
                    } else {
                        "Unexpected character."
                    };
                    return Token::error(message, start_line);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(source: &str) -> Vec<Token> {
        let mut scanner = Scanner::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = scanner.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    #[test]
    fn scans_keywords_and_identifiers() {
        let tokens = scan_all("class Point fn let while");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Class,
                TokenKind::Identifier,
                TokenKind::Fn,
                TokenKind::Let,
                TokenKind::While,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[1].lexeme, "Point");
    }

    #[test]
    fn scans_two_char_operators_with_maximal_munch() {
        let tokens = scan_all("== != >= <= += -= *= /= ?. ?: = < >");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::EqualEqual,
                TokenKind::BangEqual,
                TokenKind::GreaterEqual,
                TokenKind::LessEqual,
                TokenKind::PlusEqual,
                TokenKind::MinusEqual,
                TokenKind::StarEqual,
                TokenKind::SlashEqual,
                TokenKind::QuestionDot,
                TokenKind::QuestionColon,
                TokenKind::Equal,
                TokenKind::Less,
                TokenKind::Greater,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn infers_number_kinds() {
        let tokens = scan_all("1 2l 3f 4d 5.5 6.25f");
        let kinds: Vec<NumberKind> = tokens.iter().filter_map(|t| t.number_kind).collect();
        assert_eq!(
            kinds,
            vec![
                NumberKind::Int,
                NumberKind::Long,
                NumberKind::Float,
                NumberKind::Double,
                NumberKind::Double,
                NumberKind::Float,
            ]
        );
    }

    #[test]
    fn tracks_lines_and_skips_comments() {
        let tokens = scan_all("let a\n// comment\nlet b");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[2].line, 3);
        assert_eq!(tokens[2].kind, TokenKind::Let);
    }

    #[test]
    fn unterminated_string_is_error_token() {
        let mut scanner = Scanner::new("\"abc");
        let token = scanner.next_token();
        assert_eq!(token.kind, TokenKind::Error);
        assert_eq!(token.lexeme, "Unterminated string.");
    }
}
