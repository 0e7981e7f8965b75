use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed, in characters)
    pub column: usize,
    /// Byte offset from the start of the source (0-indexed)
    pub offset: usize,
}

impl SourceLocation {
    /// Creates a new location
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        SourceLocation {
            line,
            column,
            offset,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A start/end pair of locations; `end` is exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceSpan {
    /// First character covered
    pub start: SourceLocation,
    /// Position just past the last character covered
    pub end: SourceLocation,
}

impl SourceSpan {
    /// Creates a new span
    pub fn new(start: SourceLocation, end: SourceLocation) -> Self {
        SourceSpan { start, end }
    }

    /// Smallest span covering both `self` and `other`
    pub fn to(self, other: SourceSpan) -> SourceSpan {
        SourceSpan {
            start: self.start,
            end: other.end,
        }
    }
}

/// A piece of a string literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StringPart {
    /// Literal text with escapes already resolved
    Text(String),
    /// Raw `{...}` body, captured verbatim for the parser to re-lex
    Interpolation {
        /// Source between the braces
        source: String,
        /// Location of the first character after `{`
        start: SourceLocation,
    },
}

/// A single token from the source code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The type of token
    pub kind: TokenKind,
    /// Original text of the token
    pub value: String,
    /// Where the token sits in the source
    pub span: SourceSpan,
}

impl Token {
    /// Creates a new token with the given properties
    pub fn new(kind: TokenKind, value: String, span: SourceSpan) -> Self {
        Token { kind, value, span }
    }

    /// True when `next` starts exactly where this token ends (no whitespace)
    pub fn touches(&self, next: &Token) -> bool {
        self.span.end.offset == next.span.start.offset
    }
}

/// All possible token types in Rill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals
    /// Numeric literal (never negative; `-` is a parser construct)
    Number(f64),
    /// String or heredoc literal, split into text and interpolation parts
    Str(Vec<StringPart>),

    // Names
    /// Identifier, possibly namespaced (`fs::read`)
    Identifier(String),
    /// Bare `$`: the pipe variable
    PipeVar,
    /// `$name`
    Variable(String),
    /// `$@`: the accumulator
    Accumulator,

    // Keywords
    /// `true`
    True,
    /// `false`
    False,
    /// `break`
    Break,
    /// `return`
    Return,
    /// `each`
    Each,
    /// `map`
    Map,
    /// `fold`
    Fold,
    /// `filter`
    Filter,

    /// `---` at the start of a line
    FrontmatterDelimiter,

    // Two-character operators
    /// `->`
    Arrow,
    /// `:>` capture-and-continue
    CaptureArrow,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `<=`
    LtEq,
    /// `>=`
    GtEq,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `??`
    QuestionQuestion,
    /// `.?` existence check
    DotQuestion,
    /// `:?` type check
    ColonQuestion,
    /// `*<` destructure
    StarLt,
    /// `/<` slice
    SlashLt,

    // One-character operators
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `!`
    Bang,
    /// `?`
    Question,
    /// `:`
    Colon,
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `|`
    Pipe,
    /// `@`
    At,
    /// `^`
    Caret,
    /// `&`
    Ampersand,
    /// `=` (only valid in closure parameter defaults)
    Assign,

    // Special
    /// Line break; statement separator
    Newline,
    /// End of input marker
    Eof,
}

impl TokenKind {
    /// Reclassify an identifier as a keyword
    pub fn keyword(s: &str) -> Option<TokenKind> {
        match s {
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "break" => Some(TokenKind::Break),
            "return" => Some(TokenKind::Return),
            "each" => Some(TokenKind::Each),
            "map" => Some(TokenKind::Map),
            "fold" => Some(TokenKind::Fold),
            "filter" => Some(TokenKind::Filter),
            _ => None,
        }
    }

    /// Check if token is a keyword
    pub fn is_keyword(&self) -> bool {
        self.keyword_text().is_some()
    }

    /// Source spelling of a keyword token
    pub fn keyword_text(&self) -> Option<&'static str> {
        match self {
            TokenKind::True => Some("true"),
            TokenKind::False => Some("false"),
            TokenKind::Break => Some("break"),
            TokenKind::Return => Some("return"),
            TokenKind::Each => Some("each"),
            TokenKind::Map => Some("map"),
            TokenKind::Fold => Some("fold"),
            TokenKind::Filter => Some("filter"),
            _ => None,
        }
    }

    /// Look up a two-character operator
    pub fn two_char(a: char, b: char) -> Option<TokenKind> {
        let kind = match (a, b) {
            ('-', '>') => TokenKind::Arrow,
            (':', '>') => TokenKind::CaptureArrow,
            ('=', '=') => TokenKind::EqEq,
            ('!', '=') => TokenKind::NotEq,
            ('<', '=') => TokenKind::LtEq,
            ('>', '=') => TokenKind::GtEq,
            ('&', '&') => TokenKind::AndAnd,
            ('|', '|') => TokenKind::OrOr,
            ('?', '?') => TokenKind::QuestionQuestion,
            ('.', '?') => TokenKind::DotQuestion,
            (':', '?') => TokenKind::ColonQuestion,
            ('*', '<') => TokenKind::StarLt,
            ('/', '<') => TokenKind::SlashLt,
            _ => return None,
        };
        Some(kind)
    }

    /// Look up a one-character operator or delimiter
    pub fn one_char(c: char) -> Option<TokenKind> {
        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '!' => TokenKind::Bang,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            '|' => TokenKind::Pipe,
            '@' => TokenKind::At,
            '^' => TokenKind::Caret,
            '&' => TokenKind::Ampersand,
            '=' => TokenKind::Assign,
            _ => return None,
        };
        Some(kind)
    }

    /// Human-readable description used in parse errors
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Number(n) => format!("number `{}`", n),
            TokenKind::Str(_) => "string".to_string(),
            TokenKind::Identifier(name) => format!("identifier `{}`", name),
            TokenKind::PipeVar => "`$`".to_string(),
            TokenKind::Variable(name) => format!("variable `${}`", name),
            TokenKind::Accumulator => "`$@`".to_string(),
            TokenKind::FrontmatterDelimiter => "`---`".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            other => match other.keyword_text() {
                Some(kw) => format!("keyword `{}`", kw),
                None => format!("`{}`", other.symbol()),
            },
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::Arrow => "->",
            TokenKind::CaptureArrow => ":>",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::LtEq => "<=",
            TokenKind::GtEq => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::QuestionQuestion => "??",
            TokenKind::DotQuestion => ".?",
            TokenKind::ColonQuestion => ":?",
            TokenKind::StarLt => "*<",
            TokenKind::SlashLt => "/<",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::Bang => "!",
            TokenKind::Question => "?",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::Comma => ",",
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::Pipe => "|",
            TokenKind::At => "@",
            TokenKind::Caret => "^",
            TokenKind::Ampersand => "&",
            TokenKind::Assign => "=",
            _ => "?",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
