use super::token::{SourceLocation, SourceSpan, StringPart, Token, TokenKind};
use crate::error::{Error, ErrorCode, Result};

/// Forward-scanning lexer for Rill source
///
/// Tokens are produced one at a time by [`Lexer::next_token`]; the parser
/// collects them eagerly through [`Lexer::tokenize`] for random-access
/// lookahead.
pub struct Lexer<'a> {
    /// Source text
    source: &'a str,
    /// Characters paired with their byte offsets
    chars: Vec<(usize, char)>,
    /// Index of the next unread character
    current: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
    /// Offset of `source` inside the enclosing document (sub-lexers)
    base_offset: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer over a whole document
    pub fn new(source: &'a str) -> Self {
        Self::with_origin(source, SourceLocation::new(1, 1, 0))
    }

    /// Creates a lexer whose locations are reported relative to `origin`.
    ///
    /// Used for interpolation bodies so that errors point into the
    /// enclosing document.
    pub fn with_origin(source: &'a str, origin: SourceLocation) -> Self {
        Lexer {
            source,
            chars: source.char_indices().collect(),
            current: 0,
            line: origin.line,
            column: origin.column,
            base_offset: origin.offset,
        }
    }

    /// Scans all tokens, ending with a single `Eof`
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let at_end = token.kind == TokenKind::Eof;
            tokens.push(token);
            if at_end {
                return Ok(tokens);
            }
        }
    }

    /// Produces the next token; returns `Eof` repeatedly once input is exhausted
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia();

        let start = self.location();
        let start_idx = self.current;

        if self.is_at_end() {
            return Ok(self.make_token(TokenKind::Eof, start, start_idx));
        }

        let c = self.peek();
        let kind = match c {
            '\n' => {
                self.advance();
                TokenKind::Newline
            }
            '"' => {
                self.advance();
                self.scan_string(start)?
            }
            '<' if self.peek_next() == '<' && is_ident_start(self.peek_at(2)) => {
                self.advance();
                self.advance();
                self.scan_heredoc(start)?
            }
            c if c.is_ascii_digit() => self.scan_number(start)?,
            c if is_ident_start(c) => self.scan_identifier(),
            '$' => {
                self.advance();
                self.scan_variable()
            }
            '-' if self.column == 1 && self.peek_next() == '-' && self.peek_at(2) == '-' => {
                self.advance();
                self.advance();
                self.advance();
                TokenKind::FrontmatterDelimiter
            }
            _ => {
                if let Some(kind) = TokenKind::two_char(c, self.peek_next()) {
                    self.advance();
                    self.advance();
                    kind
                } else if let Some(kind) = TokenKind::one_char(c) {
                    self.advance();
                    kind
                } else {
                    return Err(Error::lexer(
                        ErrorCode::UnexpectedCharacter,
                        format!("Unexpected character '{}'", c),
                        start,
                    ));
                }
            }
        };

        Ok(self.make_token(kind, start, start_idx))
    }

    /// Skips spaces, tabs, carriage returns and `#` comments (not newlines)
    fn skip_trivia(&mut self) {
        while !self.is_at_end() {
            match self.peek() {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                '#' => {
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_string(&mut self, start: SourceLocation) -> Result<TokenKind> {
        let mut parts = Vec::new();
        let mut text = String::new();

        loop {
            if self.is_at_end() {
                return Err(Error::lexer(
                    ErrorCode::UnterminatedString,
                    "Unterminated string",
                    start,
                ));
            }
            let escape_at = self.location();
            match self.advance() {
                '"' => break,
                '\\' => {
                    if self.is_at_end() {
                        return Err(Error::lexer(
                            ErrorCode::UnterminatedString,
                            "Unterminated string",
                            start,
                        ));
                    }
                    let escaped = self.advance();
                    text.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        '\\' => '\\',
                        '"' => '"',
                        '{' => '{',
                        '}' => '}',
                        other => {
                            return Err(Error::lexer(
                                ErrorCode::InvalidEscape,
                                format!("Invalid escape sequence \\{}", other),
                                escape_at,
                            ));
                        }
                    });
                }
                '{' => {
                    if !text.is_empty() {
                        parts.push(StringPart::Text(std::mem::take(&mut text)));
                    }
                    let body_start = self.location();
                    let source = self.scan_interpolation(escape_at)?;
                    parts.push(StringPart::Interpolation {
                        source,
                        start: body_start,
                    });
                }
                c => text.push(c),
            }
        }

        if !text.is_empty() || parts.is_empty() {
            parts.push(StringPart::Text(text));
        }
        Ok(TokenKind::Str(parts))
    }

    /// Captures an interpolation body verbatim, up to its matching `}`.
    ///
    /// Brace depth is counted so bodies may contain blocks and dict
    /// literals; string literals inside the body are copied whole so their
    /// quotes and braces do not disturb the count.
    fn scan_interpolation(&mut self, open: SourceLocation) -> Result<String> {
        let mut body = String::new();
        let mut depth = 1usize;

        loop {
            if self.is_at_end() {
                return Err(Error::lexer(
                    ErrorCode::UnterminatedString,
                    "Unterminated interpolation: missing `}`",
                    open,
                ));
            }
            match self.advance() {
                '{' => {
                    depth += 1;
                    body.push('{');
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(body);
                    }
                    body.push('}');
                }
                '"' => {
                    body.push('"');
                    self.copy_nested_string(&mut body, open)?;
                }
                c => body.push(c),
            }
        }
    }

    fn copy_nested_string(&mut self, body: &mut String, open: SourceLocation) -> Result<()> {
        loop {
            if self.is_at_end() {
                return Err(Error::lexer(
                    ErrorCode::UnterminatedString,
                    "Unterminated string inside interpolation",
                    open,
                ));
            }
            let c = self.advance();
            body.push(c);
            match c {
                '"' => return Ok(()),
                '\\' if !self.is_at_end() => body.push(self.advance()),
                '{' => {
                    let inner = self.scan_interpolation(open)?;
                    body.push_str(&inner);
                    body.push('}');
                }
                _ => {}
            }
        }
    }

    fn scan_heredoc(&mut self, start: SourceLocation) -> Result<TokenKind> {
        let mut delimiter = String::new();
        while is_ident_char(self.peek()) {
            delimiter.push(self.advance());
        }

        while matches!(self.peek(), ' ' | '\t' | '\r') {
            self.advance();
        }
        if self.is_at_end() {
            return Err(Error::lexer(
                ErrorCode::UnterminatedHeredoc,
                format!("Unterminated heredoc: missing closing `{}`", delimiter),
                start,
            ));
        }
        if self.peek() != '\n' {
            return Err(Error::lexer(
                ErrorCode::UnexpectedCharacter,
                format!(
                    "Unexpected character '{}' after heredoc delimiter",
                    self.peek()
                ),
                self.location(),
            ));
        }
        self.advance();

        let mut parts = Vec::new();
        let mut text = String::new();

        loop {
            if self.is_at_end() {
                return Err(Error::lexer(
                    ErrorCode::UnterminatedHeredoc,
                    format!("Unterminated heredoc: missing closing `{}`", delimiter),
                    start,
                ));
            }

            // At the start of a line: is this the closing delimiter?
            if self.rest_of_line().trim() == delimiter {
                while !self.is_at_end() && self.peek() != '\n' {
                    self.advance();
                }
                if text.ends_with('\n') {
                    text.pop();
                }
                break;
            }

            while !self.is_at_end() {
                let at = self.location();
                match self.advance() {
                    '\n' => {
                        text.push('\n');
                        break;
                    }
                    '\\' if matches!(self.peek(), '{' | '}') => text.push(self.advance()),
                    '{' => {
                        if !text.is_empty() {
                            parts.push(StringPart::Text(std::mem::take(&mut text)));
                        }
                        let body_start = self.location();
                        let source = self.scan_interpolation(at)?;
                        parts.push(StringPart::Interpolation {
                            source,
                            start: body_start,
                        });
                    }
                    c => text.push(c),
                }
            }
        }

        if !text.is_empty() || parts.is_empty() {
            parts.push(StringPart::Text(text));
        }
        Ok(TokenKind::Str(parts))
    }

    fn scan_number(&mut self, start: SourceLocation) -> Result<TokenKind> {
        let from = self.byte_offset();
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }
        let text = &self.source[from..self.byte_offset()];
        text.parse::<f64>().map(TokenKind::Number).map_err(|_| {
            Error::lexer(
                ErrorCode::UnexpectedCharacter,
                format!("Invalid number: {}", text),
                start,
            )
        })
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let from = self.byte_offset();

        // `namespace::name`; namespaces may contain `-`
        let mut ahead = self.current;
        while ahead < self.chars.len() && is_namespace_char(self.chars[ahead].1) {
            ahead += 1;
        }
        let namespaced = self.char_at(ahead) == ':'
            && self.char_at(ahead + 1) == ':'
            && is_ident_start(self.char_at(ahead + 2));

        if namespaced {
            while self.current < ahead + 2 {
                self.advance();
            }
        }
        while is_ident_char(self.peek()) {
            self.advance();
        }

        let text = &self.source[from..self.byte_offset()];
        if !namespaced {
            if let Some(keyword) = TokenKind::keyword(text) {
                return keyword;
            }
        }
        TokenKind::Identifier(text.to_string())
    }

    fn scan_variable(&mut self) -> TokenKind {
        if self.peek() == '@' {
            self.advance();
            return TokenKind::Accumulator;
        }
        if !is_ident_start(self.peek()) {
            return TokenKind::PipeVar;
        }
        let mut name = String::new();
        while is_ident_char(self.peek()) {
            name.push(self.advance());
        }
        TokenKind::Variable(name)
    }

    fn rest_of_line(&self) -> String {
        self.chars[self.current..]
            .iter()
            .map(|(_, c)| *c)
            .take_while(|c| *c != '\n')
            .collect()
    }

    fn make_token(&self, kind: TokenKind, start: SourceLocation, start_idx: usize) -> Token {
        let from = self.offset_of(start_idx);
        let value = self.source[from..self.byte_offset()].to_string();
        Token::new(kind, value, SourceSpan::new(start, self.location()))
    }

    /// Location of the next unread character
    pub fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, self.base_offset + self.byte_offset())
    }

    fn byte_offset(&self) -> usize {
        self.offset_of(self.current)
    }

    fn offset_of(&self, idx: usize) -> usize {
        self.chars
            .get(idx)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.source.len())
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.current].1;
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn char_at(&self, idx: usize) -> char {
        self.chars.get(idx).map(|(_, c)| *c).unwrap_or('\0')
    }

    fn peek(&self) -> char {
        self.char_at(self.current)
    }

    fn peek_next(&self) -> char {
        self.char_at(self.current + 1)
    }

    fn peek_at(&self, ahead: usize) -> char {
        self.char_at(self.current + ahead)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_namespace_char(c: char) -> bool {
    is_ident_char(c) || c == '-'
}

/// Tokenize a whole document
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Lexer::new(source).tokenize()
}
