use tracing::debug;

use super::ast::{
    AnnotationArg, Capture, ErrorNode, Expr, Frontmatter, PipeChain, PipeStep, Script, Statement,
    Terminator, TypeOp,
};
use super::hints;
use crate::error::{Error, ErrorCode, Result};
use crate::lexer::{Lexer, SourceLocation, SourceSpan, Token, TokenKind};
use crate::stack::ensure_sufficient_stack;

/// Result of [`parse_with_recovery`]
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    /// Best-effort script; failed statements are `Statement::Error` placeholders
    pub ast: Script,
    /// Every error encountered, in source order
    pub errors: Vec<Error>,
    /// True when `errors` is empty
    pub success: bool,
}

/// Recursive-descent parser for Rill
///
/// Works over an eagerly collected token vector so lookahead is random
/// access. Statement-level productions live here; expression productions
/// are in `expressions.rs`.
pub struct RillParser<'a> {
    /// Whole document; token offsets index into it
    pub(super) source: &'a str,
    /// Token stream, always ending with `Eof`
    pub(super) tokens: Vec<Token>,
    /// Index of the next unread token
    pub(super) current: usize,
}

impl<'a> RillParser<'a> {
    /// Creates a parser over tokens lexed from `source`
    pub fn new(source: &'a str, mut tokens: Vec<Token>) -> Self {
        let ends_with_eof = matches!(tokens.last(), Some(token) if token.kind == TokenKind::Eof);
        if !ends_with_eof {
            let end = tokens
                .last()
                .map(|token| token.span.end)
                .unwrap_or_default();
            tokens.push(Token::new(
                TokenKind::Eof,
                String::new(),
                SourceSpan::new(end, end),
            ));
        }
        RillParser {
            source,
            tokens,
            current: 0,
        }
    }

    /// Parses every statement, stopping at the first error
    pub fn parse_statements(&mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            if self.is_at_end() {
                break;
            }
            statements.push(self.parse_statement()?);
            self.finish_statement()?;
        }
        Ok(statements)
    }

    /// Parses every statement, replacing failed ones with error nodes
    pub fn parse_statements_recovering(&mut self, errors: &mut Vec<Error>) -> Vec<Statement> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            if self.is_at_end() {
                break;
            }
            let start = self.current;
            let parsed = self
                .parse_statement()
                .and_then(|statement| self.finish_statement().map(|_| statement));
            match parsed {
                Ok(statement) => statements.push(statement),
                Err(err) => {
                    let failed_at = self.current;
                    self.synchronize(start, failed_at);
                    let node = self.error_node(start, &err);
                    debug!(message = %err, "recovered from parse error");
                    errors.push(err);
                    statements.push(Statement::Error(node));
                }
            }
        }
        statements
    }

    /// Span from the start of the document to the end of the token stream
    pub fn script_span(&self) -> SourceSpan {
        let end = self
            .tokens
            .last()
            .map(|token| token.span.end)
            .unwrap_or_default();
        SourceSpan::new(SourceLocation::new(1, 1, 0), end)
    }

    // Statements

    pub(super) fn parse_statement(&mut self) -> Result<Statement> {
        match self.peek().kind {
            TokenKind::Caret => self.parse_annotated(),
            TokenKind::FrontmatterDelimiter => Err(Error::parse(
                ErrorCode::InvalidFrontmatter,
                "Frontmatter must appear at the start of the script",
                self.peek().span.start,
            )),
            _ => {
                let chain = self.parse_pipe_chain()?;
                let span = chain.span;
                Ok(Statement::Expression { chain, span })
            }
        }
    }

    /// `^(key: value, ...)` followed by the statement it annotates
    fn parse_annotated(&mut self) -> Result<Statement> {
        let caret = self.advance();
        if !self.next_is_touching(&TokenKind::LeftParen) {
            return Err(self.expected_error(
                "`(` after `^`",
                Some("Annotations are written `^(key: value)`.".to_string()),
            ));
        }
        self.advance();

        let mut annotations = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::RightParen) {
            let key_start = self.peek().span.start;
            let key = self.expect_name("annotation key")?;
            self.expect(TokenKind::Colon, "after annotation key")?;
            self.skip_newlines();
            let value = self.parse_element()?;
            annotations.push(AnnotationArg {
                key,
                value,
                span: self.span_from(key_start),
            });
            self.skip_newlines();
            if !self.matches(&TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.expect(TokenKind::RightParen, "to close annotation")?;
        self.skip_newlines();

        let statement = Box::new(self.parse_statement()?);
        Ok(Statement::Annotated {
            annotations,
            statement,
            span: self.span_from(caret.span.start),
        })
    }

    /// A statement must be followed by a line break, `}`, the end of
    /// input, or another statement on the same line.
    pub(super) fn finish_statement(&self) -> Result<()> {
        let kind = &self.peek().kind;
        if matches!(
            kind,
            TokenKind::Newline | TokenKind::Eof | TokenKind::RightBrace
        ) || starts_statement(kind)
        {
            Ok(())
        } else {
            Err(self.unexpected("after statement"))
        }
    }

    // Pipe chains

    /// `head (-> target | :> $capture)* (-> terminator)?`
    pub(super) fn parse_pipe_chain(&mut self) -> Result<PipeChain> {
        ensure_sufficient_stack(|| self.parse_pipe_chain_inner())
    }

    fn parse_pipe_chain_inner(&mut self) -> Result<PipeChain> {
        let start = self.peek().span.start;
        let head = self.parse_chain_element()?;
        let mut steps = Vec::new();
        let mut terminator = None;

        loop {
            // A chain may continue on the next line with `->` or `:>`
            if matches!(
                self.peek_past_newlines(),
                TokenKind::Arrow | TokenKind::CaptureArrow
            ) {
                self.skip_newlines();
            }

            match self.peek().kind {
                TokenKind::Arrow => {
                    self.advance();
                    self.skip_newlines();
                    match self.peek().kind {
                        TokenKind::Break => {
                            let token = self.advance();
                            terminator = Some(Terminator::Break(token.span));
                            break;
                        }
                        TokenKind::Return => {
                            let token = self.advance();
                            terminator = Some(Terminator::Return(token.span));
                            break;
                        }
                        TokenKind::Variable(_) if self.is_capture_target() => {
                            let capture = self.parse_capture()?;
                            if matches!(
                                self.peek_past_newlines(),
                                TokenKind::Arrow | TokenKind::CaptureArrow
                            ) {
                                self.skip_newlines();
                                let token = self.peek();
                                return Err(Error::parse(
                                    ErrorCode::UnexpectedToken,
                                    hints::with_help(
                                        format!(
                                            "Unexpected {} after capture `${}`",
                                            token.kind.describe(),
                                            capture.name
                                        ),
                                        Some(hints::CAPTURE_CONTINUES.to_string()),
                                    ),
                                    token.span.start,
                                ));
                            }
                            terminator = Some(Terminator::Capture(capture));
                            break;
                        }
                        _ => {
                            let target = self.parse_chain_element()?;
                            steps.push(PipeStep::Target(target));
                        }
                    }
                }
                TokenKind::CaptureArrow => {
                    self.advance();
                    self.skip_newlines();
                    steps.push(PipeStep::Capture(self.parse_capture()?));
                }
                _ => break,
            }
        }

        Ok(PipeChain {
            head: Box::new(head),
            steps,
            terminator,
            span: self.span_from(start),
        })
    }

    /// `$name` after `->` is a capture unless it is called or accessed
    fn is_capture_target(&self) -> bool {
        let token = self.peek();
        let next = self.peek_at(1);
        !(token.touches(next)
            && matches!(
                next.kind,
                TokenKind::LeftParen
                    | TokenKind::Dot
                    | TokenKind::LeftBracket
                    | TokenKind::DotQuestion
            ))
    }

    /// `$name` or `$name:type`
    pub(super) fn parse_capture(&mut self) -> Result<Capture> {
        let token = self.peek().clone();
        let name = match token.kind {
            TokenKind::Variable(ref name) => name.clone(),
            TokenKind::PipeVar | TokenKind::Accumulator => {
                return Err(self.error_at(
                    &token,
                    hints::with_help(
                        format!("Cannot capture into {}", token.kind.describe()),
                        Some("`$` and `$@` are managed by the runtime; capture into a named variable such as `$result`.".to_string()),
                    ),
                ));
            }
            _ => return Err(self.expected_error("a variable to capture into (`$name`)", None)),
        };
        self.advance();

        let type_annotation = if self.check(&TokenKind::Colon) {
            self.advance();
            Some(self.parse_type_name()?)
        } else {
            None
        };

        Ok(Capture {
            name,
            type_annotation,
            span: self.span_from(token.span.start),
        })
    }

    /// Head or target of a chain, with trailing `?`, `@` and `:type` continuations
    pub(super) fn parse_chain_element(&mut self) -> Result<Expr> {
        let start = self.peek().span.start;
        let expr = match self.peek().kind {
            TokenKind::Question => self.parse_conditional_tail(None, start)?,
            TokenKind::At if self.is_sequential_spread() => self.parse_sequential_spread()?,
            TokenKind::At => self.parse_loop_tail(None, start)?,
            _ => self.parse_or()?,
        };
        self.parse_continuations(expr, start)
    }

    fn parse_continuations(&mut self, mut expr: Expr, start: SourceLocation) -> Result<Expr> {
        loop {
            expr = match self.peek().kind {
                TokenKind::Question => self.parse_conditional_tail(Some(expr), start)?,
                TokenKind::At => self.parse_loop_tail(Some(expr), start)?,
                TokenKind::Colon | TokenKind::ColonQuestion => {
                    self.parse_type_op(Some(expr), start)?
                }
                _ => return Ok(expr),
            };
        }
    }

    /// `? then [! else]`, where `else` may continue with `?` (else-if)
    fn parse_conditional_tail(
        &mut self,
        condition: Option<Expr>,
        start: SourceLocation,
    ) -> Result<Expr> {
        self.advance();
        self.skip_newlines();
        let then_branch = self.parse_or()?;

        let else_branch = if self.check(&TokenKind::Bang) {
            self.advance();
            self.skip_newlines();
            let else_start = self.peek().span.start;
            let mut branch = self.parse_or()?;
            if self.check(&TokenKind::Question) {
                branch = self.parse_conditional_tail(Some(branch), else_start)?;
            }
            Some(Box::new(branch))
        } else {
            None
        };

        Ok(Expr::Conditional(super::ast::Conditional {
            condition: condition.map(Box::new),
            then_branch: Box::new(then_branch),
            else_branch,
            span: self.span_from(start),
        }))
    }

    /// `@ body [? condition]`
    fn parse_loop_tail(&mut self, input: Option<Expr>, start: SourceLocation) -> Result<Expr> {
        self.advance();
        let body = self.parse_postfix()?;
        let condition = if self.check(&TokenKind::Question) {
            self.advance();
            self.skip_newlines();
            Some(Box::new(self.parse_or()?))
        } else {
            None
        };

        Ok(Expr::Loop(super::ast::LoopExpr {
            input: input.map(Box::new),
            body: Box::new(body),
            condition,
            span: self.span_from(start),
        }))
    }

    /// `@` followed by `[` or a variable threads through callables
    fn is_sequential_spread(&self) -> bool {
        matches!(
            self.peek_at(1).kind,
            TokenKind::LeftBracket | TokenKind::Variable(_) | TokenKind::PipeVar
        )
    }

    fn parse_sequential_spread(&mut self) -> Result<Expr> {
        let at = self.advance();
        let callables = self.parse_postfix()?;
        Ok(Expr::SequentialSpread {
            callables: Box::new(callables),
            span: self.span_from(at.span.start),
        })
    }

    /// `:type` or `:?type`, applied to `operand` or to `$`
    pub(super) fn parse_type_op(
        &mut self,
        operand: Option<Expr>,
        start: SourceLocation,
    ) -> Result<Expr> {
        let checking = self.check(&TokenKind::ColonQuestion);
        self.advance();
        let ty = self.parse_type_name()?;
        let op = TypeOp {
            operand: operand.map(Box::new),
            ty,
            span: self.span_from(start),
        };
        Ok(if checking {
            Expr::TypeCheck(op)
        } else {
            Expr::TypeAssertion(op)
        })
    }

    // Recovery

    /// Skip from the failed statement's first token to the next newline at
    /// bracket depth zero that lies at or after the failure point.
    fn synchronize(&mut self, start: usize, failed_at: usize) {
        self.current = start;
        let mut depth = 0usize;
        while !self.is_at_end() {
            match self.peek().kind {
                TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => depth += 1,
                TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                    depth = depth.saturating_sub(1)
                }
                TokenKind::Newline if depth == 0 && self.current >= failed_at => break,
                _ => {}
            }
            self.current += 1;
        }
    }

    fn error_node(&self, start: usize, err: &Error) -> ErrorNode {
        let first = &self.tokens[start];
        let last = &self.tokens[self.current.saturating_sub(1).max(start)];
        let span = SourceSpan::new(first.span.start, last.span.end);
        let text = self
            .source
            .get(span.start.offset..span.end.offset)
            .unwrap_or_default()
            .trim_end()
            .to_string();
        ErrorNode {
            text,
            message: err.message().to_string(),
            span,
        }
    }

    // Cursor helpers

    pub(super) fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    pub(super) fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    pub(super) fn peek_at(&self, ahead: usize) -> &Token {
        &self.tokens[(self.current + ahead).min(self.tokens.len() - 1)]
    }

    pub(super) fn kind_at(&self, index: usize) -> &TokenKind {
        &self.tokens[index.min(self.tokens.len() - 1)].kind
    }

    pub(super) fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    pub(super) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    pub(super) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    pub(super) fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// True when the next token is `kind` and directly follows the previous one
    pub(super) fn next_is_touching(&self, kind: &TokenKind) -> bool {
        self.check(kind) && self.current > 0 && self.previous().touches(self.peek())
    }

    pub(super) fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn peek_past_newlines(&self) -> &TokenKind {
        let mut index = self.current;
        while matches!(self.kind_at(index), TokenKind::Newline) {
            index += 1;
        }
        self.kind_at(index)
    }

    /// Index of the bracket closing the one at `open`
    pub(super) fn matching_close(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for index in open..self.tokens.len() {
            match self.tokens[index].kind {
                TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => depth += 1,
                TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(index);
                    }
                }
                _ => {}
            }
        }
        None
    }

    pub(super) fn span_from(&self, start: SourceLocation) -> SourceSpan {
        let end = self.previous().span.end;
        if end.offset < start.offset {
            SourceSpan::new(start, start)
        } else {
            SourceSpan::new(start, end)
        }
    }

    pub(super) fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Token> {
        if self.check(&kind) {
            return Ok(self.advance());
        }
        let found = self.peek();
        let message = format!(
            "Expected {} {}, found {}",
            kind.describe(),
            context,
            found.kind.describe()
        );
        let hint = hints::for_expected(&kind, &found.kind);
        Err(self.error_at(found, hints::with_help(message, hint)))
    }

    /// Identifier or keyword used as a name (field, key, method)
    pub(super) fn expect_name(&mut self, what: &str) -> Result<String> {
        match name_of(&self.peek().kind) {
            Some(name) => {
                self.advance();
                Ok(name)
            }
            None => Err(self.expected_error(what, None)),
        }
    }

    // Errors

    pub(super) fn error_at(&self, token: &Token, message: impl Into<String>) -> Error {
        let code = if token.kind == TokenKind::Eof {
            ErrorCode::UnexpectedEof
        } else {
            ErrorCode::UnexpectedToken
        };
        Error::parse(code, message, token.span.start)
    }

    pub(super) fn unexpected(&self, context: &str) -> Error {
        let token = self.peek();
        let message = if token.kind == TokenKind::Eof {
            format!("Unexpected end of input {}", context)
        } else {
            format!("Unexpected {} {}", token.kind.describe(), context)
        };
        self.error_at(token, hints::with_help(message, hints::for_unexpected(&token.kind)))
    }

    pub(super) fn expected_error(&self, expected: &str, hint: Option<String>) -> Error {
        let token = self.peek();
        let message = format!("Expected {}, found {}", expected, token.kind.describe());
        let hint = hint.or_else(|| hints::for_unexpected(&token.kind));
        self.error_at(token, hints::with_help(message, hint))
    }
}

/// Identifier text, or the spelling of a keyword
pub(super) fn name_of(kind: &TokenKind) -> Option<String> {
    match kind {
        TokenKind::Identifier(name) => Some(name.clone()),
        other => other.keyword_text().map(str::to_string),
    }
}

/// Tokens that may begin a statement
pub(super) fn starts_statement(kind: &TokenKind) -> bool {
    starts_operand(kind)
        || matches!(
            kind,
            TokenKind::Caret
                | TokenKind::Question
                | TokenKind::At
                | TokenKind::Colon
                | TokenKind::ColonQuestion
        )
}

/// Tokens that may begin an operand of an operator
pub(super) fn starts_operand(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Number(_)
            | TokenKind::Str(_)
            | TokenKind::True
            | TokenKind::False
            | TokenKind::PipeVar
            | TokenKind::Variable(_)
            | TokenKind::Accumulator
            | TokenKind::Identifier(_)
            | TokenKind::Break
            | TokenKind::Return
            | TokenKind::Each
            | TokenKind::Map
            | TokenKind::Fold
            | TokenKind::Filter
            | TokenKind::LeftParen
            | TokenKind::LeftBrace
            | TokenKind::LeftBracket
            | TokenKind::Pipe
            | TokenKind::OrOr
            | TokenKind::Dot
            | TokenKind::DotQuestion
            | TokenKind::Minus
            | TokenKind::Bang
            | TokenKind::Star
            | TokenKind::StarLt
            | TokenKind::SlashLt
    )
}

// Entry points

/// Frontmatter located by a line scan before lexing
struct FrontmatterBlock {
    raw: String,
    /// `(line, offset)` of each raw line
    lines: Vec<(usize, usize)>,
    span: SourceSpan,
    body_start: SourceLocation,
}

/// Find a `---` block opening on the first non-blank line.
///
/// Frontmatter is free text, so it is located on raw lines rather than
/// through the lexer.
fn find_frontmatter(source: &str) -> Result<Option<FrontmatterBlock>> {
    let mut offset = 0;
    let mut line = 1;
    let mut rows = source.split_inclusive('\n');

    let open = loop {
        match rows.next() {
            Some(row) if row.trim().is_empty() => {
                offset += row.len();
                line += 1;
            }
            Some(row) => break row,
            None => return Ok(None),
        }
    };
    if open.trim_end() != "---" {
        return Ok(None);
    }

    let open_at = SourceLocation::new(line, 1, offset);
    offset += open.len();
    line += 1;

    let mut raw_lines = Vec::new();
    let mut lines = Vec::new();
    for row in rows {
        if row.trim_end() == "---" {
            let close_end = offset + row.len();
            let (body_start, span_end) = if row.ends_with('\n') {
                let loc = SourceLocation::new(line + 1, 1, close_end);
                (loc, SourceLocation::new(line, 4, offset + 3))
            } else {
                let loc = SourceLocation::new(line, row.chars().count() + 1, close_end);
                (loc, loc)
            };
            return Ok(Some(FrontmatterBlock {
                raw: raw_lines.join("\n"),
                lines,
                span: SourceSpan::new(open_at, span_end),
                body_start,
            }));
        }
        raw_lines.push(row.trim_end_matches(&['\n', '\r'][..]));
        lines.push((line, offset));
        offset += row.len();
        line += 1;
    }

    Err(Error::parse(
        ErrorCode::InvalidFrontmatter,
        hints::with_help(
            "Unterminated frontmatter: missing closing `---`".to_string(),
            Some("Close the metadata block with a line containing only `---`.".to_string()),
        ),
        open_at,
    ))
}

impl FrontmatterBlock {
    /// Split the block into `key: value` entries.
    ///
    /// Indented lines continue the previous value; blank lines and `#`
    /// comments are skipped.
    fn into_frontmatter(self) -> Result<Frontmatter> {
        let mut entries: Vec<(String, String)> = Vec::new();
        for (text, (line, offset)) in self.raw.split('\n').zip(self.lines.iter().copied()) {
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if text.starts_with(|c: char| c == ' ' || c == '\t') {
                if let Some((_, value)) = entries.last_mut() {
                    if !value.is_empty() {
                        value.push('\n');
                    }
                    value.push_str(trimmed);
                    continue;
                }
            }
            let invalid = || {
                Error::parse(
                    ErrorCode::InvalidFrontmatter,
                    format!("Invalid frontmatter line `{}`: expected `key: value`", trimmed),
                    SourceLocation::new(line, 1, offset),
                )
            };
            let (key, value) = trimmed.split_once(':').ok_or_else(invalid)?;
            let key = key.trim();
            if key.is_empty() {
                return Err(invalid());
            }
            entries.push((key.to_string(), unquote(value.trim()).to_string()));
        }
        Ok(Frontmatter {
            raw: self.raw,
            entries,
            span: self.span,
        })
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Location just past the last character of `source`
fn end_of(source: &str) -> SourceLocation {
    let line = source.matches('\n').count() + 1;
    let column = source
        .rsplit('\n')
        .next()
        .map(|last| last.chars().count() + 1)
        .unwrap_or(1);
    SourceLocation::new(line, column, source.len())
}

/// Parse a script, failing on the first error
pub fn parse(source: &str) -> Result<Script> {
    let (frontmatter, origin) = match find_frontmatter(source)? {
        Some(block) => {
            let origin = block.body_start;
            (Some(block.into_frontmatter()?), origin)
        }
        None => (None, SourceLocation::new(1, 1, 0)),
    };

    let tokens = Lexer::with_origin(&source[origin.offset..], origin).tokenize()?;
    let mut parser = RillParser::new(source, tokens);
    let statements = parser.parse_statements()?;
    debug!(statements = statements.len(), "parsed script");

    Ok(Script {
        frontmatter,
        statements,
        span: parser.script_span(),
    })
}

/// Parse a script, collecting every error instead of stopping at the first.
///
/// Never fails. A lexer error cannot be resynchronised, so it yields a
/// single error node covering the whole source.
pub fn parse_with_recovery(source: &str) -> ParseOutcome {
    let mut errors = Vec::new();
    let mut frontmatter = None;
    let mut origin = SourceLocation::new(1, 1, 0);

    match find_frontmatter(source) {
        Ok(Some(block)) => {
            origin = block.body_start;
            match block.into_frontmatter() {
                Ok(parsed) => frontmatter = Some(parsed),
                Err(err) => errors.push(err),
            }
        }
        Ok(None) => {}
        Err(err) => return whole_source_failure(source, err),
    }

    let tokens = match Lexer::with_origin(&source[origin.offset..], origin).tokenize() {
        Ok(tokens) => tokens,
        Err(err) => return whole_source_failure(source, err),
    };

    let mut parser = RillParser::new(source, tokens);
    let statements = parser.parse_statements_recovering(&mut errors);

    ParseOutcome {
        ast: Script {
            frontmatter,
            statements,
            span: parser.script_span(),
        },
        success: errors.is_empty(),
        errors,
    }
}

fn whole_source_failure(source: &str, err: Error) -> ParseOutcome {
    let span = SourceSpan::new(SourceLocation::new(1, 1, 0), end_of(source));
    let node = ErrorNode {
        text: source.to_string(),
        message: err.message().to_string(),
        span,
    };
    ParseOutcome {
        ast: Script {
            frontmatter: None,
            statements: vec![Statement::Error(node)],
            span,
        },
        errors: vec![err],
        success: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontmatter_entries() {
        let script = parse("---\ntitle: Demo\ntags:\n  a\n  b\n---\n\"x\"").unwrap();
        let frontmatter = script.frontmatter.unwrap();
        assert_eq!(frontmatter.get("title"), Some("Demo"));
        assert_eq!(frontmatter.get("tags"), Some("a\nb"));
        assert_eq!(script.statements.len(), 1);
        assert_eq!(script.statements[0].span().start.line, 7);
    }

    #[test]
    fn test_unterminated_frontmatter() {
        let err = parse("---\ntitle: x\n\"body\"").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFrontmatter);
    }

    #[test]
    fn test_malformed_frontmatter_line() {
        let err = parse("---\njust words\n---\n1").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFrontmatter);
        assert_eq!(err.location().unwrap().line, 2);
    }

    #[test]
    fn test_delimiter_after_statements_is_rejected() {
        let err = parse("1\n---\n").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFrontmatter);
    }

    #[test]
    fn test_recovery_resumes_after_bad_line() {
        let outcome = parse_with_recovery("\"a\" -> $x\n\"b\" = $y\n\"c\" -> $z");
        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.ast.statements.len(), 3);
        match &outcome.ast.statements[1] {
            Statement::Error(node) => assert_eq!(node.text, "\"b\" = $y"),
            other => panic!("expected error node, got {:?}", other),
        }
        assert!(outcome.errors[0].message().contains("Help:"));
    }

    #[test]
    fn test_recovery_skips_whole_multiline_block() {
        let source = "\"a\" -> {\n  1 +\n  2 = 3\n}\n\"ok\"";
        let outcome = parse_with_recovery(source);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.ast.statements.len(), 2);
        assert!(matches!(outcome.ast.statements[0], Statement::Error(_)));
        assert!(matches!(
            outcome.ast.statements[1],
            Statement::Expression { .. }
        ));
    }

    #[test]
    fn test_recovery_lexer_error_covers_source() {
        let outcome = parse_with_recovery("\"unterminated");
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].code(), ErrorCode::UnterminatedString);
        match &outcome.ast.statements[..] {
            [Statement::Error(node)] => assert_eq!(node.text, "\"unterminated"),
            other => panic!("unexpected statements {:?}", other),
        }
    }

    #[test]
    fn test_capture_then_arrow_has_hint() {
        let err = parse("\"x\" -> $a -> .upper").unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnexpectedToken);
        assert!(err.message().contains(":> $name"));
    }
}
