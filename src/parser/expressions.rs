use std::rc::Rc;

use super::ast::{
    Access, BinaryExpr, BinaryOp, Block, ClosureCall, ClosureDef, ClosureParam, CollectionExpr,
    CollectionKind, DestructureElement, DestructurePattern, DictEntry, DictKey, DictLiteral,
    ExistenceCheck, Expr, HostCall, MethodCall, PipeChain, PostfixExpr, PostfixOp, SliceExpr,
    StringLiteral, StringSegment, Terminator, TupleLiteral, UnaryExpr, UnaryOp, VariableKind,
    VariableRef,
};
use super::hints;
use super::script_parser::{name_of, starts_operand, RillParser};
use crate::error::{Error, ErrorCode, Result};
use crate::lexer::{Lexer, SourceLocation, SourceSpan, StringPart, TokenKind};
use crate::types::RillType;

impl<'a> RillParser<'a> {
    // Binary precedence: or < and < comparison < additive < multiplicative

    pub(super) fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.check(&TokenKind::OrOr) {
            left = self.binary(left, BinaryOp::Or, Self::parse_and)?;
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_comparison()?;
        while self.check(&TokenKind::AndAnd) {
            left = self.binary(left, BinaryOp::And, Self::parse_comparison)?;
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => return Ok(left),
            };
            left = self.binary(left, op, Self::parse_additive)?;
        }
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            left = self.binary(left, op, Self::parse_multiplicative)?;
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            left = self.binary(left, op, Self::parse_unary)?;
        }
    }

    fn binary(
        &mut self,
        left: Expr,
        op: BinaryOp,
        operand: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let op_span = self.advance().span;
        self.skip_newlines();
        let right = operand(self)?;
        let span = left.span().to(right.span());
        Ok(Expr::Binary(BinaryExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
            op_span,
            span,
        }))
    }

    /// `-x`, `!x`, `*x` (spread) or a postfix expression
    pub(super) fn parse_unary(&mut self) -> Result<Expr> {
        let start = self.peek().span.start;
        match self.peek().kind {
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_unary()?;
                // Negative literals fold into the number itself
                if let Expr::Number { value, .. } = operand {
                    return Ok(Expr::Number {
                        value: -value,
                        span: self.span_from(start),
                    });
                }
                Ok(Expr::Unary(UnaryExpr {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                    span: self.span_from(start),
                }))
            }
            TokenKind::Bang => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary(UnaryExpr {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                    span: self.span_from(start),
                }))
            }
            TokenKind::Star => {
                self.advance();
                let operand = if starts_operand(&self.peek().kind) {
                    Some(Box::new(self.parse_unary()?))
                } else {
                    None
                };
                Ok(Expr::Spread {
                    operand,
                    span: self.span_from(start),
                })
            }
            _ => self.parse_postfix(),
        }
    }

    /// Primary followed by touching `.method(args)` and `[index]` operations
    pub(super) fn parse_postfix(&mut self) -> Result<Expr> {
        let start = self.peek().span.start;
        let base = self.parse_primary()?;
        let mut ops = Vec::new();

        loop {
            if self.next_is_touching(&TokenKind::Dot) && name_of(&self.peek_at(1).kind).is_some()
            {
                let dot = self.advance();
                let name = self.expect_name("method name")?;
                let args = if self.next_is_touching(&TokenKind::LeftParen) {
                    self.parse_args()?
                } else {
                    Vec::new()
                };
                ops.push(PostfixOp::Method {
                    name,
                    args,
                    span: self.span_from(dot.span.start),
                });
            } else if self.next_is_touching(&TokenKind::LeftBracket) {
                let open = self.advance();
                let index = self.parse_index_body()?;
                ops.push(PostfixOp::Index {
                    index: Box::new(index),
                    span: self.span_from(open.span.start),
                });
            } else {
                break;
            }
        }

        if ops.is_empty() {
            return Ok(base);
        }
        Ok(Expr::Postfix(PostfixExpr {
            base: Box::new(base),
            ops,
            span: self.span_from(start),
        }))
    }

    pub(super) fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.peek().clone();
        let start = token.span.start;

        match token.kind {
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expr::Number {
                    value,
                    span: token.span,
                })
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Ok(Expr::Bool {
                    value: token.kind == TokenKind::True,
                    span: token.span,
                })
            }
            TokenKind::Str(parts) => {
                self.advance();
                Ok(Expr::Str(self.parse_string_parts(parts, token.span)?))
            }
            TokenKind::PipeVar => {
                self.advance();
                if self.next_is_touching(&TokenKind::LeftParen) {
                    let args = self.parse_args()?;
                    return Ok(Expr::PipeInvoke {
                        args,
                        span: self.span_from(start),
                    });
                }
                self.parse_variable_ref(VariableKind::Pipe, start)
            }
            TokenKind::Variable(name) => {
                self.advance();
                if self.next_is_touching(&TokenKind::LeftParen) {
                    let args = self.parse_args()?;
                    return Ok(Expr::ClosureCall(ClosureCall {
                        name,
                        args,
                        span: self.span_from(start),
                    }));
                }
                self.parse_variable_ref(VariableKind::Named(name), start)
            }
            TokenKind::Accumulator => {
                self.advance();
                self.parse_variable_ref(VariableKind::Accumulator, start)
            }
            TokenKind::Identifier(name) => self.parse_host_call(name, token.span),
            TokenKind::Each => self.parse_collection(CollectionKind::Each),
            TokenKind::Map => self.parse_collection(CollectionKind::Map),
            TokenKind::Fold => self.parse_collection(CollectionKind::Fold),
            TokenKind::Filter => self.parse_collection(CollectionKind::Filter),
            TokenKind::Break | TokenKind::Return => {
                // Bare `break` / `return` is shorthand for `$ -> break`
                self.advance();
                let terminator = if token.kind == TokenKind::Break {
                    Terminator::Break(token.span)
                } else {
                    Terminator::Return(token.span)
                };
                let chain = PipeChain {
                    head: Box::new(Expr::Variable(VariableRef::pipe(token.span))),
                    steps: Vec::new(),
                    terminator: Some(terminator),
                    span: token.span,
                };
                Ok(Expr::Grouped {
                    chain: Box::new(chain),
                    span: token.span,
                })
            }
            TokenKind::LeftParen => self.parse_grouped(),
            TokenKind::LeftBrace => Ok(Expr::Block(Rc::new(self.parse_block()?))),
            TokenKind::LeftBracket => {
                if self.is_dict_start() {
                    self.parse_dict()
                } else {
                    self.parse_tuple()
                }
            }
            TokenKind::Pipe | TokenKind::OrOr => self.parse_closure(),
            TokenKind::Dot => {
                self.advance();
                let name = self.expect_name("method name after `.`")?;
                let args = if self.next_is_touching(&TokenKind::LeftParen) {
                    self.parse_args()?
                } else {
                    Vec::new()
                };
                Ok(Expr::MethodCall(MethodCall {
                    name,
                    args,
                    span: self.span_from(start),
                }))
            }
            TokenKind::DotQuestion => {
                let existence = self.parse_existence_check()?;
                let default = self.parse_default()?;
                Ok(Expr::Variable(VariableRef {
                    kind: VariableKind::Pipe,
                    accesses: Vec::new(),
                    existence: Some(existence),
                    default,
                    span: self.span_from(start),
                }))
            }
            TokenKind::StarLt => Ok(Expr::Destructure(self.parse_destructure()?)),
            TokenKind::SlashLt => self.parse_slice(),
            TokenKind::Colon | TokenKind::ColonQuestion => self.parse_type_op(None, start),
            TokenKind::FrontmatterDelimiter => Err(Error::parse(
                ErrorCode::InvalidFrontmatter,
                "Frontmatter must appear at the start of the script",
                start,
            )),
            _ => Err(self.unexpected("in expression")),
        }
    }

    // Calls

    fn parse_host_call(&mut self, name: String, span: SourceSpan) -> Result<Expr> {
        self.advance();
        let args = if self.next_is_touching(&TokenKind::LeftParen) {
            Some(self.parse_args()?)
        } else {
            None
        };

        if args.is_none() {
            if let Some(hint) = hints::foreign_keyword(&name) {
                if starts_operand(&self.peek().kind) || self.check(&TokenKind::LeftBrace) {
                    return Err(Error::parse(
                        ErrorCode::UnexpectedToken,
                        hints::with_help(
                            format!("Unexpected `{}`: Rill has no `{}` statement", name, name),
                            Some(hint.to_string()),
                        ),
                        span.start,
                    ));
                }
            }
        }
        if self.check(&TokenKind::LeftBrace) {
            let hint = hints::keyword_typo(&name).unwrap_or_else(|| {
                "Pipe a value into a block with `->`.\nExample: $items -> { $ -> log }"
                    .to_string()
            });
            return Err(self.error_at(
                self.peek(),
                hints::with_help(format!("Unexpected `{{` after `{}`", name), Some(hint)),
            ));
        }

        Ok(Expr::HostCall(HostCall {
            name,
            args,
            span: self.span_from(span.start),
        }))
    }

    /// `( args )` with elements separated by commas
    pub(super) fn parse_args(&mut self) -> Result<Vec<Expr>> {
        self.expect(TokenKind::LeftParen, "to open arguments")?;
        let mut args = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::RightParen) {
            args.push(self.parse_element()?);
            self.skip_newlines();
            if !self.matches(&TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.expect(TokenKind::RightParen, "to close arguments")?;
        Ok(args)
    }

    /// A pipe chain used where an expression is expected
    pub(super) fn parse_element(&mut self) -> Result<Expr> {
        let chain = self.parse_pipe_chain()?;
        Ok(chain_into_expr(chain))
    }

    fn parse_grouped(&mut self) -> Result<Expr> {
        let open = self.advance();
        self.skip_newlines();
        if self.check(&TokenKind::RightParen) {
            return Err(self.expected_error("an expression inside `( )`", None));
        }
        let chain = self.parse_pipe_chain()?;
        self.skip_newlines();
        self.expect(TokenKind::RightParen, "to close `(`")?;
        Ok(Expr::Grouped {
            chain: Box::new(chain),
            span: self.span_from(open.span.start),
        })
    }

    fn parse_index_body(&mut self) -> Result<Expr> {
        self.skip_newlines();
        let index = self.parse_element()?;
        self.skip_newlines();
        self.expect(TokenKind::RightBracket, "to close index")?;
        Ok(index)
    }

    // Variables

    /// Access chain after `$`, `$name` or `$@`.
    ///
    /// Accesses must touch the previous token. A `.name(` stops the chain so
    /// the postfix parser sees a method call; `.?field` must come last.
    fn parse_variable_ref(&mut self, kind: VariableKind, start: SourceLocation) -> Result<Expr> {
        let mut accesses = Vec::new();
        let mut existence = None;

        while self.previous().touches(self.peek()) {
            match self.peek().kind {
                TokenKind::Dot => {
                    if self.peek_at(1).kind == TokenKind::Caret {
                        let dot = self.advance();
                        self.advance();
                        let key = self.expect_name("annotation key after `.^`")?;
                        accesses.push(Access::Annotation {
                            key,
                            span: self.span_from(dot.span.start),
                        });
                        continue;
                    }
                    if name_of(&self.peek_at(1).kind).is_none() {
                        break;
                    }
                    let name_token = self.peek_at(1);
                    let after = self.peek_at(2);
                    if after.kind == TokenKind::LeftParen && name_token.touches(after) {
                        break;
                    }
                    let dot = self.advance();
                    let name = self.expect_name("field name")?;
                    accesses.push(Access::Field {
                        name,
                        span: self.span_from(dot.span.start),
                    });
                }
                TokenKind::LeftBracket => {
                    let open = self.advance();
                    let index = self.parse_index_body()?;
                    accesses.push(Access::Index {
                        index: Box::new(index),
                        span: self.span_from(open.span.start),
                    });
                }
                TokenKind::DotQuestion => {
                    existence = Some(self.parse_existence_check()?);
                    break;
                }
                _ => break,
            }
        }

        let default = self.parse_default()?;
        Ok(Expr::Variable(VariableRef {
            kind,
            accesses,
            existence,
            default,
            span: self.span_from(start),
        }))
    }

    /// `.?field` or `.?field&type`
    fn parse_existence_check(&mut self) -> Result<ExistenceCheck> {
        let open = self.advance();
        let field = self.expect_name("field name after `.?`")?;
        let type_constraint = if self.next_is_touching(&TokenKind::Ampersand) {
            self.advance();
            Some(self.parse_type_name()?)
        } else {
            None
        };
        Ok(ExistenceCheck {
            field,
            type_constraint,
            span: self.span_from(open.span.start),
        })
    }

    fn parse_default(&mut self) -> Result<Option<Box<Expr>>> {
        if !self.matches(&TokenKind::QuestionQuestion) {
            return Ok(None);
        }
        self.skip_newlines();
        Ok(Some(Box::new(self.parse_unary()?)))
    }

    // Literals

    pub(super) fn parse_string_parts(
        &self,
        parts: Vec<StringPart>,
        span: SourceSpan,
    ) -> Result<StringLiteral> {
        let mut segments = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                StringPart::Text(text) => segments.push(StringSegment::Text(text)),
                StringPart::Interpolation { source, start } => {
                    let chain = self.parse_interpolation(&source, start)?;
                    segments.push(StringSegment::Interpolation(Box::new(chain)));
                }
            }
        }
        Ok(StringLiteral { segments, span })
    }

    /// Re-lex and re-parse one `{...}` body with a private sub-parser
    fn parse_interpolation(&self, body: &str, start: SourceLocation) -> Result<PipeChain> {
        let tokens = Lexer::with_origin(body, start).tokenize()?;
        let mut sub = RillParser::new(self.source, tokens);
        sub.skip_newlines();
        if sub.is_at_end() {
            return Err(Error::parse(
                ErrorCode::InvalidInterpolation,
                "Empty interpolation `{}`",
                start,
            ));
        }
        let chain = sub.parse_pipe_chain()?;
        sub.skip_newlines();
        if !sub.is_at_end() {
            let token = sub.peek();
            return Err(Error::parse(
                ErrorCode::InvalidInterpolation,
                hints::with_help(
                    format!(
                        "Unexpected {} in interpolation",
                        token.kind.describe()
                    ),
                    Some("An interpolation holds exactly one expression or pipe chain.".to_string()),
                ),
                token.span.start,
            ));
        }
        Ok(chain)
    }

    /// `[` starts a dict when followed by `key :` or `:]`
    fn is_dict_start(&self) -> bool {
        let mut index = self.current + 1;
        while matches!(self.kind_at(index), TokenKind::Newline) {
            index += 1;
        }
        let followed_by_colon = |at: usize| matches!(self.kind_at(at), TokenKind::Colon);

        match self.kind_at(index) {
            TokenKind::Colon => matches!(self.kind_at(index + 1), TokenKind::RightBracket),
            TokenKind::Minus => {
                matches!(self.kind_at(index + 1), TokenKind::Number(_)) && followed_by_colon(index + 2)
            }
            TokenKind::LeftBracket => self
                .matching_close(index)
                .map(|close| followed_by_colon(close + 1))
                .unwrap_or(false),
            TokenKind::Str(parts) => is_plain_text(parts) && followed_by_colon(index + 1),
            TokenKind::Identifier(_) | TokenKind::Number(_) => followed_by_colon(index + 1),
            kind if kind.is_keyword() => followed_by_colon(index + 1),
            _ => false,
        }
    }

    fn parse_tuple(&mut self) -> Result<Expr> {
        let open = self.advance();
        let mut elements = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::RightBracket) {
            elements.push(self.parse_element()?);
            self.skip_newlines();
            if !self.matches(&TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.expect(TokenKind::RightBracket, "to close list")?;
        Ok(Expr::Tuple(TupleLiteral {
            elements,
            span: self.span_from(open.span.start),
        }))
    }

    fn parse_dict(&mut self) -> Result<Expr> {
        let open = self.advance();
        self.skip_newlines();
        let mut entries = Vec::new();

        if self.matches(&TokenKind::Colon) {
            self.skip_newlines();
        } else {
            while !self.check(&TokenKind::RightBracket) {
                let entry_start = self.peek().span.start;
                let key = self.parse_dict_key()?;
                self.expect(TokenKind::Colon, "after dict key")?;
                self.skip_newlines();
                let value = self.parse_element()?;
                entries.push(DictEntry {
                    key,
                    value,
                    span: self.span_from(entry_start),
                });
                self.skip_newlines();
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
                self.skip_newlines();
            }
        }

        self.expect(TokenKind::RightBracket, "to close dict")?;
        Ok(Expr::Dict(DictLiteral {
            entries,
            span: self.span_from(open.span.start),
        }))
    }

    fn parse_dict_key(&mut self) -> Result<DictKey> {
        let token = self.peek().clone();
        let key = match token.kind {
            TokenKind::Identifier(name) => DictKey::Name(name),
            TokenKind::True => DictKey::Bool(true),
            TokenKind::False => DictKey::Bool(false),
            TokenKind::Number(value) => DictKey::Number(value),
            TokenKind::Minus => {
                self.advance();
                match self.peek().kind {
                    TokenKind::Number(value) => DictKey::Number(-value),
                    _ => return Err(self.expected_error("a number after `-` in dict key", None)),
                }
            }
            TokenKind::Str(ref parts) if is_plain_text(parts) => DictKey::Str(plain_text(parts)),
            TokenKind::Str(_) => {
                return Err(self.error_at(&token, "Dict keys cannot be interpolated strings"));
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut keys = Vec::new();
                self.skip_newlines();
                while !self.check(&TokenKind::RightBracket) {
                    keys.push(self.parse_dict_key()?);
                    self.skip_newlines();
                    if !self.matches(&TokenKind::Comma) {
                        break;
                    }
                    self.skip_newlines();
                }
                self.expect(TokenKind::RightBracket, "to close tuple key")?;
                return Ok(DictKey::Tuple(keys));
            }
            ref kind => match kind.keyword_text() {
                Some(keyword) => DictKey::Name(keyword.to_string()),
                None => return Err(self.expected_error("a dict key", None)),
            },
        };
        self.advance();
        Ok(key)
    }

    // Callables

    /// `|params| body` or `|| body`
    fn parse_closure(&mut self) -> Result<Expr> {
        let open = self.advance();
        let mut params: Vec<ClosureParam> = Vec::new();

        if open.kind == TokenKind::Pipe {
            while !self.check(&TokenKind::Pipe) {
                let param = self.parse_param()?;
                if params.iter().any(|p| p.name == param.name) {
                    return Err(Error::parse(
                        ErrorCode::UnexpectedToken,
                        format!("Duplicate closure parameter `{}`", param.name),
                        param.span.start,
                    ));
                }
                params.push(param);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Pipe, "to close closure parameters")?;
        }

        let body = if self.check(&TokenKind::LeftBrace) {
            Expr::Block(Rc::new(self.parse_block()?))
        } else {
            self.parse_chain_element()?
        };

        Ok(Expr::Closure(Rc::new(ClosureDef {
            params,
            body,
            span: self.span_from(open.span.start),
        })))
    }

    /// `name[: type][= default]`
    fn parse_param(&mut self) -> Result<ClosureParam> {
        let start = self.peek().span.start;
        let name = match self.peek().kind {
            TokenKind::Identifier(ref name) | TokenKind::Variable(ref name) => name.clone(),
            _ => return Err(self.expected_error("a parameter name", None)),
        };
        self.advance();

        let type_annotation = if self.matches(&TokenKind::Colon) {
            Some(self.parse_type_name()?)
        } else {
            None
        };
        let default = if self.matches(&TokenKind::Assign) {
            Some(self.parse_unary()?)
        } else {
            None
        };

        Ok(ClosureParam {
            name,
            type_annotation,
            default,
            span: self.span_from(start),
        })
    }

    /// `{ statements }`
    pub(super) fn parse_block(&mut self) -> Result<Block> {
        let open = self.expect(TokenKind::LeftBrace, "to open block")?;
        let mut statements = Vec::new();

        loop {
            self.skip_newlines();
            if self.check(&TokenKind::RightBrace) {
                break;
            }
            if self.is_at_end() {
                return Err(self.error_at(
                    self.peek(),
                    hints::with_help(
                        format!("Unterminated block opened at {}", open.span.start),
                        Some("Missing closing `}` for an earlier `{`.".to_string()),
                    ),
                ));
            }
            statements.push(self.parse_statement()?);
            self.finish_statement()?;
        }

        let close = self.advance();
        Ok(Block {
            statements,
            span: SourceSpan::new(open.span.start, close.span.end),
        })
    }

    // Collection operators

    /// `each|map|fold|filter [(init)] body`
    fn parse_collection(&mut self, kind: CollectionKind) -> Result<Expr> {
        let keyword = self.advance();

        let accumulator = if self.check(&TokenKind::LeftParen) && self.parens_are_accumulator() {
            self.advance();
            self.skip_newlines();
            let init = self.parse_element()?;
            self.skip_newlines();
            self.expect(TokenKind::RightParen, "to close accumulator")?;
            Some(Box::new(init))
        } else {
            None
        };

        let body = match self.peek().kind {
            TokenKind::LeftBrace
            | TokenKind::Pipe
            | TokenKind::OrOr
            | TokenKind::LeftParen
            | TokenKind::Variable(_)
            | TokenKind::PipeVar
            | TokenKind::Identifier(_)
            | TokenKind::Dot => self.parse_postfix()?,
            _ => {
                return Err(self.expected_error(
                    &format!("a body after `{}`", kind.keyword()),
                    Some(format!(
                        "A collection body is a block, closure, `(expr)`, variable or function name.\n\
                         Example: $items -> {} {{ $ * 2 }}",
                        kind.keyword()
                    )),
                ))
            }
        };

        Ok(Expr::Collection(CollectionExpr {
            kind,
            accumulator,
            body: Box::new(body),
            span: self.span_from(keyword.span.start),
        }))
    }

    /// `(expr)` is an accumulator only when a body follows its closing paren
    fn parens_are_accumulator(&self) -> bool {
        match self.matching_close(self.current) {
            Some(close) => matches!(
                self.kind_at(close + 1),
                TokenKind::LeftBrace | TokenKind::Pipe | TokenKind::OrOr | TokenKind::LeftParen
            ),
            None => false,
        }
    }

    // Extraction

    /// `*<$a, _, key: $b, *<$c, $d>>`
    fn parse_destructure(&mut self) -> Result<DestructurePattern> {
        let open = self.advance();
        let mut elements = Vec::new();

        loop {
            self.skip_newlines();
            if self.check(&TokenKind::Gt) {
                break;
            }
            elements.push(self.parse_destructure_element()?);
            self.skip_newlines();
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Gt, "to close destructure pattern")?;

        Ok(DestructurePattern {
            elements,
            span: self.span_from(open.span.start),
        })
    }

    fn parse_destructure_element(&mut self) -> Result<DestructureElement> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Identifier(ref name) if name == "_" => {
                self.advance();
                Ok(DestructureElement::Skip(token.span))
            }
            TokenKind::Variable(_) => Ok(DestructureElement::Bind(self.parse_capture()?)),
            TokenKind::StarLt => Ok(DestructureElement::Nested(self.parse_destructure()?)),
            TokenKind::Str(ref parts) if is_plain_text(parts) => {
                self.advance();
                self.parse_keyed_binding(plain_text(parts))
            }
            ref kind => match name_of(kind) {
                Some(key) => {
                    self.advance();
                    self.parse_keyed_binding(key)
                }
                None => Err(self.expected_error(
                    "`$name`, `_`, `key: $name` or a nested `*<...>`",
                    None,
                )),
            },
        }
    }

    fn parse_keyed_binding(&mut self, key: String) -> Result<DestructureElement> {
        self.expect(TokenKind::Colon, "after destructure key")?;
        let capture = self.parse_capture()?;
        Ok(DestructureElement::Key { key, capture })
    }

    /// `/<start:stop:step>`; any bound may be omitted
    fn parse_slice(&mut self) -> Result<Expr> {
        let open = self.advance();
        let mut bounds: [Option<Box<Expr>>; 3] = [None, None, None];
        let mut position = 0;

        loop {
            match self.peek().kind {
                TokenKind::Gt => {
                    self.advance();
                    break;
                }
                // `:>` lexes as one token; here it is an empty bound and the close
                TokenKind::CaptureArrow if position < 2 => {
                    self.advance();
                    break;
                }
                TokenKind::Colon if position < 2 => {
                    self.advance();
                    position += 1;
                }
                _ if bounds[position].is_none() && starts_operand(&self.peek().kind) => {
                    bounds[position] = Some(Box::new(self.parse_unary()?));
                }
                _ => {
                    return Err(self.expected_error(
                        "a slice bound, `:` or `>`",
                        Some("Slices are written `/<start:stop:step>`, e.g. `/<1:3>` or `/<::-1>`.".to_string()),
                    ))
                }
            }
        }

        let [start, stop, step] = bounds;
        Ok(Expr::Slice(SliceExpr {
            start,
            stop,
            step,
            span: self.span_from(open.span.start),
        }))
    }

    // Types

    pub(super) fn parse_type_name(&mut self) -> Result<RillType> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Identifier(ref name) => match RillType::from_name(name) {
                Some(ty) => {
                    self.advance();
                    Ok(ty)
                }
                None => Err(Error::parse(
                    ErrorCode::UnknownType,
                    hints::with_help(
                        format!("Unknown type `{}`", name),
                        Some(hints::for_type_name(name)),
                    ),
                    token.span.start,
                )),
            },
            _ => Err(self.expected_error(
                "a type name",
                Some(format!("Known types: {}", RillType::known_names().join(", "))),
            )),
        }
    }
}

/// Unwrap a chain with no steps into its head expression
pub(super) fn chain_into_expr(chain: PipeChain) -> Expr {
    if chain.steps.is_empty() && chain.terminator.is_none() {
        *chain.head
    } else {
        let span = chain.span;
        Expr::Grouped {
            chain: Box::new(chain),
            span,
        }
    }
}

fn is_plain_text(parts: &[StringPart]) -> bool {
    parts.iter().all(|part| matches!(part, StringPart::Text(_)))
}

fn plain_text(parts: &[StringPart]) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            StringPart::Text(text) => Some(text.as_str()),
            StringPart::Interpolation { .. } => None,
        })
        .collect()
}
