use serde::{Deserialize, Serialize};
use std::rc::Rc;

use crate::lexer::SourceSpan;
use crate::types::RillType;

/// Complete Rill script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Optional `---` metadata block
    pub frontmatter: Option<Frontmatter>,
    /// Top-level statements in source order
    pub statements: Vec<Statement>,
    /// Whole-script span
    pub span: SourceSpan,
}

/// Frontmatter block (`---` … `---`) preceding the statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frontmatter {
    /// Text between the delimiters, verbatim
    pub raw: String,
    /// `key: value` lines in order
    pub entries: Vec<(String, String)>,
    /// Span including both delimiters
    pub span: SourceSpan,
}

impl Frontmatter {
    /// Look up an entry by key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// A pipe chain evaluated for its value
    Expression {
        /// The chain
        chain: PipeChain,
        /// Statement span
        span: SourceSpan,
    },

    /// `^(key: value, ...)` followed by a statement
    Annotated {
        /// Annotation arguments, evaluated eagerly before the statement
        annotations: Vec<AnnotationArg>,
        /// The annotated statement
        statement: Box<Statement>,
        /// Span from `^` to the end of the statement
        span: SourceSpan,
    },

    /// Placeholder inserted by recovery parsing; never executable
    Error(ErrorNode),
}

impl Statement {
    /// Source span of the statement
    pub fn span(&self) -> SourceSpan {
        match self {
            Statement::Expression { span, .. } | Statement::Annotated { span, .. } => *span,
            Statement::Error(node) => node.span,
        }
    }
}

/// One `key: value` pair inside `^(...)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationArg {
    /// Annotation key
    pub key: String,
    /// Value expression
    pub value: Expr,
    /// Span of the pair
    pub span: SourceSpan,
}

/// Skipped source recorded by recovery parsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorNode {
    /// Source text that was skipped
    pub text: String,
    /// Message of the error that caused the skip
    pub message: String,
    /// Span of the skipped text
    pub span: SourceSpan,
}

/// `head (-> target | :> $capture)* (-> terminator)?`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeChain {
    /// First expression of the chain
    pub head: Box<Expr>,
    /// Targets and intermediate captures, in order
    pub steps: Vec<PipeStep>,
    /// Final capture, `break` or `return`
    pub terminator: Option<Terminator>,
    /// Chain span
    pub span: SourceSpan,
}

/// One step after the head of a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipeStep {
    /// `-> target`: evaluate the target with `$` bound to the flowing value
    Target(Expr),
    /// `:> $name`: bind the flowing value and keep going
    Capture(Capture),
}

/// Final element of a pipe chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Terminator {
    /// `-> $name`
    Capture(Capture),
    /// `-> break`
    Break(SourceSpan),
    /// `-> return`
    Return(SourceSpan),
}

/// Variable capture (`$name` with an optional type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    /// Variable name without `$`
    pub name: String,
    /// Optional `:type` assertion on the captured value
    pub type_annotation: Option<RillType>,
    /// Capture span
    pub span: SourceSpan,
}

/// Expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    // Literals
    /// Numeric literal
    Number {
        /// Value
        value: f64,
        /// Literal span
        span: SourceSpan,
    },
    /// `true` / `false`
    Bool {
        /// Value
        value: bool,
        /// Literal span
        span: SourceSpan,
    },
    /// String or heredoc literal, possibly interpolated
    Str(StringLiteral),
    /// `[a, b, c]`; evaluates to a list
    Tuple(TupleLiteral),
    /// `[key: value, ...]` or `[:]`
    Dict(DictLiteral),

    // Variables
    /// `$`, `$name` or `$@` with field/index accesses
    Variable(VariableRef),

    // Operators
    /// Binary operation
    Binary(BinaryExpr),
    /// Unary operation (`-`, `!`)
    Unary(UnaryExpr),
    /// Method calls and indexing applied to a base expression
    Postfix(PostfixExpr),
    /// `( pipe_chain )`
    Grouped {
        /// Inner chain
        chain: Box<PipeChain>,
        /// Span including the parentheses
        span: SourceSpan,
    },

    // Callables
    /// `|params| body` or `|| body`
    Closure(Rc<ClosureDef>),
    /// `{ statements }`: executed as a body, or a block-closure in value position
    Block(Rc<Block>),

    // Calls
    /// `name` or `name(args)`; the bare form receives `$`
    HostCall(HostCall),
    /// `$name(args)`
    ClosureCall(ClosureCall),
    /// `.name` / `.name(args)` on the implicit `$` receiver
    MethodCall(MethodCall),
    /// `$(args)`: invoke the current pipe value
    PipeInvoke {
        /// Call arguments
        args: Vec<Expr>,
        /// Call span
        span: SourceSpan,
    },

    // Control flow
    /// `condition ? then ! else`
    Conditional(Conditional),
    /// `[input] @ body [? condition]`
    Loop(LoopExpr),

    // Collection operators
    /// `each`, `map`, `fold`, `filter`
    Collection(CollectionExpr),

    // Extraction
    /// `*<...>`
    Destructure(DestructurePattern),
    /// `/<start:stop:step>`
    Slice(SliceExpr),
    /// `*expr`, or bare `*` on `$`
    Spread {
        /// Spread operand; `None` spreads `$`
        operand: Option<Box<Expr>>,
        /// Span
        span: SourceSpan,
    },
    /// `@[$f, $g]`: thread the value through each callable in turn
    SequentialSpread {
        /// Expression producing the callables
        callables: Box<Expr>,
        /// Span
        span: SourceSpan,
    },

    // Types
    /// `:type`, raises on mismatch
    TypeAssertion(TypeOp),
    /// `:?type`, yields a bool
    TypeCheck(TypeOp),
}

impl Expr {
    /// Source span of the expression
    pub fn span(&self) -> SourceSpan {
        match self {
            Expr::Number { span, .. }
            | Expr::Bool { span, .. }
            | Expr::Grouped { span, .. }
            | Expr::PipeInvoke { span, .. }
            | Expr::Spread { span, .. }
            | Expr::SequentialSpread { span, .. } => *span,
            Expr::Str(lit) => lit.span,
            Expr::Tuple(lit) => lit.span,
            Expr::Dict(lit) => lit.span,
            Expr::Variable(var) => var.span,
            Expr::Binary(bin) => bin.span,
            Expr::Unary(un) => un.span,
            Expr::Postfix(post) => post.span,
            Expr::Closure(def) => def.span,
            Expr::Block(block) => block.span,
            Expr::HostCall(call) => call.span,
            Expr::ClosureCall(call) => call.span,
            Expr::MethodCall(call) => call.span,
            Expr::Conditional(cond) => cond.span,
            Expr::Loop(lp) => lp.span,
            Expr::Collection(op) => op.span,
            Expr::Destructure(pattern) => pattern.span,
            Expr::Slice(slice) => slice.span,
            Expr::TypeAssertion(op) | Expr::TypeCheck(op) => op.span,
        }
    }

    /// True for literals a dispatch table may be built from
    pub fn is_dispatch_literal(&self) -> bool {
        matches!(self, Expr::Dict(_) | Expr::Tuple(_))
    }
}

/// String literal split into text and interpolations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringLiteral {
    /// Segments in order
    pub segments: Vec<StringSegment>,
    /// Literal span
    pub span: SourceSpan,
}

/// Piece of a string literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StringSegment {
    /// Literal text
    Text(String),
    /// `{pipe_chain}`, formatted into the string
    Interpolation(Box<PipeChain>),
}

/// `[a, b, c]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleLiteral {
    /// Element expressions
    pub elements: Vec<Expr>,
    /// Span including brackets
    pub span: SourceSpan,
}

/// `[key: value, ...]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictLiteral {
    /// Entries in source order
    pub entries: Vec<DictEntry>,
    /// Span including brackets
    pub span: SourceSpan,
}

/// One dict entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictEntry {
    /// Key as written
    pub key: DictKey,
    /// Value expression
    pub value: Expr,
    /// Entry span
    pub span: SourceSpan,
}

/// Dict keys keep their literal type so dispatch can compare them type-aware
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DictKey {
    /// Bare identifier, compared as a string
    Name(String),
    /// String literal
    Str(String),
    /// Number literal
    Number(f64),
    /// Boolean literal
    Bool(bool),
    /// `[k1, k2]`: matches any of its members during dispatch
    Tuple(Vec<DictKey>),
}

impl DictKey {
    /// String form used when the literal is evaluated as a plain dict
    pub fn to_key_string(&self) -> String {
        match self {
            DictKey::Name(s) | DictKey::Str(s) => s.clone(),
            DictKey::Number(n) => crate::runtime::format_number(*n),
            DictKey::Bool(b) => b.to_string(),
            DictKey::Tuple(keys) => keys
                .iter()
                .map(DictKey::to_key_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// True for the fallback entry of a dispatch table
    pub fn is_default(&self) -> bool {
        matches!(self, DictKey::Name(name) if name == "default")
    }
}

/// Which variable a reference starts from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VariableKind {
    /// `$`
    Pipe,
    /// `$name`
    Named(String),
    /// `$@`
    Accumulator,
}

/// `$name.field[index].?other&type ?? default`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRef {
    /// Root variable
    pub kind: VariableKind,
    /// Accesses in strict left-to-right order
    pub accesses: Vec<Access>,
    /// Trailing existence check; always the last element
    pub existence: Option<ExistenceCheck>,
    /// `?? expr` used when the access chain fails
    pub default: Option<Box<Expr>>,
    /// Reference span
    pub span: SourceSpan,
}

impl VariableRef {
    /// Plain `$` reference
    pub fn pipe(span: SourceSpan) -> Self {
        VariableRef {
            kind: VariableKind::Pipe,
            accesses: Vec::new(),
            existence: None,
            default: None,
            span,
        }
    }

    /// True when this is `$name` with nothing attached
    pub fn is_plain(&self) -> bool {
        self.accesses.is_empty() && self.existence.is_none() && self.default.is_none()
    }
}

/// A single step of a variable access chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Access {
    /// `.field`
    Field {
        /// Field name
        name: String,
        /// Span of `.field`
        span: SourceSpan,
    },
    /// `[expr]`
    Index {
        /// Index or key expression
        index: Box<Expr>,
        /// Span including brackets
        span: SourceSpan,
    },
    /// `.^key`: annotation metadata of a closure
    Annotation {
        /// Annotation key
        key: String,
        /// Span
        span: SourceSpan,
    },
}

/// `.?field` or `.?field&type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistenceCheck {
    /// Field whose presence is tested
    pub field: String,
    /// Optional required type of the field
    pub type_constraint: Option<RillType>,
    /// Span
    pub span: SourceSpan,
}

/// Binary operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpr {
    /// Operator
    pub op: BinaryOp,
    /// Left operand
    pub left: Box<Expr>,
    /// Right operand
    pub right: Box<Expr>,
    /// Span of the operator token, used for error locations
    pub op_span: SourceSpan,
    /// Whole expression span
    pub span: SourceSpan,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    /// Addition operator (+)
    Add,
    /// Subtraction operator (-)
    Sub,
    /// Multiplication operator (*)
    Mul,
    /// Division operator (/)
    Div,
    /// Modulo operator (%)
    Mod,

    // Comparison
    /// Equality operator (==)
    Eq,
    /// Inequality operator (!=)
    NotEq,
    /// Less than operator (<)
    Lt,
    /// Greater than operator (>)
    Gt,
    /// Less than or equal operator (<=)
    LtEq,
    /// Greater than or equal operator (>=)
    GtEq,

    // Logical
    /// Logical AND operator (&&), short-circuiting
    And,
    /// Logical OR operator (||), short-circuiting
    Or,
}

impl BinaryOp {
    /// Operator symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Unary operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpr {
    /// Operator
    pub op: UnaryOp,
    /// Operand
    pub operand: Box<Expr>,
    /// Span
    pub span: SourceSpan,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Numeric negation (-)
    Neg,
    /// Logical NOT (!)
    Not,
}

/// Base expression followed by method calls or indexing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostfixExpr {
    /// Receiver of the first operation
    pub base: Box<Expr>,
    /// Operations applied left to right
    pub ops: Vec<PostfixOp>,
    /// Whole span
    pub span: SourceSpan,
}

/// Postfix operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PostfixOp {
    /// `.name` or `.name(args)`
    Method {
        /// Method name
        name: String,
        /// Arguments (empty for the paren-less form)
        args: Vec<Expr>,
        /// Span of `.name(...)`
        span: SourceSpan,
    },
    /// `[expr]`
    Index {
        /// Index expression
        index: Box<Expr>,
        /// Span
        span: SourceSpan,
    },
}

/// Closure literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosureDef {
    /// Declared parameters
    pub params: Vec<ClosureParam>,
    /// Body expression (usually a block or grouped chain)
    pub body: Expr,
    /// Literal span
    pub span: SourceSpan,
}

/// One closure parameter: `name[: type][= default]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosureParam {
    /// Name, referenced as `$name` in the body
    pub name: String,
    /// Declared type
    pub type_annotation: Option<RillType>,
    /// Default used when the argument is missing
    pub default: Option<Expr>,
    /// Span
    pub span: SourceSpan,
}

/// `{ statements }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Statements in order
    pub statements: Vec<Statement>,
    /// Span including braces
    pub span: SourceSpan,
}

/// Host function call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostCall {
    /// Function name, possibly `namespace::name`
    pub name: String,
    /// `None` for the bare form, which passes `$`
    pub args: Option<Vec<Expr>>,
    /// Call span
    pub span: SourceSpan,
}

/// `$name(args)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosureCall {
    /// Variable holding the callable
    pub name: String,
    /// Arguments
    pub args: Vec<Expr>,
    /// Call span
    pub span: SourceSpan,
}

/// `.name(args)` on `$`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    /// Method name
    pub name: String,
    /// Arguments
    pub args: Vec<Expr>,
    /// Call span
    pub span: SourceSpan,
}

/// `condition ? then ! else`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditional {
    /// Condition; `None` tests `$` itself
    pub condition: Option<Box<Expr>>,
    /// Branch taken on `true`
    pub then_branch: Box<Expr>,
    /// Branch taken on `false`; may itself be a conditional (else-if)
    pub else_branch: Option<Box<Expr>>,
    /// Span
    pub span: SourceSpan,
}

/// `[input] @ body [? condition]`; behaviour is chosen by the runtime type of `input`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopExpr {
    /// Loop input; `None` loops over `$`
    pub input: Option<Box<Expr>>,
    /// Loop body
    pub body: Box<Expr>,
    /// Trailing `? condition` turning the loop into a do-while
    pub condition: Option<Box<Expr>>,
    /// Span
    pub span: SourceSpan,
}

/// Kind of collection operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionKind {
    /// Sequential iteration; optional accumulator
    Each,
    /// Element-wise transform
    Map,
    /// Reduction; accumulator required
    Fold,
    /// Keep elements whose body result is truthy
    Filter,
}

impl CollectionKind {
    /// Keyword spelling
    pub fn keyword(&self) -> &'static str {
        match self {
            CollectionKind::Each => "each",
            CollectionKind::Map => "map",
            CollectionKind::Fold => "fold",
            CollectionKind::Filter => "filter",
        }
    }
}

/// `each(init) body`, `map body`, `fold(init) body`, `filter body`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionExpr {
    /// Operator
    pub kind: CollectionKind,
    /// `(init)` prefix, exposed in the body as `$@`
    pub accumulator: Option<Box<Expr>>,
    /// Body: block, closure, grouped expression, variable or function name
    pub body: Box<Expr>,
    /// Span
    pub span: SourceSpan,
}

/// `*<...>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestructurePattern {
    /// Pattern elements
    pub elements: Vec<DestructureElement>,
    /// Span
    pub span: SourceSpan,
}

/// One element of a destructure pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DestructureElement {
    /// `_`: skip a position
    Skip(SourceSpan),
    /// `$name[:type]`: bind by position
    Bind(Capture),
    /// `key: $name[:type]`: bind a dict field
    Key {
        /// Dict key
        key: String,
        /// Target variable
        capture: Capture,
    },
    /// `*<...>`: destructure a nested list
    Nested(DestructurePattern),
}

/// `/<start:stop:step>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceExpr {
    /// Inclusive start
    pub start: Option<Box<Expr>>,
    /// Exclusive stop
    pub stop: Option<Box<Expr>>,
    /// Step (non-zero)
    pub step: Option<Box<Expr>>,
    /// Span
    pub span: SourceSpan,
}

/// `:type` / `:?type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeOp {
    /// Operand; `None` uses `$`
    pub operand: Option<Box<Expr>>,
    /// Type tested
    pub ty: RillType,
    /// Span
    pub span: SourceSpan,
}
