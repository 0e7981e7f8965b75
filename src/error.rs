//! Error types for the Rill language engine
//!
//! Every error belongs to one of three families (lexer, parse, runtime) and
//! carries a stable [`ErrorCode`] such as `RILL-P001` or `RILL-R005`. Hosts
//! should branch on the code, never on the message text.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::lexer::SourceLocation;

/// Free-form diagnostic data attached to runtime errors
pub type ErrorContext = BTreeMap<String, serde_json::Value>;

/// Error family, derived from the code prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorFamily {
    /// Malformed source text
    Lexer,
    /// Malformed token sequence
    Parse,
    /// Failure during evaluation
    Runtime,
}

/// Stable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    // Lexer
    /// Character that starts no token
    UnexpectedCharacter,
    /// String literal or interpolation without its closing delimiter
    UnterminatedString,
    /// Heredoc without its closing delimiter line
    UnterminatedHeredoc,
    /// Unknown `\x` escape sequence
    InvalidEscape,

    // Parse
    /// Token that cannot start or continue the current construct
    UnexpectedToken,
    /// Input ended inside a construct
    UnexpectedEof,
    /// Interpolation body that does not parse as one expression
    InvalidInterpolation,
    /// Type name outside the known set
    UnknownType,
    /// Malformed `---` frontmatter block
    InvalidFrontmatter,

    // Runtime
    /// Value of the wrong type for an operation
    TypeMismatch,
    /// Variable not bound in any enclosing scope
    UndefinedVariable,
    /// Function not registered
    UndefinedFunction,
    /// Method not registered for the receiver
    UndefinedMethod,
    /// Division or modulo by zero
    DivisionByZero,
    /// Index outside a list or string
    IndexOutOfBounds,
    /// Dispatch table without a matching key or default
    KeyNotFound,
    /// Host call exceeded the configured timeout
    Timeout,
    /// Execution cancelled through the abort signal
    Aborted,
    /// Loop iteration limit exceeded
    RuntimeLimitExceeded,
    /// Value matched an auto-exception pattern
    AutoException,
    /// Arity, parameter type or default mismatch at a call
    InvalidArguments,
    /// Attempt to execute a parse-recovery placeholder
    RecoveryNode,
    /// Host function reported a failure
    HostError,
    /// `break` or `return` outside the construct that catches it
    InvalidControlFlow,
    /// Invalid function, method or option registration
    InvalidRegistration,
}

impl ErrorCode {
    /// Stable code string, e.g. `RILL-R005`
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnexpectedCharacter => "RILL-L001",
            ErrorCode::UnterminatedString => "RILL-L002",
            ErrorCode::UnterminatedHeredoc => "RILL-L003",
            ErrorCode::InvalidEscape => "RILL-L004",
            ErrorCode::UnexpectedToken => "RILL-P001",
            ErrorCode::UnexpectedEof => "RILL-P002",
            ErrorCode::InvalidInterpolation => "RILL-P003",
            ErrorCode::UnknownType => "RILL-P004",
            ErrorCode::InvalidFrontmatter => "RILL-P005",
            ErrorCode::TypeMismatch => "RILL-R001",
            ErrorCode::UndefinedVariable => "RILL-R002",
            ErrorCode::UndefinedFunction => "RILL-R003",
            ErrorCode::UndefinedMethod => "RILL-R004",
            ErrorCode::DivisionByZero => "RILL-R005",
            ErrorCode::IndexOutOfBounds => "RILL-R006",
            ErrorCode::KeyNotFound => "RILL-R007",
            ErrorCode::Timeout => "RILL-R008",
            ErrorCode::Aborted => "RILL-R009",
            ErrorCode::RuntimeLimitExceeded => "RILL-R010",
            ErrorCode::AutoException => "RILL-R011",
            ErrorCode::InvalidArguments => "RILL-R012",
            ErrorCode::RecoveryNode => "RILL-R013",
            ErrorCode::HostError => "RILL-R014",
            ErrorCode::InvalidControlFlow => "RILL-R015",
            ErrorCode::InvalidRegistration => "RILL-R016",
        }
    }

    /// Symbolic name, e.g. `DIVISION_BY_ZERO`
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::UnexpectedCharacter => "UNEXPECTED_CHARACTER",
            ErrorCode::UnterminatedString => "UNTERMINATED_STRING",
            ErrorCode::UnterminatedHeredoc => "UNTERMINATED_HEREDOC",
            ErrorCode::InvalidEscape => "INVALID_ESCAPE",
            ErrorCode::UnexpectedToken => "UNEXPECTED_TOKEN",
            ErrorCode::UnexpectedEof => "UNEXPECTED_EOF",
            ErrorCode::InvalidInterpolation => "INVALID_INTERPOLATION",
            ErrorCode::UnknownType => "UNKNOWN_TYPE",
            ErrorCode::InvalidFrontmatter => "INVALID_FRONTMATTER",
            ErrorCode::TypeMismatch => "TYPE_MISMATCH",
            ErrorCode::UndefinedVariable => "UNDEFINED_VARIABLE",
            ErrorCode::UndefinedFunction => "UNDEFINED_FUNCTION",
            ErrorCode::UndefinedMethod => "UNDEFINED_METHOD",
            ErrorCode::DivisionByZero => "DIVISION_BY_ZERO",
            ErrorCode::IndexOutOfBounds => "INDEX_OUT_OF_BOUNDS",
            ErrorCode::KeyNotFound => "KEY_NOT_FOUND",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Aborted => "ABORTED",
            ErrorCode::RuntimeLimitExceeded => "RUNTIME_LIMIT_EXCEEDED",
            ErrorCode::AutoException => "AUTO_EXCEPTION",
            ErrorCode::InvalidArguments => "INVALID_ARGUMENTS",
            ErrorCode::RecoveryNode => "RECOVERY_NODE",
            ErrorCode::HostError => "HOST_ERROR",
            ErrorCode::InvalidControlFlow => "INVALID_CONTROL_FLOW",
            ErrorCode::InvalidRegistration => "INVALID_REGISTRATION",
        }
    }

    /// Family this code belongs to
    pub fn family(&self) -> ErrorFamily {
        match self.as_str().as_bytes()[5] {
            b'L' => ErrorFamily::Lexer,
            b'P' => ErrorFamily::Parse,
            _ => ErrorFamily::Runtime,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rill engine errors
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Malformed source text
    ///
    /// **Triggered by:** unknown characters, unterminated strings/heredocs, bad escapes
    /// **Example:** `"abc` (missing closing quote)
    #[error("[{code}] {message} at {location}")]
    Lexer {
        /// Stable code
        code: ErrorCode,
        /// Error description
        message: String,
        /// Where scanning failed
        location: SourceLocation,
    },

    /// Malformed token sequence
    ///
    /// **Triggered by:** tokens that do not fit the grammar
    /// **Example:** `"x" = $y` (assignment instead of `->` capture)
    #[error("[{code}] {message} at {location}")]
    Parse {
        /// Stable code
        code: ErrorCode,
        /// Error description, including advisory hints
        message: String,
        /// Start of the offending token
        location: SourceLocation,
    },

    /// Failure during evaluation
    ///
    /// **Triggered by:** type mismatches, undefined names, division by zero,
    /// timeouts, aborts, dispatch misses, auto-exception matches
    #[error("[{code}] {message}{}", located(.location))]
    Runtime {
        /// Stable code
        code: ErrorCode,
        /// Error description
        message: String,
        /// Source position of the failing node, when known
        location: Option<SourceLocation>,
        /// Structured diagnostics for host-side formatting
        context: ErrorContext,
    },
}

fn located(location: &Option<SourceLocation>) -> String {
    location
        .map(|loc| format!(" at {}", loc))
        .unwrap_or_default()
}

/// Error severity classification used by diagnostic converters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Execution cannot continue
    Fatal,
    /// The host may retry (timeouts, host failures)
    Recoverable,
}

/// Serialisable error payload for hosts
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    /// Stable code string
    pub code: &'static str,
    /// Symbolic code name
    pub name: &'static str,
    /// Error family
    pub family: ErrorFamily,
    /// Severity
    pub severity: ErrorSeverity,
    /// Message text
    pub message: String,
    /// Source position
    pub location: Option<SourceLocation>,
    /// Diagnostic bag
    pub context: ErrorContext,
}

impl Error {
    /// Create a lexer error
    pub fn lexer(code: ErrorCode, message: impl Into<String>, location: SourceLocation) -> Self {
        Error::Lexer {
            code,
            message: message.into(),
            location,
        }
    }

    /// Create a parse error
    pub fn parse(code: ErrorCode, message: impl Into<String>, location: SourceLocation) -> Self {
        Error::Parse {
            code,
            message: message.into(),
            location,
        }
    }

    /// Create a runtime error without a location
    pub fn runtime(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::Runtime {
            code,
            message: message.into(),
            location: None,
            context: ErrorContext::new(),
        }
    }

    /// Type mismatch between an expected and an actual type name
    pub fn type_mismatch(expected: impl fmt::Display, got: impl fmt::Display) -> Self {
        Error::runtime(
            ErrorCode::TypeMismatch,
            format!("Type mismatch: expected {}, got {}", expected, got),
        )
        .with_context("expected", expected.to_string())
        .with_context("got", got.to_string())
    }

    /// Reference to an unbound variable
    pub fn undefined_variable(name: &str) -> Self {
        Error::runtime(
            ErrorCode::UndefinedVariable,
            format!("Undefined variable: {}", name),
        )
        .with_context("name", name)
    }

    /// Invalid host registration
    pub fn registration(message: impl Into<String>) -> Self {
        Error::runtime(ErrorCode::InvalidRegistration, message)
    }

    /// Invalid call arguments
    pub fn invalid_arguments(callee: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Error::runtime(
            ErrorCode::InvalidArguments,
            format!("Invalid arguments for {}: {}", callee, reason),
        )
        .with_context("callee", callee)
    }

    /// Failure reported by a host function
    pub fn host(message: impl Into<String>) -> Self {
        Error::runtime(ErrorCode::HostError, message)
    }

    /// Attach a location to a runtime error that has none yet.
    ///
    /// The innermost location wins: errors already located deeper in the
    /// tree keep their position while unwinding.
    pub fn at(mut self, loc: SourceLocation) -> Self {
        if let Error::Runtime { location, .. } = &mut self {
            if location.is_none() {
                *location = Some(loc);
            }
        }
        self
    }

    /// Attach one context entry (runtime errors only)
    pub fn with_context(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if let Error::Runtime { context, .. } = &mut self {
            context.insert(key.to_string(), value.into());
        }
        self
    }

    /// Stable code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Lexer { code, .. } | Error::Parse { code, .. } | Error::Runtime { code, .. } => {
                *code
            }
        }
    }

    /// Message without code or location
    pub fn message(&self) -> &str {
        match self {
            Error::Lexer { message, .. }
            | Error::Parse { message, .. }
            | Error::Runtime { message, .. } => message,
        }
    }

    /// Source location, if any
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            Error::Lexer { location, .. } | Error::Parse { location, .. } => Some(*location),
            Error::Runtime { location, .. } => *location,
        }
    }

    /// Diagnostic bag (empty for lexer and parse errors)
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Classify error severity
    pub fn severity(&self) -> ErrorSeverity {
        match self.code() {
            ErrorCode::Timeout | ErrorCode::HostError => ErrorSeverity::Recoverable,
            _ => ErrorSeverity::Fatal,
        }
    }

    /// Build the host-facing payload
    pub fn to_payload(&self) -> ErrorPayload {
        let code = self.code();
        ErrorPayload {
            code: code.as_str(),
            name: code.name(),
            family: code.family(),
            severity: self.severity(),
            message: self.message().to_string(),
            location: self.location(),
            context: self.context().cloned().unwrap_or_default(),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(other) => Error::host(format!("{:#}", other)),
        }
    }
}

/// Result type for Rill operations
pub type Result<T> = std::result::Result<T, Error>;
