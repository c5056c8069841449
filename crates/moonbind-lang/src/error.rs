use thiserror::Error as ThisError;

/// Error codes prefixed by phase: L = lexer, P = parser, S = validator, R = runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Lexer
    L001, // unexpected character
    L002, // unterminated string literal
    L003, // invalid escape sequence
    L004, // malformed number

    // Parser
    P001, // unexpected token
    P002, // missing expected token
    P003, // statement is neither an assignment nor a call

    // Validator
    S001, // `break` outside a loop
    S002, // `...` outside a vararg function

    // Runtime
    R001, // generic runtime fault (bad operand, bad call, ...)
    R002, // missing member on a native type
    R003, // field type mismatch
    R004, // assignment to a method
    R005, // bad argument or bad object handle
    R006, // raised from script via `error()`
    R007, // call depth exceeded
    R008, // native object unavailable (finalized or already borrowed)
    R009, // value stack underflow
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L001 => "L001",
            Self::L002 => "L002",
            Self::L003 => "L003",
            Self::L004 => "L004",
            Self::P001 => "P001",
            Self::P002 => "P002",
            Self::P003 => "P003",
            Self::S001 => "S001",
            Self::S002 => "S002",
            Self::R001 => "R001",
            Self::R002 => "R002",
            Self::R003 => "R003",
            Self::R004 => "R004",
            Self::R005 => "R005",
            Self::R006 => "R006",
            Self::R007 => "R007",
            Self::R008 => "R008",
            Self::R009 => "R009",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Compile-time errors ─────────────────────────────────────────────────────

#[derive(Debug, Clone, ThisError)]
#[error("[{code}] {line}:{column}: {message}")]
pub struct Error {
    pub code: ErrorCode,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Error {
    pub fn new(code: ErrorCode, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self { code, line, column, message: message.into() }
    }
}

// ─── Runtime errors ──────────────────────────────────────────────────────────

/// A fault raised while a script runs. Native callbacks raise these too;
/// `line` is 0 until the interpreter attaches the line of the calling site.
#[derive(Debug, Clone, PartialEq, ThisError)]
#[error("[{code}] line {line}: {message}")]
pub struct RuntimeError {
    pub code: ErrorCode,
    pub line: usize,
    pub message: String,
}

impl RuntimeError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self { code: ErrorCode::R001, line, message: message.into() }
    }

    pub fn with_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, line: 0, message: message.into() }
    }

    /// Attach a source line unless one is already recorded.
    pub fn at_line(mut self, line: usize) -> Self {
        if self.line == 0 {
            self.line = line;
        }
        self
    }
}

// ─── Script execution ────────────────────────────────────────────────────────

/// Failure of `Context::execute`: either the text did not compile or it
/// faulted while running.
#[derive(Debug, Clone, ThisError)]
pub enum ScriptError {
    #[error("compile failed: {}", join_errors(.0))]
    Compile(Vec<Error>),
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
}

impl ScriptError {
    /// The runtime's diagnostic text, without the error-code prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Compile(errs) => errs.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; "),
            Self::Runtime(e) => e.message.clone(),
        }
    }

    pub fn runtime_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Runtime(e) => Some(e.code),
            Self::Compile(_) => None,
        }
    }
}

impl From<Vec<Error>> for ScriptError {
    fn from(errs: Vec<Error>) -> Self {
        Self::Compile(errs)
    }
}

fn join_errors(errs: &[Error]) -> String {
    errs.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

// ─── Binding errors ──────────────────────────────────────────────────────────

/// Native-side failures of the type registry. Raised synchronously at
/// registration or installation time.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum BindingError {
    #[error("type `{type_name}` already has a member named `{member}`")]
    DuplicateMember { type_name: String, member: String },

    #[error("a type named `{0}` is already installed in this context")]
    DescriptorCollision(String),

    #[error("global `{0}` is already defined and would be shadowed by the type's namespace")]
    GlobalCollision(String),

    #[error("type `{0}` is installed and its member table can no longer change")]
    Sealed(String),

    #[error("type `{0}` has not been installed in this context")]
    NotInstalled(String),
}
