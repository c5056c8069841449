use std::rc::Rc;

/// Source location attached to every node for error reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

// ─── Top level ───────────────────────────────────────────────────────────────

/// One compiled unit of script text. Runs as the body of an anonymous
/// vararg function.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub body: Rc<FuncBody>,
}

/// Parameters and body shared by every closure created from one function
/// expression.
#[derive(Debug, Clone)]
pub struct FuncBody {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub is_vararg: bool,
    pub body: Vec<Stmt>,
    pub span: Span,
}

// ─── Statements ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Stmt {
    /// `local a, b = 1, 2`
    Local(LocalStmt),
    /// `a, t.x, t[k] = ...`
    Assign(Assign),
    /// A call used as a statement.
    Call(Expr),
    /// `do ... end`
    Do(Vec<Stmt>, Span),
    /// `while cond do ... end`
    While(WhileStmt),
    /// `repeat ... until cond`
    Repeat(RepeatStmt),
    /// `if c then ... elseif c then ... else ... end`
    If(IfStmt),
    /// `for i = a, b, step do ... end`
    NumericFor(NumericFor),
    /// `for k, v in explist do ... end`
    GenericFor(GenericFor),
    /// `function a.b:c() end` (desugared into an assignment target)
    Function(FunctionStmt),
    /// `local function f() end`
    LocalFunction {
        name: String,
        func: Rc<FuncBody>,
        span: Span,
    },
    /// `return a, b`
    Return(Vec<Expr>, Span),
    /// `break`
    Break(Span),
}

#[derive(Debug, Clone)]
pub struct LocalStmt {
    pub names: Vec<String>,
    pub values: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Assign {
    /// Each target is an `Expr::Ident` or an `Expr::Index`.
    pub targets: Vec<Expr>,
    pub values: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct WhileStmt {
    pub condition: Expr,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct RepeatStmt {
    pub body: Vec<Stmt>,
    /// Evaluated inside the body's scope.
    pub condition: Expr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct IfStmt {
    pub branches: Vec<(Expr, Vec<Stmt>)>,
    pub else_block: Option<Vec<Stmt>>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct NumericFor {
    pub var: String,
    pub start: Expr,
    pub limit: Expr,
    pub step: Option<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct GenericFor {
    pub names: Vec<String>,
    pub exprs: Vec<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FunctionStmt {
    /// `a.b.c` → `["a", "b", "c"]`
    pub path: Vec<String>,
    /// `a.b:m` → `Some("m")`; the body then takes an implicit `self`.
    pub method: Option<String>,
    pub func: Rc<FuncBody>,
    pub span: Span,
}

// ─── Expressions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Expr {
    Nil(Span),
    Bool(bool, Span),
    Integer(i64, Span),
    Number(f64, Span),
    Str(String, Span),
    Vararg(Span),
    Ident(String, Span),

    /// `expr[key]`, and `expr.name` with a string key.
    Index {
        expr: Box<Expr>,
        key: Box<Expr>,
        span: Span,
    },

    /// `callee(args)`
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },

    /// `expr:method(args)`
    MethodCall {
        expr: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        span: Span,
    },

    /// `function(params) ... end`
    Function(Rc<FuncBody>),

    /// `a + b`, `a == b`, etc.
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
        span: Span,
    },

    /// `not x`, `-x`, `#x`
    UnOp {
        op: UnOp,
        operand: Box<Expr>,
        span: Span,
    },

    /// `{ 1, 2, x = 3, [k] = v }`
    Table(Vec<TableField>, Span),

    /// `(expr)`; truncates a multi-value expression to one value.
    Paren(Box<Expr>, Span),
}

#[derive(Debug, Clone)]
pub enum TableField {
    Positional(Expr),
    Named(String, Expr),
    Keyed(Expr, Expr),
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Nil(s)            => s,
            Expr::Bool(_, s)        => s,
            Expr::Integer(_, s)     => s,
            Expr::Number(_, s)      => s,
            Expr::Str(_, s)         => s,
            Expr::Vararg(s)         => s,
            Expr::Ident(_, s)       => s,
            Expr::Index { span, .. }      => span,
            Expr::Call { span, .. }       => span,
            Expr::MethodCall { span, .. } => span,
            Expr::Function(f)       => &f.span,
            Expr::BinOp { span, .. }      => span,
            Expr::UnOp { span, .. }       => span,
            Expr::Table(_, s)       => s,
            Expr::Paren(_, s)       => s,
        }
    }

    /// Calls and `...` can produce more than one value.
    pub fn is_multi(&self) -> bool {
        matches!(self, Expr::Call { .. } | Expr::MethodCall { .. } | Expr::Vararg(_))
    }
}

// ─── Operators ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add, Sub, Mul, Div, IDiv, Mod, Pow,
    Concat,
    Eq, NotEq,
    Lt, LtEq, Gt, GtEq,
    And, Or,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",   BinOp::Sub => "-",
            BinOp::Mul => "*",   BinOp::Div => "/",
            BinOp::IDiv => "//", BinOp::Mod => "%",
            BinOp::Pow => "^",   BinOp::Concat => "..",
            BinOp::Eq => "==",   BinOp::NotEq => "~=",
            BinOp::Lt => "<",    BinOp::LtEq => "<=",
            BinOp::Gt => ">",    BinOp::GtEq => ">=",
            BinOp::And => "and", BinOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    Len,
}
