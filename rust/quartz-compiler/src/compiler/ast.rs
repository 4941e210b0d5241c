//! Abstract syntax: statements plus flat expression-unit streams.
//!
//! Expressions are not trees. The parser lowers every expression into a
//! postfix (RPN) vector of `Xunit`s that the evaluator consumes left to
//! right against a stack of references. Short-circuit forms carry their
//! sub-expressions as nested unit vectors inside branch/coalescence units.

use quartz_core::{Reference, Value};
use std::fmt;
use strum_macros::Display as StrumDisplay;

/// Where a construct came from, for backtraces and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        SourceLocation {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A flat expression: the unit stream the evaluator executes.
pub type Expr = Vec<Xunit>;

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Block { stmts }
    }
}

/// Function header: declaration site, name, and parameter names. A trailing
/// `...` parameter marks the function variadic; it binds no name itself.
#[derive(Debug, Clone)]
pub struct FnHeader {
    pub loc: SourceLocation,
    pub name: String,
    pub params: Vec<String>,
}

impl FnHeader {
    pub fn is_variadic(&self) -> bool {
        self.params.last().map(String::as_str) == Some("...")
    }

    /// Parameter names that actually bind (excludes the `...` marker).
    pub fn binding_params(&self) -> &[String] {
        if self.is_variadic() {
            &self.params[..self.params.len() - 1]
        } else {
            &self.params
        }
    }
}

impl fmt::Display for FnHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.params.join(", "))
    }
}

/// One declarator of a `var`/`const` statement.
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub init: Expr,
}

/// The construct an unlabeled or labeled `break`/`continue` targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Unspec,
    Switch,
    While,
    For,
}

/// One `switch` clause: a labeled `case` (with its control expression) or the
/// `default` clause.
#[derive(Debug, Clone)]
pub struct SwitchClause {
    pub label: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expression {
        expr: Expr,
    },
    Block(Block),
    VarDef {
        decls: Vec<VarDecl>,
        immutable: bool,
        loc: SourceLocation,
    },
    FuncDef {
        name: String,
        header: FnHeader,
        body: Block,
    },
    If {
        negate: bool,
        cond: Expr,
        branch_true: Block,
        branch_false: Block,
    },
    Switch {
        ctrl: Expr,
        clauses: Vec<SwitchClause>,
    },
    DoWhile {
        body: Block,
        negate: bool,
        cond: Expr,
    },
    While {
        negate: bool,
        cond: Expr,
        body: Block,
    },
    For {
        init: Option<Box<Stmt>>,
        /// Empty means "always true".
        cond: Expr,
        step: Expr,
        body: Block,
    },
    ForEach {
        key_name: String,
        value_name: String,
        range: Expr,
        body: Block,
    },
    Try {
        body: Block,
        except_name: String,
        handler: Block,
    },
    Defer {
        expr: Expr,
        loc: SourceLocation,
    },
    Break {
        target: Target,
    },
    Continue {
        target: Target,
    },
    Throw {
        expr: Expr,
        loc: SourceLocation,
    },
    Return {
        by_ref: bool,
        expr: Expr,
    },
    Assert {
        negate: bool,
        expr: Expr,
        message: Option<String>,
        loc: SourceLocation,
    },
}

/// Operator opcodes carried by `Xunit::OperatorRpn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay)]
pub enum Xop {
    #[strum(serialize = "postfix increment")]
    PostfixInc,
    #[strum(serialize = "postfix decrement")]
    PostfixDec,
    #[strum(serialize = "unary promotion")]
    Pos,
    #[strum(serialize = "unary negation")]
    Neg,
    #[strum(serialize = "bitwise not")]
    NotB,
    #[strum(serialize = "logical not")]
    NotL,
    #[strum(serialize = "prefix increment")]
    PrefixInc,
    #[strum(serialize = "prefix decrement")]
    PrefixDec,
    #[strum(serialize = "prefix `unset`")]
    Unset,
    #[strum(serialize = "prefix `lengthof`")]
    Lengthof,
    #[strum(serialize = "prefix `typeof`")]
    Typeof,
    #[strum(serialize = "`__abs`")]
    Abs,
    #[strum(serialize = "`__sqrt`")]
    Sqrt,
    #[strum(serialize = "`__signb`")]
    Signb,
    #[strum(serialize = "`__isnan`")]
    Isnan,
    #[strum(serialize = "`__isinf`")]
    Isinf,
    #[strum(serialize = "`__round`")]
    Round,
    #[strum(serialize = "`__floor`")]
    Floor,
    #[strum(serialize = "`__ceil`")]
    Ceil,
    #[strum(serialize = "`__trunc`")]
    Trunc,
    #[strum(serialize = "`__iround`")]
    Iround,
    #[strum(serialize = "`__ifloor`")]
    Ifloor,
    #[strum(serialize = "`__iceil`")]
    Iceil,
    #[strum(serialize = "`__itrunc`")]
    Itrunc,
    #[strum(serialize = "`__fma`")]
    Fma,
    #[strum(serialize = "equality comparison")]
    CmpEq,
    #[strum(serialize = "inequality comparison")]
    CmpNe,
    #[strum(serialize = "less-than comparison")]
    CmpLt,
    #[strum(serialize = "greater-than comparison")]
    CmpGt,
    #[strum(serialize = "less-than-or-equal comparison")]
    CmpLte,
    #[strum(serialize = "greater-than-or-equal comparison")]
    CmpGte,
    #[strum(serialize = "three-way comparison")]
    Cmp3Way,
    #[strum(serialize = "addition")]
    Add,
    #[strum(serialize = "subtraction")]
    Sub,
    #[strum(serialize = "multiplication")]
    Mul,
    #[strum(serialize = "division")]
    Div,
    #[strum(serialize = "modulo")]
    Mod,
    #[strum(serialize = "logical left shift")]
    Sll,
    #[strum(serialize = "logical right shift")]
    Srl,
    #[strum(serialize = "arithmetic left shift")]
    Sla,
    #[strum(serialize = "arithmetic right shift")]
    Sra,
    #[strum(serialize = "bitwise and")]
    AndB,
    #[strum(serialize = "bitwise or")]
    OrB,
    #[strum(serialize = "bitwise xor")]
    XorB,
    #[strum(serialize = "assignment")]
    Assign,
    #[strum(serialize = "subscript")]
    Subscr,
}

/// One expression unit.
#[derive(Debug, Clone)]
pub enum Xunit {
    /// Push a constant-rooted reference.
    Literal { value: Value },
    /// Look the name up through the context chain and push what is found.
    NamedRef { name: String },
    /// Push a reference captured by the analytic binder.
    BoundRef { reference: Reference },
    /// Instantiate a closure against the current context and push it.
    ClosureFunc { header: FnHeader, body: Block },
    /// Pop `arg_cnt` arguments and the callee, invoke, push the result.
    FuncCall {
        loc: SourceLocation,
        arg_cnt: usize,
    },
    /// Zoom the top of the stack into a named member.
    MemberAccess { key: String },
    /// Pop `elem_cnt` values, assemble an array, push it as a temporary.
    UnnamedArray { elem_cnt: usize },
    /// Pop one value per key, assemble an object, push it as a temporary.
    UnnamedObject { keys: Vec<String> },
    /// Apply an operator to the stack top(s).
    OperatorRpn { op: Xop, assign: bool },
    /// Ternary / short-circuit logical form: consume the condition, then
    /// evaluate exactly one branch. An empty branch keeps the condition.
    Branch {
        assign: bool,
        branch_true: Expr,
        branch_false: Expr,
    },
    /// Null-coalescence: evaluate the alternative iff the operand is null.
    Coalescence { assign: bool, branch_null: Expr },
}
