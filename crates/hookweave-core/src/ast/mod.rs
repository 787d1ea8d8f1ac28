/*!
# Go syntax tree

Arena-backed syntax tree for the subset of Go that the weaving engine reads and
generates. Nodes are addressed by typed handles (`ExprId`, `StmtId`) into one
`Arena` per file, so a node shared by two parents is always an explicit copy
made with `Arena::clone_expr`.

Parsed function bodies are not lowered node by node. A woven body is a list of
synthesized statements followed by `Stmt::Original`, which stands for the
untouched source text of the function body.
*/

use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

pub mod build;
pub mod query;
pub mod source_gen;

pub use source_gen::{Printer, ToSource};

/// Handle of an expression node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

/// Handle of a statement node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(u32);

/// Channel direction of a `chan` type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

/// Expression and type nodes. Go types are expressions, as in `go/ast`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    /// Literal text, already quoted where needed
    BasicLit(String),
    /// Source text kept verbatim (struct types, non-empty interfaces, ...)
    Raw(String),
    Selector {
        x: ExprId,
        sel: String,
    },
    /// `*x`, both pointer type and dereference
    Star(ExprId),
    AddressOf(ExprId),
    Paren(ExprId),
    Binary {
        x: ExprId,
        op: String,
        y: ExprId,
    },
    Call {
        fun: ExprId,
        type_args: Vec<ExprId>,
        args: Vec<ExprId>,
        /// Last argument is spread with `...`
        spread: bool,
    },
    /// `x[i]`, also generic instantiation `G[K, V]`
    Index {
        x: ExprId,
        indices: Vec<ExprId>,
    },
    TypeAssert {
        x: ExprId,
        ty: ExprId,
    },
    CompositeLit {
        ty: ExprId,
        elts: Vec<ExprId>,
    },
    KeyValue {
        key: String,
        value: ExprId,
    },
    /// `[len]elt`, or `[]elt` when `len` is `None`
    ArrayType {
        len: Option<ExprId>,
        elt: ExprId,
    },
    MapType {
        key: ExprId,
        value: ExprId,
    },
    ChanType {
        dir: ChanDir,
        value: ExprId,
    },
    /// `...elt` in a parameter list
    Ellipsis(ExprId),
    /// `interface{}`
    EmptyInterface,
    FuncType {
        params: Vec<Field>,
        results: Vec<Field>,
    },
}

/// A (possibly multi-name) field of a parameter, result or struct field list
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub names: Vec<String>,
    pub ty: ExprId,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: ExprId) -> Self {
        Self {
            names: vec![name.into()],
            ty,
        }
    }

    pub fn unnamed(ty: ExprId) -> Self {
        Self { names: Vec::new(), ty }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignTok {
    /// `:=`
    Define,
    /// `=`
    Assign,
}

/// Transient markers printed as comments and resolved during materialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Joins the following line onto this one
    NoNewline,
    /// Turns the following line break into a statement separator
    Semicolon,
}

impl Marker {
    pub fn text(self) -> &'static str {
        match self {
            Marker::NoNewline => NO_NEWLINE_PLACEHOLDER,
            Marker::Semicolon => SEMICOLON_PLACEHOLDER,
        }
    }
}

pub const TJUMP_ANCHOR: &str = "/* TRAMPOLINE_JUMP_IF */";
pub const NO_NEWLINE_PLACEHOLDER: &str = "/* NO_NEWWLINE_PLACEHOLDER */";
pub const SEMICOLON_PLACEHOLDER: &str = "/* SEMICOLON_PLACEHOLDER */";

/// Comment decorations attached to a statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decorations {
    /// Anchor label after the `if` keyword marking a trampoline-jump
    pub anchor: bool,
    /// Markers printed after the statement
    pub end: Vec<Marker>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub stmts: Vec<StmtId>,
    /// Markers printed right after the opening brace
    pub open: Vec<Marker>,
}

impl Block {
    pub fn new(stmts: Vec<StmtId>) -> Self {
        Self {
            stmts,
            open: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseClause {
    pub list: Vec<ExprId>,
    pub body: Vec<StmtId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Empty,
    Expr(ExprId),
    Assign {
        lhs: Vec<ExprId>,
        tok: AssignTok,
        rhs: Vec<ExprId>,
    },
    Return(Vec<ExprId>),
    Defer(ExprId),
    If {
        init: Option<StmtId>,
        cond: ExprId,
        body: Block,
        else_block: Option<Block>,
    },
    Switch {
        tag: ExprId,
        cases: Vec<CaseClause>,
    },
    /// Statement text kept verbatim
    Raw(String),
    /// The untouched original body of a parsed function
    Original,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StmtNode {
    pub stmt: Stmt,
    pub decs: Decorations,
}

/// Node storage for one file
#[derive(Debug, Clone, Default)]
pub struct Arena {
    exprs: Vec<Expr>,
    stmts: Vec<StmtNode>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        self.exprs.push(expr);
        ExprId((self.exprs.len() - 1) as u32)
    }

    pub fn alloc_stmt(&mut self, stmt: Stmt) -> StmtId {
        self.stmts.push(StmtNode {
            stmt,
            decs: Decorations::default(),
        });
        StmtId((self.stmts.len() - 1) as u32)
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.0 as usize]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize].stmt
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.0 as usize].stmt
    }

    pub fn decs(&self, id: StmtId) -> &Decorations {
        &self.stmts[id.0 as usize].decs
    }

    pub fn decs_mut(&mut self, id: StmtId) -> &mut Decorations {
        &mut self.stmts[id.0 as usize].decs
    }

    /// Replace the statement kind in place, keeping its decorations
    pub fn replace_stmt(&mut self, id: StmtId, stmt: Stmt) {
        self.stmts[id.0 as usize].stmt = stmt;
    }

    pub fn len(&self) -> usize {
        self.exprs.len() + self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty() && self.stmts.is_empty()
    }

    /// Deep copy of an expression subtree
    pub fn clone_expr(&mut self, id: ExprId) -> ExprId {
        let copy = match self.expr(id).clone() {
            Expr::Selector { x, sel } => Expr::Selector {
                x: self.clone_expr(x),
                sel,
            },
            Expr::Star(x) => Expr::Star(self.clone_expr(x)),
            Expr::AddressOf(x) => Expr::AddressOf(self.clone_expr(x)),
            Expr::Paren(x) => Expr::Paren(self.clone_expr(x)),
            Expr::Binary { x, op, y } => Expr::Binary {
                x: self.clone_expr(x),
                op,
                y: self.clone_expr(y),
            },
            Expr::Ellipsis(x) => Expr::Ellipsis(self.clone_expr(x)),
            Expr::Call {
                fun,
                type_args,
                args,
                spread,
            } => Expr::Call {
                fun: self.clone_expr(fun),
                type_args: self.clone_exprs(&type_args),
                args: self.clone_exprs(&args),
                spread,
            },
            Expr::Index { x, indices } => Expr::Index {
                x: self.clone_expr(x),
                indices: self.clone_exprs(&indices),
            },
            Expr::TypeAssert { x, ty } => Expr::TypeAssert {
                x: self.clone_expr(x),
                ty: self.clone_expr(ty),
            },
            Expr::CompositeLit { ty, elts } => Expr::CompositeLit {
                ty: self.clone_expr(ty),
                elts: self.clone_exprs(&elts),
            },
            Expr::KeyValue { key, value } => Expr::KeyValue {
                key,
                value: self.clone_expr(value),
            },
            Expr::ArrayType { len, elt } => Expr::ArrayType {
                len: len.map(|len| self.clone_expr(len)),
                elt: self.clone_expr(elt),
            },
            Expr::MapType { key, value } => Expr::MapType {
                key: self.clone_expr(key),
                value: self.clone_expr(value),
            },
            Expr::ChanType { dir, value } => Expr::ChanType {
                dir,
                value: self.clone_expr(value),
            },
            Expr::FuncType { params, results } => Expr::FuncType {
                params: self.clone_fields(&params),
                results: self.clone_fields(&results),
            },
            leaf @ (Expr::Ident(_) | Expr::BasicLit(_) | Expr::Raw(_) | Expr::EmptyInterface) => {
                leaf
            }
        };
        self.alloc_expr(copy)
    }

    pub fn clone_exprs(&mut self, ids: &[ExprId]) -> Vec<ExprId> {
        ids.iter().map(|id| self.clone_expr(*id)).collect()
    }

    pub fn clone_fields(&mut self, fields: &[Field]) -> Vec<Field> {
        fields
            .iter()
            .map(|field| Field {
                names: field.names.clone(),
                ty: self.clone_expr(field.ty),
            })
            .collect()
    }

    /// Name of an identifier expression
    pub fn ident_name(&self, id: ExprId) -> Option<&str> {
        match self.expr(id) {
            Expr::Ident(name) => Some(name),
            _ => None,
        }
    }
}

/// How an identifier occurs inside a function body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentRole {
    /// `x` in `x.sel`
    SelectorOperand,
    /// `sel` in `x.sel`
    SelectorField,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentUse {
    pub name: String,
    pub role: IdentRole,
}

/// Identifier occurrences collected from a parsed body, in source order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyFacts {
    pub idents: Vec<IdentUse>,
}

/// Byte ranges of a parsed declaration inside its file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOrigin {
    /// Receiver list including parentheses
    pub recv: Option<Range<usize>>,
    /// Parameter list including parentheses
    pub params: Range<usize>,
    /// Result type or result list
    pub results: Option<Range<usize>>,
    /// Offset just past the body's opening brace
    pub body_open: Option<usize>,
}

/// Signature lists rewritten since parsing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Renamed {
    pub recv: bool,
    pub params: bool,
    pub results: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub recv: Option<Field>,
    pub type_params: Vec<Field>,
    pub params: Vec<Field>,
    pub results: Vec<Field>,
    /// `None` for body-less declarations
    pub body: Option<Block>,
    pub origin: Option<SourceOrigin>,
    pub facts: BodyFacts,
    pub renamed: Renamed,
}

impl FuncDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            recv: None,
            type_params: Vec::new(),
            params: Vec::new(),
            results: Vec::new(),
            body: None,
            origin: None,
            facts: BodyFacts::default(),
            renamed: Renamed::default(),
        }
    }

    pub fn has_receiver(&self) -> bool {
        self.recv.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Func(FuncDecl),
    Struct { name: String, fields: Vec<Field> },
    Var { name: String, ty: ExprId },
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Func(func) => &func.name,
            Decl::Struct { name, .. } | Decl::Var { name, .. } => name,
        }
    }
}

/// One parsed Go file plus the declarations generated for it
#[derive(Debug, Clone)]
pub struct GoFile {
    pub path: PathBuf,
    pub source: String,
    pub package: String,
    pub arena: Arena,
    /// Function and method declarations in source order
    pub funcs: Vec<FuncDecl>,
    /// Declarations appended by weaving
    pub appended: Vec<Decl>,
}

impl GoFile {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            package: package.into(),
            arena: Arena::new(),
            funcs: Vec::new(),
            appended: Vec::new(),
        }
    }

    /// Whether a function of this name is declared or was appended
    pub fn declares_func(&self, name: &str) -> bool {
        self.funcs.iter().any(|func| func.name == name)
            || self
                .appended
                .iter()
                .any(|decl| matches!(decl, Decl::Func(func) if func.name == name))
    }

    pub fn add_decl(&mut self, decl: Decl) {
        self.appended.push(decl);
    }

    /// Remove the first appended declaration matching `pred`
    pub fn remove_decl_when<F: Fn(&Decl) -> bool>(&mut self, pred: F) -> Option<Decl> {
        let idx = self.appended.iter().position(pred)?;
        Some(self.appended.remove(idx))
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl fmt::Display for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}
