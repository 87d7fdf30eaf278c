//! Syntax tree for script blocks.
//!
//! Function values keep their body as a tree, so every node here is
//! serializable and persists with the bindings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Const {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOp {
    And,
    Or,
}

/// Piece of an f-string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FPart {
    Lit(String),
    Expr { expr: Expr, spec: Option<String> },
}

/// Call argument; `name` is set for keyword arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Subscript {
    Index(Box<Expr>),
    Slice(Option<Box<Expr>>, Option<Box<Expr>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Const(Const),
    FString(Vec<FPart>),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    ListComp {
        element: Box<Expr>,
        target: Target,
        iter: Box<Expr>,
        cond: Option<Box<Expr>>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `a < b <= c` keeps the first operand and each (op, operand) pair.
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    Bool(BoolOp, Box<Expr>, Box<Expr>),
    IfElse {
        cond: Box<Expr>,
        then: Box<Expr>,
        orelse: Box<Expr>,
    },
    Call(Box<Expr>, Vec<Arg>),
    Method(Box<Expr>, String, Vec<Arg>),
    Subscript(Box<Expr>, Subscript),
}

impl Expr {
    /// Height of the tree; a leaf is 1. Walks without recursion.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 1)];
        while let Some((expr, depth)) = pending.pop() {
            deepest = deepest.max(depth);
            pending.extend(expr.children().into_iter().map(|child| (child, depth + 1)));
        }
        deepest
    }

    fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Const(_) | Expr::Name(_) => Vec::new(),
            Expr::FString(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    FPart::Expr { expr, .. } => Some(expr),
                    FPart::Lit(_) => None,
                })
                .collect(),
            Expr::List(items) => items.iter().collect(),
            Expr::Dict(entries) => entries.iter().flat_map(|(k, v)| [k, v]).collect(),
            Expr::ListComp {
                element,
                iter,
                cond,
                ..
            } => {
                let mut children = vec![&**element, &**iter];
                children.extend(cond.as_deref());
                children
            }
            Expr::Unary(_, operand) => vec![&**operand],
            Expr::Binary(_, left, right) | Expr::Bool(_, left, right) => vec![&**left, &**right],
            Expr::Compare(first, rest) => std::iter::once(&**first)
                .chain(rest.iter().map(|(_, operand)| operand))
                .collect(),
            Expr::IfElse { cond, then, orelse } => vec![&**cond, &**then, &**orelse],
            Expr::Call(callee, args) | Expr::Method(callee, _, args) => std::iter::once(&**callee)
                .chain(args.iter().map(|arg| &arg.value))
                .collect(),
            Expr::Subscript(base, Subscript::Index(index)) => vec![&**base, &**index],
            Expr::Subscript(base, Subscript::Slice(start, end)) => {
                let mut children = vec![&**base];
                children.extend(start.as_deref());
                children.extend(end.as_deref());
                children
            }
        }
    }
}

/// Assignable place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    Name(String),
    Subscript(Box<Target>, Box<Expr>),
    Tuple(Vec<Target>),
}

impl Target {
    /// Place denoted by `expr`, if it is one.
    pub fn from_expr(expr: &Expr) -> Option<Target> {
        match expr {
            Expr::Name(name) => Some(Target::Name(name.clone())),
            Expr::Subscript(base, Subscript::Index(index)) => Some(Target::Subscript(
                Box::new(Target::from_expr(base)?),
                index.clone(),
            )),
            Expr::List(items) => items
                .iter()
                .map(Target::from_expr)
                .collect::<Option<Vec<_>>>()
                .map(Target::Tuple),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    /// 1-based source line.
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Expr(Expr),
    Assign {
        targets: Vec<Target>,
        value: Expr,
    },
    AugAssign(Target, BinOp, Expr),
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
    While(Expr, Vec<Stmt>),
    For(Target, Expr, Vec<Stmt>),
    Def(FunctionDef),
    Return(Option<Expr>),
    Break,
    Continue,
    Pass,
}
