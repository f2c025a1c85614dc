//! Syntax tree produced by the parser

use serde_json::Value;

/// A parsed policy module, in source order
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `package <name>`
    Package { name: String, line: usize },

    /// `default <name> = <expr>`
    Default { name: String, value: Expr, line: usize },

    /// `<name> = <expr> [if <cond>]`
    Rule {
        name: String,
        value: Expr,
        condition: Option<Expr>,
        line: usize,
    },

    /// `deny "<reason>" if <cond>`
    Deny {
        reason: String,
        condition: Expr,
        line: usize,
    },
}

impl Statement {
    pub fn line(&self) -> usize {
        match self {
            Statement::Package { line, .. }
            | Statement::Default { line, .. }
            | Statement::Rule { line, .. }
            | Statement::Deny { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Or => "or",
            BinOp::And => "and",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    /// `input.<id>`
    Input(String),
    /// Reference to another rule in the same package
    Ref(String),
    /// Reasons of every `deny` rule whose condition holds
    DenyReasons,
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Visit this expression and every sub-expression
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Array(items) => {
                for item in items {
                    item.walk(visit);
                }
            }
            Expr::Object(fields) => {
                for (_, value) in fields {
                    value.walk(visit);
                }
            }
            Expr::Not(inner) | Expr::Neg(inner) => inner.walk(visit),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Expr::Literal(_) | Expr::Input(_) | Expr::Ref(_) | Expr::DenyReasons => {}
        }
    }
}
