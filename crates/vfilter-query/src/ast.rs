//! The VQL abstract syntax tree and its canonical rendering
//!
//! Rendering normalizes: keywords are uppercased, operators get single
//! spaces, and parentheses appear only where precedence demands them. The
//! round-trip law `parse(node.to_string()) == node` holds for every parseable
//! node and is enforced by the golden corpus in the test suite.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Match,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Or => "OR",
            BinOp::And => "AND",
            BinOp::Eq => "=",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::In => "IN",
            BinOp::Match => "=~",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }

    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq
            | BinOp::Ne
            | BinOp::Lt
            | BinOp::Le
            | BinOp::Gt
            | BinOp::Ge
            | BinOp::In
            | BinOp::Match => 4,
            BinOp::Add | BinOp::Sub => 5,
            BinOp::Mul | BinOp::Div => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Arg {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FnCall {
    pub name: String,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Literal(Literal),
    Ident(String),
    Array(Vec<Expr>),
    Subquery(Box<Select>),
    Call(FnCall),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Member {
        base: Box<Expr>,
        field: String,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
}

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Not(_) => 3,
            Expr::Neg(_) => 7,
            Expr::Member { .. } | Expr::Index { .. } => 8,
            _ => 9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub expr: Expr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Columns {
    Star,
    List(Vec<Column>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBy {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Select {
    pub columns: Columns,
    pub from: FnCall,
    pub where_clause: Option<Expr>,
    pub group_by: Option<Expr>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LetBody {
    Query(Box<Select>),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Let {
    pub name: String,
    pub parameters: Vec<String>,
    pub materialized: bool,
    pub body: LetBody,
}

/// One VQL statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum VQL {
    Select(Select),
    Let(Let),
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

fn fmt_float(v: f64) -> String {
    let s = format!("{v:?}");
    if s.contains('.') || s.contains('e') || s.contains('E') {
        s
    } else {
        format!("{s}.0")
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Bool(true) => write!(f, "TRUE"),
            Literal::Bool(false) => write!(f, "FALSE"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(v) => write!(f, "{}", fmt_float(*v)),
            Literal::String(s) => write!(f, "{}", quote_string(s)),
        }
    }
}

impl Expr {
    // Parenthesize a child when its precedence requires it; `strict` is used
    // on the right side of left-associative operators.
    fn fmt_child(&self, f: &mut fmt::Formatter<'_>, parent: u8, strict: bool) -> fmt::Result {
        let needs_parens = if strict {
            self.precedence() <= parent
        } else {
            self.precedence() < parent
        };
        if needs_parens {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(l) => write!(f, "{l}"),
            Expr::Ident(name) => write!(f, "{name}"),
            Expr::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Expr::Subquery(q) => write!(f, "{{ {q} }}"),
            Expr::Call(c) => write!(f, "{c}"),
            Expr::Not(e) => {
                write!(f, "NOT ")?;
                e.fmt_child(f, 3, false)
            }
            Expr::Neg(e) => {
                write!(f, "-")?;
                e.fmt_child(f, 7, false)
            }
            Expr::Binary { op, left, right } => {
                left.fmt_child(f, op.precedence(), false)?;
                write!(f, " {} ", op.symbol())?;
                right.fmt_child(f, op.precedence(), true)
            }
            Expr::Member { base, field } => {
                base.fmt_child(f, 8, false)?;
                write!(f, ".{field}")
            }
            Expr::Index { base, index } => {
                base.fmt_child(f, 8, false)?;
                write!(f, "[{index}]")
            }
        }
    }
}

impl fmt::Display for FnCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", arg.name, arg.value)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Columns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Columns::Star => write!(f, "*"),
            Columns::List(cols) => {
                for (i, col) in cols.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", col.expr)?;
                    if let Some(alias) = &col.alias {
                        write!(f, " AS {alias}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT {} FROM {}", self.columns, self.from)?;
        if let Some(w) = &self.where_clause {
            write!(f, " WHERE {w}")?;
        }
        if let Some(g) = &self.group_by {
            write!(f, " GROUP BY {g}")?;
        }
        if let Some(o) = &self.order_by {
            write!(f, " ORDER BY {}", o.expr)?;
            if o.descending {
                write!(f, " DESC")?;
            }
        }
        if let Some(n) = self.limit {
            write!(f, " LIMIT {n}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Let {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LET {}", self.name)?;
        if !self.parameters.is_empty() {
            write!(f, "({})", self.parameters.join(", "))?;
        }
        write!(f, " {} ", if self.materialized { "<=" } else { "=" })?;
        match &self.body {
            LetBody::Query(q) => write!(f, "{q}"),
            LetBody::Expr(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for VQL {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VQL::Select(s) => write!(f, "{s}"),
            VQL::Let(l) => write!(f, "{l}"),
        }
    }
}
