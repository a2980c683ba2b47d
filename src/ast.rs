//! Normalized syntax tree produced by [`crate::transform::lower`] and
//! executed by [`crate::interpreter::Interpreter`].
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Top-level statement list. Runs in its own scope like a block.
    Script(Vec<Node>),
    Block(Vec<Node>),
    Var {
        name: String,
        init: Option<Box<Node>>,
    },
    FunctionDecl(Rc<FunctionDef>),
    If {
        cond: Box<Node>,
        then: Box<Node>,
        otherwise: Option<Box<Node>>,
    },
    /// `while` loops are lowered to this form too.
    For {
        init: Option<Box<Node>>,
        cond: Option<Box<Node>>,
        step: Option<Box<Node>>,
        body: Box<Node>,
    },
    Foreach {
        name: String,
        path: String,
        body: Box<Node>,
    },
    Return(Option<Box<Node>>),
    Empty,

    Assign {
        target: Box<Node>,
        value: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Field {
        object: Box<Node>,
        name: String,
    },
    Index {
        object: Box<Node>,
        index: Box<Node>,
    },
    Call {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    MethodCall {
        receiver: Box<Node>,
        method: String,
        args: Vec<Node>,
    },
    New {
        callee: Box<Node>,
        args: Vec<Node>,
    },

    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Ident(String),
    Function(Rc<FunctionDef>),
    Object(Vec<(String, Node)>),
    Array(Vec<Node>),
}

impl Node {
    /// Short name of the node kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Script(_) => "script",
            Node::Block(_) => "block",
            Node::Var { .. } => "var declaration",
            Node::FunctionDecl(_) => "function declaration",
            Node::If { .. } => "if",
            Node::For { .. } => "for",
            Node::Foreach { .. } => "foreach",
            Node::Return(_) => "return",
            Node::Empty => "empty statement",
            Node::Assign { .. } => "assignment",
            Node::Binary { .. } => "binary expression",
            Node::Unary { .. } => "unary expression",
            Node::Field { .. } => "field access",
            Node::Index { .. } => "index access",
            Node::Call { .. } => "call",
            Node::MethodCall { .. } => "method call",
            Node::New { .. } => "new expression",
            Node::Number(_) => "number literal",
            Node::Str(_) => "string literal",
            Node::Bool(_) => "boolean literal",
            Node::Null => "null",
            Node::Ident(_) => "identifier",
            Node::Function(_) => "function expression",
            Node::Object(_) => "object literal",
            Node::Array(_) => "array literal",
        }
    }
}

/// Parameters and body of a script function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinaryOp {
    pub fn from_symbol(symbol: &str) -> Result<Self> {
        Ok(match symbol {
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "<=" => BinaryOp::Le,
            ">=" => BinaryOp::Ge,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "&" => BinaryOp::BitAnd,
            "^" => BinaryOp::BitXor,
            "|" => BinaryOp::BitOr,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            other => return Err(Error::UnsupportedOperator(other.to_string())),
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 110,
            BinaryOp::Add | BinaryOp::Sub => 100,
            BinaryOp::Shl | BinaryOp::Shr => 90,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => 80,
            BinaryOp::Eq | BinaryOp::Ne => 70,
            BinaryOp::BitAnd => 60,
            BinaryOp::BitXor => 50,
            BinaryOp::BitOr => 40,
            BinaryOp::And => 30,
            BinaryOp::Or => 20,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub fn from_symbol(symbol: &str) -> Result<Self> {
        match symbol {
            "!" => Ok(UnaryOp::Not),
            "-" => Ok(UnaryOp::Neg),
            other => Err(Error::UnsupportedOperator(other.to_string())),
        }
    }
}
