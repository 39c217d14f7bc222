//! The abstract syntax tree consumed by the emitter.
//!
//! This is a collaborator contract, not something this crate parses from
//! text on its own behalf (the `frontend` crate builds these nodes from
//! source text). The shape mirrors the source's `ast` package: a generic
//! `Node` wrapping a small closed set of leaf and operator variants, plus
//! optional debug metadata.

use num::BigRational;

/// Per-node source location, carried through for diagnostics only; it
/// never affects lowering semantics.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Debug {
    pub line_no: usize,
    pub col_start: usize,
    pub col_end: usize,
    pub line: String,
}

/// A binary or unary operator, and the statement/control constructs that
/// are lowered like one (§3.1).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Op {
    UMinus,
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    Assign,
    /// Statement sequence; children are lowered in order.
    Eos,
    While,
    If,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Identifier(String, Debug),
    Integer(i64, Debug),
    Number(BigRational, Debug),
    /// `Op(kind, children)`. `If` carries 2 children (cond, then) or 3
    /// (cond, then, else); `Assign`'s first child is always an
    /// `Identifier` (§3.1 invariant); everything else carries exactly
    /// the arity its kind implies.
    Op(Op, Vec<Node>, Debug),
}

impl Node {
    pub fn debug(&self) -> &Debug {
        match self {
            Node::Identifier(_, d) => d,
            Node::Integer(_, d) => d,
            Node::Number(_, d) => d,
            Node::Op(_, _, d) => d,
        }
    }

    pub fn identifier(name: impl Into<String>, debug: Debug) -> Node {
        Node::Identifier(name.into(), debug)
    }

    pub fn integer(value: i64, debug: Debug) -> Node {
        Node::Integer(value, debug)
    }

    pub fn number(value: BigRational, debug: Debug) -> Node {
        Node::Number(value, debug)
    }

    pub fn op(kind: Op, children: Vec<Node>, debug: Debug) -> Node {
        Node::Op(kind, children, debug)
    }

    pub fn eos(stmts: Vec<Node>) -> Node {
        Node::Op(Op::Eos, stmts, Debug::default())
    }
}
