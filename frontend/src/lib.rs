//! Minimal "simple math" frontend: a `pest` grammar plus an AST-builder
//! pass that produces the `tvm::ast::Node` trees the emitter consumes.
//!
//! This is a collaborator, not a general-purpose language front end
//! (§3.1.1): statements, precedence-climbed expressions, and nothing
//! beyond what the emitter's lowering rules need.

use pest::Parser;
use pest_derive::Parser;
use std::error::Error;
use std::fmt;
use tvm::ast::{Debug as NodeDebug, Node, Op};

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct SimpleMathParser;

#[derive(Debug)]
pub enum FrontendError {
    Parse(pest::error::Error<Rule>),
    MalformedRational(String),
    InvalidInteger(String),
}

impl fmt::Display for FrontendError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrontendError::Parse(e) => write!(f, "{}", e),
            FrontendError::MalformedRational(s) => write!(f, "malformed rational literal {:?}", s),
            FrontendError::InvalidInteger(s) => write!(f, "malformed integer literal {:?}", s),
        }
    }
}

impl Error for FrontendError {}

impl From<pest::error::Error<Rule>> for FrontendError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        FrontendError::Parse(e)
    }
}

type Pair<'a> = pest::iterators::Pair<'a, Rule>;

/// Parse `source` and lower it to a single top-level `Eos` node, ready
/// for `tvm::emitter::Emitter::emit`.
pub fn parse(source: &str) -> Result<Node, FrontendError> {
    let program = SimpleMathParser::parse(Rule::program, source)?
        .next()
        .expect("program rule always produces exactly one pair");

    let mut stmts = Vec::new();
    for pair in program.into_inner() {
        if pair.as_rule() == Rule::stmt {
            stmts.push(build_stmt(pair)?);
        }
    }
    Ok(Node::eos(stmts))
}

fn node_debug(pair: &Pair) -> NodeDebug {
    let span = pair.as_span();
    let (line_no, col_start) = span.start_pos().line_col();
    let (_, col_end) = span.end_pos().line_col();
    let line = span
        .start_pos()
        .line_of()
        .trim_end_matches(|c| c == '\n' || c == '\r')
        .to_string();
    NodeDebug { line_no, col_start, col_end, line }
}

fn build_stmt(pair: Pair) -> Result<Node, FrontendError> {
    let inner = pair.into_inner().next().expect("stmt always wraps one alternative");
    match inner.as_rule() {
        Rule::assign_stmt => build_assign_stmt(inner),
        Rule::if_stmt => build_if_stmt(inner),
        Rule::while_stmt => build_while_stmt(inner),
        Rule::expr_stmt => {
            let expr_pair = inner.into_inner().next().expect("expr_stmt wraps one expr");
            build_expr(expr_pair)
        }
        _ => unreachable!("stmt only wraps the four statement kinds"),
    }
}

fn build_assign_stmt(pair: Pair) -> Result<Node, FrontendError> {
    let debug = node_debug(&pair);
    let mut inner = pair.into_inner();
    let ident_pair = inner.next().expect("assign_stmt starts with an identifier");
    let ident_debug = node_debug(&ident_pair);
    let ident = Node::identifier(ident_pair.as_str(), ident_debug);
    let expr = build_expr(inner.next().expect("assign_stmt carries an expr"))?;
    Ok(Node::op(Op::Assign, vec![ident, expr], debug))
}

fn build_block(pair: Pair) -> Result<Node, FrontendError> {
    let debug = node_debug(&pair);
    let stmts = pair
        .into_inner()
        .map(build_stmt)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Node::op(Op::Eos, stmts, debug))
}

fn build_if_stmt(pair: Pair) -> Result<Node, FrontendError> {
    let debug = node_debug(&pair);
    let mut inner = pair.into_inner();
    let cond = build_expr(inner.next().expect("if_stmt carries a condition"))?;
    let then_branch = build_block(inner.next().expect("if_stmt carries a then block"))?;
    let mut children = vec![cond, then_branch];
    if let Some(else_block) = inner.next() {
        children.push(build_block(else_block)?);
    }
    Ok(Node::op(Op::If, children, debug))
}

fn build_while_stmt(pair: Pair) -> Result<Node, FrontendError> {
    let debug = node_debug(&pair);
    let mut inner = pair.into_inner();
    let cond = build_expr(inner.next().expect("while_stmt carries a condition"))?;
    let body = build_block(inner.next().expect("while_stmt carries a body"))?;
    Ok(Node::op(Op::While, vec![cond, body], debug))
}

fn build_expr(pair: Pair) -> Result<Node, FrontendError> {
    build_rel_expr(pair.into_inner().next().expect("expr wraps rel_expr"))
}

fn build_rel_expr(pair: Pair) -> Result<Node, FrontendError> {
    let debug = node_debug(&pair);
    let mut inner = pair.into_inner();
    let mut node = build_add_expr(inner.next().expect("rel_expr always has a left operand"))?;
    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "<=" => Op::Le,
            ">=" => Op::Ge,
            "==" => Op::Eq,
            "!=" => Op::Ne,
            "<" => Op::Lt,
            ">" => Op::Gt,
            other => unreachable!("rel_op grammar only produces these tokens: {}", other),
        };
        let rhs = build_add_expr(inner.next().expect("rel_op is always followed by an operand"))?;
        node = Node::op(op, vec![node, rhs], debug.clone());
    }
    Ok(node)
}

fn build_add_expr(pair: Pair) -> Result<Node, FrontendError> {
    let debug = node_debug(&pair);
    let mut inner = pair.into_inner();
    let mut node = build_mul_expr(inner.next().expect("add_expr always has a left operand"))?;
    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "+" => Op::Add,
            "-" => Op::Sub,
            other => unreachable!("add_op grammar only produces these tokens: {}", other),
        };
        let rhs = build_mul_expr(inner.next().expect("add_op is always followed by an operand"))?;
        node = Node::op(op, vec![node, rhs], debug.clone());
    }
    Ok(node)
}

fn build_mul_expr(pair: Pair) -> Result<Node, FrontendError> {
    let debug = node_debug(&pair);
    let mut inner = pair.into_inner();
    let mut node = build_unary_expr(inner.next().expect("mul_expr always has a left operand"))?;
    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "*" => Op::Mul,
            "/" => Op::Div,
            other => unreachable!("mul_op grammar only produces these tokens: {}", other),
        };
        let rhs = build_unary_expr(inner.next().expect("mul_op is always followed by an operand"))?;
        node = Node::op(op, vec![node, rhs], debug.clone());
    }
    Ok(node)
}

fn build_unary_expr(pair: Pair) -> Result<Node, FrontendError> {
    let debug = node_debug(&pair);
    let inner = pair.into_inner().next().expect("unary_expr wraps neg_expr or atom");
    match inner.as_rule() {
        Rule::neg_expr => {
            let operand_pair = inner
                .into_inner()
                .next()
                .expect("neg_expr always wraps one unary_expr");
            let operand = build_unary_expr(operand_pair)?;
            Ok(Node::op(Op::UMinus, vec![operand], debug))
        }
        Rule::atom => build_atom(inner),
        _ => unreachable!("unary_expr only wraps neg_expr or atom"),
    }
}

fn build_atom(pair: Pair) -> Result<Node, FrontendError> {
    let debug = node_debug(&pair);
    let inner = pair.into_inner().next().expect("atom always wraps one alternative");
    match inner.as_rule() {
        Rule::number => {
            let text = inner.as_str();
            let value: num::BigRational = text
                .parse()
                .map_err(|_| FrontendError::MalformedRational(text.to_string()))?;
            Ok(Node::number(value, debug))
        }
        Rule::integer => {
            let text = inner.as_str();
            let value: i64 = text
                .parse()
                .map_err(|_| FrontendError::InvalidInteger(text.to_string()))?;
            Ok(Node::integer(value, debug))
        }
        Rule::identifier => Ok(Node::identifier(inner.as_str(), debug)),
        Rule::expr => build_expr(inner),
        _ => unreachable!("atom only wraps number, integer, identifier or a parenthesized expr"),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tvm::ast::{Node as N, Op as O};

    #[test]
    fn assignment_of_integer_literal() {
        let tree = parse("x = 42;").unwrap();
        match tree {
            N::Op(O::Eos, stmts, _) => {
                assert_eq!(stmts.len(), 1);
                match &stmts[0] {
                    N::Op(O::Assign, children, _) => {
                        assert!(matches!(&children[0], N::Identifier(name, _) if name == "x"));
                        assert!(matches!(&children[1], N::Integer(42, _)));
                    }
                    other => panic!("expected Assign, got {:?}", other),
                }
            }
            other => panic!("expected top-level Eos, got {:?}", other),
        }
    }

    #[test]
    fn trailing_bare_expression_statement_is_left_on_stack() {
        let tree = parse("x * y;").unwrap();
        match tree {
            N::Op(O::Eos, stmts, _) => {
                assert_eq!(stmts.len(), 1);
                assert!(matches!(&stmts[0], N::Op(O::Mul, _, _)));
            }
            other => panic!("expected top-level Eos, got {:?}", other),
        }
    }

    fn top_level_stmts(tree: N) -> Vec<N> {
        match tree {
            N::Op(O::Eos, stmts, _) => stmts,
            other => panic!("expected top-level Eos, got {:?}", other),
        }
    }

    fn assign_value(stmt: &N) -> &N {
        match stmt {
            N::Op(O::Assign, children, _) => &children[1],
            other => panic!("expected Assign, got {:?}", other),
        }
    }

    #[test]
    fn relational_operators_bind_looser_than_additive() {
        // a + b < c should parse as Lt(Add(a, b), c), not Add(a, Lt(b, c)).
        let stmts = top_level_stmts(parse("r = a + b < c;").unwrap());
        match assign_value(&stmts[0]) {
            N::Op(O::Lt, cmp_children, _) => {
                assert!(matches!(&cmp_children[0], N::Op(O::Add, _, _)));
                assert!(matches!(&cmp_children[1], N::Identifier(name, _) if name == "c"));
            }
            other => panic!("expected Lt at the top of the expression, got {:?}", other),
        }
    }

    #[test]
    fn unary_minus_wraps_a_parenthesized_expression() {
        let stmts = top_level_stmts(parse("y = -(a + b);").unwrap());
        match assign_value(&stmts[0]) {
            N::Op(O::UMinus, inner, _) => {
                assert!(matches!(&inner[0], N::Op(O::Add, _, _)));
            }
            other => panic!("expected UMinus, got {:?}", other),
        }
    }

    #[test]
    fn rational_literal_parses_as_number_node() {
        let stmts = top_level_stmts(parse("x = 3/4;").unwrap());
        assert!(matches!(assign_value(&stmts[0]), N::Number(_, _)));
    }

    #[test]
    fn if_else_builds_three_child_if_node() {
        let stmts = top_level_stmts(parse("if (x < 1) { y = 1; } else { y = 2; }").unwrap());
        match &stmts[0] {
            N::Op(O::If, children, _) => assert_eq!(children.len(), 3),
            other => panic!("expected If, got {:?}", other),
        }
    }

    #[test]
    fn while_loop_builds_two_child_while_node() {
        let stmts = top_level_stmts(parse("while (x < 10) { x = x + 1; }").unwrap());
        match &stmts[0] {
            N::Op(O::While, children, _) => assert_eq!(children.len(), 2),
            other => panic!("expected While, got {:?}", other),
        }
    }

    #[test]
    fn comments_are_skipped() {
        let stmts = top_level_stmts(parse("// a leading comment\nx = 1; // trailing\n").unwrap());
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn malformed_source_is_a_frontend_error() {
        assert!(parse("x = ;").is_err());
    }
}
