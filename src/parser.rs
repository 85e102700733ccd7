//! Parser for the Monkey language.
//!
//! Parsing is a two-stage affair: the pest grammar (`grammar.pest`) matches
//! the surface syntax into flat token pairs, and a [`PrattParser`] folds the
//! operator pairs back into a tree with the right precedence:
//!
//! `==`/`!=`  <  `<`/`>`  <  `+`/`-`  <  `*`/`/`  <  prefix `!`/`-`  <  call/index
//!
//! The output is the [`Program`] AST consumed by the compiler.  A function
//! literal appearing as the right-hand side of a `let` statement is given the
//! binding's name, which is what later lets it resolve a reference to itself
//! while its own `let` is still being compiled.

use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;

use crate::ast::{Block, Expr, InfixOp, PrefixOp, Program, Stmt};

#[derive(pest_derive::Parser)]
#[grammar = "grammar.pest"]
pub struct MonkeyParser;

/// A parse error, pointing at the offending source span.
///
/// Boxed because pest's error type is large and travels through `Result`s.
pub type ParseError = Box<pest::error::Error<Rule>>;

type ParseResult<T> = Result<T, ParseError>;

lazy_static::lazy_static! {
    static ref PRATT_PARSER: PrattParser<Rule> = {
        use Assoc::Left;
        use Rule::*;
        // Lowest precedence first.
        PrattParser::new()
            .op(Op::infix(eq, Left) | Op::infix(not_eq, Left))
            .op(Op::infix(lt, Left) | Op::infix(gt, Left))
            .op(Op::infix(add, Left) | Op::infix(sub, Left))
            .op(Op::infix(mul, Left) | Op::infix(div, Left))
            .op(Op::prefix(bang) | Op::prefix(minus))
            .op(Op::postfix(call_args) | Op::postfix(index_arg))
    };
}

/// Parse a whole Monkey source string into a [`Program`].
pub fn parse(input: &str) -> ParseResult<Program> {
    let mut pairs = MonkeyParser::parse(Rule::program, input).map_err(Box::new)?;
    let mut statements = Vec::new();
    if let Some(program) = pairs.next() {
        for pair in program.into_inner() {
            match pair.as_rule() {
                Rule::stmt => statements.push(parse_stmt(pair)?),
                Rule::EOI => (),
                rule => unreachable!("unexpected rule in program: {rule:?}"),
            }
        }
    }
    Ok(Program { statements })
}

fn parse_stmt(pair: Pair<Rule>) -> ParseResult<Stmt> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::let_stmt => {
            let mut parts = inner.into_inner();
            parts.next(); // kw_let
            let name = parts.next().unwrap().as_str().to_string();
            let mut value = parse_expr(parts.next().unwrap().into_inner())?;
            if let Expr::Function { name: fn_name, .. } = &mut value {
                *fn_name = Some(name.clone());
            }
            Ok(Stmt::Let { name, value })
        }
        Rule::return_stmt => {
            let mut parts = inner.into_inner();
            parts.next(); // kw_return
            let value = parse_expr(parts.next().unwrap().into_inner())?;
            Ok(Stmt::Return { value })
        }
        Rule::expr_stmt => {
            let expr = parse_expr(inner.into_inner().next().unwrap().into_inner())?;
            Ok(Stmt::Expr { expr })
        }
        rule => unreachable!("unexpected statement rule: {rule:?}"),
    }
}

fn parse_block(pair: Pair<Rule>) -> ParseResult<Block> {
    let statements = pair
        .into_inner()
        .map(parse_stmt)
        .collect::<ParseResult<Vec<_>>>()?;
    Ok(Block { statements })
}

fn parse_expr(pairs: Pairs<Rule>) -> ParseResult<Expr> {
    PRATT_PARSER
        .map_primary(parse_primary)
        .map_prefix(|op, right| {
            let operator = match op.as_rule() {
                Rule::bang => PrefixOp::Bang,
                Rule::minus => PrefixOp::Minus,
                rule => unreachable!("unexpected prefix operator: {rule:?}"),
            };
            Ok(Expr::Prefix {
                operator,
                right: Box::new(right?),
            })
        })
        .map_postfix(|left, op| match op.as_rule() {
            Rule::call_args => {
                let arguments = op
                    .into_inner()
                    .map(|p| parse_expr(p.into_inner()))
                    .collect::<ParseResult<Vec<_>>>()?;
                Ok(Expr::Call {
                    function: Box::new(left?),
                    arguments,
                })
            }
            Rule::index_arg => {
                let index = parse_expr(op.into_inner().next().unwrap().into_inner())?;
                Ok(Expr::Index {
                    left: Box::new(left?),
                    index: Box::new(index),
                })
            }
            rule => unreachable!("unexpected postfix rule: {rule:?}"),
        })
        .map_infix(|left, op, right| {
            let operator = match op.as_rule() {
                Rule::eq => InfixOp::Eq,
                Rule::not_eq => InfixOp::NotEq,
                Rule::lt => InfixOp::Lt,
                Rule::gt => InfixOp::Gt,
                Rule::add => InfixOp::Add,
                Rule::sub => InfixOp::Sub,
                Rule::mul => InfixOp::Mul,
                Rule::div => InfixOp::Div,
                rule => unreachable!("unexpected infix operator: {rule:?}"),
            };
            Ok(Expr::Infix {
                operator,
                left: Box::new(left?),
                right: Box::new(right?),
            })
        })
        .parse(pairs)
}

fn parse_primary(pair: Pair<Rule>) -> ParseResult<Expr> {
    match pair.as_rule() {
        Rule::int_lit => {
            let literal = pair.as_str();
            literal.parse::<i64>().map(Expr::Integer).map_err(|_| {
                Box::new(pest::error::Error::new_from_span(
                    pest::error::ErrorVariant::CustomError {
                        message: format!("could not parse {literal:?} as integer"),
                    },
                    pair.as_span(),
                ))
            })
        }
        Rule::string_lit => {
            let quoted = pair.as_str();
            Ok(Expr::Str(quoted[1..quoted.len() - 1].to_string()))
        }
        Rule::bool_lit => Ok(Expr::Boolean(pair.as_str() == "true")),
        Rule::ident => Ok(Expr::Identifier(pair.as_str().to_string())),
        Rule::grouped => parse_expr(pair.into_inner().next().unwrap().into_inner()),
        Rule::array_lit => {
            let elements = pair
                .into_inner()
                .map(|p| parse_expr(p.into_inner()))
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(Expr::Array(elements))
        }
        Rule::hash_lit => {
            let mut pairs = Vec::new();
            for entry in pair.into_inner() {
                let mut kv = entry.into_inner();
                let key = parse_expr(kv.next().unwrap().into_inner())?;
                let value = parse_expr(kv.next().unwrap().into_inner())?;
                pairs.push((key, value));
            }
            Ok(Expr::Hash(pairs))
        }
        Rule::if_expr => {
            let mut parts = pair.into_inner();
            parts.next(); // kw_if
            let condition = parse_expr(parts.next().unwrap().into_inner())?;
            let consequence = parse_block(parts.next().unwrap())?;
            let alternative = match parts.next() {
                // kw_else, then the alternative block
                Some(_) => Some(parse_block(parts.next().unwrap())?),
                None => None,
            };
            Ok(Expr::If {
                condition: Box::new(condition),
                consequence,
                alternative,
            })
        }
        Rule::fn_lit => {
            let mut parts = pair.into_inner();
            parts.next(); // kw_fn
            let mut parameters = Vec::new();
            let mut next = parts.next().unwrap();
            if next.as_rule() == Rule::params {
                parameters = next.into_inner().map(|p| p.as_str().to_string()).collect();
                next = parts.next().unwrap();
            }
            let body = parse_block(next)?;
            Ok(Expr::Function {
                parameters,
                body,
                name: None,
            })
        }
        rule => unreachable!("unexpected primary rule: {rule:?}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
