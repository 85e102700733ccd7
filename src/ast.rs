//! Abstract Syntax Tree (AST) node types for the Monkey language.
//!
//! The AST is the output of the parser and the input to the compiler.
//!
//! # Design Principles
//!
//! - **Sealed variants**: statements and expressions are closed enums; the
//!   compiler dispatches with exhaustive pattern matches.
//! - **No lifetimes**: all strings are owned (`String`) so the AST can be
//!   freely moved and stored without tying its lifetime to the source text.
//! - **Deterministic printing**: every node implements [`std::fmt::Display`],
//!   reproducing the source form it was parsed from (modulo whitespace).
//!   The compiler relies on this to order hash-literal keys, so the printed
//!   form is a stable contract, not a debugging aid.

use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level program
// ─────────────────────────────────────────────────────────────────────────────

/// A parsed Monkey program: a flat sequence of statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// The statements in source order.
    pub statements: Vec<Stmt>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Statements
// ─────────────────────────────────────────────────────────────────────────────

/// A Monkey statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `let <name> = <value>;`
    Let { name: String, value: Expr },
    /// `return <value>;`
    Return { value: Expr },
    /// A bare expression in statement position.  Its value is discarded
    /// (the compiler pops it), which is what makes the REPL's
    /// "last popped element" trick work.
    Expr { expr: Expr },
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Let { name, value } => write!(f, "let {name} = {value};"),
            Stmt::Return { value } => write!(f, "return {value};"),
            Stmt::Expr { expr } => write!(f, "{expr}"),
        }
    }
}

/// A braced sequence of statements: a function body or an `if` branch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operators
// ─────────────────────────────────────────────────────────────────────────────

/// A prefix (unary) operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    /// `!` — boolean negation.
    Bang,
    /// `-` — arithmetic negation.
    Minus,
}

impl fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixOp::Bang => write!(f, "!"),
            PrefixOp::Minus => write!(f, "-"),
        }
    }
}

/// An infix (binary) operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    Gt,
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InfixOp::Add => "+",
            InfixOp::Sub => "-",
            InfixOp::Mul => "*",
            InfixOp::Div => "/",
            InfixOp::Eq => "==",
            InfixOp::NotEq => "!=",
            InfixOp::Lt => "<",
            InfixOp::Gt => ">",
        };
        write!(f, "{s}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────────────

/// A Monkey expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A variable reference.
    Identifier(String),
    /// A 64-bit integer literal.
    Integer(i64),
    /// A string literal (UTF-8, no escape sequences).
    Str(String),
    /// `true` / `false`.
    Boolean(bool),
    /// `<op><right>`, e.g. `-5` or `!ok`.
    Prefix { operator: PrefixOp, right: Box<Expr> },
    /// `<left> <op> <right>`, e.g. `a + b`.
    Infix {
        operator: InfixOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `if (<condition>) { … } else { … }` — an expression, not a statement:
    /// the branch not taken contributes `null`.
    If {
        condition: Box<Expr>,
        consequence: Block,
        alternative: Option<Block>,
    },
    /// `fn(<parameters>) { … }`.
    ///
    /// `name` is set iff the literal is the right-hand side of a `let`
    /// binding; it is what allows the function to call itself before the
    /// binding completes.
    Function {
        parameters: Vec<String>,
        body: Block,
        name: Option<String>,
    },
    /// `<function>(<arguments>)`.
    Call {
        function: Box<Expr>,
        arguments: Vec<Expr>,
    },
    /// `[<elements>]`.
    Array(Vec<Expr>),
    /// `{<key>: <value>, …}`.  Pairs are kept in source order; the compiler
    /// re-orders them by printed key form for reproducible emission.
    Hash(Vec<(Expr, Expr)>),
    /// `<left>[<index>]`.
    Index { left: Box<Expr>, index: Box<Expr> },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Identifier(name) => write!(f, "{name}"),
            Expr::Integer(n) => write!(f, "{n}"),
            Expr::Str(s) => write!(f, "{s}"),
            Expr::Boolean(b) => write!(f, "{b}"),
            Expr::Prefix { operator, right } => write!(f, "({operator}{right})"),
            Expr::Infix {
                operator,
                left,
                right,
            } => write!(f, "({left} {operator} {right})"),
            Expr::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if{condition} {consequence}")?;
                if let Some(alt) = alternative {
                    write!(f, "else {alt}")?;
                }
                Ok(())
            }
            Expr::Function {
                parameters,
                body,
                name,
            } => {
                write!(f, "fn")?;
                if let Some(name) = name {
                    write!(f, "<{name}>")?;
                }
                write!(f, "({}) {body}", parameters.join(", "))
            }
            Expr::Call {
                function,
                arguments,
            } => {
                let args: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "{function}({})", args.join(", "))
            }
            Expr::Array(elements) => {
                let elems: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", elems.join(", "))
            }
            Expr::Hash(pairs) => {
                let pairs: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}:{v}")).collect();
                write!(f, "{{{}}}", pairs.join(", "))
            }
            Expr::Index { left, index } => write!(f, "({left}[{index}])"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
