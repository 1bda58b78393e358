use serde::Serialize;

use crate::expr::Expr;
use crate::token::Token;

/// The shared shape of function and method declarations.  The runtime wraps
/// one of these (plus a captured environment) into a closure value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDecl {
    pub name: Token,

    /// Parameter name tokens (arity ≤ 255, enforced as a parser diagnostic).
    pub params: Vec<Token>,

    /// Body executed when the function is called.
    pub body: Vec<Stmt>,
}

/// **Abstract-Syntax-Tree node** for *statements* (complete executable
/// constructs).  A program is a sequence of these nodes returned by the
/// parser.  There is no `For` variant: the parser desugars `for` loops into
/// `While` wrapped in `Block`s.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stmt {
    /// Stand-alone expression terminated by a semicolon.
    Expression(Expr),

    /// `print` statement used for output.
    Print(Expr),

    /// Variable declaration: `"var" IDENT ("=" initializer)? ";"`.
    Var {
        name: Token,
        initializer: Option<Expr>,
    },

    /// Braced scope containing zero or more declarations/statements.
    Block(Vec<Stmt>),

    /// `if` / `else` conditional.
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    /// `while` loop.
    While { condition: Expr, body: Box<Stmt> },

    /// Function declaration - becomes a first-class callable value.
    Function(FunctionDecl),

    /// `return` statement inside a function body.
    Return {
        /// The `return` keyword token (for diagnostics).
        keyword: Token,

        /// Optional expression to return.  Absent ⇒ `nil` is returned.
        value: Option<Expr>,
    },

    /// Class declaration with an optional `< superclass` clause.  The
    /// superclass, when present, is a `Variable` expression so it resolves
    /// like any other name.
    Class {
        name: Token,
        superclass: Option<Expr>,
        methods: Vec<FunctionDecl>,
    },
}
