//! Abstract syntax tree
//!
//! The parser produces `Expr` values; the resolver rewrites identifier
//! occurrences into the three reference kinds (`Local`, `Bound`, `Free`),
//! lifts every `Lambda` into a labeled `CodeBlock`, and wraps the program in
//! `Labels` when any lambdas were present. Equality is structural
//! throughout, which the tests lean on heavily.

use scm_core::Op;

/// Fixed-arity builtin operators. `if` and `cons` have dedicated `Expr`
/// variants because their compilation differs structurally (branch distance
/// precomputation, reversed operand order); everything else goes through
/// this table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prim {
    Add1,
    Sub1,
    IntToChar,
    CharToInt,
    IsNull,
    IsZero,
    Not,
    IsInt,
    IsBool,
    Car,
    Cdr,
    Plus,
    Times,
    Minus,
    Lt,
    Gt,
    Leq,
    Geq,
    Eq,
    StrRef,
    StrApp,
    VecRef,
    VecApp,
    StrSet,
    VecSet,
}

impl Prim {
    /// Number of operands the operator takes.
    pub fn arity(self) -> usize {
        use Prim::*;
        match self {
            Add1 | Sub1 | IntToChar | CharToInt | IsNull | IsZero | Not | IsInt | IsBool | Car
            | Cdr => 1,
            Plus | Times | Minus | Lt | Gt | Leq | Geq | Eq | StrRef | StrApp | VecRef | VecApp => {
                2
            }
            StrSet | VecSet => 3,
        }
    }

    /// Source spelling, used in arity error messages.
    pub fn name(self) -> &'static str {
        use Prim::*;
        match self {
            Add1 => "add1",
            Sub1 => "sub1",
            IntToChar => "integer->char",
            CharToInt => "char->integer",
            IsNull => "null?",
            IsZero => "zero?",
            Not => "not",
            IsInt => "integer?",
            IsBool => "boolean?",
            Car => "car",
            Cdr => "cdr",
            Plus => "+",
            Times => "*",
            Minus => "-",
            Lt => "<",
            Gt => ">",
            Leq => "<=",
            Geq => ">=",
            Eq => "=",
            StrRef => "string-ref",
            StrApp => "string-append",
            VecRef => "vector-ref",
            VecApp => "vector-append",
            StrSet => "string-set!",
            VecSet => "vector-set!",
        }
    }

    /// Instruction emitted after the operands.
    pub fn opcode(self) -> Op {
        use Prim::*;
        match self {
            Add1 => Op::Add1,
            Sub1 => Op::Sub1,
            IntToChar => Op::IntToChar,
            CharToInt => Op::CharToInt,
            IsNull => Op::IsNull,
            IsZero => Op::IsZero,
            Not => Op::Not,
            IsInt => Op::IsInt,
            IsBool => Op::IsBool,
            Car => Op::Car,
            Cdr => Op::Cdr,
            Plus => Op::Plus,
            Times => Op::Times,
            Minus => Op::Minus,
            Lt => Op::Lt,
            Gt => Op::Gt,
            Leq => Op::Leq,
            Geq => Op::Geq,
            Eq => Op::Eq,
            StrRef => Op::StrRef,
            StrApp => Op::StrApp,
            VecRef => Op::VecRef,
            VecApp => Op::VecApp,
            StrSet => Op::StrSet,
            VecSet => Op::VecSet,
        }
    }
}

/// A lifted lambda body: formal parameters, captured free variables, and the
/// annotated body expression.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    pub params: Vec<String>,
    pub free: Vec<String>,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Integer literal.
    Int(i64),

    /// Boolean literal (`#t`, `#f`).
    Bool(bool),

    /// Character literal (`#\X`).
    Char(char),

    /// The empty list `()`.
    EmptyList,

    /// An identifier occurrence not yet (or never) resolved. One of these
    /// surviving to code generation is an unbound-variable error.
    Var(String),

    /// Reference to a `let` binding on the local frame.
    Local(String),

    /// Reference to a formal parameter of the enclosing lambda.
    Bound(String),

    /// Reference to a variable captured by the enclosing closure.
    Free(String),

    /// Fixed-arity builtin application.
    Prim(Prim, Vec<Expr>),

    /// `(if test consequent alternative)`.
    If(Box<Expr>, Box<Expr>, Box<Expr>),

    /// `(cons a b)` — compiled cdr-first.
    Cons(Box<Expr>, Box<Expr>),

    /// `(string "...")` expanded character-by-character.
    Str(Vec<char>),

    /// `(vector e...)`.
    Vector(Vec<Expr>),

    /// `(begin e...)`.
    Begin(Vec<Expr>),

    /// `(let ((name expr)...) body)`, bindings in source order.
    Let(Vec<(String, Expr)>, Box<Expr>),

    /// `(lambda (params...) body)` before closure conversion. The free list
    /// is not known yet; the resolver computes it when lifting.
    Lambda { params: Vec<String>, body: Box<Expr> },

    /// A converted lambda occurrence: the label of its lifted code and the
    /// captured-variable references pushed before `CLOSURE`.
    Closure { label: String, free: Vec<Expr> },

    /// The whole-program wrapper when any lambdas were lifted. Label ids
    /// are the indices into `labels`, assigned in source pre-order.
    Labels {
        labels: Vec<(String, CodeBlock)>,
        body: Box<Expr>,
    },

    /// General application: operands, then the callee, then `APPLY`.
    Apply { callee: Box<Expr>, args: Vec<Expr> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prim_arities() {
        assert_eq!(Prim::Add1.arity(), 1);
        assert_eq!(Prim::Cdr.arity(), 1);
        assert_eq!(Prim::Plus.arity(), 2);
        assert_eq!(Prim::VecApp.arity(), 2);
        assert_eq!(Prim::StrSet.arity(), 3);
        assert_eq!(Prim::VecSet.arity(), 3);
    }

    #[test]
    fn test_prim_opcodes() {
        assert_eq!(Prim::Plus.opcode(), Op::Plus);
        assert_eq!(Prim::StrRef.opcode(), Op::StrRef);
        assert_eq!(Prim::IsBool.opcode(), Op::IsBool);
    }

    #[test]
    fn test_prim_names_match_source_spellings() {
        assert_eq!(Prim::IntToChar.name(), "integer->char");
        assert_eq!(Prim::StrSet.name(), "string-set!");
        assert_eq!(Prim::Leq.name(), "<=");
    }

    #[test]
    fn test_reference_kinds_are_disjoint() {
        let name = "x".to_string();
        assert_ne!(Expr::Var(name.clone()), Expr::Local(name.clone()));
        assert_ne!(Expr::Local(name.clone()), Expr::Bound(name.clone()));
        assert_ne!(Expr::Bound(name.clone()), Expr::Free(name));
    }
}
