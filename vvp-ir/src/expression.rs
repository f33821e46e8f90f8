use itertools::Itertools;
use num::{BigUint, One, Zero};
use serde::{Deserialize, Serialize};

use crate::{ScopeId, SignalId};

/// A single four-valued logic bit
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Bit {
    Zero,
    One,
    X,
    Z,
}

impl Bit {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Bit::Zero),
            '1' => Some(Bit::One),
            'x' | 'X' => Some(Bit::X),
            'z' | 'Z' | '?' => Some(Bit::Z),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Bit::Zero => '0',
            Bit::One => '1',
            Bit::X => 'x',
            Bit::Z => 'z',
        }
    }
}

impl std::fmt::Display for Bit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    CaseEq,
    CaseNotEq,
    Lt,
    Gt,
    Le,
    Ge,
    LeftShift,
    RightShift,
    LogicalAnd,
    LogicalOr,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseXnor,
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOperator::Add => write!(f, "+"),
            BinaryOperator::Sub => write!(f, "-"),
            BinaryOperator::Mul => write!(f, "*"),
            BinaryOperator::Div => write!(f, "/"),
            BinaryOperator::Mod => write!(f, "%"),
            BinaryOperator::Eq => write!(f, "=="),
            BinaryOperator::NotEq => write!(f, "!="),
            BinaryOperator::CaseEq => write!(f, "==="),
            BinaryOperator::CaseNotEq => write!(f, "!=="),
            BinaryOperator::Lt => write!(f, "<"),
            BinaryOperator::Gt => write!(f, ">"),
            BinaryOperator::Le => write!(f, "<="),
            BinaryOperator::Ge => write!(f, ">="),
            BinaryOperator::LeftShift => write!(f, "<<"),
            BinaryOperator::RightShift => write!(f, ">>"),
            BinaryOperator::LogicalAnd => write!(f, "&&"),
            BinaryOperator::LogicalOr => write!(f, "||"),
            BinaryOperator::BitwiseAnd => write!(f, "&"),
            BinaryOperator::BitwiseOr => write!(f, "|"),
            BinaryOperator::BitwiseXor => write!(f, "^"),
            BinaryOperator::BitwiseXnor => write!(f, "~^"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum UnaryOperator {
    BitwiseNot,
    LogicalNot,
    Minus,
    ReduceAnd,
    ReduceOr,
    ReduceXor,
}

impl std::fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::BitwiseNot => write!(f, "~"),
            UnaryOperator::LogicalNot => write!(f, "!"),
            UnaryOperator::Minus => write!(f, "-"),
            UnaryOperator::ReduceAnd => write!(f, "&"),
            UnaryOperator::ReduceOr => write!(f, "|"),
            UnaryOperator::ReduceXor => write!(f, "^"),
        }
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum ExprKind {
    Binary {
        op: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    /// Operands are listed most significant first, as written in the source
    Concat(Vec<Expression>),
    /// Bits of a literal, least significant first
    Number(Vec<Bit>),
    /// An unsigned constant produced by the elaborator, e.g. for delays
    ULong(u64),
    Signal(SignalId),
    /// Call of a user defined function
    UserFunction {
        function: ScopeId,
        args: Vec<Expression>,
    },
    /// Only valid as a system task argument
    String(String),
    /// Only valid as a system task argument
    Scope(ScopeId),
    /// Call of a system function such as `$time`
    SystemFunction(String),
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Expression {
    pub kind: ExprKind,
    pub width: u32,
    pub signed: bool,
}

impl Expression {
    pub fn new(kind: ExprKind, width: u32) -> Self {
        Self {
            kind,
            width,
            signed: false,
        }
    }

    pub fn signed(self) -> Self {
        Self {
            signed: true,
            ..self
        }
    }

    /// A literal made up of the specified bits, least significant first
    pub fn number(bits: &[Bit]) -> Self {
        Self::new(ExprKind::Number(bits.to_vec()), bits.len() as u32)
    }

    /// A literal of the specified width holding `value`. Bits above `width` are dropped
    pub fn number_u64(value: u64, width: u32) -> Self {
        let bits = (0..width)
            .map(|i| {
                if i < 64 && (value >> i) & 1 == 1 {
                    Bit::One
                } else {
                    Bit::Zero
                }
            })
            .collect::<Vec<_>>();
        Self::number(&bits)
    }

    /// Parses a literal written most significant bit first, e.g. `"10xz"`.
    /// Underscores are ignored like in Verilog literals
    pub fn number_str(bits: &str) -> Self {
        let bits = bits
            .chars()
            .filter(|c| *c != '_')
            .map(|c| Bit::from_char(c).unwrap_or_else(|| panic!("{c} is not a logic bit")))
            .rev()
            .collect::<Vec<_>>();
        Self::number(&bits)
    }

    pub fn ulong(value: u64) -> Self {
        Self::new(ExprKind::ULong(value), 64)
    }

    pub fn signal(signal: SignalId, width: u32) -> Self {
        Self::new(ExprKind::Signal(signal), width)
    }

    pub fn binary(op: BinaryOperator, lhs: Expression, rhs: Expression, width: u32) -> Self {
        Self::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            width,
        )
    }

    pub fn unary(op: UnaryOperator, operand: Expression, width: u32) -> Self {
        Self::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            width,
        )
    }

    /// Concatenation of `operands`, most significant first. The width is the sum of
    /// the operand widths
    pub fn concat(operands: Vec<Expression>) -> Self {
        let width = operands.iter().map(|op| op.width).sum();
        Self::new(ExprKind::Concat(operands), width)
    }

    pub fn call(function: ScopeId, args: Vec<Expression>, width: u32) -> Self {
        Self::new(ExprKind::UserFunction { function, args }, width)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::new(ExprKind::String(s.into()), 0)
    }

    pub fn scope(scope: ScopeId) -> Self {
        Self::new(ExprKind::Scope(scope), 0)
    }

    pub fn system_function(name: impl Into<String>, width: u32) -> Self {
        Self::new(ExprKind::SystemFunction(name.into()), width)
    }

    /// The value of the expression if it is a constant without x or z bits
    pub fn const_value(&self) -> Option<BigUint> {
        match &self.kind {
            ExprKind::Number(bits) => {
                let mut result = BigUint::zero();
                for (i, bit) in bits.iter().enumerate() {
                    match bit {
                        Bit::Zero => {}
                        Bit::One => result |= BigUint::one() << i,
                        Bit::X | Bit::Z => return None,
                    }
                }
                Some(result)
            }
            ExprKind::ULong(val) => Some(BigUint::from(*val)),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::Binary { .. } => "binary",
            ExprKind::Unary { .. } => "unary",
            ExprKind::Concat(_) => "concatenation",
            ExprKind::Number(_) => "number",
            ExprKind::ULong(_) => "constant",
            ExprKind::Signal(_) => "signal",
            ExprKind::UserFunction { .. } => "function call",
            ExprKind::String(_) => "string",
            ExprKind::Scope(_) => "scope",
            ExprKind::SystemFunction(_) => "system function",
        }
    }
}

/// Formats the bits of a literal most significant first, the way they are written
/// in source code
pub fn format_bits(bits: &[Bit]) -> String {
    bits.iter().rev().map(Bit::as_char).join("")
}
