use thiserror::Error;
use vvp_ir::{BinaryOperator, ProceduralKind, UnaryOperator};

/// A construct which is valid input but which this code generator can not produce
/// code for. These are reported and skipped, code generation carries on with the
/// next statement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Unsupported binary operator {0}")]
    UnsupportedBinaryOperator(BinaryOperator),
    #[error("Unsupported unary operator {0}")]
    UnsupportedUnaryOperator(UnaryOperator),
    #[error("Shift amounts must be constant")]
    NonConstantShift,
    #[error("Operands of {op} must be 1 bit wide, found a {width} bit operand")]
    WideLogicalOperand { op: BinaryOperator, width: u32 },
    #[error("A {0} can not be evaluated as a value")]
    NotAValue(&'static str),
    #[error("{function} takes {expected} arguments but {got} were passed")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },
    #[error("Function {0} has no result port")]
    MissingResultPort(String),
    #[error("{0} has no definition")]
    MissingDefinition(String),
    #[error("Assignments to {0} lvalues at once are unsupported")]
    MultipleLvalues(usize),
    #[error("Assignments through a bit select are unsupported")]
    MuxLvalue,
    #[error("Non-blocking assignment delays must be constant")]
    NonConstantDelay,
    #[error("Procedural continuous assignments are unsupported, found {0}")]
    UnsupportedProcedural(ProceduralKind),
}

pub type Result<T> = std::result::Result<T, Error>;

/// An [`Error`] together with the scope of the statement it was found in
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub scope: String,
    pub error: Error,
}

impl Diagnostic {
    pub fn new(scope: impl Into<String>, error: Error) -> Self {
        Self {
            scope: scope.into(),
            error,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vvp.tgt error: {}: {}", self.scope, self.error)
    }
}
