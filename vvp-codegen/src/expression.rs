use itertools::Itertools;
use local_impl::local_impl;
use num::{BigUint, ToPrimitive};
use tracing::trace;
use vvp_ir::{BinaryOperator, Bit, ExprKind, Expression, ScopeId, SignalId, UnaryOperator};

use crate::emit::{Arith, Compare, ForkTarget, Instruction, Logic, Reduce};
use crate::error::{Error, Result};
use crate::vector::{Address, Flag, Vector};
use crate::Context;

/// Lowers `expr` into code that leaves its value in a vector of exactly `width`
/// bits. Values narrower than `width` are zero extended, wider ones are truncated.
///
/// The returned vector is owned by the caller which must release it. On error, no
/// bits are left allocated.
pub fn lower_expression(expr: &Expression, width: u32, ctx: &mut Context) -> Result<Vector> {
    expr.lower(width, ctx)
}

/// Lowers a condition down to a single bit. Wider values are reduced with an or
/// so that the bit is 1 whenever any bit of the value is 1
pub(crate) fn lower_condition(expr: &Expression, ctx: &mut Context) -> Result<Vector> {
    let value = expr.lower_natural(ctx)?;
    let width = value.width();
    if width == 1 {
        return Ok(value);
    }

    Ok(match value {
        Vector::Constant { bit, .. } => Vector::Constant {
            bit: match bit {
                Bit::Zero => Bit::Zero,
                Bit::One => Bit::One,
                Bit::X | Bit::Z => Bit::X,
            },
            width: 1,
        },
        Vector::Flag(_) => value,
        Vector::Owned { base, width } => {
            ctx.emit(Instruction::Reduce {
                op: Reduce::Or,
                dst: base,
                src: base,
                width,
            });
            ctx.release(Vector::Owned {
                base: base.offset(1),
                width: width - 1,
            });
            Vector::Owned { base, width: 1 }
        }
    })
}

#[local_impl]
impl ExprLocal for Expression {
    fn lower(&self, width: u32, ctx: &mut Context) -> Result<Vector> {
        let _span = tracing::trace_span!("lower", kind = self.kind_name(), width).entered();

        let result = match &self.kind {
            ExprKind::Number(bits) => Ok(lower_number(bits, width, ctx)),
            ExprKind::ULong(value) => {
                let bits = (0..self.width.min(64))
                    .map(|i| if (value >> i) & 1 == 1 { Bit::One } else { Bit::Zero })
                    .collect::<Vec<_>>();
                Ok(lower_number(&bits, width, ctx))
            }
            ExprKind::Signal(signal) => Ok(lower_signal(*signal, self.width, width, ctx)),
            ExprKind::Concat(operands) => lower_concat(operands, width, ctx),
            ExprKind::Unary { op, operand } => lower_unary(*op, operand, width, ctx),
            ExprKind::Binary { op, lhs, rhs } => lower_binary(*op, lhs, rhs, width, ctx),
            ExprKind::UserFunction { function, args } => {
                lower_function_call(*function, args, width, ctx)
            }
            ExprKind::String(_) | ExprKind::Scope(_) | ExprKind::SystemFunction(_) => {
                Err(Error::NotAValue(self.kind_name()))
            }
        }?;

        trace!("Lowered into {result}");
        assert_eq!(
            result.width(),
            width,
            "Lowering a {} produced a vector of the wrong width",
            self.kind_name()
        );
        Ok(result)
    }

    /// Lowers the expression at its own width
    fn lower_natural(&self, ctx: &mut Context) -> Result<Vector> {
        self.lower(self.width, ctx)
    }
}

/// Lowers both operands of a binary operator, releasing the left one again if the
/// right one fails
fn lower_operands(
    lhs: &Expression,
    rhs: &Expression,
    lhs_width: u32,
    rhs_width: u32,
    ctx: &mut Context,
) -> Result<(Vector, Vector)> {
    let l = lhs.lower(lhs_width, ctx)?;
    match rhs.lower(rhs_width, ctx) {
        Ok(r) => Ok((l, r)),
        Err(e) => {
            ctx.release(l);
            Err(e)
        }
    }
}

/// Copies the flag bit into a freshly allocated bit so that the next compare can
/// not overwrite it
fn copy_flag(flag: Flag, width: u32, ctx: &mut Context) -> Vector {
    let result = ctx.allocate(1);
    ctx.emit(Instruction::Mov {
        dst: result.base(),
        src: flag.address(),
        width: 1,
    });
    ctx.resize(result, width)
}

/// Writes zeros to bits `from..` of `vector`
fn zero_fill(vector: Vector, from: u32, ctx: &mut Context) {
    let width = vector.width();
    if from < width {
        ctx.emit(Instruction::Mov {
            dst: vector.base().offset(from),
            src: Address::constant(Bit::Zero),
            width: width - from,
        })
    }
}

fn lower_number(bits: &[Bit], width: u32, ctx: &mut Context) -> Vector {
    let significant = &bits[..(bits.len()).min(width as usize)];

    match significant.first() {
        None => return Vector::zero(width),
        Some(first) => {
            let uniform = significant.iter().all(|bit| bit == first);
            // Bits above the literal are zero, so only a zero literal can
            // cover them with its own constant
            if uniform && (significant.len() == width as usize || *first == Bit::Zero) {
                return Vector::Constant { bit: *first, width };
            }
        }
    }

    let result = ctx.allocate(width);
    let mut offset = 0;
    for (count, bit) in significant.iter().dedup_with_count() {
        ctx.emit(Instruction::Mov {
            dst: result.base().offset(offset),
            src: Address::constant(*bit),
            width: count as u32,
        });
        offset += count as u32;
    }
    zero_fill(result, offset, ctx);
    result
}

fn lower_signal(signal: SignalId, natural: u32, width: u32, ctx: &mut Context) -> Vector {
    let design = ctx.design;
    let signal = design.signal(signal);
    let loaded = natural.min(signal.width).min(width);

    let result = ctx.allocate(width);
    for bit in 0..loaded {
        ctx.emit(Instruction::Load {
            dst: result.bit(bit),
            signal: signal.name.clone(),
            bit,
        })
    }
    zero_fill(result, loaded, ctx);
    result
}

/// Operands are packed from the least significant one, i.e. the last one listed.
/// Bits which do not fit in `width` are dropped but every operand is still
/// evaluated
fn lower_concat(operands: &[Expression], width: u32, ctx: &mut Context) -> Result<Vector> {
    let result = ctx.allocate(width);

    let mut offset = 0;
    for operand in operands.iter().rev() {
        let value = match operand.lower_natural(ctx) {
            Ok(value) => value,
            Err(e) => {
                ctx.release(result);
                return Err(e);
            }
        };

        let copied = value.width().min(width.saturating_sub(offset));
        if copied > 0 {
            ctx.emit(Instruction::Mov {
                dst: result.base().offset(offset),
                src: value.base(),
                width: copied,
            });
        }
        offset += value.width();
        ctx.release(value);
    }

    zero_fill(result, offset, ctx);
    Ok(result)
}

fn lower_unary(
    op: UnaryOperator,
    operand: &Expression,
    width: u32,
    ctx: &mut Context,
) -> Result<Vector> {
    match op {
        UnaryOperator::BitwiseNot => {
            let value = operand.lower(width, ctx)?;
            let value = ctx.materialize(value);
            ctx.emit(Instruction::Inv {
                dst: value.base(),
                width,
            });
            Ok(value)
        }
        UnaryOperator::LogicalNot => {
            let value = operand.lower_natural(ctx)?;
            let value = ctx.materialize(value);
            let base = value.base();
            let bit = if value.width() == 1 {
                ctx.emit(Instruction::Inv { dst: base, width: 1 });
                value
            } else {
                ctx.emit(Instruction::Reduce {
                    op: Reduce::Nor,
                    dst: base,
                    src: base,
                    width: value.width(),
                });
                ctx.release(Vector::Owned {
                    base: base.offset(1),
                    width: value.width() - 1,
                });
                Vector::Owned { base, width: 1 }
            };
            Ok(ctx.resize(bit, width))
        }
        UnaryOperator::Minus
        | UnaryOperator::ReduceAnd
        | UnaryOperator::ReduceOr
        | UnaryOperator::ReduceXor => Err(Error::UnsupportedUnaryOperator(op)),
    }
}

fn lower_binary(
    op: BinaryOperator,
    lhs: &Expression,
    rhs: &Expression,
    width: u32,
    ctx: &mut Context,
) -> Result<Vector> {
    match op {
        BinaryOperator::Eq
        | BinaryOperator::NotEq
        | BinaryOperator::CaseEq
        | BinaryOperator::CaseNotEq => lower_equality(op, lhs, rhs, width, ctx),
        BinaryOperator::Lt | BinaryOperator::Gt | BinaryOperator::Le | BinaryOperator::Ge => {
            lower_relational(op, lhs, rhs, width, ctx)
        }
        BinaryOperator::Add => lower_additive(Arith::Add, lhs, rhs, width, ctx),
        BinaryOperator::Sub => lower_additive(Arith::Sub, lhs, rhs, width, ctx),
        BinaryOperator::LeftShift => lower_left_shift(lhs, rhs, width, ctx),
        BinaryOperator::RightShift => lower_right_shift(lhs, rhs, width, ctx),
        BinaryOperator::LogicalAnd | BinaryOperator::LogicalOr => {
            lower_logical(op, lhs, rhs, width, ctx)
        }
        BinaryOperator::BitwiseAnd => lower_bitwise(Logic::And, lhs, rhs, width, ctx),
        BinaryOperator::BitwiseOr => lower_bitwise(Logic::Or, lhs, rhs, width, ctx),
        BinaryOperator::BitwiseXor => lower_bitwise(Logic::Xor, lhs, rhs, width, ctx),
        BinaryOperator::BitwiseXnor => lower_bitwise(Logic::Xnor, lhs, rhs, width, ctx),
        BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Mod => {
            Err(Error::UnsupportedBinaryOperator(op))
        }
    }
}

fn lower_equality(
    op: BinaryOperator,
    lhs: &Expression,
    rhs: &Expression,
    width: u32,
    ctx: &mut Context,
) -> Result<Vector> {
    let operand_width = lhs.width.max(rhs.width);
    let (l, r) = lower_operands(lhs, rhs, operand_width, operand_width, ctx)?;

    ctx.emit(Instruction::Cmp {
        kind: Compare::Unsigned,
        lhs: l.base(),
        rhs: r.base(),
        width: operand_width,
    });
    ctx.release(l);
    ctx.release(r);

    let flag = match op {
        BinaryOperator::Eq | BinaryOperator::NotEq => Flag::Eq,
        _ => Flag::CaseEq,
    };
    if matches!(op, BinaryOperator::NotEq | BinaryOperator::CaseNotEq) {
        ctx.emit(Instruction::Inv {
            dst: flag.address(),
            width: 1,
        })
    }

    Ok(copy_flag(flag, width, ctx))
}

fn lower_relational(
    op: BinaryOperator,
    lhs: &Expression,
    rhs: &Expression,
    width: u32,
    ctx: &mut Context,
) -> Result<Vector> {
    let kind = if lhs.signed && rhs.signed {
        Compare::Signed
    } else {
        Compare::Unsigned
    };
    let operand_width = lhs.width.max(rhs.width);
    let (l, r) = lower_operands(lhs, rhs, operand_width, operand_width, ctx)?;

    // The compare only computes less than, greater than swaps the operands
    let (first, second) = match op {
        BinaryOperator::Lt | BinaryOperator::Le => (l, r),
        _ => (r, l),
    };
    ctx.emit(Instruction::Cmp {
        kind,
        lhs: first.base(),
        rhs: second.base(),
        width: operand_width,
    });
    if matches!(op, BinaryOperator::Le | BinaryOperator::Ge) {
        ctx.emit(Instruction::Logic {
            op: Logic::Or,
            dst: Flag::Lt.address(),
            src: Flag::Eq.address(),
            width: 1,
        })
    }
    ctx.release(l);
    ctx.release(r);

    Ok(copy_flag(Flag::Lt, width, ctx))
}

fn lower_additive(
    op: Arith,
    lhs: &Expression,
    rhs: &Expression,
    width: u32,
    ctx: &mut Context,
) -> Result<Vector> {
    let (l, r) = lower_operands(lhs, rhs, width, width, ctx)?;
    let l = ctx.materialize(l);

    ctx.emit(Instruction::Arith {
        op,
        dst: l.base(),
        src: r.base(),
        width,
    });
    ctx.release(r);
    Ok(l)
}

/// Returns the shift amount, or `None` if everything is shifted out
fn shift_amount(rhs: &Expression, width: u32) -> Result<Option<u32>> {
    let amount = rhs.const_value().ok_or(Error::NonConstantShift)?;
    if amount >= BigUint::from(width) {
        Ok(None)
    } else {
        Ok(amount.to_u32())
    }
}

fn lower_left_shift(
    lhs: &Expression,
    rhs: &Expression,
    width: u32,
    ctx: &mut Context,
) -> Result<Vector> {
    let Some(shift) = shift_amount(rhs, width)? else {
        return Ok(Vector::zero(width));
    };

    let value = lhs.lower(width, ctx)?;
    let result = ctx.allocate(width);
    ctx.emit(Instruction::Mov {
        dst: result.base().offset(shift),
        src: value.base(),
        width: width - shift,
    });
    if shift > 0 {
        ctx.emit(Instruction::Mov {
            dst: result.base(),
            src: Address::constant(Bit::Zero),
            width: shift,
        });
    }
    ctx.release(value);
    Ok(result)
}

fn lower_right_shift(
    lhs: &Expression,
    rhs: &Expression,
    width: u32,
    ctx: &mut Context,
) -> Result<Vector> {
    let Some(shift) = shift_amount(rhs, width)? else {
        return Ok(Vector::zero(width));
    };

    let value = lhs.lower(width, ctx)?;
    match value {
        Vector::Constant { bit: Bit::Zero, .. } => Ok(value),
        Vector::Owned { base, .. } => {
            if shift > 0 {
                ctx.emit(Instruction::Mov {
                    dst: base,
                    src: base.offset(shift),
                    width: width - shift,
                });
                zero_fill(value, width - shift, ctx);
            }
            Ok(value)
        }
        Vector::Constant { .. } | Vector::Flag(_) => {
            let result = ctx.allocate(width);
            ctx.emit(Instruction::Mov {
                dst: result.base(),
                src: value.base(),
                width: width - shift,
            });
            zero_fill(result, width - shift, ctx);
            Ok(result)
        }
    }
}

/// Four-valued `&&` and `||` of two constant bits
fn fold_logical(op: BinaryOperator, l: Bit, r: Bit) -> Bit {
    let (dominant, other) = match op {
        BinaryOperator::LogicalAnd => (Bit::Zero, Bit::One),
        _ => (Bit::One, Bit::Zero),
    };
    if l == dominant || r == dominant {
        dominant
    } else if l == other && r == other {
        other
    } else {
        Bit::X
    }
}

fn lower_logical(
    op: BinaryOperator,
    lhs: &Expression,
    rhs: &Expression,
    width: u32,
    ctx: &mut Context,
) -> Result<Vector> {
    for operand in [lhs, rhs] {
        if operand.width != 1 {
            return Err(Error::WideLogicalOperand {
                op,
                width: operand.width,
            });
        }
    }
    let logic = match op {
        BinaryOperator::LogicalAnd => Logic::And,
        _ => Logic::Or,
    };

    let (l, r) = lower_operands(lhs, rhs, 1, 1, ctx)?;
    let result = match (l.as_constant(), r.as_constant()) {
        (Some(lbit), Some(rbit)) => Vector::Constant {
            bit: fold_logical(op, lbit, rbit),
            width: 1,
        },
        (Some(_), None) => {
            let r = ctx.materialize(r);
            ctx.emit(Instruction::Logic {
                op: logic,
                dst: r.base(),
                src: l.base(),
                width: 1,
            });
            r
        }
        (None, _) => {
            let l = ctx.materialize(l);
            ctx.emit(Instruction::Logic {
                op: logic,
                dst: l.base(),
                src: r.base(),
                width: 1,
            });
            ctx.release(r);
            l
        }
    };

    Ok(ctx.resize(result, width))
}

fn lower_bitwise(
    op: Logic,
    lhs: &Expression,
    rhs: &Expression,
    width: u32,
    ctx: &mut Context,
) -> Result<Vector> {
    let (mut l, mut r) = lower_operands(lhs, rhs, width, width, ctx)?;

    // All of these operators commute, so the result can be built in whichever
    // operand already owns its bits
    if !l.is_owned() {
        if r.is_owned() {
            std::mem::swap(&mut l, &mut r);
        } else {
            l = ctx.materialize(l);
        }
    }

    ctx.emit(Instruction::Logic {
        op,
        dst: l.base(),
        src: r.base(),
        width,
    });
    ctx.release(r);
    Ok(l)
}

/// Arguments are passed by writing them into the input ports of the function
/// before starting its thread. The result is read back from the result port.
fn lower_function_call(
    function: ScopeId,
    args: &[Expression],
    width: u32,
    ctx: &mut Context,
) -> Result<Vector> {
    let design = ctx.design;
    let scope = design.scope(function);

    let Some((result_port, inputs)) = scope.ports.split_first() else {
        return Err(Error::MissingResultPort(scope.name.clone()));
    };
    if inputs.len() != args.len() {
        return Err(Error::ArgumentCount {
            function: scope.name.clone(),
            expected: inputs.len(),
            got: args.len(),
        });
    }

    for (arg, port) in args.iter().zip(inputs) {
        let port = design.signal(*port);
        let value = arg.lower(port.width, ctx)?;
        for bit in 0..port.width {
            ctx.emit(Instruction::Set {
                signal: port.name.clone(),
                bit,
                src: value.bit(bit),
            })
        }
        ctx.release(value);
    }

    ctx.emit(Instruction::Fork {
        target: ForkTarget::Definition(scope.name.clone()),
        scope: scope.name.clone(),
    });
    ctx.emit(Instruction::Join);

    let result_signal = design.signal(*result_port);
    Ok(lower_signal(
        *result_port,
        result_signal.width,
        width,
        ctx,
    ))
}
