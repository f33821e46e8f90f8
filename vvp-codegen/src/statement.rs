use local_impl::local_impl;
use num::ToPrimitive;
use tracing::{trace, warn};
use vvp_ir::expression::format_bits;
use vvp_ir::{
    Bit, CaseItem, CaseKind, Design, ExprKind, Expression, Lvalue, Nexus, ScopeId, Statement,
};

use crate::emit::{Arith, Compare, ForkTarget, Instruction};
use crate::error::{Diagnostic, Error, Result};
use crate::expression::{lower_condition, lower_expression};
use crate::vector::{Address, Flag};
use crate::Context;

/// Lowers a statement of `scope` and everything nested in it.
///
/// A statement which can not be lowered is skipped and reported. Lowering carries
/// on with the remaining statements so that every problem is reported at once.
pub fn lower_statement(stmt: &Statement, scope: ScopeId, ctx: &mut Context) -> Vec<Diagnostic> {
    stmt.lower(scope, ctx)
}

#[local_impl]
impl StatementLocal for Statement {
    fn lower(&self, scope: ScopeId, ctx: &mut Context) -> Vec<Diagnostic> {
        let _span = tracing::trace_span!("statement", kind = self.kind_name()).entered();

        let mut diags = vec![];
        let result = match self {
            Statement::Assign { lvals, rval } => lower_assign(lvals, rval, Write::Blocking, ctx),
            Statement::AssignNb { lvals, rval, delay } => nonblocking_delay(delay.as_ref())
                .and_then(|delay| lower_assign(lvals, rval, Write::NonBlocking(delay), ctx)),
            Statement::Block(stmts) => {
                for stmt in stmts {
                    diags.extend(stmt.lower(scope, ctx))
                }
                Ok(())
            }
            Statement::Case {
                kind,
                selector,
                items,
            } => {
                lower_case(*kind, selector, items, scope, ctx, &mut diags);
                Ok(())
            }
            Statement::Condit {
                cond,
                if_true,
                if_false,
            } => {
                lower_condit(cond, if_true, if_false.as_deref(), scope, ctx, &mut diags);
                Ok(())
            }
            Statement::Delay { amount, body } => {
                ctx.emit(Instruction::Delay(*amount));
                diags.extend(body.lower(scope, ctx));
                Ok(())
            }
            Statement::Disable(target) => {
                ctx.emit(Instruction::Disable(ctx.design.scope(*target).name.clone()));
                Ok(())
            }
            Statement::Forever(body) => {
                let top = ctx.next_label();
                ctx.place_label(top);
                diags.extend(body.lower(scope, ctx));
                ctx.emit(Instruction::Jmp(top));
                Ok(())
            }
            Statement::Fork(children) => {
                lower_fork(children, scope, ctx, &mut diags);
                Ok(())
            }
            Statement::Noop => Ok(()),
            Statement::Procedural { kind, .. } => Err(Error::UnsupportedProcedural(*kind)),
            Statement::Repeat { count, body } => {
                lower_repeat(count, body, scope, ctx, &mut diags);
                Ok(())
            }
            Statement::SystemTask { name, params } => {
                let args = params
                    .iter()
                    .map(|param| vpi_argument(param, ctx.design))
                    .collect();
                ctx.emit(Instruction::VpiCall {
                    name: name.clone(),
                    args,
                });
                Ok(())
            }
            Statement::Trigger(event) => {
                ctx.emit(Instruction::Trigger(ctx.design.event(*event).name.clone()));
                Ok(())
            }
            Statement::UserTask(task) => {
                let name = ctx.design.scope(*task).name.clone();
                ctx.emit(Instruction::Fork {
                    target: ForkTarget::Definition(name.clone()),
                    scope: name,
                });
                ctx.emit(Instruction::Join);
                Ok(())
            }
            Statement::Wait { event, body } => {
                ctx.emit(Instruction::Wait(ctx.design.event(*event).name.clone()));
                diags.extend(body.lower(scope, ctx));
                Ok(())
            }
            Statement::While { cond, body } => {
                lower_while(cond, body, scope, ctx, &mut diags);
                Ok(())
            }
        };

        if let Err(error) = result {
            trace!("Skipping {}: {error}", self.kind_name());
            report(error, scope, ctx, &mut diags);
        }
        diags
    }
}

fn report(error: Error, scope: ScopeId, ctx: &Context, diags: &mut Vec<Diagnostic>) {
    diags.push(Diagnostic::new(ctx.design.scope(scope).name.clone(), error))
}

/// Lowers the children of a compound statement whose own expression failed. The
/// code is never used but the children may still have problems to report.
fn lower_orphans<'s>(
    children: impl IntoIterator<Item = &'s Statement>,
    scope: ScopeId,
    ctx: &mut Context,
    diags: &mut Vec<Diagnostic>,
) {
    for child in children {
        diags.extend(child.lower(scope, ctx))
    }
}

#[derive(Clone, Copy)]
enum Write {
    Blocking,
    /// Scheduled the specified number of time units in the future
    NonBlocking(u64),
}

fn nonblocking_delay(delay: Option<&Expression>) -> Result<u64> {
    match delay {
        None => Ok(0),
        Some(delay) => delay
            .const_value()
            .and_then(|value| value.to_u64())
            .ok_or(Error::NonConstantDelay),
    }
}

fn single_lvalue(lvals: &[Lvalue]) -> Result<&Lvalue> {
    match lvals {
        [lval] if lval.mux.is_some() => Err(Error::MuxLvalue),
        [lval] => Ok(lval),
        _ => Err(Error::MultipleLvalues(lvals.len())),
    }
}

/// Writes `src` to every signal bit connected to `nexus`
fn write_bit(nexus: &Nexus, src: Address, write: Write, ctx: &mut Context) {
    let design = ctx.design;
    for (signal, bit) in nexus.signal_bits() {
        let signal = design.signal(signal).name.clone();
        ctx.emit(match write {
            Write::Blocking => Instruction::Set { signal, bit, src },
            Write::NonBlocking(delay) => Instruction::Assign {
                signal,
                bit,
                delay,
                src,
            },
        })
    }
}

fn lower_assign(lvals: &[Lvalue], rval: &Expression, write: Write, ctx: &mut Context) -> Result<()> {
    let lval = single_lvalue(lvals)?;

    // Literal bits are written straight from the constant addresses
    if let ExprKind::Number(bits) = &rval.kind {
        for (idx, nexus) in lval.pins.iter().enumerate() {
            let bit = bits.get(idx).copied().unwrap_or(Bit::Zero);
            write_bit(nexus, Address::constant(bit), write, ctx)
        }
        return Ok(());
    }

    let value = lower_expression(rval, rval.width, ctx)?;
    for (idx, nexus) in (0..).zip(&lval.pins) {
        let src = if idx < value.width() {
            value.bit(idx)
        } else {
            Address::constant(Bit::Zero)
        };
        write_bit(nexus, src, write, ctx)
    }
    ctx.release(value);
    Ok(())
}

/// The compare used to match a case item, and the flag which is set on a match
fn case_compare(kind: CaseKind) -> (Compare, Flag) {
    match kind {
        CaseKind::Case => (Compare::Unsigned, Flag::CaseEq),
        CaseKind::CaseX => (Compare::DontCareX, Flag::Eq),
        CaseKind::CaseZ => (Compare::DontCareZ, Flag::Eq),
    }
}

/// Case statements are lowered into a table of compares and conditional jumps,
/// followed by the default item and then the bodies of the other items.
fn lower_case(
    kind: CaseKind,
    selector: &Expression,
    items: &[CaseItem],
    scope: ScopeId,
    ctx: &mut Context,
    diags: &mut Vec<Diagnostic>,
) {
    let selector = match lower_expression(selector, selector.width, ctx) {
        Ok(selector) => selector,
        Err(error) => {
            report(error, scope, ctx, diags);
            lower_orphans(items.iter().map(|item| &item.body), scope, ctx, diags);
            return;
        }
    };
    let labels = ctx.next_labels(items.len() + 1);
    let exit = labels[items.len()];
    let (compare, flag) = case_compare(kind);

    let mut default = None;
    for (idx, item) in items.iter().enumerate() {
        let Some(guard) = &item.guard else {
            default = default.or(Some(idx));
            continue;
        };

        let guard = match lower_expression(guard, selector.width(), ctx) {
            Ok(guard) => guard,
            Err(error) => {
                // The item can never be selected but the rest of the table is fine
                report(error, scope, ctx, diags);
                continue;
            }
        };
        ctx.emit(Instruction::Cmp {
            kind: compare,
            lhs: selector.base(),
            rhs: guard.base(),
            width: selector.width(),
        });
        ctx.emit(Instruction::JmpIfOne {
            target: labels[idx],
            bit: flag.address(),
        });
        ctx.release(guard);
    }
    ctx.release(selector);

    if let Some(default) = default {
        diags.extend(items[default].body.lower(scope, ctx));
    }
    ctx.emit(Instruction::Jmp(exit));

    for (idx, item) in items.iter().enumerate() {
        if Some(idx) == default {
            continue;
        }
        ctx.place_label(labels[idx]);
        diags.extend(item.body.lower(scope, ctx));
        ctx.emit(Instruction::Jmp(exit));
    }

    ctx.place_label(exit);
}

fn lower_condit(
    cond: &Expression,
    if_true: &Statement,
    if_false: Option<&Statement>,
    scope: ScopeId,
    ctx: &mut Context,
    diags: &mut Vec<Diagnostic>,
) {
    let cond = match lower_condition(cond, ctx) {
        Ok(cond) => cond,
        Err(error) => {
            report(error, scope, ctx, diags);
            lower_orphans(std::iter::once(if_true).chain(if_false), scope, ctx, diags);
            return;
        }
    };
    let false_label = ctx.next_label();
    let out_label = ctx.next_label();

    ctx.emit(Instruction::JmpIfNotOne {
        target: false_label,
        bit: cond.base(),
    });
    ctx.release(cond);

    diags.extend(if_true.lower(scope, ctx));

    match if_false {
        Some(if_false) => {
            ctx.emit(Instruction::Jmp(out_label));
            ctx.place_label(false_label);
            diags.extend(if_false.lower(scope, ctx));
            ctx.place_label(out_label);
        }
        None => ctx.place_label(false_label),
    }
}

/// All but the last child are started as new threads in the current scope. The
/// last child runs inline in the current thread before joining the others.
fn lower_fork(
    children: &[Statement],
    scope: ScopeId,
    ctx: &mut Context,
    diags: &mut Vec<Diagnostic>,
) {
    let Some((inline, forked)) = children.split_last() else {
        return;
    };
    if forked.is_empty() {
        diags.extend(inline.lower(scope, ctx));
        return;
    }

    let out = ctx.next_label();
    let labels = ctx.next_labels(forked.len());
    let scope_name = ctx.design.scope(scope).name.clone();

    for label in &labels {
        ctx.emit(Instruction::Fork {
            target: ForkTarget::Label(*label),
            scope: scope_name.clone(),
        })
    }
    diags.extend(inline.lower(scope, ctx));
    for _ in forked {
        ctx.emit(Instruction::Join)
    }
    ctx.emit(Instruction::Jmp(out));

    for (label, child) in labels.into_iter().zip(forked) {
        ctx.place_label(label);
        diags.extend(child.lower(scope, ctx));
        ctx.emit(Instruction::End);
    }
    ctx.place_label(out);
}

/// The counter is tested against zero and decremented before each pass through
/// the body
fn lower_repeat(
    count: &Expression,
    body: &Statement,
    scope: ScopeId,
    ctx: &mut Context,
    diags: &mut Vec<Diagnostic>,
) {
    let counter = match lower_expression(count, count.width, ctx) {
        Ok(counter) => counter,
        Err(error) => {
            report(error, scope, ctx, diags);
            lower_orphans([body], scope, ctx, diags);
            return;
        }
    };
    let top = ctx.next_label();
    let out = ctx.next_label();
    let counter = ctx.materialize(counter);

    ctx.place_label(top);
    ctx.emit(Instruction::Cmp {
        kind: Compare::Unsigned,
        lhs: Address::constant(Bit::Zero),
        rhs: counter.base(),
        width: counter.width(),
    });
    ctx.emit(Instruction::JmpIfNotOne {
        target: out,
        bit: Flag::Lt.address(),
    });
    // Adding all ones subtracts one
    ctx.emit(Instruction::Arith {
        op: Arith::Add,
        dst: counter.base(),
        src: Address::constant(Bit::One),
        width: counter.width(),
    });

    diags.extend(body.lower(scope, ctx));

    ctx.emit(Instruction::Jmp(top));
    ctx.place_label(out);
    ctx.release(counter);
}

fn lower_while(
    cond: &Expression,
    body: &Statement,
    scope: ScopeId,
    ctx: &mut Context,
    diags: &mut Vec<Diagnostic>,
) {
    let top = ctx.next_label();
    let out = ctx.next_label();

    ctx.place_label(top);
    let cond = match lower_condition(cond, ctx) {
        Ok(cond) => cond,
        Err(error) => {
            report(error, scope, ctx, diags);
            lower_orphans([body], scope, ctx, diags);
            return;
        }
    };
    ctx.emit(Instruction::JmpIfNotOne {
        target: out,
        bit: cond.base(),
    });
    ctx.release(cond);

    diags.extend(body.lower(scope, ctx));

    ctx.emit(Instruction::Jmp(top));
    ctx.place_label(out);
}

/// The textual form of a system task argument
fn vpi_argument(param: &Expression, design: &Design) -> String {
    match &param.kind {
        ExprKind::Number(bits) => {
            let bits = (0..param.width as usize)
                .map(|idx| bits.get(idx).copied().unwrap_or(Bit::Zero))
                .collect::<Vec<_>>();
            format!("{}'b{}", param.width, format_bits(&bits))
        }
        ExprKind::Signal(signal) => format!("V_{}", design.signal(*signal).name),
        ExprKind::String(s) => format!("\"{s}\""),
        ExprKind::Scope(scope) => format!("S_{}", design.scope(*scope).name),
        ExprKind::SystemFunction(name) if name == "$time" => name.clone(),
        _ => {
            warn!(
                "Unsupported {} passed to a system task, passing ? instead",
                param.kind_name()
            );
            "?".to_string()
        }
    }
}
