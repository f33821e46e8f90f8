pub mod alloc;
pub mod emit;
pub mod error;
pub mod expression;
pub mod id_tracker;
pub mod statement;
#[cfg(test)]
mod testutil;
pub mod vector;

use tracing::debug;
use vvp_ir::{Bit, Design, Process, ProcessKind, ScopeId, ScopeKind};

use crate::alloc::BitAllocator;
use crate::emit::{Emitter, Instruction, Label, Line, Program};
use crate::id_tracker::{LabelTracker, ThreadIdTracker};
use crate::vector::{Address, Vector};

pub use crate::error::{Diagnostic, Error, Result};
pub use crate::expression::lower_expression;
pub use crate::statement::lower_statement;

/// Everything that is shared between the lowering of individual expressions and
/// statements: the bit allocator, the output and the label counters.
pub struct Context<'a> {
    pub design: &'a Design,
    pub alloc: BitAllocator,
    pub out: Emitter,
    threads: ThreadIdTracker,
    labels: LabelTracker,
}

impl<'a> Context<'a> {
    pub fn new(design: &'a Design) -> Self {
        Self {
            design,
            alloc: BitAllocator::new(),
            out: Emitter::new(),
            threads: ThreadIdTracker::new(),
            labels: LabelTracker::new(0),
        }
    }

    pub fn emit(&mut self, inst: Instruction) {
        self.out.instruction(inst)
    }

    pub fn place_label(&mut self, label: Label) {
        self.out.label(label)
    }

    pub fn next_label(&mut self) -> Label {
        self.labels.next()
    }

    pub fn next_labels(&mut self, count: usize) -> Vec<Label> {
        self.labels.next_n(count)
    }

    pub fn allocate(&mut self, width: u32) -> Vector {
        self.alloc.allocate(width)
    }

    pub fn release(&mut self, vector: Vector) {
        self.alloc.release(vector)
    }

    /// Ensures that the value lives in allocated bits so that it can be modified in
    /// place. Constants and flags are copied into a fresh vector
    pub fn materialize(&mut self, vector: Vector) -> Vector {
        if vector.is_owned() {
            return vector;
        }
        let result = self.allocate(vector.width());
        self.emit(Instruction::Mov {
            dst: result.base(),
            src: vector.base(),
            width: vector.width(),
        });
        result
    }

    /// Truncates or zero extends `vector` to exactly `width` bits
    pub fn resize(&mut self, vector: Vector, width: u32) -> Vector {
        let current = vector.width();
        if current == width {
            return vector;
        }

        match vector {
            Vector::Constant { bit, .. } if current > width || bit == Bit::Zero => {
                Vector::Constant { bit, width }
            }
            Vector::Owned { base, .. } if current > width => {
                self.release(Vector::Owned {
                    base: base.offset(width),
                    width: current - width,
                });
                Vector::Owned { base, width }
            }
            _ => {
                let result = self.allocate(width);
                let copied = current.min(width);
                self.emit(Instruction::Mov {
                    dst: result.base(),
                    src: vector.base(),
                    width: copied,
                });
                self.emit(Instruction::Mov {
                    dst: result.base().offset(copied),
                    src: Address::constant(Bit::Zero),
                    width: width - copied,
                });
                if vector.is_owned() {
                    self.release(vector);
                }
                result
            }
        }
    }

    /// Starts the body of a new thread. Local labels restart from 0
    fn begin_thread_body(&mut self) -> u32 {
        let thread = self.threads.current();
        self.labels = LabelTracker::new(thread);
        thread
    }

    fn end_thread_body(&mut self) {
        self.out.end_thread_body();
        self.threads.advance();
    }

    pub fn finish(self) -> Program {
        self.out.finish()
    }
}

/// Generates the thread for an `initial` or `always` process. `initial` threads end
/// after one pass through the body, `always` threads jump back to the start.
#[tracing::instrument(level = "debug", skip_all, fields(scope = process.scope.0))]
pub fn lower_process(process: &Process, ctx: &mut Context) -> Vec<Diagnostic> {
    let design = ctx.design;
    let scope = design.scope(process.scope);

    let thread = ctx.begin_thread_body();
    debug!("Lowering {:?} process in {} as thread {thread}", process.kind, scope.name);

    ctx.out.line(Line::ScopeDirective(scope.name.clone()));
    ctx.out.line(Line::ThreadEntry(thread));

    let diags = lower_statement(&process.body, process.scope, ctx);

    match process.kind {
        ProcessKind::Initial => ctx.emit(Instruction::End),
        ProcessKind::Always => ctx.emit(Instruction::JmpEntry(thread)),
    }
    ctx.out.line(Line::ThreadDirective(thread));

    ctx.end_thread_body();
    diags
}

/// Generates the body of a task. Callers start it with `%fork TD_<task>` and wait
/// for it with `%join`
pub fn lower_task_definition(scope: ScopeId, ctx: &mut Context) -> Vec<Diagnostic> {
    lower_subroutine(scope, ctx)
}

/// Generates the body of a function. The function leaves its result in its first
/// port where the caller picks it up after the `%join`
pub fn lower_function_definition(scope: ScopeId, ctx: &mut Context) -> Vec<Diagnostic> {
    lower_subroutine(scope, ctx)
}

#[tracing::instrument(level = "debug", skip_all, fields(scope = scope_id.0))]
fn lower_subroutine(scope_id: ScopeId, ctx: &mut Context) -> Vec<Diagnostic> {
    let design = ctx.design;
    let scope = design.scope(scope_id);

    let Some(body) = &scope.definition else {
        return vec![Diagnostic::new(
            scope.name.clone(),
            Error::MissingDefinition(scope.name.clone()),
        )];
    };

    let thread = ctx.begin_thread_body();
    debug!("Lowering definition of {} as thread {thread}", scope.name);

    ctx.out.line(Line::DefinitionEntry(scope.name.clone()));
    let diags = lower_statement(body, scope_id, ctx);
    ctx.emit(Instruction::End);

    ctx.end_thread_body();
    diags
}

/// Generates the code of every task, function and process of the design. Returns
/// every diagnostic found if any construct could not be lowered.
#[tracing::instrument(level = "debug", skip_all)]
pub fn lower_design(design: &Design) -> std::result::Result<Program, Vec<Diagnostic>> {
    let mut ctx = Context::new(design);
    let mut diags = vec![];

    for scope in design.scope_ids() {
        match design.scope(scope).kind {
            ScopeKind::Task => diags.extend(lower_task_definition(scope, &mut ctx)),
            ScopeKind::Function => diags.extend(lower_function_definition(scope, &mut ctx)),
            ScopeKind::Module | ScopeKind::Begin | ScopeKind::Fork => {}
        }
    }

    for process in &design.processes {
        diags.extend(lower_process(process, &mut ctx))
    }

    if diags.is_empty() {
        Ok(ctx.finish())
    } else {
        Err(diags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_same_code;
    use crate::testutil::{init_logging, TestDesign};
    use colored::Colorize;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use vvp_ir::{Expression, Lvalue, Statement};

    #[test]
    fn resize_pads_owned_vectors_with_zeros() {
        let design = Design::new();
        let mut ctx = Context::new(&design);
        let v = ctx.allocate(1);
        let wide = ctx.resize(v, 4);

        assert_eq!(
            wide,
            Vector::Owned {
                base: Address(9),
                width: 4
            }
        );
        assert!(!ctx.alloc.is_occupied(Address(8)));
        assert_same_code!(
            &ctx.finish().to_string(),
            "    %mov 9, 8, 1;\n    %mov 10, 0, 3;\n"
        );
    }

    #[test]
    fn resize_truncates_in_place() {
        let design = Design::new();
        let mut ctx = Context::new(&design);
        let v = ctx.allocate(4);
        let narrow = ctx.resize(v, 2);

        assert_eq!(
            narrow,
            Vector::Owned {
                base: Address(8),
                width: 2
            }
        );
        assert_eq!(ctx.alloc.live_bits(), 2);
        assert!(ctx.finish().lines.is_empty());
    }

    #[test]
    fn resize_of_zero_constant_is_free() {
        let design = Design::new();
        let mut ctx = Context::new(&design);
        assert_eq!(ctx.resize(Vector::zero(1), 8), Vector::zero(8));
        assert!(ctx.finish().lines.is_empty());
    }

    #[test]
    fn initial_process_ends_and_always_process_loops() {
        init_logging();
        let mut t = TestDesign::new();
        let x = t.signal("x", 1);
        t.design.add_process(
            ProcessKind::Initial,
            t.top,
            Statement::assign(Lvalue::signal(x, 1), Expression::number_str("1")),
        );
        t.design.add_process(
            ProcessKind::Always,
            t.top,
            Statement::delay(5, Statement::Noop),
        );

        let program = lower_design(&t.design).unwrap();

        let expected = indoc! {"
                .scope S_top;
            T_0 ;
                %set V_top.x[0], 1;
                %end;
                .thread T_0;
                .scope S_top;
            T_1 ;
                %delay 5;
                %jmp T_1;
                .thread T_1;
        "};
        assert_same_code!(&program.to_string(), expected);
    }

    #[test]
    fn clock_generator_from_a_ron_dump() {
        let dump = r#"(
            signals: [(name: "top.clk", width: 1, signed: false)],
            scopes: [(name: "top", kind: Module, ports: [], definition: None)],
            events: [],
            processes: [(
                kind: Always,
                scope: 0,
                body: Delay(
                    amount: 5,
                    body: AssignNb(
                        lvals: [(pins: [(ptrs: [(signal: Some(0), pin: 0)])], mux: None)],
                        rval: (
                            kind: Unary(
                                op: BitwiseNot,
                                operand: (kind: Signal(0), width: 1, signed: false),
                            ),
                            width: 1,
                            signed: false,
                        ),
                        delay: None,
                    ),
                ),
            )],
        )"#;
        let design: Design = ron::from_str(dump).unwrap();

        let program = lower_design(&design).unwrap();

        let expected = indoc! {"
                .scope S_top;
            T_0 ;
                %delay 5;
                %load  8, V_top.clk[0];
                %inv 8, 1;
                %assign V_top.clk[0], 0, 8;
                %jmp T_0;
                .thread T_0;
        "};
        assert_same_code!(&program.to_string(), expected);
    }

    #[test]
    fn labels_restart_for_every_thread_body() {
        let mut t = TestDesign::new();
        let x = t.signal("x", 1);
        let body = || {
            Statement::condit(
                Expression::signal(x, 1),
                Statement::Noop,
                Some(Statement::Noop),
            )
        };
        t.design.add_process(ProcessKind::Initial, t.top, body());
        t.design.add_process(ProcessKind::Initial, t.top, body());

        let program = lower_design(&t.design).unwrap();

        assert_eq!(
            program.labels().map(|l| l.to_string()).collect::<Vec<_>>(),
            vec!["T_0.0", "T_0.1", "T_1.0", "T_1.1"]
        );
    }

    #[test]
    fn tasks_and_functions_get_their_own_threads() {
        let mut t = TestDesign::new();
        let out = t.signal("out", 1);
        let task = t.task("top.pulse", Statement::delay(1, Statement::Noop));
        let result = t.signal("inv.inv", 1);
        let arg = t.signal("inv.a", 1);
        let function = t.function(
            "top.inv",
            vec![result, arg],
            Statement::assign(
                Lvalue::signal(result, 1),
                Expression::unary(
                    vvp_ir::UnaryOperator::BitwiseNot,
                    Expression::signal(arg, 1),
                    1,
                ),
            ),
        );
        t.design.add_process(
            ProcessKind::Initial,
            t.top,
            Statement::Block(vec![
                Statement::UserTask(task),
                Statement::assign(
                    Lvalue::signal(out, 1),
                    Expression::call(function, vec![Expression::signal(out, 1)], 1),
                ),
            ]),
        );

        let program = lower_design(&t.design).unwrap();

        let expected = indoc! {"
            TD_top.pulse ;
                %delay 1;
                %end;
            TD_top.inv ;
                %load  8, V_top.inv.a[0];
                %inv 8, 1;
                %set V_top.inv.inv[0], 8;
                %end;
                .scope S_top;
            T_2 ;
                %fork TD_top.pulse, S_top.pulse;
                %join;
                %load  8, V_top.out[0];
                %set V_top.inv.a[0], 8;
                %fork TD_top.inv, S_top.inv;
                %join;
                %load  8, V_top.inv.inv[0];
                %set V_top.out[0], 8;
                %end;
                .thread T_2;
        "};
        assert_same_code!(&program.to_string(), expected);
    }

    #[test]
    fn missing_definitions_are_reported() {
        let mut t = TestDesign::new();
        t.design.add_scope("top.empty", ScopeKind::Task);

        let diags = lower_design(&t.design).unwrap_err();

        assert_eq!(
            diags,
            vec![Diagnostic::new(
                "top.empty",
                Error::MissingDefinition("top.empty".to_string())
            )]
        );
    }

    #[test]
    fn every_unsupported_construct_is_reported_in_one_pass() {
        let mut t = TestDesign::new();
        let a = t.signal("a", 4);
        let b = t.signal("b", 4);
        t.design.add_process(
            ProcessKind::Initial,
            t.top,
            Statement::Block(vec![
                Statement::assign(
                    Lvalue::signal(a, 4),
                    Expression::binary(
                        vvp_ir::BinaryOperator::Mul,
                        Expression::signal(a, 4),
                        Expression::signal(b, 4),
                        4,
                    ),
                ),
                Statement::Assign {
                    lvals: vec![Lvalue::signal(a, 4), Lvalue::signal(b, 4)],
                    rval: Expression::signal(b, 8),
                },
                Statement::assign(Lvalue::signal(b, 4), Expression::signal(a, 4)),
            ]),
        );

        let diags = lower_design(&t.design).unwrap_err();

        assert_eq!(
            diags.iter().map(|d| d.error.clone()).collect::<Vec<_>>(),
            vec![
                Error::UnsupportedBinaryOperator(vvp_ir::BinaryOperator::Mul),
                Error::MultipleLvalues(2)
            ]
        );
    }
}
