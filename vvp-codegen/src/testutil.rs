use vvp_ir::{Design, EventId, Expression, ScopeId, ScopeKind, SignalId, Statement};

use crate::error::{Diagnostic, Result};
use crate::vector::Vector;
use crate::Context;

#[macro_export]
macro_rules! assert_same_code {
    ($got:expr, $expected:expr) => {
        let (got, expected) = ($got, $expected);
        if got != expected {
            println!("{}:\n{}", "got".red(), got);
            println!("{}", "==============================================".red());
            println!("{}:\n{}", "expected".green(), expected);
            println!("{}", "==============================================".red());
            println!("{}", prettydiff::diff_chars(got, expected));
            println!("{}", "==============================================".red());
            panic!("Code mismatch")
        }
    };
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A design with a single module scope called `top` that tests add signals to
pub struct TestDesign {
    pub design: Design,
    pub top: ScopeId,
}

impl TestDesign {
    pub fn new() -> Self {
        let mut design = Design::new();
        let top = design.add_scope("top", ScopeKind::Module);
        Self { design, top }
    }

    pub fn signal(&mut self, name: &str, width: u32) -> SignalId {
        self.design.add_signal(format!("top.{name}"), width)
    }

    pub fn signed_signal(&mut self, name: &str, width: u32) -> SignalId {
        self.design.add_signed_signal(format!("top.{name}"), width)
    }

    pub fn event(&mut self, name: &str) -> EventId {
        self.design.add_event(format!("top.{name}"))
    }

    pub fn task(&mut self, name: &str, body: Statement) -> ScopeId {
        self.design
            .add_subroutine(name, ScopeKind::Task, vec![], body)
    }

    pub fn function(&mut self, name: &str, ports: Vec<SignalId>, body: Statement) -> ScopeId {
        self.design
            .add_subroutine(name, ScopeKind::Function, ports, body)
    }
}

/// Lowers `expr` at `width` bits and returns the result together with the context
/// so that tests can inspect both the code and the allocator
pub fn lower_value<'a>(
    design: &'a Design,
    expr: &Expression,
    width: u32,
) -> (Result<Vector>, Context<'a>) {
    let mut ctx = Context::new(design);
    let result = crate::lower_expression(expr, width, &mut ctx);
    (result, ctx)
}

/// Lowers a statement as the body of thread 0 and checks that no bits were leaked
pub fn lower_body(design: &Design, scope: ScopeId, stmt: &Statement) -> (String, Vec<Diagnostic>) {
    let mut ctx = Context::new(design);
    let diags = crate::lower_statement(stmt, scope, &mut ctx);
    assert_eq!(ctx.alloc.live_bits(), 0, "Statement lowering leaked bits");
    ctx.out.end_thread_body();
    (ctx.finish().to_string(), diags)
}

pub fn code(ctx: Context) -> String {
    ctx.finish().to_string()
}

/// Indents every line like an instruction. Lets expected code without labels be
/// written with `indoc!`
pub fn indent(code: &str) -> String {
    code.lines().map(|line| format!("    {line}\n")).collect()
}
