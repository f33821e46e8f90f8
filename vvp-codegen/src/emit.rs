use std::collections::BTreeSet;

use itertools::Itertools;

use crate::vector::Address;

/// A jump target inside a thread body
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Label {
    pub thread: u32,
    pub local: u32,
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T_{}.{}", self.thread, self.local)
    }
}

/// Code addresses a `%fork` can start a thread at
#[derive(Clone, PartialEq, Debug)]
pub enum ForkTarget {
    Label(Label),
    /// The entry of a task or function definition
    Definition(String),
}

impl std::fmt::Display for ForkTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForkTarget::Label(label) => write!(f, "{label}"),
            ForkTarget::Definition(scope) => write!(f, "TD_{scope}"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Compare {
    Unsigned,
    Signed,
    /// x and z bits match anything
    DontCareX,
    /// z bits match anything
    DontCareZ,
}

impl std::fmt::Display for Compare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compare::Unsigned => write!(f, "u"),
            Compare::Signed => write!(f, "s"),
            Compare::DontCareX => write!(f, "x"),
            Compare::DontCareZ => write!(f, "z"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Logic {
    And,
    Or,
    Xor,
    Xnor,
}

impl std::fmt::Display for Logic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Logic::And => write!(f, "and"),
            Logic::Or => write!(f, "or"),
            Logic::Xor => write!(f, "xor"),
            Logic::Xnor => write!(f, "xnor"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Arith {
    Add,
    Sub,
}

impl std::fmt::Display for Arith {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arith::Add => write!(f, "add"),
            Arith::Sub => write!(f, "sub"),
        }
    }
}

/// A bit vector reduced into a single bit
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Reduce {
    Or,
    Nor,
}

impl std::fmt::Display for Reduce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reduce::Or => write!(f, "or/r"),
            Reduce::Nor => write!(f, "nor/r"),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum Instruction {
    Mov {
        dst: Address,
        src: Address,
        width: u32,
    },
    Load {
        dst: Address,
        signal: String,
        bit: u32,
    },
    Set {
        signal: String,
        bit: u32,
        src: Address,
    },
    /// Non-blocking write scheduled `delay` time units in the future
    Assign {
        signal: String,
        bit: u32,
        delay: u64,
        src: Address,
    },
    Cmp {
        kind: Compare,
        lhs: Address,
        rhs: Address,
        width: u32,
    },
    Inv {
        dst: Address,
        width: u32,
    },
    Logic {
        op: Logic,
        dst: Address,
        src: Address,
        width: u32,
    },
    Arith {
        op: Arith,
        dst: Address,
        src: Address,
        width: u32,
    },
    Reduce {
        op: Reduce,
        dst: Address,
        src: Address,
        width: u32,
    },
    Jmp(Label),
    /// Jump back to the entry of a process thread
    JmpEntry(u32),
    /// Jump if the bit is 1
    JmpIfOne {
        target: Label,
        bit: Address,
    },
    /// Jump if the bit is 0, x or z
    JmpIfNotOne {
        target: Label,
        bit: Address,
    },
    Fork {
        target: ForkTarget,
        scope: String,
    },
    Join,
    End,
    Delay(u64),
    Disable(String),
    Wait(String),
    Trigger(String),
    VpiCall {
        name: String,
        args: Vec<String>,
    },
}

impl Instruction {
    /// The labels this instruction may transfer control to
    pub fn jump_target(&self) -> Option<Label> {
        match self {
            Instruction::Jmp(target)
            | Instruction::JmpIfOne { target, .. }
            | Instruction::JmpIfNotOne { target, .. } => Some(*target),
            Instruction::Fork {
                target: ForkTarget::Label(target),
                ..
            } => Some(*target),
            _ => None,
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Mov { dst, src, width } => write!(f, "%mov {dst}, {src}, {width};"),
            Instruction::Load { dst, signal, bit } => write!(f, "%load  {dst}, V_{signal}[{bit}];"),
            Instruction::Set { signal, bit, src } => write!(f, "%set V_{signal}[{bit}], {src};"),
            Instruction::Assign {
                signal,
                bit,
                delay,
                src,
            } => write!(f, "%assign V_{signal}[{bit}], {delay}, {src};"),
            Instruction::Cmp {
                kind,
                lhs,
                rhs,
                width,
            } => write!(f, "%cmp/{kind} {lhs}, {rhs}, {width};"),
            Instruction::Inv { dst, width } => write!(f, "%inv {dst}, {width};"),
            Instruction::Logic {
                op,
                dst,
                src,
                width,
            } => write!(f, "%{op} {dst}, {src}, {width};"),
            Instruction::Arith {
                op,
                dst,
                src,
                width,
            } => write!(f, "%{op} {dst}, {src}, {width};"),
            Instruction::Reduce {
                op,
                dst,
                src,
                width,
            } => write!(f, "%{op} {dst}, {src}, {width};"),
            Instruction::Jmp(target) => write!(f, "%jmp {target};"),
            Instruction::JmpEntry(thread) => write!(f, "%jmp T_{thread};"),
            Instruction::JmpIfOne { target, bit } => write!(f, "%jmp/1 {target}, {bit};"),
            Instruction::JmpIfNotOne { target, bit } => write!(f, "%jmp/0xz {target}, {bit};"),
            Instruction::Fork { target, scope } => write!(f, "%fork {target}, S_{scope};"),
            Instruction::Join => write!(f, "%join;"),
            Instruction::End => write!(f, "%end;"),
            Instruction::Delay(amount) => write!(f, "%delay {amount};"),
            Instruction::Disable(scope) => write!(f, "%disable S_{scope};"),
            Instruction::Wait(event) => write!(f, "%wait E_{event};"),
            Instruction::Trigger(event) => write!(f, "%set E_{event}, 0;"),
            Instruction::VpiCall { name, args } => {
                if args.is_empty() {
                    write!(f, "%vpi_call \"{name}\";")
                } else {
                    write!(f, "%vpi_call \"{name}\", {};", args.iter().join(", "))
                }
            }
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum Line {
    Instruction(Instruction),
    Label(Label),
    /// The entry point of a process thread, `T_<thread>`
    ThreadEntry(u32),
    /// The entry point of a task or function, `TD_<scope>`
    DefinitionEntry(String),
    /// `.scope S_<scope>;`
    ScopeDirective(String),
    /// `.thread T_<thread>;`
    ThreadDirective(u32),
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Line::Instruction(inst) => write!(f, "    {inst}"),
            Line::Label(label) => write!(f, "{label} ;"),
            Line::ThreadEntry(thread) => write!(f, "T_{thread} ;"),
            Line::DefinitionEntry(scope) => write!(f, "TD_{scope} ;"),
            Line::ScopeDirective(scope) => write!(f, "    .scope S_{scope};"),
            Line::ThreadDirective(thread) => write!(f, "    .thread T_{thread};"),
        }
    }
}

/// The generated code for a design
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Program {
    pub lines: Vec<Line>,
}

impl Program {
    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.lines.iter().filter_map(|line| match line {
            Line::Label(label) => Some(*label),
            _ => None,
        })
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Append-only sink for generated code.
///
/// Besides collecting lines, the emitter checks the label discipline of the thread
/// body currently being generated: a label may only be placed once, and every
/// label that is jumped to must be placed before the body ends.
#[derive(Default)]
pub struct Emitter {
    program: Program,
    placed: BTreeSet<Label>,
    referenced: BTreeSet<Label>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instruction(&mut self, inst: Instruction) {
        if let Some(target) = inst.jump_target() {
            self.referenced.insert(target);
        }
        self.program.lines.push(Line::Instruction(inst))
    }

    pub fn label(&mut self, label: Label) {
        assert!(self.placed.insert(label), "Label {label} was placed twice");
        self.program.lines.push(Line::Label(label))
    }

    pub fn line(&mut self, line: Line) {
        match line {
            Line::Instruction(inst) => self.instruction(inst),
            Line::Label(label) => self.label(label),
            other => self.program.lines.push(other),
        }
    }

    /// Checks that every label referenced since the last call was also placed
    pub fn end_thread_body(&mut self) {
        let dangling = self.referenced.difference(&self.placed).collect::<Vec<_>>();
        assert!(
            dangling.is_empty(),
            "Thread body jumps to labels which were never placed: {}",
            dangling.iter().join(", ")
        );
        self.referenced.clear();
    }

    pub fn finish(self) -> Program {
        self.program
    }
}
