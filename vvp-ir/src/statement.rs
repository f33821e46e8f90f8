use serde::{Deserialize, Serialize};

use crate::{EventId, Expression, ScopeId, SignalId};

/// One signal bit attached to a nexus
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct NexusPtr {
    /// Nexus pointers may also reference nets or logic devices which are not
    /// signals. Those have no storage to write to
    pub signal: Option<SignalId>,
    pub pin: u32,
}

/// A connection point joining every driver and receiver of one bit
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Nexus {
    pub ptrs: Vec<NexusPtr>,
}

impl Nexus {
    /// The `(signal, pin)` pairs connected to this nexus
    pub fn signal_bits(&self) -> impl Iterator<Item = (SignalId, u32)> + '_ {
        self.ptrs
            .iter()
            .filter_map(|ptr| ptr.signal.map(|sig| (sig, ptr.pin)))
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Lvalue {
    /// One nexus per written bit, least significant first
    pub pins: Vec<Nexus>,
    /// Bit select used to address the written bits at run time
    pub mux: Option<Box<Expression>>,
}

impl Lvalue {
    /// An lvalue writing bits `0..width` of a single signal
    pub fn signal(signal: SignalId, width: u32) -> Self {
        Self {
            pins: (0..width)
                .map(|pin| Nexus {
                    ptrs: vec![NexusPtr {
                        signal: Some(signal),
                        pin,
                    }],
                })
                .collect(),
            mux: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.pins.len() as u32
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum CaseKind {
    /// `case`: exact four-valued match
    Case,
    /// `casex`: x and z bits on either side are don't care
    CaseX,
    /// `casez`: z bits on either side are don't care
    CaseZ,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct CaseItem {
    /// `None` for the default item
    pub guard: Option<Expression>,
    pub body: Statement,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ProceduralKind {
    Assign,
    Deassign,
    Force,
    Release,
}

impl std::fmt::Display for ProceduralKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProceduralKind::Assign => write!(f, "assign"),
            ProceduralKind::Deassign => write!(f, "deassign"),
            ProceduralKind::Force => write!(f, "force"),
            ProceduralKind::Release => write!(f, "release"),
        }
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Statement {
    /// Blocking assignment `lval = rval`
    Assign {
        lvals: Vec<Lvalue>,
        rval: Expression,
    },
    /// Non-blocking assignment `lval <= #delay rval`
    AssignNb {
        lvals: Vec<Lvalue>,
        rval: Expression,
        delay: Option<Expression>,
    },
    Block(Vec<Statement>),
    Case {
        kind: CaseKind,
        selector: Expression,
        items: Vec<CaseItem>,
    },
    Condit {
        cond: Expression,
        if_true: Box<Statement>,
        if_false: Option<Box<Statement>>,
    },
    Delay {
        amount: u64,
        body: Box<Statement>,
    },
    Disable(ScopeId),
    Forever(Box<Statement>),
    Fork(Vec<Statement>),
    Noop,
    /// Procedural continuous assignments (`assign`, `deassign`, `force`, `release`)
    Procedural {
        kind: ProceduralKind,
        lval: Lvalue,
        rval: Option<Expression>,
    },
    Repeat {
        count: Expression,
        body: Box<Statement>,
    },
    SystemTask {
        name: String,
        params: Vec<Expression>,
    },
    Trigger(EventId),
    UserTask(ScopeId),
    Wait {
        event: EventId,
        body: Box<Statement>,
    },
    While {
        cond: Expression,
        body: Box<Statement>,
    },
}

impl Statement {
    pub fn assign(lval: Lvalue, rval: Expression) -> Self {
        Statement::Assign {
            lvals: vec![lval],
            rval,
        }
    }

    pub fn assign_nb(lval: Lvalue, rval: Expression, delay: Option<Expression>) -> Self {
        Statement::AssignNb {
            lvals: vec![lval],
            rval,
            delay,
        }
    }

    pub fn condit(cond: Expression, if_true: Statement, if_false: Option<Statement>) -> Self {
        Statement::Condit {
            cond,
            if_true: Box::new(if_true),
            if_false: if_false.map(Box::new),
        }
    }

    pub fn delay(amount: u64, body: Statement) -> Self {
        Statement::Delay {
            amount,
            body: Box::new(body),
        }
    }

    pub fn repeat(count: Expression, body: Statement) -> Self {
        Statement::Repeat {
            count,
            body: Box::new(body),
        }
    }

    pub fn wait(event: EventId, body: Statement) -> Self {
        Statement::Wait {
            event,
            body: Box::new(body),
        }
    }

    pub fn while_loop(cond: Expression, body: Statement) -> Self {
        Statement::While {
            cond,
            body: Box::new(body),
        }
    }

    pub fn system_task(name: impl Into<String>, params: Vec<Expression>) -> Self {
        Statement::SystemTask {
            name: name.into(),
            params,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Assign { .. } => "blocking assignment",
            Statement::AssignNb { .. } => "non-blocking assignment",
            Statement::Block(_) => "block",
            Statement::Case { .. } => "case",
            Statement::Condit { .. } => "if",
            Statement::Delay { .. } => "delay",
            Statement::Disable(_) => "disable",
            Statement::Forever(_) => "forever",
            Statement::Fork(_) => "fork",
            Statement::Noop => "null statement",
            Statement::Procedural { .. } => "procedural continuous assignment",
            Statement::Repeat { .. } => "repeat",
            Statement::SystemTask { .. } => "system task call",
            Statement::Trigger(_) => "event trigger",
            Statement::UserTask(_) => "task call",
            Statement::Wait { .. } => "event wait",
            Statement::While { .. } => "while",
        }
    }
}
