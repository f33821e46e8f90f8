pub mod expression;
pub mod statement;

use serde::{Deserialize, Serialize};

pub use expression::{BinaryOperator, Bit, ExprKind, Expression, UnaryOperator};
pub use statement::{CaseItem, CaseKind, Lvalue, Nexus, NexusPtr, ProceduralKind, Statement};

/**
  The elaborated, scope resolved behavioral view of a design. Everything here is
  produced by the elaborator; code generation only reads it.

  Signals, scopes and events live in arenas and are referred to by id so that
  expressions and statements can point at them without owning them.
*/

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(pub usize);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub usize);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub usize);

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Signal {
    /// Full hierarchical name, e.g. `top.cpu.pc`
    pub name: String,
    pub width: u32,
    pub signed: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ScopeKind {
    Module,
    Task,
    Function,
    Begin,
    Fork,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Scope {
    /// Full hierarchical name. Used to build the generated `S_` and `TD_` symbols
    pub name: String,
    pub kind: ScopeKind,
    /// Ports of a task or function in declaration order. For functions, port 0 is
    /// the signal which receives the result and the arguments follow it.
    pub ports: Vec<SignalId>,
    /// The body of a task or function
    pub definition: Option<Statement>,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ProcessKind {
    Initial,
    Always,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Process {
    pub kind: ProcessKind,
    pub scope: ScopeId,
    pub body: Statement,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Design {
    pub signals: Vec<Signal>,
    pub scopes: Vec<Scope>,
    pub events: Vec<Event>,
    pub processes: Vec<Process>,
}

impl Design {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self, id: SignalId) -> &Signal {
        self.signals
            .get(id.0)
            .unwrap_or_else(|| panic!("{id:?} is not a signal of this design"))
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        self.scopes
            .get(id.0)
            .unwrap_or_else(|| panic!("{id:?} is not a scope of this design"))
    }

    pub fn event(&self, id: EventId) -> &Event {
        self.events
            .get(id.0)
            .unwrap_or_else(|| panic!("{id:?} is not an event of this design"))
    }

    pub fn scope_ids(&self) -> impl Iterator<Item = ScopeId> + '_ {
        (0..self.scopes.len()).map(ScopeId)
    }

    pub fn add_signal(&mut self, name: impl Into<String>, width: u32) -> SignalId {
        self.signals.push(Signal {
            name: name.into(),
            width,
            signed: false,
        });
        SignalId(self.signals.len() - 1)
    }

    pub fn add_signed_signal(&mut self, name: impl Into<String>, width: u32) -> SignalId {
        let id = self.add_signal(name, width);
        self.signals[id.0].signed = true;
        id
    }

    pub fn add_scope(&mut self, name: impl Into<String>, kind: ScopeKind) -> ScopeId {
        self.scopes.push(Scope {
            name: name.into(),
            kind,
            ports: vec![],
            definition: None,
        });
        ScopeId(self.scopes.len() - 1)
    }

    /// Adds a task or function scope. For functions, the first port is the result
    pub fn add_subroutine(
        &mut self,
        name: impl Into<String>,
        kind: ScopeKind,
        ports: Vec<SignalId>,
        definition: Statement,
    ) -> ScopeId {
        let id = self.add_scope(name, kind);
        self.scopes[id.0].ports = ports;
        self.scopes[id.0].definition = Some(definition);
        id
    }

    pub fn add_event(&mut self, name: impl Into<String>) -> EventId {
        self.events.push(Event { name: name.into() });
        EventId(self.events.len() - 1)
    }

    pub fn add_process(&mut self, kind: ProcessKind, scope: ScopeId, body: Statement) {
        self.processes.push(Process { kind, scope, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn arena_ids_are_dense() {
        let mut design = Design::new();
        let a = design.add_signal("top.a", 4);
        let b = design.add_signed_signal("top.b", 8);
        let top = design.add_scope("top", ScopeKind::Module);
        let ev = design.add_event("top.go");

        assert_eq!(a, SignalId(0));
        assert_eq!(b, SignalId(1));
        assert!(design.signal(b).signed);
        assert_eq!(design.scope(top).name, "top");
        assert_eq!(design.event(ev).name, "top.go");
    }

    #[test]
    fn designs_can_be_read_from_ron_dumps() {
        let dump = r#"(
            signals: [(name: "top.a", width: 2, signed: false)],
            scopes: [(name: "top", kind: Module, ports: [], definition: None)],
            events: [],
            processes: [(
                kind: Initial,
                scope: 0,
                body: Assign(
                    lvals: [(pins: [(ptrs: [(signal: Some(0), pin: 0)])], mux: None)],
                    rval: (kind: Number([One]), width: 1, signed: false),
                ),
            )],
        )"#;

        let design: Design = ron::from_str(dump).unwrap();

        assert_eq!(design.signal(SignalId(0)).width, 2);
        assert_eq!(design.processes.len(), 1);
        assert_eq!(design.processes[0].kind, ProcessKind::Initial);
        assert_eq!(
            design.processes[0].body,
            Statement::Assign {
                lvals: vec![Lvalue::signal(SignalId(0), 1)],
                rval: Expression::number(&[Bit::One]),
            }
        );
    }
}
