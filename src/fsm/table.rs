// src/fsm/table.rs

//! Declarative `(state, event) -> (state, action)` transition tables.
//!
//! A [`TransitionTable`] is assembled once per entity kind through a
//! [`TableBuilder`] and is immutable afterwards, so it can be shared between
//! any number of entities behind an `Arc` without locking.
//!
//! Two kinds of arcs are supported:
//! - single-arc: fixed destination, optional action over the entity data;
//! - multi-arc: the action inspects the event and picks the destination
//!   from a declared set.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug, Display};
use std::hash::Hash;

use tracing::trace;

use crate::errors::{ClustertrackError, Result};

/// Bundles the types that make up one kind of state machine.
pub trait Machine: Send + Sync + 'static {
    type State: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static;
    type Kind: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static;
    type Event: MachineEvent<Kind = Self::Kind> + Debug + Send + Sync + 'static;
    /// Mutable per-entity data that transition actions operate on.
    type Data: Clone + Default + Debug + Send + Sync + 'static;

    /// Short name used in log output (e.g. `"job"`).
    const NAME: &'static str;
}

/// An immutable event addressed to one entity.
pub trait MachineEvent {
    type Kind;

    /// Identifier of the entity this event targets.
    fn entity_id(&self) -> &str;

    fn kind(&self) -> Self::Kind;
}

type SingleAction<M> =
    Box<dyn Fn(&mut <M as Machine>::Data, &<M as Machine>::Event) + Send + Sync>;
type MultiAction<M> = Box<
    dyn Fn(&mut <M as Machine>::Data, &<M as Machine>::Event) -> <M as Machine>::State
        + Send
        + Sync,
>;

enum Hook<M: Machine> {
    Single {
        to: M::State,
        action: Option<SingleAction<M>>,
    },
    Multi {
        to: Vec<M::State>,
        action: MultiAction<M>,
    },
}

/// Immutable transition table for one [`Machine`].
pub struct TransitionTable<M: Machine> {
    initial: M::State,
    terminal: HashSet<M::State>,
    hooks: HashMap<(M::State, M::Kind), Hook<M>>,
}

impl<M: Machine> fmt::Debug for TransitionTable<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionTable")
            .field("machine", &M::NAME)
            .field("initial", &self.initial)
            .field("terminal", &self.terminal)
            .field("transitions", &self.hooks.len())
            .finish()
    }
}

impl<M: Machine> TransitionTable<M> {
    pub fn builder(initial: M::State) -> TableBuilder<M> {
        TableBuilder::new(initial)
    }

    pub fn initial(&self) -> M::State {
        self.initial
    }

    pub fn is_terminal(&self, state: M::State) -> bool {
        self.terminal.contains(&state)
    }

    /// Whether `kind` is accepted from `state`.
    pub fn accepts(&self, state: M::State, kind: M::Kind) -> bool {
        self.hooks.contains_key(&(state, kind))
    }

    /// Declared destinations for `(state, kind)`, if registered.
    pub fn destinations(&self, state: M::State, kind: M::Kind) -> Option<Vec<M::State>> {
        self.hooks.get(&(state, kind)).map(|hook| match hook {
            Hook::Single { to, .. } => vec![*to],
            Hook::Multi { to, .. } => to.clone(),
        })
    }

    /// Every state mentioned by the table (initial, sources, destinations).
    pub fn states(&self) -> HashSet<M::State> {
        let mut states = HashSet::new();
        states.insert(self.initial);
        for ((from, _), hook) in &self.hooks {
            states.insert(*from);
            match hook {
                Hook::Single { to, .. } => {
                    states.insert(*to);
                }
                Hook::Multi { to, .. } => states.extend(to.iter().copied()),
            }
        }
        states
    }

    /// Apply `event` to an entity currently in `current`.
    ///
    /// Runs the registered action exactly once and returns the destination.
    /// Unregistered pairs fail with [`ClustertrackError::InvalidTransition`]
    /// without touching `data`. A multi-arc action runs against a staged copy
    /// of `data` that is only committed when its chosen destination is
    /// declared.
    pub fn do_transition(
        &self,
        data: &mut M::Data,
        current: M::State,
        event: &M::Event,
    ) -> Result<M::State> {
        let kind = event.kind();
        let hook = self.hooks.get(&(current, kind)).ok_or_else(|| {
            ClustertrackError::InvalidTransition {
                entity: event.entity_id().to_string(),
                state: current.to_string(),
                event: kind.to_string(),
            }
        })?;

        match hook {
            Hook::Single { to, action } => {
                if let Some(action) = action {
                    action(data, event);
                }
                trace!(machine = M::NAME, from = %current, to = %to, event = %kind, "single-arc transition");
                Ok(*to)
            }
            Hook::Multi { to, action } => {
                let mut staged = data.clone();
                let next = action(&mut staged, event);
                if !to.contains(&next) {
                    return Err(ClustertrackError::UndeclaredDestination {
                        entity: event.entity_id().to_string(),
                        from: current.to_string(),
                        to: next.to_string(),
                        event: kind.to_string(),
                    });
                }
                *data = staged;
                trace!(machine = M::NAME, from = %current, to = %next, event = %kind, "multi-arc transition");
                Ok(next)
            }
        }
    }
}

/// Collects transitions and validates them into a [`TransitionTable`].
pub struct TableBuilder<M: Machine> {
    initial: M::State,
    terminal: HashSet<M::State>,
    entries: Vec<((M::State, M::Kind), Hook<M>)>,
}

impl<M: Machine> TableBuilder<M> {
    pub fn new(initial: M::State) -> Self {
        Self {
            initial,
            terminal: HashSet::new(),
            entries: Vec::new(),
        }
    }

    /// Single-arc transition with an action.
    pub fn transition<F>(mut self, from: M::State, to: M::State, kind: M::Kind, action: F) -> Self
    where
        F: Fn(&mut M::Data, &M::Event) + Send + Sync + 'static,
    {
        self.entries.push((
            (from, kind),
            Hook::Single {
                to,
                action: Some(Box::new(action)),
            },
        ));
        self
    }

    /// Single-arc transition without an action.
    pub fn noop(mut self, from: M::State, to: M::State, kind: M::Kind) -> Self {
        self.entries
            .push(((from, kind), Hook::Single { to, action: None }));
        self
    }

    /// Multi-arc transition: `action` picks one of `to`.
    pub fn multi<F>(mut self, from: M::State, to: &[M::State], kind: M::Kind, action: F) -> Self
    where
        F: Fn(&mut M::Data, &M::Event) -> M::State + Send + Sync + 'static,
    {
        self.entries.push((
            (from, kind),
            Hook::Multi {
                to: to.to_vec(),
                action: Box::new(action),
            },
        ));
        self
    }

    /// Mark states from which `reset` is allowed.
    pub fn terminal(mut self, states: &[M::State]) -> Self {
        self.terminal.extend(states.iter().copied());
        self
    }

    /// Validate and freeze the table.
    ///
    /// Any `(state, event)` pair registered twice is rejected, whether or not
    /// the destinations agree.
    pub fn build(self) -> Result<TransitionTable<M>> {
        let mut hooks: HashMap<(M::State, M::Kind), Hook<M>> = HashMap::new();

        for ((from, kind), hook) in self.entries {
            if let Hook::Multi { to, .. } = &hook {
                if to.is_empty() {
                    return Err(ClustertrackError::ConfigError(format!(
                        "{} transition from {} on {} declares no destinations",
                        M::NAME,
                        from,
                        kind
                    )));
                }
            }

            if hooks.contains_key(&(from, kind)) {
                return Err(ClustertrackError::DuplicateTransition {
                    state: from.to_string(),
                    event: kind.to_string(),
                });
            }
            hooks.insert((from, kind), hook);
        }

        Ok(TransitionTable {
            initial: self.initial,
            terminal: self.terminal,
            hooks,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Lamp {
        Off,
        On,
        Broken,
    }

    impl Display for Lamp {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum LampKind {
        Toggle,
        Smash,
        Repair,
    }

    impl Display for LampKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    #[derive(Debug, Clone)]
    pub struct LampEvent {
        pub id: String,
        pub kind: LampKind,
        pub force: u32,
    }

    impl LampEvent {
        pub fn new(kind: LampKind) -> Self {
            Self {
                id: "lamp-1".to_string(),
                kind,
                force: 0,
            }
        }
    }

    impl MachineEvent for LampEvent {
        type Kind = LampKind;

        fn entity_id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> LampKind {
            self.kind
        }
    }

    #[derive(Debug, Clone, Default)]
    pub struct LampData {
        pub toggles: u32,
        pub smashes: u32,
    }

    #[derive(Debug)]
    pub struct LampMachine;

    impl Machine for LampMachine {
        type State = Lamp;
        type Kind = LampKind;
        type Event = LampEvent;
        type Data = LampData;
        const NAME: &'static str = "lamp";
    }

    pub fn lamp_table() -> TransitionTable<LampMachine> {
        TransitionTable::<LampMachine>::builder(Lamp::Off)
            .transition(Lamp::Off, Lamp::On, LampKind::Toggle, |d: &mut LampData, _| {
                d.toggles += 1
            })
            .transition(Lamp::On, Lamp::Off, LampKind::Toggle, |d: &mut LampData, _| {
                d.toggles += 1
            })
            // A light smash only dims the lamp; a hard one breaks it.
            .multi(
                Lamp::On,
                &[Lamp::On, Lamp::Broken],
                LampKind::Smash,
                |d: &mut LampData, e: &LampEvent| {
                    d.smashes += 1;
                    if e.force > 5 { Lamp::Broken } else { Lamp::On }
                },
            )
            .noop(Lamp::Broken, Lamp::Off, LampKind::Repair)
            .terminal(&[Lamp::Broken])
            .build()
            .expect("lamp table is valid")
    }

    #[test]
    fn registered_pair_returns_destination_and_runs_action_once() {
        let table = lamp_table();
        let mut data = LampData::default();

        let next = table
            .do_transition(&mut data, Lamp::Off, &LampEvent::new(LampKind::Toggle))
            .unwrap();

        assert_eq!(next, Lamp::On);
        assert_eq!(data.toggles, 1);
    }

    #[test]
    fn unregistered_pair_is_invalid_and_leaves_data_alone() {
        let table = lamp_table();
        let mut data = LampData::default();

        let err = table
            .do_transition(&mut data, Lamp::Off, &LampEvent::new(LampKind::Smash))
            .unwrap_err();

        match err {
            ClustertrackError::InvalidTransition { entity, state, event } => {
                assert_eq!(entity, "lamp-1");
                assert_eq!(state, "Off");
                assert_eq!(event, "Smash");
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
        assert_eq!(data.toggles, 0);
        assert_eq!(data.smashes, 0);
    }

    #[test]
    fn multi_arc_action_chooses_destination() {
        let table = lamp_table();
        let mut data = LampData::default();

        let mut soft = LampEvent::new(LampKind::Smash);
        soft.force = 1;
        assert_eq!(table.do_transition(&mut data, Lamp::On, &soft).unwrap(), Lamp::On);

        let mut hard = LampEvent::new(LampKind::Smash);
        hard.force = 9;
        assert_eq!(table.do_transition(&mut data, Lamp::On, &hard).unwrap(), Lamp::Broken);
        assert_eq!(data.smashes, 2);
    }

    #[test]
    fn multi_arc_undeclared_destination_is_rejected_without_committing() {
        let table = TransitionTable::<LampMachine>::builder(Lamp::Off)
            .multi(Lamp::Off, &[Lamp::On], LampKind::Smash, |d: &mut LampData, _| {
                d.smashes += 1;
                Lamp::Broken
            })
            .build()
            .unwrap();
        let mut data = LampData::default();

        let err = table
            .do_transition(&mut data, Lamp::Off, &LampEvent::new(LampKind::Smash))
            .unwrap_err();

        assert!(matches!(err, ClustertrackError::UndeclaredDestination { .. }));
        assert_eq!(data.smashes, 0);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let result = TransitionTable::<LampMachine>::builder(Lamp::Off)
            .noop(Lamp::Off, Lamp::On, LampKind::Toggle)
            .noop(Lamp::Off, Lamp::On, LampKind::Toggle)
            .build();

        match result {
            Err(ClustertrackError::DuplicateTransition { state, event }) => {
                assert_eq!(state, "Off");
                assert_eq!(event, "Toggle");
            }
            other => panic!("expected DuplicateTransition, got {other:?}"),
        }
    }

    #[test]
    fn conflicting_registration_is_rejected() {
        let result = TransitionTable::<LampMachine>::builder(Lamp::Off)
            .noop(Lamp::Off, Lamp::On, LampKind::Toggle)
            .noop(Lamp::Off, Lamp::Broken, LampKind::Toggle)
            .build();

        assert!(matches!(result, Err(ClustertrackError::DuplicateTransition { .. })));
    }

    #[test]
    fn multi_arc_without_destinations_is_rejected() {
        let result = TransitionTable::<LampMachine>::builder(Lamp::Off)
            .multi(Lamp::Off, &[], LampKind::Toggle, |_: &mut LampData, _| Lamp::On)
            .build();

        assert!(matches!(result, Err(ClustertrackError::ConfigError(_))));
    }

    #[test]
    fn table_introspection() {
        let table = lamp_table();

        assert_eq!(table.initial(), Lamp::Off);
        assert!(table.is_terminal(Lamp::Broken));
        assert!(!table.is_terminal(Lamp::On));
        assert!(table.accepts(Lamp::On, LampKind::Smash));
        assert!(!table.accepts(Lamp::Broken, LampKind::Toggle));
        assert_eq!(
            table.destinations(Lamp::On, LampKind::Smash),
            Some(vec![Lamp::On, Lamp::Broken])
        );
        assert_eq!(table.states().len(), 3);
    }
}
