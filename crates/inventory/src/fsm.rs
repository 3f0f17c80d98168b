//! Table-driven finite state machine.
//!
//! A machine is a list of [`Transition`]s. Firing an event picks the first
//! transition whose `event` matches and whose `from` list contains the
//! current state, runs its guard, then `before`, the state change and `after`.
//! The subject is only touched once the guard has passed.

use goodstock_core::{DomainError, DomainResult};

/// Something with a current state a machine can move.
pub trait Stateful {
    type State: Copy + Eq + core::fmt::Debug;

    fn state(&self) -> Self::State;

    fn set_state(&mut self, state: Self::State);
}

pub type Guard<C> = fn(&C) -> DomainResult<()>;
pub type Hook<C> = fn(&mut C);

pub struct Transition<E, S: 'static, C> {
    pub event: E,
    pub from: &'static [S],
    pub to: S,
    pub guard: Option<Guard<C>>,
    pub before: Option<Hook<C>>,
    pub after: Option<Hook<C>>,
}

pub struct StateMachine<E, S: 'static, C> {
    name: &'static str,
    transitions: Vec<Transition<E, S, C>>,
}

impl<E, S, C> StateMachine<E, S, C>
where
    E: Copy + Eq + core::fmt::Debug,
    S: Copy + Eq + core::fmt::Debug + 'static,
    C: Stateful<State = S>,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            transitions: Vec::new(),
        }
    }

    /// Add a transition. Follow with `guard`/`before`/`after` to decorate it.
    pub fn on(mut self, event: E, from: &'static [S], to: S) -> Self {
        self.transitions.push(Transition {
            event,
            from,
            to,
            guard: None,
            before: None,
            after: None,
        });
        self
    }

    pub fn guard(mut self, guard: Guard<C>) -> Self {
        if let Some(last) = self.transitions.last_mut() {
            last.guard = Some(guard);
        }
        self
    }

    pub fn before(mut self, hook: Hook<C>) -> Self {
        if let Some(last) = self.transitions.last_mut() {
            last.before = Some(hook);
        }
        self
    }

    pub fn after(mut self, hook: Hook<C>) -> Self {
        if let Some(last) = self.transitions.last_mut() {
            last.after = Some(hook);
        }
        self
    }

    fn find(&self, subject: &C, event: E) -> Option<&Transition<E, S, C>> {
        let current = subject.state();
        self.transitions
            .iter()
            .find(|t| t.event == event && t.from.contains(&current))
    }

    /// Whether `event` has a transition from the current state and its guard passes.
    pub fn can_fire(&self, subject: &C, event: E) -> bool {
        match self.find(subject, event) {
            Some(t) => t.guard.is_none_or(|g| g(subject).is_ok()),
            None => false,
        }
    }

    pub fn fire(&self, subject: &mut C, event: E) -> DomainResult<S> {
        let transition = self.find(subject, event).ok_or_else(|| {
            DomainError::invalid_operation(format!(
                "{}: cannot {:?} from {:?}",
                self.name,
                event,
                subject.state()
            ))
        })?;

        if let Some(guard) = transition.guard {
            guard(subject)?;
        }
        if let Some(before) = transition.before {
            before(subject);
        }
        subject.set_state(transition.to);
        if let Some(after) = transition.after {
            after(subject);
        }
        Ok(transition.to)
    }
}
