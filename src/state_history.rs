//! Per-view history of states, linearizations and child indexes.

use std::collections::BTreeSet;
use std::sync::Arc;

use fnv::{FnvHashMap, FnvHashSet};

use crate::curve::Curve;
use crate::object_state::ObjectState;
use crate::state::State;
use crate::{Fqon, Order, DEFAULT_T};

/// Cached per-object history: change points, linearizations and direct
/// children over time.
#[derive(Debug, Default)]
pub struct ObjectHistory {
    /// Order points at which the object was modified; used to find the
    /// state that holds the object for a queried time.
    changes: BTreeSet<Order>,
    /// Parent linearization of the object over time.
    pub linearizations: Curve<Arc<Vec<Fqon>>>,
    /// Direct children of the object over time.
    pub children: Curve<Arc<FnvHashSet<Fqon>>>,
}

impl ObjectHistory {
    /// Record a change point, dropping every later entry.
    fn insert_change(&mut self, time: Order) {
        self.truncate_changes(time);
        self.changes.insert(time);
    }

    fn truncate_changes(&mut self, time: Order) {
        self.changes.split_off(&time);
    }

    /// The last change at or before `time`, if any.
    pub fn last_change_before(&self, time: Order) -> Option<Order> {
        self.changes.range(..=time).next_back().copied()
    }

    /// Drop all history at or after `time`, in every curve.
    fn truncate_from(&mut self, time: Order) {
        self.truncate_changes(time);
        self.linearizations.truncate_from(time);
        self.children.truncate_from(time);
    }
}

/// State history of one view.
#[derive(Debug)]
pub struct StateHistory {
    /// Full states over time.
    history: Curve<Arc<State>>,
    /// Lookup accelerators per object.
    object_histories: FnvHashMap<Fqon, ObjectHistory>,
}

impl StateHistory {
    /// Create a history whose starting point chains back to the given
    /// base state (the database's initial state, or nothing for it).
    pub fn new(base: Option<Arc<State>>) -> StateHistory {
        let mut history = Curve::new();
        history.insert_drop(DEFAULT_T, Arc::new(State::new(base)));
        StateHistory {
            history,
            object_histories: FnvHashMap::default(),
        }
    }

    /// The state at or before `t`.
    pub fn state(&self, t: Order) -> Option<&Arc<State>> {
        self.history.at(t)
    }

    /// The state at exactly `t`.
    pub fn state_exact(&self, t: Order) -> Option<&Arc<State>> {
        self.history.at_exact(t)
    }

    /// The state a transaction at `t` has to chain back to: the previous
    /// state of an exact hit, or the latest state before `t`.
    pub fn state_before(&self, t: Order) -> Option<Arc<State>> {
        if let Some(exact) = self.history.at_exact(t) {
            return exact.previous().cloned();
        }
        self.history.at(t).cloned()
    }

    /// The object state of `fqon` at time `t`, if this history recorded
    /// a change for it.
    pub fn object_state(&self, fqon: &str, t: Order) -> Option<&Arc<ObjectState>> {
        let object_history = self.object_histories.get(fqon)?;
        let order = object_history.last_change_before(t)?;
        // after global truncation every change point has its state
        let state = self.history.at_exact(order)?;
        state.get(fqon)
    }

    /// Record a new state at `t`.
    ///
    /// Everything at or after `t` is dropped first, for all objects, so
    /// no change index or cache can refer to a dropped state.
    pub fn insert(&mut self, new_state: Arc<State>, t: Order) {
        for object_history in self.object_histories.values_mut() {
            object_history.truncate_from(t);
        }
        for fqon in new_state.objects().keys() {
            self.object_histories
                .entry(fqon.clone())
                .or_default()
                .insert_change(t);
        }
        self.history.insert_drop(t, new_state);
    }

    /// Record a new linearization; the first element names the object.
    pub fn insert_linearization(&mut self, linearization: Arc<Vec<Fqon>>, t: Order) {
        let Some(obj) = linearization.first().cloned() else {
            return;
        };
        self.object_histories
            .entry(obj)
            .or_default()
            .linearizations
            .insert_drop(t, linearization);
    }

    /// The recorded linearization of `obj` at `t`, if any.
    pub fn linearization(&self, obj: &str, t: Order) -> Option<Arc<Vec<Fqon>>> {
        self.object_histories
            .get(obj)?
            .linearizations
            .at(t)
            .cloned()
    }

    /// Record a new direct-children set for `obj`.
    pub fn insert_children(&mut self, obj: &str, children: Arc<FnvHashSet<Fqon>>, t: Order) {
        self.object_histories
            .entry(obj.to_owned())
            .or_default()
            .children
            .insert_drop(t, children);
    }

    /// The recorded direct children of `obj` at `t`, if any.
    pub fn children(&self, obj: &str, t: Order) -> Option<Arc<FnvHashSet<Fqon>>> {
        self.object_histories.get(obj)?.children.at(t).cloned()
    }
}
