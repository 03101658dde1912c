//! Transactional patch application.
//!
//! A transaction is a one-shot object: build it for a view at a chosen
//! time, [`add`](Transaction::add) patches, then
//! [`commit`](Transaction::commit) once.  Construction snapshots a
//! staging state for the view and every transitively reachable child
//! view; patches only touch those staging states until commit, so a
//! failed transaction leaves every view untouched.
//!
//! A C3 failure during relinearization or a value-level failure during
//! patch application (e.g. undefined infinity arithmetic) invalidates
//! the transaction: `commit()` returns false and the stored error stays
//! observable through [`Transaction::error`].

use std::sync::Arc;

use fnv::{FnvHashMap, FnvHashSet};
use log::debug;

use crate::c3::linearize;
use crate::error::{NyanError, Result};
use crate::object::Object;
use crate::state::State;
use crate::view::View;
use crate::{Fqon, Order};

/// Change tracking for a single patched object.
#[derive(Debug, Default)]
pub struct ObjectChanges {
    new_parents: Vec<Fqon>,
}

impl ObjectChanges {
    /// Track an object as a newly spliced-in parent.
    pub fn add_parent(&mut self, obj: Fqon) {
        self.new_parents.push(obj);
    }

    /// The list of new parents.
    pub fn new_parents(&self) -> &[Fqon] {
        &self.new_parents
    }

    /// Whether the parent list changed and relinearization is needed.
    pub fn parents_update_required(&self) -> bool {
        !self.new_parents.is_empty()
    }
}

/// Collects what a transaction changed, per target object; used to
/// invalidate the linearization and children caches on commit.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    changes: FnvHashMap<Fqon, ObjectChanges>,
}

impl ChangeTracker {
    /// The change record for a patch target, created on first use.
    pub fn track(&mut self, target: &str) -> &mut ObjectChanges {
        self.changes.entry(target.to_owned()).or_default()
    }

    /// All change records by object.
    pub fn object_changes(&self) -> &FnvHashMap<Fqon, ObjectChanges> {
        &self.changes
    }

    /// The set of all directly changed objects.
    pub fn changed_objects(&self) -> FnvHashSet<Fqon> {
        self.changes.keys().cloned().collect()
    }
}

/// Per-view working data of a transaction.
struct TransactionState {
    view: View,
    state: State,
    tracker: ChangeTracker,
}

/// Updates one view needs on commit.
struct ViewUpdate {
    linearizations: Vec<Arc<Vec<Fqon>>>,
    children: FnvHashMap<Fqon, FnvHashSet<Fqon>>,
}

/// A patch transaction against a view and its descendants.
pub struct Transaction {
    at: Order,
    valid: bool,
    error: Option<NyanError>,
    states: Vec<TransactionState>,
}

impl Transaction {
    /// Snapshot staging states for `origin` and all its descendants.
    pub(crate) fn new(at: Order, origin: View) -> Transaction {
        let mut views = vec![origin];
        let mut cursor = 0;
        while cursor < views.len() {
            let children = views[cursor].children_handles();
            views.extend(children);
            cursor += 1;
        }

        let states = views
            .into_iter()
            .map(|view| {
                let base = view.state_before(at);
                TransactionState {
                    state: State::new(base),
                    tracker: ChangeTracker::default(),
                    view,
                }
            })
            .collect();

        Transaction {
            at,
            valid: true,
            error: None,
            states,
        }
    }

    /// The time this transaction commits at.
    pub fn at(&self) -> Order {
        self.at
    }

    /// Apply a patch to its target in every staged view.
    ///
    /// Returns false when the object is no patch, or when the
    /// application failed; a failure also invalidates the whole
    /// transaction (see [`Transaction::error`]).
    pub fn add(&mut self, patch: &Object) -> bool {
        if !self.valid {
            return false;
        }
        match self.try_add(patch) {
            Ok(added) => added,
            Err(err) => {
                debug!("patch application failed: {}", err);
                self.set_error(err);
                false
            }
        }
    }

    fn try_add(&mut self, patch: &Object) -> Result<bool> {
        if !patch.is_patch() {
            debug!("'{}' is not a patch, refusing to add it", patch.name());
            return Ok(false);
        }
        let Some(target) = patch.target() else {
            return Err(NyanError::internal("patch somehow has no target"));
        };

        let at = self.at;
        // the patch's own linearization decides which components apply,
        // front to back: the patch itself first, then its ancestors
        let patch_lin = patch.linearized(at)?;

        for transaction_state in &mut self.states {
            transaction_state
                .state
                .copy_object(&target, at, &transaction_state.view)?;

            let database = transaction_state.view.database();

            for component in patch_lin.iter() {
                let component_state = transaction_state.view.get_raw(component, at)?;
                let component_info = database.info().object(component).ok_or_else(|| {
                    NyanError::internal("patch component info could not be retrieved")
                })?;

                if component_state.members().is_empty()
                    && component_info.inheritance_changes().is_empty()
                {
                    continue;
                }

                let tracker = transaction_state.tracker.track(&target);
                let target_state = transaction_state
                    .state
                    .object_mut(&target)
                    .ok_or_else(|| NyanError::internal("staged target state vanished"))?;
                target_state.apply(&component_state, component_info, tracker)?;
            }
        }

        Ok(true)
    }

    /// Commit the staged states into every view.
    ///
    /// On success all views gain the new state at the transaction time,
    /// affected subtrees are relinearized, child indexes updated, and
    /// notifiers fired.  On failure no view is updated and `commit`
    /// returns false.
    pub fn commit(&mut self) -> bool {
        if !self.valid {
            return false;
        }
        self.valid = false;

        let states = std::mem::take(&mut self.states);
        match Transaction::try_commit(self.at, states) {
            Ok(()) => true,
            Err(err) => {
                debug!("commit failed: {}", err);
                self.error = Some(err);
                false
            }
        }
    }

    /// The error that invalidated this transaction, if any.
    pub fn error(&self) -> Option<&NyanError> {
        self.error.as_ref()
    }

    fn set_error(&mut self, err: NyanError) {
        self.valid = false;
        self.error = Some(err);
    }

    fn try_commit(at: Order, mut states: Vec<TransactionState>) -> Result<()> {
        // a repeated transaction at the same time merges into the
        // existing state: unchanged object pointers are kept
        for transaction_state in &mut states {
            if let Some(existing) = transaction_state.view.state_exact(at) {
                let mut merged = (*existing).clone();
                merged.update(std::mem::take(&mut transaction_state.state));
                transaction_state.state = merged;
            }
        }

        // compute every view's relinearizations and child updates before
        // touching any view, so a C3 failure aborts the whole commit
        let mut updates: Vec<ViewUpdate> = Vec::with_capacity(states.len());
        for transaction_state in &states {
            updates.push(Transaction::generate_update(at, transaction_state)?);
        }

        for (transaction_state, update) in states.iter_mut().zip(updates) {
            let view = &transaction_state.view;
            view.insert_state(Arc::new(std::mem::take(&mut transaction_state.state)), at);

            for linearization in update.linearizations {
                view.insert_linearization(linearization, at);
            }

            for (obj, mut new_children) in update.children {
                // merge the previous children with the new child set
                let previous = view.children_of(&obj, at)?;
                new_children.extend(previous.iter().cloned());
                view.insert_children(&obj, Arc::new(new_children), at);
            }
        }

        // with the views updated, notify about every changed object and
        // all its descendants
        for transaction_state in &states {
            let mut updated = transaction_state.tracker.changed_objects();
            let mut descendants: FnvHashSet<Fqon> = FnvHashSet::default();
            for obj in &updated {
                descendants.extend(transaction_state.view.all_children_of(obj, at)?);
            }
            updated.extend(descendants);
            transaction_state.view.fire_notifications(&updated, at);
        }

        Ok(())
    }

    fn generate_update(at: Order, transaction_state: &TransactionState) -> Result<ViewUpdate> {
        let view = &transaction_state.view;
        let staging = &transaction_state.state;

        // objects whose parents changed, and their whole subtrees, need
        // a fresh linearization
        let mut to_linearize: FnvHashSet<Fqon> = FnvHashSet::default();
        let mut children: FnvHashMap<Fqon, FnvHashSet<Fqon>> = FnvHashMap::default();

        for (obj, changes) in transaction_state.tracker.object_changes() {
            if !changes.parents_update_required() {
                continue;
            }
            for parent in changes.new_parents() {
                children
                    .entry(parent.clone())
                    .or_default()
                    .insert(obj.clone());
            }
            to_linearize.insert(obj.clone());
            to_linearize.extend(view.all_children_of(obj, at)?);
        }

        let mut linearizations = Vec::with_capacity(to_linearize.len());
        for obj in &to_linearize {
            let linearization = linearize(obj, &|name: &str| {
                // prefer the staged object states over the history
                if let Some(state) = staging.get(name) {
                    return Ok(state.parents().iter().cloned().collect());
                }
                view.get_raw(name, at)
                    .map(|state| state.parents().iter().cloned().collect())
            })?;
            linearizations.push(Arc::new(linearization));
        }

        Ok(ViewUpdate {
            linearizations,
            children,
        })
    }
}
