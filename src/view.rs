//! Layered, time-indexed views onto the database.
//!
//! Each view owns its own [`StateHistory`] starting from an empty state
//! on top of the database's initial state.  Child views layer on top of
//! their parent: reads that miss the child's own history fall through to
//! the parent and finally to the database.  Transactions committed on a
//! view also apply to all transitively reachable children, so the layers
//! stay consistent.
//!
//! Views are single-threaded handles; cloning a [`View`] clones the
//! handle, not the history.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use fnv::FnvHashMap;
use fnv::FnvHashSet;

use crate::database::Database;
use crate::error::{NyanError, Result};
use crate::object::Object;
use crate::object_state::ObjectState;
use crate::state::State;
use crate::state_history::StateHistory;
use crate::transaction::Transaction;
use crate::{Fqon, Order};

/// Object change notification callback: called with the change time, the
/// updated object name, and the new object state.
pub type UpdateCallback = dyn Fn(Order, &Fqon, &ObjectState);

struct NotifierEntry {
    id: u64,
    callback: Rc<UpdateCallback>,
}

struct ViewInner {
    database: Arc<Database>,
    history: StateHistory,
    children: Vec<Weak<RefCell<ViewInner>>>,
    parent: Option<Weak<RefCell<ViewInner>>>,
    notifiers: FnvHashMap<Fqon, Vec<NotifierEntry>>,
    next_notifier_id: u64,
}

/// A window onto the database that can evolve independently over time.
#[derive(Clone)]
pub struct View {
    inner: Rc<RefCell<ViewInner>>,
}

impl View {
    /// Create a fresh view on a database.
    pub(crate) fn new(database: Arc<Database>) -> View {
        let history = StateHistory::new(Some(Arc::clone(database.initial_state())));
        View {
            inner: Rc::new(RefCell::new(ViewInner {
                database,
                history,
                children: Vec::new(),
                parent: None,
                notifiers: FnvHashMap::default(),
                next_notifier_id: 0,
            })),
        }
    }

    /// Spawn a child view layered on top of this one.
    ///
    /// The child sees this view's data underneath its own changes and
    /// receives every transaction committed here.  It is tracked by weak
    /// reference only; dropping all child handles detaches it.
    pub fn new_child(&self) -> View {
        let database = self.database();
        let child = View::new(database);
        child.inner.borrow_mut().parent = Some(Rc::downgrade(&self.inner));
        self.inner
            .borrow_mut()
            .children
            .push(Rc::downgrade(&child.inner));
        child
    }

    /// The database this view is a window onto.
    pub fn database(&self) -> Arc<Database> {
        Arc::clone(&self.inner.borrow().database)
    }

    /// Get an object handle; fails if no such object exists.
    pub fn get_object(&self, fqon: &str) -> Result<Object> {
        let database = self.database();
        if !database.info().has_object(fqon) {
            return Err(NyanError::ObjectNotFound(fqon.to_owned()));
        }
        Ok(Object::new(fqon.to_owned(), self.clone()))
    }

    /// Start a transaction on this view (and all its descendants).
    pub fn new_transaction(&self, t: Order) -> Transaction {
        Transaction::new(t, self.clone())
    }

    /// The raw object state at time `t`: this view's history first, then
    /// the parent chain, then the database initial state.
    pub fn get_raw(&self, fqon: &str, t: Order) -> Result<Arc<ObjectState>> {
        let mut current = Rc::clone(&self.inner);
        loop {
            let parent = {
                let inner = current.borrow();
                if let Some(state) = inner.history.object_state(fqon, t) {
                    return Ok(Arc::clone(state));
                }
                inner.parent.as_ref().and_then(Weak::upgrade)
            };
            match parent {
                Some(next) => current = next,
                None => break,
            }
        }

        self.inner
            .borrow()
            .database
            .initial_state()
            .get(fqon)
            .cloned()
            .ok_or_else(|| NyanError::ObjectNotFound(fqon.to_owned()))
    }

    /// The C3 linearization of an object at time `t`.
    pub fn linearization(&self, fqon: &str, t: Order) -> Result<Arc<Vec<Fqon>>> {
        let mut current = Rc::clone(&self.inner);
        loop {
            let parent = {
                let inner = current.borrow();
                if let Some(linearization) = inner.history.linearization(fqon, t) {
                    return Ok(linearization);
                }
                inner.parent.as_ref().and_then(Weak::upgrade)
            };
            match parent {
                Some(next) => current = next,
                None => break,
            }
        }

        let database = self.database();
        let info = database
            .info()
            .object(fqon)
            .ok_or_else(|| NyanError::ObjectNotFound(fqon.to_owned()))?;
        Ok(Arc::clone(info.linearization()))
    }

    /// The direct inheritance children of an object at time `t`.
    pub fn children_of(&self, fqon: &str, t: Order) -> Result<Arc<FnvHashSet<Fqon>>> {
        let mut current = Rc::clone(&self.inner);
        loop {
            let parent = {
                let inner = current.borrow();
                if let Some(children) = inner.history.children(fqon, t) {
                    return Ok(children);
                }
                inner.parent.as_ref().and_then(Weak::upgrade)
            };
            match parent {
                Some(next) => current = next,
                None => break,
            }
        }

        let database = self.database();
        let info = database
            .info()
            .object(fqon)
            .ok_or_else(|| NyanError::ObjectNotFound(fqon.to_owned()))?;
        Ok(Arc::clone(info.children()))
    }

    /// All transitive inheritance children of an object at time `t`.
    pub fn all_children_of(&self, fqon: &str, t: Order) -> Result<FnvHashSet<Fqon>> {
        let mut gathered = FnvHashSet::default();
        self.gather_children(&mut gathered, fqon, t)?;
        Ok(gathered)
    }

    fn gather_children(
        &self,
        target: &mut FnvHashSet<Fqon>,
        fqon: &str,
        t: Order,
    ) -> Result<()> {
        for child in self.children_of(fqon, t)?.iter() {
            if target.insert(child.clone()) {
                self.gather_children(target, child, t)?;
            }
        }
        Ok(())
    }

    /// Register a callback fired whenever the object (or one of its
    /// ancestors) changes through a transaction in this view.
    ///
    /// The subscription lives as long as the returned handle.
    pub fn create_notifier(
        &self,
        fqon: Fqon,
        callback: impl Fn(Order, &Fqon, &ObjectState) + 'static,
    ) -> NotifierHandle {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_notifier_id;
        inner.next_notifier_id += 1;
        inner
            .notifiers
            .entry(fqon.clone())
            .or_default()
            .push(NotifierEntry {
                id,
                callback: Rc::new(callback),
            });
        NotifierHandle {
            view: Rc::downgrade(&self.inner),
            fqon,
            id,
        }
    }

    /// Call every registered callback for the given changed objects.
    pub(crate) fn fire_notifications(&self, changed: &FnvHashSet<Fqon>, t: Order) {
        // collect first so callbacks can freely re-enter the view
        let mut calls: Vec<(Rc<UpdateCallback>, Fqon)> = Vec::new();
        {
            let inner = self.inner.borrow();
            for obj in changed {
                if let Some(entries) = inner.notifiers.get(obj) {
                    for entry in entries {
                        calls.push((Rc::clone(&entry.callback), obj.clone()));
                    }
                }
            }
        }

        for (callback, obj) in calls {
            if let Ok(state) = self.get_raw(&obj, t) {
                callback(t, &obj, &state);
            }
        }
    }

    /// Live child views; stale weak references are dropped on the way.
    pub(crate) fn children_handles(&self) -> Vec<View> {
        let mut inner = self.inner.borrow_mut();
        inner.children.retain(|child| child.strong_count() > 0);
        inner
            .children
            .iter()
            .filter_map(Weak::upgrade)
            .map(|inner| View { inner })
            .collect()
    }

    /// Whether two handles refer to the same view.
    pub fn ptr_eq(&self, other: &View) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // --- history access for the transaction engine -------------------

    pub(crate) fn state_before(&self, t: Order) -> Option<Arc<State>> {
        self.inner.borrow().history.state_before(t)
    }

    pub(crate) fn state_exact(&self, t: Order) -> Option<Arc<State>> {
        self.inner.borrow().history.state_exact(t).cloned()
    }

    pub(crate) fn insert_state(&self, state: Arc<State>, t: Order) {
        self.inner.borrow_mut().history.insert(state, t);
    }

    pub(crate) fn insert_linearization(&self, linearization: Arc<Vec<Fqon>>, t: Order) {
        self.inner
            .borrow_mut()
            .history
            .insert_linearization(linearization, t);
    }

    pub(crate) fn insert_children(&self, obj: &str, children: Arc<FnvHashSet<Fqon>>, t: Order) {
        self.inner
            .borrow_mut()
            .history
            .insert_children(obj, children, t);
    }
}

/// Keeps an object-change subscription alive; dropping the handle
/// deregisters the callback.
pub struct NotifierHandle {
    view: Weak<RefCell<ViewInner>>,
    fqon: Fqon,
    id: u64,
}

impl Drop for NotifierHandle {
    fn drop(&mut self) {
        let Some(inner) = self.view.upgrade() else {
            return;
        };
        let mut inner = inner.borrow_mut();
        if let Some(entries) = inner.notifiers.get_mut(&self.fqon) {
            entries.retain(|entry| entry.id != self.id);
            if entries.is_empty() {
                inner.notifiers.remove(&self.fqon);
            }
        }
    }
}
