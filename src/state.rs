//! Full database state for one point in time.

use std::sync::Arc;

use fnv::FnvHashMap;

use crate::error::{NyanError, Result};
use crate::object_state::ObjectState;
use crate::view::View;
use crate::{Fqon, Order};

/// Database state at one point in time.
///
/// The initial state holds every object loaded from disk; subsequent
/// states hold only the objects a transaction modified and chain
/// backwards through their previous state.  Object states are shared
/// between states that did not modify them.
#[derive(Clone, Debug, Default)]
pub struct State {
    objects: FnvHashMap<Fqon, Arc<ObjectState>>,
    previous: Option<Arc<State>>,
}

impl State {
    /// Create a state that follows `previous`.
    pub fn new(previous: Option<Arc<State>>) -> State {
        State {
            objects: FnvHashMap::default(),
            previous,
        }
    }

    /// The object state stored for a name, if this state has it.
    pub fn get(&self, fqon: &str) -> Option<&Arc<ObjectState>> {
        self.objects.get(fqon)
    }

    /// Add an object to the state.  Only the initial state may grow new
    /// objects; patches modify copies instead.
    pub fn add_object(&mut self, name: Fqon, obj: Arc<ObjectState>) -> Result<()> {
        if self.previous.is_some() {
            return Err(NyanError::internal(
                "can't add a new object to a non-initial state",
            ));
        }
        if self.objects.insert(name, obj).is_some() {
            return Err(NyanError::internal(
                "added an already-known object to the state",
            ));
        }
        Ok(())
    }

    /// Replace or add the object states of this state with all entries
    /// of another state.
    pub fn update(&mut self, source: State) {
        for (name, obj) in source.objects {
            self.objects.insert(name, obj);
        }
    }

    /// Make sure `name` is present in this state, importing a copy of
    /// its newest object state from `origin` if necessary.
    pub fn copy_object(&mut self, name: &str, t: Order, origin: &View) -> Result<()> {
        if self.objects.contains_key(name) {
            return Ok(());
        }
        let source = origin.get_raw(name, t)?;
        self.objects
            .insert(name.to_owned(), Arc::new((*source).clone()));
        Ok(())
    }

    /// Mutable access to an object of this state.  Clones the object
    /// state first if it is still shared with another state.
    pub fn object_mut(&mut self, name: &str) -> Option<&mut ObjectState> {
        self.objects.get_mut(name).map(Arc::make_mut)
    }

    /// All object states of this state.
    pub fn objects(&self) -> &FnvHashMap<Fqon, Arc<ObjectState>> {
        &self.objects
    }

    /// The state this one chains back to.
    pub fn previous(&self) -> Option<&Arc<State>> {
        self.previous.as_ref()
    }
}
