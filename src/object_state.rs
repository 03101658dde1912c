//! Per-object runtime state: parents and member values.

use std::collections::VecDeque;

use fnv::FnvHashMap;

use crate::error::{NyanError, Result};
use crate::member::Member;
use crate::meta_info::ObjectInfo;
use crate::ops::InheritanceDirection;
use crate::transaction::ObjectChanges;
use crate::{Fqon, MemberId};

/// The state of a single object at one point in history.
///
/// The parent order is semantically significant: it decides the C3
/// linearization outcome.  States are shared immutably between points in
/// history that did not modify them; a transaction clones before writing.
#[derive(Clone, Debug, Default)]
pub struct ObjectState {
    parents: VecDeque<Fqon>,
    members: FnvHashMap<MemberId, Member>,
}

impl ObjectState {
    /// Create an initial state with the declared parents.
    pub fn new(parents: VecDeque<Fqon>) -> ObjectState {
        ObjectState {
            parents,
            members: FnvHashMap::default(),
        }
    }

    /// The parents of this object, in order.
    pub fn parents(&self) -> &VecDeque<Fqon> {
        &self.parents
    }

    /// Whether the object has a member entry with this name.
    pub fn has_member(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// The member entry for a name, if present.
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    /// All member entries by member id.
    pub fn members(&self) -> &FnvHashMap<MemberId, Member> {
        &self.members
    }

    /// Replace the member map; used when building initial states.
    pub fn set_members(&mut self, members: FnvHashMap<MemberId, Member>) {
        self.members = members;
    }

    /// Apply a patch component to this state.
    ///
    /// `patch` is the state of one element of the patch's linearization
    /// and `patch_info` that element's metadata.  Inheritance edits are
    /// recorded in `tracker` so the transaction can relinearize.
    pub fn apply(
        &mut self,
        patch: &ObjectState,
        patch_info: &ObjectInfo,
        tracker: &mut ObjectChanges,
    ) -> Result<()> {
        for change in patch_info.inheritance_changes() {
            // only add the parent if it does not exist yet
            if self.parents.contains(change.target()) {
                continue;
            }
            match change.direction() {
                InheritanceDirection::AddFront => {
                    self.parents.push_front(change.target().clone());
                }
                InheritanceDirection::AddBack => {
                    self.parents.push_back(change.target().clone());
                }
            }
            tracker.add_parent(change.target().clone());
        }

        for (name, change) in patch.members() {
            match self.members.get_mut(name) {
                Some(member) => member.apply(change)?,
                None => {
                    // copy the member in from the patch: it is a new
                    // override for downstream children
                    if !patch_info.is_patch() {
                        return Err(NyanError::internal(
                            "a non-patch tried to change a nonexisting member",
                        ));
                    }
                    self.members.insert(name.clone(), change.clone());
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Location;
    use crate::meta_info::{InheritanceChange, PatchInfo};
    use crate::ops::Operator;
    use crate::types::{Primitive, Type};
    use crate::value::Value;
    use std::sync::Arc;

    fn int_member(op: Operator, value: i64) -> Member {
        Member::new(
            0,
            op,
            Arc::new(Type::fundamental(Primitive::Int, Default::default())),
            Value::Int(value),
        )
    }

    fn patch_info(target: &str) -> ObjectInfo {
        let mut info = ObjectInfo::new(Location::builtin("test"));
        info.add_patch(Arc::new(PatchInfo::new(target.into())), true);
        info
    }

    #[test]
    fn members_fold_and_copy_in() {
        let mut target = ObjectState::new(VecDeque::new());
        let mut members = FnvHashMap::default();
        members.insert("x".to_owned(), int_member(Operator::Assign, 3));
        target.set_members(members);

        let mut patch = ObjectState::new(VecDeque::new());
        let mut members = FnvHashMap::default();
        members.insert("x".to_owned(), int_member(Operator::AddAssign, 2));
        members.insert("y".to_owned(), int_member(Operator::Assign, 7));
        patch.set_members(members);

        let mut tracker = ObjectChanges::default();
        target
            .apply(&patch, &patch_info("t"), &mut tracker)
            .unwrap();

        assert_eq!(target.member("x").unwrap().value(), &Value::Int(5));
        assert_eq!(target.member("y").unwrap().value(), &Value::Int(7));
    }

    #[test]
    fn inheritance_edits_update_parents_once() {
        let mut target = ObjectState::new(VecDeque::from(["base".to_owned()]));

        let patch = ObjectState::new(VecDeque::new());
        let mut info = patch_info("t");
        info.add_inheritance_change(InheritanceChange::new(
            crate::ops::InheritanceDirection::AddFront,
            "extra".into(),
        ));

        let mut tracker = ObjectChanges::default();
        target.apply(&patch, &info, &mut tracker).unwrap();
        assert_eq!(target.parents(), &VecDeque::from(["extra".to_owned(), "base".to_owned()]));
        assert!(tracker.parents_update_required());

        // a second application must not duplicate the parent
        let mut tracker = ObjectChanges::default();
        target.apply(&patch, &info, &mut tracker).unwrap();
        assert_eq!(target.parents().len(), 2);
        assert!(!tracker.parents_update_required());
    }
}
