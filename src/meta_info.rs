//! Metadata about the declared structure of the database.
//!
//! The info layer describes what the source files *declared*, independent
//! of any state: member types, patch targets, inheritance edits, initial
//! linearizations.  It is built once by the loader and read-only
//! afterwards; states and views never modify it.

use fnv::{FnvHashMap, FnvHashSet};
use std::sync::Arc;

use crate::error::{LangError, Location, NyanError, Result};
use crate::ops::InheritanceDirection;
use crate::types::TypeRef;
use crate::{Fqon, MemberId};

/// Metadata of one declared member.
#[derive(Debug)]
pub struct MemberInfo {
    location: Location,
    initial_def: bool,
    member_type: Option<TypeRef>,
}

impl MemberInfo {
    /// Create the info for a member declared at `location`.
    pub fn new(location: Location) -> MemberInfo {
        MemberInfo {
            location,
            initial_def: false,
            member_type: None,
        }
    }

    /// Set the member's type.  `initial` marks the declaration an
    /// inheritance search locks onto; inherited and patch members store
    /// the shared type with `initial == false`.
    pub fn set_type(&mut self, member_type: TypeRef, initial: bool) {
        self.initial_def = initial;
        self.member_type = Some(member_type);
    }

    /// The member's resolved type, if it is known yet.
    pub fn member_type(&self) -> Option<&TypeRef> {
        self.member_type.as_ref()
    }

    /// Whether this member carries the initial type definition.
    pub fn is_initial_def(&self) -> bool {
        self.initial_def
    }

    /// Where the member was declared.
    pub fn location(&self) -> &Location {
        &self.location
    }
}

/// Target information of a patch, shared by every object that inherits
/// the patch-ness from a common ancestor.
#[derive(Debug)]
pub struct PatchInfo {
    target: Fqon,
}

impl PatchInfo {
    /// Create patch info for a target object.
    pub fn new(target: Fqon) -> PatchInfo {
        PatchInfo { target }
    }

    /// The object this patch modifies.
    pub fn target(&self) -> &Fqon {
        &self.target
    }
}

/// A resolved inheritance edit a patch performs on its target.
#[derive(Clone, Debug)]
pub struct InheritanceChange {
    direction: InheritanceDirection,
    target: Fqon,
}

impl InheritanceChange {
    /// Create an inheritance edit.
    pub fn new(direction: InheritanceDirection, target: Fqon) -> InheritanceChange {
        InheritanceChange { direction, target }
    }

    /// Front or back insertion.
    pub fn direction(&self) -> InheritanceDirection {
        self.direction
    }

    /// The parent object to splice in.
    pub fn target(&self) -> &Fqon {
        &self.target
    }
}

/// Metadata of one declared object.
#[derive(Debug)]
pub struct ObjectInfo {
    location: Location,
    /// True when this object was declared with a `<target>` clause
    /// itself, false when the patch-ness is inherited.
    initial_patch: bool,
    patch: Option<Arc<PatchInfo>>,
    inheritance_changes: Vec<InheritanceChange>,
    members: FnvHashMap<MemberId, MemberInfo>,
    initial_linearization: Arc<Vec<Fqon>>,
    initial_children: Arc<FnvHashSet<Fqon>>,
}

impl ObjectInfo {
    /// Create the info for an object declared at `location`.
    pub fn new(location: Location) -> ObjectInfo {
        ObjectInfo {
            location,
            initial_patch: false,
            patch: None,
            inheritance_changes: Vec::new(),
            members: FnvHashMap::default(),
            initial_linearization: Arc::new(Vec::new()),
            initial_children: Arc::new(FnvHashSet::default()),
        }
    }

    /// Where the object was declared.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Add the metadata record for a member.
    pub fn add_member(&mut self, name: MemberId, info: MemberInfo) -> &mut MemberInfo {
        self.members.entry(name).or_insert(info)
    }

    /// All member metadata records by member id.
    pub fn members(&self) -> &FnvHashMap<MemberId, MemberInfo> {
        &self.members
    }

    /// Mutable access to the member metadata records.
    pub fn members_mut(&mut self) -> &mut FnvHashMap<MemberId, MemberInfo> {
        &mut self.members
    }

    /// The metadata record for one member, if it is declared here.
    pub fn member(&self, name: &str) -> Option<&MemberInfo> {
        self.members.get(name)
    }

    /// Attach patch metadata.  `initial` is true when this object itself
    /// declared the `<target>` clause.
    pub fn add_patch(&mut self, info: Arc<PatchInfo>, initial: bool) {
        self.initial_patch = initial;
        self.patch = Some(info);
    }

    /// The patch metadata, if this object is a patch.
    pub fn patch(&self) -> Option<&Arc<PatchInfo>> {
        self.patch.as_ref()
    }

    /// Whether this object is a patch, declared or inherited.
    pub fn is_patch(&self) -> bool {
        self.patch.is_some()
    }

    /// Whether this object declared the patch target itself.
    pub fn is_initial_patch(&self) -> bool {
        self.initial_patch
    }

    /// Register an inheritance edit this patch performs.
    pub fn add_inheritance_change(&mut self, change: InheritanceChange) {
        self.inheritance_changes.push(change);
    }

    /// The inheritance edits this patch performs on its target.
    pub fn inheritance_changes(&self) -> &[InheritanceChange] {
        &self.inheritance_changes
    }

    /// Store the load-time linearization.
    pub fn set_linearization(&mut self, linearization: Vec<Fqon>) {
        self.initial_linearization = Arc::new(linearization);
    }

    /// The load-time C3 linearization of the object.
    pub fn linearization(&self) -> &Arc<Vec<Fqon>> {
        &self.initial_linearization
    }

    /// Store the load-time direct children.
    pub fn set_children(&mut self, children: FnvHashSet<Fqon>) {
        self.initial_children = Arc::new(children);
    }

    /// The load-time direct children of the object.
    pub fn children(&self) -> &Arc<FnvHashSet<Fqon>> {
        &self.initial_children
    }
}

/// Database metadata: all object infos by fqon.
#[derive(Debug, Default)]
pub struct MetaInfo {
    objects: FnvHashMap<Fqon, ObjectInfo>,
}

impl MetaInfo {
    /// Register a new object.  Redefinition is an error that points at
    /// both declarations.
    pub fn add_object(&mut self, name: Fqon, info: ObjectInfo) -> Result<&mut ObjectInfo> {
        match self.objects.entry(name) {
            std::collections::hash_map::Entry::Occupied(entry) => Err(NyanError::Name(
                LangError::new(info.location().clone(), "object already defined").with_note(
                    entry.get().location().clone(),
                    "first defined here",
                ),
            )),
            std::collections::hash_map::Entry::Vacant(entry) => Ok(entry.insert(info)),
        }
    }

    /// All object infos by fqon.
    pub fn objects(&self) -> &FnvHashMap<Fqon, ObjectInfo> {
        &self.objects
    }

    /// The info of one object.
    pub fn object(&self, name: &str) -> Option<&ObjectInfo> {
        self.objects.get(name)
    }

    /// Mutable info of one object.
    pub fn object_mut(&mut self, name: &str) -> Option<&mut ObjectInfo> {
        self.objects.get_mut(name)
    }

    /// Whether an object with this fqon exists.
    pub fn has_object(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }
}
