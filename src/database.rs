//! The database container and its loader.
//!
//! [`Database::load`] runs a one-shot sequence of passes over the root
//! file and every transitively imported file:
//!
//! 1. **Import closure**: fetch, tokenize and parse every requested
//!    namespace; record aliases and plain imports per file.
//! 2. **Info creation**: create an `ObjectInfo` per declared object,
//!    nested objects first.
//! 3. **Info population**: resolve patch targets, inheritance edits and
//!    parents through the namespace scopes; build the initial object
//!    states; create member infos with their declared types.
//! 4. **Linearization**: compute the C3 linearization of every object.
//! 5. **Type resolution**: propagate patch-ness along linearizations and
//!    lock every member onto its initial type definition.
//! 6. **State population**: construct member values from the AST and
//!    validate their operators.
//! 7. **Hierarchy check**: patches-only inheritance edits, override
//!    depth bounds, relative operators reaching an assignment, and
//!    concreteness of objects used as values.
//!
//! Any failure aborts the whole load; no partial database is exposed.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use fnv::{FnvHashMap, FnvHashSet};
use itertools::Itertools;
use log::debug;

use crate::ast::{Ast, AstObject};
use crate::c3::linearize;
use crate::error::{LangError, Location, NyanError, Result};
use crate::file::{fs_fetcher, FileFetcher, SourceFile};
use crate::lexer::tokenize;
use crate::member::Member;
use crate::meta_info::{InheritanceChange, MemberInfo, MetaInfo, ObjectInfo, PatchInfo};
use crate::namespace::{Namespace, NamespaceFinder};
use crate::object_state::ObjectState;
use crate::ops::Operator;
use crate::state::State;
use crate::types::{Type, TypeRef};
use crate::value::{ObjectReference, Value, ValueContext};
use crate::view::View;
use crate::{Fqon, MemberId};

/// The nyan database: declared structure plus the initial state.
///
/// Immutable once loaded; all modification happens through views and
/// transactions, which only layer new states on top.
#[derive(Debug)]
pub struct Database {
    meta_info: MetaInfo,
    state: Arc<State>,
}

impl Database {
    /// Load a database from a root file, fetching all imports through
    /// the given callable.
    pub fn load(root_file: &str, fetcher: &mut FileFetcher<'_>) -> Result<Arc<Database>> {
        let mut loader = Loader::default();
        loader.run(root_file, fetcher)?;
        Ok(Arc::new(loader.finish()?))
    }

    /// Load a database from a root file below a directory on disk.
    pub fn from_dir(dir: impl AsRef<Path>, root_file: &str) -> Result<Arc<Database>> {
        let mut fetcher = fs_fetcher(dir.as_ref());
        Database::load(root_file, &mut fetcher)
    }

    /// Create a new view on this database.
    pub fn new_view(self: &Arc<Self>) -> View {
        View::new(Arc::clone(self))
    }

    /// The declared structure of the database content.
    pub fn info(&self) -> &MetaInfo {
        &self.meta_info
    }

    /// The initial state, shared by all views.
    pub fn initial_state(&self) -> &Arc<State> {
        &self.state
    }
}

/// One parsed file with its name scope.
struct LoadedFile {
    namespace: Namespace,
    finder: NamespaceFinder,
    ast: Ast,
}

/// Working storage of one `Database::load` run.
#[derive(Default)]
struct Loader {
    meta: MetaInfo,
    states: FnvHashMap<Fqon, ObjectState>,
    files: Vec<LoadedFile>,
    new_objects: Vec<Fqon>,
    child_assignments: FnvHashMap<Fqon, FnvHashSet<Fqon>>,
    value_refs: Vec<ObjectReference>,
}

/// Walk all objects of all files, nested objects before their container.
fn walk_all<F>(files: &[LoadedFile], mut callback: F) -> Result<()>
where
    F: FnMut(&LoadedFile, &Namespace, &Namespace, &AstObject) -> Result<()>,
{
    fn recurse<F>(
        file: &LoadedFile,
        ns: &Namespace,
        objects: &[AstObject],
        callback: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&LoadedFile, &Namespace, &Namespace, &AstObject) -> Result<()>,
    {
        for obj in objects {
            let obj_ns = ns.with_object(obj.name.get());
            recurse(file, &obj_ns, &obj.objects, callback)?;
            callback(file, ns, &obj_ns, obj)?;
        }
        Ok(())
    }

    for file in files {
        recurse(file, &file.namespace, &file.ast.objects, &mut callback)?;
    }
    Ok(())
}

impl Loader {
    fn run(&mut self, root_file: &str, fetcher: &mut FileFetcher<'_>) -> Result<()> {
        self.import_closure(root_file, fetcher)?;

        let files = std::mem::take(&mut self.files);

        debug!("creating object infos");
        self.create_object_infos(&files)?;

        debug!("populating object infos");
        self.populate_object_infos(&files)?;

        debug!("linearizing {} objects", self.new_objects.len());
        self.linearize_new()?;

        debug!("resolving member types");
        self.resolve_types()?;

        debug!("creating object states");
        self.create_object_states(&files)?;

        debug!("checking hierarchy consistency");
        self.check_hierarchy()?;

        self.files = files;
        Ok(())
    }

    /// Fetch and parse the root file and, fixpoint-wise, everything it
    /// imports.  Duplicate imports are silently ignored.
    fn import_closure(&mut self, root_file: &str, fetcher: &mut FileFetcher<'_>) -> Result<()> {
        let root_ns = Namespace::from_filename(root_file)?;
        let mut pending: VecDeque<(Namespace, Location)> = VecDeque::new();
        pending.push_back((root_ns, Location::builtin("requested by Database::load")));
        let mut seen: FnvHashSet<Namespace> = FnvHashSet::default();

        while let Some((namespace, requested_at)) = pending.pop_front() {
            if !seen.insert(namespace.clone()) {
                continue;
            }

            let filename = namespace.to_filepath();
            let text = fetcher(&filename).map_err(|err| {
                NyanError::FileRead(LangError::new(
                    requested_at.clone(),
                    format!("failed to read '{}': {}", filename, err),
                ))
            })?;
            let file = Arc::new(SourceFile::new(filename, text));

            debug!("parsing namespace {}", namespace);
            let ast = Ast::parse(tokenize(&file)?)?;

            let mut finder = NamespaceFinder::default();
            for import in &ast.imports {
                let request = Namespace::from_id_token(&import.namespace);
                match &import.alias {
                    Some(alias) => finder.add_alias(alias, request.clone())?,
                    None => finder.add_import(request.clone()),
                }
                if !seen.contains(&request) {
                    pending.push_back((request, import.namespace.location()));
                }
            }

            self.files.push(LoadedFile {
                namespace,
                finder,
                ast,
            });
        }

        Ok(())
    }

    fn create_object_infos(&mut self, files: &[LoadedFile]) -> Result<()> {
        let meta = &mut self.meta;
        walk_all(files, |file, _ns, obj_ns, obj| {
            if file.finder.check_conflict(obj.name.get()) {
                return Err(NyanError::Name(LangError::new(
                    obj.name.location.clone(),
                    format!("object name conflicts with import: '{}'", obj.name.get()),
                )));
            }
            meta.add_object(obj_ns.to_fqon(), ObjectInfo::new(obj.name.location.clone()))?;
            Ok(())
        })
    }

    fn populate_object_infos(&mut self, files: &[LoadedFile]) -> Result<()> {
        let meta = &mut self.meta;
        let states = &mut self.states;
        let new_objects = &mut self.new_objects;
        let child_assignments = &mut self.child_assignments;

        walk_all(files, |file, ns, obj_ns, obj| {
            let fqon = obj_ns.to_fqon();
            new_objects.push(fqon.clone());

            // the patch target is resolved in the containing namespace
            let patch = match &obj.target {
                Some(target) => Some(Arc::new(PatchInfo::new(
                    file.finder.find(ns, target, meta)?,
                ))),
                None => None,
            };

            let mut inheritance_changes = Vec::new();
            for change in &obj.inheritance_changes {
                let target = file.finder.find(ns, &change.target, meta)?;
                inheritance_changes.push(InheritanceChange::new(change.direction, target));
            }

            let mut parents = VecDeque::new();
            for parent in &obj.parents {
                let parent_id = file.finder.find(ns, parent, meta)?;
                child_assignments
                    .entry(parent_id.clone())
                    .or_default()
                    .insert(fqon.clone());
                parents.push_back(parent_id);
            }

            // member types are resolved in the object's own namespace
            let mut members: Vec<(MemberId, MemberInfo)> = Vec::new();
            for astmember in &obj.members {
                let member_id = astmember.name.str();
                if members.iter().any(|(id, _)| *id == member_id) {
                    return Err(NyanError::Name(LangError::new(
                        astmember.name.location(),
                        format!("member '{}' already declared in this object", member_id),
                    )));
                }
                let mut member_info = MemberInfo::new(astmember.name.location());
                if let Some(ast_type) = &astmember.member_type {
                    let member_type = Type::from_ast(ast_type, &file.finder, obj_ns, meta)?;
                    // a declared type is the initial definition
                    member_info.set_type(Arc::new(member_type), true);
                }
                members.push((member_id, member_info));
            }

            let info = meta
                .object_mut(&fqon)
                .ok_or_else(|| NyanError::internal("object info could not be retrieved"))?;
            if let Some(patch) = patch {
                info.add_patch(patch, true);
            }
            for change in inheritance_changes {
                info.add_inheritance_change(change);
            }
            for (member_id, member_info) in members {
                info.add_member(member_id, member_info);
            }

            states.insert(fqon, ObjectState::new(parents));
            Ok(())
        })
    }

    fn linearize_new(&mut self) -> Result<()> {
        let states = &self.states;
        for obj in &self.new_objects {
            let linearization = linearize(obj, &|name: &str| {
                states
                    .get(name)
                    .map(|state| state.parents().iter().cloned().collect())
                    .ok_or_else(|| {
                        NyanError::internal(format!("object state not found for '{}'", name))
                    })
            })?;
            self.meta
                .object_mut(obj)
                .ok_or_else(|| NyanError::internal("object info could not be retrieved"))?
                .set_linearization(linearization);
        }
        Ok(())
    }

    /// Find a member along a linearization and, recursively, along the
    /// patch-target chain.  `visit` returns true to stop the search.
    fn find_member(
        &self,
        skip_first: bool,
        member_id: &str,
        search: &[Fqon],
        origin: &ObjectInfo,
        visit: &mut dyn FnMut(&Fqon, &MemberInfo, Option<&Member>) -> bool,
    ) -> Result<()> {
        let mut finished = false;
        for obj in search.iter().skip(usize::from(skip_first)) {
            let info = self
                .meta
                .object(obj)
                .ok_or_else(|| NyanError::internal("object info could not be retrieved"))?;
            let Some(member_info) = info.member(member_id) else {
                continue;
            };
            let member = self
                .states
                .get(obj)
                .and_then(|state| state.member(member_id));
            finished = visit(obj, member_info, member);
            if finished {
                break;
            }
        }

        // recurse into the patch target chain
        if !finished {
            if let Some(patch) = origin.patch() {
                let target_info = self
                    .meta
                    .object(patch.target())
                    .ok_or_else(|| NyanError::internal("patch target not found in metainfo"))?;
                let target_lin = target_info.linearization().clone();
                self.find_member(false, member_id, &target_lin, target_info, visit)?;
            }
        }

        Ok(())
    }

    fn resolve_types(&mut self) -> Result<()> {
        // link inherited patch information to the declaring ancestor and
        // reject redeclared patch targets
        for obj in &self.new_objects {
            let info = self
                .meta
                .object(obj)
                .ok_or_else(|| NyanError::internal("object info could not be retrieved"))?;
            let linearization = info.linearization().clone();
            if linearization.is_empty() {
                return Err(NyanError::internal(
                    "linearization doesn't contain the object itself",
                ));
            }
            let is_initial_patch = info.is_initial_patch();
            let obj_location = info.location().clone();

            let mut inherited: Option<Arc<PatchInfo>> = None;
            for parent in linearization.iter().skip(1) {
                let parent_info = self
                    .meta
                    .object(parent)
                    .ok_or_else(|| NyanError::internal("parent info could not be retrieved"))?;
                if !parent_info.is_initial_patch() {
                    continue;
                }
                if is_initial_patch {
                    return Err(NyanError::Lang(
                        LangError::new(
                            obj_location.clone(),
                            "child patches can't declare a patch target",
                        )
                            .with_note(
                                parent_info.location().clone(),
                                "parent that declares the patch",
                            ),
                    ));
                }
                inherited = Some(Arc::clone(parent_info.patch().ok_or_else(|| {
                    NyanError::internal("initial patch without patch info")
                })?));
            }

            if let Some(patch) = inherited {
                self.meta
                    .object_mut(obj)
                    .ok_or_else(|| NyanError::internal("object info could not be retrieved"))?
                    .add_patch(patch, false);
            }
        }

        // lock every member onto its unique initial type definition
        for obj in &self.new_objects {
            let (member_ids, linearization) = {
                let info = self
                    .meta
                    .object(obj)
                    .ok_or_else(|| NyanError::internal("object info could not be retrieved"))?;
                let ids: Vec<MemberId> = info.members().keys().cloned().collect();
                (ids, info.linearization().clone())
            };

            for member_id in member_ids {
                let mut inherited_type: Option<TypeRef> = None;
                let mut conflict: Option<(Fqon, Location)> = None;
                let (own_initial, member_location) = {
                    let info = self
                        .meta
                        .object(obj)
                        .ok_or_else(|| NyanError::internal("object info could not be retrieved"))?;
                    let member_info = info
                        .member(&member_id)
                        .ok_or_else(|| NyanError::internal("member info could not be retrieved"))?;
                    (member_info.is_initial_def(), member_info.location().clone())
                };

                {
                    let info = self
                        .meta
                        .object(obj)
                        .ok_or_else(|| NyanError::internal("object info could not be retrieved"))?;
                    self.find_member(
                        true,
                        &member_id,
                        &linearization,
                        info,
                        &mut |parent, source_info, _member| {
                            if source_info.is_initial_def() {
                                if own_initial || inherited_type.is_some() {
                                    conflict =
                                        Some((parent.clone(), source_info.location().clone()));
                                } else if let Some(ty) = source_info.member_type() {
                                    inherited_type = Some(Arc::clone(ty));
                                }
                            }
                            // traverse everything, never stop early
                            false
                        },
                    )?;
                }

                if let Some((parent, source_location)) = conflict {
                    return Err(NyanError::Lang(
                        LangError::new(
                            member_location,
                            format!(
                                "parent '{}' already defines type of '{}'",
                                parent, member_id
                            ),
                        )
                        .with_note(source_location, "parent that declares the member"),
                    ));
                }

                if own_initial {
                    continue;
                }

                match inherited_type {
                    Some(member_type) => {
                        self.meta
                            .object_mut(obj)
                            .ok_or_else(|| {
                                NyanError::internal("object info could not be retrieved")
                            })?
                            .members_mut()
                            .get_mut(&member_id)
                            .ok_or_else(|| {
                                NyanError::internal("member info could not be retrieved")
                            })?
                            .set_type(member_type, false);
                    }
                    None => {
                        return Err(NyanError::Type(LangError::new(
                            member_location,
                            format!(
                                "could not infer type of '{}' from parents or patch target",
                                member_id
                            ),
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    fn create_object_states(&mut self, files: &[LoadedFile]) -> Result<()> {
        let meta = &self.meta;
        let states = &mut self.states;
        let value_refs = &mut self.value_refs;

        walk_all(files, |file, _ns, obj_ns, obj| {
            if obj.members.is_empty() {
                return Ok(());
            }
            let fqon = obj_ns.to_fqon();

            let mut members: FnvHashMap<MemberId, Member> = FnvHashMap::default();
            for astmember in &obj.members {
                let Some(ast_value) = &astmember.value else {
                    continue;
                };
                let member_id = astmember.name.str();

                let operation = astmember
                    .operation
                    .ok_or_else(|| NyanError::internal("member has a value but no operator"))?;
                let member_type: TypeRef = meta
                    .object(&fqon)
                    .and_then(|info| info.member(&member_id))
                    .and_then(|member_info| member_info.member_type())
                    .cloned()
                    .ok_or_else(|| NyanError::internal("member type could not be retrieved"))?;

                let value = {
                    let mut ctx = ValueContext {
                        scope: &file.finder,
                        namespace: obj_ns,
                        meta,
                        refs: value_refs,
                    };
                    Value::from_ast(&member_type, ast_value, &mut ctx)?
                };

                // the modifier flags don't restrict operators, so the
                // basic type is already the unwrapped type
                let allowed = value.allowed_operations(member_type.basic());
                if !allowed.contains(&operation) {
                    return Err(NyanError::Type(LangError::new(
                        astmember.name.location(),
                        format!(
                            "invalid operator {}: member type {} {} for value {}",
                            operation,
                            member_type,
                            if allowed.is_empty() {
                                "allows no operations".to_owned()
                            } else {
                                format!(
                                    "only allows operations '{}'",
                                    allowed.iter().map(|op| op.to_string()).sorted().join(", ")
                                )
                            },
                            value
                        ),
                    )));
                }

                members.insert(
                    member_id,
                    Member::new(astmember.override_depth, operation, member_type, value),
                );
            }

            states
                .get_mut(&fqon)
                .ok_or_else(|| NyanError::internal("initial object state could not be retrieved"))?
                .set_members(members);
            Ok(())
        })
    }

    /// Chain length from a patch through its target while the target is
    /// itself a patch; bounds the member override depth.
    fn patch_chain_depth(&self, info: &ObjectInfo) -> usize {
        let mut depth = 0;
        let mut current = info;
        let mut seen: FnvHashSet<Fqon> = FnvHashSet::default();
        while let Some(patch) = current.patch() {
            depth += 1;
            if !seen.insert(patch.target().clone()) {
                break;
            }
            match self.meta.object(patch.target()) {
                Some(next) => current = next,
                None => break,
            }
        }
        depth
    }

    fn check_hierarchy(&self) -> Result<()> {
        for obj in &self.new_objects {
            let info = self
                .meta
                .object(obj)
                .ok_or_else(|| NyanError::internal("object info could not be retrieved"))?;
            let state = self.states.get(obj).ok_or_else(|| {
                NyanError::internal("initial object state could not be retrieved")
            })?;

            if !info.inheritance_changes().is_empty() && !info.is_patch() {
                return Err(NyanError::Lang(LangError::new(
                    info.location().clone(),
                    "inheritance additions can only be done in patches",
                )));
            }

            let chain_depth = self.patch_chain_depth(info);
            let linearization = info.linearization().clone();

            for (member_id, member) in state.members() {
                let member_location = info
                    .member(member_id)
                    .map(|member_info| member_info.location().clone())
                    .unwrap_or_else(|| Location::builtin("member check"));

                // the override depth cannot exceed the patch target chain
                if member.override_depth() as usize > chain_depth {
                    return Err(NyanError::Lang(LangError::new(
                        member_location,
                        format!(
                            "override depth {} exceeds the patch target chain depth {}",
                            member.override_depth(),
                            chain_depth
                        ),
                    )));
                }

                // a relative operator is meaningless when nothing in the
                // chain ever assigns a base value
                let mut assign_ok = false;
                let mut other_op = false;
                self.find_member(
                    false,
                    member_id,
                    &linearization,
                    info,
                    &mut |_, _, member| match member {
                        None => false,
                        Some(member) => {
                            if member.operation() == Operator::Assign {
                                assign_ok = true;
                                true
                            } else {
                                other_op = true;
                                false
                            }
                        }
                    },
                )?;

                if other_op && !assign_ok {
                    return Err(NyanError::Lang(LangError::new(
                        member_location,
                        "this member was never assigned a value",
                    )));
                }
            }
        }

        // objects referenced as values must be concrete unless the value
        // position allows abstract objects
        let mut known_concrete: FnvHashSet<&Fqon> = FnvHashSet::default();
        for reference in &self.value_refs {
            if reference.allow_abstract || known_concrete.contains(&reference.fqon) {
                continue;
            }

            let info = self
                .meta
                .object(&reference.fqon)
                .ok_or_else(|| NyanError::internal("object used as value has no metainfo"))?;

            let mut pending: FnvHashSet<&MemberId> = FnvHashSet::default();
            for obj in info.linearization().iter().rev() {
                let obj_info = self
                    .meta
                    .object(obj)
                    .ok_or_else(|| NyanError::internal("object in hierarchy has no metainfo"))?;
                let obj_state = self
                    .states
                    .get(obj)
                    .ok_or_else(|| NyanError::internal("object in hierarchy has no state"))?;

                for member_id in obj_info.members().keys() {
                    if !obj_state.has_member(member_id) {
                        pending.insert(member_id);
                    }
                }
                for (member_id, member) in obj_state.members() {
                    if member.operation() == Operator::Assign {
                        pending.remove(member_id);
                    }
                }
            }

            if !pending.is_empty() {
                return Err(NyanError::Type(LangError::new(
                    reference.location.clone(),
                    format!(
                        "this object has members without values: {}",
                        pending.iter().sorted().join(", ")
                    ),
                )));
            }
            known_concrete.insert(&reference.fqon);
        }

        Ok(())
    }

    fn finish(mut self) -> Result<Database> {
        // store the children mapping
        for (obj, children) in std::mem::take(&mut self.child_assignments) {
            self.meta
                .object_mut(&obj)
                .ok_or_else(|| NyanError::internal("object info could not be retrieved"))?
                .set_children(children);
        }

        let mut state = State::new(None);
        for (fqon, object_state) in self.states {
            state.add_object(fqon, Arc::new(object_state))?;
        }

        debug!("database loaded: {} objects", self.meta.objects().len());

        Ok(Database {
            meta_info: self.meta,
            state: Arc::new(state),
        })
    }
}
