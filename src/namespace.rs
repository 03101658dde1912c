//! Namespace identifiers and per-file name resolution.
//!
//! A file at directory path `a/b/c.nyan` exposes the namespace `a.b.c`;
//! objects nested inside an object concatenate further components with
//! dots.  Every parsed file gets a [`NamespaceFinder`] that records its
//! imports and aliases and resolves identifiers by searching from the
//! innermost namespace outward to the root, then through alias expansion.

use fnv::{FnvHashMap, FnvHashSet};

use crate::error::{LangError, NyanError, Result};
use crate::meta_info::MetaInfo;
use crate::token::{IdToken, Token};
use crate::Fqon;

const EXTENSION: &str = ".nyan";

/// Identifier of a namespace: a directory, a file, or a (nested) object.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Namespace {
    dir_components: Vec<String>,
    filename: String,
    obj_components: Vec<String>,
}

impl Namespace {
    /// Create a namespace from its components.
    pub fn new(
        dir_components: Vec<String>,
        filename: String,
        obj_components: Vec<String>,
    ) -> Namespace {
        Namespace {
            dir_components,
            filename,
            obj_components,
        }
    }

    /// Derive the namespace for a file name like `a/b/c.nyan`.
    ///
    /// The name must end in `.nyan` and contain no other dot.
    pub fn from_filename(filename: &str) -> Result<Namespace> {
        let Some(stem) = filename.strip_suffix(EXTENSION) else {
            return Err(NyanError::Name(LangError::new(
                crate::error::Location::builtin("namespace from filename"),
                format!("invalid file extension: '{}'", filename),
            )));
        };
        if stem.contains('.') {
            return Err(NyanError::Name(LangError::new(
                crate::error::Location::builtin("namespace from filename"),
                format!("there are too many dots in the path: '{}'", filename),
            )));
        }

        let mut components: Vec<String> = stem
            .split('/')
            .filter(|c| !c.is_empty())
            .map(str::to_owned)
            .collect();
        if components.is_empty() {
            return Err(NyanError::Name(LangError::new(
                crate::error::Location::builtin("namespace from filename"),
                format!("empty namespace name: '{}'", filename),
            )));
        }
        let file_component = components.pop().unwrap_or_default();

        Ok(Namespace::new(components, file_component, Vec::new()))
    }

    /// Derive a namespace from a dotted identifier like `a.b.c`.
    ///
    /// Import statements name files, so the last component becomes the
    /// filename part.
    pub fn from_id_token(name: &IdToken) -> Namespace {
        let mut components: Vec<String> = name
            .components()
            .iter()
            .map(|t| t.get().to_owned())
            .collect();
        let filename = components.pop().unwrap_or_default();
        Namespace::new(components, filename, Vec::new())
    }

    /// The namespace of an object nested inside this namespace.
    pub fn with_object(&self, name: &str) -> Namespace {
        let mut ns = self.clone();
        ns.obj_components.push(name.to_owned());
        ns
    }

    /// Remove the last component.  Does nothing on an empty namespace.
    pub fn pop_last(&mut self) {
        if !self.obj_components.is_empty() {
            self.obj_components.pop();
        } else if !self.filename.is_empty() {
            self.filename.clear();
        } else {
            self.dir_components.pop();
        }
    }

    /// Whether all components are empty.
    pub fn is_empty(&self) -> bool {
        self.dir_components.is_empty() && self.filename.is_empty() && self.obj_components.is_empty()
    }

    /// Append the components of `name` to this namespace and return the
    /// resulting fqon.  The first `skip` components of `name` are dropped.
    pub fn combine(&self, name: &IdToken, skip: usize) -> Fqon {
        let mut combined = self.clone();
        for part in name.components().iter().skip(skip) {
            combined.obj_components.push(part.get().to_owned());
        }
        combined.to_fqon()
    }

    /// Path of the file containing this namespace.
    pub fn to_filepath(&self) -> String {
        let mut path = self.dir_components.join("/");
        if !self.filename.is_empty() {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(&self.filename);
            path.push_str(EXTENSION);
        }
        path
    }

    /// The fqon of this namespace.
    pub fn to_fqon(&self) -> Fqon {
        let mut parts: Vec<&str> = self.dir_components.iter().map(String::as_str).collect();
        if !self.filename.is_empty() {
            parts.push(&self.filename);
        }
        parts.extend(self.obj_components.iter().map(String::as_str));
        parts.join(".")
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_fqon())
    }
}

/// Name lookup scope of one parsed file: which namespaces it imported and
/// under which aliases.
#[derive(Debug, Default)]
pub struct NamespaceFinder {
    imports: FnvHashSet<Namespace>,
    aliases: FnvHashMap<String, Namespace>,
}

impl NamespaceFinder {
    /// Record a plain import.
    pub fn add_import(&mut self, ns: Namespace) {
        self.imports.insert(ns);
    }

    /// Record an aliased import.  Redefining an alias is an error.
    pub fn add_alias(&mut self, alias: &Token, destination: Namespace) -> Result<()> {
        if self.aliases.contains_key(alias.get()) {
            return Err(NyanError::Name(LangError::new(
                alias.location.clone(),
                format!("redefinition of namespace alias '{}'", alias.get()),
            )));
        }
        self.aliases.insert(alias.get().to_owned(), destination);
        Ok(())
    }

    /// Whether an object name would clash with an alias or import of this
    /// file.
    pub fn check_conflict(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
            || self
                .imports
                .contains(&Namespace::new(Vec::new(), name.to_owned(), Vec::new()))
    }

    /// Expand a leading alias component; returns the plain name if the
    /// first component is no alias.
    pub fn expand_alias(&self, name: &IdToken) -> Fqon {
        match self.aliases.get(name.first()) {
            Some(destination) => destination.combine(name, 1),
            None => Namespace::from_id_token(name).to_fqon(),
        }
    }

    /// Resolve an identifier used in namespace `current` to the fqon of a
    /// known object: search from the current namespace outward to the
    /// root, then expand aliases.
    pub fn find(&self, current: &Namespace, search: &IdToken, meta: &MetaInfo) -> Result<Fqon> {
        if !search.exists() {
            return Err(NyanError::internal("tried to find namespace for empty id"));
        }

        let mut search_base = current.clone();
        loop {
            let result = search_base.combine(search, 0);
            if meta.has_object(&result) {
                return Ok(result);
            }

            if search_base.is_empty() {
                let result = self.expand_alias(search);
                if meta.has_object(&result) {
                    return Ok(result);
                }
                return Err(NyanError::Name(LangError::new(
                    search.location(),
                    format!("unknown name: '{}'", search.str()),
                )));
            }

            search_base.pop_last();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn filename_roundtrip() {
        let ns = Namespace::from_filename("a/b/c.nyan").expect("namespace");
        assert_eq!(ns.to_fqon(), "a.b.c");
        assert_eq!(ns.to_filepath(), "a/b/c.nyan");
    }

    #[test]
    fn bad_filenames_are_rejected() {
        assert_matches!(Namespace::from_filename("a/b/c.txt"), Err(NyanError::Name(_)));
        assert_matches!(
            Namespace::from_filename("a.b/c.nyan"),
            Err(NyanError::Name(_))
        );
        assert_matches!(Namespace::from_filename(".nyan"), Err(NyanError::Name(_)));
    }

    #[test]
    fn pop_last_walks_to_root() {
        let mut ns = Namespace::new(
            vec!["a".into()],
            "b".into(),
            vec!["O".into(), "N".into()],
        );
        assert_eq!(ns.to_fqon(), "a.b.O.N");
        ns.pop_last();
        assert_eq!(ns.to_fqon(), "a.b.O");
        ns.pop_last();
        assert_eq!(ns.to_fqon(), "a.b");
        ns.pop_last();
        assert_eq!(ns.to_fqon(), "a");
        ns.pop_last();
        assert!(ns.is_empty());
    }
}
