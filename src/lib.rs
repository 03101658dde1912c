//! Main API entry point for loading and querying nyan databases.
//!
//! nyan is an in-process database for typed, inheriting, patchable data
//! objects.  Content is written in the nyan data language: hierarchies of
//! objects whose members carry typed values (numbers, text, files, booleans,
//! references to other objects, and set/orderedset/dict composites thereof).
//! A [`Database`] is produced once by [`Database::load`], which parses a root
//! file plus its transitive imports and resolves all names, inheritance
//! relations and member types.  After that the database itself never changes.
//!
//! ## Objects, patches and time
//!
//! The signature idea of nyan is that a *patch* is itself an object.  An
//! object declared as `Change<Target>(...)` carries members that, when the
//! patch is applied, are folded into `Target`'s state with their operators
//! (`=`, `+=`, `-=`, `*=`, `/=`, `|=`, `&=`).  A patch may also splice new
//! parents into its target's inheritance, which triggers a C3
//! relinearization of the affected subtree.
//!
//! Patches are applied through a [`Transaction`] at a chosen point on an
//! ordering axis ("time", an opaque `u64`).  Every view keeps a full history
//! of its states over time, so the same object can be queried at different
//! times and yield different member values.
//!
//! ## Views
//!
//! A [`View`] is a layered window onto the database.  Distinct views evolve
//! independently: a transaction committed in one view is invisible in
//! another, while both share the immutable initial state underneath.  Views
//! can spawn child views; a transaction against a view also applies to all
//! transitively reachable children, so child views always contain their
//! parent's changes plus their own.
//!
//! Object states are shared between the states that did not modify them and
//! copied right before the first write, so a transaction only pays for the
//! objects it actually touches.
//!
//! ## Reading values
//!
//! An [`Object`] is a cheap handle `(fqon, view)`.  Member reads walk the
//! object's C3 linearization to the nearest `=` assignment and then fold the
//! operator-annotated contributions of the derived objects on top, producing
//! the effective value at the requested time.

#![warn(missing_docs)]

pub mod ast;
pub mod c3;
pub mod curve;
pub mod database;
pub mod error;
pub mod file;
pub mod lexer;
pub mod member;
pub mod meta_info;
pub mod namespace;
pub mod object;
pub mod object_state;
pub mod ops;
pub mod orderedset;
pub mod state;
pub mod state_history;
pub mod token;
pub mod transaction;
pub mod types;
pub mod value;
pub mod view;

#[cfg(feature = "dot")]
pub mod dot;

pub use crate::database::Database;
pub use crate::error::{LangError, Location, NyanError, Result};
pub use crate::file::{fs_fetcher, FileFetcher, SourceFile};
pub use crate::object::Object;
pub use crate::ops::Operator;
pub use crate::orderedset::OrderedSet;
pub use crate::transaction::Transaction;
pub use crate::value::Value;
pub use crate::view::{NotifierHandle, View};

/// Fully-qualified object name: the dot-separated path of directory
/// components, file stem and nested object components that uniquely
/// identifies an object in the database.
pub type Fqon = String;

/// Identifier of a member, unique within one object's declared members.
pub type MemberId = String;

/// Ordering type for the time axis of views and transactions.
pub type Order = u64;

/// Starting point of the order axis; the initial state lives here.
pub const DEFAULT_T: Order = 0;

/// The maximum representable order is always the "latest" point in time.
pub const LATEST_T: Order = Order::MAX;

/// Storage type for nyan `int` values.
pub type IntValue = i64;

/// Storage type for nyan `float` values.
pub type FloatValue = f64;
