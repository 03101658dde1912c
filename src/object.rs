//! Object handles and effective-value computation.
//!
//! An [`Object`] is a cheap `(fqon, view)` pair.  Reading a member walks
//! the object's C3 linearization to the nearest `=` assignment, copies
//! that base value, and folds every operator-annotated contribution of
//! the more-derived objects on top, in base-to-derived order.

use std::sync::Arc;

use crate::error::{NyanError, Result};
use crate::member::Member;
use crate::object_state::ObjectState;
use crate::ops::Operator;
use crate::value::{DictValue, OrderedSetValue, SetValue, Value};
use crate::view::{NotifierHandle, View};
use crate::{FloatValue, Fqon, IntValue, Order};

/// Conversion from an effective member [`Value`] into a plain Rust type,
/// for [`Object::get`].
pub trait FromValue: Sized {
    /// Name of the requested kind, for error messages.
    fn type_name() -> &'static str;

    /// Extract the typed content, or `None` on a kind mismatch.
    fn from_value(value: Value) -> Option<Self>;
}

impl FromValue for IntValue {
    fn type_name() -> &'static str {
        "int"
    }
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl FromValue for FloatValue {
    fn type_name() -> &'static str {
        "float"
    }
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }
}

impl FromValue for bool {
    fn type_name() -> &'static str {
        "bool"
    }
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn type_name() -> &'static str {
        "text"
    }
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl FromValue for SetValue {
    fn type_name() -> &'static str {
        "set"
    }
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Set(v) => Some(v),
            _ => None,
        }
    }
}

impl FromValue for OrderedSetValue {
    fn type_name() -> &'static str {
        "orderedset"
    }
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::OrderedSet(v) => Some(v),
            _ => None,
        }
    }
}

impl FromValue for DictValue {
    fn type_name() -> &'static str {
        "dict"
    }
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Dict(v) => Some(v),
            _ => None,
        }
    }
}

impl FromValue for Value {
    fn type_name() -> &'static str {
        "value"
    }
    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }
}

/// Handle for accessing an object of a view, independent of time.
#[derive(Clone)]
pub struct Object {
    fqon: Fqon,
    view: View,
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object").field("fqon", &self.fqon).finish()
    }
}

impl Object {
    pub(crate) fn new(fqon: Fqon, view: View) -> Object {
        Object { fqon, view }
    }

    /// The fully-qualified name of this object.
    pub fn name(&self) -> &Fqon {
        &self.fqon
    }

    /// The view this handle reads through.
    pub fn view(&self) -> &View {
        &self.view
    }

    /// Compute the effective value of a member at time `t`.
    pub fn get_value(&self, member: &str, t: Order) -> Result<Value> {
        let linearization = self.view.linearization(&self.fqon, t)?;

        // find the nearest object that assigns a base value with `=`
        let mut states: Vec<Arc<ObjectState>> = Vec::new();
        let mut defined_by = None;
        for (idx, obj) in linearization.iter().enumerate() {
            let state = self.view.get_raw(obj, t)?;
            let assigns = state
                .member(member)
                .map_or(false, |m| m.operation() == Operator::Assign);
            states.push(state);
            if assigns {
                defined_by = Some(idx);
                break;
            }
        }

        // no `=` anywhere: the member effectively does not exist
        let Some(defined_by) = defined_by else {
            return Err(NyanError::MemberNotFound {
                obj: self.fqon.clone(),
                member: member.to_owned(),
            });
        };

        let base: &Member = states[defined_by]
            .member(member)
            .ok_or_else(|| NyanError::internal("assigning member vanished"))?;

        // walk back towards the object and fold the changes in
        let mut result = base.clone();
        for state in states[..defined_by].iter().rev() {
            if let Some(change) = state.member(member) {
                result.apply(change)?;
            }
        }

        Ok(result.value().clone())
    }

    /// Compute the effective value of a member and convert it to `T`.
    pub fn get<T: FromValue>(&self, member: &str, t: Order) -> Result<T> {
        let value = self.get_value(member, t)?;
        let real = value.kind_name();
        T::from_value(value).ok_or_else(|| NyanError::MemberType {
            obj: self.fqon.clone(),
            member: member.to_owned(),
            real: real.to_owned(),
            requested: T::type_name().to_owned(),
        })
    }

    /// Like [`Object::get`], but maps a `None` value to `Option::None`.
    pub fn get_optional<T: FromValue>(&self, member: &str, t: Order) -> Result<Option<T>> {
        let value = self.get_value(member, t)?;
        if matches!(value, Value::None) {
            return Ok(None);
        }
        let real = value.kind_name();
        T::from_value(value)
            .map(Some)
            .ok_or_else(|| NyanError::MemberType {
                obj: self.fqon.clone(),
                member: member.to_owned(),
                real: real.to_owned(),
                requested: T::type_name().to_owned(),
            })
    }

    /// Effective `int` member value.
    pub fn get_int(&self, member: &str, t: Order) -> Result<IntValue> {
        self.get(member, t)
    }

    /// Effective `float` member value.
    pub fn get_float(&self, member: &str, t: Order) -> Result<FloatValue> {
        self.get(member, t)
    }

    /// Effective `bool` member value.
    pub fn get_bool(&self, member: &str, t: Order) -> Result<bool> {
        self.get(member, t)
    }

    /// Effective `text` member value.
    pub fn get_text(&self, member: &str, t: Order) -> Result<String> {
        self.get(member, t)
    }

    /// Effective `file` member value.
    pub fn get_file(&self, member: &str, t: Order) -> Result<String> {
        let value = self.get_value(member, t)?;
        match value {
            Value::Filename(path) => Ok(path),
            other => Err(NyanError::MemberType {
                obj: self.fqon.clone(),
                member: member.to_owned(),
                real: other.kind_name().to_owned(),
                requested: "file".to_owned(),
            }),
        }
    }

    /// Effective `set` member value.
    pub fn get_set(&self, member: &str, t: Order) -> Result<SetValue> {
        self.get(member, t)
    }

    /// Effective `orderedset` member value.
    pub fn get_orderedset(&self, member: &str, t: Order) -> Result<OrderedSetValue> {
        self.get(member, t)
    }

    /// Effective `dict` member value.
    pub fn get_dict(&self, member: &str, t: Order) -> Result<DictValue> {
        self.get(member, t)
    }

    /// Effective object-reference member, as a new handle in this view.
    pub fn get_object(&self, member: &str, t: Order) -> Result<Object> {
        let value = self.get_value(member, t)?;
        match value {
            Value::Object(fqon) => Ok(Object::new(fqon, self.view.clone())),
            other => Err(NyanError::MemberType {
                obj: self.fqon.clone(),
                member: member.to_owned(),
                real: other.kind_name().to_owned(),
                requested: "object".to_owned(),
            }),
        }
    }

    /// The direct parents of this object at time `t`.
    pub fn parents(&self, t: Order) -> Result<Vec<Fqon>> {
        let state = self.view.get_raw(&self.fqon, t)?;
        Ok(state.parents().iter().cloned().collect())
    }

    /// The C3 linearization of this object at time `t`.
    pub fn linearized(&self, t: Order) -> Result<Arc<Vec<Fqon>>> {
        self.view.linearization(&self.fqon, t)
    }

    /// Whether any object in the linearization declares this member.
    pub fn has_member(&self, member: &str, t: Order) -> Result<bool> {
        let linearization = self.view.linearization(&self.fqon, t)?;
        for obj in linearization.iter() {
            if self.view.get_raw(obj, t)?.has_member(member) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether this object is, or inherits from, `other_fqon` at `t`.
    pub fn extends(&self, other_fqon: &str, t: Order) -> Result<bool> {
        if self.fqon == other_fqon {
            return Ok(true);
        }
        let linearization = self.view.linearization(&self.fqon, t)?;
        Ok(linearization.iter().any(|obj| obj == other_fqon))
    }

    /// Whether this object is a patch (declared or inherited).
    pub fn is_patch(&self) -> bool {
        self.view
            .database()
            .info()
            .object(&self.fqon)
            .map_or(false, |info| info.is_patch())
    }

    /// The patch target, if this object is a patch.
    pub fn target(&self) -> Option<Fqon> {
        self.view
            .database()
            .info()
            .object(&self.fqon)
            .and_then(|info| info.patch())
            .map(|patch| patch.target().clone())
    }

    /// Subscribe to changes of this object in its view.
    ///
    /// The callback fires after every commit that touches this object or
    /// one of its ancestors; keep the returned handle alive for as long
    /// as the subscription should last.
    pub fn subscribe(
        &self,
        callback: impl Fn(Order, &Fqon, &ObjectState) + 'static,
    ) -> NotifierHandle {
        self.view.create_notifier(self.fqon.clone(), callback)
    }
}
