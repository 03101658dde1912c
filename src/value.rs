//! The polymorphic value family of member values.
//!
//! Every member value is one of the kinds in [`Value`].  A value knows
//! which operators may combine it with a member of a given declared type
//! ([`Value::allowed_operations`]), and how to fold another value into
//! itself with such an operator ([`Value::apply_value`]).
//!
//! Numbers carry infinity sentinels: floats use the IEEE infinities, ints
//! use the extremes of their storage type.  Operations with at least one
//! infinite operand follow a finite table; the undefined combinations
//! (`+inf - +inf`, `inf * 0`, `inf / inf`, division by zero) produce a
//! [`NyanError::Value`] which aborts the surrounding transaction.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use fnv::{FnvHashMap, FnvHashSet};
use itertools::Itertools;
use lazy_static::lazy_static;

use crate::ast::{AstContainer, AstMemberValue, ValueToken};
use crate::error::{LangError, Location, NyanError, Result};
use crate::meta_info::MetaInfo;
use crate::namespace::{Namespace, NamespaceFinder};
use crate::ops::Operator;
use crate::orderedset::OrderedSet;
use crate::token::{IdToken, TokenKind};
use crate::types::{BasicType, Composite, Modifiers, Primitive, Type};
use crate::{FloatValue, Fqon, IntValue};

/// Storage of `set(...)` values.
pub type SetValue = FnvHashSet<Value>;

/// Storage of `orderedset(...)` values.
pub type OrderedSetValue = OrderedSet<Value>;

/// Storage of `dict(...)` values.
pub type DictValue = FnvHashMap<Value, Value>;

/// Positive infinity sentinel of int values.
pub const INT_INF_POS: IntValue = IntValue::MAX;

/// Negative infinity sentinel of int values.
pub const INT_INF_NEG: IntValue = IntValue::MIN;

/// A member value.
#[derive(Clone, Debug)]
pub enum Value {
    /// `True` or `False`.
    Bool(bool),
    /// An integer.
    Int(IntValue),
    /// A floating point number.
    Float(FloatValue),
    /// A text string.
    Text(String),
    /// A file path.
    Filename(String),
    /// A reference to another object, stored by name only.
    Object(Fqon),
    /// The explicit no-value of optional members.
    None,
    /// An unordered set.
    Set(SetValue),
    /// A set preserving insertion order.
    OrderedSet(OrderedSetValue),
    /// A key-value mapping.
    Dict(DictValue),
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Filename(a), Value::Filename(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::None, Value::None) => true,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::OrderedSet(a), Value::OrderedSet(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Filename(p) => p.hash(state),
            Value::Object(f) => f.hash(state),
            Value::None => {}
            // containers never end up as set elements or dict keys, the
            // type layer rejects them as unhashable
            Value::Set(_) | Value::OrderedSet(_) | Value::Dict(_) => {}
        }
    }
}

lazy_static! {
    static ref NO_OPS: HashSet<Operator> = HashSet::new();
    static ref ASSIGN_ONLY: HashSet<Operator> = [Operator::Assign].into_iter().collect();
    static ref BOOL_OPS: HashSet<Operator> = [
        Operator::Assign,
        Operator::UnionAssign,
        Operator::IntersectAssign,
    ]
    .into_iter()
    .collect();
    static ref NUMBER_OPS: HashSet<Operator> = [
        Operator::Assign,
        Operator::AddAssign,
        Operator::SubtractAssign,
        Operator::MultiplyAssign,
        Operator::DivideAssign,
    ]
    .into_iter()
    .collect();
    static ref TEXT_OPS: HashSet<Operator> =
        [Operator::Assign, Operator::AddAssign].into_iter().collect();
    static ref SET_VS_SET: HashSet<Operator> = [
        Operator::Assign,
        Operator::AddAssign,
        Operator::UnionAssign,
        Operator::SubtractAssign,
        Operator::IntersectAssign,
    ]
    .into_iter()
    .collect();
    static ref SET_VS_ORDERED: HashSet<Operator> =
        [Operator::SubtractAssign, Operator::IntersectAssign]
            .into_iter()
            .collect();
    static ref ORDERED_VS_ORDERED: HashSet<Operator> = [
        Operator::Assign,
        Operator::AddAssign,
        Operator::SubtractAssign,
        Operator::IntersectAssign,
    ]
    .into_iter()
    .collect();
    static ref ORDERED_VS_SET: HashSet<Operator> = [
        Operator::AddAssign,
        Operator::UnionAssign,
        Operator::SubtractAssign,
        Operator::IntersectAssign,
    ]
    .into_iter()
    .collect();
    static ref DICT_VS_DICT: HashSet<Operator> = [
        Operator::Assign,
        Operator::AddAssign,
        Operator::UnionAssign,
        Operator::IntersectAssign,
    ]
    .into_iter()
    .collect();
    static ref DICT_VS_KEYSET: HashSet<Operator> =
        [Operator::SubtractAssign, Operator::IntersectAssign]
            .into_iter()
            .collect();
}

/// What an infinity calculation decides to do with the left operand.
enum InfinityAction {
    /// Keep the current value.
    This,
    /// Take the other operand's value.
    Other,
    /// Become positive infinity.
    InfPos,
    /// Become negative infinity.
    InfNeg,
    /// Become zero.
    Zero,
}

impl Value {
    /// Name of this value's kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Filename(_) => "file",
            Value::Object(_) => "object",
            Value::None => "none",
            Value::Set(_) => "set",
            Value::OrderedSet(_) => "orderedset",
            Value::Dict(_) => "dict",
        }
    }

    /// Primitive/composite combination of this value.
    pub fn basic_type(&self) -> BasicType {
        match self {
            Value::Bool(_) => BasicType::new(Primitive::Boolean, Composite::Single),
            Value::Int(_) => BasicType::new(Primitive::Int, Composite::Single),
            Value::Float(_) => BasicType::new(Primitive::Float, Composite::Single),
            Value::Text(_) => BasicType::new(Primitive::Text, Composite::Single),
            Value::Filename(_) => BasicType::new(Primitive::Filename, Composite::Single),
            Value::Object(_) => BasicType::new(Primitive::Object, Composite::Single),
            Value::None => BasicType::new(Primitive::None, Composite::Single),
            Value::Set(_) => BasicType::new(Primitive::Container, Composite::Set),
            Value::OrderedSet(_) => BasicType::new(Primitive::Container, Composite::OrderedSet),
            Value::Dict(_) => BasicType::new(Primitive::Container, Composite::Dict),
        }
    }

    /// Whether this value may be placed in a set or used as dict key.
    pub fn hashable(&self) -> bool {
        !matches!(
            self,
            Value::Set(_) | Value::OrderedSet(_) | Value::Dict(_)
        )
    }

    /// The operators that may combine this value with a member whose
    /// declared type (stripped of modifiers) is `with`.
    pub fn allowed_operations(&self, with: &BasicType) -> &'static HashSet<Operator> {
        match self {
            Value::Bool(_) => match with.primitive {
                Primitive::Boolean => &BOOL_OPS,
                Primitive::None => &ASSIGN_ONLY,
                _ => &NO_OPS,
            },
            Value::Int(_) | Value::Float(_) => match with.primitive {
                Primitive::Int | Primitive::Float => &NUMBER_OPS,
                Primitive::None => &ASSIGN_ONLY,
                _ => &NO_OPS,
            },
            Value::Text(_) => match with.primitive {
                Primitive::Text => &TEXT_OPS,
                _ => &NO_OPS,
            },
            Value::Filename(_) => match with.primitive {
                Primitive::Filename => &ASSIGN_ONLY,
                _ => &NO_OPS,
            },
            Value::Object(_) => match with.primitive {
                Primitive::Object | Primitive::None => &ASSIGN_ONLY,
                _ => &NO_OPS,
            },
            Value::None => match with.primitive {
                Primitive::Boolean
                | Primitive::Int
                | Primitive::Float
                | Primitive::Text
                | Primitive::Filename
                | Primitive::Object
                | Primitive::None
                | Primitive::Container => &ASSIGN_ONLY,
                _ => &NO_OPS,
            },
            Value::Set(_) => {
                if with.primitive == Primitive::None {
                    return &ASSIGN_ONLY;
                }
                match with.composite {
                    Composite::Set => &SET_VS_SET,
                    Composite::OrderedSet => &SET_VS_ORDERED,
                    _ => &NO_OPS,
                }
            }
            Value::OrderedSet(_) => match with.composite {
                Composite::OrderedSet => &ORDERED_VS_ORDERED,
                Composite::Set => &ORDERED_VS_SET,
                _ => &NO_OPS,
            },
            Value::Dict(_) => {
                if with.primitive == Primitive::None {
                    return &ASSIGN_ONLY;
                }
                match with.composite {
                    Composite::Dict => &DICT_VS_DICT,
                    Composite::Set | Composite::OrderedSet => &DICT_VS_KEYSET,
                    _ => &NO_OPS,
                }
            }
        }
    }

    /// Fold `other` into this value with the given operator.
    ///
    /// Operator admissibility was checked at load time; an impossible
    /// combination here is an internal error.  Value-level failures
    /// (undefined infinity arithmetic, division by zero, out-of-range
    /// conversions) return [`NyanError::Value`].
    pub fn apply_value(&mut self, other: &Value, op: Operator) -> Result<()> {
        match self {
            Value::Bool(current) => {
                let Value::Bool(change) = other else {
                    return Err(type_confusion("bool", other));
                };
                match op {
                    Operator::Assign => *current = *change,
                    Operator::UnionAssign => *current |= *change,
                    Operator::IntersectAssign => *current &= *change,
                    _ => return Err(bad_operation("bool", op)),
                }
                Ok(())
            }

            Value::Int(_) | Value::Float(_) => self.apply_number(other, op),

            Value::Text(current) => {
                let Value::Text(change) = other else {
                    return Err(type_confusion("text", other));
                };
                match op {
                    Operator::Assign => *current = change.clone(),
                    Operator::AddAssign => current.push_str(change),
                    _ => return Err(bad_operation("text", op)),
                }
                Ok(())
            }

            Value::Filename(current) => {
                // TODO: relative path resolution against the value's namespace
                let Value::Filename(change) = other else {
                    return Err(type_confusion("file", other));
                };
                match op {
                    Operator::Assign => *current = change.clone(),
                    _ => return Err(bad_operation("file", op)),
                }
                Ok(())
            }

            Value::Object(current) => {
                let Value::Object(change) = other else {
                    return Err(type_confusion("object", other));
                };
                match op {
                    Operator::Assign => *current = change.clone(),
                    _ => return Err(bad_operation("object", op)),
                }
                Ok(())
            }

            Value::None => Err(NyanError::internal(
                "cannot apply to None: assign the value directly to the member instead",
            )),

            Value::Set(values) => {
                let Some(items) = container_items(other) else {
                    return Err(type_confusion("set", other));
                };
                match op {
                    Operator::Assign => {
                        values.clear();
                        values.extend(items.cloned());
                    }
                    Operator::AddAssign | Operator::UnionAssign => {
                        values.extend(items.cloned());
                    }
                    Operator::SubtractAssign => {
                        for item in items {
                            values.remove(item);
                        }
                    }
                    Operator::IntersectAssign => {
                        values.retain(|v| container_contains(other, v));
                    }
                    _ => return Err(bad_operation("set", op)),
                }
                Ok(())
            }

            Value::OrderedSet(values) => {
                let Some(items) = container_items(other) else {
                    return Err(type_confusion("orderedset", other));
                };
                match op {
                    Operator::Assign => {
                        values.clear();
                        for item in items {
                            values.insert(item.clone());
                        }
                    }
                    Operator::AddAssign | Operator::UnionAssign => {
                        for item in items {
                            values.insert(item.clone());
                        }
                    }
                    Operator::SubtractAssign => {
                        for item in items {
                            values.remove(item);
                        }
                    }
                    Operator::IntersectAssign => {
                        values.retain(|v| container_contains(other, v));
                    }
                    _ => return Err(bad_operation("orderedset", op)),
                }
                Ok(())
            }

            Value::Dict(values) => match other {
                Value::Dict(change) => {
                    match op {
                        Operator::Assign => {
                            values.clear();
                            values.extend(change.iter().map(|(k, v)| (k.clone(), v.clone())));
                        }
                        Operator::AddAssign | Operator::UnionAssign => {
                            values.extend(change.iter().map(|(k, v)| (k.clone(), v.clone())));
                        }
                        Operator::IntersectAssign => {
                            // both key and value must match to survive
                            values.retain(|k, v| change.get(k) == Some(v));
                        }
                        _ => return Err(bad_operation("dict", op)),
                    }
                    Ok(())
                }
                Value::Set(_) | Value::OrderedSet(_) => {
                    match op {
                        Operator::SubtractAssign => {
                            if let Some(keys) = container_items(other) {
                                for key in keys {
                                    values.remove(key);
                                }
                            }
                        }
                        Operator::IntersectAssign => {
                            values.retain(|k, _| container_contains(other, k));
                        }
                        _ => return Err(bad_operation("dict", op)),
                    }
                    Ok(())
                }
                _ => Err(type_confusion("dict", other)),
            },
        }
    }

    // --- numeric helpers ---------------------------------------------

    fn number_is_infinite(&self) -> bool {
        match self {
            Value::Int(i) => *i == INT_INF_POS || *i == INT_INF_NEG,
            Value::Float(f) => f.is_infinite(),
            _ => false,
        }
    }

    fn number_is_infinite_positive(&self) -> bool {
        match self {
            Value::Int(i) => *i == INT_INF_POS,
            Value::Float(f) => f.is_infinite() && f.is_sign_positive(),
            _ => false,
        }
    }

    fn number_is_zero(&self) -> bool {
        match self {
            Value::Int(i) => *i == 0,
            Value::Float(f) => *f == 0.0,
            _ => false,
        }
    }

    fn number_is_positive(&self) -> bool {
        match self {
            Value::Int(i) => *i > 0,
            Value::Float(f) => *f > 0.0,
            _ => false,
        }
    }

    fn as_float(&self) -> FloatValue {
        match self {
            Value::Int(i) => *i as FloatValue,
            Value::Float(f) => *f,
            _ => 0.0,
        }
    }

    fn set_number(&mut self, value: FloatValue) -> Result<()> {
        match self {
            Value::Int(i) => {
                *i = float_to_int(value)?;
                Ok(())
            }
            Value::Float(f) => {
                *f = value;
                Ok(())
            }
            _ => Err(NyanError::internal("set_number on non-number value")),
        }
    }

    fn set_infinity(&mut self, positive: bool) {
        match self {
            Value::Int(i) => *i = if positive { INT_INF_POS } else { INT_INF_NEG },
            Value::Float(f) => {
                *f = if positive {
                    FloatValue::INFINITY
                } else {
                    FloatValue::NEG_INFINITY
                }
            }
            _ => {}
        }
    }

    fn apply_number(&mut self, other: &Value, op: Operator) -> Result<()> {
        if !matches!(other, Value::Int(_) | Value::Float(_)) {
            return Err(type_confusion(self.kind_name(), other));
        }

        if !self.number_is_infinite() && !other.number_is_infinite() {
            return self.apply_finite_number(other, op);
        }

        match self.handle_infinity(other, op)? {
            Some(InfinityAction::This) => Ok(()),
            Some(InfinityAction::Other) => match (self, other) {
                (Value::Int(i), Value::Int(o)) => {
                    *i = *o;
                    Ok(())
                }
                (slot, other) => slot.set_number(other.as_float()),
            },
            Some(InfinityAction::InfPos) => {
                self.set_infinity(true);
                Ok(())
            }
            Some(InfinityAction::InfNeg) => {
                self.set_infinity(false);
                Ok(())
            }
            Some(InfinityAction::Zero) => self.set_number(0.0),
            None => Err(NyanError::Value(format!(
                "undefined infinity operation: {} {} {}",
                self, op, other
            ))),
        }
    }

    /// The infinity table.  `Ok(None)` means the operation is undefined
    /// and the surrounding transaction has to abort.
    fn handle_infinity(&self, other: &Value, op: Operator) -> Result<Option<InfinityAction>> {
        let by_other = |invert: bool| {
            if other.number_is_infinite_positive() != invert {
                InfinityAction::InfPos
            } else {
                InfinityAction::InfNeg
            }
        };
        let sign_product = |left_positive: bool, right_positive: bool| {
            if left_positive == right_positive {
                InfinityAction::InfPos
            } else {
                InfinityAction::InfNeg
            }
        };

        if self.number_is_infinite() && other.number_is_infinite() {
            let same_sign =
                self.number_is_infinite_positive() == other.number_is_infinite_positive();
            return Ok(match op {
                Operator::Assign => Some(by_other(false)),
                // inf + inf keeps the sign, inf + (-inf) is undefined
                Operator::AddAssign => same_sign.then(|| by_other(false)),
                // inf - (-inf) keeps this sign, inf - inf is undefined
                Operator::SubtractAssign => (!same_sign).then(|| by_other(true)),
                Operator::MultiplyAssign => Some(sign_product(
                    self.number_is_infinite_positive(),
                    other.number_is_infinite_positive(),
                )),
                Operator::DivideAssign => None,
                _ => return Err(bad_operation(self.kind_name(), op)),
            });
        }

        if self.number_is_infinite() {
            return Ok(match op {
                Operator::Assign => Some(InfinityAction::Other),
                Operator::AddAssign | Operator::SubtractAssign => Some(InfinityAction::This),
                Operator::MultiplyAssign => {
                    if other.number_is_zero() {
                        None
                    } else {
                        Some(sign_product(
                            self.number_is_infinite_positive(),
                            other.number_is_positive(),
                        ))
                    }
                }
                Operator::DivideAssign => {
                    if other.number_is_zero() {
                        None
                    } else {
                        Some(InfinityAction::This)
                    }
                }
                _ => return Err(bad_operation(self.kind_name(), op)),
            });
        }

        if other.number_is_infinite() {
            return Ok(match op {
                Operator::Assign | Operator::AddAssign => Some(by_other(false)),
                Operator::SubtractAssign => Some(by_other(true)),
                Operator::MultiplyAssign => {
                    if self.number_is_zero() {
                        None
                    } else {
                        Some(sign_product(
                            self.number_is_positive(),
                            other.number_is_infinite_positive(),
                        ))
                    }
                }
                Operator::DivideAssign => Some(InfinityAction::Zero),
                _ => return Err(bad_operation(self.kind_name(), op)),
            });
        }

        Err(NyanError::internal("expected at least one infinite operand"))
    }

    fn apply_finite_number(&mut self, other: &Value, op: Operator) -> Result<()> {
        match (&mut *self, other) {
            // int stays in int arithmetic; overflow saturates onto the
            // infinity sentinels
            (Value::Int(current), Value::Int(change)) => {
                match op {
                    Operator::Assign => *current = *change,
                    Operator::AddAssign => *current = current.saturating_add(*change),
                    Operator::SubtractAssign => *current = current.saturating_sub(*change),
                    Operator::MultiplyAssign => *current = current.saturating_mul(*change),
                    Operator::DivideAssign => {
                        if *change == 0 {
                            return Err(NyanError::Value(format!(
                                "integer division of {} by zero",
                                current
                            )));
                        }
                        *current = current.saturating_div(*change);
                    }
                    _ => return Err(bad_operation("int", op)),
                }
                Ok(())
            }
            // any float operand promotes the arithmetic to float; the
            // result is stored back into this value's kind
            (slot, change) => {
                let left = slot.as_float();
                let right = change.as_float();
                let result = match op {
                    Operator::Assign => right,
                    Operator::AddAssign => left + right,
                    Operator::SubtractAssign => left - right,
                    Operator::MultiplyAssign => left * right,
                    Operator::DivideAssign => left / right,
                    _ => return Err(bad_operation(slot.kind_name(), op)),
                };
                slot.set_number(result)
            }
        }
    }

    // --- construction from the AST -----------------------------------

    /// Build a value for a member of type `target_type` from its parsed
    /// expression.
    pub(crate) fn from_ast(
        target_type: &Type,
        ast_value: &AstMemberValue,
        ctx: &mut ValueContext<'_>,
    ) -> Result<Value> {
        let value = match ast_value {
            AstMemberValue::Single(entry) => {
                if target_type.is_container() {
                    return Err(NyanError::Type(LangError::new(
                        entry.location(),
                        format!(
                            "storing a single value in a {} member",
                            target_type.basic()
                        ),
                    )));
                }
                value_from_token(target_type, single_component(entry)?, ctx)?
            }

            AstMemberValue::Container { kind, items } => {
                let expected = match target_type.composite() {
                    Composite::Set => AstContainer::Set,
                    Composite::OrderedSet => AstContainer::OrderedSet,
                    Composite::Dict => AstContainer::Dict,
                    _ => {
                        return Err(NyanError::Type(LangError::new(
                            ast_value.location(),
                            format!(
                                "container literal assigned to {} member",
                                target_type.basic()
                            ),
                        )));
                    }
                };
                // empty `{}` literals parse as sets but may fill any
                // container
                if *kind != expected && !items.is_empty() {
                    return Err(NyanError::Type(LangError::new(
                        ast_value.location(),
                        format!(
                            "{} literal assigned to {} member",
                            container_name(*kind),
                            target_type.basic()
                        ),
                    )));
                }

                match target_type.composite() {
                    Composite::Set => {
                        let element_type = &target_type.element_types()[0];
                        let mut values = SetValue::default();
                        for item in items {
                            values.insert(element_value(element_type, item, ctx)?);
                        }
                        Value::Set(values)
                    }
                    Composite::OrderedSet => {
                        let element_type = &target_type.element_types()[0];
                        let mut values = OrderedSetValue::new();
                        for item in items {
                            values.insert(element_value(element_type, item, ctx)?);
                        }
                        Value::OrderedSet(values)
                    }
                    Composite::Dict => {
                        let key_type = &target_type.element_types()[0];
                        let value_type = &target_type.element_types()[1];
                        let mut values = DictValue::default();
                        for item in items {
                            let [key_token, value_token] = item.parts() else {
                                return Err(NyanError::internal(
                                    "dict entry without key/value pair",
                                ));
                            };
                            let key = checked_value(key_type, key_token, item, ctx)?;
                            let value = checked_value(value_type, value_token, item, ctx)?;
                            values.insert(key, value);
                        }
                        Value::Dict(values)
                    }
                    _ => {
                        return Err(NyanError::internal(
                            "value creation for unhandled container type",
                        ))
                    }
                }
            }
        };

        if let Err(problem) = value.compatible_with(target_type, ctx.meta) {
            return Err(NyanError::Type(LangError::new(
                ast_value.location(),
                format!(
                    "member type {} can't hold a value of type {}{}",
                    target_type,
                    value.kind_name(),
                    problem.map(|msg| format!(": {}", msg)).unwrap_or_default()
                ),
            )));
        }

        Ok(value)
    }

    /// Check whether this value fits a declared type; `Err` carries an
    /// optional detail message.
    pub(crate) fn compatible_with(
        &self,
        ty: &Type,
        meta: &MetaInfo,
    ) -> std::result::Result<(), Option<String>> {
        if ty.has_modifier(Modifiers::OPTIONAL) && matches!(self, Value::None) {
            return Ok(());
        }

        if ty.is_fundamental() {
            let ok = match ty.primitive() {
                Primitive::Boolean => matches!(self, Value::Bool(_)),
                Primitive::Text => matches!(self, Value::Text(_)),
                Primitive::Filename => matches!(self, Value::Filename(_)),
                Primitive::Int | Primitive::Float => {
                    matches!(self, Value::Int(_) | Value::Float(_))
                }
                _ => false,
            };
            return if ok { Ok(()) } else { Err(None) };
        }

        if ty.is_container() {
            let ok = match ty.composite() {
                Composite::Set => matches!(self, Value::Set(_)),
                Composite::OrderedSet => matches!(self, Value::OrderedSet(_)),
                Composite::Dict => matches!(self, Value::Dict(_)),
                _ => false,
            };
            return if ok { Ok(()) } else { Err(None) };
        }

        if ty.is_object() {
            let Value::Object(name) = self else {
                return Err(None);
            };
            let Some(target) = ty.fqon() else {
                // an unconstrained object type accepts any object
                return Ok(());
            };
            let Some(info) = meta.object(name) else {
                return Err(Some(format!("unknown object '{}'", name)));
            };
            if !info.linearization().contains(target) {
                return Err(Some(format!(
                    "'{}' is not related to the member type object '{}'",
                    name, target
                )));
            }
            if ty.has_modifier(Modifiers::CHILDREN) && name == target {
                return Err(Some(format!(
                    "only children of '{}' are allowed",
                    target
                )));
            }
            return Ok(());
        }

        Err(Some("unhandled type in compatibility check".into()))
    }
}

/// A record of an object name used inside a member value, for the
/// concreteness check after loading.
#[derive(Debug)]
pub struct ObjectReference {
    /// The referenced object.
    pub fqon: Fqon,
    /// Where the value was written.
    pub location: Location,
    /// Whether the value position carried the `abstract` modifier.
    pub allow_abstract: bool,
}

/// Resolution context for building values from the AST.
pub(crate) struct ValueContext<'a> {
    /// Name scope of the file the value appears in.
    pub scope: &'a NamespaceFinder,
    /// Namespace of the object holding the member.
    pub namespace: &'a Namespace,
    /// The database metadata; objects and linearizations must exist.
    pub meta: &'a MetaInfo,
    /// Output: every object name used inside the value.
    pub refs: &'a mut Vec<ObjectReference>,
}

fn container_name(kind: AstContainer) -> &'static str {
    match kind {
        AstContainer::Set => "set",
        AstContainer::OrderedSet => "orderedset",
        AstContainer::Dict => "dict",
    }
}

fn single_component(entry: &ValueToken) -> Result<&IdToken> {
    match entry.parts() {
        [component] => Ok(component),
        _ => Err(NyanError::internal("expected single value component")),
    }
}

/// Build a container element and validate it against the element type.
fn element_value(
    element_type: &Type,
    item: &ValueToken,
    ctx: &mut ValueContext<'_>,
) -> Result<Value> {
    checked_value(element_type, single_component(item)?, item, ctx)
}

fn checked_value(
    ty: &Type,
    token: &IdToken,
    item: &ValueToken,
    ctx: &mut ValueContext<'_>,
) -> Result<Value> {
    let value = value_from_token(ty, token, ctx)?;
    if let Err(problem) = value.compatible_with(ty, ctx.meta) {
        return Err(NyanError::Type(LangError::new(
            item.location(),
            format!(
                "element type {} can't hold a value of type {}{}",
                ty,
                value.kind_name(),
                problem.map(|msg| format!(": {}", msg)).unwrap_or_default()
            ),
        )));
    }
    Ok(value)
}

/// Create a single value from one identifier/literal token.
fn value_from_token(ty: &Type, token: &IdToken, ctx: &mut ValueContext<'_>) -> Result<Value> {
    let is_none_literal = token.components().len() == 1
        && token.kind() == Some(TokenKind::Id)
        && token.first() == "None";

    if is_none_literal {
        if ty.has_modifier(Modifiers::OPTIONAL) {
            return Ok(Value::None);
        }
        return Err(NyanError::Type(LangError::new(
            token.location(),
            "member type is not optional, cannot hold None",
        )));
    }

    match ty.primitive() {
        Primitive::Boolean => {
            if token.kind() == Some(TokenKind::Id) {
                match token.first() {
                    "True" => return Ok(Value::Bool(true)),
                    "False" => return Ok(Value::Bool(false)),
                    _ => {}
                }
            }
            Err(NyanError::Lang(LangError::new(
                token.location(),
                "unknown boolean value (did you use 'True' and 'False'?)",
            )))
        }

        Primitive::Text => match token.kind() {
            Some(TokenKind::Str) => Ok(Value::Text(token.first().to_owned())),
            _ => Err(NyanError::Lang(LangError::new(
                token.location(),
                "invalid value for text, expected a quoted string",
            ))),
        },

        Primitive::Filename => match token.kind() {
            // TODO: resolve the path relative to the value's namespace
            Some(TokenKind::Str) => Ok(Value::Filename(token.first().to_owned())),
            _ => Err(NyanError::Lang(LangError::new(
                token.location(),
                "invalid value for file, expected a quoted path",
            ))),
        },

        Primitive::Int => match token.kind() {
            Some(TokenKind::Int) => Ok(Value::Int(parse_int(token)?)),
            Some(TokenKind::Inf) => Ok(Value::Int(if token.first().starts_with('-') {
                INT_INF_NEG
            } else {
                INT_INF_POS
            })),
            _ => Err(NyanError::Lang(LangError::new(
                token.location(),
                "invalid value for int, expected int or inf",
            ))),
        },

        Primitive::Float => match token.kind() {
            Some(TokenKind::Float) => {
                token.first().parse::<FloatValue>().map(Value::Float).map_err(|_| {
                    NyanError::Lang(LangError::new(token.location(), "number out of range"))
                })
            }
            Some(TokenKind::Int) => Ok(Value::Float(parse_int(token)? as FloatValue)),
            Some(TokenKind::Inf) => Ok(Value::Float(if token.first().starts_with('-') {
                FloatValue::NEG_INFINITY
            } else {
                FloatValue::INFINITY
            })),
            _ => Err(NyanError::Lang(LangError::new(
                token.location(),
                "invalid value for float, expected float or inf",
            ))),
        },

        Primitive::Object => {
            if token.kind() != Some(TokenKind::Id) {
                return Err(NyanError::Lang(LangError::new(
                    token.location(),
                    "invalid value for object, expecting an object id",
                )));
            }
            let fqon = ctx.scope.find(ctx.namespace, token, ctx.meta)?;
            ctx.refs.push(ObjectReference {
                fqon: fqon.clone(),
                location: token.location(),
                allow_abstract: ty.has_modifier(Modifiers::ABSTRACT),
            });
            Ok(Value::Object(fqon))
        }

        _ => Err(NyanError::internal("unhandled primitive value type")),
    }
}

fn parse_int(token: &IdToken) -> Result<IntValue> {
    let text = token.first();
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let parsed = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        IntValue::from_str_radix(hex, 16)
    } else {
        rest.parse::<IntValue>()
    };
    match parsed {
        Ok(value) => Ok(if negative { -value } else { value }),
        Err(_) => Err(NyanError::Lang(LangError::new(
            token.location(),
            "number out of range",
        ))),
    }
}

fn float_to_int(value: FloatValue) -> Result<IntValue> {
    if value.is_nan()
        || value < INT_INF_NEG as FloatValue
        || value > INT_INF_POS as FloatValue
    {
        return Err(NyanError::Value(format!(
            "float to int conversion impossible, {} doesn't fit",
            value
        )));
    }
    Ok(value as IntValue)
}

fn container_items(value: &Value) -> Option<Box<dyn Iterator<Item = &Value> + '_>> {
    match value {
        Value::Set(s) => Some(Box::new(s.iter())),
        Value::OrderedSet(s) => Some(Box::new(s.iter())),
        _ => None,
    }
}

fn container_contains(value: &Value, item: &Value) -> bool {
    match value {
        Value::Set(s) => s.contains(item),
        Value::OrderedSet(s) => s.contains(item),
        Value::Dict(d) => d.contains_key(item),
        _ => false,
    }
}

fn type_confusion(kind: &str, other: &Value) -> NyanError {
    NyanError::internal(format!(
        "{} value application got a {} operand",
        kind,
        other.kind_name()
    ))
}

fn bad_operation(kind: &str, op: Operator) -> NyanError {
    NyanError::internal(format!("unknown operation {} requested on {}", op, kind))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(INT_INF_POS) => write!(f, "inf"),
            Value::Int(INT_INF_NEG) => write!(f, "-inf"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) if v.is_infinite() => {
                write!(f, "{}inf", if *v < 0.0 { "-" } else { "" })
            }
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "\"{}\"", s),
            Value::Filename(p) => write!(f, "{}", p),
            Value::Object(o) => write!(f, "{}", o),
            Value::None => write!(f, "None"),
            Value::Set(s) => write!(f, "{{{}}}", s.iter().map(|v| v.to_string()).join(", ")),
            Value::OrderedSet(s) => {
                write!(f, "o{{{}}}", s.iter().map(|v| v.to_string()).join(", "))
            }
            Value::Dict(d) => write!(
                f,
                "{{{}}}",
                d.iter().map(|(k, v)| format!("{}: {}", k, v)).join(", ")
            ),
        }
    }
}
