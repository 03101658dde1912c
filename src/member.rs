//! A member of an object state: operator, declared type and value.

use std::fmt;

use crate::error::{NyanError, Result};
use crate::ops::Operator;
use crate::types::TypeRef;
use crate::value::Value;

/// Stores one member entry of an object state and applies patch changes
/// to it.
#[derive(Clone, Debug)]
pub struct Member {
    /// Number of `@` sigils before the operator; defines how deep an
    /// override penetrates when the patch is applied.
    override_depth: u32,
    operation: Operator,
    declared_type: TypeRef,
    value: Value,
}

impl Member {
    /// Create a member with a value.
    pub fn new(
        override_depth: u32,
        operation: Operator,
        declared_type: TypeRef,
        value: Value,
    ) -> Member {
        Member {
            override_depth,
            operation,
            declared_type,
            value,
        }
    }

    /// The operation this member performs on inherited values.
    pub fn operation(&self) -> Operator {
        self.operation
    }

    /// The member's value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The declared type the member was created with.
    pub fn declared_type(&self) -> &TypeRef {
        &self.declared_type
    }

    /// Number of `@` sigils of this member entry.
    pub fn override_depth(&self) -> u32 {
        self.override_depth
    }

    /// Apply another member, using its operation, to this member.
    ///
    /// `None` handling happens here rather than in the value: assigning
    /// `None` replaces the value, while any non-assign change onto a
    /// `None`-valued member is swallowed (the None wins).
    pub fn apply(&mut self, change: &Member) -> Result<()> {
        if change.override_depth > 0 {
            // stored and bounds-checked at load time, but the decrementing
            // application step is not implemented
            return Err(NyanError::internal(
                "operator override depths are not applied yet",
            ));
        }

        if matches!(change.value, Value::None) {
            // the assign operator was validated at load time
            self.value = Value::None;
            return Ok(());
        }

        if matches!(self.value, Value::None) {
            if change.operation() == Operator::Assign {
                self.value = change.value.clone();
            }
            return Ok(());
        }

        self.value.apply_value(&change.value, change.operation())
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operation, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Primitive, Type};
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn int_type() -> TypeRef {
        Arc::new(Type::fundamental(Primitive::Int, Default::default()))
    }

    fn member(op: Operator, value: Value) -> Member {
        Member::new(0, op, int_type(), value)
    }

    #[test]
    fn apply_dispatches_into_the_value() {
        let mut base = member(Operator::Assign, Value::Int(3));
        base.apply(&member(Operator::AddAssign, Value::Int(2)))
            .unwrap();
        assert_eq!(base.value(), &Value::Int(5));
    }

    #[test]
    fn assigning_none_replaces_the_value() {
        let mut base = member(Operator::Assign, Value::Int(3));
        base.apply(&member(Operator::Assign, Value::None)).unwrap();
        assert_eq!(base.value(), &Value::None);
    }

    #[test]
    fn non_assign_onto_none_is_swallowed() {
        let mut base = member(Operator::Assign, Value::None);
        base.apply(&member(Operator::AddAssign, Value::Int(5)))
            .unwrap();
        assert_eq!(base.value(), &Value::None);

        base.apply(&member(Operator::Assign, Value::Int(5))).unwrap();
        assert_eq!(base.value(), &Value::Int(5));
    }

    #[test]
    fn override_depth_application_is_unimplemented() {
        let mut base = member(Operator::Assign, Value::Int(3));
        let change = Member::new(1, Operator::Assign, int_type(), Value::Int(9));
        assert_matches!(base.apply(&change), Err(NyanError::Internal(_)));
    }
}
