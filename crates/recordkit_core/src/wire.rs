use serde::{Deserialize, Serialize};

/// The closed set of driver wire representations a [`crate::Value`] can be
/// adapted to and from.
///
/// Distinct from `Value` itself: a single in-memory `Value::Text` might be
/// adapted to `WireType::UuidText` for one backend and `WireType::UuidBytes`
/// for another, which is why the adapter registry keys on the pair rather
/// than on `Value`'s own discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireType {
    Null,
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Json,
    Decimal,
    DateTime,
    Date,
    Time,
    /// UUID rendered as its canonical hyphenated string form.
    UuidText,
    /// UUID rendered as its 16-byte binary form.
    UuidBytes,
    Enum,
    Array,
}

/// The closed set of in-memory value shapes a [`crate::Value`] can present,
/// used as the other half of a type adapter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InMemoryType {
    Null,
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Json,
    Decimal,
    DateTime,
    Date,
    Time,
    Uuid,
    Enum,
    Array,
}

impl crate::Value {
    /// The in-memory type tag for this value, ignoring its payload.
    pub fn in_memory_type(&self) -> InMemoryType {
        match self {
            crate::Value::Null => InMemoryType::Null,
            crate::Value::Bool(_) => InMemoryType::Bool,
            crate::Value::Int(_) => InMemoryType::Int,
            crate::Value::Float(_) => InMemoryType::Float,
            crate::Value::Text(_) => InMemoryType::Text,
            crate::Value::Bytes(_) => InMemoryType::Bytes,
            crate::Value::Json(_) => InMemoryType::Json,
            crate::Value::Decimal(_) => InMemoryType::Decimal,
            crate::Value::DateTime(_) => InMemoryType::DateTime,
            crate::Value::Date(_) => InMemoryType::Date,
            crate::Value::Time(_) => InMemoryType::Time,
            crate::Value::Uuid(_) => InMemoryType::Uuid,
            crate::Value::Enum { .. } => InMemoryType::Enum,
            crate::Value::Array(_) => InMemoryType::Array,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    #[test]
    fn in_memory_type_matches_variant() {
        assert_eq!(Value::Int(1).in_memory_type(), InMemoryType::Int);
        assert_eq!(Value::Null.in_memory_type(), InMemoryType::Null);
    }
}
