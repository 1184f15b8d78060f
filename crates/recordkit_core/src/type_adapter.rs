use std::collections::HashMap;

use crate::error::DbError;
use crate::value::Value;
use crate::wire::{InMemoryType, WireType};

/// Per-call options an adapter may consult (e.g. a source timezone for a
/// datetime conversion) without widening the registry's lookup key.
pub type AdapterOptions = HashMap<String, Value>;

/// Converts a single `(in-memory type, wire type)` pair in both directions.
pub trait TypeAdapter: Send + Sync {
    /// Convert an in-memory value into its wire-ready form.
    fn to_db(&self, value: &Value, options: &AdapterOptions) -> Result<Value, DbError>;

    /// Convert a wire value back into its in-memory form.
    fn from_db(&self, value: &Value, options: &AdapterOptions) -> Result<Value, DbError>;
}

/// Exact `(in-memory type, wire type)` key. Lookup is a flat map on this key;
/// there is no subtype walking or inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeAdapterKey {
    pub in_memory_type: InMemoryType,
    pub wire_type: WireType,
}

impl TypeAdapterKey {
    pub fn new(in_memory_type: InMemoryType, wire_type: WireType) -> Self {
        Self {
            in_memory_type,
            wire_type,
        }
    }
}

/// A flat registry of type adapters keyed on exact `(in-memory type, wire
/// type)` pairs.
///
/// Adapters are looked up by exact match only; a value whose pair has no
/// registered adapter passes through unchanged rather than failing, matching
/// the behavior of a type that needs no conversion (e.g. `Text` to `Text`).
pub struct TypeAdapterRegistry {
    adapters: HashMap<TypeAdapterKey, Box<dyn TypeAdapter>>,
}

impl TypeAdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// An empty registry, built up by [`TypeAdapterRegistry::new`] plus
    /// [`Self::install_defaults`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.install_defaults();
        registry
    }

    /// Register an adapter for a type pair.
    ///
    /// Fails with `DbError::Validation` if the pair is already registered and
    /// `allow_override` is `false`.
    pub fn register(
        &mut self,
        adapter: Box<dyn TypeAdapter>,
        in_memory_type: InMemoryType,
        wire_type: WireType,
        allow_override: bool,
    ) -> Result<(), DbError> {
        let key = TypeAdapterKey::new(in_memory_type, wire_type);
        if !allow_override && self.adapters.contains_key(&key) {
            return Err(DbError::validation(format!(
                "type adapter already registered for {in_memory_type:?} <-> {wire_type:?}"
            )));
        }
        self.adapters.insert(key, adapter);
        Ok(())
    }

    pub fn get(&self, in_memory_type: InMemoryType, wire_type: WireType) -> Option<&dyn TypeAdapter> {
        self.adapters
            .get(&TypeAdapterKey::new(in_memory_type, wire_type))
            .map(|boxed| boxed.as_ref())
    }

    /// Adapt an in-memory value into the given wire type. Values with no
    /// registered adapter for their pair pass through unchanged.
    pub fn adapt_to_db(&self, value: &Value, wire_type: WireType) -> Result<Value, DbError> {
        self.adapt_to_db_with_options(value, wire_type, &AdapterOptions::new())
    }

    pub fn adapt_to_db_with_options(
        &self,
        value: &Value,
        wire_type: WireType,
        options: &AdapterOptions,
    ) -> Result<Value, DbError> {
        match self.get(value.in_memory_type(), wire_type) {
            Some(adapter) => adapter.to_db(value, options),
            None => Ok(value.clone()),
        }
    }

    /// Adapt a wire value back into the requested in-memory type.
    ///
    /// `wire_type` identifies the representation the driver delivered the
    /// value in; a bare `Value` does not itself carry that tag (e.g. a UUID
    /// delivered as bytes and an opaque `Bytes` column are both
    /// `Value::Bytes`), so the caller must supply it.
    pub fn adapt_from_db(
        &self,
        value: &Value,
        wire_type: WireType,
        in_memory_type: InMemoryType,
    ) -> Result<Value, DbError> {
        self.adapt_from_db_with_options(value, wire_type, in_memory_type, &AdapterOptions::new())
    }

    pub fn adapt_from_db_with_options(
        &self,
        value: &Value,
        wire_type: WireType,
        in_memory_type: InMemoryType,
        options: &AdapterOptions,
    ) -> Result<Value, DbError> {
        match self.get(in_memory_type, wire_type) {
            Some(adapter) => adapter.from_db(value, options),
            None => Ok(value.clone()),
        }
    }

    /// Register the default adapter set every backend starts with: datetime,
    /// boolean, UUID (text and bytes), JSON, decimal, enum, byte blobs,
    /// arrays.
    pub fn install_defaults(&mut self) {
        self.force_register(Box::new(PassthroughAdapter), InMemoryType::Bool, WireType::Bool);
        self.force_register(Box::new(PassthroughAdapter), InMemoryType::Int, WireType::Int);
        self.force_register(Box::new(PassthroughAdapter), InMemoryType::Float, WireType::Float);
        self.force_register(Box::new(PassthroughAdapter), InMemoryType::Text, WireType::Text);
        self.force_register(Box::new(PassthroughAdapter), InMemoryType::Bytes, WireType::Bytes);
        self.force_register(Box::new(PassthroughAdapter), InMemoryType::Json, WireType::Json);
        self.force_register(
            Box::new(PassthroughAdapter),
            InMemoryType::Decimal,
            WireType::Decimal,
        );
        self.force_register(
            Box::new(PassthroughAdapter),
            InMemoryType::DateTime,
            WireType::DateTime,
        );
        self.force_register(Box::new(PassthroughAdapter), InMemoryType::Date, WireType::Date);
        self.force_register(Box::new(PassthroughAdapter), InMemoryType::Time, WireType::Time);
        self.force_register(Box::new(UuidTextAdapter), InMemoryType::Uuid, WireType::UuidText);
        self.force_register(Box::new(UuidBytesAdapter), InMemoryType::Uuid, WireType::UuidBytes);
        self.force_register(Box::new(PassthroughAdapter), InMemoryType::Enum, WireType::Enum);
        self.force_register(Box::new(PassthroughAdapter), InMemoryType::Array, WireType::Array);
    }

    fn force_register(&mut self, adapter: Box<dyn TypeAdapter>, in_memory_type: InMemoryType, wire_type: WireType) {
        self.adapters
            .insert(TypeAdapterKey::new(in_memory_type, wire_type), adapter);
    }
}

impl Default for TypeAdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// An adapter whose wire and in-memory shapes coincide, used for pairs that
/// need no conversion (e.g. `Bool <-> Bool`).
struct PassthroughAdapter;

impl TypeAdapter for PassthroughAdapter {
    fn to_db(&self, value: &Value, _options: &AdapterOptions) -> Result<Value, DbError> {
        Ok(value.clone())
    }

    fn from_db(&self, value: &Value, _options: &AdapterOptions) -> Result<Value, DbError> {
        Ok(value.clone())
    }
}

/// UUID rendered as its canonical hyphenated text form.
struct UuidTextAdapter;

impl TypeAdapter for UuidTextAdapter {
    fn to_db(&self, value: &Value, _options: &AdapterOptions) -> Result<Value, DbError> {
        match value {
            Value::Uuid(id) => Ok(Value::Text(id.to_string())),
            Value::Null => Ok(Value::Null),
            other => Err(DbError::TypeConversion(format!(
                "expected a UUID, got {:?}",
                other.in_memory_type()
            ))),
        }
    }

    fn from_db(&self, value: &Value, _options: &AdapterOptions) -> Result<Value, DbError> {
        match value {
            Value::Text(s) => uuid::Uuid::parse_str(s)
                .map(Value::Uuid)
                .map_err(|e| DbError::TypeConversion(format!("malformed UUID text {s:?}: {e}"))),
            Value::Null => Ok(Value::Null),
            other => Err(DbError::TypeConversion(format!(
                "expected UUID text, got {:?}",
                other.in_memory_type()
            ))),
        }
    }
}

/// UUID rendered as its 16-byte binary form.
struct UuidBytesAdapter;

impl TypeAdapter for UuidBytesAdapter {
    fn to_db(&self, value: &Value, _options: &AdapterOptions) -> Result<Value, DbError> {
        match value {
            Value::Uuid(id) => Ok(Value::Bytes(id.as_bytes().to_vec())),
            Value::Null => Ok(Value::Null),
            other => Err(DbError::TypeConversion(format!(
                "expected a UUID, got {:?}",
                other.in_memory_type()
            ))),
        }
    }

    fn from_db(&self, value: &Value, _options: &AdapterOptions) -> Result<Value, DbError> {
        match value {
            Value::Bytes(bytes) => {
                let array: [u8; 16] = bytes.as_slice().try_into().map_err(|_| {
                    DbError::TypeConversion(format!(
                        "malformed UUID bytes: expected 16 bytes, got {}",
                        bytes.len()
                    ))
                })?;
                Ok(Value::Uuid(uuid::Uuid::from_bytes(array)))
            }
            Value::Null => Ok(Value::Null),
            other => Err(DbError::TypeConversion(format!(
                "expected UUID bytes, got {:?}",
                other.in_memory_type()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_rejects_duplicate_without_override() {
        let mut registry = TypeAdapterRegistry::new();
        registry
            .register(
                Box::new(PassthroughAdapter),
                InMemoryType::Text,
                WireType::Text,
                false,
            )
            .unwrap();
        let err = registry
            .register(
                Box::new(PassthroughAdapter),
                InMemoryType::Text,
                WireType::Text,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[test]
    fn register_allows_duplicate_with_override() {
        let mut registry = TypeAdapterRegistry::new();
        registry
            .register(
                Box::new(PassthroughAdapter),
                InMemoryType::Text,
                WireType::Text,
                false,
            )
            .unwrap();
        assert!(
            registry
                .register(
                    Box::new(PassthroughAdapter),
                    InMemoryType::Text,
                    WireType::Text,
                    true,
                )
                .is_ok()
        );
    }

    #[test]
    fn unregistered_pair_passes_through_unchanged() {
        let registry = TypeAdapterRegistry::new();
        let value = Value::Text("hello".into());
        let adapted = registry.adapt_to_db(&value, WireType::Text).unwrap();
        assert_eq!(adapted, value);
    }

    #[test]
    fn uuid_round_trips_through_text() {
        let registry = TypeAdapterRegistry::with_defaults();
        let id = uuid::Uuid::new_v4();
        let value = Value::Uuid(id);
        let wire = registry.adapt_to_db(&value, WireType::UuidText).unwrap();
        assert_eq!(wire, Value::Text(id.to_string()));
        let back = registry
            .adapt_from_db(&wire, WireType::UuidText, InMemoryType::Uuid)
            .unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn uuid_round_trips_through_bytes() {
        let registry = TypeAdapterRegistry::with_defaults();
        let id = uuid::Uuid::new_v4();
        let value = Value::Uuid(id);
        let wire = registry.adapt_to_db(&value, WireType::UuidBytes).unwrap();
        let back = registry
            .adapt_from_db(&wire, WireType::UuidBytes, InMemoryType::Uuid)
            .unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn malformed_uuid_bytes_fail_with_type_conversion() {
        let registry = TypeAdapterRegistry::with_defaults();
        let bad = Value::Bytes(vec![1, 2, 3]);
        let err = registry
            .adapt_from_db(&bad, WireType::UuidBytes, InMemoryType::Uuid)
            .unwrap_err();
        assert!(matches!(err, DbError::TypeConversion(_)));
    }
}
