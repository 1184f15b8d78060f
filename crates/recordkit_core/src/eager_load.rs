//! A thread-local scratch space for eager-loaded association data.
//!
//! The core has no notion of associations or eager loading itself — that is
//! entirely an external concern layered on top of [`crate::backend::Model`].
//! What the core does provide is a place to stash values keyed by an
//! opaque string during the lifetime of a loader pass, so a model
//! implementation assembling nested associations does not need to thread an
//! extra parameter through every constructor it calls.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::value::Value;

thread_local! {
    static SCOPE: RefCell<HashMap<String, Value>> = RefCell::new(HashMap::new());
}

/// Per-thread key/value scratch space used while assembling eager-loaded
/// associations. Entries do not survive past [`EagerLoadScope::clear`], and
/// are never shared across threads.
pub struct EagerLoadScope;

impl EagerLoadScope {
    pub fn set(key: impl Into<String>, value: Value) {
        SCOPE.with(|scope| {
            scope.borrow_mut().insert(key.into(), value);
        });
    }

    pub fn get(key: &str) -> Option<Value> {
        SCOPE.with(|scope| scope.borrow().get(key).cloned())
    }

    pub fn remove(key: &str) -> Option<Value> {
        SCOPE.with(|scope| scope.borrow_mut().remove(key))
    }

    pub fn clear() {
        SCOPE.with(|scope| scope.borrow_mut().clear());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_round_trip_within_the_same_thread() {
        EagerLoadScope::clear();
        EagerLoadScope::set("orders_for_user_1", Value::Int(3));
        assert_eq!(EagerLoadScope::get("orders_for_user_1"), Some(Value::Int(3)));
        EagerLoadScope::clear();
        assert_eq!(EagerLoadScope::get("orders_for_user_1"), None);
    }
}
