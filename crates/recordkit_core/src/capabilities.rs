use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Top-level feature categories a backend declares support for.
    ///
    /// Built once per backend instance from its reported server version, then
    /// queried cheaply by the dialect, query builder, and transaction manager
    /// for the lifetime of the connection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CapabilityCategory: u32 {
        const SET_OPERATIONS    = 1 << 0;
        const WINDOW_FUNCTIONS  = 1 << 1;
        const ADVANCED_GROUPING = 1 << 2;
        const CTE               = 1 << 3;
        const JSON_OPERATIONS   = 1 << 4;
        const RETURNING         = 1 << 5;
        const TRANSACTIONS      = 1 << 6;
        const BULK              = 1 << 7;
        const JOIN               = 1 << 8;
        const CONSTRAINTS       = 1 << 9;
        const AGGREGATE_FUNCTIONS = 1 << 10;
        const DATETIME_FUNCTIONS  = 1 << 11;
        const STRING_FUNCTIONS    = 1 << 12;
        const MATH_FUNCTIONS      = 1 << 13;
        const QUALIFY             = 1 << 14;
    }
}

impl Serialize for CapabilityCategory {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CapabilityCategory {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u32::deserialize(deserializer)?;
        Ok(Self::from_bits(bits).unwrap_or_else(Self::empty))
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WindowFunctions: u16 {
        const ROW_NUMBER = 1 << 0;
        const RANK       = 1 << 1;
        const DENSE_RANK = 1 << 2;
        const LAG        = 1 << 3;
        const LEAD       = 1 << 4;
        const NTILE      = 1 << 5;
        const FIRST_VALUE = 1 << 6;
        const LAST_VALUE  = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SetOperations: u16 {
        const UNION         = 1 << 0;
        const UNION_ALL     = 1 << 1;
        const INTERSECT     = 1 << 2;
        const INTERSECT_ALL = 1 << 3;
        const EXCEPT        = 1 << 4;
        const EXCEPT_ALL    = 1 << 5;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CteFeatures: u16 {
        const BASIC              = 1 << 0;
        const RECURSIVE          = 1 << 1;
        const COMPOUND_RECURSIVE = 1 << 2;
        const CTE_IN_DML         = 1 << 3;
        const MATERIALIZED       = 1 << 4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AdvancedGrouping: u16 {
        const ROLLUP = 1 << 0;
        const CUBE   = 1 << 1;
        const GROUPING_SETS = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct JsonOperations: u16 {
        const EXTRACT    = 1 << 0;
        const CONTAINS   = 1 << 1;
        const SET_PATH   = 1 << 2;
        const AGGREGATE  = 1 << 3;
    }
}

macro_rules! manual_bits_serde {
    ($ty:ty, $repr:ty) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.bits().serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let bits = <$repr>::deserialize(deserializer)?;
                Ok(Self::from_bits(bits).unwrap_or_else(Self::empty))
            }
        }
    };
}

manual_bits_serde!(WindowFunctions, u16);
manual_bits_serde!(SetOperations, u16);
manual_bits_serde!(CteFeatures, u16);
manual_bits_serde!(AdvancedGrouping, u16);
manual_bits_serde!(JsonOperations, u16);

/// Whether, and how, a backend can produce `RETURNING` rows from DML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturningCapability {
    /// The backend/version has no `RETURNING`-equivalent clause at all.
    None,
    /// Supported, with a reliable affected-row count.
    Supported,
}

/// A backend's declared feature support, built once from its reported server
/// version and queried for the lifetime of the connection.
///
/// Builders (`with_*`) additively mark individual features and auto-enable
/// the owning category; there is no way to set a sub-feature flag without
/// also setting its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub category: CapabilityCategory,
    pub window_functions: WindowFunctions,
    pub set_operations: SetOperations,
    pub cte: CteFeatures,
    pub advanced_grouping: AdvancedGrouping,
    pub json_operations: JsonOperations,
    pub returning: ReturningCapability,
}

impl Capabilities {
    pub fn empty() -> Self {
        Self {
            category: CapabilityCategory::empty(),
            window_functions: WindowFunctions::empty(),
            set_operations: SetOperations::empty(),
            cte: CteFeatures::empty(),
            advanced_grouping: AdvancedGrouping::empty(),
            json_operations: JsonOperations::empty(),
            returning: ReturningCapability::None,
        }
    }

    pub fn supports_category(&self, category: CapabilityCategory) -> bool {
        self.category.contains(category)
    }

    pub fn with_window_function(mut self, flag: WindowFunctions) -> Self {
        self.window_functions |= flag;
        self.category |= CapabilityCategory::WINDOW_FUNCTIONS;
        self
    }

    pub fn supports_window_function(&self, flag: WindowFunctions) -> bool {
        self.window_functions.contains(flag)
    }

    pub fn with_set_operation(mut self, flag: SetOperations) -> Self {
        self.set_operations |= flag;
        self.category |= CapabilityCategory::SET_OPERATIONS;
        self
    }

    pub fn supports_set_operation(&self, flag: SetOperations) -> bool {
        self.set_operations.contains(flag)
    }

    pub fn with_cte_feature(mut self, flag: CteFeatures) -> Self {
        self.cte |= flag;
        self.category |= CapabilityCategory::CTE;
        self
    }

    pub fn supports_cte_feature(&self, flag: CteFeatures) -> bool {
        self.cte.contains(flag)
    }

    pub fn with_advanced_grouping(mut self, flag: AdvancedGrouping) -> Self {
        self.advanced_grouping |= flag;
        self.category |= CapabilityCategory::ADVANCED_GROUPING;
        self
    }

    pub fn supports_advanced_grouping(&self, flag: AdvancedGrouping) -> bool {
        self.advanced_grouping.contains(flag)
    }

    pub fn with_json_operation(mut self, flag: JsonOperations) -> Self {
        self.json_operations |= flag;
        self.category |= CapabilityCategory::JSON_OPERATIONS;
        self
    }

    pub fn supports_json_operation(&self, flag: JsonOperations) -> bool {
        self.json_operations.contains(flag)
    }

    pub fn with_returning(mut self, returning: ReturningCapability) -> Self {
        self.returning = returning;
        if returning != ReturningCapability::None {
            self.category |= CapabilityCategory::RETURNING;
        }
        self
    }

    pub fn with_category(mut self, category: CapabilityCategory) -> Self {
        self.category |= category;
        self
    }

    /// A convenience "all of" constant a full-featured backend (e.g.
    /// PostgreSQL) starts from, then narrows via builder calls where its
    /// version lacks a feature.
    pub fn full_featured() -> Self {
        Self::empty()
            .with_category(
                CapabilityCategory::TRANSACTIONS
                    | CapabilityCategory::BULK
                    | CapabilityCategory::JOIN
                    | CapabilityCategory::CONSTRAINTS
                    | CapabilityCategory::AGGREGATE_FUNCTIONS
                    | CapabilityCategory::DATETIME_FUNCTIONS
                    | CapabilityCategory::STRING_FUNCTIONS
                    | CapabilityCategory::MATH_FUNCTIONS,
            )
            .with_returning(ReturningCapability::Supported)
            .with_cte_feature(
                CteFeatures::BASIC
                    | CteFeatures::RECURSIVE
                    | CteFeatures::COMPOUND_RECURSIVE
                    | CteFeatures::CTE_IN_DML
                    | CteFeatures::MATERIALIZED,
            )
            .with_set_operation(
                SetOperations::UNION
                    | SetOperations::UNION_ALL
                    | SetOperations::INTERSECT
                    | SetOperations::INTERSECT_ALL
                    | SetOperations::EXCEPT
                    | SetOperations::EXCEPT_ALL,
            )
            .with_window_function(
                WindowFunctions::ROW_NUMBER
                    | WindowFunctions::RANK
                    | WindowFunctions::DENSE_RANK
                    | WindowFunctions::LAG
                    | WindowFunctions::LEAD
                    | WindowFunctions::NTILE
                    | WindowFunctions::FIRST_VALUE
                    | WindowFunctions::LAST_VALUE,
            )
            .with_advanced_grouping(
                AdvancedGrouping::ROLLUP | AdvancedGrouping::CUBE | AdvancedGrouping::GROUPING_SETS,
            )
            .with_json_operation(
                JsonOperations::EXTRACT
                    | JsonOperations::CONTAINS
                    | JsonOperations::SET_PATH
                    | JsonOperations::AGGREGATE,
            )
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marking_a_feature_auto_enables_its_category() {
        let caps = Capabilities::empty().with_window_function(WindowFunctions::ROW_NUMBER);
        assert!(caps.supports_category(CapabilityCategory::WINDOW_FUNCTIONS));
        assert!(caps.supports_window_function(WindowFunctions::ROW_NUMBER));
        assert!(!caps.supports_window_function(WindowFunctions::LAG));
    }

    #[test]
    fn returning_none_does_not_enable_the_category() {
        let caps = Capabilities::empty().with_returning(ReturningCapability::None);
        assert!(!caps.supports_category(CapabilityCategory::RETURNING));
        assert_eq!(caps.returning, ReturningCapability::None);
    }

    #[test]
    fn full_featured_enables_every_set_operation() {
        let caps = Capabilities::full_featured();
        assert!(caps.supports_set_operation(SetOperations::INTERSECT_ALL));
        assert!(caps.supports_cte_feature(CteFeatures::RECURSIVE));
        assert_eq!(caps.returning, ReturningCapability::Supported);
    }

    #[test]
    fn bits_round_trip_through_serde() {
        let flags = WindowFunctions::ROW_NUMBER | WindowFunctions::LAG;
        let json = serde_json::to_string(&flags).unwrap();
        let back: WindowFunctions = serde_json::from_str(&json).unwrap();
        assert_eq!(flags, back);
    }
}
