use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of an indicator definition, unique within a catalog.
    IndicatorId
);
string_id!(
    /// Identifier of a regime definition.
    RegimeId
);
string_id!(
    /// Identifier of a strategy.
    StrategyId
);
string_id!(
    /// Identifier of a strategy set (the routing target).
    StrategySetId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = RegimeId::new("trend");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"trend\"");
        let back: RegimeId = serde_json::from_str("\"trend\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn ids_borrow_as_str_for_lookup() {
        let mut set = HashSet::new();
        set.insert(RegimeId::from("trend"));
        assert!(set.contains("trend"));
        assert!(!set.contains("range"));
    }
}
