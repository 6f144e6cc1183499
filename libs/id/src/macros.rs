//! Macros for defining numeric ID types.

/// Macro to define a typed numeric ID.
///
/// This generates a newtype wrapper around an unsigned integer with:
/// - `new()` / `value()` accessors
/// - `From` conversions in both directions
/// - `Serialize` and `Deserialize` as the bare integer
/// - `Ord`, `Hash`, and other standard traits
///
/// `Display` and `FromStr` are left to each type since job IDs accept
/// several encodings.
///
/// # Example
///
/// ```ignore
/// define_numeric_id!(UserId, u32);
///
/// let owner = UserId::new(1000);
/// assert_eq!(owner.value(), 1000);
/// ```
#[macro_export]
macro_rules! define_numeric_id {
    ($name:ident, $repr:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($repr);

        impl $name {
            /// Creates an ID from its raw value.
            #[must_use]
            pub const fn new(value: $repr) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            #[must_use]
            pub const fn value(&self) -> $repr {
                self.0
            }
        }

        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $repr {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                <$repr as serde::Serialize>::serialize(&self.0, serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                <$repr as serde::Deserialize>::deserialize(deserializer).map(Self)
            }
        }
    };
}
