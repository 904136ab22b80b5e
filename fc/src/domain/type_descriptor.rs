//! Structural type descriptors
//!
//! Every filter value publishes a descriptor of its element type and every
//! controller declares the descriptor it expects. The two are compared once,
//! when the controller attaches.

use std::borrow::Cow;

/// Logical element type plus a nullability flag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    name: Cow<'static, str>,
    nullable: bool,
}

/// Outcome of comparing a value descriptor with a controller descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCompatibility {
    Compatible,
    /// Same logical type, different nullability flag
    NullabilityOnly,
    Incompatible,
}

impl TypeDescriptor {
    /// Descriptor for `T`; `Option<U>` is described as a nullable `U`
    pub fn of<T: ?Sized>() -> Self {
        let name = std::any::type_name::<T>();
        match name
            .strip_prefix("core::option::Option<")
            .and_then(|inner| inner.strip_suffix('>'))
        {
            Some(inner) => Self {
                name: Cow::Borrowed(inner),
                nullable: true,
            },
            None => Self {
                name: Cow::Borrowed(name),
                nullable: false,
            },
        }
    }

    /// Descriptor for a nullable `T`
    pub fn nullable<T: ?Sized>() -> Self {
        Self::of::<T>().with_nullable(true)
    }

    /// Descriptor from an explicit logical name
    pub fn named(name: impl Into<Cow<'static, str>>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            nullable,
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Compare this (value) descriptor against a controller's expectation
    pub fn compatibility(&self, expected: &TypeDescriptor) -> TypeCompatibility {
        if self.name != expected.name {
            TypeCompatibility::Incompatible
        } else if self.nullable != expected.nullable {
            TypeCompatibility::NullabilityOnly
        } else {
            TypeCompatibility::Compatible
        }
    }
}

impl std::fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.nullable {
            write!(f, "Option<{}>", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_type_is_compatible() {
        let value = TypeDescriptor::of::<i64>();
        assert_eq!(value.compatibility(&TypeDescriptor::of::<i64>()), TypeCompatibility::Compatible);
    }

    #[test]
    fn test_nullability_only() {
        let value = TypeDescriptor::of::<i64>();
        assert_eq!(
            value.compatibility(&TypeDescriptor::nullable::<i64>()),
            TypeCompatibility::NullabilityOnly
        );
    }

    #[test]
    fn test_different_types_are_incompatible() {
        let value = TypeDescriptor::nullable::<i64>();
        assert_eq!(
            value.compatibility(&TypeDescriptor::nullable::<String>()),
            TypeCompatibility::Incompatible
        );
    }

    #[test]
    fn test_option_is_nullable_inner_type() {
        let value = TypeDescriptor::of::<Option<i64>>();
        assert_eq!(value, TypeDescriptor::nullable::<i64>());
        assert_eq!(
            value.compatibility(&TypeDescriptor::nullable::<i64>()),
            TypeCompatibility::Compatible
        );
        assert_eq!(
            value.compatibility(&TypeDescriptor::of::<i64>()),
            TypeCompatibility::NullabilityOnly
        );
        assert_eq!(TypeDescriptor::of::<Option<Vec<String>>>(), TypeDescriptor::nullable::<Vec<String>>());
    }

    #[test]
    fn test_display() {
        assert_eq!(TypeDescriptor::named("date", false).to_string(), "date");
        assert_eq!(TypeDescriptor::named("date", true).to_string(), "Option<date>");
    }
}
