//! A protocol field that a script may leave unspecified.

use std::fmt::{self, Display};

/// A header or chunk field that is either a concrete value or a wildcard.
///
/// Scripts write `...` for fields they do not care about. An expected packet
/// keeps those fields as [`Field::Wildcard`] and the comparator skips them.
/// Packets decoded from live traffic always carry [`Field::Value`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field<T> {
    Wildcard,
    Value(T),
}

impl<T> Field<T> {
    /// Returns the value if one was given.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Wildcard => None,
            Self::Value(value) => Some(value),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }

    pub fn as_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Wildcard => None,
            Self::Value(value) => Some(value),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Self::Wildcard => Field::Wildcard,
            Self::Value(value) => Field::Value(f(value)),
        }
    }

    /// Whether `live` satisfies this expectation. A wildcard accepts anything.
    pub fn matches(&self, live: &T) -> bool
    where
        T: PartialEq,
    {
        match self {
            Self::Wildcard => true,
            Self::Value(expected) => expected == live,
        }
    }

    /// Like [`Field::matches`] but for a live field, which may itself be
    /// absent when it was never decoded.
    pub fn matches_field(&self, live: &Field<T>) -> bool
    where
        T: PartialEq,
    {
        match (self, live) {
            (Self::Wildcard, _) => true,
            (Self::Value(expected), Field::Value(live)) => expected == live,
            (Self::Value(_), Field::Wildcard) => false,
        }
    }
}

impl<T: Clone + Default> Field<T> {
    /// The value written on the wire. Wildcards serialize as the type's
    /// default.
    pub fn wire_value(&self) -> T {
        match self {
            Self::Wildcard => T::default(),
            Self::Value(value) => value.clone(),
        }
    }
}

impl<T: Copy> Field<T> {
    pub fn get(&self) -> Option<T> {
        self.value().copied()
    }
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self::Wildcard
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Value(value),
            None => Self::Wildcard,
        }
    }
}

impl<T: Display> Display for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => write!(f, "..."),
            Self::Value(value) => value.fmt(f),
        }
    }
}
