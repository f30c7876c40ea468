//! Deterministic identity tokens for bound classes.
//!
//! Every class bound into a runtime gets a [`TypeHash`] computed from its
//! qualified script name. Wrapped native objects carry the token of the class
//! they were created as; downcasts compare tokens while walking the class
//! ancestry instead of relying on native run-time type information.
//!
//! # Examples
//!
//! ```
//! use scriptbind_core::TypeHash;
//!
//! let a = TypeHash::of_class("geometry.Point");
//! let b = TypeHash::from_path(&["geometry", "Point"]);
//! assert_eq!(a, b);
//! assert_ne!(a, TypeHash::of_class("geometry.Line"));
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain mixing constants.
///
/// Keeps class tokens apart from scope tokens that share a name.
pub mod hash_constants {
    /// Separator between path segments.
    pub const SEP: u64 = 0x4bc94d6bd06053ad;

    /// Domain marker for class tokens.
    pub const CLASS: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for module scopes.
    pub const MODULE: u64 = 0x5ea77ffbcdf5f302;
}

/// A 64-bit identity token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// The empty token, never produced for a real name.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Token for a class from its dotted qualified name (`"M.Point"`).
    pub fn of_class(qualified_name: &str) -> Self {
        Self::from_path_with(hash_constants::CLASS, qualified_name.split('.'))
    }

    /// Token for a module scope from its dotted qualified name.
    pub fn of_module(qualified_name: &str) -> Self {
        Self::from_path_with(hash_constants::MODULE, qualified_name.split('.'))
    }

    /// Class token from already split path segments.
    pub fn from_path<S: AsRef<str>>(segments: &[S]) -> Self {
        Self::from_path_with(
            hash_constants::CLASS,
            segments.iter().map(|s| s.as_ref()),
        )
    }

    fn from_path_with<'a>(domain: u64, segments: impl Iterator<Item = &'a str>) -> Self {
        let mut hash = domain;
        for segment in segments {
            hash = hash.rotate_left(5) ^ hash_constants::SEP;
            hash ^= xxh64(segment.as_bytes(), hash);
        }
        TypeHash(hash)
    }

    /// Whether this is the empty token.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_token_is_deterministic() {
        assert_eq!(TypeHash::of_class("M.Point"), TypeHash::of_class("M.Point"));
    }

    #[test]
    fn path_and_dotted_name_agree() {
        assert_eq!(
            TypeHash::of_class("a.b.C"),
            TypeHash::from_path(&["a", "b", "C"])
        );
    }

    #[test]
    fn nesting_changes_token() {
        assert_ne!(TypeHash::of_class("Point"), TypeHash::of_class("M.Point"));
        assert_ne!(TypeHash::of_class("a.bc"), TypeHash::of_class("ab.c"));
    }

    #[test]
    fn domains_are_separate() {
        assert_ne!(TypeHash::of_class("M"), TypeHash::of_module("M"));
    }

    #[test]
    fn real_names_are_never_empty() {
        assert!(!TypeHash::of_class("Point").is_empty());
        assert!(TypeHash::EMPTY.is_empty());
    }
}
