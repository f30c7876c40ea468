//! Error types for every layer of the binding.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ConversionError      - a runtime value does not fit a native type
//! BindError            - script-reachable failures at the native boundary
//! │                      (conversion, missing/wrong native object, ownership, borrows)
//! ScriptError          - the host runtime's error model (TypeError, RangeError, Error)
//! RegistrationError    - bind-time contract violations, never seen by scripts
//! ```
//!
//! `BindError` converts into `ScriptError` so a failing native call surfaces
//! as a catchable script error instead of aborting the host.

use thiserror::Error;

use crate::object::StorageKind;

// ============================================================================
// Conversion Errors
// ============================================================================

/// A runtime value could not be converted to the requested native type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// The value's kind is incompatible with the target type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// Integer value does not fit in the target type.
    #[error("integer overflow: {value} does not fit in {target_type}")]
    IntegerOverflow {
        value: i64,
        target_type: &'static str,
    },

    /// A float with a fractional part (or out of range) was passed for an integer.
    #[error("{value} is not a valid {target_type}")]
    NotAnInteger {
        value: f64,
        target_type: &'static str,
    },

    /// A required argument was not supplied.
    #[error("missing required argument")]
    MissingArgument,

    /// An array element failed to convert.
    #[error("element {index}: {source}")]
    Element {
        index: usize,
        #[source]
        source: Box<ConversionError>,
    },
}

// ============================================================================
// Boundary Errors
// ============================================================================

/// Failures raised while crossing from script into native code.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    /// Argument at a position failed to convert.
    #[error("argument {index}: {source}")]
    Argument {
        index: usize,
        #[source]
        source: ConversionError,
    },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Value is not an object, has no internal slot, or the slot is empty.
    #[error("expected native object, got none")]
    MissingObject,

    /// The wrapped object is not of (or derived from) the requested class.
    #[error("expected native object of type {expected}")]
    WrongType { expected: String },

    /// Shared-ownership access on an object that is not shared.
    #[error("native object of type {type_name} is not a shared object (stored {kind})")]
    OwnershipMismatch {
        type_name: &'static str,
        kind: StorageKind,
    },

    /// The object is already borrowed in a conflicting way.
    #[error("native object of type {type_name} is already borrowed")]
    AlreadyBorrowed { type_name: &'static str },

    /// No script class is bound for the native type.
    #[error("type {type_name} is not bound to a script class")]
    UnboundType { type_name: &'static str },

    /// A runtime object already carries a native object.
    #[error("object already holds a native object")]
    AlreadyAttached,

    /// The value could not be laid out in memory.
    #[error("cannot allocate storage for {type_name}")]
    Allocation { type_name: &'static str },

    /// Error reported by native code.
    #[error("{0}")]
    Native(String),

    #[error(transparent)]
    Script(#[from] ScriptError),
}

impl BindError {
    /// Attach an argument position to a conversion failure.
    pub fn at_argument(index: usize, source: ConversionError) -> Self {
        BindError::Argument { index, source }
    }

    /// Error raised from native code with a custom message.
    pub fn native(msg: impl Into<String>) -> Self {
        BindError::Native(msg.into())
    }
}

// ============================================================================
// Script Errors
// ============================================================================

/// An error as the host runtime reports it to scripts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("TypeError: {0}")]
    TypeError(String),

    #[error("RangeError: {0}")]
    RangeError(String),

    #[error("Error: {0}")]
    Error(String),
}

impl ScriptError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        ScriptError::TypeError(msg.into())
    }

    pub fn range_error(msg: impl Into<String>) -> Self {
        ScriptError::RangeError(msg.into())
    }

    /// The message without the error class prefix.
    pub fn message(&self) -> &str {
        match self {
            ScriptError::TypeError(m) | ScriptError::RangeError(m) | ScriptError::Error(m) => m,
        }
    }
}

impl From<BindError> for ScriptError {
    fn from(err: BindError) -> Self {
        match err {
            BindError::Script(inner) => inner,
            BindError::Native(msg) => ScriptError::Error(msg),
            BindError::Conversion(ConversionError::IntegerOverflow { .. })
            | BindError::Argument {
                source: ConversionError::IntegerOverflow { .. },
                ..
            } => ScriptError::RangeError(err.to_string()),
            other => ScriptError::TypeError(other.to_string()),
        }
    }
}

// ============================================================================
// Registration Errors
// ============================================================================

/// Contract violations detected while binding, before any script runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    #[error(
        "{context}: the number of arguments and argument specs do not match ({params} parameters, {specs} specs)"
    )]
    ArityMismatch {
        context: String,
        params: usize,
        specs: usize,
    },

    /// Output/reference slot declared for a parameter that is not `Out<T>`.
    #[error("{context}: parameter {index} must be a mutable reference to be used as {role}")]
    NotMutableReference {
        context: String,
        index: usize,
        role: &'static str,
    },

    #[error("{context}: parameter {index} of type {type_name} has no zero value")]
    NoZeroValue {
        context: String,
        index: usize,
        type_name: &'static str,
    },

    #[error("{context}: parameter {index} of type {type_name} cannot default to {num}/{den}")]
    InvalidDefault {
        context: String,
        index: usize,
        type_name: &'static str,
        num: i64,
        den: i64,
    },

    /// Method receiver is not the bound class or one of its ancestors.
    #[error("{context}: receiver type {receiver} is not {class} or one of its ancestors")]
    UnrelatedReceiver {
        context: String,
        receiver: &'static str,
        class: String,
    },

    #[error("type {type_name} is already bound as {existing}")]
    TypeAlreadyBound {
        type_name: &'static str,
        existing: String,
    },

    #[error("{name} is already bound to native type {existing}")]
    NameBoundToOtherType {
        name: String,
        existing: &'static str,
    },

    /// Reopening a name that exists as a different kind of scope or member.
    #[error("{name} already exists as a {existing}")]
    ScopeKindMismatch { name: String, existing: String },

    /// Property getter that returns nothing.
    #[error("{context}: a property getter must return a value")]
    VoidGetter { context: String },

    #[error("super class {type_name} is not bound")]
    UnboundSuperClass { type_name: &'static str },

    /// A constant or variable could not be converted when installed.
    #[error("cannot install {name}: {source}")]
    Value {
        name: String,
        #[source]
        source: BindError,
    },

    #[error(transparent)]
    Script(#[from] ScriptError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_object_message() {
        assert_eq!(
            BindError::MissingObject.to_string(),
            "expected native object, got none"
        );
    }

    #[test]
    fn wrong_type_message() {
        let err = BindError::WrongType {
            expected: "Point".into(),
        };
        assert_eq!(err.to_string(), "expected native object of type Point");
    }

    #[test]
    fn bind_errors_become_type_errors() {
        let err: ScriptError = BindError::MissingObject.into();
        assert!(matches!(err, ScriptError::TypeError(_)));
    }

    #[test]
    fn overflow_becomes_range_error() {
        let err: ScriptError = BindError::at_argument(
            0,
            ConversionError::IntegerOverflow {
                value: 300,
                target_type: "u8",
            },
        )
        .into();
        assert!(matches!(err, ScriptError::RangeError(_)));
    }

    #[test]
    fn native_errors_become_plain_errors() {
        let err: ScriptError = BindError::native("boom").into();
        assert_eq!(err, ScriptError::Error("boom".into()));
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn script_errors_pass_through() {
        let inner = ScriptError::type_error("x");
        let err: ScriptError = BindError::Script(inner.clone()).into();
        assert_eq!(err, inner);
    }

    #[test]
    fn arity_message_mentions_counts() {
        let err = RegistrationError::ArityMismatch {
            context: "clamp".into(),
            params: 3,
            specs: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("do not match"));
        assert!(msg.contains("3 parameters"));
    }
}
