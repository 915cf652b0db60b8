//! Error types for the object model and reflection system
//!
//! Lookup misses are deliberately not errors: probing the registry for a
//! type that may not exist is a normal operation (e.g. while reading
//! forward-compatible scene data) and is expressed as `Option::None`.

/// Error type for object lifecycle, casting and reflection operations
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    /// A checked cast between unrelated managed classes
    #[error("Invalid cast from {from} to {to}")]
    InvalidCast {
        from: &'static str,
        to: &'static str,
    },

    /// A dereference was attempted through a null or invalid reference
    #[error("Null object reference")]
    NullReference,

    /// The type was registered without an activator (abstract base)
    #[error("Type {0} has no activator")]
    NotActivatable(&'static str),

    /// A type was explicitly registered twice under the same key or name
    #[error("Type {0} is already registered")]
    DuplicateType(&'static str),

    /// A reflection value access on a field that holds no managed reference
    #[error("Field {field} is not a managed reference")]
    NotAReference { field: &'static str },

    /// A field accessor was applied to an instance of an unrelated type
    #[error("Instance is not a {expected}")]
    ForeignInstance { expected: &'static str },
}

/// Result type for object model operations
pub type ObjectResult<T> = Result<T, ObjectError>;

/// Report an unrecoverable engine invariant violation and terminate.
///
/// Reserved for broken process-level invariants (a duplicated engine
/// singleton, a corrupted registry). Recoverable conditions go through
/// [`ObjectError`] instead.
pub fn fatal(message: &str) -> ! {
    tracing::error!(target: "halcyon::fatal", "{message}");
    panic!("fatal engine error: {message}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ObjectError::InvalidCast {
            from: "Texture",
            to: "Material",
        };
        assert_eq!(err.to_string(), "Invalid cast from Texture to Material");

        let err = ObjectError::NotActivatable("RenderResource");
        assert_eq!(err.to_string(), "Type RenderResource has no activator");

        let err = ObjectError::ForeignInstance { expected: "Actor" };
        assert_eq!(err.to_string(), "Instance is not a Actor");
    }

    #[test]
    #[should_panic(expected = "fatal engine error")]
    fn test_fatal_terminates() {
        fatal("second engine instance");
    }
}
