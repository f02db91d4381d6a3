//! Error types shared across the runtime boundary

/// Result type for script and builtin calls
pub type CallResult<T> = Result<T, CallError>;

/// Failure of a script function or builtin invocation.
///
/// Dispatch never unwinds: every call site receives one of these as a value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    /// No function with this name along the resolution chain
    #[error("Invalid call to method '{0}'")]
    InvalidMethod(String),

    /// Argument has the wrong type
    #[error("Invalid type in argument {index}, expected {expected}")]
    InvalidArgument {
        /// Zero-based argument position
        index: usize,
        /// Expected type name
        expected: String,
    },

    /// More arguments than the function declares
    #[error("Too many arguments: expected {expected}, got {got}")]
    TooManyArguments {
        /// Maximum accepted
        expected: usize,
        /// Number supplied
        got: usize,
    },

    /// Fewer arguments than the function requires
    #[error("Too few arguments: expected {expected}, got {got}")]
    TooFewArguments {
        /// Minimum required
        expected: usize,
        /// Number supplied
        got: usize,
    },

    /// Instance method invoked without an instance
    #[error("Instance is null")]
    InstanceIsNull,

    /// The call-stack tracker rejected the frame
    #[error("Stack Overflow (Stack Size: {0})")]
    StackOverflow(usize),

    /// The function body reported an error
    #[error("{0}")]
    Failed(String),
}

impl CallError {
    /// Check if this error means "nothing to call", as opposed to a failed call
    pub fn is_invalid_method(&self) -> bool {
        matches!(self, CallError::InvalidMethod(_))
    }
}

impl From<String> for CallError {
    fn from(s: String) -> Self {
        CallError::Failed(s)
    }
}

impl From<&str> for CallError {
    fn from(s: &str) -> Self {
        CallError::Failed(s.to_string())
    }
}
