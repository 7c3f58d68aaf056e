use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    /// Two operands that must agree in length (word count, capacity) do not.
    pub fn invalid_operand(operation: &'static str, left: usize, right: usize) -> Error {
        Error(
            ErrorKind::InvalidOperand {
                operation,
                left,
                right,
            }
            .into(),
        )
    }

    pub fn allocation_failed(bytes: usize, source: std::io::Error) -> Error {
        Error(ErrorKind::AllocationFailed { bytes, source }.into())
    }

    pub fn unsupported_filter(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::UnsupportedFilter {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn is_allocation_failure(&self) -> bool {
        matches!(self.kind(), ErrorKind::AllocationFailed { .. })
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("mismatched operands for {operation}: {left} vs {right}")]
    InvalidOperand {
        operation: &'static str,
        left: usize,
        right: usize,
    },

    #[error("failed to allocate {bytes} bytes: {source}")]
    AllocationFailed {
        bytes: usize,
        source: std::io::Error,
    },

    #[error("unsupported filter combination: {message}")]
    UnsupportedFilter { message: String },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let e = Error::invalid_operand("intersection_count", 2, 3);
        assert!(matches!(
            e.kind(),
            ErrorKind::InvalidOperand {
                left: 2,
                right: 3,
                ..
            }
        ));
        assert_eq!(
            e.to_string(),
            "mismatched operands for intersection_count: 2 vs 3"
        );

        let e = Error::allocation_failed(64, std::io::ErrorKind::OutOfMemory.into());
        assert!(e.is_allocation_failure());
    }
}
