use std::io;

use bytecode::Op;
use thiserror::Error;

/// A failure while executing an image. Always fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("undefined method '{name}' for {receiver}")]
    MethodNotFound { name: String, receiver: String },
    #[error("opcode {0} is not supported")]
    NotImplemented(Op),
    #[error("wrong argument type {got} (expected {expected})")]
    TypeError { expected: &'static str, got: String },
    #[error("divided by 0")]
    ZeroDivision,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("index {index} out of {kind} (size {len})")]
    IndexOutOfRange {
        kind: &'static str,
        index: i64,
        len: usize,
    },
    #[error("uninitialized constant {0}")]
    UninitializedConstant(String),
    #[error("uninitialized class variable {0}")]
    UninitializedClassVariable(String),
    #[error("superclass mismatch for class {0}")]
    SuperclassMismatch(String),
    #[error("jump to offset {offset} does not land on an instruction")]
    InvalidJumpTarget { offset: i64 },
    #[error("wrong number of arguments (given {given}, expected {expected})")]
    ArgumentCount { expected: usize, given: usize },
    #[error("{0}")]
    LocalJump(String),
    #[error("stack level too deep")]
    StackTooDeep,
    #[error("superclass chain of {0} is too deep")]
    ClassChainTooDeep(String),
    #[error("super called outside of method")]
    SuperOutsideMethod,
    #[error("output failed: {0}")]
    Io(String),
}

impl From<io::Error> for RuntimeError {
    fn from(err: io::Error) -> Self {
        RuntimeError::Io(err.to_string())
    }
}

pub type VmResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_read_like_ruby() {
        let err = RuntimeError::MethodNotFound {
            name: "frob".into(),
            receiver: "an instance of Foo".into(),
        };
        assert_eq!(err.to_string(), "undefined method 'frob' for an instance of Foo");
        assert_eq!(
            RuntimeError::NotImplemented(Op::Except).to_string(),
            "opcode EXCEPT is not supported"
        );
        assert_eq!(
            RuntimeError::ArgumentCount {
                expected: 1,
                given: 3
            }
            .to_string(),
            "wrong number of arguments (given 3, expected 1)"
        );
    }

    #[test]
    fn io_errors_convert() {
        let err: RuntimeError =
            io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed").into();
        assert_eq!(err, RuntimeError::Io("pipe closed".into()));
    }
}
