use crate::il;
use crate::util::Offset;
use std::fmt;

/// Fatal analysis failure
///
/// Any of these aborts the analysis of the whole program: no partial result is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Two control-flow paths reach the same instruction with different stack depths
    StackReconciliationFailure { offset: Offset, depths: (usize, usize) },

    /// A branch operand does not match the offset of any instruction in the method
    UnresolvedBranchTarget { source: Offset, target: Offset },

    /// An instruction pops more values than the abstract stack holds
    StackUnderflow { offset: Offset },

    /// Malformed method body
    Body(il::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::StackReconciliationFailure {
                offset,
                depths: (depth1, depth2),
            } => write!(
                f,
                "cannot reconcile stacks of depth {} and {} at {}",
                depth1, depth2, offset
            ),
            Error::UnresolvedBranchTarget { source, target } => {
                write!(f, "branch at {} targets unknown offset {}", source, target)
            }
            Error::StackUnderflow { offset } => write!(f, "stack underflow at {}", offset),
            Error::Body(err) => write!(f, "malformed method body: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Body(err) => Some(err),
            _ => None,
        }
    }
}

impl From<il::Error> for Error {
    fn from(err: il::Error) -> Error {
        Error::Body(err)
    }
}
