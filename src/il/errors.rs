use super::SynLabel;
use crate::util::Offset;
use std::fmt;

/// Malformed method body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Instruction offsets must be strictly increasing
    NonMonotonicOffset { previous: Offset, next: Offset },

    /// Body finished while some labels were referred to but never placed
    UnplacedLabel(Vec<SynLabel>),

    /// The same label was placed twice
    DuplicateLabel(SynLabel),

    /// Exception handler ranges must be non-empty (`start < end`)
    InvalidHandlerRange { start: Offset, end: Offset },

    /// Exception handler does not start at an instruction
    UnknownHandlerStart(Offset),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NonMonotonicOffset { previous, next } => {
                write!(f, "instruction at {} does not follow {}", next, previous)
            }
            Error::UnplacedLabel(labels) => write!(f, "labels never placed: {:?}", labels),
            Error::DuplicateLabel(label) => write!(f, "label {} placed twice", label),
            Error::InvalidHandlerRange { start, end } => {
                write!(f, "invalid exception handler range {}..{}", start, end)
            }
            Error::UnknownHandlerStart(offset) => {
                write!(f, "exception handler starts at {}, which is not an instruction", offset)
            }
        }
    }
}

impl std::error::Error for Error {}
