//! Caller-facing errors, their numeric codes and recovery classes.

use accel::{CompletionStatus, SubmitError, inflate_error_code};
use compress::{EncodeError, FramingError, InflateError};
use thiserror::Error;

use crate::verify::VerifyFailure;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// How a caller is expected to react to an [`EngineError`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorClass {
    /// Bad flags or parameters, detected before any pass. Nothing changed.
    Parameter,
    /// Resubmit later or with more space. Nothing changed.
    Backpressure,
    /// A fault that survived its single retry.
    Transient,
    /// The stream is corrupt or failed verification.
    Integrity,
    /// A broken invariant inside the engine.
    Internal,
}

impl ErrorClass {
    /// Whether the job must be reset before it can be used again.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Transient | Self::Integrity | Self::Internal)
    }
}

/// Errors returned by [`Engine::execute`](crate::Engine::execute).
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum EngineError {
    /// The chunk does not fit the job's stream state.
    #[error("job cannot continue: {0}")]
    NotContinuable(&'static str),
    /// Every accelerator queue rejected the submission.
    #[error("all accelerator work queues are busy")]
    QueuesBusy,
    /// An engine invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
    /// No accelerator queue supports the operation.
    #[error("no accelerator queue supports the operation")]
    NotSupportedByQueue,
    /// The requested mode is not implemented.
    #[error("unsupported mode: {0}")]
    NotSupportedMode(&'static str),
    /// Two flags cannot be combined.
    #[error("conflicting flags: {0}")]
    FlagConflict(&'static str),
    /// A buffer is larger than a descriptor can describe.
    #[error("size out of range: {0}")]
    Size(&'static str),
    /// A chunk switched between fixed and dynamic Huffman mid-stream.
    #[error("compression style changed in the middle of a stream")]
    InvalidCompressStyle,
    /// A zlib stream announces a preset dictionary the job does not have.
    #[error("stream requires a preset dictionary")]
    DictionaryRequired,
    /// The gzip or zlib wrapper is malformed.
    #[error(transparent)]
    Framing(#[from] FramingError),
    /// The DEFLATE stream is malformed.
    #[error(transparent)]
    Inflate(#[from] InflateError),
    /// The accelerator reported an operation error.
    #[error("accelerator error {error_code} (status {status:#04x})")]
    Hardware {
        /// Raw status byte.
        status: u8,
        /// Operation error code.
        error_code: u8,
    },
    /// The destination cannot hold even the fixed-size parts of the output.
    #[error("destination buffer too short")]
    DestinationTooShort,
    /// Compressed output did not decode back to the input.
    #[error("verification failed: {0}")]
    VerifyFailed(#[from] VerifyFailure),
    /// A page fault persisted after it was touched once.
    #[error("unresolved {} page fault at {addr:#x}", if *.write { "write" } else { "read" })]
    PageFault {
        /// Faulting address.
        addr: u64,
        /// Whether the access was a write.
        write: bool,
    },
}

impl EngineError {
    /// Numeric status code.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::NotContinuable(_) => 4,
            Self::QueuesBusy => 5,
            Self::Internal(_) => 6,
            Self::NotSupportedByQueue => 8,
            Self::NotSupportedMode(_) => 52,
            Self::FlagConflict(_) => 56,
            Self::Size(_) => 57,
            Self::InvalidCompressStyle => 83,
            Self::DictionaryRequired => 84,
            Self::Framing(FramingError::UnsupportedMethod(_)) => 105,
            Self::Framing(_) => 104,
            Self::Inflate(error) => 200 + u32::from(inflate_error_code(error)),
            Self::Hardware { error_code, .. } => 200 + u32::from(*error_code),
            Self::DestinationTooShort => 225,
            Self::VerifyFailed(_) => 229,
            Self::PageFault { write: false, .. } => 303,
            Self::PageFault { write: true, .. } => 431,
        }
    }

    /// Recovery class.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotContinuable(_)
            | Self::NotSupportedMode(_)
            | Self::FlagConflict(_)
            | Self::Size(_)
            | Self::InvalidCompressStyle
            | Self::DictionaryRequired => ErrorClass::Parameter,
            Self::QueuesBusy | Self::NotSupportedByQueue | Self::DestinationTooShort => {
                ErrorClass::Backpressure
            }
            Self::PageFault { .. } => ErrorClass::Transient,
            Self::Framing(_) | Self::Inflate(_) | Self::Hardware { .. } | Self::VerifyFailed(_) => {
                ErrorClass::Integrity
            }
            Self::Internal(_) => ErrorClass::Internal,
        }
    }
}

impl From<SubmitError> for EngineError {
    fn from(error: SubmitError) -> Self {
        match error {
            SubmitError::QueuesBusy => Self::QueuesBusy,
            SubmitError::NotSupported(_) => Self::NotSupportedByQueue,
            SubmitError::RepeatedPageFault { addr, write } => Self::PageFault { addr, write },
            SubmitError::TouchOutsideBuffers { addr, source } => {
                Self::Internal(format!("fault at {addr:#x} outside the job buffers: {source}"))
            }
            SubmitError::RecordUnreadable { addr, source } => {
                Self::Internal(format!("completion record at {addr:#x} unreadable: {source}"))
            }
            SubmitError::Hardware {
                status,
                error_code: 0,
                ..
            } if CompletionStatus::from_u8(status) == CompletionStatus::UnsupportedOpcode => {
                Self::NotSupportedMode("the accelerator rejected the descriptor")
            }
            SubmitError::Hardware {
                status,
                error_code: 0,
                ..
            } => Self::Internal(format!("accelerator status {status:#04x} without an error code")),
            SubmitError::Hardware {
                status, error_code, ..
            } => Self::Hardware { status, error_code },
        }
    }
}

impl From<EncodeError> for EngineError {
    fn from(error: EncodeError) -> Self {
        Self::Internal(error.to_string())
    }
}
