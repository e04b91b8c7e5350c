//! Bootloader error handling
//!
//! This module defines the error types used throughout the boot core for
//! consistent error reporting. Lower layers return these as typed outcomes;
//! only the orchestrator decides whether a failure is fatal.

use core::fmt;
use verdict_api::{BootTarget, Status};

/// Why a boot image signature did not verify
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationError {
    /// No trailer magic where the signature block should start
    MissingTrailer,
    /// Trailer format version not understood
    UnsupportedVersion(u8),
    /// Trailer runs past the loaded buffer
    TruncatedTrailer,
    /// Signed length differs from the declared image size
    LengthMismatch,
    /// Embedded target name is empty, too long or not printable
    InvalidTargetName,
    /// The keystore holds no keys
    EmptyKeystore,
    /// No key in the keystore produced a valid signature
    NoMatchingKey,
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationError::MissingTrailer => write!(f, "signature trailer missing"),
            VerificationError::UnsupportedVersion(v) => {
                write!(f, "unsupported signature trailer version {}", v)
            }
            VerificationError::TruncatedTrailer => write!(f, "signature trailer truncated"),
            VerificationError::LengthMismatch => write!(f, "signed length does not match image"),
            VerificationError::InvalidTargetName => write!(f, "invalid signed target name"),
            VerificationError::EmptyKeystore => write!(f, "keystore holds no keys"),
            VerificationError::NoMatchingKey => write!(f, "no key matches the signature"),
        }
    }
}

/// Boot core error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// A collaborator call failed
    Platform(Status),
    /// Variable store access failed
    VariableAccess(Status),
    /// Partition or file access failed
    Storage(Status),
    /// Boot image header is not usable
    InvalidImage(&'static str),
    /// Keystore blob is not well formed
    MalformedKeystore(&'static str),
    /// Keystore signature does not verify against the OEM key
    KeystoreUnverified,
    /// Image signature did not verify
    Verification(VerificationError),
    /// Image verified but was signed for another purpose
    TargetMismatch,
    /// Target cannot be loaded through this path
    UnsupportedTarget(BootTarget),
    /// A started image returned control
    ImageReturned,
    /// Device policy forbids the state change
    UnlockDenied,
    /// Operator refused a confirmation
    UserRefused,
    /// Malformed argument or request
    InvalidArgument(&'static str),
    /// Configuration rejected at validation time
    ConfigurationError(&'static str),
}

impl BootError {
    /// Convert to the status code handed back to firmware
    pub fn as_status(&self) -> Status {
        match self {
            BootError::Platform(status)
            | BootError::VariableAccess(status)
            | BootError::Storage(status) => *status,
            BootError::InvalidImage(_) => Status::InvalidParameter,
            BootError::MalformedKeystore(_) => Status::InvalidParameter,
            BootError::KeystoreUnverified => Status::SecurityViolation,
            BootError::Verification(_) | BootError::TargetMismatch => Status::AccessDenied,
            BootError::UnsupportedTarget(_) => Status::Unsupported,
            BootError::ImageReturned => Status::LoadError,
            BootError::UnlockDenied | BootError::UserRefused => Status::AccessDenied,
            BootError::InvalidArgument(_) => Status::InvalidParameter,
            BootError::ConfigurationError(_) => Status::InvalidParameter,
        }
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::Platform(status) => write!(f, "platform error: {}", status),
            BootError::VariableAccess(status) => write!(f, "variable access failed: {}", status),
            BootError::Storage(status) => write!(f, "storage access failed: {}", status),
            BootError::InvalidImage(msg) => write!(f, "invalid boot image: {}", msg),
            BootError::MalformedKeystore(msg) => write!(f, "malformed keystore: {}", msg),
            BootError::KeystoreUnverified => write!(f, "keystore not verified by OEM key"),
            BootError::Verification(err) => write!(f, "boot image verification failed: {}", err),
            BootError::TargetMismatch => write!(f, "boot image signed for another target"),
            BootError::UnsupportedTarget(target) => {
                write!(f, "unsupported boot target: {}", target)
            }
            BootError::ImageReturned => write!(f, "started image returned"),
            BootError::UnlockDenied => write!(f, "unlocking device not allowed"),
            BootError::UserRefused => write!(f, "operator refused the request"),
            BootError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            BootError::ConfigurationError(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl From<Status> for BootError {
    fn from(status: Status) -> Self {
        BootError::Platform(status)
    }
}

impl From<VerificationError> for BootError {
    fn from(err: VerificationError) -> Self {
        BootError::Verification(err)
    }
}

/// Result type for boot core operations
pub type Result<T> = core::result::Result<T, BootError>;
