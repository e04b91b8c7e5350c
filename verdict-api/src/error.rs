//! Firmware status codes
//!
//! Every collaborator interface reports failure with a [`Status`]. The
//! numeric values follow the UEFI status encoding so they can be handed back
//! to firmware unchanged.

use core::fmt;

/// Result type for collaborator calls
pub type Result<T> = core::result::Result<T, Status>;

const ERROR_BIT: usize = 1 << (usize::BITS - 1);

/// Firmware-style status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    LoadError,
    InvalidParameter,
    Unsupported,
    BadBufferSize,
    BufferTooSmall,
    NotReady,
    DeviceError,
    OutOfResources,
    NotFound,
    AccessDenied,
    Aborted,
    SecurityViolation,
}

impl Status {
    fn code(&self) -> usize {
        match self {
            Status::Success => 0,
            Status::LoadError => 1,
            Status::InvalidParameter => 2,
            Status::Unsupported => 3,
            Status::BadBufferSize => 4,
            Status::BufferTooSmall => 5,
            Status::NotReady => 6,
            Status::DeviceError => 7,
            Status::OutOfResources => 9,
            Status::NotFound => 14,
            Status::AccessDenied => 15,
            Status::Aborted => 21,
            Status::SecurityViolation => 26,
        }
    }

    /// Raw value as returned to firmware
    pub fn as_usize(&self) -> usize {
        match self {
            Status::Success => 0,
            other => ERROR_BIT | other.code(),
        }
    }

    pub fn is_error(&self) -> bool {
        *self != Status::Success
    }

    /// Convert to a `Result`, mapping `Success` to `Ok(())`
    pub fn to_result(self) -> Result<()> {
        if self.is_error() { Err(self) } else { Ok(()) }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "Success"),
            Status::LoadError => write!(f, "Load Error"),
            Status::InvalidParameter => write!(f, "Invalid Parameter"),
            Status::Unsupported => write!(f, "Unsupported"),
            Status::BadBufferSize => write!(f, "Bad Buffer Size"),
            Status::BufferTooSmall => write!(f, "Buffer Too Small"),
            Status::NotReady => write!(f, "Not Ready"),
            Status::DeviceError => write!(f, "Device Error"),
            Status::OutOfResources => write!(f, "Out of Resources"),
            Status::NotFound => write!(f, "Not Found"),
            Status::AccessDenied => write!(f, "Access Denied"),
            Status::Aborted => write!(f, "Aborted"),
            Status::SecurityViolation => write!(f, "Security Violation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_bit() {
        assert_eq!(Status::Success.as_usize(), 0);
        assert_eq!(Status::NotFound.as_usize() & !ERROR_BIT, 14);
        assert_ne!(Status::NotFound.as_usize() & ERROR_BIT, 0);
    }

    #[test]
    fn test_to_result() {
        assert!(Status::Success.to_result().is_ok());
        assert_eq!(Status::AccessDenied.to_result(), Err(Status::AccessDenied));
    }
}
