//! Fallible results for everything that touches hardware or the OS.
//!
//! Every bus, device, sensor and storage operation returns an [`Outcome`].
//! Failures are propagated with `?`, which forwards the very same [`Failure`]
//! value to the caller, so the [`FailureKind`] chosen at the boundary survives
//! any depth of call chain.

use alloc::string::String;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Either a value or a classified [`Failure`].
pub type Outcome<T> = Result<T, Failure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    HardwareFault,
    Timeout,
    IoError,
    InvalidArgument,
    ResourceExhausted,
    AlreadyInUse,
    NotFound,
    /// Fewer bytes were written or read than requested.
    ShortTransfer,
    Other,
}

impl core::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            FailureKind::HardwareFault => "hardware fault",
            FailureKind::Timeout => "timeout",
            FailureKind::IoError => "I/O error",
            FailureKind::InvalidArgument => "invalid argument",
            FailureKind::ResourceExhausted => "resource exhausted",
            FailureKind::AlreadyInUse => "already in use",
            FailureKind::NotFound => "not found",
            FailureKind::ShortTransfer => "short transfer",
            FailureKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// A classified failure with a human readable message and, where the platform
/// supplied one, the raw error code.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub raw_code: Option<i32>,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raw_code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, raw_code: i32) -> Self {
        self.raw_code = Some(raw_code);
        self
    }

    pub fn hardware_fault(message: impl Into<String>) -> Self {
        Self::new(FailureKind::HardwareFault, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(FailureKind::IoError, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidArgument, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ResourceExhausted, message)
    }

    pub fn already_in_use(message: impl Into<String>) -> Self {
        Self::new(FailureKind::AlreadyInUse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message)
    }

    pub fn short_transfer(expected: usize, actual: usize) -> Self {
        Self::new(
            FailureKind::ShortTransfer,
            alloc::format!("transferred {actual} of {expected} bytes"),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Other, message)
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<io::Error> for Failure {
    fn from(error: io::Error) -> Self {
        let raw = error.raw_os_error();
        let kind = match error.kind() {
            io::ErrorKind::StorageFull | io::ErrorKind::OutOfMemory => {
                FailureKind::ResourceExhausted
            }
            io::ErrorKind::InvalidInput
            | io::ErrorKind::IsADirectory
            | io::ErrorKind::NotADirectory => FailureKind::InvalidArgument,
            io::ErrorKind::NotFound => FailureKind::NotFound,
            io::ErrorKind::AlreadyExists => FailureKind::AlreadyInUse,
            io::ErrorKind::TimedOut => FailureKind::Timeout,
            io::ErrorKind::WriteZero | io::ErrorKind::UnexpectedEof => FailureKind::ShortTransfer,
            _ => raw.map_or(FailureKind::IoError, errno::kind),
        };

        let failure = Failure::new(kind, error.to_string());
        match raw {
            Some(code) => failure.with_code(code),
            None => failure,
        }
    }
}

/// Raw codes for errors `io::ErrorKind` leaves uncategorised on this
/// toolchain, such as over-long file names.
#[cfg(unix)]
mod errno {
    use super::FailureKind;

    pub(super) const ENOMEM: i32 = 12;
    pub(super) const EINVAL: i32 = 22;
    pub(super) const ENOSPC: i32 = 28;
    #[cfg(target_os = "linux")]
    pub(super) const ENAMETOOLONG: i32 = 36;
    #[cfg(not(target_os = "linux"))]
    pub(super) const ENAMETOOLONG: i32 = 63;

    pub(super) fn kind(code: i32) -> FailureKind {
        match code {
            ENOSPC | ENOMEM => FailureKind::ResourceExhausted,
            EINVAL | ENAMETOOLONG => FailureKind::InvalidArgument,
            _ => FailureKind::IoError,
        }
    }
}

#[cfg(not(unix))]
mod errno {
    use super::FailureKind;

    pub(super) fn kind(_code: i32) -> FailureKind {
        FailureKind::IoError
    }
}

/// Terminate on failure. Startup code only.
///
/// Pre-flight initialisation (opening the bus, leasing the mission's fixed
/// sensors) cannot meaningfully continue without its resources. Steady-state
/// loops must handle their failures instead.
pub trait OrAbort<T> {
    fn or_abort(self, context: &str) -> T;
}

impl<T> OrAbort<T> for Outcome<T> {
    fn or_abort(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(failure) => abort_with(context, &failure),
        }
    }
}

fn abort_with(context: &str, failure: &Failure) -> ! {
    tracing::error!(
        kind = ?failure.kind,
        code = ?failure.raw_code,
        "fatal: {context}: {}",
        failure.message
    );
    eprintln!("Fatal error during {context}: [{}] {}", failure.kind, failure.message);
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf() -> Outcome<u8> {
        Err(Failure::timeout("no ack from 0x48").with_code(263))
    }

    fn middle() -> Outcome<u16> {
        let value = leaf()?;
        Ok(u16::from(value) * 2)
    }

    fn top() -> Outcome<u32> {
        let value = middle()?;
        Ok(u32::from(value) + 1)
    }

    #[test]
    fn test_propagation_keeps_kind_and_message() {
        let failure = top().unwrap_err();
        assert_eq!(failure.kind(), FailureKind::Timeout);
        assert_eq!(failure.message(), "no ack from 0x48");
        assert_eq!(failure.raw_code, Some(263));
    }

    #[test]
    fn test_display_includes_kind() {
        let failure = Failure::already_in_use("address 0x48 is leased");
        assert_eq!(failure.to_string(), "already in use: address 0x48 is leased");
    }

    #[test]
    fn test_io_error_kind_mapping() {
        let cases = [
            (io::ErrorKind::StorageFull, FailureKind::ResourceExhausted),
            (io::ErrorKind::OutOfMemory, FailureKind::ResourceExhausted),
            (io::ErrorKind::IsADirectory, FailureKind::InvalidArgument),
            (io::ErrorKind::NotADirectory, FailureKind::InvalidArgument),
            (io::ErrorKind::InvalidInput, FailureKind::InvalidArgument),
            (io::ErrorKind::NotFound, FailureKind::NotFound),
            (io::ErrorKind::AlreadyExists, FailureKind::AlreadyInUse),
            (io::ErrorKind::TimedOut, FailureKind::Timeout),
            (io::ErrorKind::BrokenPipe, FailureKind::IoError),
        ];

        for (kind, expected) in cases {
            let failure = Failure::from(io::Error::from(kind));
            assert_eq!(failure.kind, expected, "{kind:?}");
            assert_eq!(failure.raw_code, None);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_os_error_mapping() {
        let cases = [
            (28, FailureKind::ResourceExhausted),
            (12, FailureKind::ResourceExhausted),
            (36, FailureKind::InvalidArgument),
            (21, FailureKind::InvalidArgument),
            (20, FailureKind::InvalidArgument),
            (22, FailureKind::InvalidArgument),
            (5, FailureKind::IoError),
            (2, FailureKind::NotFound),
            (17, FailureKind::AlreadyInUse),
        ];

        for (code, expected) in cases {
            let failure = Failure::from(io::Error::from_raw_os_error(code));
            assert_eq!(failure.kind, expected, "errno {code}");
            assert_eq!(failure.raw_code, Some(code));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_uncategorised_codes_fall_back_to_errno() {
        assert_eq!(errno::kind(errno::ENAMETOOLONG), FailureKind::InvalidArgument);
        assert_eq!(errno::kind(errno::ENOSPC), FailureKind::ResourceExhausted);
        assert_eq!(errno::kind(5), FailureKind::IoError);
    }

    #[test]
    fn test_short_write_is_not_folded_into_io_error() {
        let failure = Failure::from(io::Error::new(io::ErrorKind::WriteZero, "short write"));
        assert_eq!(failure.kind, FailureKind::ShortTransfer);

        let failure = Failure::short_transfer(8, 3);
        assert_eq!(failure.kind, FailureKind::ShortTransfer);
        assert_eq!(failure.message, "transferred 3 of 8 bytes");
    }

    #[test]
    fn test_or_abort_passes_values_through() {
        let value: Outcome<u8> = Ok(7);
        assert_eq!(value.or_abort("test"), 7);
    }
}
