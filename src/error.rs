use core::fmt;

use crate::data::DriverState;

/// BMP280 driver errors, generic over the register transport error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// the register transport failed, the register operation was aborted
    Transport(E),
    /// chip id register did not read 0x58 (wrong or absent device)
    UnsupportedChip(u8),
    /// operation is not valid in the current driver state
    NotReady(DriverState),
    /// reference pressure needs at least one sample
    InvalidSampleCount,
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "register transport error: {:?}", e),
            Error::UnsupportedChip(id) => write!(f, "unsupported chip id {:#04x}, expected 0x58", id),
            Error::NotReady(state) => write!(f, "driver not ready, state is {:?}", state),
            Error::InvalidSampleCount => f.write_str("reference pressure sample count must be at least 1"),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for Error<E> {}
