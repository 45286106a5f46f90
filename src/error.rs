use embedded_io::ErrorKind;

/// Unified error type of all engine operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AtError {
    /// The modem answered, but the answer did not contain the expected data.
    InvalidResponse,

    /// The timeout budget of the operation was exhausted.
    Timeout,

    /// The engine or the requested receiver is already claimed elsewhere.
    Busy,

    /// The serial device rejected a byte or the outgoing buffer could not take any data.
    Io,

    /// Received data was dropped or did not fit into the given buffer.
    Overflow,

    /// An argument is out of range, e.g. a SSID that exceeds the AT command length limits.
    InvalidArgument,
}

impl embedded_io::Error for AtError {
    fn kind(&self) -> ErrorKind {
        match self {
            AtError::InvalidResponse => ErrorKind::InvalidData,
            AtError::Timeout => ErrorKind::TimedOut,
            AtError::Busy => ErrorKind::Other,
            AtError::Io => ErrorKind::Other,
            AtError::Overflow => ErrorKind::OutOfMemory,
            AtError::InvalidArgument => ErrorKind::InvalidInput,
        }
    }
}
