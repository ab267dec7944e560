#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Nothing to decode.
    #[error("empty input")]
    EmptyInput,
    /// Frame too short, too long, or carrying an unknown escape sequence.
    #[error("invalid frame")]
    InvalidFrame,
    #[error("checksum mismatch")]
    ChecksumMismatch,
    /// Payload size does not match the shape expected for the command.
    #[error("malformed payload")]
    MalformedPayload,
    /// The sensor did not answer within the settle time.
    #[error("no response")]
    NoResponse,
    #[error("serial read failure")]
    ReadFailure,
    #[error("serial write failure")]
    WriteFailure,
    #[error("invalid argument")]
    InvalidArg,
    /// Valid frame carrying a non-zero state byte.
    #[error("device reported error {0:#04x}")]
    DeviceReportedError(u8),
}
