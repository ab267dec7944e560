//! SHDLC frame encoding and decoding.
//!
//! A frame on the wire is `7E | ADR | CMD | [STATE] | LEN | DATA.. | CHK | 7E`,
//! where the state byte is only present in frames sent by the sensor. The
//! checksum is the inverted low byte of the sum of every unescaped byte
//! between the delimiters. Inside the delimiters, `0x7E`, `0x7D`, `0x11` and
//! `0x13` are replaced by `0x7D` followed by the byte XOR `0x20`.

use log::debug;

use crate::constants::*;
use crate::error::Error;

/// An encoded frame, ready to be written to the serial port.
#[derive(Clone)]
pub struct Frame {
    buf: [u8; MAX_RAW_FRAME_LEN],
    len: usize,
}

impl Frame {
    /// Returns the frame bytes, delimiters included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl core::fmt::Debug for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02X?}", self.as_bytes())
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

// Accumulates the checksum and escapes bytes in a single pass.
struct FrameBuilder {
    frame: Frame,
    sum: u8,
}

impl FrameBuilder {
    fn new() -> Self {
        let mut frame = Frame {
            buf: [0u8; MAX_RAW_FRAME_LEN],
            len: 0,
        };
        frame.buf[0] = FRAME_DELIMITER;
        frame.len = 1;
        Self { frame, sum: 0 }
    }

    fn push(&mut self, byte: u8) {
        self.sum = self.sum.wrapping_add(byte);
        self.push_escaped(byte);
    }

    fn extend(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(byte);
        }
    }

    fn push_escaped(&mut self, byte: u8) {
        if is_reserved(byte) {
            self.push_raw(ESCAPE_BYTE);
            self.push_raw(byte ^ ESCAPE_XOR);
        } else {
            self.push_raw(byte);
        }
    }

    fn push_raw(&mut self, byte: u8) {
        self.frame.buf[self.frame.len] = byte;
        self.frame.len += 1;
    }

    fn finish(mut self) -> Frame {
        let checksum = !self.sum;
        self.push_escaped(checksum);
        self.push_raw(FRAME_DELIMITER);
        self.frame
    }
}

fn is_reserved(byte: u8) -> bool {
    matches!(byte, FRAME_DELIMITER | ESCAPE_BYTE | XON | XOFF)
}

/// Computes the SHDLC checksum of unescaped bytes.
pub fn checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Builds a host-to-sensor frame for `command` with the given parameter bytes.
///
/// # Returns
///
/// * `Ok(Frame)` with the delimited, escaped frame.
/// * `Err(Error::InvalidArg)` if `params` is longer than 255 bytes.
pub fn encode(command: u8, params: &[u8]) -> Result<Frame, Error> {
    let len = param_len(params)?;
    let mut builder = FrameBuilder::new();
    builder.push(DEVICE_ADDRESS);
    builder.push(command);
    builder.push(len);
    builder.extend(params);
    Ok(builder.finish())
}

/// Builds a sensor-to-host frame, as the sensor would answer `command`.
///
/// # Returns
///
/// * `Ok(Frame)` with the delimited, escaped frame.
/// * `Err(Error::InvalidArg)` if `data` is longer than 255 bytes.
pub fn encode_response(command: u8, state: u8, data: &[u8]) -> Result<Frame, Error> {
    let len = param_len(data)?;
    let mut builder = FrameBuilder::new();
    builder.push(DEVICE_ADDRESS);
    builder.push(command);
    builder.push(state);
    builder.push(len);
    builder.extend(data);
    Ok(builder.finish())
}

fn param_len(bytes: &[u8]) -> Result<u8, Error> {
    u8::try_from(bytes.len()).map_err(|_| {
        log::error!("Parameter block of {} bytes exceeds 255", bytes.len());
        Error::InvalidArg
    })
}

/// A decoded sensor-to-host frame.
#[derive(Clone)]
pub struct Response {
    body: [u8; MAX_BODY_LEN],
    len: usize,
}

impl Response {
    pub fn address(&self) -> u8 {
        self.body[0]
    }

    pub fn command(&self) -> u8 {
        self.body[1]
    }

    /// The state byte reported by the sensor; `0` means success.
    pub fn state(&self) -> u8 {
        self.body[2]
    }

    /// The length announced by the sensor, which is not checked against the payload.
    pub fn declared_len(&self) -> u8 {
        self.body[3]
    }

    /// The payload bytes, empty when the declared length is zero.
    pub fn payload(&self) -> &[u8] {
        if self.declared_len() == 0 {
            &[]
        } else {
            &self.body[4..self.len - 1]
        }
    }

    pub fn checksum(&self) -> u8 {
        self.body[self.len - 1]
    }
}

impl core::fmt::Debug for Response {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Response")
            .field("command", &self.command())
            .field("state", &self.state())
            .field("payload", &self.payload())
            .finish()
    }
}

/// Decodes a raw frame as received from the sensor.
///
/// The first and last bytes are taken as delimiters without being checked.
/// A non-zero state byte is not an error; it is returned as part of the
/// [`Response`].
///
/// # Returns
///
/// * `Ok(Response)` if the frame is well formed and its checksum matches.
/// * `Err(Error::EmptyInput)` if `raw` is empty.
/// * `Err(Error::InvalidFrame)` if the frame is too short or too long, or
///   contains an unknown or truncated escape sequence.
/// * `Err(Error::ChecksumMismatch)` if the checksum does not match.
pub fn decode(raw: &[u8]) -> Result<Response, Error> {
    if raw.is_empty() {
        return Err(Error::EmptyInput);
    }
    if raw.len() < 2 {
        return Err(Error::InvalidFrame);
    }

    let mut response = Response {
        body: [0u8; MAX_BODY_LEN],
        len: 0,
    };

    let mut escaped = raw[1..raw.len() - 1].iter();
    while let Some(&byte) = escaped.next() {
        let byte = if byte == ESCAPE_BYTE {
            match escaped.next() {
                Some(&next) if is_reserved(next ^ ESCAPE_XOR) => next ^ ESCAPE_XOR,
                other => {
                    log::warn!("Invalid escape sequence 7D {:02X?} in {:02X?}", other, raw);
                    return Err(Error::InvalidFrame);
                }
            }
        } else {
            byte
        };
        if response.len == MAX_BODY_LEN {
            log::warn!("Frame exceeds {} unescaped bytes", MAX_BODY_LEN);
            return Err(Error::InvalidFrame);
        }
        response.body[response.len] = byte;
        response.len += 1;
    }

    // Address, command, state, length and checksum at minimum.
    if response.len < 5 {
        log::warn!("Frame too short: {:02X?}", raw);
        return Err(Error::InvalidFrame);
    }

    let calculated = checksum(&response.body[..response.len - 1]);
    if calculated != response.checksum() {
        log::warn!(
            "Bad checksum: Calculated {:02X}, Received {:02X}. Frame: {:02X?}",
            calculated,
            response.checksum(),
            raw
        );
        return Err(Error::ChecksumMismatch);
    }

    debug!("Decoded frame: {:?}", response);
    Ok(response)
}
