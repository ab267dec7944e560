// FRAME_DELIMITER marks both the beginning and the end of every frame.
pub const FRAME_DELIMITER: u8 = 0x7E;

// ESCAPE_BYTE introduces a two-byte substitution for a reserved byte.
pub const ESCAPE_BYTE: u8 = 0x7D;

// XON and XOFF are reserved for software flow control and are always escaped.
pub const XON: u8 = 0x11;
pub const XOFF: u8 = 0x13;

// ESCAPE_XOR is applied to a reserved byte to produce its escaped form.
pub const ESCAPE_XOR: u8 = 0x20;

// DEVICE_ADDRESS is the only address a single sensor on the link answers to.
pub const DEVICE_ADDRESS: u8 = 0x00;

// MAX_PARAM_LEN is the largest parameter block the length byte can describe.
pub const MAX_PARAM_LEN: usize = 255;

// MAX_BODY_LEN is the largest unescaped body: address, command, state,
// length, data and checksum.
pub const MAX_BODY_LEN: usize = 4 + MAX_PARAM_LEN + 1;

// MAX_RAW_FRAME_LEN is the largest frame on the wire: every body byte
// escaped, plus both delimiters.
pub const MAX_RAW_FRAME_LEN: usize = 2 * MAX_BODY_LEN + 2;

// SETTLE_TIME_MS is the worst-case response time of the sensor for every
// command this driver issues.
pub const SETTLE_TIME_MS: u32 = 30;

// WAKE_WINDOW_MS is the window in which the second wake-up frame must follow
// the first one.
pub const WAKE_WINDOW_MS: u32 = 100;

// MEASUREMENT_LEN is the payload size of a measurement in float format.
pub const MEASUREMENT_LEN: usize = 40;

// MAX_DEVICE_INFO_LEN is the longest identifier string, terminator excluded.
pub const MAX_DEVICE_INFO_LEN: usize = 32;
