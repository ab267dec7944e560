use core::fmt;

use heapless::String;

use crate::constants::{MAX_DEVICE_INFO_LEN, MEASUREMENT_LEN};
use crate::error::Error;

// Sub-command and output format sent with the start measurement command:
// big-endian IEEE754 floats.
const START_MEASUREMENT_FLOAT: [u8; 2] = [0x01, 0x03];

/// Selects which identifier the device information command returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceInfoKind {
    ProductType,
    SerialNumber,
}

impl DeviceInfoKind {
    fn param(self) -> &'static [u8] {
        match self {
            DeviceInfoKind::ProductType => &[0x00],
            DeviceInfoKind::SerialNumber => &[0x03],
        }
    }
}

/// A command understood by the sensor, with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    StartMeasurement,
    StopMeasurement,
    ReadMeasurement,
    Sleep,
    WakeUp,
    StartFanCleaning,
    DeviceInformation(DeviceInfoKind),
    ReadVersion,
    /// Reads the device status register, clearing it afterwards when `clear` is set.
    ReadStatusRegister { clear: bool },
    Reset,
}

impl Request {
    /// The SHDLC command id.
    pub fn command_id(&self) -> u8 {
        match self {
            Request::StartMeasurement => 0x00,
            Request::StopMeasurement => 0x01,
            Request::ReadMeasurement => 0x03,
            Request::Sleep => 0x10,
            Request::WakeUp => 0x11,
            Request::StartFanCleaning => 0x56,
            Request::DeviceInformation(_) => 0xD0,
            Request::ReadVersion => 0xD1,
            Request::ReadStatusRegister { .. } => 0xD2,
            Request::Reset => 0xD3,
        }
    }

    /// The parameter bytes sent with the command.
    pub fn params(&self) -> &'static [u8] {
        match self {
            Request::StartMeasurement => &START_MEASUREMENT_FLOAT,
            Request::DeviceInformation(kind) => kind.param(),
            Request::ReadStatusRegister { clear: true } => &[0x01],
            Request::ReadStatusRegister { clear: false } => &[0x00],
            _ => &[],
        }
    }
}

/// A single measurement read from the SPS30 sensor.
///
/// Mass concentrations are in µg/m³, number concentrations in #/cm³ and
/// the typical particle size in µm.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Measurement {
    pub mass_pm1_0: f32,
    pub mass_pm2_5: f32,
    pub mass_pm4_0: f32,
    pub mass_pm10: f32,
    pub number_pm0_5: f32,
    pub number_pm1_0: f32,
    pub number_pm2_5: f32,
    pub number_pm4_0: f32,
    pub number_pm10: f32,
    pub typical_particle_size: f32,
}

impl Measurement {
    /// Parses ten big-endian floats.
    ///
    /// # Returns
    ///
    /// * `Ok(Measurement)` if `payload` is exactly 40 bytes long.
    /// * `Err(Error::MalformedPayload)` otherwise.
    pub fn from_payload(payload: &[u8]) -> Result<Self, Error> {
        if payload.len() != MEASUREMENT_LEN {
            return Err(Error::MalformedPayload);
        }
        let mut values = [0f32; 10];
        for (value, chunk) in values.iter_mut().zip(payload.chunks_exact(4)) {
            *value = f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(values.into())
    }

    /// Returns the values in the order the sensor sends them.
    pub fn as_array(&self) -> [f32; 10] {
        [
            self.mass_pm1_0,
            self.mass_pm2_5,
            self.mass_pm4_0,
            self.mass_pm10,
            self.number_pm0_5,
            self.number_pm1_0,
            self.number_pm2_5,
            self.number_pm4_0,
            self.number_pm10,
            self.typical_particle_size,
        ]
    }
}

impl From<[f32; 10]> for Measurement {
    fn from(v: [f32; 10]) -> Self {
        Measurement {
            mass_pm1_0: v[0],
            mass_pm2_5: v[1],
            mass_pm4_0: v[2],
            mass_pm10: v[3],
            number_pm0_5: v[4],
            number_pm1_0: v[5],
            number_pm2_5: v[6],
            number_pm4_0: v[7],
            number_pm10: v[8],
            typical_particle_size: v[9],
        }
    }
}

/// An ASCII identifier returned by the device information command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo(String<MAX_DEVICE_INFO_LEN>);

impl DeviceInfo {
    /// Parses a null-terminated ASCII string; the terminator is optional.
    pub fn from_payload(payload: &[u8]) -> Result<Self, Error> {
        let text = payload.strip_suffix(&[0]).unwrap_or(payload);
        if !text.is_ascii() {
            return Err(Error::MalformedPayload);
        }
        let text = core::str::from_utf8(text).map_err(|_| Error::MalformedPayload)?;
        let mut info = String::new();
        info.push_str(text).map_err(|_| Error::MalformedPayload)?;
        Ok(DeviceInfo(info))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `major.minor` version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionNumber {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Firmware, hardware and protocol versions of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub firmware: VersionNumber,
    pub hardware_revision: u8,
    /// Only reported by sensors that send the full 7-byte payload.
    pub protocol: Option<VersionNumber>,
}

impl Version {
    /// Parses the payload of the read version command.
    ///
    /// Bytes 2 and 4 are reserved. The protocol version in bytes 5 and 6 is
    /// optional; a payload shorter than 4 bytes is malformed.
    pub fn from_payload(payload: &[u8]) -> Result<Self, Error> {
        if payload.len() < 4 {
            return Err(Error::MalformedPayload);
        }
        let protocol = match payload.get(5..7) {
            Some(&[major, minor]) => Some(VersionNumber { major, minor }),
            _ => None,
        };
        Ok(Version {
            firmware: VersionNumber {
                major: payload[0],
                minor: payload[1],
            },
            hardware_revision: payload[3],
            protocol,
        })
    }
}

/// The device status register, as four signed bytes in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRegister(pub [i8; 4]);

impl StatusRegister {
    const FAN_SPEED_WARNING: u32 = 1 << 21;
    const LASER_FAILURE: u32 = 1 << 5;
    const FAN_FAILURE: u32 = 1 << 4;

    pub fn from_payload(payload: &[u8]) -> Result<Self, Error> {
        match payload {
            &[a, b, c, d] => Ok(StatusRegister([a as i8, b as i8, c as i8, d as i8])),
            _ => Err(Error::MalformedPayload),
        }
    }

    /// The register as a big-endian 32-bit word.
    pub fn bits(&self) -> u32 {
        let [a, b, c, d] = self.0;
        u32::from_be_bytes([a as u8, b as u8, c as u8, d as u8])
    }

    /// Fan speed is out of range.
    pub fn fan_speed_warning(&self) -> bool {
        self.bits() & Self::FAN_SPEED_WARNING != 0
    }

    /// Laser current is out of range.
    pub fn laser_failure(&self) -> bool {
        self.bits() & Self::LASER_FAILURE != 0
    }

    /// Fan is switched on but reports 0 rpm.
    pub fn fan_failure(&self) -> bool {
        self.bits() & Self::FAN_FAILURE != 0
    }
}
