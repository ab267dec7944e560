#![cfg_attr(not(test), no_std)]

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};
use log::debug;

mod constants;
pub use constants::*;

mod error;
pub use error::*;

mod config;
pub use config::*;

mod command;
pub use command::*;

pub mod frame;
pub use frame::{Frame, Response};

/// The outcome of a single command exchange.
///
/// `state` is the state byte reported by the sensor (`0` on success), or
/// `None` if no usable reply was received. Link-layer failures never
/// surface as errors; `data` then holds the command's fallback value.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub data: T,
    pub state: Option<u8>,
}

impl<T> Reply<T> {
    /// Returns `true` if the sensor answered with a zero state byte.
    pub fn is_ok(&self) -> bool {
        self.state == Some(0)
    }

    /// Converts the reply into a `Result`.
    ///
    /// # Returns
    ///
    /// * `Ok(data)` if the sensor answered with a zero state byte.
    /// * `Err(Error::NoResponse)` if no usable reply was received.
    /// * `Err(Error::DeviceReportedError(state))` for a non-zero state byte.
    pub fn into_result(self) -> Result<T, Error> {
        match self.state {
            Some(0) => Ok(self.data),
            Some(state) => Err(Error::DeviceReportedError(state)),
            None => Err(Error::NoResponse),
        }
    }
}

/// Represents an SPS30 particulate matter sensor on a UART link.
///
/// Every command is a blocking exchange: stale input is drained, the frame
/// is written, the driver waits for the configured settle time and then
/// decodes whatever the sensor has sent. Only one exchange is ever in
/// flight.
///
/// # Type Parameters
///
/// * `Serial`: The serial interface used to communicate with the sensor.
///   It must implement `embedded_io::Read`, `embedded_io::ReadReady` and
///   `embedded_io::Write`.
/// * `Delay`: The delay provider used for the settle time.
pub struct Sps30<Serial, Delay> {
    serial: Serial,
    delay: Delay,
    config: Config,
}

impl<S, D> Sps30<S, D>
where
    S: Read + ReadReady + Write,
    D: DelayNs,
{
    /// Creates a new `Sps30` sensor instance.
    ///
    /// # Arguments
    ///
    /// * `serial`: The serial interface for communication with the sensor.
    /// * `delay`: The delay provider used between a command and its reply.
    /// * `config`: The link timings.
    pub fn new(serial: S, delay: D, config: Config) -> Self {
        Self {
            serial,
            delay,
            config,
        }
    }

    /// Releases the serial interface and the delay provider.
    pub fn release(self) -> (S, D) {
        (self.serial, self.delay)
    }

    /// Starts measuring, with measurements reported as floats.
    pub fn start(&mut self) -> Reply<()> {
        self.command(Request::StartMeasurement)
    }

    /// Stops measuring and returns to idle mode.
    pub fn stop(&mut self) -> Reply<()> {
        self.command(Request::StopMeasurement)
    }

    /// Reads the latest measurement.
    ///
    /// Always returns ten values: if the reply is missing or its payload is
    /// not 40 bytes long, every value is `0.0`.
    pub fn read_measurements(&mut self) -> Reply<Measurement> {
        let reply = self.transact(Request::ReadMeasurement);
        let state = reply.as_ref().map(Response::state);
        let data = reply
            .as_ref()
            .ok_or(Error::NoResponse)
            .and_then(|response| Measurement::from_payload(response.payload()))
            .unwrap_or_else(|e| {
                log::warn!("Measurement unavailable ({}), reporting zeros", e);
                Measurement::default()
            });
        debug!("Measurement: {:?}, state: {:?}", data, state);
        Reply { data, state }
    }

    /// Puts the sensor into sleep mode. Only accepted while idle.
    pub fn sleep(&mut self) -> Reply<()> {
        self.command(Request::Sleep)
    }

    /// Wakes the sensor from sleep mode.
    ///
    /// The first wake-up frame only re-enables the sensor's UART and its
    /// reply, if any, is discarded. The second frame, sent after the
    /// configured wake interval, is the one whose reply is reported.
    pub fn wake(&mut self) -> Reply<()> {
        debug!("Waking up sensor");
        if let Err(e) = self.drain().and_then(|_| self.send(Request::WakeUp)) {
            log::warn!("First wake-up frame failed: {}", e);
        }
        self.delay.delay_ms(self.config.wake_interval_ms);
        self.command(Request::WakeUp)
    }

    /// Starts the fan cleaning procedure. Only accepted while measuring.
    pub fn trigger_fan_clean(&mut self) -> Reply<()> {
        self.command(Request::StartFanCleaning)
    }

    /// Reads the product type or the serial number of the sensor.
    pub fn device_info(&mut self, kind: DeviceInfoKind) -> Reply<Option<DeviceInfo>> {
        self.query(Request::DeviceInformation(kind), DeviceInfo::from_payload)
    }

    /// Reads the firmware, hardware and protocol versions.
    pub fn read_version(&mut self) -> Reply<Option<Version>> {
        self.query(Request::ReadVersion, Version::from_payload)
    }

    /// Reads the device status register.
    ///
    /// # Arguments
    ///
    /// * `clear`: Clears the register after reading it.
    pub fn read_register(&mut self, clear: bool) -> Reply<Option<StatusRegister>> {
        self.query(
            Request::ReadStatusRegister { clear },
            StatusRegister::from_payload,
        )
    }

    /// Soft-resets the sensor.
    pub fn reset(&mut self) -> Reply<()> {
        self.command(Request::Reset)
    }

    // Runs a command whose reply carries no payload.
    fn command(&mut self, request: Request) -> Reply<()> {
        let state = self.transact(request).map(|response| response.state());
        Reply { data: (), state }
    }

    // Runs a command and parses its payload, absorbing link-layer failures.
    fn query<T>(
        &mut self,
        request: Request,
        parse: impl FnOnce(&[u8]) -> Result<T, Error>,
    ) -> Reply<Option<T>> {
        let Some(response) = self.transact(request) else {
            return Reply {
                data: None,
                state: None,
            };
        };
        let data = parse(response.payload())
            .map_err(|e| {
                log::warn!(
                    "Failed to parse reply to {:?}: {}. Payload: {:02X?}",
                    request,
                    e,
                    response.payload()
                );
                e
            })
            .ok();
        Reply {
            data,
            state: Some(response.state()),
        }
    }

    // Performs one exchange; any failure is logged and reported as `None`.
    fn transact(&mut self, request: Request) -> Option<Response> {
        match self.exchange(request) {
            Ok(response) => {
                if response.command() != request.command_id() {
                    log::warn!(
                        "Reply has unexpected command ID: {:02X} (Expected {:02X})",
                        response.command(),
                        request.command_id()
                    );
                }
                Some(response)
            }
            Err(e) => {
                log::warn!("No usable reply to {:?}: {}", request, e);
                None
            }
        }
    }

    fn exchange(&mut self, request: Request) -> Result<Response, Error> {
        self.drain()?;
        self.send(request)?;
        self.delay.delay_ms(self.config.settle_time_ms);

        let mut buffer = [0u8; MAX_RAW_FRAME_LEN];
        let len = self.receive(&mut buffer)?;
        debug!("Received: {:02X?}", &buffer[..len]);
        frame::decode(&buffer[..len]).map_err(|e| match e {
            Error::EmptyInput => Error::NoResponse,
            e => e,
        })
    }

    // Encodes the request and writes it to the serial port.
    fn send(&mut self, request: Request) -> Result<(), Error> {
        let frame = frame::encode(request.command_id(), request.params())?;
        debug!("Executing command {:?}: {:?}", request, frame);
        self.serial.write_all(frame.as_bytes()).map_err(|e| {
            log::error!("Serial write error: {:?}", e);
            Error::WriteFailure
        })?;
        self.serial.flush().map_err(|_| Error::WriteFailure)
    }

    // Discards anything left in the receive buffer by an earlier exchange.
    fn drain(&mut self) -> Result<(), Error> {
        let mut scratch = [0u8; 64];
        let mut discarded = 0;
        while self.ready()? {
            let read = self.read_into(&mut scratch)?;
            if read == 0 {
                break;
            }
            discarded += read;
        }
        if discarded > 0 {
            debug!("Discarded {} stale bytes", discarded);
        }
        Ok(())
    }

    // Reads whatever is currently buffered, without waiting for more.
    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize, Error> {
        let mut len = 0;
        while len < buffer.len() && self.ready()? {
            let read = self.read_into(&mut buffer[len..])?;
            if read == 0 {
                break;
            }
            len += read;
        }
        Ok(len)
    }

    fn ready(&mut self) -> Result<bool, Error> {
        self.serial.read_ready().map_err(|e| {
            log::error!("Serial read error: {:?}", e);
            Error::ReadFailure
        })
    }

    fn read_into(&mut self, buffer: &mut [u8]) -> Result<usize, Error> {
        self.serial.read(buffer).map_err(|e| {
            log::error!("Serial read error: {:?}", e);
            Error::ReadFailure
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct MockError;

    impl embedded_io::Error for MockError {
        fn kind(&self) -> embedded_io::ErrorKind {
            embedded_io::ErrorKind::Other
        }
    }

    // Serial port that answers each flushed frame with the next scripted reply.
    #[derive(Default)]
    struct MockSerial {
        rx: VecDeque<u8>,
        replies: VecDeque<Vec<u8>>,
        written: Vec<Vec<u8>>,
        pending: Vec<u8>,
        fail_writes: bool,
    }

    impl MockSerial {
        fn with_replies<I: IntoIterator<Item = Vec<u8>>>(replies: I) -> Self {
            MockSerial {
                replies: replies.into_iter().collect(),
                ..Default::default()
            }
        }
    }

    impl embedded_io::ErrorType for MockSerial {
        type Error = MockError;
    }

    impl Read for MockSerial {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, MockError> {
            // Hand out at most 8 bytes per call, like a small UART FIFO.
            let n = buf.len().min(self.rx.len()).min(8);
            for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl ReadReady for MockSerial {
        fn read_ready(&mut self) -> Result<bool, MockError> {
            Ok(!self.rx.is_empty())
        }
    }

    impl Write for MockSerial {
        fn write(&mut self, buf: &[u8]) -> Result<usize, MockError> {
            if self.fail_writes {
                return Err(MockError);
            }
            self.pending.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), MockError> {
            self.written.push(std::mem::take(&mut self.pending));
            if let Some(reply) = self.replies.pop_front() {
                self.rx.extend(reply);
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockDelay {
        total_ms: u64,
    }

    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ms += u64::from(ns) / 1_000_000;
        }

        fn delay_ms(&mut self, ms: u32) {
            self.total_ms += u64::from(ms);
        }
    }

    fn sensor(replies: Vec<Vec<u8>>) -> Sps30<MockSerial, MockDelay> {
        Sps30::new(
            MockSerial::with_replies(replies),
            MockDelay::default(),
            Config::default(),
        )
    }

    fn reply(command: u8, state: u8, data: &[u8]) -> Vec<u8> {
        frame::encode_response(command, state, data)
            .unwrap()
            .as_bytes()
            .to_vec()
    }

    fn measurement_payload(values: [f32; 10]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    #[test]
    fn start_sends_float_format_and_reports_state() {
        let mut sps30 = sensor(vec![vec![0x7E, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x7E]]);
        let result = sps30.start();
        assert_eq!(result.state, Some(0));
        assert!(result.is_ok());

        let (serial, delay) = sps30.release();
        assert_eq!(
            serial.written,
            vec![vec![0x7E, 0x00, 0x00, 0x02, 0x01, 0x03, 0xF9, 0x7E]]
        );
        assert_eq!(delay.total_ms, 30);
    }

    #[test]
    fn reads_measurements() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let mut sps30 = sensor(vec![reply(0x03, 0x00, &measurement_payload(values))]);
        let result = sps30.read_measurements();
        assert_eq!(result.state, Some(0));
        assert_eq!(result.data.as_array(), values);

        let (serial, _) = sps30.release();
        assert_eq!(serial.written, vec![vec![0x7E, 0x00, 0x03, 0x00, 0xFC, 0x7E]]);
    }

    #[test]
    fn short_measurement_yields_zeros() {
        let mut sps30 = sensor(vec![reply(0x03, 0x00, &[0x3F, 0x80, 0x00, 0x00])]);
        let result = sps30.read_measurements();
        assert_eq!(result.state, Some(0));
        assert_eq!(result.data.as_array(), [0.0; 10]);
    }

    #[test]
    fn missing_measurement_yields_zeros_and_no_state() {
        let mut sps30 = sensor(vec![]);
        let result = sps30.read_measurements();
        assert_eq!(result.state, None);
        assert_eq!(result.data, Measurement::default());
        assert_eq!(result.into_result().unwrap_err(), Error::NoResponse);
    }

    #[test]
    fn corrupted_reply_is_absorbed() {
        let mut corrupted = reply(0x03, 0x00, &measurement_payload([1.5; 10]));
        let checksum = corrupted.len() - 2;
        corrupted[checksum] ^= 0x01;
        let mut sps30 = sensor(vec![corrupted]);
        let result = sps30.read_measurements();
        assert_eq!(result.state, None);
        assert_eq!(result.data.as_array(), [0.0; 10]);
    }

    #[test]
    fn device_error_is_reported_verbatim() {
        let mut sps30 = sensor(vec![reply(0x10, 0x43, &[])]);
        let result = sps30.sleep();
        assert_eq!(result.state, Some(0x43));
        assert!(!result.is_ok());
        assert_eq!(
            result.into_result().unwrap_err(),
            Error::DeviceReportedError(0x43)
        );
    }

    #[test]
    fn stale_bytes_are_drained_before_sending() {
        let mut serial = MockSerial::with_replies(vec![reply(0x01, 0x00, &[])]);
        serial.rx.extend(reply(0x03, 0x00, &measurement_payload([9.0; 10])));
        let mut sps30 = Sps30::new(serial, MockDelay::default(), Config::default());
        let result = sps30.stop();
        assert_eq!(result.state, Some(0));

        let (serial, _) = sps30.release();
        assert!(serial.rx.is_empty());
    }

    #[test]
    fn wake_sends_two_frames_and_keeps_second_reply() {
        let mut sps30 = sensor(vec![reply(0x11, 0x43, &[]), reply(0x11, 0x00, &[])]);
        let result = sps30.wake();
        assert_eq!(result.state, Some(0));

        let (serial, delay) = sps30.release();
        let wake = vec![0x7E, 0x00, 0x7D, 0x31, 0x00, 0xEE, 0x7E];
        assert_eq!(serial.written, vec![wake.clone(), wake]);
        assert!(delay.total_ms < u64::from(WAKE_WINDOW_MS) + 30);
    }

    #[test]
    fn wake_without_first_reply() {
        let mut sps30 = sensor(vec![Vec::new(), reply(0x11, 0x00, &[])]);
        assert_eq!(sps30.wake().state, Some(0));
    }

    #[test]
    fn reads_serial_number() {
        let mut sps30 = sensor(vec![reply(0xD0, 0x00, b"12345\0")]);
        let result = sps30.device_info(DeviceInfoKind::SerialNumber);
        assert_eq!(result.state, Some(0));
        assert_eq!(result.data.unwrap().as_str(), "12345");

        let (serial, _) = sps30.release();
        assert_eq!(
            serial.written,
            vec![vec![0x7E, 0x00, 0xD0, 0x01, 0x03, 0x2B, 0x7E]]
        );
    }

    #[test]
    fn reads_product_type() {
        let mut sps30 = sensor(vec![reply(0xD0, 0x00, b"00080000\0")]);
        let result = sps30.device_info(DeviceInfoKind::ProductType);
        assert_eq!(result.data.unwrap().to_string(), "00080000");
    }

    #[test]
    fn device_info_without_reply() {
        let mut sps30 = sensor(vec![]);
        let result = sps30.device_info(DeviceInfoKind::SerialNumber);
        assert_eq!(result, Reply { data: None, state: None });
    }

    #[test]
    fn reads_version() {
        let mut sps30 = sensor(vec![reply(0xD1, 0x00, &[2, 3, 0, 7, 0, 2, 0])]);
        let version = sps30.read_version().into_result().unwrap().unwrap();
        assert_eq!(version.firmware.to_string(), "2.3");
        assert_eq!(version.hardware_revision, 7);
        assert_eq!(version.protocol.map(|p| p.to_string()).as_deref(), Some("2.0"));
    }

    #[test]
    fn malformed_version_keeps_state() {
        let mut sps30 = sensor(vec![reply(0xD1, 0x00, &[2])]);
        let result = sps30.read_version();
        assert_eq!(result.state, Some(0));
        assert_eq!(result.data, None);
    }

    #[test]
    fn reads_and_clears_register() {
        let mut sps30 = sensor(vec![reply(0xD2, 0x00, &[0x00, 0x20, 0x00, 0x10])]);
        let register = sps30.read_register(true).data.unwrap();
        assert_eq!(register.0, [0, 32, 0, 16]);
        assert!(register.fan_speed_warning());
        assert!(register.fan_failure());
        assert!(!register.laser_failure());

        let (serial, _) = sps30.release();
        assert_eq!(serial.written[0][2..5], [0xD2, 0x01, 0x01]);
    }

    #[test]
    fn peeks_register() {
        let mut sps30 = sensor(vec![reply(0xD2, 0x00, &[0x00; 4])]);
        let _ = sps30.read_register(false);
        let (serial, _) = sps30.release();
        assert_eq!(serial.written[0][2..5], [0xD2, 0x01, 0x00]);
    }

    #[test]
    fn fan_clean_and_reset() {
        let mut sps30 = sensor(vec![reply(0x56, 0x00, &[]), reply(0xD3, 0x00, &[])]);
        assert!(sps30.trigger_fan_clean().is_ok());
        assert!(sps30.reset().is_ok());

        let (serial, _) = sps30.release();
        assert_eq!(serial.written[0], vec![0x7E, 0x00, 0x56, 0x00, 0xA9, 0x7E]);
        assert_eq!(serial.written[1], vec![0x7E, 0x00, 0xD3, 0x00, 0x2C, 0x7E]);
    }

    #[test]
    fn write_failure_reports_no_response() {
        let mut serial = MockSerial::with_replies(vec![reply(0x00, 0x00, &[])]);
        serial.fail_writes = true;
        let mut sps30 = Sps30::new(serial, MockDelay::default(), Config::default());
        assert_eq!(sps30.start().state, None);
    }

    #[test]
    fn settle_time_is_configurable() {
        let mut sps30 = Sps30::new(
            MockSerial::with_replies(vec![reply(0x01, 0x00, &[])]),
            MockDelay::default(),
            Config::default().settle_time_ms(50),
        );
        let _ = sps30.stop();
        let (_, delay) = sps30.release();
        assert_eq!(delay.total_ms, 50);
    }
}
