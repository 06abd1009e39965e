//! Breakout board digital I/O: configuration write path
//!
//! The breakout board has no decoded payload; it is driven entirely through
//! its register map. Typed commands are encoded into register writes issued
//! against the shared context, concurrently with and independently of any
//! read-path subscriptions on the same slot.

use crate::context::{ContextHandle, ContextRegistry, DeviceAddress};
use crate::devices::ids;
use crate::Result;

// Register map (wire contract)
const REG_ENABLE: u32 = 0;
// 0 = all off, 1 = power and running only, 3 = normal
const REG_LED_MODE: u32 = 1;
// 0-255 overall brightness
const REG_LED_LEVEL: u32 = 2;

/// LED behaviour of the breakout board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    Off,
    PowerOnly,
    On,
    /// Register holds a value outside the documented set
    Undefined,
}

impl LedMode {
    /// Wire encoding. `Undefined` has no register value of its own (it covers
    /// read-back values outside the documented set); writing it aliases to the
    /// normal mode.
    fn to_register(self) -> u32 {
        match self {
            LedMode::Off => 0,
            LedMode::PowerOnly => 1,
            LedMode::On => 3,
            LedMode::Undefined => 3,
        }
    }

    fn from_register(value: u32) -> Self {
        match value {
            0 => LedMode::Off,
            1 => LedMode::PowerOnly,
            3 => LedMode::On,
            _ => LedMode::Undefined,
        }
    }
}

/// A typed input for the breakout board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakoutCommand {
    /// Enable or disable the device data stream
    Enable(bool),
    LedMode(LedMode),
    /// Overall LED brightness, 0-255
    LedBrightness(u8),
}

impl BreakoutCommand {
    /// Map the logical field to its register index and value
    pub fn encode(self) -> (u32, u32) {
        match self {
            BreakoutCommand::Enable(on) => (REG_ENABLE, u32::from(on)),
            BreakoutCommand::LedMode(mode) => (REG_LED_MODE, mode.to_register()),
            BreakoutCommand::LedBrightness(level) => (REG_LED_LEVEL, u32::from(level)),
        }
    }
}

/// Write-path handle for one breakout board
///
/// Opening validates the device address once; the writer then shares the
/// slot's context reference count with any read subscribers. Write failures
/// surface here only and never disturb in-flight read streams; dropping the
/// writer never closes a context that readers still hold.
pub struct BreakoutWriter {
    handle: ContextHandle,
    address: u32,
}

impl std::fmt::Debug for BreakoutWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakoutWriter")
            .field("handle", &self.handle)
            .field("address", &self.address)
            .finish()
    }
}

impl BreakoutWriter {
    /// Reserve the slot and validate the device identity
    pub fn open(registry: &ContextRegistry, address: DeviceAddress) -> Result<Self> {
        let handle = registry.reserve(address.slot)?;
        handle.validate(address.address, ids::BREAKOUT)?;
        Ok(Self {
            handle,
            address: address.address,
        })
    }

    /// Encode a typed command and issue the register write
    pub fn send(&self, command: BreakoutCommand) -> Result<()> {
        let (register, value) = command.encode();
        self.handle.write_register(self.address, register, value)
    }

    /// Whether the device data stream is enabled
    pub fn enabled(&self) -> Result<bool> {
        Ok(self.handle.read_register(self.address, REG_ENABLE)? > 0)
    }

    /// Current LED mode
    pub fn led_mode(&self) -> Result<LedMode> {
        Ok(LedMode::from_register(
            self.handle.read_register(self.address, REG_LED_MODE)?,
        ))
    }

    /// Current LED brightness
    pub fn led_brightness(&self) -> Result<u32> {
        self.handle.read_register(self.address, REG_LED_LEVEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::MockDriver;
    use crate::context::{Frame, SlotDriver};
    use crate::Error;
    use std::sync::Arc;

    fn fixture() -> (Arc<MockDriver>, ContextRegistry) {
        let driver = Arc::new(MockDriver::new(&[(2, ids::BREAKOUT), (3, ids::IMU)]));
        let registry = ContextRegistry::new(Arc::clone(&driver) as Arc<dyn SlotDriver>);
        (driver, registry)
    }

    #[test]
    fn test_command_register_mapping() {
        assert_eq!(BreakoutCommand::Enable(true).encode(), (0, 1));
        assert_eq!(BreakoutCommand::Enable(false).encode(), (0, 0));
        assert_eq!(BreakoutCommand::LedMode(LedMode::Off).encode(), (1, 0));
        assert_eq!(BreakoutCommand::LedMode(LedMode::PowerOnly).encode(), (1, 1));
        assert_eq!(BreakoutCommand::LedMode(LedMode::On).encode(), (1, 3));
        // Undefined carries no wire value of its own and writes as normal mode
        assert_eq!(BreakoutCommand::LedMode(LedMode::Undefined).encode(), (1, 3));
        assert_eq!(BreakoutCommand::LedBrightness(128).encode(), (2, 128));
    }

    #[test]
    fn test_writes_reach_hardware_and_read_back() {
        let (driver, registry) = fixture();
        let writer = BreakoutWriter::open(&registry, DeviceAddress::new(0, 2)).unwrap();

        writer.send(BreakoutCommand::Enable(true)).unwrap();
        writer.send(BreakoutCommand::LedMode(LedMode::On)).unwrap();
        writer.send(BreakoutCommand::LedBrightness(200)).unwrap();

        assert_eq!(driver.writes(), vec![(2, 0, 1), (2, 1, 3), (2, 2, 200)]);
        assert!(writer.enabled().unwrap());
        assert_eq!(writer.led_mode().unwrap(), LedMode::On);
        assert_eq!(writer.led_brightness().unwrap(), 200);
    }

    #[test]
    fn test_open_validates_identity() {
        let (_, registry) = fixture();
        // Address 3 holds the IMU, not a breakout board
        let err = BreakoutWriter::open(&registry, DeviceAddress::new(0, 3)).unwrap_err();
        assert!(matches!(err, Error::InvalidAddress { .. }));
        assert_eq!(registry.reference_count(0), 0);
    }

    #[test]
    fn test_write_failure_does_not_disturb_read_path() {
        let (driver, registry) = fixture();

        let handle = registry.reserve(0).unwrap();
        let stream = handle.subscribe(3, ids::IMU).unwrap();
        let writer = BreakoutWriter::open(&registry, DeviceAddress::new(0, 2)).unwrap();
        assert_eq!(registry.reference_count(0), 3);

        driver.set_fail_writes(true);
        let err = writer.send(BreakoutCommand::Enable(true)).unwrap_err();
        assert!(matches!(err, Error::RegisterWrite { .. }));

        // The read stream keeps flowing
        driver.sink(0).deliver(Frame::new(3, 7, vec![0u16; 18]));
        assert_eq!(stream.try_recv().unwrap().clock, 7);

        // Dropping the writer releases only its own reservation
        drop(writer);
        assert_eq!(driver.close_count(), 0);
        assert_eq!(registry.reference_count(0), 2);
    }

    #[test]
    fn test_undefined_led_mode_read() {
        let (driver, registry) = fixture();
        driver.set_register(2, REG_LED_MODE, 2);
        let writer = BreakoutWriter::open(&registry, DeviceAddress::new(0, 2)).unwrap();
        assert_eq!(writer.led_mode().unwrap(), LedMode::Undefined);
    }
}
