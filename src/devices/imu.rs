//! 9-axis absolute-orientation IMU
//!
//! The device emits one 18-word frame per fused sample. Payload layout
//! (word offsets, wire contract):
//!
//! | words  | field               | scale                |
//! |--------|---------------------|----------------------|
//! | 0–3    | data-clock header   | —                    |
//! | 4–6    | Euler angles        | 1/16 degree per LSB  |
//! | 7–10   | quaternion w,x,y,z  | 1/2^14 per LSB       |
//! | 11–13  | linear acceleration | 1/100 m/s² per LSB   |
//! | 14–16  | gravity vector      | 1/100 m/s² per LSB   |
//! | 17     | temperature (low byte, 1 °C per LSB), calibration (high byte) |
//!
//! Every word is reinterpreted as a signed 16-bit integer before scaling.

use std::sync::Arc;

use crate::context::{ContextRegistry, DeviceAddress, FrameStream};
use crate::devices::block::{DataBlock, PayloadSample};
use crate::devices::ids;
use crate::{Error, Result};

// 1 degree = 16 LSB
const EULER_SCALE: f64 = 0.0625;
// 1 m/s^2 = 100 LSB
const ACCEL_SCALE: f64 = 0.01;
// 1 unit quaternion component = 2^14 LSB
const QUAT_SCALE: f64 = 1.0 / (1 << 14) as f64;

const EULER_OFFSET: usize = 4;
const QUAT_OFFSET: usize = 7;
const LINEAR_ACCEL_OFFSET: usize = 11;
const GRAVITY_OFFSET: usize = 14;
const STATUS_OFFSET: usize = 17;

/// One decoded IMU sample in physical units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    /// Euler angles in degrees
    pub euler: [f64; 3],
    /// Unit quaternion (w, x, y, z)
    pub quaternion: [f64; 4],
    /// Linear acceleration in m/s²
    pub linear_acceleration: [f64; 3],
    /// Gravity vector in m/s²
    pub gravity: [f64; 3],
    /// Die temperature in °C
    pub temperature: u8,
    /// Sensor fusion calibration status
    pub calibration: u8,
}

/// Read `N` consecutive words as two's-complement integers and scale them.
fn scaled<const N: usize>(payload: &[u16], offset: usize, scale: f64) -> [f64; N] {
    std::array::from_fn(|i| (payload[offset + i] as i16) as f64 * scale)
}

impl PayloadSample for ImuSample {
    const PAYLOAD_WORDS: usize = 18;

    fn from_payload(payload: &[u16]) -> Self {
        let status = payload[STATUS_OFFSET];
        Self {
            euler: scaled(payload, EULER_OFFSET, EULER_SCALE),
            quaternion: scaled(payload, QUAT_OFFSET, QUAT_SCALE),
            linear_acceleration: scaled(payload, LINEAR_ACCEL_OFFSET, ACCEL_SCALE),
            gravity: scaled(payload, GRAVITY_OFFSET, ACCEL_SCALE),
            temperature: (status & 0x00ff) as u8,
            calibration: (status >> 8) as u8,
        }
    }
}

/// Reader for one IMU on the backplane
///
/// Activating a stream reserves the slot's shared context, validates the
/// device address against the table, and subscribes to the filtered frame
/// sub-stream. Single-frame and block-aggregating modes share the same
/// activation path.
pub struct ImuReader {
    address: DeviceAddress,
}

impl ImuReader {
    pub fn new(address: DeviceAddress) -> Self {
        Self { address }
    }

    fn activate(&self, registry: &ContextRegistry) -> Result<FrameStream> {
        let handle = registry.reserve(self.address.slot)?;
        handle.subscribe(self.address.address, ids::IMU)
    }

    /// Start a stream of individual decoded samples
    pub fn start(&self, registry: &ContextRegistry) -> Result<ImuStream> {
        Ok(ImuStream {
            frames: self.activate(registry)?,
        })
    }

    /// Start a stream of aggregated blocks of `samples_per_block` samples
    /// (at least 1)
    pub fn start_blocks(
        &self,
        registry: &ContextRegistry,
        samples_per_block: usize,
    ) -> Result<ImuBlockStream> {
        if samples_per_block == 0 {
            return Err(Error::InvalidBlockSize);
        }
        Ok(ImuBlockStream {
            frames: self.activate(registry)?,
            samples_per_block,
        })
    }
}

/// Stream of decoded single samples
pub struct ImuStream {
    frames: FrameStream,
}

impl std::fmt::Debug for ImuStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImuStream")
            .field("frames", &self.frames)
            .finish()
    }
}

impl ImuStream {
    /// Blocking receive. `Ok(None)` means the stream ended; a decode error is
    /// a protocol violation and fatal to this stream.
    pub fn recv(&self) -> Result<Option<ImuSample>> {
        match self.frames.recv() {
            Some(frame) => ImuSample::decode(&frame.payload).map(Some),
            None => Ok(None),
        }
    }

    /// Non-blocking receive. `Ok(None)` when no frame is ready.
    pub fn try_recv(&self) -> Result<Option<ImuSample>> {
        match self.frames.try_recv() {
            Some(frame) => ImuSample::decode(&frame.payload).map(Some),
            None => Ok(None),
        }
    }
}

/// Stream of completed sample blocks
///
/// Each `recv` fills a fresh block from consecutive frames and hands it over
/// exactly when it completes; a partial block at end-of-stream is discarded.
pub struct ImuBlockStream {
    frames: FrameStream,
    samples_per_block: usize,
}

impl std::fmt::Debug for ImuBlockStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImuBlockStream")
            .field("frames", &self.frames)
            .field("samples_per_block", &self.samples_per_block)
            .finish()
    }
}

impl ImuBlockStream {
    pub fn samples_per_block(&self) -> usize {
        self.samples_per_block
    }

    /// Blocking receive of the next complete block. `Ok(None)` means the
    /// stream ended before another block could complete.
    pub fn recv(&mut self) -> Result<Option<DataBlock<ImuSample>>> {
        let mut block = DataBlock::new(self.samples_per_block)?;
        loop {
            let frame = match self.frames.recv() {
                Some(frame) => frame,
                None => return Ok(None),
            };
            if block.fill(&frame)? {
                return Ok(Some(block));
            }
        }
    }
}

/// Build an IMU payload from raw register values (used by simulators and
/// tests; the inverse of [`ImuSample::from_payload`] up to quantization).
pub fn raw_payload(
    data_clock: u64,
    euler: [i16; 3],
    quaternion: [i16; 4],
    linear_acceleration: [i16; 3],
    gravity: [i16; 3],
    temperature: u8,
    calibration: u8,
) -> Arc<[u16]> {
    let mut words = Vec::with_capacity(ImuSample::PAYLOAD_WORDS);
    words.extend([
        (data_clock >> 48) as u16,
        (data_clock >> 32) as u16,
        (data_clock >> 16) as u16,
        data_clock as u16,
    ]);
    words.extend(euler.map(|v| v as u16));
    words.extend(quaternion.map(|v| v as u16));
    words.extend(linear_acceleration.map(|v| v as u16));
    words.extend(gravity.map(|v| v as u16));
    words.push(((calibration as u16) << 8) | temperature as u16);
    words.into()
}
