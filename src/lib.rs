//! Streaming demultiplexer and decoder for multi-device acquisition backplanes
//!
//! This library consumes the multiplexed frame stream produced by a hardware
//! acquisition backplane, splits it into per-device sub-streams, decodes raw
//! payloads into physical-unit samples, and drives device configuration through
//! hardware register writes — all against a single shared hardware context per
//! physical slot.
//!
//! # Architecture
//!
//! - **ContextRegistry**: reference-counted reservation of one hardware context
//!   per slot; concurrent readers and writers share the same context
//! - **FrameStream**: per-device filtered sub-stream fed by the context's frame
//!   dispatcher over crossbeam channels
//! - **Decoders**: pure, fixed-point payload decoders (one per device type)
//! - **DataBlock**: multi-frame sample aggregation with dual clock tracking
//! - **Writers**: typed command encoding into register writes
//!
//! # Example
//!
//! ```no_run
//! use backplane::{ContextRegistry, DeviceAddress, ImuReader};
//! # use std::sync::Arc;
//! # fn driver() -> Arc<dyn backplane::SlotDriver> { unimplemented!() }
//!
//! let registry = ContextRegistry::new(driver());
//! let reader = ImuReader::new(DeviceAddress::new(0, 9));
//! let stream = reader.start(&registry)?;
//! while let Some(sample) = stream.recv()? {
//!     println!("euler = {:?}", sample.euler);
//! }
//! # Ok::<(), backplane::Error>(())
//! ```

use thiserror::Error;

pub mod context;
pub mod devices;

// Re-export the context layer
pub use context::{
    Context, ContextHandle, ContextRegistry, DeviceAddress, Frame, FrameSink, FrameStream,
    SlotDriver, SlotHardware,
};

// Re-export device decoders and streams
pub use devices::block::{DataBlock, PayloadSample, CLOCK_HEADER_WORDS};
pub use devices::breakout::{BreakoutCommand, BreakoutWriter, LedMode};
pub use devices::imu::{ImuBlockStream, ImuReader, ImuSample, ImuStream};

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to open hardware context for slot {slot}: {reason}")]
    ContextOpen { slot: u8, reason: String },

    #[error("invalid device address {address}: expected device id {expected}, found {found:?}")]
    InvalidAddress {
        address: u32,
        expected: u32,
        found: Option<u32>,
    },

    #[error("payload length mismatch: expected {expected} words, got {actual}")]
    PayloadLength { expected: usize, actual: usize },

    #[error("samples_per_block must be at least 1")]
    InvalidBlockSize,

    #[error("data block already holds {samples_per_block} samples")]
    BlockOverflow { samples_per_block: usize },

    #[error("register read failed (address {address}, register {register}): {reason}")]
    RegisterRead {
        address: u32,
        register: u32,
        reason: String,
    },

    #[error("register write failed (address {address}, register {register}): {reason}")]
    RegisterWrite {
        address: u32,
        register: u32,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
