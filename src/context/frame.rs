//! Raw hardware frames and device addressing

use std::fmt;
use std::sync::Arc;

/// Address of a logical device on the backplane
///
/// A physical slot hosts one hardware context; the context multiplexes many
/// logical devices, each identified by its table address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress {
    /// Physical slot index on the backplane
    pub slot: u8,
    /// Device table address within the slot's context
    pub address: u32,
}

impl DeviceAddress {
    /// Create a new device address
    pub fn new(slot: u8, address: u32) -> Self {
        Self { slot, address }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.slot, self.address)
    }
}

/// One raw frame as emitted by the acquisition hardware
///
/// Frames are immutable once received. The payload is shared via `Arc` so the
/// dispatcher can hand the same frame to several subscribers without copying
/// the word data; decoders and accumulators copy the fields they need out.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Device table address of the emitting device
    pub address: u32,
    /// 64-bit acquisition clock stamped by the frame source
    pub clock: u64,
    /// Fixed-width payload of 16-bit words (layout is per-device wire contract)
    pub payload: Arc<[u16]>,
}

impl Frame {
    /// Create a new frame
    pub fn new(address: u32, clock: u64, payload: impl Into<Arc<[u16]>>) -> Self {
        Self {
            address,
            clock,
            payload: payload.into(),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Frame[addr={}, clock={}, words={}]",
            self.address,
            self.clock,
            self.payload.len()
        )
    }
}
