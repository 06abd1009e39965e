//! Hardware abstraction boundary
//!
//! The transport that talks to the physical backplane lives outside this crate.
//! It is reached through two traits: [`SlotDriver`] opens a physical slot, and
//! the [`SlotHardware`] it returns exposes the device table and the register
//! read/write primitives. Frame arrival flows the other way: the driver keeps
//! the [`FrameSink`] it is given at open time and pushes frames through it.

use std::collections::HashMap;

use super::dispatch::FrameSink;
use crate::Result;

/// Opens hardware contexts for physical slots
///
/// Implemented by the transport layer. `open` is called at most once per live
/// context; the registry guarantees a second reservation of the same slot never
/// triggers a duplicate open.
pub trait SlotDriver: Send + Sync {
    /// Open the physical slot and start frame delivery into `frames`.
    ///
    /// Fails with [`Error::ContextOpen`](crate::Error::ContextOpen) when the
    /// slot is unavailable. The returned hardware is closed by dropping it.
    fn open(&self, slot: u8, frames: FrameSink) -> Result<Box<dyn SlotHardware>>;
}

/// An open hardware context for one physical slot
///
/// The device table and the register primitives are owned by the transport;
/// this crate is a client only. Dropping the box closes the slot.
pub trait SlotHardware: Send + Sync {
    /// Snapshot of the slot's device table: address → device identity.
    ///
    /// Taken once at open; the table is read-only for the lifetime of the
    /// context.
    fn device_table(&self) -> HashMap<u32, u32>;

    /// Read a device register.
    fn read_register(&self, address: u32, register: u32) -> Result<u32>;

    /// Write a device register.
    fn write_register(&self, address: u32, register: u32, value: u32) -> Result<()>;
}
