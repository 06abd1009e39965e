//! Shared hardware context reservation
//!
//! One physical slot maps to at most one live [`Context`]. The registry
//! arbitrates shared ownership: the first reservation of a slot opens the
//! hardware, later reservations reuse it, and the last release closes it.
//! All reference-count and open/close mutation is serialized through a single
//! mutex, so concurrent reservations observe exactly one open, no two closers
//! run concurrently, and no reservation sees a context mid-teardown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use super::dispatch::{Dispatcher, FrameSink, FrameStream};
use super::hal::{SlotDriver, SlotHardware};
use crate::{Error, Result};

/// An open, shared hardware context for one physical slot
///
/// The device table is snapshotted at open and read-only afterwards. Register
/// access goes straight through to the slot hardware.
pub struct Context {
    slot: u8,
    hardware: Box<dyn SlotHardware>,
    device_table: HashMap<u32, u32>,
    pub(crate) dispatcher: Arc<Dispatcher>,
}

impl Context {
    /// Physical slot this context is bound to
    pub fn slot(&self) -> u8 {
        self.slot
    }

    /// Device identity stored at `address`, if the table has an entry
    pub fn device_id(&self, address: u32) -> Option<u32> {
        self.device_table.get(&address).copied()
    }

    /// Check that the device table holds `expected_id` at `address`.
    ///
    /// Invoked once when a read or write stream activates, never per frame.
    pub fn validate(&self, address: u32, expected_id: u32) -> Result<()> {
        match self.device_id(address) {
            Some(id) if id == expected_id => Ok(()),
            found => Err(Error::InvalidAddress {
                address,
                expected: expected_id,
                found,
            }),
        }
    }

    /// Read a device register through the slot hardware.
    pub fn read_register(&self, address: u32, register: u32) -> Result<u32> {
        self.hardware.read_register(address, register)
    }

    /// Write a device register through the slot hardware.
    pub fn write_register(&self, address: u32, register: u32, value: u32) -> Result<()> {
        self.hardware.write_register(address, register, value)
    }
}

struct SlotEntry {
    refs: usize,
    context: Arc<Context>,
}

/// Registry arbitrating one shared hardware context per physical slot
pub struct ContextRegistry {
    driver: Arc<dyn SlotDriver>,
    slots: Arc<Mutex<HashMap<u8, SlotEntry>>>,
}

impl ContextRegistry {
    /// Create a registry backed by the given transport driver
    pub fn new(driver: Arc<dyn SlotDriver>) -> Self {
        Self {
            driver,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reserve the context for `slot`, opening the hardware on first use.
    ///
    /// Blocks only while the underlying open runs; a slot that is already open
    /// returns immediately with a handle to the existing context. Open
    /// failures propagate as [`Error::ContextOpen`] and are not retried here.
    pub fn reserve(&self, slot: u8) -> Result<ContextHandle> {
        let mut slots = self.slots.lock().unwrap();

        if let Some(entry) = slots.get_mut(&slot) {
            entry.refs += 1;
            debug!(slot, refs = entry.refs, "reserved existing context");
            return Ok(ContextHandle {
                slot,
                context: Some(Arc::clone(&entry.context)),
                slots: Arc::clone(&self.slots),
            });
        }

        // First reservation: open under the lock so a concurrent reserve of
        // the same slot waits here and then reuses this context.
        let dispatcher = Arc::new(Dispatcher::new());
        let sink = FrameSink::new(Arc::clone(&dispatcher));
        let hardware = self.driver.open(slot, sink)?;
        let device_table = hardware.device_table();
        info!(slot, devices = device_table.len(), "opened hardware context");

        let context = Arc::new(Context {
            slot,
            hardware,
            device_table,
            dispatcher,
        });
        slots.insert(
            slot,
            SlotEntry {
                refs: 1,
                context: Arc::clone(&context),
            },
        );

        Ok(ContextHandle {
            slot,
            context: Some(context),
            slots: Arc::clone(&self.slots),
        })
    }

    /// Current reservation count for `slot` (0 when the slot is closed)
    pub fn reference_count(&self, slot: u8) -> usize {
        self.slots
            .lock()
            .unwrap()
            .get(&slot)
            .map_or(0, |entry| entry.refs)
    }
}

/// Reference-counted handle to a shared [`Context`]
///
/// Cloning reserves the context again; dropping releases one reservation and
/// closes the hardware when it was the last.
pub struct ContextHandle {
    slot: u8,
    // Always `Some` for a live handle; taken in `drop` so the final strong
    // reference can be released while the registry lock is held.
    context: Option<Arc<Context>>,
    slots: Arc<Mutex<HashMap<u8, SlotEntry>>>,
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl ContextHandle {
    /// The shared context
    pub fn context(&self) -> &Context {
        self.context.as_ref().expect("context taken only in drop")
    }

    /// Subscribe to the sub-stream of frames addressed to `address`.
    ///
    /// Validates the address against the device table first; a failed
    /// validation registers nothing and delivers nothing. The returned stream
    /// holds its own reservation, so the context outlives this handle if the
    /// stream does.
    pub fn subscribe(&self, address: u32, expected_id: u32) -> Result<FrameStream> {
        let context = self.context();
        context.validate(address, expected_id)?;
        let (id, rx) = context.dispatcher.subscribe(address);
        Ok(FrameStream::new(
            rx,
            id,
            address,
            Arc::clone(&context.dispatcher),
            self.clone(),
        ))
    }
}

impl std::ops::Deref for ContextHandle {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.context()
    }
}

impl Clone for ContextHandle {
    fn clone(&self) -> Self {
        let mut slots = self.slots.lock().unwrap();
        let entry = slots
            .get_mut(&self.slot)
            .expect("live handle for untracked slot");
        entry.refs += 1;
        debug!(slot = self.slot, refs = entry.refs, "reserved existing context");
        Self {
            slot: self.slot,
            context: self.context.clone(),
            slots: Arc::clone(&self.slots),
        }
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap();
        let entry = slots
            .get_mut(&self.slot)
            .expect("live handle for untracked slot");
        entry.refs -= 1;
        if entry.refs == 0 {
            // Last holder: the map's reference and this handle's are the only
            // strong references left. Drop both while the lock is held so the
            // hardware closes before any concurrent reserve of this slot can
            // run.
            let entry = slots.remove(&self.slot);
            drop(self.context.take());
            drop(entry);
            info!(slot = self.slot, "closed hardware context");
        } else {
            debug!(slot = self.slot, refs = entry.refs, "released context");
        }
    }
}
