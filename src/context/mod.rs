//! Shared hardware contexts: reservation, validation and frame fan-out
//!
//! - **registry**: reference-counted reservation of one context per slot
//! - **dispatch**: per-device filtered sub-streams over crossbeam channels
//! - **hal**: trait boundary to the external transport (open, device table,
//!   register read/write)
//! - **frame**: raw frame and device address types

pub mod dispatch;
pub mod frame;
pub mod hal;
pub mod registry;

pub use dispatch::{FrameSink, FrameStream};
pub use frame::{DeviceAddress, Frame};
pub use hal::{SlotDriver, SlotHardware};
pub use registry::{Context, ContextHandle, ContextRegistry};

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory driver used as a fixture across the crate's tests

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::dispatch::FrameSink;
    use super::hal::{SlotDriver, SlotHardware};
    use crate::{Error, Result};

    pub(crate) struct MockDriver {
        devices: HashMap<u32, u32>,
        fail_open: bool,
        opens: AtomicUsize,
        closes: Arc<AtomicUsize>,
        sinks: Mutex<HashMap<u8, FrameSink>>,
        registers: Arc<Mutex<HashMap<(u32, u32), u32>>>,
        writes: Arc<Mutex<Vec<(u32, u32, u32)>>>,
        fail_writes: Arc<AtomicBool>,
    }

    impl MockDriver {
        /// Driver whose slots all expose the given device table
        pub(crate) fn new(devices: &[(u32, u32)]) -> Self {
            Self {
                devices: devices.iter().copied().collect(),
                fail_open: false,
                opens: AtomicUsize::new(0),
                closes: Arc::new(AtomicUsize::new(0)),
                sinks: Mutex::new(HashMap::new()),
                registers: Arc::new(Mutex::new(HashMap::new())),
                writes: Arc::new(Mutex::new(Vec::new())),
                fail_writes: Arc::new(AtomicBool::new(false)),
            }
        }

        /// Driver whose open always fails
        pub(crate) fn failing() -> Self {
            Self {
                fail_open: true,
                ..Self::new(&[])
            }
        }

        pub(crate) fn open_count(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        pub(crate) fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }

        /// The frame sink captured when `slot` was opened
        pub(crate) fn sink(&self, slot: u8) -> FrameSink {
            self.sinks
                .lock()
                .unwrap()
                .get(&slot)
                .expect("slot was never opened")
                .clone()
        }

        /// Release the driver's sink for `slot`, ending its streams
        pub(crate) fn drop_sink(&self, slot: u8) {
            self.sinks.lock().unwrap().remove(&slot);
        }

        pub(crate) fn set_register(&self, address: u32, register: u32, value: u32) {
            self.registers
                .lock()
                .unwrap()
                .insert((address, register), value);
        }

        pub(crate) fn writes(&self) -> Vec<(u32, u32, u32)> {
            self.writes.lock().unwrap().clone()
        }

        pub(crate) fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }
    }

    impl SlotDriver for MockDriver {
        fn open(&self, slot: u8, frames: FrameSink) -> Result<Box<dyn SlotHardware>> {
            if self.fail_open {
                return Err(Error::ContextOpen {
                    slot,
                    reason: "slot unavailable".to_string(),
                });
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.sinks.lock().unwrap().insert(slot, frames);
            Ok(Box::new(MockHardware {
                devices: self.devices.clone(),
                closes: Arc::clone(&self.closes),
                registers: Arc::clone(&self.registers),
                writes: Arc::clone(&self.writes),
                fail_writes: Arc::clone(&self.fail_writes),
            }))
        }
    }

    struct MockHardware {
        devices: HashMap<u32, u32>,
        closes: Arc<AtomicUsize>,
        registers: Arc<Mutex<HashMap<(u32, u32), u32>>>,
        writes: Arc<Mutex<Vec<(u32, u32, u32)>>>,
        fail_writes: Arc<AtomicBool>,
    }

    impl SlotHardware for MockHardware {
        fn device_table(&self) -> HashMap<u32, u32> {
            self.devices.clone()
        }

        fn read_register(&self, address: u32, register: u32) -> Result<u32> {
            self.registers
                .lock()
                .unwrap()
                .get(&(address, register))
                .copied()
                .ok_or_else(|| Error::RegisterRead {
                    address,
                    register,
                    reason: "no such register".to_string(),
                })
        }

        fn write_register(&self, address: u32, register: u32, value: u32) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::RegisterWrite {
                    address,
                    register,
                    reason: "hardware rejected write".to_string(),
                });
            }
            self.writes.lock().unwrap().push((address, register, value));
            self.registers
                .lock()
                .unwrap()
                .insert((address, register), value);
            Ok(())
        }
    }

    impl Drop for MockHardware {
        fn drop(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
