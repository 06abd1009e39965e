//! Demo: stream decoded IMU samples from a simulated backplane driver
//!
//! Runs entirely against an in-process driver that synthesizes IMU frames,
//! so it needs no hardware.
//!
//! Usage:
//!   cargo run --example imu_stream -- -n 20
//!
//! Block-aggregated mode:
//!   cargo run --example imu_stream -- -n 5 --block 10

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use backplane::devices::{ids, imu};
use backplane::{
    ContextRegistry, DeviceAddress, Frame, FrameSink, ImuReader, Result, SlotDriver, SlotHardware,
};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Physical slot to reserve
    #[arg(long, default_value = "0")]
    slot: u8,

    /// Device table address of the IMU
    #[arg(long, default_value = "2")]
    address: u32,

    /// Number of samples (or blocks) to print
    #[arg(short = 'n', long, default_value = "20")]
    samples: usize,

    /// Aggregate into blocks of this many samples (0 = single-sample mode)
    #[arg(long, default_value = "0")]
    block: usize,
}

/// Simulated transport: one IMU per slot, frames at ~1 kHz
struct SimDriver {
    address: u32,
}

impl SlotDriver for SimDriver {
    fn open(&self, slot: u8, frames: FrameSink) -> Result<Box<dyn SlotHardware>> {
        let stop = Arc::new(AtomicBool::new(false));
        let producer_stop = Arc::clone(&stop);
        let address = self.address;

        thread::spawn(move || {
            let mut clock = 0u64;
            while !producer_stop.load(Ordering::Relaxed) {
                let angle = (clock as f64 / 50.0).sin();
                let payload = imu::raw_payload(
                    clock * 4,
                    [(angle * 180.0 * 16.0) as i16, 0, 0],
                    [16384, 0, 0, 0],
                    [(angle * 100.0) as i16, 0, 0],
                    [0, 0, 981],
                    25,
                    3,
                );
                frames.deliver(Frame::new(address, clock, payload));
                clock += 1;
                thread::sleep(Duration::from_millis(1));
            }
        });

        info!(slot, "simulated slot opened");
        Ok(Box::new(SimHardware {
            address,
            stop,
        }))
    }
}

struct SimHardware {
    address: u32,
    stop: Arc<AtomicBool>,
}

impl SlotHardware for SimHardware {
    fn device_table(&self) -> HashMap<u32, u32> {
        HashMap::from([(self.address, ids::IMU)])
    }

    fn read_register(&self, _address: u32, _register: u32) -> Result<u32> {
        Ok(0)
    }

    fn write_register(&self, _address: u32, _register: u32, _value: u32) -> Result<()> {
        Ok(())
    }
}

impl Drop for SimHardware {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let registry = ContextRegistry::new(Arc::new(SimDriver {
        address: args.address,
    }));
    let reader = ImuReader::new(DeviceAddress::new(args.slot, args.address));

    if args.block > 0 {
        let mut blocks = reader.start_blocks(&registry, args.block)?;
        for _ in 0..args.samples {
            match blocks.recv()? {
                Some(block) => {
                    let clocks = block.frame_clock();
                    info!(
                        first_clock = clocks[0],
                        last_clock = clocks[clocks.len() - 1],
                        euler = ?block.samples()[0].euler,
                        "block complete"
                    );
                }
                None => break,
            }
        }
    } else {
        let stream = reader.start(&registry)?;
        for _ in 0..args.samples {
            match stream.recv()? {
                Some(sample) => println!(
                    "euler {:.2?}  temp {} °C  calibration {}",
                    sample.euler, sample.temperature, sample.calibration
                ),
                None => break,
            }
        }
    }

    Ok(())
}
