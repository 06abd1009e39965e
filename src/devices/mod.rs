//! Device-specific decoding, aggregation and command encoding
//!
//! Each logical device on the backplane gets one module: a pure payload
//! decoder for its wire format and, where the device accepts configuration,
//! a command encoder over the register write path. The closed set of device
//! types is selected at construction, keyed by the identity stored in the
//! context's device table.

pub mod block;
pub mod breakout;
pub mod imu;

/// Device identities as stored in the hardware device table
pub mod ids {
    /// 9-axis absolute-orientation IMU
    pub const IMU: u32 = 9;
    /// Breakout board digital I/O
    pub const BREAKOUT: u32 = 21;
}
