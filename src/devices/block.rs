//! Multi-frame sample aggregation with dual clock tracking
//!
//! A [`DataBlock`] collects a fixed number of consecutive frames from one
//! device. Each fill records two clocks for the sample — the acquisition
//! clock stamped on the frame and the device-local data clock reconstructed
//! from the payload header — alongside the decoded sample itself.

use crate::context::Frame;
use crate::{Error, Result};

/// Every device payload starts with a four-word data-clock header,
/// most-significant word first. Fixed protocol detail, independent of the
/// device type that follows it.
pub const CLOCK_HEADER_WORDS: usize = 4;

/// Reconstruct the 64-bit device-local data clock from a payload.
///
/// The payload must be at least [`CLOCK_HEADER_WORDS`] long; callers check
/// the full payload length at decode entry.
#[inline]
pub fn data_clock(payload: &[u16]) -> u64 {
    ((payload[0] as u64) << 48)
        | ((payload[1] as u64) << 32)
        | ((payload[2] as u64) << 16)
        | (payload[3] as u64)
}

/// A decoded per-frame sample for one device type
///
/// Implementors form a closed set, one per device on the backplane. Field
/// offsets and scale constants are part of each device's wire contract.
pub trait PayloadSample: Sized {
    /// Exact payload length in 16-bit words, clock header included
    const PAYLOAD_WORDS: usize;

    /// Decode from a payload of exactly [`PAYLOAD_WORDS`](Self::PAYLOAD_WORDS)
    /// words. Pure and deterministic; length is the caller's precondition.
    fn from_payload(payload: &[u16]) -> Self;

    /// Length-checked decode entry point.
    ///
    /// Payload length is fixed by the device, so a mismatch is a wiring or
    /// configuration bug upstream and fails fast.
    fn decode(payload: &[u16]) -> Result<Self> {
        if payload.len() != Self::PAYLOAD_WORDS {
            return Err(Error::PayloadLength {
                expected: Self::PAYLOAD_WORDS,
                actual: payload.len(),
            });
        }
        Ok(Self::from_payload(payload))
    }
}

/// Aggregate of `samples_per_block` consecutive decoded samples
///
/// All three sequences are parallel and share the fill index. The block is
/// complete exactly when the index reaches `samples_per_block`; filling a
/// complete block is a driver-logic bug and is rejected, never recovered
/// from.
#[derive(Debug, Clone)]
pub struct DataBlock<T> {
    samples_per_block: usize,
    frame_clock: Vec<u64>,
    data_clock: Vec<u64>,
    samples: Vec<T>,
}

impl<T: PayloadSample> DataBlock<T> {
    /// Create an empty block that completes after `samples_per_block` fills.
    ///
    /// A zero-sample block would be born complete and could never be filled,
    /// so `samples_per_block` must be at least 1.
    pub fn new(samples_per_block: usize) -> Result<Self> {
        if samples_per_block == 0 {
            return Err(Error::InvalidBlockSize);
        }
        Ok(Self {
            samples_per_block,
            frame_clock: Vec::with_capacity(samples_per_block),
            data_clock: Vec::with_capacity(samples_per_block),
            samples: Vec::with_capacity(samples_per_block),
        })
    }

    /// Record one frame: both clocks, then the decoded sample.
    ///
    /// Returns `true` exactly when this fill completes the block. Filling a
    /// complete block returns [`Error::BlockOverflow`].
    pub fn fill(&mut self, frame: &Frame) -> Result<bool> {
        if self.is_complete() {
            return Err(Error::BlockOverflow {
                samples_per_block: self.samples_per_block,
            });
        }

        let sample = T::decode(&frame.payload)?;
        self.frame_clock.push(frame.clock);
        self.data_clock.push(data_clock(&frame.payload));
        self.samples.push(sample);

        Ok(self.is_complete())
    }

    /// Clear the block for the next aggregation cycle
    pub fn reset(&mut self) {
        self.frame_clock.clear();
        self.data_clock.clear();
        self.samples.clear();
    }

    /// Number of samples this block holds when complete
    pub fn samples_per_block(&self) -> usize {
        self.samples_per_block
    }

    /// Current fill index
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.samples.len() == self.samples_per_block
    }

    /// Acquisition-domain clock of each filled frame, in fill order
    pub fn frame_clock(&self) -> &[u64] {
        &self.frame_clock
    }

    /// Device-local data clock of each filled frame, in fill order
    pub fn data_clock(&self) -> &[u64] {
        &self.data_clock
    }

    /// Decoded samples, in fill order
    pub fn samples(&self) -> &[T] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct WordSample(u16);

    impl PayloadSample for WordSample {
        const PAYLOAD_WORDS: usize = 5;

        fn from_payload(payload: &[u16]) -> Self {
            WordSample(payload[4])
        }
    }

    fn frame(clock: u64, header: [u16; 4], word: u16) -> Frame {
        let payload = vec![header[0], header[1], header[2], header[3], word];
        Frame::new(1, clock, payload)
    }

    #[test]
    fn test_data_clock_is_most_significant_word_first() {
        assert_eq!(
            data_clock(&[0x0001, 0x0002, 0x0003, 0x0004]),
            0x0001_0002_0003_0004
        );
    }

    #[test]
    fn test_block_completes_after_exact_fill_count() {
        let mut block = DataBlock::<WordSample>::new(3).unwrap();

        assert!(!block.fill(&frame(10, [0, 0, 0, 1], 100)).unwrap());
        assert!(!block.fill(&frame(11, [0, 0, 0, 2], 101)).unwrap());
        assert!(block.fill(&frame(12, [0, 0, 0, 3], 102)).unwrap());

        assert!(block.is_complete());
        assert_eq!(block.frame_clock(), &[10, 11, 12]);
        assert_eq!(block.data_clock(), &[1, 2, 3]);
        assert_eq!(
            block.samples(),
            &[WordSample(100), WordSample(101), WordSample(102)]
        );
    }

    #[test]
    fn test_fill_after_complete_is_rejected() {
        let mut block = DataBlock::<WordSample>::new(1).unwrap();
        assert!(block.fill(&frame(0, [0; 4], 0)).unwrap());

        let err = block.fill(&frame(1, [0; 4], 0)).unwrap_err();
        assert!(matches!(
            err,
            Error::BlockOverflow {
                samples_per_block: 1
            }
        ));
    }

    #[test]
    fn test_reset_recycles_block() {
        let mut block = DataBlock::<WordSample>::new(1).unwrap();
        assert!(block.fill(&frame(0, [0; 4], 7)).unwrap());

        block.reset();
        assert!(block.is_empty());
        assert!(block.fill(&frame(1, [0; 4], 8)).unwrap());
        assert_eq!(block.samples(), &[WordSample(8)]);
    }

    #[test]
    fn test_zero_block_size_is_rejected() {
        let err = DataBlock::<WordSample>::new(0).unwrap_err();
        assert!(matches!(err, Error::InvalidBlockSize));
    }

    #[test]
    fn test_decode_rejects_wrong_payload_length() {
        let err = WordSample::decode(&[0, 0, 0]).unwrap_err();
        assert!(matches!(
            err,
            Error::PayloadLength {
                expected: 5,
                actual: 3
            }
        ));
    }
}
