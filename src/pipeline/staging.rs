// SPDX-License-Identifier: GPL-3.0-only

//! Double-buffered RGBA staging between processing and rendering
//!
//! The writer fills the slot that is not "latest" and then publishes it by
//! swapping the latest index. The reader only ever touches the latest slot.
//! Neither side blocks: a busy slot makes the writer drop its frame and the
//! reader retry with the fresh index.

use crate::errors::{ProcessError, ProcessResult};
use crate::media::yuv::rgba_len;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

const NO_FRAME: usize = usize::MAX;
const READ_ATTEMPTS: usize = 4;

/// One RGBA slot
#[derive(Debug)]
pub struct StagedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    /// Publication counter, starting at 1
    pub sequence: u64,
    /// Mode generation the frame was processed under
    pub mode_generation: u64,
}

#[derive(Debug)]
pub struct TextureStaging {
    width: u32,
    height: u32,
    slots: [Mutex<StagedFrame>; 2],
    latest: AtomicUsize,
    published: AtomicU64,
}

fn try_lock(slot: &Mutex<StagedFrame>) -> Option<MutexGuard<'_, StagedFrame>> {
    match slot.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

impl TextureStaging {
    pub fn new(width: u32, height: u32) -> Self {
        let slot = || {
            Mutex::new(StagedFrame {
                width,
                height,
                pixels: vec![0; rgba_len(width, height)],
                sequence: 0,
                mode_generation: 0,
            })
        };
        Self {
            width,
            height,
            slots: [slot(), slot()],
            latest: AtomicUsize::new(NO_FRAME),
            published: AtomicU64::new(0),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Frames published so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    pub fn has_frame(&self) -> bool {
        self.latest.load(Ordering::Acquire) != NO_FRAME
    }

    /// Fill the free slot with `write` and publish it
    ///
    /// Single writer. On `NoFreeSlot` or an error from `write` nothing is
    /// published and the reader keeps seeing the previous frame.
    pub fn write_next<F>(&self, mode_generation: u64, write: F) -> ProcessResult<u64>
    where
        F: FnOnce(&mut [u8]) -> ProcessResult<()>,
    {
        let target = match self.latest.load(Ordering::Acquire) {
            NO_FRAME => 0,
            latest => 1 - latest,
        };
        let mut slot = try_lock(&self.slots[target]).ok_or(ProcessError::NoFreeSlot)?;

        write(&mut slot.pixels)?;

        let sequence = self.published.fetch_add(1, Ordering::AcqRel) + 1;
        slot.sequence = sequence;
        slot.mode_generation = mode_generation;
        drop(slot);

        self.latest.store(target, Ordering::Release);
        Ok(sequence)
    }

    /// Run `read` on the latest complete frame without blocking the writer
    ///
    /// Returns `None` if nothing has been published yet, or if the writer
    /// kept winning the race for the slot.
    pub fn read_latest<R>(&self, read: impl FnOnce(&StagedFrame) -> R) -> Option<R> {
        for _ in 0..READ_ATTEMPTS {
            let index = self.latest.load(Ordering::Acquire);
            if index == NO_FRAME {
                return None;
            }
            if let Some(slot) = try_lock(&self.slots[index]) {
                return Some(read(&slot));
            }
            std::hint::spin_loop();
        }
        None
    }

    /// Sequence number of the latest frame, if any
    pub fn latest_sequence(&self) -> Option<u64> {
        self.read_latest(|frame| frame.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_until_first_publish() {
        let staging = TextureStaging::new(2, 2);
        assert!(!staging.has_frame());
        assert_eq!(staging.read_latest(|f| f.sequence), None);
    }

    #[test]
    fn test_alternates_slots() {
        let staging = TextureStaging::new(1, 1);
        staging.write_next(0, |px| Ok(px.fill(1))).unwrap();
        staging.write_next(0, |px| Ok(px.fill(2))).unwrap();
        staging.write_next(7, |px| Ok(px.fill(3))).unwrap();

        let (pixels, seq, generation) = staging
            .read_latest(|f| (f.pixels.clone(), f.sequence, f.mode_generation))
            .unwrap();
        assert_eq!(pixels, vec![3; 4]);
        assert_eq!(seq, 3);
        assert_eq!(generation, 7);
    }

    #[test]
    fn test_failed_write_keeps_previous_frame() {
        let staging = TextureStaging::new(1, 1);
        staging.write_next(0, |px| Ok(px.fill(9))).unwrap();

        let result = staging.write_next(0, |px| {
            px.fill(0);
            Err(ProcessError::TransformFailure("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(staging.read_latest(|f| f.pixels[0]), Some(9));
        assert_eq!(staging.published(), 1);
    }

    #[test]
    fn test_writer_drops_when_reader_holds_free_slot() {
        let staging = TextureStaging::new(1, 1);
        staging.write_next(0, |px| Ok(px.fill(1))).unwrap();
        staging.write_next(0, |px| Ok(px.fill(2))).unwrap();

        // Reader holds slot 1 (latest); writer targets slot 0 and succeeds
        staging.read_latest(|_| {
            assert!(staging.write_next(0, |px| Ok(px.fill(3))).is_ok());
            // Now slot 0 is latest and the writer wants slot 1, which is held
            assert_eq!(
                staging.write_next(0, |px| Ok(px.fill(4))),
                Err(ProcessError::NoFreeSlot)
            );
        });
        assert_eq!(staging.read_latest(|f| f.pixels[0]), Some(3));
    }
}
