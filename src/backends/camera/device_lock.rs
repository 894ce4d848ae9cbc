// SPDX-License-Identifier: GPL-3.0-only

//! Exclusive lock serializing camera open and close
//!
//! Open and close may be requested from different threads while an earlier
//! operation is still in flight. Both paths take this lock with a bounded
//! wait; giving up surfaces as `CameraError::OpenTimeout`.

use crate::errors::{CameraError, CameraResult};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Default)]
pub struct DeviceLock {
    held: Mutex<bool>,
    released: Condvar,
}

/// Releases the device lock on drop
#[derive(Debug)]
pub struct DeviceLockGuard<'a> {
    lock: &'a DeviceLock,
}

impl DeviceLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, bool> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the lock, waiting at most `timeout`
    pub fn acquire(&self, timeout: Duration) -> CameraResult<DeviceLockGuard<'_>> {
        let deadline = Instant::now() + timeout;
        let mut held = self.state();

        while *held {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(timeout_ms = timeout.as_millis() as u64, "Timed out waiting for camera lock");
                return Err(CameraError::OpenTimeout);
            }
            held = self
                .released
                .wait_timeout(held, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }

        *held = true;
        Ok(DeviceLockGuard { lock: self })
    }

    /// Whether some operation currently holds the lock
    pub fn is_held(&self) -> bool {
        *self.state()
    }
}

impl Drop for DeviceLockGuard<'_> {
    fn drop(&mut self) {
        *self.lock.state() = false;
        self.lock.released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_release() {
        let lock = DeviceLock::new();
        {
            let _guard = lock.acquire(Duration::from_millis(10)).unwrap();
            assert!(lock.is_held());
        }
        assert!(!lock.is_held());
        assert!(lock.acquire(Duration::ZERO).is_ok());
    }

    #[test]
    fn test_times_out_while_held() {
        let lock = DeviceLock::new();
        let _guard = lock.acquire(Duration::from_millis(10)).unwrap();

        let start = Instant::now();
        let result = lock.acquire(Duration::from_millis(50));
        assert_eq!(result.unwrap_err(), CameraError::OpenTimeout);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_waiter_wakes_on_release() {
        let lock = Arc::new(DeviceLock::new());
        let guard = lock.acquire(Duration::ZERO).unwrap();

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.acquire(Duration::from_secs(5)).map(|_| ()))
        };

        thread::sleep(Duration::from_millis(20));
        drop(guard);

        assert!(waiter.join().unwrap().is_ok());
    }
}
