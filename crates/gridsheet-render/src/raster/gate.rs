// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Blocking admission gate for memory-heavy decodes.
//
// Decodes run on blocking worker threads, so the gate is a plain
// mutex/condvar counting semaphore rather than an async one.

use std::sync::{Condvar, Mutex, PoisonError};

/// Bounded pool of decode slots. At most `capacity` permits are out at once.
#[derive(Debug)]
pub struct DecodeGate {
    capacity: usize,
    in_use: Mutex<usize>,
    released: Condvar,
}

impl DecodeGate {
    /// A gate admitting `capacity` holders at once (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            in_use: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until a slot is free and take it. The slot is returned when the
    /// permit is dropped.
    pub fn acquire(&self) -> GatePermit<'_> {
        let mut in_use = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
        while *in_use >= self.capacity {
            in_use = self
                .released
                .wait(in_use)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *in_use += 1;
        GatePermit { gate: self }
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        *self.in_use.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        let mut in_use = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
        *in_use = in_use.saturating_sub(1);
        self.released.notify_one();
    }
}

/// A held [`DecodeGate`] slot.
#[derive(Debug)]
pub struct GatePermit<'a> {
    gate: &'a DecodeGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn permits_are_returned_on_drop() {
        let gate = DecodeGate::new(2);
        let a = gate.acquire();
        let b = gate.acquire();
        assert_eq!(gate.in_use(), 2);
        drop(a);
        assert_eq!(gate.in_use(), 1);
        drop(b);
        assert_eq!(gate.in_use(), 0);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        assert_eq!(DecodeGate::new(0).capacity(), 1);
    }

    #[test]
    fn concurrent_holders_never_exceed_capacity() {
        let gate = Arc::new(DecodeGate::new(2));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    let _permit = gate.acquire();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(gate.in_use(), 0);
    }
}
