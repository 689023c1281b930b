// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use cbx_evm::{RecordId, RecordKind};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

pub type Clock = fn() -> u64;

fn system_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Generates `<kind prefix><millis>` record ids.
///
/// Stamps are strictly increasing within the process: two calls in the same
/// millisecond get consecutive stamps instead of colliding.
pub struct IdGenerator {
    clock: Clock,
    last_stamp: AtomicU64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::with_clock(system_millis)
    }
}

impl IdGenerator {
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            clock,
            last_stamp: AtomicU64::new(0),
        }
    }

    fn next_stamp(&self) -> u64 {
        let now = (self.clock)();
        let previous = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }

    /// Next id of `kind` for which `is_taken` returns false
    pub fn next(&self, kind: &RecordKind, is_taken: impl Fn(&RecordId) -> bool) -> RecordId {
        loop {
            let id = kind.id_with_stamp(self.next_stamp());
            if !is_taken(&id) {
                return id;
            }
        }
    }
}
