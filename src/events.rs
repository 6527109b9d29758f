//! Event-flag groups (spec §5) — the two-bit wake-and-drain groups
//! wiring the radio's connection callbacks and the FSM/Routing tasks
//! together. Grounded in the teacher's `state/mesh_ops.rs`, which
//! drives similar wait/notify handshakes around ESP-MESH's connection
//! state; here it is a small condvar-backed bitset instead of the
//! RTOS's native event-flag-group primitive, since std gives us
//! `Condvar` directly.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub const WIRELESS_CONNECT: u8 = 0b01;
pub const WIRELESS_DISCONNECT: u8 = 0b10;

pub const ROUTING_START: u8 = 0b01;
pub const ROUTING_STOP: u8 = 0b10;

/// Any task may set bits; the owning task clears them by waiting
/// (spec §5 "Inter-task communication").
#[derive(Default)]
pub struct EventFlags {
    bits: Mutex<u8>,
    cv: Condvar,
}

impl EventFlags {
    pub fn new() -> Self {
        EventFlags {
            bits: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    pub fn set(&self, bit: u8) {
        let mut bits = self.bits.lock().unwrap();
        *bits |= bit;
        self.cv.notify_all();
    }

    /// Block up to `timeout` for any bit in `mask` to be set, then
    /// clear and return whichever bits (within `mask`) were observed.
    /// Returns 0 on timeout, matching `WaitAny` semantics.
    pub fn wait_any(&self, mask: u8, timeout: Duration) -> u8 {
        let bits = self.bits.lock().unwrap();
        let (mut bits, _timed_out) = self
            .cv
            .wait_timeout_while(bits, timeout, |b| *b & mask == 0)
            .unwrap();
        let observed = *bits & mask;
        *bits &= !mask;
        observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_any_times_out_with_no_bits_set() {
        let flags = EventFlags::new();
        let observed = flags.wait_any(WIRELESS_CONNECT | WIRELESS_DISCONNECT, Duration::from_millis(10));
        assert_eq!(observed, 0);
    }

    #[test]
    fn set_then_wait_observes_and_clears_the_bit() {
        let flags = EventFlags::new();
        flags.set(WIRELESS_DISCONNECT);
        let observed = flags.wait_any(WIRELESS_CONNECT | WIRELESS_DISCONNECT, Duration::from_millis(10));
        assert_eq!(observed, WIRELESS_DISCONNECT);

        let observed_again = flags.wait_any(WIRELESS_CONNECT | WIRELESS_DISCONNECT, Duration::from_millis(10));
        assert_eq!(observed_again, 0);
    }
}
