//! Feature-gated logging that is safe to call from the audio thread.
//!
//! `pc_log!` formats straight into a fixed-size slot of a lock-free ring without
//! allocating. The ring is drained off the audio thread (`initialize`,
//! `deactivate`, and a background task the plugin schedules every 250 ms) and
//! forwarded to the `log` facade, where the host backend picks it up.
//! Without the `debug` feature the macro compiles to nothing.

use std::fmt;

#[cfg(feature = "debug")]
pub mod logger {
    use std::cell::UnsafeCell;
    use std::fmt;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::OnceLock;

    const SLOTS: usize = 128;
    const MSG_BYTES: usize = 240;

    #[derive(Copy, Clone)]
    struct Message {
        len: usize,
        bytes: [u8; MSG_BYTES],
    }

    impl Message {
        const EMPTY: Message = Message {
            len: 0,
            bytes: [0; MSG_BYTES],
        };

        fn as_str(&self) -> &str {
            std::str::from_utf8(&self.bytes[..self.len]).unwrap_or("<invalid utf-8>")
        }
    }

    // Truncates on a char boundary instead of failing.
    impl fmt::Write for Message {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            let mut n = s.len().min(MSG_BYTES - self.len);
            while !s.is_char_boundary(n) {
                n -= 1;
            }
            self.bytes[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
            self.len += n;
            Ok(())
        }
    }

    /// Single producer (audio thread), single consumer (drain).
    struct Ring {
        write: AtomicUsize,
        read: AtomicUsize,
        slots: Box<[UnsafeCell<Message>]>,
    }

    unsafe impl Sync for Ring {}

    impl Ring {
        fn new() -> Self {
            Self {
                write: AtomicUsize::new(0),
                read: AtomicUsize::new(0),
                slots: (0..SLOTS).map(|_| UnsafeCell::new(Message::EMPTY)).collect(),
            }
        }

        fn push_with(&self, fill: impl FnOnce(&mut Message)) {
            let write = self.write.load(Ordering::Relaxed);
            let next = (write + 1) % SLOTS;
            if next == self.read.load(Ordering::Acquire) {
                // Full: drop the message rather than wait.
                return;
            }
            // Only the producer touches `slots[write]` until `write` is published.
            let slot = unsafe { &mut *self.slots[write].get() };
            slot.len = 0;
            fill(slot);
            self.write.store(next, Ordering::Release);
        }

        fn pop(&self) -> Option<Message> {
            let read = self.read.load(Ordering::Relaxed);
            if read == self.write.load(Ordering::Acquire) {
                return None;
            }
            let msg = unsafe { *self.slots[read].get() };
            self.read.store((read + 1) % SLOTS, Ordering::Release);
            Some(msg)
        }
    }

    static RING: OnceLock<Ring> = OnceLock::new();
    static ENABLED: AtomicBool = AtomicBool::new(false);

    /// Allocates the ring. Call from the configuration path before processing.
    pub fn init_logger() {
        let _ = RING.get_or_init(Ring::new);
        ENABLED.store(true, Ordering::Relaxed);
    }

    pub fn log_args(args: fmt::Arguments) {
        if !ENABLED.load(Ordering::Relaxed) {
            return;
        }
        if let Some(ring) = RING.get() {
            ring.push_with(|msg| {
                let _ = fmt::write(msg, args);
            });
        }
    }

    /// Forward everything queued so far to the `log` facade. Returns how many
    /// messages were forwarded.
    pub fn drain() -> usize {
        let Some(ring) = RING.get() else {
            return 0;
        };
        let mut count = 0;
        while let Some(msg) = ring.pop() {
            if msg.len > 0 {
                log::debug!("[rt] {}", msg.as_str());
                count += 1;
            }
        }
        count
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::fmt::Write;

        #[test]
        fn test_full_ring_drops_then_recovers_after_pop() {
            let ring = Ring::new();
            for i in 0..(SLOTS * 2) {
                ring.push_with(|msg| {
                    let _ = write!(msg, "msg {i}");
                });
            }

            let mut popped = 0;
            while let Some(msg) = ring.pop() {
                assert_eq!(msg.as_str(), format!("msg {popped}"));
                popped += 1;
            }
            assert_eq!(popped, SLOTS - 1);

            ring.push_with(|msg| {
                let _ = write!(msg, "after");
            });
            assert_eq!(ring.pop().map(|m| m.as_str().to_owned()), Some("after".into()));
        }

        #[test]
        fn test_truncation_keeps_utf8_valid() {
            let mut msg = Message::EMPTY;
            let long = "é".repeat(MSG_BYTES);
            let _ = msg.write_str("x");
            let _ = msg.write_str(&long);

            let text = msg.as_str();
            assert_ne!(text, "<invalid utf-8>");
            assert!(text.starts_with("xé"));
            assert_eq!(msg.len, MSG_BYTES - 1);
        }

        #[test]
        fn test_drain_forwards_queued_messages() {
            init_logger();
            let _ = drain();
            for i in 0..5 {
                crate::pc_log!("routing change {}", i);
            }
            // Other tests may log concurrently through the shared ring
            assert!(drain() >= 5);
        }
    }
}

#[cfg(feature = "debug")]
pub(crate) fn pc_log_inner(args: fmt::Arguments) {
    logger::log_args(args);
}

#[cfg(not(feature = "debug"))]
pub(crate) fn pc_log_inner(_args: fmt::Arguments) {}

#[macro_export]
macro_rules! pc_log {
    ($($arg:tt)*) => {
        $crate::debug::pc_log_inner(format_args!($($arg)*))
    };
}
