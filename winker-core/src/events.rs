//! Shared event flag group.
//!
//! The single synchronization point between the sensing pipeline and the
//! display tasks: producers (tasks or interrupt handlers) set flags, consumer
//! tasks wait for any of a mask, optionally clearing what they waited for.
//!
//! The flag word and the waiter queue live behind one critical-section mutex,
//! so a flag set between a consumer's clear and its next wait can never be
//! lost: the check-and-register in `wait` is a single atomic step.

use core::cell::RefCell;
use core::future::poll_fn;
use core::ops::{BitAnd, BitOr, BitOrAssign, Not};
use core::task::{Poll, Waker};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

/// Bitmask of named events.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct EventFlags(u32);

impl EventFlags {
    pub const NONE: Self = Self(0);

    /// A frame arrived on the CAN bus (liveness indication only).
    pub const FRAME_RECEIVED: Self = Self(1 << 2);

    pub const TURN_LEFT: Self = Self(1 << 3);
    pub const TURN_RIGHT: Self = Self(1 << 4);
    pub const TURN_BACK: Self = Self(1 << 5);

    pub const MODE_UP: Self = Self(1 << 6);
    pub const MODE_DOWN: Self = Self(1 << 7);
    pub const MODE_STOP: Self = Self(1 << 8);

    /// The mutually exclusive dot-panel mode flags.
    pub const MODE_MASK: Self = Self(Self::MODE_UP.0 | Self::MODE_DOWN.0 | Self::MODE_STOP.0);

    pub const TURN_MASK: Self =
        Self(Self::TURN_LEFT.0 | Self::TURN_RIGHT.0 | Self::TURN_BACK.0);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for EventFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for EventFlags {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl defmt::Format for EventFlags {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "EventFlags({=u32:#x})", self.0);
    }
}

// More tasks than this never wait concurrently; if the queue still fills,
// everyone is woken and re-registers on the next poll.
const MAX_WAITERS: usize = 4;

struct Inner {
    flags: EventFlags,
    waiters: Vec<Waker, MAX_WAITERS>,
}

/// Interrupt-safe group of event flags with task-context waiting.
pub struct EventGroup {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Inner>>,
}

impl EventGroup {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                flags: EventFlags::NONE,
                waiters: Vec::new(),
            })),
        }
    }

    fn wake_all(inner: &mut Inner) {
        while let Some(waker) = inner.waiters.pop() {
            waker.wake();
        }
    }

    /// Set flags. Callable from any context, including interrupt handlers.
    pub fn set(&self, flags: EventFlags) {
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            inner.flags |= flags;
            Self::wake_all(&mut inner);
        });
    }

    /// Clear flags without waking anyone.
    pub fn clear(&self, flags: EventFlags) {
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            inner.flags = inner.flags & !flags;
        });
    }

    /// Snapshot of the current flag word.
    pub fn get(&self) -> EventFlags {
        self.inner.lock(|cell| cell.borrow().flags)
    }

    /// Atomically clear every flag in `mask`, then set `flags`.
    ///
    /// Used to keep mutually exclusive flag sets (the dot-panel modes)
    /// consistent against concurrent producers.
    pub fn replace(&self, mask: EventFlags, flags: EventFlags) {
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            inner.flags = (inner.flags & !mask) | flags;
            Self::wake_all(&mut inner);
        });
    }

    /// Wait until any flag in `mask` is set. Resolves to the full flag word
    /// observed at that moment; with `clear_on_exit` the `mask` bits are
    /// cleared as part of the same atomic step.
    ///
    /// Task context only. Callers bound the wait with a monotonic timeout
    /// where needed.
    pub async fn wait(&self, mask: EventFlags, clear_on_exit: bool) -> EventFlags {
        poll_fn(move |cx| {
            self.inner.lock(|cell| {
                let mut inner = cell.borrow_mut();
                let observed = inner.flags;
                if observed.intersects(mask) {
                    if clear_on_exit {
                        inner.flags = observed & !mask;
                    }
                    return Poll::Ready(observed);
                }
                if !inner.waiters.iter().any(|w| w.will_wake(cx.waker())) {
                    if let Err(waker) = inner.waiters.push(cx.waker().clone()) {
                        // Queue full: wake everyone so the displaced
                        // waiters re-register themselves.
                        Self::wake_all(&mut inner);
                        let _ = inner.waiters.push(waker);
                    }
                }
                Poll::Pending
            })
        })
        .await
    }
}

impl Default for EventGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::block_on;

    #[test]
    fn set_get_clear() {
        let group = EventGroup::new();
        assert_eq!(group.get(), EventFlags::NONE);

        group.set(EventFlags::TURN_LEFT | EventFlags::FRAME_RECEIVED);
        assert!(group.get().contains(EventFlags::TURN_LEFT));
        assert!(group.get().intersects(EventFlags::FRAME_RECEIVED));

        group.clear(EventFlags::TURN_LEFT);
        assert!(!group.get().intersects(EventFlags::TURN_LEFT));
        assert!(group.get().intersects(EventFlags::FRAME_RECEIVED));
    }

    #[test]
    fn replace_keeps_unrelated_flags() {
        let group = EventGroup::new();
        group.set(EventFlags::MODE_STOP | EventFlags::TURN_RIGHT);

        group.replace(EventFlags::MODE_MASK, EventFlags::MODE_UP);

        let flags = group.get();
        assert!(flags.contains(EventFlags::MODE_UP));
        assert!(!flags.intersects(EventFlags::MODE_STOP));
        assert!(flags.contains(EventFlags::TURN_RIGHT));
    }

    #[test]
    fn wait_returns_immediately_when_set() {
        let group = EventGroup::new();
        group.set(EventFlags::TURN_BACK);

        let observed = block_on(group.wait(EventFlags::TURN_MASK, true));
        assert!(observed.contains(EventFlags::TURN_BACK));
        // Auto-clear consumed the turn flags.
        assert_eq!(group.get(), EventFlags::NONE);
    }

    #[test]
    fn wait_without_clear_leaves_flags() {
        let group = EventGroup::new();
        group.set(EventFlags::MODE_DOWN);

        block_on(group.wait(EventFlags::MODE_MASK, false));
        assert!(group.get().contains(EventFlags::MODE_DOWN));
    }

    #[test]
    fn wait_wakes_on_later_set() {
        use std::sync::Arc;

        let group = Arc::new(EventGroup::new());
        let producer = group.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            producer.set(EventFlags::TURN_LEFT);
        });

        let observed = block_on(group.wait(EventFlags::TURN_MASK, true));
        assert!(observed.contains(EventFlags::TURN_LEFT));
        handle.join().unwrap();
    }

    #[test]
    fn clear_then_wait_does_not_lose_concurrent_set() {
        // A consumer that clears and immediately re-waits must still see a
        // flag set in between: the set either lands before the wait's check
        // (observed right away) or after (wakes the registered waiter).
        let group = EventGroup::new();
        group.set(EventFlags::MODE_UP);
        let observed = block_on(group.wait(EventFlags::MODE_MASK, true));
        assert!(observed.contains(EventFlags::MODE_UP));

        group.set(EventFlags::MODE_UP);
        let observed = block_on(group.wait(EventFlags::MODE_MASK, true));
        assert!(observed.contains(EventFlags::MODE_UP));
    }
}
