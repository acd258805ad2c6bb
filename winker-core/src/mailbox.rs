//! Single-slot "latest value wins" mailbox.
//!
//! An interrupt-context producer overwrites the slot; one task-context
//! reader drains it. Older values are silently discarded, which is the
//! point: for mode-style data only the current value matters, never the
//! history. The slot and reader waker sit behind a critical-section mutex,
//! so a write can never be observed half-done.

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Poll, Waker};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

struct Slot<T> {
    value: Option<T>,
    waker: Option<Waker>,
}

pub struct Mailbox<T> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Slot<T>>>,
}

impl<T> Mailbox<T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Slot {
                value: None,
                waker: None,
            })),
        }
    }

    /// Store a value, replacing any unread one, and wake the reader.
    /// Callable from any context.
    pub fn put(&self, value: T) {
        self.inner.lock(|cell| {
            let mut slot = cell.borrow_mut();
            slot.value = Some(value);
            if let Some(waker) = slot.waker.take() {
                waker.wake();
            }
        });
    }

    /// Drain the slot without blocking.
    pub fn try_recv(&self) -> Option<T> {
        self.inner.lock(|cell| cell.borrow_mut().value.take())
    }

    /// Drain the slot, suspending until a value arrives.
    ///
    /// Intended for a single reader task; a second concurrent reader would
    /// displace the first one's waker.
    pub async fn recv(&self) -> T {
        poll_fn(|cx| {
            self.inner.lock(|cell| {
                let mut slot = cell.borrow_mut();
                match slot.value.take() {
                    Some(value) => Poll::Ready(value),
                    None => {
                        slot.waker = Some(cx.waker().clone());
                        Poll::Pending
                    }
                }
            })
        })
        .await
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::block_on;

    #[test]
    fn empty_mailbox_is_empty() {
        let mb: Mailbox<u32> = Mailbox::new();
        assert_eq!(mb.try_recv(), None);
    }

    #[test]
    fn second_write_replaces_first() {
        let mb = Mailbox::new();
        mb.put(1u32);
        mb.put(2u32);
        assert_eq!(mb.try_recv(), Some(2));
        assert_eq!(mb.try_recv(), None);
    }

    #[test]
    fn recv_returns_pending_value() {
        let mb = Mailbox::new();
        mb.put(7u32);
        assert_eq!(block_on(mb.recv()), 7);
    }

    #[test]
    fn recv_wakes_on_put() {
        use std::sync::Arc;

        let mb = Arc::new(Mailbox::new());
        let producer = mb.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            producer.put(42u32);
        });

        assert_eq!(block_on(mb.recv()), 42);
        handle.join().unwrap();
    }
}
