//! Test-only helpers.

use core::future::Future;
use core::pin::pin;
use core::task::{Context, Poll};
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Wake, Waker};

struct Parker {
    woken: Mutex<bool>,
    condvar: Condvar,
}

impl Wake for Parker {
    fn wake(self: Arc<Self>) {
        *self.woken.lock().unwrap() = true;
        self.condvar.notify_one();
    }
}

/// Minimal single-future executor, enough to drive the async primitives
/// in unit tests.
pub fn block_on<F: Future>(future: F) -> F::Output {
    let parker = Arc::new(Parker {
        woken: Mutex::new(false),
        condvar: Condvar::new(),
    });
    let waker = Waker::from(parker.clone());
    let mut cx = Context::from_waker(&waker);
    let mut future = pin!(future);
    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(out) => return out,
            Poll::Pending => {
                let mut woken = parker.woken.lock().unwrap();
                while !*woken {
                    woken = parker.condvar.wait(woken).unwrap();
                }
                *woken = false;
            }
        }
    }
}
