//! Single-shot, cancellable results that resolve on a later frame.
//!
//! A [`Resolver`] and its [`Pending`] share one slot. The producer resolves
//! when the data lands; the consumer polls once per frame (or awaits). Either
//! side going away is observable from the other: a dropped `Pending` cancels
//! the slot so the producer can skip work, a dropped `Resolver` makes the
//! consumer see [`ReadbackError::Lost`].

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadbackError {
    #[error("the request was cancelled before it completed")]
    Cancelled,
    #[error("the producer went away without a result")]
    Lost,
}

enum Slot<T> {
    Waiting(Option<Waker>),
    Ready(T),
    Failed(ReadbackError),
    Taken,
}

struct Shared<T> {
    slot: Slot<T>,
    cancelled: bool,
}

/// Creates a connected resolver/future pair.
pub fn pending<T>() -> (Resolver<T>, Pending<T>) {
    let shared = Rc::new(RefCell::new(Shared {
        slot: Slot::Waiting(None),
        cancelled: false,
    }));
    (
        Resolver {
            shared: Rc::clone(&shared),
        },
        Pending { shared },
    )
}

pub struct Resolver<T> {
    shared: Rc<RefCell<Shared<T>>>,
}

impl<T> Resolver<T> {
    /// Delivers the value. Discarded if the consumer cancelled.
    pub fn resolve(self, value: T) {
        self.finish(Slot::Ready(value));
    }

    pub fn fail(self, error: ReadbackError) {
        self.finish(Slot::Failed(error));
    }

    /// Cancels on the producer side, e.g. when the provider is swapped out.
    pub fn cancel(self) {
        cancel_shared(&self.shared);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.borrow().cancelled
    }

    fn finish(&self, outcome: Slot<T>) {
        let mut shared = self.shared.borrow_mut();
        if shared.cancelled {
            return;
        }
        if let Slot::Waiting(Some(waker)) = std::mem::replace(&mut shared.slot, outcome) {
            waker.wake();
        }
    }
}

impl<T> Drop for Resolver<T> {
    fn drop(&mut self) {
        let mut shared = self.shared.borrow_mut();
        if let Slot::Waiting(waker) = &mut shared.slot {
            let waker = waker.take();
            shared.slot = Slot::Failed(ReadbackError::Lost);
            if let Some(waker) = waker {
                waker.wake();
            }
        }
    }
}

pub struct Pending<T> {
    shared: Rc<RefCell<Shared<T>>>,
}

impl<T> Pending<T> {
    /// An already-resolved value, used by synchronous providers.
    pub fn ready(value: T) -> Self {
        let (resolver, pending) = pending();
        resolver.resolve(value);
        pending
    }

    pub fn cancel(&self) {
        cancel_shared(&self.shared);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.borrow().cancelled
    }

    pub fn is_ready(&self) -> bool {
        matches!(
            self.shared.borrow().slot,
            Slot::Ready(_) | Slot::Failed(_)
        )
    }

    /// Takes the result if it has arrived. Returns `Pending` while waiting.
    pub fn try_take(&mut self) -> Poll<Result<T, ReadbackError>> {
        let mut shared = self.shared.borrow_mut();
        match std::mem::replace(&mut shared.slot, Slot::Taken) {
            Slot::Ready(value) => Poll::Ready(Ok(value)),
            Slot::Failed(error) => Poll::Ready(Err(error)),
            Slot::Taken if shared.cancelled => Poll::Ready(Err(ReadbackError::Cancelled)),
            Slot::Taken => Poll::Ready(Err(ReadbackError::Lost)),
            waiting @ Slot::Waiting(_) => {
                shared.slot = waiting;
                Poll::Pending
            }
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T, ReadbackError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.try_take() {
            Poll::Pending => {
                if let Slot::Waiting(waker) = &mut this.shared.borrow_mut().slot {
                    *waker = Some(cx.waker().clone());
                }
                Poll::Pending
            }
            ready => ready,
        }
    }
}

impl<T> Drop for Pending<T> {
    fn drop(&mut self) {
        if matches!(self.shared.borrow().slot, Slot::Waiting(_)) {
            cancel_shared(&self.shared);
        }
    }
}

fn cancel_shared<T>(shared: &RefCell<Shared<T>>) {
    let mut shared = shared.borrow_mut();
    if shared.cancelled {
        return;
    }
    shared.cancelled = true;
    // An unread value is discarded as well.
    match std::mem::replace(&mut shared.slot, Slot::Failed(ReadbackError::Cancelled)) {
        Slot::Waiting(Some(waker)) => waker.wake(),
        Slot::Taken => shared.slot = Slot::Taken,
        _ => {}
    }
}

/// Polls a pending value exactly once without blocking.
pub fn poll_now<T>(pending: &mut Pending<T>) -> Option<Result<T, ReadbackError>> {
    futures_lite::future::block_on(futures_lite::future::poll_once(pending))
}
