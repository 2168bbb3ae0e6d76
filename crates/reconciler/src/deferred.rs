//! Promise-like values that must be unwrapped before use as children.
//!
//! A `Deferred` is settled at most once; later `resolve`/`reject` calls are
//! ignored. The engine never blocks on one: reading a pending value unwinds the
//! current reconciliation with a `Wakeable` the caller can poll.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum DeferredStatus<T> {
    Pending,
    Fulfilled(T),
    Rejected(Arc<str>),
}

pub struct Deferred<T> {
    inner: Rc<RefCell<DeferredStatus<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Deferred<T> {
    pub fn pending() -> Self {
        Self {
            inner: Rc::new(RefCell::new(DeferredStatus::Pending)),
        }
    }

    pub fn fulfilled(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DeferredStatus::Fulfilled(value))),
        }
    }

    pub fn rejected(reason: impl Into<Arc<str>>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DeferredStatus::Rejected(reason.into()))),
        }
    }

    pub fn resolve(&self, value: T) {
        let mut status = self.inner.borrow_mut();
        if matches!(*status, DeferredStatus::Pending) {
            *status = DeferredStatus::Fulfilled(value);
        }
    }

    pub fn reject(&self, reason: impl Into<Arc<str>>) {
        let mut status = self.inner.borrow_mut();
        if matches!(*status, DeferredStatus::Pending) {
            *status = DeferredStatus::Rejected(reason.into());
        }
    }

    pub fn status(&self) -> DeferredStatus<T> {
        self.inner.borrow().clone()
    }

    pub fn is_settled(&self) -> bool {
        !matches!(*self.inner.borrow(), DeferredStatus::Pending)
    }

    pub fn ptr_eq(&self, other: &Deferred<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Type-erased handle reported when reconciliation suspends on this value.
    pub fn wakeable(&self) -> Wakeable {
        let erased: Rc<dyn Settle> = self.inner.clone();
        Wakeable(erased)
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(status) => f.debug_tuple("Deferred").field(&*status).finish(),
            Err(_) => f.write_str("Deferred(<borrowed>)"),
        }
    }
}

trait Settle {
    fn is_settled(&self) -> bool;
}

impl<T> Settle for RefCell<DeferredStatus<T>> {
    fn is_settled(&self) -> bool {
        !matches!(*self.borrow(), DeferredStatus::Pending)
    }
}

/// Handle to the value a suspended reconciliation is waiting on.
#[derive(Clone)]
pub struct Wakeable(Rc<dyn Settle>);

impl Wakeable {
    pub fn is_settled(&self) -> bool {
        self.0.is_settled()
    }

    pub fn is_for<T: Clone + 'static>(&self, deferred: &Deferred<T>) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&deferred.inner))
    }
}

impl fmt::Debug for Wakeable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wakeable")
            .field("settled", &self.is_settled())
            .finish()
    }
}
