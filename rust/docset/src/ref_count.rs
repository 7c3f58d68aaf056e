//! Atomic reference counting with exactly-once release.
//!
//! A [`RefCount`] starts at 1 and moves only through compare-and-swap
//! transitions. Once it reaches zero it never becomes positive again, which
//! is what makes the release at the 1 → 0 transition happen exactly once even
//! when several owners race.
//!
//! [`RefCounted`] pairs a count with a payload that is dropped at that
//! transition. Most code should not touch it directly and should use the
//! [`Shared`] handle instead: cloning a handle increments the count, dropping
//! it decrements, and the payload goes away with the last handle. A
//! [`WeakShared`] keeps the control block reachable without holding a
//! reference, so a lookup that races with the final release can fail cleanly
//! through [`RefCount::try_incref`] instead of resurrecting a dead object.

use std::{
    cell::UnsafeCell,
    mem::ManuallyDrop,
    ops::Deref,
    sync::{
        Arc,
        atomic::{AtomicI32, Ordering},
    },
};

/// A reference count that starts at 1 and is released once, at zero.
#[derive(Debug)]
pub struct RefCount(AtomicI32);

impl RefCount {
    pub const fn new() -> RefCount {
        RefCount(AtomicI32::new(1))
    }

    pub fn get(&self) -> i32 {
        self.0.load(Ordering::Acquire)
    }

    pub fn is_alive(&self) -> bool {
        self.get() > 0
    }

    /// Increments the count and returns the new value.
    ///
    /// # Panics
    ///
    /// Panics if the count already reached zero: the object was released and
    /// must not be revived.
    pub fn incref(&self) -> i32 {
        match self.increment() {
            Some(count) => count,
            None => panic!("attempted to incref a released object"),
        }
    }

    /// Increments the count unless the object was already released.
    pub fn try_incref(&self) -> bool {
        self.increment().is_some()
    }

    /// Decrements the count and returns the new value. A result of zero means
    /// the caller performed the final release.
    ///
    /// # Panics
    ///
    /// Panics if the count is already zero (more decrefs than references).
    pub fn decref(&self) -> i32 {
        match self.decrement() {
            Some(count) => count,
            None => panic!("too many decrefs"),
        }
    }

    /// Like [`decref`](Self::decref), returning `None` instead of panicking
    /// when the object was already released.
    pub fn try_decref(&self) -> Option<i32> {
        self.decrement()
    }

    fn increment(&self) -> Option<i32> {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            if current <= 0 {
                return None;
            }
            match self.0.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(current + 1),
                Err(actual) => current = actual,
            }
        }
    }

    fn decrement(&self) -> Option<i32> {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            if current <= 0 {
                return None;
            }
            match self.0.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(current - 1),
                Err(actual) => current = actual,
            }
        }
    }

    /// Moves the count from exactly 1 to 0 without a release.
    fn claim_unique(&self) -> bool {
        self.0
            .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

/// A value whose lifetime is governed by a [`RefCount`].
///
/// The value is dropped inside the [`decref`](Self::decref) call that moves
/// the count to zero. If the container itself is dropped while the count is
/// still positive, the value is dropped then.
pub struct RefCounted<T> {
    count: RefCount,
    value: UnsafeCell<ManuallyDrop<T>>,
}

// Shared access only ever yields `&T`; the single `&mut` use happens at release,
// when no reference can be outstanding.
unsafe impl<T: Send + Sync> Send for RefCounted<T> {}
unsafe impl<T: Send + Sync> Sync for RefCounted<T> {}

impl<T> RefCounted<T> {
    pub fn new(value: T) -> RefCounted<T> {
        RefCounted {
            count: RefCount::new(),
            value: UnsafeCell::new(ManuallyDrop::new(value)),
        }
    }

    pub fn ref_count(&self) -> i32 {
        self.count.get()
    }

    pub fn is_alive(&self) -> bool {
        self.count.is_alive()
    }

    /// See [`RefCount::incref`].
    pub fn incref(&self) -> i32 {
        self.count.incref()
    }

    /// See [`RefCount::try_incref`].
    pub fn try_incref(&self) -> bool {
        self.count.try_incref()
    }

    /// Gives up one reference, dropping the value if it was the last one.
    ///
    /// # Safety
    ///
    /// The caller must own one of the counted references and must not access
    /// the value through it afterwards.
    pub unsafe fn decref(&self) -> i32 {
        let count = self.count.decref();
        if count == 0 {
            unsafe { self.release() };
        }
        count
    }

    /// Like [`decref`](Self::decref), returning `false` instead of panicking
    /// when the value was already released.
    ///
    /// # Safety
    ///
    /// Same as [`decref`](Self::decref).
    pub unsafe fn try_decref(&self) -> bool {
        match self.count.try_decref() {
            Some(0) => {
                unsafe { self.release() };
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// # Safety
    ///
    /// The caller must hold a counted reference for as long as the returned
    /// borrow lives.
    pub unsafe fn get(&self) -> &T {
        unsafe { &*self.value.get() }
    }

    unsafe fn release(&self) {
        unsafe { ManuallyDrop::drop(&mut *self.value.get()) };
    }
}

impl<T> Drop for RefCounted<T> {
    fn drop(&mut self) {
        if *self.count.0.get_mut() > 0 {
            unsafe { ManuallyDrop::drop(self.value.get_mut()) };
        }
    }
}

impl<T> std::fmt::Debug for RefCounted<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefCounted")
            .field("count", &self.ref_count())
            .finish_non_exhaustive()
    }
}

/// An owning handle to a [`RefCounted`] value.
///
/// `Clone` increments the count, `Drop` decrements it; the value is released
/// when the last handle goes away.
pub struct Shared<T> {
    inner: Arc<RefCounted<T>>,
}

impl<T> Shared<T> {
    pub fn new(value: T) -> Shared<T> {
        Shared {
            inner: Arc::new(RefCounted::new(value)),
        }
    }

    /// Current number of counted references.
    pub fn ref_count(this: &Self) -> i32 {
        this.inner.ref_count()
    }

    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    pub fn downgrade(this: &Self) -> WeakShared<T> {
        WeakShared {
            inner: this.inner.clone(),
        }
    }

    /// Takes the value out if `this` is the only reference; otherwise hands
    /// the handle back.
    pub fn try_unwrap(this: Self) -> Result<T, Self> {
        if !this.inner.count.claim_unique() {
            return Err(this);
        }
        let this = ManuallyDrop::new(this);
        // The count went 1 -> 0 through this handle: no other handle exists and
        // no weak upgrade can succeed, so the value can be moved out. The
        // control block's own drop sees a zero count and leaves the value alone.
        let inner = unsafe { std::ptr::read(&this.inner) };
        let value = unsafe { ManuallyDrop::take(&mut *inner.value.get()) };
        Ok(value)
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        self.inner.incref();
        Shared {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        unsafe { self.inner.decref() };
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.inner.get() }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("count", &self.inner.ref_count())
            .field("value", &**self)
            .finish()
    }
}

/// A non-owning reference to a [`Shared`] value.
pub struct WeakShared<T> {
    inner: Arc<RefCounted<T>>,
}

impl<T> WeakShared<T> {
    /// Returns a new handle, or `None` if the value was already released.
    pub fn upgrade(&self) -> Option<Shared<T>> {
        self.inner.try_incref().then(|| Shared {
            inner: self.inner.clone(),
        })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }
}

impl<T> Clone for WeakShared<T> {
    fn clone(&self) -> Self {
        WeakShared {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for WeakShared<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakShared")
            .field("count", &self.inner.ref_count())
            .finish()
    }
}
