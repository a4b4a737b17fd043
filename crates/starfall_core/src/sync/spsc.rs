//! # SPSC Ring Buffer
//!
//! Bounded, lock-free, single-producer/single-consumer queue.
//!
//! ## Safety Note
//!
//! This module requires unsafe code for the slot storage. Every unsafe block
//! relies on the same invariant, stated at the block.

#![allow(unsafe_code)]

//! ## Layout
//!
//! ```text
//!            head (consumer)          tail (producer)
//!                 │                         │
//!   ┌─────┬─────┬─▼───┬─────┬─────┬─────┬──▼──┬─────┐
//!   │     │     │  A  │  B  │  C  │  D  │     │     │   capacity = 8
//!   └─────┴─────┴─────┴─────┴─────┴─────┴─────┴─────┘
//!
//!   len = tail - head   (wrapping, counters never reset)
//!   slot(pos) = pos % capacity
//! ```
//!
//! - Only the producer writes `tail`; only the consumer writes `head`
//! - A full queue rejects the new item (drop-newest); nothing blocks
//! - Items left in the buffer are dropped with the last handle

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Inner<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Next position to read. Written by the consumer only.
    head: AtomicUsize,
    /// Next position to write. Written by the producer only.
    tail: AtomicUsize,
}

// SAFETY: a slot is accessed by exactly one side at a time. The producer owns
// slots in [tail, head + capacity) and the consumer owns [head, tail); the
// Release/Acquire pair on head/tail hands a slot over together with its data.
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Inner<T> {
    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn slot(&self, pos: usize) -> &UnsafeCell<MaybeUninit<T>> {
        &self.slots[pos % self.slots.len()]
    }

    #[inline]
    fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        let mut pos = head;
        while pos != tail {
            // SAFETY: positions in [head, tail) hold initialized values and
            // no handle is left to observe them.
            unsafe { self.slot(pos).get().cast::<T>().drop_in_place() };
            pos = pos.wrapping_add(1);
        }
    }
}

/// Creates a queue holding at most `capacity` items.
///
/// # Panics
///
/// Panics if capacity is zero.
#[must_use]
pub fn spsc_queue<T: Send>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(capacity > 0, "Capacity must be greater than zero");

    let slots = (0..capacity)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect::<Vec<_>>()
        .into_boxed_slice();
    let inner = Arc::new(Inner {
        slots,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
    });

    (
        Producer {
            inner: Arc::clone(&inner),
            dropped: 0,
        },
        Consumer { inner },
    )
}

/// Sending half. Not cloneable: there is exactly one producer.
pub struct Producer<T> {
    inner: Arc<Inner<T>>,
    dropped: u64,
}

impl<T> Producer<T> {
    /// Attempts to enqueue `value`, handing it back if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` when the queue is full.
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        let tail = self.inner.tail.load(Ordering::Relaxed);
        let head = self.inner.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) == self.inner.capacity() {
            return Err(value);
        }

        // SAFETY: the queue is not full, so the slot at `tail` is owned by
        // the producer until `tail` is published below.
        unsafe { (*self.inner.slot(tail).get()).write(value) };
        self.inner.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Enqueues `value`, dropping it when the queue is full.
    ///
    /// Returns `false` if the value was dropped. Overflow is logged on the
    /// first drop and every power of two afterwards.
    pub fn push(&mut self, value: T) -> bool {
        if self.try_push(value).is_ok() {
            return true;
        }
        self.dropped += 1;
        if self.dropped.is_power_of_two() {
            tracing::warn!(
                capacity = self.inner.capacity(),
                dropped = self.dropped,
                "queue full, dropping newest item"
            );
        }
        false
    }

    /// Total items dropped by [`Producer::push`].
    #[inline]
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Number of queued items (a snapshot; the consumer may be popping).
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued items.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

impl<T> std::fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("dropped", &self.dropped)
            .finish()
    }
}

/// Receiving half. Not cloneable: there is exactly one consumer.
pub struct Consumer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Consumer<T> {
    /// Dequeues the oldest item, or `None` if the queue is empty.
    pub fn pop(&mut self) -> Option<T> {
        let head = self.inner.head.load(Ordering::Relaxed);
        let tail = self.inner.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }

        // SAFETY: head != tail, so the slot at `head` was initialized by the
        // producer and published by its Release store to `tail`.
        let value = unsafe { (*self.inner.slot(head).get()).assume_init_read() };
        self.inner.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Pops items until the queue is empty.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.pop())
    }

    /// Number of queued items.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued items.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

impl<T> std::fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
