//! Interior-mutable storage shared between tasks and cores.
//!
//! Nothing here locks. Soundness rests on the pipeline's ownership
//! protocol, stated at each accessor: task-private state is only touched by
//! its owning task (which the scheduler never runs concurrently with
//! itself) or by reconfiguration code after `deactivate` + `wait_done`;
//! ring storage is partitioned by the atomic cursors, single writer on one
//! side of the split, readers on the other.

use core::cell::UnsafeCell;

/// State owned by exactly one scheduler task.
pub struct TaskCell<T>(UnsafeCell<T>);

unsafe impl<T: Send> Sync for TaskCell<T> {}

impl<T> TaskCell<T> {
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// # Safety
    ///
    /// The caller must be the cell's current owner: either the owning task
    /// mid-run, or a reconfigurer that has stopped the owning task with
    /// `deactivate` + `wait_done`.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get(&self) -> &mut T {
        &mut *self.0.get()
    }

    /// # Safety
    ///
    /// No `get` borrow may be live, and nothing may be writing the cell.
    /// Used by tasks that only read state published to them (a mix task's
    /// scratch handed to the write tasks while the producer is parked).
    pub unsafe fn get_ref(&self) -> &T {
        &*self.0.get()
    }
}

/// Byte storage for a ring, read and written concurrently on disjoint
/// cursor-delimited ranges.
pub struct RingBytes<const N: usize>(UnsafeCell<[u8; N]>);

unsafe impl<const N: usize> Sync for RingBytes<N> {}

impl<const N: usize> RingBytes<N> {
    pub const fn new() -> Self {
        Self(UnsafeCell::new([0; N]))
    }

    /// # Safety
    ///
    /// The caller may only read the range its cursors delimit; bytes
    /// outside it may be mutated concurrently by the ring's writer.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn bytes(&self) -> &[u8] {
        &*self.0.get()
    }

    /// # Safety
    ///
    /// The caller must be the ring's single writer and may only mutate the
    /// free range between the read and write cursors.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn bytes_mut(&self) -> &mut [u8] {
        &mut *self.0.get()
    }
}
