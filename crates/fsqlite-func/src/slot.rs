//! Accumulator storage inside engine-owned bucket memory.
//!
//! The engine hands each grouping bucket a zero-filled buffer through
//! `sqlite3_aggregate_context`. We lay a one-byte state tag in front of
//! the accumulator and drive its lifecycle by hand:
//!
//! ```text
//! Uninitialized --(first step)--> Constructed --(step)*--> Accumulating --(finish)--> Finished
//! ```
//!
//! Zero is `Uninitialized`, so a freshly allocated buffer needs no setup.
//! The engine frees the buffer after finish without running any Rust
//! destructor; [`AccumulatorSlot::take`] moves the value out so it drops
//! exactly once.
//!
//! # Preconditions
//!
//! One slot is only ever touched by one call at a time: the engine never
//! re-enters step or finish for the same bucket while a call on that
//! bucket is running.

use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::ptr::NonNull;

use tracing::{trace, warn};

use crate::context::ValueContext;

/// Alignment of memory returned by `sqlite3_aggregate_context`.
pub const SLOT_ALIGN: usize = 8;

/// Lifecycle position of one bucket's accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    Uninitialized = 0,
    Constructed = 1,
    Accumulating = 2,
    Finished = 3,
}

impl SlotState {
    const fn from_tag(tag: u8) -> Self {
        match tag {
            1 => Self::Constructed,
            2 => Self::Accumulating,
            3 => Self::Finished,
            _ => Self::Uninitialized,
        }
    }

    /// Whether the slot currently holds a live accumulator.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Constructed | Self::Accumulating)
    }
}

#[repr(C)]
struct SlotCell<T> {
    tag: u8,
    value: MaybeUninit<T>,
}

/// Typed handle on one bucket's accumulator buffer.
pub struct AccumulatorSlot<'c, T> {
    cell: NonNull<SlotCell<T>>,
    _bucket: PhantomData<&'c mut T>,
}

impl<'c, T: Default> AccumulatorSlot<'c, T> {
    /// Bytes requested from the engine for an accumulator of type `T`.
    pub const SIZE: usize = mem::size_of::<SlotCell<T>>();

    /// Bind to the current bucket's buffer, allocating it on first use.
    ///
    /// Returns `None` if the engine could not allocate the buffer.
    pub fn bind(ctx: &'c ValueContext<'_>) -> Option<Self> {
        const {
            assert!(
                mem::align_of::<SlotCell<T>>() <= SLOT_ALIGN,
                "accumulator alignment exceeds engine allocation alignment"
            );
        }
        let raw = ctx.aggregate_data(Self::SIZE)?;
        Some(Self {
            cell: raw.cast(),
            _bucket: PhantomData,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SlotState {
        // SAFETY: the buffer is at least `SIZE` bytes and suitably aligned.
        SlotState::from_tag(unsafe { (*self.cell.as_ptr()).tag })
    }

    fn set_state(&mut self, state: SlotState) {
        // SAFETY: as in `state`.
        unsafe { (*self.cell.as_ptr()).tag = state as u8 };
    }

    /// The live accumulator, default-constructing it on the first call.
    pub fn get_or_construct(&mut self) -> &mut T {
        match self.state() {
            SlotState::Constructed | SlotState::Accumulating => {}
            SlotState::Uninitialized => self.construct(),
            SlotState::Finished => {
                warn!(
                    target: "fsqlite.func",
                    "step on a finished aggregate bucket; starting a fresh accumulator"
                );
                self.construct();
            }
        }
        // SAFETY: `construct` or an earlier step initialized the value.
        unsafe { (*self.cell.as_ptr()).value.assume_init_mut() }
    }

    /// Run one step against the accumulator and mark it accumulating.
    pub fn step_with<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        let out = f(self.get_or_construct());
        self.set_state(SlotState::Accumulating);
        out
    }

    /// Move the accumulator out and mark the slot finished.
    ///
    /// Returns `None` if no step ever constructed it (or it was already
    /// taken).
    pub fn take(&mut self) -> Option<T> {
        if !self.state().is_live() {
            return None;
        }
        // SAFETY: live state means the value is initialized; the tag flip
        // below makes this the only read-out.
        let value = unsafe { (*self.cell.as_ptr()).value.assume_init_read() };
        self.set_state(SlotState::Finished);
        trace!(target: "fsqlite.func", "accumulator finished");
        Some(value)
    }

    fn construct(&mut self) {
        // SAFETY: the storage is ours and holds no live value.
        unsafe { (*self.cell.as_ptr()).value.write(T::default()) };
        self.set_state(SlotState::Constructed);
        trace!(target: "fsqlite.func", "accumulator constructed");
    }
}
