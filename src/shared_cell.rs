//! Shared cell.
//!
//! A fixed-size, page-backed, anonymous `MAP_SHARED` mapping that stays
//! visible to any process forked after it was created. Used to hold one
//! `TestEnv` per scheduler slot so a child can mutate it and the parent can
//! observe the final contents after the child exits.
//!
//! The mapped type must be POD: only primitive fields and fixed-size arrays
//! of primitives, since no destructor on the child's side will ever run for
//! it and no pointer inside it can be dereferenced across the fork boundary.

use std::io;
use std::marker::PhantomData;
use std::ptr::NonNull;

#[cfg(feature = "fork")]
use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
#[cfg(feature = "fork")]
use std::num::NonZeroUsize;

/// A POD-backed region shared between a process and any children it forks
/// after the cell is created.
///
/// Non-copyable, movable only by holding it behind an owner that doesn't
/// relocate the underlying mapping (in practice, a `Vec<SharedCell<T>>`
/// built once at scheduler startup and never reallocated).
pub struct SharedCell<T> {
    ptr: NonNull<T>,
    len_bytes: usize,
    _marker: PhantomData<T>,
}

// The whole point of a SharedCell is cross-process sharing; within a single
// process it is also safe to hand the pointer across threads; the runner's
// own synchronization (fork/reap barriers) guarantees no concurrent access.
unsafe impl<T> Send for SharedCell<T> {}
unsafe impl<T> Sync for SharedCell<T> {}

impl<T: Default> SharedCell<T> {
    /// Maps a new zero-initialized region sized to hold one `T`.
    #[cfg(feature = "fork")]
    pub fn new() -> io::Result<Self> {
        let len = std::mem::size_of::<T>().max(1);
        let len = NonZeroUsize::new(len).unwrap();
        let ptr = unsafe {
            mmap_anonymous(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
            )
        }
        .map_err(|e| io::Error::from_raw_os_error(e as i32))?;
        let ptr: NonNull<T> = ptr.cast();
        unsafe {
            ptr.as_ptr().write(T::default());
        }
        Ok(SharedCell {
            ptr,
            len_bytes: len.get(),
            _marker: PhantomData,
        })
    }

    /// Non-forking builds have no cross-process sharing to do; a plain heap
    /// allocation behaves identically from the single-process caller's view.
    #[cfg(not(feature = "fork"))]
    pub fn new() -> io::Result<Self> {
        let boxed = Box::new(T::default());
        let ptr = NonNull::new(Box::into_raw(boxed)).unwrap();
        Ok(SharedCell {
            ptr,
            len_bytes: std::mem::size_of::<T>(),
            _marker: PhantomData,
        })
    }
}

impl<T> SharedCell<T> {
    /// Raw pointer to the shared region. Valid in both parent and any child
    /// forked after creation (forking mode); valid only in the current
    /// process otherwise.
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// # Safety
    /// The caller must not alias this reference with a concurrent write from
    /// another process; the runner enforces that by only reading after a
    /// `waitpid` barrier for the owning child.
    pub unsafe fn as_ref(&self) -> &T {
        &*self.ptr.as_ptr()
    }

    /// # Safety
    /// Same requirement as `as_ref`, plus exclusivity: only the process
    /// currently running the test body should call this.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut(&self) -> &mut T {
        &mut *self.ptr.as_ptr()
    }
}

impl<T> Drop for SharedCell<T> {
    fn drop(&mut self) {
        #[cfg(feature = "fork")]
        unsafe {
            let _ = munmap(self.ptr.cast(), self.len_bytes);
        }
        #[cfg(not(feature = "fork"))]
        unsafe {
            drop(Box::from_raw(self.ptr.as_ptr()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    #[repr(C)]
    struct Pod {
        a: u32,
        b: [u8; 8],
    }

    #[test]
    fn round_trips_writes() {
        let cell = SharedCell::<Pod>::new().expect("map");
        unsafe {
            cell.as_mut().a = 42;
            cell.as_mut().b[0] = 7;
        }
        unsafe {
            assert_eq!(cell.as_ref().a, 42);
            assert_eq!(cell.as_ref().b[0], 7);
        }
    }
}
