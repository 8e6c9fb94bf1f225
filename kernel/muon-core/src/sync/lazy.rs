//! Lazy initialization primitive for `no_std`.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ops::Deref;
use core::sync::atomic::{AtomicU8, Ordering};

const UNINIT: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

/// A value that is initialized on first access.
///
/// A `no_std` counterpart of `std::sync::LazyLock`, using a spin-based
/// atomic state machine: if two contexts race to initialize, one runs the
/// closure and the other spins until the value is ready.
pub struct LazyLock<T, F = fn() -> T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
    init: UnsafeCell<Option<F>>,
}

// SAFETY: The state machine guarantees the value is fully written before any
// reader observes READY, and that the init closure is consumed exactly once.
unsafe impl<T: Send + Sync, F: Send> Send for LazyLock<T, F> {}
unsafe impl<T: Send + Sync, F: Send> Sync for LazyLock<T, F> {}

impl<T, F: FnOnce() -> T> LazyLock<T, F> {
    /// Creates a new `LazyLock` with the given initializer.
    pub const fn new(init: F) -> Self {
        Self {
            state: AtomicU8::new(UNINIT),
            value: UnsafeCell::new(MaybeUninit::uninit()),
            init: UnsafeCell::new(Some(init)),
        }
    }

    /// Forces initialization and returns a reference to the value.
    pub fn force(&self) -> &T {
        match self
            .state
            .compare_exchange(UNINIT, INITIALIZING, Ordering::Acquire, Ordering::Acquire)
        {
            Ok(_) => {
                // We won the race: run the initializer.
                // SAFETY: The INITIALIZING state gives us exclusive access to
                // both cells.
                let init = unsafe { (*self.init.get()).take() }
                    .expect("LazyLock initializer already consumed");
                let value = init();
                unsafe { (*self.value.get()).write(value) };
                self.state.store(READY, Ordering::Release);
            }
            Err(READY) => {}
            Err(_) => {
                // Another context is initializing; wait for it.
                while self.state.load(Ordering::Acquire) != READY {
                    core::hint::spin_loop();
                }
            }
        }

        // SAFETY: State is READY, so the value is initialized.
        unsafe { (*self.value.get()).assume_init_ref() }
    }
}

impl<T, F: FnOnce() -> T> Deref for LazyLock<T, F> {
    type Target = T;

    fn deref(&self) -> &T {
        self.force()
    }
}
