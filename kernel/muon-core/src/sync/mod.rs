//! Synchronization primitives for the kernel.
//!
//! Provides [`SpinLock`], [`IrqSpinLock`], and [`LazyLock`], all suitable
//! for `static` items and usable before any allocator is available.
//!
//! Spinlocks here guard short, non-sleeping critical sections only. Code
//! that may cross a scheduling boundary must release its locks first.

mod irq_spinlock;
mod lazy;
mod spinlock;

pub use irq_spinlock::{IrqSpinLock, IrqSpinLockGuard};
pub use lazy::LazyLock;
pub use spinlock::{SpinLock, SpinLockGuard};
