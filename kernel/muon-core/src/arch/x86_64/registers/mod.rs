//! CPU register access.

pub mod control;
pub mod rflags;
