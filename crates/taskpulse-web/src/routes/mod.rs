//! Route handlers.

pub mod internal;
