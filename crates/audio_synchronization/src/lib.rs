//! Primitives for synchronization between a real-time caller and the rest of the world.
//!
//! This crate provides mechanisms whereby a real-time thread can communicate with other threads without ever entering
//! the kernel or blocking for an unbounded amount of time.  Generally, synchronization primitives optimize for memory
//! usage or performance, but the important feature for a real-time application is that the real-time half of a
//! communication process is never blocked.

pub mod fast_thread_id;
pub mod generational_atomic;
pub mod mpsc_counter;
pub mod optional_atomic_u32;
pub mod sync;
