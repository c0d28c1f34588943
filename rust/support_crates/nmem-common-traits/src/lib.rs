//! Traits and definitions shared by the nmem crates.
//!
//! # Modules
//!
//! - [`memory_owner`]: Traits for exposing foreign-allocated memory to native calls
//!   without transferring ownership
pub mod memory_owner;
