//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates. Host applications can depend on `media-core-workspace`
//! and enable `desktop-shims` to get the [`core_service`] façade with the
//! desktop storage and transport adapters already wired in.

#[cfg(feature = "desktop-shims")]
pub use core_service;
