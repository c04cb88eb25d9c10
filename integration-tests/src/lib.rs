//! Subsystems shared by the cross-crate tests.

pub mod mechanics;
