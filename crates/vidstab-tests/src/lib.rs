//! Integration test crate for VidStab.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on every library crate to verify they work together.

#[cfg(test)]
mod synthetic;

#[cfg(test)]
mod stabilize;

#[cfg(test)]
mod smoothing;

#[cfg(test)]
mod encoder;

#[cfg(test)]
mod motion;
