//! Turnstile - Per-Key Admission Control
//!
//! This crate decides whether a rate limited operation may run. Policies
//! come from inline declarations or flat properties, and admission is
//! enforced with a sliding window log shared through Redis so every process
//! talking to the same instance observes one quota per key.

pub mod config;
pub mod error;
pub mod ratelimit;
