//! QR-based attendance verification: compact identity tokens, volunteer
//! scanning sessions granted through invitation codes, live roster
//! resolution, and idempotent attendance marking.

pub mod cache;
pub mod core;
pub mod error;
pub mod token;
pub mod web;
