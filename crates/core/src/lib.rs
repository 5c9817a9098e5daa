//! Functional core for authgate.
//!
//! Pure types, traits and functions shared by the I/O crates: provider and
//! session store abstractions, state token generation and validation, and
//! the error taxonomy of an authentication attempt.

pub mod auth;
