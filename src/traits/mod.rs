//! Trait abstractions for the crate's external seams.
//!
//! The identity provider and the host's navigation facility are injected
//! behind traits, enabling dependency injection and mocking in tests.

pub mod identity;
pub mod navigator;

pub use identity::{Identity, IdentityProvider, TokenSource};
pub use navigator::{Navigator, View};
