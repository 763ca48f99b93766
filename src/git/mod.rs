//! Git integration layer.
//!
//! This module wraps the actual backend implementation (`subprocess`)
//! and re-exports only the stable public API.
//!
//! All repository access goes through the external `git` executable; nothing
//! in this crate speaks the git protocol itself. Hiding the backend behind
//! this facade keeps the call sites free of subprocess details.

mod subprocess;

pub use subprocess::{capture, check};
