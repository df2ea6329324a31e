//! End-to-end tests for the patch generation pipeline.
//!
//! Package managers are replaced by [`support::FakeInstaller`], which copies
//! packages out of an on-disk fixture registry. git is the real binary.

mod naming;
mod pipeline;
mod support;
