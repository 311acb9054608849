//! Membership Reconciliation
//!
//! Compares each tick's live membership against the durable peer registry to
//! find which nodes joined and which left, then folds the snapshot into the
//! registry.

pub mod reconciler;
pub mod registry;
