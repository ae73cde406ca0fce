//! Display helpers for talk room views.

pub mod elapsed;

pub use elapsed::Elapsed;
