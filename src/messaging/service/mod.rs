//! Validated entry points over the messaging stores.

pub mod talk_service;

pub use talk_service::{TalkBackends, TalkRoom, TalkService};
