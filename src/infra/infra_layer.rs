// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "ai/mod.rs"]
pub mod ai;

#[path = "config/config_file.rs"]
pub mod config;

#[path = "email/smtp_transport.rs"]
pub mod email;

#[path = "google/mod.rs"]
pub mod google;

#[path = "modeling/mod.rs"]
pub mod modeling;

#[path = "pipeline/mod.rs"]
pub mod pipeline;
