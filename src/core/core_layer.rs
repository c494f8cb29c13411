// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "ai/mod.rs"]
pub mod ai;

#[path = "email/mod.rs"]
pub mod email;

#[path = "pipeline/mod.rs"]
pub mod pipeline;

#[path = "workspace/mod.rs"]
pub mod workspace;
