// Console layer - terminal front-ends.
// - `design_chat.rs` is the interactive design pipeline chat.
// - `email_command.rs` and `drive_command.rs` are operator checks for SMTP and Drive.

#[path = "design_chat.rs"]
pub mod design_chat;

#[path = "drive_command.rs"]
pub mod drive_command;

#[path = "email_command.rs"]
pub mod email_command;

pub use design_chat::DesignChat;
pub use drive_command::{run_drive_test, DriveArgs};
pub use email_command::{run_send_email, EmailArgs};
