pub mod jobs;
pub mod orders;
pub mod server_actions;
pub mod webhooks;
