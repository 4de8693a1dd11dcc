pub mod cleanup;
pub mod reminders;
pub mod retry;
pub mod sender;
