pub mod device;
pub mod notification;
pub mod preference;
pub mod recipient;
pub mod user;
