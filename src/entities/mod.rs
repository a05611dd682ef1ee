pub mod admin_log;
pub mod booking;
pub mod location;
pub mod trip;
pub mod user;
