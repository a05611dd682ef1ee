pub mod command;
pub mod service;
pub mod state;
pub mod sweeper;

pub use command::{execute, CommandOutcome, ReservationCommand};
