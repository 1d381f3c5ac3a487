pub mod controller;
pub mod manager;

pub use controller::SessionController;
pub use manager::{Capabilities, SessionManager, SessionSnapshot, Transition};

#[cfg(test)]
mod tests;
