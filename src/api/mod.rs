pub mod admin;
pub mod attendance;
pub mod funding;
pub mod health;
pub mod payments;
pub mod rules;
