pub mod admin;
pub mod common;
pub mod court;
pub mod health;
pub mod matches;
pub mod queue;
pub mod validation;
pub mod ws;
