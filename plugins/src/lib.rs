pub mod factory;
pub mod platform;
