pub mod executor;
pub mod platform;

pub use executor::*;
pub use platform::*;
