pub mod config;
pub mod queue;
pub mod records;
pub mod result;
pub mod summary;
pub mod task;

pub use config::*;
pub use queue::*;
pub use records::*;
pub use result::*;
pub use summary::*;
pub use task::*;
