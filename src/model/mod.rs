pub mod config;
pub mod task;
pub mod update;
pub mod workspace;

pub use config::*;
pub use task::*;
pub use update::*;
pub use workspace::*;
