pub mod config_io;
pub mod job_io;
pub mod lock;
pub mod state;
