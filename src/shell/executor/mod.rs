pub mod builtins;
pub mod executor;
pub mod jobs;
pub mod redir;

pub use executor::{ExecContext, Executor};
