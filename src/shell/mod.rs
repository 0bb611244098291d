pub mod executor;
pub mod expand;
pub mod parser;
mod readline;
pub mod script;
mod shell;
pub mod signals;

pub use shell::Shell;
