//! Line-oriented protocol shell for formica.

pub mod command;
pub mod error;
pub mod shell;

pub use command::{Command, GoClocks, PositionSetup, parse_command};
pub use error::ProtocolError;
pub use shell::Shell;
