use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::command::Command;

/// Failures of the underlying connection. These end the session without
/// the closing `.`/`BYE` exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("client idle for {0:?}")]
    IdleTimeout(Duration),

    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("connection closed by client")]
    Closed,
}

/// The collected fields cannot form an operation.
///
/// Carries every offending field in the order validation checked them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRejected {
    pub fields: Vec<Command>,
}

impl CommandRejected {
    pub fn new(fields: Vec<Command>) -> Self {
        Self { fields }
    }

    pub fn single(cmd: Command) -> Self {
        Self { fields: vec![cmd] }
    }
}

impl fmt::Display for CommandRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cmd) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(cmd.name())?;
        }
        Ok(())
    }
}

impl std::error::Error for CommandRejected {}
