use dual_ur5_controller::{commander::CommanderError, trajectory_dataset::DatasetError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DemoError {
    #[error("demo interrupted")]
    Interrupted,
    #[error("input closed")]
    InputClosed,
    #[error("failed to read input")]
    InputError(#[from] std::io::Error),
    #[error("commander error")]
    CommanderError(#[source] CommanderError),
    #[error("failed to store trajectory")]
    DatasetError(#[from] DatasetError),
}

impl From<CommanderError> for DemoError {
    fn from(error: CommanderError) -> Self {
        match error {
            CommanderError::Interrupted => DemoError::Interrupted,
            other => DemoError::CommanderError(other),
        }
    }
}

impl DemoError {
    /// Interrupts and closed input end the demo without reporting failure
    pub fn is_user_exit(&self) -> bool {
        matches!(self, DemoError::Interrupted | DemoError::InputClosed)
    }
}
