use crate::error::DemoError;
use async_std::io;
use async_trait::async_trait;
use dual_ur5_controller::shutdown::ShutdownSignal;
use std::time::Duration;
use tokio::time::sleep;

/// Gate between demo steps
#[async_trait]
pub trait Prompt: Send {
    async fn confirm(&mut self, message: &str) -> Result<(), DemoError>;
}

/// Waits for the operator to press enter
///
/// Closing stdin (Ctrl+D) ends the demo.
pub struct StdinPrompt {
    shutdown: ShutdownSignal,
}

impl StdinPrompt {
    pub fn new(shutdown: ShutdownSignal) -> Self {
        Self { shutdown }
    }
}

async fn wait_for_shutdown(shutdown: &ShutdownSignal) {
    while !shutdown.is_shutdown() {
        sleep(Duration::from_millis(100)).await;
    }
}

#[async_trait]
impl Prompt for StdinPrompt {
    async fn confirm(&mut self, message: &str) -> Result<(), DemoError> {
        println!("============ Press `Enter` to {} ...", message);
        let stdin = io::stdin();
        let mut line = String::new();
        tokio::select! {
            read = stdin.read_line(&mut line) => {
                if read? == 0 {
                    return Err(DemoError::InputClosed);
                }
                Ok(())
            }
            _ = wait_for_shutdown(&self.shutdown) => Err(DemoError::Interrupted),
        }
    }
}

/// Runs every step without waiting
#[derive(Debug, Default)]
pub struct AutoConfirm;

#[async_trait]
impl Prompt for AutoConfirm {
    async fn confirm(&mut self, message: &str) -> Result<(), DemoError> {
        tracing::info!("============ {}", message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn shutdown_wait_returns_once_triggered() {
        let shutdown = ShutdownSignal::new();
        let handle = shutdown.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(250)).await;
            handle.trigger();
        });
        wait_for_shutdown(&shutdown).await;
        assert!(shutdown.is_shutdown());
    }

    #[tokio::test]
    async fn auto_confirm_never_blocks() {
        let mut prompt = AutoConfirm;
        prompt.confirm("add a box to the planning scene").await.unwrap();
    }
}
