use super::{CoordinationState, Registrar, SessionEvent, SyncOutcome};
use crate::error::Result;
use crate::process::ProcessState;
use async_trait::async_trait;

/// Registrar used when no coordination service is configured
#[derive(Debug, Default)]
pub struct StandaloneRegistrar;

#[async_trait]
impl Registrar for StandaloneRegistrar {
    fn coordination_state(&self) -> CoordinationState {
        CoordinationState::Disconnected
    }

    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn sync(&mut self, _process: ProcessState) -> SyncOutcome {
        SyncOutcome::Unchanged
    }

    async fn session_changed(
        &mut self,
        _event: SessionEvent,
        _process: ProcessState,
    ) -> SyncOutcome {
        SyncOutcome::Unchanged
    }

    async fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SessionChange;

    #[tokio::test]
    async fn test_standalone_is_noop() {
        let mut registrar = StandaloneRegistrar;
        registrar.connect().await.unwrap();

        assert_eq!(
            registrar.sync(ProcessState::Healthy).await,
            SyncOutcome::Unchanged
        );
        assert_eq!(
            registrar
                .session_changed(
                    SessionEvent {
                        generation: 1,
                        change: SessionChange::Connected
                    },
                    ProcessState::Healthy
                )
                .await,
            SyncOutcome::Unchanged
        );
        assert_eq!(
            registrar.coordination_state(),
            CoordinationState::Disconnected
        );

        registrar.close().await;
    }
}
