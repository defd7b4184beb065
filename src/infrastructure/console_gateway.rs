use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::application::{SinkError, SinkGateway};
use crate::domain::{MessageHandle, Projection, SinkTargetId};

/// Dry-run sink: prints what would be sent and hands out synthetic
/// message handles.
#[derive(Default)]
pub struct ConsoleGateway {
    next_id: AtomicU64,
}

impl ConsoleGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SinkGateway for ConsoleGateway {
    async fn create(
        &self,
        target: &SinkTargetId,
        projection: &Projection,
    ) -> Result<MessageHandle, SinkError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        println!("CREATE target={} id={}\n{}", target, id, projection.rendered_text);
        Ok(MessageHandle::new(id.to_string()))
    }

    async fn update(
        &self,
        target: &SinkTargetId,
        handle: &MessageHandle,
        projection: &Projection,
    ) -> Result<MessageHandle, SinkError> {
        println!(
            "UPDATE target={} id={}\n{}",
            target, handle, projection.rendered_text
        );
        Ok(handle.clone())
    }

    async fn remove(&self, target: &SinkTargetId, handle: &MessageHandle) -> Result<(), SinkError> {
        println!("REMOVE target={} id={}", target, handle);
        Ok(())
    }

    async fn pin(&self, target: &SinkTargetId, handle: &MessageHandle) -> Result<(), SinkError> {
        println!("PIN target={} id={}", target, handle);
        Ok(())
    }
}
