use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Destination, Notification};

/// Delivers formatted notifications to a destination
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, destination: Destination, notification: &Notification) -> Result<()>;
}
