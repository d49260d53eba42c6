use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_sdk_sns::{config::Region, Client};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

/// Payload published when a user registers. A downstream worker turns this
/// into the verification email; delivery is outside this service.
#[derive(Debug, Serialize)]
pub struct VerificationMessage {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
}

#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish_verification(&self, msg: &VerificationMessage) -> anyhow::Result<()>;
}

pub struct SnsPublisher {
    client: Client,
    topic_arn: String,
}

impl SnsPublisher {
    pub async fn new(topic_arn: &str, region: &str) -> Self {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: Client::new(&shared),
            topic_arn: topic_arn.to_string(),
        }
    }
}

#[async_trait]
impl NotificationPublisher for SnsPublisher {
    async fn publish_verification(&self, msg: &VerificationMessage) -> anyhow::Result<()> {
        let payload = serde_json::to_string(msg).context("serialize verification message")?;
        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(payload)
            .send()
            .await
            .context("sns publish")?;
        Ok(())
    }
}

/// Stand-in used when no topic is configured. Drops messages with a warning
/// so registration still works in environments without SNS.
pub struct NoopPublisher;

#[async_trait]
impl NotificationPublisher for NoopPublisher {
    async fn publish_verification(&self, msg: &VerificationMessage) -> anyhow::Result<()> {
        warn!(user_id = %msg.user_id, "no SNS topic configured, dropping verification message");
        Ok(())
    }
}
