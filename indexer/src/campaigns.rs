//! Campaign-state collaborator.
//!
//! The indexer never owns campaigns; it only attaches an observed contract
//! address to the campaign a creation event most likely belongs to.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use tokio::sync::RwLock;

/// Campaign collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The collaborator is not reachable.
    #[error("campaign directory unavailable: {0}")]
    Unavailable(String),
}

/// Lifecycle of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// Submitted, contract not yet deployed.
    Pending,
    /// Approved by an admin.
    Approved,
    /// Accepting purchases.
    Running,
    /// Temporarily halted.
    Paused,
    /// Closed.
    Finished,
    /// Declined by an admin.
    Rejected,
    /// Withdrawn.
    Cancelled,
}

impl CampaignStatus {
    /// Returns the stored name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Finished => "finished",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External campaign state the indexer writes into.
#[async_trait]
pub trait CampaignDirectory: Send + Sync {
    /// Attaches `contract_address` to the most recently created pending
    /// campaign of `creator` that has no contract yet.
    ///
    /// Returns the id of the updated campaign, `None` if nothing matched.
    async fn attach_to_latest_pending(
        &self,
        creator: &str,
        contract_address: &str,
    ) -> Result<Option<String>, CampaignError>;
}

/// [`CampaignDirectory`] over the platform's `campaigns` table.
#[derive(Debug, Clone)]
pub struct PgCampaignDirectory {
    pool: PgPool,
}

impl PgCampaignDirectory {
    /// Creates a directory on `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignDirectory for PgCampaignDirectory {
    async fn attach_to_latest_pending(
        &self,
        creator: &str,
        contract_address: &str,
    ) -> Result<Option<String>, CampaignError> {
        // Select and update in one statement so concurrent writers cannot
        // attach two addresses to the same campaign.
        let id: Option<String> = sqlx::query_scalar(
            r"
            UPDATE campaigns SET token_address = $2, updated_at = NOW()
            WHERE id = (
                SELECT id FROM campaigns
                WHERE creator_address = $1
                  AND status = $3
                  AND token_address IS NULL
                ORDER BY created_at DESC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id::TEXT
            ",
        )
        .bind(creator)
        .bind(contract_address)
        .bind(CampaignStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }
}

/// A campaign record held by [`InMemoryCampaignDirectory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    /// Identifier.
    pub id: String,
    /// Wallet that submitted the campaign.
    pub creator_address: String,
    /// Lifecycle state.
    pub status: CampaignStatus,
    /// Deployed token contract, once observed.
    pub token_address: Option<String>,
    /// Submission time.
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    /// Creates a pending campaign without a contract.
    #[must_use]
    pub fn pending(
        id: impl Into<String>,
        creator_address: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            creator_address: creator_address.into(),
            status: CampaignStatus::Pending,
            token_address: None,
            created_at,
        }
    }
}

/// A process-local [`CampaignDirectory`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryCampaignDirectory {
    campaigns: Arc<RwLock<Vec<Campaign>>>,
}

impl InMemoryCampaignDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a campaign.
    pub async fn insert(&self, campaign: Campaign) {
        self.campaigns.write().await.push(campaign);
    }

    /// Returns a campaign by id.
    pub async fn get(&self, id: &str) -> Option<Campaign> {
        self.campaigns
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }
}

#[async_trait]
impl CampaignDirectory for InMemoryCampaignDirectory {
    async fn attach_to_latest_pending(
        &self,
        creator: &str,
        contract_address: &str,
    ) -> Result<Option<String>, CampaignError> {
        let mut campaigns = self.campaigns.write().await;
        let latest = campaigns
            .iter_mut()
            .filter(|c| {
                c.creator_address == creator
                    && c.status == CampaignStatus::Pending
                    && c.token_address.is_none()
            })
            .max_by_key(|c| c.created_at);

        Ok(latest.map(|campaign| {
            campaign.token_address = Some(contract_address.to_string());
            campaign.id.clone()
        }))
    }
}
