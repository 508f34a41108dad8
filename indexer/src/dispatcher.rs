//! Side-effect dispatch for classified events.

use std::sync::Arc;

use tracing::{debug, info};

use crate::campaigns::{CampaignDirectory, CampaignError};
use crate::events::ParsedEvent;

/// Dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The campaign collaborator failed.
    #[error("campaign update failed: {0}")]
    Campaign(#[from] CampaignError),
}

/// Result of dispatching one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A campaign received the emitted contract address.
    Attached {
        /// Updated campaign.
        campaign_id: String,
        /// Attached address.
        contract_address: String,
    },
    /// A creation event matched no pending campaign.
    NoMatchingCampaign,
    /// The event implies no side effect.
    NotApplicable,
}

/// Translates parsed events into calls on external collaborators.
#[derive(Clone)]
pub struct SideEffectDispatcher {
    campaigns: Arc<dyn CampaignDirectory>,
}

impl SideEffectDispatcher {
    /// Creates a dispatcher writing into `campaigns`.
    #[must_use]
    pub fn new(campaigns: Arc<dyn CampaignDirectory>) -> Self {
        Self { campaigns }
    }

    /// Performs the mutation implied by `event`.
    ///
    /// Only creation events with a known actor touch campaign state.
    ///
    /// # Errors
    ///
    /// Returns an error if the collaborator call fails.
    pub async fn dispatch(
        &self,
        event: Option<&ParsedEvent>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some(ParsedEvent::Creation(creation)) = event else {
            return Ok(DispatchOutcome::NotApplicable);
        };
        let Some(actor) = creation.actor.as_deref() else {
            debug!(
                emitted = %creation.emitted_address,
                "Creation event without actor, nothing to correlate"
            );
            return Ok(DispatchOutcome::NotApplicable);
        };

        let attached = self
            .campaigns
            .attach_to_latest_pending(actor, &creation.emitted_address)
            .await?;

        match attached {
            Some(campaign_id) => {
                info!(
                    campaign_id = %campaign_id,
                    contract_address = %creation.emitted_address,
                    "Attached contract address to campaign"
                );
                Ok(DispatchOutcome::Attached {
                    campaign_id,
                    contract_address: creation.emitted_address.clone(),
                })
            }
            None => {
                debug!(actor, "No pending campaign for creator");
                Ok(DispatchOutcome::NoMatchingCampaign)
            }
        }
    }
}

impl std::fmt::Debug for SideEffectDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideEffectDispatcher").finish_non_exhaustive()
    }
}
