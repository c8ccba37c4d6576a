use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    services::reconciler::{ReconcileError, ReconcileOutcome, SkipReason},
    state::game::{ChangeRequest, HandlePriority},
};

/// Longest settle delay a trigger may request before dispatch.
pub const MAX_DELAY_SECONDS: u64 = 30;

/// Body of the reconciliation trigger.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct TriggerRequest {
    /// Tracking channel the caller refers to; the recorded one wins when they differ.
    #[serde(default)]
    #[validate(length(min = 1))]
    pub tracking_channel_id: Option<String>,
    /// Ordering applied to the change list.
    #[serde(default)]
    pub priority: HandlePriority,
    /// Seconds to wait, outside the lease, before the changes are sent.
    #[serde(default)]
    #[validate(range(max = MAX_DELAY_SECONDS))]
    pub delay_seconds: u64,
}

/// Force a voice state on one user, or on every tracked user when `user_id` is omitted.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct OverrideRequest {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub user_id: Option<String>,
    pub mute: bool,
    pub deaf: bool,
}

/// How a reconciliation pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Applied,
    Skipped,
}

/// Why a pass dispatched nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SkipReasonDto {
    LeaseUnavailable,
    NotRunning,
    NoChanges,
}

impl From<SkipReason> for SkipReasonDto {
    fn from(reason: SkipReason) -> Self {
        match reason {
            SkipReason::LeaseUnavailable => SkipReasonDto::LeaseUnavailable,
            SkipReason::NotRunning => SkipReasonDto::NotRunning,
            SkipReason::NoChanges => SkipReasonDto::NoChanges,
        }
    }
}

/// One mute/deafen change that was sent to the enforcer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ChangeSummary {
    pub user_id: String,
    pub mute: bool,
    pub deaf: bool,
}

impl From<ChangeRequest> for ChangeSummary {
    fn from(change: ChangeRequest) -> Self {
        Self {
            user_id: change.user_id.0,
            mute: change.mute,
            deaf: change.deaf,
        }
    }
}

/// Result of a trigger or override call.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReconcileResponse {
    pub outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReasonDto>,
    /// Changes in dispatch order.
    pub changes: Vec<ChangeSummary>,
}

impl ReconcileResponse {
    /// Project a non-failed outcome; failures are turned into errors by the caller.
    pub fn from_outcome(outcome: ReconcileOutcome) -> Result<Self, ReconcileError> {
        match outcome {
            ReconcileOutcome::Applied { changes } => Ok(Self {
                outcome: OutcomeKind::Applied,
                reason: None,
                changes: changes.into_iter().map(Into::into).collect(),
            }),
            ReconcileOutcome::Skipped(reason) => Ok(Self {
                outcome: OutcomeKind::Skipped,
                reason: Some(reason.into()),
                changes: Vec::new(),
            }),
            ReconcileOutcome::Failed(err) => Err(err),
        }
    }
}
