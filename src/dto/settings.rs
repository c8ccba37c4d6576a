use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::services::policy::VoiceRules;

/// Effective voice rules of a guild.
#[derive(Debug, Serialize, ToSchema)]
pub struct VoiceRulesResponse {
    pub guild_id: String,
    /// Whether the guild uses an override rather than the default rules.
    pub overridden: bool,
    pub rules: VoiceRules,
}

/// Premium flag of a guild.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PremiumStatus {
    pub premium: bool,
}
