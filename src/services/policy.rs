//! Guild-configurable voice rules deciding the mute/deafen target of a player.

use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{dao::models::GuildId, state::game::GamePhase};

/// Maps `(is_alive, tracked, phase)` to a `(mute, deaf)` target.
pub trait VoicePolicy: Send + Sync {
    /// Target for one user of `guild_id`.
    fn voice_state(
        &self,
        guild_id: &GuildId,
        is_alive: bool,
        tracked: bool,
        phase: GamePhase,
    ) -> (bool, bool);
}

/// Target for one liveness class in one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VoiceRule {
    /// Server-mute the user.
    #[serde(default)]
    pub mute: bool,
    /// Server-deafen the user.
    #[serde(default)]
    pub deaf: bool,
}

/// Targets for alive and dead players during one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PhaseRules {
    #[serde(default)]
    pub alive: VoiceRule,
    #[serde(default)]
    pub dead: VoiceRule,
}

/// Full rule table for a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VoiceRules {
    #[serde(default)]
    pub lobby: PhaseRules,
    #[serde(default)]
    pub tasks: PhaseRules,
    #[serde(default)]
    pub discussion: PhaseRules,
    #[serde(default)]
    pub menu: PhaseRules,
}

impl Default for VoiceRules {
    /// Alive players are muted and deafened during tasks; the dead talk freely during tasks
    /// and are muted during discussion.
    fn default() -> Self {
        Self {
            lobby: PhaseRules::default(),
            tasks: PhaseRules {
                alive: VoiceRule {
                    mute: true,
                    deaf: true,
                },
                dead: VoiceRule::default(),
            },
            discussion: PhaseRules {
                alive: VoiceRule::default(),
                dead: VoiceRule {
                    mute: true,
                    deaf: false,
                },
            },
            menu: PhaseRules::default(),
        }
    }
}

impl VoiceRules {
    fn phase(&self, phase: GamePhase) -> &PhaseRules {
        match phase {
            GamePhase::Lobby => &self.lobby,
            GamePhase::Tasks => &self.tasks,
            GamePhase::Discussion => &self.discussion,
            GamePhase::Menu => &self.menu,
        }
    }

    /// Untracked users are never muted or deafened.
    pub fn voice_state(&self, is_alive: bool, tracked: bool, phase: GamePhase) -> (bool, bool) {
        if !tracked {
            return (false, false);
        }
        let rules = self.phase(phase);
        let rule = if is_alive { rules.alive } else { rules.dead };
        (rule.mute, rule.deaf)
    }
}

/// Default rules with per-guild overrides.
#[derive(Debug, Default)]
pub struct GuildVoicePolicy {
    default: VoiceRules,
    overrides: DashMap<GuildId, VoiceRules>,
}

impl GuildVoicePolicy {
    /// Policy falling back to `default` for guilds without an override.
    pub fn new(default: VoiceRules, overrides: HashMap<GuildId, VoiceRules>) -> Self {
        Self {
            default,
            overrides: overrides.into_iter().collect(),
        }
    }

    /// Effective rules for `guild_id`.
    pub fn rules_for(&self, guild_id: &GuildId) -> VoiceRules {
        self.overrides
            .get(guild_id)
            .map(|rules| *rules)
            .unwrap_or(self.default)
    }

    /// Whether `guild_id` has its own rules.
    pub fn has_override(&self, guild_id: &GuildId) -> bool {
        self.overrides.contains_key(guild_id)
    }

    /// Install an override for `guild_id`.
    pub fn set_rules(&self, guild_id: GuildId, rules: VoiceRules) {
        self.overrides.insert(guild_id, rules);
    }

    /// Revert `guild_id` to the default rules.
    pub fn clear_rules(&self, guild_id: &GuildId) -> bool {
        self.overrides.remove(guild_id).is_some()
    }
}

impl VoicePolicy for GuildVoicePolicy {
    fn voice_state(
        &self,
        guild_id: &GuildId,
        is_alive: bool,
        tracked: bool,
        phase: GamePhase,
    ) -> (bool, bool) {
        self.rules_for(guild_id).voice_state(is_alive, tracked, phase)
    }
}
