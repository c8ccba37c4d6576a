//! Outbound boundary to the voice enforcement service and the dispatcher feeding it.

#[cfg(feature = "http-enforcement")]
mod http;

use std::{sync::Arc, time::Duration};

use futures::future::{self, BoxFuture};
use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info};

use crate::{
    dao::models::GuildId,
    services::billing::PremiumLookup,
    state::game::ChangeRequest,
};

#[cfg(feature = "http-enforcement")]
pub use http::HttpEnforcer;

/// Batched mute/deafen request submitted for one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserModifyRequest {
    /// Premium flag of the guild, used by the enforcer to pick worker capacity.
    pub premium: bool,
    /// Changes in dispatch order.
    pub users: Vec<ChangeRequest>,
}

/// Failures while talking to the enforcement service.
#[derive(Debug, Error)]
pub enum EnforcementError {
    #[cfg(feature = "http-enforcement")]
    #[error("failed to build enforcement client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    #[cfg(feature = "http-enforcement")]
    #[error("failed to send modify request to `{url}`")]
    RequestSend {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("enforcement service answered {status} for `{url}`")]
    RequestStatus { url: String, status: u16 },
    #[error("enforcement service unavailable: {0}")]
    Unavailable(String),
}

/// Applies mute/deafen changes on the chat platform.
pub trait Enforcer: Send + Sync {
    /// Submit one batch for the game identified by `(guild_id, connect_code)`.
    fn modify_users(
        &self,
        guild_id: &GuildId,
        connect_code: &str,
        request: UserModifyRequest,
    ) -> BoxFuture<'static, Result<(), EnforcementError>>;
}

/// Enforcer used when no enforcement service is configured: logs and drops every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEnforcer;

impl Enforcer for LoggingEnforcer {
    fn modify_users(
        &self,
        guild_id: &GuildId,
        connect_code: &str,
        request: UserModifyRequest,
    ) -> BoxFuture<'static, Result<(), EnforcementError>> {
        info!(
            guild_id = %guild_id,
            connect_code,
            premium = request.premium,
            users = request.users.len(),
            "no enforcement service configured; dropping change set"
        );
        Box::pin(future::ready(Ok(())))
    }
}

/// Result of handing a change set to the enforcement boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The enforcer accepted `count` changes.
    Applied { count: usize },
    /// Nothing to send.
    Skipped,
    /// Transport or service failure.
    Failed(String),
}

/// Sends change sets, honoring the settle delay, tagged with the guild premium flag.
#[derive(Clone)]
pub struct Dispatcher {
    enforcer: Arc<dyn Enforcer>,
    premium: Arc<dyn PremiumLookup>,
}

impl Dispatcher {
    /// Dispatcher sending through `enforcer`, tagging requests via `premium`.
    pub fn new(enforcer: Arc<dyn Enforcer>, premium: Arc<dyn PremiumLookup>) -> Self {
        Self { enforcer, premium }
    }

    /// Sleep `delay`, then submit `changes` in one request. Never retries.
    ///
    /// Must not be called while holding a lease.
    pub async fn dispatch(
        &self,
        guild_id: &GuildId,
        connect_code: &str,
        changes: Vec<ChangeRequest>,
        delay: Duration,
    ) -> DispatchOutcome {
        if changes.is_empty() {
            return DispatchOutcome::Skipped;
        }

        if !delay.is_zero() {
            info!(
                guild_id = %guild_id,
                delay_ms = delay.as_millis() as u64,
                "sleeping before applying changes to users"
            );
            sleep(delay).await;
        }

        let premium = self.premium.is_premium(guild_id).await;
        let count = changes.len();
        let request = UserModifyRequest {
            premium,
            users: changes,
        };

        match self
            .enforcer
            .modify_users(guild_id, connect_code, request)
            .await
        {
            Ok(()) => {
                info!(guild_id = %guild_id, count, premium, "dispatched mute/deafen changes");
                DispatchOutcome::Applied { count }
            }
            Err(err) => {
                error!(guild_id = %guild_id, count, error = %err, "enforcement dispatch failed");
                DispatchOutcome::Failed(err.to_string())
            }
        }
    }
}
