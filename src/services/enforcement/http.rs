use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::Client;

use super::{EnforcementError, Enforcer, UserModifyRequest};
use crate::dao::models::GuildId;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Enforcer posting change sets to an HTTP enforcement service.
#[derive(Clone)]
pub struct HttpEnforcer {
    client: Client,
    base_url: Arc<str>,
}

impl HttpEnforcer {
    /// Client posting to `{base_url}/modify/{guild_id}/{connect_code}`.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, EnforcementError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| EnforcementError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.as_ref().trim_end_matches('/')),
        })
    }

    fn modify_url(&self, guild_id: &GuildId, connect_code: &str) -> String {
        format!("{}/modify/{}/{}", self.base_url, guild_id, connect_code)
    }
}

impl Enforcer for HttpEnforcer {
    fn modify_users(
        &self,
        guild_id: &GuildId,
        connect_code: &str,
        request: UserModifyRequest,
    ) -> BoxFuture<'static, Result<(), EnforcementError>> {
        let client = self.client.clone();
        let url = self.modify_url(guild_id, connect_code);
        Box::pin(async move {
            let response = client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|source| EnforcementError::RequestSend {
                    url: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(EnforcementError::RequestStatus {
                    url,
                    status: response.status().as_u16(),
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modify_url_trims_trailing_slash() {
        let enforcer = HttpEnforcer::new("http://galactus:5858/").unwrap();
        assert_eq!(
            enforcer.modify_url(&"123".into(), "ABCDEF"),
            "http://galactus:5858/modify/123/ABCDEF"
        );
    }
}
