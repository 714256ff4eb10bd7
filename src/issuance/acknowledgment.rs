use anyhow::{anyhow, Context};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use url::Url;

use super::{server_error, token::AuthToken, MODULE};
use crate::{
    core::util::{post_json, AsyncHttpClient},
    error::{Scenario, WalletError, WalletResult, WalletResultExt},
};

/// The notification events a wallet sends to an issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcknowledgmentEvent {
    CredentialAccepted,
    CredentialFailure,
    CredentialDeleted,
}

#[derive(Debug, Serialize)]
struct NotificationRequest<'a> {
    notifications: Vec<Notification<'a>>,
}

#[derive(Debug, Serialize)]
struct Notification<'a> {
    notification_id: &'a str,
    event: AcknowledgmentEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_description: Option<&'a str>,
    issuer_identifier: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    interaction_details: Option<&'a Map<String, Json>>,
}

/// Pending notifications for the credentials of one interaction.
///
/// Serializable so that a wallet can acknowledge after a restart, once the user has decided.
#[derive(Clone, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub ack_ids: Vec<String>,
    pub notification_endpoint: Url,
    pub issuer_uri: String,
    pub auth_token: AuthToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_details: Option<Map<String, Json>>,
}

impl std::fmt::Debug for Acknowledgment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acknowledgment")
            .field("ack_ids", &self.ack_ids)
            .field("notification_endpoint", &self.notification_endpoint.as_str())
            .field("issuer_uri", &self.issuer_uri)
            .field("interaction_details", &self.interaction_details)
            .finish_non_exhaustive()
    }
}

impl Acknowledgment {
    /// Tell the issuer the user accepted the credentials.
    pub async fn accept(&self, http_client: &dyn AsyncHttpClient) -> WalletResult<()> {
        self.notify(http_client, AcknowledgmentEvent::CredentialAccepted, None)
            .await
    }

    /// Tell the issuer the user rejected the credentials.
    pub async fn reject(
        &self,
        http_client: &dyn AsyncHttpClient,
        description: Option<&str>,
    ) -> WalletResult<()> {
        self.notify(http_client, AcknowledgmentEvent::CredentialFailure, description)
            .await
    }

    /// Send `event` for every pending ack id in one request.
    pub async fn notify(
        &self,
        http_client: &dyn AsyncHttpClient,
        event: AcknowledgmentEvent,
        description: Option<&str>,
    ) -> WalletResult<()> {
        if self.ack_ids.is_empty() {
            return Err(WalletError::invalid_usage(
                MODULE,
                anyhow!("there are no credentials to acknowledge"),
            ));
        }

        let request = NotificationRequest {
            notifications: self
                .ack_ids
                .iter()
                .map(|ack_id| Notification {
                    notification_id: ack_id,
                    event,
                    event_description: description,
                    issuer_identifier: &self.issuer_uri,
                    interaction_details: self.interaction_details.as_ref(),
                })
                .collect(),
        };

        let reply = post_json(
            http_client,
            &self.notification_endpoint,
            &request,
            Some(&self.auth_token.access_token),
        )
        .await
        .context("acknowledgment request failed")
        .execution_err(MODULE, Scenario::AcknowledgmentRequestFailed)?;

        if reply.status != StatusCode::NO_CONTENT {
            return Err(server_error::credential_error(
                &reply,
                "issuer's notification endpoint",
            ));
        }

        tracing::info!(
            ?event,
            count = self.ack_ids.len(),
            "acknowledged credentials"
        );
        Ok(())
    }
}
