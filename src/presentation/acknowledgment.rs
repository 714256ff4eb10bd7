use anyhow::Context;
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use url::Url;

use super::{response::response_error, MODULE};
use crate::{
    core::util::{post_form, AsyncHttpClient},
    error::{Scenario, WalletResult, WalletResultExt},
};

/// Why the user did not present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    /// The user declined to share.
    NoConsent,
    /// The wallet holds no credentials satisfying the request.
    NoMatchFound,
}

impl DeclineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoConsent => "no_consent",
            Self::NoMatchFound => "no_match_found",
        }
    }
}

#[derive(Serialize)]
struct DeclineForm<'a> {
    error: &'static str,
    error_description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interaction_details: Option<String>,
}

/// Lets the wallet tell a verifier that no presentation is coming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierAcknowledgment {
    pub response_uri: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_details: Option<Map<String, Json>>,
}

impl VerifierAcknowledgment {
    /// POST an `access_denied` authorization error response for `reason`.
    pub async fn decline(
        &self,
        http_client: &dyn AsyncHttpClient,
        reason: DeclineReason,
    ) -> WalletResult<()> {
        let interaction_details = self
            .interaction_details
            .as_ref()
            .map(serde_json::to_vec)
            .transpose()
            .context("unable to serialize interaction details")
            .execution_err(MODULE, Scenario::VerifierAcknowledgmentFailed)?
            .map(|details| BASE64_URL_SAFE_NO_PAD.encode(details));
        let form = DeclineForm {
            error: "access_denied",
            error_description: reason.as_str(),
            state: self.state.as_deref(),
            interaction_details,
        };

        let reply = post_form(http_client, &self.response_uri, &form, None)
            .await
            .context("failed to send acknowledgment to the verifier")
            .execution_err(MODULE, Scenario::VerifierAcknowledgmentFailed)?;
        if !reply.status.is_success() {
            return Err(response_error(&reply, self.response_uri.as_str()));
        }

        tracing::info!(reason = reason.as_str(), "declined presentation");
        Ok(())
    }
}
