use anyhow::Context;
use serde::Deserialize;
use serde_json::Value as Json;
use url::Url;

use super::{builder::AuthorizedResponse, MODULE};
use crate::{
    core::util::{post_form, AsyncHttpClient, HttpReply},
    error::{Scenario, ServerErrorDetails, WalletError, WalletResult, WalletResultExt},
};

#[derive(Deserialize)]
struct ErrorResponse {
    error: Json,
    #[serde(default)]
    error_description: Option<String>,
}

/// Microsoft Entra Verified ID reports errors as `{"error": {"innererror": {...}}}`.
#[derive(Deserialize)]
struct EntraError {
    #[serde(alias = "innerError")]
    innererror: EntraInnerError,
}

#[derive(Deserialize)]
struct EntraInnerError {
    code: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct PostRedirection {
    redirect_uri: Url,
}

/// POST the authorization response to `response_uri`.
///
/// Returns the `redirect_uri` the verifier sends back, if any.
pub(crate) async fn submit(
    http_client: &dyn AsyncHttpClient,
    response_uri: &Url,
    response: &AuthorizedResponse,
) -> WalletResult<Option<Url>> {
    let mut form = vec![
        ("id_token", response.id_token.as_str()),
        ("vp_token", response.vp_token.as_str()),
    ];
    if let Some(state) = &response.state {
        form.push(("state", state.as_str()));
    }

    let started = std::time::Instant::now();
    let reply = post_form(http_client, response_uri, &form, None)
        .await
        .context("failed to make authorization response request")
        .execution_err(MODULE, Scenario::SendAuthorizedResponseFailed)?;
    tracing::info!(
        %response_uri,
        status = reply.status.as_u16(),
        duration_ms = started.elapsed().as_millis() as u64,
        "sent authorization response"
    );

    if !reply.status.is_success() {
        return Err(response_error(&reply, response_uri.as_str()));
    }

    Ok(serde_json::from_slice(&reply.body)
        .ok()
        .map(|PostRedirection { redirect_uri }| redirect_uri))
}

/// Classify a verifier's error response.
pub(crate) fn response_error(reply: &HttpReply, endpoint: &str) -> WalletError {
    let details = ServerErrorDetails {
        status: reply.status.as_u16(),
        body: reply.body_str(),
        endpoint: endpoint.to_owned(),
        c_nonce: None,
    };

    let Ok(parsed) = serde_json::from_slice::<ErrorResponse>(&reply.body) else {
        return WalletError::execution(MODULE, Scenario::OtherAuthorizationResponseError, details);
    };

    match parsed.error {
        Json::String(code) => {
            let scenario = match code.as_str() {
                "invalid_scope" => Scenario::InvalidScope,
                "invalid_request" => Scenario::InvalidRequest,
                "invalid_client" => Scenario::InvalidClient,
                "vp_formats_not_supported" => Scenario::VpFormatsNotSupported,
                "invalid_presentation_definition_uri" => Scenario::InvalidPresentationDefinitionUri,
                "invalid_presentation_definition_reference" => {
                    Scenario::InvalidPresentationDefinitionReference
                }
                _ => Scenario::OtherAuthorizationResponseError,
            };
            WalletError::server_reported(
                MODULE,
                scenario,
                details,
                Some(code),
                parsed.error_description,
            )
        }
        envelope @ Json::Object(_) => match serde_json::from_value::<EntraError>(envelope) {
            Ok(EntraError { innererror }) => {
                let scenario = match innererror.code.as_str() {
                    "badOrMissingField" => Scenario::MsEntraBadOrMissingFields,
                    "notFound" => Scenario::MsEntraNotFound,
                    "tokenError" => Scenario::MsEntraTokenError,
                    "transientError" => Scenario::MsEntraTransientError,
                    _ => Scenario::OtherAuthorizationResponseError,
                };
                WalletError::server_reported(
                    MODULE,
                    scenario,
                    details,
                    Some(innererror.code),
                    innererror.message,
                )
            }
            Err(_) => {
                WalletError::execution(MODULE, Scenario::OtherAuthorizationResponseError, details)
            }
        },
        _ => WalletError::execution(MODULE, Scenario::OtherAuthorizationResponseError, details),
    }
}
