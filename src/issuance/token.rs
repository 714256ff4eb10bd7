use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{server_error, MODULE};
use crate::{
    core::util::{post_form, AsyncHttpClient},
    error::{Scenario, WalletResult, WalletResultExt},
    utils::now_secs,
};

/// A successful token endpoint response.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub c_nonce: Option<String>,
    #[serde(default)]
    pub c_nonce_expires_in: Option<u64>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("c_nonce", &self.c_nonce)
            .finish_non_exhaustive()
    }
}

/// The token kept for credential requests and acknowledgments.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix time at which the access token expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl TokenResponse {
    pub(crate) fn auth_token(&self) -> AuthToken {
        let expires_at = self
            .expires_in
            .and_then(|expires_in| Some(now_secs().ok()? + expires_in));
        AuthToken {
            access_token: self.access_token.clone(),
            token_type: self.token_type.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at,
        }
    }
}

/// The grant presented to the token endpoint.
#[derive(Debug, Clone, Copy)]
pub(crate) enum TokenGrant<'a> {
    PreAuthorizedCode {
        code: &'a str,
        /// `(parameter name, PIN)`.
        pin: Option<(&'static str, &'a str)>,
    },
    AuthorizationCode {
        code: &'a str,
        redirect_uri: &'a str,
        client_id: &'a str,
        code_verifier: &'a str,
    },
}

impl TokenGrant<'_> {
    fn form(&self) -> Vec<(&'static str, &str)> {
        match *self {
            Self::PreAuthorizedCode { code, pin } => {
                let mut form = vec![
                    ("grant_type", super::grants::PRE_AUTHORIZED_CODE_GRANT),
                    ("pre-authorized_code", code),
                ];
                form.extend(pin);
                form
            }
            Self::AuthorizationCode {
                code,
                redirect_uri,
                client_id,
                code_verifier,
            } => vec![
                ("grant_type", super::grants::AUTHORIZATION_CODE_GRANT),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", client_id),
                ("code_verifier", code_verifier),
            ],
        }
    }
}

/// Exchange a grant for an access token.
pub(crate) async fn exchange(
    http_client: &dyn AsyncHttpClient,
    token_endpoint: &Url,
    grant: TokenGrant<'_>,
) -> WalletResult<TokenResponse> {
    let started = std::time::Instant::now();

    let reply = post_form(http_client, token_endpoint, &grant.form(), None)
        .await
        .context("token request failed")
        .execution_err(MODULE, Scenario::TokenFetchFailed)?;

    if !reply.status.is_success() {
        return Err(server_error::token_error(&reply));
    }

    let response: TokenResponse = serde_json::from_slice(&reply.body)
        .context("failed to parse response from the issuer's token endpoint")
        .execution_err(MODULE, Scenario::TokenFetchFailed)?;

    tracing::info!(
        endpoint = %token_endpoint,
        c_nonce = response.c_nonce.is_some(),
        duration_ms = started.elapsed().as_millis() as u64,
        "obtained access token"
    );
    Ok(response)
}
