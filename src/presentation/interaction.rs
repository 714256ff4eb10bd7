use std::sync::Arc;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{
    acknowledgment::VerifierAcknowledgment,
    builder::PresentationBuilder,
    request::{resolve_request, RequestObject},
    response::submit,
    MODULE,
};
use crate::{
    config::{ClientConfig, PresentCredentialOptions},
    core::{
        credential::Credential,
        jws::Signer,
        presentation_definition::{DefinitionMatch, PresentationDefinition},
    },
    error::{Scenario, WalletError, WalletResult, WalletResultExt},
};

/// What a wallet shows the user about the verifier asking for credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierDisplayData {
    /// The DID that signed the request object.
    pub did: Option<String>,
    pub name: Option<String>,
    pub purpose: Option<String>,
    pub logo_uri: Option<String>,
}

/// One presentation to a verifier, from its resolved authorization request.
pub struct PresentationInteraction {
    config: ClientConfig,
    request: RequestObject,
    response_uri: Url,
}

impl std::fmt::Debug for PresentationInteraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentationInteraction")
            .field("client_id", &self.request.client_id())
            .field("response_uri", &self.response_uri.as_str())
            .finish_non_exhaustive()
    }
}

impl PresentationInteraction {
    /// Resolve and verify `authorization_request`, either `openid-vc://?request_uri=...` or a
    /// request object JWS.
    pub async fn new(authorization_request: &str, config: ClientConfig) -> WalletResult<Self> {
        let request = resolve_request(
            authorization_request,
            config.http_client.as_ref(),
            config.jws_verifier.as_ref(),
        )
        .await?;
        let response_uri = request
            .response_uri()
            .cloned()
            .context("request object has neither response_uri nor redirect_uri")
            .validation_err(MODULE, Scenario::InvalidAuthorizationRequest)?;

        Ok(Self {
            config,
            request,
            response_uri,
        })
    }

    pub fn request_object(&self) -> &RequestObject {
        &self.request
    }

    pub fn presentation_definition(&self) -> WalletResult<&PresentationDefinition> {
        self.request
            .presentation_definition()
            .context("request object has no presentation_definition")
            .validation_err(MODULE, Scenario::InvalidAuthorizationRequest)
    }

    pub fn verifier_display_data(&self) -> VerifierDisplayData {
        let metadata = self.request.client_metadata();
        VerifierDisplayData {
            did: self.request.signer_did().map(str::to_owned),
            name: metadata.and_then(|metadata| metadata.client_name.clone()),
            purpose: metadata.and_then(|metadata| metadata.client_purpose.clone()),
            logo_uri: metadata.and_then(|metadata| metadata.logo_uri.clone()),
        }
    }

    /// Which of `credentials` satisfy each input descriptor of the request.
    pub fn matched_credentials(
        &self,
        credentials: &[Credential],
        options: &PresentCredentialOptions,
    ) -> WalletResult<DefinitionMatch> {
        self.presentation_definition()?
            .match_credentials(credentials, options.ignore_constraints)
            .execution_err(MODULE, Scenario::CreateAuthorizedResponseFailed)
    }

    /// Present the credentials that satisfy the request, signed with holder keys held by
    /// `signer`.
    ///
    /// Returns the `redirect_uri` the verifier answered with, if any.
    pub async fn present_credential(
        &self,
        credentials: &[Credential],
        signer: Arc<dyn Signer>,
        options: &PresentCredentialOptions,
    ) -> WalletResult<Option<Url>> {
        if credentials.is_empty() {
            return Err(WalletError::invalid_usage(
                MODULE,
                anyhow!("no credentials to present"),
            ));
        }

        let builder = PresentationBuilder {
            request: &self.request,
            did_resolver: self.config.did_resolver.as_ref(),
            signer,
            prover: self.config.data_integrity_prover.as_deref(),
        };
        let response = builder
            .build(credentials, options.ignore_constraints)
            .await
            .context("failed to create the authorized response")
            .execution_err(MODULE, Scenario::CreateAuthorizedResponseFailed)?;

        submit(
            self.config.http_client.as_ref(),
            &self.response_uri,
            &response,
        )
        .await
    }

    /// For declining the request instead of presenting.
    pub fn acknowledgment(&self) -> VerifierAcknowledgment {
        VerifierAcknowledgment {
            response_uri: self.response_uri.clone(),
            state: self.request.state().map(str::to_owned),
            interaction_details: None,
        }
    }
}
