use anyhow::{anyhow, Context};
use url::Url;
use uuid::Uuid;

use super::{
    acknowledgment::Acknowledgment,
    authorization::{AuthorizationCallback, AuthorizationDetails, AuthorizationRequest, Pkce},
    credential_request::{decode_credentials, CredentialRequester},
    grants::PreAuthorizedCodeGrantParams,
    metadata::{IssuerMetadata, OpenIdConfiguration},
    offer::OfferedCredential,
    proof::validate_signer,
    state::{is_fatal, IssuanceState, Step},
    token::{self, AuthToken, TokenGrant},
    trust::{issuer_did, IssuerTrustEvaluator, IssuerTrustInfo, LinkedDomain},
    MODULE,
};
use crate::{
    config::{BaseUrl, ClientConfig, CreateAuthorizationUrlOptions},
    core::{credential::Credential, credential_format::CredentialFormat, jws::JwtSigner},
    error::{ErrorKind, Scenario, WalletError, WalletResult, WalletResultExt},
};

/// The pending authorization code request, kept until the callback arrives.
struct PendingAuthorization {
    state: String,
    code_verifier: String,
    client_id: String,
    redirect_uri: String,
}

/// The issuance engine shared by issuer and wallet initiated interactions.
///
/// Every network call goes through `config.http_client`. Execution and server errors move
/// the interaction to [IssuanceState::Failed].
pub(crate) struct Interaction {
    config: ClientConfig,
    issuer: BaseUrl,
    state: IssuanceState,
    metadata: Option<IssuerMetadata>,
    openid_configuration: Option<OpenIdConfiguration>,
    authorization: Option<PendingAuthorization>,
    client_id: Option<String>,
    token: Option<AuthToken>,
    nonce: Option<String>,
    ack_ids: Vec<String>,
}

impl Interaction {
    pub fn new(issuer: BaseUrl, config: ClientConfig) -> Self {
        Self {
            config,
            issuer,
            state: IssuanceState::Created,
            metadata: None,
            openid_configuration: None,
            authorization: None,
            client_id: None,
            token: None,
            nonce: None,
            ack_ids: Vec::new(),
        }
    }

    pub fn state(&self) -> IssuanceState {
        self.state
    }

    pub fn issuer(&self) -> &BaseUrl {
        &self.issuer
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Pass `result` through, failing the interaction when it holds a fatal error.
    fn guard<T>(&mut self, result: WalletResult<T>) -> WalletResult<T> {
        if let Err(err) = &result {
            if is_fatal(err) && self.state != IssuanceState::Failed {
                tracing::warn!(
                    from = ?self.state,
                    code = %err.code(),
                    "issuance interaction failed"
                );
                self.state = IssuanceState::Failed;
            }
        }
        result
    }

    /// Check that `step` is allowed now without taking it.
    fn check(&self, step: Step) -> WalletResult<()> {
        self.state.transition(step).map(drop)
    }

    fn advance(&mut self, step: Step) -> WalletResult<()> {
        self.state = self.state.transition(step)?;
        Ok(())
    }

    pub async fn populate_metadata(&mut self) -> WalletResult<&IssuerMetadata> {
        self.check(Step::PopulateMetadata)?;

        if self.metadata.is_none() {
            let fetched = IssuerMetadata::fetch(
                &self.issuer,
                self.config.http_client.as_ref(),
                self.config.jws_verifier.as_ref(),
            )
            .await
            .context("failed to fetch issuer metadata")
            .execution_err(MODULE, Scenario::MetadataFetchFailed);
            let metadata = self.guard(fetched)?;
            self.metadata = Some(metadata);
            self.advance(Step::PopulateMetadata)?;
        }

        self.metadata()
    }

    fn metadata(&self) -> WalletResult<&IssuerMetadata> {
        self.metadata.as_ref().ok_or_else(|| {
            WalletError::invalid_usage(MODULE, anyhow!("issuer metadata is not populated"))
        })
    }

    async fn openid_configuration(&mut self) -> WalletResult<&OpenIdConfiguration> {
        if self.openid_configuration.is_none() {
            let url = self
                .metadata()?
                .openid_configuration_url()
                .execution_err(MODULE, Scenario::IssuerOpenIdConfigFetchFailed);
            let url = self.guard(url)?;
            let fetched = OpenIdConfiguration::fetch(&url, self.config.http_client.as_ref())
                .await
                .context("failed to fetch the issuer's OpenID configuration")
                .execution_err(MODULE, Scenario::IssuerOpenIdConfigFetchFailed);
            let configuration = self.guard(fetched)?;
            self.openid_configuration = Some(configuration);
        }

        self.openid_configuration.as_ref().ok_or_else(|| {
            WalletError::invalid_usage(MODULE, anyhow!("OpenID configuration is not fetched"))
        })
    }

    async fn token_endpoint(&mut self) -> WalletResult<Url> {
        if let Some(endpoint) = self.metadata()?.token_endpoint() {
            return Ok(endpoint.clone());
        }

        let endpoint = self.openid_configuration().await?.token_endpoint.clone();
        let endpoint = endpoint
            .ok_or_else(|| anyhow!("issuer declares no token endpoint"))
            .execution_err(MODULE, Scenario::IssuerOpenIdConfigFetchFailed);
        self.guard(endpoint)
    }

    /// Metadata `authorization_endpoint`, then the authorization server itself, then the
    /// authorization server's OpenID configuration.
    async fn authorization_endpoint(&mut self) -> WalletResult<Url> {
        let metadata = self.metadata()?;
        if let Some(endpoint) = metadata.authorization_endpoint() {
            return Ok(endpoint.clone());
        }
        if let Some(server) = metadata.authorization_server() {
            if let Ok(endpoint) = Url::parse(server) {
                return Ok(endpoint);
            }
        }

        let endpoint = self
            .openid_configuration()
            .await?
            .authorization_endpoint
            .clone();
        let endpoint = endpoint
            .ok_or_else(|| anyhow!("issuer declares no authorization endpoint"))
            .execution_err(MODULE, Scenario::IssuerOpenIdConfigFetchFailed);
        self.guard(endpoint)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_authorization_url(
        &mut self,
        client_id: &str,
        redirect_uri: &str,
        format: CredentialFormat,
        types: Vec<String>,
        context: Vec<String>,
        offer_issuer_state: Option<&str>,
        options: &CreateAuthorizationUrlOptions,
    ) -> WalletResult<String> {
        self.populate_metadata().await?;
        self.check(Step::CreateAuthUrl)?;

        let issuer_state = match (offer_issuer_state, options.issuer_state.as_deref()) {
            (Some(offered), Some(given)) if offered != given => {
                return Err(WalletError::invalid_usage(
                    MODULE,
                    anyhow!("issuer state '{given}' conflicts with the offer's issuer state"),
                ))
            }
            (Some(offered), _) => Some(offered.to_owned()),
            (None, given) => given.map(str::to_owned),
        };

        let endpoint = self.authorization_endpoint().await?;
        let location = self
            .metadata()?
            .authorization_server()
            .map(|_| self.issuer.as_identifier().to_owned());

        let pkce = Pkce::generate();
        let state = Uuid::new_v4().to_string();
        let request = AuthorizationRequest {
            client_id,
            redirect_uri,
            state: &state,
            code_challenge: pkce.challenge(),
            details: AuthorizationDetails::new(format, types, context, location),
            scopes: &options.scopes,
            issuer_state: issuer_state.as_deref(),
        };
        let url = request
            .to_url(&endpoint)
            .context("failed to build the authorization url")
            .validation_err(MODULE, Scenario::InvalidRedirectUri)?;

        self.advance(Step::CreateAuthUrl)?;
        self.authorization = Some(PendingAuthorization {
            state,
            code_verifier: pkce.into_verifier(),
            client_id: client_id.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
        });
        tracing::debug!(%endpoint, "created authorization url");
        Ok(url.into())
    }

    /// Exchange the authorization code of the callback for an access token.
    pub async fn request_access_token(
        &mut self,
        redirect_uri_with_params: &str,
    ) -> WalletResult<()> {
        self.check(Step::ExchangeAuthorizationCode)?;
        let callback = AuthorizationCallback::parse(redirect_uri_with_params)
            .validation_err(MODULE, Scenario::InvalidRedirectUri)?;

        let Some(pending) = &self.authorization else {
            return Err(WalletError::invalid_usage(
                MODULE,
                anyhow!("no authorization url was created"),
            ));
        };
        if callback.state != pending.state {
            let mismatch = Err(WalletError::new(
                MODULE,
                ErrorKind::StateMismatch,
                Scenario::StateInRedirectUriNotMatchingAuthUrl,
                anyhow!("state in the redirect uri does not match the authorization url"),
            ));
            return self.guard(mismatch);
        }

        let endpoint = self.token_endpoint().await?;
        let Some(pending) = self.authorization.take() else {
            return Err(WalletError::invalid_usage(
                MODULE,
                anyhow!("no authorization url was created"),
            ));
        };
        let grant = TokenGrant::AuthorizationCode {
            code: &callback.code,
            redirect_uri: &pending.redirect_uri,
            client_id: &pending.client_id,
            code_verifier: &pending.code_verifier,
        };
        let response =
            token::exchange(self.config.http_client.as_ref(), &endpoint, grant).await;
        let response = self.guard(response)?;

        self.advance(Step::ExchangeAuthorizationCode)?;
        self.nonce = response.c_nonce.clone();
        self.token = Some(response.auth_token());
        self.client_id = Some(pending.client_id);
        Ok(())
    }

    pub async fn exchange_pre_authorized_code(
        &mut self,
        params: &PreAuthorizedCodeGrantParams,
        pin: Option<&str>,
    ) -> WalletResult<()> {
        self.populate_metadata().await?;
        self.check(Step::ExchangePreAuthorizedCode)?;

        let endpoint = self.token_endpoint().await?;
        let grant = TokenGrant::PreAuthorizedCode {
            code: params.pre_authorized_code(),
            pin: pin.map(|pin| (params.pin_parameter(), pin)),
        };
        let response =
            token::exchange(self.config.http_client.as_ref(), &endpoint, grant).await;
        let response = self.guard(response)?;

        self.advance(Step::ExchangePreAuthorizedCode)?;
        self.nonce = response.c_nonce.clone();
        self.token = Some(response.auth_token());
        Ok(())
    }

    /// Request and decode `offered`, in order, with proofs signed by `signer`.
    pub async fn request_credentials(
        &mut self,
        signer: &JwtSigner,
        offered: &[OfferedCredential],
    ) -> WalletResult<Vec<Credential>> {
        validate_signer(signer)?;
        self.check(Step::RequestCredential)?;

        let result = {
            let access_token = self
                .token
                .as_ref()
                .map(|token| token.access_token.as_str())
                .ok_or_else(|| {
                    WalletError::invalid_usage(MODULE, anyhow!("no access token was obtained"))
                })?;
            let metadata = self.metadata.as_ref().ok_or_else(|| {
                WalletError::invalid_usage(MODULE, anyhow!("issuer metadata is not populated"))
            })?;
            let requester = CredentialRequester {
                http_client: self.config.http_client.as_ref(),
                metadata,
                access_token,
                signer,
                client_id: self.client_id.as_deref(),
            };
            requester.request(offered, &mut self.nonce).await
        };
        let responses = self.guard(result)?;
        self.ack_ids.extend(
            responses
                .iter()
                .filter_map(|response| response.notification_id.clone()),
        );

        let decoded = decode_credentials(
            self.config.credential_codec.as_ref(),
            &responses,
            offered,
            !self.config.disable_vc_proof_checks,
        )
        .await;
        let credentials = self.guard(decoded)?;

        self.advance(Step::RequestCredential)?;
        let acknowledgment_pending = self.require_acknowledgment()?;
        self.advance(Step::Complete {
            acknowledgment_pending,
        })?;
        tracing::info!(
            count = credentials.len(),
            acknowledgment_pending,
            "received credentials"
        );
        Ok(credentials)
    }

    /// Whether the issuer expects the user's decision on the received credentials.
    pub fn require_acknowledgment(&self) -> WalletResult<bool> {
        let metadata = self.metadata()?;
        Ok(!self.ack_ids.is_empty() && metadata.notification_endpoint().is_some())
    }

    /// Take the pending acknowledgment. Afterwards the interaction is done.
    pub fn acknowledgment(&mut self) -> WalletResult<Acknowledgment> {
        self.check(Step::TakeAcknowledgment)?;
        let metadata = self.metadata()?;
        let notification_endpoint = metadata
            .notification_endpoint()
            .cloned()
            .ok_or_else(|| {
                WalletError::invalid_usage(MODULE, anyhow!("issuer has no notification endpoint"))
            })?;
        let auth_token = self.token.clone().ok_or_else(|| {
            WalletError::invalid_usage(MODULE, anyhow!("no access token was obtained"))
        })?;

        let acknowledgment = Acknowledgment {
            ack_ids: self.ack_ids.clone(),
            notification_endpoint,
            issuer_uri: self.issuer.as_identifier().to_owned(),
            auth_token,
            interaction_details: None,
        };
        self.advance(Step::TakeAcknowledgment)?;
        Ok(acknowledgment)
    }

    /// Check the linked domain of the issuer's DID. Does not affect the interaction state.
    pub async fn verify_issuer(&mut self) -> WalletResult<LinkedDomain> {
        self.populate_metadata().await?;
        let evaluator = IssuerTrustEvaluator {
            http_client: self.config.http_client.as_ref(),
            did_resolver: self.config.did_resolver.as_ref(),
            jws_verifier: self.config.jws_verifier.as_ref(),
            credential_codec: self.config.credential_codec.as_ref(),
        };
        evaluator.verify(self.metadata()?.jwt_kid()).await
    }

    pub async fn issuer_trust_info(
        &mut self,
        offered: &[OfferedCredential],
    ) -> WalletResult<IssuerTrustInfo> {
        let linked = self.verify_issuer().await?;
        let metadata = self.metadata()?;
        Ok(IssuerTrustInfo {
            did: issuer_did(metadata.jwt_kid())?.to_owned(),
            domain: linked.domain,
            offered: offered.to_vec(),
            issuer_name: metadata.issuer_name().map(str::to_owned),
        })
    }

    async fn registration_endpoint(&mut self) -> WalletResult<Option<Url>> {
        self.populate_metadata().await?;
        if let Some(endpoint) = self.metadata()?.registration_endpoint() {
            return Ok(Some(endpoint.clone()));
        }
        Ok(self.openid_configuration().await?.registration_endpoint.clone())
    }

    pub async fn dynamic_client_registration_supported(&mut self) -> WalletResult<bool> {
        Ok(self.registration_endpoint().await?.is_some())
    }

    pub async fn dynamic_client_registration_endpoint(&mut self) -> WalletResult<Url> {
        self.registration_endpoint().await?.ok_or_else(|| {
            WalletError::invalid_usage(
                MODULE,
                anyhow!("issuer does not support dynamic client registration"),
            )
        })
    }
}
