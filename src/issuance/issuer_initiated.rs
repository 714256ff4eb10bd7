use anyhow::anyhow;
use url::Url;

use super::{
    acknowledgment::Acknowledgment,
    grants::{AuthorizationCodeGrantParams, PreAuthorizedCodeGrantParams},
    interaction::Interaction,
    metadata::IssuerMetadata,
    offer::{resolve_offer, CredentialOffer, OfferedCredential},
    proof::validate_signer,
    state::IssuanceState,
    trust::{IssuerTrustInfo, LinkedDomain},
    MODULE,
};
use crate::{
    config::{ClientConfig, CreateAuthorizationUrlOptions, RequestCredentialOptions},
    core::{credential::Credential, jws::JwtSigner},
    error::{WalletError, WalletResult},
};

/// An issuance started from an issuer's credential offer.
///
/// ```ignore
/// let mut interaction = IssuerInitiatedInteraction::new(offer_uri, config).await?;
/// let credentials = interaction
///     .request_credential_with_pre_auth(&signer, &RequestCredentialOptions { pin })
///     .await?;
/// if interaction.require_acknowledgment()? {
///     interaction.acknowledgment()?.accept(http_client).await?;
/// }
/// ```
pub struct IssuerInitiatedInteraction {
    offer: CredentialOffer,
    engine: Interaction,
}

impl std::fmt::Debug for IssuerInitiatedInteraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerInitiatedInteraction")
            .field("offer", &self.offer)
            .field("state", &self.engine.state())
            .finish_non_exhaustive()
    }
}

impl IssuerInitiatedInteraction {
    /// Resolve `offer_uri` and start an interaction with the offering issuer.
    pub async fn new(offer_uri: &str, config: ClientConfig) -> WalletResult<Self> {
        let offer = resolve_offer(offer_uri, config.http_client.as_ref()).await?;
        Ok(Self::from_offer(offer, config))
    }

    pub fn from_offer(offer: CredentialOffer, config: ClientConfig) -> Self {
        Self {
            engine: Interaction::new(offer.credential_issuer().clone(), config),
            offer,
        }
    }

    pub fn offer(&self) -> &CredentialOffer {
        &self.offer
    }

    pub fn offered_credentials(&self) -> &[OfferedCredential] {
        self.offer.credentials()
    }

    pub fn issuer_uri(&self) -> &str {
        self.engine.issuer().as_identifier()
    }

    pub fn state(&self) -> IssuanceState {
        self.engine.state()
    }

    pub fn pre_authorized_code_grant_type_supported(&self) -> bool {
        self.offer.grants().pre_authorized_code().is_some()
    }

    pub fn pre_authorized_code_grant_params(&self) -> WalletResult<&PreAuthorizedCodeGrantParams> {
        self.offer.grants().pre_authorized_code().ok_or_else(|| {
            WalletError::invalid_usage(
                MODULE,
                anyhow!("issuer does not support the pre-authorized code grant"),
            )
        })
    }

    pub fn authorization_code_grant_type_supported(&self) -> bool {
        self.offer.grants().authorization_code().is_some()
    }

    pub fn authorization_code_grant_params(&self) -> WalletResult<&AuthorizationCodeGrantParams> {
        self.offer.grants().authorization_code().ok_or_else(|| {
            WalletError::invalid_usage(
                MODULE,
                anyhow!("issuer does not support the authorization code grant"),
            )
        })
    }

    /// Fetch the issuer metadata. Later calls return the cached metadata.
    pub async fn populate_issuer_metadata(&mut self) -> WalletResult<&IssuerMetadata> {
        self.engine.populate_metadata().await
    }

    /// The URL to open in the user's browser for the authorization code grant.
    ///
    /// Authorizes the first offered credential.
    pub async fn create_authorization_url(
        &mut self,
        client_id: &str,
        redirect_uri: &str,
        options: &CreateAuthorizationUrlOptions,
    ) -> WalletResult<String> {
        let offer_issuer_state = self.authorization_code_grant_params()?.issuer_state.clone();
        let Some(first) = self.offer.credentials().first().cloned() else {
            return Err(WalletError::invalid_usage(
                MODULE,
                anyhow!("the offer contains no credentials"),
            ));
        };

        self.engine
            .create_authorization_url(
                client_id,
                redirect_uri,
                first.format,
                first.types,
                first.context,
                offer_issuer_state.as_deref(),
                options,
            )
            .await
    }

    /// Request the offered credentials with the pre-authorized code grant.
    pub async fn request_credential_with_pre_auth(
        &mut self,
        signer: &JwtSigner,
        options: &RequestCredentialOptions,
    ) -> WalletResult<Vec<Credential>> {
        let params = self.pre_authorized_code_grant_params()?.clone();
        if params.pin_required() && options.pin.is_none() {
            return Err(WalletError::invalid_usage(
                MODULE,
                anyhow!("the pre-authorized code grant requires a user PIN"),
            ));
        }
        validate_signer(signer)?;

        self.engine
            .exchange_pre_authorized_code(&params, options.pin.as_deref())
            .await?;
        self.engine
            .request_credentials(signer, self.offer.credentials())
            .await
    }

    /// Request the offered credentials with the authorization code the issuer redirected
    /// the user back with.
    pub async fn request_credential_with_auth(
        &mut self,
        signer: &JwtSigner,
        redirect_uri_with_params: &str,
    ) -> WalletResult<Vec<Credential>> {
        self.authorization_code_grant_params()?;
        validate_signer(signer)?;

        self.engine
            .request_access_token(redirect_uri_with_params)
            .await?;
        self.engine
            .request_credentials(signer, self.offer.credentials())
            .await
    }

    /// Check the issuer's linked domain.
    pub async fn verify_issuer(&mut self) -> WalletResult<LinkedDomain> {
        self.engine.verify_issuer().await
    }

    pub async fn issuer_trust_info(&mut self) -> WalletResult<IssuerTrustInfo> {
        let offered = self.offer.credentials().to_vec();
        self.engine.issuer_trust_info(&offered).await
    }

    pub async fn dynamic_client_registration_supported(&mut self) -> WalletResult<bool> {
        self.engine.dynamic_client_registration_supported().await
    }

    pub async fn dynamic_client_registration_endpoint(&mut self) -> WalletResult<Url> {
        self.engine.dynamic_client_registration_endpoint().await
    }

    pub fn require_acknowledgment(&self) -> WalletResult<bool> {
        self.engine.require_acknowledgment()
    }

    pub fn acknowledgment(&mut self) -> WalletResult<Acknowledgment> {
        self.engine.acknowledgment()
    }
}
