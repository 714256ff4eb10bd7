use anyhow::{anyhow, Context};
use url::Url;

use super::{
    acknowledgment::Acknowledgment,
    interaction::Interaction,
    metadata::SupportedCredential,
    offer::OfferedCredential,
    proof::validate_signer,
    state::IssuanceState,
    trust::{IssuerTrustInfo, LinkedDomain},
    MODULE,
};
use crate::{
    config::{BaseUrl, ClientConfig, CreateAuthorizationUrlOptions},
    core::{credential::Credential, credential_format::CredentialFormat, jws::JwtSigner},
    error::{Scenario, WalletError, WalletResult, WalletResultExt},
};

/// An issuance the wallet starts with a known issuer, always through the authorization code
/// grant.
pub struct WalletInitiatedInteraction {
    engine: Interaction,
    requested: Option<OfferedCredential>,
}

impl std::fmt::Debug for WalletInitiatedInteraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletInitiatedInteraction")
            .field("issuer", &self.engine.issuer().as_identifier())
            .field("requested", &self.requested)
            .field("state", &self.engine.state())
            .finish()
    }
}

impl WalletInitiatedInteraction {
    pub fn new(issuer_uri: &str, config: ClientConfig) -> WalletResult<Self> {
        let issuer = BaseUrl::try_from(issuer_uri)
            .with_context(|| format!("invalid issuer URI '{issuer_uri}'"))
            .validation_err(MODULE, Scenario::InvalidIssuanceUri)?;
        Ok(Self {
            engine: Interaction::new(issuer, config),
            requested: None,
        })
    }

    pub fn issuer_uri(&self) -> &str {
        self.engine.issuer().as_identifier()
    }

    pub fn state(&self) -> IssuanceState {
        self.engine.state()
    }

    /// What the issuer can issue, from its metadata.
    pub async fn supported_credentials(&mut self) -> WalletResult<Vec<SupportedCredential>> {
        Ok(self.engine.populate_metadata().await?.supported_credentials())
    }

    /// The URL to open in the user's browser to authorize issuance of one credential.
    ///
    /// The `@context` of a matching supported credential is sent along.
    pub async fn create_authorization_url(
        &mut self,
        client_id: &str,
        redirect_uri: &str,
        format: CredentialFormat,
        types: Vec<String>,
        options: &CreateAuthorizationUrlOptions,
    ) -> WalletResult<String> {
        if !format.is_issuable() {
            return Err(WalletError::invalid_usage(
                MODULE,
                anyhow!("credentials cannot be issued in format '{format}'"),
            ));
        }

        let context = self
            .supported_credentials()
            .await?
            .into_iter()
            .find(|supported| supported.format == format && supported.types() == types.as_slice())
            .map(|supported| supported.context().to_vec())
            .unwrap_or_default();

        let requested = OfferedCredential {
            format,
            types,
            context,
        };
        let url = self
            .engine
            .create_authorization_url(
                client_id,
                redirect_uri,
                requested.format.clone(),
                requested.types.clone(),
                requested.context.clone(),
                None,
                options,
            )
            .await?;
        self.requested = Some(requested);
        Ok(url)
    }

    /// Request the authorized credential with the code the issuer redirected the user back with.
    pub async fn request_credential(
        &mut self,
        signer: &JwtSigner,
        redirect_uri_with_params: &str,
    ) -> WalletResult<Vec<Credential>> {
        validate_signer(signer)?;
        let Some(requested) = self.requested.clone() else {
            return Err(WalletError::invalid_usage(
                MODULE,
                anyhow!("create an authorization url first"),
            ));
        };

        self.engine
            .request_access_token(redirect_uri_with_params)
            .await?;
        self.engine
            .request_credentials(signer, std::slice::from_ref(&requested))
            .await
    }

    pub async fn verify_issuer(&mut self) -> WalletResult<LinkedDomain> {
        self.engine.verify_issuer().await
    }

    pub async fn issuer_trust_info(&mut self) -> WalletResult<IssuerTrustInfo> {
        let requested: Vec<_> = self.requested.iter().cloned().collect();
        self.engine.issuer_trust_info(&requested).await
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
