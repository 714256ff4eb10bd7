use crate::{
    config::ClientConfig,
    error::WalletResult,
    issuance::{
        Acknowledgment, AcknowledgmentEvent, IssuerInitiatedInteraction,
        WalletInitiatedInteraction,
    },
    presentation::{DeclineReason, PresentationInteraction, VerifierAcknowledgment},
};

/// Entry point for the interactions of one wallet.
///
/// Every interaction gets a clone of the wallet's [ClientConfig]; the collaborators in it are
/// shared.
#[derive(Debug, Clone)]
pub struct Wallet {
    config: ClientConfig,
}

impl Wallet {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start an issuance from an `openid-credential-offer://` URI.
    pub async fn accept_offer(&self, offer_uri: &str) -> WalletResult<IssuerInitiatedInteraction> {
        IssuerInitiatedInteraction::new(offer_uri, self.config.clone()).await
    }

    /// Start an issuance with an issuer the wallet already knows.
    pub fn request_from_issuer(
        &self,
        issuer_uri: &str,
    ) -> WalletResult<WalletInitiatedInteraction> {
        WalletInitiatedInteraction::new(issuer_uri, self.config.clone())
    }

    /// Start a presentation from an `openid-vc://` authorization request.
    pub async fn present_to(
        &self,
        authorization_request: &str,
    ) -> WalletResult<PresentationInteraction> {
        PresentationInteraction::new(authorization_request, self.config.clone()).await
    }

    /// Send a stored issuance acknowledgment, possibly after a restart.
    pub async fn acknowledge(
        &self,
        acknowledgment: &Acknowledgment,
        event: AcknowledgmentEvent,
        description: Option<&str>,
    ) -> WalletResult<()> {
        acknowledgment
            .notify(self.config.http_client.as_ref(), event, description)
            .await
    }

    /// Tell a verifier that no presentation will follow.
    pub async fn decline(
        &self,
        acknowledgment: &VerifierAcknowledgment,
        reason: DeclineReason,
    ) -> WalletResult<()> {
        acknowledgment
            .decline(self.config.http_client.as_ref(), reason)
            .await
    }
}
