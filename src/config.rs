use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::{
    credential::{CredentialCodec, DataIntegrityProver, JwtCredentialCodec},
    did::DidResolver,
    jws::{DidJwsVerifier, JwsVerifier},
    util::{AsyncHttpClient, ReqwestClient},
};

/// The collaborators every interaction is built from.
#[derive(Clone)]
pub struct ClientConfig {
    /// Transport for every request. Timeouts are configured on the client.
    pub http_client: Arc<dyn AsyncHttpClient>,
    pub did_resolver: Arc<dyn DidResolver>,
    /// Parses issued credentials.
    pub credential_codec: Arc<dyn CredentialCodec>,
    /// Verifies signed issuer metadata, request objects and DID configurations.
    pub jws_verifier: Arc<dyn JwsVerifier>,
    /// Skip proof checks of issued credentials. Defaults to `false`.
    pub disable_vc_proof_checks: bool,
    /// Adds Data Integrity proofs to presentations for verifiers accepting `ldp_vp`.
    /// Defaults to `None`, in which case presentations are only JWT secured.
    pub data_integrity_prover: Option<Arc<dyn DataIntegrityProver>>,
}

impl ClientConfig {
    /// A config with the default collaborators:
    ///
    /// - [ReqwestClient] with rustls and no timeout,
    /// - [DidJwsVerifier] over `did_resolver`,
    /// - [JwtCredentialCodec] over that verifier,
    /// - credential proof checks enabled, no Data Integrity prover.
    pub fn new(did_resolver: Arc<dyn DidResolver>) -> Result<Self> {
        Ok(Self::with_http_client(
            did_resolver,
            Arc::new(ReqwestClient::new()?),
        ))
    }

    /// Like [new](Self::new) with a caller supplied HTTP client.
    pub fn with_http_client(
        did_resolver: Arc<dyn DidResolver>,
        http_client: Arc<dyn AsyncHttpClient>,
    ) -> Self {
        let jws_verifier: Arc<dyn JwsVerifier> =
            Arc::new(DidJwsVerifier::new(did_resolver.clone()));
        Self {
            http_client,
            credential_codec: Arc::new(JwtCredentialCodec::new(jws_verifier.clone())),
            jws_verifier,
            did_resolver,
            disable_vc_proof_checks: false,
            data_integrity_prover: None,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("disable_vc_proof_checks", &self.disable_vc_proof_checks)
            .field(
                "data_integrity_prover",
                &self.data_integrity_prover.is_some(),
            )
            .finish_non_exhaustive()
    }
}

/// Options of [create_authorization_url](crate::issuance::IssuerInitiatedInteraction::create_authorization_url).
#[derive(Debug, Clone, Default)]
pub struct CreateAuthorizationUrlOptions {
    /// Sent space separated as `scope`. Empty by default, in which case no `scope` is sent.
    pub scopes: Vec<String>,
    /// Must equal the offer's `issuer_state` when the offer carries one.
    pub issuer_state: Option<String>,
}

/// Options of the credential requests.
#[derive(Debug, Clone, Default)]
pub struct RequestCredentialOptions {
    /// Required when the offer's pre-authorized code grant requires a PIN.
    pub pin: Option<String>,
}

/// Options of [present_credential](crate::presentation::PresentationInteraction::present_credential).
#[derive(Debug, Clone, Default)]
pub struct PresentCredentialOptions {
    /// Skip evaluation of the input descriptors' constraint fields, keeping format and schema
    /// checks. For callers that already selected credentials themselves.
    pub ignore_constraints: bool,
}

/// A url that is always a base (can be safely join()'ed with further path elements without
/// mangling).
#[derive(Serialize, Deserialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct BaseUrl(Url);

impl BaseUrl {
    /// The url as given, without the trailing slash added for joining.
    pub fn as_identifier(&self) -> &str {
        let s = self.0.as_str();
        s.strip_suffix('/').unwrap_or(s)
    }

    /// Join a relative path such as `.well-known/openid-credential-issuer`.
    pub fn join_path(&self, path: &str) -> Result<Url, url::ParseError> {
        self.0.join(path)
    }
}

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        // Make URL a base.
        if !url.ends_with('/') {
            url += "/"
        }
        url.parse().map(Self)
    }
}

impl TryFrom<&str> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(url: &str) -> Result<Self, Self::Error> {
        url.to_owned().try_into()
    }
}

impl From<BaseUrl> for String {
    fn from(url: BaseUrl) -> Self {
        url.as_identifier().to_owned()
    }
}
