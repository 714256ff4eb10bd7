//! Linked domain verification of the issuer's DID.
//!
//! The issuer DID is taken from the key id of the signed issuer metadata. Its DID document may
//! declare a `LinkedDomains` service, whose origin must serve a DID configuration
//! (`/.well-known/did-configuration.json`) holding a domain linkage credential for the DID.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use url::Url;

use super::offer::OfferedCredential;
use crate::{
    core::{
        credential::{CredentialCodec, ParseOptions},
        did::{DidResolver, LINKED_DOMAINS},
        jws::{did_of_key_id, DecodedJws, JwsVerifier},
        util::{get_ok, AsyncHttpClient},
    },
    error::{ErrorModule, Scenario, WalletError, WalletResult, WalletResultExt},
};

const MODULE: ErrorModule = ErrorModule::Did;
const DID_CONFIGURATION_PATH: &str = "/.well-known/did-configuration.json";
const DOMAIN_LINKAGE_CREDENTIAL: &str = "DomainLinkageCredential";

/// The outcome of a linked domain check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedDomain {
    pub valid: bool,
    /// The verified origin, empty when the DID declares no linked domain.
    pub domain: String,
}

/// What a wallet shows the user before accepting an offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuerTrustInfo {
    pub did: String,
    pub domain: String,
    pub offered: Vec<OfferedCredential>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DidConfiguration {
    #[serde(default)]
    linked_dids: Vec<Json>,
}

pub(crate) struct IssuerTrustEvaluator<'a> {
    pub http_client: &'a dyn AsyncHttpClient,
    pub did_resolver: &'a dyn DidResolver,
    pub jws_verifier: &'a dyn JwsVerifier,
    pub credential_codec: &'a dyn CredentialCodec,
}

impl IssuerTrustEvaluator<'_> {
    /// Check the linked domain of the DID in `jwt_kid`.
    pub async fn verify(&self, jwt_kid: Option<&str>) -> WalletResult<LinkedDomain> {
        let did = issuer_did(jwt_kid)?;

        let document = self
            .did_resolver
            .resolve(did)
            .await
            .with_context(|| format!("failed to resolve issuer DID {did}"))
            .execution_err(MODULE, Scenario::DidResolutionFailed)?;

        let services = document.services_of_type(LINKED_DOMAINS);
        let service = match services.as_slice() {
            [] => {
                tracing::debug!(%did, "issuer DID declares no linked domain");
                return Ok(LinkedDomain {
                    valid: false,
                    domain: String::new(),
                });
            }
            [service] => *service,
            _ => {
                return Err(WalletError::execution(
                    MODULE,
                    Scenario::DomainAndDidVerificationFailed,
                    anyhow!("DID {did} declares more than one {LINKED_DOMAINS} service"),
                ))
            }
        };

        let origin = service
            .origins()
            .into_iter()
            .next()
            .with_context(|| format!("{LINKED_DOMAINS} service {} has no origin", service.id))
            .execution_err(MODULE, Scenario::DomainAndDidVerificationFailed)?;

        let configuration = self
            .fetch_configuration(&origin)
            .await
            .execution_err(MODULE, Scenario::WellKnownInitializationFailed)?;

        for (index, linked_did) in configuration.linked_dids.iter().enumerate() {
            match self.check_linkage(linked_did, did, &origin).await {
                Ok(()) => {
                    tracing::info!(%did, %origin, "issuer domain verified");
                    return Ok(LinkedDomain {
                        valid: true,
                        domain: origin,
                    });
                }
                Err(e) => tracing::debug!(index, "domain linkage credential rejected: {e:#}"),
            }
        }

        Err(WalletError::execution(
            MODULE,
            Scenario::DomainAndDidVerificationFailed,
            anyhow!("no valid domain linkage credential for {did} at {origin}"),
        ))
    }

    async fn fetch_configuration(&self, origin: &str) -> Result<DidConfiguration> {
        let url = Url::parse(origin)
            .and_then(|origin| origin.join(DID_CONFIGURATION_PATH))
            .with_context(|| format!("invalid linked domain origin '{origin}'"))?;
        let body = get_ok(self.http_client, &url)
            .await
            .context("failed to fetch DID configuration")?;
        serde_json::from_slice(&body).context("invalid DID configuration")
    }

    async fn check_linkage(&self, linked_did: &Json, did: &str, origin: &str) -> Result<()> {
        let (issuer, subject, credential_subject) = match linked_did {
            Json::String(jwt) => {
                let jws = DecodedJws::decode(jwt)?;
                jws.verify(self.jws_verifier).await?;
                let vc = jws.claims.get("vc").context("linkage JWT has no 'vc' claim")?;
                check_types(vc)?;
                (
                    jws.claims.get("iss").and_then(Json::as_str).map(ToOwned::to_owned),
                    jws.claims.get("sub").and_then(Json::as_str).map(ToOwned::to_owned),
                    vc.get("credentialSubject").cloned(),
                )
            }
            Json::Object(_) => {
                let bytes = serde_json::to_vec(linked_did)?;
                let credential = self
                    .credential_codec
                    .parse(
                        &bytes,
                        &ParseOptions {
                            check_proof: true,
                            format: None,
                        },
                    )
                    .await?;
                check_types(credential.document())?;
                (
                    credential.issuer().map(ToOwned::to_owned),
                    credential.subject_id().map(ToOwned::to_owned),
                    credential.document().get("credentialSubject").cloned(),
                )
            }
            other => bail!("unexpected linked_dids entry {other}"),
        };

        if let Some(issuer) = issuer {
            if issuer != did {
                bail!("linkage credential issuer {issuer} is not {did}")
            }
        }
        if let Some(subject) = subject {
            if subject != did {
                bail!("linkage credential subject {subject} is not {did}")
            }
        }

        let credential_subject =
            credential_subject.context("linkage credential has no credentialSubject")?;
        let subject_id = credential_subject.get("id").and_then(Json::as_str);
        if subject_id != Some(did) {
            bail!("linkage credentialSubject.id does not name {did}")
        }
        let linked_origin = credential_subject
            .get("origin")
            .and_then(Json::as_str)
            .context("linkage credentialSubject has no origin")?;
        if linked_origin.trim_end_matches('/') != origin.trim_end_matches('/') {
            bail!("linkage origin {linked_origin} is not {origin}")
        }

        Ok(())
    }
}

fn check_types(vc: &Json) -> Result<()> {
    let has_type = match vc.get("type") {
        Some(Json::String(t)) => t == DOMAIN_LINKAGE_CREDENTIAL,
        Some(Json::Array(types)) => types
            .iter()
            .any(|t| t.as_str() == Some(DOMAIN_LINKAGE_CREDENTIAL)),
        _ => false,
    };
    if !has_type {
        bail!("credential is not a {DOMAIN_LINKAGE_CREDENTIAL}")
    }
    Ok(())
}

/// The DID part of the signed metadata key id.
pub(crate) fn issuer_did(jwt_kid: Option<&str>) -> WalletResult<&str> {
    let kid = jwt_kid
        .context("issuer metadata is not signed, the issuer DID is unknown")
        .execution_err(MODULE, Scenario::WellKnownInitializationFailed)?;
    did_of_key_id(kid).execution_err(MODULE, Scenario::DidResolutionFailed)
}
