use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::{json, Value as Json};
use uuid::Uuid;

use super::request::RequestObject;
use crate::{
    core::{
        credential::{Credential, DataIntegrityProver},
        credential_format::CredentialFormat,
        did::{DidDocument, DidResolver},
        jws::{JwtSigner, Signer},
        presentation_definition::{DefinitionMatch, PresentationDefinition},
        presentation_submission::{DescriptorMap, PresentationSubmission},
    },
    utils::now_secs,
};

pub const TOKEN_LIFETIME_SECS: u64 = 600;
pub const SELF_ISSUED_V2: &str = "https://self-issued.me/v2/openid-vc";
const CREDENTIALS_V1: &str = "https://www.w3.org/2018/credentials/v1";

/// The tokens of an authorization response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedResponse {
    pub id_token: String,
    /// A single JWS, or a JSON array of JWS when several holders present.
    pub vp_token: String,
    pub state: Option<String>,
}

#[derive(Serialize)]
struct IdTokenClaims<'a> {
    #[serde(rename = "_vp_token")]
    vp_token: IdTokenVpToken<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<&'a str>,
    exp: u64,
    iss: &'static str,
    sub: &'a str,
    aud: &'a str,
    nbf: u64,
    iat: u64,
    jti: String,
}

#[derive(Serialize)]
struct IdTokenVpToken<'a> {
    presentation_submission: &'a PresentationSubmission,
}

#[derive(Serialize)]
struct VpTokenClaims<'a> {
    vp: &'a Json,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<&'a str>,
    exp: u64,
    iss: &'a str,
    aud: &'a str,
    nbf: u64,
    iat: u64,
    jti: String,
}

/// The credentials one holder presents, with indices into the presented list.
struct HolderGroup<'c> {
    did: &'c str,
    credentials: Vec<(usize, &'c Credential)>,
}

struct Holder {
    did: String,
    document: DidDocument,
    signer: JwtSigner,
}

pub(crate) struct PresentationBuilder<'a> {
    pub request: &'a RequestObject,
    pub did_resolver: &'a dyn DidResolver,
    pub signer: Arc<dyn Signer>,
    pub prover: Option<&'a dyn DataIntegrityProver>,
}

impl PresentationBuilder<'_> {
    /// Build the authorization response for the credentials satisfying the request's
    /// presentation definition. Credentials that satisfy no input descriptor are left out.
    pub async fn build(
        &self,
        credentials: &[Credential],
        ignore_constraints: bool,
    ) -> Result<AuthorizedResponse> {
        let definition = self
            .request
            .presentation_definition()
            .context("request has no presentation definition")?;
        if credentials.is_empty() {
            bail!("expected at least one credential to present to the verifier")
        }

        let matched = definition.match_credentials(credentials, ignore_constraints)?;
        let selected: Vec<(usize, &Credential)> = matched
            .credential_indices()
            .into_iter()
            .map(|index| (index, &credentials[index]))
            .collect();

        if let [(index, credential)] = selected.as_slice() {
            self.single(definition, &matched, *index, credential).await
        } else {
            self.multiple(definition, &matched, &selected).await
        }
    }

    async fn single(
        &self,
        definition: &PresentationDefinition,
        matched: &DefinitionMatch,
        index: usize,
        credential: &Credential,
    ) -> Result<AuthorizedResponse> {
        let holder = self.holder(subject_id(credential)?).await?;
        let vp = self.presentation(&holder, &[credential]).await?;

        let descriptor_map = matched
            .inputs()
            .iter()
            .filter(|(_, indices)| indices.contains(&index))
            .map(|(id, _)| {
                DescriptorMap::new(
                    id.as_str(),
                    credential.format().clone(),
                    "$.verifiableCredential[0]",
                )
            })
            .collect();
        let submission =
            PresentationSubmission::new(Uuid::new_v4(), definition.id().clone(), descriptor_map);

        let vp_token = self.vp_token(&holder, &vp).await?;
        let id_token = self.id_token(&holder, &submission).await?;
        tracing::debug!(holder = %holder.did, "built presentation");
        Ok(AuthorizedResponse {
            id_token,
            vp_token,
            state: self.request.state().map(str::to_owned),
        })
    }

    async fn multiple(
        &self,
        definition: &PresentationDefinition,
        matched: &DefinitionMatch,
        selected: &[(usize, &Credential)],
    ) -> Result<AuthorizedResponse> {
        let groups = group_by_holder(selected)?;

        let mut holders = Vec::with_capacity(groups.len());
        let mut vp_tokens = Vec::with_capacity(groups.len());
        for group in &groups {
            let holder = self.holder(group.did).await?;
            let credentials: Vec<&Credential> =
                group.credentials.iter().map(|(_, c)| *c).collect();
            let vp = self.presentation(&holder, &credentials).await?;
            vp_tokens.push(self.vp_token(&holder, &vp).await?);
            holders.push(holder);
        }

        let descriptor_map = matched
            .inputs()
            .iter()
            .filter_map(|(id, indices)| {
                groups.iter().enumerate().find_map(|(vp_index, group)| {
                    group
                        .credentials
                        .iter()
                        .position(|(index, _)| indices.contains(index))
                        .map(|vc_index| {
                            let format = group.credentials[vc_index].1.format().clone();
                            let nested = DescriptorMap::new(
                                id.as_str(),
                                format,
                                format!("$.verifiableCredential[{vc_index}]"),
                            );
                            DescriptorMap::new(
                                id.as_str(),
                                CredentialFormat::JwtVp,
                                format!("$[{vp_index}]"),
                            )
                            .set_path_nested(nested)
                        })
                })
            })
            .collect();
        let submission =
            PresentationSubmission::new(Uuid::new_v4(), definition.id().clone(), descriptor_map);

        let id_token_holder = holders
            .choose(&mut rand::thread_rng())
            .context("no holder to sign the id_token")?;
        let id_token = self.id_token(id_token_holder, &submission).await?;

        tracing::debug!(
            holders = holders.len(),
            id_token_signer = %id_token_holder.did,
            "built presentations"
        );
        Ok(AuthorizedResponse {
            id_token,
            vp_token: serde_json::to_string(&vp_tokens).context("unable to serialize vp_token")?,
            state: self.request.state().map(str::to_owned),
        })
    }

    /// Resolve `did` and sign with its first assertion method.
    async fn holder(&self, did: &str) -> Result<Holder> {
        let document = self
            .did_resolver
            .resolve(did)
            .await
            .with_context(|| format!("failed to resolve holder DID {did} for signing"))?;
        let method = document
            .assertion_methods()
            .first()
            .copied()
            .with_context(|| format!("holder DID {did} has no assertion method for signing"))?;
        let key_id = document.absolute_id(method);

        Ok(Holder {
            did: did.to_owned(),
            signer: JwtSigner::new(self.signer.clone(), key_id),
            document,
        })
    }

    async fn presentation(&self, holder: &Holder, credentials: &[&Credential]) -> Result<Json> {
        let vp = json!({
            "@context": [CREDENTIALS_V1],
            "type": ["VerifiablePresentation"],
            "id": format!("urn:uuid:{}", Uuid::new_v4()),
            "holder": holder.did,
            "verifiableCredential": credentials
                .iter()
                .map(|credential| credential.to_presentation_entry())
                .collect::<Vec<_>>(),
        });

        match self.prover {
            Some(prover) if self.request.accepts_ldp_vp() => {
                let method = holder
                    .document
                    .verification_method(holder.signer.key_id())
                    .context("holder signing key is not in its DID document")?;
                prover
                    .add_proof(
                        vp,
                        method,
                        self.request.nonce().unwrap_or_default(),
                        self.request.client_id(),
                    )
                    .await
                    .context("failed to add a Data Integrity proof to the presentation")
            }
            _ => Ok(vp),
        }
    }

    async fn vp_token(&self, holder: &Holder, vp: &Json) -> Result<String> {
        let now = now_secs()?;
        let claims = VpTokenClaims {
            vp,
            nonce: self.request.nonce(),
            exp: now + TOKEN_LIFETIME_SECS,
            iss: &holder.did,
            aud: self.request.client_id(),
            nbf: now,
            iat: now,
            jti: Uuid::new_v4().to_string(),
        };
        holder
            .signer
            .sign_jwt(None, &claims)
            .await
            .context("failed to sign vp_token")
    }

    async fn id_token(
        &self,
        holder: &Holder,
        submission: &PresentationSubmission,
    ) -> Result<String> {
        let now = now_secs()?;
        let claims = IdTokenClaims {
            vp_token: IdTokenVpToken {
                presentation_submission: submission,
            },
            nonce: self.request.nonce(),
            exp: now + TOKEN_LIFETIME_SECS,
            iss: SELF_ISSUED_V2,
            sub: &holder.did,
            aud: self.request.client_id(),
            nbf: now,
            iat: now,
            jti: Uuid::new_v4().to_string(),
        };
        holder
            .signer
            .sign_jwt(None, &claims)
            .await
            .context("failed to sign id_token")
    }
}

fn subject_id(credential: &Credential) -> Result<&str> {
    match credential.subject_id() {
        Some(did) if !did.is_empty() => Ok(did),
        _ => bail!(
            "credential {} does not have a subject ID",
            credential.id().unwrap_or("without id")
        ),
    }
}

/// Group credentials by holder DID, holders in order of first appearance.
fn group_by_holder<'c>(selected: &[(usize, &'c Credential)]) -> Result<Vec<HolderGroup<'c>>> {
    let mut groups: Vec<HolderGroup<'c>> = Vec::new();
    for &(index, credential) in selected {
        let did = subject_id(credential)?;
        match groups.iter_mut().find(|group| group.did == did) {
            Some(group) => group.credentials.push((index, credential)),
            None => groups.push(HolderGroup {
                did,
                credentials: vec![(index, credential)],
            }),
        }
    }
    Ok(groups)
}
