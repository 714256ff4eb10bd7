use anyhow::{anyhow, Context};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use url::Url;

use super::{
    metadata::{CredentialDefinition, IssuerMetadata},
    offer::OfferedCredential,
    proof::build_proof,
    server_error, MODULE,
};
use crate::{
    core::{
        credential::{Credential, CredentialCodec, ParseOptions},
        credential_format::CredentialFormat,
        jws::JwtSigner,
        util::{post_json, AsyncHttpClient},
    },
    error::{Scenario, WalletError, WalletResult, WalletResultExt},
};

/// Attempts per credential request: the first one and a single retry after `invalid_proof`.
pub const MAX_ATTEMPTS: usize = 2;

/// A credential endpoint response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialResponse {
    /// A compact JWT or a JSON-LD document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<Json>,
    #[serde(default, alias = "ack_id", skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_nonce_expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BatchCredentialResponse {
    credential_responses: Vec<CredentialResponse>,
    #[serde(default)]
    c_nonce: Option<String>,
    #[serde(default)]
    c_nonce_expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
struct CredentialRequest<'a> {
    format: &'a CredentialFormat,
    credential_definition: CredentialDefinition,
    proof: JwtProof,
}

#[derive(Debug, Serialize)]
struct JwtProof {
    proof_type: &'static str,
    jwt: String,
}

#[derive(Debug, Serialize)]
struct BatchCredentialRequest<'a> {
    credential_requests: Vec<CredentialRequest<'a>>,
}

impl<'a> CredentialRequest<'a> {
    fn new(credential: &'a OfferedCredential, jwt: String) -> Self {
        let context = if credential.format.uses_json_ld_context() {
            credential.context.clone()
        } else {
            Vec::new()
        };
        Self {
            format: &credential.format,
            credential_definition: CredentialDefinition {
                types: credential.types.clone(),
                context,
            },
            proof: JwtProof {
                proof_type: "jwt",
                jwt,
            },
        }
    }
}

/// Requests the offered credentials with one access token.
pub(crate) struct CredentialRequester<'a> {
    pub http_client: &'a dyn AsyncHttpClient,
    pub metadata: &'a IssuerMetadata,
    pub access_token: &'a str,
    pub signer: &'a JwtSigner,
    /// Sent as the proof `iss` in the authorization code flow.
    pub client_id: Option<&'a str>,
}

impl CredentialRequester<'_> {
    /// Request every credential in offer order.
    ///
    /// `nonce` is the nonce the next proof binds. It is replaced by every `c_nonce` the issuer
    /// sends, so that it stays current across requests.
    pub async fn request(
        &self,
        credentials: &[OfferedCredential],
        nonce: &mut Option<String>,
    ) -> WalletResult<Vec<CredentialResponse>> {
        if credentials.len() > 1 {
            if let Some(endpoint) = self.metadata.batch_credential_endpoint() {
                return self.request_batch(endpoint, credentials, nonce).await;
            }
        }

        let endpoint = self.metadata.credential_endpoint();
        let mut responses = Vec::with_capacity(credentials.len());
        for (index, credential) in credentials.iter().enumerate() {
            tracing::debug!(
                index,
                total = credentials.len(),
                format = %credential.format,
                "requesting credential"
            );
            let body = self
                .send(endpoint, nonce, |jwt| CredentialRequest::new(credential, jwt))
                .await?;

            let response: CredentialResponse = serde_json::from_slice(&body)
                .with_context(|| {
                    format!(
                        "failed to parse response from the issuer's credential endpoint \
                         for credential {index}"
                    )
                })
                .execution_err(MODULE, Scenario::CredentialFetchFailed)?;
            if let Some(c_nonce) = &response.c_nonce {
                *nonce = Some(c_nonce.clone());
            }
            responses.push(response);
        }

        Ok(responses)
    }

    async fn request_batch(
        &self,
        endpoint: &Url,
        credentials: &[OfferedCredential],
        nonce: &mut Option<String>,
    ) -> WalletResult<Vec<CredentialResponse>> {
        tracing::debug!(total = credentials.len(), "requesting credentials in batch");
        let body = self
            .send(endpoint, nonce, |jwt| BatchCredentialRequest {
                credential_requests: credentials
                    .iter()
                    .map(|credential| CredentialRequest::new(credential, jwt.clone()))
                    .collect(),
            })
            .await?;

        let batch: BatchCredentialResponse = serde_json::from_slice(&body)
            .context("failed to parse response from the issuer's batch credential endpoint")
            .execution_err(MODULE, Scenario::CredentialFetchFailed)?;
        if batch.credential_responses.len() != credentials.len() {
            return Err(WalletError::execution(
                MODULE,
                Scenario::CredentialFetchFailed,
                anyhow!(
                    "issuer returned {} credentials for {} requested",
                    batch.credential_responses.len(),
                    credentials.len()
                ),
            ));
        }
        if let Some(c_nonce) = &batch.c_nonce {
            *nonce = Some(c_nonce.clone());
        }

        Ok(batch
            .credential_responses
            .into_iter()
            .map(|response| CredentialResponse {
                c_nonce: response.c_nonce.or_else(|| batch.c_nonce.clone()),
                c_nonce_expires_in: response.c_nonce_expires_in.or(batch.c_nonce_expires_in),
                ..response
            })
            .collect())
    }

    /// POST a request body around a fresh proof, retrying once when the issuer rejects the
    /// proof and supplies a new nonce.
    async fn send<B: Serialize>(
        &self,
        endpoint: &Url,
        nonce: &mut Option<String>,
        body: impl Fn(String) -> B,
    ) -> WalletResult<Vec<u8>> {
        let audience = self.metadata.credential_issuer();
        let endpoint_name = endpoint.as_str();

        let mut attempt = 1;
        loop {
            let jwt = build_proof(self.signer, audience, nonce.as_deref(), self.client_id).await?;
            let started = std::time::Instant::now();

            let reply = post_json(self.http_client, endpoint, &body(jwt), Some(self.access_token))
                .await
                .context("credential request failed")
                .execution_err(MODULE, Scenario::CredentialFetchFailed)?;
            tracing::debug!(
                %endpoint,
                attempt,
                status = reply.status.as_u16(),
                duration_ms = started.elapsed().as_millis() as u64,
                "credential endpoint replied"
            );

            if reply.status == StatusCode::OK || reply.status == StatusCode::CREATED {
                return Ok(reply.body);
            }

            let err = server_error::credential_error(&reply, endpoint_name);
            match err.fresh_nonce() {
                Some(fresh)
                    if err.scenario() == Scenario::InvalidProof && attempt < MAX_ATTEMPTS =>
                {
                    tracing::info!(
                        attempt,
                        "issuer rejected the proof, retrying with its new nonce"
                    );
                    *nonce = Some(fresh.to_owned());
                    attempt += 1;
                }
                _ => return Err(err),
            }
        }
    }
}

/// Parse the credentials of `responses`, expected in the formats of `offered`.
pub(crate) async fn decode_credentials(
    codec: &dyn CredentialCodec,
    responses: &[CredentialResponse],
    offered: &[OfferedCredential],
    check_proof: bool,
) -> WalletResult<Vec<Credential>> {
    let mut credentials = Vec::with_capacity(responses.len());
    for (index, response) in responses.iter().enumerate() {
        let bytes = match &response.credential {
            Some(Json::String(jwt)) => jwt.clone().into_bytes(),
            Some(document @ Json::Object(_)) => serde_json::to_vec(document)
                .with_context(|| format!("unable to serialize credential at index {index}"))
                .execution_err(MODULE, Scenario::CredentialParseFailed)?,
            Some(other) => {
                return Err(WalletError::execution(
                    MODULE,
                    Scenario::CredentialParseFailed,
                    anyhow!(
                        "credential at index {index} is neither a string nor an object: {other}"
                    ),
                ))
            }
            None => {
                return Err(WalletError::execution(
                    MODULE,
                    Scenario::CredentialParseFailed,
                    anyhow!("response at index {index} contains no credential"),
                ))
            }
        };

        let options = ParseOptions {
            check_proof,
            format: offered.get(index).map(|c| c.format.clone()),
        };
        let credential = codec
            .parse(&bytes, &options)
            .await
            .with_context(|| format!("failed to parse credential at index {index}"))
            .execution_err(MODULE, Scenario::CredentialParseFailed)?;
        credentials.push(credential);
    }

    if credentials.is_empty() {
        return Err(WalletError::execution(
            MODULE,
            Scenario::CredentialParseFailed,
            anyhow!("issuer returned no credentials"),
        ));
    }

    Ok(credentials)
}
