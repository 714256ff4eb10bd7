use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::{
    credential_format::CredentialFormat,
    did::VerificationMethod,
    jws::{DecodedJws, JwsVerifier},
};
use crate::utils::OneOrMany;

/// How a credential travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CredentialEncoding {
    /// A compact JWT.
    Jwt(String),
    /// A JSON-LD document with an embedded proof.
    JsonLd(Json),
}

/// A parsed verifiable credential.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    format: CredentialFormat,
    encoded: CredentialEncoding,
    /// The W3C VC data model document, i.e. the `vc` claim of a JWT credential.
    document: Json,
    /// The JWT claim set, for JWT credentials.
    jwt_claims: Option<Json>,
}

impl Credential {
    /// Parse a JWT credential without checking its signature.
    pub fn from_jwt(jwt: &str, format: CredentialFormat) -> Result<Self> {
        let decoded = DecodedJws::decode(jwt).context("credential is not a valid JWT")?;
        Self::from_decoded(jwt, decoded, format)
    }

    fn from_decoded(jwt: &str, decoded: DecodedJws, format: CredentialFormat) -> Result<Self> {
        let document = decoded
            .claims
            .get("vc")
            .cloned()
            .context("JWT credential has no 'vc' claim")?;
        if !document.is_object() {
            bail!("'vc' claim is not a JSON object")
        }

        Ok(Self {
            format,
            encoded: CredentialEncoding::Jwt(jwt.trim().to_owned()),
            document,
            jwt_claims: Some(decoded.claims),
        })
    }

    /// Wrap a JSON-LD credential document.
    pub fn from_json_ld(document: Json) -> Result<Self> {
        if !document.is_object() {
            bail!("JSON-LD credential is not a JSON object")
        }
        if document.get("credentialSubject").is_none() {
            bail!("JSON-LD credential has no 'credentialSubject'")
        }

        Ok(Self {
            format: CredentialFormat::LdpVc,
            encoded: CredentialEncoding::JsonLd(document.clone()),
            document,
            jwt_claims: None,
        })
    }

    pub fn format(&self) -> &CredentialFormat {
        &self.format
    }

    pub fn encoded(&self) -> &CredentialEncoding {
        &self.encoded
    }

    /// The value embedded in a presentation's `verifiableCredential` list.
    pub fn to_presentation_entry(&self) -> Json {
        match &self.encoded {
            CredentialEncoding::Jwt(jwt) => Json::String(jwt.clone()),
            CredentialEncoding::JsonLd(document) => document.clone(),
        }
    }

    pub fn document(&self) -> &Json {
        &self.document
    }

    pub fn jwt_claims(&self) -> Option<&Json> {
        self.jwt_claims.as_ref()
    }

    pub fn id(&self) -> Option<&str> {
        self.document
            .get("id")
            .and_then(Json::as_str)
            .or_else(|| self.jwt_claim("jti"))
    }

    pub fn types(&self) -> Vec<String> {
        string_list(self.document.get("type"))
    }

    pub fn contexts(&self) -> Vec<String> {
        string_list(self.document.get("@context"))
    }

    /// The issuer id, whether `issuer` is a string or an object with an `id`.
    pub fn issuer(&self) -> Option<&str> {
        match self.document.get("issuer") {
            Some(Json::String(issuer)) => Some(issuer),
            Some(Json::Object(issuer)) => issuer.get("id").and_then(Json::as_str),
            _ => self.jwt_claim("iss"),
        }
    }

    /// The subject id, which is the holder DID for holder bound credentials.
    ///
    /// When `credentialSubject` is a list, the first subject's id is used.
    pub fn subject_id(&self) -> Option<&str> {
        let subject = match self.document.get("credentialSubject") {
            Some(Json::Array(subjects)) => subjects.first(),
            other => other,
        };
        subject
            .and_then(|s| s.get("id"))
            .and_then(Json::as_str)
            .or_else(|| self.jwt_claim("sub"))
    }

    fn jwt_claim(&self, name: &str) -> Option<&str> {
        self.jwt_claims.as_ref()?.get(name)?.as_str()
    }
}

fn string_list(value: Option<&Json>) -> Vec<String> {
    value
        .cloned()
        .and_then(|v| serde_json::from_value::<OneOrMany<Json>>(v).ok())
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| match v {
            Json::String(s) => Some(s),
            _ => None,
        })
        .collect()
}

/// Options for [CredentialCodec::parse].
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Verify the credential's proof or signature.
    pub check_proof: bool,
    /// The format the credential is expected in, if known.
    pub format: Option<CredentialFormat>,
}

/// Parses serialized credentials.
#[async_trait]
pub trait CredentialCodec: Send + Sync {
    async fn parse(&self, bytes: &[u8], options: &ParseOptions) -> Result<Credential>;
}

/// Parses JWT credentials, checking their signature with a [JwsVerifier], and JSON-LD
/// credentials structurally.
///
/// Data Integrity proofs need JSON-LD processing, so a JSON-LD credential is only accepted when
/// `check_proof` is off. Wallets that receive `ldp_vc` credentials with proof checks enabled
/// provide their own codec.
#[derive(Clone)]
pub struct JwtCredentialCodec {
    verifier: Arc<dyn JwsVerifier>,
}

impl JwtCredentialCodec {
    pub fn new(verifier: Arc<dyn JwsVerifier>) -> Self {
        Self { verifier }
    }
}

#[async_trait]
impl CredentialCodec for JwtCredentialCodec {
    async fn parse(&self, bytes: &[u8], options: &ParseOptions) -> Result<Credential> {
        let text = std::str::from_utf8(bytes).context("credential is not valid UTF-8")?;
        let text = text.trim();

        if text.starts_with('{') {
            if options.check_proof {
                bail!(
                    "checking Data Integrity proofs of JSON-LD credentials requires a custom \
                     CredentialCodec"
                )
            }
            let document = serde_json::from_str(text).context("credential is not valid JSON")?;
            return Credential::from_json_ld(document);
        }

        let decoded = DecodedJws::decode(text).context("credential is not a valid JWT")?;
        if options.check_proof {
            decoded
                .verify(self.verifier.as_ref())
                .await
                .context("credential signature check failed")?;
        }

        let format = options.format.clone().unwrap_or(CredentialFormat::JwtVcJson);
        Credential::from_decoded(text, decoded, format)
    }
}

/// Adds a Data Integrity proof to a presentation.
///
/// Only used when the verifier accepts `ldp_vp` presentations.
#[async_trait]
pub trait DataIntegrityProver: Send + Sync {
    async fn add_proof(
        &self,
        presentation: Json,
        verification_method: &VerificationMethod,
        challenge: &str,
        domain: &str,
    ) -> Result<Json>;
}
