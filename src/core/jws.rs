use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::prelude::*;
use p256::ecdsa::{
    signature::{Signer as _, Verifier as _},
    Signature, SigningKey, VerifyingKey,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value as Json};
use ssi::jwk::JWK;

use super::did::DidResolver;

pub const ES256: &str = "ES256";

/// Produces raw signatures with keys the wallet holds.
///
/// Key storage is the implementor's concern; the key is addressed through its key id
/// (a DID URL such as `did:example:holder#key-1`).
#[async_trait]
pub trait Signer: Send + Sync {
    /// The JWS `alg` of the signatures this signer produces.
    fn alg(&self) -> &str;

    async fn sign(&self, payload: &[u8], key_id: &str) -> Result<Vec<u8>>;
}

/// A [Signer] bound to one key id, producing compact JWS strings.
#[derive(Clone)]
pub struct JwtSigner {
    signer: Arc<dyn Signer>,
    key_id: String,
}

impl std::fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSigner")
            .field("key_id", &self.key_id)
            .field("alg", &self.signer.alg())
            .finish()
    }
}

impl JwtSigner {
    pub fn new(signer: Arc<dyn Signer>, key_id: impl Into<String>) -> Self {
        Self {
            signer,
            key_id: key_id.into(),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// The DID part of the key id.
    pub fn did(&self) -> Result<&str> {
        did_of_key_id(&self.key_id)
    }

    /// Sign `claims` as a JWT with an optional `typ` header.
    pub async fn sign_jwt(&self, typ: Option<&str>, claims: &impl Serialize) -> Result<String> {
        let mut header = Map::new();
        header.insert("alg".into(), self.signer.alg().into());
        header.insert("kid".into(), self.key_id.clone().into());
        if let Some(typ) = typ {
            header.insert("typ".into(), typ.into());
        }

        let header = BASE64_URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(&header).context("unable to serialize jwt header")?);
        let payload = BASE64_URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(claims).context("unable to serialize jwt claims")?);
        let signing_input = format!("{header}.{payload}");

        let signature = self
            .signer
            .sign(signing_input.as_bytes(), &self.key_id)
            .await
            .context("signer failed to sign jwt")?;

        Ok(format!(
            "{signing_input}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(signature)
        ))
    }
}

/// Split a DID URL key id into its DID.
pub fn did_of_key_id(key_id: &str) -> Result<&str> {
    match key_id.split_once('#') {
        Some((did, _)) if did.starts_with("did:") => Ok(did),
        _ => bail!("key id '{key_id}' does not contain a DID part"),
    }
}

/// ES256 [Signer] over an in-memory p256 key.
#[derive(Debug, Clone)]
pub struct P256Signer {
    key: SigningKey,
}

impl P256Signer {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn generate() -> Self {
        Self::new(SigningKey::random(&mut rand::thread_rng()))
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.key.verifying_key()
    }

    /// The public key as a JWK, suitable for a DID document `publicKeyJwk`.
    pub fn jwk(&self) -> Result<JWK> {
        let pk = p256::PublicKey::from(self.key.verifying_key());
        serde_json::from_str(&pk.to_jwk_string()).context("unable to convert public key to jwk")
    }
}

#[async_trait]
impl Signer for P256Signer {
    fn alg(&self) -> &str {
        ES256
    }

    async fn sign(&self, payload: &[u8], _key_id: &str) -> Result<Vec<u8>> {
        let signature: Signature = self.key.sign(payload);
        Ok(signature.to_bytes().to_vec())
    }
}

/// A compact JWS split into its parts.
#[derive(Debug, Clone)]
pub struct DecodedJws {
    pub header: Map<String, Json>,
    pub claims: Json,
    pub signing_input: String,
    pub signature: Vec<u8>,
}

impl DecodedJws {
    pub fn decode(jws: &str) -> Result<Self> {
        let (header_b64, payload_b64, signature_b64) = ssi::claims::jws::split_jws(jws.trim())?;

        let header_bytes = BASE64_URL_SAFE_NO_PAD
            .decode(header_b64)
            .context("jwt headers were not valid base64url")?;
        let header = serde_json::from_slice::<Map<String, Json>>(&header_bytes)
            .context("jwt headers were not valid json")?;

        let payload_bytes = BASE64_URL_SAFE_NO_PAD
            .decode(payload_b64)
            .context("jwt payload was not valid base64url")?;
        let claims =
            serde_json::from_slice(&payload_bytes).context("jwt payload was not valid json")?;

        let signature = BASE64_URL_SAFE_NO_PAD
            .decode(signature_b64)
            .context("jwt signature was not valid base64url")?;

        Ok(Self {
            header,
            claims,
            signing_input: format!("{header_b64}.{payload_b64}"),
            signature,
        })
    }

    pub fn alg(&self) -> Result<&str> {
        let Some(Json::String(alg)) = self.header.get("alg") else {
            bail!("'alg' was missing from jwt headers")
        };
        Ok(alg)
    }

    pub fn kid(&self) -> Result<&str> {
        let Some(Json::String(kid)) = self.header.get("kid") else {
            bail!("'kid' was missing from jwt headers")
        };
        Ok(kid)
    }

    pub fn claims_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.claims.clone()).context("unable to decode jwt claims")
    }

    pub async fn verify(&self, verifier: &dyn JwsVerifier) -> Result<()> {
        verifier
            .verify(&self.header, self.signing_input.as_bytes(), &self.signature)
            .await
    }
}

/// Verifies JWS signatures from remote parties (issuers, verifiers).
#[async_trait]
pub trait JwsVerifier: Send + Sync {
    async fn verify(
        &self,
        header: &Map<String, Json>,
        signing_input: &[u8],
        signature: &[u8],
    ) -> Result<()>;
}

/// Verifies ES256 signatures against the verification method named by the `kid` header,
/// looked up through a [DidResolver].
#[derive(Clone)]
pub struct DidJwsVerifier {
    resolver: Arc<dyn DidResolver>,
}

impl DidJwsVerifier {
    pub fn new(resolver: Arc<dyn DidResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl JwsVerifier for DidJwsVerifier {
    async fn verify(
        &self,
        header: &Map<String, Json>,
        signing_input: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let Some(Json::String(alg)) = header.get("alg") else {
            bail!("'alg' was missing from jwt headers")
        };
        if alg != ES256 {
            bail!("unsupported jws algorithm: {alg}")
        }

        let Some(Json::String(kid)) = header.get("kid") else {
            bail!("'kid' was missing from jwt headers")
        };
        let did = did_of_key_id(kid)?;

        let document = self
            .resolver
            .resolve(did)
            .await
            .with_context(|| format!("unable to resolve {did}"))?;
        let method = document
            .verification_method(kid)
            .with_context(|| format!("verification method {kid} not found"))?;
        let jwk = method
            .public_key_jwk
            .as_ref()
            .with_context(|| format!("verification method {kid} has no publicKeyJwk"))?;

        verify_es256(jwk, signing_input, signature)
    }
}

pub fn verify_es256(jwk: &JWK, signing_input: &[u8], signature: &[u8]) -> Result<()> {
    let jwk = serde_json::to_string(&jwk.to_public()).context("unable to serialize jwk")?;
    let public_key =
        p256::PublicKey::from_jwk_str(&jwk).context("jwk is not a valid P-256 public key")?;
    let signature = Signature::from_slice(signature).context("malformed ES256 signature")?;

    VerifyingKey::from(&public_key)
        .verify(signing_input, &signature)
        .context("signature could not be verified")
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn sign_then_verify() {
        let key = P256Signer::generate();
        let jwk = key.jwk().unwrap();
        let signer = JwtSigner::new(Arc::new(key), "did:example:holder#key-1");

        let jwt = signer
            .sign_jwt(Some("openid4vci-proof+jwt"), &json!({"nonce": "n"}))
            .await
            .unwrap();

        let decoded = DecodedJws::decode(&jwt).unwrap();
        assert_eq!(decoded.alg().unwrap(), ES256);
        assert_eq!(decoded.kid().unwrap(), "did:example:holder#key-1");
        assert_eq!(decoded.header["typ"], "openid4vci-proof+jwt");
        assert_eq!(decoded.claims["nonce"], "n");

        verify_es256(&jwk, decoded.signing_input.as_bytes(), &decoded.signature).unwrap();

        let other = P256Signer::generate().jwk().unwrap();
        assert!(
            verify_es256(&other, decoded.signing_input.as_bytes(), &decoded.signature).is_err()
        );
    }

    #[test]
    fn key_id_must_contain_did() {
        assert_eq!(did_of_key_id("did:example:123#k").unwrap(), "did:example:123");
        assert!(did_of_key_id("key-1").is_err());
        assert!(did_of_key_id("https://example.com#k").is_err());
    }
}
