use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use super::MODULE;
use crate::{
    core::{
        credential_format::{ClaimFormatMap, CredentialFormat},
        jws::{did_of_key_id, DecodedJws, JwsVerifier},
        presentation_definition::PresentationDefinition,
        util::{get_ok, AsyncHttpClient},
    },
    error::{Scenario, WalletResult, WalletResultExt},
    utils::now_secs,
};

pub const REQUEST_SCHEME: &str = "openid-vc";

/// How the verifier's `client_id` is to be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientIdScheme {
    Did,
    RedirectUri,
    #[serde(untagged)]
    Other(String),
}

/// Verifier metadata, from `client_metadata` or the legacy `registration`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_syntax_types_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vp_formats: Option<ClaimFormatMap>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct RequestClaims {
    #[serde(default)]
    vp_token: VpTokenClaim,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct VpTokenClaim {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    presentation_definition: Option<PresentationDefinition>,
}

/// The claims of a verified authorization request object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response_uri: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
    client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id_scheme: Option<ClientIdScheme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_metadata: Option<ClientMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    presentation_definition: Option<PresentationDefinition>,
    // Pre draft 20 members.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    registration: Option<ClientMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    claims: Option<RequestClaims>,
    /// The DID of the key that signed the request.
    #[serde(skip)]
    signer_did: Option<String>,
}

impl RequestObject {
    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_id_scheme(&self) -> Option<&ClientIdScheme> {
        self.client_id_scheme.as_ref()
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn response_mode(&self) -> Option<&str> {
        self.response_mode.as_deref()
    }

    pub fn exp(&self) -> Option<u64> {
        self.exp
    }

    /// Where the authorization response is posted: `response_uri`, else `redirect_uri`.
    pub fn response_uri(&self) -> Option<&Url> {
        self.response_uri.as_ref().or(self.redirect_uri.as_ref())
    }

    pub fn client_metadata(&self) -> Option<&ClientMetadata> {
        self.client_metadata.as_ref().or(self.registration.as_ref())
    }

    pub fn presentation_definition(&self) -> Option<&PresentationDefinition> {
        self.presentation_definition.as_ref().or_else(|| {
            self.claims
                .as_ref()
                .and_then(|claims| claims.vp_token.presentation_definition.as_ref())
        })
    }

    pub fn signer_did(&self) -> Option<&str> {
        self.signer_did.as_deref()
    }

    /// Whether the verifier declares support for presentations with Data Integrity proofs.
    pub fn accepts_ldp_vp(&self) -> bool {
        self.client_metadata()
            .and_then(|metadata| metadata.vp_formats.as_ref())
            .is_some_and(|formats| formats.contains_key(&CredentialFormat::LdpVp))
    }
}

/// Resolve an authorization request, `openid-vc://?request_uri=...` or an inline request
/// object JWS, into its verified claims.
pub async fn resolve_request(
    authorization_request: &str,
    http_client: &dyn AsyncHttpClient,
    verifier: &dyn JwsVerifier,
) -> WalletResult<RequestObject> {
    resolve(authorization_request, http_client, verifier)
        .await
        .validation_err(MODULE, Scenario::InvalidAuthorizationRequest)
}

async fn resolve(
    authorization_request: &str,
    http_client: &dyn AsyncHttpClient,
    verifier: &dyn JwsVerifier,
) -> Result<RequestObject> {
    let jws = if authorization_request.starts_with(&format!("{REQUEST_SCHEME}:")) {
        let url =
            Url::parse(authorization_request).context("authorization request is not a valid URI")?;
        let request_uri = url
            .query_pairs()
            .find_map(|(key, value)| (key == "request_uri").then(|| value.into_owned()))
            .context("authorization request is missing the request_uri parameter")?;
        let request_uri = Url::parse(&request_uri)
            .with_context(|| format!("invalid request_uri '{request_uri}'"))?;

        let started = std::time::Instant::now();
        let body = get_ok(http_client, &request_uri)
            .await
            .context("failed to fetch the request object")?;
        tracing::debug!(
            %request_uri,
            duration_ms = started.elapsed().as_millis() as u64,
            "fetched request object"
        );
        String::from_utf8(body).context("request object is not valid UTF-8")?
    } else {
        authorization_request.to_owned()
    };

    let decoded = DecodedJws::decode(jws.trim()).context("request object is not a valid JWS")?;
    decoded
        .verify(verifier)
        .await
        .context("request object signature could not be verified")?;
    let signer_did = did_of_key_id(decoded.kid()?)?.to_owned();

    let mut request: RequestObject = decoded
        .claims_as()
        .context("request object claims are invalid")?;

    if request.client_id_scheme == Some(ClientIdScheme::Did) && request.client_id != signer_did {
        bail!(
            "DIDs from 'kid' ({signer_did}) and 'client_id' ({}) do not match",
            request.client_id
        )
    }
    if let Some(exp) = request.exp {
        if exp < now_secs()? {
            bail!("request object expired at {exp}")
        }
    }
    if request.presentation_definition().is_none() {
        bail!("request object has no presentation_definition")
    }
    if request.response_uri().is_none() {
        bail!("request object has neither response_uri nor redirect_uri")
    }

    request.signer_did = Some(signer_did);
    tracing::info!(
        client_id = %request.client_id,
        scope = request.scope.as_deref().unwrap_or_default(),
        "resolved authorization request"
    );
    Ok(request)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value as Json};

    use super::*;
    use crate::{
        core::{
            did::mock::{document_with_key, MemoryResolver},
            jws::{DidJwsVerifier, JwtSigner, P256Signer},
            util::mock::MockHttpClient,
        },
        error::{ErrorKind, Scenario},
    };

    const VERIFIER: &str = "did:example:verifier";
    const REQUEST_URI: &str = "https://verifier.example/request/1";

    fn verifier_key() -> (P256Signer, DidJwsVerifier) {
        let key = P256Signer::generate();
        let resolver = MemoryResolver::new();
        resolver.insert(document_with_key(VERIFIER, &key));
        (key, DidJwsVerifier::new(Arc::new(resolver)))
    }

    fn claims() -> Json {
        json!({
            "client_id": VERIFIER,
            "client_id_scheme": "did",
            "nonce": "n-1",
            "state": "s-1",
            "response_uri": "https://verifier.example/response",
            "response_mode": "direct_post",
            "client_metadata": {
                "client_name": "Example Verifier",
                "vp_formats": {"jwt_vp": {"alg": ["ES256"]}, "ldp_vp": {}}
            },
            "presentation_definition": {
                "id": "pd-1",
                "input_descriptors": [{"id": "degree", "constraints": {}}]
            }
        })
    }

    async fn sign(key: &P256Signer, kid: &str, claims: &Json) -> String {
        JwtSigner::new(Arc::new(key.clone()), kid)
            .sign_jwt(None, claims)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn request_by_reference() {
        let (key, verifier) = verifier_key();
        let client = MockHttpClient::new();
        client.respond(
            REQUEST_URI,
            200,
            sign(&key, &format!("{VERIFIER}#key-1"), &claims()).await,
        );

        let uri = format!("openid-vc://?request_uri={REQUEST_URI}");
        let request = resolve_request(&uri, &client, &verifier).await.unwrap();

        assert_eq!(request.client_id(), VERIFIER);
        assert_eq!(request.nonce(), Some("n-1"));
        assert_eq!(request.state(), Some("s-1"));
        assert_eq!(request.signer_did(), Some(VERIFIER));
        assert_eq!(
            request.response_uri().unwrap().as_str(),
            "https://verifier.example/response"
        );
        assert_eq!(request.presentation_definition().unwrap().id(), "pd-1");
        assert!(request.accepts_ldp_vp());
    }

    #[tokio::test]
    async fn legacy_members() {
        let (key, verifier) = verifier_key();
        let claims = json!({
            "client_id": "https://verifier.example/callback",
            "redirect_uri": "https://verifier.example/callback",
            "nonce": "n-1",
            "registration": {"client_name": "Legacy Verifier"},
            "claims": {"vp_token": {"presentation_definition": {
                "id": "pd-legacy",
                "input_descriptors": [{"id": "degree", "constraints": {}}]
            }}}
        });
        let jws = sign(&key, &format!("{VERIFIER}#key-1"), &claims).await;

        let request = resolve_request(&jws, &MockHttpClient::new(), &verifier)
            .await
            .unwrap();
        assert_eq!(
            request.client_metadata().unwrap().client_name.as_deref(),
            Some("Legacy Verifier")
        );
        assert_eq!(request.presentation_definition().unwrap().id(), "pd-legacy");
        assert_eq!(
            request.response_uri().unwrap().as_str(),
            "https://verifier.example/callback"
        );
        assert!(!request.accepts_ldp_vp());
    }

    async fn rejected(jws: &str, verifier: &DidJwsVerifier) -> String {
        let err = resolve_request(jws, &MockHttpClient::new(), verifier)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.scenario(), Scenario::InvalidAuthorizationRequest);
        format!("{:#}", anyhow::Error::from(err))
    }

    #[tokio::test]
    async fn invalid_requests() {
        let (key, verifier) = verifier_key();

        let forged = sign(&P256Signer::generate(), &format!("{VERIFIER}#key-1"), &claims()).await;
        assert!(rejected(&forged, &verifier).await.contains("signature"));

        let mut other_client = claims();
        other_client["client_id"] = json!("did:example:someone-else");
        let jws = sign(&key, &format!("{VERIFIER}#key-1"), &other_client).await;
        assert!(rejected(&jws, &verifier).await.contains("do not match"));

        let mut expired = claims();
        expired["exp"] = json!(1);
        let jws = sign(&key, &format!("{VERIFIER}#key-1"), &expired).await;
        assert!(rejected(&jws, &verifier).await.contains("expired"));

        let mut no_definition = claims();
        no_definition
            .as_object_mut()
            .unwrap()
            .remove("presentation_definition");
        let jws = sign(&key, &format!("{VERIFIER}#key-1"), &no_definition).await;
        assert!(rejected(&jws, &verifier).await.contains("presentation_definition"));

        assert!(rejected("openid-vc://?client_id=x", &verifier)
            .await
            .contains("request_uri"));
    }
}
