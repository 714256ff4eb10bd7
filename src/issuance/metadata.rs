use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use url::Url;

use crate::{
    config::BaseUrl,
    core::{
        credential_format::CredentialFormat,
        jws::{DecodedJws, JwsVerifier},
        util::{get_ok, AsyncHttpClient},
    },
};

const ISSUER_METADATA_PATH: &str = ".well-known/openid-credential-issuer";
const OPENID_CONFIGURATION_PATH: &str = ".well-known/openid-configuration";

/// Credential issuer metadata, with the claims of a verified `signed_metadata` applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerMetadata {
    credential_issuer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authorization_server: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    authorization_servers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authorization_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_endpoint: Option<Url>,
    credential_endpoint: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    batch_credential_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    registration_endpoint: Option<Url>,
    #[serde(
        default,
        alias = "credential_ack_endpoint",
        skip_serializing_if = "Option::is_none"
    )]
    notification_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    credentials_supported: Vec<SupportedCredential>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    credential_configurations_supported: Map<String, Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    display: Vec<IssuerDisplay>,
    #[serde(skip)]
    jwt_kid: Option<String>,
}

/// `credential_definition` as found in metadata, offers and credential requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDefinition {
    #[serde(rename = "type", default)]
    pub types: Vec<String>,
    #[serde(rename = "@context", default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

/// A credential the issuer can issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportedCredential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub format: CredentialFormat,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credential_definition: Option<CredentialDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub display: Vec<Json>,
}

impl SupportedCredential {
    pub fn types(&self) -> &[String] {
        match &self.credential_definition {
            Some(definition) if !definition.types.is_empty() => &definition.types,
            _ => &self.types,
        }
    }

    pub fn context(&self) -> &[String] {
        self.credential_definition
            .as_ref()
            .map(|definition| definition.context.as_slice())
            .unwrap_or_default()
    }
}

/// Issuer display properties for one locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuerDisplay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

impl IssuerMetadata {
    /// Fetch `{issuer}/.well-known/openid-credential-issuer`.
    ///
    /// A `signed_metadata` JWT is verified and its claims override the unsigned members.
    pub(crate) async fn fetch(
        issuer: &BaseUrl,
        http_client: &dyn AsyncHttpClient,
        verifier: &dyn JwsVerifier,
    ) -> Result<Self> {
        let url = issuer
            .join_path(ISSUER_METADATA_PATH)
            .context("unable to build issuer metadata url")?;
        let started = std::time::Instant::now();

        let body = get_ok(http_client, &url).await?;
        let mut members: Map<String, Json> =
            serde_json::from_slice(&body).context("issuer metadata is not a JSON object")?;

        let mut jwt_kid = None;
        if let Some(signed) = members.remove("signed_metadata") {
            let Json::String(signed) = signed else {
                bail!("'signed_metadata' is not a string")
            };
            let jws = DecodedJws::decode(&signed).context("signed_metadata is not a valid JWT")?;
            jws.verify(verifier)
                .await
                .context("signed_metadata signature could not be verified")?;
            jwt_kid = Some(jws.kid()?.to_owned());

            let Json::Object(claims) = jws.claims else {
                bail!("signed_metadata claims are not a JSON object")
            };
            members.extend(claims);
        }

        let mut metadata: Self =
            serde_json::from_value(members.into()).context("invalid issuer metadata")?;
        if metadata.credential_issuer.trim_end_matches('/') != issuer.as_identifier() {
            bail!(
                "credential_issuer '{}' in metadata does not match issuer '{}'",
                metadata.credential_issuer,
                issuer.as_identifier()
            )
        }
        metadata.jwt_kid = jwt_kid;

        tracing::debug!(
            issuer = issuer.as_identifier(),
            signed = metadata.jwt_kid.is_some(),
            duration_ms = started.elapsed().as_millis() as u64,
            "fetched issuer metadata"
        );
        Ok(metadata)
    }

    pub fn credential_issuer(&self) -> &str {
        &self.credential_issuer
    }

    /// The first authorization server, from `authorization_server` or `authorization_servers`.
    pub fn authorization_server(&self) -> Option<&str> {
        self.authorization_server
            .as_deref()
            .or_else(|| self.authorization_servers.first().map(String::as_str))
    }

    pub fn authorization_endpoint(&self) -> Option<&Url> {
        self.authorization_endpoint.as_ref()
    }

    pub fn token_endpoint(&self) -> Option<&Url> {
        self.token_endpoint.as_ref()
    }

    pub fn credential_endpoint(&self) -> &Url {
        &self.credential_endpoint
    }

    pub fn batch_credential_endpoint(&self) -> Option<&Url> {
        self.batch_credential_endpoint.as_ref()
    }

    pub fn registration_endpoint(&self) -> Option<&Url> {
        self.registration_endpoint.as_ref()
    }

    pub fn notification_endpoint(&self) -> Option<&Url> {
        self.notification_endpoint.as_ref()
    }

    /// Key id of the signed metadata, if the metadata was signed.
    pub fn jwt_kid(&self) -> Option<&str> {
        self.jwt_kid.as_deref()
    }

    pub fn display(&self) -> &[IssuerDisplay] {
        &self.display
    }

    /// Name of the issuer in its first display entry.
    pub fn issuer_name(&self) -> Option<&str> {
        self.display.iter().find_map(|d| d.name.as_deref())
    }

    /// Supported credentials from `credentials_supported` followed by
    /// `credential_configurations_supported`. Configurations that cannot be read are skipped.
    pub fn supported_credentials(&self) -> Vec<SupportedCredential> {
        let configurations = self
            .credential_configurations_supported
            .iter()
            .filter_map(|(id, configuration)| {
                match serde_json::from_value::<SupportedCredential>(configuration.clone()) {
                    Ok(mut supported) => {
                        supported.id.get_or_insert_with(|| id.clone());
                        Some(supported)
                    }
                    Err(e) => {
                        tracing::warn!(
                            configuration = %id,
                            "skipping credential configuration: {e}"
                        );
                        None
                    }
                }
            });

        self.credentials_supported
            .iter()
            .cloned()
            .chain(configurations)
            .collect()
    }

    /// Where the issuer's OpenID configuration is found, under the credential issuer even when
    /// an `authorization_server` is declared.
    pub(crate) fn openid_configuration_url(&self) -> Result<Url> {
        let base = &self.credential_issuer;
        BaseUrl::try_from(base.as_str())
            .with_context(|| format!("invalid credential issuer '{base}'"))?
            .join_path(OPENID_CONFIGURATION_PATH)
            .context("unable to build OpenID configuration url")
    }
}

/// The members of an authorization server's OpenID configuration the wallet uses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_types_supported: Vec<String>,
}

impl OpenIdConfiguration {
    pub(crate) async fn fetch(url: &Url, http_client: &dyn AsyncHttpClient) -> Result<Self> {
        let body = get_ok(http_client, url).await?;
        let configuration =
            serde_json::from_slice(&body).context("invalid OpenID configuration")?;
        tracing::debug!(%url, "fetched OpenID configuration");
        Ok(configuration)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::core::{
        did::{DidDocument, DidResolver},
        jws::{DidJwsVerifier, JwtSigner, P256Signer},
        util::mock::MockHttpClient,
    };

    struct Resolver(DidDocument);

    #[async_trait]
    impl DidResolver for Resolver {
        async fn resolve(&self, did: &str) -> Result<DidDocument> {
            if did != self.0.id {
                bail!("unknown did {did}")
            }
            Ok(self.0.clone())
        }
    }

    const METADATA_URL: &str = "https://issuer.example/.well-known/openid-credential-issuer";

    fn metadata() -> Json {
        json!({
            "credential_issuer": "https://issuer.example",
            "credential_endpoint": "https://issuer.example/credential",
            "credential_ack_endpoint": "https://issuer.example/ack",
            "credentials_supported": [{
                "format": "jwt_vc_json",
                "types": ["VerifiableCredential", "PermanentResidentCard"]
            }],
            "credential_configurations_supported": {
                "degree": {
                    "format": "ldp_vc",
                    "credential_definition": {
                        "type": ["VerifiableCredential", "UniversityDegreeCredential"],
                        "@context": ["https://www.w3.org/2018/credentials/v1"]
                    }
                }
            },
            "display": [{ "name": "Example Issuer", "locale": "en-US" }]
        })
    }

    fn verifier(document: DidDocument) -> DidJwsVerifier {
        DidJwsVerifier::new(Arc::new(Resolver(document)))
    }

    #[tokio::test]
    async fn unsigned_metadata() {
        let client = MockHttpClient::new();
        client.respond_json(METADATA_URL, 200, metadata());

        let issuer = BaseUrl::try_from("https://issuer.example").unwrap();
        let metadata = IssuerMetadata::fetch(&issuer, &client, &verifier(DidDocument::default()))
            .await
            .unwrap();

        assert_eq!(
            metadata.notification_endpoint().unwrap().as_str(),
            "https://issuer.example/ack"
        );
        assert!(metadata.jwt_kid().is_none());
        assert_eq!(metadata.issuer_name(), Some("Example Issuer"));

        let supported = metadata.supported_credentials();
        assert_eq!(supported.len(), 2);
        assert_eq!(supported[1].id.as_deref(), Some("degree"));
        assert_eq!(supported[1].types()[1], "UniversityDegreeCredential");
        assert_eq!(supported[1].context().len(), 1);
        assert_eq!(
            metadata.openid_configuration_url().unwrap().as_str(),
            "https://issuer.example/.well-known/openid-configuration"
        );
    }

    #[tokio::test]
    async fn signed_metadata_overrides_members() {
        let key = P256Signer::generate();
        let document: DidDocument = serde_json::from_value(json!({
            "id": "did:example:issuer",
            "verificationMethod": [{
                "id": "did:example:issuer#key-1",
                "type": "JsonWebKey2020",
                "controller": "did:example:issuer",
                "publicKeyJwk": key.jwk().unwrap()
            }]
        }))
        .unwrap();

        let signer = JwtSigner::new(Arc::new(key), "did:example:issuer#key-1");
        let signed = signer
            .sign_jwt(
                None,
                &json!({
                    "credential_issuer": "https://issuer.example",
                    "credential_endpoint": "https://issuer.example/signed-credential"
                }),
            )
            .await
            .unwrap();

        let mut body = metadata();
        body["signed_metadata"] = json!(signed);

        let client = MockHttpClient::new();
        client.respond_json(METADATA_URL, 200, body);

        let issuer = BaseUrl::try_from("https://issuer.example").unwrap();
        let metadata = IssuerMetadata::fetch(&issuer, &client, &verifier(document))
            .await
            .unwrap();
        assert_eq!(metadata.jwt_kid(), Some("did:example:issuer#key-1"));
        assert_eq!(
            metadata.credential_endpoint().as_str(),
            "https://issuer.example/signed-credential"
        );
    }

    #[tokio::test]
    async fn tampered_signed_metadata_is_rejected() {
        let mut body = metadata();
        body["signed_metadata"] = json!(concat!(
            "eyJhbGciOiJFUzI1NiIsImtpZCI6ImRpZDpleGFtcGxlOmlzc3VlciNrZXktMSJ9",
            ".e30.AAAA"
        ));

        let client = MockHttpClient::new();
        client.respond_json(METADATA_URL, 200, body);

        let issuer = BaseUrl::try_from("https://issuer.example").unwrap();
        assert!(IssuerMetadata::fetch(&issuer, &client, &verifier(DidDocument::default()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn issuer_must_match() {
        let mut body = metadata();
        body["credential_issuer"] = json!("https://other.example");

        let client = MockHttpClient::new();
        client.respond_json(METADATA_URL, 200, body);

        let issuer = BaseUrl::try_from("https://issuer.example").unwrap();
        let err = IssuerMetadata::fetch(&issuer, &client, &verifier(DidDocument::default()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }
}
