use anyhow::{Context, Result};
use base64::prelude::*;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use url::Url;

use super::metadata::CredentialDefinition;
use crate::core::credential_format::CredentialFormat;

pub const CODE_CHALLENGE_METHOD: &str = "S256";
const AUTHORIZATION_DETAILS_TYPE: &str = "openid_credential";

/// A PKCE code verifier with its derived challenge.
pub struct Pkce {
    verifier: String,
    challenge: String,
}

impl std::fmt::Debug for Pkce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkce")
            .field("challenge", &self.challenge)
            .finish_non_exhaustive()
    }
}

impl Pkce {
    /// A fresh verifier from 32 random bytes.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_verifier(BASE64_URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub(crate) fn into_verifier(self) -> String {
        self.verifier
    }
}

/// One `authorization_details` entry of type `openid_credential`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationDetails {
    #[serde(rename = "type")]
    type_: &'static str,
    format: CredentialFormat,
    credential_definition: CredentialDefinition,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    locations: Vec<String>,
}

impl AuthorizationDetails {
    /// `locations` carries the issuer when the issuer delegates to an authorization server.
    pub fn new(
        format: CredentialFormat,
        types: Vec<String>,
        context: Vec<String>,
        location: Option<String>,
    ) -> Self {
        Self {
            type_: AUTHORIZATION_DETAILS_TYPE,
            format,
            credential_definition: CredentialDefinition { types, context },
            locations: location.into_iter().collect(),
        }
    }
}

/// The parameters of an authorization request.
#[derive(Debug)]
pub struct AuthorizationRequest<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub state: &'a str,
    pub code_challenge: &'a str,
    pub details: AuthorizationDetails,
    pub scopes: &'a [String],
    pub issuer_state: Option<&'a str>,
}

impl AuthorizationRequest<'_> {
    pub fn to_url(&self, authorization_endpoint: &Url) -> Result<Url> {
        let details = serde_json::to_string(&[&self.details])
            .context("unable to serialize authorization_details")?;

        let mut url = authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", self.client_id)
                .append_pair("redirect_uri", self.redirect_uri)
                .append_pair("state", self.state)
                .append_pair("code_challenge", self.code_challenge)
                .append_pair("code_challenge_method", CODE_CHALLENGE_METHOD)
                .append_pair("authorization_details", &details);
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
            if let Some(issuer_state) = self.issuer_state {
                query.append_pair("issuer_state", issuer_state);
            }
        }
        Ok(url)
    }
}

/// The `code` and `state` of an authorization callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCallback {
    pub code: String,
    pub state: String,
}

impl AuthorizationCallback {
    pub fn parse(redirect_uri_with_params: &str) -> Result<Self> {
        let url = Url::parse(redirect_uri_with_params)
            .context("redirect URI could not be parsed")?;

        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                _ => {}
            }
        }

        Ok(Self {
            code: code.context("redirect URI is missing the code query parameter")?,
            state: state.context("redirect URI is missing the state query parameter")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::{json, Value as Json};

    use super::*;

    #[test]
    fn challenge_is_sha256_of_verifier() {
        for _ in 0..8 {
            let pkce = Pkce::generate();
            assert_eq!(pkce.verifier().len(), 43);
            let expected = BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.verifier()));
            assert_eq!(pkce.challenge(), expected);
        }

        // RFC 7636 appendix B.
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".into());
        assert_eq!(
            pkce.challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn authorization_url() {
        let request = AuthorizationRequest {
            client_id: "wallet",
            redirect_uri: "https://wallet.example/cb",
            state: "s1",
            code_challenge: "c1",
            details: AuthorizationDetails::new(
                CredentialFormat::JwtVcJson,
                vec!["VerifiableCredential".into(), "PermanentResidentCard".into()],
                Vec::new(),
                Some("https://issuer.example".into()),
            ),
            scopes: &["openid".to_string(), "profile".to_string()],
            issuer_state: Some("1234"),
        };
        let url = request
            .to_url(&"https://auth.example/authorize".parse().unwrap())
            .unwrap();

        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["scope"], "openid profile");
        assert_eq!(query["issuer_state"], "1234");

        let details: Json = serde_json::from_str(&query["authorization_details"]).unwrap();
        assert_eq!(
            details,
            json!([{
                "type": "openid_credential",
                "format": "jwt_vc_json",
                "credential_definition": {
                    "type": ["VerifiableCredential", "PermanentResidentCard"]
                },
                "locations": ["https://issuer.example"]
            }])
        );
    }

    #[test]
    fn callback_requires_code_and_state() {
        let callback =
            AuthorizationCallback::parse("https://wallet.example/cb?code=abc&state=s1").unwrap();
        assert_eq!(callback.code, "abc");
        assert_eq!(callback.state, "s1");

        assert!(AuthorizationCallback::parse("https://wallet.example/cb?state=s1").is_err());
        assert!(AuthorizationCallback::parse("https://wallet.example/cb?code=abc").is_err());
        assert!(AuthorizationCallback::parse("::").is_err());
    }
}
