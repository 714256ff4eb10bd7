use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use url::Url;

use super::{grants::Grants, MODULE};
use crate::{
    config::BaseUrl,
    core::{credential_format::CredentialFormat, util::AsyncHttpClient},
    error::{Scenario, WalletError, WalletResult, WalletResultExt},
    utils::OneOrMany,
};

pub const OFFER_SCHEME: &str = "openid-credential-offer";

/// An issuer's offer, validated: every credential is in an issuable format and at least one
/// grant is supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialOffer {
    credential_issuer: BaseUrl,
    credentials: Vec<OfferedCredential>,
    grants: Grants,
}

/// One `(format, types)` entry of an offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfferedCredential {
    pub format: CredentialFormat,
    pub types: Vec<String>,
    /// `@context` from `credential_definition`, if the offer carries one.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

#[derive(Deserialize)]
struct RawOffer {
    credential_issuer: String,
    #[serde(default)]
    credentials: Vec<Json>,
    #[serde(default)]
    grants: Map<String, Json>,
}

#[derive(Deserialize)]
struct RawOfferedCredential {
    format: String,
    #[serde(default)]
    types: Option<OneOrMany<String>>,
    #[serde(default)]
    credential_definition: Option<RawCredentialDefinition>,
}

#[derive(Deserialize)]
struct RawCredentialDefinition {
    #[serde(default, rename = "type")]
    types: Option<OneOrMany<String>>,
    #[serde(default, rename = "@context")]
    context: Option<OneOrMany<String>>,
}

impl CredentialOffer {
    /// Parse and validate an offer document.
    pub fn from_json(bytes: &[u8]) -> WalletResult<Self> {
        let raw: RawOffer = serde_json::from_slice(bytes)
            .context("credential offer is not valid JSON")
            .validation_err(MODULE, Scenario::InvalidCredentialOffer)?;

        let credential_issuer = BaseUrl::try_from(raw.credential_issuer.as_str())
            .with_context(|| format!("invalid credential_issuer '{}'", raw.credential_issuer))
            .validation_err(MODULE, Scenario::InvalidCredentialOffer)?;

        if raw.credentials.is_empty() {
            return Err(WalletError::validation(
                MODULE,
                Scenario::InvalidCredentialOffer,
                anyhow!("credential offer contains no credentials"),
            ));
        }

        let credentials = raw
            .credentials
            .into_iter()
            .enumerate()
            .map(|(index, entry)| OfferedCredential::parse(index, entry))
            .collect::<WalletResult<Vec<_>>>()?;

        let grants = Grants::negotiate(&raw.grants)
            .validation_err(MODULE, Scenario::InvalidCredentialOffer)?;

        Ok(Self {
            credential_issuer,
            credentials,
            grants,
        })
    }

    pub fn credential_issuer(&self) -> &BaseUrl {
        &self.credential_issuer
    }

    pub fn credentials(&self) -> &[OfferedCredential] {
        &self.credentials
    }

    pub fn grants(&self) -> &Grants {
        &self.grants
    }
}

impl OfferedCredential {
    fn parse(index: usize, entry: Json) -> WalletResult<Self> {
        let raw: RawOfferedCredential = serde_json::from_value(entry)
            .with_context(|| format!("invalid credential at index {index} of credential offer"))
            .validation_err(MODULE, Scenario::InvalidCredentialOffer)?;

        let format = CredentialFormat::from(raw.format.as_str());
        if !format.is_issuable() {
            return Err(WalletError::validation(
                MODULE,
                Scenario::UnsupportedCredentialTypeInOffer,
                anyhow!(
                    "unsupported format '{}' in credential offer at index {index}",
                    raw.format
                ),
            ));
        }

        let (types, context) = match raw.credential_definition {
            Some(definition) => (definition.types.or(raw.types), definition.context),
            None => (raw.types, None),
        };
        let types = types.map(OneOrMany::into_vec).unwrap_or_default();
        if types.is_empty() {
            return Err(WalletError::validation(
                MODULE,
                Scenario::InvalidCredentialOffer,
                anyhow!("credential at index {index} of credential offer has no types"),
            ));
        }

        Ok(Self {
            format,
            types,
            context: context.map(OneOrMany::into_vec).unwrap_or_default(),
        })
    }
}

/// Resolve an `openid-credential-offer://` URI, by value or by reference.
pub async fn resolve_offer(
    offer_uri: &str,
    http_client: &dyn AsyncHttpClient,
) -> WalletResult<CredentialOffer> {
    let url = Url::parse(offer_uri)
        .context("credential offer URI could not be parsed")
        .validation_err(MODULE, Scenario::InvalidIssuanceUri)?;
    if url.scheme() != OFFER_SCHEME {
        return Err(WalletError::validation(
            MODULE,
            Scenario::InvalidIssuanceUri,
            anyhow!("unsupported scheme '{}', expected '{OFFER_SCHEME}'", url.scheme()),
        ));
    }

    let mut by_value = None;
    let mut by_reference = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "credential_offer" => by_value = Some(value.into_owned()),
            "credential_offer_uri" => by_reference = Some(value.into_owned()),
            _ => {}
        }
    }

    let bytes = match (by_value, by_reference) {
        (Some(offer), _) => offer.into_bytes(),
        (None, Some(reference)) => {
            let reference = Url::parse(&reference)
                .with_context(|| format!("invalid credential_offer_uri '{reference}'"))
                .validation_err(MODULE, Scenario::InvalidIssuanceUri)?;
            tracing::debug!(uri = %reference, "fetching credential offer");
            crate::core::util::get_ok(http_client, &reference)
                .await
                .context("failed to fetch credential offer")
                .execution_err(MODULE, Scenario::InvalidCredentialOffer)?
        }
        (None, None) => {
            return Err(WalletError::validation(
                MODULE,
                Scenario::InvalidIssuanceUri,
                anyhow!(
                    "credential offer URI has neither credential_offer nor credential_offer_uri"
                ),
            ))
        }
    };

    let offer = CredentialOffer::from_json(&bytes)?;
    tracing::info!(
        issuer = offer.credential_issuer().as_identifier(),
        credentials = offer.credentials().len(),
        "resolved credential offer"
    );
    Ok(offer)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        core::util::mock::MockHttpClient,
        error::{ErrorKind, Scenario},
        issuance::grants::PRE_AUTHORIZED_CODE_GRANT,
    };

    fn offer_json() -> Json {
        json!({
            "credential_issuer": "https://issuer.example/tenant",
            "credentials": [
                {
                    "format": "jwt_vc_json",
                    "types": ["VerifiableCredential", "PermanentResidentCard"]
                },
                {
                    "format": "ldp_vc",
                    "credential_definition": {
                        "type": ["VerifiableCredential", "UniversityDegreeCredential"],
                        "@context": ["https://www.w3.org/2018/credentials/v1"]
                    }
                }
            ],
            "grants": { PRE_AUTHORIZED_CODE_GRANT: { "pre-authorized_code": "abc" } }
        })
    }

    fn by_value(offer: &Json) -> String {
        let mut url = Url::parse("openid-credential-offer://").unwrap();
        url.query_pairs_mut()
            .append_pair("credential_offer", &offer.to_string());
        url.to_string()
    }

    #[tokio::test]
    async fn inline_offer() {
        let client = MockHttpClient::new();
        let offer = resolve_offer(&by_value(&offer_json()), &client).await.unwrap();

        assert_eq!(
            offer.credential_issuer().as_identifier(),
            "https://issuer.example/tenant"
        );
        assert_eq!(offer.credentials().len(), 2);
        assert_eq!(offer.credentials()[0].format, CredentialFormat::JwtVcJson);
        assert_eq!(
            offer.credentials()[1].types,
            vec!["VerifiableCredential", "UniversityDegreeCredential"]
        );
        assert_eq!(
            offer.credentials()[1].context,
            vec!["https://www.w3.org/2018/credentials/v1"]
        );
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn offer_by_reference() {
        let client = MockHttpClient::new();
        client.respond_json("https://issuer.example/offers/1", 200, offer_json());

        let uri = concat!(
            "openid-credential-offer://?credential_offer_uri=",
            "https%3A%2F%2Fissuer.example%2Foffers%2F1"
        );
        let offer = resolve_offer(uri, &client).await.unwrap();
        assert_eq!(offer.credentials().len(), 2);
        assert_eq!(client.requests_to("https://issuer.example/offers/1").len(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_execution_error() {
        let client = MockHttpClient::new();
        client.respond("https://issuer.example/offers/1", 500, "boom");

        let uri = concat!(
            "openid-credential-offer://?credential_offer_uri=",
            "https%3A%2F%2Fissuer.example%2Foffers%2F1"
        );
        let err = resolve_offer(uri, &client).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert_eq!(err.scenario(), Scenario::InvalidCredentialOffer);
    }

    #[tokio::test]
    async fn unknown_format_names_the_index() {
        let mut offer = offer_json();
        offer["credentials"][1]["format"] = json!("unknown");

        let client = MockHttpClient::new();
        let err = resolve_offer(&by_value(&offer), &client).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.scenario(), Scenario::UnsupportedCredentialTypeInOffer);
        let message = err.to_string();
        assert!(message.contains("index 1"), "{message}");
        assert!(message.contains("'unknown'"), "{message}");
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn bad_uris_are_rejected() {
        let client = MockHttpClient::new();
        for uri in [
            "https://issuer.example/?credential_offer=%7B%7D",
            "openid-credential-offer://?foo=bar",
            "not a uri",
        ] {
            let err = resolve_offer(uri, &client).await.unwrap_err();
            assert_eq!(err.scenario(), Scenario::InvalidIssuanceUri, "{uri}");
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn offer_needs_credentials_and_grants() {
        let mut offer = offer_json();
        offer["credentials"] = json!([]);
        let err = CredentialOffer::from_json(offer.to_string().as_bytes()).unwrap_err();
        assert_eq!(err.scenario(), Scenario::InvalidCredentialOffer);

        let mut offer = offer_json();
        offer["grants"] = json!({});
        let err = CredentialOffer::from_json(offer.to_string().as_bytes()).unwrap_err();
        assert_eq!(err.scenario(), Scenario::InvalidCredentialOffer);

        let err = CredentialOffer::from_json(b"{not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
