use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

pub const PRE_AUTHORIZED_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:pre-authorized_code";
pub const AUTHORIZATION_CODE_GRANT: &str = "authorization_code";

/// Parameters of the pre-authorized code grant of a credential offer.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreAuthorizedCodeGrantParams {
    #[serde(rename = "pre-authorized_code")]
    pre_authorized_code: String,
    #[serde(default)]
    user_pin_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tx_code: Option<TxCode>,
}

impl std::fmt::Debug for PreAuthorizedCodeGrantParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreAuthorizedCodeGrantParams")
            .field("pre_authorized_code", &"<redacted>")
            .field("user_pin_required", &self.user_pin_required)
            .field("tx_code", &self.tx_code)
            .finish()
    }
}

/// Describes the transaction code (PIN) the user must enter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxCode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PreAuthorizedCodeGrantParams {
    pub(crate) fn pre_authorized_code(&self) -> &str {
        &self.pre_authorized_code
    }

    /// Whether a PIN must be supplied, through `user_pin_required` or a `tx_code` object.
    pub fn pin_required(&self) -> bool {
        self.user_pin_required || self.tx_code.is_some()
    }

    pub fn tx_code(&self) -> Option<&TxCode> {
        self.tx_code.as_ref()
    }

    /// The token request parameter the PIN travels in.
    pub(crate) fn pin_parameter(&self) -> &'static str {
        if self.tx_code.is_some() {
            "tx_code"
        } else {
            "user_pin"
        }
    }
}

/// Parameters of the authorization code grant of a credential offer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationCodeGrantParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
}

/// The grants a credential offer supports. At least one is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grants {
    pre_authorized_code: Option<PreAuthorizedCodeGrantParams>,
    authorization_code: Option<AuthorizationCodeGrantParams>,
}

impl Grants {
    /// Extract the supported grants from the offer's `grants` object.
    pub fn negotiate(grants: &Map<String, Json>) -> Result<Self> {
        let pre_authorized_code = grants
            .get(PRE_AUTHORIZED_CODE_GRANT)
            .map(|params| serde_json::from_value::<PreAuthorizedCodeGrantParams>(params.clone()))
            .transpose()
            .context("invalid pre-authorized code grant parameters")?;

        let authorization_code = grants
            .get(AUTHORIZATION_CODE_GRANT)
            .map(|params| serde_json::from_value::<AuthorizationCodeGrantParams>(params.clone()))
            .transpose()
            .context("invalid authorization code grant parameters")?;

        if pre_authorized_code.is_none() && authorization_code.is_none() {
            bail!("no supported grant types found")
        }

        Ok(Self {
            pre_authorized_code,
            authorization_code,
        })
    }

    pub fn pre_authorized_code(&self) -> Option<&PreAuthorizedCodeGrantParams> {
        self.pre_authorized_code.as_ref()
    }

    pub fn authorization_code(&self) -> Option<&AuthorizationCodeGrantParams> {
        self.authorization_code.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn grants(value: Json) -> Result<Grants> {
        Grants::negotiate(value.as_object().unwrap())
    }

    #[test]
    fn pre_authorized_only() {
        let grants = grants(json!({
            PRE_AUTHORIZED_CODE_GRANT: { "pre-authorized_code": "abc" }
        }))
        .unwrap();

        let params = grants.pre_authorized_code().unwrap();
        assert_eq!(params.pre_authorized_code(), "abc");
        assert!(!params.pin_required());
        assert!(grants.authorization_code().is_none());
    }

    #[test]
    fn tx_code_requires_pin() {
        let grants = grants(json!({
            PRE_AUTHORIZED_CODE_GRANT: {
                "pre-authorized_code": "abc",
                "tx_code": { "input_mode": "numeric", "length": 4 }
            },
            AUTHORIZATION_CODE_GRANT: { "issuer_state": "1234" }
        }))
        .unwrap();

        let params = grants.pre_authorized_code().unwrap();
        assert!(params.pin_required());
        assert_eq!(params.pin_parameter(), "tx_code");
        assert_eq!(params.tx_code().unwrap().length, Some(4));
        assert_eq!(
            grants.authorization_code().unwrap().issuer_state.as_deref(),
            Some("1234")
        );
    }

    #[test]
    fn no_grant_is_an_error() {
        assert!(grants(json!({})).is_err());
        assert!(grants(json!({"implicit": {}})).is_err());
    }

    #[test]
    fn code_is_not_printed() {
        let grants = grants(json!({
            PRE_AUTHORIZED_CODE_GRANT: {
                "pre-authorized_code": "secret-code",
                "user_pin_required": true
            }
        }))
        .unwrap();
        assert!(!format!("{grants:?}").contains("secret-code"));
        assert_eq!(grants.pre_authorized_code().unwrap().pin_parameter(), "user_pin");
    }
}
