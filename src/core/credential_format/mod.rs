use core::fmt;
use std::{borrow::Cow, collections::HashMap, str::FromStr};

use serde::{Deserialize, Serialize};

const FORMAT_JWT: &str = "jwt";
const FORMAT_JWT_VC: &str = "jwt_vc";
const FORMAT_JWT_VP: &str = "jwt_vp";
const FORMAT_JWT_VC_JSON: &str = "jwt_vc_json";
const FORMAT_JWT_VC_JSON_LD: &str = "jwt_vc_json-ld";
const FORMAT_JWT_VP_JSON: &str = "jwt_vp_json";
const FORMAT_LDP: &str = "ldp";
const FORMAT_LDP_VC: &str = "ldp_vc";
const FORMAT_LDP_VP: &str = "ldp_vp";

/// A JSON object keyed by format designations, as found in `vp_formats` and Presentation
/// Definition `format` members. Values hold the format specific algorithm lists.
pub type ClaimFormatMap = HashMap<CredentialFormat, serde_json::Value>;

/// A credential or presentation format designation.
///
/// Issuance only accepts the three W3C credential formats ([is_issuable](Self::is_issuable)),
/// the remaining designations appear in verifier metadata and Presentation Exchange documents.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CredentialFormat {
    Jwt,
    JwtVc,
    JwtVp,
    /// W3C Verifiable Credential secured as a JWT, not using JSON-LD.
    JwtVcJson,
    /// W3C Verifiable Credential secured as a JWT, using JSON-LD.
    JwtVcJsonLd,
    JwtVpJson,
    Ldp,
    /// W3C Verifiable Credential secured with a Data Integrity proof.
    LdpVc,
    LdpVp,
    Other(String),
}

impl CredentialFormat {
    pub fn from_name(name: Cow<str>) -> Self {
        match name.as_ref() {
            FORMAT_JWT => Self::Jwt,
            FORMAT_JWT_VC => Self::JwtVc,
            FORMAT_JWT_VP => Self::JwtVp,
            FORMAT_JWT_VC_JSON => Self::JwtVcJson,
            FORMAT_JWT_VC_JSON_LD => Self::JwtVcJsonLd,
            FORMAT_JWT_VP_JSON => Self::JwtVpJson,
            FORMAT_LDP => Self::Ldp,
            FORMAT_LDP_VC => Self::LdpVc,
            FORMAT_LDP_VP => Self::LdpVp,
            _ => Self::Other(name.into_owned()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Jwt => FORMAT_JWT,
            Self::JwtVc => FORMAT_JWT_VC,
            Self::JwtVp => FORMAT_JWT_VP,
            Self::JwtVcJson => FORMAT_JWT_VC_JSON,
            Self::JwtVcJsonLd => FORMAT_JWT_VC_JSON_LD,
            Self::JwtVpJson => FORMAT_JWT_VP_JSON,
            Self::Ldp => FORMAT_LDP,
            Self::LdpVc => FORMAT_LDP_VC,
            Self::LdpVp => FORMAT_LDP_VP,
            Self::Other(other) => other,
        }
    }

    /// Whether a credential offer may name this format.
    pub fn is_issuable(&self) -> bool {
        matches!(self, Self::JwtVcJson | Self::JwtVcJsonLd | Self::LdpVc)
    }

    /// Whether credentials of this format travel as compact JWTs.
    pub fn is_jwt(&self) -> bool {
        matches!(
            self,
            Self::Jwt | Self::JwtVc | Self::JwtVcJson | Self::JwtVcJsonLd
        )
    }

    /// Whether the `@context` member is sent in credential requests for this format.
    pub fn uses_json_ld_context(&self) -> bool {
        matches!(self, Self::LdpVc)
    }

    /// The designations a verifier may use when it accepts credentials of this format.
    pub fn designations(&self) -> &'static [&'static str] {
        match self {
            Self::Jwt | Self::JwtVc | Self::JwtVcJson | Self::JwtVcJsonLd => &[
                FORMAT_JWT,
                FORMAT_JWT_VC,
                FORMAT_JWT_VC_JSON,
                FORMAT_JWT_VC_JSON_LD,
            ],
            Self::Ldp | Self::LdpVc => &[FORMAT_LDP, FORMAT_LDP_VC],
            Self::JwtVp | Self::JwtVpJson => &[FORMAT_JWT_VP, FORMAT_JWT_VP_JSON],
            Self::LdpVp => &[FORMAT_LDP_VP],
            Self::Other(_) => &[],
        }
    }

    /// Whether a format map lists a designation compatible with this format.
    pub fn is_accepted_by(&self, formats: &ClaimFormatMap) -> bool {
        formats.keys().any(|key| {
            key == self || self.designations().contains(&key.name())
        })
    }
}

impl From<&str> for CredentialFormat {
    fn from(s: &str) -> Self {
        Self::from_name(Cow::Borrowed(s))
    }
}

impl From<String> for CredentialFormat {
    fn from(value: String) -> Self {
        Self::from_name(Cow::Owned(value))
    }
}

impl FromStr for CredentialFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

impl From<CredentialFormat> for String {
    fn from(format: CredentialFormat) -> Self {
        match format {
            CredentialFormat::Other(other) => other,
            known => known.name().to_owned(),
        }
    }
}

impl fmt::Display for CredentialFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

impl Serialize for CredentialFormat {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.name().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CredentialFormat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Into::into)
    }
}
