//! Structured errors returned by every public operation.
//!
//! Internal helpers work with [anyhow::Result] and attach context as they go. At the
//! interaction boundary the error is wrapped into a [WalletError], which records the module
//! and scenario it happened in and keeps the original error as its
//! [source](std::error::Error::source).

use std::fmt;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type WalletResult<T> = Result<T, WalletError>;

/// The protocol area an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorModule {
    /// OpenID4VCI issuance.
    Issuance,
    /// OpenID4VP presentation.
    Presentation,
    /// DID resolution and linked domain checks.
    Did,
}

impl ErrorModule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issuance => "OCI",
            Self::Presentation => "OVP",
            Self::Did => "DID",
        }
    }
}

impl fmt::Display for ErrorModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// How the caller should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller input is malformed. Never retry with the same input.
    Validation,
    /// Network, IO or signing failure. The caller may start over with a new interaction.
    Execution,
    /// The remote server answered with a protocol error code.
    ServerReported,
    /// The authorization callback does not belong to this interaction.
    StateMismatch,
    /// An operation was called whose precondition does not hold.
    InvalidSdkUsage,
}

impl ErrorKind {
    fn type_digit(&self) -> u8 {
        match self {
            Self::Validation => 0,
            Self::Execution | Self::ServerReported | Self::StateMismatch => 1,
            Self::InvalidSdkUsage => 3,
        }
    }
}

macro_rules! scenarios {
    ($($variant:ident => ($code:literal, $category:literal)),+ $(,)?) => {
        /// The specific situation an error describes.
        ///
        /// Each scenario has a stable upper snake case category and a numeric code.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Scenario {
            $($variant),+
        }

        impl Scenario {
            pub fn category(&self) -> &'static str {
                match self {
                    $(Self::$variant => $category),+
                }
            }

            pub fn code(&self) -> u16 {
                match self {
                    $(Self::$variant => $code),+
                }
            }
        }
    };
}

scenarios! {
    InvalidSdkUsage => (0, "INVALID_SDK_USAGE"),
    InvalidIssuanceUri => (1, "INVALID_ISSUANCE_URI"),
    InvalidCredentialOffer => (2, "INVALID_CREDENTIAL_OFFER"),
    UnsupportedCredentialTypeInOffer => (3, "UNSUPPORTED_CREDENTIAL_TYPE_IN_OFFER"),
    IssuerOpenIdConfigFetchFailed => (4, "ISSUER_OPENID_FETCH_FAILED"),
    MetadataFetchFailed => (5, "METADATA_FETCH_FAILED"),
    TokenFetchFailed => (6, "TOKEN_FETCH_FAILED"),
    JwtSigningFailed => (7, "JWT_SIGNING_FAILED"),
    CredentialFetchFailed => (8, "CREDENTIAL_FETCH_FAILED"),
    KeyIdNotContainDidPart => (9, "KEY_ID_NOT_CONTAIN_DID_PART"),
    CredentialParseFailed => (10, "CREDENTIAL_PARSE_FAILED"),
    StateInRedirectUriNotMatchingAuthUrl => (11, "STATE_IN_REDIRECT_URI_NOT_MATCHING_AUTH_URL"),
    InvalidTokenRequest => (12, "INVALID_TOKEN_REQUEST"),
    InvalidGrant => (13, "INVALID_GRANT"),
    InvalidClient => (14, "INVALID_CLIENT"),
    OtherTokenRequestError => (15, "OTHER_TOKEN_REQUEST_ERROR"),
    InvalidCredentialRequest => (16, "INVALID_CREDENTIAL_REQUEST"),
    InvalidToken => (17, "INVALID_TOKEN"),
    UnsupportedCredentialFormat => (18, "UNSUPPORTED_CREDENTIAL_FORMAT"),
    UnsupportedCredentialType => (19, "UNSUPPORTED_CREDENTIAL_TYPE"),
    InvalidOrMissingProof => (20, "INVALID_OR_MISSING_PROOF"),
    InvalidProof => (21, "INVALID_PROOF"),
    ExpiredAckId => (22, "EXPIRED_ACK_ID"),
    OtherCredentialRequestError => (23, "OTHER_CREDENTIAL_REQUEST_ERROR"),
    AcknowledgmentRequestFailed => (24, "ACKNOWLEDGMENT_REQUEST_FAILED"),
    InvalidRedirectUri => (25, "INVALID_REDIRECT_URI"),
    InvalidAuthorizationRequest => (30, "INVALID_AUTHORIZATION_REQUEST"),
    CreateAuthorizedResponseFailed => (32, "CREATE_AUTHORIZED_RESPONSE_FAILED"),
    SendAuthorizedResponseFailed => (33, "SEND_AUTHORIZED_RESPONSE_FAILED"),
    InvalidScope => (34, "INVALID_SCOPE"),
    InvalidRequest => (35, "INVALID_REQUEST"),
    VpFormatsNotSupported => (36, "VP_FORMATS_NOT_SUPPORTED"),
    InvalidPresentationDefinitionUri => (37, "INVALID_PRESENTATION_DEFINITION_URI"),
    InvalidPresentationDefinitionReference => (38, "INVALID_PRESENTATION_DEFINITION_REFERENCE"),
    OtherAuthorizationResponseError => (39, "OTHER_AUTHORIZATION_RESPONSE_ERROR"),
    MsEntraBadOrMissingFields => (40, "MS_ENTRA_BAD_OR_MISSING_FIELDS"),
    MsEntraNotFound => (41, "MS_ENTRA_NOT_FOUND"),
    MsEntraTokenError => (42, "MS_ENTRA_TOKEN_ERROR"),
    MsEntraTransientError => (43, "MS_ENTRA_TRANSIENT_ERROR"),
    VerifierAcknowledgmentFailed => (44, "VERIFIER_ACKNOWLEDGMENT_FAILED"),
    DidResolutionFailed => (50, "DID_RESOLUTION_FAILED"),
    WellKnownInitializationFailed => (51, "WELLKNOWN_INITIALIZATION_FAILED"),
    DomainAndDidVerificationFailed => (52, "DOMAIN_AND_DID_VERIFICATION_FAILED"),
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.category().fmt(f)
    }
}

/// The single structured error type of the public API.
#[derive(Debug, Error)]
#[error("{category}({code}): {source}")]
pub struct WalletError {
    module: ErrorModule,
    kind: ErrorKind,
    scenario: Scenario,
    category: &'static str,
    code: String,
    server_code: Option<String>,
    server_message: Option<String>,
    #[source]
    source: BoxError,
}

impl WalletError {
    pub fn new(
        module: ErrorModule,
        kind: ErrorKind,
        scenario: Scenario,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            module,
            kind,
            scenario,
            category: scenario.category(),
            code: format!("{module}{}-{:04}", kind.type_digit(), scenario.code()),
            server_code: None,
            server_message: None,
            source: source.into(),
        }
    }

    pub fn validation(
        module: ErrorModule,
        scenario: Scenario,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::new(module, ErrorKind::Validation, scenario, source)
    }

    pub fn execution(module: ErrorModule, scenario: Scenario, source: impl Into<BoxError>) -> Self {
        Self::new(module, ErrorKind::Execution, scenario, source)
    }

    pub fn invalid_usage(module: ErrorModule, source: impl Into<BoxError>) -> Self {
        Self::new(
            module,
            ErrorKind::InvalidSdkUsage,
            Scenario::InvalidSdkUsage,
            source,
        )
    }

    /// An error the server reported with an error code from the protocol vocabulary.
    pub fn server_reported(
        module: ErrorModule,
        scenario: Scenario,
        source: impl Into<BoxError>,
        server_code: Option<String>,
        server_message: Option<String>,
    ) -> Self {
        Self {
            server_code,
            server_message,
            ..Self::new(module, ErrorKind::ServerReported, scenario, source)
        }
    }

    pub fn module(&self) -> ErrorModule {
        self.module
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    pub fn category(&self) -> &'static str {
        self.category
    }

    /// Short alphanumeric code, e.g. `OCI1-0005`.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The error code sent by the server, if the server sent one.
    pub fn server_code(&self) -> Option<&str> {
        self.server_code.as_deref()
    }

    /// The error description sent by the server, if the server sent one.
    pub fn server_message(&self) -> Option<&str> {
        self.server_message.as_deref()
    }

    /// The `c_nonce` an issuer attached to an `invalid_proof` response.
    pub(crate) fn fresh_nonce(&self) -> Option<&str> {
        self.source
            .downcast_ref::<ServerErrorDetails>()
            .and_then(|details| details.c_nonce.as_deref())
    }
}

/// Raw details of a non-successful server response, kept as the cause of a
/// [ServerReported](ErrorKind::ServerReported) error.
#[derive(Debug, Clone, Error)]
#[error("received status code [{status}] with body [{body}] from {endpoint}")]
pub struct ServerErrorDetails {
    pub status: u16,
    pub body: String,
    pub endpoint: String,
    pub c_nonce: Option<String>,
}

/// Converts internal [anyhow] results into [WalletError]s.
pub trait WalletResultExt<T> {
    fn wallet_err(self, module: ErrorModule, kind: ErrorKind, scenario: Scenario)
        -> WalletResult<T>;

    fn validation_err(self, module: ErrorModule, scenario: Scenario) -> WalletResult<T>
    where
        Self: Sized,
    {
        self.wallet_err(module, ErrorKind::Validation, scenario)
    }

    fn execution_err(self, module: ErrorModule, scenario: Scenario) -> WalletResult<T>
    where
        Self: Sized,
    {
        self.wallet_err(module, ErrorKind::Execution, scenario)
    }
}

impl<T> WalletResultExt<T> for anyhow::Result<T> {
    fn wallet_err(
        self,
        module: ErrorModule,
        kind: ErrorKind,
        scenario: Scenario,
    ) -> WalletResult<T> {
        self.map_err(|e| WalletError::new(module, kind, scenario, e))
    }
}
