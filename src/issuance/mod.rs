//! OpenID for Verifiable Credential Issuance.
//!
//! An [IssuerInitiatedInteraction] starts from an `openid-credential-offer://` URI and supports
//! both the pre-authorized code and the authorization code grant. A
//! [WalletInitiatedInteraction] starts from an issuer URI the wallet already knows.

pub mod acknowledgment;
pub mod authorization;
pub mod credential_request;
pub mod grants;
mod interaction;
pub mod issuer_initiated;
pub mod metadata;
pub mod offer;
pub mod proof;
mod server_error;
pub mod state;
pub mod token;
pub mod trust;
pub mod wallet_initiated;

pub use acknowledgment::{Acknowledgment, AcknowledgmentEvent};
pub use grants::{AuthorizationCodeGrantParams, PreAuthorizedCodeGrantParams, TxCode};
pub use issuer_initiated::IssuerInitiatedInteraction;
pub use metadata::{IssuerMetadata, SupportedCredential};
pub use offer::{resolve_offer, CredentialOffer, OfferedCredential};
pub use state::IssuanceState;
pub use token::AuthToken;
pub use trust::{IssuerTrustInfo, LinkedDomain};
pub use wallet_initiated::WalletInitiatedInteraction;

use crate::error::ErrorModule;

pub(crate) const MODULE: ErrorModule = ErrorModule::Issuance;
