//! A wallet-side implementation of [OID4VCI] credential issuance and [OID4VP] credential
//! presentation.
//!
//! [OID4VCI]: <https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html>
//! [OID4VP]: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html>
//!
//! # Issuance
//!
//! An issuer hands the wallet an `openid-credential-offer://` URI, usually as a QR code.
//! The offer names the credentials on offer and the grants the wallet may use to obtain them:
//!
//! ```ignore
//! use wallet_sdk::config::{ClientConfig, RequestCredentialOptions};
//! use wallet_sdk::core::jws::JwtSigner;
//! use wallet_sdk::wallet::Wallet;
//!
//! let wallet = Wallet::new(ClientConfig::new(did_resolver)?);
//! let mut interaction = wallet.accept_offer(&offer_uri).await?;
//!
//! let signer = JwtSigner::new(key_store, "did:example:holder#key-1");
//! let credentials = if interaction.pre_authorized_code_grant_type_supported() {
//!     let options = RequestCredentialOptions { pin: Some(pin) };
//!     interaction.request_credential_with_pre_auth(&signer, &options).await?
//! } else {
//!     let url = interaction
//!         .create_authorization_url(client_id, redirect_uri, &Default::default())
//!         .await?;
//!     // Open `url` in a browser and wait for the redirect back to the wallet.
//!     interaction.request_credential_with_auth(&signer, &redirected_to).await?
//! };
//!
//! if interaction.require_acknowledgment()? {
//!     interaction.acknowledgment()?.accept(http_client).await?;
//! }
//! ```
//!
//! The [issuance::WalletInitiatedInteraction] covers issuers the wallet already knows, through
//! the authorization code grant only.
//!
//! # Presentation
//!
//! A verifier asks for credentials with an `openid-vc://?request_uri=...` authorization
//! request. The wallet fetches and verifies the signed request object, matches its
//! presentation definition and posts the presentation:
//!
//! ```ignore
//! let interaction = wallet.present_to(&authorization_request).await?;
//! let display = interaction.verifier_display_data();
//!
//! let matched = interaction.matched_credentials(&stored, &Default::default())?;
//! // Ask the user for consent, then:
//! interaction
//!     .present_credential(&stored, key_store, &Default::default())
//!     .await?;
//! ```
//!
//! # Errors
//!
//! Every operation returns a [error::WalletError] that carries the module and scenario it
//! came from, a stable code such as `OCI1-0006`, and the error the issuer or verifier
//! reported, if any.

pub mod config;
pub mod core;
pub mod error;
pub mod issuance;
pub mod presentation;
pub mod utils;
pub mod wallet;
