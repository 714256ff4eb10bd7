use anyhow::Context;
use serde::Serialize;

use super::MODULE;
use crate::{
    core::jws::JwtSigner,
    error::{Scenario, WalletResult, WalletResultExt},
    utils::now_secs,
};

pub const PROOF_TYP: &str = "openid4vci-proof+jwt";

#[derive(Debug, Serialize)]
struct ProofClaims<'a> {
    aud: &'a str,
    iat: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iss: Option<&'a str>,
}

/// Check that the signer's key id names a DID, so that the issuer can bind the credential.
pub(crate) fn validate_signer(signer: &JwtSigner) -> WalletResult<()> {
    signer
        .did()
        .map(drop)
        .validation_err(MODULE, Scenario::KeyIdNotContainDidPart)
}

/// Build a signed proof of possession JWT for the issuer `aud`.
///
/// `iss` is the client id and is only sent in the authorization code flow.
pub(crate) async fn build_proof(
    signer: &JwtSigner,
    aud: &str,
    nonce: Option<&str>,
    iss: Option<&str>,
) -> WalletResult<String> {
    let claims = ProofClaims {
        aud,
        iat: now_secs().execution_err(MODULE, Scenario::JwtSigningFailed)?,
        nonce,
        iss,
    };

    signer
        .sign_jwt(Some(PROOF_TYP), &claims)
        .await
        .context("failed to sign proof of possession")
        .execution_err(MODULE, Scenario::JwtSigningFailed)
}
