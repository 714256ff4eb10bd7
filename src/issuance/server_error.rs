//! Classification of OAuth 2.0 style error responses from issuer endpoints.

use serde::Deserialize;

use super::MODULE;
use crate::{
    core::util::HttpReply,
    error::{Scenario, ServerErrorDetails, WalletError},
};

#[derive(Debug, Default, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    c_nonce: Option<String>,
}

fn classify(
    reply: &HttpReply,
    endpoint: &str,
    scenario_of: fn(&str) -> Scenario,
    unparsable: Scenario,
) -> WalletError {
    let parsed = serde_json::from_slice::<OAuthErrorBody>(&reply.body);

    let details = ServerErrorDetails {
        status: reply.status.as_u16(),
        body: reply.body_str(),
        endpoint: endpoint.to_owned(),
        c_nonce: parsed.as_ref().ok().and_then(|body| body.c_nonce.clone()),
    };

    match parsed {
        Ok(body) => {
            let scenario = scenario_of(&body.error);
            tracing::warn!(
                endpoint,
                status = details.status,
                error = %body.error,
                "issuer reported an error"
            );
            WalletError::server_reported(
                MODULE,
                scenario,
                details,
                Some(body.error),
                body.error_description,
            )
        }
        Err(_) => WalletError::execution(MODULE, unparsable, details),
    }
}

/// Classify a non-successful token endpoint response.
pub(crate) fn token_error(reply: &HttpReply) -> WalletError {
    classify(
        reply,
        "issuer's token endpoint",
        |code| match code {
            "invalid_request" => Scenario::InvalidTokenRequest,
            "invalid_grant" => Scenario::InvalidGrant,
            "invalid_client" => Scenario::InvalidClient,
            _ => Scenario::OtherTokenRequestError,
        },
        Scenario::OtherTokenRequestError,
    )
}

/// Classify a non-successful credential or notification endpoint response.
pub(crate) fn credential_error(reply: &HttpReply, endpoint: &str) -> WalletError {
    classify(
        reply,
        endpoint,
        |code| match code {
            "invalid_request" => Scenario::InvalidCredentialRequest,
            "invalid_token" => Scenario::InvalidToken,
            "unsupported_credential_format" => Scenario::UnsupportedCredentialFormat,
            "unsupported_credential_type" => Scenario::UnsupportedCredentialType,
            "invalid_or_missing_proof" => Scenario::InvalidOrMissingProof,
            "invalid_proof" => Scenario::InvalidProof,
            "expired_ack_id" => Scenario::ExpiredAckId,
            _ => Scenario::OtherCredentialRequestError,
        },
        Scenario::OtherCredentialRequestError,
    )
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::error::ErrorKind;

    fn reply(status: u16, body: &str) -> HttpReply {
        HttpReply {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn token_errors() {
        let cases = [
            ("invalid_request", Scenario::InvalidTokenRequest),
            ("invalid_grant", Scenario::InvalidGrant),
            ("invalid_client", Scenario::InvalidClient),
            ("unauthorized_client", Scenario::OtherTokenRequestError),
        ];
        for (code, scenario) in cases {
            let body = format!(r#"{{"error":"{code}","error_description":"nope"}}"#);
            let err = token_error(&reply(400, &body));
            assert_eq!(err.scenario(), scenario);
            assert_eq!(err.kind(), ErrorKind::ServerReported);
            assert_eq!(err.server_code(), Some(code));
            assert_eq!(err.server_message(), Some("nope"));
        }
    }

    #[test]
    fn unparsable_token_error_keeps_status_and_body() {
        let err = token_error(&reply(502, "<html>bad gateway</html>"));
        assert_eq!(err.scenario(), Scenario::OtherTokenRequestError);
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert!(err.server_code().is_none());
        let message = err.to_string();
        assert!(message.contains("502"), "{message}");
        assert!(message.contains("bad gateway"), "{message}");
    }

    #[test]
    fn invalid_proof_carries_fresh_nonce() {
        let err = credential_error(
            &reply(400, r#"{"error":"invalid_proof","c_nonce":"N2","c_nonce_expires_in":300}"#),
            "issuer's credential endpoint",
        );
        assert_eq!(err.scenario(), Scenario::InvalidProof);
        assert_eq!(err.fresh_nonce(), Some("N2"));

        let err = credential_error(
            &reply(400, r#"{"error":"expired_ack_id"}"#),
            "issuer's notification endpoint",
        );
        assert_eq!(err.scenario(), Scenario::ExpiredAckId);
        assert_eq!(err.fresh_nonce(), None);

        let err = credential_error(&reply(500, r#"{"error":"server_error"}"#), "x");
        assert_eq!(err.scenario(), Scenario::OtherCredentialRequestError);
        assert_eq!(err.server_code(), Some("server_error"));
    }
}
