use serde_json::{json, Value as Json};
use wallet_sdk::{
    config::RequestCredentialOptions,
    core::{credential_format::CredentialFormat, jws::DecodedJws},
    issuance::{AcknowledgmentEvent, IssuanceState},
    wallet::Wallet,
};
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

mod common;

const ISSUER_DID: &str = "did:example:issuer";
const HOLDER_DID: &str = "did:example:holder";

async fn issuer(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-credential-issuer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "credential_issuer": server.uri(),
            "token_endpoint": format!("{}/token", server.uri()),
            "credential_endpoint": format!("{}/credential", server.uri()),
            "notification_endpoint": format!("{}/notify", server.uri()),
            "credential_configurations_supported": {
                "degree": {
                    "format": "jwt_vc_json",
                    "credential_definition": {
                        "type": ["VerifiableCredential", "UniversityDegreeCredential"]
                    }
                }
            }
        })))
        .mount(server)
        .await;
}

fn offer_uri(server: &MockServer) -> String {
    let offer = json!({
        "credential_issuer": server.uri(),
        "credentials": [{
            "format": "jwt_vc_json",
            "types": ["VerifiableCredential", "UniversityDegreeCredential"]
        }],
        "grants": {
            "urn:ietf:params:oauth:grant-type:pre-authorized_code": {
                "pre-authorized_code": "secret-code",
                "tx_code": {"length": 4, "input_mode": "numeric"}
            }
        }
    });
    url::Url::parse_with_params(
        "openid-credential-offer://",
        [("credential_offer", offer.to_string())],
    )
    .unwrap()
    .to_string()
}

#[tokio::test]
async fn pre_authorized_issuance_over_http() {
    let server = MockServer::start().await;
    let dids = common::Dids::default();
    let issuer_key = dids.create(ISSUER_DID);
    let holder_key = dids.create(HOLDER_DID);

    issuer(&server).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("pre-authorized_code=secret-code"))
        .and(body_string_contains("tx_code=1234"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "token_type": "bearer",
            "expires_in": 300,
            "c_nonce": "nonce-1"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/credential"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "credential": dids.issue(&issuer_key, HOLDER_DID, "UniversityDegreeCredential").await,
            "notification_id": "ack-1"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let wallet = Wallet::new(dids.config());
    let mut interaction = wallet.accept_offer(&offer_uri(&server)).await.unwrap();
    assert!(interaction.pre_authorized_code_grant_type_supported());
    assert!(!interaction.authorization_code_grant_type_supported());

    let options = RequestCredentialOptions {
        pin: Some("1234".into()),
    };
    let credentials = interaction
        .request_credential_with_pre_auth(&dids.signer(&holder_key), &options)
        .await
        .unwrap();

    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].format(), &CredentialFormat::JwtVcJson);
    assert_eq!(credentials[0].issuer(), Some(ISSUER_DID));
    assert_eq!(credentials[0].subject_id(), Some(HOLDER_DID));
    assert_eq!(interaction.state(), IssuanceState::AcknowledgmentPending);

    let requests = server.received_requests().await.unwrap();
    let credential_request: Json = requests
        .iter()
        .find(|request| request.url.path() == "/credential")
        .unwrap()
        .body_json()
        .unwrap();
    let proof = DecodedJws::decode(credential_request["proof"]["jwt"].as_str().unwrap()).unwrap();
    assert_eq!(proof.kid().unwrap(), holder_key);
    assert_eq!(proof.claims["nonce"], "nonce-1");
    assert_eq!(proof.claims["aud"], server.uri());

    assert!(interaction.require_acknowledgment().unwrap());
    let acknowledgment = interaction.acknowledgment().unwrap();
    assert_eq!(interaction.state(), IssuanceState::Done);
    wallet
        .acknowledge(&acknowledgment, AcknowledgmentEvent::CredentialAccepted, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn issuer_errors_fail_the_interaction() {
    let server = MockServer::start().await;
    let dids = common::Dids::default();
    let holder_key = dids.create(HOLDER_DID);

    issuer(&server).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "code already used"
        })))
        .mount(&server)
        .await;

    let wallet = Wallet::new(dids.config());
    let mut interaction = wallet.accept_offer(&offer_uri(&server)).await.unwrap();
    let options = RequestCredentialOptions {
        pin: Some("1234".into()),
    };
    let err = interaction
        .request_credential_with_pre_auth(&dids.signer(&holder_key), &options)
        .await
        .unwrap_err();

    assert_eq!(err.server_code(), Some("invalid_grant"));
    assert_eq!(err.server_message(), Some("code already used"));
    assert_eq!(interaction.state(), IssuanceState::Failed);
}
