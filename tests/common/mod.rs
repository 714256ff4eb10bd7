#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value as Json};
use wallet_sdk::{
    config::ClientConfig,
    core::{
        did::{DidDocument, DidResolver},
        jws::{JwtSigner, P256Signer, Signer, ES256},
    },
};

/// Resolves the documents registered with it.
#[derive(Default)]
pub struct MemoryResolver(Mutex<HashMap<String, DidDocument>>);

#[async_trait]
impl DidResolver for MemoryResolver {
    async fn resolve(&self, did: &str) -> Result<DidDocument> {
        self.0
            .lock()
            .unwrap()
            .get(did)
            .cloned()
            .with_context(|| format!("unknown did {did}"))
    }
}

/// Holds the P-256 keys of every DID in a test, by key id.
#[derive(Default)]
pub struct KeyStore(Mutex<HashMap<String, P256Signer>>);

#[async_trait]
impl Signer for KeyStore {
    fn alg(&self) -> &str {
        ES256
    }

    async fn sign(&self, payload: &[u8], key_id: &str) -> Result<Vec<u8>> {
        let key = self
            .0
            .lock()
            .unwrap()
            .get(key_id)
            .cloned()
            .with_context(|| format!("no key for {key_id}"))?;
        key.sign(payload, key_id).await
    }
}

/// DIDs with fresh keys, registered both for resolution and for signing.
#[derive(Clone, Default)]
pub struct Dids {
    pub resolver: Arc<MemoryResolver>,
    pub keys: Arc<KeyStore>,
}

impl Dids {
    /// Register `did` with a key at `{did}#key-1` and return that key id.
    pub fn create(&self, did: &str) -> String {
        let key = P256Signer::generate();
        let key_id = format!("{did}#key-1");
        let document: DidDocument = serde_json::from_value(json!({
            "id": did,
            "verificationMethod": [{
                "id": key_id,
                "type": "JsonWebKey2020",
                "controller": did,
                "publicKeyJwk": key.jwk().unwrap()
            }],
            "assertionMethod": ["#key-1"]
        }))
        .unwrap();

        self.resolver
            .0
            .lock()
            .unwrap()
            .insert(did.to_owned(), document);
        self.keys.0.lock().unwrap().insert(key_id.clone(), key);
        key_id
    }

    pub fn signer(&self, key_id: &str) -> JwtSigner {
        JwtSigner::new(self.keys.clone(), key_id)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.resolver.clone()).unwrap()
    }

    /// A signed JWT VC issued by `issuer_key_id` to `holder`.
    pub async fn issue(&self, issuer_key_id: &str, holder: &str, credential_type: &str) -> String {
        let issuer = issuer_key_id.split('#').next().unwrap();
        let claims: Json = json!({
            "iss": issuer,
            "sub": holder,
            "jti": format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            "vc": {
                "@context": ["https://www.w3.org/2018/credentials/v1"],
                "type": ["VerifiableCredential", credential_type],
                "issuer": issuer,
                "credentialSubject": {"id": holder}
            }
        });
        self.signer(issuer_key_id)
            .sign_jwt(None, &claims)
            .await
            .unwrap()
    }
}
