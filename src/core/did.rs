use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use ssi::jwk::JWK;

use crate::utils::OneOrMany;

pub const LINKED_DOMAINS: &str = "LinkedDomains";

/// Resolves DIDs to their documents.
///
/// Method specific resolution (`did:web`, `did:ion`, ...) lives behind this trait.
#[async_trait]
pub trait DidResolver: Send + Sync {
    async fn resolve(&self, did: &str) -> Result<DidDocument>;
}

/// The members of a DID document this crate reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<VerificationRelationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_method: Vec<VerificationRelationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<Service>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub controller: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_jwk: Option<JWK>,
}

/// A verification relationship entry: either a reference to a method in
/// `verificationMethod` or an embedded method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VerificationRelationship {
    Reference(String),
    Embedded(VerificationMethod),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: OneOrMany<String>,
    pub service_endpoint: Json,
}

impl Service {
    pub fn has_type(&self, service_type: &str) -> bool {
        match &self.type_ {
            OneOrMany::One(t) => t.eq_ignore_ascii_case(service_type),
            OneOrMany::Many(types) => types.iter().any(|t| t.eq_ignore_ascii_case(service_type)),
        }
    }

    /// The origins a `LinkedDomains` endpoint names. The endpoint may be a string, a list of
    /// strings, or an object with an `origins` list.
    pub fn origins(&self) -> Vec<String> {
        fn strings(value: &Json) -> Vec<String> {
            match value {
                Json::String(s) => vec![s.clone()],
                Json::Array(items) => items.iter().flat_map(strings).collect(),
                Json::Object(map) => map.get("origins").map(strings).unwrap_or_default(),
                _ => Vec::new(),
            }
        }
        strings(&self.service_endpoint)
    }
}

impl DidDocument {
    fn expand_id<'a>(&self, id: &'a str) -> std::borrow::Cow<'a, str> {
        if id.starts_with('#') {
            format!("{}{id}", self.id).into()
        } else {
            id.into()
        }
    }

    fn dereference<'a>(
        &'a self,
        relationship: &'a VerificationRelationship,
    ) -> Option<&'a VerificationMethod> {
        match relationship {
            VerificationRelationship::Embedded(method) => Some(method),
            VerificationRelationship::Reference(id) => {
                let id = self.expand_id(id);
                self.verification_method
                    .iter()
                    .find(|vm| self.expand_id(&vm.id) == id)
            }
        }
    }

    /// Find a verification method by its (absolute or relative) id, embedded methods included.
    pub fn verification_method(&self, id: &str) -> Option<&VerificationMethod> {
        let id = self.expand_id(id);
        let embedded = self
            .authentication
            .iter()
            .chain(&self.assertion_method)
            .filter_map(|r| match r {
                VerificationRelationship::Embedded(vm) => Some(vm),
                VerificationRelationship::Reference(_) => None,
            });

        self.verification_method
            .iter()
            .chain(embedded)
            .find(|vm| self.expand_id(&vm.id) == id)
    }

    /// The methods authorized to issue assertions, in document order.
    pub fn assertion_methods(&self) -> Vec<&VerificationMethod> {
        self.assertion_method
            .iter()
            .filter_map(|r| self.dereference(r))
            .collect()
    }

    /// The absolute id of a verification method of this document.
    pub fn absolute_id(&self, method: &VerificationMethod) -> String {
        self.expand_id(&method.id).into_owned()
    }

    pub fn services_of_type(&self, service_type: &str) -> Vec<&Service> {
        self.service
            .iter()
            .filter(|s| s.has_type(service_type))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::{collections::HashMap, sync::Mutex};

    use anyhow::Context;
    use serde_json::json;

    use super::*;
    use crate::core::jws::P256Signer;

    /// Resolves the documents it was given.
    #[derive(Default)]
    pub struct MemoryResolver(Mutex<HashMap<String, DidDocument>>);

    impl MemoryResolver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, document: DidDocument) -> &Self {
            self.0.lock().unwrap().insert(document.id.clone(), document);
            self
        }
    }

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

    /// A document with `key` as `#key-1`, referenced from `assertionMethod`.
    pub fn document_with_key(did: &str, key: &P256Signer) -> DidDocument {
        serde_json::from_value(json!({
            "id": did,
            "verificationMethod": [{
                "id": format!("{did}#key-1"),
                "type": "JsonWebKey2020",
                "controller": did,
                "publicKeyJwk": key.jwk().unwrap()
            }],
            "assertionMethod": ["#key-1"]
        }))
        .unwrap()
    }
}
