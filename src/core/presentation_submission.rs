use serde::{Deserialize, Serialize};

use super::credential_format::CredentialFormat;

/// A DescriptorMapId is a unique identifier for a DescriptorMap.
pub type DescriptorMapId = String;

/// Presentation Submissions express how the inputs presented to a
/// [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) are
/// provided in accordance with the requirements of a
/// [PresentationDefinition](super::presentation_definition::PresentationDefinition).
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationSubmission {
    id: uuid::Uuid,
    definition_id: DescriptorMapId,
    descriptor_map: Vec<DescriptorMap>,
}

impl PresentationSubmission {
    pub fn new(
        id: uuid::Uuid,
        definition_id: DescriptorMapId,
        descriptor_map: Vec<DescriptorMap>,
    ) -> Self {
        Self {
            id,
            definition_id,
            descriptor_map,
        }
    }

    pub fn id(&self) -> &uuid::Uuid {
        &self.id
    }

    pub fn definition_id(&self) -> &String {
        &self.definition_id
    }

    pub fn descriptor_map(&self) -> &Vec<DescriptorMap> {
        &self.descriptor_map
    }
}

/// Where in the submitted token an input descriptor's credential is found.
///
/// For a single presentation the path points into the presentation
/// (`$.verifiableCredential[j]`). For a `vp_token` array the outer entry selects the
/// presentation (`$[i]`) and `path_nested` the credential inside it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptorMap {
    id: DescriptorMapId,
    format: CredentialFormat,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path_nested: Option<Box<DescriptorMap>>,
}

impl DescriptorMap {
    pub fn new(
        id: impl Into<DescriptorMapId>,
        format: impl Into<CredentialFormat>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            format: format.into(),
            path: path.into(),
            path_nested: None,
        }
    }

    pub fn id(&self) -> &DescriptorMapId {
        &self.id
    }

    pub fn format(&self) -> &CredentialFormat {
        &self.format
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn path_nested(&self) -> Option<&DescriptorMap> {
        self.path_nested.as_deref()
    }

    /// Set the nested path of the descriptor map. The nested entry carries the same id.
    pub fn set_path_nested(mut self, mut path_nested: DescriptorMap) -> Self {
        path_nested.id.clone_from(&self.id);
        self.path_nested = Some(Box::new(path_nested));
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn nested_descriptor_serialization() {
        let map = DescriptorMap::new("degree", "jwt_vp", "$[1]")
            .set_path_nested(DescriptorMap::new("", "jwt_vc_json", "$.verifiableCredential[0]"));

        assert_eq!(
            serde_json::to_value(&map).unwrap(),
            json!({
                "id": "degree",
                "format": "jwt_vp",
                "path": "$[1]",
                "path_nested": {
                    "id": "degree",
                    "format": "jwt_vc_json",
                    "path": "$.verifiableCredential[0]"
                }
            })
        );
    }
}
