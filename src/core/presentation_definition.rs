use std::collections::BTreeSet;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::{
    credential::Credential, credential_format::ClaimFormatMap, input_descriptor::InputDescriptor,
};

/// A presentation definition is a JSON object that describes the information a [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) requires of a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder).
///
/// Presentation Definitions are composed of inputs, which describe the forms and details of the
/// proofs they require.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition)
#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq)]
pub struct PresentationDefinition {
    id: String,
    input_descriptors: Vec<InputDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<ClaimFormatMap>,
}

/// The credentials that satisfy each input descriptor of a definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionMatch {
    inputs: Vec<(String, Vec<usize>)>,
}

impl DefinitionMatch {
    /// `(input descriptor id, indices of the satisfying credentials)` in descriptor order.
    pub fn inputs(&self) -> &[(String, Vec<usize>)] {
        &self.inputs
    }

    /// Indices of every credential that satisfies at least one descriptor, ascending.
    pub fn credential_indices(&self) -> Vec<usize> {
        self.inputs
            .iter()
            .flat_map(|(_, indices)| indices.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl PresentationDefinition {
    pub fn new(id: String, input_descriptor: InputDescriptor) -> Self {
        Self {
            id,
            input_descriptors: vec![input_descriptor],
            ..Default::default()
        }
    }

    pub fn id(&self) -> &String {
        &self.id
    }

    pub fn add_input_descriptors(mut self, input_descriptor: InputDescriptor) -> Self {
        self.input_descriptors.push(input_descriptor);
        self
    }

    pub fn input_descriptors(&self) -> &Vec<InputDescriptor> {
        &self.input_descriptors
    }

    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    pub fn format(&self) -> Option<&ClaimFormatMap> {
        self.format.as_ref()
    }

    /// Match `credentials` against every input descriptor.
    ///
    /// Every descriptor must be satisfied by at least one credential. With `ignore_constraints`
    /// the descriptors' constraint fields are not evaluated; format and schema requirements
    /// still are.
    pub fn match_credentials(
        &self,
        credentials: &[Credential],
        ignore_constraints: bool,
    ) -> Result<DefinitionMatch> {
        if self.input_descriptors.is_empty() {
            bail!("presentation definition '{}' has no input descriptors", self.id)
        }

        let mut inputs = Vec::with_capacity(self.input_descriptors.len());
        for descriptor in &self.input_descriptors {
            let mut matching = Vec::new();
            for (index, credential) in credentials.iter().enumerate() {
                if descriptor.is_satisfied_by(credential, self.format(), ignore_constraints)? {
                    matching.push(index);
                }
            }

            if matching.is_empty() {
                bail!(
                    "no credential satisfies input descriptor '{}'",
                    descriptor.id()
                )
            }
            inputs.push((descriptor.id().to_owned(), matching));
        }

        Ok(DefinitionMatch { inputs })
    }
}
