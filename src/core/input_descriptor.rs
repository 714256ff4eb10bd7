use anyhow::{anyhow, Context, Result};
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use serde_json_path::JsonPath;

use super::{credential::Credential, credential_format::ClaimFormatMap};
use crate::utils::NonEmptyVec;

/// Input Descriptors are objects used to describe the information a
/// [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) requires of a
/// [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder).
///
/// All Input Descriptors MUST be satisfied, unless otherwise specified by a
/// [Feature](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:feature).
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct InputDescriptor {
    id: String,
    #[serde(default)]
    constraints: Constraints,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    format: Option<ClaimFormatMap>,
    /// Presentation Exchange v1 `schema` list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    schema: Vec<Schema>,
}

/// A Presentation Exchange v1 schema reference. A credential satisfies it when the uri is one
/// of the credential's types or contexts.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schema {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

impl InputDescriptor {
    pub fn new(id: String, constraints: Constraints) -> Self {
        Self {
            id,
            constraints,
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
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

    pub fn set_format(mut self, format: ClaimFormatMap) -> Self {
        self.format = Some(format);
        self
    }

    pub fn schemas(&self) -> &[Schema] {
        &self.schema
    }

    pub fn add_schema(mut self, uri: impl Into<String>) -> Self {
        self.schema.push(Schema {
            uri: uri.into(),
            required: None,
        });
        self
    }

    /// Whether `credential` satisfies this descriptor.
    ///
    /// The format (this descriptor's or, failing that, the definition's `default_format`) and
    /// schema requirements always apply. Constraint fields are skipped when `ignore_constraints`
    /// is set.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSONPath expressions or filter schemas, which are the verifier's fault
    /// rather than a non-match.
    pub fn is_satisfied_by(
        &self,
        credential: &Credential,
        default_format: Option<&ClaimFormatMap>,
        ignore_constraints: bool,
    ) -> Result<bool> {
        if let Some(formats) = self.format.as_ref().or(default_format) {
            if !credential.format().is_accepted_by(formats) {
                tracing::debug!(
                    descriptor = %self.id,
                    format = %credential.format(),
                    "credential format not accepted"
                );
                return Ok(false);
            }
        }

        if !self.matches_schema(credential) {
            return Ok(false);
        }

        if ignore_constraints {
            return Ok(true);
        }

        for field in self.constraints.fields() {
            if !field.is_satisfied_by(credential)? && field.is_required() {
                tracing::debug!(
                    descriptor = %self.id,
                    path = ?field.path(),
                    "constraint field not satisfied"
                );
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn matches_schema(&self, credential: &Credential) -> bool {
        if self.schema.is_empty() {
            return true;
        }

        let types = credential.types();
        let contexts = credential.contexts();
        self.schema
            .iter()
            .any(|schema| types.contains(&schema.uri) || contexts.contains(&schema.uri))
    }
}

/// Constraints a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder)
/// must satisfy to fulfill an Input Descriptor.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<ConstraintsField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_disclosure: Option<ConstraintsLimitDisclosure>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_constraint(mut self, field: ConstraintsField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &Vec<ConstraintsField> {
        self.fields.as_ref()
    }

    pub fn limit_disclosure(&self) -> Option<&ConstraintsLimitDisclosure> {
        self.limit_disclosure.as_ref()
    }
}

/// A single field requirement: at least one `path` must select a value that validates against
/// the optional `filter` JSON Schema.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ConstraintsField {
    path: NonEmptyVec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    optional: Option<bool>,
}

impl ConstraintsField {
    pub fn new(path: impl Into<String>) -> ConstraintsField {
        ConstraintsField {
            path: NonEmptyVec::new(path.into()),
            ..Default::default()
        }
    }

    pub fn add_path(mut self, path: impl Into<String>) -> Self {
        self.path.push(path.into());
        self
    }

    pub fn path(&self) -> &NonEmptyVec<String> {
        &self.path
    }

    pub fn id(&self) -> Option<&String> {
        self.id.as_ref()
    }

    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    pub fn set_filter(mut self, filter: Json) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn filter(&self) -> Option<&Json> {
        self.filter.as_ref()
    }

    pub fn set_optional(mut self, optional: bool) -> Self {
        self.optional = Some(optional);
        self
    }

    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or(false)
    }

    /// Inverse alias for `!is_optional()`.
    pub fn is_required(&self) -> bool {
        !self.is_optional()
    }

    /// Paths are evaluated against the credential document and, for JWT credentials, against
    /// the JWT claim set so that both `$.credentialSubject...` and `$.vc.credentialSubject...`
    /// select.
    fn is_satisfied_by(&self, credential: &Credential) -> Result<bool> {
        let validator = self
            .filter
            .as_ref()
            .map(|filter| {
                JSONSchema::compile(filter).map_err(|e| anyhow!("invalid filter schema: {e}"))
            })
            .transpose()?;

        let targets = std::iter::once(credential.document()).chain(credential.jwt_claims());

        for target in targets {
            for path in self.path.iter() {
                let path = JsonPath::parse(path)
                    .with_context(|| format!("invalid JSONPath expression '{path}'"))?;

                // > If the result returned no JSONPath match, skip to the next path array element.
                let nodes = path.query(target).all();
                let matched = match &validator {
                    Some(validator) => nodes.into_iter().any(|node| validator.is_valid(node)),
                    None => !nodes.is_empty(),
                };
                if matched {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintsLimitDisclosure {
    Required,
    Preferred,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::credential_format::CredentialFormat;

    fn degree() -> Credential {
        Credential::from_json_ld(json!({
            "@context": ["https://www.w3.org/2018/credentials/v1"],
            "type": ["VerifiableCredential", "UniversityDegreeCredential"],
            "issuer": "did:example:issuer",
            "credentialSubject": {
                "id": "did:example:holder",
                "degree": { "type": "BachelorDegree" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn filter_validates_selected_values() {
        let descriptor = InputDescriptor::new(
            "degree".into(),
            Constraints::new().add_constraint(
                ConstraintsField::new("$.credentialSubject.degree.type")
                    .set_filter(json!({"type": "string", "const": "BachelorDegree"})),
            ),
        );
        assert!(descriptor.is_satisfied_by(&degree(), None, false).unwrap());

        let descriptor = InputDescriptor::new(
            "degree".into(),
            Constraints::new().add_constraint(
                ConstraintsField::new("$.credentialSubject.degree.type")
                    .set_filter(json!({"type": "string", "const": "MasterDegree"})),
            ),
        );
        assert!(!descriptor.is_satisfied_by(&degree(), None, false).unwrap());
        // Constraint fields are skipped, schema and format still apply.
        assert!(descriptor.is_satisfied_by(&degree(), None, true).unwrap());
    }

    #[test]
    fn missing_optional_field_is_fine() {
        let descriptor = InputDescriptor::new(
            "degree".into(),
            Constraints::new().add_constraint(
                ConstraintsField::new("$.credentialSubject.gpa").set_optional(true),
            ),
        );
        assert!(descriptor.is_satisfied_by(&degree(), None, false).unwrap());
    }

    #[test]
    fn schema_and_format_are_enforced_without_constraints() {
        let descriptor = InputDescriptor::new("license".into(), Constraints::new())
            .add_schema("DriversLicenseCredential");
        assert!(!descriptor.is_satisfied_by(&degree(), None, true).unwrap());

        let formats: ClaimFormatMap =
            serde_json::from_value(json!({"jwt_vc": {"alg": ["ES256"]}})).unwrap();
        let descriptor =
            InputDescriptor::new("degree".into(), Constraints::new()).set_format(formats);
        assert!(!descriptor.is_satisfied_by(&degree(), None, true).unwrap());
    }

    #[test]
    fn malformed_path_is_an_error() {
        let descriptor = InputDescriptor::new(
            "degree".into(),
            Constraints::new().add_constraint(ConstraintsField::new("$[?(")),
        );
        assert!(descriptor.is_satisfied_by(&degree(), None, false).is_err());
    }

    #[test]
    fn credential_format_is_used() {
        assert_eq!(degree().format(), &CredentialFormat::LdpVc);
    }
}
