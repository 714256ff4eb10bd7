//! Protocol primitives shared by the issuance and presentation flows.

pub mod credential;
pub mod credential_format;
pub mod did;
pub mod input_descriptor;
pub mod jws;
pub mod presentation_definition;
pub mod presentation_submission;
pub mod util;
