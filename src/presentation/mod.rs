//! OpenID for Verifiable Presentations.
//!
//! A [PresentationInteraction] resolves a verifier's signed request object, matches the
//! wallet's credentials against its presentation definition and posts the `id_token` and
//! `vp_token` to the verifier's response URI.

pub mod acknowledgment;
pub mod builder;
pub mod interaction;
pub mod request;
mod response;

pub use acknowledgment::{DeclineReason, VerifierAcknowledgment};
pub use builder::AuthorizedResponse;
pub use interaction::{PresentationInteraction, VerifierDisplayData};
pub use request::{resolve_request, ClientIdScheme, ClientMetadata, RequestObject};

use crate::error::ErrorModule;

pub(crate) const MODULE: ErrorModule = ErrorModule::Presentation;
