use anyhow::anyhow;
use serde::Serialize;

use super::MODULE;
use crate::error::{ErrorKind, WalletError, WalletResult};

/// Where an issuance interaction is in its flow.
///
/// ```text
/// Created -> MetadataPopulated -> [AuthUrlCreated ->] TokenObtained -> CredentialRequested
///         -> AcknowledgmentPending | Done
/// ```
///
/// Any state can move to `Failed`. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuanceState {
    Created,
    MetadataPopulated,
    AuthUrlCreated,
    TokenObtained,
    CredentialRequested,
    AcknowledgmentPending,
    Done,
    Failed,
}

/// The operations that move an interaction forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    PopulateMetadata,
    CreateAuthUrl,
    ExchangeAuthorizationCode,
    ExchangePreAuthorizedCode,
    RequestCredential,
    Complete { acknowledgment_pending: bool },
    TakeAcknowledgment,
}

impl IssuanceState {
    /// The state after `step`, or an invalid usage error when `step` is not allowed now.
    pub(crate) fn transition(self, step: Step) -> WalletResult<Self> {
        use IssuanceState::*;

        let next = match (self, step) {
            (Created, Step::PopulateMetadata) => MetadataPopulated,
            // Metadata is cached, later population requests are no-ops.
            (Failed, Step::PopulateMetadata) => return Err(self.rejects(step)),
            (state, Step::PopulateMetadata) => state,
            (MetadataPopulated, Step::CreateAuthUrl) => AuthUrlCreated,
            (AuthUrlCreated, Step::ExchangeAuthorizationCode) => TokenObtained,
            (MetadataPopulated, Step::ExchangePreAuthorizedCode) => TokenObtained,
            (TokenObtained, Step::RequestCredential) => CredentialRequested,
            (CredentialRequested, Step::Complete { acknowledgment_pending }) => {
                if acknowledgment_pending {
                    AcknowledgmentPending
                } else {
                    Done
                }
            }
            (AcknowledgmentPending, Step::TakeAcknowledgment) => Done,
            _ => return Err(self.rejects(step)),
        };
        Ok(next)
    }

    fn rejects(self, step: Step) -> WalletError {
        let reason = match (self, step) {
            (IssuanceState::Failed, _) => "the interaction has failed, start a new one".to_owned(),
            (IssuanceState::Done, _) => "the interaction is complete, start a new one".to_owned(),
            _ => format!("{step:?} is not allowed in state {self:?}"),
        };
        WalletError::invalid_usage(MODULE, anyhow!(reason))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Whether an error ends the interaction.
///
/// Rejected calls and invalid input leave the interaction usable.
pub(crate) fn is_fatal(err: &WalletError) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Execution | ErrorKind::ServerReported | ErrorKind::StateMismatch
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_authorized_flow() {
        let state = IssuanceState::Created
            .transition(Step::PopulateMetadata)
            .and_then(|s| s.transition(Step::ExchangePreAuthorizedCode))
            .and_then(|s| s.transition(Step::PopulateMetadata))
            .and_then(|s| s.transition(Step::RequestCredential))
            .and_then(|s| {
                s.transition(Step::Complete {
                    acknowledgment_pending: true,
                })
            })
            .unwrap();
        assert_eq!(state, IssuanceState::AcknowledgmentPending);
        assert_eq!(
            state.transition(Step::TakeAcknowledgment).unwrap(),
            IssuanceState::Done
        );
    }

    #[test]
    fn authorization_code_flow() {
        let state = IssuanceState::MetadataPopulated
            .transition(Step::CreateAuthUrl)
            .and_then(|s| s.transition(Step::ExchangeAuthorizationCode))
            .unwrap();
        assert_eq!(state, IssuanceState::TokenObtained);
    }

    #[test]
    fn steps_cannot_repeat_or_skip() {
        let rejected = [
            (IssuanceState::Created, Step::RequestCredential),
            (IssuanceState::MetadataPopulated, Step::ExchangeAuthorizationCode),
            (IssuanceState::TokenObtained, Step::ExchangePreAuthorizedCode),
            (IssuanceState::AuthUrlCreated, Step::CreateAuthUrl),
            (IssuanceState::CredentialRequested, Step::RequestCredential),
            (IssuanceState::Done, Step::TakeAcknowledgment),
            (IssuanceState::Failed, Step::PopulateMetadata),
        ];
        for (state, step) in rejected {
            let err = state.transition(step).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidSdkUsage, "{state:?} {step:?}");
        }
    }
}
