//! Session State Machine - the single source of truth for what the UI shows.
//!
//! Every screen is rendered from [`SessionState`] plus the request builder;
//! there are no side flags. A generation is identified by a
//! [`GenerationTicket`] minted from an epoch counter, and a result is only
//! applied if its ticket still occupies the single-flight slot.

use std::fmt;

use crate::credential::CredentialStatus;
use crate::generation::{GenerationError, VideoLocator};
use crate::request::{GenerationRequest, RequestBuilder, RequestError};

/// Where the session currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    CheckingCredential,
    /// No usable key. `notice` explains why when a generation was rejected.
    CredentialRequired { notice: Option<String> },
    Idle,
    Generating,
    Complete { locator: VideoLocator },
    Error { message: String },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::CheckingCredential => "checking-credential",
            SessionState::CredentialRequired { .. } => "credential-required",
            SessionState::Idle => "idle",
            SessionState::Generating => "generating",
            SessionState::Complete { .. } => "complete",
            SessionState::Error { .. } => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies one generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenerationTicket(u64);

impl GenerationTicket {
    pub fn epoch(&self) -> u64 {
        self.0
    }
}

/// What happened to a generation result handed to [`Session::finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The ticket was superseded; the result was dropped.
    Discarded,
}

/// Rejected session actions. The state is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("Empty prompt")]
    EmptyPrompt,

    #[error("a generation is already in progress")]
    AlreadyGenerating,
}

impl From<RequestError> for SessionError {
    fn from(error: RequestError) -> Self {
        match error {
            RequestError::EmptyPrompt => SessionError::EmptyPrompt,
        }
    }
}

/// Session controller state: current screen, form fields and the
/// single-flight slot.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    builder: RequestBuilder,
    epoch: u64,
    in_flight: Option<GenerationTicket>,
}

impl Session {
    /// Start a session. The first thing to do is check for a key.
    pub fn new(builder: RequestBuilder) -> Self {
        Self {
            state: SessionState::CheckingCredential,
            builder,
            epoch: 0,
            in_flight: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn builder(&self) -> &RequestBuilder {
        &self.builder
    }

    /// Form fields stay editable in every state.
    pub fn builder_mut(&mut self) -> &mut RequestBuilder {
        &mut self.builder
    }

    /// The ticket currently allowed to deliver a result.
    pub fn in_flight(&self) -> Option<GenerationTicket> {
        self.in_flight
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            action,
            state: self.state.name(),
        }
    }

    fn transition(&mut self, next: SessionState) {
        log::debug!("Session: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Record the result of a credential query.
    pub fn credential_checked(&mut self, status: CredentialStatus) -> Result<(), SessionError> {
        if self.state != SessionState::CheckingCredential {
            return Err(self.invalid("record a credential check"));
        }

        let next = match status {
            CredentialStatus::Present => SessionState::Idle,
            CredentialStatus::Absent | CredentialStatus::QueryFailed => {
                SessionState::CredentialRequired { notice: None }
            }
        };
        self.transition(next);
        Ok(())
    }

    /// After the selector closes, check again regardless of what happened.
    pub fn begin_credential_recheck(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::CredentialRequired { .. } => {
                self.transition(SessionState::CheckingCredential);
                Ok(())
            }
            _ => Err(self.invalid("re-check the credential")),
        }
    }

    /// Snapshot the form and move to `Generating`.
    ///
    /// Returns the ticket the result must be delivered with.
    pub fn submit(&mut self) -> Result<(GenerationTicket, GenerationRequest), SessionError> {
        if self.in_flight.is_some() {
            return Err(SessionError::AlreadyGenerating);
        }
        if self.state != SessionState::Idle {
            return Err(self.invalid("start a generation"));
        }

        let request = self.builder.build()?;

        self.epoch += 1;
        let ticket = GenerationTicket(self.epoch);
        self.in_flight = Some(ticket);
        self.transition(SessionState::Generating);
        Ok((ticket, request))
    }

    /// Deliver a generation result.
    ///
    /// Results whose ticket no longer occupies the slot are discarded.
    pub fn finish(
        &mut self,
        ticket: GenerationTicket,
        result: Result<VideoLocator, GenerationError>,
    ) -> Outcome {
        if self.in_flight != Some(ticket) || self.state != SessionState::Generating {
            log::debug!("Discarding stale result for generation {}", ticket.epoch());
            return Outcome::Discarded;
        }
        self.in_flight = None;

        let next = match result {
            Ok(locator) => SessionState::Complete { locator },
            Err(GenerationError::Cancelled) => SessionState::Idle,
            Err(e) if e.needs_credential() => SessionState::CredentialRequired {
                notice: Some(e.to_string()),
            },
            Err(e) => SessionState::Error {
                message: e.to_string(),
            },
        };
        self.transition(next);
        Outcome::Applied
    }

    /// "Try again" from the error panel.
    pub fn dismiss_error(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Error { .. } => {
                self.transition(SessionState::Idle);
                Ok(())
            }
            _ => Err(self.invalid("dismiss an error")),
        }
    }

    /// Leave the result screen, discarding the locator.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Complete { .. } => {
                self.transition(SessionState::Idle);
                Ok(())
            }
            _ => Err(self.invalid("reset")),
        }
    }

    /// Stop waiting for the current generation and return to the editor.
    ///
    /// The remote job keeps running; its result will be discarded.
    pub fn abandon_generation(&mut self) -> Result<GenerationTicket, SessionError> {
        match (self.state == SessionState::Generating, self.in_flight.take()) {
            (true, Some(ticket)) => {
                self.transition(SessionState::Idle);
                Ok(ticket)
            }
            (_, previous) => {
                self.in_flight = previous;
                Err(self.invalid("cancel a generation"))
            }
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(RequestBuilder::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::ApiKey;

    fn locator() -> VideoLocator {
        VideoLocator::with_credential(
            "https://example.com/files/v:download?alt=media",
            &ApiKey::new("k").unwrap(),
        )
        .unwrap()
    }

    fn idle_session(prompt: &str) -> Session {
        let mut session = Session::new(RequestBuilder::new(prompt));
        session.credential_checked(CredentialStatus::Present).unwrap();
        session
    }

    #[test]
    fn test_starts_checking_credential() {
        let session = Session::default();
        assert_eq!(session.state(), &SessionState::CheckingCredential);
        assert_eq!(session.in_flight(), None);
    }

    #[test]
    fn test_credential_check_outcomes() {
        let mut session = Session::default();
        session.credential_checked(CredentialStatus::Present).unwrap();
        assert_eq!(session.state(), &SessionState::Idle);

        for status in [CredentialStatus::Absent, CredentialStatus::QueryFailed] {
            let mut session = Session::default();
            session.credential_checked(status).unwrap();
            assert_eq!(
                session.state(),
                &SessionState::CredentialRequired { notice: None }
            );
        }
    }

    #[test]
    fn test_credential_check_only_from_checking() {
        let mut session = idle_session("x");
        let err = session
            .credential_checked(CredentialStatus::Absent)
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
        assert_eq!(session.state(), &SessionState::Idle);
    }

    #[test]
    fn test_recheck_after_selection() {
        let mut session = Session::default();
        session.credential_checked(CredentialStatus::Absent).unwrap();
        session.begin_credential_recheck().unwrap();
        assert_eq!(session.state(), &SessionState::CheckingCredential);
        session.credential_checked(CredentialStatus::Present).unwrap();
        assert_eq!(session.state(), &SessionState::Idle);
    }

    #[test]
    fn test_submit_rejects_blank_prompt() {
        let mut session = idle_session("   \n ");
        assert_eq!(session.submit().unwrap_err(), SessionError::EmptyPrompt);
        assert_eq!(session.state(), &SessionState::Idle);
        assert_eq!(session.in_flight(), None);
    }

    #[test]
    fn test_submit_accepts_single_character() {
        let mut session = idle_session("z");
        let (ticket, request) = session.submit().unwrap();
        assert_eq!(request.prompt(), "z");
        assert_eq!(session.state(), &SessionState::Generating);
        assert_eq!(session.in_flight(), Some(ticket));
    }

    #[test]
    fn test_submit_requires_idle() {
        let mut session = Session::default();
        assert!(matches!(
            session.submit(),
            Err(SessionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_single_flight() {
        let mut session = idle_session("x");
        session.submit().unwrap();
        assert_eq!(session.submit().unwrap_err(), SessionError::AlreadyGenerating);
    }

    #[test]
    fn test_success_then_reset_keeps_prompt() {
        let mut session = idle_session("orbit the chip");
        let (ticket, _) = session.submit().unwrap();

        assert_eq!(session.finish(ticket, Ok(locator())), Outcome::Applied);
        assert_eq!(
            session.state(),
            &SessionState::Complete { locator: locator() }
        );

        session.reset().unwrap();
        assert_eq!(session.state(), &SessionState::Idle);
        assert_eq!(session.builder().prompt, "orbit the chip");
    }

    #[test]
    fn test_credential_invalid_routes_to_credential_required() {
        let mut session = idle_session("x");
        let (ticket, _) = session.submit().unwrap();
        session.finish(ticket, Err(GenerationError::CredentialInvalid));

        match session.state() {
            SessionState::CredentialRequired { notice: Some(notice) } => {
                assert!(notice.contains("invalid or not found"));
            }
            other => panic!("unexpected state {:?}", other),
        }
        assert_eq!(session.in_flight(), None);
    }

    #[test]
    fn test_result_missing_routes_to_error() {
        let mut session = idle_session("x");
        let (ticket, _) = session.submit().unwrap();
        session.finish(ticket, Err(GenerationError::ResultMissing));

        match session.state() {
            SessionState::Error { message } => assert!(!message.is_empty()),
            other => panic!("unexpected state {:?}", other),
        }

        session.dismiss_error().unwrap();
        assert_eq!(session.state(), &SessionState::Idle);
    }

    #[test]
    fn test_generation_failed_keeps_remote_message() {
        let mut session = idle_session("x");
        let (ticket, _) = session.submit().unwrap();
        session.finish(
            ticket,
            Err(GenerationError::GenerationFailed("quota exceeded".to_string())),
        );
        assert_eq!(
            session.state(),
            &SessionState::Error {
                message: "quota exceeded".to_string()
            }
        );
    }

    #[test]
    fn test_abandoned_result_is_discarded() {
        let mut session = idle_session("x");
        let (stale, _) = session.submit().unwrap();
        assert_eq!(session.abandon_generation().unwrap(), stale);
        assert_eq!(session.state(), &SessionState::Idle);

        let (current, _) = session.submit().unwrap();
        assert_ne!(stale, current);

        assert_eq!(session.finish(stale, Ok(locator())), Outcome::Discarded);
        assert_eq!(session.state(), &SessionState::Generating);

        assert_eq!(session.finish(current, Ok(locator())), Outcome::Applied);
        assert!(matches!(session.state(), SessionState::Complete { .. }));
    }

    #[test]
    fn test_abandon_requires_generating() {
        let mut session = idle_session("x");
        assert!(session.abandon_generation().is_err());
        assert_eq!(session.state(), &SessionState::Idle);
    }

    #[test]
    fn test_dismiss_and_reset_guarded() {
        let mut session = idle_session("x");
        assert!(session.dismiss_error().is_err());
        assert!(session.reset().is_err());
        assert!(session.begin_credential_recheck().is_err());
    }

    #[test]
    fn test_builder_editable_while_generating() {
        let mut session = idle_session("first");
        session.submit().unwrap();
        session.builder_mut().prompt = "second".to_string();
        assert_eq!(session.builder().prompt, "second");
    }
}
