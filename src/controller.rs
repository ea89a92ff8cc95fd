//! Controller - runs the session against the credential gate and the
//! generation client.
//!
//! Generation runs on a spawned task so the caller's event loop stays
//! responsive. Each task reports back over a channel tagged with its ticket;
//! the session decides whether the result still applies.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::credential::{CredentialGate, CredentialProvider, CredentialStatus};
use crate::generation::{GenerationClient, GenerationError, VideoLocator, VideoService};
use crate::request::RequestBuilder;
use crate::session::{GenerationTicket, Outcome, Session, SessionError, SessionState};

type Delivery = (GenerationTicket, Result<VideoLocator, GenerationError>);

/// The generation currently being polled.
struct InFlight {
    ticket: GenerationTicket,
    cancel: CancellationToken,
}

pub struct Controller<S, P> {
    session: Session,
    gate: CredentialGate<P>,
    client: Arc<GenerationClient<S, P>>,
    in_flight: Option<InFlight>,
    results_tx: mpsc::UnboundedSender<Delivery>,
    results_rx: mpsc::UnboundedReceiver<Delivery>,
}

impl<S, P> Controller<S, P>
where
    S: VideoService + 'static,
    P: CredentialProvider + 'static,
{
    pub fn new(
        gate: CredentialGate<P>,
        client: GenerationClient<S, P>,
        builder: RequestBuilder,
    ) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            session: Session::new(builder),
            gate,
            client: Arc::new(client),
            in_flight: None,
            results_tx,
            results_rx,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> &SessionState {
        self.session.state()
    }

    pub fn builder(&self) -> &RequestBuilder {
        self.session.builder()
    }

    pub fn builder_mut(&mut self) -> &mut RequestBuilder {
        self.session.builder_mut()
    }

    pub fn is_generating(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Query the host for a key and leave `CheckingCredential`.
    pub fn check_credential(&mut self) -> Result<CredentialStatus, SessionError> {
        let status = self.gate.check();
        self.session.credential_checked(status)?;
        Ok(status)
    }

    /// Open the host selector, then check again whatever the user did.
    ///
    /// The selector may block on user input; only call this while nothing
    /// is being generated.
    pub fn select_credential(&mut self) -> Result<CredentialStatus, SessionError> {
        if !matches!(self.state(), SessionState::CredentialRequired { .. }) {
            return Err(SessionError::InvalidTransition {
                action: "select a credential",
                state: self.state().name(),
            });
        }

        self.gate.request_credential_selection();
        self.session.begin_credential_recheck()?;
        self.check_credential()
    }

    /// Start generating from the current form fields.
    pub fn submit(&mut self) -> Result<GenerationTicket, SessionError> {
        if self.in_flight.is_some() {
            return Err(SessionError::AlreadyGenerating);
        }

        let (ticket, request) = self.session.submit()?;
        let cancel = CancellationToken::new();

        let client = Arc::clone(&self.client);
        let results_tx = self.results_tx.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            let result = client.generate(&request, &token).await;
            // The receiver lives as long as the controller.
            let _ = results_tx.send((ticket, result));
        });

        log::debug!("Generation {} started", ticket.epoch());
        self.in_flight = Some(InFlight { ticket, cancel });
        Ok(ticket)
    }

    /// Wait for the next generation result and apply it if still current.
    pub async fn next_outcome(&mut self) -> Outcome {
        loop {
            let Some((ticket, result)) = self.results_rx.recv().await else {
                // Unreachable while `results_tx` is held by self.
                return Outcome::Discarded;
            };

            if self.in_flight.as_ref().map(|f| f.ticket) == Some(ticket) {
                self.in_flight = None;
            }

            match self.session.finish(ticket, result) {
                Outcome::Applied => return Outcome::Applied,
                Outcome::Discarded => continue,
            }
        }
    }

    /// Wait until the current generation's result has been applied.
    pub async fn wait_for_result(&mut self) -> &SessionState {
        while self.in_flight.is_some() {
            self.next_outcome().await;
        }
        self.session.state()
    }

    /// Stop polling the current generation and go back to the editor.
    pub fn abandon(&mut self) -> Result<(), SessionError> {
        let ticket = self.session.abandon_generation()?;
        if let Some(in_flight) = self.in_flight.take() {
            debug_assert_eq!(in_flight.ticket, ticket);
            in_flight.cancel.cancel();
        }
        log::info!("Generation {} abandoned", ticket.epoch());
        Ok(())
    }

    pub fn dismiss_error(&mut self) -> Result<(), SessionError> {
        self.session.dismiss_error()
    }

    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.session.reset()
    }

    /// Token of the running generation, for external cancellation.
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.in_flight.as_ref().map(|f| f.cancel.clone())
    }
}

impl<S, P> Drop for Controller<S, P> {
    fn drop(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel.cancel();
        }
    }
}
