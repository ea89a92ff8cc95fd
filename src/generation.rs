//! Generation Client - submits a request and polls the job to completion.
//!
//! The poll loop is deliberately unbounded: it runs until the service marks
//! the operation done. Callers that lose interest cancel the supplied
//! [`CancellationToken`]; the token is checked before every suspension and
//! raced against the sleep itself, so no timer outlives the caller.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::credential::{ApiKey, CredentialProvider};
use crate::request::GenerationRequest;
use crate::veo::{Operation, VeoError};

/// Fixed interval between status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Error text that marks a key the service does not recognise.
pub const ENTITY_NOT_FOUND_MARKER: &str = "Requested entity was not found";

/// Shown when the service fails without saying why.
pub const GENERIC_FAILURE_MESSAGE: &str = "An unknown error occurred during video generation.";

/// Name of the query parameter carrying the key on the locator.
const KEY_QUERY_PARAM: &str = "key";

/// Remote text-to-video service as seen by the generation client.
pub trait VideoService: Send + Sync {
    /// Submit a job and return its operation handle.
    fn start(
        &self,
        request: &GenerationRequest,
        key: &ApiKey,
    ) -> impl Future<Output = Result<Operation, VeoError>> + Send;

    /// Fetch the current state of an operation.
    fn refresh(
        &self,
        operation: &Operation,
        key: &ApiKey,
    ) -> impl Future<Output = Result<Operation, VeoError>> + Send;
}

/// Classified generation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("No API key is selected. Please select a key.")]
    CredentialMissing,

    #[error("The selected API key was invalid or not found. Please select a valid key.")]
    CredentialInvalid,

    #[error("No video URI returned from the operation.")]
    ResultMissing,

    #[error("{0}")]
    GenerationFailed(String),

    #[error("Generation cancelled")]
    Cancelled,
}

impl GenerationError {
    /// Whether this failure should send the user back to key selection.
    pub fn needs_credential(&self) -> bool {
        matches!(
            self,
            GenerationError::CredentialMissing | GenerationError::CredentialInvalid
        )
    }
}

/// Map a remote failure message onto the error taxonomy.
///
/// This is the only place that inspects provider error text.
pub fn classify_failure(message: &str) -> GenerationError {
    if message.contains(ENTITY_NOT_FOUND_MARKER) {
        GenerationError::CredentialInvalid
    } else if message.trim().is_empty() {
        GenerationError::GenerationFailed(GENERIC_FAILURE_MESSAGE.to_string())
    } else {
        GenerationError::GenerationFailed(message.to_string())
    }
}

impl From<VeoError> for GenerationError {
    fn from(error: VeoError) -> Self {
        classify_failure(&error.remote_message())
    }
}

/// Playable, independently fetchable URL of a generated video.
#[derive(Clone, PartialEq, Eq)]
pub struct VideoLocator(String);

impl VideoLocator {
    /// Append the key as a query parameter so the URL needs no auth header.
    pub fn with_credential(uri: &str, key: &ApiKey) -> Result<Self, GenerationError> {
        let mut url = url::Url::parse(uri).map_err(|e| {
            GenerationError::GenerationFailed(format!("Invalid video URI returned: {}", e))
        })?;
        url.query_pairs_mut()
            .append_pair(KEY_QUERY_PARAM, key.expose());
        Ok(Self(url.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The locator with the key value masked, for logs.
    pub fn redacted(&self) -> String {
        match url::Url::parse(&self.0) {
            Ok(mut url) => {
                let pairs: Vec<(String, String)> = url
                    .query_pairs()
                    .map(|(k, v)| {
                        let v = if k == KEY_QUERY_PARAM {
                            "***".to_string()
                        } else {
                            v.into_owned()
                        };
                        (k.into_owned(), v)
                    })
                    .collect();
                url.query_pairs_mut().clear().extend_pairs(pairs);
                url.into()
            }
            Err(_) => "<invalid locator>".to_string(),
        }
    }
}

impl fmt::Display for VideoLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for VideoLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VideoLocator").field(&self.redacted()).finish()
    }
}

/// Drives one request through submit, poll and result extraction.
pub struct GenerationClient<S, P> {
    service: S,
    credentials: P,
    poll_interval: Duration,
}

impl<S: VideoService, P: CredentialProvider> GenerationClient<S, P> {
    pub fn new(service: S, credentials: P) -> Self {
        Self {
            service,
            credentials,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Generate a video and return its locator.
    ///
    /// The key is read from the credential provider at call time, so a key
    /// selected after construction is picked up by the next request.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<VideoLocator, GenerationError> {
        let key = self
            .credentials
            .active_credential()
            .ok_or(GenerationError::CredentialMissing)?;

        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        log::info!(
            "Submitting generation request (model: {}, {} @ {})",
            request.model_id(),
            request.aspect_ratio(),
            request.resolution()
        );
        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("Generation cancelled while submitting");
                return Err(GenerationError::Cancelled);
            }
            started = self.service.start(request, &key) => started,
        };
        let mut operation = started.map_err(|e| {
            log::error!("Video generation failed: {}", e);
            GenerationError::from(e)
        })?;
        log::info!("Generation submitted, operation: {}", operation.name);

        let mut polls = 0u32;
        while !operation.done {
            if cancel.is_cancelled() {
                log::info!("Generation cancelled after {} polls", polls);
                return Err(GenerationError::Cancelled);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::info!("Generation cancelled after {} polls", polls);
                    return Err(GenerationError::Cancelled);
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            polls += 1;
            log::debug!("Polling video generation status (poll {})...", polls);
            let refreshed = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::info!("Generation cancelled during status check {}", polls);
                    return Err(GenerationError::Cancelled);
                }
                refreshed = self.service.refresh(&operation, &key) => refreshed,
            };
            operation = refreshed.map_err(|e| {
                log::error!("Status check failed: {}", e);
                GenerationError::from(e)
            })?;
        }

        if let Some(error) = &operation.error {
            log::error!(
                "Operation finished with an error: (Code {}) {}",
                error.code,
                error.message
            );
            return Err(classify_failure(&error.message));
        }

        let uri = operation.first_video_uri().ok_or_else(|| {
            log::error!("Operation {} completed without a video", operation.name);
            GenerationError::ResultMissing
        })?;

        let locator = VideoLocator::with_credential(uri, &key)?;
        log::info!("Generation complete after {} polls: {}", polls, locator.redacted());
        Ok(locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialError;
    use crate::request::RequestBuilder;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StaticKey(Option<&'static str>);

    impl CredentialProvider for StaticKey {
        fn has_selected_credential(&self) -> Result<bool, CredentialError> {
            Ok(self.0.is_some())
        }

        fn open_credential_selector(&self) -> Result<(), CredentialError> {
            Ok(())
        }

        fn active_credential(&self) -> Option<ApiKey> {
            self.0.and_then(ApiKey::new)
        }
    }

    /// Replays a script: the first entry answers `start`, the rest answer
    /// successive `refresh` calls.
    struct Scripted {
        replies: Mutex<VecDeque<Result<Operation, VeoError>>>,
        refreshes: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Operation, VeoError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                refreshes: AtomicUsize::new(0),
            }
        }

        fn next(&self) -> Result<Operation, VeoError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted")
        }
    }

    impl VideoService for Scripted {
        async fn start(
            &self,
            _request: &GenerationRequest,
            _key: &ApiKey,
        ) -> Result<Operation, VeoError> {
            self.next()
        }

        async fn refresh(
            &self,
            _operation: &Operation,
            _key: &ApiKey,
        ) -> Result<Operation, VeoError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.next()
        }
    }

    const URI: &str = "https://generativelanguage.googleapis.com/v1beta/files/abc:download?alt=media";

    fn request() -> GenerationRequest {
        RequestBuilder::new("cpu reveal").build().unwrap()
    }

    fn client(script: Vec<Result<Operation, VeoError>>) -> GenerationClient<Scripted, StaticKey> {
        GenerationClient::new(Scripted::new(script), StaticKey(Some("test-key")))
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_pending_polls_then_success() {
        let client = client(vec![
            Ok(Operation::pending("op")),
            Ok(Operation::pending("op")),
            Ok(Operation::completed("op", [URI])),
        ]);

        let started = tokio::time::Instant::now();
        let locator = client
            .generate(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            locator.as_str(),
            format!("{}&key=test-key", URI)
        );
        assert_eq!(client.service().refreshes.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), DEFAULT_POLL_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_done_operation_never_sleeps() {
        let client = client(vec![Ok(Operation::completed("op", [URI]))]);

        let started = tokio::time::Instant::now();
        client
            .generate(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(client.service().refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_without_samples_is_result_missing() {
        let client = client(vec![
            Ok(Operation::pending("op")),
            Ok(Operation::completed("op", Vec::<String>::new())),
        ]);

        let result = client.generate(&request(), &CancellationToken::new()).await;
        assert_eq!(result, Err(GenerationError::ResultMissing));
    }

    #[tokio::test]
    async fn test_entity_not_found_is_credential_invalid() {
        let client = client(vec![Err(VeoError::Api {
            status: 404,
            message: "Requested entity was not found.".to_string(),
        })]);

        let result = client.generate(&request(), &CancellationToken::new()).await;
        assert_eq!(result, Err(GenerationError::CredentialInvalid));
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_error_payload_is_classified() {
        let client = client(vec![
            Ok(Operation::pending("op")),
            Ok(Operation::failed("op", 3, "Prompt was blocked by safety filters")),
        ]);

        let result = client.generate(&request(), &CancellationToken::new()).await;
        assert_eq!(
            result,
            Err(GenerationError::GenerationFailed(
                "Prompt was blocked by safety filters".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_other_api_errors_keep_remote_message() {
        let client = client(vec![Err(VeoError::Api {
            status: 429,
            message: "Resource has been exhausted".to_string(),
        })]);

        let result = client.generate(&request(), &CancellationToken::new()).await;
        assert_eq!(
            result,
            Err(GenerationError::GenerationFailed(
                "Resource has been exhausted".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_submitting() {
        let client = GenerationClient::new(Scripted::new(vec![]), StaticKey(None));

        let result = client.generate(&request(), &CancellationToken::new()).await;
        assert_eq!(result, Err(GenerationError::CredentialMissing));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_poll_stops_loop() {
        let client = client(vec![
            Ok(Operation::pending("op")),
            Ok(Operation::pending("op")),
            Ok(Operation::pending("op")),
        ]);
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(DEFAULT_POLL_INTERVAL + Duration::from_secs(1)).await;
                cancel.cancel();
            }
        };

        let request = request();
        let (result, _) = tokio::join!(client.generate(&request, &cancel), canceller);
        assert_eq!(result, Err(GenerationError::Cancelled));
        assert_eq!(client.service().refreshes.load(Ordering::SeqCst), 1);
    }

    /// Submits fine, then every status check hangs until dropped.
    struct StalledRefresh {
        stall_submit: bool,
    }

    impl VideoService for StalledRefresh {
        async fn start(
            &self,
            _request: &GenerationRequest,
            _key: &ApiKey,
        ) -> Result<Operation, VeoError> {
            if self.stall_submit {
                std::future::pending::<()>().await;
            }
            Ok(Operation::pending("op"))
        }

        async fn refresh(
            &self,
            _operation: &Operation,
            _key: &ApiKey,
        ) -> Result<Operation, VeoError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_hung_status_check() {
        let client = GenerationClient::new(
            StalledRefresh { stall_submit: false },
            StaticKey(Some("test-key")),
        );
        let cancel = CancellationToken::new();
        let request = request();

        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(DEFAULT_POLL_INTERVAL + Duration::from_secs(1)).await;
                cancel.cancel();
            }
        };

        let (result, _) = tokio::join!(client.generate(&request, &cancel), canceller);
        assert_eq!(result, Err(GenerationError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_hung_submit() {
        let client = GenerationClient::new(
            StalledRefresh { stall_submit: true },
            StaticKey(Some("test-key")),
        );
        let cancel = CancellationToken::new();
        let request = request();

        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                cancel.cancel();
            }
        };

        let (result, _) = tokio::join!(client.generate(&request, &cancel), canceller);
        assert_eq!(result, Err(GenerationError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_token_is_checked_before_submit() {
        let client = client(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = client.generate(&request(), &cancel).await;
        assert_eq!(result, Err(GenerationError::Cancelled));
    }

    #[test]
    fn test_classify_failure() {
        assert_eq!(
            classify_failure("Requested entity was not found."),
            GenerationError::CredentialInvalid
        );
        assert_eq!(
            classify_failure("404: Requested entity was not found. (project)"),
            GenerationError::CredentialInvalid
        );
        assert_eq!(
            classify_failure("quota exceeded"),
            GenerationError::GenerationFailed("quota exceeded".to_string())
        );
        assert_eq!(
            classify_failure("  "),
            GenerationError::GenerationFailed(GENERIC_FAILURE_MESSAGE.to_string())
        );
    }

    #[test]
    fn test_locator_appends_key_to_existing_query() {
        let key = ApiKey::new("k-123").unwrap();
        let locator = VideoLocator::with_credential(URI, &key).unwrap();
        assert_eq!(locator.as_str(), format!("{}&key=k-123", URI));
    }

    #[test]
    fn test_locator_adds_query_when_absent() {
        let key = ApiKey::new("k-123").unwrap();
        let locator = VideoLocator::with_credential("https://example.com/video.mp4", &key).unwrap();
        assert_eq!(locator.as_str(), "https://example.com/video.mp4?key=k-123");
    }

    #[test]
    fn test_locator_rejects_relative_uri() {
        let key = ApiKey::new("k").unwrap();
        assert!(matches!(
            VideoLocator::with_credential("not a url", &key),
            Err(GenerationError::GenerationFailed(_))
        ));
    }

    #[test]
    fn test_locator_debug_hides_key() {
        let key = ApiKey::new("secret-key").unwrap();
        let locator = VideoLocator::with_credential(URI, &key).unwrap();
        let debug = format!("{:?}", locator);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("key=***"));
        assert!(locator.redacted().contains("alt=media"));
    }

    #[test]
    fn test_needs_credential() {
        assert!(GenerationError::CredentialInvalid.needs_credential());
        assert!(GenerationError::CredentialMissing.needs_credential());
        assert!(!GenerationError::ResultMissing.needs_credential());
        assert!(!GenerationError::GenerationFailed("x".into()).needs_credential());
    }
}
