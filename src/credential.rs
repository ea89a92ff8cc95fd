//! Credential Gate - checks whether a usable API key is selected.
//!
//! The key material lives in the hosting environment. This module only asks
//! the host whether a key is selected, opens the host's selector, and hands
//! the active key to the generation client at call time.

use std::fmt;
use std::io::{self, BufRead};
use std::sync::{Mutex, RwLock};

/// Environment variables consulted for a key, in order.
pub const API_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

/// An API key. `Debug` never prints the material.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key, rejecting blank values.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Errors raised by a credential host.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("credential selector not available")]
    SelectorUnavailable,

    #[error("credential store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Capability supplied by the hosting environment.
///
/// Passed explicitly to the gate and to the generation client so tests can
/// substitute a double.
pub trait CredentialProvider: Send + Sync {
    /// Whether a key is currently selected.
    fn has_selected_credential(&self) -> Result<bool, CredentialError>;

    /// Open the host's interactive key picker.
    ///
    /// Returns `Ok(())` both when the user picked a key and when they
    /// cancelled; callers re-query [`has_selected_credential`] to find out.
    ///
    /// [`has_selected_credential`]: CredentialProvider::has_selected_credential
    fn open_credential_selector(&self) -> Result<(), CredentialError>;

    /// The key to use right now, looked up fresh on every call.
    fn active_credential(&self) -> Option<ApiKey>;
}

/// Result of a credential query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Present,
    Absent,
    QueryFailed,
}

/// Front door for credential checks. Never fails.
pub struct CredentialGate<P> {
    provider: P,
}

impl<P: CredentialProvider> CredentialGate<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Query the host and report what happened.
    pub fn check(&self) -> CredentialStatus {
        match self.provider.has_selected_credential() {
            Ok(true) => CredentialStatus::Present,
            Ok(false) => CredentialStatus::Absent,
            Err(e) => {
                log::warn!("Error checking credential: {}", e);
                CredentialStatus::QueryFailed
            }
        }
    }

    /// `true` only when the host confirms a key is selected.
    pub fn has_credential(&self) -> bool {
        self.check() == CredentialStatus::Present
    }

    /// Open the host picker. Failures are logged, not returned.
    pub fn request_credential_selection(&self) {
        if let Err(e) = self.provider.open_credential_selector() {
            log::error!("Failed to open credential selector: {}", e);
        }
    }
}

/// Source of lines for the interactive selector.
pub trait LineSource: Send {
    /// Read one line, `None` at end of input.
    fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// Line source over any buffered reader.
pub struct Lines<R>(pub R);

impl<R: BufRead + Send> LineSource for Lines<R> {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        match self.0.read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line)),
        }
    }
}

/// Reads from the process stdin one line at a time.
///
/// Goes through `Stdin`'s shared buffer instead of wrapping it in another
/// reader, so lines it does not consume stay available to other readers.
pub struct TerminalLines;

impl LineSource for TerminalLines {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        match io::stdin().read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line)),
        }
    }
}

/// Host implementation backed by the process environment.
///
/// A key picked through the selector is held for the life of the process
/// and takes precedence over the environment variables.
pub struct EnvCredentials {
    var_names: Vec<String>,
    selected: RwLock<Option<ApiKey>>,
    selector_input: Option<Mutex<Box<dyn LineSource>>>,
}

impl EnvCredentials {
    /// Read keys from [`API_KEY_ENV_VARS`], with no selector.
    pub fn new() -> Self {
        Self::with_vars(API_KEY_ENV_VARS.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_vars(var_names: Vec<String>) -> Self {
        Self {
            var_names,
            selected: RwLock::new(None),
            selector_input: None,
        }
    }

    /// Enable the selector, reading one key per invocation from `input`.
    pub fn with_selector(mut self, input: Box<dyn LineSource>) -> Self {
        self.selector_input = Some(Mutex::new(input));
        self
    }

    /// Selector that prompts on the terminal.
    pub fn with_terminal_selector(self) -> Self {
        self.with_selector(Box::new(TerminalLines))
    }

    fn from_env(&self) -> Option<ApiKey> {
        self.var_names
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find_map(ApiKey::new)
    }

    fn selected(&self) -> Result<Option<ApiKey>, CredentialError> {
        self.selected
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| CredentialError::Unavailable("selected key lock poisoned".to_string()))
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider for EnvCredentials {
    fn has_selected_credential(&self) -> Result<bool, CredentialError> {
        Ok(self.selected()?.is_some() || self.from_env().is_some())
    }

    fn open_credential_selector(&self) -> Result<(), CredentialError> {
        let input = self
            .selector_input
            .as_ref()
            .ok_or(CredentialError::SelectorUnavailable)?;

        eprintln!("Paste a Gemini API key from a billing-enabled Google Cloud project");
        eprintln!("(leave blank to cancel):");

        let line = input
            .lock()
            .map_err(|_| CredentialError::Unavailable("selector lock poisoned".to_string()))?
            .next_line()?;

        match line.and_then(ApiKey::new) {
            Some(key) => {
                let mut slot = self.selected.write().map_err(|_| {
                    CredentialError::Unavailable("selected key lock poisoned".to_string())
                })?;
                *slot = Some(key);
                log::info!("API key selected");
            }
            None => log::debug!("Credential selection cancelled"),
        }

        Ok(())
    }

    fn active_credential(&self) -> Option<ApiKey> {
        self.selected().ok().flatten().or_else(|| self.from_env())
    }
}

impl<P: CredentialProvider + ?Sized> CredentialProvider for std::sync::Arc<P> {
    fn has_selected_credential(&self) -> Result<bool, CredentialError> {
        (**self).has_selected_credential()
    }

    fn open_credential_selector(&self) -> Result<(), CredentialError> {
        (**self).open_credential_selector()
    }

    fn active_credential(&self) -> Option<ApiKey> {
        (**self).active_credential()
    }
}
