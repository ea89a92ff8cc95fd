//! Result presentation and screen rendering.
//!
//! `render` is a pure function of the session state and the form fields;
//! the interactive loop prints whatever it returns.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::request::{AspectRatio, ModelTier, RequestBuilder, Resolution};
use crate::session::SessionState;

/// Suggested filename for downloaded videos.
pub const DEFAULT_DOWNLOAD_FILENAME: &str = "cpu_reveal_cinematic.mp4";

/// How long each loading message stays up.
pub const LOADING_MESSAGE_INTERVAL: Duration = Duration::from_secs(4);

/// Where to read about billing for the API.
pub const BILLING_DOCS_URL: &str = "https://ai.google.dev/gemini-api/docs/billing";

pub const LOADING_MESSAGES: &[&str] = &[
    "Initializing quantum flux capacitors...",
    "Compiling silicon wafer schematics...",
    "Aligning micro-transistor arrays...",
    "Rendering 4K volumetric lighting...",
    "Synchronizing holographic grids...",
    "Fusing circuit pathways...",
    "Activating neural cores...",
    "Polishing gold connectors...",
    "Simulating particle physics...",
    "Finalizing energy field cohesion...",
];

const TITLE: &str = "CYBER_CPU_REVEAL";

/// Loading message for the given tick, wrapping around.
pub fn loading_message(tick: usize) -> &'static str {
    LOADING_MESSAGES[tick % LOADING_MESSAGES.len()]
}

/// Destination for a download: `dir/name`, or `dir/DEFAULT_DOWNLOAD_FILENAME`.
pub fn download_path(dir: &Path, name: Option<&str>) -> PathBuf {
    dir.join(name.unwrap_or(DEFAULT_DOWNLOAD_FILENAME))
}

/// Render the screen for the current state.
pub fn render(state: &SessionState, builder: &RequestBuilder) -> String {
    match state {
        SessionState::CheckingCredential => "Checking API key...\n".to_string(),
        SessionState::CredentialRequired { notice } => render_key_required(notice.as_deref()),
        SessionState::Idle => render_editor(builder, None),
        SessionState::Error { message } => render_editor(builder, Some(message)),
        SessionState::Generating => render_loading(0),
        SessionState::Complete { locator } => {
            let mut out = header();
            out.push_str("  RENDER COMPLETE\n\n");
            out.push_str(&format!("  Video: {}\n\n", locator));
            out.push_str(&format!(
                "  /save [path]   Download MP4 (default: {})\n",
                DEFAULT_DOWNLOAD_FILENAME
            ));
            out.push_str("  /reset         Generate new\n");
            out
        }
    }
}

/// The loading screen for a given tick of the message rotation.
pub fn render_loading(tick: usize) -> String {
    let mut out = header();
    out.push_str("  GENERATING\n\n");
    out.push_str(&format!("  > {}\n\n", loading_message(tick)));
    out.push_str("  Estimated time: 1-2 minutes   (/cancel to stop waiting)\n");
    out
}

fn header() -> String {
    format!("== {} ==  SYSTEM ONLINE\n\n", TITLE)
}

fn render_key_required(notice: Option<&str>) -> String {
    let mut out = String::from("ACCESS REQUIRED\n\n");
    if let Some(notice) = notice {
        out.push_str(&format!("  ! {}\n\n", notice));
    }
    out.push_str(
        "  To generate cinematic AI videos with Veo, you need an API key from a\n  \
         paid Google Cloud project.\n\n",
    );
    out.push_str(
        "  Billing Enabled Project Required: video generation is a premium feature.\n  \
         Select a project with billing enabled in the Google Cloud Console.\n\n",
    );
    out.push_str("  /key           Select API key\n");
    out.push_str(&format!("  Billing & pricing: {}\n", BILLING_DOCS_URL));
    out
}

fn render_editor(builder: &RequestBuilder, error: Option<&str>) -> String {
    let mut out = header();

    if let Some(message) = error {
        out.push_str("  [SYSTEM ERROR]\n");
        out.push_str(&format!("  {}\n", message));
        out.push_str("  /dismiss       Try again\n\n");
    }

    out.push_str("  VISUAL DIRECTIVE\n");
    for line in builder.prompt.lines() {
        out.push_str(&format!("  | {}\n", line));
    }
    out.push_str(&format!("  {} CHARS\n\n", builder.prompt_chars()));

    out.push_str("  CONFIGURATION\n");
    out.push_str(&format!(
        "  Render engine: {}\n",
        choices(&ModelTier::ALL, builder.tier, |t| t.as_str())
    ));
    out.push_str(&format!("    {}\n", builder.tier.blurb()));
    out.push_str(&format!(
        "  Aspect ratio:  {}\n",
        choices(&AspectRatio::ALL, builder.aspect_ratio, |a| a.as_str())
    ));
    out.push_str(&format!(
        "  Resolution:    {}\n\n",
        choices(&Resolution::ALL, builder.resolution, |r| r.label())
    ));

    if builder.can_submit() {
        out.push_str("  /generate      INITIATE SEQUENCE\n");
    } else {
        out.push_str("  (enter a prompt to enable /generate)\n");
    }
    out
}

/// `[selected]  other` style selector line.
fn choices<T: Copy + PartialEq>(all: &[T], selected: T, label: impl Fn(&T) -> &'static str) -> String {
    all.iter()
        .map(|item| {
            if *item == selected {
                format!("[{}]", label(item))
            } else {
                format!(" {} ", label(item))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
