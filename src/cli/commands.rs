//! Subcommand handlers for generate, check, config and the interactive session.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::args::{ConfigAction, GenerateArgs};
use crate::config::{default_path, Config, DEFAULT_CONFIG};
use crate::controller::Controller;
use crate::credential::{CredentialGate, CredentialStatus, EnvCredentials, TerminalLines, API_KEY_ENV_VARS};
use crate::generation::{GenerationClient, GenerationError};
use crate::interactive::{InputLines, Interactive};
use crate::presentation::{self, BILLING_DOCS_URL, LOADING_MESSAGE_INTERVAL};
use crate::request::RequestBuilder;
use crate::veo::{remove_partial, VeoClient};

fn missing_key_help() -> String {
    format!(
        "No API key found.\n\n\
        Video generation needs a Gemini API key from a billing-enabled Google Cloud project.\n\
        Add it to a .env file:\n    \
            echo 'GEMINI_API_KEY=your-api-key-here' >> .env\n\n\
        Or set it as an environment variable ({}).\n\n\
        Billing & pricing: {}",
        API_KEY_ENV_VARS.join(" or "),
        BILLING_DOCS_URL
    )
}

/// Apply command-line overrides on top of the configured defaults.
pub fn resolve_builder(args: &GenerateArgs, config: &Config) -> Result<RequestBuilder, String> {
    let mut builder = config.request_builder();

    if let Some(prompt) = &args.prompt {
        builder.prompt = prompt.clone();
    } else if let Some(path) = &args.prompt_file {
        builder.prompt = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read prompt file '{}': {}", path.display(), e))?;
    }
    if let Some(aspect) = args.aspect {
        builder.aspect_ratio = aspect.into();
    }
    if let Some(resolution) = args.resolution {
        builder.resolution = resolution.into();
    }
    if let Some(tier) = args.tier {
        builder.tier = tier.into();
    }

    Ok(builder)
}

/// Generate one video, print its link and optionally download it.
pub async fn run_generate(args: GenerateArgs, config: &Config) -> Result<(), String> {
    let request = resolve_builder(&args, config)?
        .build()
        .map_err(|e| format!("{}: the visual directive is blank", e))?;

    let credentials = Arc::new(EnvCredentials::new().with_terminal_selector());
    let gate = CredentialGate::new(Arc::clone(&credentials));
    if !gate.has_credential() {
        gate.request_credential_selection();
        if !gate.has_credential() {
            return Err(missing_key_help());
        }
    }

    let service = VeoClient::with_base_url(config.base_url().to_string())
        .map_err(|e| format!("Failed to create API client: {}", e))?;
    let client = GenerationClient::new(service.clone(), credentials)
        .with_poll_interval(config.poll_interval());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel())
            .map_err(|e| format!("Failed to install Ctrl-C handler: {}", e))?;
    }

    println!("Generating video ({}, {}, {})", request.tier(), request.aspect_ratio(), request.resolution().label());
    println!("Estimated time: 1-2 minutes. Press Ctrl-C to stop waiting.");
    println!();

    let generation = client.generate(&request, &cancel);
    tokio::pin!(generation);

    let mut ticker = time::interval_at(Instant::now(), LOADING_MESSAGE_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick = 0;

    let result = loop {
        tokio::select! {
            result = &mut generation => break result,
            _ = ticker.tick() => {
                println!("  > {}", presentation::loading_message(tick));
                tick += 1;
            }
        }
    };

    let locator = result.map_err(|e| match e {
        GenerationError::Cancelled => "Cancelled. The remote job may still finish.".to_string(),
        e if e.needs_credential() => format!("{}\n\n{}", e, missing_key_help()),
        e => e.to_string(),
    })?;

    println!();
    println!("Video ready!");
    println!("  URL: {}", locator);

    if args.no_download {
        return Ok(());
    }

    let dest = args.output.unwrap_or_else(|| {
        let save = config.save_settings();
        presentation::download_path(&save.directory, Some(&save.filename))
    });

    print!("Downloading video... ");
    std::io::Write::flush(&mut std::io::stdout()).ok();
    let saved = download_or_cancel(&service, locator.as_str(), &dest, &cancel).await?;
    println!("done");
    println!("  Path: {}", saved.display());

    Ok(())
}

/// Download the finished video, giving up when `cancel` fires first.
///
/// A cancelled transfer leaves no file behind at `dest`.
pub async fn download_or_cancel(
    service: &VeoClient,
    locator: &str,
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<PathBuf, String> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            remove_partial(dest).await;
            Err("Download cancelled.".to_string())
        }
        saved = service.download_video(locator, dest) => {
            saved.map_err(|e| format!("Failed to download video: {}", e))
        }
    }
}

/// Report whether a key is available. Fails when none is.
pub fn run_check() -> Result<(), String> {
    let gate = CredentialGate::new(EnvCredentials::new());
    match gate.check() {
        CredentialStatus::Present => {
            println!("API key: found");
            Ok(())
        }
        CredentialStatus::Absent => Err(missing_key_help()),
        CredentialStatus::QueryFailed => Err("Could not query the credential store.".to_string()),
    }
}

/// Run the interactive session on the terminal.
pub async fn run_interactive(config: &Config) -> Result<(), String> {
    let credentials = Arc::new(EnvCredentials::new().with_terminal_selector());
    let service = VeoClient::with_base_url(config.base_url().to_string())
        .map_err(|e| format!("Failed to create API client: {}", e))?;
    let client = GenerationClient::new(service.clone(), Arc::clone(&credentials))
        .with_poll_interval(config.poll_interval());

    let controller = Controller::new(
        CredentialGate::new(credentials),
        client,
        config.request_builder(),
    );
    let mut ui = Interactive::new(controller, service, config.save_settings(), io::stdout());
    let mut input = InputLines::spawn(Box::new(TerminalLines));

    ui.run(&mut input)
        .await
        .map_err(|e| format!("Terminal I/O failed: {}", e))
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, config_path: Option<&Path>) -> Result<(), String> {
    let explicit = config_path;
    let config_path = config_path.map(Path::to_path_buf).unwrap_or_else(default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load(explicit).map_err(|e| e.to_string())?;
            let builder = config.request_builder();
            let save = config.save_settings();

            println!("Current configuration:");
            println!("  API base URL: {}", config.base_url());
            println!("  Aspect ratio: {}", builder.aspect_ratio);
            println!("  Resolution: {}", builder.resolution.label());
            println!("  Render engine: {} ({})", builder.tier, builder.tier.model_id());
            println!("  Poll interval: {}s", config.poll_interval().as_secs());
            println!(
                "  Prompt: {}",
                if config.generation.prompt.is_some() { "custom" } else { "built-in" }
            );
            println!("  Output: {}", presentation::download_path(&save.directory, Some(&save.filename)).display());
            println!();

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
            Ok(())
        }
        ConfigAction::Init => {
            init_config_file(&config_path)?;
            println!("Created config file: {}", config_path.display());
            Ok(())
        }
    }
}

/// Write the default config template, refusing to overwrite.
pub fn init_config_file(config_path: &Path) -> Result<(), String> {
    if config_path.exists() {
        return Err(format!(
            "Config file already exists: {}\nUse 'cpu-reveal config show' to view current settings.",
            config_path.display()
        ));
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Error creating config directory: {}", e))?;
    }

    std::fs::write(config_path, DEFAULT_CONFIG)
        .map_err(|e| format!("Error writing config file: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::enums::{AspectArg, TierArg};
    use crate::request::{AspectRatio, ModelTier, Resolution};

    #[test]
    fn test_resolve_builder_uses_config_defaults() {
        let config = Config::default();
        let builder = resolve_builder(&GenerateArgs::default(), &config).unwrap();
        assert_eq!(builder.prompt, config.request_builder().prompt);
        assert_eq!(builder.resolution, Resolution::FullHd);
    }

    #[test]
    fn test_resolve_builder_cli_overrides() {
        let args = GenerateArgs {
            prompt: Some("  spaced prompt ".to_string()),
            aspect: Some(AspectArg::Portrait),
            tier: Some(TierArg::Quality),
            ..GenerateArgs::default()
        };
        let builder = resolve_builder(&args, &Config::default()).unwrap();
        assert_eq!(builder.prompt, "  spaced prompt ");
        assert_eq!(builder.aspect_ratio, AspectRatio::Portrait);
        assert_eq!(builder.tier, ModelTier::Quality);
    }

    #[test]
    fn test_resolve_builder_reads_prompt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "line one\nline two\n").unwrap();

        let args = GenerateArgs {
            prompt_file: Some(path),
            ..GenerateArgs::default()
        };
        let builder = resolve_builder(&args, &Config::default()).unwrap();
        assert_eq!(builder.prompt, "line one\nline two\n");
    }

    #[test]
    fn test_resolve_builder_missing_prompt_file() {
        let args = GenerateArgs {
            prompt_file: Some("/nonexistent/prompt.txt".into()),
            ..GenerateArgs::default()
        };
        let err = resolve_builder(&args, &Config::default()).unwrap_err();
        assert!(err.contains("Failed to read prompt file"));
    }

    #[test]
    fn test_init_config_file_writes_template_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        init_config_file(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG);

        let err = init_config_file(&path).unwrap_err();
        assert!(err.contains("already exists"));
    }

    #[tokio::test]
    async fn test_download_or_cancel_stops_stalled_transfer() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/slow.mp4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 64])
                    .set_delay(std::time::Duration::from_secs(20)),
            )
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.mp4");
        let locator = format!("{}/files/slow.mp4?key=k", mock_server.uri());
        let service = VeoClient::with_base_url(mock_server.uri()).unwrap();

        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                cancel.cancel();
            }
        };

        let started = std::time::Instant::now();
        let (result, _) = tokio::join!(
            download_or_cancel(&service, &locator, &dest, &cancel),
            canceller
        );

        assert_eq!(result.unwrap_err(), "Download cancelled.");
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_download_or_cancel_saves_when_not_cancelled() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"video".to_vec()))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.mp4");
        let locator = format!("{}/files/clip.mp4?key=k", mock_server.uri());
        let service = VeoClient::with_base_url(mock_server.uri()).unwrap();

        let saved = download_or_cancel(&service, &locator, &dest, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(saved, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"video");
    }

    #[test]
    fn test_missing_key_help_mentions_env_and_billing() {
        let help = missing_key_help();
        assert!(help.contains("GEMINI_API_KEY"));
        assert!(help.contains(BILLING_DOCS_URL));
    }
}
