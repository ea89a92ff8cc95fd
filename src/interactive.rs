//! Interactive session - line-oriented front-end over the controller.
//!
//! Plain text replaces the prompt; slash commands edit the configuration and
//! drive the session. Every screen comes from [`presentation::render`].

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::thread;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::controller::Controller;
use crate::credential::{CredentialProvider, LineSource};
use crate::generation::VideoService;
use crate::presentation::{self, LOADING_MESSAGE_INTERVAL};
use crate::request::{AspectRatio, ModelTier, Resolution};
use crate::session::SessionState;
use crate::veo::VeoClient;

pub const HELP_TEXT: &str = "\
Commands:
  <text> | /prompt <text>   Replace the visual directive
  /append <text>            Add a line to the directive
  /aspect <16:9|9:16>       Set aspect ratio
  /resolution <720p|1080p>  Set resolution
  /tier <fast|quality>      Set render engine
  /generate                 Start generating
  /cancel                   Stop waiting for the current video
  /save [path]              Download the finished video
  /reset                    Generate new
  /dismiss                  Clear the error and try again
  /key                      Select an API key
  /show                     Redraw the screen
  /help                     Show this help
  /quit                     Exit";

/// A parsed line of user input.
#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    SetPrompt(String),
    AppendPrompt(String),
    SetAspect(AspectRatio),
    SetResolution(Resolution),
    SetTier(ModelTier),
    Generate,
    Save(Option<PathBuf>),
    Reset,
    Dismiss,
    SelectKey,
    Cancel,
    Show,
    Help,
    Quit,
}

impl UiCommand {
    /// Parse a line of input.
    ///
    /// Returns `Ok(None)` for blank lines and `Err` with a user-facing
    /// warning for unknown or malformed commands.
    pub fn parse(input: &str) -> Result<Option<UiCommand>, String> {
        let line = input.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim();

        if trimmed.is_empty() {
            return Ok(None);
        }

        if trimmed.starts_with('/') {
            return Self::parse_command(trimmed).map(Some);
        }

        // Regular text replaces the prompt as typed.
        Ok(Some(UiCommand::SetPrompt(line.to_string())))
    }

    fn parse_command(input: &str) -> Result<UiCommand, String> {
        let (name, rest) = match input.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (input, ""),
        };

        match name.to_lowercase().as_str() {
            "/prompt" => text_arg(rest, "/prompt <text>").map(UiCommand::SetPrompt),
            "/append" => text_arg(rest, "/append <text>").map(UiCommand::AppendPrompt),
            "/aspect" => choice_arg(rest, "/aspect <16:9|9:16>").map(UiCommand::SetAspect),
            "/resolution" => {
                choice_arg(rest, "/resolution <720p|1080p>").map(UiCommand::SetResolution)
            }
            "/tier" => choice_arg(rest, "/tier <fast|quality>").map(UiCommand::SetTier),
            "/generate" => Ok(UiCommand::Generate),
            "/save" => Ok(UiCommand::Save((!rest.is_empty()).then(|| PathBuf::from(rest)))),
            "/reset" => Ok(UiCommand::Reset),
            "/dismiss" | "/retry" => Ok(UiCommand::Dismiss),
            "/key" => Ok(UiCommand::SelectKey),
            "/cancel" => Ok(UiCommand::Cancel),
            "/show" => Ok(UiCommand::Show),
            "/help" => Ok(UiCommand::Help),
            "/quit" | "/exit" => Ok(UiCommand::Quit),
            _ => Err(format!("Unknown command: {} (try /help)", name)),
        }
    }
}

fn text_arg(rest: &str, usage: &str) -> Result<String, String> {
    if rest.is_empty() {
        Err(format!("Usage: {}", usage))
    } else {
        Ok(rest.to_string())
    }
}

fn choice_arg<T>(rest: &str, usage: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if rest.is_empty() {
        return Err(format!("Usage: {}", usage));
    }
    rest.parse::<T>().map_err(|e| e.to_string())
}

/// Lines from a [`LineSource`] read on a background thread.
///
/// The thread only reads when asked, so while the loop is handling a command
/// nothing holds stdin and the credential selector can read from it.
pub struct InputLines {
    demand: std_mpsc::Sender<()>,
    lines: mpsc::UnboundedReceiver<io::Result<Option<String>>>,
    pending: bool,
}

impl InputLines {
    pub fn spawn(mut source: Box<dyn LineSource>) -> Self {
        let (demand_tx, demand_rx) = std_mpsc::channel::<()>();
        let (line_tx, line_rx) = mpsc::unbounded_channel();

        thread::spawn(move || {
            while demand_rx.recv().is_ok() {
                let line = source.next_line();
                let finished = !matches!(line, Ok(Some(_)));
                if line_tx.send(line).is_err() || finished {
                    break;
                }
            }
        });

        Self {
            demand: demand_tx,
            lines: line_rx,
            pending: false,
        }
    }

    /// Next line, `None` at end of input. Cancel safe.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        if !self.pending {
            if self.demand.send(()).is_err() {
                return Ok(None);
            }
            self.pending = true;
        }

        let line = self.lines.recv().await;
        self.pending = false;
        line.unwrap_or(Ok(None))
    }
}

/// Where `/save` puts videos by default.
#[derive(Debug, Clone)]
pub struct SaveSettings {
    pub directory: PathBuf,
    pub filename: String,
}

impl Default for SaveSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            filename: presentation::DEFAULT_DOWNLOAD_FILENAME.to_string(),
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

/// The interactive loop.
pub struct Interactive<S, P, W> {
    controller: Controller<S, P>,
    downloader: VeoClient,
    save: SaveSettings,
    out: W,
    tick: usize,
}

impl<S, P, W> Interactive<S, P, W>
where
    S: VideoService + 'static,
    P: CredentialProvider + 'static,
    W: Write,
{
    pub fn new(controller: Controller<S, P>, downloader: VeoClient, save: SaveSettings, out: W) -> Self {
        Self {
            controller,
            downloader,
            save,
            out,
            tick: 0,
        }
    }

    pub fn controller(&self) -> &Controller<S, P> {
        &self.controller
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Run until `/quit` or end of input.
    ///
    /// At end of input a running generation is waited for, so piped
    /// command scripts still see their result.
    pub async fn run(&mut self, input: &mut InputLines) -> io::Result<()> {
        if let Err(e) = self.controller.check_credential() {
            log::warn!("Initial credential check skipped: {}", e);
        }
        self.show()?;

        let mut ticker = time::interval_at(
            Instant::now() + LOADING_MESSAGE_INTERVAL,
            LOADING_MESSAGE_INTERVAL,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                line = input.next_line() => {
                    let Some(line) = line? else {
                        if self.controller.is_generating() {
                            self.controller.wait_for_result().await;
                            self.show()?;
                        }
                        break;
                    };

                    let command = match UiCommand::parse(&line) {
                        Ok(Some(command)) => command,
                        Ok(None) => continue,
                        Err(warning) => {
                            writeln!(self.out, "{}", warning)?;
                            continue;
                        }
                    };

                    let was_generating = self.controller.is_generating();
                    if let Flow::Quit = self.handle(command).await? {
                        break;
                    }
                    if !was_generating && self.controller.is_generating() {
                        ticker.reset();
                    }
                }
                _ = self.controller.next_outcome(), if self.controller.is_generating() => {
                    self.show()?;
                }
                _ = ticker.tick(), if self.controller.is_generating() => {
                    self.tick += 1;
                    write!(self.out, "{}", presentation::render_loading(self.tick))?;
                    self.out.flush()?;
                }
            }
        }

        Ok(())
    }

    async fn handle(&mut self, command: UiCommand) -> io::Result<Flow> {
        log::debug!("Command: {:?}", command);

        match command {
            UiCommand::SetPrompt(text) => {
                self.controller.builder_mut().prompt = text;
                self.show_editor()?;
            }
            UiCommand::AppendPrompt(text) => {
                let prompt = &mut self.controller.builder_mut().prompt;
                if !prompt.is_empty() {
                    prompt.push('\n');
                }
                prompt.push_str(&text);
                self.show_editor()?;
            }
            UiCommand::SetAspect(aspect) => {
                self.controller.builder_mut().aspect_ratio = aspect;
                self.show_editor()?;
            }
            UiCommand::SetResolution(resolution) => {
                self.controller.builder_mut().resolution = resolution;
                self.show_editor()?;
            }
            UiCommand::SetTier(tier) => {
                self.controller.builder_mut().tier = tier;
                self.show_editor()?;
            }
            UiCommand::Generate => match self.controller.submit() {
                Ok(_) => {
                    self.tick = 0;
                    self.show()?;
                }
                Err(e) => writeln!(self.out, "! {}", e)?,
            },
            UiCommand::Cancel => match self.controller.abandon() {
                Ok(()) => {
                    writeln!(self.out, "Stopped waiting. The remote job may still finish.")?;
                    self.show()?;
                }
                Err(e) => writeln!(self.out, "! {}", e)?,
            },
            UiCommand::Save(path) => self.save(path).await?,
            UiCommand::Reset => self.transition(|c| c.reset())?,
            UiCommand::Dismiss => self.transition(|c| c.dismiss_error())?,
            UiCommand::SelectKey => self.transition(|c| c.select_credential().map(|_| ()))?,
            UiCommand::Show => self.show()?,
            UiCommand::Help => writeln!(self.out, "{}", HELP_TEXT)?,
            UiCommand::Quit => return Ok(Flow::Quit),
        }

        Ok(Flow::Continue)
    }

    fn transition<E: std::fmt::Display>(
        &mut self,
        action: impl FnOnce(&mut Controller<S, P>) -> Result<(), E>,
    ) -> io::Result<()> {
        match action(&mut self.controller) {
            Ok(()) => self.show(),
            Err(e) => writeln!(self.out, "! {}", e),
        }
    }

    async fn save(&mut self, path: Option<PathBuf>) -> io::Result<()> {
        let SessionState::Complete { locator } = self.controller.state() else {
            return writeln!(self.out, "! Nothing to save yet.");
        };

        let dest = path.unwrap_or_else(|| {
            presentation::download_path(&self.save.directory, Some(&self.save.filename))
        });
        writeln!(self.out, "Downloading to {}...", dest.display())?;

        match self.downloader.download_video(locator.as_str(), &dest).await {
            Ok(saved) => writeln!(self.out, "Saved {}", saved.display()),
            Err(e) => {
                log::error!("Download failed: {}", e);
                writeln!(self.out, "! Download failed: {}", e)
            }
        }
    }

    /// Redraw for the current state, or note that editing is not possible.
    fn show_editor(&mut self) -> io::Result<()> {
        match self.controller.state() {
            SessionState::Idle | SessionState::Error { .. } => self.show(),
            _ => writeln!(self.out, "Saved. Changes apply to the next generation."),
        }
    }

    fn show(&mut self) -> io::Result<()> {
        let screen = match self.controller.state() {
            SessionState::Generating => presentation::render_loading(self.tick),
            state => presentation::render(state, self.controller.builder()),
        };
        write!(self.out, "\n{}", screen)?;
        self.out.flush()
    }
}
