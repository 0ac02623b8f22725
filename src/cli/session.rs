//! Plain-text front end over the engine: one-shot prompts and the REPL.

use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::history::PromptHistory;
use crate::core::client::ModelClient;
use crate::core::config::data::path_display;
use crate::core::config::Config;
use crate::core::engine::{Engine, StreamEvent};
use crate::core::error::EngineError;
use crate::core::mode::Mode;
use crate::core::normalizer::ExecResult;
use crate::core::prompt::PromptContext;
use crate::core::system::SystemContext;
use crate::run::run_interactive;
use crate::utils::editor::open_in_editor;

const HELP: &str = "\
Commands:
  /exec    switch to exec mode (shell command suggestions)
  /chat    switch to chat mode (streamed replies)
  /clear   clear the current mode's history
  /reset   clear both histories and the prompt history
  /history list earlier prompts
  !! / !N  send the last / Nth earlier prompt again
  /config  edit the settings file and reconnect
  /help    show this list
  /quit    leave (also Ctrl+D)
Ctrl+C interrupts a request in flight.";

/// A line typed at the REPL prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Empty,
    Prompt(String),
    SetMode(Mode),
    Clear,
    Reset,
    History,
    /// `!!` (latest) or `!N`.
    Recall(Option<usize>),
    Config,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_repl_line(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    if let Some(rest) = line.strip_prefix('!') {
        if rest == "!" {
            return ReplCommand::Recall(None);
        }
        if let Ok(number) = rest.parse::<usize>() {
            return ReplCommand::Recall(Some(number));
        }
    }
    let Some(command) = line.strip_prefix('/') else {
        return ReplCommand::Prompt(line.to_string());
    };

    match command.split_whitespace().next().unwrap_or_default() {
        "exec" => ReplCommand::SetMode(Mode::Exec),
        "chat" => ReplCommand::SetMode(Mode::Chat),
        "clear" => ReplCommand::Clear,
        "reset" => ReplCommand::Reset,
        "history" => ReplCommand::History,
        "config" | "settings" => ReplCommand::Config,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        other => ReplCommand::Unknown(other.to_string()),
    }
}

pub fn is_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Text shown for a one-shot result.
pub fn render_exec_result(result: &ExecResult) -> String {
    if result.executable {
        if result.explanation.is_empty() {
            return result.command.clone();
        }
        return format!("{}\n  {}", result.command, result.explanation);
    }

    if result.explanation.is_empty() {
        result.command.clone()
    } else {
        result.explanation.clone()
    }
}

/// Source of typed lines. Detached when stdin was consumed as pipe context.
pub struct Console<R> {
    lines: Option<Lines<R>>,
}

impl Console<BufReader<Stdin>> {
    pub fn interactive() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> Console<R> {
    pub fn detached() -> Self {
        Self { lines: None }
    }

    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: Some(reader.lines()),
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.lines.is_some()
    }

    /// Next line, or `None` at end of input.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        match &mut self.lines {
            Some(lines) => lines.next_line().await,
            None => Ok(None),
        }
    }
}

/// Ask for an API key on the console and save it into the config at
/// `path`. Returns `false` when nothing was entered.
pub async fn prompt_for_api_key<R, W>(
    console: &mut Console<R>,
    out: &mut W,
    config: &mut Config,
    path: &Path,
) -> Result<bool, Box<dyn Error>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let prompt = format!(
        "No Gemini API key found.\nEnter your key (it will be saved to {}): ",
        path_display(path)
    );
    out.write_all(prompt.as_bytes()).await?;
    out.flush().await?;

    let key = console.read_line().await?.unwrap_or_default();
    let key = key.trim();
    if key.is_empty() {
        return Ok(false);
    }

    config.gemini_key = Some(key.to_string());
    config.save_to_path(path)?;
    info!(path = %path_display(path), "API key saved");
    out.write_all("✅ API key saved\n".as_bytes()).await?;
    out.flush().await?;
    Ok(true)
}

/// Open the config file at `path` in `editor`, creating it first if needed,
/// and return the config as saved.
pub async fn edit_config_file(editor: &str, path: &Path) -> Result<Config, Box<dyn Error>> {
    if !path.exists() {
        Config::default().save_to_path(path)?;
    }

    let status = open_in_editor(editor, path).await?;
    if !status.success() {
        return Err(format!("Editor exited with status {status}").into());
    }
    Ok(Config::load_from_path(path)?)
}

/// Builds a model client from a freshly loaded config.
pub type ClientFactory = Box<dyn Fn(&Config) -> Result<Arc<dyn ModelClient>, EngineError>>;

/// What `/config` needs: the file to edit, the editor, and a way to
/// reconnect with the edited values.
pub struct SettingsEditor {
    pub path: PathBuf,
    pub editor: String,
    pub connect: ClientFactory,
}

pub struct Session<R, W> {
    engine: Engine,
    events: mpsc::Receiver<StreamEvent>,
    console: Console<R>,
    out: W,
    history: PromptHistory,
    settings: Option<SettingsEditor>,
}

impl<R, W> Session<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        engine: Engine,
        events: mpsc::Receiver<StreamEvent>,
        console: Console<R>,
        out: W,
    ) -> Self {
        Self {
            engine,
            events,
            console,
            out,
            history: PromptHistory::default(),
            settings: None,
        }
    }

    /// Enable `/config`.
    pub fn with_settings(mut self, settings: SettingsEditor) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn history(&self) -> &PromptHistory {
        &self.history
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn close(&self) {
        self.engine.close();
    }

    async fn say(&mut self, text: &str) -> io::Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await
    }

    /// Answer a single prompt in the current mode.
    pub async fn run_once(&mut self, prompt: &str) -> Result<(), Box<dyn Error>> {
        self.turn(prompt).await
    }

    pub async fn run_repl(&mut self) -> Result<(), Box<dyn Error>> {
        self.say("Welcome to Xang! Ask me something, or /help.\n").await?;

        loop {
            let prompt = format!("xang [{}]> ", self.engine.mode());
            self.say(&prompt).await?;

            let line = tokio::select! {
                line = self.console.read_line() => line?,
                _ = signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                self.say("\n").await?;
                break;
            };

            match parse_repl_line(&line) {
                ReplCommand::Empty => {}
                ReplCommand::Quit => break,
                ReplCommand::Help => self.say(&format!("{HELP}\n")).await?,
                ReplCommand::SetMode(mode) => {
                    self.engine.set_mode(mode);
                    self.say(&format!("Switched to {mode} mode\n")).await?;
                }
                ReplCommand::Clear => {
                    self.engine.clear_active();
                    let mode = self.engine.mode();
                    self.say(&format!("Cleared {mode} history\n")).await?;
                }
                ReplCommand::Reset => {
                    self.engine.reset_all();
                    self.history.clear();
                    self.say("Cleared all history\n").await?;
                }
                ReplCommand::History => {
                    let listing = self.history.render();
                    self.say(&listing).await?;
                }
                ReplCommand::Recall(number) => {
                    let Some(text) = self.history.recall(number).map(str::to_string) else {
                        self.say("No such prompt in history\n").await?;
                        continue;
                    };
                    self.say(&format!("{text}\n")).await?;
                    self.submit(&text).await?;
                }
                ReplCommand::Config => {
                    if let Err(err) = self.edit_settings().await {
                        warn!(error = %err, "settings edit failed");
                        self.say(&format!("❌ {err}\n")).await?;
                    }
                }
                ReplCommand::Unknown(command) => {
                    self.say(&format!("Unknown command /{command}, try /help\n"))
                        .await?;
                }
                ReplCommand::Prompt(text) => self.submit(&text).await?,
            }
        }

        Ok(())
    }

    /// Record a REPL prompt and answer it. Request failures are reported and
    /// the REPL keeps going.
    async fn submit(&mut self, text: &str) -> io::Result<()> {
        self.history.add(text);
        if let Err(err) = self.turn(text).await {
            warn!(error = %err, "request failed");
            self.say(&format!("❌ {err}\n")).await?;
        }
        Ok(())
    }

    /// Open the settings file in the editor, then reload it and replace the
    /// engine. The pipe context and the current mode carry over; the
    /// conversation histories start empty. On any failure the current engine
    /// stays in place.
    async fn edit_settings(&mut self) -> Result<(), Box<dyn Error>> {
        let Some(settings) = &self.settings else {
            return Err("Settings editing is not available in this session".into());
        };

        let config = edit_config_file(&settings.editor, &settings.path).await?;
        let client = (settings.connect)(&config)?;
        let prompt_context = PromptContext::new(
            SystemContext::analyse(),
            config.preferences().map(str::to_string),
        );
        let (engine, events) = Engine::new(client, self.engine.mode(), prompt_context);
        if let Some(pipe) = self.engine.pipe_context() {
            engine.set_pipe_context(pipe);
        }

        self.engine.close();
        self.engine = engine;
        self.events = events;
        debug!(path = %path_display(&settings.path), "settings reloaded");
        self.say("✅ Settings reloaded\n").await?;
        Ok(())
    }

    async fn turn(&mut self, input: &str) -> Result<(), Box<dyn Error>> {
        // An interrupt that raced the end of the previous turn may have left
        // a stray event behind.
        while self.events.try_recv().is_ok() {}

        match self.engine.mode() {
            Mode::Exec => self.exec_turn(input).await,
            Mode::Chat => self.chat_turn(input).await,
        }
    }

    async fn exec_turn(&mut self, input: &str) -> Result<(), Box<dyn Error>> {
        let outcome = {
            let request = self.engine.run_one_shot(input);
            tokio::pin!(request);
            tokio::select! {
                result = &mut request => Some(result),
                _ = signal::ctrl_c() => {
                    self.engine.interrupt().await;
                    None
                }
            }
        };

        let Some(result) = outcome else {
            self.discard_until_terminal();
            self.say("\n^C interrupted\n").await?;
            return Ok(());
        };
        let result = result?;

        self.say(&format!("{}\n", render_exec_result(&result)))
            .await?;
        if !result.executable {
            return Ok(());
        }

        if !self.console.is_interactive() {
            self.say("(not executed: stdin is not a terminal)\n").await?;
            return Ok(());
        }

        self.say("confirm execution? [y/N] ").await?;
        let answer = self.console.read_line().await?.unwrap_or_default();
        if !is_confirmation(&answer) {
            return Ok(());
        }

        let status = run_interactive(&result.command).await?;
        if !status.success() {
            let code = status
                .code()
                .map_or_else(|| "signal".to_string(), |code| code.to_string());
            self.say(&format!("⚠️  command exited with status {code}\n"))
                .await?;
        }
        Ok(())
    }

    async fn chat_turn(&mut self, input: &str) -> Result<(), Box<dyn Error>> {
        let Self {
            engine,
            events,
            out,
            ..
        } = self;

        let stream = engine.run_streaming(input);
        tokio::pin!(stream);
        let mut outcome = None;
        let mut interrupted = false;

        loop {
            tokio::select! {
                biased;
                event = events.recv() => {
                    let Some(event) = event else { break };
                    write_event(&mut *out, &event).await?;
                    if event.is_terminal() {
                        break;
                    }
                }
                result = &mut stream, if outcome.is_none() => outcome = Some(result),
                _ = signal::ctrl_c(), if !interrupted => {
                    interrupted = true;
                    engine.interrupt().await;
                }
            }

            if outcome.is_some() {
                // Everything the stream published is already queued.
                while let Ok(event) = events.try_recv() {
                    write_event(&mut *out, &event).await?;
                    if event.is_terminal() {
                        break;
                    }
                }
                break;
            }
        }

        let result = match outcome {
            Some(result) => result,
            None => stream.await,
        };
        debug!(ok = result.is_ok(), "stream finished");
        result.map_err(|err: EngineError| err.into())
    }

    /// Drop queued events left over from an interrupted one-shot.
    fn discard_until_terminal(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            if event.is_terminal() {
                break;
            }
        }
    }
}

async fn write_event<W: AsyncWrite + Unpin>(out: &mut W, event: &StreamEvent) -> io::Result<()> {
    match event {
        StreamEvent::Delta(text) => out.write_all(text.as_bytes()).await?,
        // The caller reports the failure itself; just end the partial line.
        StreamEvent::Final { .. } | StreamEvent::Error(_) => out.write_all(b"\n").await?,
        StreamEvent::Interrupt => out.write_all(b"\n^C interrupted\n").await?,
    }
    out.flush().await
}
