//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and dispatching to the
//! one-shot CLI mode, the line-based REPL or the `config` subcommands.

pub mod history;
pub mod session;


use std::error::Error;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::cli::session::{
    edit_config_file, prompt_for_api_key, ClientFactory, Console, Session, SettingsEditor,
};
use crate::core::client::{GeminiClient, ModelClient};
use crate::core::config::credentials::process_env;
use crate::core::config::data::path_display;
use crate::core::config::{resolve_settings, Config, CredentialStore, SystemKeyring};
use crate::core::engine::Engine;
use crate::core::error::EngineError;
use crate::core::mode::Mode;
use crate::core::prompt::PromptContext;
use crate::core::system::SystemContext;
use crate::utils::editor::editor_program;
use crate::utils::logging::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "xang", version)]
#[command(about = "Turn natural language into shell commands, or chat, from your terminal")]
#[command(
    long_about = "Xang asks Gemini to turn a request into a single shell command (exec mode) \
or answers conversationally with a streamed reply (chat mode).\n\n\
With a prompt, Xang answers once and exits. Without one it starts a REPL.\n\
Input piped on stdin is handed to the model as context for the prompt.\n\n\
Environment Variables:\n\
  GEMINI_API_KEY    Gemini API key (GEMINI_KEY is also accepted)\n\
  GEMINI_MODEL      Model override (default gemini-2.5-flash)\n\
  GEMINI_BASE_URL   API endpoint override\n\
  XANG_LOG          Log filter, e.g. xang=debug (falls back to RUST_LOG)\n\n\
REPL commands:\n\
  /exec /chat       Switch prompt mode\n\
  /clear            Clear the current mode's history\n\
  /reset            Clear both histories and the prompt history\n\
  /history          List earlier prompts; !! or !N sends one again\n\
  /config           Edit the settings file and reconnect\n\
  /help             Show this list\n\
  /quit             Leave\n\
  Ctrl+C            Interrupt the request in flight"
)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Force exec mode (shell command suggestions)
    #[arg(short = 'e', long, conflicts_with = "chat")]
    pub exec: bool,

    /// Force chat mode (streamed conversational replies)
    #[arg(short = 'c', long)]
    pub chat: bool,

    /// Model to use instead of the configured one
    #[arg(short = 'm', long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Write diagnostic logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Prompt to answer once; starts the REPL when omitted
    #[arg(trailing_var_arg = true, value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show or change the configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Store the Gemini API key
    SetKey {
        key: String,
        /// Store the key in the system keyring instead of the config file
        #[arg(long)]
        keyring: bool,
    },
    /// Set the default model
    SetModel { model: String },
    /// Set the prompt mode used when neither --exec nor --chat is given
    SetMode { mode: Mode },
    /// Set free-form preferences added to the system prompt
    SetPreferences {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        preferences: Vec<String>,
    },
    /// Print the configuration file's values
    Show,
    /// Open the configuration file in $VISUAL or $EDITOR (nano otherwise)
    Edit,
}

impl Args {
    /// Prompt mode requested on the command line, if any.
    pub fn forced_mode(&self) -> Option<Mode> {
        if self.exec {
            Some(Mode::Exec)
        } else if self.chat {
            Some(Mode::Chat)
        } else {
            None
        }
    }

    /// The prompt words joined, or `None` for REPL mode.
    pub fn prompt_text(&self) -> Option<String> {
        let text = self.prompt.join(" ");
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let mut args = Args::parse();

    if let Err(err) = init_tracing(args.log_file.as_deref()) {
        eprintln!("⚠️  Logging disabled: {err}");
    }

    if let Some(Commands::Config { command }) = args.command.take() {
        return handle_config_command(command, &SystemKeyring).await;
    }

    let config_path = Config::config_path()?;
    let mut config = Config::load_from_path(&config_path)?;
    let stdin_is_terminal = std::io::stdin().is_terminal();
    let mut console = if stdin_is_terminal {
        Console::interactive()
    } else {
        Console::detached()
    };
    let mut stdout = tokio::io::stdout();
    let connect = gemini_connector(args.model.clone());

    let client = match connect(&config) {
        Ok(client) => client,
        Err(EngineError::MissingCredential) if console.is_interactive() => {
            if !prompt_for_api_key(&mut console, &mut stdout, &mut config, &config_path).await? {
                eprintln!("❌ No API key entered.");
                std::process::exit(2);
            }
            connect(&config)?
        }
        Err(EngineError::MissingCredential) => {
            eprintln!(
                "❌ No Gemini API key found.\n\n\
Set GEMINI_API_KEY, or store a key with:\n  xang config set-key <KEY>"
            );
            std::process::exit(2);
        }
        Err(err) => return Err(err.into()),
    };

    let mode = args.forced_mode().unwrap_or_else(|| config.prompt_mode());
    let prompt_context = PromptContext::new(
        SystemContext::analyse(),
        config.preferences().map(str::to_string),
    );
    let (engine, events) = Engine::new(client, mode, prompt_context);

    if !stdin_is_terminal {
        let mut piped = String::new();
        tokio::io::stdin().read_to_string(&mut piped).await?;
        let piped = piped.trim();
        debug!(bytes = piped.len(), "read pipe context");
        engine.set_pipe_context(piped);
    }

    let mut session = Session::new(engine, events, console, stdout).with_settings(SettingsEditor {
        path: config_path,
        editor: editor_program(process_env),
        connect,
    });

    let result = match args.prompt_text() {
        Some(prompt) => session.run_once(&prompt).await,
        None if stdin_is_terminal => session.run_repl().await,
        None => {
            eprintln!("❌ Piped input needs a prompt, e.g. `ls | xang which file is largest`");
            Ok(())
        }
    };

    session.close();
    if let Err(err) = result {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
    Ok(())
}

/// Connects to Gemini with settings resolved from a config, the `--model`
/// flag, the environment and the system keyring.
fn gemini_connector(model_override: Option<String>) -> ClientFactory {
    Box::new(move |config: &Config| {
        let settings =
            resolve_settings(config, model_override.as_deref(), process_env, &SystemKeyring)?;
        debug!(model = %settings.model, base_url = %settings.base_url, "resolved settings");
        let client: Arc<dyn ModelClient> = Arc::new(GeminiClient::new(settings));
        Ok(client)
    })
}

pub(crate) async fn handle_config_command(
    command: ConfigCommands,
    keyring: &dyn CredentialStore,
) -> Result<(), Box<dyn Error>> {
    let path = Config::config_path()?;
    apply_config_command(command, &path, keyring, &editor_program(process_env)).await
}

pub(crate) async fn apply_config_command(
    command: ConfigCommands,
    path: &std::path::Path,
    keyring: &dyn CredentialStore,
    editor: &str,
) -> Result<(), Box<dyn Error>> {
    // Editing must work even when the file no longer parses.
    let loaded = Config::load_from_path(path);

    let config = match command {
        ConfigCommands::Edit => {
            edit_config_file(editor, path).await?;
            println!("✅ Configuration saved to {}", path_display(path));
            return Ok(());
        }
        ConfigCommands::Show => {
            loaded?.print_all();
            return Ok(());
        }
        ConfigCommands::SetKey { key, keyring: true } => {
            let mut config = loaded?;
            keyring.set(key.trim())?;
            println!("✅ API key stored in the system keyring");
            if config.gemini_key.take().is_none() {
                return Ok(());
            }
            warn!("removing API key from config file in favour of the keyring");
            config
        }
        ConfigCommands::SetKey { key, keyring: false } => {
            println!("✅ API key saved");
            Config {
                gemini_key: Some(key.trim().to_string()),
                ..loaded?
            }
        }
        ConfigCommands::SetModel { model } => {
            println!("✅ Default model set to {model}");
            Config {
                gemini_model: Some(model),
                ..loaded?
            }
        }
        ConfigCommands::SetMode { mode } => {
            println!("✅ Default prompt mode set to {mode}");
            Config {
                default_prompt_mode: Some(mode),
                ..loaded?
            }
        }
        ConfigCommands::SetPreferences { preferences } => {
            let text = preferences.join(" ");
            let text = text.trim();
            println!("✅ Preferences updated");
            Config {
                preferences: (!text.is_empty()).then(|| text.to_string()),
                ..loaded?
            }
        }
    };

    config.save_to_path(path)?;
    debug!(path = %path_display(path), "config saved");
    Ok(())
}
