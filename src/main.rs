use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use typeassist::events::{self, Event, EventReceiver};
use typeassist::settings::{self, FileStore};
use typeassist::{
    keyboard, App, Config, Dispatcher, HotkeyManager, Payload, Speed, Timing, TypeAssistError,
    VerificationClient,
};

#[derive(Parser, Debug)]
#[command(name = "typeassist", version, about = "Types text into the focused window on a global hotkey")]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify a token for this device and store it
    Login { token: String },
    /// Forget the stored token
    Logout,
    /// Show the stored authentication state
    Status,
    /// Refresh the credit balance from the server
    Balance,
    /// Type the text once, right now
    Type(TypeArgs),
    /// Register the hotkey and type the text on every press until Ctrl-C
    Run {
        #[command(flatten)]
        payload: TypeArgs,

        /// Trigger hotkey, e.g. F9 or ctrl+shift+t
        #[arg(long)]
        hotkey: Option<String>,
    },
}

#[derive(Args, Debug)]
struct TypeArgs {
    /// Text to type
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    text: Option<String>,

    /// Read the text to type from a file
    #[arg(long)]
    file: Option<PathBuf>,

    /// slow, normal, fast, instant or a delay in milliseconds
    #[arg(short, long)]
    speed: Option<Speed>,
}

impl TypeArgs {
    fn payload(&self, config: &Config) -> Result<Payload> {
        let text = match (&self.text, &self.file) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            (None, None) => bail!("either --text or --file is required"),
        };
        Ok(Payload {
            text,
            speed: self.speed.unwrap_or(config.speed),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.verbose {
        config.verbose = true;
    }
    init_tracing(config.verbose);

    if let Command::Run {
        hotkey: Some(hotkey),
        ..
    } = &cli.command
    {
        config.hotkey = hotkey.clone();
    }
    config.validate()?;

    let settings_path = match &config.settings_path {
        Some(path) => path.clone(),
        None => settings::default_settings_path()?,
    };
    // logout has to work even when the record cannot be read
    let store = match cli.command {
        Command::Logout => FileStore::open_or_reset(&settings_path)?,
        _ => FileStore::open(&settings_path)?,
    };
    let device_id = settings::load_or_create_device_id(&settings_path)?;

    let (tx, rx) = events::channel();
    let dispatcher = Dispatcher::new(keyboard::enigo_factory(), Timing::from_config(&config), tx.clone());
    let client = VerificationClient::from_config(&config)?;
    let mut app = App::new(store, client, dispatcher, device_id, tx.clone());

    match &cli.command {
        Command::Login { token } => {
            let verified = app.verify_token(token.trim()).await?;
            println!(
                "{} {} ({} credits)",
                "✔ Verified".green().bold(),
                verified.email,
                verified.remaining_credits
            );
        }
        Command::Logout => {
            app.logout()?;
            println!("{}", "Logged out".yellow());
        }
        Command::Status => print_status(&app, cli.json)?,
        Command::Balance => {
            let balance = app.balance().await?;
            match balance.total_credits {
                Some(total) => println!("{} / {} credits remaining", balance.remaining_credits, total),
                None => println!("{} credits remaining", balance.remaining_credits),
            }
        }
        Command::Type(args) => {
            let payload = args.payload(&config)?;
            let printer = tokio::spawn(print_events(rx, cli.json));
            let session = app.type_text(&payload).await?;
            let id = session.id();
            println!("{} switch to the target window…", "⌨".cyan());

            let outcome = tokio::select! {
                outcome = session.wait() => outcome?,
                _ = tokio::signal::ctrl_c() => {
                    app.dispatcher().stop_session(id)?;
                    bail!("interrupted");
                }
            };
            tracing::debug!(?outcome, "Session finished");
            drop((app, tx));
            let _ = printer.await;
        }
        Command::Run { payload, .. } => {
            let payload = payload.payload(&config)?;
            let printer = tokio::spawn(print_events(rx, cli.json));

            let mut hotkeys = HotkeyManager::new(&config.cancel_key)?;
            if let Err(e) = hotkeys.set_hotkey(&config.hotkey) {
                let key = match &e {
                    TypeAssistError::HotkeyRegistration { key, .. } => key.clone(),
                    _ => config.hotkey.clone(),
                };
                let _ = tx.send(Event::HotkeyError { key });
                drop((app, tx));
                let _ = printer.await;
                return Err(e.into());
            }
            println!(
                "{} press {} to type, {} to cancel, Ctrl-C to quit",
                "🔥".red(),
                config.hotkey.bold(),
                config.cancel_key.bold()
            );

            let (actions_tx, actions_rx) = mpsc::unbounded_channel();
            let listener = hotkeys.start_listener(actions_tx);
            let result = app.run(&payload, actions_rx).await;

            hotkeys.unregister_all();
            drop((app, tx));
            let _ = listener.await;
            let _ = printer.await;
            result?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "typeassist=debug" } else { "typeassist=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_status(app: &App<FileStore>, json: bool) -> Result<()> {
    let record = app.auth_state();
    if json {
        let mut value = serde_json::to_value(&record)?;
        // never echo the token itself
        value["token"] = serde_json::json!(!record.token.is_empty());
        println!("{}", value);
        return Ok(());
    }

    if record.authenticated {
        println!("{} {}", "Authenticated as".green(), record.email.bold());
        println!("Credits: {}", record.credits);
    } else {
        println!("{}", "Not authenticated".yellow());
    }
    println!("Device:  {}", app.device_id());
    Ok(())
}

async fn print_events(mut rx: EventReceiver, json: bool) {
    while let Some(event) = rx.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::error!(error = %e, "Failed to encode event"),
            }
            continue;
        }

        match event {
            Event::HotkeyTriggered => println!("{}", "▶ Triggered".cyan()),
            Event::TypingProgress { current, total, progress, .. } => {
                if current == total || current % 25 == 0 {
                    println!("  {:>5.1}%  {}/{}", progress, current, total);
                }
            }
            Event::TypingComplete { .. } => println!("{}", "✔ Typing complete".green()),
            Event::TypingStopped { index, .. } => {
                println!("{} at character {}", "■ Stopped".yellow(), index)
            }
            Event::TypingCancelled { .. } => println!("{}", "Cancelling…".yellow()),
            Event::TypingError { message } => eprintln!("{} {}", "✘".red(), message),
            Event::HotkeyError { key } => eprintln!("{} could not register {}", "✘".red(), key),
        }
    }
}
