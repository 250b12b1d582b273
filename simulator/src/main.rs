//! Interactive soft keyboard simulator.
//!
//! Drives `ImeEngine` against an in-memory text field. Plain input lines are
//! typed key by key (a space is the space key); lines starting with `:` are
//! commands. After every line the simulator delivers the host's selection
//! notifications, applies worker results and prints the field.
//!
//! Usage:
//!   cargo run -p softkey-sim
//!   cargo run -p softkey-sim -- --words words.toml --settings keyboard.toml
//!   RUST_LOG=libsoftkey_core=debug cargo run -p softkey-sim

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use libsoftkey_core::{
    FieldInfo, FieldKind, ImeEngine, InMemorySpellService, KeyEvent, MemoryTextField,
    Settings, ShiftState,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "softkey-sim")]
#[command(about = "Type into a simulated text field through the composing core")]
struct Args {
    /// Settings TOML file (defaults are used when omitted)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Word list TOML file with `[words]` and `[[bigrams]]` tables
    #[arg(short, long)]
    words: Option<PathBuf>,

    /// Language used for bigram lookups (overrides the settings file)
    #[arg(short, long)]
    language: Option<String>,

    /// Print the UI context as JSON after every line
    #[arg(long)]
    json: bool,
}

const DEMO_WORDS: &str = r#"
language = "en"

[words]
the = 500
this = 300
that = 280
is = 400
cat = 120
cats = 60
and = 450
nap = 20
hello = 150
hell = 30
world = 140
keyboard = 40

[[bigrams]]
prev = "the"
next = "cat"
count = 12

[[bigrams]]
prev = "cat"
next = "is"
count = 30

[[bigrams]]
prev = "cat"
next = "and"
count = 20

[[bigrams]]
prev = "cat"
next = "nap"
count = 10

[[bigrams]]
prev = "hello"
next = "world"
count = 25
"#;

const HELP: &str = "\
commands:
  <text>              type text (space = space key)
  :bs [n]             backspace n times
  :enter              enter key
  :pick <n>           pick suggestion n (1-based)
  :swipe <word>       commit a gesture word
  :shift off|once|lock
  :tap <start> [end]  move the selection as the user would
  :edit <start> <end> <text>
                      replace a range from outside the keyboard
  :field text|email|url|password|number|phone
  :wait               wait for pending suggestions
  :help               this text
  :quit";

fn load_service(args: &Args) -> anyhow::Result<InMemorySpellService> {
    let content = match &args.words {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading word list {}", path.display()))?,
        None => DEMO_WORDS.to_string(),
    };
    InMemorySpellService::from_toml_str(&content).context("parsing word list")
}

fn load_settings(args: &Args) -> anyhow::Result<Settings> {
    let mut settings = match &args.settings {
        Some(path) => Settings::load_toml(path)
            .with_context(|| format!("loading settings {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(language) = &args.language {
        settings.language = language.clone();
    }
    Ok(settings)
}

fn parse_field(name: &str) -> Option<FieldKind> {
    match name {
        "text" => Some(FieldKind::Text),
        "email" => Some(FieldKind::Email),
        "url" => Some(FieldKind::Url),
        "password" => Some(FieldKind::Password),
        "number" => Some(FieldKind::Number),
        "phone" => Some(FieldKind::Phone),
        _ => None,
    }
}

fn parse_shift(name: &str) -> Option<ShiftState> {
    match name {
        "off" => Some(ShiftState::Off),
        "once" => Some(ShiftState::OneShot),
        "lock" => Some(ShiftState::Locked),
        _ => None,
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Run one input line against the engine.
async fn run_line(engine: &mut ImeEngine<MemoryTextField>, line: &str, settle: Duration) -> anyhow::Result<Flow> {
    let Some(command) = line.strip_prefix(':') else {
        for ch in line.chars() {
            let key = if ch == ' ' { KeyEvent::Space } else { KeyEvent::Char(ch) };
            engine.process_key(key);
            engine.deliver_selection_updates();
        }
        return Ok(Flow::Continue);
    };

    let mut parts = command.splitn(2, ' ');
    let name = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();
    match name {
        "q" | "quit" => return Ok(Flow::Quit),
        "h" | "help" => println!("{HELP}"),
        "bs" => {
            let n: usize = if rest.is_empty() { 1 } else { rest.parse()? };
            for _ in 0..n {
                engine.process_key(KeyEvent::Backspace);
                engine.deliver_selection_updates();
            }
        }
        "enter" => {
            engine.process_key(KeyEvent::Enter);
        }
        "pick" => {
            let n: usize = rest.parse().context("pick needs a 1-based index")?;
            engine.pick_suggestion(n.saturating_sub(1));
        }
        "swipe" => {
            engine.commit_gesture(rest);
        }
        "shift" => {
            let state = parse_shift(rest).context("shift takes off, once or lock")?;
            engine.process_key(KeyEvent::Shift(state));
        }
        "tap" => {
            let nums: Vec<usize> = rest
                .split_whitespace()
                .map(str::parse::<usize>)
                .collect::<Result<_, _>>()?;
            let (start, end) = match nums.as_slice() {
                [pos] => (*pos, *pos),
                [start, end] => (*start, *end),
                _ => anyhow::bail!("tap takes one or two offsets"),
            };
            engine.bridge_mut().peer_mut().user_select(start, end);
        }
        "edit" => {
            let mut args = rest.splitn(3, ' ');
            let start: usize = args.next().unwrap_or_default().parse()?;
            let end: usize = args.next().unwrap_or_default().parse()?;
            let text = args.next().unwrap_or_default();
            engine.bridge_mut().peer_mut().external_replace(start..end, text);
        }
        "field" => {
            let kind = parse_field(rest).context("unknown field kind")?;
            engine.start_input(FieldInfo::with_kind(kind));
        }
        "wait" => {
            tokio::time::sleep(settle * 4).await;
        }
        other => anyhow::bail!("unknown command :{other} (try :help)"),
    }
    engine.deliver_selection_updates();
    Ok(Flow::Continue)
}

/// Apply worker results that arrive within `settle`.
async fn drain(engine: &mut ImeEngine<MemoryTextField>, settle: Duration) {
    engine.pump();
    while let Ok(Some(outcome)) = tokio::time::timeout(settle, engine.next_message()).await {
        tracing::debug!(?outcome, "pipeline message");
    }
}

fn print_state(engine: &ImeEngine<MemoryTextField>, json: bool) -> anyhow::Result<()> {
    let field = engine.bridge().peer();
    let context = engine.context();
    if json {
        println!("{}", serde_json::to_string(context)?);
        return Ok(());
    }

    let text: Vec<char> = field.text().chars().collect();
    let caret = field.cursor();
    let mut shown = String::new();
    for (i, ch) in text.iter().enumerate() {
        if i == caret.start {
            shown.push('|');
        }
        shown.push(*ch);
    }
    if caret.start >= text.len() {
        shown.push('|');
    }
    println!("  field:      {shown:?}");
    if let Some(region) = field.composing_region() {
        println!("  composing:  {:?} at {}..{}", context.composing_text, region.start, region.end);
    }
    if !context.candidates.is_empty() {
        let strip: Vec<String> = context
            .candidates
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {}", i + 1, c))
            .collect();
        let label = if context.showing_predictions { "next" } else { "suggest" };
        println!("  {label}:    {}", strip.join("  "));
    }
    if context.highlight_misspelled {
        println!("  (not in dictionary: press space again to keep it)");
    }
    if context.shift != ShiftState::Off {
        println!("  shift:      {:?}", context.shift);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let settings = load_settings(&args)?;
    let service = load_service(&args)?;
    let settle = settings.debounce() + Duration::from_millis(25);

    let mut engine = ImeEngine::new(
        MemoryTextField::new(),
        Arc::new(service),
        settings,
        tokio::runtime::Handle::current(),
    );
    engine.start_input(FieldInfo::text());

    println!("softkey-sim: type text and press Enter. :help for commands.");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let line = line?;
        if line.is_empty() {
            continue;
        }
        match run_line(&mut engine, &line, settle).await {
            Ok(Flow::Quit) => break,
            Ok(Flow::Continue) => {}
            Err(e) => {
                eprintln!("error: {e:#}");
                continue;
            }
        }
        drain(&mut engine, settle).await;
        engine.deliver_selection_updates();
        print_state(&engine, args.json)?;
    }

    engine.finish_input();
    Ok(())
}
