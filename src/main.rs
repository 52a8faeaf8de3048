// Line-mode front end for the agent deck.
//
// Reads one command per line from stdin and prints the instance table
// whenever it changes. Configuration comes from AGENT_DECK_* variables.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use kodegen_agent_deck::{
    Deck, DeckOptions, DeckView, DriverCommand, ForegroundDriver, InstanceId, JsonFileStore,
    LifecycleManager, Multiplexer, MuxSessionName, NewInstance, Operation, Registry, Renderer,
    SessionStore, TmuxMultiplexer, Tool,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const HELP: &str = "\
commands:
  new [tool] <path> <title...>     create and start an instance
  start|attach|restart|kill <row>  lifecycle operations
  fork <row> <title...>            fork the conversation of <row>
  import <session> <tool> <path> <title...>
  redetect <row>                   detect the conversation id again
  send <row> <text...>             type text and press Enter
  select <row>                     mark <row> as seen
  scroll <offset> <size>           move the viewport
  dedup | refresh | help | quit";

/// Prints the table only when it changed
#[derive(Default)]
struct TextRenderer {
    last: String,
}

impl Renderer for TextRenderer {
    fn render(&mut self, view: &DeckView) {
        let mut out = String::new();
        for (row, record) in view.instances.iter().enumerate() {
            let conversation = record
                .external_session_id
                .as_ref()
                .map_or("-", |id| id.as_str());
            out.push_str(&format!(
                "{:>3}  {:<8}  {:<8}  {:<24}  {}  {}\n",
                row + 1,
                record.status.to_string(),
                record.tool.to_string(),
                record.title,
                record.project_path.display(),
                conversation,
            ));
        }
        if let Some(error) = &view.latest_error {
            out.push_str(&format!("! {error}\n"));
        }
        if view.watch_mode == Some(kodegen_agent_deck::WatchMode::Degraded) {
            out.push_str("(activity watcher degraded: polling only)\n");
        }
        if out != self.last {
            print!("{out}");
            println!("--");
            self.last = out;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = DeckOptions::from_env()?;
    let mux = Arc::new(TmuxMultiplexer::new(options.tmux_binary.clone()));
    mux.check_available().await?;

    let store = JsonFileStore::new(options.state_file.clone());
    let records = store.load()?;
    log::info!("Loaded {} instances from {}", records.len(), store.path().display());

    let default_tool = options.default_tool;
    let (deck, inbox) = Deck::builder(mux, options).records(records).build();
    let registry = Arc::clone(deck.registry());
    let lifecycle = Arc::clone(deck.lifecycle());
    let driver = ForegroundDriver::new(deck, inbox, Box::new(store), TextRenderer::default());

    let (command_tx, command_rx) = mpsc::channel(16);
    tokio::spawn(read_commands(command_tx, registry, lifecycle, default_tool));
    println!("{HELP}");

    driver.run(command_rx).await?;
    Ok(())
}

async fn read_commands(
    commands: mpsc::Sender<DriverCommand>,
    registry: Arc<Registry>,
    lifecycle: Arc<LifecycleManager<TmuxMultiplexer>>,
    default_tool: Tool,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("Reading commands failed: {e}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "help" {
            println!("{HELP}");
            continue;
        }

        let command = match parse_command(line, &registry, default_tool) {
            Ok(command) => command,
            Err(e) => {
                println!("? {e}");
                continue;
            }
        };
        let attaching = matches!(command, DriverCommand::Run(Operation::Attach(_)));
        if commands.send(command).await.is_err() {
            break;
        }
        // The terminal belongs to tmux until the hand-off ends; stop reading.
        if attaching {
            wait_for_handoff(&lifecycle).await;
        }
    }
    let _ = commands.send(DriverCommand::Quit).await;
}

async fn wait_for_handoff<M: Multiplexer>(lifecycle: &LifecycleManager<M>) {
    let started = tokio::time::Instant::now();
    while !lifecycle.is_transitioning() {
        if started.elapsed() > Duration::from_secs(2) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    while lifecycle.is_transitioning() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn parse_command(line: &str, registry: &Registry, default_tool: Tool) -> Result<DriverCommand> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default();
    let rest: Vec<&str> = words.collect();

    let row = |i: usize| -> Result<InstanceId> {
        let reference = rest.get(i).ok_or_else(|| anyhow!("missing row"))?;
        resolve(registry, reference)
    };
    let text_from = |i: usize| rest.get(i..).map(|w| w.join(" ")).unwrap_or_default();

    let command = match verb {
        "new" => {
            let (tool, at) = match rest.first().map(|w| w.parse::<Tool>()) {
                Some(Ok(tool)) if rest.len() > 1 => (tool, 1),
                _ => (default_tool, 0),
            };
            let path = rest.get(at).ok_or_else(|| anyhow!("missing path"))?;
            let path = PathBuf::from(path);
            let mut title = text_from(at + 1);
            if title.is_empty() {
                title = path
                    .file_name()
                    .map_or_else(|| "session".to_string(), |n| n.to_string_lossy().into_owned());
            }
            DriverCommand::Run(Operation::Create(NewInstance::new(title, path, tool)))
        }
        "start" => DriverCommand::Run(Operation::Start(row(0)?)),
        "attach" => DriverCommand::Run(Operation::Attach(row(0)?)),
        "restart" => DriverCommand::Run(Operation::Restart(row(0)?)),
        "kill" => DriverCommand::Run(Operation::Kill(row(0)?)),
        "redetect" => DriverCommand::Run(Operation::RedetectIdentity(row(0)?)),
        "fork" => {
            let source = row(0)?;
            let title = text_from(1);
            let title = if title.is_empty() { "fork".to_string() } else { title };
            DriverCommand::Run(Operation::Fork {
                source,
                title,
                group_path: String::new(),
            })
        }
        "import" => {
            let name = rest.first().ok_or_else(|| anyhow!("missing session"))?;
            let tool = rest.get(1).ok_or_else(|| anyhow!("missing tool"))?.parse::<Tool>()?;
            let path = rest.get(2).ok_or_else(|| anyhow!("missing path"))?;
            DriverCommand::Run(Operation::Import {
                name: MuxSessionName::new(*name),
                tool,
                title: text_from(3),
                project_path: PathBuf::from(path),
            })
        }
        "send" => DriverCommand::Run(Operation::SendText {
            id: row(0)?,
            text: text_from(1),
        }),
        "select" => DriverCommand::Select(row(0)?),
        "scroll" => {
            let number = |i: usize| -> Result<usize> {
                Ok(rest.get(i).ok_or_else(|| anyhow!("missing number"))?.parse::<usize>()?)
            };
            DriverCommand::Scroll {
                offset: number(0)?,
                size: number(1)?,
            }
        }
        "dedup" => DriverCommand::Deduplicate,
        "refresh" => DriverCommand::Refresh,
        "quit" | "exit" => DriverCommand::Quit,
        other => return Err(anyhow!("unknown command '{other}' (try 'help')")),
    };
    Ok(command)
}

/// A 1-based row number or an instance id prefix
fn resolve(registry: &Registry, reference: &str) -> Result<InstanceId> {
    let ids = registry.ids();
    if let Ok(row) = reference.parse::<usize>() {
        return row
            .checked_sub(1)
            .and_then(|i| ids.get(i).cloned())
            .ok_or_else(|| anyhow!("no row {row}"));
    }
    let mut matches = ids.into_iter().filter(|id| id.as_str().starts_with(reference));
    match (matches.next(), matches.next()) {
        (Some(id), None) => Ok(id),
        (Some(_), Some(_)) => Err(anyhow!("'{reference}' is ambiguous")),
        (None, _) => Err(anyhow!("no instance '{reference}'")),
    }
}
