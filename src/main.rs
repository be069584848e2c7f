use std::io::{stdin, stdout, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::Verbosity;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use engine48::engine::{Cell, Direction, GRID_SIZE};
use engine48::{
    Event, EventBus, EventSender, EventSource, JsonFileStore, Presenter, PresenterConfig,
    SessionSnapshot, StateSink, UiState,
};

/// Play 2048 one command per line: w/a/s/d to move, u to undo, n for a new game, q to quit.
#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    verbose: Verbosity,

    /// Where the resumable game is saved.
    #[arg(long, default_value = "./engine48.json")]
    save_file: PathBuf,

    /// Keep the whole session, undo history included, in this file between runs.
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Number of moves that can be undone.
    #[arg(long, default_value_t = engine48::engine::DEFAULT_MAX_UNDO_DEPTH)]
    undo_depth: usize,

    /// Seed for tile spawns.
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value = "./output.log")]
    log_file: PathBuf,
}

enum Command {
    Event(Event),
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let event = match line.trim().to_lowercase().as_str() {
        "w" | "k" | "north" | "up" => Event::Move(Direction::North),
        "s" | "j" | "south" | "down" => Event::Move(Direction::South),
        "d" | "l" | "east" | "right" => Event::Move(Direction::East),
        "a" | "h" | "west" | "left" => Event::Move(Direction::West),
        "u" | "undo" => Event::Undo,
        "n" | "new" => Event::StartNewGame,
        "r" | "load" => Event::Load,
        "q" | "quit" => return Some(Command::Quit),
        _ => return None,
    };
    Some(Command::Event(event))
}

/// Prints every emitted state as plain text.
struct TextSink<W: Write> {
    w: W,
    can_undo: bool,
}

impl<W: Write> StateSink for TextSink<W> {
    fn emit(&mut self, state: &UiState) -> engine48::Result<()> {
        match state {
            UiState::Nothing => {}
            UiState::Loading => writeln!(self.w, "loading...")?,
            UiState::Ready(state) => {
                // merged tiles are listed after the tiles that slid into them
                let mut board = [[None; GRID_SIZE]; GRID_SIZE];
                for movement in &state.movements {
                    let Cell { row, col } = movement.to.cell;
                    board[row][col] = Some(movement.to.tile.num());
                }
                writeln!(
                    self.w,
                    "score {}  best {}",
                    state.current_score, state.best_score
                )?;
                for row in board.iter() {
                    for slot in row.iter() {
                        match slot {
                            Some(num) => write!(self.w, "{:>6}", num)?,
                            None => write!(self.w, "{:>6}", ".")?,
                        }
                    }
                    writeln!(self.w)?;
                }
                if state.is_game_over {
                    writeln!(self.w, "game over! n for a new game")?;
                }
                self.can_undo = state.can_undo;
            }
        }
        self.w.flush()?;
        Ok(())
    }
}

fn read_session(path: &Path) -> Result<Option<SessionSnapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading session file {}", path.display()))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

fn read_commands(sender: EventSender) {
    for line in stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("reading stdin: {}", e);
                break;
            }
        };
        match parse_command(&line) {
            Some(Command::Event(event)) => {
                if sender.send(event).is_err() {
                    break;
                }
            }
            Some(Command::Quit) => break,
            None => log::debug!("ignoring input {:?}", line),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}",
                record.level(),
                record.target(),
                message,
            ))
        })
        .level(cli.verbose.log_level_filter())
        .chain(fern::log_file(&cli.log_file)?)
        .apply()?;

    let config = PresenterConfig {
        max_undo_depth: cli.undo_depth,
        ..PresenterConfig::default()
    };
    let rng: Box<dyn RngCore> = match cli.seed {
        Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
        None => Box::new(StdRng::from_entropy()),
    };
    let store = JsonFileStore::new(&cli.save_file);

    let session = match &cli.session_file {
        Some(path) => read_session(path)?,
        None => None,
    };
    let mut presenter = match session {
        Some(session) => Presenter::restore(session, config, store, rng)?,
        None => Presenter::new(config, store, rng)?,
    };

    let (sender, bus) = EventBus::new();
    sender.send(Event::Load)?;
    let mut sink = TextSink {
        w: stdout().lock(),
        can_undo: false,
    };

    std::thread::spawn(move || read_commands(sender));

    while let Some(event) = bus.next_event()? {
        if event == Event::Undo && !sink.can_undo {
            writeln!(sink.w, "nothing to undo")?;
            continue;
        }
        presenter.handle(event, &mut sink)?;
    }

    presenter.flush()?;
    if let (Some(path), Some(session)) = (&cli.session_file, presenter.export()) {
        std::fs::write(path, serde_json::to_vec(&session)?)
            .with_context(|| format!("writing session file {}", path.display()))?;
        log::info!("session saved to {}", path.display());
    }

    Ok(())
}
