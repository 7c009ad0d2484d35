//! Terminal front end for labeling a frame directory.
//!
//! Reads one command per line and issues the same edits a GUI would: digits
//! set values, `n`/`p` navigate, `play` advances on a timer. Commands typed
//! while playing are handled between frames.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use clap::Parser;
use frame_labeler::config::LabelerConfig;
use frame_labeler::persist::load_or_default;
use frame_labeler::playback::Playback;
use frame_labeler::{
    AutoSaver, ExistingLabels, FrameSource, LabelMode, Labeler, Session, Value,
};

#[derive(Parser, Debug)]
#[command(
    name = "frame-labeler",
    version,
    about = "Label frame properties (1-9) across an image sequence"
)]
struct Args {
    /// Directory containing frame images
    directory: PathBuf,

    /// Property to label (e.g. 'motion', 'quality'). Prompted when omitted
    #[arg(long)]
    property: Option<String>,

    /// Base playback frames per second
    #[arg(long)]
    fps: Option<f64>,

    /// Label file, defaults to <directory>/labels.json
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Labeling discipline for the property
    #[arg(long, value_enum)]
    mode: Option<LabelMode>,

    /// What to do with labels the property already has. Prompted when omitted
    #[arg(long, value_enum)]
    existing: Option<ExistingLabels>,

    /// Config file, defaults to the user config directory
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, PartialEq)]
enum Command {
    /// Bare digit: toggle in the session's mode
    Press(Value),
    Set(Value),
    Clear,
    Next,
    Prev,
    Seek(usize),
    Play(Option<usize>),
    Faster,
    Slower,
    Map(Value, String),
    Save,
    Help,
    Quit,
}

fn parse_value(raw: &str) -> Result<Value, String> {
    let raw: i64 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    Value::new(raw).map_err(|e| e.to_string())
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word {
        "" | "n" | "next" => Command::Next,
        "p" | "prev" => Command::Prev,
        "c" | "clear" => Command::Clear,
        "s" | "save" => Command::Save,
        "q" | "quit" | "exit" => Command::Quit,
        "d" | "+" => Command::Faster,
        "a" | "-" => Command::Slower,
        "?" | "h" | "help" => Command::Help,
        "set" => Command::Set(parse_value(rest)?),
        "g" | "goto" => {
            let frame: usize = rest
                .parse()
                .map_err(|_| format!("'{rest}' is not a frame number"))?;
            if frame == 0 {
                return Err("Frame numbers start at 1".to_owned());
            }
            Command::Seek(frame - 1)
        }
        "play" => match rest {
            "" => Command::Play(None),
            count => Command::Play(Some(
                count
                    .parse()
                    .map_err(|_| format!("'{count}' is not a frame count"))?,
            )),
        },
        "map" => {
            let (value, meaning) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            Command::Map(parse_value(value)?, meaning.trim().to_owned())
        }
        digits if digits.chars().all(|c| c.is_ascii_digit()) => {
            Command::Press(parse_value(digits)?)
        }
        other => return Err(format!("Unknown command '{other}', type ? for help")),
    };
    Ok(command)
}

fn print_help(mode: LabelMode) {
    println!("Controls:");
    match mode {
        LabelMode::Exclusive => {
            println!("  1-9          Set value for current frame (again to remove)")
        }
        LabelMode::Multi => println!("  1-9          Toggle value on current frame"),
    }
    println!("  set <v>      Replace the current frame's label with <v>");
    println!("  n / Enter    Next frame (inherits the previous label)");
    println!("  p            Previous frame");
    println!("  g <frame>    Go to frame number");
    println!("  play [n]     Play to the end, or n frames (Enter pauses,");
    println!("               values and c still apply while playing)");
    println!("  d / a        Speed up / slow down playback");
    println!("  c            Clear current frame");
    println!("  map <v> <m>  Set the meaning of value v (empty to remove)");
    println!("  s            Save labels");
    println!("  q            Quit");
}

fn print_status(labeler: &Labeler) {
    let label = match labeler.current_label() {
        Some(label) if labeler.current_is_explicit() => labeler.describe(label),
        Some(label) => format!("{} (inherited)", labeler.describe(label)),
        None => "[]".to_owned(),
    };
    println!(
        "Frame {}/{} | {} | {}: {}",
        labeler.index() + 1,
        labeler.len(),
        labeler.current_frame(),
        labeler.session().property(),
        label
    );
}

fn print_mappings(labeler: &Labeler) {
    let property = labeler.session().property();
    match labeler.store().mappings().get(property) {
        Some(mappings) if !mappings.is_empty() => {
            println!("Value meanings for '{property}':");
            for (value, meaning) in mappings {
                println!("  {value}: {meaning}");
            }
        }
        _ => println!("No value meanings for '{property}' yet, add them with: map <v> <meaning>"),
    }
}

/// Stdin lines, read on a background thread so playback can poll for
/// commands between frames.
struct Input {
    lines: Receiver<io::Result<String>>,
}

enum Polled {
    Line(String),
    Idle,
    Closed,
}

impl Input {
    fn spawn(mut reader: impl BufRead + Send + 'static) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            loop {
                let mut line = String::new();
                let message = match reader.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => Ok(line.trim().to_owned()),
                    Err(e) => Err(e),
                };
                let failed = message.is_err();
                if tx.send(message).is_err() || failed {
                    break;
                }
            }
        });
        Self { lines: rx }
    }

    /// Next line, `None` once input is closed.
    fn line(&self) -> Result<Option<String>> {
        match self.lines.recv() {
            Ok(line) => Ok(Some(line?)),
            Err(_) => Ok(None),
        }
    }

    fn poll(&self, timeout: Duration) -> Result<Polled> {
        match self.lines.recv_timeout(timeout) {
            Ok(line) => Ok(Polled::Line(line?)),
            Err(RecvTimeoutError::Timeout) => Ok(Polled::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(Polled::Closed),
        }
    }

    fn prompt(&self, message: &str) -> Result<Option<String>> {
        print!("{message}");
        io::stdout().flush()?;
        self.line()
    }
}

fn prompt_property(input: &Input) -> Result<String> {
    println!("Enter a name for the property you want to label");
    println!("Examples: 'motion', 'quality', 'person', 'action'");
    let name = input.prompt("Property name: ")?.unwrap_or_default();
    if name.is_empty() {
        println!("Using default property name: default");
        return Ok("default".to_owned());
    }
    Ok(name)
}

/// `None` when the user cancels.
fn prompt_existing(input: &Input, property: &str, count: usize) -> Result<Option<ExistingLabels>> {
    println!("Found existing property '{property}' in {count} frames.");
    println!("  1. Keep existing - add to and modify existing values");
    println!("  2. Replace all - clear all existing values for this property");
    println!("  3. Cancel - exit without changes");
    loop {
        let Some(choice) = input.prompt("Choose option (1/2/3) [default: 1]: ")? else {
            return Ok(None);
        };
        match choice.as_str() {
            "" | "1" => return Ok(Some(ExistingLabels::Keep)),
            "2" => return Ok(Some(ExistingLabels::Replace)),
            "3" => return Ok(None),
            _ => println!("Invalid choice. Please enter 1, 2, or 3."),
        }
    }
}

fn report(labeler: &Labeler, result: frame_labeler::Result<()>) {
    match result {
        Ok(()) => print_status(labeler),
        Err(e) => eprintln!("Error: {e}"),
    }
}

/// Advances on the playback timer until paused, the limit is reached or the
/// sequence ends. Edits and speed changes apply to the frame on screen
/// without stopping; any other command pauses and is handed back to run.
fn play(
    labeler: &mut Labeler,
    playback: &mut Playback,
    input: &Input,
    limit: Option<usize>,
) -> Result<Option<Command>> {
    playback.toggle();
    println!("Playback started at {:.1}x, Enter pauses", playback.speed());
    let mut advanced = 0;
    let mut queued = None;
    let mut next_tick = Instant::now() + playback.interval();

    while playback.is_playing() {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match input.poll(wait)? {
            Polled::Idle => {
                next_tick = Instant::now() + playback.interval();
                match playback.tick(|| labeler.next()) {
                    Ok(true) => {
                        advanced += 1;
                        print_status(labeler);
                        if limit.is_some_and(|limit| advanced >= limit) {
                            playback.pause();
                        }
                    }
                    Ok(false) => println!("Reached end of frames"),
                    Err(e) => {
                        eprintln!("Could not save labels: {e}");
                        playback.pause();
                    }
                }
            }
            Polled::Closed => {
                playback.pause();
                queued = Some(Command::Quit);
            }
            Polled::Line(line) => match parse_command(&line) {
                Ok(Command::Press(value)) => {
                    let result = labeler.toggle(value);
                    report(labeler, result);
                }
                Ok(Command::Set(value)) => {
                    let result = labeler.set(value);
                    report(labeler, result);
                }
                Ok(Command::Clear) => {
                    let result = labeler.clear();
                    report(labeler, result);
                }
                Ok(Command::Faster) => println!("Playback speed: {:.1}x", playback.speed_up()),
                Ok(Command::Slower) => println!("Playback speed: {:.1}x", playback.slow_down()),
                Ok(Command::Next | Command::Play(_)) => playback.pause(),
                Ok(other) => {
                    playback.pause();
                    queued = Some(other);
                }
                Err(message) => println!("{message}"),
            },
        }
    }
    println!("Playback paused");
    Ok(queued)
}

fn run(labeler: &mut Labeler, playback: &mut Playback, input: &Input) -> Result<()> {
    print_status(labeler);
    let mut queued = None;
    loop {
        let command = match queued.take() {
            Some(command) => command,
            None => {
                let Some(line) = input.prompt("> ")? else {
                    return Ok(());
                };
                match parse_command(&line) {
                    Ok(command) => command,
                    Err(message) => {
                        println!("{message}");
                        continue;
                    }
                }
            }
        };

        let result = match command {
            Command::Quit => return Ok(()),
            Command::Help => {
                print_help(labeler.session().mode());
                continue;
            }
            Command::Play(limit) => {
                queued = play(labeler, playback, input, limit)?;
                continue;
            }
            Command::Press(value) => labeler.toggle(value),
            Command::Set(value) => labeler.set(value),
            Command::Clear => labeler.clear(),
            Command::Next => labeler.next().map(|moved| {
                if !moved {
                    println!("Already at the last frame");
                }
            }),
            Command::Prev => {
                if !labeler.prev() {
                    println!("Already at the first frame");
                }
                Ok(())
            }
            Command::Seek(index) => labeler.seek(index),
            Command::Faster => {
                println!("Playback speed: {:.1}x", playback.speed_up());
                Ok(())
            }
            Command::Slower => {
                println!("Playback speed: {:.1}x", playback.slow_down());
                Ok(())
            }
            Command::Map(value, meaning) => labeler
                .set_meaning(value, &meaning)
                .map(|()| print_mappings(labeler)),
            Command::Save => labeler.save(),
        };
        report(labeler, result);
    }
}

/// Runs the command loop, then writes whatever is still pending, even when
/// the loop failed. The loop's error is returned after the final save.
fn run_to_close(mut labeler: Labeler, playback: &mut Playback, input: &Input) -> Result<()> {
    let outcome = run(&mut labeler, playback, input);
    loop {
        match labeler.close() {
            Ok(_) => {
                println!("Labels saved. Goodbye!");
                return outcome;
            }
            Err((returned, e)) => {
                eprintln!("Could not save labels: {e}");
                let retry = input
                    .prompt("Retry? [Y/n]: ")
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| "n".into());
                if retry.eq_ignore_ascii_case("n") {
                    return Err(outcome
                        .err()
                        .unwrap_or_else(|| anyhow!("Exiting with unsaved labels")));
                }
                labeler = returned;
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => LabelerConfig::load_from(path),
        None => LabelerConfig::load(),
    };

    if !args.directory.is_dir() {
        bail!("Directory not found: {}", args.directory.display());
    }
    let frames = FrameSource::scan(&args.directory)?;
    let input = Input::spawn(io::BufReader::new(io::stdin()));

    let property = match args.property {
        Some(property) => property,
        None => prompt_property(&input)?,
    };
    let labels_path = args
        .labels
        .unwrap_or_else(|| config.labels_path(&args.directory));
    let mut store = load_or_default(&labels_path)?;

    let existing_count = store.frames_with_property(&property);
    let existing = match (existing_count, args.existing) {
        (0, _) => ExistingLabels::Keep,
        (_, Some(choice)) => choice,
        (count, None) => match prompt_existing(&input, &property, count)? {
            Some(choice) => choice,
            None => {
                println!("Cancelled, no changes made");
                return Ok(());
            }
        },
    };

    let mode = args.mode.unwrap_or(config.mode);
    let session = Session::open(&mut store, property, mode, existing);
    let saver = AutoSaver::new(&labels_path, config.autosave_debounce);
    let labeler = Labeler::open(frames, store, session, saver)?;
    let mut playback = Playback::new(args.fps.unwrap_or(config.fps), config.speeds.clone());

    println!("Labeling '{}' into {}", labeler.session().property(), labels_path.display());
    print_help(mode);
    print_mappings(&labeler);

    run_to_close(labeler, &mut playback, &input)
}
