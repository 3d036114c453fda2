//! Runs the agent on tasks given as arguments or read from stdin.

#[macro_use]
extern crate tracing;

use std::io::{IsTerminal, Write as _};
use std::path::PathBuf;
use std::pin::pin;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::select;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;
use unit4_agent::core::AgentEvent;
use unit4_agent::config::ConfigError;
use unit4_agent::core::memory::Step;
use unit4_agent::{Config, Session, SessionBuilder};

const BAR_CHAR: &str = "▎";
const MAX_OBSERVATION_CHARS: usize = 500;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path of the config file [default: unit4-agent.toml, if it exists]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model id, overrides `model.id` of the config
    #[arg(short, long)]
    model: Option<String>,

    /// Maximum number of steps, overrides `agent.max_steps` of the config
    #[arg(long)]
    max_steps: Option<u32>,

    /// Tasks to run; without any, one task is read per line from stdin
    tasks: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {err}", "error:".bright_red().bold());
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.agent.verbosity);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let session = match SessionBuilder::from_config(&config) {
        Ok(builder) => builder
            .on_event(move |event| {
                event_tx.send(event).ok();
            })
            .build(),
        Err(err) => {
            eprintln!("{} {err}", "error:".bright_red().bold());
            return ExitCode::FAILURE;
        }
    };

    let mut printer = Printer::new(config.agent.verbosity);
    let mut all_succeeded = true;
    if cli.tasks.is_empty() {
        let interactive = std::io::stdin().is_terminal();
        let mut stdin = BufReader::new(io::stdin()).lines();
        loop {
            if interactive {
                print!("> ");
                std::io::stdout().flush().ok();
            }
            let Some(line) = read_line(&mut stdin).await else {
                break;
            };
            let task = line.trim();
            if task.is_empty() {
                continue;
            }
            all_succeeded &=
                run_task(&session, task, &mut event_rx, &mut printer).await;
        }
    } else {
        for task in &cli.tasks {
            all_succeeded &=
                run_task(&session, task, &mut event_rx, &mut printer).await;
        }
    }

    if all_succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(model) = &cli.model {
        config.model.id = model.clone();
    }
    if let Some(max_steps) = cli.max_steps {
        config.agent.max_steps = max_steps;
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(verbosity: u8) {
    let default_directive = if verbosity == 0 { "error" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs one task, printing its progress. Returns `false` if it failed.
async fn run_task(
    session: &Session,
    task: &str,
    event_rx: &mut UnboundedReceiver<AgentEvent>,
    printer: &mut Printer,
) -> bool {
    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    let mut run = pin!(session.run(task));
    let mut progress_bar: Option<ProgressBar> = None;

    let result = loop {
        // Create a new progress bar if it has been finished.
        progress_bar
            .get_or_insert_with(|| {
                let progress_bar = ProgressBar::new_spinner();
                progress_bar.set_style(progress_style.clone());
                progress_bar.set_message("🤔 Thinking...");
                progress_bar
            })
            .inc(1);

        let sleep = sleep(Duration::from_millis(100));
        select! {
            result = &mut run => break result,
            Some(event) = event_rx.recv() => {
                let Some(text) = printer.render(event) else {
                    continue;
                };
                // Finish the progress bar before printing anything else.
                if let Some(progress_bar) = progress_bar.take() {
                    progress_bar.finish_and_clear();
                }
                println!("{text}");
            }
            _ = sleep => {}
        }
    };
    if let Some(progress_bar) = progress_bar.take() {
        progress_bar.finish_and_clear();
    }
    while let Ok(event) = event_rx.try_recv() {
        if let Some(text) = printer.render(event) {
            println!("{text}");
        }
    }

    match result {
        Ok(outcome) => {
            let action_steps = outcome
                .steps
                .iter()
                .filter(|step| matches!(step, Step::Action(_)))
                .count();
            if printer.verbosity == 0 {
                println!("{}", outcome.answer);
                return true;
            }
            println!(
                "\n{}✅ {}",
                BAR_CHAR.bright_green(),
                outcome.answer.bright_white().bold()
            );
            if outcome.reached_max_steps {
                println!(
                    "{}",
                    "The step limit was reached, the answer was given \
                     without tools."
                        .yellow()
                );
            }
            println!(
                "{}",
                format!(
                    "{action_steps} steps, {} input tokens, {} output tokens",
                    outcome.usage.input_tokens, outcome.usage.output_tokens
                )
                .dimmed()
            );
            true
        }
        Err(err) => {
            eprintln!("{} {err}", "error:".bright_red().bold());
            false
        }
    }
}

/// Turns agent events into terminal output.
struct Printer {
    verbosity: u8,
    transcript: String,
}

impl Printer {
    fn new(verbosity: u8) -> Self {
        Self {
            verbosity,
            transcript: String::new(),
        }
    }

    fn render(&mut self, event: AgentEvent) -> Option<String> {
        let event = match event {
            AgentEvent::MessageDelta(delta) => {
                self.transcript.push_str(&delta);
                return None;
            }
            // The plan and the answer are printed in full on their own.
            AgentEvent::PlanningStep(_) | AgentEvent::FinalAnswer(_) => {
                self.transcript.clear();
                event
            }
            event => event,
        };
        let mut out = vec![];
        let transcript = std::mem::take(&mut self.transcript);
        let transcript = transcript.trim();
        if self.verbosity >= 2 && !transcript.is_empty() {
            out.push(format!(
                "{}🤖 {}",
                BAR_CHAR.bright_cyan(),
                transcript.bright_white()
            ));
        }

        match event {
            AgentEvent::PlanningStep(plan) if self.verbosity >= 2 => {
                out.push(format!("{}📝 Plan", BAR_CHAR.bright_magenta()));
                for line in plan.trim().lines() {
                    out.push(format!("{}{line}", BAR_CHAR.bright_magenta()));
                }
            }
            AgentEvent::StepStarted {
                step_number,
                max_steps,
            } if self.verbosity >= 1 => {
                let title = format!("Step {step_number}/{max_steps}");
                out.push(format!("\n{}", title.bold()));
            }
            AgentEvent::ToolCall(call) if self.verbosity >= 1 => {
                out.push(format!(
                    "{}🛠️  {}({})",
                    BAR_CHAR.bright_yellow(),
                    call.name.bright_white().bold(),
                    call.arguments
                ));
            }
            AgentEvent::Observation(observation) if self.verbosity >= 1 => {
                let content = truncate(&observation.content);
                for line in content.lines() {
                    out.push(format!("{}{}", BAR_CHAR.bright_black(), line));
                }
            }
            _ => {}
        }

        if out.is_empty() {
            None
        } else {
            Some(out.join("\n"))
        }
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_OBSERVATION_CHARS) {
        Some((end, _)) => format!("{}…", &text[..end]),
        None => text.to_owned(),
    }
}

async fn read_line(stdin: &mut Lines<BufReader<Stdin>>) -> Option<String> {
    match stdin.next_line().await {
        Ok(line) => line,
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
