//! Command-line front end for the block interpreter.
//!
//! Reads generated text, runs the first recognized block, and prints the
//! handler output. State (script bindings, memory tree) persists under
//! `.interp/` between invocations.

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use interp::exit_codes;
use interp::io::config::{DEFAULT_CONFIG_PATH, load_config};
use interp::logging;
use interp::runtime::{InitOptions, Runtime, init_workspace};
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "interp",
    version,
    about = "Run instructions embedded in generated text"
)]
struct Cli {
    /// Config file; missing means defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the config and an empty memory tree if missing.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the first recognized block; exits 2 when the loop should wait for the user.
    Dispatch {
        /// Read text from this file instead of stdin.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Print a script binding as JSON.
    Get { name: String },
    /// Set a script binding from a JSON value.
    Set { name: String, json: String },
    /// Print instructions for every handler.
    Prompt,
    /// Print the memory tree outline, or work through plan steps.
    Memory {
        /// Print the next unfinished plan step as `<id> <text>`.
        #[arg(long, conflicts_with_all = ["done", "related"])]
        next: bool,
        /// Mark node ID as done.
        #[arg(long, value_name = "ID", conflicts_with = "related")]
        done: Option<usize>,
        /// Print the messages leading up to node ID.
        #[arg(long, value_name = "ID")]
        related: Option<usize>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    if let Command::Init { force } = cli.command {
        init_workspace(
            &std::env::current_dir().context("resolve current directory")?,
            &cli.config,
            &InitOptions { force },
        )?;
        return Ok(exit_codes::OK);
    }

    let config = load_config(&cli.config)?;
    let mut runtime = Runtime::open(&config)?;
    match cli.command {
        Command::Init { .. } => Ok(exit_codes::OK),
        Command::Dispatch { file } => {
            let text = read_input(file)?;
            let result = runtime.dispatch(&text);
            debug!(handler = ?result.handler, stop = result.stop, "dispatch finished");
            print!("{}", result.output);
            if !result.output.is_empty() && !result.output.ends_with('\n') {
                println!();
            }
            Ok(if result.stop {
                exit_codes::STOP
            } else {
                exit_codes::OK
            })
        }
        Command::Get { name } => {
            let value = runtime.get(&name)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&value.to_json()).context("serialize value")?
            );
            Ok(exit_codes::OK)
        }
        Command::Set { name, json } => {
            runtime.set_json(&name, &json)?;
            Ok(exit_codes::OK)
        }
        Command::Prompt => {
            println!("{}", runtime.prompt()?);
            Ok(exit_codes::OK)
        }
        Command::Memory {
            next,
            done,
            related,
        } => {
            if next {
                if let Some(step) = runtime.next_todo() {
                    println!("{step}");
                }
            } else if let Some(id) = done {
                runtime.complete(id)?;
            } else if let Some(id) = related {
                print!("{}", runtime.related(id)?);
            } else {
                print!("{}", runtime.memory_outline());
            }
            Ok(exit_codes::OK)
        }
    }
}

fn read_input(file: Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) => {
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
        }
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("read stdin")?;
            Ok(text)
        }
    }
}
