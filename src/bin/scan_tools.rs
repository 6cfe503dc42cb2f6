//! SCAN Data Tools
//!
//! ## Usage
//!
//! ```bash
//! # Split IN:/OUT: lines into parallel source and target files
//! cargo run --bin scan_tools -- split --input  < tasks_train.txt > train.src
//! cargo run --bin scan_tools -- split --output < tasks_train.txt > train.tgt
//!
//! # Append primitive-word hints to source lines
//! cargo run --bin scan_tools -- annotate train.src > train.hinted.src
//!
//! # Replace W_* placeholders in predictions and score against a reference
//! cargo run --bin scan_tools -- fill-back pred.txt word_maps.json --reference test.tgt
//!
//! # Line-level exact match between two files
//! cargo run --bin scan_tools -- check test.tgt pred.txt
//! ```

use clap::{ArgGroup, Parser, Subcommand};
use std::io::Read;
use tokenfill::scan::{
    annotate_source, default_actions, default_hints, fill_back_lines, load_word_maps,
    paired_lines, read_raw_lines, split_scan_lines, LineMatch, ScanSide,
};

#[derive(Parser)]
#[command(name = "scan_tools", about = "Prepare SCAN data and check predictions")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print one side of every `IN: ... OUT: ...` line
    #[command(group(ArgGroup::new("side").required(true).args(["input", "output"])))]
    Split {
        /// Keep the command half
        #[arg(long)]
        input: bool,

        /// Keep the action half
        #[arg(long)]
        output: bool,

        /// Read from this file instead of stdin
        file: Option<String>,
    },

    /// Append ` || word -> ACTION, ...` hints to each source line
    Annotate {
        /// Read from this file instead of stdin
        file: Option<String>,
    },

    /// Replace W_* placeholders through per-line word maps
    FillBack {
        /// Prediction file, one line per example
        predictions: String,

        /// JSON array with one word map object per prediction line
        word_maps: String,

        /// Print each filled line above its reference line, then score them
        #[arg(long)]
        reference: Option<String>,
    },

    /// Count exactly matching lines between a reference and a prediction file
    Check {
        reference: String,
        predictions: String,
    },
}

fn read_input(file: Option<&str>) -> std::io::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Command::Split { input, file, .. } => {
            let side = if input { ScanSide::Input } else { ScanSide::Output };
            let text = read_input(file.as_deref())?;
            for part in split_scan_lines(&text, side) {
                println!("{}", part);
            }
        }
        Command::Annotate { file } => {
            let hints = default_hints();
            let text = read_input(file.as_deref())?;
            for line in text.lines() {
                println!("{}", annotate_source(line, &hints));
            }
        }
        Command::FillBack {
            predictions,
            word_maps,
            reference,
        } => {
            let lines = read_raw_lines(&predictions)?;
            let maps = load_word_maps(&word_maps)?;
            let filled = fill_back_lines(&lines, &maps, &default_actions())?;
            match reference {
                Some(reference) => {
                    let reference = read_raw_lines(&reference)?;
                    print!("{}", paired_lines(&filled, &reference));
                    let result = LineMatch::compare(&reference, &filled);
                    println!("{} {} {:.2}", result.matched, result.total, result.accuracy());
                }
                None => {
                    for line in filled {
                        println!("{}", line);
                    }
                }
            }
        }
        Command::Check {
            reference,
            predictions,
        } => {
            let result =
                LineMatch::compare(&read_raw_lines(&reference)?, &read_raw_lines(&predictions)?);
            for (original, predicted) in &result.mismatches {
                println!("MISMATCH : ORIGINAL : {} \t || \t PRED : {}", original, predicted);
            }
            println!("{}", result);
        }
    }

    Ok(())
}
