//! Evaluate a Sequence-to-Sequence Checkpoint
//!
//! Greedily decodes every source line of a test pair and reports token-level
//! accuracy against the target lines.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin evaluate -- --model seq2seq.ckpt --src test.src --tgt test.tgt
//!
//! # Print input / prediction / target for every example and keep the
//! # predictions for scan_tools fill-back
//! cargo run --release --bin evaluate -- --model seq2seq.ckpt \
//!     --src test.src --tgt test.tgt --verbose --predictions pred.txt
//! ```

use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use tokenfill::models::SourceBagTranslator;
use tokenfill::{evaluate_seq2seq, Checkpoint, EvalOptions, ParallelCorpus};

#[derive(Parser)]
#[command(name = "evaluate", about = "Token-level accuracy of a seq2seq checkpoint")]
struct Args {
    /// Seq2seq checkpoint
    #[arg(long)]
    model: String,

    /// Source side of the test corpus
    #[arg(long)]
    src: String,

    /// Target side of the test corpus
    #[arg(long)]
    tgt: String,

    /// Print input, prediction and target for every example
    #[arg(long)]
    verbose: bool,

    /// Write one predicted line per example to this file
    #[arg(long)]
    predictions: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let checkpoint: Checkpoint<SourceBagTranslator> = Checkpoint::load(&args.model)?;
    let src_vocab = checkpoint
        .src_vocab
        .clone()
        .ok_or("Checkpoint does not contain a source vocabulary")?;
    let tgt_vocab = checkpoint
        .tgt_vocab
        .clone()
        .ok_or("Checkpoint does not contain a target vocabulary")?;

    let corpus = ParallelCorpus::from_files_with_vocabs(&args.src, &args.tgt, src_vocab, tgt_vocab)?;
    println!("Loaded: {} ({} examples)", args.model, corpus.examples.len());

    let options = EvalOptions {
        verbose: args.verbose || args.predictions.is_some(),
    };
    let report = evaluate_seq2seq(&checkpoint.model, &corpus, &options)?;

    if args.verbose {
        for transcript in &report.transcripts {
            println!("{}\n", transcript);
        }
    }

    if let Some(path) = &args.predictions {
        let mut out = BufWriter::new(File::create(path)?);
        for transcript in &report.transcripts {
            writeln!(out, "{}", transcript.prediction.join(" "))?;
        }
        out.flush()?;
        println!("Predictions written to: {}", path);
    }

    println!("Unknown tokens ({})", report.unk);
    println!(
        "Exact matches: {}/{}",
        report.exact_matches, report.examples
    );
    println!(
        "Tokens: {}/{} correct",
        report.matches, report.reference_tokens
    );
    println!("Accuracy: {:.2}%", report.accuracy * 100.0);

    Ok(())
}
