//! Sample Text from a Trained Language Model
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin generate -- --model lm.ckpt --prompt "the king"
//! cargo run --release --bin generate -- --model lm.ckpt --length 40 --temperature 0.8
//! ```

use clap::Parser;
use tokenfill::models::ContextBagLm;
use tokenfill::{generate_text, Checkpoint, DecodeOptions};

#[derive(Parser)]
#[command(name = "generate", about = "Sample text from a trained language model")]
struct Args {
    /// Language-model checkpoint
    #[arg(long)]
    model: String,

    /// Whitespace-tokenized prompt; empty starts from the first vocabulary word
    #[arg(long, default_value = "")]
    prompt: String,

    /// Number of tokens to append
    #[arg(long, default_value = "20")]
    length: usize,

    /// Sampling temperature (> 0)
    #[arg(long, default_value = "1.0")]
    temperature: f32,

    #[arg(long, default_value = "42")]
    seed: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let checkpoint: Checkpoint<ContextBagLm> = Checkpoint::load(&args.model)?;
    let vocab = checkpoint
        .vocab
        .as_ref()
        .ok_or("Checkpoint does not contain a vocabulary")?;
    println!("Loaded: {} ({})", args.model, vocab.stats());

    let options = DecodeOptions {
        length: args.length,
        temperature: args.temperature,
        seed: args.seed,
    };
    let text = generate_text(&checkpoint.model, vocab, &args.prompt, &options)?;

    println!("\"{}\" (t={}):", args.prompt, args.temperature);
    println!("  {}", text);

    Ok(())
}
