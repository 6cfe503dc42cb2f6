//! Train a Word-Level Language Model
//!
//! Builds a vocabulary from a corpus, trains the context-bag language model
//! on fixed-length windows and saves a checkpoint that carries the
//! vocabulary.
//!
//! ## Usage
//!
//! ```bash
//! # Train with the default (small) preset
//! cargo run --release --bin train_lm -- --corpus train.txt
//!
//! # Hold out a validation corpus and log per-epoch metrics
//! cargo run --release --bin train_lm -- \
//!     --corpus train.txt --eval-corpus valid.txt --log lm_log.csv
//!
//! # Override preset parameters
//! cargo run --release --bin train_lm -- --corpus train.txt --preset tiny --epochs 20
//! ```

use clap::Parser;
use tokenfill::models::{BagLmConfig, ContextBagLm};
use tokenfill::scorer::Parameters;
use tokenfill::train::LanguageModeling;
use tokenfill::{
    generate_text, Checkpoint, DecodeOptions, LmCorpus, Trainer, TrainingConfig, TrainingLogger,
};

#[derive(Parser)]
#[command(name = "train_lm", about = "Train a word-level language model")]
struct Args {
    /// Training corpus (one sentence per line)
    #[arg(long)]
    corpus: String,

    /// Validation corpus, indexed with the training vocabulary
    #[arg(long)]
    eval_corpus: Option<String>,

    /// Named training preset (tiny or small)
    #[arg(long, default_value = "small")]
    preset: String,

    /// Window length in tokens
    #[arg(long)]
    seq_len: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    epochs: Option<usize>,

    /// AdamW learning rate
    #[arg(long)]
    lr: Option<f32>,

    /// Minimum token count for a vocabulary entry
    #[arg(long)]
    min_freq: Option<usize>,

    #[arg(long)]
    weight_decay: Option<f32>,

    /// Gradient clipping max norm (0 disables clipping)
    #[arg(long)]
    grad_clip: Option<f32>,

    /// Shuffle and initialization seed
    #[arg(long)]
    seed: Option<u64>,

    /// Checkpoint output path
    #[arg(long, default_value = "lm.ckpt")]
    output: String,

    /// Per-epoch CSV log
    #[arg(long)]
    log: Option<String>,

    /// Prompt for a sample generated after training
    #[arg(long, default_value = "")]
    sample_prompt: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // ========================================================================
    // Resolve configuration from preset + CLI overrides
    // ========================================================================
    let mut config = TrainingConfig::preset(&args.preset)?;
    if let Some(seq_len) = args.seq_len {
        config.seq_len = seq_len;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(epochs) = args.epochs {
        config.num_epochs = epochs;
    }
    if let Some(lr) = args.lr {
        config.learning_rate = lr;
    }
    if let Some(min_freq) = args.min_freq {
        config.min_freq = min_freq;
    }
    if let Some(weight_decay) = args.weight_decay {
        config.weight_decay = weight_decay;
    }
    if let Some(grad_clip) = args.grad_clip {
        config.grad_clip = grad_clip;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate()?;

    println!("\n{}", "=".repeat(70));
    println!("  Training language model (preset: {})", args.preset);
    println!("{}", "=".repeat(70));
    println!();

    // ========================================================================
    // 1. Load Corpus
    // ========================================================================
    println!("{}", "=".repeat(70));
    println!("1. Loading Corpus");
    println!("{}", "=".repeat(70));
    println!();

    let corpus = LmCorpus::from_file(&args.corpus, config.seq_len, config.min_freq)?;
    println!("Loaded: {} ({} lines)", args.corpus, corpus.num_lines);
    println!("{}", corpus.vocab.stats());
    println!(
        "Windows: {} of {} tokens ({} <unk>)",
        corpus.examples.len(),
        corpus.seq_len,
        corpus.unk_count
    );

    let validation = match &args.eval_corpus {
        Some(path) => {
            let val = LmCorpus::from_file_with_vocab(path, corpus.vocab.clone(), config.seq_len)?;
            println!(
                "Validation: {} ({} windows, {} <unk>)",
                path,
                val.examples.len(),
                val.unk_count
            );
            Some(val)
        }
        None => None,
    };

    // ========================================================================
    // 2. Model
    // ========================================================================
    println!("\n{}", "=".repeat(70));
    println!("2. Model");
    println!("{}", "=".repeat(70));
    println!();

    let mut model_config = BagLmConfig::new(corpus.vocab.len());
    model_config.seed = config.seed;
    let model = ContextBagLm::new(model_config);
    println!("  Vocabulary: {}", corpus.vocab.len());
    println!("  Parameters: {}", model.num_parameters());

    // ========================================================================
    // 3. Train
    // ========================================================================
    println!("\n{}", "=".repeat(70));
    println!("3. Training");
    println!("{}", "=".repeat(70));
    println!();

    println!("  Epochs: {}", config.num_epochs);
    println!("  Batch size: {}", config.batch_size);
    println!("  Learning rate: {}", config.learning_rate);
    println!("  Weight decay: {}", config.weight_decay);
    println!("  Gradient clipping: {}", config.grad_clip);
    println!();

    let mut logger = args.log.as_deref().map(TrainingLogger::new).transpose()?;
    let mut objective = LanguageModeling::new(model);
    let mut trainer = Trainer::new(config.clone())?;
    let reports = trainer.fit(
        &mut objective,
        &corpus.examples,
        validation.as_ref().map(|v| v.examples.as_slice()),
        logger.as_mut(),
    )?;
    let model = objective.into_inner();

    // ========================================================================
    // 4. Save
    // ========================================================================
    println!("\n{}", "=".repeat(70));
    println!("4. Checkpoint");
    println!("{}", "=".repeat(70));
    println!();

    let checkpoint =
        Checkpoint::language_model(model, corpus.vocab).with_training(config, &reports);
    checkpoint.save(&args.output)?;
    println!("Saved to: {}", args.output);
    if let Some(loss) = checkpoint.metadata.final_train_loss {
        println!("Final train loss: {:.4} (perplexity {:.2})", loss, loss.exp());
    }
    if let Some(loss) = checkpoint.metadata.best_val_loss {
        println!("Best validation loss: {:.4}", loss);
    }

    // ========================================================================
    // 5. Sample
    // ========================================================================
    if let Some(vocab) = &checkpoint.vocab {
        let sample = generate_text(
            &checkpoint.model,
            vocab,
            &args.sample_prompt,
            &DecodeOptions::default(),
        )?;
        println!("\nSample: {}", sample);
    }

    Ok(())
}
