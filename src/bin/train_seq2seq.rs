//! Train a Sequence-to-Sequence Model
//!
//! Trains the source-bag translator on a parallel corpus (one example per
//! line pair) with teacher forcing, then saves a checkpoint carrying both
//! vocabularies.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin train_seq2seq -- --src train.src --tgt train.tgt
//!
//! # With a validation pair: per-epoch validation loss and a final accuracy
//! cargo run --release --bin train_seq2seq -- \
//!     --src train.src --tgt train.tgt \
//!     --val-src valid.src --val-tgt valid.tgt --log s2s_log.csv
//! ```

use clap::Parser;
use tokenfill::models::{SourceBagTranslator, TranslatorConfig};
use tokenfill::scorer::Parameters;
use tokenfill::train::Translation;
use tokenfill::{
    evaluate_seq2seq, Checkpoint, EvalOptions, ParallelCorpus, Trainer, TrainingConfig,
    TrainingLogger,
};

#[derive(Parser)]
#[command(name = "train_seq2seq", about = "Train a sequence-to-sequence model")]
struct Args {
    /// Source side of the training corpus
    #[arg(long)]
    src: String,

    /// Target side of the training corpus (same line count as --src)
    #[arg(long)]
    tgt: String,

    /// Source side of a validation corpus
    #[arg(long, requires = "val_tgt")]
    val_src: Option<String>,

    /// Target side of a validation corpus
    #[arg(long, requires = "val_src")]
    val_tgt: Option<String>,

    /// Named training preset (tiny or small)
    #[arg(long, default_value = "small")]
    preset: String,

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

    #[arg(long)]
    seed: Option<u64>,

    /// Checkpoint output path
    #[arg(long, default_value = "seq2seq.ckpt")]
    output: String,

    /// Per-epoch CSV log
    #[arg(long)]
    log: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = TrainingConfig::preset(&args.preset)?;
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
    println!("  Training seq2seq model (preset: {})", args.preset);
    println!("{}", "=".repeat(70));
    println!();

    // ========================================================================
    // 1. Load Corpora
    // ========================================================================
    println!("{}", "=".repeat(70));
    println!("1. Loading Corpora");
    println!("{}", "=".repeat(70));
    println!();

    let corpus = ParallelCorpus::from_files(&args.src, &args.tgt, config.min_freq)?;
    println!("Loaded: {} / {} ({} pairs)", args.src, args.tgt, corpus.examples.len());
    println!("Source {}", corpus.src_vocab.stats());
    println!("Target {}", corpus.tgt_vocab.stats());

    let validation = match (&args.val_src, &args.val_tgt) {
        (Some(src), Some(tgt)) => {
            let val = ParallelCorpus::from_files_with_vocabs(
                src,
                tgt,
                corpus.src_vocab.clone(),
                corpus.tgt_vocab.clone(),
            )?;
            println!("Validation: {} pairs, <unk> {}", val.examples.len(), val.unk);
            Some(val)
        }
        _ => None,
    };

    // ========================================================================
    // 2. Model
    // ========================================================================
    println!("\n{}", "=".repeat(70));
    println!("2. Model");
    println!("{}", "=".repeat(70));
    println!();

    let mut model_config = TranslatorConfig::new(corpus.src_vocab.len(), corpus.tgt_vocab.len());
    model_config.seed = config.seed;
    let model = SourceBagTranslator::new(model_config);
    println!("  Source vocabulary: {}", corpus.src_vocab.len());
    println!("  Target vocabulary: {}", corpus.tgt_vocab.len());
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
    let mut objective = Translation::new(model);
    let mut trainer = Trainer::new(config.clone())?;
    let reports = trainer.fit(
        &mut objective,
        &corpus.examples,
        validation.as_ref().map(|v| v.examples.as_slice()),
        logger.as_mut(),
    )?;
    let model = objective.into_inner();

    if let Some(val) = &validation {
        let report = evaluate_seq2seq(&model, val, &EvalOptions::default())?;
        println!(
            "\nValidation accuracy: {:.2}% ({}/{} sequences exact)",
            report.accuracy * 100.0,
            report.exact_matches,
            report.examples
        );
    }

    // ========================================================================
    // 4. Save
    // ========================================================================
    println!("\n{}", "=".repeat(70));
    println!("4. Checkpoint");
    println!("{}", "=".repeat(70));
    println!();

    let checkpoint = Checkpoint::seq2seq(model, corpus.src_vocab, corpus.tgt_vocab)
        .with_training(config, &reports);
    checkpoint.save(&args.output)?;
    println!("Saved to: {}", args.output);
    if let Some(loss) = checkpoint.metadata.final_train_loss {
        println!("Final train loss: {:.4} (perplexity {:.2})", loss, loss.exp());
    }

    Ok(())
}
