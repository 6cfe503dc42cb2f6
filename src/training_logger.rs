//! Training Logger
//!
//! Tracks per-epoch training metrics in a CSV file and on the console.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tokenfill::TrainingLogger;
//!
//! let mut logger = TrainingLogger::new("training_log.csv")?;
//! logger.log_epoch(1, 0.01, 2.5, Some(2.8))?;
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! ## CSV Format
//!
//! - `epoch`: Epoch number (1-based)
//! - `elapsed_seconds`: Time since the logger was created
//! - `learning_rate`: Learning rate used for the epoch
//! - `train_loss`: Example-weighted mean training loss
//! - `train_perplexity`: exp(train_loss)
//! - `val_loss`: Validation loss (empty when no validation split is configured)
//! - `val_perplexity`: exp(val_loss) (likewise)
//!
//! ## Perplexity
//!
//! ```text
//! perplexity = exp(loss)
//! ```
//!
//! A perfect model has perplexity 1.0; uniform guessing over a vocabulary
//! of size V has perplexity V.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

pub struct TrainingLogger {
    log_file: File,
    start_time: Instant,
    last_log_time: Instant,
}

impl TrainingLogger {
    /// Create the CSV file and write its header
    pub fn new<P: AsRef<Path>>(log_path: P) -> std::io::Result<Self> {
        let mut log_file = File::create(log_path)?;

        writeln!(
            log_file,
            "epoch,elapsed_seconds,learning_rate,train_loss,train_perplexity,val_loss,val_perplexity"
        )?;

        let now = Instant::now();
        Ok(Self {
            log_file,
            start_time: now,
            last_log_time: now,
        })
    }

    /// Log one finished epoch
    pub fn log_epoch(
        &mut self,
        epoch: usize,
        learning_rate: f32,
        train_loss: f32,
        val_loss: Option<f32>,
    ) -> std::io::Result<()> {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let train_perplexity = train_loss.exp();

        let (val_loss_field, val_perplexity_field) = match val_loss {
            Some(loss) => (format!("{:.4}", loss), format!("{:.2}", loss.exp())),
            None => (String::new(), String::new()),
        };

        writeln!(
            self.log_file,
            "{},{:.2},{:.6},{:.4},{:.2},{},{}",
            epoch,
            elapsed,
            learning_rate,
            train_loss,
            train_perplexity,
            val_loss_field,
            val_perplexity_field
        )?;

        // Keep the file complete if the run dies mid-training
        self.log_file.flush()?;

        let epoch_time = self.last_log_time.elapsed().as_secs_f32();
        match val_loss {
            Some(val) => println!(
                "Epoch {:3} | Time: {:7.1}s (+{:.1}s) | Train: {:.4} (ppl {:.2}) | Val: {:.4} (ppl {:.2})",
                epoch,
                elapsed,
                epoch_time,
                train_loss,
                train_perplexity,
                val,
                val.exp()
            ),
            None => println!(
                "Epoch {:3} | Time: {:7.1}s (+{:.1}s) | Train: {:.4} (ppl {:.2})",
                epoch, elapsed, epoch_time, train_loss, train_perplexity
            ),
        }

        self.last_log_time = Instant::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let mut logger = TrainingLogger::new(&path).unwrap();
        logger.log_epoch(1, 0.01, 1.0, Some(2.0)).unwrap();
        logger.log_epoch(2, 0.01, 0.5, None).unwrap();
        drop(logger);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("epoch,elapsed_seconds"));

        let first: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(first[0], "1");
        assert_eq!(first[3], "1.0000");
        assert_eq!(first[4], "2.72");
        assert_eq!(first[5], "2.0000");
        assert_eq!(first[6], "7.39");

        let second: Vec<&str> = lines[2].split(',').collect();
        assert_eq!(second.len(), 7);
        assert_eq!(second[5], "");
        assert_eq!(second[6], "");
    }
}
