use indicatif::{ProgressBar, ProgressStyle};

/// Batches smaller than this run without a progress bar.
pub const PROGRESS_THRESHOLD: usize = 256;

/// Cosmetic per-chunk progress for large inference batches.
pub struct ChunkProgress {
    bar: ProgressBar,
    enabled: bool,
}

impl ChunkProgress {
    pub fn new(message: &str, rows: usize, chunks: usize) -> Self {
        let enabled = rows >= PROGRESS_THRESHOLD;
        let bar = if enabled {
            let bar = ProgressBar::new(chunks as u64);
            if let Ok(style) =
                ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({elapsed})")
            {
                bar.set_style(style.progress_chars("=> "));
            }
            bar.set_message(message.to_string());
            bar
        } else {
            ProgressBar::hidden()
        };

        Self { bar, enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn inc(&self) {
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_only_for_large_batches() {
        assert!(!ChunkProgress::new("test", 255, 22).enabled());
        assert!(ChunkProgress::new("test", 256, 22).enabled());
    }
}
