//! Progress reporting for block-wise array conversion.
//!
//! [`ChunkedPrecisionLoader`](crate::array::ChunkedPrecisionLoader) reports
//! each finished block to a [`ProgressSink`]. Pick one of:
//! - [`NoProgress`]: silent
//! - [`TracingProgress`]: structured `tracing` events
//! - [`BarProgress`]: an `indicatif` bar for interactive runs
//! - any `FnMut(&BlockProgress)` closure

use indicatif::{ProgressBar, ProgressStyle};
use std::ops::Range;
use tracing::{debug, info};

/// Completion report for one conversion block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockProgress {
    /// Zero-based index of the block that just finished
    pub block_index: usize,
    /// Rows of the source array covered by the block
    pub rows: Range<usize>,
    /// Blocks finished so far, this one included
    pub blocks_done: usize,
    /// Total number of blocks in the conversion
    pub total_blocks: usize,
}

impl BlockProgress {
    /// Fraction of blocks finished, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total_blocks == 0 {
            1.0
        } else {
            self.blocks_done as f64 / self.total_blocks as f64
        }
    }
}

/// Receives conversion progress, one call per finished block, in block order.
pub trait ProgressSink {
    /// Called once before the first block.
    fn begin(&mut self, _total_blocks: usize, _total_rows: usize) {}

    fn block_done(&mut self, progress: &BlockProgress);

    /// Called once after the last block. Not called when conversion fails.
    fn finish(&mut self) {}
}

impl<F> ProgressSink for F
where
    F: FnMut(&BlockProgress),
{
    fn block_done(&mut self, progress: &BlockProgress) {
        self(progress)
    }
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn block_done(&mut self, _progress: &BlockProgress) {}
}

/// Emits `tracing` events labelled with the array being converted.
#[derive(Debug, Clone)]
pub struct TracingProgress {
    label: String,
}

impl TracingProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ProgressSink for TracingProgress {
    fn begin(&mut self, total_blocks: usize, total_rows: usize) {
        info!(array = %self.label, total_blocks, total_rows, "Converting array");
    }

    fn block_done(&mut self, progress: &BlockProgress) {
        debug!(
            array = %self.label,
            block = progress.block_index,
            rows = ?progress.rows,
            percent = format_args!("{:.1}", progress.fraction() * 100.0),
            "Converted block"
        );
    }

    fn finish(&mut self) {
        info!(array = %self.label, "Array conversion finished");
    }
}

/// Drives an `indicatif` progress bar, one tick per block.
#[derive(Debug, Clone)]
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(label: impl Into<String>) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} blocks ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
        );
        bar.set_message(label.into());
        Self { bar }
    }

    /// Wraps an existing bar, e.g. `ProgressBar::hidden()` in tests.
    pub fn with_bar(bar: ProgressBar) -> Self {
        Self { bar }
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

impl ProgressSink for BarProgress {
    fn begin(&mut self, total_blocks: usize, _total_rows: usize) {
        self.bar.set_length(total_blocks as u64);
        self.bar.set_position(0);
    }

    fn block_done(&mut self, _progress: &BlockProgress) {
        self.bar.inc(1);
    }

    fn finish(&mut self) {
        self.bar.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(sink: &mut dyn ProgressSink, total: usize) {
        sink.begin(total, total * 10);
        for i in 0..total {
            sink.block_done(&BlockProgress {
                block_index: i,
                rows: i * 10..(i + 1) * 10,
                blocks_done: i + 1,
                total_blocks: total,
            });
        }
        sink.finish();
    }

    #[test]
    fn closures_are_sinks() {
        let mut seen = Vec::new();
        let mut sink = |p: &BlockProgress| seen.push(p.block_index);
        report(&mut sink, 3);
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn bar_tracks_blocks() {
        let mut sink = BarProgress::with_bar(ProgressBar::hidden());
        report(&mut sink, 4);
        assert_eq!(sink.bar().length(), Some(4));
        assert_eq!(sink.bar().position(), 4);
        assert!(sink.bar().is_finished());
    }

    #[test]
    fn fraction_handles_empty_conversion() {
        let p = BlockProgress {
            block_index: 0,
            rows: 0..0,
            blocks_done: 0,
            total_blocks: 0,
        };
        assert_eq!(p.fraction(), 1.0);
    }

    #[test]
    fn silent_and_tracing_sinks_accept_reports() {
        report(&mut NoProgress, 2);
        report(&mut TracingProgress::new("train_x"), 2);
    }
}
