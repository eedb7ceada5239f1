//! Progress observers for the promotion stages
//!
//! Stages report completed items (or bytes) to a [`StageProgress`] and never
//! read anything back from it. [`ProgressFactory`] hands out one observer per
//! stage so the pipeline stays independent of how progress is shown.

pub mod counter;

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

pub use counter::{ByteCounter, CountingStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUnit {
    Items,
    Bytes,
}

pub trait StageProgress: Send + Sync {
    fn advance(&self, delta: u64);

    fn finish(&self);
}

pub trait ProgressFactory: Send + Sync {
    fn stage(&self, name: &str, length: u64, unit: ProgressUnit) -> Arc<dyn StageProgress>;
}

/// Terminal progress bars
#[derive(Debug, Clone, Default)]
pub struct IndicatifProgress;

const ITEMS_TEMPLATE: &str = "{prefix:>16} {elapsed:>4} {wide_bar} {pos:>5}/{len:<5}";
const BYTES_TEMPLATE: &str = "{prefix:>16} {elapsed:>4} {wide_bar} {bytes:>10}/{total_bytes:<10} {bytes_per_sec:>12}";

impl ProgressFactory for IndicatifProgress {
    fn stage(&self, name: &str, length: u64, unit: ProgressUnit) -> Arc<dyn StageProgress> {
        let template = match unit {
            ProgressUnit::Items => ITEMS_TEMPLATE,
            ProgressUnit::Bytes => BYTES_TEMPLATE,
        };
        let style = ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar());

        let bar = ProgressBar::new(length);
        bar.set_style(style);
        bar.set_prefix(name.to_string());
        Arc::new(BarProgress(bar))
    }
}

struct BarProgress(ProgressBar);

impl StageProgress for BarProgress {
    fn advance(&self, delta: u64) {
        self.0.inc(delta);
    }

    fn finish(&self) {
        self.0.finish();
    }
}

/// Discards all progress, for `--quiet` runs and tests
#[derive(Debug, Clone, Default)]
pub struct SilentProgress;

impl ProgressFactory for SilentProgress {
    fn stage(&self, _name: &str, _length: u64, _unit: ProgressUnit) -> Arc<dyn StageProgress> {
        Arc::new(SilentProgress)
    }
}

impl StageProgress for SilentProgress {
    fn advance(&self, _delta: u64) {}

    fn finish(&self) {}
}
