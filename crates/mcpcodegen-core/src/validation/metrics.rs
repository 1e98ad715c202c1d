//! Counters collected over one enhancement run.

use std::time::{Duration, Instant};

use crate::normalize::NormalizationStats;
use crate::overlay::{ApplyStats, GenerationStats};

/// Input/output token totals for one phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenTotals {
    pub input: u64,
    pub output: u64,
}

impl TokenTotals {
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// Metrics record owned by the pipeline and read by the report
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    started_at: Option<Instant>,
    processing_time: Option<Duration>,
    pub original_size: u64,
    pub enhanced_size: u64,
    pub operations_processed: usize,
    pub parameters_fixed: usize,
    pub body_params_converted: usize,
    pub overlay_actions_applied: usize,
    pub llm_calls: usize,
    pub generation_tokens: TokenTotals,
    pub validation_tokens: TokenTotals,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
        self.processing_time = None;
    }

    /// Stop the clock started by [`Metrics::start`]
    pub fn finish(&mut self) {
        if let Some(started) = self.started_at.take() {
            self.processing_time = Some(started.elapsed());
        }
    }

    /// Elapsed time of a finished run
    pub fn processing_time(&self) -> Option<Duration> {
        self.processing_time
    }

    pub fn set_processing_time(&mut self, elapsed: Duration) {
        self.started_at = None;
        self.processing_time = Some(elapsed);
    }

    pub fn add_generation_tokens(&mut self, input: u64, output: u64) {
        self.generation_tokens.input += input;
        self.generation_tokens.output += output;
    }

    pub fn add_validation_tokens(&mut self, input: u64, output: u64) {
        self.validation_tokens.input += input;
        self.validation_tokens.output += output;
    }

    pub fn record_generation(&mut self, stats: &GenerationStats) {
        self.operations_processed = self.operations_processed.max(stats.operations);
        self.llm_calls += stats.llm_calls;
        self.add_generation_tokens(stats.input_tokens, stats.output_tokens);
    }

    pub fn record_apply(&mut self, stats: &ApplyStats) {
        self.overlay_actions_applied += stats.applied;
    }

    pub fn record_normalization(&mut self, stats: &NormalizationStats) {
        self.parameters_fixed += stats.parameters_fixed;
        self.body_params_converted += stats.body_params_converted;
    }

    pub fn total_tokens(&self) -> u64 {
        self.generation_tokens.total() + self.validation_tokens.total()
    }

    /// Relative size change of the enhanced spec, in percent
    pub fn size_change_percent(&self) -> Option<f64> {
        if self.original_size == 0 || self.enhanced_size == 0 {
            return None;
        }
        let original = self.original_size as f64;
        Some((self.enhanced_size as f64 - original) / original * 100.0)
    }
}

/// `1234567` -> `1,234,567`
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
