//! Token budget: effective-limit math, session usage and cost
//! accumulation, and warn/compact threshold checks.

use std::sync::RwLock;

/// Default warn threshold (fraction of the effective limit).
const DEFAULT_WARN_THRESHOLD: f64 = 0.80;
/// Default compact threshold.
const DEFAULT_COMPACT_THRESHOLD: f64 = 0.90;

/// Configuration for a [`Budget`].
#[derive(Debug, Clone, Default)]
pub struct BudgetConfig {
    /// Configured ceiling on context tokens.
    pub max_tokens: usize,
    /// Tokens reserved for the model's next response.
    pub reserve_for_response: usize,
    /// The model's context window; 0 when unknown.
    pub model_context_size: usize,
    /// Warn threshold as a fraction; non-positive selects the default.
    pub warn_threshold: f64,
    /// Compact threshold as a fraction; non-positive selects the default.
    pub compact_threshold: f64,
}

/// Session token budget.
///
/// The effective limit is `min(max_tokens, model_context_size)` (ignoring
/// a zero/unknown context size) minus the response reserve. Readers are
/// non-exclusive; the provider records usage from the streaming task
/// while the UI reads snapshots.
#[derive(Debug)]
pub struct Budget {
    inner: RwLock<Inner>,
}

#[derive(Debug)]
struct Inner {
    max_tokens: usize,
    reserve_for_response: usize,
    model_context_size: usize,
    session_input: u64,
    session_output: u64,
    session_cost: f64,
    input_price_per_1m: f64,
    output_price_per_1m: f64,
    warn_threshold: f64,
    compact_threshold: f64,
}

/// Point-in-time view of budget state at a given context size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetSnapshot {
    pub current_context_tokens: usize,
    pub max_context_tokens: usize,
    /// Usage as a percentage (0–100) of the effective limit.
    pub usage_percent: f64,
    pub session_input_tokens: u64,
    pub session_output_tokens: u64,
    pub session_cost: f64,
    pub remaining_tokens: i64,
    pub at_warning_level: bool,
    pub at_compact_level: bool,
}

impl Budget {
    pub fn new(cfg: BudgetConfig) -> Self {
        let warn = if cfg.warn_threshold > 0.0 {
            cfg.warn_threshold
        } else {
            DEFAULT_WARN_THRESHOLD
        };
        let compact = if cfg.compact_threshold > 0.0 {
            cfg.compact_threshold
        } else {
            DEFAULT_COMPACT_THRESHOLD
        };

        Self {
            inner: RwLock::new(Inner {
                max_tokens: cfg.max_tokens,
                reserve_for_response: cfg.reserve_for_response,
                model_context_size: cfg.model_context_size,
                session_input: 0,
                session_output: 0,
                session_cost: 0.0,
                input_price_per_1m: 0.0,
                output_price_per_1m: 0.0,
                warn_threshold: warn,
                compact_threshold: compact,
            }),
        }
    }

    /// Set per-million-token pricing for session cost accumulation.
    pub fn set_pricing(&self, input_per_1m: f64, output_per_1m: f64) {
        let mut inner = self.inner.write().expect("budget lock poisoned");
        inner.input_price_per_1m = input_per_1m;
        inner.output_price_per_1m = output_per_1m;
    }

    /// Accumulate reported usage and its cost.
    pub fn record_usage(&self, input_tokens: u64, output_tokens: u64) {
        let mut inner = self.inner.write().expect("budget lock poisoned");
        inner.session_input += input_tokens;
        inner.session_output += output_tokens;

        let input_cost = input_tokens as f64 / 1_000_000.0 * inner.input_price_per_1m;
        let output_cost = output_tokens as f64 / 1_000_000.0 * inner.output_price_per_1m;
        inner.session_cost += input_cost + output_cost;
    }

    /// Tokens actually available for context after the response reserve.
    pub fn effective_limit(&self) -> i64 {
        let inner = self.inner.read().expect("budget lock poisoned");
        inner.effective_limit()
    }

    /// Snapshot budget state against the given context size.
    ///
    /// Thresholds compare `usage_percent` with `>=` semantics; a
    /// non-positive effective limit yields 0% and never warns.
    pub fn snapshot(&self, current_context_tokens: usize) -> BudgetSnapshot {
        let inner = self.inner.read().expect("budget lock poisoned");
        let effective = inner.effective_limit();

        let usage_percent = if effective > 0 {
            current_context_tokens as f64 / effective as f64 * 100.0
        } else {
            0.0
        };

        BudgetSnapshot {
            current_context_tokens,
            max_context_tokens: effective.max(0) as usize,
            usage_percent,
            session_input_tokens: inner.session_input,
            session_output_tokens: inner.session_output,
            session_cost: inner.session_cost,
            remaining_tokens: effective - current_context_tokens as i64,
            at_warning_level: effective > 0 && usage_percent >= inner.warn_threshold * 100.0,
            at_compact_level: effective > 0 && usage_percent >= inner.compact_threshold * 100.0,
        }
    }

    pub fn should_warn(&self, current_context_tokens: usize) -> bool {
        self.snapshot(current_context_tokens).at_warning_level
    }

    pub fn should_compact(&self, current_context_tokens: usize) -> bool {
        self.snapshot(current_context_tokens).at_compact_level
    }

    /// Session totals so far: (input, output).
    pub fn session_tokens(&self) -> (u64, u64) {
        let inner = self.inner.read().expect("budget lock poisoned");
        (inner.session_input, inner.session_output)
    }

    pub fn session_cost(&self) -> f64 {
        let inner = self.inner.read().expect("budget lock poisoned");
        inner.session_cost
    }

    /// Replace the model context size (e.g. after model switch).
    pub fn update_model_context_size(&self, size: usize) {
        let mut inner = self.inner.write().expect("budget lock poisoned");
        inner.model_context_size = size;
    }

    /// Clear session accumulation.
    pub fn reset(&self) {
        let mut inner = self.inner.write().expect("budget lock poisoned");
        inner.session_input = 0;
        inner.session_output = 0;
        inner.session_cost = 0.0;
    }
}

impl Inner {
    fn effective_limit(&self) -> i64 {
        let mut limit = self.max_tokens;
        if self.model_context_size > 0 && self.model_context_size < limit {
            limit = self.model_context_size;
        }
        limit as i64 - self.reserve_for_response as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(max: usize, reserve: usize, model_ctx: usize) -> Budget {
        Budget::new(BudgetConfig {
            max_tokens: max,
            reserve_for_response: reserve,
            model_context_size: model_ctx,
            ..Default::default()
        })
    }

    #[test]
    fn effective_limit_min_of_configured_and_model() {
        assert_eq!(budget(100_000, 4_000, 0).effective_limit(), 96_000);
        assert_eq!(budget(100_000, 4_000, 50_000).effective_limit(), 46_000);
        // A larger model window does not raise the configured ceiling.
        assert_eq!(budget(100_000, 4_000, 200_000).effective_limit(), 96_000);
    }

    #[test]
    fn snapshot_math() {
        let b = budget(10_000, 0, 0);
        let snap = b.snapshot(5_000);
        assert_eq!(snap.max_context_tokens, 10_000);
        assert!((snap.usage_percent - 50.0).abs() < 1e-9);
        assert_eq!(snap.remaining_tokens, 5_000);
        assert!(!snap.at_warning_level);
        assert!(!snap.at_compact_level);
    }

    #[test]
    fn warn_boundary_is_inclusive() {
        let b = budget(10_000, 0, 0);
        let snap = b.snapshot(8_000);
        assert!(snap.at_warning_level);
        assert!(!snap.at_compact_level);
    }

    #[test]
    fn compact_boundary_is_inclusive() {
        let b = budget(10_000, 0, 0);
        let snap = b.snapshot(9_000);
        assert!(snap.at_warning_level);
        assert!(snap.at_compact_level);
    }

    #[test]
    fn zero_max_never_warns() {
        let b = budget(0, 0, 0);
        let snap = b.snapshot(1_000_000);
        assert_eq!(snap.usage_percent, 0.0);
        assert!(!snap.at_warning_level);
        assert!(!snap.at_compact_level);
    }

    #[test]
    fn record_usage_accumulates_tokens_and_cost() {
        let b = budget(10_000, 0, 0);
        b.set_pricing(3.0, 15.0);
        b.record_usage(1_000_000, 100_000);
        let snap = b.snapshot(0);
        assert_eq!(snap.session_input_tokens, 1_000_000);
        assert_eq!(snap.session_output_tokens, 100_000);
        assert!((snap.session_cost - 4.5).abs() < 1e-9);
    }

    #[test]
    fn record_usage_is_additive() {
        // record(a,b); record(c,d) == record(a+c, b+d)
        let split = budget(1, 0, 0);
        split.set_pricing(2.0, 4.0);
        split.record_usage(100, 200);
        split.record_usage(300, 400);

        let joined = budget(1, 0, 0);
        joined.set_pricing(2.0, 4.0);
        joined.record_usage(400, 600);

        assert_eq!(split.session_tokens(), joined.session_tokens());
        assert!((split.session_cost() - joined.session_cost()).abs() < 1e-12);
    }

    #[test]
    fn thresholds_default_when_unset() {
        let b = Budget::new(BudgetConfig {
            max_tokens: 1000,
            ..Default::default()
        });
        assert!(!b.should_warn(799));
        assert!(b.should_warn(800));
        assert!(!b.should_compact(899));
        assert!(b.should_compact(900));
    }

    #[test]
    fn reset_clears_session_state() {
        let b = budget(1000, 0, 0);
        b.set_pricing(1.0, 1.0);
        b.record_usage(10, 10);
        b.reset();
        assert_eq!(b.session_tokens(), (0, 0));
        assert_eq!(b.session_cost(), 0.0);
    }

    #[test]
    fn update_model_context_size_shrinks_limit() {
        let b = budget(100_000, 0, 0);
        b.update_model_context_size(8_192);
        assert_eq!(b.effective_limit(), 8_192);
    }
}
