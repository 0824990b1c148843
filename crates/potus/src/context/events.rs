//! Context events published to observers (typically a status line in the
//! UI). Delivery is best-effort: the manager never blocks the agent loop
//! on a slow or absent subscriber.

/// Kind of context event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextEventKind {
    UsageUpdate,
    Warning,
    Pruned,
    Compacted,
    Error,
}

/// A context-management notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEvent {
    pub kind: ContextEventKind,
    pub current_tokens: usize,
    pub max_tokens: usize,
    pub usage_percent: f64,
    pub message: String,
}

impl ContextEvent {
    pub fn usage(current: usize, max: usize) -> Self {
        Self {
            kind: ContextEventKind::UsageUpdate,
            current_tokens: current,
            max_tokens: max,
            usage_percent: percent(current, max),
            message: String::new(),
        }
    }

    pub fn warning(current: usize, max: usize, message: impl Into<String>) -> Self {
        Self {
            kind: ContextEventKind::Warning,
            current_tokens: current,
            max_tokens: max,
            usage_percent: percent(current, max),
            message: message.into(),
        }
    }

    pub fn compacted(current: usize, max: usize, message: impl Into<String>) -> Self {
        Self {
            kind: ContextEventKind::Compacted,
            current_tokens: current,
            max_tokens: max,
            usage_percent: percent(current, max),
            message: message.into(),
        }
    }

    pub fn pruned(message: impl Into<String>) -> Self {
        Self {
            kind: ContextEventKind::Pruned,
            current_tokens: 0,
            max_tokens: 0,
            usage_percent: 0.0,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ContextEventKind::Error,
            current_tokens: 0,
            max_tokens: 0,
            usage_percent: 0.0,
            message: message.into(),
        }
    }
}

fn percent(current: usize, max: usize) -> f64 {
    if max > 0 {
        current as f64 / max as f64 * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_computed_from_current_and_max() {
        let ev = ContextEvent::warning(50, 200, "careful");
        assert_eq!(ev.kind, ContextEventKind::Warning);
        assert!((ev.usage_percent - 25.0).abs() < 1e-9);
        assert_eq!(ev.message, "careful");
    }

    #[test]
    fn zero_max_yields_zero_percent() {
        let ev = ContextEvent::usage(100, 0);
        assert_eq!(ev.usage_percent, 0.0);
    }

    #[test]
    fn pruned_and_error_carry_message_only() {
        assert_eq!(ContextEvent::pruned("p").kind, ContextEventKind::Pruned);
        assert_eq!(ContextEvent::error("e").message, "e");
    }
}
