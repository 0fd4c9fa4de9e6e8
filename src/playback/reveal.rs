//! Progressive text reveal paced to the audio.

use std::time::Duration;

/// Per-character pacing for one reply.
///
/// ```
/// use std::time::Duration;
/// use voice_tutor::playback::RevealPlan;
///
/// let plan = RevealPlan::new(Some(Duration::from_secs(2)), 10, Duration::from_millis(30));
/// assert_eq!(plan.interval(), Duration::from_millis(200));
///
/// // Very short audio never reveals faster than the minimum.
/// let plan = RevealPlan::new(Some(Duration::from_millis(50)), 10, Duration::from_millis(30));
/// assert_eq!(plan.interval(), Duration::from_millis(30));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealPlan {
    interval: Duration,
    total_chars: usize,
}

impl RevealPlan {
    /// `max(duration / chars, min_interval)`; an unknown duration uses the
    /// minimum.
    pub fn new(duration: Option<Duration>, total_chars: usize, min_interval: Duration) -> Self {
        let per_char = match (duration, u32::try_from(total_chars.max(1))) {
            (Some(d), Ok(n)) => d / n,
            _ => min_interval,
        };
        Self {
            interval: per_char.max(min_interval),
            total_chars,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn total_chars(&self) -> usize {
        self.total_chars
    }

    /// Visible character counts, `1..=total_chars`.
    pub fn steps(&self) -> std::ops::RangeInclusive<usize> {
        1..=self.total_chars
    }
}

/// The first `chars` characters of `text`.
pub fn prefix(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Walk the plan, sleeping one interval before each step.  `on_step`
/// returns `false` to stop early.
pub async fn run_reveal<F>(plan: RevealPlan, mut on_step: F)
where
    F: FnMut(usize) -> bool,
{
    for visible in plan.steps() {
        tokio::time::sleep(plan.interval).await;
        if !on_step(visible) {
            log::debug!("reveal: stopped at {visible}/{}", plan.total_chars);
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Duration = Duration::from_millis(30);

    #[test]
    fn unknown_duration_uses_minimum() {
        assert_eq!(RevealPlan::new(None, 12, MIN).interval(), MIN);
    }

    #[test]
    fn empty_text_has_no_steps() {
        let plan = RevealPlan::new(Some(Duration::from_secs(1)), 0, MIN);
        assert_eq!(plan.steps().count(), 0);
    }

    #[test]
    fn prefix_counts_characters_not_bytes() {
        assert_eq!(prefix("안녕하세요", 2), "안녕");
        assert_eq!(prefix("안녕하세요", 0), "");
        assert_eq!(prefix("안녕", 10), "안녕");
    }

    #[tokio::test]
    async fn run_reveal_grows_monotonically() {
        let plan = RevealPlan::new(None, 4, Duration::from_millis(1));
        let mut seen = Vec::new();
        run_reveal(plan, |n| {
            seen.push(n);
            true
        })
        .await;
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn run_reveal_stops_when_asked() {
        let plan = RevealPlan::new(None, 10, Duration::from_millis(1));
        let mut seen = Vec::new();
        run_reveal(plan, |n| {
            seen.push(n);
            n < 3
        })
        .await;
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
