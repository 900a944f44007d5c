use std::time::Duration;

/// Timing knobs of the live client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub max_retries: u32,
    pub poll_interval: Duration,
    pub max_poll_failures: u32,
    pub completion_grace: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_retry_delay: Duration::from_millis(1000),
            max_retry_delay: Duration::from_millis(15_000),
            max_retries: 4,
            poll_interval: Duration::from_millis(2000),
            max_poll_failures: 10,
            completion_grace: Duration::from_millis(500),
        }
    }
}

impl ClientConfig {
    /// `min(max_retry_delay, base_retry_delay * 2^retry_count)`.
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.base_retry_delay
            .checked_mul(factor)
            .map_or(self.max_retry_delay, |delay| delay.min(self.max_retry_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delays_double_until_capped() {
        let config = ClientConfig::default();
        let delays: Vec<u128> = (0..7)
            .map(|attempt| config.retry_delay(attempt).as_millis())
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 15_000, 15_000, 15_000]);
    }

    #[test]
    fn huge_retry_counts_do_not_overflow() {
        let config = ClientConfig::default();
        assert_eq!(config.retry_delay(31), Duration::from_millis(15_000));
        assert_eq!(config.retry_delay(64), Duration::from_millis(15_000));
    }
}
