use std::time::Duration;

/// Lifetime draw offers each side may make in one game
pub const DEFAULT_DRAW_OFFER_CAP: u8 = 3;

/// Period of the clock recomputation while a game is running
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

/// Per-session tuning for the session controller
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub tick_period: Duration,
    pub draw_offer_cap: u8,
    /// Drop snapshots that are older than the last applied one
    pub enforce_versions: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            draw_offer_cap: DEFAULT_DRAW_OFFER_CAP,
            enforce_versions: true,
        }
    }
}

impl SessionConfig {
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        // A zero period would spin the arbiter
        self.tick_period = period.max(Duration::from_millis(10));
        self
    }

    pub fn with_draw_offer_cap(mut self, cap: u8) -> Self {
        self.draw_offer_cap = cap;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_house_rules() {
        let config = SessionConfig::default();
        assert_eq!(config.draw_offer_cap, 3);
        assert_eq!(config.tick_period, Duration::from_secs(1));
        assert!(config.enforce_versions);
    }

    #[test]
    fn tick_period_is_floored() {
        let config = SessionConfig::default().with_tick_period(Duration::ZERO);
        assert_eq!(config.tick_period, Duration::from_millis(10));
    }
}
