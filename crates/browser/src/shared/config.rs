use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub navigation: Duration,
    pub page_ready: Duration,
    pub check_interval: Duration,
    /// How often queued DOM mutations are drained from the page.
    pub mutation_poll: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation: Duration::from_millis(30000),
            page_ready: Duration::from_millis(15000),
            check_interval: Duration::from_millis(300),
            mutation_poll: Duration::from_millis(250),
        }
    }
}

impl TimeoutConfig {
    pub fn with_navigation(mut self, ms: u64) -> Self {
        self.navigation = Duration::from_millis(ms);
        self
    }

    pub fn with_page_ready(mut self, ms: u64) -> Self {
        self.page_ready = Duration::from_millis(ms);
        self
    }

    pub fn with_mutation_poll(mut self, ms: u64) -> Self {
        self.mutation_poll = Duration::from_millis(ms);
        self
    }

    pub fn fast() -> Self {
        Self {
            navigation: Duration::from_millis(20000),
            page_ready: Duration::from_millis(8000),
            check_interval: Duration::from_millis(200),
            mutation_poll: Duration::from_millis(150),
        }
    }

    pub fn patient() -> Self {
        Self {
            navigation: Duration::from_millis(60000),
            page_ready: Duration::from_millis(30000),
            check_interval: Duration::from_millis(500),
            mutation_poll: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub window_size: Option<(u32, u32)>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self { headless: true, window_size: Some((1280, 800)) }
    }
}

impl LaunchOptions {
    pub fn headed() -> Self {
        Self { headless: false, ..Self::default() }
    }

    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = Some((width, height));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_presets() {
        let config = TimeoutConfig::fast().with_navigation(5000).with_mutation_poll(50);
        assert_eq!(config.navigation, Duration::from_secs(5));
        assert_eq!(config.mutation_poll, Duration::from_millis(50));
        assert_eq!(config.page_ready, TimeoutConfig::fast().page_ready);
        assert!(TimeoutConfig::patient().page_ready > TimeoutConfig::default().page_ready);
    }

    #[test]
    fn headed_keeps_default_window() {
        let options = LaunchOptions::headed();
        assert!(!options.headless);
        assert_eq!(options.window_size, Some((1280, 800)));
        assert_eq!(LaunchOptions::default().with_window_size(800, 600).window_size, Some((800, 600)));
    }
}
