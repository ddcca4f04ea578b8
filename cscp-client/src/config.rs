use std::time::Duration;

/// Connection and timing settings of a [`crate::Client`].
///
/// Every field may be changed at runtime through
/// [`crate::Client::update_config`]; changes apply to the next decision
/// that reads them.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Reconnect after the connection drops without [`crate::Client::disconnect`].
    pub auto_reconnect: bool,
    pub reconnect_interval: Duration,
    pub connect_timeout: Duration,
    /// Used for validation until the console reported its own counts.
    pub max_fader_count: u16,
    /// Used for validation until the console reported its own counts.
    pub max_main_count: u16,
    /// Minimum spacing between any two commands sent to the console.
    pub global_command_rate: Duration,
    /// Minimum spacing between two fader level commands.
    pub fader_level_rate: Duration,
    pub command_response_timeout: Duration,
    pub initialization_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3322,
            auto_reconnect: true,
            reconnect_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            max_fader_count: 42,
            max_main_count: 3,
            global_command_rate: Duration::from_millis(10),
            fader_level_rate: Duration::from_millis(100),
            command_response_timeout: Duration::from_secs(5),
            initialization_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Spacing of the fader lane; never shorter than the global spacing.
    pub fn fader_lane_spacing(&self) -> Duration {
        self.fader_level_rate.max(self.global_command_rate)
    }
}

/// Builder to create a [`Config`]
///
/// # Example
///
/// ```
/// use cscp_client::Builder;
/// use std::time::Duration;
///
/// let config = Builder::new()
///     .host("192.168.1.20")
///     .port(3322)
///     .command_response_timeout(Duration::from_secs(2))
///     .build();
/// assert_eq!(config.address(), "192.168.1.20:3322");
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.reconnect_interval = interval;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the fader and main counts assumed until the console reports its own.
    pub fn console_size(mut self, faders: u16, mains: u16) -> Self {
        self.config.max_fader_count = faders;
        self.config.max_main_count = mains;
        self
    }

    pub fn global_command_rate(mut self, spacing: Duration) -> Self {
        self.config.global_command_rate = spacing;
        self
    }

    pub fn fader_level_rate(mut self, spacing: Duration) -> Self {
        self.config.fader_level_rate = spacing;
        self
    }

    pub fn command_response_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_response_timeout = timeout;
        self
    }

    pub fn initialization_timeout(mut self, timeout: Duration) -> Self {
        self.config.initialization_timeout = timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

#[test]
fn fader_lane_is_never_faster_than_global() {
    let config = Builder::new()
        .global_command_rate(Duration::from_millis(50))
        .fader_level_rate(Duration::from_millis(20))
        .build();
    assert_eq!(config.fader_lane_spacing(), Duration::from_millis(50));
}
