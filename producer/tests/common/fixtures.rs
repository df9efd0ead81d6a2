//! Configurations for end-to-end runs

use std::time::Duration;

use streammux::MuxConfig;

pub struct TestFixtures;

impl TestFixtures {
    pub const STALENESS: Duration = Duration::from_secs(1);
    pub const COOLDOWN: Duration = Duration::from_millis(200);

    /// Upper bound for anything the tests wait on
    pub const DEADLINE: Duration = Duration::from_secs(10);

    /// Short timings, real producer binary
    pub fn config(sources: &[(u32, &str)]) -> MuxConfig {
        let mut config = MuxConfig::default().with_worker_path(env!("CARGO_BIN_EXE_producer"));
        for (id, url) in sources {
            config = config.with_source(*id, *url);
        }
        config.staleness_window = Self::STALENESS;
        config.negotiation_timeout = Duration::from_secs(2);
        config.cooldown = Self::COOLDOWN;
        config.spawn_retry_interval = Duration::from_millis(200);
        config.reader_interval = Duration::from_millis(2);
        config.tick_interval = Duration::from_millis(20);
        config.poll_timeout = Duration::from_millis(20);
        config
    }
}
