//! Test fixtures and data for stream multiplexer tests

use std::time::Duration;

use streammux::core::{SupervisorPolicy, WatchdogPolicy};
use streammux::MuxConfig;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    /// Standard timing
    pub const STALENESS: Duration = Duration::from_secs(10);
    pub const NEGOTIATION: Duration = Duration::from_secs(30);
    pub const COOLDOWN: Duration = Duration::from_secs(5);
    pub const SPAWN_RETRY: Duration = Duration::from_secs(2);

    /// First pid handed out by the fake process manager
    pub const FIRST_PID: i32 = 1000;

    /// How long the harness waits for readiness
    pub const POLL: Duration = Duration::from_millis(100);

    pub fn policy() -> SupervisorPolicy {
        SupervisorPolicy {
            watchdog: WatchdogPolicy {
                staleness_window: Self::STALENESS,
                negotiation_timeout: Self::NEGOTIATION,
            },
            cooldown: Self::COOLDOWN,
            spawn_retry_interval: Self::SPAWN_RETRY,
        }
    }

    /// Fast configuration for tests that run the background activities
    pub fn fast_config(sources: u32) -> MuxConfig {
        let mut config = MuxConfig::default();
        for id in 0..sources {
            config = config.with_source(id, format!("test://8x8?id={id}"));
        }
        config.reader_interval = Duration::from_millis(2);
        config.tick_interval = Duration::from_millis(10);
        config.poll_timeout = Duration::from_millis(10);
        config.stats_interval = Duration::from_millis(50);
        config
    }

    /// Frame payload filled with one byte value
    pub fn payload(len: usize, fill: u8) -> Vec<u8> {
        vec![fill; len]
    }
}
