//! Source URL parsing
//!
//! Only the synthetic `test://WIDTHxHEIGHT` scheme is produced in-process.
//! Its query string configures the frame rate and fault injection:
//!
//! - `fps=N` frames per second (default 25)
//! - `frames=N` publish N frames, then report a clean pipeline exit
//! - `stall_after=N` stop publishing after N frames but keep running
//! - `crash_after=N` abort after N frames without reporting anything
//! - `publish=false` negotiate the slot but never publish

use std::time::Duration;
use url::Url;

use crate::error::{ProducerError, ProducerResult};

pub const TEST_SCHEME: &str = "test";

const DEFAULT_FPS: u32 = 25;
const MAX_DIMENSION: u32 = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frames: Option<u64>,
    pub stall_after: Option<u64>,
    pub crash_after: Option<u64>,
    pub publish: bool,
}

impl SourceSpec {
    pub fn parse(source: &str) -> ProducerResult<Self> {
        let url = Url::parse(source).map_err(|e| ProducerError::invalid_source(source, e.to_string()))?;
        if url.scheme() != TEST_SCHEME {
            return Err(ProducerError::UnsupportedScheme { scheme: url.scheme().to_string() });
        }

        let size = url
            .host_str()
            .ok_or_else(|| ProducerError::invalid_source(source, "missing WIDTHxHEIGHT"))?;
        let (width, height) = parse_size(size).ok_or_else(|| {
            ProducerError::invalid_source(source, format!("'{size}' is not WIDTHxHEIGHT"))
        })?;

        let mut spec = Self {
            width,
            height,
            fps: DEFAULT_FPS,
            frames: None,
            stall_after: None,
            crash_after: None,
            publish: true,
        };

        for (key, value) in url.query_pairs() {
            let invalid = |what: &str| ProducerError::invalid_source(source, format!("{key}={value}: {what}"));
            match key.as_ref() {
                "fps" => {
                    spec.fps = value.parse().map_err(|_| invalid("not a number"))?;
                    if spec.fps == 0 {
                        return Err(invalid("must be positive"));
                    }
                }
                "frames" => spec.frames = Some(value.parse().map_err(|_| invalid("not a number"))?),
                "stall_after" => spec.stall_after = Some(value.parse().map_err(|_| invalid("not a number"))?),
                "crash_after" => spec.crash_after = Some(value.parse().map_err(|_| invalid("not a number"))?),
                "publish" => spec.publish = value.parse().map_err(|_| invalid("expected true or false"))?,
                // Unknown keys are tolerated so sources can carry labels.
                _ => {}
            }
        }
        Ok(spec)
    }

    /// Bytes in one packed RGB frame
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps
    }
}

fn parse_size(size: &str) -> Option<(u32, u32)> {
    let (w, h) = size.split_once(['x', 'X'])?;
    let w: u32 = w.parse().ok()?;
    let h: u32 = h.parse().ok()?;
    let valid = |d: u32| (1..=MAX_DIMENSION).contains(&d);
    (valid(w) && valid(h)).then_some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_test_source() {
        let spec = SourceSpec::parse("test://640x480").unwrap();
        assert_eq!((spec.width, spec.height), (640, 480));
        assert_eq!(spec.fps, DEFAULT_FPS);
        assert!(spec.publish);
        assert_eq!(spec.frame_len(), 640 * 480 * 3);
        assert_eq!(spec.frame_interval(), Duration::from_millis(40));
    }

    #[test]
    fn test_fault_knobs() {
        let spec = SourceSpec::parse("test://16x8?fps=50&frames=10&stall_after=3&crash_after=7&publish=false&id=2")
            .unwrap();
        assert_eq!(spec.fps, 50);
        assert_eq!(spec.frames, Some(10));
        assert_eq!(spec.stall_after, Some(3));
        assert_eq!(spec.crash_after, Some(7));
        assert!(!spec.publish);
    }

    #[test]
    fn test_other_schemes_are_unsupported() {
        assert!(matches!(
            SourceSpec::parse("rtsp://10.0.0.7/live"),
            Err(ProducerError::UnsupportedScheme { scheme }) if scheme == "rtsp"
        ));
    }

    #[test]
    fn test_invalid_sources() {
        for source in ["not a url", "test://", "test://64", "test://0x10", "test://8x8?fps=0", "test://8x8?frames=x"] {
            assert!(
                matches!(SourceSpec::parse(source), Err(ProducerError::InvalidSource { .. })),
                "{source} should be rejected"
            );
        }
    }
}
