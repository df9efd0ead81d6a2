//! Frame pipeline: paces the pattern into a sink and applies fault knobs

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::core::pattern::Pattern;
use crate::error::ProducerResult;
use crate::source::SourceSpec;
use crate::traits::FrameSink;
use shared::{process_debug, ProcessId, PublishOutcome};

/// What the pipeline wants to happen after one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep going at the frame rate
    Continue,
    /// Stop publishing but stay alive
    Stall,
    /// Die without reporting anything
    Crash,
    /// Frame limit reached; report a clean exit
    Finished,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub produced: u64,
    pub published: u64,
    pub replaced: u64,
    pub busy: u64,
}

pub struct Pipeline<S: FrameSink> {
    spec: SourceSpec,
    sink: S,
    pattern: Pattern,
    stats: PipelineStats,
}

impl<S: FrameSink> Pipeline<S> {
    pub fn new(spec: SourceSpec, sink: S) -> Self {
        let pattern = Pattern::new(spec.width, spec.height);
        Self { spec, sink, pattern, stats: PipelineStats::default() }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Produce at most one frame
    pub fn step(&mut self) -> ProducerResult<Step> {
        let produced = self.stats.produced;
        let reached = |limit: Option<u64>| limit.is_some_and(|n| produced >= n);

        if reached(self.spec.crash_after) {
            return Ok(Step::Crash);
        }
        if reached(self.spec.frames) {
            return Ok(Step::Finished);
        }
        if reached(self.spec.stall_after) {
            return Ok(Step::Stall);
        }
        if !self.spec.publish {
            self.sink.negotiate(self.pattern.frame_len())?;
            return Ok(Step::Stall);
        }

        let (width, height) = (self.pattern.width(), self.pattern.height());
        let frame = self.pattern.next_frame();
        match self.sink.publish(frame, width, height)? {
            PublishOutcome::Published => self.stats.published += 1,
            PublishOutcome::Replaced => self.stats.replaced += 1,
            // The muxer is copying; the next tick brings a newer frame anyway.
            PublishOutcome::Busy => self.stats.busy += 1,
        }
        self.stats.produced += 1;
        Ok(Step::Continue)
    }

    /// Step at the source frame rate until something other than `Continue`
    pub async fn run(&mut self) -> ProducerResult<Step> {
        self.run_with_interval(self.spec.frame_interval()).await
    }

    pub async fn run_with_interval(&mut self, period: Duration) -> ProducerResult<Step> {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let step = self.step()?;
            if step != Step::Continue {
                process_debug!(ProcessId::current(), "Pipeline {:?} after {:?}", step, self.stats);
                return Ok(step);
            }
        }
    }
}
