use tracing::{debug, info};

use crate::error::{ConfigError, Result};
use crate::video::types::{Clip, ClipInfo, Frame};

/// How two adjacent clips are joined
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Cut,
    Crossfade(f64),
}

impl Transition {
    fn overlap(&self) -> f64 {
        match self {
            Transition::Cut => 0.0,
            Transition::Crossfade(fade) => *fade,
        }
    }
}

/// One clip placed on the output timeline
#[derive(Debug)]
pub struct Segment {
    clip: Box<dyn Clip>,
    /// Output time at which the segment starts
    start: f64,
    /// Clip-local time of the first frame used
    clip_in: f64,
    /// Clip-local time at which the segment stops
    clip_out: f64,
    /// Overlap with the previous segment, zero for a hard cut
    fade_in: f64,
}

impl Segment {
    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.start + (self.clip_out - self.clip_in)
    }

    pub fn fade_in(&self) -> f64 {
        self.fade_in
    }

    pub fn label(&self) -> String {
        self.clip.label()
    }

    fn local_time(&self, t: f64) -> f64 {
        let local = self.clip_in + (t - self.start);
        // Stay inside [clip_in, clip_out); the clip clamps sub-frame overshoot
        local.clamp(self.clip_in, self.clip_out.max(self.clip_in))
    }
}

/// Share of the incoming clip `elapsed` seconds into a crossfade of `fade`
/// seconds. Rises linearly from 0.0 to 1.0; the outgoing clip gets the rest.
pub fn crossfade_weight(elapsed: f64, fade: f64) -> f32 {
    if fade <= 0.0 {
        return 1.0;
    }
    (elapsed / fade).clamp(0.0, 1.0) as f32
}

/// Ordered, gap-free composition of clips.
///
/// Segments follow each other in output time; the only overlaps are
/// crossfades, where the incoming segment starts `fade_in` seconds before the
/// previous one ends. Frames are resolved lazily in [`Clip::frame_at`].
#[derive(Debug)]
pub struct Timeline {
    segments: Vec<Segment>,
    width: u32,
    height: u32,
    fps: f64,
    duration: f64,
}

impl Timeline {
    /// Timeline holding a single clip
    pub fn from_clip(clip: Box<dyn Clip>, fps: f64) -> Self {
        let info = clip.info();
        let duration = info.duration;
        Self {
            segments: vec![Segment {
                clip,
                start: 0.0,
                clip_in: 0.0,
                clip_out: duration,
                fade_in: 0.0,
            }],
            width: info.width,
            height: info.height,
            fps,
            duration,
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Place `clip` after the current end of the timeline.
    ///
    /// With a crossfade the clip starts `fade` seconds early and is blended
    /// over the tail of the last segment.
    pub fn append(&mut self, clip: Box<dyn Clip>, transition: Transition) -> Result<()> {
        let info = clip.info();
        assert_eq!(
            (info.width, info.height),
            (self.width, self.height),
            "clip {} is not at the canonical size",
            clip.label()
        );

        let fade = transition.overlap();
        if fade > 0.0 {
            let index = self.segments.len();
            let previous = self
                .segments
                .last()
                .map(|s| s.end() - s.start)
                .unwrap_or(0.0);
            if fade > previous {
                return Err(ConfigError::FadeTooLong {
                    fade,
                    index: index - 1,
                    duration: previous,
                }
                .into());
            }
            if fade > info.duration {
                return Err(ConfigError::FadeTooLong {
                    fade,
                    index,
                    duration: info.duration,
                }
                .into());
            }
        }

        let start = self.duration - fade;
        debug!(
            "Placing {} at {:.3}s ({:.3}s long, fade in {:.3}s)",
            clip.label(),
            start,
            info.duration,
            fade
        );

        self.segments.push(Segment {
            clip,
            start,
            clip_in: 0.0,
            clip_out: info.duration,
            fade_in: fade,
        });
        self.duration = start + info.duration;
        Ok(())
    }

    /// Truncate at exactly `max_duration` seconds.
    ///
    /// Segments starting at or after the cut are dropped and the one spanning
    /// it is shortened mid-clip. A timeline already within budget is returned
    /// unchanged.
    pub fn trim(mut self, max_duration: f64) -> Result<Self> {
        if !(max_duration.is_finite() && max_duration > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "max_duration".to_string(),
                value: max_duration.to_string(),
            }
            .into());
        }

        if self.duration <= max_duration {
            debug!(
                "Timeline is {:.3}s, within the {:.3}s limit",
                self.duration, max_duration
            );
            return Ok(self);
        }

        let before = self.segments.len();
        self.segments.retain(|segment| segment.start < max_duration);
        for segment in &mut self.segments {
            if segment.end() > max_duration {
                segment.clip_out = segment.clip_in + (max_duration - segment.start);
            }
        }

        info!(
            "Trimmed timeline from {:.3}s to {:.3}s ({} of {} segments kept)",
            self.duration,
            max_duration,
            self.segments.len(),
            before
        );
        self.duration = max_duration;
        Ok(self)
    }

    /// Index of the last of the first `count` segments that has started by `t`
    fn segment_index_at(&self, t: f64, count: usize) -> usize {
        self.segments[..count]
            .partition_point(|segment| segment.start <= t)
            .saturating_sub(1)
    }

    /// Frame at `t` composed from the first `count` segments only.
    ///
    /// Inside a fade the outgoing side is itself resolved this way, so a clip
    /// shorter than two fades still contributes while its successor fades in.
    fn compose_at(&mut self, t: f64, count: usize) -> Result<Frame> {
        let index = self.segment_index_at(t, count);

        let incoming = &self.segments[index];
        let elapsed = t - incoming.start;
        let local = incoming.local_time(t);

        if index == 0 || incoming.fade_in <= 0.0 || elapsed >= incoming.fade_in {
            return self.segments[index].clip.frame_at(local);
        }

        let weight = crossfade_weight(elapsed, incoming.fade_in);
        let outgoing_frame = self.compose_at(t, index)?;
        let incoming_frame = self.segments[index].clip.frame_at(local)?;

        Ok(outgoing_frame.blend(&incoming_frame, weight))
    }
}

impl Clip for Timeline {
    fn label(&self) -> String {
        format!("timeline ({} segments)", self.segments.len())
    }

    fn info(&self) -> ClipInfo {
        ClipInfo {
            width: self.width,
            height: self.height,
            fps: self.fps,
            duration: self.duration,
        }
    }

    fn frame_at(&mut self, t: f64) -> Result<Frame> {
        let t = t.clamp(0.0, self.duration);
        let count = self.segments.len();
        self.compose_at(t, count)
    }

    fn close(&mut self) {
        for segment in &mut self.segments {
            segment.clip.close();
        }
    }
}

/// Joins normalized clips into one timeline
#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    transition: Transition,
    fps: f64,
}

impl Compositor {
    pub fn new(transition: Transition, fps: f64) -> Self {
        Self { transition, fps }
    }

    pub fn hard_cuts(fps: f64) -> Self {
        Self::new(Transition::Cut, fps)
    }

    pub fn crossfade(fade: f64, fps: f64) -> Self {
        Self::new(Transition::Crossfade(fade), fps)
    }

    /// Stitch `clips` together in order.
    ///
    /// Every clip must already be at the same canonical size; a mismatch is a
    /// bug in the caller and panics.
    pub fn compose(&self, clips: Vec<Box<dyn Clip>>) -> Result<Timeline> {
        let mut clips = clips.into_iter();
        let first = clips.next().ok_or(ConfigError::EmptyInput)?;

        let mut timeline = Timeline::from_clip(first, self.fps);
        for clip in clips {
            timeline.append(clip, self.transition)?;
        }

        info!(
            "Composed {} clips with {}: {:.3}s",
            timeline.len(),
            match self.transition {
                Transition::Cut => "hard cuts".to_string(),
                Transition::Crossfade(fade) => format!("{:.2}s crossfades", fade),
            },
            timeline.duration
        );

        Ok(timeline)
    }
}
