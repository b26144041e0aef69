use std::time::Duration;

use crate::SchedulerError;

/// Upper bound on `--framerate`; keeps the `ceil(framerate) + 1` frame queue
/// to a few thousand slots.
pub const MAX_FRAMERATE: f64 = 4096.0;

/// Raw animation settings as supplied by the caller (CLI flags merged with a profile).
///
/// Zero values are treated as "not set", matching how the flags default.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnimationRequest {
    pub framerate: Option<f64>,
    pub num_frames: Option<u64>,
    pub duration: Option<Duration>,
    pub realtime: bool,
}

/// When the scheduler stops issuing ticks on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLimit {
    Unbounded,
    Frames(u64),
}

impl FrameLimit {
    pub fn reached(self, emitted: u64) -> bool {
        match self {
            FrameLimit::Unbounded => false,
            FrameLimit::Frames(limit) => emitted >= limit,
        }
    }

    pub fn target(self) -> Option<u64> {
        match self {
            FrameLimit::Unbounded => None,
            FrameLimit::Frames(limit) => Some(limit),
        }
    }
}

/// Fully validated animation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationPlan {
    pub framerate: f64,
    pub interval: Duration,
    pub limit: FrameLimit,
    pub realtime: bool,
}

impl AnimationPlan {
    /// Capacity of the bounded queue between the render worker and the pacing stage.
    pub fn queue_capacity(&self) -> usize {
        self.framerate.ceil() as usize + 1
    }
}

/// What the caller should do once the request has been validated.
#[derive(Debug, Clone, PartialEq)]
pub enum RunPlan {
    /// No framerate: render exactly one frame synchronously.
    Still,
    Animate(AnimationPlan),
}

fn normalize_framerate(value: Option<f64>) -> Result<Option<f64>, SchedulerError> {
    match value {
        None => Ok(None),
        Some(fps) if fps == 0.0 => Ok(None),
        Some(fps) if fps.is_finite() && fps > 0.0 && fps <= MAX_FRAMERATE => Ok(Some(fps)),
        Some(fps) => Err(SchedulerError::InvalidFramerate(fps)),
    }
}

impl AnimationRequest {
    /// Validates the request and converts a duration limit into a frame count.
    ///
    /// A duration `D` at framerate `F` yields `floor(D * F)` frames.
    pub fn resolve(&self) -> Result<RunPlan, SchedulerError> {
        let num_frames = self.num_frames.filter(|&n| n > 0);
        let duration = self.duration.filter(|d| !d.is_zero());
        if num_frames.is_some() && duration.is_some() {
            return Err(SchedulerError::Conflict);
        }

        let Some(framerate) = normalize_framerate(self.framerate)? else {
            if num_frames.is_some() {
                return Err(SchedulerError::RequiresFramerate("--numframes"));
            }
            if duration.is_some() {
                return Err(SchedulerError::RequiresFramerate("--duration"));
            }
            if self.realtime {
                return Err(SchedulerError::RequiresFramerate("--rt"));
            }
            return Ok(RunPlan::Still);
        };

        let limit = match (num_frames, duration) {
            (Some(frames), _) => FrameLimit::Frames(frames),
            // The epsilon keeps products such as 2.3s * 10fps from landing on 22.999...
            (None, Some(duration)) => {
                FrameLimit::Frames((duration.as_secs_f64() * framerate + 1e-9).floor() as u64)
            }
            (None, None) => FrameLimit::Unbounded,
        };

        let interval = Duration::try_from_secs_f64(1.0 / framerate)
            .map_err(|_| SchedulerError::InvalidFramerate(framerate))?;

        Ok(RunPlan::Animate(AnimationPlan {
            framerate,
            interval,
            limit,
            realtime: self.realtime,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn animate(request: AnimationRequest) -> AnimationPlan {
        match request.resolve().unwrap() {
            RunPlan::Animate(plan) => plan,
            RunPlan::Still => panic!("expected an animation plan"),
        }
    }

    #[test]
    fn no_framerate_means_still() {
        assert_eq!(AnimationRequest::default().resolve().unwrap(), RunPlan::Still);
        let zero = AnimationRequest {
            framerate: Some(0.0),
            ..Default::default()
        };
        assert_eq!(zero.resolve().unwrap(), RunPlan::Still);
    }

    #[test]
    fn duration_and_frame_count_are_exclusive() {
        let request = AnimationRequest {
            framerate: Some(30.0),
            num_frames: Some(10),
            duration: Some(Duration::from_secs(2)),
            realtime: false,
        };
        assert!(matches!(request.resolve(), Err(SchedulerError::Conflict)));
    }

    #[test]
    fn limits_require_framerate() {
        let request = AnimationRequest {
            num_frames: Some(4),
            ..Default::default()
        };
        assert!(matches!(
            request.resolve(),
            Err(SchedulerError::RequiresFramerate("--numframes"))
        ));

        let request = AnimationRequest {
            realtime: true,
            ..Default::default()
        };
        assert!(matches!(
            request.resolve(),
            Err(SchedulerError::RequiresFramerate("--rt"))
        ));
    }

    #[test]
    fn duration_converts_to_floored_frame_count() {
        let plan = animate(AnimationRequest {
            framerate: Some(30.0),
            duration: Some(Duration::from_millis(2500)),
            ..Default::default()
        });
        assert_eq!(plan.limit, FrameLimit::Frames(75));

        let plan = animate(AnimationRequest {
            framerate: Some(24.0),
            duration: Some(Duration::from_millis(1010)),
            ..Default::default()
        });
        assert_eq!(plan.limit, FrameLimit::Frames(24));

        let plan = animate(AnimationRequest {
            framerate: Some(10.0),
            duration: Some(Duration::from_secs_f64(2.3)),
            ..Default::default()
        });
        assert_eq!(plan.limit, FrameLimit::Frames(23));
    }

    #[test]
    fn queue_capacity_is_ceil_framerate_plus_one() {
        let plan = animate(AnimationRequest {
            framerate: Some(29.97),
            ..Default::default()
        });
        assert_eq!(plan.queue_capacity(), 31);
        assert_eq!(plan.limit, FrameLimit::Unbounded);
    }

    #[test]
    fn negative_framerate_is_rejected() {
        let request = AnimationRequest {
            framerate: Some(-5.0),
            ..Default::default()
        };
        assert!(matches!(
            request.resolve(),
            Err(SchedulerError::InvalidFramerate(_))
        ));
    }

    #[test]
    fn framerates_without_a_representable_interval_are_rejected() {
        for framerate in [1e-20, f64::MIN_POSITIVE] {
            let request = AnimationRequest {
                framerate: Some(framerate),
                ..Default::default()
            };
            assert!(matches!(
                request.resolve(),
                Err(SchedulerError::InvalidFramerate(_))
            ));
        }
    }

    #[test]
    fn framerate_is_capped_to_bound_the_queue() {
        let plan = animate(AnimationRequest {
            framerate: Some(MAX_FRAMERATE),
            ..Default::default()
        });
        assert_eq!(plan.queue_capacity(), MAX_FRAMERATE as usize + 1);

        let request = AnimationRequest {
            framerate: Some(1e9),
            ..Default::default()
        };
        assert!(matches!(
            request.resolve(),
            Err(SchedulerError::InvalidFramerate(_))
        ));
    }
}
