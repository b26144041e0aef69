use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::cancel::{CancelReason, CancellationToken};
use crate::clock::{Tick, VirtualClock};
use crate::plan::{AnimationPlan, FrameLimit};
use crate::SchedulerError;

/// Evaluates the shader for one tick.
///
/// Implementations own the GPU context, so `render` is only ever called from
/// the thread that drives [`run_animation`] and never concurrently.
pub trait FrameProducer {
    type Frame: Send + 'static;

    fn render(&mut self, tick: &Tick) -> anyhow::Result<Self::Frame>;
}

impl<P: FrameProducer + ?Sized> FrameProducer for &mut P {
    type Frame = P::Frame;

    fn render(&mut self, tick: &Tick) -> anyhow::Result<Self::Frame> {
        (**self).render(tick)
    }
}

/// A rendered frame travelling from the render worker to the pacing stage.
#[derive(Debug)]
pub struct TimedFrame<F> {
    pub tick: Tick,
    pub frame: F,
    pub render_time: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Rendering,
    Completed,
    Cancelled,
}

/// Throughput numbers computed by the pacing stage for every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMetrics {
    pub index: u64,
    pub timestamp: Duration,
    /// Wall-clock time since the previous frame was released.
    pub elapsed: Duration,
    pub fps: f64,
    /// Virtual interval divided by `elapsed`; above 1.0 means faster than real time.
    pub speed: f64,
    /// Frames seen so far, this one included.
    pub frames: u64,
    pub target: Option<u64>,
}

impl FrameMetrics {
    fn measure(tick: &Tick, elapsed: Duration, target: Option<u64>) -> Self {
        let secs = elapsed.as_secs_f64();
        let (fps, speed) = if secs > 0.0 {
            (1.0 / secs, tick.interval.as_secs_f64() / secs)
        } else {
            (f64::INFINITY, f64::INFINITY)
        };
        Self {
            index: tick.index,
            timestamp: tick.timestamp,
            elapsed,
            fps,
            speed,
            frames: tick.index + 1,
            target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Completed,
    Cancelled(CancelReason),
}

/// Outcome of [`run_animation`] once every stage has terminated.
#[derive(Debug)]
pub struct PipelineReport {
    pub frames_rendered: u64,
    /// Frames handed to the encoder stage.
    pub frames_delivered: u64,
    pub state: PipelineState,
    /// The render or encode error that cancelled the pipeline, if any.
    pub failure: Option<SchedulerError>,
}

impl PipelineReport {
    /// Converts a failed run into its error, keeping interrupted runs successful.
    pub fn into_result(self) -> Result<Self, SchedulerError> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Drives the virtual clock and the frame producer, one tick at a time.
pub struct FrameScheduler<P> {
    producer: P,
    clock: VirtualClock,
    limit: FrameLimit,
    state: SchedulerState,
    rendered: u64,
}

impl<P: FrameProducer> FrameScheduler<P> {
    pub fn new(producer: P, interval: Duration, limit: FrameLimit) -> Self {
        Self {
            producer,
            clock: VirtualClock::new(interval),
            limit,
            state: SchedulerState::Idle,
            rendered: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn frames_rendered(&self) -> u64 {
        self.rendered
    }

    /// Renders ticks into `queue` until the frame limit is reached, the token
    /// is cancelled, or the downstream stage goes away.
    ///
    /// `queue` is dropped before returning, which closes it for the pacing
    /// stage exactly once.
    pub fn run(
        &mut self,
        queue: Sender<TimedFrame<P::Frame>>,
        cancel: &CancellationToken,
    ) -> Result<(), SchedulerError> {
        self.state = SchedulerState::Rendering;
        let outcome = self.produce(&queue, cancel);
        drop(queue);
        debug!(
            frames = self.rendered,
            state = ?self.state,
            "frame scheduler stopped"
        );
        outcome
    }

    fn produce(
        &mut self,
        queue: &Sender<TimedFrame<P::Frame>>,
        cancel: &CancellationToken,
    ) -> Result<(), SchedulerError> {
        loop {
            if cancel.is_cancelled() {
                self.state = SchedulerState::Cancelled;
                return Ok(());
            }
            if self.limit.reached(self.rendered) {
                self.state = SchedulerState::Completed;
                return Ok(());
            }

            let tick = self.clock.tick();
            let started = Instant::now();
            let frame = match self.producer.render(&tick) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(frame = tick.index, error = %format!("{err:#}"), "render failed");
                    cancel.cancel(CancelReason::RenderFailed);
                    self.state = SchedulerState::Cancelled;
                    return Err(SchedulerError::Render {
                        frame: tick.index,
                        source: err.into(),
                    });
                }
            };
            let render_time = started.elapsed();
            self.rendered += 1;
            trace!(
                frame = tick.index,
                timestamp_ms = tick.timestamp.as_millis() as u64,
                render_ms = render_time.as_secs_f64() * 1000.0,
                "frame rendered"
            );

            let timed = TimedFrame {
                tick,
                frame,
                render_time,
            };
            select! {
                send(queue, timed) -> sent => {
                    if sent.is_err() {
                        debug!(frame = tick.index, "pacing stage closed its input");
                        self.state = SchedulerState::Cancelled;
                        return Ok(());
                    }
                }
                recv(cancel.signal()) -> _ => {
                    self.state = SchedulerState::Cancelled;
                    return Ok(());
                }
            }
        }
    }
}

/// Renders the single frame of a still image, synchronously and without a queue.
pub fn render_still<P: FrameProducer>(mut producer: P) -> Result<P::Frame, SchedulerError> {
    producer
        .render(&Tick::still())
        .map_err(|err| SchedulerError::Render {
            frame: 0,
            source: err.into(),
        })
}

/// Receives rendered frames, reports metrics, applies real-time pacing and
/// forwards frames to the encoder. Returns the number of frames forwarded.
fn pace<F>(
    input: Receiver<TimedFrame<F>>,
    output: Sender<F>,
    plan: &AnimationPlan,
    cancel: &CancellationToken,
    on_frame: &mut dyn FnMut(&FrameMetrics),
) -> u64 {
    let target = plan.limit.target();
    let mut delivered = 0u64;
    let mut last = Instant::now();

    for timed in input.iter() {
        let elapsed = last.elapsed();
        on_frame(&FrameMetrics::measure(&timed.tick, elapsed, target));

        if plan.realtime && !cancel.sleep(plan.interval.saturating_sub(elapsed)) {
            break;
        }
        last = Instant::now();
        if cancel.is_cancelled() {
            break;
        }

        select! {
            send(output, timed.frame) -> sent => {
                if sent.is_err() {
                    break;
                }
            }
            recv(cancel.signal()) -> _ => break,
        }
        delivered += 1;
    }

    drop(output);
    let discarded = input.iter().count();
    if discarded > 0 {
        debug!(discarded, "discarded queued frames after cancellation");
    }
    delivered
}

/// Runs the three-stage animation pipeline to completion.
///
/// The render worker runs on the calling thread, the pacing and encoder stages
/// on scoped worker threads. The render worker feeds a queue of capacity
/// `ceil(framerate) + 1`; the pacing stage hands frames to `consume` through a
/// rendezvous channel. `consume` receives the frame stream and the virtual
/// interval, and must return once the stream ends. An error from it cancels
/// the pipeline.
pub fn run_animation<P, M, C>(
    producer: P,
    plan: &AnimationPlan,
    cancel: &CancellationToken,
    mut on_frame: M,
    consume: C,
) -> Result<PipelineReport, SchedulerError>
where
    P: FrameProducer,
    M: FnMut(&FrameMetrics) + Send,
    C: FnOnce(&Receiver<P::Frame>, Duration) -> anyhow::Result<()> + Send,
{
    let capacity = plan.queue_capacity();
    let interval = plan.interval;
    debug!(
        framerate = plan.framerate,
        capacity,
        realtime = plan.realtime,
        target = ?plan.limit.target(),
        "starting animation pipeline"
    );

    let mut scheduler = FrameScheduler::new(producer, interval, plan.limit);

    let (render_result, delivered, encode_result) = thread::scope(|scope| {
        let (frame_tx, frame_rx) = bounded::<TimedFrame<P::Frame>>(capacity);
        let (encode_tx, encode_rx) = bounded::<P::Frame>(0);

        let consumer = thread::Builder::new()
            .name("frame-encoder".into())
            .spawn_scoped(scope, move || {
                let result = consume(&encode_rx, interval);
                if let Err(err) = &result {
                    warn!(error = %format!("{err:#}"), "encoder failed");
                    cancel.cancel(CancelReason::EncodeFailed);
                }
                for _ in encode_rx.iter() {}
                result
            })?;

        let pacing = thread::Builder::new()
            .name("frame-pacing".into())
            .spawn_scoped(scope, move || {
                pace(frame_rx, encode_tx, plan, cancel, &mut on_frame)
            })?;

        let render_result = scheduler.run(frame_tx, cancel);

        let delivered = pacing
            .join()
            .map_err(|_| SchedulerError::WorkerPanicked("pacing"))?;
        let encode_result = consumer
            .join()
            .map_err(|_| SchedulerError::WorkerPanicked("encoder"))?;
        Ok::<_, SchedulerError>((render_result, delivered, encode_result))
    })?;

    let state = match cancel.reason() {
        Some(reason) => PipelineState::Cancelled(reason),
        None => PipelineState::Completed,
    };
    let failure = match (render_result, encode_result) {
        (Err(err), _) => Some(err),
        (Ok(()), Err(err)) => Some(SchedulerError::Encode(err.into())),
        (Ok(()), Ok(())) => None,
    };

    Ok(PipelineReport {
        frames_rendered: scheduler.frames_rendered(),
        frames_delivered: delivered,
        state,
        failure,
    })
}
