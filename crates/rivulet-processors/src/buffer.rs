//! Multichannel record/playback buffer (`buffer~`).
//!
//! A [`BufferPlayer`] owns a [`BufferData`] and a play head. Depending on its
//! [`Mode`] it records its audio inlets into the buffer, plays the buffer to its
//! outlets, or both, inside a region `[region_start, region_end)`.
//!
//! ## Ports
//!
//! Inlets `0..channels` carry audio to record; the last inlet is a dedicated
//! trigger input. Outlets `0..channels` carry playback.
//!
//! ## Triggering
//!
//! When the trigger source (`trig_chan`, where `-1` selects the trigger inlet)
//! has a connection, it is scanned sample by sample. A sample is *active* when
//! it lies beyond `threshold` in the configured [`Direction`]; `debounce`
//! consecutive active samples fire a trigger, and the source must go inactive
//! again before it can fire the next one. Without a connection only the `bang`
//! and `stop` parameters drive the player.
//!
//! ```text
//!   Idle ──active──▶ Pretriggered ──fire──▶ Triggered ──inactive──▶ Debounced
//!    ▲   ◀─inactive──┘                         ▲                        │ active
//!    │                                         │ xfade done             ▼
//!    └── stop / region end             Xfade ◀──────fire────────── PreRetriggered
//! ```
//!
//! Each block is split into sections at every state change, at the region end
//! and at the end of a crossfade, so triggers take effect on the exact sample.
//!
//! ## Resizing
//!
//! Changing `frames` or `channels` submits a request to the session's
//! [`AsyncAllocator`](rivulet_core::AsyncAllocator). The player keeps running
//! on its current buffer until the new one is ready, and only swaps while it is
//! not running (`Idle` or `Pretriggered`). The new buffer starts silent.

use std::borrow::Cow;

use rivulet_core::{
    AllocError, AllocSlot, Allocate, ConfigError, CreateArgs, GeneratorKind, Io, ParamMap,
    ParamSpec, Payload, ProcessContext, Processor, ProcessorError, ProcessorType, ResponseKind,
    SampleBlock,
};

/// Largest buffer, in frames per channel.
pub const MAX_FRAMES: usize = 1 << 27;

/// Largest channel count.
pub const MAX_CHANNELS: usize = 64;

/// Longest crossfade, in samples.
const MAX_XFADE: i64 = 1 << 20;

/// Longest debounce, in samples.
const MAX_DEBOUNCE: i64 = 1 << 20;

// ---------------------------------------------------------------------------
// Buffer storage
// ---------------------------------------------------------------------------

/// Dimensions of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferShape {
    /// Samples per channel.
    pub frames: usize,
    /// Number of channels.
    pub channels: usize,
}

impl BufferShape {
    /// Reads and validates `frames` and `channels`.
    pub fn from_params(params: &ParamMap) -> Result<Self, ConfigError> {
        let frames = params.int("frames");
        if !(1..=MAX_FRAMES as i64).contains(&frames) {
            return Err(ConfigError::out_of_range("frames", frames as f64, 1.0, MAX_FRAMES as f64));
        }
        let channels = params.int("channels");
        if !(1..=MAX_CHANNELS as i64).contains(&channels) {
            return Err(ConfigError::out_of_range(
                "channels",
                channels as f64,
                1.0,
                MAX_CHANNELS as f64,
            ));
        }
        Ok(Self {
            frames: frames as usize,
            channels: channels as usize,
        })
    }
}

/// Sample storage of a [`BufferPlayer`], one contiguous block per channel.
#[derive(Debug, Clone)]
pub struct BufferData {
    channels: Vec<SampleBlock>,
    frames: usize,
}

impl BufferData {
    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    /// Current dimensions.
    pub fn shape(&self) -> BufferShape {
        BufferShape {
            frames: self.frames,
            channels: self.channels.len(),
        }
    }

    /// Samples of channel `ch`.
    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.channels[ch]
    }
}

impl Allocate for BufferData {
    type Request = BufferShape;

    fn allocate(shape: BufferShape) -> Result<Self, AllocError> {
        let mut channels = Vec::new();
        channels
            .try_reserve_exact(shape.channels)
            .map_err(|e| AllocError::Failed(e.to_string()))?;
        for _ in 0..shape.channels {
            let mut samples = Vec::new();
            samples
                .try_reserve_exact(shape.frames)
                .map_err(|e| AllocError::Failed(e.to_string()))?;
            samples.resize(shape.frames, 0.0);
            channels.push(SampleBlock::from(samples));
        }
        tracing::debug!(
            "buffer_alloc: {} frames x {} channels",
            shape.frames,
            shape.channels
        );
        Ok(Self {
            channels,
            frames: shape.frames,
        })
    }
}

// ---------------------------------------------------------------------------
// Modes, trigger detection
// ---------------------------------------------------------------------------

/// What the player does once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Record the region once, then stop.
    RecordOnce,
    /// Record until the next trigger or bang, which sets the region end; then
    /// loop the recorded region.
    RecordLoopset,
    /// Record the region over and over.
    RecordLoop,
    /// Record the region once per trigger, accepting retriggers.
    RecordTrigger,
    /// Play the region once, then stop.
    PlayOnce,
    /// Play the region over and over.
    PlayLoop,
    /// Play the region once per trigger, accepting retriggers.
    PlayTrigger,
}

impl Mode {
    /// Parses a `mode` parameter value.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "record_once" => Mode::RecordOnce,
            "record_loopset" => Mode::RecordLoopset,
            "record_loop" => Mode::RecordLoop,
            "record_trigger" => Mode::RecordTrigger,
            "play_once" => Mode::PlayOnce,
            "play_loop" => Mode::PlayLoop,
            "play_trigger" => Mode::PlayTrigger,
            _ => return None,
        })
    }

    /// Parameter spelling.
    pub const fn name(self) -> &'static str {
        match self {
            Mode::RecordOnce => "record_once",
            Mode::RecordLoopset => "record_loopset",
            Mode::RecordLoop => "record_loop",
            Mode::RecordTrigger => "record_trigger",
            Mode::PlayOnce => "play_once",
            Mode::PlayLoop => "play_loop",
            Mode::PlayTrigger => "play_trigger",
        }
    }

    /// Returns true for modes that write into the buffer.
    pub const fn records(self) -> bool {
        matches!(
            self,
            Mode::RecordOnce | Mode::RecordLoopset | Mode::RecordLoop | Mode::RecordTrigger
        )
    }

    /// Returns true for modes that restart on a trigger while running.
    pub const fn retriggers(self) -> bool {
        matches!(self, Mode::RecordTrigger | Mode::PlayTrigger)
    }

    const fn loops(self) -> bool {
        matches!(self, Mode::RecordLoop | Mode::PlayLoop)
    }
}

/// Which side of the threshold counts as active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Active above the threshold.
    Rising,
    /// Active below the threshold.
    Falling,
}

impl Direction {
    /// Parses a `direction` parameter value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rising" => Some(Direction::Rising),
            "falling" => Some(Direction::Falling),
            _ => None,
        }
    }
}

/// Threshold detector with debounce and re-arming.
#[derive(Debug, Clone)]
struct Detector {
    threshold: f32,
    direction: Direction,
    /// Consecutive active samples needed to fire (at least 1).
    required: u32,
    /// Consecutive active samples seen while armed.
    count: u32,
    /// The source has been inactive since the last fire.
    armed: bool,
}

impl Detector {
    fn new() -> Self {
        Self {
            threshold: 0.5,
            direction: Direction::Rising,
            required: 1,
            count: 0,
            armed: false,
        }
    }

    fn disarm(&mut self) {
        self.count = 0;
        self.armed = false;
    }

    /// Feeds one sample. Returns true when a trigger fires on it.
    #[inline]
    fn step(&mut self, x: f32) -> bool {
        let active = match self.direction {
            Direction::Rising => x > self.threshold,
            Direction::Falling => x < self.threshold,
        };
        if !active {
            self.armed = true;
            self.count = 0;
            return false;
        }
        if !self.armed {
            return false;
        }
        self.count += 1;
        if self.count >= self.required {
            self.disarm();
            return true;
        }
        false
    }
}

/// Player state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Stopped, waiting for a trigger.
    Idle,
    /// Stopped, trigger source active but still debouncing.
    Pretriggered,
    /// Running; the source has not gone inactive since it fired.
    Triggered,
    /// Running and re-armed.
    Debounced,
    /// Running, source active again and debouncing a retrigger.
    PreRetriggered,
    /// Running, crossfading from the old play head to the new one.
    Xfade,
}

impl PlayerState {
    /// Returns true unless stopped.
    pub const fn is_running(self) -> bool {
        !matches!(self, PlayerState::Idle | PlayerState::Pretriggered)
    }
}

fn bit(mask: i64, ch: usize) -> bool {
    ch < 64 && (mask as u64 >> ch) & 1 == 1
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// `buffer~`: the buffer player processor. See the [module docs](self).
pub struct BufferPlayer {
    buffer: BufferData,
    slot: AllocSlot<BufferData>,
    /// Shape the parameters ask for.
    wanted: BufferShape,

    /// Audio inlets/outlets.
    audio: usize,
    trigger_inlet: usize,

    mode: Mode,
    state: PlayerState,
    detector: Detector,
    trig_chan: i64,
    rec_enabled: bool,
    rec_mask: i64,
    play_mask: i64,
    overdub: bool,
    rec_offset: i64,
    region_start: usize,
    region_end: Option<usize>,
    /// Region end fixed by `record_loopset`.
    loop_end: Option<usize>,
    /// `record_loopset` has finished its take and is looping.
    take_done: bool,

    position: usize,
    xfade_len: usize,
    xfade_left: usize,
    old_position: usize,

    bang_pending: bool,
    stop_pending: bool,
}

impl BufferPlayer {
    /// Descriptor registered as `buffer~`.
    pub fn processor_type() -> ProcessorType {
        ProcessorType::new("buffer~", GeneratorKind::Conditional, Self::create)
            .with_description("multichannel record/playback buffer with threshold triggering")
            .with_param(ParamSpec::int("frames", 48_000))
            .with_param(ParamSpec::int("channels", 1))
            .with_param(ParamSpec::text("mode", Mode::PlayOnce.name()))
            .with_param(ParamSpec::bool("rec_enabled", true))
            .with_param(ParamSpec::int("rec_mask", -1))
            .with_param(ParamSpec::int("play_mask", -1))
            .with_param(ParamSpec::float("threshold", 0.5))
            .with_param(ParamSpec::text("direction", "rising"))
            .with_param(ParamSpec::int("trig_chan", -1))
            .with_param(ParamSpec::int("debounce", 0))
            .with_param(ParamSpec::int("region_start", 0))
            .with_param(ParamSpec::int("region_end", -1))
            .with_param(ParamSpec::bool("overdub", false))
            .with_param(ParamSpec::int("rec_offset", 0))
            .with_param(ParamSpec::int("xfade", 0))
            .with_param(ParamSpec::bang("bang"))
            .with_param(ParamSpec::bang("stop"))
            .with_port_layout(Self::ports)
    }

    fn ports(params: &ParamMap) -> (usize, usize) {
        let channels = params.int("channels").clamp(1, MAX_CHANNELS as i64) as usize;
        (channels + 1, channels)
    }

    fn create(args: &CreateArgs<'_>) -> Result<Box<dyn Processor>, ProcessorError> {
        if args.inlets == 0 {
            return Err(ConfigError::invalid("channels", "buffer~ needs a trigger inlet").into());
        }
        let shape = BufferShape::from_params(args.params)?;
        let buffer = BufferData::allocate(shape)
            .map_err(|_| ProcessorError::fault("buffer allocation failed"))?;
        Ok(Box::new(Self::new(
            buffer,
            args.outlets.min(args.inlets - 1),
            args.inlets - 1,
        )))
    }

    /// Wraps `buffer` with `audio` audio ports and the trigger on inlet
    /// `trigger_inlet`. Every other setting comes from the first `config`.
    pub fn new(buffer: BufferData, audio: usize, trigger_inlet: usize) -> Self {
        let wanted = buffer.shape();
        Self {
            buffer,
            slot: AllocSlot::new(),
            wanted,
            audio,
            trigger_inlet,
            mode: Mode::PlayOnce,
            state: PlayerState::Idle,
            detector: Detector::new(),
            trig_chan: -1,
            rec_enabled: true,
            rec_mask: -1,
            play_mask: -1,
            overdub: false,
            rec_offset: 0,
            region_start: 0,
            region_end: None,
            loop_end: None,
            take_done: false,
            position: 0,
            xfade_len: 0,
            xfade_left: 0,
            old_position: 0,
            bang_pending: false,
            stop_pending: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Current buffer.
    pub fn buffer(&self) -> &BufferData {
        &self.buffer
    }

    /// Play head, in frames.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Effective `[start, end)` region, clamped to the buffer.
    pub fn region(&self) -> (usize, usize) {
        let frames = self.buffer.frames();
        let start = self.region_start.min(frames.saturating_sub(1));
        let mut end = self.region_end.map_or(frames, |e| e.min(frames));
        if let Some(loop_end) = self.loop_end {
            end = end.min(loop_end);
        }
        if end <= start { (0, frames) } else { (start, end) }
    }

    fn trigger_source(&self) -> usize {
        if self.trig_chan < 0 {
            self.trigger_inlet
        } else {
            self.trig_chan as usize
        }
    }

    fn recording(&self) -> bool {
        self.mode.records() && self.rec_enabled && !(self.mode == Mode::RecordLoopset && self.take_done)
    }

    /// Recomputes the state label from the run flag and detector.
    fn settle(&mut self, running: bool) {
        self.state = if !running {
            if self.detector.count > 0 {
                PlayerState::Pretriggered
            } else {
                PlayerState::Idle
            }
        } else if self.xfade_left > 0 {
            PlayerState::Xfade
        } else if self.detector.count > 0 {
            PlayerState::PreRetriggered
        } else if self.detector.armed {
            PlayerState::Debounced
        } else {
            PlayerState::Triggered
        };
    }

    fn halt(&mut self) {
        self.xfade_left = 0;
        self.settle(false);
    }

    /// Samples until the next section boundary of a running player.
    fn until_boundary(&self) -> usize {
        let (_, end) = self.region();
        let mut left = end.saturating_sub(self.position);
        if self.xfade_left > 0 {
            left = left.min(self.xfade_left);
        }
        left
    }

    /// Feeds `trig[from..to]` to the detector. Returns the index of the first
    /// sample that fires.
    fn scan(&mut self, trig: &[f32], from: usize, to: usize) -> Option<usize> {
        let running = self.state.is_running();
        for (i, &x) in trig.iter().enumerate().take(to).skip(from) {
            if self.detector.step(x) {
                return Some(i);
            }
        }
        self.settle(running);
        None
    }

    fn start(&mut self, at: usize, ctx: &ProcessContext<'_>) {
        self.loop_end = None;
        self.take_done = false;
        self.xfade_left = 0;
        self.position = self.region().0;
        self.settle(true);
        ctx.emit(ResponseKind::Triggered, Payload::Int(at as i64));
    }

    fn retrigger(&mut self, at: usize, ctx: &ProcessContext<'_>) {
        let (start, _) = self.region();
        if self.xfade_len > 0 {
            self.old_position = self.position;
            self.xfade_left = self.xfade_len;
        }
        self.position = start;
        self.settle(true);
        ctx.emit(ResponseKind::Triggered, Payload::Int(at as i64));
    }

    /// Ends a `record_loopset` take at the play head.
    fn close_take(&mut self, at: usize, ctx: &ProcessContext<'_>) {
        let (start, _) = self.region();
        if self.position <= start {
            return;
        }
        let end = self.position;
        self.loop_end = Some(end);
        self.take_done = true;
        self.position = start;
        self.settle(true);
        tracing::debug!("buffer_loopset: region [{start}, {end})");
        ctx.emit(ResponseKind::RegionSet, Payload::Int(end as i64));
        ctx.emit(ResponseKind::LoopStarted, Payload::Int(at as i64));
    }

    /// A trigger at sample `at` of the block. `manual` is set for bangs.
    fn fire(&mut self, at: usize, manual: bool, ctx: &ProcessContext<'_>) {
        if !self.state.is_running() {
            self.start(at, ctx);
        } else if self.mode == Mode::RecordLoopset && !self.take_done {
            self.close_take(at, ctx);
        } else if manual || self.mode.retriggers() {
            self.retrigger(at, ctx);
        } else {
            self.settle(true);
        }
    }

    /// Handles the crossfade end and region end reached at sample `at`.
    fn cross_boundary(&mut self, at: usize, ctx: &ProcessContext<'_>) {
        if self.state == PlayerState::Xfade && self.xfade_left == 0 {
            self.settle(true);
        }
        let (start, end) = self.region();
        if self.position < end {
            return;
        }
        if self.mode == Mode::RecordLoopset {
            if !self.take_done {
                self.close_take(at, ctx);
                return;
            }
        } else if !self.mode.loops() {
            self.halt();
            return;
        }
        self.position = start;
        ctx.emit(ResponseKind::LoopStarted, Payload::Int(at as i64));
    }

    /// Plays and records samples `a..b` of the block. The section never
    /// crosses the region end or the end of a crossfade.
    fn render(&mut self, ins: &[SampleBlock], outs: &mut [SampleBlock], a: usize, b: usize) {
        let len = b - a;
        let (start, end) = self.region();
        let region_len = (end - start) as i64;
        let pos = self.position;
        let offset = self.rec_offset;
        let old = self.old_position;
        let fade = self.xfade_left;
        let fade_len = self.xfade_len.max(1) as f32;
        let recording = self.recording();

        let write_index = |idx: usize| -> usize {
            let rel = (idx as i64 - start as i64 - offset).rem_euclid(region_len);
            start + rel as usize
        };

        let channels = self.audio.min(self.buffer.channels.len());
        for ch in 0..channels {
            let data = &mut self.buffer.channels[ch];
            if bit(self.play_mask, ch) {
                let out = &mut outs[ch][a..b];
                if fade > 0 {
                    for (i, o) in out.iter_mut().enumerate() {
                        let g = (fade - i) as f32 / fade_len;
                        let tail = if old + i < end { data[old + i] } else { 0.0 };
                        *o = data[pos + i] * (1.0 - g) + tail * g;
                    }
                } else {
                    out.copy_from_slice(&data[pos..pos + len]);
                }
            }
            if recording && bit(self.rec_mask, ch) {
                for (i, &x) in ins[ch][a..b].iter().enumerate() {
                    if fade > 0 {
                        let g = (fade - i - 1) as f32 / fade_len;
                        data[write_index(old + i)] *= g;
                    }
                    let w = write_index(pos + i);
                    data[w] = if self.overdub { data[w] + x } else { x };
                }
            }
        }

        self.position += len;
        if fade > 0 {
            self.old_position += len;
            self.xfade_left -= len;
        }
    }

    /// Brings the buffer towards the wanted shape.
    fn drive_alloc(&mut self, ctx: &mut ProcessContext<'_>) {
        if self.slot.is_pending() {
            ctx.request_reconfig();
            return;
        }
        if self.buffer.shape() == self.wanted {
            return;
        }
        match ctx.allocator().submit(&self.slot, self.wanted) {
            Ok(()) => {
                tracing::debug!(
                    "buffer_resize: {} requesting {} frames x {} channels",
                    ctx.id(),
                    self.wanted.frames,
                    self.wanted.channels
                );
                ctx.request_reconfig();
            }
            Err(AllocError::QueueFull) => ctx.request_reconfig(),
            Err(err) => {
                tracing::warn!(processor = %ctx.id(), error = %err, "buffer resize not submitted");
                self.wanted = self.buffer.shape();
            }
        }
    }
}

impl Processor for BufferPlayer {
    fn preconfig(&mut self, _params: &ParamMap, ctx: &mut ProcessContext<'_>) -> bool {
        if let Some(err) = self.slot.take_failure() {
            tracing::warn!(processor = %ctx.id(), error = %err, "buffer resize failed, keeping current buffer");
            self.wanted = self.buffer.shape();
            ctx.emit(
                ResponseKind::ConfigError,
                Payload::Text(Cow::Borrowed("buffer allocation failed")),
            );
        }
        if !self.state.is_running() && self.slot.swap_ready(&mut self.buffer, ctx.allocator()) {
            self.position = 0;
            self.loop_end = None;
            self.take_done = false;
            tracing::debug!("buffer_swap: {} now {} frames", ctx.id(), self.buffer.frames());
            ctx.emit(ResponseKind::BufferResized, Payload::Int(self.buffer.frames() as i64));
        }
        true
    }

    fn config(&mut self, params: &ParamMap, ctx: &mut ProcessContext<'_>) -> Result<(), ConfigError> {
        let mode = Mode::parse(params.text("mode")).ok_or_else(|| ConfigError::invalid("mode", "unknown mode"))?;
        let direction = Direction::parse(params.text("direction"))
            .ok_or_else(|| ConfigError::invalid("direction", "expected rising or falling"))?;
        let shape = BufferShape::from_params(params)?;

        let trig_chan = params.int("trig_chan");
        let max_chan = self.audio as i64 - 1;
        if !(-1..=max_chan).contains(&trig_chan) {
            return Err(ConfigError::out_of_range("trig_chan", trig_chan as f64, -1.0, max_chan as f64));
        }
        let debounce = params.int("debounce");
        if !(0..=MAX_DEBOUNCE).contains(&debounce) {
            return Err(ConfigError::out_of_range("debounce", debounce as f64, 0.0, MAX_DEBOUNCE as f64));
        }
        let xfade = params.int("xfade");
        if !(0..=MAX_XFADE).contains(&xfade) {
            return Err(ConfigError::out_of_range("xfade", xfade as f64, 0.0, MAX_XFADE as f64));
        }
        let max_frames = MAX_FRAMES as i64;
        let region_start = params.int("region_start");
        if !(0..max_frames).contains(&region_start) {
            return Err(ConfigError::out_of_range(
                "region_start",
                region_start as f64,
                0.0,
                (max_frames - 1) as f64,
            ));
        }
        let region_end = params.int("region_end");
        if !(-1..=max_frames).contains(&region_end) {
            return Err(ConfigError::out_of_range("region_end", region_end as f64, -1.0, max_frames as f64));
        }
        if region_end >= 0 && region_end <= region_start {
            return Err(ConfigError::invalid("region_end", "must be greater than region_start"));
        }
        let rec_offset = params.int("rec_offset");
        if !(-max_frames..=max_frames).contains(&rec_offset) {
            return Err(ConfigError::out_of_range(
                "rec_offset",
                rec_offset as f64,
                -max_frames as f64,
                max_frames as f64,
            ));
        }

        if params.changed("mode") && mode != self.mode {
            tracing::debug!("buffer_mode: {} {} -> {}", ctx.id(), self.mode.name(), mode.name());
            self.mode = mode;
            self.detector.disarm();
            self.loop_end = None;
            self.take_done = false;
            self.halt();
        }
        if params.changed("trig_chan") && trig_chan != self.trig_chan {
            self.trig_chan = trig_chan;
            self.detector.disarm();
        }
        self.detector.direction = direction;
        self.detector.threshold = params.float("threshold") as f32;
        self.detector.required = (debounce as u32).max(1);
        self.rec_enabled = params.bool("rec_enabled");
        self.rec_mask = params.int("rec_mask");
        self.play_mask = params.int("play_mask");
        self.overdub = params.bool("overdub");
        self.rec_offset = rec_offset;
        self.xfade_len = xfade as usize;
        if params.changed("region_start") || params.changed("region_end") {
            self.region_start = region_start as usize;
            self.region_end = (region_end >= 0).then_some(region_end as usize);
            self.loop_end = None;
        }
        if params.changed("bang") {
            self.bang_pending = true;
        }
        if params.changed("stop") {
            self.stop_pending = true;
        }

        self.wanted = shape;
        self.drive_alloc(ctx);
        Ok(())
    }

    fn reset(&mut self, _ctx: &mut ProcessContext<'_>) {
        self.detector.disarm();
        self.loop_end = None;
        self.take_done = false;
        self.position = 0;
        self.bang_pending = false;
        self.stop_pending = false;
        self.halt();
    }

    fn process(&mut self, io: &mut Io<'_>, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let n = ctx.block_size();
        let source = self.trigger_source();
        let wired = io.is_connected(source);
        let (ins, outs) = io.split();
        for out in outs.iter_mut() {
            out.zero();
        }
        let trig = if wired { ins.get(source).map(SampleBlock::as_slice) } else { None };

        if core::mem::take(&mut self.stop_pending) {
            self.halt();
        }
        let mut bang = core::mem::take(&mut self.bang_pending);

        let mut pos = 0;
        let mut scanned = 0;
        while pos < n {
            if bang {
                bang = false;
                self.fire(pos, true, ctx);
            }

            let mut end = n;
            if self.state.is_running() {
                end = end.min(pos + self.until_boundary());
            }
            let mut fired = false;
            if let Some(trig) = trig {
                let from = scanned.max(pos);
                if from < end {
                    match self.scan(trig, from, end) {
                        Some(i) => {
                            end = i;
                            fired = true;
                            scanned = i + 1;
                        }
                        None => scanned = end,
                    }
                }
            }

            if self.state.is_running() && end > pos {
                self.render(ins, outs, pos, end);
            }
            if self.state.is_running() {
                self.cross_boundary(end, ctx);
            }
            if fired {
                self.fire(end, false, ctx);
            }
            pos = end;
        }
        Ok(())
    }

    fn destroy(&mut self, _ctx: &mut ProcessContext<'_>) {
        self.slot.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names_round_trip() {
        for mode in [
            Mode::RecordOnce,
            Mode::RecordLoopset,
            Mode::RecordLoop,
            Mode::RecordTrigger,
            Mode::PlayOnce,
            Mode::PlayLoop,
            Mode::PlayTrigger,
        ] {
            assert_eq!(Mode::parse(mode.name()), Some(mode));
        }
        assert_eq!(Mode::parse("record"), None);
    }

    #[test]
    fn detector_needs_rearm_between_fires() {
        let mut d = Detector::new();
        d.threshold = 0.5;
        // Active from the first sample: not armed yet.
        assert!(!d.step(1.0));
        assert!(!d.step(0.0));
        assert!(d.step(1.0));
        assert!(!d.step(1.0));
        assert!(!d.step(0.0));
        assert!(d.step(0.9));
    }

    #[test]
    fn detector_debounce_counts_consecutive_samples() {
        let mut d = Detector::new();
        d.required = 3;
        d.step(0.0);
        assert!(!d.step(1.0));
        assert!(!d.step(1.0));
        assert!(!d.step(0.0));
        assert!(!d.step(1.0));
        assert!(!d.step(1.0));
        assert!(d.step(1.0));
    }

    #[test]
    fn falling_direction() {
        let mut d = Detector::new();
        d.direction = Direction::Falling;
        d.threshold = 0.0;
        assert!(!d.step(-1.0));
        assert!(!d.step(1.0));
        assert!(d.step(-0.5));
    }

    #[test]
    fn allocate_builds_silent_channels() {
        let data = BufferData::allocate(BufferShape { frames: 10, channels: 3 }).unwrap();
        assert_eq!(data.frames(), 10);
        assert_eq!(data.channels(), 3);
        assert!((0..3).all(|ch| data.channel(ch).iter().all(|&s| s == 0.0)));
    }

    #[test]
    fn region_clamps_to_buffer() {
        let data = BufferData::allocate(BufferShape { frames: 100, channels: 1 }).unwrap();
        let mut p = BufferPlayer::new(data, 1, 1);
        assert_eq!(p.region(), (0, 100));
        p.region_start = 10;
        p.region_end = Some(500);
        assert_eq!(p.region(), (10, 100));
        p.loop_end = Some(40);
        assert_eq!(p.region(), (10, 40));
        p.region_start = 200;
        p.loop_end = None;
        p.region_end = None;
        assert_eq!(p.region(), (99, 100));
    }

    #[test]
    fn mask_bits() {
        assert!(bit(-1, 0) && bit(-1, 63));
        assert!(bit(0b10, 1) && !bit(0b10, 0));
        assert!(!bit(-1, 64));
    }
}
