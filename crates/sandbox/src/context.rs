//! The services an isolated module can reach.
//!
//! A [`SandboxContext`] is the whole world of a running module. It is owned
//! by the instance thread and lent to the module for the duration of each
//! call. Nothing in it touches storage, the network, navigation or other
//! instances.

use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use playgate_assets::{decode::decode, Resource};
use playgate_core::{AssetCategory, BundleTier, SharedCapability};

use crate::capability::{Capability, CapabilitySet};
use crate::module::ModuleFault;
use crate::shared::{Physics2d, Renderer3d};

// =============================================================================
// Surface
// =============================================================================

/// RGBA color.
pub type Color = [u8; 4];

/// Upper bound on draw commands kept per frame.
pub const MAX_DRAW_COMMANDS: usize = 10_000;

/// One retained-mode drawing instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    Clear {
        color: Color,
    },
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        color: Color,
    },
    Circle {
        x: f64,
        y: f64,
        r: f64,
        color: Color,
    },
    Polygon {
        points: Vec<(f64, f64)>,
        color: Color,
    },
    Text {
        x: f64,
        y: f64,
        size: f64,
        text: String,
        color: Color,
    },
    Sprite {
        asset: String,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
    },
}

/// A published frame, as seen by the rendering client.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisplayList {
    pub frame: u64,
    pub width: u32,
    pub height: u32,
    pub commands: Vec<DrawCommand>,
    /// Commands discarded because the frame was over the limit.
    pub dropped: usize,
}

/// Drawing surface of fixed size.
#[derive(Debug, Clone)]
pub struct Surface {
    width: u32,
    height: u32,
    commands: Vec<DrawCommand>,
    dropped: usize,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
            dropped: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn push(&mut self, command: DrawCommand) {
        if self.commands.len() < MAX_DRAW_COMMANDS {
            self.commands.push(command);
        } else {
            self.dropped += 1;
        }
    }

    /// Count commands that were refused before they reached the surface.
    pub(crate) fn discard(&mut self, count: usize) {
        self.dropped += count;
    }

    /// Start a new picture.
    pub fn clear(&mut self, color: Color) {
        self.commands.clear();
        self.dropped = 0;
        self.commands.push(DrawCommand::Clear { color });
    }

    pub fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Color) {
        self.push(DrawCommand::Rect { x, y, w, h, color });
    }

    pub fn circle(&mut self, x: f64, y: f64, r: f64, color: Color) {
        self.push(DrawCommand::Circle { x, y, r, color });
    }

    pub fn polygon(&mut self, points: Vec<(f64, f64)>, color: Color) {
        self.push(DrawCommand::Polygon { points, color });
    }

    pub fn text(&mut self, x: f64, y: f64, size: f64, text: impl Into<String>, color: Color) {
        self.push(DrawCommand::Text {
            x,
            y,
            size,
            text: text.into(),
            color,
        });
    }

    /// Draw a preloaded image asset.
    pub fn sprite(&mut self, asset: impl Into<String>, x: f64, y: f64, w: f64, h: f64) {
        self.push(DrawCommand::Sprite {
            asset: asset.into(),
            x,
            y,
            w,
            h,
        });
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub(crate) fn snapshot(&self, frame: u64) -> DisplayList {
        DisplayList {
            frame,
            width: self.width,
            height: self.height,
            commands: self.commands.clone(),
            dropped: self.dropped,
        }
    }
}

// =============================================================================
// Frame scheduling, clocks, randomness
// =============================================================================

/// Frame requests. A module asks for the next frame and receives exactly
/// one `on_frame` call for it.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    requested: bool,
    frame: u64,
}

impl FrameScheduler {
    pub fn request_frame(&mut self) {
        self.requested = true;
    }

    /// Number of frames advanced so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub(crate) fn begin_frame(&mut self) -> bool {
        self.frame += 1;
        std::mem::take(&mut self.requested)
    }

    pub(crate) fn clear(&mut self) {
        self.requested = false;
    }
}

/// Instance clock. Monotonic time advances with frames, wall time is real.
#[derive(Debug, Default)]
pub struct Clock {
    monotonic_ms: f64,
}

impl Clock {
    /// Milliseconds of game time since the instance booted.
    pub fn now_ms(&self) -> f64 {
        self.monotonic_ms
    }

    pub fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }

    pub(crate) fn advance(&mut self, ms: f64) {
        self.monotonic_ms += ms.max(0.0);
    }
}

/// Pseudo-random source, optionally seeded.
#[derive(Debug)]
pub struct Random {
    rng: StdRng,
}

impl Random {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.rng.gen()
    }

    /// Uniform in `[low, high)`. Returns `low` for an empty range.
    pub fn range(&mut self, low: i64, high: i64) -> i64 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..high)
    }

    pub fn chance(&mut self, probability: f64) -> bool {
        self.next_f64() < probability
    }
}

// =============================================================================
// Timers
// =============================================================================

/// Handle for a pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TimerId(pub u64);

/// Upper bound on pending timers per instance.
pub const MAX_TIMERS: usize = 1_024;

/// Deferred callbacks keyed to game time.
#[derive(Debug, Default)]
pub struct Timers {
    next_id: u64,
    pending: BTreeMap<TimerId, f64>,
    now_ms: f64,
}

impl Timers {
    /// Schedule a timer `delay_ms` of game time from now. Returns `None`
    /// when too many timers are pending.
    pub fn set_timeout(&mut self, delay_ms: f64) -> Option<TimerId> {
        if self.pending.len() >= MAX_TIMERS {
            return None;
        }
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.pending.insert(id, self.now_ms + delay_ms.max(0.0));
        Some(id)
    }

    pub fn clear_timeout(&mut self, id: TimerId) -> bool {
        self.pending.remove(&id).is_some()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Remove and return timers due at `now_ms`, earliest first.
    pub(crate) fn take_due(&mut self, now_ms: f64) -> Vec<TimerId> {
        self.now_ms = now_ms;
        let mut due: Vec<(f64, TimerId)> = self
            .pending
            .iter()
            .filter(|(_, at)| **at <= now_ms)
            .map(|(id, at)| (*at, *id))
            .collect();
        due.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        for (_, id) in &due {
            self.pending.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }
}

// =============================================================================
// Inline media
// =============================================================================

/// Decoder for media embedded in the module as data URIs.
#[derive(Debug, Default, Clone, Copy)]
pub struct MediaDecoder;

impl MediaDecoder {
    /// Decode a `data:<mime>;base64,<payload>` URI.
    ///
    /// Payloads are held to the ceilings of the smallest bundle tier.
    pub fn decode_data_uri(&self, uri: &str) -> Result<Resource, ModuleFault> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| ModuleFault::new("not a data URI"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| ModuleFault::new("data URI has no payload"))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| ModuleFault::new("only base64 data URIs are supported"))?;

        let category = category_for_mime(mime)
            .ok_or_else(|| ModuleFault::new(format!("unsupported media type '{}'", mime)))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| ModuleFault::new(format!("invalid base64 payload: {}", e)))?;

        let limit = BundleTier::Small.category_ceiling(category);
        if bytes.len() as u64 > limit {
            return Err(ModuleFault::new(format!(
                "inline {} is {} bytes, limit is {} bytes",
                category,
                bytes.len(),
                limit
            )));
        }
        decode(category, Bytes::from(bytes)).map_err(|e| ModuleFault::new(e.to_string()))
    }
}

fn category_for_mime(mime: &str) -> Option<AssetCategory> {
    let mime = mime.to_ascii_lowercase();
    match mime.split_once('/')? {
        ("image", _) => Some(AssetCategory::Image),
        ("audio", _) => Some(AssetCategory::Audio),
        ("font", _) => Some(AssetCategory::Font),
        ("model", _) => Some(AssetCategory::Model),
        ("application", "json") => Some(AssetCategory::Data),
        _ => None,
    }
}

// =============================================================================
// Sandbox Context
// =============================================================================

/// Preloaded bundle resources by normalized path. Failed loads keep their
/// error message so the module can degrade.
pub type AssetTable = HashMap<String, Result<Resource, String>>;

/// Settings for a new context.
#[derive(Debug, Clone)]
pub(crate) struct ContextSettings {
    pub capabilities: Arc<CapabilitySet>,
    pub width: u32,
    pub height: u32,
    pub rng_seed: Option<u64>,
    pub assets: Arc<AssetTable>,
}

/// Everything a module may use.
pub struct SandboxContext {
    capabilities: Arc<CapabilitySet>,
    surface: Surface,
    frames: FrameScheduler,
    clock: Clock,
    random: Random,
    timers: Timers,
    media: MediaDecoder,
    renderer3d: Option<Renderer3d>,
    physics2d: Option<Physics2d>,
    assets: Arc<AssetTable>,
}

impl SandboxContext {
    pub(crate) fn new(settings: ContextSettings) -> Self {
        let caps = &settings.capabilities;
        Self {
            renderer3d: caps
                .allows(Capability::Shared(SharedCapability::Renderer3d))
                .then(Renderer3d::default),
            physics2d: caps
                .allows(Capability::Shared(SharedCapability::Physics2d))
                .then(Physics2d::default),
            capabilities: settings.capabilities,
            surface: Surface::new(settings.width, settings.height),
            frames: FrameScheduler::default(),
            clock: Clock::default(),
            random: Random::new(settings.rng_seed),
            timers: Timers::default(),
            media: MediaDecoder,
            assets: settings.assets,
        }
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn surface(&mut self) -> &mut Surface {
        &mut self.surface
    }

    pub fn frames(&mut self) -> &mut FrameScheduler {
        &mut self.frames
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn random(&mut self) -> &mut Random {
        &mut self.random
    }

    pub fn timers(&mut self) -> &mut Timers {
        &mut self.timers
    }

    pub fn media(&self) -> MediaDecoder {
        self.media
    }

    /// The shared 3D renderer, when granted.
    pub fn renderer3d(&self) -> Option<Renderer3d> {
        self.renderer3d.clone()
    }

    /// The shared 2D physics helper, when granted.
    pub fn physics2d(&self) -> Option<Physics2d> {
        self.physics2d
    }

    /// A successfully preloaded bundle resource.
    pub fn asset(&self, path: &str) -> Option<&Resource> {
        self.assets.get(path).and_then(|r| r.as_ref().ok())
    }

    /// Why a bundle resource failed to preload.
    pub fn asset_error(&self, path: &str) -> Option<&str> {
        self.assets
            .get(path)
            .and_then(|r| r.as_ref().err())
            .map(String::as_str)
    }

    pub fn asset_paths(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }

    // Driven by the instance loop.

    pub(crate) fn advance_clock(&mut self, ms: f64) -> Vec<TimerId> {
        self.clock.advance(ms);
        self.timers.take_due(self.clock.now_ms())
    }

    pub(crate) fn begin_frame(&mut self) -> bool {
        self.frames.begin_frame()
    }

    pub(crate) fn display_list(&self) -> DisplayList {
        self.surface.snapshot(self.frames.frame())
    }

    /// Drop scheduled work after a reset.
    pub(crate) fn clear_schedules(&mut self) {
        self.timers.clear();
        self.frames.clear();
    }
}

#[cfg(test)]
pub(crate) fn test_context(shared: &[SharedCapability]) -> SandboxContext {
    let requested = shared.iter().copied().collect();
    SandboxContext::new(ContextSettings {
        capabilities: CapabilitySet::for_request(&requested),
        width: 320,
        height: 240,
        rng_seed: Some(7),
        assets: Arc::new(AssetTable::new()),
    })
}
