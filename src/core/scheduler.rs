//! Background cache scheduler: one worker thread pre-building comment
//! rasters just ahead of the playhead
//!
//! **Why**: Rasterizing a comment is orders of magnitude slower than
//! blitting one. A single dedicated worker walks the timeline ahead of the
//! playback clock, builds rasters in display order and admits them into the
//! byte-budgeted store, so the render path almost always finds its pixels
//! ready. One worker, not a pool: build order must follow time order, and
//! budget accounting is serial by nature.
//!
//! **Used by**: the embedding player (facade calls), render path (`draw`)
//!
//! # Worker lifecycle
//!
//! `begin()` spawns the thread and primes it, `pause()`/`resume()` gate the
//! tick loop, `end()` joins the thread and releases every buffer. Commands
//! travel over a channel; a pending delayed tick is just a receive deadline,
//! so commands always preempt a resting worker.
//!
//! # Pacing
//!
//! Each tick compares the cache-ahead clock with the playback clock:
//! comfortably ahead means rest, behind means the cache is stale (seek) and
//! is dropped, otherwise one bounded build pass runs and the tick re-arms.
//! During a pass the worker yields to the render loop between builds by
//! waiting (bounded) on the frame signal.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::core::clock::TimelineClock;
use crate::core::gate::{GateState, RenderGate};
use crate::core::pool::RasterPool;
use crate::core::stats::CacheStats;
use crate::core::store::CacheStore;
use crate::entities::comment::CommentRef;
use crate::entities::displayer::{BuildError, Displayer, Surface};
use crate::entities::raster::Raster;
use crate::entities::source::CommentSource;

/// Invoked once, on the worker, after the first build pass completes
pub type ReadyFn = Box<dyn FnOnce() + Send + 'static>;

/// Commands consumed by the cache worker
#[derive(Debug)]
pub enum Command {
    /// Prime the pool and run the first build pass
    Begin,
    /// Run one scheduling tick now
    Tick,
    /// Stop issuing ticks, keep the thread alive
    Pause,
    /// Re-arm the tick loop immediately
    Resume,
    /// Insert a comment into the source on the worker thread
    AddComment(CommentRef),
    /// Leave the worker loop
    Stop,
}

/// Facade over the cache engine
///
/// Owns the worker thread, the clocks, and the render gate. The embedding
/// player feeds the playback clock via `update()`/`seek()` and renders via
/// `draw()`; everything else happens on the worker.
pub struct CacheScheduler {
    cfg: CacheConfig,
    gate: Arc<RenderGate>,
    playhead: Arc<TimelineClock>,
    ahead: Arc<TimelineClock>,
    stats: Arc<CacheStats>,
    displayer: Arc<dyn Displayer>,
    paused: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    ready: Option<ReadyFn>,
    tx: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl CacheScheduler {
    pub fn new(cfg: CacheConfig, source: Box<dyn CommentSource>, displayer: Arc<dyn Displayer>) -> Self {
        let stats = Arc::new(CacheStats::new());
        let store = CacheStore::new(cfg.budget_bytes, Arc::clone(&stats));
        let pool = RasterPool::new(cfg.pool_capacity);
        Self {
            gate: Arc::new(RenderGate::new(source, store, pool)),
            playhead: Arc::new(TimelineClock::default()),
            ahead: Arc::new(TimelineClock::default()),
            stats,
            displayer,
            paused: Arc::new(AtomicBool::new(false)),
            stopping: Arc::new(AtomicBool::new(false)),
            ready: None,
            tx: None,
            worker: None,
            cfg,
        }
    }

    /// Install the ready callback, fired at most once after the first pass.
    /// Must be set before `begin()`.
    pub fn on_ready(&mut self, f: impl FnOnce() + Send + 'static) {
        self.ready = Some(Box::new(f));
    }

    /// Spawn the worker and prime the cache. No-op while already running.
    pub fn begin(&mut self) {
        if self.worker.is_some() {
            debug!("cache worker already running");
            return;
        }
        self.stopping.store(false, Ordering::Relaxed);
        self.paused.store(false, Ordering::Relaxed);

        let (tx, rx) = unbounded();
        tx.send(Command::Begin).ok();

        let worker = Worker {
            cfg: self.cfg.clone(),
            gate: Arc::clone(&self.gate),
            playhead: Arc::clone(&self.playhead),
            ahead: Arc::clone(&self.ahead),
            stats: Arc::clone(&self.stats),
            displayer: Arc::clone(&self.displayer),
            paused: Arc::clone(&self.paused),
            stopping: Arc::clone(&self.stopping),
            ready: self.ready.take(),
            rx,
        };
        let handle = thread::Builder::new()
            .name("barrage-cache".into())
            .spawn(move || worker.run())
            .expect("failed to spawn cache worker");

        self.tx = Some(tx);
        self.worker = Some(handle);
        info!(
            "cache worker started: budget {} MiB, horizon {}ms",
            self.cfg.budget_bytes / 1024 / 1024,
            self.cfg.horizon_ms()
        );
    }

    /// Stop the worker, join it, then release every cached and pooled
    /// buffer. Safe to call repeatedly.
    pub fn end(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        if let Some(tx) = self.tx.take() {
            tx.send(Command::Stop).ok();
        }
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("cache worker panicked during shutdown");
            }
        }
        // buffers are released only after the worker is gone; a build in
        // flight must never see its raster drained away
        let mut g = self.gate.lock();
        let GateState { store, pool, .. } = &mut *g;
        let evicted = store.evict_all(pool);
        pool.drain();
        if evicted > 0 {
            debug!("cache shutdown: released {} entries", evicted);
        }
    }

    /// Suspend build ticks; the worker stays parked on its queue
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
        self.send(Command::Pause);
        debug!("cache paused");
    }

    /// Resume build ticks immediately
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
        self.send(Command::Resume);
        debug!("cache resumed");
    }

    /// Feed the external playback clock. Returns the jump in milliseconds.
    pub fn update(&self, position_ms: i64) -> i64 {
        self.playhead.update(position_ms)
    }

    /// Jump the playback clock. Entries the new position has outlived are
    /// released here; anything else is reconciled by the next tick's
    /// staleness checks.
    pub fn seek(&self, position_ms: i64) {
        let jump = self.playhead.update(position_ms);
        {
            let mut g = self.gate.lock();
            let GateState { store, pool, .. } = &mut *g;
            // full sweep: a jump can strand expired entries behind a live
            // head, out of reach of the steady-state prefix pass
            store.evict_expired(position_ms, pool);
            // every comment leaves the viewport on a jump
            store.mark_all_outside();
        }
        debug!("seek to {}ms (jump {}ms)", position_ms, jump);
        self.send(Command::Tick);
    }

    /// Insert a live comment. Routed through the worker so all source
    /// mutation stays on one thread; inserted directly when stopped.
    pub fn add_comment(&self, comment: CommentRef) {
        match &self.tx {
            Some(tx) => {
                tx.send(Command::AddComment(comment)).ok();
            }
            None => {
                let mut g = self.gate.lock();
                g.source.insert(comment);
            }
        }
    }

    /// Drop every cached entry, keeping the worker and pool alive
    pub fn reset(&self) {
        let mut g = self.gate.lock();
        let GateState { store, pool, .. } = &mut *g;
        store.mark_all_outside();
        store.evict_all(pool);
    }

    /// Render one frame: blit cached rasters, fall back to direct drawing
    /// on a miss, then raise the frame signal for the pacing worker.
    ///
    /// Returns the number of comments drawn.
    pub fn draw(&self, surface: &mut dyn Surface) -> usize {
        let now = self.playhead.millis();
        let mut drawn = 0;
        {
            let g = self.gate.lock();
            let visible = g.source.range(now - self.cfg.max_duration_ms, now);
            for c in visible {
                if c.is_expired(now) {
                    c.set_visible(false);
                    continue;
                }
                if !c.measured() {
                    let (w, h) = self.displayer.measure(&c);
                    c.set_measured(w, h);
                }
                let hit = c.with_raster(|r| surface.blit(&c, r)).is_some();
                if hit {
                    self.stats.record_hit();
                } else {
                    self.stats.record_miss();
                    surface.draw_direct(&c);
                }
                c.set_visible(true);
                drawn += 1;
            }
        }
        self.gate.signal_frame();
        drawn
    }

    fn send(&self, cmd: Command) {
        if let Some(tx) = &self.tx {
            tx.send(cmd).ok();
        }
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.cfg
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn playhead_ms(&self) -> i64 {
        self.playhead.millis()
    }

    /// How far the cache has been populated
    pub fn ahead_ms(&self) -> i64 {
        self.ahead.millis()
    }

    /// Number of cached entries
    pub fn cached_len(&self) -> usize {
        self.gate.lock().store.len()
    }

    /// Display time of the earliest cached entry, 0 when empty
    pub fn first_cached_time(&self) -> i64 {
        self.gate.lock().store.first_entry_time()
    }

    /// (cached bytes, budget bytes)
    pub fn mem(&self) -> (usize, usize) {
        self.gate.lock().store.mem()
    }

    /// Buffers currently sitting in the pool
    pub fn pooled(&self) -> usize {
        self.gate.lock().pool.len()
    }

    /// Comments known to the source
    pub fn source_len(&self) -> usize {
        self.gate.lock().source.len()
    }
}

impl Drop for CacheScheduler {
    fn drop(&mut self) {
        self.end();
    }
}

struct PassStats {
    scanned: usize,
    built: usize,
}

/// Worker-side state, moved onto the cache thread
struct Worker {
    cfg: CacheConfig,
    gate: Arc<RenderGate>,
    playhead: Arc<TimelineClock>,
    ahead: Arc<TimelineClock>,
    stats: Arc<CacheStats>,
    displayer: Arc<dyn Displayer>,
    paused: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    ready: Option<ReadyFn>,
    rx: Receiver<Command>,
}

impl Worker {
    fn run(mut self) {
        trace!("cache worker started");
        // a pending delayed tick is a receive deadline: commands arriving
        // during the rest are handled first
        let mut next_tick: Option<Instant> = None;
        loop {
            let cmd = if let Some(deadline) = next_tick {
                match self.rx.recv_deadline(deadline) {
                    Ok(cmd) => cmd,
                    Err(RecvTimeoutError::Timeout) => Command::Tick,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match self.rx.recv() {
                    Ok(cmd) => cmd,
                    Err(_) => break,
                }
            };

            match cmd {
                Command::Begin => next_tick = self.handle_begin(),
                Command::Tick => next_tick = self.tick(false),
                Command::Pause => {
                    next_tick = None;
                    trace!("cache worker paused");
                }
                Command::Resume => next_tick = Some(Instant::now()),
                Command::AddComment(c) => {
                    self.handle_add(c);
                    if !self.paused.load(Ordering::Relaxed) {
                        next_tick = Some(Instant::now());
                    }
                }
                Command::Stop => break,
            }

            if self.stopping.load(Ordering::Relaxed) {
                break;
            }
        }
        trace!("cache worker stopped");
    }

    /// Prime the pool, resync the ahead clock and run the first pass
    /// (unpaced: no frame waits, no quota)
    fn handle_begin(&mut self) -> Option<Instant> {
        {
            let mut g = self.gate.lock();
            let GateState { store, pool, .. } = &mut *g;
            store.evict_out_of_window(pool);
            pool.prime(self.cfg.pool_prime);
        }
        self.ahead.update(self.playhead.millis());
        self.tick(true)
    }

    /// Insert on the worker thread; if the newcomer lands inside the span
    /// the build scan already passed, pull the ahead clock back so the next
    /// pass picks it up.
    fn handle_add(&mut self, comment: CommentRef) {
        let t = comment.time_ms();
        {
            let mut g = self.gate.lock();
            g.source.insert(comment);
        }
        let now = self.playhead.millis();
        if t >= now && t < self.ahead.millis() {
            self.ahead.update(now);
            trace!("ahead clock rewound to {}ms for comment at {}ms", now, t);
        }
    }

    /// One scheduling tick. Returns the deadline for the next one, or None
    /// when paused/stopping.
    fn tick(&mut self, priming: bool) -> Option<Instant> {
        if self.stopping.load(Ordering::Relaxed) || self.paused.load(Ordering::Relaxed) {
            return None;
        }
        let now = self.playhead.millis();
        {
            // steady-state sweep: drop entries the playhead has passed
            let mut g = self.gate.lock();
            let GateState { store, pool, .. } = &mut *g;
            store.evict_expired_prefix(now, pool);
        }

        let wait = self.ahead.millis() - now;
        let horizon = self.cfg.horizon_ms();

        if wait > self.cfg.rest_margin_ms && wait <= horizon {
            // comfortably ahead: rest until the cushion thins out
            let rest = (wait - self.cfg.rest_margin_ms) as u64;
            trace!("cache {}ms ahead, resting {}ms", wait, rest);
            return Some(Instant::now() + Duration::from_millis(rest));
        } else if wait < 0 {
            // playhead ran past the cache (seek forward): all of it is stale
            let mut g = self.gate.lock();
            let GateState { store, pool, .. } = &mut *g;
            let n = store.evict_all(pool);
            debug!("cache {}ms behind playhead, evicted {} entries", -wait, n);
        } else {
            let mut g = self.gate.lock();
            let GateState { store, pool, .. } = &mut *g;
            let first = store.first_entry_time();
            if first > 0 && first - now > horizon {
                // cache holds a window far beyond the playhead (seek back)
                let n = store.evict_out_of_window(pool);
                debug!(
                    "earliest cache entry {}ms past the horizon, evicted {} off-screen entries",
                    first - now - horizon,
                    n
                );
            }
        }
        if wait < 0 || wait > horizon {
            self.ahead.update(now + self.cfg.resync_offset_ms);
        }

        let pass = self.build_pass(priming);
        if pass.built > 0 || pass.scanned > 0 {
            trace!("build pass: {} built / {} scanned", pass.built, pass.scanned);
        }
        // first executed pass after begin() reports readiness; a tick that
        // bailed on pause keeps the listener armed
        if let Some(ready) = self.ready.take() {
            ready();
            debug!("cache primed, ready signaled");
        }
        if pass.scanned == 0 {
            // nothing in the window yet: poll until the source catches up
            Some(Instant::now() + Duration::from_millis(self.cfg.frame_wait_ms))
        } else {
            Some(Instant::now())
        }
    }

    /// One bounded build pass over `[ahead, ahead + horizon]`.
    ///
    /// Walks candidates in time order, building and admitting each missing
    /// raster under the gate. Stops on budget exhaustion, admission refusal,
    /// build failure, quota, pause or stop; the ahead clock ends at the last
    /// scanned display time so the next pass resumes there.
    fn build_pass(&mut self, priming: bool) -> PassStats {
        let pass_start = Instant::now();
        let quota = Duration::from_millis(self.cfg.pass_quota_ms);
        let curr = self.ahead.millis();
        let candidates = {
            let g = self.gate.lock();
            g.source.range(curr, curr + self.cfg.horizon_ms())
        };
        if candidates.is_empty() {
            return PassStats { scanned: 0, built: 0 };
        }

        let mut last_time = None;
        let mut scanned = 0;
        let mut built = 0;
        for c in candidates {
            if self.stopping.load(Ordering::Relaxed) || self.paused.load(Ordering::Relaxed) {
                break;
            }
            scanned += 1;
            last_time = Some(c.time_ms());

            let now = self.playhead.millis();
            if c.is_expired(now) {
                continue;
            }
            if c.visible() && c.is_active(now) {
                // on screen already, the renderer owns it
                continue;
            }
            if c.has_raster() {
                continue;
            }

            if !priming {
                // yield to the render loop before each build
                self.gate.wait_frame(Duration::from_millis(self.cfg.frame_wait_ms));
            }

            {
                let mut g = self.gate.lock();
                let GateState { store, pool, .. } = &mut *g;

                if !c.measured() {
                    let (w, h) = self.displayer.measure(&c);
                    c.set_measured(w, h);
                }
                let (w, h) = c.size();
                let estimate = Raster::estimate(w, h);
                if store.bytes() + estimate > store.budget() {
                    debug!(
                        "build pass stopped at budget: {} + {} KiB over {} KiB",
                        store.bytes() / 1024,
                        estimate / 1024,
                        store.budget() / 1024
                    );
                    break;
                }

                let reuse = pool.acquire();
                match self.displayer.build(&c, reuse) {
                    Ok(raster) => {
                        if let Some(prev) = c.attach_raster(raster) {
                            pool.release(prev);
                        }
                        if store.admit(Arc::clone(&c), now, pool) {
                            built += 1;
                            self.stats.record_built();
                        } else {
                            // refused: a live entry blocks the budget
                            if let Some(r) = c.detach_raster() {
                                pool.release(r);
                            }
                            debug!("admission refused at {} KiB, stopping pass", store.bytes() / 1024);
                            break;
                        }
                    }
                    Err(BuildError::OutOfMemory) => {
                        warn!("raster build out of memory, stopping pass");
                        break;
                    }
                    Err(e) => {
                        debug!("raster build failed: {}", e);
                        break;
                    }
                }
            }

            if !priming && pass_start.elapsed() >= quota {
                debug!("build pass quota exhausted after {} builds", built);
                break;
            }
        }

        match last_time {
            // resume the scan here next pass
            Some(t) => {
                self.ahead.update(t);
            }
            None => {
                let elapsed = pass_start.elapsed().as_millis() as i64;
                if elapsed > 0 {
                    self.ahead.advance(elapsed);
                }
            }
        }
        PassStats { scanned, built }
    }
}
