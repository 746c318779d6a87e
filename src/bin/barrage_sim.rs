//! Headless playback simulator for development and testing.
//!
//! Drives a synthetic comment stream through the cache engine at a chosen
//! frame rate, drawing to a counting surface and logging cache statistics
//! once per simulated second. `--speed` compresses wall time without
//! touching the timeline, which stresses the staleness and resync paths.

use anyhow::Result;
use clap::Parser;
use log::info;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use barrage::{
    CacheConfig, CacheScheduler, Comment, CommentKind, CommentRef, MonoDisplayer, Raster,
    SortedComments, Surface,
};

/// Timed comment render-cache simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Simulated playback length in seconds
    #[arg(short = 'd', long = "duration", value_name = "SECS", default_value = "30.0")]
    duration: f64,

    /// Render loop rate in frames per second
    #[arg(long = "fps", value_name = "FPS", default_value = "25.0")]
    fps: f64,

    /// Number of pre-loaded comments spread over the duration
    #[arg(short = 'n', long = "comments", value_name = "N", default_value = "2000")]
    comments: usize,

    /// Live comments inserted per second during playback
    #[arg(long = "live", value_name = "N", default_value = "2")]
    live: u32,

    /// Cache budget in MiB (overrides the preset)
    #[arg(long = "budget", value_name = "MIB")]
    budget_mib: Option<usize>,

    /// Derive the cache budget from available system memory (percent)
    #[arg(long = "mem", value_name = "PERCENT")]
    mem_percent: Option<f64>,

    /// Wall-clock speed multiplier; simulated time is unaffected
    #[arg(short = 's', long = "speed", value_name = "X", default_value = "1.0")]
    speed: f64,

    /// Jump the playhead at this simulated second
    #[arg(long = "seek-at", value_name = "SECS", requires = "seek_to")]
    seek_at: Option<f64>,

    /// Seek target in simulated seconds
    #[arg(long = "seek-to", value_name = "SECS", requires = "seek_at")]
    seek_to: Option<f64>,

    /// Increase logging verbosity (default: info, -v: debug, -vv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbosity: u8,
}

/// Surface that only counts draw calls
#[derive(Default)]
struct CountingSurface {
    blits: u64,
    directs: u64,
}

impl Surface for CountingSurface {
    fn blit(&mut self, _comment: &Comment, _raster: &Raster) {
        self.blits += 1;
    }

    fn draw_direct(&mut self, _comment: &Comment) {
        self.directs += 1;
    }
}

/// Deterministic comment stream: fixed phrases, slightly jittered times,
/// mostly rolling with the occasional pinned one. Durations stay within
/// `max_duration_ms`, the window the render path scans back over.
fn synth_comments(count: usize, span_ms: i64, max_duration_ms: i64) -> Vec<CommentRef> {
    let phrases = [
        "nice",
        "what was that",
        "first time here",
        "this part always gets me",
        "replay it",
        "no way",
        "here it comes",
        "gg",
    ];
    (0..count)
        .map(|i| {
            let t = (i as i64 * span_ms) / count.max(1) as i64 + (i as i64 % 7) * 13;
            let kind = match i % 10 {
                7 => CommentKind::Top,
                8 => CommentKind::Bottom,
                _ => CommentKind::Rolling,
            };
            let duration = (3000 + (i as i64 % 5) * 500).min(max_duration_ms);
            Comment::new(phrases[i % phrases.len()], kind, t, duration)
        })
        .collect()
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 0 (default) = info, 1 (-v) = debug, 2+ (-vv) = trace
    let default_level = match args.verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    info!("Barrage comment cache simulator starting...");

    let cfg = if let Some(mib) = args.budget_mib {
        CacheConfig {
            budget_bytes: mib * 1024 * 1024,
            ..Default::default()
        }
    } else if let Some(percent) = args.mem_percent {
        CacheConfig::from_system((percent / 100.0).clamp(0.01, 0.5), 2.0)
    } else {
        CacheConfig::default()
    };

    let span_ms = (args.duration * 1000.0) as i64;
    let max_dur = cfg.max_duration_ms;
    let source = SortedComments::from_vec(synth_comments(args.comments, span_ms, max_dur));
    info!(
        "simulating {} comments over {:.1}s at {:.0} fps",
        args.comments, args.duration, args.fps
    );

    let mut scheduler = CacheScheduler::new(cfg, Box::new(source), Arc::new(MonoDisplayer::default()));
    scheduler.on_ready(|| info!("cache primed, playback starts"));
    scheduler.begin();

    let frame_ms = 1000.0 / args.fps;
    let total_frames = (args.duration * args.fps) as u64;
    let frame_sleep = Duration::from_secs_f64(frame_ms / 1000.0 / args.speed.max(0.01));

    let mut surface = CountingSurface::default();
    let mut clock_ms = 0.0_f64;
    let mut live_sent: u64 = 0;
    let mut seek_pending = args.seek_at.zip(args.seek_to);
    let started = Instant::now();

    for frame in 0..total_frames {
        let pos = clock_ms as i64;
        scheduler.update(pos);

        if let Some((at, to)) = seek_pending {
            if clock_ms >= at * 1000.0 {
                scheduler.seek((to * 1000.0) as i64);
                clock_ms = to * 1000.0;
                seek_pending = None;
            }
        }

        if args.live > 0 {
            let due = pos.max(0) as u64 * args.live as u64 / 1000;
            while live_sent < due {
                live_sent += 1;
                // lands 2s ahead of the playhead, inside the build window
                let t = pos + 2000 + (live_sent as i64 % 5) * 40;
                scheduler.add_comment(Comment::new(
                    format!("live #{}", live_sent),
                    CommentKind::Rolling,
                    t,
                    max_dur,
                ));
            }
        }

        scheduler.draw(&mut surface);

        if frame % args.fps.max(1.0) as u64 == 0 {
            let stats = scheduler.stats();
            let (bytes, budget) = scheduler.mem();
            info!(
                "t={:>6}ms | cache: {} entries, {} / {} KiB | built: {} | hits: {} | misses: {} | hit rate: {:.1}%",
                pos,
                scheduler.cached_len(),
                bytes / 1024,
                budget / 1024,
                stats.built(),
                stats.hits(),
                stats.misses(),
                stats.hit_rate() * 100.0
            );
        }

        clock_ms += frame_ms;
        thread::sleep(frame_sleep);
    }

    let stats = scheduler.stats();
    scheduler.end();

    println!();
    println!(
        "simulated {:.1}s of playback in {:.1}s wall time",
        args.duration,
        started.elapsed().as_secs_f64()
    );
    println!(
        "draw calls: {} cached blits, {} direct fallbacks ({:.1}% hit rate)",
        surface.blits,
        surface.directs,
        stats.hit_rate() * 100.0
    );
    println!(
        "worker: {} rasters built, {} evicted, {} live comments inserted",
        stats.built(),
        stats.evicted(),
        live_sent
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: synthesized durations respect the draw window
    /// Validates: no demo comment outlives the look-back the render path
    /// scans, which would pop it off screen before expiry
    #[test]
    fn test_synth_durations_fit_draw_window() {
        let max = CacheConfig::default().max_duration_ms;
        let comments = synth_comments(500, 60_000, max);
        assert_eq!(comments.len(), 500);
        for c in comments {
            assert!(c.duration_ms() <= max);
            assert!(c.duration_ms() >= 3000);
        }
    }
}
