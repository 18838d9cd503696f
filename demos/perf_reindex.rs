use bonk_bbtree::*;
use glam::Vec2;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

fn lcg(seed: &mut u32) -> u32 {
    *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
    *seed
}

fn unit(seed: &mut u32) -> f32 {
    lcg(seed) as f32 / u32::MAX as f32
}

struct Ball {
    pos: Cell<Vec2>,
    vel: Vec2,
    radius: f32,
}

fn main() {
    let cfg = TreeConfig { enable_timing: true, ..TreeConfig::default() };
    let mut tree = BbTree::new(cfg, |b: &Rc<Ball>| Aabb::for_circle(b.pos.get(), b.radius));
    tree.set_velocity_fn(|b: &Rc<Ball>| b.vel);

    let n = 20_000usize; // number of balls
    let ticks = 60;
    let dt = 1.0 / 60.0;
    let mut seed = 1u32;
    let mut balls = Vec::with_capacity(n);
    let t0 = Instant::now();
    for i in 0..n {
        let ball = Rc::new(Ball {
            pos: Cell::new(Vec2::new(unit(&mut seed) * 400.0 - 200.0, unit(&mut seed) * 400.0 - 200.0)),
            vel: Vec2::new(unit(&mut seed) * 8.0 - 4.0, unit(&mut seed) * 8.0 - 4.0),
            radius: 0.5,
        });
        if let Err(err) = tree.insert(ball.clone(), i as ObjectId) {
            eprintln!("insert failed: {err}");
            return;
        }
        balls.push(ball);
    }
    let t_insert = t0.elapsed();
    if let Err(err) = tree.optimize() {
        eprintln!("optimize failed: {err}");
        return;
    }

    let mut reported = 0usize;
    let mut relocated = 0usize;
    let mut mark_ms = 0.0;
    let t1 = Instant::now();
    for _ in 0..ticks {
        for ball in &balls {
            ball.pos.set(ball.pos.get() + ball.vel * dt);
        }
        let pass = tree.reindex_query(|_, _, id| {
            reported += 1;
            id
        });
        if let Err(err) = pass {
            eprintln!("reindex failed: {err}");
            return;
        }
        if let Some(t) = tree.timing() {
            relocated += t.relocated;
            mark_ms += t.mark_ms;
        }
    }
    let t_ticks = t1.elapsed();

    let stats = tree.debug_stats();
    println!(
        "N={} insert={:?} ticks={} total={:?} per_tick={:.3}ms mark={:.3}ms/tick relocated/tick={:.1} pairs/tick={:.1} depth={} live_pairs={}",
        n,
        t_insert,
        ticks,
        t_ticks,
        t_ticks.as_secs_f64() * 1000.0 / ticks as f64,
        mark_ms / ticks as f64,
        relocated as f64 / ticks as f64,
        reported as f64 / ticks as f64,
        stats.depth,
        stats.live_pairs
    );
}
