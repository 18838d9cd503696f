use bonk_bbtree::*;
use glam::Vec2;
use std::cell::Cell;
use std::rc::Rc;

struct Body {
    name: &'static str,
    bb: Cell<Aabb>,
}

fn body(name: &'static str, bb: Aabb) -> Rc<Body> {
    Rc::new(Body { name, bb: Cell::new(bb) })
}

fn main() -> Result<(), IndexError> {
    let mut dynamic = BbTree::new(TreeConfig::default(), |b: &Rc<Body>| b.bb.get());
    let mut statics = BbTree::new_static(TreeConfig::default(), |b: &Rc<Body>| b.bb.get(), &dynamic);

    statics.insert(body("floor", Aabb::new(-10.0, -1.0, 10.0, 0.0)), 100)?;
    statics.insert(body("wall", Aabb::new(4.0, 0.0, 5.0, 6.0)), 101)?;

    let crate_box = body("crate", Aabb::from_center_half_extents(Vec2::new(0.0, 3.0), Vec2::splat(0.5)));
    dynamic.insert(crate_box.clone(), 1)?;
    dynamic.insert(body("barrel", Aabb::for_circle(Vec2::new(2.0, 0.5), 0.5)), 2)?;

    // crate slides down and right until it rests against the wall
    let mut pos = Vec2::new(0.0, 3.0);
    for tick in 0..8 {
        pos += Vec2::new(0.5, -0.4);
        pos.y = pos.y.max(0.5);
        crate_box.bb.set(Aabb::from_center_half_extents(pos, Vec2::splat(0.5)));

        let mut contacts = Vec::new();
        dynamic.reindex_query_with(Some(&statics), |a, b, id| {
            contacts.push(format!("{}/{}#{}", a.name, b.name, id));
            id + 1
        })?;
        println!("tick={} crate=({:.1},{:.1}) contacts=[{}]", tick, pos.x, pos.y, contacts.join(", "));
    }

    let stats = dynamic.debug_stats();
    println!("stamp={} live_pairs={} pooled_pairs={}", stats.stamp, stats.live_pairs, stats.pooled_pairs);
    dynamic.validate()?;
    statics.validate()
}
