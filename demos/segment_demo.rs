use bonk_bbtree::*;
use glam::Vec2;

fn main() -> Result<(), IndexError> {
    let mut tree = BbTree::new(TreeConfig::default(), |c: &(Vec2, f32)| Aabb::for_circle(c.0, c.1));
    tree.insert((Vec2::new(2.0, 0.0), 0.5), 10)?;
    tree.insert((Vec2::new(4.0, 0.2), 0.5), 20)?;
    tree.insert((Vec2::new(3.0, 4.0), 1.0), 30)?;

    let query = SegmentQuery::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), 0.0);
    let mut hit = None;
    let t = tree.segment_query(query, 1.0, |&(center, radius), q| {
        // ray/circle entry fraction
        let d = q.to - q.from;
        let f = q.from - center;
        let a = d.dot(d);
        let b = 2.0 * f.dot(d);
        let c = f.dot(f) - (radius + q.radius) * (radius + q.radius);
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            return 1.0;
        }
        let t = (-b - disc.sqrt()) / (2.0 * a);
        if (0.0..1.0).contains(&t) {
            hit = Some(center);
            t
        } else {
            1.0
        }
    });

    match hit {
        Some(center) => {
            let p = query.point_at(t);
            println!("Segment hit circle at ({:.1},{:.1}) t={:.3} point=({:.2},{:.2})", center.x, center.y, t, p.x, p.y);
        }
        None => println!("No hit"),
    }
    Ok(())
}
