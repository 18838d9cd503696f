use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

use bonk_bbtree::*;
use proptest::prelude::*;

struct Body {
    id: ObjectId,
    bb: Cell<Aabb>,
}

type Shared = Rc<Body>;

#[derive(Clone, Debug)]
enum Op {
    Insert { x: f32, y: f32, w: f32, h: f32 },
    Remove(usize),
    Move { pick: usize, dx: f32, dy: f32 },
    Reindex,
    Optimize,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0.0f32..30.0, 0.0f32..30.0, 0.1f32..4.0, 0.1f32..4.0)
            .prop_map(|(x, y, w, h)| Op::Insert { x, y, w, h }),
        1 => any::<usize>().prop_map(Op::Remove),
        3 => (any::<usize>(), -3.0f32..3.0, -3.0f32..3.0).prop_map(|(pick, dx, dy)| Op::Move { pick, dx, dy }),
        2 => Just(Op::Reindex),
        1 => Just(Op::Optimize),
    ]
}

fn unordered(a: ObjectId, b: ObjectId) -> (ObjectId, ObjectId) {
    if a < b { (a, b) } else { (b, a) }
}

/// Pairs whose stored boxes overlap, by brute force.
fn expected_pairs(tree: &BbTree<Shared>, ids: &[ObjectId]) -> BTreeSet<(ObjectId, ObjectId)> {
    let mut out = BTreeSet::new();
    for (i, &a) in ids.iter().enumerate() {
        for &b in &ids[i + 1..] {
            let (Some(bb_a), Some(bb_b)) = (tree.fat_bb(a), tree.fat_bb(b)) else {
                continue;
            };
            if bb_a.intersects(&bb_b) {
                out.insert(unordered(a, b));
            }
        }
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn tree_stays_consistent_and_reports_each_pair_once(ops in prop::collection::vec(op(), 1..120)) {
        let mut tree: BbTree<Shared> = BbTree::new(TreeConfig::default(), |o: &Shared| o.bb.get());
        let mut live: Vec<Shared> = Vec::new();
        let mut next_id: ObjectId = 0;

        for op in ops {
            match op {
                Op::Insert { x, y, w, h } => {
                    let body = Rc::new(Body { id: next_id, bb: Cell::new(Aabb::new(x, y, x + w, y + h)) });
                    tree.insert(body.clone(), next_id).unwrap();
                    prop_assert!(tree.contains(next_id));
                    live.push(body);
                    next_id += 1;
                }
                Op::Remove(pick) => {
                    if live.is_empty() {
                        continue;
                    }
                    let body = live.swap_remove(pick % live.len());
                    let removed = tree.remove(body.id).unwrap();
                    prop_assert_eq!(removed.id, body.id);
                    prop_assert!(!tree.contains(body.id));
                }
                Op::Move { pick, dx, dy } => {
                    if live.is_empty() {
                        continue;
                    }
                    let body = &live[pick % live.len()];
                    let bb = body.bb.get();
                    body.bb.set(Aabb::new(bb.l() + dx, bb.b() + dy, bb.r() + dx, bb.t() + dy));
                }
                Op::Reindex => {
                    let mut seen = Vec::new();
                    tree.reindex_query(|a, b, id| {
                        seen.push(unordered(a.id, b.id));
                        id
                    })
                    .unwrap();
                    let reported: BTreeSet<_> = seen.iter().copied().collect();
                    prop_assert_eq!(reported.len(), seen.len(), "a pair was reported twice");

                    let ids: Vec<ObjectId> = live.iter().map(|b| b.id).collect();
                    prop_assert_eq!(reported, expected_pairs(&tree, &ids));
                    tree.validate().unwrap();
                }
                Op::Optimize => tree.optimize().unwrap(),
            }
            prop_assert_eq!(tree.count(), live.len());
            tree.context().check_pairs().unwrap();
        }

        tree.reindex().unwrap();
        tree.validate().unwrap();
    }

    #[test]
    fn count_tracks_inserts_minus_removes(n in 1usize..80, m_frac in 0.0f64..=1.0) {
        let mut tree: BbTree<Aabb> = BbTree::new(TreeConfig::default(), |bb: &Aabb| *bb);
        for i in 0..n {
            let x = (i % 10) as f32;
            let y = (i / 10) as f32;
            tree.insert(Aabb::new(x, y, x + 1.5, y + 1.5), i as ObjectId).unwrap();
        }
        let m = ((n as f64) * m_frac) as usize;
        for i in 0..m {
            tree.remove(i as ObjectId).unwrap();
            prop_assert!(!tree.contains(i as ObjectId));
        }
        prop_assert_eq!(tree.count(), n - m);
        prop_assert!(tree.contains(n as ObjectId - 1) == (m < n));
        tree.validate().unwrap();
    }

    #[test]
    fn static_and_dynamic_pairs_match_brute_force(
        statics_boxes in prop::collection::vec((0.0f32..20.0, 0.0f32..20.0, 0.5f32..5.0), 1..20),
        moves in prop::collection::vec((0.0f32..20.0, 0.0f32..20.0), 1..30),
    ) {
        let mut dynamic: BbTree<Shared> = BbTree::new(TreeConfig::default(), |o: &Shared| o.bb.get());
        let mut statics: BbTree<Shared> = BbTree::new_static(TreeConfig::default(), |o: &Shared| o.bb.get(), &dynamic);
        let mut static_ids = Vec::new();
        for (i, &(x, y, s)) in statics_boxes.iter().enumerate() {
            let id = 1000 + i as ObjectId;
            statics.insert(Rc::new(Body { id, bb: Cell::new(Aabb::new(x, y, x + s, y + s)) }), id).unwrap();
            static_ids.push(id);
        }
        let bodies: Vec<Shared> = (0..4)
            .map(|i| Rc::new(Body { id: i, bb: Cell::new(Aabb::new(0.0, 0.0, 1.0, 1.0)) }))
            .collect();
        for body in &bodies {
            dynamic.insert(body.clone(), body.id).unwrap();
        }

        for (step, &(x, y)) in moves.iter().enumerate() {
            let body = &bodies[step % bodies.len()];
            body.bb.set(Aabb::new(x, y, x + 1.0, y + 1.0));

            let mut seen = Vec::new();
            dynamic
                .reindex_query_with(Some(&statics), |a, b, id| {
                    seen.push(unordered(a.id, b.id));
                    id
                })
                .unwrap();
            let reported: BTreeSet<_> = seen.iter().copied().collect();
            prop_assert_eq!(reported.len(), seen.len(), "a pair was reported twice");

            let mut expected = BTreeSet::new();
            for (i, a) in bodies.iter().enumerate() {
                let bb_a = dynamic.fat_bb(a.id).unwrap();
                for b in &bodies[i + 1..] {
                    if bb_a.intersects(&dynamic.fat_bb(b.id).unwrap()) {
                        expected.insert(unordered(a.id, b.id));
                    }
                }
                for &s in &static_ids {
                    if bb_a.intersects(&statics.fat_bb(s).unwrap()) {
                        expected.insert(unordered(a.id, s));
                    }
                }
            }
            prop_assert_eq!(reported, expected);
        }
        dynamic.validate().unwrap();
        statics.validate().unwrap();
    }
}
