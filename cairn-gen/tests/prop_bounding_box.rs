use cairn_gen::{BlockPos, BoundingBox};
use proptest::prelude::*;

fn any_box() -> impl Strategy<Value = BoundingBox> {
    (-500i32..500, -64i32..320, -500i32..500, 1i32..40, 1i32..40, 1i32..40)
        .prop_map(|(x, y, z, w, h, d)| BoundingBox::new(x, y, z, x + w - 1, y + h - 1, z + d - 1))
}

proptest! {
    #[test]
    fn intersects_is_symmetric(a in any_box(), b in any_box()) {
        prop_assert_eq!(a.intersects(&b), b.intersects(&a));
    }

    #[test]
    fn intersection_lies_in_both(a in any_box(), b in any_box()) {
        match a.intersection(&b) {
            Some(clip) => {
                prop_assert!(a.intersects(&b));
                for corner in clip.corners() {
                    prop_assert!(a.is_inside(corner) && b.is_inside(corner));
                }
            }
            None => prop_assert!(!a.intersects(&b)),
        }
    }

    #[test]
    fn encapsulating_one_box_is_that_box(a in any_box()) {
        prop_assert_eq!(BoundingBox::encapsulating_all([a]), Some(a));
    }

    #[test]
    fn encapsulating_contains_inputs(boxes in prop::collection::vec(any_box(), 1..8)) {
        let all = BoundingBox::encapsulating_all(boxes.iter().copied()).unwrap();
        for b in &boxes {
            prop_assert!(b.corners().iter().all(|c| all.is_inside(*c)));
        }
    }

    #[test]
    fn moved_preserves_spans(b in any_box(), dx in -100i32..100, dy in -100i32..100, dz in -100i32..100) {
        let m = b.moved(dx, dy, dz);
        prop_assert_eq!((m.span_x(), m.span_y(), m.span_z()), (b.span_x(), b.span_y(), b.span_z()));
        prop_assert_eq!(m.min(), b.min() + BlockPos::new(dx, dy, dz));
    }

    #[test]
    fn corners_normalize_in_any_order(ax in -50i32..50, ay in -50i32..50, az in -50i32..50,
                                      bx in -50i32..50, by in -50i32..50, bz in -50i32..50) {
        let a = BlockPos::new(ax, ay, az);
        let b = BlockPos::new(bx, by, bz);
        let forward = BoundingBox::from_corners(a, b);
        prop_assert_eq!(forward, BoundingBox::from_corners(b, a));
        prop_assert!(forward.is_inside(a) && forward.is_inside(b));
    }

    #[test]
    fn center_is_inside(b in any_box()) {
        prop_assert!(b.is_inside(b.center()));
    }
}
