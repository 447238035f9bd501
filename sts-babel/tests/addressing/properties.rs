//! Counter and level properties of the addressing engine.

use proptest::prelude::*;
use sts_babel::addressing::{AddressingEngine, StructuralPath};
use sts_babel::tree::Tag;

fn path(p: &str) -> StructuralPath {
    StructuralPath::parse(p)
}

proptest! {
    #[test]
    fn counters_increase_by_one_within_a_scope(count in 1usize..40) {
        let mut engine = AddressingEngine::new();
        engine.enter_level(&path("body"), &Tag::Body);
        engine.enter_level(&path("body/sec"), &Tag::Sec);
        for n in 1..=count {
            let address = engine.enter_counter(&path("body/sec"), &Tag::TableWrap);
            prop_assert_eq!(address, format!("table-wrap_1_{n}"));
        }
        prop_assert_eq!(engine.counter(&path("body/sec"), &Tag::TableWrap), count as u32);
    }

    #[test]
    fn deeper_levels_restart_under_each_parent(children in prop::collection::vec(0usize..6, 1..8)) {
        let mut engine = AddressingEngine::new();
        engine.enter_level(&path("body"), &Tag::Body);
        for (i, &subsections) in children.iter().enumerate() {
            let top = i + 1;
            prop_assert_eq!(engine.enter_level(&path("body/sec"), &Tag::Sec), format!("sec_{top}"));
            for j in 1..=subsections {
                prop_assert_eq!(
                    engine.enter_level(&path("body/sec/sec"), &Tag::Sec),
                    format!("sec_{top}-{j}")
                );
                // Each subsection opens a fresh counter scope.
                prop_assert_eq!(
                    engine.enter_counter(&path("body/sec/sec"), &Tag::Fig),
                    format!("fig_{top}-{j}_1")
                );
            }
        }
    }

    #[test]
    fn parts_restart_numbering(front in 1usize..5, body in 1usize..5) {
        let mut engine = AddressingEngine::new();
        engine.enter_level(&path("front"), &Tag::Front);
        for n in 1..=front {
            prop_assert_eq!(engine.enter_level(&path("front/sec"), &Tag::Sec), format!("sec_{n}"));
        }
        engine.enter_level(&path("body"), &Tag::Body);
        for n in 1..=body {
            prop_assert_eq!(engine.enter_level(&path("body/sec"), &Tag::Sec), format!("sec_{n}"));
        }
    }
}

#[test]
fn unattached_counters_have_no_address() {
    let mut engine = AddressingEngine::new();
    assert_eq!(engine.enter_counter(&path("body/sec"), &Tag::Fig), "");
}

#[test]
fn depth_ignores_the_part_marker() {
    assert_eq!(path("body").depth(), 0);
    assert_eq!(path("body/sec/sec").depth(), 2);
    assert_eq!(path("body/p/sec").to_string(), "body/sec");
}
