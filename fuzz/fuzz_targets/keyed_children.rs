#![no_main]

use libfuzzer_sys::fuzz_target;
use reconciler::test_harness::WorkLoop;
use reconciler::{Child, ContainerId, Element, Lanes};

const MAX_ROUNDS: usize = 16;
const MAX_ITEMS: usize = 32;

/// Each input byte is one list item: the low bits pick a key out of a small
/// alphabet (so keys repeat and collide), bit 5 drops the key, bit 6 switches
/// the element type. `0xFF` ends a round.
fn rounds(data: &[u8]) -> Vec<Vec<u8>> {
    data.split(|byte| *byte == 0xFF)
        .take(MAX_ROUNDS)
        .map(|round| round.iter().copied().take(MAX_ITEMS).collect())
        .collect()
}

fn item(byte: u8) -> Child {
    let name = if byte & 0x40 == 0 { "li" } else { "p" };
    let element = Element::host(name);
    if byte & 0x20 == 0 {
        element.keyed(format!("k{}", byte & 0x0F)).into()
    } else {
        element.into()
    }
}

fuzz_target!(|data: &[u8]| {
    let mut work = WorkLoop::new(ContainerId(1));
    for round in rounds(data) {
        let children = Element::host("ul").with_children(Child::list(round.iter().map(|b| item(*b))));
        let report = match work.render_and_commit(children, Lanes::DEFAULT) {
            Ok(report) => report,
            Err(err) => panic!("reconcile failed: {err}"),
        };
        let ul = work.find(&[0]).expect("list host");
        let rendered = work.children_of(ul).len();
        assert_eq!(rendered, round.len(), "{:?}", report.effects);
    }
    // Root pair, list host pair and two nodes per surviving item.
    let expected_max = 4 + 2 * MAX_ITEMS;
    assert!(work.tree.len() <= expected_max, "leaked nodes: {}", work.tree.len());
});
