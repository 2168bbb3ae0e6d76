#![no_main]

use libfuzzer_sys::fuzz_target;
use reconciler::{Lanes, Update, UpdateKind, UpdateQueue};
use serde_json::{Value, json};

const LANES: [Lanes; 5] = [
    Lanes::SYNC,
    Lanes::INPUT_CONTINUOUS,
    Lanes::DEFAULT,
    Lanes::TRANSITION,
    Lanes::IDLE,
];

fn append(lane: Lanes, letter: char) -> Update<Value, ()> {
    Update::reducer(lane, UpdateKind::Replace, move |prev: &Value, _: &()| {
        Some(Value::String(format!("{}{letter}", prev.as_str().unwrap_or(""))))
    })
}

// First half of the input enqueues records, second half picks the lane
// masks of successive passes. However the passes are staged, a final pass
// over every lane must equal folding everything at once.
fuzz_target!(|data: &[u8]| {
    let (records, passes) = data.split_at(data.len() / 2);
    let mut staged = UpdateQueue::<Value, ()>::new(json!(""));
    let mut all_at_once = UpdateQueue::<Value, ()>::new(json!(""));
    for (index, byte) in records.iter().take(64).enumerate() {
        let lane = LANES[usize::from(*byte) % LANES.len()];
        let letter = char::from(b'a' + (index % 26) as u8);
        staged.enqueue(append(lane, letter));
        all_at_once.enqueue(append(lane, letter));
    }

    for byte in passes.iter().take(16) {
        let mut render = Lanes::NONE;
        for (bit, lane) in LANES.iter().enumerate() {
            if byte & (1 << bit) != 0 {
                render |= *lane;
            }
        }
        staged.process(None, render, render, &());
    }

    let expected = all_at_once.process(None, Lanes::ALL, Lanes::ALL, &()).state;
    let actual = staged.process(None, Lanes::ALL, Lanes::ALL, &());
    assert_eq!(actual.state, expected);
    assert_eq!(actual.remaining_lanes, Lanes::NONE);
});
