#![no_main]

use libfuzzer_sys::fuzz_target;
use wyr_client::machine::RoundMachine;
use wyr_client::score::{collect_results, summarize};
use wyr_client::{GameDocument, Role};

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let Ok(doc) = GameDocument::from_snapshot(value) else {
        return;
    };

    // Whatever a peer wrote, evaluating it must not panic on either side.
    for role in [Role::Host, Role::Guest] {
        let mut machine = RoundMachine::new(role);
        let _ = machine.on_snapshot(doc.clone());
        let _ = machine.advance_batch("wyr-games/0000");
    }
    let _ = summarize(&collect_results(&doc, &[]));
    let _ = doc.to_snapshot();
});
