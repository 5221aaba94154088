//! Integration tests for governor engagement and retirement.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sonic_flow_governor::{
    Clock, FlowSetupGate, GovernorConfig, GovernorEvent, ManualClock, RecordingSink, MIN_SIZE,
};

const ENGAGE_AT: usize = 100;

fn gate() -> (FlowSetupGate, ManualClock, Arc<RecordingSink>) {
    let clock = ManualClock::new();
    let sink = RecordingSink::new();
    let gate = FlowSetupGate::with_parts(
        "PortChannel01",
        ENGAGE_AT,
        GovernorConfig::default(),
        Arc::new(clock.clone()),
        sink.clone(),
    )
    .unwrap();
    (gate, clock, sink)
}

/// Simulates a datapath: installed flows bypass the gate.
#[test]
fn test_engage_then_retire_cycle() {
    let (mut gate, clock, sink) = gate();
    let mut installed = HashSet::new();

    // Uncontended: the first ENGAGE_AT one-shot flows all get installed.
    for hash in 0..ENGAGE_AT as u32 {
        assert!(gate
            .should_install_flow(hash * 2, 1, installed.len())
            .unwrap());
        installed.insert(hash * 2);
    }
    assert!(!gate.is_engaged());

    // Pressure: these flows collide on one counter, so only every fifth
    // packet gets a flow installed.
    for hash in 1000..1100u32 {
        let install = gate
            .should_install_flow(hash << 20, 1, installed.len())
            .unwrap();
        assert!(!install || hash % 5 == 4, "hash {}", hash);
    }
    assert!(gate.is_engaged());

    // A repeating flow still makes it through.
    let hot = 0x0000_0777;
    let installs = (0..5)
        .filter(|_| gate.should_install_flow(hot, 1, installed.len()).unwrap())
        .count();
    assert_eq!(installs, 1);

    // Traffic stops; the governor goes idle and is retired.
    let deadline = gate.wait().unwrap();
    clock.advance(Duration::from_secs(5) + Duration::from_millis(1));
    assert!(clock.now() > deadline);
    gate.run();
    assert!(!gate.is_engaged());
    assert_eq!(gate.wait(), None);

    let events = sink.events();
    assert!(matches!(
        events.first(),
        Some(GovernorEvent::Engaged { size: MIN_SIZE, .. })
    ));
    assert_eq!(
        events.last(),
        Some(&GovernorEvent::Disengaged {
            name: "PortChannel01".to_string()
        })
    );

    // Table pressure re-engages a fresh governor.
    installed.clear();
    assert!(gate.should_install_flow(1, 1, 0).unwrap());
    assert!(!gate.should_install_flow(3, 1, ENGAGE_AT).unwrap());
    assert!(gate.is_engaged());
    assert_eq!(gate.governor().map(|g| g.stats().generations), Some(1));
}
