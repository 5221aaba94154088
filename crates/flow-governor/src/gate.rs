//! Owner-side lifecycle for a governor.
//!
//! A datapath does not need a governor while its flow table has room: every
//! flow is installed. [`FlowSetupGate`] engages a [`Governor`] once the
//! number of installed flows crosses a threshold, routes admission queries
//! through it while engaged, and tears it down again once it reports idle.

use std::sync::Arc;
use std::time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::config::GovernorConfig;
use crate::diagnostics::{DiagnosticsSink, TracingSink};
use crate::error::GovernorResult;
use crate::governor::Governor;

/// Engages and retires a governor around a datapath flow table.
pub struct FlowSetupGate {
    name: String,
    /// Installed flow count at which a governor is engaged.
    engage_threshold: usize,
    config: GovernorConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn DiagnosticsSink>,
    governor: Option<Governor>,
}

impl std::fmt::Debug for FlowSetupGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowSetupGate")
            .field("name", &self.name)
            .field("engage_threshold", &self.engage_threshold)
            .field("governor", &self.governor)
            .finish()
    }
}

impl FlowSetupGate {
    /// Creates a gate with default governor parameters.
    pub fn new(name: impl Into<String>, engage_threshold: usize) -> Self {
        Self {
            name: name.into(),
            engage_threshold,
            config: GovernorConfig::default(),
            clock: Arc::new(SystemClock),
            sink: Arc::new(TracingSink),
            governor: None,
        }
    }

    /// Creates a gate whose governors use the given collaborators.
    pub fn with_parts(
        name: impl Into<String>,
        engage_threshold: usize,
        config: GovernorConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> GovernorResult<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            engage_threshold,
            config,
            clock,
            sink,
            governor: None,
        })
    }

    /// Decides whether to install a flow, given that `n_flows` flows are
    /// currently installed in the datapath.
    ///
    /// Engages a governor first if `n_flows` has reached the engage
    /// threshold. Without a governor every flow is installed.
    pub fn should_install_flow(
        &mut self,
        hash: u32,
        n: u32,
        n_flows: usize,
    ) -> GovernorResult<bool> {
        if self.governor.is_none() && n_flows >= self.engage_threshold {
            self.governor = Some(Governor::with_parts(
                self.name.clone(),
                self.config.clone(),
                Arc::clone(&self.clock),
                Arc::clone(&self.sink),
            )?);
        }

        Ok(match self.governor.as_mut() {
            Some(governor) => governor.should_install_flow(hash, n),
            None => true,
        })
    }

    /// Runs governor maintenance and retires the governor once idle.
    pub fn run(&mut self) {
        let idle = match self.governor.as_mut() {
            Some(governor) => {
                governor.run();
                governor.is_idle()
            }
            None => false,
        };

        if idle {
            self.governor = None;
        }
    }

    /// Next maintenance deadline, if a governor is engaged.
    pub fn wait(&self) -> Option<Instant> {
        self.governor.as_ref().map(Governor::wait)
    }

    /// Returns true while a governor is engaged.
    pub fn is_engaged(&self) -> bool {
        self.governor.is_some()
    }

    /// The engaged governor, if any.
    pub fn governor(&self) -> Option<&Governor> {
        self.governor.as_ref()
    }

    /// Installed flow count at which a governor is engaged.
    pub fn engage_threshold(&self) -> usize {
        self.engage_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::diagnostics::{GovernorEvent, RecordingSink};
    use std::time::Duration;

    fn gate(threshold: usize) -> (FlowSetupGate, ManualClock, Arc<RecordingSink>) {
        let clock = ManualClock::new();
        let sink = RecordingSink::new();
        let gate = FlowSetupGate::with_parts(
            "br0",
            threshold,
            GovernorConfig::default(),
            Arc::new(clock.clone()),
            sink.clone(),
        )
        .unwrap();
        (gate, clock, sink)
    }

    #[test]
    fn test_installs_everything_below_threshold() {
        let (mut gate, _clock, sink) = gate(1000);
        for hash in 0..100 {
            assert!(gate.should_install_flow(hash, 1, 10).unwrap());
        }
        assert!(!gate.is_engaged());
        assert_eq!(gate.wait(), None);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_engages_at_threshold() {
        let (mut gate, clock, sink) = gate(1000);

        assert!(!gate.should_install_flow(7, 1, 1000).unwrap());
        assert!(gate.is_engaged());
        assert_eq!(gate.governor().map(Governor::name), Some("br0"));
        assert_eq!(gate.wait(), Some(clock.now() + Duration::from_secs(5)));
        assert!(matches!(
            sink.events().first(),
            Some(GovernorEvent::Engaged { .. })
        ));

        // Stays engaged even if the flow count drops back.
        for _ in 0..3 {
            assert!(!gate.should_install_flow(7, 1, 0).unwrap());
        }
        assert!(gate.should_install_flow(7, 1, 0).unwrap());
    }

    #[test]
    fn test_run_retires_idle_governor() {
        let (mut gate, clock, sink) = gate(1);
        gate.should_install_flow(7, 1, 1).unwrap();

        clock.advance(Duration::from_secs(5));
        gate.run();
        assert!(gate.is_engaged());

        clock.advance(Duration::from_millis(1));
        gate.run();
        assert!(!gate.is_engaged());
        assert!(matches!(
            sink.events().last(),
            Some(GovernorEvent::Disengaged { .. })
        ));
    }

    #[test]
    fn test_run_shrinks_before_retiring() {
        let (mut gate, clock, _sink) = gate(1);
        gate.should_install_flow(0, 4096, 1).unwrap();
        assert_eq!(gate.governor().map(Governor::size), Some(32 * 1024));

        clock.advance(Duration::from_secs(6));
        gate.run();
        assert!(gate.is_engaged());
        assert_eq!(gate.governor().map(Governor::size), Some(16 * 1024));

        clock.advance(Duration::from_secs(6));
        gate.run();
        assert!(!gate.is_engaged());
    }

    #[test]
    fn test_run_without_governor_is_noop() {
        let (mut gate, clock, sink) = gate(10);
        clock.advance(Duration::from_secs(60));
        gate.run();
        assert!(!gate.is_engaged());
        assert_eq!(gate.engage_threshold(), 10);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_dropping_gate_disengages_once() {
        let (mut gate, _clock, sink) = gate(1);
        gate.should_install_flow(7, 1, 1).unwrap();
        drop(gate);

        let disengaged = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, GovernorEvent::Disengaged { .. }))
            .count();
        assert_eq!(disengaged, 1);

        // A gate that never engaged has nothing to tear down.
        let (gate, _clock, sink) = self::gate(1);
        drop(gate);
        assert!(sink.events().is_empty());
    }
}
