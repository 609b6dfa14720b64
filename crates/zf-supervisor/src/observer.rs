//! Observer registration for supervisor read-outs.

use zf_core::{OperationMode, PumpState};

use crate::adaptive::FlowBreakdown;

/// Hooks called after a supervisor value changes. All default to no-ops.
pub trait SupervisorObserver {
    fn flow_temperature_changed(&mut self, _flow: Option<f64>) {}
    fn pump_state_changed(&mut self, _state: PumpState) {}
    fn operation_mode_changed(&mut self, _mode: OperationMode) {}
    fn flow_curve_offset_changed(&mut self, _offset: f64) {}
    fn flow_breakdown_changed(&mut self, _breakdown: Option<&FlowBreakdown>) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverHandle(u64);

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next: u64,
    observers: Vec<(ObserverHandle, Box<dyn SupervisorObserver>)>,
}

impl ObserverRegistry {
    pub(crate) fn register(&mut self, observer: Box<dyn SupervisorObserver>) -> ObserverHandle {
        let handle = ObserverHandle(self.next);
        self.next += 1;
        self.observers.push((handle, observer));
        handle
    }

    pub(crate) fn unregister(&mut self, handle: ObserverHandle) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(h, _)| *h != handle);
        before != self.observers.len()
    }

    pub(crate) fn get_mut(&mut self, handle: ObserverHandle) -> Option<&mut dyn SupervisorObserver> {
        self.observers
            .iter_mut()
            .find(|(h, _)| *h == handle)
            .map(|(_, o)| o.as_mut() as &mut dyn SupervisorObserver)
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    pub(crate) fn each(&mut self, mut f: impl FnMut(&mut dyn SupervisorObserver)) {
        for (_, observer) in &mut self.observers {
            f(observer.as_mut());
        }
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.observers.len())
            .finish()
    }
}
