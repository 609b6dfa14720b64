//! Sticky heat/cool selection for auto mode.

use zf_core::ThermalDirection;

use crate::demand::DemandBook;

/// Half-width of the band in which the previous direction is kept.
pub const DIRECTION_DEADBAND: f64 = 0.2;

/// Auto-mode direction with deadband memory.
///
/// The mean of `current - target` over known zones must leave
/// `[-0.2, +0.2]` (exclusive on both edges) to flip the direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoDirection {
    last: ThermalDirection,
}

impl AutoDirection {
    pub fn current(&self) -> ThermalDirection {
        self.last
    }

    /// Force the remembered direction (manual heat/cool selection).
    pub fn seed(&mut self, direction: ThermalDirection) {
        self.last = direction;
    }

    /// Decide from a mean delta. `None` (no known zones) resets to heat.
    pub fn decide(&mut self, mean_delta: Option<f64>) -> ThermalDirection {
        match mean_delta {
            None => self.last = ThermalDirection::Heat,
            Some(avg) if avg > DIRECTION_DEADBAND => self.last = ThermalDirection::Cool,
            Some(avg) if avg < -DIRECTION_DEADBAND => self.last = ThermalDirection::Heat,
            Some(_) => {}
        }
        self.last
    }

    pub fn update(&mut self, book: &DemandBook) -> ThermalDirection {
        self.decide(book.mean_delta())
    }
}
