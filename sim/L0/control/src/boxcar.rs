//! Stacked periodic pulses.

use std::collections::BTreeMap;

use sim_types::{Attributes, SimError};

use crate::driver::{update_time_driver, Driver, DriverBase, StepContext, TimeDriver, TimeMemo};
use crate::{Result, SharedDrivable};

/// One rectangular pulse within a normalised cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boxcar {
    /// Start of the pulse, as a fraction of the cycle in `[0, 1)`.
    pub delay: f64,
    /// Length of the pulse, as a fraction of the cycle in `[0, 1)`.
    pub width: f64,
    /// Output while the pulse is on.
    pub height: f64,
}

impl Boxcar {
    /// Create a pulse. `delay` and `width` are reduced to their fractional part.
    #[must_use]
    pub fn new(delay: f64, width: f64, height: f64) -> Self {
        Self {
            delay: fractional(delay),
            width: fractional(width),
            height,
        }
    }

    /// Whether the pulse is on at normalised time `n`.
    ///
    /// The window is `[delay, delay + width)`, wrapping past the end of the
    /// cycle when `delay + width >= 1`.
    #[must_use]
    pub fn contains(&self, n: f64) -> bool {
        let off = self.delay + self.width;
        if off < 1.0 {
            n >= self.delay && n < off
        } else {
            n < off - 1.0 || n >= self.delay
        }
    }
}

fn fractional(x: f64) -> f64 {
    x - x.floor()
}

/// Sum of `StackSize` boxcar pulses repeating every `CycleTime`.
#[derive(Debug)]
pub struct StackedBoxcarDriver {
    base: DriverBase,
    cycle_time: f64,
    pulses: Vec<Boxcar>,
    memo: TimeMemo,
}

impl StackedBoxcarDriver {
    /// Create a boxcar driver.
    pub fn new(base: DriverBase, cycle_time: f64, pulses: Vec<Boxcar>) -> Result<Self> {
        if !(cycle_time.is_finite() && cycle_time > 0.0) {
            return Err(SimError::invalid(
                base.name(),
                "CycleTime",
                cycle_time.to_string(),
                "must be positive",
            )
            .into());
        }
        Ok(Self {
            base,
            cycle_time,
            pulses,
            memo: TimeMemo::default(),
        })
    }

    /// Build from attributes (`StackSize`, `CycleTime`, `Delays`, `Widths`, `Heights`).
    pub fn from_attributes(
        attrs: &Attributes,
        drivables: &BTreeMap<String, SharedDrivable>,
    ) -> Result<Self> {
        let base = DriverBase::from_attributes(attrs, drivables)?;
        let stack_size = attrs.required_usize("StackSize")?;
        let cycle_time = attrs.required_f64("CycleTime")?;
        let delays = stack_list(attrs, "Delays", stack_size)?;
        let widths = stack_list(attrs, "Widths", stack_size)?;
        let heights = stack_list(attrs, "Heights", stack_size)?;
        let pulses = delays
            .iter()
            .zip(&widths)
            .zip(&heights)
            .map(|((d, w), h)| Boxcar::new(*d, *w, *h))
            .collect();
        Self::new(base, cycle_time, pulses)
    }

    /// Cycle period.
    #[must_use]
    pub fn cycle_time(&self) -> f64 {
        self.cycle_time
    }

    /// The pulses.
    #[must_use]
    pub fn pulses(&self) -> &[Boxcar] {
        &self.pulses
    }

    /// Position of `time` in the cycle, in `[0, 1)`.
    #[must_use]
    pub fn normalised_time(&self, time: f64) -> f64 {
        fractional(time / self.cycle_time)
    }
}

fn stack_list(attrs: &Attributes, key: &str, stack_size: usize) -> Result<Vec<f64>> {
    let list = attrs.required_f64_list(key)?;
    if list.len() != stack_size {
        return Err(SimError::LengthMismatch {
            object: attrs.name().to_string(),
            left: "StackSize".to_string(),
            left_len: stack_size,
            right: key.to_string(),
            right_len: list.len(),
        }
        .into());
    }
    Ok(list)
}

impl Driver for StackedBoxcarDriver {
    fn base(&self) -> &DriverBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DriverBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "StackedBoxcar"
    }

    fn update(&mut self, ctx: &mut StepContext<'_>) -> Result<()> {
        update_time_driver(self, ctx)
    }

    fn append_to_attributes(&self, attrs: &mut Attributes) {
        self.base.append_to_attributes(attrs, self.type_name());
        attrs.set("StackSize", self.pulses.len().to_string());
        attrs.set_f64("CycleTime", self.cycle_time);
        let column = |f: fn(&Boxcar) -> f64| self.pulses.iter().map(f).collect::<Vec<_>>();
        attrs.set_f64_list("Delays", &column(|p| p.delay));
        attrs.set_f64_list("Widths", &column(|p| p.width));
        attrs.set_f64_list("Heights", &column(|p| p.height));
    }
}

impl TimeDriver for StackedBoxcarDriver {
    fn value_at(&mut self, time: f64) -> f64 {
        if let Some(value) = self.memo.lookup(time) {
            return value;
        }
        let n = self.normalised_time(time);
        let raw: f64 = self
            .pulses
            .iter()
            .filter(|p| p.contains(n))
            .map(|p| p.height)
            .sum();
        let value = self.base.clamp(raw);
        self.memo.store(time, value)
    }
}
