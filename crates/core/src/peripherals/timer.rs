// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::clock::Clock;
use crate::{SimResult, SimulationError};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

pub const TIMER_COUNT: usize = 3;
pub const TIMER_ACTIVE: u32 = 1 << 19;
pub const TIMER_VALUE_MASK: u32 = TIMER_ACTIVE - 1;
pub const DEFAULT_TICK: Duration = Duration::from_millis(20);

/// One countdown timer: packed active flag + remaining ticks.
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
struct TimerRecord {
    value: u32,
    #[serde(skip)]
    reference: Duration,
}

impl TimerRecord {
    fn active(&self) -> bool {
        self.value & TIMER_ACTIVE != 0
    }

    fn remaining(&self) -> u32 {
        self.value & TIMER_VALUE_MASK
    }

    fn counting(&self) -> bool {
        self.active() && self.remaining() > 0
    }
}

/// Bank of three free-running countdown timers.
///
/// Counting happens lazily: each read converts the wall time elapsed since
/// the last decrement into whole ticks, subtracts them and restarts the
/// reference at the read instant, so the fraction of a tick left over is
/// dropped. A timer that runs out stays at `ACTIVE | 0` until rewritten.
#[derive(Debug, serde::Serialize)]
pub struct TimerBank {
    timers: [TimerRecord; TIMER_COUNT],
    #[serde(skip)]
    clock: Arc<dyn Clock>,
    #[serde(skip)]
    tick: Duration,
}

impl TimerBank {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_tick(clock, DEFAULT_TICK)
    }

    pub fn with_tick(clock: Arc<dyn Clock>, tick: Duration) -> Self {
        Self {
            timers: [TimerRecord::default(); TIMER_COUNT],
            clock,
            tick: tick.max(Duration::from_nanos(1)),
        }
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    #[track_caller]
    fn index(offset: u32) -> SimResult<usize> {
        let idx = (offset / 4) as usize;
        if idx >= TIMER_COUNT {
            return Err(SimulationError::protocol(format!(
                "no timer at offset {:#x}",
                offset
            )));
        }
        Ok(idx)
    }

    fn update(&mut self, idx: usize) -> u32 {
        let now = self.clock.now();
        let tick = self.tick;
        let timer = &mut self.timers[idx];
        if !timer.counting() {
            return timer.value;
        }

        let elapsed = now.saturating_sub(timer.reference);
        let ticks = elapsed.as_nanos() / tick.as_nanos();
        if ticks >= timer.remaining() as u128 {
            timer.value = TIMER_ACTIVE;
            tracing::trace!("Timer {} expired", idx);
        } else if ticks > 0 {
            // ticks < remaining <= TIMER_VALUE_MASK, so it fits in u32.
            timer.value = TIMER_ACTIVE | (timer.remaining() - ticks as u32);
            timer.reference = now;
        }
        timer.value
    }

    /// Current value of timer `idx`, after catching up with the clock.
    pub fn value(&mut self, idx: usize) -> u32 {
        self.update(idx)
    }
}

impl crate::Peripheral for TimerBank {
    fn read(&mut self, offset: u32) -> SimResult<u32> {
        let idx = Self::index(offset)?;
        Ok(self.update(idx))
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        let idx = Self::index(offset)?;
        let now = self.clock.now();
        let timer = &mut self.timers[idx];
        timer.value = value & (TIMER_ACTIVE | TIMER_VALUE_MASK);
        if timer.counting() {
            timer.reference = now;
            tracing::trace!("Timer {} armed with {} ticks", idx, timer.remaining());
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.timers = [TimerRecord::default(); TIMER_COUNT];
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
