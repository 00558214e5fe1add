use bevy_ecs::prelude::Resource;

/// Current simulated second and the calendar fields derived from it.
#[derive(Debug, Clone, Copy, Default, Resource)]
pub struct SimulationClock {
    now: u64,
    day_of_week: u8,
    epoch_seconds: i64,
}

impl SimulationClock {
    pub fn new(day_of_week: u8, epoch_seconds: i64) -> Self {
        Self {
            now: 0,
            day_of_week,
            epoch_seconds,
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn update(&mut self, second: u64) {
        debug_assert!(second >= self.now, "clock must not move backwards");
        self.now = second;
    }

    pub fn day_of_week(&self) -> u8 {
        self.day_of_week
    }

    /// Hour of day, 0..=23. The final second of a day wraps to hour 0.
    pub fn hour(&self) -> u8 {
        ((self.now % 86_400) / 3_600) as u8
    }

    pub fn minute(&self) -> u8 {
        ((self.now % 3_600) / 60) as u8
    }

    pub fn second_of_minute(&self) -> u8 {
        (self.now % 60) as u8
    }

    /// Wall-clock equivalent of a simulated second.
    pub fn timestamp_of(&self, second: u64) -> i64 {
        self.epoch_seconds + second as i64
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp_of(self.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_calendar_fields() {
        let mut clock = SimulationClock::new(5, 1_000);
        clock.update(3 * 3_600 + 25 * 60 + 7);
        assert_eq!(clock.hour(), 3);
        assert_eq!(clock.minute(), 25);
        assert_eq!(clock.second_of_minute(), 7);
        assert_eq!(clock.day_of_week(), 5);
        assert_eq!(clock.timestamp(), 1_000 + clock.now() as i64);
    }
}
