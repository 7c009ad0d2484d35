use std::time::Duration;

pub const DEFAULT_FPS: f64 = 5.0;
pub const DEFAULT_SPEEDS: [f64; 3] = [1.0, 1.5, 2.0];

/// Used when the effective frame rate is not positive.
const FALLBACK_INTERVAL: Duration = Duration::from_millis(200);

/// Timer state for automatic frame advance.
#[derive(Debug, Clone)]
pub struct Playback {
    fps: f64,
    speeds: Vec<f64>,
    speed_index: usize,
    playing: bool,
}

impl Default for Playback {
    fn default() -> Self {
        Self::new(DEFAULT_FPS, DEFAULT_SPEEDS.to_vec())
    }
}

impl Playback {
    pub fn new(fps: f64, speeds: Vec<f64>) -> Self {
        let speeds = if speeds.is_empty() { vec![1.0] } else { speeds };
        Self {
            fps,
            speeds,
            speed_index: 0,
            playing: false,
        }
    }

    pub fn speed(&self) -> f64 {
        self.speeds[self.speed_index]
    }

    pub fn speed_up(&mut self) -> f64 {
        self.speed_index = (self.speed_index + 1).min(self.speeds.len() - 1);
        self.speed()
    }

    pub fn slow_down(&mut self) -> f64 {
        self.speed_index = self.speed_index.saturating_sub(1);
        self.speed()
    }

    /// Delay between two ticks at the current speed.
    pub fn interval(&self) -> Duration {
        let effective = self.fps * self.speed();
        if effective > 0.0 && effective.is_finite() {
            Duration::from_millis(((1000.0 / effective) as u64).max(1))
        } else {
            FALLBACK_INTERVAL
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn toggle(&mut self) -> bool {
        self.playing = !self.playing;
        self.playing
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// One timer tick. `advance` moves to the next frame and reports whether
    /// it could; reaching the end pauses playback. Ticks while paused do
    /// nothing.
    pub fn tick<E>(&mut self, advance: impl FnOnce() -> Result<bool, E>) -> Result<bool, E> {
        if !self.playing {
            return Ok(false);
        }
        let advanced = advance()?;
        if !advanced {
            self.pause();
        }
        Ok(advanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_follows_speed() {
        let mut playback = Playback::default();
        assert_eq!(playback.interval(), Duration::from_millis(200));
        assert_eq!(playback.speed_up(), 1.5);
        assert_eq!(playback.interval(), Duration::from_millis(133));
        assert_eq!(playback.speed_up(), 2.0);
        assert_eq!(playback.speed_up(), 2.0);
        assert_eq!(playback.interval(), Duration::from_millis(100));
        assert_eq!(playback.slow_down(), 1.5);
        assert_eq!(playback.slow_down(), 1.0);
        assert_eq!(playback.slow_down(), 1.0);
    }

    #[test]
    fn non_positive_fps_uses_fallback() {
        let playback = Playback::new(0.0, vec![]);
        assert_eq!(playback.speed(), 1.0);
        assert_eq!(playback.interval(), FALLBACK_INTERVAL);
    }

    #[test]
    fn tick_pauses_at_end() {
        let mut playback = Playback::default();
        assert_eq!(playback.tick::<()>(|| Ok(true)), Ok(false));

        playback.toggle();
        assert_eq!(playback.tick::<()>(|| Ok(true)), Ok(true));
        assert!(playback.is_playing());
        assert_eq!(playback.tick::<()>(|| Ok(false)), Ok(false));
        assert!(!playback.is_playing());
    }
}
