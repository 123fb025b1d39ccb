//! Tick-driven smooth wheel zoom.
//!
//! A wheel notch starts an animation of `duration / interval` ticks. Every
//! tick multiplies the view scale by `1 ± zoom_in_factor / ticks` about the
//! cursor position. The caller owns the clock and feeds elapsed time in.

use kurbo::Point;

use crate::settings::ViewerSettings;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomConfig {
    pub duration: f64,
    pub interval: f64,
    pub zoom_in_factor: f64,
    pub min_scale: f64,
    pub max_scale: f64,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self::from(&ViewerSettings::default())
    }
}

impl From<&ViewerSettings> for ZoomConfig {
    fn from(s: &ViewerSettings) -> Self {
        Self {
            duration: s.smooth_zoom_duration,
            interval: s.smooth_zoom_interval,
            zoom_in_factor: s.zoom_in_factor,
            min_scale: s.min_scale,
            max_scale: s.max_scale,
        }
    }
}

impl ZoomConfig {
    pub fn ticks(&self) -> u32 {
        if self.interval <= 0.0 {
            return 1;
        }
        (self.duration / self.interval).round().max(1.0) as u32
    }
}

/// One in-flight zoom gesture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothZoom {
    /// View-space position that stays fixed.
    pub anchor: Point,
    pub factor_per_tick: f64,
    pub remaining_ticks: u32,
    interval: f64,
    /// Elapsed time not yet turned into a tick.
    carry: f64,
}

impl SmoothZoom {
    /// Gesture for a wheel `delta`: positive zooms in, negative zooms out.
    /// `None` for a zero delta.
    pub fn start(config: &ZoomConfig, anchor: Point, delta: f64) -> Option<Self> {
        if delta == 0.0 || delta.is_nan() {
            return None;
        }
        let ticks = config.ticks();
        let step = config.zoom_in_factor / ticks as f64;
        let factor_per_tick = if delta > 0.0 { 1.0 + step } else { 1.0 - step };
        Some(Self {
            anchor,
            factor_per_tick,
            remaining_ticks: ticks,
            interval: config.interval.max(f64::EPSILON),
            carry: 0.0,
        })
    }

    /// Consume `elapsed` time and return how many ticks are due now.
    pub fn advance(&mut self, elapsed: f64) -> u32 {
        self.carry += elapsed.max(0.0);
        let mut due = 0;
        while self.remaining_ticks > 0 && self.carry + 1e-9 >= self.interval {
            self.carry -= self.interval;
            self.remaining_ticks -= 1;
            due += 1;
        }
        due
    }

    pub fn is_finished(&self) -> bool {
        self.remaining_ticks == 0
    }
}

/// Clamp a per-tick factor so that `scale * factor` stays in range.
pub fn clamp_factor(scale: f64, factor: f64, config: &ZoomConfig) -> f64 {
    if scale <= 0.0 {
        return 1.0;
    }
    let target = (scale * factor).clamp(config.min_scale, config.max_scale);
    target / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gesture_is_ten_ticks_of_two_and_a_half_percent() {
        let config = ZoomConfig::default();
        assert_eq!(config.ticks(), 10);
        let zoom = SmoothZoom::start(&config, Point::ZERO, 120.0).unwrap();
        assert!((zoom.factor_per_tick - 1.025).abs() < 1e-12);
        let out = SmoothZoom::start(&config, Point::ZERO, -120.0).unwrap();
        assert!((out.factor_per_tick - 0.975).abs() < 1e-12);
        assert!(SmoothZoom::start(&config, Point::ZERO, 0.0).is_none());
    }

    #[test]
    fn elapsed_time_accumulates_into_ticks() {
        let config = ZoomConfig::default();
        let mut zoom = SmoothZoom::start(&config, Point::ZERO, 1.0).unwrap();
        assert_eq!(zoom.advance(4.0), 0);
        assert_eq!(zoom.advance(7.0), 1);
        assert_eq!(zoom.advance(25.0), 2);
        assert_eq!(zoom.advance(1000.0), 7);
        assert!(zoom.is_finished());
        assert_eq!(zoom.advance(10.0), 0);
    }

    #[test]
    fn factor_is_clamped_to_scale_limits() {
        let config = ZoomConfig::default();
        assert!((clamp_factor(99.0, 1.1, &config) * 99.0 - 100.0).abs() < 1e-9);
        assert!((clamp_factor(0.021, 0.5, &config) * 0.021 - 0.02).abs() < 1e-12);
        assert_eq!(clamp_factor(1.0, 1.025, &config), 1.025);
    }
}
