//! Duty-cycle angle sensor decoding.
//!
//! The sensor emits a fixed-period PWM signal whose duty cycle encodes the
//! absolute rotational angle. The capture interrupt delivers raw
//! (period, pulse) tick pairs; this module turns them into a bounded
//! relative angle in degrees, auto-zeroed against the steering position
//! seen at power-up.

/// Set when the sensor encodes the angle on the low phase of the signal
/// instead of the high phase. Board-level wiring decision, fixed at build
/// time.
pub const ANGLE_ON_LOW_PHASE: bool = false;

/// One completed capture pair from the timer, in capture-clock ticks.
#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub struct Capture {
    pub period_ticks: u32,
    pub pulse_ticks: u32,
}

/// Normalize an angle difference into `[-180, +180]` degrees.
///
/// The sensor's absolute angle can cross the 0°/360° boundary even though
/// the physical steering travel is far less than a full turn; without this
/// a small movement across the boundary would read as a ±350° jump.
pub fn wrap180(mut degrees: f32) -> f32 {
    while degrees > 180.0 {
        degrees -= 360.0;
    }
    while degrees < -180.0 {
        degrees += 360.0;
    }
    degrees
}

/// Stateful decoder holding the power-up zero reference.
pub struct AngleDecoder {
    zero_degrees: Option<f32>,
}

impl AngleDecoder {
    pub const fn new() -> Self {
        Self { zero_degrees: None }
    }

    /// True once the zero reference has been established.
    pub fn is_zeroed(&self) -> bool {
        self.zero_degrees.is_some()
    }

    /// Decode one capture pair into a relative angle in degrees.
    ///
    /// Returns `None` for physically impossible captures (zero period, zero
    /// pulse, or pulse >= period — capture noise or a stalled sensor), and
    /// for the very first valid capture, which only establishes the zero
    /// reference so a non-centered power-up position cannot fake a turn.
    pub fn decode(&mut self, capture: Capture) -> Option<f32> {
        if capture.period_ticks == 0
            || capture.pulse_ticks == 0
            || capture.pulse_ticks >= capture.period_ticks
        {
            return None;
        }

        let duty = capture.pulse_ticks as f32 / capture.period_ticks as f32;
        let absolute = if ANGLE_ON_LOW_PHASE {
            (1.0 - duty) * 360.0
        } else {
            duty * 360.0
        };

        match self.zero_degrees {
            None => {
                self.zero_degrees = Some(absolute);
                None
            }
            Some(zero) => Some(wrap180(absolute - zero)),
        }
    }
}

impl Default for AngleDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(period: u32, pulse: u32) -> Capture {
        Capture {
            period_ticks: period,
            pulse_ticks: pulse,
        }
    }

    #[test]
    fn rejects_impossible_captures() {
        let mut dec = AngleDecoder::new();
        assert_eq!(dec.decode(capture(0, 100)), None);
        assert_eq!(dec.decode(capture(2000, 0)), None);
        assert_eq!(dec.decode(capture(2000, 2000)), None);
        assert_eq!(dec.decode(capture(2000, 2500)), None);
        // None of the rejects may establish the zero reference.
        assert!(!dec.is_zeroed());
    }

    #[test]
    fn first_valid_sample_only_zeroes() {
        let mut dec = AngleDecoder::new();
        // duty 0.5 => absolute 180°
        assert_eq!(dec.decode(capture(2000, 1000)), None);
        assert!(dec.is_zeroed());

        // Same position afterwards reads as 0° relative.
        let angle = dec.decode(capture(2000, 1000)).unwrap();
        assert!(angle.abs() < 1e-3);
    }

    #[test]
    fn relative_angle_follows_duty() {
        let mut dec = AngleDecoder::new();
        dec.decode(capture(2000, 1000)); // zero at 180°

        // duty 0.75 => absolute 270° => +90° relative
        let angle = dec.decode(capture(2000, 1500)).unwrap();
        assert!((angle - 90.0).abs() < 1e-3);

        // duty 0.25 => absolute 90° => -90° relative
        let angle = dec.decode(capture(2000, 500)).unwrap();
        assert!((angle + 90.0).abs() < 1e-3);
    }

    #[test]
    fn wraps_across_the_zero_boundary() {
        let mut dec = AngleDecoder::new();
        // Zero reference close to full scale: duty ~0.972 => ~350°.
        dec.decode(capture(2000, 1944));

        // Absolute 10° (duty ~0.028): naive subtraction says -340°,
        // physically the sensor moved +20°.
        let angle = dec.decode(capture(2000, 56)).unwrap();
        assert!((angle - 20.16).abs() < 0.1);
    }

    #[test]
    fn wrap180_is_idempotent_and_bounded() {
        for x in [-1000.0_f32, -360.0, -180.0, -179.9, 0.0, 179.9, 180.0, 359.0, 720.5] {
            let once = wrap180(x);
            assert!((-180.0..=180.0).contains(&once), "wrap180({x}) = {once}");
            assert_eq!(wrap180(once), once);
        }
    }
}
