//! Steering intent state machine.
//!
//! Consumes relative angle samples at a fixed cadence and debounces them
//! into turn/return transitions. Left and right are only reachable from
//! Center: a noisy swing from one extreme to the other cannot flash the
//! opposite indicator without first passing a debounced return to center.

/// Consecutive qualifying samples required before a transition is accepted.
/// 500 ms of agreement at the 20 ms sampling cadence.
pub const DEBOUNCE_SAMPLES: u16 = 25;

/// A turn is engaged once the angle passes this magnitude, in degrees.
pub const ENGAGE_DEG: f32 = 90.0;

/// Return-to-center band, in degrees.
pub const RELEASE_DEG: f32 = 30.0;

#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum SteeringState {
    Center,
    Left,
    Right,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum SteeringEvent {
    TurnLeft,
    TurnRight,
    TurnBack,
}

pub struct IntentFsm {
    state: SteeringState,
    left_run: u16,
    right_run: u16,
    center_run: u16,
}

impl IntentFsm {
    pub const fn new() -> Self {
        Self {
            state: SteeringState::Center,
            left_run: 0,
            right_run: 0,
            center_run: 0,
        }
    }

    pub fn state(&self) -> SteeringState {
        self.state
    }

    fn reset_runs(&mut self) {
        self.left_run = 0;
        self.right_run = 0;
        self.center_run = 0;
    }

    /// Feed one sample; `None` means "no valid capture this period".
    ///
    /// Invalid samples pause debouncing (all run counters reset) rather
    /// than counting for or against a transition, so a stalled sensor
    /// cannot force a state change by itself.
    pub fn step(&mut self, sample: Option<f32>) -> Option<SteeringEvent> {
        let Some(angle) = sample else {
            self.reset_runs();
            return None;
        };

        match self.state {
            SteeringState::Center => {
                if angle >= ENGAGE_DEG {
                    self.right_run = 0;
                    self.left_run += 1;
                    if self.left_run >= DEBOUNCE_SAMPLES {
                        self.state = SteeringState::Left;
                        self.reset_runs();
                        return Some(SteeringEvent::TurnLeft);
                    }
                } else if angle <= -ENGAGE_DEG {
                    self.left_run = 0;
                    self.right_run += 1;
                    if self.right_run >= DEBOUNCE_SAMPLES {
                        self.state = SteeringState::Right;
                        self.reset_runs();
                        return Some(SteeringEvent::TurnRight);
                    }
                } else {
                    self.left_run = 0;
                    self.right_run = 0;
                }
            }
            SteeringState::Left | SteeringState::Right => {
                // Only the return to center is checked here; the opposite
                // direction is unreachable until center has been re-armed.
                if (-RELEASE_DEG..=RELEASE_DEG).contains(&angle) {
                    self.center_run += 1;
                    if self.center_run >= DEBOUNCE_SAMPLES {
                        self.state = SteeringState::Center;
                        self.reset_runs();
                        return Some(SteeringEvent::TurnBack);
                    }
                } else {
                    self.center_run = 0;
                }
            }
        }
        None
    }
}

impl Default for IntentFsm {
    fn default() -> Self {
        Self::new()
    }
}
