//! Turn lamp outputs. Reacts to the TURN_* event flags and blinks the
//! active side at the legal indicator rate.
use defmt::Format;
use winker_core::events::{EventFlags, EventGroup};

use crate::hardware::{LeftLampOutput, Mono, RightLampOutput};
use crate::Duration;
use rtic_monotonics::Monotonic;

/// Half the flash cycle, ie time lit or time dark.
const BLINK_PERIOD: Duration = Duration::millis(500);

#[derive(Copy, Clone, PartialEq, Eq, Format)]
enum LampSide {
    Off,
    Left,
    Right,
}

pub async fn task(events: &EventGroup, left: &mut LeftLampOutput, right: &mut RightLampOutput) {
    let mut side = LampSide::Off;
    let mut lit = false;

    loop {
        match Mono::timeout_after(
            BLINK_PERIOD,
            events.wait(EventFlags::TURN_MASK, true),
        )
        .await
        {
            Ok(flags) => {
                // TurnBack wins if several flags arrive in one wakeup
                let new_side = if flags.contains(EventFlags::TURN_BACK) {
                    LampSide::Off
                } else if flags.contains(EventFlags::TURN_LEFT) {
                    LampSide::Left
                } else if flags.contains(EventFlags::TURN_RIGHT) {
                    LampSide::Right
                } else {
                    side
                };
                if new_side != side {
                    defmt::info!("lamps {:?}", new_side);
                }
                side = new_side;
                // A fresh indication always starts with the lamp on
                lit = side != LampSide::Off;
            }
            Err(_timeout) => {
                if side != LampSide::Off {
                    lit = !lit;
                }
            }
        }

        match side {
            LampSide::Off => {
                left.set_low();
                right.set_low();
            }
            LampSide::Left => {
                right.set_low();
                if lit {
                    left.set_high()
                } else {
                    left.set_low()
                }
            }
            LampSide::Right => {
                left.set_low();
                if lit {
                    right.set_high()
                } else {
                    right.set_low()
                }
            }
        }
    }
}
