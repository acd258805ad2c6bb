//! Goniometer input: the capture ISR publishes raw PWM timings, the
//! steering task decodes them on a fixed cadence and runs the intent
//! state machine.
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use stm32f1xx_hal::pac;
use winker_core::angle::{AngleDecoder, Capture};
use winker_core::events::{EventFlags, EventGroup};
use winker_core::mailbox::Mailbox;
use winker_core::steering::{IntentFsm, SteeringEvent, SteeringState};

use crate::hardware::Mono;
use crate::Duration;
use rtic_monotonics::Monotonic;

/// Sample cadence of the steering task. With the debounce depth in
/// [`winker_core::steering`] this makes intent changes take half a
/// second of agreeing samples.
const SAMPLE_PERIOD: Duration = Duration::millis(20);

static CAPTURES: Mailbox<Capture> = Mailbox::new();

static OVERCAPTURES: AtomicU32 = AtomicU32::new(0);

static STEER_STATE: AtomicU8 = AtomicU8::new(0);

/// TIM3 capture interrupt. CCR1 holds the full period, CCR2 the high
/// pulse width, both in 1us ticks. Reading CCR1 also clears CC1IF.
pub fn on_capture_irq(tim: &pac::TIM3) {
    let sr = tim.sr.read();
    if sr.cc1if().bit_is_set() {
        let period = tim.ccr1.read().bits() & 0xFFFF;
        let pulse = tim.ccr2.read().bits() & 0xFFFF;
        CAPTURES.put(Capture {
            period_ticks: period,
            pulse_ticks: pulse,
        });
    }
    if sr.cc1of().bit_is_set() || sr.cc2of().bit_is_set() {
        // Captures were missed. The mailbox only keeps the newest
        // sample anyway, so just count it.
        OVERCAPTURES.fetch_add(1, Ordering::Relaxed);
        tim.sr.modify(|_, w| w.cc1of().clear_bit().cc2of().clear_bit());
    }
}

/// Steering state for the status report, encoded as 0/1/2.
pub fn steering_code() -> u8 {
    STEER_STATE.load(Ordering::Relaxed)
}

pub fn overcapture_count() -> u32 {
    OVERCAPTURES.load(Ordering::Relaxed)
}

pub async fn task(events: &EventGroup) {
    let mut decoder = AngleDecoder::new();
    let mut fsm = IntentFsm::new();
    let mut zero_logged = false;

    let mut next = Mono::now() + SAMPLE_PERIOD;
    loop {
        Mono::delay_until(next).await;
        next += SAMPLE_PERIOD;

        // A stale capture decodes the same as a fresh one; if the
        // sensor stops pulsing entirely the mailbox stays empty and
        // the FSM sees invalid samples.
        let angle = CAPTURES.try_recv().and_then(|c| decoder.decode(c));

        if !zero_logged && decoder.is_zeroed() {
            zero_logged = true;
            defmt::info!("steering zero established");
        }

        if let Some(event) = fsm.step(angle) {
            STEER_STATE.store(state_code(fsm.state()), Ordering::Relaxed);
            defmt::info!("steering {:?} -> {:?}", event, fsm.state());
            events.set(match event {
                SteeringEvent::TurnLeft => EventFlags::TURN_LEFT,
                SteeringEvent::TurnRight => EventFlags::TURN_RIGHT,
                SteeringEvent::TurnBack => EventFlags::TURN_BACK,
            });
        }
    }
}

fn state_code(state: SteeringState) -> u8 {
    match state {
        SteeringState::Center => 0,
        SteeringState::Left => 1,
        SteeringState::Right => 2,
    }
}
