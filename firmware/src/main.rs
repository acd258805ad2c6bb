//! Turn indicator controller firmware.
//!
//! A PWM goniometer on the steering column feeds TIM3, the vehicle bus
//! feeds bxCAN, and a handful of RTIC tasks turn the two into lamp and
//! dot-panel output. Tasks talk through one event flag group and two
//! newest-value mailboxes, nothing else is shared.
#![no_main]
#![no_std]

use defmt_brtt as _; // global logger
use panic_probe as _;

use winker_core::events::EventGroup;

pub mod angle_sensor;
pub mod can;
pub mod diag;
pub mod dot_display;
pub mod hardware;
pub mod lamps;
pub mod mode_rx;

/// Event flag group connecting producers (ISRs, decode tasks) to the
/// lamp and panel consumers.
pub static EVENTS: EventGroup = EventGroup::new();

pub type Duration = fugit::Duration<u32, 1, { hardware::MONOTONIC_FREQUENCY }>;

#[rtic::app(device = stm32f1xx_hal::pac, dispatchers = [EXTI0, EXTI1, EXTI2, EXTI3])]
mod app {
    use stm32f1xx_hal::pac;

    use crate::angle_sensor;
    use crate::can;
    use crate::diag;
    use crate::dot_display;
    use crate::hardware::{self, LeftLampOutput, RightLampOutput, PCAN};
    use crate::lamps;
    use crate::mode_rx;

    #[shared]
    struct Shared {
        can_tx: bxcan::Tx<PCAN>,
    }

    #[local]
    struct Local {
        can_rx: bxcan::Rx0<PCAN>,
        gonio_timer: pac::TIM3,
        left_lamp: LeftLampOutput,
        right_lamp: RightLampOutput,
        panel: dot_display::Panel,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        defmt::info!("winker firmware start");

        let hardware::Board {
            pcan,
            can_timing,
            gonio_timer,
            left_lamp,
            right_lamp,
            panel,
        } = hardware::init(cx.core, cx.device);

        let (can_tx, can_rx) = can::init(pcan, &can_timing);

        task_steering::spawn().unwrap();
        task_mode_rx::spawn().unwrap();
        task_lamps::spawn().unwrap();
        task_dot_panel::spawn().unwrap();
        task_diag::spawn().unwrap();

        (
            Shared { can_tx },
            Local {
                can_rx,
                gonio_timer,
                left_lamp,
                right_lamp,
                panel,
            },
        )
    }

    #[task(binds = TIM3, local = [gonio_timer], priority = 6)]
    fn gonio_capture_irq(cx: gonio_capture_irq::Context) {
        angle_sensor::on_capture_irq(cx.local.gonio_timer);
    }

    #[task(binds = USB_LP_CAN_RX0, local = [can_rx], priority = 6)]
    fn can_rx_irq(cx: can_rx_irq::Context) {
        can::on_rx_irq(cx.local.can_rx);
    }

    #[task(priority = 3)]
    async fn task_steering(_cx: task_steering::Context) {
        angle_sensor::task(&crate::EVENTS).await;
    }

    #[task(priority = 3)]
    async fn task_mode_rx(_cx: task_mode_rx::Context) {
        mode_rx::task(&crate::EVENTS).await;
    }

    #[task(local = [left_lamp, right_lamp], priority = 2)]
    async fn task_lamps(cx: task_lamps::Context) {
        lamps::task(&crate::EVENTS, cx.local.left_lamp, cx.local.right_lamp).await;
    }

    #[task(local = [panel], priority = 2)]
    async fn task_dot_panel(cx: task_dot_panel::Context) {
        dot_display::task(&crate::EVENTS, cx.local.panel).await;
    }

    #[task(shared = [can_tx], priority = 1)]
    async fn task_diag(cx: task_diag::Context) {
        diag::task(&crate::EVENTS, cx.shared.can_tx).await;
    }
}

// same panicking *behavior* as `panic-probe` but doesn't print a panic message
// this prevents the panic message being printed *twice* when `defmt::panic` is invoked
#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}

defmt::timestamp!("{=u32}", {
    use rtic_monotonics::Monotonic;
    crate::hardware::Mono::now().ticks()
});

/// Terminates the application and makes `probe-rs` exit with exit-code = 0
pub fn exit() -> ! {
    loop {
        cortex_m::asm::bkpt();
    }
}
