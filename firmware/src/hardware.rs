// "Board level" hardware abstractions, ie pin assignments, etc.

use defmt::info;
use stm32f1xx_hal as hal;
use stm32f1xx_hal::can::Can;
use stm32f1xx_hal::gpio::gpiob;
use stm32f1xx_hal::gpio::Alternate;
use stm32f1xx_hal::gpio::Floating;
use stm32f1xx_hal::gpio::Input;
use stm32f1xx_hal::gpio::Output;
use stm32f1xx_hal::gpio::PushPull;
use stm32f1xx_hal::pac;
use stm32f1xx_hal::prelude::*;
use stm32f1xx_hal::spi::{Mode, Phase, Polarity, Spi, Spi2NoRemap};
use winker_core::bit_timing::{compute_bit_timing, BitTiming};

use crate::dot_display::Panel;

// Type aliases for hardware peripherals
pub type PCAN = hal::can::Can<pac::CAN1>;

// Type aliases for I/O pins
pub type LeftLampOutput = gpiob::PB0<Output<PushPull>>;

pub type RightLampOutput = gpiob::PB1<Output<PushPull>>;

pub type PanelCs = gpiob::PB12<Output<PushPull>>;

pub type PanelSpi = Spi<
    pac::SPI2,
    Spi2NoRemap,
    (
        gpiob::PB13<Alternate<PushPull>>,
        gpiob::PB14<Input<Floating>>,
        gpiob::PB15<Alternate<PushPull>>,
    ),
    u8,
>;

/// CAN bus speed shared by every node on the vehicle bus.
pub const CAN_BITRATE_BPS: u32 = 500_000;

/// Conservative 12-quantum timing used only if the exact search fails.
const CAN_TIMING_FALLBACK: BitTiming = BitTiming {
    prescaler: 6,
    seg1: 9,
    seg2: 2,
};

// Struct to encompass all the board resources, as their functions
pub struct Board {
    pub pcan: PCAN,
    pub can_timing: BitTiming,
    pub gonio_timer: pac::TIM3,
    pub left_lamp: LeftLampOutput,
    pub right_lamp: RightLampOutput,
    pub panel: Panel,
}

// Systick Based Timer
pub const MONOTONIC_FREQUENCY: u32 = 1_000;
rtic_monotonics::systick_monotonic!(Mono, 1_000);

// Hardware init function
pub fn init(core: cortex_m::Peripherals, dp: pac::Peripherals) -> Board {
    info!("hardware init");

    let mut flash = dp.FLASH.constrain();
    let rcc = dp.RCC.constrain();

    // 8MHz crystal up to the full 72MHz sysclk; APB1 capped at 36MHz,
    // which also feeds bxCAN. APB1 timers still tick at 72MHz.
    let clocks = rcc
        .cfgr
        .use_hse(8.MHz())
        .sysclk(72.MHz())
        .hclk(72.MHz())
        .pclk1(36.MHz())
        .pclk2(72.MHz())
        .freeze(&mut flash.acr);

    Mono::start(core.SYST, clocks.sysclk().to_Hz());

    let mut afio = dp.AFIO.constrain();
    let mut gpioa = dp.GPIOA.split();
    let mut gpiob = dp.GPIOB.split();

    // CAN on the PB8/PB9 remap, transceiver on the bus header
    let mut pcan = Can::new(dp.CAN1, dp.USB);
    {
        let rx = gpiob.pb8.into_floating_input(&mut gpiob.crh);
        let tx = gpiob.pb9.into_alternate_push_pull(&mut gpiob.crh);
        pcan.assign_pins((tx, rx), &mut afio.mapr);
    }

    let can_timing = match compute_bit_timing(clocks.pclk1().to_Hz(), CAN_BITRATE_BPS) {
        Some(timing) => timing,
        None => {
            // Configuration problem, not fatal: the bus runs with a little
            // less sample-point margin than intended.
            defmt::warn!(
                "no exact CAN bit timing for {}bps at pclk1={}, using fallback",
                CAN_BITRATE_BPS,
                clocks.pclk1().to_Hz()
            );
            CAN_TIMING_FALLBACK
        }
    };
    info!("CAN timing {:?}", can_timing);

    // Angle sensor PWM input on PA6 = TIM3_CH1
    let _gonio_pin = gpioa.pa6.into_floating_input(&mut gpioa.crl);
    gonio_timer_init(&dp.TIM3);

    // Turn lamp drivers, active high
    let mut left_lamp = gpiob.pb0.into_push_pull_output(&mut gpiob.crl);
    let mut right_lamp = gpiob.pb1.into_push_pull_output(&mut gpiob.crl);
    left_lamp.set_low();
    right_lamp.set_low();

    // Dot matrix panel on SPI2, software chip select
    let panel = {
        let mut cs = gpiob.pb12.into_push_pull_output(&mut gpiob.crh);
        cs.set_high();
        let sck = gpiob.pb13.into_alternate_push_pull(&mut gpiob.crh);
        let miso = gpiob.pb14.into_floating_input(&mut gpiob.crh);
        let mosi = gpiob.pb15.into_alternate_push_pull(&mut gpiob.crh);
        let spi = Spi::spi2(
            dp.SPI2,
            (sck, miso, mosi),
            Mode {
                polarity: Polarity::IdleLow,
                phase: Phase::CaptureOnFirstTransition,
            },
            1.MHz(),
            clocks,
        );
        Panel::new(spi, cs)
    };

    Board {
        pcan,
        can_timing,
        gonio_timer: dp.TIM3,
        left_lamp,
        right_lamp,
        panel,
    }
}

/// TIM3 in PWM-input capture mode: CC1 captures the period on rising
/// edges of TI1, CC2 captures the pulse width on falling edges of the
/// same input, and the slave controller resets the counter on every
/// rising edge so one transition pair yields both values.
fn gonio_timer_init(tim: &pac::TIM3) {
    // The timer is driven at register level, no HAL wrapper involved
    unsafe {
        (*pac::RCC::ptr()).apb1enr.modify(|_, w| w.tim3en().set_bit());
    }

    // 1MHz capture tick from the 72MHz timer clock, free-running 16 bit
    tim.psc.write(|w| w.psc().bits(71));
    tim.arr.write(|w| w.arr().bits(0xFFFF));

    // CC1 <- TI1 direct, CC2 <- TI1 indirect
    tim.ccmr1_input()
        .modify(|_, w| unsafe { w.cc1s().bits(0b01).cc2s().bits(0b10) });
    // CC1 rising, CC2 falling, both enabled
    tim.ccer.modify(|_, w| {
        w.cc1p()
            .clear_bit()
            .cc2p()
            .set_bit()
            .cc1e()
            .set_bit()
            .cc2e()
            .set_bit()
    });
    // Slave mode: reset the counter on TI1FP1 rising edges
    tim.smcr
        .modify(|_, w| unsafe { w.ts().bits(0b101).sms().bits(0b100) });

    // One interrupt per completed period; the falling-edge capture is
    // read from CCR2 in the same handler invocation.
    tim.dier.modify(|_, w| w.cc1ie().set_bit());
    tim.cr1.modify(|_, w| w.cen().set_bit());
}
