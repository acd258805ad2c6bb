//! 8x8 dot matrix panel behind a MAX7219 driver on SPI2. Shows the
//! current display mode as a full-panel symbol.
use defmt::Format;
use stm32f1xx_hal::prelude::*;
use stm32f1xx_hal::spi;
use winker_core::events::{EventFlags, EventGroup};

use crate::hardware::{Mono, PanelCs, PanelSpi};
use crate::Duration;
use rtic_monotonics::Monotonic;

/// Quarter turns applied to every symbol, set for how the panel is
/// mounted in the dash pod.
const MOUNT_ROTATIONS: u32 = 1;

/// Periodic redraw interval. Also the blink half-period of the stop
/// symbol, and how quickly the panel recovers from a power glitch.
const REFRESH_PERIOD: Duration = Duration::millis(500);

/// Refresh periods without a mode wakeup before the symbol is taken
/// down. Senders repeat their mode at least once a second.
const STALE_PERIODS_TO_BLANK: u32 = 4;

// MAX7219 register map
const REG_DECODE_MODE: u8 = 0x09;
const REG_INTENSITY: u8 = 0x0A;
const REG_SCAN_LIMIT: u8 = 0x0B;
const REG_SHUTDOWN: u8 = 0x0C;
const REG_DISPLAY_TEST: u8 = 0x0F;

const BLANK: [u8; 8] = [0; 8];

const ARROW_UP: [u8; 8] = [
    0b00011000,
    0b00111100,
    0b01111110,
    0b11011011,
    0b00011000,
    0b00011000,
    0b00011000,
    0b00011000,
];

const CROSS: [u8; 8] = [
    0b10000001,
    0b01000010,
    0b00100100,
    0b00011000,
    0b00011000,
    0b00100100,
    0b01000010,
    0b10000001,
];

pub struct Panel {
    spi: PanelSpi,
    cs: PanelCs,
}

impl Panel {
    pub fn new(spi: PanelSpi, cs: PanelCs) -> Self {
        Panel { spi, cs }
    }

    /// Take the driver out of shutdown and into raw 8-row mode.
    pub fn power_on(&mut self) -> Result<(), spi::Error> {
        self.write_register(REG_DISPLAY_TEST, 0x00)?;
        self.write_register(REG_DECODE_MODE, 0x00)?;
        self.write_register(REG_INTENSITY, 0x0F)?;
        self.write_register(REG_SCAN_LIMIT, 0x07)?;
        self.write_register(REG_SHUTDOWN, 0x01)
    }

    pub fn draw(&mut self, rows: &[u8; 8]) -> Result<(), spi::Error> {
        for (i, row) in rows.iter().enumerate() {
            // Digit registers are 1-based
            self.write_register(i as u8 + 1, *row)?;
        }
        Ok(())
    }

    fn write_register(&mut self, addr: u8, data: u8) -> Result<(), spi::Error> {
        self.cs.set_low();
        let result = self.spi.write(&[addr, data]);
        self.cs.set_high();
        result
    }
}

/// Rotate a symbol a quarter turn clockwise. Bit 7 of each row is the
/// leftmost column.
fn rotate_cw(src: &[u8; 8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    for (row, out_row) in out.iter_mut().enumerate() {
        for col in 0..8 {
            if src[7 - col] & (0x80 >> row) != 0 {
                *out_row |= 0x80 >> col;
            }
        }
    }
    out
}

fn rotated(src: &[u8; 8], quarter_turns: u32) -> [u8; 8] {
    let mut out = *src;
    for _ in 0..quarter_turns % 4 {
        out = rotate_cw(&out);
    }
    out
}

#[derive(Copy, Clone, PartialEq, Eq, Format)]
enum View {
    Blank,
    Up,
    Down,
    Stop,
}

pub async fn task(events: &EventGroup, panel: &mut Panel) {
    let up = rotated(&ARROW_UP, MOUNT_ROTATIONS);
    let down = rotated(&ARROW_UP, MOUNT_ROTATIONS + 2);
    let stop = rotated(&CROSS, MOUNT_ROTATIONS);

    if panel.power_on().is_err() {
        defmt::warn!("panel init failed");
    }

    let mut view = View::Blank;
    let mut blink_dark = false;
    let mut stale_periods: u32 = 0;

    loop {
        match Mono::timeout_after(
            REFRESH_PERIOD,
            events.wait(EventFlags::MODE_MASK, true),
        )
        .await
        {
            Ok(flags) => {
                // Stop wins if several flags arrive in one wakeup
                let new_view = if flags.contains(EventFlags::MODE_STOP) {
                    View::Stop
                } else if flags.contains(EventFlags::MODE_UP) {
                    View::Up
                } else if flags.contains(EventFlags::MODE_DOWN) {
                    View::Down
                } else {
                    View::Blank
                };
                if new_view != view {
                    defmt::info!("panel {:?}", new_view);
                }
                view = new_view;
                blink_dark = false;
                stale_periods = 0;
            }
            Err(_timeout) => {
                // Mode frames re-arm the flags while a mode holds, so
                // a stretch of silence means the sender went back to
                // normal (or away) and the symbol comes down.
                stale_periods += 1;
                if stale_periods >= STALE_PERIODS_TO_BLANK && view != View::Blank {
                    defmt::info!("panel symbol stale, blanking");
                    view = View::Blank;
                }
                // The stop symbol flashes, everything else is steady
                blink_dark = view == View::Stop && !blink_dark;
            }
        }

        let rows = match view {
            View::Blank => &BLANK,
            View::Up => &up,
            View::Down => &down,
            View::Stop if blink_dark => &BLANK,
            View::Stop => &stop,
        };
        if panel.draw(rows).is_err() {
            defmt::warn!("panel SPI write failed");
        }
    }
}
