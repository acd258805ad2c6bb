//! Once a second: log the controller state and broadcast a status
//! frame so the rest of the vehicle can watch this node's health.
use embedded_can::Frame as _;
use embedded_can::StandardId;
use rtic::Mutex;
use winker_core::events::EventGroup;
use winker_core::frame::CanFrame;

use crate::hardware::{self, Mono};
use crate::Duration;
use crate::{angle_sensor, can};
use rtic_monotonics::Monotonic;

const REPORT_PERIOD: Duration = Duration::secs(1);

/// Status broadcast ID, in the infotainment block of the bus map.
const STATUS_ID: u16 = 0x310;

pub async fn task<M>(events: &EventGroup, mut can_tx: M)
where
    M: Mutex<T = bxcan::Tx<hardware::PCAN>>,
{
    let mut seq: u8 = 0;
    let mut next = Mono::now() + REPORT_PERIOD;
    loop {
        Mono::delay_until(next).await;
        next += REPORT_PERIOD;

        let health = can::bus_health();
        let flags = events.get();
        defmt::info!(
            "status: flags {:?} steer {=u8} overcap {=u32} {:?}",
            flags,
            angle_sensor::steering_code(),
            angle_sensor::overcapture_count(),
            health
        );
        if health.bus_off {
            defmt::warn!("CAN bus off, waiting for recovery");
        }

        let frame = status_frame(seq, flags.bits(), &health);
        seq = seq.wrapping_add(1);
        let sent = can_tx.lock(|tx| can::send(tx, &frame));
        if !sent {
            defmt::warn!("status frame dropped, no free TX mailbox");
        }
    }
}

fn status_frame(seq: u8, flags: u32, health: &can::BusHealth) -> CanFrame {
    let payload = [
        seq,
        angle_sensor::steering_code(),
        (flags & 0xFF) as u8,
        (flags >> 8) as u8,
        health.rx_errors,
        health.tx_errors,
    ];
    // Unwraps are static: valid 11-bit ID, 6 byte payload
    CanFrame::new(StandardId::new(STATUS_ID).unwrap(), &payload).unwrap()
}
