//! CAN transport: bxCAN bring-up, interrupt driven receive into a
//! single-slot mailbox, and best-effort transmit.
//!
//! Receive keeps only the newest frame. The consumer task polls or
//! blocks on [`recv_blocking`]; a frame that sits unread when the next
//! one arrives is overwritten, old data has no value here.
use core::sync::atomic::{AtomicU32, Ordering};

use bxcan::filter::Mask32;
use bxcan::{Fifo, Interrupts, Rx0, Tx};
use defmt::Format;
use embedded_can::Frame as _;
use embedded_can::{ExtendedId, Id, StandardId};
use stm32f1xx_hal::pac;
use winker_core::events::EventFlags;
use winker_core::frame::CanFrame;
use winker_core::mailbox::Mailbox;

use crate::hardware::{Mono, PCAN};
use crate::Duration;
use rtic_monotonics::Monotonic;

static RX_FRAMES: Mailbox<CanFrame> = Mailbox::new();

static RX_COUNT: AtomicU32 = AtomicU32::new(0);
static RX_OVERRUNS: AtomicU32 = AtomicU32::new(0);

/// Apply bit timing, open the filters and hand back the split
/// peripheral. The caller unmasks the RX interrupt in NVIC by binding
/// a handler to it.
pub fn init(
    pcan: PCAN,
    timing: &winker_core::bit_timing::BitTiming,
) -> (Tx<PCAN>, Rx0<PCAN>) {
    let mut can = bxcan::Can::builder(pcan)
        .set_bit_timing(timing.btr())
        .leave_disabled();

    // Hardware filtering is left open, software decides what a frame means
    can.modify_filters()
        .enable_bank(0, Fifo::Fifo0, Mask32::accept_all());

    can.enable_interrupts(Interrupts::FIFO0_MESSAGE_PENDING);

    nb::block!(can.enable_non_blocking()).unwrap(); // Infallible

    let (tx, rx0, _rx1) = can.split();
    (tx, rx0)
}

/// FIFO0 pending interrupt. Drains the hardware FIFO into the mailbox
/// and raises `FRAME_RECEIVED` once per run.
pub fn on_rx_irq(rx: &mut Rx0<PCAN>) {
    let mut received = false;
    loop {
        match rx.receive() {
            Ok(frame) => {
                if let Some(frame) = from_bxcan(&frame) {
                    RX_FRAMES.put(frame);
                    RX_COUNT.fetch_add(1, Ordering::Relaxed);
                    received = true;
                }
            }
            Err(nb::Error::WouldBlock) => break,
            Err(nb::Error::Other(_overrun)) => {
                RX_OVERRUNS.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    if received {
        // Frame is in the mailbox before any waiter can observe the flag
        crate::EVENTS.set(EventFlags::FRAME_RECEIVED);
    }
}

/// Wait for the next frame, up to `timeout`. Returns the newest frame
/// seen since the previous call, or None on timeout.
pub async fn recv_blocking(timeout: Duration) -> Option<CanFrame> {
    Mono::timeout_after(timeout, RX_FRAMES.recv()).await.ok()
}

/// Take the pending frame if there is one, never waits.
pub fn recv_nonblocking() -> Option<CanFrame> {
    RX_FRAMES.try_recv()
}

/// Best-effort transmit. False means every hardware TX mailbox was
/// busy and the frame was dropped.
pub fn send(tx: &mut Tx<PCAN>, frame: &CanFrame) -> bool {
    let frame = to_bxcan(frame);
    match tx.transmit(&frame) {
        Ok(status) => {
            if status.dequeued_frame().is_some() {
                // A lower priority frame got displaced. Everything we
                // send is periodic, so the displaced frame is stale.
                defmt::debug!("TX displaced a queued frame");
            }
            true
        }
        Err(_would_block) => false,
    }
}

/// Error counters and frame statistics for the periodic status report.
#[derive(Clone, Copy, Format)]
pub struct BusHealth {
    pub bus_off: bool,
    pub error_passive: bool,
    pub rx_errors: u8,
    pub tx_errors: u8,
    pub rx_frames: u32,
    pub rx_overruns: u32,
}

pub fn bus_health() -> BusHealth {
    // ESR is read-only status, safe to read outside the bxCAN wrapper
    let esr = unsafe { (*pac::CAN1::ptr()).esr.read() };
    BusHealth {
        bus_off: esr.boff().bit_is_set(),
        error_passive: esr.epvf().bit_is_set(),
        rx_errors: esr.rec().bits(),
        tx_errors: esr.tec().bits(),
        rx_frames: RX_COUNT.load(Ordering::Relaxed),
        rx_overruns: RX_OVERRUNS.load(Ordering::Relaxed),
    }
}

fn from_bxcan(frame: &bxcan::Frame) -> Option<CanFrame> {
    let id = match frame.id() {
        bxcan::Id::Standard(id) => Id::Standard(StandardId::new(id.as_raw())?),
        bxcan::Id::Extended(id) => Id::Extended(ExtendedId::new(id.as_raw())?),
    };
    if frame.is_remote_frame() {
        CanFrame::new_remote(id, frame.dlc() as usize)
    } else {
        CanFrame::new(id, frame.data().map(|d| &d[..]).unwrap_or(&[]))
    }
}

fn to_bxcan(frame: &CanFrame) -> bxcan::Frame {
    let id = match frame.id() {
        // The raw values come out of validated IDs
        Id::Standard(id) => bxcan::Id::Standard(unsafe {
            bxcan::StandardId::new_unchecked(id.as_raw())
        }),
        Id::Extended(id) => bxcan::Id::Extended(unsafe {
            bxcan::ExtendedId::new_unchecked(id.as_raw())
        }),
    };
    if frame.is_remote_frame() {
        bxcan::Frame::new_remote(id, frame.dlc() as u8)
    } else {
        bxcan::Frame::new_data(
            id,
            bxcan::Data::new(frame.data()).unwrap_or_else(bxcan::Data::empty),
        )
    }
}
