#![cfg_attr(not(test), no_std)]

//! Hardware-independent core of the winker turn-indicator controller.
//!
//! Everything with decision logic lives here so it can run under `cargo test`
//! on the host: angle decoding for the duty-cycle steering sensor, the
//! steering intent state machine, CAN bit-timing synthesis, the dot-panel
//! mode protocol, and the ISR-to-task handoff primitives (event flag group
//! and single-slot mailbox). The firmware crate binds these to the STM32
//! peripherals and the RTIC tasks.

pub mod angle;
pub mod bit_timing;
pub mod events;
pub mod frame;
pub mod mailbox;
pub mod mode;
pub mod steering;

#[cfg(test)]
pub(crate) mod testing;
