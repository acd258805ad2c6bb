//! Consumes bus frames and keeps the display-mode event flags in step
//! with the most recent mode command.
use winker_core::events::EventGroup;
use winker_core::mode::{maintain_mode_flags, mode_from_frame};

use crate::can;
use crate::Duration;

/// Accept the legacy short frame layout where the mode byte is the
/// last payload byte. Off unless talking to first-generation senders.
const COMPAT_SHORT_FRAMES: bool = false;

const RX_TIMEOUT: Duration = Duration::secs(1);

pub async fn task(events: &EventGroup) {
    // Discard anything that arrived before the consumers were ready
    while can::recv_nonblocking().is_some() {}

    loop {
        let Some(frame) = can::recv_blocking(RX_TIMEOUT).await else {
            continue; // Quiet bus, keep listening
        };
        match mode_from_frame(&frame, COMPAT_SHORT_FRAMES) {
            Some(mode) => {
                defmt::debug!("mode frame {:?} -> {:?}", frame, mode);
                maintain_mode_flags(events, mode);
            }
            None => defmt::trace!("ignoring frame {:?}", frame),
        }
    }
}
