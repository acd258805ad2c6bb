//! Dot-panel mode protocol.
//!
//! The vehicle bus broadcasts a mode byte at payload offset 2:
//! 0x00 accelerate, 0x01 decelerate, 0x02 stop, 0x03 normal. All other
//! codes are reserved at the vehicle level and dropped here. The decoder
//! maintains the mutually exclusive `MODE_*` event flags against the
//! *currently observed* flag state, not against the previous mode byte: a
//! consumer may auto-clear a flag when acting on it, and a steadily
//! repeated message must be able to re-arm it.

use crate::events::{EventFlags, EventGroup};
use crate::frame::CanFrame;
use embedded_can::Frame as _;

/// Payload offset of the mode byte, fixed by the wire protocol.
pub const MODE_BYTE_OFFSET: usize = 2;

#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum DotMode {
    Accelerate,
    Decelerate,
    Stop,
    Normal,
}

impl DotMode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Accelerate),
            0x01 => Some(Self::Decelerate),
            0x02 => Some(Self::Stop),
            0x03 => Some(Self::Normal),
            _ => None,
        }
    }

    pub const fn byte(self) -> u8 {
        match self {
            Self::Accelerate => 0x00,
            Self::Decelerate => 0x01,
            Self::Stop => 0x02,
            Self::Normal => 0x03,
        }
    }
}

/// Extract the mode from a received frame.
///
/// Remote frames carry no payload and are ignored. Frames too short for
/// the fixed offset are dropped unless `compat_short` is set, in which
/// case the last payload byte is accepted — but only when it is a valid
/// mode code. That fallback matches hand-generated test traffic and is
/// not part of the documented protocol, so it defaults off.
pub fn mode_from_frame(frame: &CanFrame, compat_short: bool) -> Option<DotMode> {
    if frame.is_remote_frame() {
        return None;
    }
    let data = frame.data();
    if data.len() > MODE_BYTE_OFFSET {
        DotMode::from_byte(data[MODE_BYTE_OFFSET])
    } else if compat_short {
        data.last().copied().and_then(DotMode::from_byte)
    } else {
        None
    }
}

/// The flag a mode demands; `Normal` demands none.
pub fn desired_flags(mode: DotMode) -> EventFlags {
    match mode {
        DotMode::Accelerate => EventFlags::MODE_UP,
        DotMode::Decelerate => EventFlags::MODE_DOWN,
        DotMode::Stop => EventFlags::MODE_STOP,
        DotMode::Normal => EventFlags::NONE,
    }
}

/// Reconcile the `MODE_*` flags with an incoming mode.
///
/// Compares desired against observed and rewrites the whole mode group in
/// one atomic step only when they differ. Comparing against the flag state
/// rather than the previous mode byte is what lets a repeated message
/// re-arm a flag after a consumer cleared it.
pub fn maintain_mode_flags(events: &EventGroup, mode: DotMode) {
    let desired = desired_flags(mode);
    let observed = events.get() & EventFlags::MODE_MASK;
    if observed != desired {
        events.replace(EventFlags::MODE_MASK, desired);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_can::StandardId;

    fn frame(data: &[u8]) -> CanFrame {
        CanFrame::new(StandardId::new(0x210).unwrap(), data).unwrap()
    }

    #[test]
    fn mode_byte_at_fixed_offset() {
        assert_eq!(
            mode_from_frame(&frame(&[0xAA, 0xBB, 0x00, 0xCC]), false),
            Some(DotMode::Accelerate)
        );
        assert_eq!(
            mode_from_frame(&frame(&[0, 0, 0x02]), false),
            Some(DotMode::Stop)
        );
        // Reserved codes are dropped.
        assert_eq!(mode_from_frame(&frame(&[0, 0, 0x7F]), false), None);
    }

    #[test]
    fn remote_frames_are_ignored() {
        let remote = CanFrame::new_remote(StandardId::new(0x210).unwrap(), 8).unwrap();
        assert_eq!(mode_from_frame(&remote, true), None);
    }

    #[test]
    fn short_frames_need_the_compat_switch() {
        assert_eq!(mode_from_frame(&frame(&[0x01]), false), None);
        assert_eq!(
            mode_from_frame(&frame(&[0x01]), true),
            Some(DotMode::Decelerate)
        );
        // Compat path still rejects out-of-range bytes and empty payloads.
        assert_eq!(mode_from_frame(&frame(&[0x55]), true), None);
        assert_eq!(mode_from_frame(&frame(&[]), true), None);
    }

    #[test]
    fn normal_clears_a_standing_mode() {
        let events = EventGroup::new();
        events.set(EventFlags::MODE_STOP);

        maintain_mode_flags(&events, DotMode::Normal);

        assert!(!events.get().intersects(EventFlags::MODE_MASK));
    }

    #[test]
    fn repeated_mode_rearms_after_consumer_clear() {
        let events = EventGroup::new();

        maintain_mode_flags(&events, DotMode::Accelerate);
        assert!(events.get().contains(EventFlags::MODE_UP));

        // Consumer acts on the flag and auto-clears it.
        events.clear(EventFlags::MODE_UP);

        // The very same mode byte arrives again: the flag must come back.
        maintain_mode_flags(&events, DotMode::Accelerate);
        assert!(events.get().contains(EventFlags::MODE_UP));
    }

    #[test]
    fn unchanged_mode_does_not_rewrite_flags() {
        let events = EventGroup::new();
        maintain_mode_flags(&events, DotMode::Stop);
        let before = events.get();
        maintain_mode_flags(&events, DotMode::Stop);
        assert_eq!(events.get(), before);
    }
}
