//! CAN frame value type.
//!
//! Immutable once built by the receive interrupt; carries classic-CAN
//! payloads only. Implements the `embedded_can::Frame` trait so the rest of
//! the firmware can stay controller-agnostic.

use embedded_can::{Frame, Id};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CanFrame {
    id: Id,
    dlc: u8,
    data: [u8; 8],
    remote: bool,
}

impl CanFrame {
    /// Raw identifier bits, 11 or 29 wide depending on the frame format.
    pub fn raw_id(&self) -> u32 {
        match self.id {
            Id::Standard(id) => id.as_raw() as u32,
            Id::Extended(id) => id.as_raw(),
        }
    }
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[..data.len()].copy_from_slice(data);
        Some(Self {
            id: id.into(),
            dlc: data.len() as u8,
            data: buf,
            remote: false,
        })
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > 8 {
            return None;
        }
        Some(Self {
            id: id.into(),
            dlc: dlc as u8,
            data: [0u8; 8],
            remote: true,
        })
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        self.remote
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    fn data(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }
}

impl defmt::Format for CanFrame {
    fn format(&self, fmt: defmt::Formatter) {
        match self.id {
            Id::Standard(id) => defmt::write!(fmt, "CanFrame(id={=u16:#x}", id.as_raw()),
            Id::Extended(id) => defmt::write!(fmt, "CanFrame(xid={=u32:#x}", id.as_raw()),
        }
        if self.remote {
            defmt::write!(fmt, " remote dlc={=u8})", self.dlc);
        } else {
            defmt::write!(fmt, " data={=[u8]:#04x})", self.data());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_can::StandardId;

    #[test]
    fn payload_longer_than_eight_is_rejected() {
        let id = StandardId::new(0x123).unwrap();
        assert!(CanFrame::new(id, &[0u8; 9]).is_none());
        assert!(CanFrame::new_remote(id, 9).is_none());
    }

    #[test]
    fn data_is_truncated_to_dlc() {
        let id = StandardId::new(0x123).unwrap();
        let frame = CanFrame::new(id, &[1, 2, 3]).unwrap();
        assert_eq!(frame.dlc(), 3);
        assert_eq!(frame.data(), &[1, 2, 3]);
        assert!(!frame.is_remote_frame());
        assert!(!frame.is_extended());
        assert_eq!(frame.raw_id(), 0x123);
    }
}
