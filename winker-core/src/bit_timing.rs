//! CAN bit-timing synthesis.
//!
//! Derives prescaler and bit-segment widths from the peripheral clock and a
//! target bit rate. Only divisor-exact solutions are accepted so the
//! long-run bit rate never drifts against other nodes on the bus; among
//! those, the candidate whose sample point lands closest to the CiA-typical
//! 87.5% wins.

/// Nominal bit timing for a bxCAN-style controller. The sync segment is
/// always one time quantum and the resync jump width is fixed at one.
#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub struct BitTiming {
    pub prescaler: u16,
    pub seg1: u8,
    pub seg2: u8,
}

/// Target sample point, in permille of the bit period.
pub const SAMPLE_POINT_TARGET_PERMILLE: u32 = 875;

const TQ_MIN: u32 = 8;
const TQ_MAX: u32 = 25;

impl BitTiming {
    /// Time quanta per bit, including the sync segment.
    pub const fn total_tq(&self) -> u32 {
        1 + self.seg1 as u32 + self.seg2 as u32
    }

    /// Sample point position in permille of the bit period.
    pub const fn sample_point_permille(&self) -> u32 {
        let tq = self.total_tq();
        ((1 + self.seg1 as u32) * 1000 + tq / 2) / tq
    }

    /// Pack into the bxCAN BTR register layout (SJW = 1 tq).
    pub const fn btr(&self) -> u32 {
        ((self.seg2 as u32 - 1) << 20)
            | ((self.seg1 as u32 - 1) << 16)
            | (self.prescaler as u32 - 1)
    }
}

/// Search for register values hitting `bitrate_bps` exactly from `clock_hz`.
///
/// Candidates: total quanta 8..=25, seg2 1..=8, seg1 1..=16, prescaler
/// 1..=1024, with `clock_hz` exactly divisible by `bitrate_bps * tq`.
/// Best sample point wins; ties go to the higher quantum count (finer
/// resync granularity). Returns `None` when no exact solution exists, in
/// which case the caller falls back to a fixed conservative timing — a
/// configuration warning, not a fatal error.
pub fn compute_bit_timing(clock_hz: u32, bitrate_bps: u32) -> Option<BitTiming> {
    if clock_hz == 0 || bitrate_bps == 0 {
        return None;
    }

    let mut best: Option<(BitTiming, u32, u32)> = None; // (timing, sp diff, tq)

    for tq in TQ_MIN..=TQ_MAX {
        let divisor = match bitrate_bps.checked_mul(tq) {
            Some(d) => d,
            None => break,
        };
        if clock_hz % divisor != 0 {
            continue;
        }
        let prescaler = clock_hz / divisor;
        if !(1..=1024).contains(&prescaler) {
            continue;
        }

        for seg2 in 1..=8u32 {
            let seg1 = tq - 1 - seg2;
            if !(1..=16).contains(&seg1) {
                continue;
            }
            let candidate = BitTiming {
                prescaler: prescaler as u16,
                seg1: seg1 as u8,
                seg2: seg2 as u8,
            };
            let diff = candidate
                .sample_point_permille()
                .abs_diff(SAMPLE_POINT_TARGET_PERMILLE);
            let better = match best {
                None => true,
                Some((_, best_diff, best_tq)) => {
                    diff < best_diff || (diff == best_diff && tq > best_tq)
                }
            };
            if better {
                best = Some((candidate, diff, tq));
            }
        }
    }

    best.map(|(timing, _, _)| timing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pclk36_500kbps_is_exact() {
        let bt = compute_bit_timing(36_000_000, 500_000).unwrap();
        assert_eq!(
            bt.prescaler as u32 * 500_000 * bt.total_tq(),
            36_000_000,
            "bit rate must divide out exactly"
        );
        // 8 tq with seg1=6/seg2=1 puts the sample point at exactly 87.5%.
        assert_eq!(bt, BitTiming { prescaler: 9, seg1: 6, seg2: 1 });
        assert_eq!(bt.sample_point_permille(), 875);
    }

    #[test]
    fn ties_prefer_more_quanta() {
        // 8 MHz / 125 kbps: both tq=8 (prescaler 8) and tq=16 (prescaler 4)
        // reach 87.5% exactly; the 16-quantum solution must win.
        let bt = compute_bit_timing(8_000_000, 125_000).unwrap();
        assert_eq!(bt, BitTiming { prescaler: 4, seg1: 13, seg2: 2 });
    }

    #[test]
    fn inexact_divisors_are_rejected() {
        // A prime-ish bit rate that no tq in range divides into 10 MHz.
        assert_eq!(compute_bit_timing(10_000_000, 999_983), None);
        assert_eq!(compute_bit_timing(0, 500_000), None);
        assert_eq!(compute_bit_timing(36_000_000, 0), None);
    }

    #[test]
    fn segment_and_prescaler_limits_hold() {
        for (clock, rate) in [
            (36_000_000, 500_000),
            (36_000_000, 250_000),
            (36_000_000, 125_000),
            (48_000_000, 500_000),
            (8_000_000, 125_000),
            (72_000_000, 1_000_000),
        ] {
            if let Some(bt) = compute_bit_timing(clock, rate) {
                assert!((1..=16).contains(&bt.seg1), "{clock}/{rate}: seg1");
                assert!((1..=8).contains(&bt.seg2), "{clock}/{rate}: seg2");
                assert!((1..=1024).contains(&bt.prescaler), "{clock}/{rate}: prescaler");
                assert!((TQ_MIN..=TQ_MAX).contains(&bt.total_tq()));
                assert_eq!(bt.prescaler as u32 * rate * bt.total_tq(), clock);
            }
        }
    }

    #[test]
    fn btr_packs_register_fields() {
        let bt = BitTiming { prescaler: 9, seg1: 6, seg2: 1 };
        // sjw-1=0 | (seg2-1)<<20 | (seg1-1)<<16 | (prescaler-1)
        assert_eq!(bt.btr(), (5 << 16) | 8);

        let bt = BitTiming { prescaler: 4, seg1: 13, seg2: 2 };
        assert_eq!(bt.btr(), (1 << 20) | (12 << 16) | 3);
    }
}
