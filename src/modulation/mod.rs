//! Bit-to-symbol mapping for the supported modulation schemes.
//!
//! Schemes are a closed set dispatched through [`SymbolMapper`]. Modulation is
//! saturated: every constellation point sits at [`FULL_SCALE`] on each axis it
//! uses, with no pulse shaping.

pub mod pipeline;

use crate::defaults::FULL_SCALE;
use crate::error::IqLinkError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// One complex baseband sample (in-phase, quadrature).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Iq {
    pub i: i16,
    pub q: i16,
}

impl Iq {
    pub const fn new(i: i16, q: i16) -> Self {
        Self { i, q }
    }
}

/// Maps groups of bits to constellation points and back.
pub trait SymbolMapper {
    /// Bits carried by one symbol.
    fn bits_per_symbol(&self) -> u32;

    /// Map the low `bits_per_symbol` bits of `symbol` to a constellation point.
    fn modulate(&self, symbol: u32) -> Iq;

    /// Map a received sample back to a symbol value.
    fn demodulate(&self, sample: Iq) -> u32;

    /// Mask selecting the bits consumed per symbol.
    fn symbol_mask(&self) -> u32 {
        1u32.checked_shl(self.bits_per_symbol())
            .map_or(u32::MAX, |v| v - 1)
    }

    /// Symbols needed to carry one source byte.
    fn symbols_per_byte(&self) -> usize {
        let bits = self.bits_per_symbol().max(1) as usize;
        8usize.div_ceil(bits)
    }
}

/// Supported modulation schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    /// Binary phase shift keying, one bit per symbol on the I axis.
    ///
    /// `phase_inverted` swaps the decision of the sign test. Nothing in the
    /// session toggles it; it exists for receivers locked 180° out of phase.
    Bpsk { phase_inverted: bool },
    /// Quadrature phase shift keying, two bits per symbol on the four corners.
    ///
    /// Demodulation is not implemented and always yields 0.
    Qpsk,
}

impl Modulation {
    /// Numeric identifier used by the pause console.
    pub const BPSK_ID: i64 = 1;
    pub const QPSK_ID: i64 = 2;

    pub const fn bpsk() -> Self {
        Modulation::Bpsk {
            phase_inverted: false,
        }
    }

    pub const fn qpsk() -> Self {
        Modulation::Qpsk
    }

    /// Look up a scheme by its console identifier.
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            Self::BPSK_ID => Some(Self::bpsk()),
            Self::QPSK_ID => Some(Self::qpsk()),
            _ => None,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Modulation::Bpsk { .. } => Self::BPSK_ID,
            Modulation::Qpsk => Self::QPSK_ID,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Modulation::Bpsk { .. } => "bpsk",
            Modulation::Qpsk => "qpsk",
        }
    }
}

impl Default for Modulation {
    fn default() -> Self {
        Self::bpsk()
    }
}

impl fmt::Display for Modulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Modulation {
    type Err = IqLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bpsk" | "1" => Ok(Self::bpsk()),
            "qpsk" | "2" => Ok(Self::qpsk()),
            other => Err(IqLinkError::UnknownModulation {
                name: other.to_string(),
            }),
        }
    }
}

impl SymbolMapper for Modulation {
    fn bits_per_symbol(&self) -> u32 {
        match self {
            Modulation::Bpsk { .. } => 1,
            Modulation::Qpsk => 2,
        }
    }

    fn modulate(&self, symbol: u32) -> Iq {
        match self {
            Modulation::Bpsk { .. } => {
                if symbol & 0b1 != 0 {
                    Iq::new(FULL_SCALE, 0)
                } else {
                    Iq::new(-FULL_SCALE, 0)
                }
            }
            // bit1 picks the I sign, bit0 the Q sign
            Modulation::Qpsk => match symbol & 0b11 {
                0b11 => Iq::new(FULL_SCALE, FULL_SCALE),
                0b10 => Iq::new(FULL_SCALE, -FULL_SCALE),
                0b01 => Iq::new(-FULL_SCALE, FULL_SCALE),
                _ => Iq::new(-FULL_SCALE, -FULL_SCALE),
            },
        }
    }

    fn demodulate(&self, sample: Iq) -> u32 {
        match self {
            Modulation::Bpsk { phase_inverted } => {
                let positive = sample.i > 0;
                u32::from(positive != *phase_inverted)
            }
            Modulation::Qpsk => 0,
        }
    }
}

/// Split one byte into symbol values, most significant bits first.
///
/// When the symbol width does not divide 8, the last symbol carries the
/// remaining low bits left-aligned and zero padded.
pub fn split_byte(byte: u8, bits_per_symbol: u32, mask: u32) -> impl Iterator<Item = u32> {
    let bits = bits_per_symbol.max(1);
    let count = 8u32.div_ceil(bits);
    let byte = u32::from(byte);
    (0..count).map(move |j| {
        let used = bits * (j + 1);
        match 8u32.checked_sub(used) {
            Some(shift) => (byte >> shift) & mask,
            None => (byte << (used - 8)) & mask,
        }
    })
}

/// Demodulate interleaved I/Q samples into bytes.
///
/// Consecutive groups of `symbols_per_byte` symbols form one byte, most
/// significant bits first. A trailing partial group is dropped.
pub fn demodulate_bytes<M: SymbolMapper + ?Sized>(mapper: &M, samples: &[i16]) -> Vec<u8> {
    let bits = mapper.bits_per_symbol().max(1);
    let per_byte = mapper.symbols_per_byte();
    let excess = bits as usize * per_byte - 8;
    let symbols: Vec<u32> = samples
        .chunks_exact(2)
        .map(|pair| mapper.demodulate(Iq::new(pair[0], pair[1])))
        .collect();

    symbols
        .chunks_exact(per_byte)
        .map(|group| {
            let packed = group
                .iter()
                .fold(0u32, |acc, &symbol| (acc << bits) | symbol);
            (packed >> excess) as u8
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bpsk_maps_bits_to_opposite_i() {
        let bpsk = Modulation::bpsk();
        assert_eq!(bpsk.modulate(1), Iq::new(FULL_SCALE, 0));
        assert_eq!(bpsk.modulate(0), Iq::new(-FULL_SCALE, 0));
    }

    #[test]
    fn bpsk_demodulates_by_sign_of_i() {
        let bpsk = Modulation::bpsk();
        assert_eq!(bpsk.demodulate(Iq::new(1, 0)), 1);
        assert_eq!(bpsk.demodulate(Iq::new(-1, 0)), 0);
        assert_eq!(bpsk.demodulate(Iq::new(0, 500)), 0);
    }

    #[test]
    fn bpsk_phase_inversion_swaps_decision() {
        let inverted = Modulation::Bpsk {
            phase_inverted: true,
        };
        assert_eq!(inverted.demodulate(Iq::new(1, 0)), 0);
        assert_eq!(inverted.demodulate(Iq::new(-1, 0)), 1);
    }

    #[test]
    fn qpsk_quadrant_table() {
        let qpsk = Modulation::qpsk();
        assert_eq!(qpsk.modulate(0b11), Iq::new(FULL_SCALE, FULL_SCALE));
        assert_eq!(qpsk.modulate(0b10), Iq::new(FULL_SCALE, -FULL_SCALE));
        assert_eq!(qpsk.modulate(0b01), Iq::new(-FULL_SCALE, FULL_SCALE));
        assert_eq!(qpsk.modulate(0b00), Iq::new(-FULL_SCALE, -FULL_SCALE));
    }

    #[test]
    fn qpsk_demodulation_returns_sentinel() {
        let qpsk = Modulation::qpsk();
        for symbol in 0..4 {
            assert_eq!(qpsk.demodulate(qpsk.modulate(symbol)), 0);
        }
    }

    #[test]
    fn masks_and_symbols_per_byte() {
        assert_eq!(Modulation::bpsk().symbol_mask(), 0b1);
        assert_eq!(Modulation::qpsk().symbol_mask(), 0b11);
        assert_eq!(Modulation::bpsk().symbols_per_byte(), 8);
        assert_eq!(Modulation::qpsk().symbols_per_byte(), 4);
    }

    #[test]
    fn split_byte_msb_first() {
        let bits: Vec<u32> = split_byte(0b1011_0001, 1, 0b1).collect();
        assert_eq!(bits, vec![1, 0, 1, 1, 0, 0, 0, 1]);

        let pairs: Vec<u32> = split_byte(0b1110_0100, 2, 0b11).collect();
        assert_eq!(pairs, vec![0b11, 0b10, 0b01, 0b00]);
    }

    #[test]
    fn split_byte_pads_uneven_widths() {
        // 3 bits per symbol: 101|100|01 -> last symbol is 01 followed by a zero
        let triples: Vec<u32> = split_byte(0b1011_0001, 3, 0b111).collect();
        assert_eq!(triples, vec![0b101, 0b100, 0b010]);
    }

    #[test]
    fn split_byte_wide_symbols() {
        // 5 bits: 10110|001 -> 001 left-aligned as 00100
        let wide: Vec<u32> = split_byte(0b1011_0001, 5, 0b1_1111).collect();
        assert_eq!(wide, vec![0b10110, 0b00100]);

        let whole: Vec<u32> = split_byte(0b1011_0001, 8, 0xff).collect();
        assert_eq!(whole, vec![0b1011_0001]);
    }

    #[test]
    fn bpsk_round_trip_recovers_bytes() {
        let bpsk = Modulation::bpsk();
        let source = b"Hello, IQ!";
        let mut samples = Vec::new();
        for &byte in source {
            for symbol in split_byte(byte, 1, bpsk.symbol_mask()) {
                let point = bpsk.modulate(symbol);
                samples.push(point.i);
                samples.push(point.q);
            }
        }
        assert_eq!(demodulate_bytes(&bpsk, &samples), source.to_vec());
    }

    #[test]
    fn qpsk_byte_demodulation_is_zero() {
        let qpsk = Modulation::qpsk();
        let samples = vec![FULL_SCALE; 16];
        assert_eq!(demodulate_bytes(&qpsk, &samples), vec![0, 0]);
    }

    #[test]
    fn demodulate_bytes_drops_partial_group() {
        let bpsk = Modulation::bpsk();
        // 10 symbols: one full byte plus two leftovers
        let samples = vec![FULL_SCALE, 0].repeat(10);
        assert_eq!(demodulate_bytes(&bpsk, &samples), vec![0xFF]);
    }

    #[test]
    fn ids_and_names() {
        assert_eq!(Modulation::from_id(1), Some(Modulation::bpsk()));
        assert_eq!(Modulation::from_id(2), Some(Modulation::qpsk()));
        assert_eq!(Modulation::from_id(7), None);
        assert_eq!(Modulation::qpsk().id(), 2);
        assert_eq!(Modulation::bpsk().to_string(), "bpsk");
    }

    #[test]
    fn parse_from_name() {
        assert_eq!("QPSK".parse::<Modulation>().unwrap(), Modulation::qpsk());
        assert_eq!(" bpsk ".parse::<Modulation>().unwrap(), Modulation::bpsk());
        assert!("8psk".parse::<Modulation>().is_err());
    }
}
