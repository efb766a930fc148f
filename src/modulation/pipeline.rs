//! Fills a [`SymbolBuffer`] from a seekable byte source.

use super::{SymbolMapper, split_byte};
use crate::buffer::SymbolBuffer;
use crate::error::{IqLinkError, Result};
use std::io::{ErrorKind, Read, Seek, SeekFrom};

/// A byte source the pipeline can rewind for continuous wraparound.
pub trait SourceData: Read + Seek {}

impl<T: Read + Seek + ?Sized> SourceData for T {}

/// Length of a source in bytes. Leaves the cursor at the start.
pub fn source_len(source: &mut dyn SourceData) -> Result<u64> {
    let len = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(0))?;
    Ok(len)
}

const READ_CHUNK: usize = 4096;

/// Result of one fill pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    /// Sample slots written: twice the symbol count.
    pub slots: usize,
    /// One-shot fill stopped at the buffer end before the source ran out.
    pub truncated: bool,
}

impl Fill {
    pub fn symbols(&self) -> usize {
        self.slots / 2
    }
}

/// Drives a [`SymbolMapper`] over source bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModulationPipeline {
    continuous: bool,
}

impl ModulationPipeline {
    pub fn new(continuous: bool) -> Self {
        Self { continuous }
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    /// Modulate up to `tx_size` symbols (bounded by capacity) from the start of `source`.
    ///
    /// In continuous mode the source is rewound at EOF and production carries
    /// on without a gap. Otherwise filling stops at EOF and the short count is
    /// the new effective size. The buffer's `filled` is published to match.
    pub fn fill<M: SymbolMapper + ?Sized>(
        &self,
        mapper: &M,
        source: &mut dyn SourceData,
        buffer: &mut SymbolBuffer,
        tx_size: usize,
    ) -> Result<Fill> {
        let bits = mapper.bits_per_symbol();
        if bits == 0 || bits > 8 {
            return Err(IqLinkError::ModulationConfig {
                bits_per_symbol: bits,
            });
        }
        let mask = mapper.symbol_mask();
        let per_byte = mapper.symbols_per_byte();
        let target = tx_size.min(buffer.capacity());

        source.seek(SeekFrom::Start(0))?;
        let mut chunk = [0u8; READ_CHUNK];
        let mut produced = 0usize;
        let mut read_since_rewind = 0usize;
        let mut truncated = false;

        'fill: while produced < target {
            let n = match source.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if n == 0 {
                if self.continuous && read_since_rewind > 0 {
                    source.seek(SeekFrom::Start(0))?;
                    read_since_rewind = 0;
                    continue;
                }
                break;
            }
            read_since_rewind += n;

            for (pos, &byte) in chunk[..n].iter().enumerate() {
                for (j, symbol) in split_byte(byte, bits, mask).enumerate() {
                    buffer.set(produced, mapper.modulate(symbol));
                    produced += 1;
                    if produced == target {
                        if !self.continuous {
                            let rest_of_byte = j + 1 < per_byte;
                            let rest_of_chunk = pos + 1 < n;
                            truncated = rest_of_byte || rest_of_chunk || has_more(source)?;
                        }
                        break 'fill;
                    }
                }
            }
        }

        buffer.set_filled(produced);
        Ok(Fill {
            slots: produced * 2,
            truncated,
        })
    }
}

fn has_more(source: &mut dyn SourceData) -> Result<bool> {
    let mut next = [0u8; 1];
    loop {
        match source.read(&mut next) {
            Ok(n) => return Ok(n > 0),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPlan;
    use crate::defaults::FULL_SCALE;
    use crate::modulation::{Iq, Modulation, demodulate_bytes};
    use std::io::Cursor;

    /// Mapper with a configurable width, for exercising validation.
    struct WideMapper(u32);

    impl SymbolMapper for WideMapper {
        fn bits_per_symbol(&self) -> u32 {
            self.0
        }
        fn modulate(&self, symbol: u32) -> Iq {
            Iq::new(symbol as i16, 0)
        }
        fn demodulate(&self, sample: Iq) -> u32 {
            sample.i as u32
        }
    }

    #[test]
    fn source_len_rewinds() {
        let mut source = Cursor::new(vec![1u8, 2, 3]);
        source.set_position(2);
        assert_eq!(source_len(&mut source).unwrap(), 3);
        assert_eq!(source.position(), 0);
    }

    #[test]
    fn eight_bytes_bpsk_fills_exactly() {
        let data = b"iqlink!!".to_vec();
        let plan = BufferPlan::new(data.len() as u64, 1, false).unwrap();
        let mut buffer = SymbolBuffer::new(plan.maximum_buffer_size);
        let mut source = Cursor::new(data.clone());

        let fill = ModulationPipeline::new(false)
            .fill(&Modulation::bpsk(), &mut source, &mut buffer, plan.tx_size)
            .unwrap();

        assert_eq!(fill.slots, 128);
        assert_eq!(fill.symbols(), 64);
        assert!(!fill.truncated);
        assert_eq!(buffer.filled(), 64);
        assert_eq!(demodulate_bytes(&Modulation::bpsk(), buffer.samples()), data);
    }

    #[test]
    fn one_shot_stops_early_at_eof() {
        let mut buffer = SymbolBuffer::new(64);
        let mut source = Cursor::new(vec![0xA5u8, 0x0F]);

        let fill = ModulationPipeline::new(false)
            .fill(&Modulation::qpsk(), &mut source, &mut buffer, 64)
            .unwrap();

        assert_eq!(fill.symbols(), 8);
        assert_eq!(buffer.filled(), 8);
        assert!(!fill.truncated);
    }

    #[test]
    fn one_shot_reports_truncation() {
        let mut buffer = SymbolBuffer::new(64);
        let mut source = Cursor::new(vec![0xFFu8; 4]);

        let fill = ModulationPipeline::new(false)
            .fill(&Modulation::bpsk(), &mut source, &mut buffer, 12)
            .unwrap();

        assert_eq!(fill.symbols(), 12);
        assert!(fill.truncated);
    }

    #[test]
    fn one_shot_exact_end_is_not_truncated() {
        let mut buffer = SymbolBuffer::new(16);
        let mut source = Cursor::new(vec![0x00u8, 0xFF]);

        let fill = ModulationPipeline::new(false)
            .fill(&Modulation::bpsk(), &mut source, &mut buffer, 16)
            .unwrap();

        assert_eq!(fill.symbols(), 16);
        assert!(!fill.truncated);
    }

    #[test]
    fn continuous_single_byte_wraps_twice() {
        let bpsk = Modulation::bpsk();
        let mut buffer = SymbolBuffer::new(16);
        let mut source = Cursor::new(vec![0b1100_1010u8]);

        let fill = ModulationPipeline::new(true)
            .fill(&bpsk, &mut source, &mut buffer, 16)
            .unwrap();

        assert_eq!(fill.symbols(), 16);
        let symbols: Vec<u32> = buffer.iter().map(|iq| bpsk.demodulate(iq)).collect();
        let one_pass = vec![1, 1, 0, 0, 1, 0, 1, 0];
        assert_eq!(symbols[..8], one_pass[..]);
        assert_eq!(symbols[8..], one_pass[..]);
    }

    #[test]
    fn continuous_qpsk_single_byte_clamps_to_minimum() {
        let qpsk = Modulation::qpsk();
        let plan = BufferPlan::new(1, 2, true).unwrap();
        let mut buffer = SymbolBuffer::new(plan.maximum_buffer_size);
        let mut source = Cursor::new(vec![0b1110_0100u8]);

        let fill = ModulationPipeline::new(true)
            .fill(&qpsk, &mut source, &mut buffer, plan.tx_size)
            .unwrap();

        assert_eq!(fill.symbols(), 510);
        assert_eq!(buffer.filled(), 510);
        // 510 = 127 full passes of 4 symbols plus 2, so it ends mid-byte
        assert_eq!(buffer.get(508), Some(qpsk.modulate(0b11)));
        assert_eq!(buffer.get(509), Some(qpsk.modulate(0b10)));
        assert_eq!(
            buffer.get(507),
            Some(Iq::new(-FULL_SCALE, -FULL_SCALE))
        );
    }

    #[test]
    fn continuous_never_leaves_buffer_partial() {
        let mut buffer = SymbolBuffer::new(1000);
        let mut source = Cursor::new(b"abc".to_vec());

        let fill = ModulationPipeline::new(true)
            .fill(&Modulation::bpsk(), &mut source, &mut buffer, 1000)
            .unwrap();

        assert_eq!(fill.symbols(), 1000);
    }

    #[test]
    fn empty_source_yields_nothing_even_when_continuous() {
        let mut buffer = SymbolBuffer::new(510);
        let mut source = Cursor::new(Vec::<u8>::new());

        let fill = ModulationPipeline::new(true)
            .fill(&Modulation::bpsk(), &mut source, &mut buffer, 510)
            .unwrap();

        assert_eq!(fill.slots, 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn fill_is_bounded_by_capacity() {
        let mut buffer = SymbolBuffer::new(10);
        let mut source = Cursor::new(vec![0u8; 8]);

        let fill = ModulationPipeline::new(true)
            .fill(&Modulation::bpsk(), &mut source, &mut buffer, 64)
            .unwrap();

        assert_eq!(fill.symbols(), 10);
    }

    #[test]
    fn fill_starts_from_source_beginning() {
        let bpsk = Modulation::bpsk();
        let mut buffer = SymbolBuffer::new(8);
        let mut source = Cursor::new(vec![0xF0u8, 0x00]);
        source.set_position(1);

        ModulationPipeline::new(false)
            .fill(&bpsk, &mut source, &mut buffer, 8)
            .unwrap();

        assert_eq!(demodulate_bytes(&bpsk, buffer.samples()), vec![0xF0]);
    }

    #[test]
    fn wide_symbols_are_rejected() {
        let mut buffer = SymbolBuffer::new(8);
        buffer.set_filled(5);
        let mut source = Cursor::new(vec![1u8]);

        let err = ModulationPipeline::new(false)
            .fill(&WideMapper(9), &mut source, &mut buffer, 8)
            .unwrap_err();

        assert!(matches!(
            err,
            IqLinkError::ModulationConfig { bits_per_symbol: 9 }
        ));
        // Prior buffer content is untouched
        assert_eq!(buffer.filled(), 5);
    }

    #[test]
    fn uneven_width_pads_last_symbol() {
        let mut buffer = SymbolBuffer::new(3);
        let mut source = Cursor::new(vec![0b1011_0001u8]);

        ModulationPipeline::new(false)
            .fill(&WideMapper(3), &mut source, &mut buffer, 3)
            .unwrap();

        let values: Vec<i16> = buffer.iter().map(|iq| iq.i).collect();
        assert_eq!(values, vec![0b101, 0b100, 0b010]);
    }
}
