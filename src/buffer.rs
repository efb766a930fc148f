//! Fixed-capacity IQ sample storage and its sizing policy.

use crate::defaults::MIN_CONTINUOUS_SYMBOLS;
use crate::error::{IqLinkError, Result};
use crate::modulation::Iq;

/// Interleaved I/Q samples with a fixed symbol capacity.
///
/// Storage is allocated once. Re-modulation only moves `filled`, so a scheme
/// change never reallocates mid-session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolBuffer {
    samples: Vec<i16>,
    filled: usize,
}

impl SymbolBuffer {
    /// Allocate room for `capacity` symbols, all zero and none filled.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0; capacity * 2],
            filled: 0,
        }
    }

    /// Number of symbol slots.
    pub fn capacity(&self) -> usize {
        self.samples.len() / 2
    }

    /// Number of symbols holding valid data.
    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Publish a new filled count, clamped to capacity. Returns the stored count.
    pub fn set_filled(&mut self, symbols: usize) -> usize {
        self.filled = symbols.min(self.capacity());
        self.filled
    }

    /// Write one symbol. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, iq: Iq) {
        if let Some(slot) = self.samples.get_mut(index * 2..index * 2 + 2) {
            slot[0] = iq.i;
            slot[1] = iq.q;
        }
    }

    /// Read one symbol within capacity.
    pub fn get(&self, index: usize) -> Option<Iq> {
        self.samples
            .get(index * 2..index * 2 + 2)
            .map(|pair| Iq::new(pair[0], pair[1]))
    }

    /// Interleaved samples of the filled region.
    pub fn samples(&self) -> &[i16] {
        &self.samples[..self.filled * 2]
    }

    /// The whole interleaved storage, for receiving into.
    pub fn storage_mut(&mut self) -> &mut [i16] {
        &mut self.samples
    }

    /// Filled symbols in order.
    pub fn iter(&self) -> impl Iterator<Item = Iq> + '_ {
        self.samples()
            .chunks_exact(2)
            .map(|pair| Iq::new(pair[0], pair[1]))
    }
}

/// Buffer sizes derived from the source length and the symbol width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPlan {
    /// Symbols to modulate and send per burst.
    pub tx_size: usize,
    /// Capacity of both buffers: the densest packing (one bit per symbol).
    pub maximum_buffer_size: usize,
}

impl BufferPlan {
    /// Size buffers for `source_len` bytes at `bits_per_symbol`.
    ///
    /// In continuous mode a short burst is raised to
    /// [`MIN_CONTINUOUS_SYMBOLS`] so the TX FIFO is not starved.
    pub fn new(source_len: u64, bits_per_symbol: u32, continuous: bool) -> Result<Self> {
        if bits_per_symbol == 0 || bits_per_symbol > 8 {
            return Err(IqLinkError::ModulationConfig { bits_per_symbol });
        }

        let bits = usize::try_from(source_len.saturating_mul(8)).unwrap_or(usize::MAX);
        let mut tx_size = bits / bits_per_symbol as usize;
        let mut maximum_buffer_size = bits;

        if continuous && tx_size <= MIN_CONTINUOUS_SYMBOLS {
            tx_size = MIN_CONTINUOUS_SYMBOLS;
            maximum_buffer_size = maximum_buffer_size.max(MIN_CONTINUOUS_SYMBOLS);
        }

        Ok(Self {
            tx_size,
            maximum_buffer_size,
        })
    }
}
