//! Destinations for received data, result records and buffer dumps.

use crate::buffer::SymbolBuffer;
use crate::config::DumpFormat;
use crate::device::StreamStatus;
use crate::error::{IqLinkError, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Status of both directions of one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatus {
    pub channel: usize,
    pub tx: StreamStatus,
    pub rx: StreamStatus,
}

/// One line of the results file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResultRecord {
    Started {
        scheme: String,
        source_bytes: u64,
        tx_size: usize,
        maximum_buffer_size: usize,
        continuous: bool,
    },
    Paused {
        pause: u32,
        channels: Vec<ChannelStatus>,
    },
    ModulationChanged {
        tx_scheme: String,
        rx_scheme: String,
        tx_size: usize,
    },
    Finished {
        cycles: u64,
        pauses: u32,
        sent_symbols: u64,
        received_symbols: u64,
        received_bytes: u64,
    },
}

/// Pluggable output for a running session.
pub trait SampleSink: Send {
    /// Handle one received frame: raw samples and their demodulated bytes.
    fn handle(&mut self, channel: usize, samples: &[i16], payload: &[u8]) -> Result<()>;

    /// Start fresh destination and results files named after `scheme`.
    fn rotate(&mut self, scheme: &str) -> Result<()>;

    /// Append one record to the results file.
    fn record(&mut self, record: &ResultRecord) -> Result<()>;

    /// Write the filled part of a buffer. Returns where it went, if anywhere.
    fn dump(&mut self, label: &str, buffer: &SymbolBuffer) -> Result<Option<PathBuf>>;

    /// Called at teardown.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

fn file_access(path: &Path, error: impl std::fmt::Display) -> IqLinkError {
    IqLinkError::FileAccess {
        path: path.display().to_string(),
        message: error.to_string(),
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| file_access(path, e))
}

/// Writes results and destination files into one directory.
///
/// Files are named after the TX scheme: `<scheme>_results.jsonl` and
/// `<scheme>_<source>_ch<N>`. Rotating truncates them.
pub struct FileSink {
    dir: PathBuf,
    source_name: String,
    channels: usize,
    dump_format: DumpFormat,
    sample_rate: u32,
    scheme: String,
    results: Option<BufWriter<File>>,
    destinations: Vec<BufWriter<File>>,
}

impl FileSink {
    /// Create the directory if needed and open files for `scheme`.
    pub fn create(
        dir: &Path,
        source_name: &str,
        channels: usize,
        dump_format: DumpFormat,
        scheme: &str,
    ) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| file_access(dir, e))?;
        let mut sink = Self {
            dir: dir.to_path_buf(),
            source_name: source_name.to_string(),
            channels,
            dump_format,
            sample_rate: crate::defaults::SAMPLE_RATE_HZ as u32,
            scheme: String::new(),
            results: None,
            destinations: Vec::new(),
        };
        sink.rotate(scheme)?;
        Ok(sink)
    }

    /// Sample rate stamped into WAV dumps.
    pub fn with_sample_rate(mut self, hz: u32) -> Self {
        self.sample_rate = hz.max(1);
        self
    }

    pub fn results_path(&self) -> PathBuf {
        self.dir.join(format!("{}_results.jsonl", self.scheme))
    }

    pub fn destination_path(&self, channel: usize) -> PathBuf {
        self.dir
            .join(format!("{}_{}_ch{channel}", self.scheme, self.source_name))
    }

    fn dump_path(&self, label: &str) -> PathBuf {
        let extension = match self.dump_format {
            DumpFormat::Text => "txt",
            DumpFormat::Wav => "wav",
        };
        self.dir
            .join(format!("{}_{label}_dump.{extension}", self.scheme))
    }

    fn open_set(&self) -> Result<(BufWriter<File>, Vec<BufWriter<File>>)> {
        let results = create(&self.results_path())?;
        let destinations = (0..self.channels)
            .map(|channel| create(&self.destination_path(channel)))
            .collect::<Result<Vec<_>>>()?;
        Ok((results, destinations))
    }

    fn flush_all(&mut self) -> Result<()> {
        if let Some(results) = self.results.as_mut() {
            results.flush()?;
        }
        for destination in &mut self.destinations {
            destination.flush()?;
        }
        Ok(())
    }
}

impl SampleSink for FileSink {
    fn handle(&mut self, channel: usize, _samples: &[i16], payload: &[u8]) -> Result<()> {
        let path = self.destination_path(channel);
        let destination = self
            .destinations
            .get_mut(channel)
            .ok_or_else(|| file_access(&path, "no destination for this channel"))?;
        destination.write_all(payload)?;
        Ok(())
    }

    fn rotate(&mut self, scheme: &str) -> Result<()> {
        // Flush before truncating, then swap only once the new set is open
        self.flush_all()?;
        let previous = std::mem::replace(&mut self.scheme, scheme.to_string());
        let (results, destinations) = match self.open_set() {
            Ok(set) => set,
            Err(e) => {
                self.scheme = previous;
                return Err(e);
            }
        };
        self.results = Some(results);
        self.destinations = destinations;
        Ok(())
    }

    fn record(&mut self, record: &ResultRecord) -> Result<()> {
        let path = self.results_path();
        let results = self
            .results
            .as_mut()
            .ok_or_else(|| file_access(&path, "results file is closed"))?;
        serde_json::to_writer(&mut *results, record)?;
        results.write_all(b"\n")?;
        results.flush()?;
        Ok(())
    }

    fn dump(&mut self, label: &str, buffer: &SymbolBuffer) -> Result<Option<PathBuf>> {
        let path = self.dump_path(label);
        match self.dump_format {
            DumpFormat::Text => {
                let mut writer = create(&path)?;
                for iq in buffer.iter() {
                    writeln!(writer, "{}, {}", iq.i, iq.q)?;
                }
                writer.flush()?;
            }
            DumpFormat::Wav => {
                let spec = hound::WavSpec {
                    channels: 2,
                    sample_rate: self.sample_rate,
                    bits_per_sample: 16,
                    sample_format: hound::SampleFormat::Int,
                };
                let mut writer =
                    hound::WavWriter::create(&path, spec).map_err(|e| file_access(&path, e))?;
                for &sample in buffer.samples() {
                    writer
                        .write_sample(sample)
                        .map_err(|e| file_access(&path, e))?;
                }
                writer.finalize().map_err(|e| file_access(&path, e))?;
            }
        }
        Ok(Some(path))
    }

    fn finish(&mut self) -> Result<()> {
        self.flush_all()
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Keeps everything in memory. Used by tests and library callers.
#[derive(Debug, Default)]
pub struct CollectorSink {
    /// Demodulated bytes per channel since the last rotation.
    pub payloads: Vec<Vec<u8>>,
    /// Raw frames as `(channel, samples)`.
    pub frames: Vec<(usize, Vec<i16>)>,
    pub records: Vec<ResultRecord>,
    /// Scheme names passed to `rotate`, in order.
    pub rotations: Vec<String>,
    /// Dumps as `(label, interleaved samples)`.
    pub dumps: Vec<(String, Vec<i16>)>,
    pub finished: bool,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payload(&self, channel: usize) -> &[u8] {
        self.payloads.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl SampleSink for CollectorSink {
    fn handle(&mut self, channel: usize, samples: &[i16], payload: &[u8]) -> Result<()> {
        if self.payloads.len() <= channel {
            self.payloads.resize(channel + 1, Vec::new());
        }
        self.payloads[channel].extend_from_slice(payload);
        self.frames.push((channel, samples.to_vec()));
        Ok(())
    }

    fn rotate(&mut self, scheme: &str) -> Result<()> {
        self.payloads.clear();
        self.rotations.push(scheme.to_string());
        Ok(())
    }

    fn record(&mut self, record: &ResultRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn dump(&mut self, label: &str, buffer: &SymbolBuffer) -> Result<Option<PathBuf>> {
        self.dumps
            .push((label.to_string(), buffer.samples().to_vec()));
        Ok(None)
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}
