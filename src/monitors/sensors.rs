//! Sensor sources, calibration and per-channel state

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::trace;

use crate::{SensorSnapshot, config::SourceConfig, monitors::debounce::LeakDebouncer};

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("channel {0} is not wired to this source")]
    UnknownChannel(u32),

    #[error("failed to read channel {channel}: {source}")]
    Io {
        channel: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("channel {channel} produced an unreadable value {raw:?}")]
    Parse { channel: u32, raw: String },
}

/// Something that produces one raw reading per channel
#[async_trait]
pub trait SensorSource: Send + Sync {
    async fn read(&mut self, channel: u32) -> Result<f32, SensorError>;
}

/// A simulated leak: after `after_reads` reads of `channel`, add `offset` to every reading
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct SimulatedLeak {
    pub channel: u32,
    pub after_reads: u64,
    pub offset: f32,
}

/// Noisy readings around a fixed resting value, optionally with an injected leak
pub struct SimulatedSource {
    rng: StdRng,
    resting: f32,
    noise: f32,
    leak: Option<SimulatedLeak>,
    reads: HashMap<u32, u64>,
}

impl SimulatedSource {
    pub fn new(seed: u64, resting: f32, noise: f32, leak: Option<SimulatedLeak>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            resting,
            noise: noise.abs(),
            leak,
            reads: HashMap::new(),
        }
    }
}

#[async_trait]
impl SensorSource for SimulatedSource {
    async fn read(&mut self, channel: u32) -> Result<f32, SensorError> {
        let count = self.reads.entry(channel).or_default();
        *count += 1;

        let jitter = self.rng.random_range(-self.noise..=self.noise);
        let mut value = self.resting + jitter;

        if let Some(leak) = self.leak
            && leak.channel == channel
            && *count > leak.after_reads
        {
            value += leak.offset;
        }

        Ok(value)
    }
}

/// Reads one number per channel from a file (e.g. an ADC export under sysfs)
pub struct FileSource {
    paths: HashMap<u32, PathBuf>,
}

impl FileSource {
    pub fn new(paths: HashMap<u32, PathBuf>) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl SensorSource for FileSource {
    async fn read(&mut self, channel: u32) -> Result<f32, SensorError> {
        let path = self
            .paths
            .get(&channel)
            .ok_or(SensorError::UnknownChannel(channel))?;

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SensorError::Io { channel, source })?;

        raw.trim()
            .parse::<f32>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| SensorError::Parse {
                channel,
                raw: raw.trim().to_string(),
            })
    }
}

/// Build the configured source
pub fn source_from_config(config: &SourceConfig) -> anyhow::Result<Box<dyn SensorSource>> {
    let source: Box<dyn SensorSource> = match config {
        SourceConfig::Simulated {
            seed,
            resting,
            noise,
            leak,
        } => Box::new(SimulatedSource::new(*seed, *resting, *noise, *leak)),
        SourceConfig::File { .. } => Box::new(FileSource::new(config.file_paths()?)),
    };
    Ok(source)
}

/// Collects no-leak samples until every channel has enough to average
#[derive(Debug, Clone)]
pub struct Calibration {
    target: usize,
    samples: HashMap<u32, Vec<f32>>,
}

impl Calibration {
    pub fn new(channels: impl IntoIterator<Item = u32>, samples_per_channel: usize) -> Self {
        Self {
            target: samples_per_channel.max(1),
            samples: channels.into_iter().map(|id| (id, Vec::new())).collect(),
        }
    }

    /// Non-finite values are dropped and do not count towards the target
    pub fn record(&mut self, channel: u32, value: f32) {
        if value.is_finite()
            && let Some(samples) = self.samples.get_mut(&channel)
            && samples.len() < self.target
        {
            samples.push(value);
        }
    }

    /// Samples still missing across all channels
    pub fn remaining(&self) -> usize {
        self.samples
            .values()
            .map(|samples| self.target - samples.len())
            .sum()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Arithmetic mean per channel, once every channel is complete
    pub fn baselines(&self) -> Option<HashMap<u32, f32>> {
        if !self.is_complete() {
            return None;
        }

        Some(
            self.samples
                .iter()
                .map(|(id, samples)| (*id, samples.iter().sum::<f32>() / samples.len() as f32))
                .collect(),
        )
    }
}

/// One physical sensor on the device
#[derive(Debug, Clone)]
pub struct SensorChannel {
    pub id: u32,
    pub label: String,
    pub baseline: Option<f32>,
    pub raw: Option<f32>,
    pub debouncer: LeakDebouncer,
}

impl SensorChannel {
    pub fn new(id: u32, label: impl Into<String>, threshold: f32, cooldown: Duration) -> Self {
        Self {
            id,
            label: label.into(),
            baseline: None,
            raw: None,
            debouncer: LeakDebouncer::new(threshold, cooldown),
        }
    }

    pub fn calibrate(&mut self, baseline: f32) {
        trace!("channel {} ({}) baseline {baseline:.1}", self.id, self.label);
        self.baseline = Some(baseline);
        self.debouncer.reset();
    }

    /// |raw - baseline|, or `None` before calibration
    pub fn deviation(&self, raw: f32) -> Option<f32> {
        self.baseline.map(|baseline| (raw - baseline).abs())
    }

    pub fn snapshot(&self) -> Option<SensorSnapshot> {
        let value = self.raw?;
        Some(SensorSnapshot {
            sensor: self.id,
            location: self.label.clone(),
            value: f64::from(value),
            baseline: self.baseline.map(f64::from),
            state: self.debouncer.state(),
        })
    }
}
