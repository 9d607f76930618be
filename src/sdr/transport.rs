use failure::Error;
use num_complex::Complex;

/// Maximum RF ports / channels a single device exposes. The startup
/// parameter record is sized for this even though this crate only ever
/// drives channel 0.
pub const MAX_CHANNELS: usize = 4;

/// One complex baseband sample as the device delivers it (CF32).
pub type Sample = Complex<f32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceType {
    Rf,
    LowIf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSource {
    None,
    Pps,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Cf32,
    Ci16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwSampleFormat {
    /// Let the driver pick the narrowest wire format that fits the bandwidth.
    Auto,
    I16,
    I12,
}

/// Startup parameter record handed to the device on `start`. Built once at
/// session open and mutated in place by the configuration setters.
///
/// Invariant: `sample_rate_num[c] / sample_rate_den[c]` is always reduced
/// against the 1e9 precision denominator and `sample_rate_den[c]` is never 0.
#[derive(Debug, Clone)]
pub struct StartParams {
    pub interface_type: InterfaceType,
    pub sync_source: SyncSource,
    pub clock_source: ClockSource,

    pub rx_sample_fmt: SampleFormat,
    pub rx_sample_hw_fmt: HwSampleFormat,

    pub sample_rate_num: [i64; MAX_CHANNELS],
    pub sample_rate_den: [i64; MAX_CHANNELS],
    pub rx_freq: [u64; MAX_CHANNELS],
    pub tx_freq: [u64; MAX_CHANNELS],
    pub rx_gain: [f64; MAX_CHANNELS],
    pub rx_bandwidth: [f64; MAX_CHANNELS],

    pub rx_channel_count: usize,
    pub tx_channel_count: usize,
    pub rf_port_count: usize,
    pub rx_port_channel_count: [usize; MAX_CHANNELS],
    pub tx_port_channel_count: [usize; MAX_CHANNELS],

    /// 0 keeps the driver default (150 buffers per 10 ms).
    pub dma_buffer_count: u32,
    /// DMA buffer length in samples.
    pub dma_buffer_len: u32,
}

impl Default for StartParams {
    fn default() -> StartParams {
        StartParams {
            interface_type: InterfaceType::Rf,
            sync_source: SyncSource::None,
            clock_source: ClockSource::Internal,
            rx_sample_fmt: SampleFormat::Cf32,
            rx_sample_hw_fmt: HwSampleFormat::Auto,
            sample_rate_num: [0; MAX_CHANNELS],
            sample_rate_den: [1; MAX_CHANNELS],
            rx_freq: [0; MAX_CHANNELS],
            tx_freq: [0; MAX_CHANNELS],
            rx_gain: [0.0; MAX_CHANNELS],
            rx_bandwidth: [0.0; MAX_CHANNELS],
            rx_channel_count: 0,
            tx_channel_count: 0,
            rf_port_count: 0,
            rx_port_channel_count: [0; MAX_CHANNELS],
            tx_port_channel_count: [0; MAX_CHANNELS],
            dma_buffer_count: 0,
            dma_buffer_len: 0,
        }
    }
}

/// Hardware counters reported by the device, fetched after a failed read for
/// diagnostics and once on start as a liveness check.
#[derive(Debug, Clone, Copy, Default)]
pub struct SdrStats {
    pub tx_underflow_count: u64,
    pub rx_overflow_count: u64,
}

/// The opaque device transport this crate drives. One implementation per
/// hardware backend; [`crate::sdr::sim::SimTransport`] is the software one.
///
/// Status-code conventions follow the driver: control calls return 0 on
/// success and non-zero on failure, `read` returns the number of samples
/// produced or a negative code.
///
/// `stop` must be safe to issue while a `read` is in flight on another
/// thread; `read` blocks for at most `timeout_ms`.
pub trait DeviceTransport: Send + Sized {
    /// Open a device session from a connection-args string. Failure here is
    /// fatal to session construction.
    fn open(args: &str) -> Result<Self, Error>;

    /// Fill `params` with the driver defaults for this device.
    fn populate_defaults(&mut self, params: &mut StartParams);

    /// Begin streaming with the accumulated parameters.
    fn start(&mut self, params: &StartParams) -> i32;

    /// Halt streaming.
    fn stop(&mut self) -> i32;

    /// Blocking read of up to `out.len()` samples for `channel`.
    ///
    /// On success writes the hardware sample-clock position of the block into
    /// `timestamp` and returns the produced count; on failure returns a
    /// negative code and `timestamp` is meaningless.
    fn read(
        &mut self,
        timestamp: &mut i64,
        out: &mut [Sample],
        channel: usize,
        timeout_ms: u32,
    ) -> isize;

    /// Fetch hardware statistics counters.
    fn stats(&mut self, stats: &mut SdrStats) -> i32;

    /// Query the live RX gain. `None` means the value could not be read;
    /// callers fall back to the configured gain.
    fn rx_gain(&mut self, channel: usize) -> Option<f64>;

    /// Command the live RX gain.
    fn set_rx_gain(&mut self, channel: usize, gain: f64) -> i32;
}
