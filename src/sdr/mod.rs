//! Device-control and streaming layer for the PCIe SDR front end.

pub mod args;
pub mod gain;
pub mod pciesdr;
pub mod rate;
pub mod sim;
pub mod stream;
pub mod transport;

use self::transport::Sample;

/// A closed [start, stop] metadata range for a tunable parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub start: f64,
    pub stop: f64,
}

impl Range {
    pub fn new(start: f64, stop: f64) -> Range {
        Range { start, stop }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.start && value <= self.stop
    }
}

/// The source side of the capability interface the host graph drives: one
/// implementation per hardware backend, [`pciesdr::PcieSdrSource`] being the
/// PCIe one.
///
/// `start`/`stop` report success as a flat bool; `produce` is the per-cycle
/// blocking read and returns how many samples it wrote. All other methods
/// are synchronous configuration accessors.
pub trait SdrSource: Send {
    fn start(&mut self) -> bool;
    fn stop(&mut self) -> bool;

    /// Pull up to `out.len()` samples. Returns the produced count; 0 covers
    /// both an empty cycle and a (logged) read failure.
    fn produce(&mut self, out: &mut [Sample]) -> usize;

    fn num_channels(&self) -> usize;

    fn sample_rates(&self) -> Range;
    fn set_sample_rate(&mut self, rate: f64) -> f64;
    fn sample_rate(&self) -> f64;

    fn freq_range(&self) -> Range;
    fn set_center_freq(&mut self, freq: f64) -> f64;
    fn center_freq(&self) -> f64;
    fn set_freq_corr(&mut self, ppm: f64) -> f64;
    fn freq_corr(&self) -> f64;

    fn gain_names(&self) -> Vec<&'static str>;
    fn gain_range(&self, name: &str) -> Range;
    fn set_gain_mode(&mut self, automatic: bool) -> bool;
    fn gain_mode(&self) -> bool;
    fn set_gain(&mut self, gain: f64) -> f64;
    fn set_gain_named(&mut self, gain: f64, name: &str) -> f64;
    fn gain(&mut self) -> f64;
    fn gain_named(&mut self, name: &str) -> f64;
    fn set_if_gain(&mut self, gain: f64) -> f64;
    fn set_bb_gain(&mut self, gain: f64) -> f64;

    fn antennas(&self) -> Vec<String>;
    fn set_antenna(&mut self, antenna: &str) -> String;
    fn antenna(&self) -> String;

    fn set_bandwidth(&mut self, bandwidth: f64) -> f64;
    fn bandwidth(&self) -> f64;
    fn bandwidth_range(&self) -> Range;

    /// Hardware sample-clock position of the last completed read.
    fn timestamp(&self) -> i64;
}

/// Enumerate attached devices. There is no discovery mechanism on this bus;
/// the catalog is the one fixed node.
pub fn devices() -> Vec<String> {
    vec!["dev0=/dev/sdr0".to_string()]
}
