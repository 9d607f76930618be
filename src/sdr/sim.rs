//! Simulated device transport.
//!
//! A software stand-in for the PCIe hardware: produces a pure tone at 1% of
//! the negotiated sample rate with the sample clock advancing one tick per
//! sample. Lets the binary and the integration tests run the full session
//! lifecycle without a device on the bus.

use std::f32::consts::PI;

use failure::Error;
use log::*;

use super::transport::{DeviceTransport, Sample, SdrStats, StartParams, MAX_CHANNELS};

pub struct SimTransport {
    started: bool,
    clock: i64,
    phase: f32,
    phase_inc: f32,
    rx_gain: [f64; MAX_CHANNELS],
    stats: SdrStats,
}

impl SimTransport {
    /// Tone amplitude for the current gain setting, full range at 60 dB.
    fn amplitude(&self, channel: usize) -> f32 {
        10f32.powf((self.rx_gain[channel] as f32 - 60.0) / 20.0)
    }
}

impl DeviceTransport for SimTransport {
    fn open(args: &str) -> Result<SimTransport, Error> {
        debug!("opening simulated device \"{}\"", args);

        Ok(SimTransport {
            started: false,
            clock: 0,
            phase: 0.0,
            phase_inc: 0.0,
            rx_gain: [0.0; MAX_CHANNELS],
            stats: SdrStats::default(),
        })
    }

    fn populate_defaults(&mut self, params: &mut StartParams) {
        params.dma_buffer_count = 0;
        params.dma_buffer_len = 1000;
    }

    fn start(&mut self, params: &StartParams) -> i32 {
        if params.sample_rate_den[0] == 0 || params.sample_rate_num[0] <= 0 {
            return -1;
        }

        // tone at 1% of the sample rate, so the phase step is rate-free
        self.phase_inc = 2.0 * PI / 100.0;
        self.phase = 0.0;
        self.clock = 0;
        self.rx_gain = params.rx_gain;
        self.started = true;

        let rate = params.sample_rate_num[0] as f64 / params.sample_rate_den[0] as f64;
        debug!("simulated stream up at {} S/s", rate);
        0
    }

    fn stop(&mut self) -> i32 {
        if !self.started {
            return -1;
        }
        self.started = false;
        0
    }

    fn read(
        &mut self,
        timestamp: &mut i64,
        out: &mut [Sample],
        channel: usize,
        _timeout_ms: u32,
    ) -> isize {
        if !self.started {
            return -1;
        }

        let amplitude = self.amplitude(channel);
        for sample in out.iter_mut() {
            *sample = Sample::from_polar(amplitude, self.phase);
            self.phase = (self.phase + self.phase_inc) % (2.0 * PI);
        }

        *timestamp = self.clock;
        self.clock += out.len() as i64;
        out.len() as isize
    }

    fn stats(&mut self, stats: &mut SdrStats) -> i32 {
        *stats = self.stats;
        0
    }

    fn rx_gain(&mut self, channel: usize) -> Option<f64> {
        Some(self.rx_gain[channel])
    }

    fn set_rx_gain(&mut self, channel: usize, gain: f64) -> i32 {
        self.rx_gain[channel] = gain;
        0
    }
}
