//! Gain-stage arbitration between configured and live state.
//!
//! The configured RF gain lives in the startup parameter record so that a
//! later `start` picks it up; while streaming, sets are additionally pushed
//! to the live device and gets are answered from it. The shared running flag
//! decides which side is authoritative.

use std::sync::{Arc, Mutex};

use log::*;

use super::transport::{DeviceTransport, StartParams};
use super::Range;

pub const GAIN_STAGE_RF: &str = "RF";
pub const GAIN_STAGE_IF: &str = "IF";

pub struct GainArbiter {
    /// Shared with the device session, which flips it on start/stop.
    running: Arc<Mutex<bool>>,
    auto_gain: bool,
    if_gain: f64,
}

impl GainArbiter {
    pub fn new(running: Arc<Mutex<bool>>) -> GainArbiter {
        GainArbiter {
            running,
            auto_gain: false,
            if_gain: 0.0,
        }
    }

    pub fn stage_names() -> Vec<&'static str> {
        vec![GAIN_STAGE_RF, GAIN_STAGE_IF]
    }

    /// Fixed per-stage metadata; the device has no richer capability query.
    pub fn stage_range(name: &str) -> Range {
        match name {
            GAIN_STAGE_RF | GAIN_STAGE_IF => Range::new(0.0, 60.0),
            _ => Range::new(0.0, 0.0),
        }
    }

    pub fn set_auto(&mut self, automatic: bool) -> bool {
        self.auto_gain = automatic;
        self.auto_gain
    }

    pub fn auto(&self) -> bool {
        self.auto_gain
    }

    /// Set the RF gain. The configured value always updates; when streaming
    /// the live device is commanded as well, and a command failure is logged
    /// without rolling back the configured value.
    pub fn set_rf<T: DeviceTransport>(
        &self,
        transport: &mut T,
        params: &mut StartParams,
        chan: usize,
        gain: f64,
    ) -> f64 {
        let mut ret = 0;

        params.rx_gain[chan] = gain;

        {
            let running = self.running.lock().unwrap();

            if *running {
                ret = transport.set_rx_gain(chan, params.rx_gain[chan]);
            }
        }

        if ret != 0 {
            error!("Failed to set RX gain ({}), chan: {}", ret, chan);
        }

        self.rf(transport, params, chan)
    }

    /// Current RF gain: the live device value while streaming, otherwise the
    /// configured one. A live query that yields nothing falls back silently.
    pub fn rf<T: DeviceTransport>(
        &self,
        transport: &mut T,
        params: &StartParams,
        chan: usize,
    ) -> f64 {
        let mut gain = params.rx_gain[chan];

        {
            let running = self.running.lock().unwrap();

            if *running {
                gain = transport.rx_gain(chan).unwrap_or(gain);
            }
        }

        gain
    }

    /// The IF stage is intentionally unimplemented on this hardware: the
    /// request is dropped and the last stored value reported back.
    pub fn set_if(&self, _gain: f64) -> f64 {
        self.if_gain
    }
}
