//! PCIe SDR source: device session lifecycle, frequency correction and the
//! per-cycle streaming read.

use std::sync::{Arc, Mutex};

use failure::Error;
use log::*;

use super::args::{device_args, params_to_dict};
use super::gain::{GainArbiter, GAIN_STAGE_IF};
use super::rate::rate_to_fraction;
use super::transport::{
    ClockSource, DeviceTransport, HwSampleFormat, InterfaceType, Sample, SampleFormat, SdrStats,
    StartParams, SyncSource,
};
use super::{Range, SdrSource};

/// The one RX channel this source drives.
const CHAN: usize = 0;
const RF_PORT: usize = 0;

/// Upper bound on how long a single read may block for data.
const READ_TIMEOUT_MS: u32 = 100;

/// Device-side validity range for the corrected tuning frequency.
pub const FREQ_RANGE: Range = Range {
    start: 70e6,
    stop: 6000e6,
};

/// Advertised sample-rate range. Only integer rates are listed for phase
/// noise reasons; arbitrary fractional rates inside the bounds are accepted.
pub const SAMPLE_RATE_RANGE: Range = Range {
    start: 400e3,
    stop: 20e6,
};

/// The write path accepts slightly more than the advertised range.
const SAMPLE_RATE_WRITE_RANGE: Range = Range {
    start: 400e3,
    stop: 25e6,
};

pub const BANDWIDTH_RANGE: Range = Range {
    start: 400e3,
    stop: 20e6,
};

/// One RX channel of a PCIe SDR front end, generic over the device
/// transport. Owns the open device session for its whole lifetime; the
/// session closes with the transport when the source is dropped.
pub struct PcieSdrSource<T: DeviceTransport> {
    transport: T,
    params: StartParams,
    /// Shared with the gain arbiter, which uses it to pick between the
    /// configured and the live gain. Set only by start/stop.
    running: Arc<Mutex<bool>>,
    gain: GainArbiter,

    sample_rate: f64,
    center_freq: f64,
    freq_corr: f64,
    /// Hardware sample-clock position at the start of the last completed
    /// read. Reset to 0 on start, never rewound otherwise.
    timestamp_rx: i64,
}

impl<T: DeviceTransport> PcieSdrSource<T> {
    /// Open a device session. `params` is the flat `key=value,...` string
    /// from the host; the `args=[...]` entry carries the device connection
    /// string. Failure to open the device fails construction.
    pub fn open(params: &str) -> Result<PcieSdrSource<T>, Error> {
        let dict = params_to_dict(params);
        let mut transport = T::open(&device_args(&dict))?;

        // prefill startup parameters with the driver defaults, then pin
        // down everything this source depends on
        let mut start_params = StartParams::default();
        transport.populate_defaults(&mut start_params);

        start_params.interface_type = InterfaceType::Rf;
        start_params.sync_source = SyncSource::None;
        start_params.clock_source = ClockSource::Internal;

        start_params.rx_sample_fmt = SampleFormat::Cf32;
        start_params.rx_sample_hw_fmt = HwSampleFormat::Auto;

        start_params.sample_rate_num[RF_PORT] = 1_500_000;
        start_params.sample_rate_den[RF_PORT] = 1;
        start_params.tx_freq[CHAN] = 1_500_000_000;
        start_params.rx_freq[CHAN] = 1_500_000_000;

        start_params.rx_channel_count = 1;
        start_params.tx_channel_count = 1;
        start_params.rx_gain[CHAN] = 40.0;
        start_params.rx_bandwidth[CHAN] = 1e4;
        start_params.rf_port_count = 1;
        start_params.tx_port_channel_count[RF_PORT] = 1;
        start_params.rx_port_channel_count[RF_PORT] = 1;
        start_params.dma_buffer_count = 0;
        start_params.dma_buffer_len = 1000;

        let running = Arc::new(Mutex::new(false));

        let mut source = PcieSdrSource {
            transport,
            params: start_params,
            gain: GainArbiter::new(running.clone()),
            running,
            sample_rate: 0.0,
            center_freq: 0.0,
            freq_corr: 0.0,
            timestamp_rx: 0,
        };

        let freqs = source.freq_range();
        source.set_center_freq((freqs.start + freqs.stop) / 2.0);
        source.set_sample_rate(source.sample_rates().start);
        source.set_bandwidth(0.0);

        // disable the amp stage by default to protect the full-spectrum
        // pre-amp from physical damage
        source.set_gain(0.0);

        Ok(source)
    }

    /// The accumulated startup parameters, as the next `start` will see them.
    pub fn start_params(&self) -> &StartParams {
        &self.params
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock().unwrap()
    }

    /// Validate the corrected frequency against the device range and stage
    /// it for the device. Non-zero means rejected, nothing staged.
    fn push_freq(&mut self, corr_freq: u64) -> i32 {
        if (corr_freq as f64) < FREQ_RANGE.start || (corr_freq as f64) > FREQ_RANGE.stop {
            error!("tuning frequency {} is out of range", corr_freq);
            return 1;
        }
        self.params.rx_freq[CHAN] = corr_freq;
        0
    }

    /// Negotiate and stage a sample rate. Non-zero means rejected with the
    /// staged rate left untouched.
    fn push_sample_rate(&mut self, rate: f64) -> i32 {
        if rate < SAMPLE_RATE_WRITE_RANGE.start || rate > SAMPLE_RATE_WRITE_RANGE.stop {
            error!("sample rate {} is out of range", rate);
            return 1;
        }

        let (numerator, denominator) = rate_to_fraction(rate);
        self.params.sample_rate_num[CHAN] = numerator;
        self.params.sample_rate_den[CHAN] = denominator;
        0
    }
}

impl<T: DeviceTransport> SdrSource for PcieSdrSource<T> {
    fn start(&mut self) -> bool {
        let mut stats = SdrStats::default();

        let ret = self.transport.start(&self.params);
        if ret != 0 {
            error!("Failed to start RX streaming ({})", ret);
            return false;
        }

        // one stats round-trip as a liveness check; a failure here aborts
        // the start even though the stream itself came up
        let ret = self.transport.stats(&mut stats);
        if ret != 0 {
            error!("stats query failed after start ({})", ret);
            return false;
        }

        self.timestamp_rx = 0;

        {
            let mut running = self.running.lock().unwrap();

            *running = true;
        }

        true
    }

    fn stop(&mut self) -> bool {
        let ret = self.transport.stop();
        if ret != 0 {
            error!("Failed to stop RX streaming ({})", ret);
        }

        // clear the flag even on a failed stop so the session cannot wedge
        // in the streaming state
        {
            let mut running = self.running.lock().unwrap();

            *running = false;
        }

        ret == 0
    }

    fn produce(&mut self, out: &mut [Sample]) -> usize {
        let mut timestamp_tmp: i64 = 0;

        let rc = self
            .transport
            .read(&mut timestamp_tmp, out, CHAN, READ_TIMEOUT_MS);
        if rc < 0 {
            error!("Failed read from RX stream rc:{} requested:{}", rc, out.len());
            error!(
                "timestamp_rx:{} timestamp_tmp:{}",
                self.timestamp_rx, timestamp_tmp
            );

            let mut stats = SdrStats::default();
            if self.transport.stats(&mut stats) != 0 {
                error!("Failed get_stats");
            } else {
                error!(
                    "tx_underflow_count:{} rx_overflow_count:{}",
                    stats.tx_underflow_count, stats.rx_overflow_count
                );
            }
            return 0;
        }
        self.timestamp_rx = timestamp_tmp;

        rc as usize
    }

    fn num_channels(&self) -> usize {
        1
    }

    fn sample_rates(&self) -> Range {
        SAMPLE_RATE_RANGE
    }

    fn set_sample_rate(&mut self, rate: f64) -> f64 {
        if self.push_sample_rate(rate) == 0 {
            self.sample_rate = rate;
        }

        self.sample_rate()
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn freq_range(&self) -> Range {
        FREQ_RANGE
    }

    fn set_center_freq(&mut self, freq: f64) -> f64 {
        // ppm correction is applied only on the way to the device; the
        // stored frequency stays the uncorrected request
        let corr_freq = freq * (1.0 + self.freq_corr * 1e-6);

        if self.push_freq(corr_freq as u64) == 0 {
            self.center_freq = freq;
        }

        self.center_freq()
    }

    fn center_freq(&self) -> f64 {
        self.center_freq
    }

    fn set_freq_corr(&mut self, ppm: f64) -> f64 {
        self.freq_corr = ppm;

        // re-tune so the new correction takes effect immediately
        self.set_center_freq(self.center_freq);

        self.freq_corr()
    }

    fn freq_corr(&self) -> f64 {
        self.freq_corr
    }

    fn gain_names(&self) -> Vec<&'static str> {
        GainArbiter::stage_names()
    }

    fn gain_range(&self, name: &str) -> Range {
        GainArbiter::stage_range(name)
    }

    fn set_gain_mode(&mut self, automatic: bool) -> bool {
        self.gain.set_auto(automatic)
    }

    fn gain_mode(&self) -> bool {
        self.gain.auto()
    }

    fn set_gain(&mut self, gain: f64) -> f64 {
        self.gain
            .set_rf(&mut self.transport, &mut self.params, CHAN, gain)
    }

    fn set_gain_named(&mut self, gain: f64, name: &str) -> f64 {
        match name {
            GAIN_STAGE_IF => self.set_if_gain(gain),
            // "RF" and anything unrecognized address the amp stage
            _ => self.set_gain(gain),
        }
    }

    fn gain(&mut self) -> f64 {
        self.gain.rf(&mut self.transport, &self.params, CHAN)
    }

    fn gain_named(&mut self, _name: &str) -> f64 {
        // every stage reports through the RF arbitration
        self.gain()
    }

    fn set_if_gain(&mut self, gain: f64) -> f64 {
        self.gain.set_if(gain)
    }

    fn set_bb_gain(&mut self, _gain: f64) -> f64 {
        0.0
    }

    fn antennas(&self) -> Vec<String> {
        vec![self.antenna()]
    }

    fn set_antenna(&mut self, _antenna: &str) -> String {
        self.antenna()
    }

    fn antenna(&self) -> String {
        "TX/RX".to_string()
    }

    fn set_bandwidth(&mut self, bandwidth: f64) -> f64 {
        let mut bandwidth = bandwidth;

        if bandwidth == 0.0 {
            // automatic filter selection: narrower than the sample rate to
            // prevent aliasing
            bandwidth = self.sample_rate * 0.75;
        }

        self.params.rx_bandwidth[CHAN] = bandwidth;

        self.bandwidth()
    }

    fn bandwidth(&self) -> f64 {
        self.params.rx_bandwidth[CHAN]
    }

    fn bandwidth_range(&self) -> Range {
        BANDWIDTH_RANGE
    }

    fn timestamp(&self) -> i64 {
        self.timestamp_rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use failure::format_err;
    use std::collections::VecDeque;

    /// Scriptable transport: control-call return codes are settable and
    /// every interaction is recorded.
    #[derive(Default)]
    struct MockTransport {
        start_rc: i32,
        stop_rc: i32,
        stats_rc: i32,
        set_gain_rc: i32,
        live_gain: Option<f64>,

        /// Scripted (return code, timestamp) pairs for `read`; when empty,
        /// reads succeed in full with the clock advancing by the request.
        read_script: VecDeque<(isize, i64)>,
        clock: i64,

        started: Vec<StartParams>,
        stats_calls: usize,
        gain_commands: Vec<(usize, f64)>,
    }

    impl DeviceTransport for MockTransport {
        fn open(args: &str) -> Result<MockTransport, Error> {
            if args == "fail" {
                return Err(format_err!("no such device"));
            }
            Ok(MockTransport::default())
        }

        fn populate_defaults(&mut self, _params: &mut StartParams) {}

        fn start(&mut self, params: &StartParams) -> i32 {
            self.started.push(params.clone());
            self.start_rc
        }

        fn stop(&mut self) -> i32 {
            self.stop_rc
        }

        fn read(
            &mut self,
            timestamp: &mut i64,
            out: &mut [Sample],
            _channel: usize,
            _timeout_ms: u32,
        ) -> isize {
            if let Some((rc, ts)) = self.read_script.pop_front() {
                *timestamp = ts;
                return rc;
            }
            *timestamp = self.clock;
            self.clock += out.len() as i64;
            out.len() as isize
        }

        fn stats(&mut self, _stats: &mut SdrStats) -> i32 {
            self.stats_calls += 1;
            self.stats_rc
        }

        fn rx_gain(&mut self, _channel: usize) -> Option<f64> {
            self.live_gain
        }

        fn set_rx_gain(&mut self, channel: usize, gain: f64) -> i32 {
            self.gain_commands.push((channel, gain));
            self.set_gain_rc
        }
    }

    fn open_mock() -> PcieSdrSource<MockTransport> {
        PcieSdrSource::<MockTransport>::open("").unwrap()
    }

    #[test]
    fn open_failure_is_fatal() {
        assert!(PcieSdrSource::<MockTransport>::open("args=fail]").is_err());
    }

    #[test]
    fn defaults_after_open() {
        let src = open_mock();

        assert_eq!(src.sample_rate(), 400e3);
        assert_eq!(src.center_freq(), 3035e6);
        // bandwidth 0 resolves to 0.75 x rate
        assert_eq!(src.bandwidth(), 300e3);
        // amp stage zeroed for front-end protection
        assert_eq!(src.start_params().rx_gain[0], 0.0);
        assert_eq!(src.start_params().sample_rate_num[0], 400_000);
        assert_eq!(src.start_params().sample_rate_den[0], 1);
        assert_eq!(src.start_params().dma_buffer_len, 1000);
        assert_eq!(src.num_channels(), 1);
        assert!(!src.is_running());
    }

    #[test]
    fn ppm_correction_is_applied_on_the_device_side_only() {
        let mut src = open_mock();

        src.set_center_freq(1_500_000_000.0);
        assert_eq!(src.start_params().rx_freq[0], 1_500_000_000);

        src.set_freq_corr(10.0);
        assert_eq!(src.start_params().rx_freq[0], 1_500_015_000);
        assert_eq!(src.center_freq(), 1_500_000_000.0);
        assert_eq!(src.freq_corr(), 10.0);
    }

    #[test]
    fn out_of_range_frequency_is_rejected() {
        let mut src = open_mock();

        let prior = src.center_freq();
        let staged = src.start_params().rx_freq[0];

        assert_eq!(src.set_center_freq(50e6), prior);
        assert_eq!(src.center_freq(), prior);
        assert_eq!(src.start_params().rx_freq[0], staged);
    }

    #[test]
    fn sample_rate_round_trip_and_rejection() {
        let mut src = open_mock();

        assert_eq!(src.set_sample_rate(1_500_000.0), 1_500_000.0);
        assert_eq!(src.sample_rate(), 1_500_000.0);
        assert_eq!(src.start_params().sample_rate_den[0], 1);

        // rejected: prior value retained
        assert_eq!(src.set_sample_rate(30e6), 1_500_000.0);
        assert_eq!(src.sample_rate(), 1_500_000.0);

        // the write path tops out above the advertised range
        assert_eq!(src.set_sample_rate(24e6), 24e6);
        assert_eq!(src.sample_rates().stop, 20e6);
    }

    #[test]
    fn gain_idle_stores_configured_value() {
        let mut src = open_mock();

        assert_eq!(src.set_gain(25.0), 25.0);
        assert_eq!(src.gain(), 25.0);
        assert_eq!(src.start_params().rx_gain[0], 25.0);
        // not running: no live command issued
        assert!(src.transport.gain_commands.is_empty());
    }

    #[test]
    fn gain_live_queries_device_without_touching_configured_value() {
        let mut src = open_mock();

        src.set_gain(25.0);
        src.transport.live_gain = Some(31.5);
        assert!(src.start());

        assert_eq!(src.gain(), 31.5);
        assert_eq!(src.start_params().rx_gain[0], 25.0);

        src.set_gain(40.0);
        assert_eq!(src.transport.gain_commands, vec![(0, 40.0)]);
        assert_eq!(src.start_params().rx_gain[0], 40.0);
    }

    #[test]
    fn live_gain_query_falls_back_to_configured() {
        let mut src = open_mock();

        src.set_gain(25.0);
        src.transport.live_gain = None;
        assert!(src.start());
        assert_eq!(src.gain(), 25.0);
    }

    #[test]
    fn named_gain_stages() {
        let mut src = open_mock();

        assert_eq!(src.gain_names(), vec!["RF", "IF"]);
        assert_eq!(src.set_gain_named(12.0, "RF"), 12.0);
        // the IF stage is a stub with no device effect
        assert_eq!(src.set_gain_named(30.0, "IF"), 0.0);
        assert_eq!(src.gain_named("IF"), 12.0);
        assert_eq!(src.set_bb_gain(10.0), 0.0);
    }

    #[test]
    fn read_success_advances_timestamp() {
        let mut src = open_mock();
        let mut buf = vec![Sample::default(); 1024];

        assert!(src.start());
        assert_eq!(src.timestamp(), 0);

        src.transport.read_script.push_back((512, 2048));
        assert_eq!(src.produce(&mut buf), 512);
        assert_eq!(src.timestamp(), 2048);
    }

    #[test]
    fn read_failure_produces_nothing_and_reports_stats() {
        let mut src = open_mock();
        let mut buf = vec![Sample::default(); 1024];

        assert!(src.start());
        src.transport.read_script.push_back((512, 2048));
        src.produce(&mut buf);

        let stats_before = src.transport.stats_calls;
        src.transport.read_script.push_back((-1, 999));
        assert_eq!(src.produce(&mut buf), 0);
        assert_eq!(src.timestamp(), 2048);
        assert_eq!(src.transport.stats_calls, stats_before + 1);
    }

    #[test]
    fn start_failure_leaves_session_stopped() {
        let mut src = open_mock();

        src.transport.start_rc = -5;
        assert!(!src.start());
        assert!(!src.is_running());
    }

    #[test]
    fn failed_liveness_check_aborts_start() {
        let mut src = open_mock();

        src.transport.stats_rc = 1;
        assert!(!src.start());
        assert!(!src.is_running());
    }

    #[test]
    fn stop_failure_still_clears_running_flag() {
        let mut src = open_mock();

        assert!(src.start());
        assert!(src.is_running());

        src.transport.stop_rc = 1;
        assert!(!src.stop());
        assert!(!src.is_running());
    }

    #[test]
    fn restart_resets_timestamp() {
        let mut src = open_mock();
        let mut buf = vec![Sample::default(); 256];

        assert!(src.start());
        src.transport.read_script.push_back((256, 4096));
        src.produce(&mut buf);
        assert_eq!(src.timestamp(), 4096);

        assert!(src.stop());
        assert!(src.start());
        assert_eq!(src.timestamp(), 0);
    }

    #[test]
    fn antenna_is_fixed() {
        let mut src = open_mock();

        assert_eq!(src.antenna(), "TX/RX");
        assert_eq!(src.set_antenna("RX2"), "TX/RX");
        assert_eq!(src.antennas(), vec!["TX/RX".to_string()]);
    }

    #[test]
    fn start_hands_accumulated_params_to_the_device() {
        let mut src = open_mock();

        src.set_sample_rate(2e6);
        src.set_center_freq(915e6);
        src.set_gain(20.0);
        assert!(src.start());

        let params = src.transport.started.last().unwrap();
        assert_eq!(params.sample_rate_num[0], 2_000_000);
        assert_eq!(params.sample_rate_den[0], 1);
        assert_eq!(params.rx_freq[0], 915_000_000);
        assert_eq!(params.rx_gain[0], 20.0);
        assert_eq!(params.rx_channel_count, 1);
    }
}
