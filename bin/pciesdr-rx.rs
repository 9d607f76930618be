use log::*;
use structopt::StructOpt;
use tokio_stream::StreamExt;

use pciesdr::{PcieSdrSource, SampleStream, SdrSource, SimTransport};

#[derive(StructOpt)]
#[structopt(name = "pciesdr-rx", about = "rx streaming demo for the pciesdr source")]
struct Cli {
    /// center frequency in Hz
    #[structopt(short, long, default_value = "915e6")]
    freq: f64,

    /// sample rate in samples/second
    #[structopt(short, long, default_value = "2.4e6")]
    rate: f64,

    /// RF gain in dB
    #[structopt(short, long, default_value = "30")]
    gain: f64,

    /// frequency correction in ppm
    #[structopt(long, default_value = "0")]
    ppm: f64,

    /// number of samples to collect
    #[structopt(short = "n", long, default_value = "1000000")]
    count: usize,

    /// device parameter string, e.g. 'args=[dev0=/dev/sdr0]'
    #[structopt(short, long, default_value = "")]
    args: String,
}

#[tokio::main]
async fn main() -> Result<(), failure::Error> {
    pretty_env_logger::init();
    let cli = Cli::from_args();

    info!("known devices: {:?}", pciesdr::devices());

    let mut source = PcieSdrSource::<SimTransport>::open(&cli.args)?;

    let rate = source.set_sample_rate(cli.rate);
    let ppm = source.set_freq_corr(cli.ppm);
    let freq = source.set_center_freq(cli.freq);
    let gain = source.set_gain(cli.gain);
    info!(
        "configured: {} S/s, {} Hz ({} ppm), {} dB {} gain",
        rate,
        freq,
        ppm,
        gain,
        source.gain_names()[0]
    );

    let mut stream = SampleStream::spawn(source);

    let mut collected = 0usize;
    let mut power_sum = 0f64;

    while let Some(sample) = stream.next().await {
        power_sum += sample.norm_sqr() as f64;
        collected += 1;
        if collected % (1 << 20) == 0 {
            debug!("collected {} samples", collected);
        }
        if collected >= cli.count {
            break;
        }
    }
    stream.stop();

    if collected == 0 {
        error!("stream ended before any samples were produced");
        return Ok(());
    }

    let average_power = 10.0 * (power_sum / collected as f64).log10();
    info!(
        "collected {} samples, average power {:.1} dBFS",
        collected, average_power
    );

    Ok(())
}
