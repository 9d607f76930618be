pub mod sdr;

pub use sdr::pciesdr::PcieSdrSource;
pub use sdr::sim::SimTransport;
pub use sdr::stream::SampleStream;
pub use sdr::transport::{DeviceTransport, Sample, SdrStats, StartParams};
pub use sdr::{devices, Range, SdrSource};
