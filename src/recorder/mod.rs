mod analytics;
mod environment;
mod geo;
mod scan_recorder;
#[cfg(test)]
mod tests;

pub use analytics::{export_analytics, AnalyticsExport};
pub use environment::{Browser, ClientEnvironment, DeviceType, OperatingSystem};
pub use geo::{GeoLocator, HttpGeoLocator, LocationCache, StaticGeoLocator};
pub use scan_recorder::{ScanReceipt, ScanRecorder};
