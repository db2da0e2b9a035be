use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Browser {
    Edge,
    Chrome,
    Firefox,
    Safari,
    InternetExplorer,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatingSystem {
    Windows,
    Android,
    Ios,
    MacOs,
    Linux,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Tablet,
    Smartphone,
    Desktop,
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Browser::Edge => "Edge",
            Browser::Chrome => "Chrome",
            Browser::Firefox => "Firefox",
            Browser::Safari => "Safari",
            Browser::InternetExplorer => "Internet Explorer",
            Browser::Unknown => "Unknown",
        })
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperatingSystem::Windows => "Windows",
            OperatingSystem::Android => "Android",
            OperatingSystem::Ios => "iOS",
            OperatingSystem::MacOs => "MacOS",
            OperatingSystem::Linux => "Linux",
            OperatingSystem::Unknown => "Unknown",
        })
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceType::Tablet => "Tablet",
            DeviceType::Smartphone => "Smartphone",
            DeviceType::Desktop => "Desktop",
        })
    }
}

const TABLET_TOKENS: &[&str] = &["tablet", "ipad", "playbook", "silk"];

const SMARTPHONE_TOKENS: &[&str] = &[
    "Mobile",
    "iPhone",
    "iPod",
    "Android",
    "BlackBerry",
    "IEMobile",
    "Kindle",
    "Silk-Accelerated",
    "hpwOS",
    "webOS",
    "Opera Mobi",
    "Opera Mini",
];

/// Coarse classification of the scanning client, derived from its user agent
#[derive(Debug, Clone, Default)]
pub struct ClientEnvironment {
    user_agent: String,
}

impl ClientEnvironment {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn browser(&self) -> Browser {
        let ua = self.user_agent.as_str();
        // Edge and Chrome both advertise Safari; Edge also advertises Chrome
        if ua.contains("Edg") {
            Browser::Edge
        } else if ua.contains("Chrome") || ua.contains("CriOS") {
            Browser::Chrome
        } else if ua.contains("Firefox") || ua.contains("FxiOS") {
            Browser::Firefox
        } else if ua.contains("Safari") {
            Browser::Safari
        } else if ua.contains("MSIE") || ua.contains("Trident") {
            Browser::InternetExplorer
        } else {
            Browser::Unknown
        }
    }

    pub fn os(&self) -> OperatingSystem {
        let ua = self.user_agent.as_str();
        if ua.contains("Windows") {
            OperatingSystem::Windows
        } else if ua.contains("Android") {
            OperatingSystem::Android
        } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod") || ua.contains("iOS") {
            OperatingSystem::Ios
        } else if ua.contains("Mac") {
            OperatingSystem::MacOs
        } else if ua.contains("Linux") {
            OperatingSystem::Linux
        } else {
            OperatingSystem::Unknown
        }
    }

    pub fn device_type(&self) -> DeviceType {
        let lower = self.user_agent.to_lowercase();
        let android_tablet = lower
            .find("android")
            .map(|at| !lower[at..].contains("mobi"))
            .unwrap_or(false);

        if android_tablet || TABLET_TOKENS.iter().any(|t| lower.contains(t)) {
            DeviceType::Tablet
        } else if SMARTPHONE_TOKENS.iter().any(|t| self.user_agent.contains(t)) {
            DeviceType::Smartphone
        } else {
            DeviceType::Desktop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const PIXEL: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";
    const GALAXY_TAB: &str = "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";
    const FIREFOX_LINUX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

    #[test]
    fn test_iphone_classification() {
        let env = ClientEnvironment::new(IPHONE);
        assert_eq!(env.browser(), Browser::Safari);
        assert_eq!(env.os(), OperatingSystem::Ios);
        assert_eq!(env.device_type(), DeviceType::Smartphone);
    }

    #[test]
    fn test_android_phone_and_tablet() {
        let phone = ClientEnvironment::new(PIXEL);
        assert_eq!(phone.browser(), Browser::Chrome);
        assert_eq!(phone.os(), OperatingSystem::Android);
        assert_eq!(phone.device_type(), DeviceType::Smartphone);

        let tablet = ClientEnvironment::new(GALAXY_TAB);
        assert_eq!(tablet.device_type(), DeviceType::Tablet);
    }

    #[test]
    fn test_desktop_classification() {
        let edge = ClientEnvironment::new(EDGE_WINDOWS);
        assert_eq!(edge.browser(), Browser::Edge);
        assert_eq!(edge.os(), OperatingSystem::Windows);
        assert_eq!(edge.device_type(), DeviceType::Desktop);

        let firefox = ClientEnvironment::new(FIREFOX_LINUX);
        assert_eq!(firefox.browser(), Browser::Firefox);
        assert_eq!(firefox.os(), OperatingSystem::Linux);
    }

    #[test]
    fn test_unknown_agent() {
        let env = ClientEnvironment::default();
        assert_eq!(env.browser(), Browser::Unknown);
        assert_eq!(env.os(), OperatingSystem::Unknown);
        assert_eq!(env.device_type(), DeviceType::Desktop);
        assert_eq!(env.browser().to_string(), "Unknown");
    }
}
