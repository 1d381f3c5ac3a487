//! Advisory remediation text for a failed verification.
//!
//! Pure lookup. Nothing here changes what a flow does, it only picks which
//! instructions the worker sees next to the error.

use serde::{Deserialize, Serialize};

use crate::error::GuidanceKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Platform {
    Ios,
    Android,
    Desktop,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Browser {
    Safari,
    Chrome,
    Firefox,
    Samsung,
    Other,
}

impl Platform {
    /// Best-effort sniffing from a user-agent string.
    pub fn detect(user_agent: &str) -> (Platform, Browser) {
        let ua = user_agent.to_ascii_lowercase();

        let platform = if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ipod") {
            Platform::Ios
        } else if ua.contains("android") {
            Platform::Android
        } else if ua.contains("windows") || ua.contains("macintosh") || ua.contains("linux") {
            Platform::Desktop
        } else {
            Platform::Unknown
        };

        // Order matters: Samsung and Chrome UAs both mention Safari.
        let browser = if ua.contains("samsungbrowser") {
            Browser::Samsung
        } else if ua.contains("firefox") || ua.contains("fxios") {
            Browser::Firefox
        } else if ua.contains("chrome") || ua.contains("crios") {
            Browser::Chrome
        } else if ua.contains("safari") {
            Browser::Safari
        } else {
            Browser::Other
        };

        (platform, browser)
    }
}

pub fn remediation(platform: Platform, browser: Browser, kind: GuidanceKind) -> &'static str {
    use Browser::*;
    use GuidanceKind::*;
    use Platform::*;

    match (platform, browser, kind) {
        (Ios, Safari, Location) => {
            "Seaded → Privaatsus → Asukohateenused → Safari veebisaidid → \"Küsi\" või \"Rakenduse kasutamisel\". Seejärel laadi leht uuesti."
        }
        (Ios, Safari, Camera) => {
            "Seaded → Safari → Kaamera → \"Luba\". Seejärel laadi leht uuesti."
        }
        (Ios, _, Location) => {
            "Seaded → Privaatsus → Asukohateenused: luba asukoht sellele brauserile ja proovi uuesti."
        }
        (Ios, _, Camera) => "Seaded → vali brauser → Kaamera: luba ja proovi uuesti.",
        (Android, Samsung, Location) => {
            "Menüü → Seaded → Saidid ja allalaadimised → Saidi õigused → Asukoht: luba see sait."
        }
        (Android, Samsung, Camera) => {
            "Menüü → Seaded → Saidid ja allalaadimised → Saidi õigused → Kaamera: luba see sait."
        }
        (Android, _, Location) => {
            "Puuduta aadressiriba lukuikooni → Õigused → Asukoht → Luba. Kontrolli, et seadme GPS on sees."
        }
        (Android, _, Camera) => {
            "Puuduta aadressiriba lukuikooni → Õigused → Kaamera → Luba. Sulge teised kaamerat kasutavad rakendused."
        }
        (Desktop, Firefox, Location) => {
            "Klõpsa aadressiriba vasakul asuvat ikooni ja eemalda asukoha blokeering."
        }
        (Desktop, Firefox, Camera) => {
            "Klõpsa aadressiriba vasakul asuvat ikooni ja eemalda kaamera blokeering."
        }
        (Desktop, _, Location) => "Luba brauseri seadetes sellele saidile asukoha kasutamine.",
        (Desktop, _, Camera) => {
            "Luba brauseri seadetes sellele saidile kaamera kasutamine ja sulge teised kaamerat kasutavad rakendused."
        }
        (Unknown, _, Location) => {
            "Luba seadme ja brauseri seadetes asukoha kasutamine ning proovi uuesti."
        }
        (Unknown, _, Camera) => {
            "Luba seadme ja brauseri seadetes kaamera kasutamine ning proovi uuesti."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_SAFARI: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";
    const ANDROID_CHROME: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Mobile Safari/537.36";
    const SAMSUNG: &str = "Mozilla/5.0 (Linux; Android 13; SM-S911B) AppleWebKit/537.36 (KHTML, like Gecko) SamsungBrowser/24.0 Chrome/117.0 Mobile Safari/537.36";
    const DESKTOP_FIREFOX: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0";

    #[test]
    fn detects_common_agents() {
        assert_eq!(Platform::detect(IPHONE_SAFARI), (Platform::Ios, Browser::Safari));
        assert_eq!(Platform::detect(ANDROID_CHROME), (Platform::Android, Browser::Chrome));
        assert_eq!(Platform::detect(SAMSUNG), (Platform::Android, Browser::Samsung));
        assert_eq!(Platform::detect(DESKTOP_FIREFOX), (Platform::Desktop, Browser::Firefox));
        assert_eq!(Platform::detect(""), (Platform::Unknown, Browser::Other));
    }

    #[test]
    fn every_combination_has_text() {
        let platforms = [Platform::Ios, Platform::Android, Platform::Desktop, Platform::Unknown];
        let browsers = [
            Browser::Safari,
            Browser::Chrome,
            Browser::Firefox,
            Browser::Samsung,
            Browser::Other,
        ];
        for platform in platforms {
            for browser in browsers {
                for kind in [GuidanceKind::Location, GuidanceKind::Camera] {
                    assert!(!remediation(platform, browser, kind).is_empty());
                }
            }
        }
    }
}
