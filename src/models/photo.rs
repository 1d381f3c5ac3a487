use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::LocationSample;

/// A JPEG still frozen from the live camera feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StillImage {
    #[serde(with = "jpeg_base64")]
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl StillImage {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.jpeg)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.to_base64())
    }

    pub fn byte_len(&self) -> usize {
        self.jpeg.len()
    }
}

/// What a successful verification hands to the session manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedCapture {
    pub photo: StillImage,
    pub location: LocationSample,
    pub distance_m: u32,
    pub confirmed_at: DateTime<Utc>,
}

mod jpeg_base64 {
    use super::{Engine, STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_carries_jpeg_prefix() {
        let still = StillImage {
            jpeg: vec![0xFF, 0xD8, 0xFF],
            width: 1,
            height: 1,
        };
        assert_eq!(still.to_data_url(), "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn jpeg_bytes_serialize_as_base64_text() {
        let still = StillImage {
            jpeg: vec![0xFF, 0xD8, 0xFF],
            width: 4,
            height: 3,
        };
        let json = serde_json::to_value(&still).unwrap();
        assert_eq!(json["jpeg"], "/9j/");
        assert_eq!(json["width"], 4);

        let back: StillImage = serde_json::from_value(json).unwrap();
        assert_eq!(back, still);
    }
}
