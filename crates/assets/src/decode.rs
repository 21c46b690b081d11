//! Per-category decoders.
//!
//! Decoding is limited to what a module needs to use a resource: images are
//! decoded far enough to know their dimensions, binary media is identified
//! by its magic bytes and kept as a raw buffer, data files are parsed.

use bytes::Bytes;
use image::GenericImageView;
use serde::Serialize;
use serde_json::Value;

use playgate_core::{AssetCategory, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioContainer {
    Wav,
    Ogg,
    Mp3,
    Flac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// JSON glTF.
    Gltf,
    /// Binary glTF.
    Glb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FontFormat {
    Ttf,
    Otf,
    Woff,
    Woff2,
}

/// A decoded bundle resource, ready to hand to a module.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Image {
        width: u32,
        height: u32,
        format: String,
        bytes: Bytes,
    },
    Audio {
        container: AudioContainer,
        bytes: Bytes,
    },
    Model {
        format: ModelFormat,
        bytes: Bytes,
    },
    Font {
        format: FontFormat,
        bytes: Bytes,
    },
    Data(Value),
}

impl Resource {
    pub fn category(&self) -> AssetCategory {
        match self {
            Self::Image { .. } => AssetCategory::Image,
            Self::Audio { .. } => AssetCategory::Audio,
            Self::Model { .. } => AssetCategory::Model,
            Self::Font { .. } => AssetCategory::Font,
            Self::Data(_) => AssetCategory::Data,
        }
    }
}

/// Decode `bytes` as a resource of `category`.
pub fn decode(category: AssetCategory, bytes: Bytes) -> Result<Resource> {
    match category {
        AssetCategory::Image => decode_image(bytes),
        AssetCategory::Audio => {
            let container = sniff_audio(&bytes)
                .ok_or_else(|| Error::asset("audio container not recognized"))?;
            Ok(Resource::Audio { container, bytes })
        }
        AssetCategory::Model => {
            let format = sniff_model(&bytes)
                .ok_or_else(|| Error::asset("model is neither glTF JSON nor GLB"))?;
            Ok(Resource::Model { format, bytes })
        }
        AssetCategory::Font => {
            let format =
                sniff_font(&bytes).ok_or_else(|| Error::asset("font format not recognized"))?;
            Ok(Resource::Font { format, bytes })
        }
        AssetCategory::Data => serde_json::from_slice(&bytes)
            .map(Resource::Data)
            .map_err(|e| Error::asset(format!("data file is not valid JSON: {}", e))),
    }
}

fn decode_image(bytes: Bytes) -> Result<Resource> {
    let format = image::guess_format(&bytes)
        .map_err(|e| Error::asset(format!("image format not recognized: {}", e)))?;
    let img = image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| Error::asset(format!("image does not decode: {}", e)))?;
    let (width, height) = img.dimensions();
    Ok(Resource::Image {
        width,
        height,
        format: format!("{:?}", format).to_lowercase(),
        bytes,
    })
}

pub fn sniff_audio(bytes: &[u8]) -> Option<AudioContainer> {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        return Some(AudioContainer::Wav);
    }
    if bytes.starts_with(b"OggS") {
        return Some(AudioContainer::Ogg);
    }
    if bytes.starts_with(b"fLaC") {
        return Some(AudioContainer::Flac);
    }
    // ID3 tag or a bare MPEG frame sync.
    if bytes.starts_with(b"ID3") || (bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0)
    {
        return Some(AudioContainer::Mp3);
    }
    None
}

pub fn sniff_model(bytes: &[u8]) -> Option<ModelFormat> {
    if bytes.starts_with(b"glTF") {
        return Some(ModelFormat::Glb);
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) if map.get("asset").is_some_and(Value::is_object) => {
            Some(ModelFormat::Gltf)
        }
        _ => None,
    }
}

pub fn sniff_font(bytes: &[u8]) -> Option<FontFormat> {
    match bytes.get(0..4)? {
        &[0x00, 0x01, 0x00, 0x00] | b"true" => Some(FontFormat::Ttf),
        b"OTTO" => Some(FontFormat::Otf),
        b"wOFF" => Some(FontFormat::Woff),
        b"wOF2" => Some(FontFormat::Woff2),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_decode_image_dimensions() {
        let img = image::RgbaImage::new(32, 16);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();

        let res = decode(AssetCategory::Image, Bytes::from(out.into_inner())).unwrap();
        match res {
            Resource::Image {
                width,
                height,
                format,
                ..
            } => {
                assert_eq!((width, height), (32, 16));
                assert_eq!(format, "png");
            }
            other => panic!("unexpected resource {:?}", other),
        }
    }

    #[test]
    fn test_sniffers() {
        assert_eq!(sniff_audio(b"RIFF\0\0\0\0WAVEfmt "), Some(AudioContainer::Wav));
        assert_eq!(sniff_audio(b"OggS\0\x02"), Some(AudioContainer::Ogg));
        assert_eq!(sniff_audio(&[0xFF, 0xFB, 0x90]), Some(AudioContainer::Mp3));
        assert_eq!(sniff_audio(b"hello"), None);

        assert_eq!(sniff_model(b"glTF\x02\0\0\0"), Some(ModelFormat::Glb));
        assert_eq!(
            sniff_model(br#"{"asset": {"version": "2.0"}}"#),
            Some(ModelFormat::Gltf)
        );
        assert_eq!(sniff_model(br#"{"meshes": []}"#), None);

        assert_eq!(sniff_font(b"wOF2...."), Some(FontFormat::Woff2));
        assert_eq!(sniff_font(&[0, 1, 0, 0, 9]), Some(FontFormat::Ttf));
        assert_eq!(sniff_font(b"ab"), None);
    }

    #[test]
    fn test_decode_data_and_failures() {
        let res = decode(AssetCategory::Data, Bytes::from_static(br#"{"level": 3}"#)).unwrap();
        assert_eq!(res, Resource::Data(serde_json::json!({"level": 3})));
        assert_eq!(res.category(), AssetCategory::Data);

        assert!(decode(AssetCategory::Data, Bytes::from_static(b"{oops")).is_err());
        assert!(decode(AssetCategory::Audio, Bytes::from_static(b"????")).is_err());
    }
}
