//! Encoder settings variants.
//!
//! The queue file stores the encoder settings as a flat object whose `name`
//! field selects the variant. The set of variants is closed: an unknown name
//! fails to decode instead of falling back to a default encoder.

use serde::{Deserialize, Serialize};

/// Encoder-specific settings, discriminated by the stored `name` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum EncoderSettings {
    #[serde(rename = "HEVC (x265)")]
    X265(X265Settings),
    #[serde(rename = "AVC (x264)")]
    X264(X264Settings),
    #[serde(rename = "AV1 (SVT AV1)")]
    SvtAv1(SvtAv1Settings),
    #[serde(rename = "AV1 (AOM)")]
    AomAv1(AomAv1Settings),
    #[serde(rename = "AV1 (rav1e)")]
    Rav1e(Rav1eSettings),
    #[serde(rename = "VP9")]
    Vp9(Vp9Settings),
    #[serde(rename = "VVC")]
    Vvc(VvcSettings),
    #[serde(rename = "HEVC (NVEncC)")]
    NvencHevc(NvencHevcSettings),
    #[serde(rename = "GIF")]
    Gif(GifSettings),
    #[serde(rename = "Copy")]
    Copy(CopySettings),
}

impl EncoderSettings {
    /// Every tag the queue file may carry in `name`.
    pub const NAMES: &'static [&'static str] = &[
        "HEVC (x265)",
        "AVC (x264)",
        "AV1 (SVT AV1)",
        "AV1 (AOM)",
        "AV1 (rav1e)",
        "VP9",
        "VVC",
        "HEVC (NVEncC)",
        "GIF",
        "Copy",
    ];

    /// The discriminator tag stored in the queue file.
    pub fn name(&self) -> &'static str {
        match self {
            EncoderSettings::X265(_) => "HEVC (x265)",
            EncoderSettings::X264(_) => "AVC (x264)",
            EncoderSettings::SvtAv1(_) => "AV1 (SVT AV1)",
            EncoderSettings::AomAv1(_) => "AV1 (AOM)",
            EncoderSettings::Rav1e(_) => "AV1 (rav1e)",
            EncoderSettings::Vp9(_) => "VP9",
            EncoderSettings::Vvc(_) => "VVC",
            EncoderSettings::NvencHevc(_) => "HEVC (NVEncC)",
            EncoderSettings::Gif(_) => "GIF",
            EncoderSettings::Copy(_) => "Copy",
        }
    }

    /// Path of the HDR10+ metadata sidecar, for encoders that take one.
    pub fn hdr10plus_metadata(&self) -> Option<&str> {
        let metadata = match self {
            EncoderSettings::X265(s) => s.hdr10plus_metadata.as_deref(),
            EncoderSettings::SvtAv1(s) => s.hdr10plus_metadata.as_deref(),
            EncoderSettings::AomAv1(s) => s.hdr10plus_metadata.as_deref(),
            EncoderSettings::NvencHevc(s) => s.hdr10plus_metadata.as_deref(),
            _ => None,
        };
        metadata.filter(|m| !m.is_empty())
    }

    /// Replace (or drop, with `None`) the HDR10+ metadata reference.
    ///
    /// Has no effect on encoders without HDR10+ support.
    pub fn set_hdr10plus_metadata(&mut self, metadata: Option<String>) {
        match self {
            EncoderSettings::X265(s) => s.hdr10plus_metadata = metadata,
            EncoderSettings::SvtAv1(s) => s.hdr10plus_metadata = metadata,
            EncoderSettings::AomAv1(s) => s.hdr10plus_metadata = metadata,
            EncoderSettings::NvencHevc(s) => s.hdr10plus_metadata = metadata,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct X265Settings {
    pub crf: Option<f32>,
    pub bitrate: Option<String>,
    pub preset: String,
    pub profile: String,
    pub tune: String,
    pub pix_fmt: String,
    pub hdr10: bool,
    pub hdr10_opt: bool,
    pub repeat_headers: bool,
    pub aq_mode: u8,
    pub bframes: u8,
    pub hdr10plus_metadata: Option<String>,
    pub x265_params: Vec<String>,
}

impl Default for X265Settings {
    fn default() -> Self {
        Self {
            crf: Some(22.0),
            bitrate: None,
            preset: "medium".into(),
            profile: "default".into(),
            tune: "default".into(),
            pix_fmt: "yuv420p10le".into(),
            hdr10: false,
            hdr10_opt: false,
            repeat_headers: false,
            aq_mode: 2,
            bframes: 4,
            hdr10plus_metadata: None,
            x265_params: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct X264Settings {
    pub crf: Option<f32>,
    pub bitrate: Option<String>,
    pub preset: String,
    pub profile: String,
    pub tune: Option<String>,
    pub pix_fmt: String,
}

impl Default for X264Settings {
    fn default() -> Self {
        Self {
            crf: Some(23.0),
            bitrate: None,
            preset: "medium".into(),
            profile: "default".into(),
            tune: None,
            pix_fmt: "yuv420p".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvtAv1Settings {
    pub qp: Option<f32>,
    pub bitrate: Option<String>,
    pub speed: String,
    pub tile_columns: String,
    pub tile_rows: String,
    pub film_grain: u8,
    pub pix_fmt: String,
    pub hdr10plus_metadata: Option<String>,
}

impl Default for SvtAv1Settings {
    fn default() -> Self {
        Self {
            qp: Some(24.0),
            bitrate: None,
            speed: "7".into(),
            tile_columns: "-1".into(),
            tile_rows: "-1".into(),
            film_grain: 0,
            pix_fmt: "yuv420p10le".into(),
            hdr10plus_metadata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AomAv1Settings {
    pub crf: Option<f32>,
    pub bitrate: Option<String>,
    pub cpu_used: String,
    pub row_mt: String,
    pub usage: String,
    pub pix_fmt: String,
    pub hdr10plus_metadata: Option<String>,
}

impl Default for AomAv1Settings {
    fn default() -> Self {
        Self {
            crf: Some(26.0),
            bitrate: None,
            cpu_used: "4".into(),
            row_mt: "default".into(),
            usage: "good".into(),
            pix_fmt: "yuv420p10le".into(),
            hdr10plus_metadata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rav1eSettings {
    pub qp: Option<f32>,
    pub bitrate: Option<String>,
    pub speed: String,
    pub tiles: String,
    pub pix_fmt: String,
}

impl Default for Rav1eSettings {
    fn default() -> Self {
        Self {
            qp: Some(24.0),
            bitrate: None,
            speed: "-1".into(),
            tiles: "0".into(),
            pix_fmt: "yuv420p10le".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vp9Settings {
    pub crf: Option<f32>,
    pub bitrate: Option<String>,
    pub quality: String,
    pub speed: String,
    pub row_mt: bool,
    pub single_pass: bool,
    pub pix_fmt: String,
}

impl Default for Vp9Settings {
    fn default() -> Self {
        Self {
            crf: Some(31.0),
            bitrate: None,
            quality: "good".into(),
            speed: "0".into(),
            row_mt: false,
            single_pass: false,
            pix_fmt: "yuv420p10le".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VvcSettings {
    pub qp: Option<f32>,
    pub bitrate: Option<String>,
    pub preset: String,
    pub tier: String,
    pub pix_fmt: String,
}

impl Default for VvcSettings {
    fn default() -> Self {
        Self {
            qp: Some(32.0),
            bitrate: None,
            preset: "medium".into(),
            tier: "main".into(),
            pix_fmt: "yuv420p10le".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NvencHevcSettings {
    pub cqp: Option<String>,
    pub bitrate: Option<String>,
    pub preset: String,
    pub profile: String,
    pub multipass: String,
    pub device: i32,
    pub hdr10plus_metadata: Option<String>,
}

impl Default for NvencHevcSettings {
    fn default() -> Self {
        Self {
            cqp: None,
            bitrate: Some("5000k".into()),
            preset: "quality".into(),
            profile: "main".into(),
            multipass: "2pass-full".into(),
            device: -1,
            hdr10plus_metadata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GifSettings {
    pub fps: u32,
    pub dither: String,
}

impl Default for GifSettings {
    fn default() -> Self {
        Self {
            fps: 15,
            dither: "sierra2_4a".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CopySettings {}
