//! Encoder argument resolution.
//!
//! Operator settings arrive as strings. They are resolved once into typed
//! selectors, with logged substitutions for anything unrecognised, and the
//! selectors index a fixed argument table.

use crate::config::EncodingConfig;
use std::fmt;
use tracing::warn;

/// Hardware encoder vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwVendor {
    Nvidia,
    Intel,
}

impl HwVendor {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "nvidia" => Some(HwVendor::Nvidia),
            "intel" => Some(HwVendor::Intel),
            _ => None,
        }
    }
}

/// Output video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Av1,
    Hevc,
    H264,
}

impl Codec {
    /// Substituted for unrecognised codec names.
    pub const FALLBACK: Codec = Codec::Av1;

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "av1" => Some(Codec::Av1),
            "hevc" | "h265" | "x265" => Some(Codec::Hevc),
            "h264" | "avc" | "x264" => Some(Codec::H264),
            _ => None,
        }
    }
}

/// Named encoding strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl QualityTier {
    /// Substituted for unrecognised tier names.
    pub const FALLBACK: QualityTier = QualityTier::Low;

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Some(QualityTier::Low),
            "MEDIUM" => Some(QualityTier::Medium),
            "HIGH" => Some(QualityTier::High),
            _ => None,
        }
    }
}

/// Which branch of the table an encode runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderBackend {
    Hardware(HwVendor),
    Software,
}

/// Fully resolved encoder selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityProfile {
    pub backend: EncoderBackend,
    pub codec: Codec,
    pub tier: QualityTier,
}

impl QualityProfile {
    /// Resolve operator settings, logging every substitution.
    ///
    /// - unknown vendor: hardware acceleration is disabled
    /// - unknown codec: [`Codec::FALLBACK`]
    /// - unknown tier: [`QualityTier::FALLBACK`]
    pub fn resolve(cfg: &EncodingConfig) -> Self {
        let codec = Codec::parse(&cfg.encoding_codec).unwrap_or_else(|| {
            warn!(
                codec = %cfg.encoding_codec,
                fallback = ?Codec::FALLBACK,
                "unsupported codec, using fallback"
            );
            Codec::FALLBACK
        });

        let tier = QualityTier::parse(&cfg.encoding_quality).unwrap_or_else(|| {
            warn!(
                quality = %cfg.encoding_quality,
                fallback = ?QualityTier::FALLBACK,
                "unsupported quality tier, using fallback"
            );
            QualityTier::FALLBACK
        });

        let backend = if cfg.enable_hw_accel {
            match HwVendor::parse(&cfg.hw_encoding_type) {
                Some(vendor) => EncoderBackend::Hardware(vendor),
                None => {
                    warn!(
                        vendor = %cfg.hw_encoding_type,
                        "unsupported hardware vendor, falling back to software encoding"
                    );
                    EncoderBackend::Software
                }
            }
        } else {
            EncoderBackend::Software
        };

        Self {
            backend,
            codec,
            tier,
        }
    }

    pub fn hardware_active(&self) -> bool {
        matches!(self.backend, EncoderBackend::Hardware(_))
    }

    /// Look up the argument set for this profile.
    pub fn encoder_args(&self, target_height: u32) -> EncoderArgs {
        let q = quality_value(self.codec, self.tier).to_string();
        let h = target_height;

        match self.backend {
            EncoderBackend::Hardware(HwVendor::Nvidia) => EncoderArgs {
                input_args: args(&["-hwaccel", "cuda", "-hwaccel_output_format", "cuda"]),
                video_filter: format!("scale_cuda=-2:{}", h),
                video_codec: match self.codec {
                    Codec::Av1 => "av1_nvenc",
                    Codec::Hevc => "hevc_nvenc",
                    Codec::H264 => "h264_nvenc",
                }
                .to_string(),
                quality_args: args(&["-rc", "vbr", "-cq", q.as_str(), "-b:v", "0"]),
            },
            EncoderBackend::Hardware(HwVendor::Intel) => EncoderArgs {
                input_args: args(&[
                    "-hwaccel",
                    "vaapi",
                    "-vaapi_device",
                    "/dev/dri/renderD128",
                ]),
                video_filter: format!("format=nv12,hwupload,scale_vaapi=-2:{}", h),
                video_codec: match self.codec {
                    Codec::Av1 => "av1_vaapi",
                    Codec::Hevc => "hevc_vaapi",
                    Codec::H264 => "h264_vaapi",
                }
                .to_string(),
                quality_args: args(&["-b:v", "0", "-qp", q.as_str()]),
            },
            EncoderBackend::Software => EncoderArgs {
                input_args: Vec::new(),
                video_filter: format!("scale=-2:{}", h),
                video_codec: match self.codec {
                    Codec::Av1 => "libaom-av1",
                    Codec::Hevc => "libx265",
                    Codec::H264 => "libx264",
                }
                .to_string(),
                quality_args: args(&["-crf", q.as_str(), "-b:v", "0"]),
            },
        }
    }
}

impl fmt::Display for QualityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backend = match self.backend {
            EncoderBackend::Hardware(HwVendor::Nvidia) => "nvidia",
            EncoderBackend::Hardware(HwVendor::Intel) => "intel",
            EncoderBackend::Software => "software",
        };
        write!(f, "{}/{:?}/{:?}", backend, self.codec, self.tier)
    }
}

/// Constant-quality value per codec and tier; lower is better.
///
/// The same value feeds `-cq`, `-qp` or `-crf` depending on the backend.
pub fn quality_value(codec: Codec, tier: QualityTier) -> u32 {
    match (codec, tier) {
        (Codec::Av1, QualityTier::High) => 20,
        (Codec::Av1, QualityTier::Medium) => 30,
        (Codec::Av1, QualityTier::Low) => 40,
        (Codec::Hevc, QualityTier::High) => 20,
        (Codec::Hevc, QualityTier::Medium) => 24,
        (Codec::Hevc, QualityTier::Low) => 28,
        (Codec::H264, QualityTier::High) => 18,
        (Codec::H264, QualityTier::Medium) => 22,
        (Codec::H264, QualityTier::Low) => 26,
    }
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Concrete encoder arguments for one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderArgs {
    /// Placed before `-i`.
    pub input_args: Vec<String>,
    /// `-vf` value, including the rescale.
    pub video_filter: String,
    /// `-c:v` value.
    pub video_codec: String,
    pub quality_args: Vec<String>,
}

impl EncoderArgs {
    /// Every argument this set contributes, for flag auditing.
    pub fn all_args(&self) -> Vec<&str> {
        self.input_args
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.video_filter.as_str()))
            .chain(std::iter::once(self.video_codec.as_str()))
            .chain(self.quality_args.iter().map(String::as_str))
            .collect()
    }
}
