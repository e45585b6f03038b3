//! Encoding parameter resolution.
//!
//! One canonical table mapping (quality tier, codec, execution mode) to
//! encoder knobs. Tune/multipass refinements and extended reference frames
//! are layered on afterwards from the capability report, they are not a
//! separate table.
use crate::capability::{CapabilityReport, GpuClass};
use std::fmt;

/// User-selected quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    Smallest,
    Balanced,
    Highest,
}

impl QualityTier {
    /// Map a raw tier number to a tier. Out-of-range values mean "balanced"
    /// rather than an error.
    pub fn from_ordinal(n: u8) -> Self {
        match n {
            1 => Self::Smallest,
            3 => Self::Highest,
            _ => Self::Balanced,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Smallest => "smallest",
            Self::Balanced => "balanced",
            Self::Highest => "highest",
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[clap(rename_all = "lower")]
pub enum Codec {
    H264,
    Hevc,
}

impl Codec {
    /// ffmpeg vcodec name for the given execution mode.
    pub fn vcodec(self, mode: ExecutionMode) -> &'static str {
        match (self, mode) {
            (Self::H264, ExecutionMode::Hardware) => "h264_nvenc",
            (Self::H264, ExecutionMode::Software) => "libx264",
            (Self::Hevc, ExecutionMode::Hardware) => "hevc_nvenc",
            (Self::Hevc, ExecutionMode::Software) => "libx265",
        }
    }

    /// The codec to substitute when this one is unsupported in hardware.
    pub fn alternate(self) -> Self {
        match self {
            Self::H264 => Self::Hevc,
            Self::Hevc => Self::H264,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => "h264".fmt(f),
            Self::Hevc => "hevc".fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Hardware,
    Software,
}

impl ExecutionMode {
    pub fn is_hardware(self) -> bool {
        matches!(self, Self::Hardware)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Hardware => "hardware",
            Self::Software => "software",
        }
    }
}

/// Encoder rate-control strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateControl {
    /// nvenc variable bitrate capped by `-cq`.
    Vbr,
    /// Software constant-quality `-crf`.
    ConstantQuality,
}

impl RateControl {
    /// Arg to pass the quality value with.
    pub fn quality_arg(self) -> &'static str {
        match self {
            Self::Vbr => "-cq",
            Self::ConstantQuality => "-crf",
        }
    }
}

/// Fully resolved encoder knobs for one encode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingParameters {
    pub quality: u8,
    pub preset: &'static str,
    pub rate_control: RateControl,
    pub tune: Option<&'static str>,
    pub multipass: Option<u8>,
    pub profile: &'static str,
    pub b_frames: Option<u8>,
    pub reference_frames: Option<u8>,
    pub codec_tag: Option<&'static str>,
}

/// Resolve encoder parameters for a tier/codec/mode.
///
/// Always returns a complete parameter set. Optional refinements are only
/// populated when the capability report allows them.
pub fn resolve(
    tier: QualityTier,
    codec: Codec,
    mode: ExecutionMode,
    caps: &CapabilityReport,
) -> EncodingParameters {
    let mut params = base(tier, codec, mode);

    if mode.is_hardware() {
        if caps.driver_advanced_features {
            params.tune = Some("hq");
            params.multipass = Some(2);
        }
        if caps.gpu_class == GpuClass::Extended {
            params.b_frames = Some(3);
            params.reference_frames = Some(4);
        }
    }

    params
}

/// The static table. Pure, no capability input.
fn base(tier: QualityTier, codec: Codec, mode: ExecutionMode) -> EncodingParameters {
    use Codec::*;
    use ExecutionMode::*;
    use QualityTier::*;

    let (quality, preset) = match (tier, codec, mode) {
        (Smallest, H264, Hardware) => (33, "p6"),
        (Balanced, H264, Hardware) => (28, "p5"),
        (Highest, H264, Hardware) => (23, "p4"),
        (Smallest, Hevc, Hardware) => (32, "p6"),
        (Balanced, Hevc, Hardware) => (30, "p5"),
        (Highest, Hevc, Hardware) => (26, "p4"),
        (Smallest, H264, Software) => (30, "veryfast"),
        (Balanced, H264, Software) => (26, "medium"),
        (Highest, H264, Software) => (22, "slow"),
        (Smallest, Hevc, Software) => (30, "veryfast"),
        (Balanced, Hevc, Software) => (28, "medium"),
        (Highest, Hevc, Software) => (24, "slow"),
    };

    EncodingParameters {
        quality,
        preset,
        rate_control: match mode {
            Hardware => RateControl::Vbr,
            Software => RateControl::ConstantQuality,
        },
        tune: None,
        multipass: None,
        profile: match codec {
            H264 => "high",
            // hevc "main" works across nvenc & x265
            Hevc => "main",
        },
        b_frames: None,
        reference_frames: None,
        // mp4 players want hvc1 tagged hevc
        codec_tag: match codec {
            Hevc => Some("hvc1"),
            H264 => None,
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::capability::CapabilityReport;

    #[test]
    fn out_of_range_tiers_resolve_balanced() {
        for n in [0, 4, 5, 42, u8::MAX] {
            assert_eq!(QualityTier::from_ordinal(n), QualityTier::Balanced, "{n}");
        }
        assert_eq!(QualityTier::from_ordinal(1), QualityTier::Smallest);
        assert_eq!(QualityTier::from_ordinal(2), QualityTier::Balanced);
        assert_eq!(QualityTier::from_ordinal(3), QualityTier::Highest);
    }

    #[test]
    fn resolved_params_are_complete() {
        let caps = CapabilityReport::none();
        for tier in [
            QualityTier::Smallest,
            QualityTier::Balanced,
            QualityTier::Highest,
        ] {
            for codec in [Codec::H264, Codec::Hevc] {
                for mode in [ExecutionMode::Hardware, ExecutionMode::Software] {
                    let p = resolve(tier, codec, mode, &caps);
                    assert!(p.quality > 0);
                    assert!(!p.preset.is_empty());
                    assert!(!p.profile.is_empty());
                }
            }
        }
    }

    #[test]
    fn quality_orders_by_tier() {
        // lower quality value = better quality for cq & crf alike
        let caps = CapabilityReport::none();
        for codec in [Codec::H264, Codec::Hevc] {
            for mode in [ExecutionMode::Hardware, ExecutionMode::Software] {
                let smallest = resolve(QualityTier::Smallest, codec, mode, &caps);
                let balanced = resolve(QualityTier::Balanced, codec, mode, &caps);
                let highest = resolve(QualityTier::Highest, codec, mode, &caps);
                assert!(smallest.quality > balanced.quality);
                assert!(balanced.quality > highest.quality);
            }
        }
    }

    #[test]
    fn refinements_follow_capabilities() {
        let mut caps = CapabilityReport::none();
        let p = resolve(
            QualityTier::Balanced,
            Codec::Hevc,
            ExecutionMode::Hardware,
            &caps,
        );
        assert_eq!(p.tune, None);
        assert_eq!(p.multipass, None);
        assert_eq!(p.b_frames, None);

        caps.driver_advanced_features = true;
        caps.gpu_class = GpuClass::Extended;
        let p = resolve(
            QualityTier::Balanced,
            Codec::Hevc,
            ExecutionMode::Hardware,
            &caps,
        );
        assert_eq!(p.tune, Some("hq"));
        assert_eq!(p.multipass, Some(2));
        assert_eq!(p.b_frames, Some(3));
        assert_eq!(p.reference_frames, Some(4));

        // software encodes never pick up nvenc refinements
        let p = resolve(
            QualityTier::Balanced,
            Codec::Hevc,
            ExecutionMode::Software,
            &caps,
        );
        assert_eq!(p.tune, None);
        assert_eq!(p.multipass, None);
    }

    #[test]
    fn hevc_is_tagged_for_mp4() {
        let caps = CapabilityReport::none();
        for mode in [ExecutionMode::Hardware, ExecutionMode::Software] {
            let p = resolve(QualityTier::Balanced, Codec::Hevc, mode, &caps);
            assert_eq!(p.codec_tag, Some("hvc1"));
            let p = resolve(QualityTier::Balanced, Codec::H264, mode, &caps);
            assert_eq!(p.codec_tag, None);
        }
    }
}
