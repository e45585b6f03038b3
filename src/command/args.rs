//! Shared argument logic & interactive prompts.
//!
//! Options missing from the command line are asked on stdin/stdout with a
//! default accepted on empty input. Prompts are skipped with `-y` or when
//! stdin isn't attended.
use crate::{
    capability::CapabilityReport,
    params::{Codec, QualityTier},
};
use clap::Parser;
use console::Term;

pub const DEFAULT_MAX_WIDTH: u32 = 1920;
const DEFAULT_CODEC: Codec = Codec::Hevc;
const DEFAULT_TIER: u8 = 2;

/// Compression options. Options not given are asked interactively.
#[derive(Parser, Clone)]
pub struct Encode {
    /// Video codec to encode with.
    #[arg(long, value_enum)]
    pub codec: Option<Codec>,

    /// Quality tier: 1 smallest, 2 balanced, 3 highest.
    ///
    /// Values outside 1-3 mean balanced.
    #[arg(long)]
    pub quality: Option<u8>,

    /// Maximum output width. Wider inputs are downscaled to fit,
    /// preserving aspect ratio.
    #[arg(long)]
    pub max_width: Option<u32>,

    /// Prefer nvenc hardware encoding.
    #[arg(long, conflicts_with = "no_hw")]
    pub hw: bool,

    /// Never attempt hardware encoding.
    #[arg(long)]
    pub no_hw: bool,

    /// Drop audio streams instead of copying them.
    #[arg(long)]
    pub drop_audio: bool,

    /// Accept the default answer for every prompt.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Fully resolved run settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub tier: QualityTier,
    pub codec: Codec,
    pub use_hardware: bool,
    pub max_width: u32,
    pub drop_audio: bool,
}

impl Encode {
    pub fn to_settings(&self, caps: &CapabilityReport) -> anyhow::Result<Settings> {
        if self.yes || !console::user_attended() {
            return Ok(self.default_settings(caps));
        }

        let term = Term::stdout();

        let use_hardware = match (self.hw, self.no_hw) {
            (true, _) => true,
            (_, true) => false,
            // pointless question without a usable gpu
            _ if !caps.hardware_available => false,
            _ => prompt_yes_no(&term, "Use hardware acceleration (nvenc)?", true)?,
        };

        let codec = match self.codec {
            Some(codec) => codec,
            None => prompt_codec(&term, DEFAULT_CODEC)?,
        };

        let tier = QualityTier::from_ordinal(match self.quality {
            Some(n) => n,
            None => prompt_number(
                &term,
                "Quality: 1) smallest  2) balanced  3) highest",
                u32::from(DEFAULT_TIER),
            )? as u8,
        });

        let max_width = match self.max_width {
            Some(w) => w,
            None => prompt_number(&term, "Maximum output width", DEFAULT_MAX_WIDTH)?,
        };

        Ok(Settings {
            tier,
            codec,
            use_hardware,
            max_width,
            drop_audio: self.drop_audio,
        })
    }

    /// Settings without prompting: cli values, defaults for the rest.
    fn default_settings(&self, caps: &CapabilityReport) -> Settings {
        Settings {
            tier: QualityTier::from_ordinal(self.quality.unwrap_or(DEFAULT_TIER)),
            codec: self.codec.unwrap_or(DEFAULT_CODEC),
            use_hardware: match (self.hw, self.no_hw) {
                (true, _) => true,
                (_, true) => false,
                _ => caps.hardware_available,
            },
            max_width: self.max_width.unwrap_or(DEFAULT_MAX_WIDTH),
            drop_audio: self.drop_audio,
        }
    }
}

fn prompt_yes_no(term: &Term, question: &str, default: bool) -> anyhow::Result<bool> {
    let hint = match default {
        true => "Y/n",
        false => "y/N",
    };
    loop {
        term.write_str(&format!("{question} [{hint}] "))?;
        match term.read_line()?.trim().to_ascii_lowercase().as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => term.write_line("Please answer y or n.")?,
        }
    }
}

fn prompt_codec(term: &Term, default: Codec) -> anyhow::Result<Codec> {
    loop {
        term.write_str("Codec: 1) h264 (most compatible)  2) hevc (smaller) [2] ")?;
        match term.read_line()?.trim() {
            "" => return Ok(default),
            "1" => return Ok(Codec::H264),
            "2" => return Ok(Codec::Hevc),
            _ => term.write_line("Please answer 1 or 2.")?,
        }
    }
}

fn prompt_number(term: &Term, question: &str, default: u32) -> anyhow::Result<u32> {
    loop {
        term.write_str(&format!("{question} [{default}] "))?;
        let line = term.read_line()?;
        let line = line.trim();
        if line.is_empty() {
            return Ok(default);
        }
        match line.parse() {
            Ok(n) => return Ok(n),
            Err(_) => term.write_line("Please enter a number.")?,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn bare_args() -> Encode {
        Encode {
            codec: None,
            quality: None,
            max_width: None,
            hw: false,
            no_hw: false,
            drop_audio: false,
            yes: true,
        }
    }

    #[test]
    fn defaults_without_hardware() {
        let settings = bare_args().default_settings(&CapabilityReport::none());
        assert_eq!(
            settings,
            Settings {
                tier: QualityTier::Balanced,
                codec: Codec::Hevc,
                use_hardware: false,
                max_width: 1920,
                drop_audio: false,
            }
        );
    }

    #[test]
    fn defaults_use_available_hardware() {
        let caps = CapabilityReport {
            hardware_available: true,
            ..CapabilityReport::none()
        };
        assert!(bare_args().default_settings(&caps).use_hardware);

        let no_hw = Encode {
            no_hw: true,
            ..bare_args()
        };
        assert!(!no_hw.default_settings(&caps).use_hardware);
    }

    #[test]
    fn hw_flag_requests_hardware_even_when_unavailable() {
        // the orchestrator decides whether a hardware attempt actually runs
        let args = Encode {
            hw: true,
            ..bare_args()
        };
        assert!(args.default_settings(&CapabilityReport::none()).use_hardware);
    }

    #[test]
    fn out_of_range_quality_is_balanced() {
        let args = Encode {
            quality: Some(9),
            ..bare_args()
        };
        let settings = args.default_settings(&CapabilityReport::none());
        assert_eq!(settings.tier, QualityTier::Balanced);
    }
}
