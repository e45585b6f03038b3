//! Hardware capability probing.
//!
//! Queries `nvidia-smi` for GPU presence & driver version and ffmpeg for its
//! compiled-in nvenc encoders. Every failure mode collapses to the
//! conservative "no hardware" report, callers treat absence the same as
//! denial.
use crate::params::Codec;
use log::{debug, info};
use tokio::process::Command;

/// Minimum driver major version for nvenc `-tune`/`-multipass` rate-control.
const ADVANCED_DRIVER_MAJOR: u32 = 445;

/// Coarse per-model capability class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuClass {
    /// Unrecognized model, assume baseline nvenc only.
    #[default]
    Minimal,
    /// Turing or newer, supports extended reference frames & 10-bit depth.
    Extended,
}

/// Snapshot of what the current environment supports, probed once per run.
#[derive(Debug, Clone, Default)]
pub struct CapabilityReport {
    pub hardware_available: bool,
    pub supports_h264: bool,
    pub supports_hevc: bool,
    pub driver_advanced_features: bool,
    pub gpu_class: GpuClass,
    pub gpu_model: Option<String>,
    pub driver_version: Option<String>,
}

impl CapabilityReport {
    /// The conservative report: nothing available.
    pub fn none() -> Self {
        <_>::default()
    }

    pub fn supports(&self, codec: Codec) -> bool {
        match codec {
            Codec::H264 => self.supports_h264,
            Codec::Hevc => self.supports_hevc,
        }
    }
}

/// Probe the environment. Never fails, missing tools mean a [`CapabilityReport::none`].
pub async fn probe() -> CapabilityReport {
    let Some((model, driver)) = query_nvidia_smi().await else {
        debug!("nvidia-smi unavailable, hardware encoding disabled");
        return CapabilityReport::none();
    };

    let encoders = query_ffmpeg_encoders().await.unwrap_or_default();
    let supports_h264 = encoders.contains("h264_nvenc");
    let supports_hevc = encoders.contains("hevc_nvenc");

    let report = CapabilityReport {
        hardware_available: supports_h264 || supports_hevc,
        supports_h264,
        supports_hevc,
        driver_advanced_features: driver_supports_advanced(&driver),
        gpu_class: classify_gpu_model(&model),
        gpu_model: Some(model),
        driver_version: Some(driver),
    };
    info!(
        "gpu {:?} driver {:?}: h264_nvenc={} hevc_nvenc={} advanced={}",
        report.gpu_model.as_deref().unwrap_or("?"),
        report.driver_version.as_deref().unwrap_or("?"),
        report.supports_h264,
        report.supports_hevc,
        report.driver_advanced_features,
    );
    report
}

/// `nvidia-smi --query-gpu=name,driver_version --format=csv,noheader`
/// -> (model, driver version) of the first GPU.
async fn query_nvidia_smi() -> Option<(String, String)> {
    let out = Command::new("nvidia-smi")
        .arg("--query-gpu=name,driver_version")
        .arg("--format=csv,noheader")
        .output()
        .await
        .ok()?;
    if !out.status.success() {
        return None;
    }
    parse_smi_line(&String::from_utf8_lossy(&out.stdout))
}

/// Parse the first `name, driver_version` csv line.
fn parse_smi_line(stdout: &str) -> Option<(String, String)> {
    let line = stdout.lines().next()?;
    let (model, driver) = line.rsplit_once(',')?;
    let (model, driver) = (model.trim(), driver.trim());
    if model.is_empty() || driver.is_empty() {
        return None;
    }
    Some((model.to_owned(), driver.to_owned()))
}

async fn query_ffmpeg_encoders() -> Option<String> {
    let out = Command::new("ffmpeg")
        .arg("-hide_banner")
        .arg("-encoders")
        .output()
        .await
        .ok()?;
    match out.status.success() {
        true => Some(String::from_utf8_lossy(&out.stdout).into_owned()),
        false => None,
    }
}

/// Match the model string against known family names. Unrecognized models
/// get the minimal class.
fn classify_gpu_model(model: &str) -> GpuClass {
    let model = model.to_ascii_lowercase();
    const EXTENDED_FAMILIES: &[&str] = &[
        "rtx 20", "rtx 30", "rtx 40", "rtx 50", "gtx 16", "quadro rtx", "rtx a", "tesla t4", "a2",
        "a10", "a16", "a30", "a40", "l4", "l40",
    ];
    match EXTENDED_FAMILIES.iter().any(|f| model.contains(f)) {
        true => GpuClass::Extended,
        false => GpuClass::Minimal,
    }
}

/// Driver `major.minor[.patch]` strings at or above
/// [`ADVANCED_DRIVER_MAJOR`] carry the newer rate-control knobs.
fn driver_supports_advanced(driver_version: &str) -> bool {
    let major = driver_version.split('.').next().unwrap_or_default();
    matches!(major.parse::<u32>(), Ok(v) if v >= ADVANCED_DRIVER_MAJOR)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_smi_output() {
        let out = "NVIDIA GeForce RTX 3080, 535.86.05\n";
        assert_eq!(
            parse_smi_line(out),
            Some(("NVIDIA GeForce RTX 3080".into(), "535.86.05".into()))
        );
    }

    #[test]
    fn parse_smi_output_garbage() {
        assert_eq!(parse_smi_line(""), None);
        assert_eq!(parse_smi_line("no gpu here"), None);
        assert_eq!(parse_smi_line(",\n"), None);
    }

    #[test]
    fn classify_known_families() {
        for model in [
            "NVIDIA GeForce RTX 3080",
            "NVIDIA GeForce RTX 4090",
            "NVIDIA GeForce GTX 1650",
            "Quadro RTX 4000",
            "Tesla T4",
            "NVIDIA L40S",
        ] {
            assert_eq!(classify_gpu_model(model), GpuClass::Extended, "{model}");
        }
    }

    #[test]
    fn classify_unknown_models_minimal() {
        for model in ["NVIDIA GeForce GTX 980", "Tesla K80", "Mystery GPU 9000", ""] {
            assert_eq!(classify_gpu_model(model), GpuClass::Minimal, "{model}");
        }
    }

    #[test]
    fn driver_version_gate() {
        assert!(driver_supports_advanced("535.86.05"));
        assert!(driver_supports_advanced("445.0"));
        assert!(!driver_supports_advanced("390.157"));
        assert!(!driver_supports_advanced("not-a-version"));
        assert!(!driver_supports_advanced(""));
    }

    #[test]
    fn none_report_denies_everything() {
        let caps = CapabilityReport::none();
        assert!(!caps.hardware_available);
        assert!(!caps.supports(Codec::H264));
        assert!(!caps.supports(Codec::Hevc));
        assert!(!caps.driver_advanced_features);
        assert_eq!(caps.gpu_class, GpuClass::Minimal);
    }
}
