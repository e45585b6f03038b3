//! Batch compression: glob expansion, the hardware then software fallback
//! chain and the keep-smaller decision.
use crate::{
    capability::{self, CapabilityReport},
    command::{PROGRESS_CHARS, args},
    ffmpeg::{self, ENCODE_TIMEOUT},
    ffprobe,
    outcome::{self, CompressionOutcome},
    params::{self, Codec, EncodingParameters, ExecutionMode, RateControl},
    pptx,
    process::FfmpegProgress,
    scale, temporary,
};
use anyhow::Context;
use clap::Parser;
use console::style;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use log::{info, warn};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::fs;
use tokio_stream::StreamExt;

/// Shrink videos, including videos embedded in pptx decks.
///
/// Tries nvenc hardware encoding first where available, falling back to
/// software. Keeps whichever of original/encoded is smaller.
#[derive(Parser)]
#[clap(verbatim_doc_comment)]
pub struct Args {
    /// Input video file, pptx deck, or glob pattern e.g. "videos/*.mp4".
    pub input: String,

    #[command(flatten)]
    pub encode: args::Encode,
}

pub async fn compress(Args { input, encode }: Args) -> anyhow::Result<()> {
    let ffmpeg_version = ffmpeg::version().await?;
    info!("using {ffmpeg_version}");

    let inputs = expand_pattern(&input)?;
    let caps = capability::probe().await;
    let settings = encode.to_settings(&caps)?;
    info!(
        "settings: {} {} max-width {} hardware {}",
        settings.tier.name(),
        settings.codec,
        settings.max_width,
        settings.use_hardware,
    );

    let (mut compressed, mut kept, mut failed) = (0u32, 0u32, 0u32);
    for file in &inputs {
        let result = match pptx::is_pptx(file) {
            true => process_pptx(file, &settings, &caps).await,
            false => process_video(file, &settings, &caps).await,
        };
        match result {
            Ok(out) => {
                report_outcome(file, &out);
                match out.size_reduced {
                    true => compressed += 1,
                    false => kept += 1,
                }
            }
            Err(err) => {
                failed += 1;
                eprintln!(
                    "{} {}: {err}",
                    style("Failed").red().bold(),
                    file.display()
                );
            }
        }
    }

    if inputs.len() > 1 {
        eprintln!(
            "{}",
            style(format!(
                "{compressed} compressed, {kept} kept original, {failed} failed"
            ))
            .dim()
        );
    }
    anyhow::ensure!(
        compressed + kept > 0,
        "all {failed} input(s) failed to process"
    );
    Ok(())
}

/// Expand a literal path or glob pattern into a sorted file list.
fn expand_pattern(pattern: &str) -> anyhow::Result<Vec<PathBuf>> {
    let literal = Path::new(pattern);
    if literal.is_file() {
        return Ok(vec![literal.to_path_buf()]);
    }
    let mut files: Vec<_> = glob::glob(pattern)
        .with_context(|| format!("invalid pattern {pattern:?}"))?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    anyhow::ensure!(!files.is_empty(), "no files match {pattern:?}");
    Ok(files)
}

/// One encode attempt in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Attempt {
    codec: Codec,
    mode: ExecutionMode,
}

/// Plan the ordered attempt chain for one file.
///
/// Hardware first, only when requested and actually available, substituting
/// the alternate codec for that attempt if the requested one has no nvenc
/// support. The software attempt always uses the requested codec.
fn plan_attempts(requested: Codec, use_hardware: bool, caps: &CapabilityReport) -> Vec<Attempt> {
    let mut attempts = Vec::with_capacity(2);
    if use_hardware && caps.hardware_available {
        let codec = match caps.supports(requested) {
            true => requested,
            false => requested.alternate(),
        };
        if caps.supports(codec) {
            attempts.push(Attempt {
                codec,
                mode: ExecutionMode::Hardware,
            });
        }
    }
    attempts.push(Attempt {
        codec: requested,
        mode: ExecutionMode::Software,
    });
    attempts
}

/// Probe an input, tolerating failure: no resolution/duration means encode
/// without scaling, assume audio so it is copied rather than dropped.
fn probe_or_default(input: &Path) -> ffprobe::Probe {
    match ffprobe::probe(input) {
        Ok(probe) => probe,
        Err(err) => {
            warn!("{}: {err}", input.display());
            ffprobe::Probe {
                has_audio: true,
                ..<_>::default()
            }
        }
    }
}

/// Run the attempt chain on `input`, returning the successful encode's
/// output path & attempt. Failed attempts are logged & the chain continues.
async fn encode_with_fallback(
    input: &Path,
    output_for: impl Fn(&EncodingParameters, Codec) -> PathBuf,
    settings: &args::Settings,
    caps: &CapabilityReport,
) -> anyhow::Result<(PathBuf, Attempt)> {
    let probe = probe_or_default(input);
    let vfilter = probe
        .resolution
        .and_then(|(w, h)| scale::vfilter(w, h, settings.max_width));

    let bar = ProgressBar::new(probe.duration.map_or(1, |d| d.as_secs().max(1))).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan.bold} {elapsed_precise:.bold} {prefix} {wide_bar:.cyan/blue} ({msg}eta {eta})")?
            .progress_chars(PROGRESS_CHARS),
    );
    bar.enable_steady_tick(Duration::from_millis(100));

    let mut last_err = None;
    for attempt in plan_attempts(settings.codec, settings.use_hardware, caps) {
        let params = params::resolve(settings.tier, attempt.codec, attempt.mode, caps);
        let vcodec = attempt.codec.vcodec(attempt.mode);
        let output = output_for(&params, attempt.codec);
        temporary::add(&output);
        bar.set_prefix(vcodec);
        bar.set_position(0);

        let enc = ffmpeg::EncodeArgs {
            input,
            output: &output,
            vcodec,
            vfilter: vfilter.as_deref(),
            params: &params,
            has_audio: probe.has_audio,
            drop_audio: settings.drop_audio,
        };
        match run_attempt(enc, &bar).await {
            Ok(()) => {
                bar.finish_and_clear();
                return Ok((output, attempt));
            }
            Err(err) => {
                warn!(
                    "{}: {} attempt failed: {err}",
                    input.display(),
                    attempt.mode.name()
                );
                let _ = fs::remove_file(&output).await;
                temporary::unadd(&output);
                last_err = Some(err);
            }
        }
    }
    bar.finish_and_clear();
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no encode attempts were possible")))
}

/// Drive a single encode to completion or the fixed timeout.
/// Timeout drops the stream which kills the encoder.
async fn run_attempt(
    enc: ffmpeg::EncodeArgs<'_>,
    bar: &ProgressBar,
) -> anyhow::Result<()> {
    let mut stream = ffmpeg::encode(enc)?;
    let deadline = tokio::time::Instant::now() + ENCODE_TIMEOUT;
    loop {
        match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(Some(progress)) => {
                let FfmpegProgress { fps, time, .. } = progress?;
                if fps > 0.0 {
                    bar.set_message(format!("{fps} fps, "));
                }
                bar.set_position(time.as_secs());
            }
            Ok(None) => return Ok(()),
            Err(_) => anyhow::bail!(
                "timed out after {}",
                humantime::format_duration(ENCODE_TIMEOUT)
            ),
        }
    }
}

/// Compress a standalone video next to itself.
async fn process_video(
    input: &Path,
    settings: &args::Settings,
    caps: &CapabilityReport,
) -> anyhow::Result<CompressionOutcome> {
    let original_size = fs::metadata(input).await?.len();

    let (output, attempt) = encode_with_fallback(
        input,
        |params, codec| default_output_from(input, params, codec),
        settings,
        caps,
    )
    .await?;

    let encoded_size = fs::metadata(&output).await?.len();
    if outcome::keep_encoded(original_size, encoded_size) {
        temporary::unadd(&output);
        Ok(CompressionOutcome::compressed(
            original_size,
            encoded_size,
            attempt.mode.is_hardware(),
        ))
    } else {
        fs::remove_file(&output).await?;
        temporary::unadd(&output);
        Ok(CompressionOutcome::kept_original(
            original_size,
            outcome::REASON_NOT_SMALLER,
        ))
    }
}

/// * input: vid.ext -> output: vid.cq28.hevc.mp4
fn default_output_from(input: &Path, params: &EncodingParameters, codec: Codec) -> PathBuf {
    let q_tag = match params.rate_control {
        RateControl::Vbr => "cq",
        RateControl::ConstantQuality => "crf",
    };
    input.with_extension(format!("{q_tag}{}.{codec}.mp4", params.quality))
}

/// Compress every embedded video of a pptx, rewrite markup references where
/// extensions change & write a `_compressed` archive. The input deck is
/// never touched.
async fn process_pptx(
    input: &Path,
    settings: &args::Settings,
    caps: &CapabilityReport,
) -> anyhow::Result<CompressionOutcome> {
    let original_size = fs::metadata(input).await?.len();

    let extract_dir = std::env::temp_dir().join(format!(
        "vidsqueeze-{}-{}",
        std::process::id(),
        input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "deck".into()),
    ));
    temporary::add_dir(&extract_dir);
    pptx::extract(input, &extract_dir)?;

    let videos = pptx::media_videos(&extract_dir);
    if videos.is_empty() {
        return Ok(CompressionOutcome::kept_original(
            original_size,
            outcome::REASON_NO_VIDEOS,
        ));
    }
    info!("{}: {} embedded video(s)", input.display(), videos.len());

    let (mut replaced, mut used_hardware) = (0u32, false);
    for video in &videos {
        // a failed or not-smaller embedded video keeps its original media
        match process_embedded(video, &extract_dir, settings, caps).await {
            Ok(Some(hardware)) => {
                replaced += 1;
                used_hardware |= hardware;
            }
            Ok(None) => {}
            Err(err) => warn!("{}: {err}", video.display()),
        }
    }
    if replaced == 0 {
        return Ok(CompressionOutcome::kept_original(
            original_size,
            outcome::REASON_NOT_SMALLER,
        ));
    }

    let output = pptx::default_output_from(input);
    temporary::add(&output);
    pptx::repack(&extract_dir, &output)?;

    let final_size = fs::metadata(&output).await?.len();
    if outcome::keep_encoded(original_size, final_size) {
        temporary::unadd(&output);
        Ok(CompressionOutcome {
            original_size,
            final_size,
            used_hardware,
            size_reduced: true,
            reason: outcome::REASON_COMPRESSED,
        })
    } else {
        fs::remove_file(&output).await?;
        temporary::unadd(&output);
        Ok(CompressionOutcome::kept_original(
            original_size,
            outcome::REASON_NOT_SMALLER,
        ))
    }
}

/// Compress one extracted media file in place. `Ok(Some(used_hardware))`
/// when the media was replaced, `Ok(None)` when the original was kept.
async fn process_embedded(
    video: &Path,
    extracted_root: &Path,
    settings: &args::Settings,
    caps: &CapabilityReport,
) -> anyhow::Result<Option<bool>> {
    let media_size = fs::metadata(video).await?.len();

    let (encoded, attempt) = encode_with_fallback(
        video,
        |_, _| video.with_extension("enc.mp4"),
        settings,
        caps,
    )
    .await?;

    let encoded_size = fs::metadata(&encoded).await?.len();
    if !outcome::keep_encoded(media_size, encoded_size) {
        fs::remove_file(&encoded).await?;
        temporary::unadd(&encoded);
        info!("{}: not smaller, kept original media", video.display());
        return Ok(None);
    }

    let is_mp4 = video
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"));
    if is_mp4 {
        fs::rename(&encoded, video).await.context("replace media")?;
    } else {
        // container changed: rename & rewrite every textual reference
        let replacement = video.with_extension("mp4");
        let old_name = file_name(video)?;
        let new_name = file_name(&replacement)?;
        fs::rename(&encoded, &replacement)
            .await
            .context("replace media")?;
        fs::remove_file(video).await.context("remove old media")?;

        let rewritten = pptx::rewrite_references(extracted_root, &old_name, &new_name);
        if rewritten == 0 {
            warn!("no markup references to {old_name} found");
        }
        if let Err(err) = pptx::ensure_content_type(extracted_root, "mp4", "video/mp4") {
            warn!("content types: {err}");
        }
    }
    temporary::unadd(&encoded);
    Ok(Some(attempt.mode.is_hardware()))
}

fn file_name(path: &Path) -> anyhow::Result<String> {
    Ok(path
        .file_name()
        .context("path without file name")?
        .to_string_lossy()
        .into_owned())
}

fn report_outcome(input: &Path, out: &CompressionOutcome) {
    if out.size_reduced {
        let saved = 100.0 - 100.0 * out.final_size as f64 / out.original_size.max(1) as f64;
        eprintln!(
            "{} {} {} -> {} {}",
            style("Compressed").green().bold(),
            input.display(),
            style(HumanBytes(out.original_size)).dim(),
            style(HumanBytes(out.final_size)).bold(),
            style(format!(
                "(-{saved:.0}%, {})",
                match out.used_hardware {
                    true => "hardware",
                    false => "software",
                }
            ))
            .dim(),
        );
    } else {
        eprintln!(
            "{} {} {}",
            style("Kept original").dim().bold(),
            input.display(),
            style(format!("({})", out.reason)).dim(),
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::QualityTier;

    fn hw_caps(h264: bool, hevc: bool) -> CapabilityReport {
        CapabilityReport {
            hardware_available: h264 || hevc,
            supports_h264: h264,
            supports_hevc: hevc,
            ..CapabilityReport::none()
        }
    }

    #[test]
    fn hardware_unavailable_goes_straight_to_software() {
        let attempts = plan_attempts(Codec::Hevc, true, &CapabilityReport::none());
        assert_eq!(
            attempts,
            vec![Attempt {
                codec: Codec::Hevc,
                mode: ExecutionMode::Software
            }]
        );
    }

    #[test]
    fn hardware_not_requested_is_not_attempted() {
        let attempts = plan_attempts(Codec::Hevc, false, &hw_caps(true, true));
        assert_eq!(
            attempts,
            vec![Attempt {
                codec: Codec::Hevc,
                mode: ExecutionMode::Software
            }]
        );
    }

    #[test]
    fn hardware_then_software_fallback_order() {
        let attempts = plan_attempts(Codec::Hevc, true, &hw_caps(true, true));
        assert_eq!(
            attempts,
            vec![
                Attempt {
                    codec: Codec::Hevc,
                    mode: ExecutionMode::Hardware
                },
                Attempt {
                    codec: Codec::Hevc,
                    mode: ExecutionMode::Software
                },
            ]
        );
    }

    #[test]
    fn unsupported_codec_substituted_for_hardware_only() {
        // hevc requested but only h264 has nvenc support
        let attempts = plan_attempts(Codec::Hevc, true, &hw_caps(true, false));
        assert_eq!(
            attempts,
            vec![
                Attempt {
                    codec: Codec::H264,
                    mode: ExecutionMode::Hardware
                },
                // software retains the requested codec
                Attempt {
                    codec: Codec::Hevc,
                    mode: ExecutionMode::Software
                },
            ]
        );
    }

    #[test]
    fn video_output_name_carries_quality_and_codec() {
        let caps = CapabilityReport::none();
        let params = params::resolve(
            QualityTier::Balanced,
            Codec::Hevc,
            ExecutionMode::Software,
            &caps,
        );
        assert_eq!(
            default_output_from(Path::new("/vids/talk.mov"), &params, Codec::Hevc),
            Path::new("/vids/talk.crf28.hevc.mp4")
        );

        let params = params::resolve(
            QualityTier::Balanced,
            Codec::H264,
            ExecutionMode::Hardware,
            &caps,
        );
        assert_eq!(
            default_output_from(Path::new("clip.mp4"), &params, Codec::H264),
            Path::new("clip.cq28.h264.mp4")
        );
    }
}
