//! ffmpeg encoding logic.
use crate::{
    params::{EncodingParameters, RateControl},
    process::{CommandExt, FfmpegProgress, exit_ok_option},
};
use anyhow::Context;
use std::{path::Path, process::Stdio, time::Duration};
use tokio::process::Command;
use tokio_process_stream::{Item, ProcessChunkStream};
use tokio_stream::{Stream, StreamExt};

/// Fixed per-attempt encode timeout, after which the child is killed.
pub const ENCODE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// One ffmpeg encode invocation.
#[derive(Debug, Clone)]
pub struct EncodeArgs<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub vcodec: &'static str,
    pub vfilter: Option<&'a str>,
    pub params: &'a EncodingParameters,
    pub has_audio: bool,
    pub drop_audio: bool,
}

/// Spawn an encode, returning a progress stream. The stream yields parsed
/// stderr progress then ends, or yields the failure. Dropping the stream
/// kills the child.
pub fn encode(
    EncodeArgs {
        input,
        output,
        vcodec,
        vfilter,
        params,
        has_audio,
        drop_audio,
    }: EncodeArgs,
) -> anyhow::Result<impl Stream<Item = anyhow::Result<FfmpegProgress>> + Unpin> {
    let multipass = params.multipass.map(|n| n.to_string());
    let enc = Command::new("ffmpeg")
        .kill_on_drop(true)
        .arg("-y")
        .arg2("-i", input)
        .arg2_opt("-vf", vfilter)
        .arg2("-c:v", vcodec)
        .arg2(params.rate_control.quality_arg(), params.quality.to_string())
        .arg2_if(
            params.rate_control == RateControl::Vbr,
            "-rc:v",
            "vbr",
        )
        .arg2_if(params.rate_control == RateControl::Vbr, "-b:v", "0")
        .arg2("-preset", params.preset)
        .arg2("-profile:v", params.profile)
        .arg2_opt("-tune", params.tune)
        .arg2_opt("-multipass", multipass)
        .arg2_opt("-bf", params.b_frames.map(|n| n.to_string()))
        .arg2_opt("-refs", params.reference_frames.map(|n| n.to_string()))
        .arg2_opt("-tag:v", params.codec_tag)
        .arg_if(drop_audio || !has_audio, "-an")
        .arg2_if(!drop_audio && has_audio, "-c:a", "copy")
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .context("ffmpeg encode")?;

    Ok(
        ProcessChunkStream::from(enc).filter_map(|item| match item {
            Item::Stderr(chunk) => {
                FfmpegProgress::try_parse(&String::from_utf8_lossy(&chunk)).map(Ok)
            }
            Item::Stdout(_) => None,
            Item::Done(code) => exit_ok_option("ffmpeg encode", code),
        }),
    )
}

/// First line of `ffmpeg -version`, used as the required-tool check.
pub async fn version() -> anyhow::Result<String> {
    let out = Command::new("ffmpeg")
        .arg("-hide_banner")
        .arg("-version")
        .output()
        .await
        .context("ffmpeg not found in PATH")?;
    anyhow::ensure!(out.status.success(), "ffmpeg -version failed");
    let stdout = String::from_utf8_lossy(&out.stdout);
    Ok(stdout.lines().next().unwrap_or_default().to_owned())
}
