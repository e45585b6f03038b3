//! Subprocess helpers.
use anyhow::ensure;
use std::{ffi::OsStr, io, process::ExitStatus, time::Duration};
use time::macros::format_description;

/// Convert exit code result into simple result.
pub fn exit_ok(name: &'static str, done: io::Result<ExitStatus>) -> anyhow::Result<()> {
    let status = done?;
    ensure!(status.success(), "{name} exit code {:?}", status.code());
    Ok(())
}

/// Ok -> None, err -> Some(err)
pub fn exit_ok_option<T>(
    name: &'static str,
    done: io::Result<ExitStatus>,
) -> Option<anyhow::Result<T>> {
    match exit_ok(name, done) {
        Ok(_) => None,
        Err(err) => Some(Err(err)),
    }
}

/// A `frame=.. fps=.. time=..` progress line from ffmpeg stderr.
#[derive(Debug, PartialEq)]
pub struct FfmpegProgress {
    pub frame: u64,
    pub fps: f32,
    pub time: Duration,
}

impl FfmpegProgress {
    pub fn try_parse(out: &str) -> Option<Self> {
        if !out.starts_with("frame=") {
            return None;
        }
        let frame: u64 = label_value(out, "frame=")?.parse().ok()?;
        let fps: f32 = label_value(out, "fps=")?.parse().ok()?;
        let time = time::Time::parse(
            label_value(out, "time=")?,
            &format_description!("[hour]:[minute]:[second].[subsecond]"),
        )
        .ok()?;
        let (h, m, s, ns) = time.as_hms_nano();
        Some(Self {
            frame,
            fps,
            time: Duration::new(u64::from(h) * 3600 + u64::from(m) * 60 + u64::from(s), ns),
        })
    }
}

/// Value of a `label=  value` substring, ffmpeg pads after the `=`.
fn label_value<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let rest = line.split_once(label)?.1.trim_start();
    match rest.split_whitespace().next() {
        Some(v) if !v.is_empty() => Some(v),
        _ => None,
    }
}

pub trait CommandExt {
    /// Adds two arguments.
    fn arg2(&mut self, a: impl AsRef<OsStr>, b: impl AsRef<OsStr>) -> &mut Self;

    /// Adds two arguments, the 2nd an option. `None` mean noop.
    fn arg2_opt(&mut self, a: impl AsRef<OsStr>, b: Option<impl AsRef<OsStr>>) -> &mut Self;

    /// Adds two arguments if `condition` otherwise noop.
    fn arg2_if(&mut self, condition: bool, a: impl AsRef<OsStr>, b: impl AsRef<OsStr>)
    -> &mut Self;

    /// Adds an argument if `condition` otherwise noop.
    fn arg_if(&mut self, condition: bool, a: impl AsRef<OsStr>) -> &mut Self;
}

impl CommandExt for tokio::process::Command {
    fn arg2(&mut self, a: impl AsRef<OsStr>, b: impl AsRef<OsStr>) -> &mut Self {
        self.arg(a).arg(b)
    }

    fn arg2_opt(&mut self, a: impl AsRef<OsStr>, b: Option<impl AsRef<OsStr>>) -> &mut Self {
        match b {
            Some(b) => self.arg2(a, b),
            None => self,
        }
    }

    fn arg2_if(&mut self, c: bool, a: impl AsRef<OsStr>, b: impl AsRef<OsStr>) -> &mut Self {
        match c {
            true => self.arg2(a, b),
            false => self,
        }
    }

    fn arg_if(&mut self, c: bool, a: impl AsRef<OsStr>) -> &mut Self {
        match c {
            true => self.arg(a),
            false => self,
        }
    }
}

#[test]
fn parse_ffmpeg_progress() {
    let out = "frame=  288 fps= 94 q=-0.0 size=N/A time=01:23:12.34 bitrate=N/A speed=3.94x    \r";
    assert_eq!(
        FfmpegProgress::try_parse(out),
        Some(FfmpegProgress {
            frame: 288,
            fps: 94.0,
            time: Duration::new(3600 + 23 * 60 + 12, 340_000_000),
        })
    );
}

#[test]
fn parse_ffmpeg_progress_unpadded() {
    let out = "frame=12 fps=24.5 q=28.0 size=256KiB time=00:00:00.50 bitrate=4193.4kbits/s\r";
    assert_eq!(
        FfmpegProgress::try_parse(out),
        Some(FfmpegProgress {
            frame: 12,
            fps: 24.5,
            time: Duration::from_millis(500),
        })
    );
}

#[test]
fn parse_ffmpeg_non_progress() {
    assert_eq!(FfmpegProgress::try_parse("Stream mapping:"), None);
    assert_eq!(FfmpegProgress::try_parse("frame="), None);
    assert_eq!(FfmpegProgress::try_parse(""), None);
}
