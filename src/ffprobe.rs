//! ffprobe adapter.
use std::{path::Path, time::Duration};

/// What this tool needs to know about an input video.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    pub duration: Option<Duration>,
    pub resolution: Option<(u32, u32)>,
    pub has_audio: bool,
}

/// Try to ffprobe the given input. Probe failure is not fatal, encoding is
/// still attempted without scaling or a progress total.
pub fn probe(input: &Path) -> anyhow::Result<Probe> {
    let probe = ffprobe::ffprobe(input).map_err(|err| anyhow::anyhow!("ffprobe: {err}"))?;

    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok());

    let resolution = probe
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("video"))
        .find_map(|s| {
            let w = s.width.and_then(|w| u32::try_from(w).ok())?;
            let h = s.height.and_then(|h| u32::try_from(h).ok())?;
            Some((w, h))
        });

    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(Probe {
        duration,
        resolution,
        has_audio,
    })
}
