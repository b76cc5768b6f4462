//! Media inspection via `ffprobe`

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to run ffprobe: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("ffprobe exited with {0}")]
    Failed(String),

    #[error("ffprobe timed out after {0}s")]
    Timeout(u64),

    #[error("Could not parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No video stream found")]
    NoVideoStream,
}

/// Technical summary of a media file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub fps: Option<f64>,
    pub duration: Option<f64>,
    pub bit_rate: Option<u64>,
    pub format_name: Option<String>,
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// ffprobe reports numbers in the format section as strings
#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

/// `num/den` rate as printed by ffprobe; `0/0` means unknown
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 || num == 0.0 {
        return None;
    }
    Some((num / den * 1000.0).round() / 1000.0)
}

/// Interpret ffprobe's JSON output
pub fn parse_probe_output(raw: &[u8]) -> Result<MediaInfo, ProbeError> {
    let output: ProbeOutput = serde_json::from_slice(raw)?;

    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or(ProbeError::NoVideoStream)?;
    let has_audio = output
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let fps = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| video.avg_frame_rate.as_deref().and_then(parse_rate));

    let format = output.format.as_ref();

    Ok(MediaInfo {
        codec: video
            .codec_name
            .as_deref()
            .unwrap_or("unknown")
            .to_uppercase(),
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        fps,
        duration: format
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse().ok()),
        bit_rate: format
            .and_then(|f| f.bit_rate.as_deref())
            .and_then(|b| b.parse().ok()),
        format_name: format.and_then(|f| f.format_name.clone()),
        has_audio,
    })
}

/// Runs `ffprobe` against finished uploads
#[derive(Debug, Clone)]
pub struct MediaProbe {
    binary: String,
    timeout: Duration,
}

impl MediaProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: "ffprobe".to_string(),
            timeout,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub async fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError> {
        let run = Command::new(&self.binary)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            return Err(ProbeError::Failed(output.status.to_string()));
        }

        let info = parse_probe_output(&output.stdout)?;
        tracing::debug!(
            path = %path.display(),
            codec = %info.codec,
            width = info.width,
            height = info.height,
            "Probed media"
        );
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "prores",
                "codec_type": "video",
                "width": 3840,
                "height": 2160,
                "r_frame_rate": "24000/1001",
                "avg_frame_rate": "24000/1001"
            },
            {
                "index": 1,
                "codec_name": "pcm_s24le",
                "codec_type": "audio"
            }
        ],
        "format": {
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "12.512500",
            "bit_rate": "734003200"
        }
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let info = parse_probe_output(SAMPLE.as_bytes()).unwrap();

        assert_eq!(info.codec, "PRORES");
        assert_eq!((info.width, info.height), (3840, 2160));
        assert_eq!(info.fps, Some(23.976));
        assert_eq!(info.duration, Some(12.5125));
        assert_eq!(info.bit_rate, Some(734_003_200));
        assert!(info.has_audio);
    }

    #[test]
    fn test_audio_only_file_is_rejected() {
        let raw = br#"{"streams":[{"codec_type":"audio","codec_name":"aac"}],"format":{}}"#;
        assert!(matches!(
            parse_probe_output(raw),
            Err(ProbeError::NoVideoStream)
        ));
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("25/1"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("bogus"), None);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let probe = MediaProbe::new(Duration::from_secs(5)).with_binary("ffprobe-definitely-missing");
        let result = probe.probe(Path::new("clip.mov")).await;
        assert!(matches!(result, Err(ProbeError::Spawn(_))));
    }
}
