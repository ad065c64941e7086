//! Media analyzer invocation
//!
//! Wraps ffprobe as a subprocess: bounded by a timeout, retried a configured
//! number of times, cancellable. A single invocation yields
//! `Result<ProbeResult, ProbeError>`; the public entry point folds failures
//! into `Error`/`Timeout` results so a bad stream can never fail its
//! channel. The subprocess is never run on the scheduler task; callers
//! invoke this from probe workers only.

use chrono::Utc;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::ProbeError;
use crate::models::{ProbeResult, ProbeStatus};
use crate::utils::obfuscate_credentials;

/// Parameters for one analyzer invocation
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub url: String,
    pub duration_seconds: u64,
    pub timeout_seconds: u64,
    pub retries: u32,
    pub retry_delay_seconds: u64,
    pub user_agent: String,
    pub proxy: Option<String>,
}

pub struct StreamProber {
    ffprobe_command: String,
}

impl StreamProber {
    pub fn new(ffprobe_command: Option<String>) -> Self {
        Self {
            ffprobe_command: ffprobe_command.unwrap_or_else(|| "ffprobe".to_string()),
        }
    }

    /// Probe a URL, retrying failures up to the configured budget
    pub async fn probe(&self, request: &ProbeRequest, cancel: &CancellationToken) -> ProbeResult {
        let mut last_error = ProbeError::Failed {
            message: "analyzer was not invoked".to_string(),
        };
        for attempt in 0..=request.retries {
            if cancel.is_cancelled() {
                return failure_result(ProbeError::Crashed {
                    message: "probe cancelled".to_string(),
                });
            }
            if attempt > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(request.retry_delay_seconds)) => {}
                    _ = cancel.cancelled() => {
                        return failure_result(ProbeError::Crashed {
                            message: "probe cancelled".to_string(),
                        });
                    }
                }
            }
            match self.probe_once(request, cancel).await {
                Ok(result) => return result,
                Err(e) => {
                    debug!(
                        "Probe attempt {}/{} failed for {}: {e}",
                        attempt + 1,
                        request.retries + 1,
                        obfuscate_credentials(&request.url),
                    );
                    last_error = e;
                }
            }
        }
        failure_result(last_error)
    }

    async fn probe_once(
        &self,
        request: &ProbeRequest,
        cancel: &CancellationToken,
    ) -> Result<ProbeResult, ProbeError> {
        let analyze_micros = (request.duration_seconds.max(1) * 1_000_000).to_string();

        let mut cmd = Command::new(&self.ffprobe_command);
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
            "-analyzeduration",
            analyze_micros.as_str(),
            "-probesize",
            "5000000",
            "-user_agent",
            request.user_agent.as_str(),
        ]);
        if let Some(proxy) = &request.proxy {
            cmd.args(["-http_proxy", proxy.as_str()]);
        }
        cmd.arg(&request.url);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output = tokio::select! {
            output = tokio::time::timeout(
                Duration::from_secs(request.timeout_seconds),
                cmd.output(),
            ) => output,
            _ = cancel.cancelled() => {
                return Err(ProbeError::Crashed {
                    message: "probe cancelled".to_string(),
                });
            }
        };

        let output = match output {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(
                    "Failed to execute {} for {}: {e}",
                    self.ffprobe_command,
                    obfuscate_credentials(&request.url)
                );
                return Err(ProbeError::Crashed {
                    message: format!("analyzer spawn failed: {e}"),
                });
            }
            Err(_) => {
                return Err(ProbeError::Timeout {
                    seconds: request.timeout_seconds,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Failed {
                message: format!(
                    "analyzer exited with {}: {}",
                    output.status,
                    stderr.chars().take(200).collect::<String>()
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let data: Value = serde_json::from_str(&stdout).map_err(|e| ProbeError::InvalidOutput {
            message: e.to_string(),
        })?;
        Ok(parse_analyzer_output(&data))
    }
}

/// Fold an analyzer failure into a storable probe result
fn failure_result(error: ProbeError) -> ProbeResult {
    let status = match error {
        ProbeError::Timeout { .. } => ProbeStatus::Timeout,
        _ => ProbeStatus::Error,
    };
    ProbeResult {
        status,
        resolution_w: 0,
        resolution_h: 0,
        fps: 0.0,
        video_codec: None,
        audio_codec: None,
        bitrate_kbps: None,
        last_checked_at: Utc::now(),
        used_profile_id: None,
        error_message: Some(error.to_string()),
    }
}

/// Map ffprobe JSON into a probe result
///
/// Missing or zero dimensions are preserved as zeros; the dead
/// classification happens on the result, not here.
fn parse_analyzer_output(data: &Value) -> ProbeResult {
    let streams = data["streams"].as_array();

    let video = streams.and_then(|list| {
        list.iter()
            .find(|s| s["codec_type"].as_str() == Some("video"))
    });
    let audio = streams.and_then(|list| {
        list.iter()
            .find(|s| s["codec_type"].as_str() == Some("audio"))
    });

    let width = video.and_then(|s| s["width"].as_u64()).unwrap_or(0) as u32;
    let height = video.and_then(|s| s["height"].as_u64()).unwrap_or(0) as u32;
    let fps = video
        .and_then(|s| s["r_frame_rate"].as_str())
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);
    let video_codec = video
        .and_then(|s| s["codec_name"].as_str())
        .map(|s| s.to_string());
    let audio_codec = audio
        .and_then(|s| s["codec_name"].as_str())
        .map(|s| s.to_string());

    // Prefer the video stream bitrate, falling back to the container's
    let bitrate_bps = video
        .and_then(|s| s["bit_rate"].as_str())
        .and_then(|s| s.parse::<u64>().ok())
        .or_else(|| {
            data["format"]["bit_rate"]
                .as_str()
                .and_then(|s| s.parse::<u64>().ok())
        });
    let bitrate_kbps = bitrate_bps.map(|bps| (bps / 1000) as u32);

    ProbeResult {
        status: ProbeStatus::Ok,
        resolution_w: width,
        resolution_h: height,
        fps,
        video_codec,
        audio_codec,
        bitrate_kbps,
        last_checked_at: Utc::now(),
        used_profile_id: None,
        error_message: None,
    }
}

/// ffprobe reports frame rate as a "num/den" rational
fn parse_frame_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 { None } else { Some(num / den) }
        }
        None => raw.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_complete_output() {
        let data = json!({
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "r_frame_rate": "50/1",
                    "bit_rate": "4500000"
                },
                {
                    "codec_type": "audio",
                    "codec_name": "aac"
                }
            ],
            "format": {"bit_rate": "4700000"}
        });

        let result = parse_analyzer_output(&data);
        assert_eq!(result.status, ProbeStatus::Ok);
        assert_eq!(result.resolution_w, 1920);
        assert_eq!(result.resolution_h, 1080);
        assert_eq!(result.fps, 50.0);
        assert_eq!(result.video_codec.as_deref(), Some("h264"));
        assert_eq!(result.audio_codec.as_deref(), Some("aac"));
        assert_eq!(result.bitrate_kbps, Some(4500));
    }

    #[test]
    fn falls_back_to_container_bitrate() {
        let data = json!({
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720,
                 "r_frame_rate": "25/1"}
            ],
            "format": {"bit_rate": "2500000"}
        });
        let result = parse_analyzer_output(&data);
        assert_eq!(result.bitrate_kbps, Some(2500));
    }

    #[test]
    fn missing_bitrate_stays_missing() {
        let data = json!({
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720,
                 "r_frame_rate": "50/1"}
            ],
            "format": {}
        });
        let result = parse_analyzer_output(&data);
        assert_eq!(result.bitrate_kbps, None);
        assert!(!result.is_dead());
    }

    #[test]
    fn audio_only_output_reads_as_dead() {
        let data = json!({
            "streams": [{"codec_type": "audio", "codec_name": "mp3"}],
            "format": {"bit_rate": "128000"}
        });
        let result = parse_analyzer_output(&data);
        assert_eq!(result.resolution_w, 0);
        assert_eq!(result.resolution_h, 0);
        assert!(result.is_dead());
    }

    #[test]
    fn fractional_frame_rates() {
        assert_eq!(parse_frame_rate("50/1"), Some(50.0));
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
    }

    #[test]
    fn failure_results_carry_the_error() {
        let timeout = failure_result(ProbeError::Timeout { seconds: 30 });
        assert_eq!(timeout.status, ProbeStatus::Timeout);
        assert!(timeout.error_message.unwrap().contains("30"));

        let crash = failure_result(ProbeError::Crashed {
            message: "spawn failed".to_string(),
        });
        assert_eq!(crash.status, ProbeStatus::Error);
    }

    #[tokio::test]
    async fn cancelled_probe_returns_error_result() {
        let prober = StreamProber::new(None);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = ProbeRequest {
            url: "http://127.0.0.1:9/never.ts".to_string(),
            duration_seconds: 1,
            timeout_seconds: 1,
            retries: 0,
            retry_delay_seconds: 0,
            user_agent: "test".to_string(),
            proxy: None,
        };
        let result = prober.probe(&request, &cancel).await;
        assert_eq!(result.status, ProbeStatus::Error);
    }
}
