//! Quality scorer
//!
//! Pure function from probe result and context to a real score. Hierarchy:
//! dead streams score 0.0 flat; a playable probe missing only the bitrate
//! scores the 0.40 fallback; a complete probe scores the sum-normalized
//! weighted mean of its components. Quality-preference adjustment and the
//! account-priority boost apply on top of the non-dead branches.

use crate::models::{ProbeResult, ProbeStatus, QualityPreference};
use crate::store::ScoreWeights;

/// Base score for a playable probe with unknown bitrate
pub const FALLBACK_SCORE: f64 = 0.40;

const BITRATE_FLOOR_KBPS: f64 = 1000.0;
const BITRATE_CEIL_KBPS: f64 = 8000.0;

/// Context resolved per stream before scoring
#[derive(Debug, Clone)]
pub struct ScoreContext {
    pub weights: ScoreWeights,
    pub preference: QualityPreference,
    pub account_priority: i32,
    pub priority_boost_factor: f64,
}

impl ScoreContext {
    /// Score used for streams of quality-excluded accounts, which are never
    /// probed and rank by provider priority alone
    pub fn priority_only_score(&self) -> f64 {
        self.account_priority as f64 * self.priority_boost_factor
    }
}

/// Score one stream
///
/// `is_dead` reflects the dead-stream tracker and the probe's own dead
/// classification; dead streams score 0.0 with no boosts so the pruning
/// step can identify them. A missing or failed probe scores 0.0 as well.
pub fn score_probe(result: Option<&ProbeResult>, is_dead: bool, ctx: &ScoreContext) -> f64 {
    if is_dead {
        return 0.0;
    }
    let Some(result) = result else {
        return 0.0;
    };
    if result.status != ProbeStatus::Ok {
        return 0.0;
    }

    let base = if result.bitrate_kbps.is_none()
        && result.resolution_w > 0
        && result.resolution_h > 0
        && result.fps > 0.0
    {
        FALLBACK_SCORE
    } else {
        weighted_mean(result, &ctx.weights)
    };

    base + preference_adjustment(result, ctx.preference)
        + ctx.account_priority as f64 * ctx.priority_boost_factor
}

fn weighted_mean(result: &ProbeResult, weights: &ScoreWeights) -> f64 {
    let total = weights.resolution + weights.bitrate + weights.fps + weights.codec;
    if total <= 0.0 {
        return 0.0;
    }
    let sum = weights.resolution * resolution_component(result.resolution_w, result.resolution_h)
        + weights.bitrate * bitrate_component(result.bitrate_kbps)
        + weights.fps * fps_component(result.fps)
        + weights.codec * codec_component(result.video_codec.as_deref());
    sum / total
}

fn resolution_component(width: u32, height: u32) -> f64 {
    match width.max(height * 16 / 9) {
        w if w >= 3840 => 1.0,
        w if w >= 1920 => 0.75,
        w if w >= 1280 => 0.5,
        w if w >= 960 => 0.3,
        0 => 0.0,
        _ => 0.15,
    }
}

/// Bitrate normalized over the useful 1000-8000 kbps range
fn bitrate_component(bitrate_kbps: Option<u32>) -> f64 {
    let Some(kbps) = bitrate_kbps else {
        return 0.0;
    };
    let clipped = (kbps as f64).clamp(BITRATE_FLOOR_KBPS, BITRATE_CEIL_KBPS);
    (clipped - BITRATE_FLOOR_KBPS) / (BITRATE_CEIL_KBPS - BITRATE_FLOOR_KBPS)
}

/// 60/50 fps rank above 30/25
fn fps_component(fps: f64) -> f64 {
    if fps >= 50.0 {
        1.0
    } else if fps >= 25.0 {
        0.5
    } else if fps > 0.0 {
        0.25
    } else {
        0.0
    }
}

/// H.265 ranks above H.264
fn codec_component(codec: Option<&str>) -> f64 {
    match codec.map(normalize_codec_name).as_deref() {
        Some("h265") => 1.0,
        Some("h264") => 0.7,
        Some(_) => 0.4,
        None => 0.0,
    }
}

fn normalize_codec_name(codec: &str) -> String {
    match codec.to_lowercase().as_str() {
        "h264" | "avc" | "avc1" => "h264".to_string(),
        "h265" | "hevc" | "hev1" => "h265".to_string(),
        other => other.to_string(),
    }
}

fn preference_adjustment(result: &ProbeResult, preference: QualityPreference) -> f64 {
    let is_4k = result.resolution_w >= 3840 && result.resolution_h >= 2160;
    match preference {
        QualityPreference::Default => 0.0,
        QualityPreference::Prefer4k => {
            if is_4k {
                0.5
            } else {
                0.0
            }
        }
        QualityPreference::Avoid4k => {
            if is_4k {
                -0.5
            } else {
                0.0
            }
        }
        QualityPreference::Max1080p => {
            if result.resolution_w > 1920 {
                -10.0
            } else {
                0.0
            }
        }
        QualityPreference::Max720p => {
            if result.resolution_w > 1280 {
                -10.0
            } else {
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn probe(w: u32, h: u32, fps: f64, codec: &str, bitrate: Option<u32>) -> ProbeResult {
        ProbeResult {
            status: ProbeStatus::Ok,
            resolution_w: w,
            resolution_h: h,
            fps,
            video_codec: Some(codec.to_string()),
            audio_codec: Some("aac".to_string()),
            bitrate_kbps: bitrate,
            last_checked_at: Utc::now(),
            used_profile_id: None,
            error_message: None,
        }
    }

    fn ctx() -> ScoreContext {
        ScoreContext {
            weights: ScoreWeights::default(),
            preference: QualityPreference::Default,
            account_priority: 0,
            priority_boost_factor: 1.0,
        }
    }

    #[test]
    fn dead_stream_scores_zero_without_boosts() {
        let result = probe(1920, 1080, 50.0, "h264", Some(5000));
        let context = ScoreContext {
            account_priority: 100,
            ..ctx()
        };
        assert_eq!(score_probe(Some(&result), true, &context), 0.0);
    }

    #[test]
    fn zero_resolution_and_bitrate_scores_zero() {
        let result = probe(0, 0, 0.0, "h264", Some(0));
        assert!(result.is_dead());
        assert_eq!(score_probe(Some(&result), result.is_dead(), &ctx()), 0.0);
    }

    #[test]
    fn missing_bitrate_fallback_is_exactly_040() {
        let result = probe(1280, 720, 50.0, "h264", None);
        assert_eq!(score_probe(Some(&result), false, &ctx()), FALLBACK_SCORE);
    }

    #[test]
    fn fallback_still_gets_priority_boost() {
        let result = probe(1280, 720, 50.0, "h264", None);
        let context = ScoreContext {
            account_priority: 10,
            priority_boost_factor: 0.1,
            ..ctx()
        };
        let score = score_probe(Some(&result), false, &context);
        assert!((score - (FALLBACK_SCORE + 1.0)).abs() < 1e-9);
    }

    #[test]
    fn complete_probe_orders_by_quality() {
        let hd = probe(1920, 1080, 50.0, "h264", Some(5000));
        let sd = probe(720, 576, 25.0, "h264", Some(1500));
        let context = ctx();
        assert!(
            score_probe(Some(&hd), false, &context) > score_probe(Some(&sd), false, &context)
        );

        let hevc = probe(1920, 1080, 50.0, "hevc", Some(5000));
        assert!(
            score_probe(Some(&hevc), false, &context) > score_probe(Some(&hd), false, &context)
        );
    }

    #[test]
    fn bitrate_is_clipped_to_useful_range() {
        assert_eq!(bitrate_component(Some(500)), 0.0);
        assert_eq!(bitrate_component(Some(1000)), 0.0);
        assert_eq!(bitrate_component(Some(8000)), 1.0);
        assert_eq!(bitrate_component(Some(20000)), 1.0);
        assert_eq!(bitrate_component(Some(4500)), 0.5);
    }

    #[test]
    fn preference_adjustments() {
        let uhd = probe(3840, 2160, 50.0, "hevc", Some(8000));
        let fhd = probe(1920, 1080, 50.0, "h264", Some(5000));

        let prefer = ScoreContext {
            preference: QualityPreference::Prefer4k,
            ..ctx()
        };
        let avoid = ScoreContext {
            preference: QualityPreference::Avoid4k,
            ..ctx()
        };
        let neutral = ctx();

        assert!(
            score_probe(Some(&uhd), false, &prefer)
                > score_probe(Some(&uhd), false, &neutral)
        );
        assert!(
            score_probe(Some(&uhd), false, &avoid) < score_probe(Some(&uhd), false, &neutral)
        );
        // Non-4K content is unaffected by the 4K preferences
        assert_eq!(
            score_probe(Some(&fhd), false, &prefer),
            score_probe(Some(&fhd), false, &neutral)
        );
    }

    #[test]
    fn resolution_caps_go_strongly_negative() {
        let uhd = probe(3840, 2160, 50.0, "hevc", Some(8000));
        let capped = ScoreContext {
            preference: QualityPreference::Max1080p,
            ..ctx()
        };
        assert!(score_probe(Some(&uhd), false, &capped) < 0.0);

        let hd = probe(1920, 1080, 50.0, "h264", Some(5000));
        let capped720 = ScoreContext {
            preference: QualityPreference::Max720p,
            ..ctx()
        };
        assert!(score_probe(Some(&hd), false, &capped720) < 0.0);
    }

    #[test]
    fn failed_probe_scores_zero() {
        let mut result = probe(0, 0, 0.0, "h264", None);
        result.status = ProbeStatus::Error;
        assert_eq!(score_probe(Some(&result), false, &ctx()), 0.0);
        assert_eq!(score_probe(None, false, &ctx()), 0.0);
    }

    #[test]
    fn priority_only_score_uses_factor() {
        let context = ScoreContext {
            account_priority: 50,
            priority_boost_factor: 2.0,
            ..ctx()
        };
        assert_eq!(context.priority_only_score(), 100.0);
    }
}
