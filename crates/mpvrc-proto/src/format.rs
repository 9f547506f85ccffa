//! Display formatting for player values.  Everything here is pure.

use crate::protocol::Track;

const ZERO_DURATION: &str = "00:00:00";

/// Format a count of seconds as `HH:MM:SS`.
///
/// Missing, zero, negative and non-finite values all collapse to
/// `00:00:00`.  Fractional seconds are truncated; hours are not capped.
pub fn format_duration(seconds: Option<f64>) -> String {
    let Some(seconds) = seconds else {
        return ZERO_DURATION.to_string();
    };
    if !seconds.is_finite() || seconds <= 0.0 || seconds >= u64::MAX as f64 {
        return ZERO_DURATION.to_string();
    }

    let total = seconds.trunc() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// One-line description of a track, e.g.
/// `(1) 'English FLAC 2.0' (en flac 2ch 48000 Hz) [default]`.
///
/// An absent track formats as `no`, matching mpv's own OSD wording.
pub fn format_track(track: Option<&Track>) -> String {
    let Some(track) = track else {
        return "no".to_string();
    };
    let info = track.info();

    let mut parens: Vec<String> = vec![info.lang.clone()];
    match track {
        Track::Sub(sub) => parens.push(sub.codec.clone()),
        Track::Audio(audio) => {
            if let Some(decoder) = audio.decoder.as_deref().filter(|d| !d.is_empty()) {
                parens.push(decoder.to_string());
            } else if let Some(codec) = audio.codec.as_deref().filter(|c| !c.is_empty()) {
                parens.push(codec.to_string());
            }
            parens.push(format!("{}ch", audio.audio_channels));
            parens.push(format!("{} Hz", audio.demux_samplerate));
        }
    }

    let mut flags: Vec<&str> = Vec::new();
    if info.default {
        flags.push("default");
    }
    if info.forced {
        flags.push("forced");
    }

    let mut out = format!("({}) '{}' ({})", info.id, info.title, parens.join(" "));
    if !flags.is_empty() {
        out.push_str(&format!(" [{}]", flags.join(" ")));
    }
    out
}

/// Round a playback speed to one decimal place.
pub fn round_speed(speed: f64) -> f64 {
    (speed * 10.0).round() / 10.0
}

/// `Volume: 106%`
pub fn volume_text(volume: f64) -> String {
    format!("Volume: {}%", volume)
}

/// `Speed: 1.1`
pub fn speed_text(speed: f64) -> String {
    format!("Speed: {}", speed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AudioTrack, SubtitleTrack, TrackInfo};

    #[test]
    fn duration_table() {
        let cases: &[(Option<f64>, &str)] = &[
            (None, "00:00:00"),
            (Some(4.004), "00:00:04"),
            (Some(0.0), "00:00:00"),
            (Some(1.0), "00:00:01"),
            (Some(59.0), "00:00:59"),
            (Some(60.0), "00:01:00"),
            (Some(61.0), "00:01:01"),
            (Some(3599.0), "00:59:59"),
            (Some(3600.0), "01:00:00"),
            (Some(3661.0), "01:01:01"),
            (Some(86399.0), "23:59:59"),
            (Some(86400.0), "24:00:00"),
            (Some(-1.0), "00:00:00"),
            (Some(3723.7), "01:02:03"),
        ];
        for (seconds, want) in cases {
            assert_eq!(
                format_duration(*seconds),
                *want,
                "{:?} seconds must convert to {}",
                seconds,
                want
            );
        }
    }

    #[test]
    fn duration_collapses_non_finite_input() {
        assert_eq!(format_duration(Some(f64::NAN)), "00:00:00");
        assert_eq!(format_duration(Some(f64::INFINITY)), "00:00:00");
        assert_eq!(format_duration(Some(f64::NEG_INFINITY)), "00:00:00");
        assert_eq!(format_duration(Some(-0.0)), "00:00:00");
    }

    #[test]
    fn duration_hours_grow_past_two_digits() {
        assert_eq!(format_duration(Some(360_000.0)), "100:00:00");
    }

    fn info(id: i64, title: &str, lang: &str) -> TrackInfo {
        TrackInfo {
            id,
            title: title.to_string(),
            lang: lang.to_string(),
            ..TrackInfo::default()
        }
    }

    #[test]
    fn absent_track_is_no() {
        assert_eq!(format_track(None), "no");
    }

    #[test]
    fn subtitle_with_both_flags() {
        let track = Track::Sub(SubtitleTrack {
            info: TrackInfo {
                default: true,
                forced: true,
                ..info(1, "Signs & Songs [neoDESU]", "en")
            },
            codec: "ass".to_string(),
        });
        assert_eq!(
            format_track(Some(&track)),
            "(1) 'Signs & Songs [neoDESU]' (en ass) [default forced]"
        );
    }

    #[test]
    fn selected_subtitle_without_flags_has_no_bracket() {
        let track = Track::Sub(SubtitleTrack {
            info: TrackInfo {
                selected: true,
                ..info(2, "Full Subtitles [Commie]", "en")
            },
            codec: "ass".to_string(),
        });
        assert_eq!(
            format_track(Some(&track)),
            "(2) 'Full Subtitles [Commie]' (en ass)"
        );
    }

    #[test]
    fn audio_prefers_decoder_over_codec() {
        let track = Track::Audio(AudioTrack {
            info: TrackInfo {
                default: true,
                selected: true,
                ..info(1, "English FLAC 2.0", "en")
            },
            decoder: Some("flac".to_string()),
            codec: Some("flac-codec".to_string()),
            audio_channels: 2,
            demux_samplerate: 48000,
        });
        assert_eq!(
            format_track(Some(&track)),
            "(1) 'English FLAC 2.0' (en flac 2ch 48000 Hz) [default]"
        );
    }

    #[test]
    fn audio_falls_back_to_codec() {
        let track = Track::Audio(AudioTrack {
            info: info(2, "Japanese FLAC 2.0", "ja"),
            decoder: None,
            codec: Some("flac".to_string()),
            audio_channels: 2,
            demux_samplerate: 48000,
        });
        assert_eq!(
            format_track(Some(&track)),
            "(2) 'Japanese FLAC 2.0' (ja flac 2ch 48000 Hz)"
        );
    }

    #[test]
    fn audio_without_codec_or_decoder_omits_the_token() {
        let track = Track::Audio(AudioTrack {
            info: info(3, "Commentary", "en"),
            audio_channels: 1,
            demux_samplerate: 44100,
            ..AudioTrack::default()
        });
        assert_eq!(
            format_track(Some(&track)),
            "(3) 'Commentary' (en 1ch 44100 Hz)"
        );
    }

    #[test]
    fn track_decoded_from_mpv_json() {
        let track: Track = serde_json::from_value(serde_json::json!({
            "id": 2, "type": "audio", "src-id": 3, "title": "Japanese FLAC 2.0",
            "lang": "ja", "audio-channels": 2, "default": false, "forced": false,
            "selected": false, "codec": "flac", "demux-channel-count": 2,
            "demux-samplerate": 48000, "metadata": {"BPS": "610628"}
        }))
        .unwrap();
        assert_eq!(
            format_track(Some(&track)),
            "(2) 'Japanese FLAC 2.0' (ja flac 2ch 48000 Hz)"
        );
    }

    #[test]
    fn speed_rounds_to_one_decimal() {
        assert_eq!(round_speed(1.0 + 0.1), 1.1);
        assert_eq!(round_speed(0.30000000000000004), 0.3);
        assert_eq!(speed_text(round_speed(0.9 + 0.1)), "Speed: 1");
    }

    #[test]
    fn volume_text_drops_trailing_zero_fraction() {
        assert_eq!(volume_text(106.0), "Volume: 106%");
        assert_eq!(volume_text(100.5), "Volume: 100.5%");
    }
}
