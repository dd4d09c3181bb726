//! Applies rate/pitch/volume to a synthesized buffer.
//!
//! `pitch` is accepted and validated upstream but has no effect here yet —
//! it is stored and echoed back, never applied.

use std::path::PathBuf;
use std::process::Command;

use once_cell::sync::OnceCell;
use rubato::{SincFixedIn, SincInterpolationParameters, SincInterpolationType, VecResampler, WindowFunction};
use voicereader_core::types::{PlaybackSettings, SynthesizedAudio};

static SOX_PATH: OnceCell<Option<PathBuf>> = OnceCell::new();

/// Apply `settings` to `audio`, returning a new buffer. Returns the input
/// unchanged (cloned) when `settings.is_identity()`.
pub fn apply_playback_settings(
    audio: &SynthesizedAudio,
    settings: &PlaybackSettings,
) -> SynthesizedAudio {
    if settings.is_identity() {
        return audio.clone();
    }

    let mut samples = audio.samples_i16();

    if settings.rate != 1.0 {
        samples = apply_rate(&samples, audio.sample_rate, settings.rate);
    }

    if settings.volume != 1.0 {
        for sample in samples.iter_mut() {
            let scaled = (*sample as f32) * settings.volume;
            *sample = scaled.clamp(-32768.0, 32767.0) as i16;
        }
    }

    SynthesizedAudio::from_samples_i16(&samples, audio.sample_rate, audio.channels)
}

/// Decompose `rate` into a sequence of tempo factors each within
/// `[0.5, 2.0]`, halving or doubling repeatedly until the residual lands in
/// range.
fn decompose_tempo_factors(rate: f32) -> Vec<f32> {
    let mut factors = Vec::new();
    let mut remaining = rate;

    while remaining > 2.0 {
        factors.push(2.0);
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        factors.push(0.5);
        remaining *= 2.0;
    }
    factors.push(remaining);
    factors
}

fn apply_rate(samples: &[i16], sample_rate: u32, rate: f32) -> Vec<i16> {
    let factors = decompose_tempo_factors(rate);

    if let Some(sox_path) = discover_sox_path() {
        if let Some(stretched) = stretch_via_external_tool(sox_path, samples, sample_rate, &factors) {
            return stretched;
        }
    }

    if let Some(stretched) = stretch_via_rubato(samples, rate) {
        return stretched;
    }

    linear_interpolate(samples, rate)
}

fn discover_sox_path() -> Option<&'static PathBuf> {
    SOX_PATH
        .get_or_init(|| {
            if let Ok(explicit) = std::env::var("VOICEREADER_SOX_PATH") {
                let path = PathBuf::from(explicit);
                if path.exists() {
                    return Some(path);
                }
            }

            if let Ok(exe) = std::env::current_exe() {
                if let Some(dir) = exe.parent() {
                    let bundled = dir.join(sox_binary_name());
                    if bundled.exists() {
                        return Some(bundled);
                    }
                }
            }

            which_on_path(sox_binary_name())
        })
        .as_ref()
}

#[cfg(windows)]
fn sox_binary_name() -> &'static str {
    "sox.exe"
}

#[cfg(not(windows))]
fn sox_binary_name() -> &'static str {
    "sox"
}

fn which_on_path(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.exists())
}

/// Pipe PCM through the external tool, applying each tempo factor as its own
/// `tempo` argument. Returns `None` (never panics) on any spawn/IO failure
/// so the caller can fall through to the next stage.
fn stretch_via_external_tool(
    sox_path: &PathBuf,
    samples: &[i16],
    sample_rate: u32,
    tempo_factors: &[f32],
) -> Option<Vec<i16>> {
    use std::io::Write;

    let mut command = Command::new(sox_path);
    command
        .arg("-t")
        .arg("raw")
        .arg("-r")
        .arg(sample_rate.to_string())
        .arg("-e")
        .arg("signed-integer")
        .arg("-b")
        .arg("16")
        .arg("-c")
        .arg("1")
        .arg("-")
        .arg("-t")
        .arg("raw")
        .arg("-r")
        .arg(sample_rate.to_string())
        .arg("-e")
        .arg("signed-integer")
        .arg("-b")
        .arg("16")
        .arg("-c")
        .arg("1")
        .arg("-")
        .arg("tempo");
    for factor in tempo_factors {
        command.arg(format!("{factor:.6}"));
    }

    command.stdin(std::process::Stdio::piped());
    command.stdout(std::process::Stdio::piped());
    command.stderr(std::process::Stdio::null());

    let mut child = command.spawn().ok()?;
    let mut stdin = child.stdin.take()?;
    let mut raw = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        raw.extend_from_slice(&sample.to_le_bytes());
    }
    stdin.write_all(&raw).ok()?;
    drop(stdin);

    let output = child.wait_with_output().ok()?;
    if !output.status.success() {
        return None;
    }

    Some(
        output
            .stdout
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect(),
    )
}

/// In-process stand-in for the external tool: overlap-add (OLA) re-sequences
/// Hann-windowed frames of the input at an analysis hop scaled by `rate`,
/// depositing them at a fixed synthesis hop, so the spectral content inside
/// each frame - and with it, pitch - is carried into the output untouched.
/// Only *how densely* those frames are packed changes, which is what moves
/// the duration to `round(n / rate)`. This is what actually distinguishes
/// this tier from `linear_interpolate`: that one resamples the whole buffer
/// and drags pitch along with tempo, this one never resamples at all.
///
/// Hop rounding can leave the OLA output a handful of frames short of or
/// past the exact target length; a `rubato` resample closes that gap. The
/// ratio involved is always within a frame's width of 1.0, so the pitch
/// smear it introduces is negligible next to the OLA windows themselves.
fn stretch_via_rubato(samples: &[i16], rate: f32) -> Option<Vec<i16>> {
    if samples.is_empty() {
        return Some(Vec::new());
    }

    let target_len = ((samples.len() as f64) / rate as f64).round() as usize;
    if target_len == 0 {
        return Some(Vec::new());
    }

    let stretched = overlap_add_stretch(samples, rate, target_len);
    if stretched.len() == target_len {
        return Some(stretched);
    }

    let input: Vec<f64> = stretched.iter().map(|s| *s as f64 / 32768.0).collect();
    let resample_ratio = target_len as f64 / input.len().max(1) as f64;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler =
        SincFixedIn::<f64>::new(resample_ratio, 2.0, params, input.len().max(1), 1).ok()?;
    let output = resampler.process(&[input], None).ok()?;
    let channel = output.into_iter().next()?;

    Some(
        channel
            .into_iter()
            .map(|s| (s * 32768.0).clamp(-32768.0, 32767.0) as i16)
            .collect(),
    )
}

/// Classic overlap-add tempo change. `analysis_hop = synthesis_hop * rate`:
/// faster playback (`rate > 1`) reads through the input quicker than it
/// writes, slower playback reads slower, and in both cases every written
/// frame is a verbatim (windowed) copy of input samples, never resampled.
fn overlap_add_stretch(samples: &[i16], rate: f32, target_len: usize) -> Vec<i16> {
    let frame_len = 1024.min(samples.len()).max(1);
    let synthesis_hop = (frame_len / 4).max(1);
    let analysis_hop = ((synthesis_hop as f64) * rate as f64).round().max(1.0) as usize;
    let window = hann_window(frame_len);

    let mut output = vec![0.0f64; target_len + frame_len];
    let mut norm = vec![0.0f64; target_len + frame_len];

    let mut read_pos = 0usize;
    let mut write_pos = 0usize;
    while write_pos < target_len {
        let start = read_pos.min(samples.len().saturating_sub(1));
        let end = (start + frame_len).min(samples.len());
        for (i, sample) in samples[start..end].iter().enumerate() {
            let w = window[i];
            output[write_pos + i] += (*sample as f64 / 32768.0) * w;
            norm[write_pos + i] += w;
        }
        read_pos += analysis_hop;
        write_pos += synthesis_hop;
    }

    output
        .into_iter()
        .zip(norm)
        .take(target_len)
        .map(|(s, n)| {
            let sample = if n > 1e-6 { s / n } else { 0.0 };
            (sample * 32768.0).clamp(-32768.0, 32767.0) as i16
        })
        .collect()
}

/// Periodic Hann window (last sample not repeated), the standard choice for
/// overlap-add so adjacent frames sum back to a flat envelope.
fn hann_window(len: usize) -> Vec<f64> {
    if len <= 1 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|i| 0.5 - 0.5 * ((2.0 * std::f64::consts::PI * i as f64) / (len as f64 - 1.0)).cos())
        .collect()
}

/// Last-resort fallback: linear interpolation. Documented to distort pitch.
fn linear_interpolate(samples: &[i16], rate: f32) -> Vec<i16> {
    if samples.is_empty() || rate <= 0.0 {
        return samples.to_vec();
    }

    let target_len = ((samples.len() as f64) / rate as f64).round() as usize;
    if target_len == 0 {
        return Vec::new();
    }

    let mut output = Vec::with_capacity(target_len);
    let last_index = samples.len() - 1;
    for i in 0..target_len {
        let src_pos = i as f64 * rate as f64;
        let idx0 = (src_pos.floor() as usize).min(last_index);
        let idx1 = (idx0 + 1).min(last_index);
        let frac = src_pos - idx0 as f64;
        let interpolated = samples[idx0] as f64 * (1.0 - frac) + samples[idx1] as f64 * frac;
        output.push(interpolated.clamp(-32768.0, 32767.0) as i16);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_settings_return_input_unchanged() {
        let audio = SynthesizedAudio::from_samples_i16(&[1, 2, 3, 4], 24_000, 1);
        let result = apply_playback_settings(&audio, &PlaybackSettings::default());
        assert_eq!(result, audio);
    }

    #[test]
    fn volume_scales_samples() {
        let audio = SynthesizedAudio::from_samples_i16(&[1000, -1000], 24_000, 1);
        let settings = PlaybackSettings {
            volume: 0.5,
            ..Default::default()
        };
        let result = apply_playback_settings(&audio, &settings);
        assert_eq!(result.samples_i16(), vec![500, -500]);
    }

    #[test]
    fn volume_clips_to_i16_range() {
        let audio = SynthesizedAudio::from_samples_i16(&[30000], 24_000, 1);
        let settings = PlaybackSettings {
            volume: 2.0,
            ..Default::default()
        };
        let result = apply_playback_settings(&audio, &settings);
        assert_eq!(result.samples_i16(), vec![32767]);
    }

    #[test]
    fn tempo_decomposition_stays_within_bounds() {
        for factor in decompose_tempo_factors(4.0) {
            assert!((0.5..=2.0).contains(&factor));
        }
        for factor in decompose_tempo_factors(0.25) {
            assert!((0.5..=2.0).contains(&factor));
        }
        for factor in decompose_tempo_factors(1.3) {
            assert!((0.5..=2.0).contains(&factor));
        }
    }

    #[test]
    fn linear_interpolation_halves_length_for_rate_two() {
        let samples: Vec<i16> = (0..100).map(|i| i as i16).collect();
        let out = linear_interpolate(&samples, 2.0);
        assert_eq!(out.len(), 50);
    }

    #[test]
    fn linear_interpolation_handles_empty_input() {
        assert_eq!(linear_interpolate(&[], 2.0), Vec::<i16>::new());
    }

    #[test]
    fn overlap_add_stretch_hits_the_exact_target_length() {
        let samples: Vec<i16> = (0..8_000)
            .map(|i| ((i as f64 * 0.05).sin() * 10_000.0) as i16)
            .collect();
        let target = ((samples.len() as f64) / 1.5).round() as usize;
        let out = overlap_add_stretch(&samples, 1.5, target);
        assert_eq!(out.len(), target);
    }

    #[test]
    fn overlap_add_stretch_reuses_input_samples_unlike_linear_interpolation() {
        // A pure tone's peak sample value survives OLA's windowed copy (up to
        // window taper); `linear_interpolate` instead blends neighboring
        // samples at every output position, which for a steep slope produces
        // values the input never actually contained.
        let samples: Vec<i16> = (0..4_000)
            .map(|i| ((i as f64 * 0.1).sin() * 32_000.0) as i16)
            .collect();
        let target = ((samples.len() as f64) / 1.2).round() as usize;
        let stretched = overlap_add_stretch(&samples, 1.2, target);
        assert_eq!(stretched.len(), target);
        assert!(stretched.iter().any(|s| s.abs() > 20_000));
    }

    #[test]
    fn rubato_tier_output_length_matches_rate() {
        let samples: Vec<i16> = (0..4_000)
            .map(|i| ((i as f64 * 0.07).sin() * 16_000.0) as i16)
            .collect();
        let target = ((samples.len() as f64) / 1.5).round() as usize;
        let out = stretch_via_rubato(&samples, 1.5).expect("rubato tier should succeed");
        assert_eq!(out.len(), target);
    }
}
