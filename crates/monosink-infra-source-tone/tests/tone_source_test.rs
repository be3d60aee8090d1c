use monosink_infra_source_tone::ToneSource;
use monosink_ports::source::FrameSource;
use pretty_assertions::assert_eq;
use std::time::Duration;

#[test]
fn unbounded_tone_fills_every_request() {
    let mut tone = ToneSource::new(440.0, 0.5);
    let mut out = vec![1i16; 512];
    assert_eq!(tone.fill(&mut out), 512);
    assert_eq!(tone.remaining(), None);
    assert_eq!(out[0], 0);
}

#[test]
fn tone_stays_within_amplitude() {
    let mut tone = ToneSource::new(1000.0, 0.25);
    let mut out = vec![0i16; 4800];
    tone.fill(&mut out);

    let peak = (i16::MAX as f32 * 0.25) as i16;
    assert!(out.iter().all(|s| s.abs() <= peak));
    assert!(out.iter().any(|s| s.abs() > peak / 2));
}

#[test]
fn quarter_period_reaches_peak() {
    let mut tone = ToneSource::new(12_000.0, 0.5);
    let mut out = [0i16; 4];
    tone.fill(&mut out);
    assert!(out[1] >= 16_380, "got {}", out[1]);
    assert!(out[3] <= -16_380, "got {}", out[3]);
}

#[test]
fn bounded_tone_is_exhausted_after_duration() {
    let mut tone = ToneSource::new(440.0, 0.5).with_duration(Duration::from_millis(10));
    let mut out = vec![0i16; 1000];

    assert_eq!(tone.fill(&mut out), 480);
    assert_eq!(tone.remaining(), Some(0));
    assert_eq!(tone.fill(&mut out), 0);
}

#[test]
fn granted_rate_rescales_duration() {
    let mut tone = ToneSource::default().with_duration(Duration::from_secs(1));
    tone.set_sample_rate(8_000);

    assert_eq!(tone.sample_rate_hz(), 8_000);
    assert_eq!(tone.remaining(), Some(8_000));
}

#[test]
fn bounded_tone_ramps_down_to_silence() {
    let mut tone = ToneSource::new(440.0, 1.0).with_duration(Duration::from_millis(100));
    let mut out = vec![0i16; 4800];
    assert_eq!(tone.fill(&mut out), 4800);

    let tail_peak = out[4790..].iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
    assert!(tail_peak < 400, "tail peak {tail_peak}");
}
