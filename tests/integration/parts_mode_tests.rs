/*!
 * Integration tests for reading in parts mode
 */

use anyhow::Result;
use bytes::Bytes;
use syncread::api::mock::RecordedCall;
use syncread::editing::waveform::{ClickModifier, WaveformClick};
use syncread::errors::EngineError;
use syncread::{AudioSource, Direction, SentenceKey};

use crate::common;

/// Test local part loading with checksums and part-aware auto-play
#[tokio::test]
async fn test_localParts_shouldVerifyAndOnlyAutoplayMatchingPart() -> Result<()> {
    let part0 = common::stepped_wav(3000);
    let part1 = common::stepped_wav(3000);
    let annotations = common::annotations_with_checksums(&[part0.as_ref(), part1.as_ref()]);
    let (mut session, output) = common::sample_session(common::sample_api(), &annotations);

    session.load_local_part(0, part0.clone()).await?;
    assert_eq!(session.sources().loaded_part_index(), Some(0));

    let first = session.navigate(Direction::Next).await?.unwrap();
    assert_eq!(first.key, SentenceKey::new(0, 0));
    assert!(first.playback.is_some());
    assert_eq!(output.started()[0].1.start_ms, 0.0);

    session.navigate(Direction::Next).await?;
    session.navigate(Direction::Next).await?;
    let other_part = session.navigate(Direction::Next).await?.unwrap();
    assert_eq!(other_part.key, SentenceKey::new(1, 0));
    assert_eq!(other_part.playback, None);
    assert!(!session.playback().is_active());

    assert!(matches!(
        session.toggle_play_pause(),
        Err(EngineError::PartNotLoaded { needed: 1, loaded: Some(0) })
    ));
    Ok(())
}

/// Test that a tampered part file is rejected and nothing stays loaded
#[tokio::test]
async fn test_loadLocalPart_withTamperedFile_shouldLeaveNothingLoaded() -> Result<()> {
    let part0 = common::stepped_wav(3000);
    let part1 = common::stepped_wav(3000);
    let annotations = common::annotations_with_checksums(&[part0.as_ref(), part1.as_ref()]);
    let (mut session, _) = common::sample_session(common::sample_api(), &annotations);

    session.load_local_part(0, part0.clone()).await?;
    session.pointer_select(SentenceKey::new(0, 0)).await?;
    session.toggle_waveform()?;

    let mut tampered = part1.to_vec();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    let result = session.load_local_part(1, Bytes::from(tampered)).await;

    assert!(matches!(result, Err(EngineError::ChecksumMismatch { part_index: 1, .. })));
    assert!(session.sources().current().is_none());
    assert!(session.displayed_waveform().is_none());
    assert_eq!(session.sources().active_source(), Some(AudioSource::Part(1)));
    Ok(())
}

/// Test downloading a part and playing its part-relative window
#[tokio::test]
async fn test_fetchPart_shouldPlayPartRelativeWindow() -> Result<()> {
    let api = common::sample_api().with_part(1, common::stepped_wav(3000));
    let (mut session, output) = common::sample_session(api.clone(), &common::sample_annotations());

    session.fetch_part(1).await?;
    assert!(api.calls().contains(&RecordedCall::FetchAudioPart(1)));

    session.pointer_select(SentenceKey::new(1, 1)).await?;
    session.toggle_play_pause()?;
    let (_, window) = output.started()[0];
    assert_eq!(window.start_ms, 1500.0);
    assert_eq!(window.duration_ms, 1500.0);
    Ok(())
}

/// Test that the part waveform can preview but never edit
#[tokio::test]
async fn test_partWaveform_shouldRefuseBoundaryEdits() -> Result<()> {
    let api = common::sample_api().with_part(0, common::stepped_wav(3000));
    let (mut session, _) = common::sample_session(api.clone(), &common::sample_annotations());
    session.fetch_part(0).await?;
    session.pointer_select(SentenceKey::new(0, 1)).await?;
    session.toggle_waveform()?;
    assert_eq!(
        session.displayed_waveform().map(|d| d.source),
        Some(AudioSource::Part(0))
    );

    session
        .waveform_click(WaveformClick { x: 20.0, modifier: ClickModifier::None })
        .await?;
    let edit = session
        .waveform_click(WaveformClick { x: 20.0, modifier: ClickModifier::SetStart })
        .await;
    assert!(matches!(edit, Err(EngineError::EditNotPermitted(_))));
    assert_eq!(api.update_call_count(), 0);
    Ok(())
}

/// Test that an out-of-range part is refused without touching the loaded audio
#[tokio::test]
async fn test_activatePart_withInvalidIndex_shouldFail() -> Result<()> {
    let (mut session, _) = common::sample_session(common::sample_api(), &common::sample_annotations());
    session.load_full_audio(common::stepped_wav(6000)).await?;

    let result = session.activate_part(5);
    assert!(matches!(result, Err(EngineError::InvalidPartIndex { index: 5, num_parts: 2 })));
    assert_eq!(session.sources().current_source_kind(), Some(AudioSource::Full));
    Ok(())
}
