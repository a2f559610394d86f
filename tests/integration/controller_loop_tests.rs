/*!
 * Integration tests for the controller polling loop
 */

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use syncread::audio::playback::NullOutput;
use syncread::audio::SymphoniaDecoder;
use syncread::controller::{ControllerAction, ControllerState};
use syncread::editing::waveform::RecordingSurface;
use syncread::{Config, ReaderSession, SentenceKey};

use crate::common::{self, ScriptedController};

fn fast_session(output: NullOutput) -> ReaderSession {
    common::init_logging();
    let mut config = Config::default();
    config.controller.cooldown_ms = 0;
    config.controller.poll_interval_ms = 1;
    ReaderSession::new(
        config,
        &common::sample_annotations(),
        Arc::new(common::sample_api()),
        Arc::new(SymphoniaDecoder),
        Box::new(output),
        Box::new(RecordingSurface::new()),
    )
    .unwrap()
}

/// Test that the loop applies edge-triggered presses and stops on disconnect
#[tokio::test]
async fn test_runController_shouldApplyPressesUntilUnplugged() -> Result<()> {
    let output = NullOutput::new();
    let mut session = fast_session(output.clone());
    session.load_full_audio(common::stepped_wav(6000)).await?;

    let pad = ScriptedController::new(vec![
        ScriptedController::frame(&[]),
        ScriptedController::frame(&[0]),
        ScriptedController::frame(&[0]),
        ScriptedController::frame(&[]),
        ScriptedController::frame(&[0]),
        ScriptedController::frame(&[]),
        ScriptedController::frame(&[3]),
        ScriptedController::frame(&[]),
        ScriptedController::frame(&[1]),
    ]);
    session.connect_controller(Box::new(pad.clone()))?;
    assert_eq!(session.controller_state(), ControllerState::Connected);

    tokio::time::timeout(Duration::from_secs(5), session.run_controller())
        .await
        .expect("loop should stop once the pad is unplugged");

    assert_eq!(pad.remaining(), 0);
    assert_eq!(session.controller_state(), ControllerState::Disconnected);
    assert_eq!(session.highlighted(), Some(SentenceKey::new(0, 1)));
    assert!(session.translation_visible());

    // Two auto-played clips, then play/pause stopped the second one
    assert_eq!(output.started().len(), 2);
    assert!(!session.playback().is_active());
    Ok(())
}

/// Test controller actions applied directly share the pointer primitives
#[tokio::test]
async fn test_applyControllerAction_shouldNavigateAndToggle() -> Result<()> {
    let output = NullOutput::new();
    let mut session = fast_session(output.clone());

    session.apply_controller_action(ControllerAction::Previous).await?;
    assert_eq!(session.highlighted(), Some(SentenceKey::new(1, 1)));

    session.apply_controller_action(ControllerAction::Next).await?;
    assert_eq!(session.highlighted(), Some(SentenceKey::new(0, 0)));

    assert!(session.apply_controller_action(ControllerAction::PlayPause).await.is_err());

    session.apply_controller_action(ControllerAction::ToggleTranslation).await?;
    session.apply_controller_action(ControllerAction::ToggleTranslation).await?;
    assert!(!session.translation_visible());
    assert!(output.started().is_empty());
    Ok(())
}

/// Test that a pad which cannot be read is never connected
#[tokio::test]
async fn test_connectController_withDeadPad_shouldStayDisconnected() {
    let mut session = fast_session(NullOutput::new());
    let result = session.connect_controller(Box::new(ScriptedController::new(Vec::new())));
    assert!(result.is_err());
    assert_eq!(session.controller_state(), ControllerState::Disconnected);
}
