/*!
 * Tests for reading location persistence through activations
 */

use std::time::Duration;

use syncread::api::mock::MockArticleApi;
use syncread::reading_location::{ActivationSource, ReadingLocation, ReadingLocationTracker};
use syncread::{Direction, SentenceKey};

use crate::common;

fn location(p: usize, s: usize) -> ReadingLocation {
    ReadingLocation::from(SentenceKey::new(p, s))
}

#[tokio::test]
async fn test_navigation_shouldAutosaveEveryFifthActivation() {
    let api = common::sample_api();
    let (mut session, _) = common::sample_session(api.clone(), &common::sample_annotations());

    for _ in 0..4 {
        let outcome = session.navigate(Direction::Next).await.unwrap().unwrap();
        assert!(!outcome.saved);
    }
    assert!(api.saved_locations().is_empty());

    let fifth = session.navigate(Direction::Next).await.unwrap().unwrap();
    assert!(fifth.saved);
    assert_eq!(fifth.key, SentenceKey::new(1, 1));
    assert_eq!(session.location().counter(), 0);

    session.wait_location_saves().await;
    assert_eq!(api.saved_locations(), vec![location(1, 1)]);
    assert_eq!(session.location().last_saved(), Some(location(1, 1)));
    assert!(session.location().last_saved_at().is_some());
}

#[tokio::test]
async fn test_pointerSelection_shouldCountTowardThreshold() {
    let api = common::sample_api();
    let (mut session, _) = common::sample_session(api.clone(), &common::sample_annotations());

    let keys = [(0, 1), (0, 2), (1, 0), (1, 1), (0, 0)];
    for (p, s) in keys {
        session.pointer_select(SentenceKey::new(p, s)).await.unwrap();
    }
    session.wait_location_saves().await;
    assert_eq!(api.saved_locations(), vec![location(0, 0)]);

    // Clicking the highlighted sentence again is not navigation
    for _ in 0..5 {
        let outcome = session.pointer_select(SentenceKey::new(0, 0)).await.unwrap();
        assert!(!outcome.scroll);
    }
    session.wait_location_saves().await;
    assert_eq!(api.saved_locations().len(), 1);
}

#[tokio::test]
async fn test_manualSave_shouldSaveImmediatelyWithoutCounting() {
    let api = common::sample_api();
    let (mut session, _) = common::sample_session(api.clone(), &common::sample_annotations());

    session.pointer_select(SentenceKey::new(0, 2)).await.unwrap();
    assert!(session.save_location_now().await.unwrap());

    assert_eq!(api.saved_locations(), vec![location(0, 2)]);
    assert_eq!(session.location().counter(), 1);
    assert_eq!(session.location().last_saved(), Some(location(0, 2)));
}

#[tokio::test]
async fn test_restore_shouldOnlySaveForRestoreButton() {
    let api = common::sample_api();
    let (mut session, _) = common::sample_session(api.clone(), &common::sample_annotations());

    let restored = session.restore_initial_location().await.unwrap().unwrap();
    assert_eq!(restored.key, SentenceKey::new(1, 0));
    assert!(!restored.scroll);
    assert!(api.saved_locations().is_empty());

    session.navigate(Direction::Next).await.unwrap();
    let back = session.restore_button().await.unwrap().unwrap();
    assert_eq!(back.key, SentenceKey::new(1, 0));
    assert!(back.scroll);
    assert!(back.saved);
    session.wait_location_saves().await;
    assert_eq!(api.saved_locations(), vec![location(1, 0)]);
}

#[tokio::test]
async fn test_autosave_withUnresponsiveServer_shouldNotBlockActivation() {
    let api = common::sample_api().hang_saves();
    let (mut session, _) = common::sample_session(api.clone(), &common::sample_annotations());

    let keys = [(0, 1), (0, 2), (1, 0), (1, 1), (0, 0), (0, 1)];
    for (i, (p, s)) in keys.into_iter().enumerate() {
        let outcome = tokio::time::timeout(
            Duration::from_millis(500),
            session.pointer_select(SentenceKey::new(p, s)),
        )
        .await
        .expect("activation must not wait for the server")
        .unwrap();
        assert_eq!(outcome.saved, i == 4);
    }

    assert_eq!(session.highlighted(), Some(SentenceKey::new(0, 1)));
    assert_eq!(session.location().pending_saves(), 1);
    assert_eq!(session.poll_location_saves(), 0);
    assert!(session.location().last_saved().is_none());

    tokio::task::yield_now().await;
    assert_eq!(api.saved_locations(), vec![location(0, 0)]);
}

#[tokio::test]
async fn test_saveFailure_shouldNotBreakActivation() {
    let api = MockArticleApi::new().fail_saves();
    let (mut session, _) = common::sample_session(api.clone(), &common::sample_annotations());

    session.pointer_select(SentenceKey::new(0, 1)).await.unwrap();
    let saved = session.save_location_now().await.unwrap();

    assert!(!saved);
    assert_eq!(session.highlighted(), Some(SentenceKey::new(0, 1)));
    assert_eq!(api.saved_locations().len(), 1);
    assert!(session.location().last_saved().is_none());
}

#[tokio::test]
async fn test_reselectingHighlightedSentence_shouldNotAdvanceCounter() {
    let api = common::sample_api();
    let (mut session, _) = common::sample_session(api.clone(), &common::sample_annotations());

    session.navigate(Direction::Next).await.unwrap();
    assert_eq!(session.location().counter(), 1);
    for _ in 0..6 {
        session.pointer_select(SentenceKey::new(0, 0)).await.unwrap();
    }
    assert_eq!(session.location().counter(), 1);
}

#[test]
fn test_tracker_withZeroThreshold_shouldSaveOnEveryNavigation() {
    let mut tracker = ReadingLocationTracker::new(0, None);
    assert_eq!(tracker.threshold(), 1);
    assert!(tracker.note_navigation(ActivationSource::ControllerPrevious));
    assert!(tracker.note_navigation(ActivationSource::PointerNewSentence));
    assert!(!tracker.note_navigation(ActivationSource::ManualSave));
}
