/*!
 * Tests for waveform rendering and click editing
 */

use std::sync::Arc;

use syncread::api::mock::{MockArticleApi, RecordedCall};
use syncread::api::ArticleApi;
use syncread::app_config::WaveformConfig;
use syncread::audio::playback::NullOutput;
use syncread::audio::{AudioSource, DecodedAudio, PlaybackScheduler};
use syncread::editing::waveform::{
    ClickModifier, ClickOutcome, DrawCommand, EditContext, RecordingSurface, WaveformClick, WaveformEditor,
};
use syncread::editing::Boundary;
use syncread::errors::EngineError;
use syncread::{SentenceIndex, SentenceKey};

use crate::common;

const EDITED: SentenceKey = SentenceKey {
    paragraph_index: 0,
    sentence_index: 1,
};

struct Fixture {
    index: SentenceIndex,
    playback: PlaybackScheduler,
    buffer: Arc<DecodedAudio>,
    api: MockArticleApi,
    surface: RecordingSurface,
    editor: WaveformEditor,
}

impl Fixture {
    fn new() -> Self {
        common::init_logging();
        let buffer = Arc::new(
            DecodedAudio::mono(vec![0.5; 6 * common::SAMPLE_RATE as usize], common::SAMPLE_RATE).unwrap(),
        );
        let index = common::sample_index();
        let mut surface = RecordingSurface::new();
        let mut editor = WaveformEditor::new(WaveformConfig::default());
        editor
            .render(index.get(EDITED).unwrap(), AudioSource::Full, &buffer, &mut surface)
            .unwrap();
        Self {
            index,
            playback: PlaybackScheduler::new(Box::new(NullOutput::new())),
            buffer,
            api: common::sample_api(),
            surface,
            editor,
        }
    }

    async fn click(&mut self, x: f64, modifier: ClickModifier, source: AudioSource, highlighted: Option<SentenceKey>) -> Result<ClickOutcome, EngineError> {
        let ctx = EditContext {
            index: &mut self.index,
            playback: &mut self.playback,
            buffer: Some((source, &self.buffer)),
            api: &self.api as &dyn ArticleApi,
            surface: &mut self.surface,
            highlighted,
        };
        self.editor.handle_click(WaveformClick { x, modifier }, ctx).await
    }
}

#[tokio::test]
async fn test_render_shouldSizeCanvasFromWindow() {
    let fixture = Fixture::new();
    let displayed = fixture.editor.displayed().unwrap();

    assert_eq!(displayed.sentence, EDITED);
    assert_eq!(displayed.layout.width, 100);
    assert_eq!(displayed.envelope.len(), 100);
    assert!(displayed.envelope.iter().all(|v| (*v - 0.5).abs() < 1e-6));
    assert!(matches!(fixture.surface.visible()[0], DrawCommand::Clear { width: 100, height: 75 }));
}

#[tokio::test]
async fn test_click_withoutModifier_shouldSeekFromClickedTime() {
    let mut fixture = Fixture::new();

    let outcome = fixture.click(50.0, ClickModifier::None, AudioSource::Full, None).await.unwrap();
    match outcome {
        ClickOutcome::Seek { time_ms, playback } => {
            assert_eq!(time_ms, 1500);
            let started = playback.unwrap();
            assert_eq!(started.window.start_ms, 1500.0);
            assert_eq!(started.window.duration_ms, 500.0);
        }
        other => panic!("expected a seek, got {:?}", other),
    }
    assert_eq!(fixture.editor.displayed().unwrap().marker_x, Some(50.0));
    assert!(fixture.api.calls().is_empty());
}

#[tokio::test]
async fn test_click_withModifiers_shouldValidateThenCommit() {
    let mut fixture = Fixture::new();

    // 10px left of the canvas is 900ms, before the 1000ms start
    let rejected = fixture
        .click(-10.0, ClickModifier::SetEnd, AudioSource::Full, Some(EDITED))
        .await;
    assert!(matches!(rejected, Err(EngineError::InvalidTimeWindow(_))));
    assert!(fixture.api.calls().is_empty());
    assert_eq!(fixture.index.get(EDITED).unwrap().full_end_ms, 2000);

    let committed = fixture
        .click(50.0, ClickModifier::SetStart, AudioSource::Full, Some(EDITED))
        .await
        .unwrap();
    match committed {
        ClickOutcome::Committed { key, boundary, window } => {
            assert_eq!(key, EDITED);
            assert_eq!(boundary, Boundary::Start);
            assert_eq!((window.start_ms, window.end_ms), (1500, 2000));
        }
        other => panic!("expected a commit, got {:?}", other),
    }

    assert!(fixture.api.calls().contains(&RecordedCall::UpdateTimestamp {
        sentence_db_id: common::sample_id(EDITED),
        boundary: Boundary::Start,
        new_time_ms: 1500,
    }));
    let sentence = fixture.index.get(EDITED).unwrap();
    assert_eq!(sentence.full_start_ms, 1500);
    assert_eq!(sentence.database_id, Some(common::sample_id(EDITED)));

    // Re-rendered over the shorter window
    assert_eq!(fixture.editor.displayed().unwrap().layout.window.start_ms, 1500);
    assert_eq!(fixture.editor.displayed().unwrap().layout.width, 50);
}

#[tokio::test]
async fn test_click_withServerRejection_shouldLeaveIndexUnchanged() {
    let mut fixture = Fixture::new();
    fixture.api.set_fail_updates(true);

    let result = fixture
        .click(80.0, ClickModifier::SetEnd, AudioSource::Full, Some(EDITED))
        .await;
    assert!(matches!(result, Err(EngineError::Persistence(_))));
    assert_eq!(fixture.index.get(EDITED).unwrap().full_end_ms, 2000);
    assert_eq!(fixture.api.update_call_count(), 1);
}

#[tokio::test]
async fn test_click_onPartSourceOrOtherSentence_shouldRefuseEdit() {
    let mut fixture = Fixture::new();

    let not_highlighted = fixture
        .click(50.0, ClickModifier::SetStart, AudioSource::Full, Some(SentenceKey::new(0, 0)))
        .await;
    assert!(matches!(not_highlighted, Err(EngineError::EditNotPermitted(_))));

    fixture.editor.close(&mut fixture.surface);
    let buffer = Arc::clone(&fixture.buffer);
    fixture
        .editor
        .render(fixture.index.get(EDITED).unwrap(), AudioSource::Part(0), &buffer, &mut fixture.surface)
        .unwrap();
    let on_part = fixture
        .click(50.0, ClickModifier::SetEnd, AudioSource::Part(0), Some(EDITED))
        .await;
    assert!(matches!(on_part, Err(EngineError::EditNotPermitted(_))));
    assert_eq!(fixture.api.update_call_count(), 0);
}

#[tokio::test]
async fn test_close_shouldRemoveWaveformWithoutTouchingData() {
    let mut fixture = Fixture::new();
    fixture.editor.close(&mut fixture.surface);

    assert!(fixture.editor.displayed().is_none());
    assert!(matches!(fixture.surface.commands().last(), Some(DrawCommand::Remove)));
    assert_eq!(fixture.index.get(EDITED).unwrap().full_start_ms, 1000);

    let result = fixture.click(10.0, ClickModifier::None, AudioSource::Full, None).await;
    assert!(matches!(result, Err(EngineError::EditNotPermitted(_))));
}
