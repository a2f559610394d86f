/*!
 * Tests for batch distribution and the server-side alignment task
 */

use rand::Rng;
use syncread::api::mock::{MockArticleApi, RecordedCall};
use syncread::api::{AlignmentTaskResponse, TimestampUpdate};
use syncread::editing::batch::{distribute, execute_alignment_task, plan_distribution, split_window};
use syncread::errors::EngineError;
use syncread::{SentenceKey, TimeWindow};

use crate::common;

fn key(p: usize, s: usize) -> SentenceKey {
    SentenceKey::new(p, s)
}

#[test]
fn test_splitWindow_withRandomRuns_shouldTileReferenceExactly() {
    let mut rng = rand::rng();
    for _ in 0..200 {
        let count = rng.random_range(1..30usize);
        let start = rng.random_range(0..100_000i64);
        // Long enough that rounding drift can never consume the last window
        let duration = rng.random_range((count * count) as i64 + 1..60_000);
        let reference = TimeWindow::new(start, start + duration).unwrap();
        let run: Vec<SentenceKey> = (0..count).map(|i| key(0, i)).collect();

        let planned = split_window(reference, &run).unwrap();
        assert_eq!(planned.len(), count);
        assert_eq!(planned[0].window.start_ms, reference.start_ms);
        assert_eq!(planned[count - 1].window.end_ms, reference.end_ms);
        for pair in planned.windows(2) {
            assert_eq!(pair[0].window.end_ms, pair[1].window.start_ms);
        }
        assert!(planned.iter().all(|p| p.window.start_ms < p.window.end_ms));
    }
}

#[test]
fn test_planDistribution_shouldUseEndingSentenceWindow() {
    let index = common::sample_index();
    let planned = plan_distribution(&index, key(0, 0), key(0, 2)).unwrap();
    let windows: Vec<(i64, i64)> = planned
        .iter()
        .map(|p| (p.window.start_ms, p.window.end_ms))
        .collect();
    assert_eq!(windows, vec![(2000, 2333), (2333, 2666), (2666, 3000)]);
}

#[test]
fn test_planDistribution_acrossParagraphs_shouldIncludeEveryStep() {
    let index = common::sample_index();
    let planned = plan_distribution(&index, key(0, 2), key(1, 1)).unwrap();
    let keys: Vec<SentenceKey> = planned.iter().map(|p| p.key).collect();
    assert_eq!(keys, vec![key(0, 2), key(1, 0), key(1, 1)]);
}

#[tokio::test]
async fn test_distribute_shouldSendOneBatchAndPatchIndex() {
    let mut index = common::sample_index();
    let api = common::sample_api();

    let updates = distribute(&mut index, key(0, 0), key(0, 2), &api).await.unwrap();

    assert_eq!(
        updates,
        vec![
            TimestampUpdate { id: 100, new_start_ms: 2000, new_end_ms: 2333 },
            TimestampUpdate { id: 101, new_start_ms: 2333, new_end_ms: 2666 },
            TimestampUpdate { id: 102, new_start_ms: 2666, new_end_ms: 3000 },
        ]
    );
    assert_eq!(api.update_call_count(), 1);
    assert!(api.calls().contains(&RecordedCall::BatchUpdate(updates.clone())));
    assert_eq!(index.get(key(0, 0)).unwrap().full_window().unwrap(), TimeWindow::new(2000, 2333).unwrap());
    assert_eq!(index.get(key(0, 2)).unwrap().full_start_ms, 2666);
}

#[tokio::test]
async fn test_distribute_withBatchRejected_shouldLeaveIndexUnchanged() {
    let mut index = common::sample_index();
    let api = common::sample_api().fail_updates();

    let result = distribute(&mut index, key(0, 0), key(0, 2), &api).await;
    assert!(matches!(result, Err(EngineError::Persistence(_))));
    assert_eq!(index.get(key(0, 0)).unwrap().full_start_ms, 0);
    assert_eq!(index.get(key(0, 1)).unwrap().full_end_ms, 2000);
}

#[tokio::test]
async fn test_distribute_withUnresolvableId_shouldNotCallBatch() {
    let mut index = common::sample_index();
    let api = MockArticleApi::new().with_sentence_id(key(0, 0), 100);

    let result = distribute(&mut index, key(0, 0), key(0, 2), &api).await;
    assert!(matches!(result, Err(EngineError::Resolution { .. })));
    assert_eq!(api.update_call_count(), 0);
    assert!(index.get(key(0, 0)).unwrap().database_id.is_none());
}

#[tokio::test]
async fn test_executeAlignmentTask_shouldSendRunAndApplyResponse() {
    let mut index = common::sample_index();
    let api = common::sample_api().with_task_response(AlignmentTaskResponse {
        status: "success".to_string(),
        message: None,
        updated_sentences: vec![
            TimestampUpdate { id: 110, new_start_ms: 3100, new_end_ms: 4200 },
            TimestampUpdate { id: 111, new_start_ms: 4200, new_end_ms: 5900 },
        ],
    });

    let updates = execute_alignment_task(&mut index, key(1, 0), key(1, 1), &api).await.unwrap();
    assert_eq!(updates.len(), 2);

    let request = api
        .calls()
        .into_iter()
        .find_map(|call| match call {
            RecordedCall::ExecuteTask(request) => Some(request),
            _ => None,
        })
        .unwrap();
    assert_eq!((request.start_time_ms, request.end_time_ms), (3000, 6000));
    let ids: Vec<i64> = request.sentences_data.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![110, 111]);
    assert_eq!(request.sentences_data[0].text, index.get(key(1, 0)).unwrap().text);

    assert_eq!(index.get(key(1, 0)).unwrap().full_window().unwrap(), TimeWindow::new(3100, 4200).unwrap());
    assert_eq!(index.get(key(1, 1)).unwrap().full_end_ms, 5900);
}

#[test]
fn test_distribute_withEndingBeforeBeginning_shouldRejectSelection() {
    let mut index = common::sample_index();
    let api = common::sample_api();

    let result = tokio_test::block_on(async {
        distribute(&mut index, key(1, 0), key(0, 1), &api).await
    });

    assert!(matches!(result, Err(EngineError::InvalidSelection(_))));
    assert!(api.calls().is_empty());
}
