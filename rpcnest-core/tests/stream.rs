use std::time::Duration;

use futures_util::{stream, StreamExt};
use rpcnest_core::stream::{paced, sse_frames, Chunk, PaceOptions, HEARTBEAT_FRAME};
use rpcnest_core::RpcError;
use serde_json::json;

fn frames_to_strings(frames: Vec<Result<bytes::Bytes, std::convert::Infallible>>) -> Vec<String> {
    frames
        .into_iter()
        .map(|f| String::from_utf8(f.unwrap().to_vec()).unwrap())
        .collect()
}

#[tokio::test]
async fn paced_batches_preserve_order_and_count() {
    let items: Vec<u32> = (0..10).collect();
    let chunks: Vec<Chunk<u32>> = paced(
        items.clone(),
        PaceOptions {
            batch_size: 3,
            delay: Duration::ZERO,
        },
    )
    .collect()
    .await;

    let sizes: Vec<usize> = chunks.iter().map(Chunk::len).collect();
    assert_eq!(sizes, vec![3, 3, 3, 1]);
    let flat: Vec<u32> = chunks.into_iter().flat_map(Chunk::into_vec).collect();
    assert_eq!(flat, items);
}

#[tokio::test]
async fn batch_size_one_yields_single_items() {
    let chunks: Vec<_> = paced(
        vec!["a", "b"],
        PaceOptions {
            batch_size: 1,
            delay: Duration::ZERO,
        },
    )
    .collect()
    .await;
    assert_eq!(chunks, vec![Chunk::Item("a"), Chunk::Item("b")]);
}

#[tokio::test]
async fn batch_size_zero_counts_as_one() {
    let chunks: Vec<_> = paced(
        vec![1, 2],
        PaceOptions {
            batch_size: 0,
            delay: Duration::ZERO,
        },
    )
    .collect()
    .await;
    assert_eq!(chunks, vec![Chunk::Item(1), Chunk::Item(2)]);
}

#[tokio::test(start_paused = true)]
async fn paced_sleeps_between_yields_only() {
    let start = tokio::time::Instant::now();
    let chunks: Vec<_> = paced(
        vec![1, 2, 3],
        PaceOptions {
            batch_size: 1,
            delay: Duration::from_millis(100),
        },
    )
    .collect()
    .await;
    assert_eq!(chunks.len(), 3);
    assert_eq!(start.elapsed(), Duration::from_millis(200));
}

#[tokio::test]
async fn paced_empty_input_yields_nothing() {
    let chunks: Vec<Chunk<u8>> = paced(Vec::new(), PaceOptions::default()).collect().await;
    assert!(chunks.is_empty());
}

#[tokio::test]
async fn sse_frames_encode_each_value() {
    let source = stream::iter(vec![Ok::<_, RpcError>(json!({"n": 1})), Ok(json!("two"))]);
    let frames = frames_to_strings(sse_frames(source, Duration::from_secs(30)).collect().await);
    assert_eq!(frames, vec!["data: {\"n\":1}\n\n", "data: \"two\"\n\n"]);
}

#[tokio::test(start_paused = true)]
async fn sse_frames_send_heartbeats_while_idle() {
    let source = async_stream::stream! {
        tokio::time::sleep(Duration::from_millis(50)).await;
        yield Ok::<_, RpcError>(1);
    };
    let frames = frames_to_strings(sse_frames(source, Duration::from_millis(20)).collect().await);
    let heartbeat = String::from_utf8(HEARTBEAT_FRAME.to_vec()).unwrap();
    assert_eq!(frames, vec![heartbeat.clone(), heartbeat, "data: 1\n\n".to_string()]);
}

#[tokio::test]
async fn sse_frames_end_with_an_error_event() {
    let source = stream::iter(vec![Ok(1), Err(RpcError::bad_request("bad")), Ok(2)]);
    let frames = frames_to_strings(sse_frames(source, Duration::ZERO).collect().await);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], "data: 1\n\n");
    assert!(frames[1].starts_with("event: error\n"));
    assert!(frames[1].contains("\"code\":\"BAD_REQUEST\""));
}
