// Download resolution and upload/download round trips

mod common;

use bytes::Bytes;
use common::{MockBridge, MockConnector, seeded_bytes, write_source};
use ferry_core::{ContentHash, FarmerDescriptor, Pointer, PointerRecord, pointers_from_records};
use ferry_transfer::{
    DownloadResolver, ShardDemuxer, ShardMuxer, TransferError, TransferResult, UploadOptions,
    UploadOrchestrator,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

async fn drain(muxer: ShardMuxer) -> TransferResult<Vec<u8>> {
    let mut muxer = muxer;
    let mut out = Vec::new();
    while let Some(chunk) = muxer.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

fn pointer(index: u32, data: &[u8]) -> Pointer {
    Pointer {
        index,
        size: data.len() as u64,
        farmer: FarmerDescriptor::new("127.0.0.1", 4000, "farmer-1"),
        token: format!("pull:file:{index}"),
        hash: Some(ContentHash::compute(data).to_hex()),
    }
}

#[tokio::test]
async fn test_upload_then_download_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let data = seeded_bytes(21, 10_000);
    let path = write_source(dir.path(), "payload.bin", &data);

    let bridge = Arc::new(MockBridge::local());
    let connector = Arc::new(MockConnector::new());
    let options = UploadOptions {
        shard_size: 1024,
        ..UploadOptions::default()
    };
    let entry = UploadOrchestrator::new(bridge.clone(), connector.clone(), options)
        .store_file("bucket", "push-token", &path)
        .await
        .unwrap();

    let resolver = DownloadResolver::new(connector.clone(), Duration::from_secs(5));
    let muxer = resolver
        .resolve_file(bridge.as_ref(), "bucket", "pull-token", &entry.id)
        .await
        .unwrap();
    assert_eq!(muxer.expected(), 10);
    assert_eq!(drain(muxer).await.unwrap(), data.to_vec());
}

#[tokio::test]
async fn test_demux_then_mux_in_any_order() {
    let data = seeded_bytes(22, 333);
    let shards: Vec<_> = ShardDemuxer::new(std::io::Cursor::new(data.to_vec()), 50)
        .unwrap()
        .into_stream()
        .map(|shard| shard.unwrap())
        .collect()
        .await;
    assert_eq!(shards.len(), 7);

    for rotation in 0..shards.len() {
        let (muxer, input) = ShardMuxer::new(shards.len() as u32);
        let mut order: Vec<_> = shards.iter().collect();
        order.rotate_left(rotation);
        order.reverse();
        for shard in order {
            let chunks: Vec<TransferResult<Bytes>> = shard
                .data()
                .chunks(16)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            input
                .attach(shard.index(), Box::pin(futures::stream::iter(chunks)))
                .unwrap();
        }
        assert_eq!(drain(muxer).await.unwrap(), data.to_vec());
    }
}

#[tokio::test]
async fn test_open_failure_returns_error_instead_of_stream() {
    let connector = Arc::new(MockConnector::failing_open());
    let resolver = DownloadResolver::new(connector.clone(), Duration::from_secs(5));

    let pointers = vec![pointer(0, b"aaaa"), pointer(1, b"bbbb")];
    let err = resolver.resolve(&pointers).await.err().unwrap();
    assert_eq!(err.to_string(), "connection refused");
}

#[tokio::test]
async fn test_open_timeout_is_reported() {
    let connector = Arc::new(MockConnector::hanging_open());
    let resolver = DownloadResolver::new(connector, Duration::from_millis(50));

    let err = resolver.resolve(&[pointer(0, b"x")]).await.err().unwrap();
    assert!(matches!(err, TransferError::Timeout(_)));
}

#[tokio::test]
async fn test_invalid_pointer_indices_are_rejected_before_opening() {
    let connector = Arc::new(MockConnector::new());
    let resolver = DownloadResolver::new(connector.clone(), Duration::from_secs(5));

    let err = resolver
        .resolve(&[pointer(0, b"a"), pointer(2, b"c")])
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TransferError::Sequencing(_)));

    let err = resolver
        .resolve(&[pointer(0, b"a"), pointer(0, b"a")])
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TransferError::Sequencing(_)));
    assert_eq!(connector.opens(), 0);
}

#[tokio::test]
async fn test_corrupt_shard_fails_the_stream() {
    let connector = Arc::new(MockConnector::new());
    connector.insert("file:0", Bytes::from_static(b"hello "));
    connector.insert("file:1", Bytes::from_static(b"wOrld"));
    let resolver = DownloadResolver::new(connector, Duration::from_secs(5));

    let muxer = resolver
        .resolve(&[pointer(0, b"hello "), pointer(1, b"world")])
        .await
        .unwrap();
    let err = drain(muxer).await.unwrap_err();
    assert!(err.to_string().contains("hash mismatch"));
}

#[tokio::test]
async fn test_short_shard_fails_the_stream() {
    let connector = Arc::new(MockConnector::new());
    connector.insert("file:0", Bytes::from_static(b"hel"));
    let resolver = DownloadResolver::new(connector, Duration::from_secs(5));

    let muxer = resolver.resolve(&[pointer(0, b"hello")]).await.unwrap();
    let err = drain(muxer).await.unwrap_err();
    assert!(matches!(err, TransferError::Protocol(_)));
}

#[tokio::test]
async fn test_empty_pointer_list_yields_empty_stream() {
    let connector = Arc::new(MockConnector::new());
    let resolver = DownloadResolver::new(connector, Duration::from_secs(5));

    let muxer = resolver.resolve(&[]).await.unwrap();
    assert!(drain(muxer).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pointers_without_index_resolve_by_position() {
    let first = seeded_bytes(31, 40);
    let second = seeded_bytes(32, 25);
    let connector = Arc::new(MockConnector::new());
    connector.insert("file:0", first.clone());
    connector.insert("file:1", second.clone());

    let body = serde_json::json!([
        {
            "size": first.len(),
            "token": "pull:file:0",
            "hash": ContentHash::compute(&first).to_hex(),
            "farmer": { "address": "127.0.0.1", "port": 4000, "nodeID": "farmer-1" }
        },
        {
            "size": second.len(),
            "token": "pull:file:1",
            "farmer": { "address": "127.0.0.1", "port": 4001, "nodeID": "farmer-2" }
        }
    ]);
    let records: Vec<PointerRecord> = serde_json::from_value(body).unwrap();
    let pointers = pointers_from_records(records);

    let resolver = DownloadResolver::new(connector.clone(), Duration::from_secs(5));
    let muxer = resolver.resolve(&pointers).await.unwrap();
    assert_eq!(muxer.expected(), 2);

    let mut expected = first.to_vec();
    expected.extend_from_slice(&second);
    assert_eq!(drain(muxer).await.unwrap(), expected);
}
