use chain_scanner::store::checkpoint_key;
use chain_scanner::{
    ChainKind, ChainScanConfig, CheckpointStore, MemoryCheckpointStore, ScanScheduler,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_rpc(server: &MockServer, rpc_method: &str, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result })),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn confirmed_blocks_flow_from_node_to_receiver() {
    let server = MockServer::start().await;
    mock_rpc(&server, "eth_blockNumber", json!("0x64")).await;
    mock_rpc(&server, "eth_getBlockTransactionCountByNumber", json!("0x1")).await;
    mock_rpc(
        &server,
        "eth_getBlockByNumber",
        json!({
            "timestamp": "0x1",
            "transactions": [{
                "hash": "0xabc",
                "from": "0x1000000000000000000000000000000000000001",
                "to": "0x2000000000000000000000000000000000000002",
                "input": "0x",
                "value": "0xde0b6b3a7640000"
            }]
        }),
    )
    .await;

    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    for shard in 0..2 {
        store
            .save(&checkpoint_key(ChainKind::Eth, shard), 96)
            .await
            .unwrap();
    }

    let configs = vec![ChainScanConfig::new(ChainKind::Eth, 2, vec![server.uri()])];
    let (scheduler, mut rx) = ScanScheduler::new(2, 16, Some(store.clone()), &configs).unwrap();

    for handle in scheduler.process().await {
        handle.await.unwrap();
    }

    let mut heights = Vec::new();
    while let Ok(batch) = rx.try_recv() {
        for bundle in batch {
            assert_eq!(bundle.chain, ChainKind::Eth);
            assert_eq!(bundle.transfers[0].amount, "1");
            assert_eq!(bundle.confirmations, 100 - bundle.block_num);
            heights.push(bundle.block_num);
        }
    }
    heights.sort_unstable();
    assert_eq!(heights, vec![97, 98]);

    assert_eq!(store.get(&checkpoint_key(ChainKind::Eth, 0)).await, 98);
    assert_eq!(store.get(&checkpoint_key(ChainKind::Eth, 1)).await, 97);
}

#[tokio::test]
async fn tron_node_errors_keep_the_checkpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/walletsolidity/getblock"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "block_header": { "raw_data": { "number": 1_000 } }
        })))
        .mount(&server)
        .await;
    for endpoint in [
        "/walletsolidity/getblockbynum",
        "/walletsolidity/gettransactioninfobyblocknum",
    ] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Error": "node busy" })))
            .mount(&server)
            .await;
    }

    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let key = checkpoint_key(ChainKind::Tron, 0);
    store.save(&key, 989).await.unwrap();

    let configs = vec![ChainScanConfig::new(ChainKind::Tron, 0, vec![server.uri()])];
    let (scheduler, mut rx) = ScanScheduler::new(1, 16, Some(store.clone()), &configs).unwrap();
    for handle in scheduler.process().await {
        handle.await.unwrap();
    }

    assert!(rx.try_recv().is_err());
    assert_eq!(store.get(&key).await, 989);
}
