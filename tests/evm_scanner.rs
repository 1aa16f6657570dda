use chain_scanner::scanners::evm::EvmScanner;
use chain_scanner::{AppError, BlockchainScanner, ChainKind, ChainScanConfig, MonitoredContract};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USDT: &str = "0x55d398326f99059ff775485246999027b3197955";

fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

async fn mock_rpc(server: &MockServer, rpc_method: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(response)
        .mount(server)
        .await;
}

fn config(server: &MockServer) -> ChainScanConfig {
    ChainScanConfig::new(ChainKind::Bsc, 3, vec![server.uri()])
        .with_contracts(vec![MonitoredContract::new(USDT, "USDT", 18)])
}

fn scanner(cfg: &ChainScanConfig) -> EvmScanner {
    EvmScanner::new(cfg)
        .unwrap()
        .with_retry_delay(Duration::from_millis(1))
}

fn sample_block() -> Value {
    json!({
        "number": "0x5a",
        "timestamp": "0x65000000",
        "transactions": [
            {
                "hash": "0xnative",
                "from": "0x1000000000000000000000000000000000000001",
                "to": "0x2000000000000000000000000000000000000002",
                "input": "0x",
                "value": "0x1bc16d674ec80000"
            },
            {
                "hash": "0xtoken",
                "from": "0x1000000000000000000000000000000000000001",
                "to": "0x55d398326f99059fF775485246999027B3197955",
                "input": format!(
                    "0xa9059cbb{:0>64}{:064x}",
                    "3000000000000000000000000000000000000003",
                    250_000_000_000_000_000u64
                ),
                "value": "0x0"
            },
            {
                "hash": "0xapprove",
                "from": "0x1000000000000000000000000000000000000001",
                "to": "0x55d398326f99059fF775485246999027B3197955",
                "input": format!("0x095ea7b3{:0>64}{:064x}", "3", 1),
                "value": "0x0"
            }
        ]
    })
}

#[tokio::test]
async fn reads_head_height() {
    let server = MockServer::start().await;
    mock_rpc(&server, "eth_blockNumber", rpc_result(json!("0x2a"))).await;

    let scanner = scanner(&config(&server));
    assert_eq!(scanner.get_latest_block().await.unwrap(), 42);
}

#[tokio::test]
async fn surfaces_json_rpc_errors() {
    let server = MockServer::start().await;
    mock_rpc(
        &server,
        "eth_blockNumber",
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32005, "message": "limit exceeded" }
        })),
    )
    .await;

    let err = scanner(&config(&server)).get_latest_block().await.unwrap_err();
    match err {
        AppError::RpcError { code, message } => {
            assert_eq!(code, -32005);
            assert_eq!(message, "limit exceeded");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn surfaces_http_failures() {
    let server = MockServer::start().await;
    mock_rpc(&server, "eth_blockNumber", ResponseTemplate::new(502)).await;

    let err = scanner(&config(&server)).get_latest_block().await.unwrap_err();
    assert!(matches!(err, AppError::HttpStatus { status: 502, .. }));
}

#[tokio::test]
async fn decodes_native_and_token_transfers() {
    let server = MockServer::start().await;
    mock_rpc(&server, "eth_blockNumber", rpc_result(json!("0x64"))).await;
    mock_rpc(&server, "eth_getBlockTransactionCountByNumber", rpc_result(json!("0x3"))).await;
    mock_rpc(&server, "eth_getBlockByNumber", rpc_result(sample_block())).await;

    let bundles = scanner(&config(&server)).scan_block(90).await.unwrap();

    assert_eq!(bundles.len(), 2);
    let native = &bundles[0];
    assert_eq!(native.tx_id, "0xnative");
    assert_eq!(native.confirmations, 10);
    assert_eq!(native.chain, ChainKind::Bsc);
    assert_eq!(native.transfer_timestamp, 0x65000000 * 1000);
    assert_eq!(native.transfers[0].amount, "2");
    assert_eq!(native.transfers[0].symbol, "BNB");
    assert_eq!(native.transfers[0].contract, "");

    let token = &bundles[1];
    assert_eq!(token.tx_id, "0xtoken");
    assert_eq!(token.transfers[0].contract, USDT);
    assert_eq!(token.transfers[0].symbol, "USDT");
    assert_eq!(token.transfers[0].amount, "0.25");
    assert_eq!(
        token.transfers[0].to_address,
        "0x3000000000000000000000000000000000000003"
    );
}

#[tokio::test]
async fn empty_block_yields_nothing_after_retries() {
    let server = MockServer::start().await;
    mock_rpc(&server, "eth_blockNumber", rpc_result(json!("0x64"))).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getBlockTransactionCountByNumber" })))
        .respond_with(rpc_result(json!("0x0")))
        .expect(5)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getBlockByNumber" })))
        .respond_with(rpc_result(sample_block()))
        .expect(0)
        .mount(&server)
        .await;

    let bundles = scanner(&config(&server)).scan_block(90).await.unwrap();
    assert!(bundles.is_empty());
}

#[tokio::test]
async fn unknown_block_count_is_treated_as_empty() {
    let server = MockServer::start().await;
    mock_rpc(&server, "eth_blockNumber", rpc_result(json!("0x64"))).await;
    mock_rpc(&server, "eth_getBlockTransactionCountByNumber", rpc_result(Value::Null)).await;

    let bundles = scanner(&config(&server)).scan_block(200).await.unwrap();
    assert!(bundles.is_empty());
}

#[tokio::test]
async fn registered_contracts_can_be_added_later() {
    let server = MockServer::start().await;
    mock_rpc(&server, "eth_blockNumber", rpc_result(json!("0x64"))).await;
    mock_rpc(&server, "eth_getBlockTransactionCountByNumber", rpc_result(json!("0x3"))).await;
    mock_rpc(&server, "eth_getBlockByNumber", rpc_result(sample_block())).await;

    let cfg = ChainScanConfig::new(ChainKind::Bsc, 0, vec![server.uri()]);
    let scanner = scanner(&cfg);
    assert_eq!(scanner.scan_block(90).await.unwrap().len(), 1);

    scanner.add_contracts(&[MonitoredContract::new(USDT, "USDT", 18)]);
    assert_eq!(scanner.scan_block(90).await.unwrap().len(), 2);
}

#[tokio::test]
async fn receipt_check_reports_status() {
    let server = MockServer::start().await;
    mock_rpc(
        &server,
        "eth_getTransactionReceipt",
        rpc_result(json!({ "transactionHash": "0xtoken", "status": "0x1" })),
    )
    .await;

    let scanner = scanner(&config(&server));
    assert!(scanner.is_success("0xtoken").await.unwrap());
    assert!(scanner.is_success("0xother").await.is_err());
}

#[tokio::test]
async fn verified_receipts_fill_status_and_fee() {
    let server = MockServer::start().await;
    mock_rpc(&server, "eth_blockNumber", rpc_result(json!("0x64"))).await;
    mock_rpc(&server, "eth_getBlockTransactionCountByNumber", rpc_result(json!("0x3"))).await;
    mock_rpc(&server, "eth_getBlockByNumber", rpc_result(sample_block())).await;
    mock_rpc(
        &server,
        "eth_getTransactionReceipt",
        rpc_result(json!({
            "transactionHash": "0xnative",
            "status": "0x0",
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x3b9aca00"
        })),
    )
    .await;

    let mut cfg = config(&server);
    cfg.verify_receipts = true;
    let bundles = scanner(&cfg).scan_block(90).await.unwrap();

    assert_eq!(bundles.len(), 2);
    assert!(!bundles[0].success);
    assert_eq!(bundles[0].remark, "FAILED");
    assert_eq!(bundles[0].fee_amount_coin, "0.000021");
}
