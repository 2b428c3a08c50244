//! End-to-end moderation flow against a fake node.
//!
//! One Axum server plays both the wallet endpoint (`eth_accounts`,
//! `eth_chainId`) and the ledger (`gen_call`, `eth_sendTransaction`,
//! `eth_getTransactionByHash`), so the session, the JSON-RPC wallet provider
//! and the contract transport are all exercised over real HTTP.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Json, Router, extract::State, routing::post};
use serde_json::{Value, json};

use arbiter::config::NetworkConfig;
use arbiter::contract::{CaseFilters, RpcContractTransport, TxStatus};
use arbiter::error::{ContractError, ModerationError};
use arbiter::moderation::{DEFAULT_LEADERBOARD_LIMIT, ModerationService};
use arbiter::notice::{NoticeLevel, Notifier};
use arbiter::wallet::{
    DisconnectIntent, InjectedProvider, ProviderAdapter, RpcWalletProvider, WalletSession,
};

const CONTRACT: &str = "0x00000000000000000000000000000000000000c0";
const ARBITER: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

#[derive(Default)]
struct Ledger {
    writes: Vec<(String, String, Value)>,
    reject_next: bool,
}

type SharedLedger = Arc<Mutex<Ledger>>;

async fn rpc(State(ledger): State<SharedLedger>, Json(body): Json<Value>) -> Json<Value> {
    let params = &body["params"];
    let result = match body["method"].as_str().unwrap_or_default() {
        "eth_accounts" => json!([ARBITER]),
        "eth_chainId" => json!("0xF22F"),
        "gen_call" => match params[0]["data"]["method"].as_str().unwrap_or_default() {
            "get_all_cases" => json!([
                ["1", { "incident_report": "spam", "community_rules": "no spam",
                        "case_resolved": true, "verdict": "Warning",
                        "reasoning": "repeated links", "owner": ARBITER }],
                ["2", { "incident_report": "raid", "community_rules": "no raids",
                        "case_resolved": false, "verdict": null, "reasoning": null,
                        "owner": "0x01" }],
            ]),
            "getLeaderboard" => json!([
                { "address": "0x01", "points": "4" },
                { "address": ARBITER.to_lowercase(), "points": 9 },
            ]),
            "get_arbiter_reputation" => json!("9"),
            _ => Value::Null,
        },
        "eth_sendTransaction" => {
            let mut ledger = ledger.lock().unwrap();
            let tx = &params[0];
            ledger.writes.push((
                tx["from"].as_str().unwrap_or_default().to_string(),
                tx["data"]["method"].as_str().unwrap_or_default().to_string(),
                tx["data"]["args"].clone(),
            ));
            json!(format!("0x{:064x}", ledger.writes.len()))
        }
        "eth_getTransactionByHash" => {
            let mut ledger = ledger.lock().unwrap();
            let status = if std::mem::take(&mut ledger.reject_next) {
                "REJECTED"
            } else {
                "ACCEPTED"
            };
            json!({ "hash": params[0], "status": status, "blockNumber": 7 })
        }
        other => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "error": { "code": -32601, "message": format!("{other} not found") }
            }));
        }
    };
    Json(json!({ "jsonrpc": "2.0", "id": body["id"], "result": result }))
}

async fn start_node() -> (String, SharedLedger) {
    let ledger = SharedLedger::default();
    let app = Router::new().route("/", post(rpc)).with_state(ledger.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/"), ledger)
}

async fn start_service(url: &str, notifier: &Notifier) -> (WalletSession, ModerationService) {
    let provider: Arc<dyn InjectedProvider> =
        RpcWalletProvider::spawn(url, Duration::from_millis(50));
    let session = WalletSession::start(
        ProviderAdapter::new(Some(provider), NetworkConfig::default()),
        DisconnectIntent::in_memory(),
        notifier.clone(),
    );
    session.handle().initialize().await.unwrap();

    let service = ModerationService::new(
        session.handle(),
        Arc::new(RpcContractTransport::new(url)),
        Some(CONTRACT.to_string()),
        notifier.clone(),
    )
    .with_poll_interval(Duration::from_millis(10));
    (session, service)
}

#[tokio::test]
async fn test_reads_cases_and_leaderboard_over_rpc() {
    let (url, _) = start_node().await;
    let notifier = Notifier::new();
    let (session, service) = start_service(&url, &notifier).await;
    assert_eq!(session.handle().state().address(), Some(ARBITER));

    let all = service.cases(&CaseFilters::default()).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].verdict.as_deref(), Some("Warning"));

    let mine = service
        .cases(&CaseFilters {
            resolved: None,
            owner: Some(ARBITER.to_lowercase()),
        })
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, "1");

    let rows = service.leaderboard(DEFAULT_LEADERBOARD_LIMIT).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].points, 9);
    assert!(rows[0].is_current_user);
    assert!(!rows[1].is_current_user);

    assert_eq!(service.player_points().await, 9);
    session.shutdown().await;
}

#[tokio::test]
async fn test_file_report_and_arbitrate_submit_from_session_address() {
    let (url, ledger) = start_node().await;
    let notifier = Notifier::new();
    let mut notices = notifier.subscribe();
    let (session, service) = start_service(&url, &notifier).await;

    let receipt = service.file_report("raid in #lobby", "no raids").await.unwrap();
    assert_eq!(receipt.status, TxStatus::Accepted);
    assert_eq!(receipt.block_number, Some(7));
    assert_eq!(notices.recv().await.unwrap().title, "Case Filed");

    service.arbitrate("2").await.unwrap();
    assert_eq!(notices.recv().await.unwrap().title, "Arbitration Complete");
    assert_eq!(service.arbitrating_case_id(), None);

    let writes = ledger.lock().unwrap().writes.clone();
    assert_eq!(
        writes,
        vec![
            (
                ARBITER.to_string(),
                "file_report".to_string(),
                json!(["raid in #lobby", "no raids"])
            ),
            (ARBITER.to_string(), "arbitrate".to_string(), json!(["2"])),
        ]
    );
    session.shutdown().await;
}

#[tokio::test]
async fn test_rejected_arbitration_reports_error_notice() {
    let (url, ledger) = start_node().await;
    let notifier = Notifier::new();
    let mut notices = notifier.subscribe();
    let (session, service) = start_service(&url, &notifier).await;
    ledger.lock().unwrap().reject_next = true;

    let err = service.arbitrate("2").await.unwrap_err();
    assert!(matches!(
        err,
        ModerationError::Contract(ContractError::Rejected { .. })
    ));
    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert_eq!(notice.title, "Arbitration Error");
    session.shutdown().await;
}

#[tokio::test]
async fn test_writes_blocked_after_disconnect() {
    let (url, ledger) = start_node().await;
    let notifier = Notifier::new();
    let (session, service) = start_service(&url, &notifier).await;

    session.handle().disconnect().await.unwrap();
    let err = service.file_report("spam", "no spam").await.unwrap_err();
    assert!(matches!(err, ModerationError::WalletNotConnected));
    assert!(ledger.lock().unwrap().writes.is_empty());
    session.shutdown().await;
}
