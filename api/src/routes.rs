//! Admin routes for the indexer.
//!
//! All routes live under `/admin/indexer`:
//!
//! | Method | Path                  | Action                          |
//! |--------|-----------------------|---------------------------------|
//! | GET    | `/status`             | Cursor position and counts      |
//! | POST   | `/start`              | Start the polling loop          |
//! | POST   | `/stop`               | Stop the polling loop           |
//! | POST   | `/reindex`            | Rewind the cursor to `{lt}`     |
//! | GET    | `/transactions`       | Paginated stored transactions   |
//! | GET    | `/transactions/{hash}`| One stored transaction          |
//! | GET    | `/metrics`            | In-process counters             |

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use coinnovac_indexer::events::{EventType, IndexedTransaction};
use coinnovac_indexer::{IndexerStatus, MetricsSnapshot, TransactionQuery};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Prefix of every admin route.
pub const ADMIN_PREFIX: &str = "/admin/indexer";

/// Builds the admin router.
pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/status", get(status))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/reindex", post(reindex))
        .route("/transactions", get(list_transactions))
        .route("/transactions/{hash}", get(get_transaction))
        .route("/metrics", get(metrics));

    Router::new()
        .nest(ADMIN_PREFIX, admin)
        .with_state(state)
}

/// Acknowledgement for control actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    /// Action performed.
    pub action: String,
    /// Whether the loop runs after the action.
    pub is_running: bool,
}

/// Body of `POST /reindex`.
#[derive(Debug, Deserialize)]
pub struct ReindexRequest {
    /// Target logical time, as a decimal string or a JSON number.
    pub lt: LtInput,
}

/// Logical time as sent by clients.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LtInput {
    /// Decimal string.
    Text(String),
    /// JSON number, possibly negative or fractional.
    Number(serde_json::Number),
}

impl LtInput {
    fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
        }
    }
}

/// Query string of `GET /transactions`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    /// 1-based page.
    pub page: Option<u32>,
    /// Page size.
    pub limit: Option<u32>,
    /// Event type filter.
    pub event_type: Option<String>,
    /// Processed flag filter.
    pub processed: Option<bool>,
}

impl ListParams {
    fn into_query(self) -> Result<TransactionQuery, ApiError> {
        let event_type = self
            .event_type
            .map(|s| s.parse::<EventType>())
            .transpose()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;

        let defaults = TransactionQuery::default();
        Ok(TransactionQuery {
            contract_address: None,
            event_type,
            processed: self.processed,
            page: self.page.unwrap_or(defaults.page),
            limit: self.limit.unwrap_or(defaults.limit),
        }
        .normalized())
    }
}

/// Pagination block of a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    /// Current page.
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// Matching rows.
    pub total: u64,
    /// Number of pages.
    pub pages: u64,
}

impl Pagination {
    fn new(page: u32, limit: u32, total: u64) -> Self {
        Self {
            page,
            limit,
            total,
            pages: total.div_ceil(u64::from(limit.max(1))),
        }
    }
}

/// Response of `GET /transactions`.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionList {
    /// Rows of the page, newest first.
    pub transactions: Vec<IndexedTransaction>,
    /// Pagination info.
    pub pagination: Pagination,
}

async fn status(State(state): State<AppState>) -> Result<Json<IndexerStatus>, ApiError> {
    Ok(Json(state.indexer.status().await?))
}

async fn start(State(state): State<AppState>) -> Result<Json<ControlResponse>, ApiError> {
    state.indexer.start().await?;
    info!(address = %state.indexer.contract_address(), "Indexer started via admin API");
    Ok(Json(ControlResponse {
        action: "start".to_string(),
        is_running: state.indexer.is_running().await,
    }))
}

async fn stop(State(state): State<AppState>) -> Result<Json<ControlResponse>, ApiError> {
    state.indexer.stop().await?;
    info!(address = %state.indexer.contract_address(), "Indexer stopped via admin API");
    Ok(Json(ControlResponse {
        action: "stop".to_string(),
        is_running: state.indexer.is_running().await,
    }))
}

async fn reindex(
    State(state): State<AppState>,
    Json(request): Json<ReindexRequest>,
) -> Result<Json<ControlResponse>, ApiError> {
    let lt = request.lt.as_text();
    state.indexer.reindex_from(&lt).await?;
    info!(
        address = %state.indexer.contract_address(),
        lt = %lt,
        "Indexer rewound via admin API"
    );
    Ok(Json(ControlResponse {
        action: "reindex".to_string(),
        is_running: state.indexer.is_running().await,
    }))
}

async fn list_transactions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<TransactionList>, ApiError> {
    let query = params.into_query()?;
    let (page, limit) = (query.page, query.limit);
    let result = state.indexer.list_transactions(query).await?;

    Ok(Json(TransactionList {
        transactions: result.transactions,
        pagination: Pagination::new(page, limit, result.total),
    }))
}

async fn get_transaction(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<IndexedTransaction>, ApiError> {
    state
        .indexer
        .get_transaction(&hash)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("transaction {hash} not found")))
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.indexer.metrics().snapshot())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use chrono::Utc;
    use coinnovac_indexer::campaigns::Campaign;
    use coinnovac_indexer::testing::{self, hash_for, ChainStub};
    use coinnovac_indexer::{
        IndexStore, IndexerConfig, IndexerService, InMemoryCampaignDirectory, MemoryStore,
        TransactionSource,
    };
    use serde_json::{json, Value};

    use super::*;

    const ADDRESS: &str = "EQadmin";

    struct Fixture {
        server: TestServer,
        indexer: Arc<IndexerService>,
        campaigns: InMemoryCampaignDirectory,
    }

    fn fixture(history: Vec<coinnovac_indexer::rpc::RawTransaction>) -> Fixture {
        let stub = Arc::new(ChainStub::with_history(history));
        let campaigns = InMemoryCampaignDirectory::new();
        let indexer = Arc::new(
            IndexerService::new(
                IndexerConfig::with_contract(ADDRESS)
                    .with_poll_interval(10)
                    .with_fetch_retry(3, 1)
                    .with_start_from_tip(false),
                stub as Arc<dyn TransactionSource>,
                Arc::new(MemoryStore::new()) as Arc<dyn IndexStore>,
                Arc::new(campaigns.clone()),
            )
            .expect("indexer"),
        );
        let server =
            TestServer::new(router(AppState::new(Arc::clone(&indexer)))).expect("test server");

        Fixture {
            server,
            indexer,
            campaigns,
        }
    }

    fn history() -> Vec<coinnovac_indexer::rpc::RawTransaction> {
        vec![
            testing::request(10, "EQbuyer"),
            testing::creation(20, "EQcreator", "EQjetton"),
            testing::request(30, "EQbuyer"),
            testing::unknown(40),
        ]
    }

    #[tokio::test]
    async fn test_status_before_start() {
        let fx = fixture(Vec::new());

        let response = fx.server.get("/admin/indexer/status").await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["contractAddress"], ADDRESS);
        assert_eq!(body["isRunning"], false);
        assert_eq!(body["lastProcessedLt"], "0");
        assert_eq!(body["totalIndexed"], 0);
    }

    #[tokio::test]
    async fn test_start_stop_roundtrip() {
        let fx = fixture(history());

        let response = fx.server.post("/admin/indexer/start").await;
        response.assert_status_ok();
        let body: ControlResponse = response.json();
        assert!(body.is_running);

        let response = fx.server.post("/admin/indexer/stop").await;
        response.assert_status_ok();
        let body: ControlResponse = response.json();
        assert_eq!(body.action, "stop");
        assert!(!body.is_running);
        assert!(!fx.indexer.is_running().await);
    }

    #[tokio::test]
    async fn test_list_transactions_paginates_newest_first() {
        let fx = fixture(history());
        fx.indexer.poll_once().await.expect("poll");

        let response = fx
            .server
            .get("/admin/indexer/transactions")
            .add_query_param("page", 2)
            .add_query_param("limit", 3)
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["pagination"]["page"], 2);
        assert_eq!(body["pagination"]["limit"], 3);
        assert_eq!(body["pagination"]["total"], 4);
        assert_eq!(body["pagination"]["pages"], 2);
        let rows = body["transactions"].as_array().expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["hash"], hash_for(10));
    }

    #[tokio::test]
    async fn test_list_transactions_filters_and_clamps() {
        let fx = fixture(history());
        fx.indexer.poll_once().await.expect("poll");

        let response = fx
            .server
            .get("/admin/indexer/transactions")
            .add_query_param("eventType", "request")
            .add_query_param("processed", true)
            .add_query_param("limit", 10_000)
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["pagination"]["limit"], 500);
        assert_eq!(body["pagination"]["total"], 2);
        let hashes: Vec<&str> = body["transactions"]
            .as_array()
            .expect("rows")
            .iter()
            .filter_map(|row| row["hash"].as_str())
            .collect();
        assert_eq!(hashes, vec![hash_for(30), hash_for(10)]);
    }

    #[tokio::test]
    async fn test_list_transactions_rejects_unknown_event_type() {
        let fx = fixture(Vec::new());

        let response = fx
            .server
            .get("/admin/indexer/transactions")
            .add_query_param("eventType", "mint")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_get_transaction() {
        let fx = fixture(history());
        fx.campaigns
            .insert(Campaign::pending("c1", "EQcreator", Utc::now()))
            .await;
        fx.indexer.poll_once().await.expect("poll");

        let response = fx
            .server
            .get(&format!("/admin/indexer/transactions/{}", hash_for(20)))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["eventType"], "creation");
        assert_eq!(body["processed"], true);
        assert_eq!(body["parsedData"]["emittedAddress"], "EQjetton");

        let response = fx.server.get("/admin/indexer/transactions/missing").await;
        response.assert_status_not_found();
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn test_reindex_accepts_string_and_number() {
        let fx = fixture(history());
        fx.indexer.poll_once().await.expect("poll");

        let response = fx
            .server
            .post("/admin/indexer/reindex")
            .json(&json!({ "lt": "15" }))
            .await;
        response.assert_status_ok();
        let status = fx.indexer.status().await.expect("status");
        assert_eq!(status.last_processed_lt.get(), 15);

        let response = fx
            .server
            .post("/admin/indexer/reindex")
            .json(&json!({ "lt": 0 }))
            .await;
        response.assert_status_ok();
        let status = fx.indexer.status().await.expect("status");
        assert_eq!(status.last_processed_lt.get(), 0);
        assert_eq!(status.total_indexed, 4);
    }

    #[tokio::test]
    async fn test_reindex_rejects_invalid_lt() {
        let fx = fixture(history());
        fx.indexer.poll_once().await.expect("poll");

        for lt in [json!("abc"), json!(-5)] {
            let response = fx
                .server
                .post("/admin/indexer/reindex")
                .json(&json!({ "lt": lt }))
                .await;
            response.assert_status_bad_request();
            let body: Value = response.json();
            assert_eq!(body["error"]["code"], "bad_request");
        }

        let status = fx.indexer.status().await.expect("status");
        assert_eq!(status.last_processed_lt.get(), 40);
    }

    #[tokio::test]
    async fn test_metrics() {
        let fx = fixture(history());
        fx.indexer.poll_once().await.expect("poll");

        let response = fx.server.get("/admin/indexer/metrics").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["transactions_indexed"], 4);
        assert_eq!(body["requests"], 2);
    }
}
