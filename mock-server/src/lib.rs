use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

/// One REST collection of the hospital backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Collection {
    /// Route prefix without slashes, e.g. `pharmacy/medicines`.
    pub path: &'static str,
    /// Used in response messages, e.g. `Medicine not found`.
    pub noun: &'static str,
}

pub const COLLECTIONS: [Collection; 9] = [
    Collection { path: "patients", noun: "Patient" },
    Collection { path: "doctors", noun: "Doctor" },
    Collection { path: "appointments", noun: "Appointment" },
    Collection { path: "billing", noun: "Bill" },
    Collection { path: "pharmacy/medicines", noun: "Medicine" },
    Collection { path: "pharmacy/sales", noun: "Sale" },
    Collection { path: "lab/tests", noun: "Lab test" },
    Collection { path: "lab/reports", noun: "Lab report" },
    Collection { path: "records", noun: "Medical record" },
];

pub type Row = Map<String, Value>;
pub type Db = Arc<RwLock<Vec<Row>>>;

type Failure = (StatusCode, Json<Value>);

#[derive(Clone)]
struct CollectionState {
    collection: Collection,
    rows: Db,
}

impl CollectionState {
    fn not_found(&self) -> Failure {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": format!("{} not found", self.collection.noun) })),
        )
    }
}

fn unprocessable(detail: &str) -> Failure {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "detail": detail })))
}

/// Every collection, each reachable with and without a trailing slash.
pub fn app() -> Router {
    COLLECTIONS
        .iter()
        .fold(Router::new(), |router, collection| router.merge(collection_router(*collection)))
}

fn collection_router(collection: Collection) -> Router {
    let state = CollectionState {
        collection,
        rows: Arc::new(RwLock::new(Vec::new())),
    };
    let base = format!("/{}", collection.path);
    Router::new()
        .route(&base, get(list_rows).post(create_row))
        .route(&format!("{base}/"), get(list_rows).post(create_row))
        .route(&format!("{base}/{{id}}"), get(get_row).put(update_row).delete(delete_row))
        .route(&format!("{base}/{{id}}/"), get(get_row).put(update_row).delete(delete_row))
        .route(&format!("{base}/{{id}}/{{field}}"), patch(patch_field))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn as_object(input: Value) -> Result<Row, Failure> {
    match input {
        Value::Object(fields) => Ok(fields),
        _ => Err(unprocessable("body must be a JSON object")),
    }
}

/// Copy `fields` onto `row`, leaving `id` alone.
pub fn merge_fields(row: &mut Row, fields: Row) {
    for (name, value) in fields {
        if name != "id" {
            row.insert(name, value);
        }
    }
}

fn row_id(row: &Row) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

async fn list_rows(State(state): State<CollectionState>) -> Json<Vec<Row>> {
    Json(state.rows.read().await.clone())
}

async fn create_row(
    State(state): State<CollectionState>,
    Json(input): Json<Value>,
) -> Result<Json<Row>, Failure> {
    let fields = as_object(input)?;
    let mut row = Row::new();
    let id = Uuid::new_v4().to_string();
    row.insert("id".to_string(), Value::String(id.clone()));
    merge_fields(&mut row, fields);
    state.rows.write().await.push(row.clone());
    debug!(collection = state.collection.path, %id, "created");
    Ok(Json(row))
}

async fn get_row(
    State(state): State<CollectionState>,
    Path(id): Path<String>,
) -> Result<Json<Row>, Failure> {
    let rows = state.rows.read().await;
    rows.iter()
        .find(|row| row_id(row) == Some(id.as_str()))
        .cloned()
        .map(Json)
        .ok_or_else(|| state.not_found())
}

async fn update_row(
    State(state): State<CollectionState>,
    Path(id): Path<String>,
    Json(input): Json<Value>,
) -> Result<Json<Row>, Failure> {
    let fields = as_object(input)?;
    let mut rows = state.rows.write().await;
    let row = rows
        .iter_mut()
        .find(|row| row_id(row) == Some(id.as_str()))
        .ok_or_else(|| state.not_found())?;
    merge_fields(row, fields);
    Ok(Json(row.clone()))
}

async fn patch_field(
    State(state): State<CollectionState>,
    Path((id, field)): Path<(String, String)>,
    Json(input): Json<Value>,
) -> Result<Json<Row>, Failure> {
    let mut fields = as_object(input)?;
    let value = fields
        .remove(&field)
        .ok_or_else(|| unprocessable(&format!("missing field {field}")))?;
    let mut rows = state.rows.write().await;
    let row = rows
        .iter_mut()
        .find(|row| row_id(row) == Some(id.as_str()))
        .ok_or_else(|| state.not_found())?;
    row.insert(field, value);
    Ok(Json(row.clone()))
}

async fn delete_row(
    State(state): State<CollectionState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, Failure> {
    let mut rows = state.rows.write().await;
    let index = rows
        .iter()
        .position(|row| row_id(row) == Some(id.as_str()))
        .ok_or_else(|| state.not_found())?;
    rows.remove(index);
    debug!(collection = state.collection.path, %id, "deleted");
    Ok(Json(json!({
        "message": format!("{} deleted successfully", state.collection.noun)
    })))
}
