use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const PASSWORD: &str = "secret";
pub const PAGE_SIZE: usize = 2;

pub const WRONG_PASSWORD: i32 = 1001;
pub const SESSION_EXPIRED: i32 = 1002;
pub const INVALID_CURSOR: i32 = 2001;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: Uuid,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: u32,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: u32,
    pub title: String,
}

#[derive(Deserialize)]
pub struct LoginParams {
    pub user: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LogoutRequest {
    pub token: Uuid,
}

#[derive(Deserialize)]
pub struct FeedParams {
    pub sid: Option<String>,
}

#[derive(Default)]
pub struct Store {
    sessions: HashMap<Uuid, String>,
    cursors: HashMap<Uuid, usize>,
}

pub type Db = Arc<RwLock<Store>>;

/// Server-side text for every error code this server emits.
pub fn error_codes() -> HashMap<String, String> {
    HashMap::from([
        (WRONG_PASSWORD.to_string(), "Wrong user name or password".to_string()),
        (SESSION_EXPIRED.to_string(), "Session expired, please log in again".to_string()),
        (INVALID_CURSOR.to_string(), "This list is out of date".to_string()),
    ])
}

pub fn tags() -> Vec<Tag> {
    ["rust", "ffi", "mobile"]
        .iter()
        .zip(1..)
        .map(|(name, id)| Tag {
            id,
            name: name.to_string(),
        })
        .collect()
}

pub fn posts() -> Vec<Post> {
    (1..=5)
        .map(|id| Post {
            id,
            title: format!("post {id}"),
        })
        .collect()
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/login", get(login))
        .route("/logout", post(logout))
        .route("/config/error_code", get(error_code))
        .route("/tags", get(list_tags))
        .route("/feed", get(feed))
        .route("/broken", get(broken))
        .route("/crash", get(crash))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// `{"error": 0, "data": "<payload as JSON text>"}`
fn success<T: Serialize>(payload: &T) -> Json<Value> {
    let data = serde_json::to_string(payload).unwrap_or_default();
    Json(json!({ "error": 0, "data": data }))
}

fn failure(code: i32, message: &str) -> Json<Value> {
    Json(json!({ "error": code, "data": message }))
}

async fn login(State(db): State<Db>, Query(params): Query<LoginParams>) -> Json<Value> {
    if params.password != PASSWORD {
        tracing::info!(user = %params.user, "login rejected");
        return failure(WRONG_PASSWORD, "password mismatch");
    }
    let session = Session {
        token: Uuid::new_v4(),
        name: params.user,
    };
    db.write().await.sessions.insert(session.token, session.name.clone());
    success(&session)
}

async fn logout(State(db): State<Db>, Json(input): Json<LogoutRequest>) -> Json<Value> {
    match db.write().await.sessions.remove(&input.token) {
        Some(_) => Json(json!({ "error": 0, "data": "" })),
        None => failure(SESSION_EXPIRED, "unknown token"),
    }
}

async fn error_code() -> Json<Value> {
    success(&error_codes())
}

async fn list_tags() -> Json<Value> {
    let tags = tags();
    let results = serde_json::to_string(&tags).unwrap_or_default();
    success(&json!({ "results": results, "total": tags.len() }))
}

/// Cursor-paginated posts. The first page is requested without `sid`; the
/// page after the last one is `{}`.
async fn feed(State(db): State<Db>, Query(params): Query<FeedParams>) -> Json<Value> {
    let mut store = db.write().await;
    let offset = match params.sid.as_deref() {
        None | Some("") => 0,
        Some(sid) => {
            let Some(offset) = Uuid::parse_str(sid)
                .ok()
                .and_then(|sid| store.cursors.remove(&sid))
            else {
                return failure(INVALID_CURSOR, "unknown cursor");
            };
            offset
        }
    };

    let page: Vec<Post> = posts().into_iter().skip(offset).take(PAGE_SIZE).collect();
    if page.is_empty() {
        return success(&json!({}));
    }

    let sid = Uuid::new_v4();
    store.cursors.insert(sid, offset + page.len());
    success(&json!({
        "sid": sid,
        "results": page,
        "total": posts().len(),
    }))
}

async fn broken() -> &'static str {
    "<html>maintenance</html>"
}

async fn crash() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_serializes_to_json() {
        let session = Session {
            token: Uuid::nil(),
            name: "ada".to_string(),
        };
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["token"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["name"], "ada");
    }

    #[test]
    fn success_encodes_payload_as_text() {
        let Json(body) = success(&vec![1, 2]);
        assert_eq!(body["error"], 0);
        assert_eq!(body["data"], "[1,2]");
    }

    #[test]
    fn failure_carries_code_and_message() {
        let Json(body) = failure(WRONG_PASSWORD, "nope");
        assert_eq!(body["error"], WRONG_PASSWORD);
        assert_eq!(body["data"], "nope");
    }

    #[test]
    fn error_codes_cover_every_emitted_code() {
        let codes = error_codes();
        for code in [WRONG_PASSWORD, SESSION_EXPIRED, INVALID_CURSOR] {
            assert!(codes.contains_key(&code.to_string()), "{code}");
        }
    }

    #[test]
    fn feed_params_sid_is_optional() {
        let params: FeedParams = serde_json::from_str("{}").unwrap();
        assert!(params.sid.is_none());
    }

    #[test]
    fn logout_rejects_non_uuid_token() {
        let result: Result<LogoutRequest, _> = serde_json::from_str(r#"{"token":"abc"}"#);
        assert!(result.is_err());
    }
}
