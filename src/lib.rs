//! Hours - lab attendance server
//!
//! Tracks when students are in the lab. Students sign in at a kiosk or with
//! an RFID tag, mentors sign them out by text message or tag, and
//! administrators edit the record and pull reports from the web.
//!
//! - SQLite persistence for students, mentors, lab sessions and tags
//! - Member-service backed browser authentication
//! - Live presence over websockets

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod presence;
pub mod routes;
pub mod trends;
pub mod views;

use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use auth::{AuthProvider, MembersClient};
use config::Config;
use db::Database;
use error::ServerError;
use presence::TagBridge;
use routes::{lab_sessions, mentors, reports, sms, students, tags};

/// State shared by every handler
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub auth: Arc<dyn AuthProvider>,
    /// Transient RFID presence and live-view clients
    pub tags: TagBridge,
}

impl AppState {
    pub fn new(db: Database, config: Config, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            db,
            config,
            auth,
            tags: TagBridge::new(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(
            state.config.session_expiry_secs,
        )));

    Router::new()
        .route("/", get(lab_sessions::index))
        .route("/signin", axum::routing::post(lab_sessions::sign_in))
        .route("/logout", get(auth::logout))
        .route("/lab_sessions/open", get(lab_sessions::open_lab_sessions))
        .route(
            "/students/{id}/new_lab_session",
            get(lab_sessions::new_lab_session_form).post(lab_sessions::new_lab_session),
        )
        .route(
            "/lab_sessions/{id}/edit",
            get(lab_sessions::edit_lab_session_form).post(lab_sessions::update_lab_session),
        )
        .route(
            "/lab_sessions/{id}/delete",
            get(lab_sessions::delete_lab_session_form).post(lab_sessions::delete_lab_session),
        )
        .route("/lab_sessions/{id}/sign_out", get(lab_sessions::sign_out_lab_session))
        .route("/mentors", get(mentors::list_mentors).post(mentors::new_mentor))
        .route("/new_mentor", get(mentors::new_mentor_form))
        .route(
            "/mentors/{id}/delete",
            get(mentors::delete_mentor_form).post(mentors::delete_mentor),
        )
        .route("/sms", axum::routing::post(sms::receive_sms))
        .route("/leader_board", get(students::leader_board))
        .route("/students/{id}", get(students::student))
        .route("/reindex_students", get(students::reindex_students))
        .route("/csv_report", get(reports::csv_report))
        .route("/strike_report", get(reports::strike_report))
        .route("/tag_ws", get(presence::socket::tag_ws))
        .route("/tag/events/in/{id}", get(presence::socket::tag_in))
        .route("/tag/events/out/{id}", get(presence::socket::tag_out))
        .route("/tag/manage", get(tags::manage))
        .route("/tag/manage/assign", get(tags::assign))
        .route("/tag/live", get(tags::live))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_gate))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server and serve until ctrl-c or SIGTERM
pub async fn run() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load();
    info!("Database path: {:?}", config.db_path);

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let database = Database::new(&config.db_path)?;
    database.initialize()?;
    info!("Database initialized successfully");

    let auth: Arc<dyn AuthProvider> = Arc::new(MembersClient::new(config.members_url.clone()));
    let port = config.port;
    let state = Arc::new(AppState::new(database, config, auth));

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION};
    use axum::http::{HeaderMap, Request, StatusCode};
    use futures::future::BoxFuture;
    use tower::ServiceExt;

    use crate::error::AppError;
    use crate::models::user::{MemberUser, Permission};

    /// Resolves the `session=admin` cookie to an administrator
    struct FakeMembers;

    fn admin() -> MemberUser {
        MemberUser {
            id: 7,
            bcp_id: None,
            first_name: "Pat".to_string(),
            last_name: "Admin".to_string(),
            permissions: vec!["HOURS_EDIT".to_string(), "HOURS_VIEW_REPORT".to_string()],
        }
    }

    impl AuthProvider for FakeMembers {
        fn user_for_request<'a>(&'a self, headers: &'a HeaderMap) -> BoxFuture<'a, Option<MemberUser>> {
            let signed_in = headers
                .get(COOKIE)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|cookie| cookie.contains("session=admin"));
            Box::pin(async move { signed_in.then(admin) })
        }

        fn users_with_permission(
            &self,
            _permission: Permission,
        ) -> BoxFuture<'_, Result<Vec<MemberUser>, AppError>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    fn app() -> (Arc<AppState>, Router) {
        let state = Arc::new(AppState::new(
            Database::open_in_memory().unwrap(),
            Config {
                members_url: "https://members.example.com".to_string(),
                ..Config::default()
            },
            Arc::new(FakeMembers),
        ));
        (state.clone(), router(state))
    }

    #[tokio::test]
    async fn test_private_page_redirects_to_sign_in() {
        let (_, app) = app();
        let response = app
            .oneshot(Request::get("/mentors").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[LOCATION],
            "https://members.example.com?site=hours&path=%2Fmentors"
        );
    }

    #[tokio::test]
    async fn test_index_is_public() {
        let (_, app) = app();
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sign_in_form_creates_session() {
        let (state, app) = app();
        state
            .db
            .with_connection(|conn| {
                db::queries::upsert_student(
                    conn,
                    &models::student::Student {
                        id: 254,
                        first_name: "Ada".to_string(),
                        last_name: "Lovelace".to_string(),
                    },
                )
            })
            .unwrap();

        let response = app
            .oneshot(
                Request::post("/signin")
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("student_id=254"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/");
        let open = state
            .db
            .with_connection(|conn| db::queries::open_sessions(conn, true))
            .unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn test_admin_can_view_mentors() {
        let (_, app) = app();
        let response = app
            .oneshot(
                Request::get("/mentors")
                    .header(COOKIE, "session=admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_reindex_with_edit_permission() {
        let (_, app) = app();
        let response = app
            .oneshot(
                Request::get("/reindex_students")
                    .header(COOKIE, "session=admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        // The fake member service lists nobody
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_tag_out_is_rejected() {
        let (_, app) = app();
        let response = app
            .oneshot(
                Request::get("/tag/events/out/0004A1B2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sign_out_closed_session_by_id() {
        let (state, app) = app();
        let time_in = chrono::Utc::now() - chrono::Duration::hours(3);
        let id = state
            .db
            .with_connection(|conn| {
                db::queries::upsert_student(
                    conn,
                    &models::student::Student {
                        id: 254,
                        first_name: "Ada".to_string(),
                        last_name: "Lovelace".to_string(),
                    },
                )?;
                db::queries::insert_lab_session(
                    conn,
                    254,
                    &models::lab_session::NewLabSession {
                        time_in,
                        time_out: Some(time_in + chrono::Duration::hours(1)),
                        ..Default::default()
                    },
                )
            })
            .unwrap();

        let response = app
            .oneshot(
                Request::get(format!("/lab_sessions/{id}/sign_out"))
                    .header(COOKIE, "session=admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/");
        let session = state
            .db
            .with_connection(|conn| db::queries::get_lab_session(conn, id))
            .unwrap()
            .unwrap();
        assert_eq!(session.mentor_name.as_deref(), Some("Pat Admin"));
        assert!(session.time_out.unwrap() > time_in + chrono::Duration::hours(1));
    }

    #[tokio::test]
    async fn test_sms_from_unknown_sender_replies_with_xml() {
        let (_, app) = app();
        let response = app
            .oneshot(
                Request::post("/sms")
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("From=%2B15559999999&Body=123"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/xml");
    }
}
