//! HTTP server for the leaderboard dashboard
//!
//! `gerrit-leaderboard serve` → syncs on every page load, renders the board

use crate::config::Config;
use crate::db::{Database, DbError};
use crate::leaderboard::{self, Leaderboard, DEFAULT_TIME_PERIOD, PROJECT_ALL};
use crate::load::{self, OpenLoad};
use crate::page;
use crate::sync;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, error, warn};

#[derive(Serialize)]
struct ApiResponse<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn failure(error: String) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Project and period picked on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub project: String,
    pub time_period: String,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            project: PROJECT_ALL.to_string(),
            time_period: DEFAULT_TIME_PERIOD.to_string(),
        }
    }
}

#[derive(Deserialize, Default)]
struct SelectionForm {
    project_name: Option<String>,
    time_period: Option<String>,
}

/// Decode a form body or query string; anything undecodable is the default
pub fn parse_selection(encoded: &str) -> Selection {
    let form: SelectionForm = serde_urlencoded::from_str(encoded).unwrap_or_else(|e| {
        warn!("Could not decode selection {:?}: {}", encoded, e);
        SelectionForm::default()
    });
    let defaults = Selection::default();
    Selection {
        project: form.project_name.unwrap_or(defaults.project),
        time_period: form.time_period.unwrap_or(defaults.time_period),
    }
}

/// A response before it is handed to tiny_http
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    fn html(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body,
        }
    }

    fn json<T: Serialize>(status: u16, payload: &ApiResponse<T>) -> Self {
        let body = serde_json::to_string(payload).unwrap_or_else(|e| {
            format!(r#"{{"ok":false,"data":null,"error":"serialization failed: {}"}}"#, e)
        });
        Self {
            status,
            content_type: "application/json",
            body,
        }
    }

    fn server_error(body: String) -> Self {
        Self {
            status: 500,
            content_type: "text/plain",
            body,
        }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            content_type: "text/plain",
            body: "Not found".to_string(),
        }
    }
}

/// The dashboard: a database plus the config it syncs with
pub struct Dashboard {
    db: Database,
    config: Config,
    sync_on_load: bool,
}

impl Dashboard {
    pub fn new(db: Database, config: Config) -> Self {
        Self {
            db,
            config,
            sync_on_load: true,
        }
    }

    /// Skip the sync pass the page normally runs on each load
    pub fn without_sync(mut self) -> Self {
        self.sync_on_load = false;
        self
    }

    /// Serve until the process is stopped, one request at a time
    pub fn serve(&self, host: &str, port: u16) -> std::io::Result<()> {
        let addr = format!("{}:{}", host, port);
        let server = Server::http(&addr).map_err(|e| std::io::Error::other(e.to_string()))?;

        eprintln!("\n\x1b[1;32mGerrit Review Leaderboard\x1b[0m");
        eprintln!("   Dashboard: http://{}", addr);
        eprintln!("   Press Ctrl+C to stop\n");

        for request in server.incoming_requests() {
            if let Err(e) = self.handle_request(request) {
                error!("Error: {}", e);
            }
        }

        Ok(())
    }

    fn handle_request(&self, mut request: Request) -> std::io::Result<()> {
        let mut body = String::new();
        if *request.method() == Method::Post {
            request.as_reader().read_to_string(&mut body)?;
        }
        let reply = self.route(request.method(), request.url(), &body);

        let mut response = Response::from_string(reply.body).with_status_code(reply.status);
        if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], reply.content_type.as_bytes()) {
            response = response.with_header(header);
        }
        request.respond(response)
    }

    /// Dispatch one request to its reply
    pub fn route(&self, method: &Method, url: &str, body: &str) -> Reply {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        debug!(%method, path, "request");

        match (method, path) {
            (&Method::Get, "/") => self.leaderboard_page(&parse_selection(query)),
            (&Method::Post, "/") => self.leaderboard_page(&parse_selection(body)),

            // API: leaderboard data without syncing
            (&Method::Get, "/api/leaderboard") => match self.leaderboard(&parse_selection(query)) {
                Ok(board) => Reply::json(200, &ApiResponse::success(board)),
                Err(e) => Reply::json(500, &ApiResponse::<Leaderboard>::failure(format!("Database error: {}", e))),
            },

            // API: open review load
            (&Method::Get, "/api/load") => {
                let load: OpenLoad = load::fetch_open_load(&self.config.fetch);
                Reply::json(200, &ApiResponse::success(load))
            }

            _ => Reply::not_found(),
        }
    }

    fn leaderboard(&self, selection: &Selection) -> Result<Leaderboard, DbError> {
        leaderboard::build(&self.db, &selection.project, &selection.time_period, Utc::now())
    }

    fn leaderboard_page(&self, selection: &Selection) -> Reply {
        if self.sync_on_load {
            if let Err(e) = sync::pull_and_store_changes(&self.db, &self.config.fetch) {
                error!("Sync failed: {}", e);
            }
        }
        let board = match self.leaderboard(selection) {
            Ok(board) => board,
            Err(e) => return Reply::server_error(format!("Database error: {}", e)),
        };
        match page::render(&board) {
            Ok(html) => Reply::html(html),
            Err(e) => Reply::server_error(format!("Render error: {}", e)),
        }
    }
}
