use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub browser_binary: ComponentHealth,
    pub output_dir: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub detail: Option<String>,
}

/// GET /health: liveness plus checks on the two local dependencies a
/// scrape run needs: the browser binary and a writable output directory.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let browser_check = if std::path::Path::new(&state.chrome_bin).exists() {
        ComponentHealth {
            status: "ok".to_string(),
            detail: None,
        }
    } else {
        ComponentHealth {
            status: "error".to_string(),
            detail: Some(format!("browser binary not found at {}", state.chrome_bin)),
        }
    };

    let output_check = match std::fs::create_dir_all(&state.output_dir) {
        Ok(()) => ComponentHealth {
            status: "ok".to_string(),
            detail: None,
        },
        Err(e) => ComponentHealth {
            status: "error".to_string(),
            detail: Some(e.to_string()),
        },
    };

    let all_healthy = browser_check.status == "ok" && output_check.status == "ok";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            browser_binary: browser_check,
            output_dir: output_check,
        },
    };

    (status_code, Json(response))
}
