//! `GET /hardware/acceleration`: a structured description of available
//! accelerators, used by the setup flow. The core middleware does not
//! itself depend on the result — this is glue carried for API-shape
//! completeness, kept deliberately simple (no GPU vendor probing).

use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Serialize)]
struct AcceleratorInfo {
    kind: String,
    available: bool,
    detail: String,
}

pub async fn hardware_acceleration() -> impl IntoResponse {
    let cpu_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);

    let mut accelerators = vec![AcceleratorInfo { kind: "cpu".to_owned(), available: true, detail: format!("{cpu_count} logical cores") }];

    if std::env::var("CUDA_VISIBLE_DEVICES").is_ok() {
        accelerators.push(AcceleratorInfo { kind: "cuda".to_owned(), available: true, detail: "CUDA_VISIBLE_DEVICES set".to_owned() });
    }
    if cfg!(target_os = "macos") {
        accelerators.push(AcceleratorInfo { kind: "metal".to_owned(), available: true, detail: "Apple Silicon / Metal capable host".to_owned() });
    }

    Json(json!({ "accelerators": accelerators }))
}
