// 알고리즘 관리 핸들러들

use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::{json, with_status, Json, Reply, WithStatus};

use crate::batch;
use crate::core::service::EngineHandle;
use crate::error::AlgoError;
use crate::models::algo::{AlgoId, StartRequest};

/// 오류 종류별 HTTP 상태 코드
pub fn status_for(err: &AlgoError) -> StatusCode {
  match err {
    AlgoError::ConfigError(_)
    | AlgoError::UnknownTemplate(_)
    | AlgoError::ParseError(_)
    | AlgoError::InvalidOrder(_)
    | AlgoError::CsvError(_) => StatusCode::BAD_REQUEST,
    AlgoError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
    AlgoError::CapacityExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
    AlgoError::AlgoNotFound(_) | AlgoError::OrderNotFound(_) => StatusCode::NOT_FOUND,
    AlgoError::EngineStopped => StatusCode::SERVICE_UNAVAILABLE,
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

fn error_reply(err: AlgoError) -> WithStatus<Json> {
  let body = serde_json::json!({
    "error": err.kind(),
    "message": err.to_string(),
  });
  with_status(json(&body), status_for(&err))
}

/// 헬스체크 핸들러
pub async fn health_handler() -> Result<impl Reply, warp::Rejection> {
  let body = serde_json::json!({ "status": "ok", "version": crate::VERSION });
  Ok(with_status(json(&body), StatusCode::OK))
}

/// 알고리즘 목록 조회 핸들러
pub async fn list_algos(handle: EngineHandle) -> Result<impl Reply, warp::Rejection> {
  match handle.list().await {
    Ok(algos) => Ok(with_status(json(&algos), StatusCode::OK)),
    Err(e) => Ok(error_reply(e)),
  }
}

/// 알고리즘 시작 핸들러
pub async fn start_algo(request: StartRequest, handle: EngineHandle) -> Result<impl Reply, warp::Rejection> {
  match handle.start(request).await {
    Ok(algo_id) => {
      let response = serde_json::json!({
        "status": "success",
        "algo_id": algo_id,
      });
      Ok(with_status(json(&response), StatusCode::CREATED))
    }
    Err(e) => Ok(error_reply(e)),
  }
}

/// 알고리즘 상태 조회 핸들러
pub async fn get_algo(id: String, handle: EngineHandle) -> Result<impl Reply, warp::Rejection> {
  match handle.query_status(&AlgoId(id)).await {
    Ok(snapshot) => Ok(with_status(json(&snapshot), StatusCode::OK)),
    Err(e) => Ok(error_reply(e)),
  }
}

/// 일시정지 핸들러
pub async fn pause_algo(id: String, handle: EngineHandle) -> Result<impl Reply, warp::Rejection> {
  let algo_id = AlgoId(id);
  let result = handle.pause(&algo_id).await;
  Ok(command_reply(&handle, algo_id, result).await)
}

/// 재개 핸들러
pub async fn resume_algo(id: String, handle: EngineHandle) -> Result<impl Reply, warp::Rejection> {
  let algo_id = AlgoId(id);
  let result = handle.resume(&algo_id).await;
  Ok(command_reply(&handle, algo_id, result).await)
}

/// 중지 핸들러
pub async fn stop_algo(id: String, handle: EngineHandle) -> Result<impl Reply, warp::Rejection> {
  let algo_id = AlgoId(id);
  let result = handle.stop(&algo_id).await;
  Ok(command_reply(&handle, algo_id, result).await)
}

/// 명령 성공 시 최신 상태를 함께 반환
async fn command_reply(handle: &EngineHandle, algo_id: AlgoId, result: Result<(), AlgoError>) -> WithStatus<Json> {
  if let Err(e) = result {
    return error_reply(e);
  }
  match handle.query_status(&algo_id).await {
    Ok(snapshot) => with_status(json(&snapshot), StatusCode::OK),
    Err(e) => error_reply(e),
  }
}

/// CSV 일괄 시작 핸들러
pub async fn batch_start(body: Bytes, handle: EngineHandle) -> Result<impl Reply, warp::Rejection> {
  match batch::import_csv(&handle, body.as_ref()).await {
    Ok(report) => {
      let status = if report.failed.is_empty() { StatusCode::OK } else { StatusCode::MULTI_STATUS };
      Ok(with_status(json(&report), status))
    }
    Err(e) => Ok(error_reply(e)),
  }
}
