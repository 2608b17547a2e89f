use warp::Filter;

use crate::api::handlers;
use crate::core::service::EngineHandle;

/// CSV 본문 최대 크기
const MAX_BATCH_BODY: u64 = 1024 * 1024;

/// 알고리즘 엔진의 API 라우트 생성
pub fn create_routes(
    handle: EngineHandle,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    // 헬스체크 라우트
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(handlers::health_handler);

    // 상태 필터 생성
    let handle_filter = warp::any().map(move || handle.clone());

    // 알고리즘 관리 라우트
    let list = warp::path!("algos")
        .and(warp::get())
        .and(handle_filter.clone())
        .and_then(handlers::list_algos);

    let start = warp::path!("algos")
        .and(warp::post())
        .and(warp::body::json())
        .and(handle_filter.clone())
        .and_then(handlers::start_algo);

    let batch = warp::path!("algos" / "batch")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BATCH_BODY))
        .and(warp::body::bytes())
        .and(handle_filter.clone())
        .and_then(handlers::batch_start);

    let status = warp::path!("algos" / String)
        .and(warp::get())
        .and(handle_filter.clone())
        .and_then(handlers::get_algo);

    let pause = warp::path!("algos" / String / "pause")
        .and(warp::post())
        .and(handle_filter.clone())
        .and_then(handlers::pause_algo);

    let resume = warp::path!("algos" / String / "resume")
        .and(warp::post())
        .and(handle_filter.clone())
        .and_then(handlers::resume_algo);

    let stop = warp::path!("algos" / String / "stop")
        .and(warp::post())
        .and(handle_filter.clone())
        .and_then(handlers::stop_algo);

    // 모든 라우트 결합
    health
        .or(list)
        .or(start)
        .or(batch)
        .or(status)
        .or(pause)
        .or(resume)
        .or(stop)
}
