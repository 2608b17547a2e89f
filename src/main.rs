/**
* filename : main
* author : HAMA
* date: 2025. 5. 8.
* description:
**/

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use xAlgo::api::routes;
use xAlgo::batch;
use xAlgo::config::Config;
use xAlgo::core::engine::AlgoEngine;
use xAlgo::core::service;
use xAlgo::gateway::dry_run::DryRunGateway;
use xAlgo::utils::logging;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // 설정 로드
    let config = Config::load()?;

    // 로깅 초기화
    logging::init(&config.logging.level)?;
    log::info!("알고리즘 실행 엔진 시작... (v{})", xAlgo::VERSION);

    // 게이트웨이 생성
    if !config.gateway.dry_run {
        log::warn!("{} 게이트웨이 연결 구성이 없어 드라이런 게이트웨이로 실행", config.gateway.name);
    }
    let gateway = Arc::new(RwLock::new(DryRunGateway::new(config.engine.event_buffer)));
    log::info!("드라이런 게이트웨이 초기화 완료");

    // 엔진 생성 및 상태 변경 로그
    let engine = AlgoEngine::new(config.engine.clone(), gateway.clone());
    let mut updates = engine.subscribe_updates();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(snapshot) => log::info!(
                    "{}: {} - 체결 {}/{} (평균가 {:.4})",
                    snapshot.algo_id,
                    snapshot.status,
                    snapshot.traded,
                    snapshot.quantity,
                    snapshot.traded_price
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("상태 업데이트 {}건 유실", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let (handle, engine_task) = service::spawn(engine).await;

    // 명령줄 인수 확인: import <csv>
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 2 && args[1] == "import" {
        let rows = batch::parse_file(&args[2])?;
        let report = batch::submit_rows(&handle, rows).await;
        for failure in &report.failed {
            log::error!("{}행: [{}] {}", failure.line, failure.kind, failure.error);
        }
    }

    // API 라우트 초기화
    let api = routes::create_routes(handle.clone());
    log::info!("API 라우트 초기화 완료");

    // Warp 서버 시작 (Ctrl-C 로 종료)
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let (bound, server) = warp::serve(api).try_bind_with_graceful_shutdown(addr, async {
        let _ = tokio::signal::ctrl_c().await;
        log::info!("종료 신호 수신");
    })?;
    log::info!("서버 시작: http://{}/", bound);
    server.await;

    // 실행 중 알고리즘 중지 후 종료
    handle.shutdown().await?;
    engine_task.await?;
    log::info!("알고리즘 실행 엔진 종료");

    Ok(())
}
