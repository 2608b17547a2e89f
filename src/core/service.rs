/**
* filename : service
* author : HAMA
* date: 2025. 5. 8.
* description:
**/

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::core::engine::AlgoEngine;
use crate::core::event_bus::spawn_event_bus;
use crate::error::AlgoError;
use crate::models::algo::{AlgoId, AlgoSnapshot, StartRequest};
use crate::models::market_data::TickSnapshot;
use crate::models::order::OrderUpdate;
use crate::models::trade::Fill;

type Reply<T> = oneshot::Sender<Result<T, AlgoError>>;

/// 엔진 태스크가 처리하는 단일 이벤트 큐 항목
pub enum EngineEvent {
  Tick(TickSnapshot),
  Order(OrderUpdate),
  Trade(Fill),
  Timer(Duration),
  Command(EngineCommand),
}

/// 운영자 명령 (응답 채널 포함)
pub enum EngineCommand {
  Start { request: StartRequest, reply: Reply<AlgoId> },
  Pause { algo_id: AlgoId, reply: Reply<()> },
  Resume { algo_id: AlgoId, reply: Reply<()> },
  Stop { algo_id: AlgoId, reply: Reply<()> },
  Query { algo_id: AlgoId, reply: Reply<AlgoSnapshot> },
  List { reply: Reply<Vec<AlgoSnapshot>> },
  StopAll { reply: Reply<usize> },
  Shutdown { reply: Reply<()> },
}

/// 엔진 태스크 핸들 (복제 가능)
#[derive(Clone)]
pub struct EngineHandle {
  sender: mpsc::Sender<EngineEvent>,
}

impl EngineHandle {
  pub fn new(sender: mpsc::Sender<EngineEvent>) -> Self {
    EngineHandle { sender }
  }

  /// 이벤트 직접 전달 (수동 시세 입력, 테스트)
  pub async fn send(&self, event: EngineEvent) -> Result<(), AlgoError> {
    self.sender.send(event).await.map_err(|_| AlgoError::EngineStopped)
  }

  pub async fn start(&self, request: StartRequest) -> Result<AlgoId, AlgoError> {
    self.request(|reply| EngineCommand::Start { request, reply }).await
  }

  pub async fn pause(&self, algo_id: &AlgoId) -> Result<(), AlgoError> {
    let algo_id = algo_id.clone();
    self.request(|reply| EngineCommand::Pause { algo_id, reply }).await
  }

  pub async fn resume(&self, algo_id: &AlgoId) -> Result<(), AlgoError> {
    let algo_id = algo_id.clone();
    self.request(|reply| EngineCommand::Resume { algo_id, reply }).await
  }

  pub async fn stop(&self, algo_id: &AlgoId) -> Result<(), AlgoError> {
    let algo_id = algo_id.clone();
    self.request(|reply| EngineCommand::Stop { algo_id, reply }).await
  }

  pub async fn query_status(&self, algo_id: &AlgoId) -> Result<AlgoSnapshot, AlgoError> {
    let algo_id = algo_id.clone();
    self.request(|reply| EngineCommand::Query { algo_id, reply }).await
  }

  pub async fn list(&self) -> Result<Vec<AlgoSnapshot>, AlgoError> {
    self.request(|reply| EngineCommand::List { reply }).await
  }

  pub async fn stop_all(&self) -> Result<usize, AlgoError> {
    self.request(|reply| EngineCommand::StopAll { reply }).await
  }

  /// 모든 인스턴스 중지 후 엔진 태스크 종료
  pub async fn shutdown(&self) -> Result<(), AlgoError> {
    self.request(|reply| EngineCommand::Shutdown { reply }).await
  }

  async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> EngineCommand) -> Result<T, AlgoError> {
    let (reply, response) = oneshot::channel();
    self.send(EngineEvent::Command(make(reply))).await?;
    response.await.map_err(|_| AlgoError::EngineStopped)?
  }
}

/// 엔진 태스크 시작
///
/// 게이트웨이 이벤트 구독을 마친 뒤 반환하므로, 반환 이후 발생한 이벤트는 유실되지 않는다.
pub async fn spawn(engine: AlgoEngine) -> (EngineHandle, JoinHandle<()>) {
  let (sender, receiver) = mpsc::channel(engine.config().event_buffer.max(1));

  let gateway_events = engine.gateway().read().await.subscribe_events();
  spawn_event_bus(gateway_events, sender.clone());

  let task = tokio::spawn(run(engine, receiver));
  (EngineHandle::new(sender), task)
}

/// 단일 작성자 이벤트 루프: 이벤트 큐와 타이머를 하나의 태스크에서 처리
pub async fn run(mut engine: AlgoEngine, mut events: mpsc::Receiver<EngineEvent>) {
  let period = Duration::from_millis(engine.config().timer_interval_ms.max(1));
  let mut timer = time::interval_at(Instant::now() + period, period);
  timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

  log::info!("알고리즘 엔진 시작 (타이머 {}ms)", period.as_millis());

  loop {
    tokio::select! {
      event = events.recv() => match event {
        Some(EngineEvent::Command(EngineCommand::Shutdown { reply })) => {
          let stopped = engine.stop_all().await;
          log::info!("알고리즘 엔진 종료, 중지된 인스턴스 {}개", stopped);
          let _ = reply.send(Ok(()));
          break;
        }
        Some(event) => handle_event(&mut engine, event).await,
        None => {
          log::info!("이벤트 큐 종료, 알고리즘 엔진 종료");
          break;
        }
      },
      now = timer.tick() => {
        engine.dispatch_clock(now).await;
      }
    }
  }
}

async fn handle_event(engine: &mut AlgoEngine, event: EngineEvent) {
  match event {
    EngineEvent::Tick(tick) => {
      let errors = engine.dispatch_tick(tick).await;
      if !errors.is_empty() {
        log::debug!("호가 처리 중 {}개 인스턴스 격리", errors.len());
      }
    }
    EngineEvent::Order(update) => {
      if let Err(err) = engine.dispatch_order_update(update).await {
        log::debug!("주문 상태 처리 실패: {}", err);
      }
    }
    EngineEvent::Trade(fill) => {
      if let Err(err) = engine.dispatch_fill(fill).await {
        log::debug!("체결 처리 실패: {}", err);
      }
    }
    EngineEvent::Timer(elapsed) => {
      engine.dispatch_timer(elapsed).await;
    }
    EngineEvent::Command(command) => handle_command(engine, command).await,
  }
}

async fn handle_command(engine: &mut AlgoEngine, command: EngineCommand) {
  match command {
    EngineCommand::Start { request, reply } => {
      let _ = reply.send(engine.start(request).await);
    }
    EngineCommand::Pause { algo_id, reply } => {
      let _ = reply.send(engine.pause(&algo_id));
    }
    EngineCommand::Resume { algo_id, reply } => {
      let _ = reply.send(engine.resume(&algo_id));
    }
    EngineCommand::Stop { algo_id, reply } => {
      let _ = reply.send(engine.stop(&algo_id).await);
    }
    EngineCommand::Query { algo_id, reply } => {
      let _ = reply.send(engine.query_status(&algo_id));
    }
    EngineCommand::List { reply } => {
      let _ = reply.send(Ok(engine.list_instances()));
    }
    EngineCommand::StopAll { reply } => {
      let _ = reply.send(Ok(engine.stop_all().await));
    }
    EngineCommand::Shutdown { reply } => {
      // run 루프에서 처리됨
      let _ = reply.send(Ok(()));
    }
  }
}
