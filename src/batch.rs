//! CSV 일괄 시작
//!
//! `template,instrument,side,price,quantity` 열과 템플릿 파라미터 열로 구성된 CSV 를 읽어
//! 알고리즘을 순서대로 시작한다. 검증에 실패한 행은 행 번호와 함께 보고된다.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

use crate::core::service::EngineHandle;
use crate::error::AlgoError;
use crate::models::algo::{AlgoId, AlgoParams, StartRequest};
use crate::models::order::OrderSide;
use crate::strategies::TemplateKind;

const FIXED_COLUMNS: [&str; 5] = ["template", "instrument", "side", "price", "quantity"];

#[derive(Deserialize)]
struct CsvRow {
    template: String,
    instrument: String,
    side: String,
    #[serde(default)]
    price: Option<f64>,
    quantity: f64,
}

/// CSV 한 행의 파싱 결과
#[derive(Debug)]
pub struct BatchRow {
    /// 파일 내 행 번호 (헤더 = 1)
    pub line: u64,
    pub request: Result<StartRequest, AlgoError>,
}

/// 일괄 시작 결과
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub started: Vec<BatchStarted>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, Serialize)]
pub struct BatchStarted {
    pub line: u64,
    pub algo_id: AlgoId,
}

#[derive(Debug, Serialize)]
pub struct BatchFailure {
    pub line: u64,
    pub kind: &'static str,
    pub error: String,
}

impl BatchReport {
    fn fail(&mut self, line: u64, err: &AlgoError) {
        self.failed.push(BatchFailure {
            line,
            kind: err.kind(),
            error: err.to_string(),
        });
    }
}

/// CSV 파싱. 헤더 오류는 전체 실패, 행 오류는 행별로 반환
pub fn parse_csv<R: io::Read>(reader: R) -> Result<Vec<BatchRow>, AlgoError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();

    for column in ["template", "instrument", "side", "quantity"] {
        if !headers.iter().any(|h| h == column) {
            return Err(AlgoError::ParseError(format!("missing CSV column '{}'", column)));
        }
    }

    let mut rows = Vec::new();
    for (index, record) in rdr.records().enumerate() {
        let fallback_line = index as u64 + 2;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or(fallback_line);
                rows.push(BatchRow { line, request: Err(AlgoError::from(err)) });
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);
        rows.push(BatchRow {
            line,
            request: parse_record(&headers, &record),
        });
    }
    Ok(rows)
}

/// CSV 파일 파싱
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<BatchRow>, AlgoError> {
    let file = std::fs::File::open(path)?;
    parse_csv(file)
}

fn parse_record(headers: &csv::StringRecord, record: &csv::StringRecord) -> Result<StartRequest, AlgoError> {
    let row: CsvRow = record
        .deserialize(Some(headers))
        .map_err(|e| AlgoError::ParseError(e.to_string()))?;

    let template: TemplateKind = row.template.parse()?;
    let side: OrderSide = row.side.parse()?;

    let mut params = AlgoParams::new();
    for (name, value) in headers.iter().zip(record.iter()) {
        if FIXED_COLUMNS.contains(&name) || value.is_empty() {
            continue;
        }
        match value.parse::<f64>() {
            Ok(number) => params.insert(name, number),
            Err(_) => params.insert(name, value),
        }
    }

    let mut request = StartRequest::new(template, row.instrument, side, row.quantity).with_params(params);
    request.price = row.price;
    Ok(request)
}

/// 파싱된 행을 순서대로 엔진에 제출
pub async fn submit_rows(handle: &EngineHandle, rows: Vec<BatchRow>) -> BatchReport {
    let mut report = BatchReport::default();

    for row in rows {
        let request = match row.request {
            Ok(request) => request,
            Err(err) => {
                log::warn!("일괄 시작 {}행 파싱 실패: {}", row.line, err);
                report.fail(row.line, &err);
                continue;
            }
        };

        match handle.start(request).await {
            Ok(algo_id) => report.started.push(BatchStarted { line: row.line, algo_id }),
            Err(err) => {
                log::warn!("일괄 시작 {}행 시작 실패: {}", row.line, err);
                report.fail(row.line, &err);
            }
        }
    }

    log::info!(
        "일괄 시작 완료: 성공 {}건, 실패 {}건",
        report.started.len(),
        report.failed.len()
    );
    report
}

/// CSV 읽기 + 제출
pub async fn import_csv<R: io::Read>(handle: &EngineHandle, reader: R) -> Result<BatchReport, AlgoError> {
    let rows = parse_csv(reader)?;
    Ok(submit_rows(handle, rows).await)
}
