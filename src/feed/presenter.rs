use crate::error::AppError;
use crate::feed::synchronizer::DashboardSnapshot;
use crate::feed::types::PresenterKind;
use std::io::Write;

/// Read-only consumer of dashboard snapshots.
pub trait SnapshotPresenter: Send {
    fn render(&mut self, snapshot: &DashboardSnapshot, revision: u64) -> Result<(), AppError>;
}

/// Renders a one-line summary of each snapshot through `tracing`.
#[derive(Debug, Default)]
pub struct TracingPresenter;

impl SnapshotPresenter for TracingPresenter {
    fn render(&mut self, snapshot: &DashboardSnapshot, revision: u64) -> Result<(), AppError> {
        let latest_transaction = snapshot
            .transaction_log
            .first()
            .map(|transaction| {
                format!(
                    "{:?} {} @ {} ({})",
                    transaction.kind, transaction.amount, transaction.price, transaction.hash
                )
            })
            .unwrap_or_default();
        let latest_scan = snapshot.scan_log.first().cloned().unwrap_or_default();

        tracing::info!(
            revision,
            price = snapshot.current_price,
            status = %snapshot.engine_status,
            sentiment = %snapshot.sentiment,
            history_len = snapshot.price_history.len(),
            transactions = snapshot.transaction_log.len(),
            scans = snapshot.scan_log.len(),
            latest_transaction = %latest_transaction,
            latest_scan = %latest_scan,
            "dashboard updated"
        );
        Ok(())
    }
}

/// Writes each snapshot as one JSON document per line.
#[derive(Debug)]
pub struct JsonLinesPresenter<W> {
    writer: W,
}

impl<W: Write> JsonLinesPresenter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> SnapshotPresenter for JsonLinesPresenter<W> {
    fn render(&mut self, snapshot: &DashboardSnapshot, _revision: u64) -> Result<(), AppError> {
        let line = simd_json::to_string(snapshot)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

pub fn build_presenter(kind: PresenterKind) -> Box<dyn SnapshotPresenter> {
    match kind {
        PresenterKind::Log => Box::new(TracingPresenter),
        PresenterKind::JsonLines => Box::new(JsonLinesPresenter::new(std::io::stdout())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::synchronizer::StreamSynchronizer;
    use crate::feed::types::{EventEnvelope, PricePoint, Transaction, TransactionKind};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RenderedSnapshot {
        price_history: Vec<PricePoint>,
        transaction_log: Vec<Transaction>,
        scan_log: Vec<String>,
        current_price: f64,
        sentiment: String,
        engine_status: String,
    }

    #[test]
    fn json_lines_presenter_writes_one_document_per_render() {
        let mut synchronizer = StreamSynchronizer::default();
        synchronizer.apply(EventEnvelope::PriceTick {
            time: "t1".to_string(),
            price: 0.002,
            status: "BUYING".to_string(),
        });
        synchronizer.apply(EventEnvelope::Transaction(Transaction {
            kind: TransactionKind::Sell,
            amount: 42.0,
            price: 0.002,
            hash: "ff00".to_string(),
            timestamp: "t1".to_string(),
        }));

        let mut presenter = JsonLinesPresenter::new(Vec::new());
        presenter
            .render(&synchronizer.snapshot(), synchronizer.revision())
            .expect("first render should succeed");
        presenter
            .render(&synchronizer.snapshot(), synchronizer.revision())
            .expect("second render should succeed");

        let output = String::from_utf8(presenter.into_inner()).expect("output should be utf-8");
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let mut first_line = lines[0].as_bytes().to_vec();
        let rendered: RenderedSnapshot =
            simd_json::serde::from_slice(&mut first_line).expect("line should be json");
        let snapshot = synchronizer.snapshot();
        assert_eq!(rendered.price_history, snapshot.price_history);
        assert_eq!(rendered.transaction_log, snapshot.transaction_log);
        assert_eq!(rendered.scan_log, snapshot.scan_log);
        assert_eq!(rendered.current_price, 0.002);
        assert_eq!(rendered.sentiment, snapshot.sentiment);
        assert_eq!(rendered.engine_status, "BUYING");
    }

    #[test]
    fn tracing_presenter_never_fails() {
        let snapshot = StreamSynchronizer::default().snapshot();
        assert!(TracingPresenter.render(&snapshot, 0).is_ok());
    }
}
