//! Local human-facing alerting at the base station.
//!
//! Annunciation is fire-and-forget: it runs on a blocking worker so the
//! accept loop never waits for it, and a failure is only logged.

use chrono::{DateTime, Utc};
use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// What the operator is told about.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertNotice {
    pub msg_id: String,
    pub src: String,
    pub risk: Option<f64>,
    pub received_at: DateTime<Utc>,
}

/// Sound and/or visual alerting device. Implementations may block.
pub trait Annunciator: Send + Sync {
    fn annunciate(&self, notice: &AlertNotice) -> io::Result<()>;
}

/// Flashing red banner and terminal bell on stdout.
#[derive(Debug, Clone)]
pub struct TerminalAnnunciator {
    flashes: u32,
    interval: Duration,
}

impl TerminalAnnunciator {
    pub fn new(flashes: u32, interval: Duration) -> Self {
        Self { flashes, interval }
    }
}

impl Default for TerminalAnnunciator {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

impl Annunciator for TerminalAnnunciator {
    fn annunciate(&self, notice: &AlertNotice) -> io::Result<()> {
        let risk = notice
            .risk
            .map(|r| format!("{:.2}", r))
            .unwrap_or_else(|| "unknown".to_string());
        let mut out = io::stdout().lock();
        for flash in 0..self.flashes {
            writeln!(
                out,
                "\x1b[1;37;41m FIRE ALERT \x1b[0m from {} (risk {}) at {}\x07",
                notice.src,
                risk,
                notice.received_at.format("%H:%M:%S")
            )?;
            out.flush()?;
            if flash + 1 < self.flashes {
                thread::sleep(self.interval);
            }
        }
        Ok(())
    }
}

/// Annunciator that only writes a log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAnnunciator;

impl Annunciator for LogAnnunciator {
    fn annunciate(&self, notice: &AlertNotice) -> io::Result<()> {
        warn!(msg_id = %notice.msg_id, src = %notice.src, risk = ?notice.risk, "FIRE ALERT");
        Ok(())
    }
}

/// Start annunciation on a blocking worker and return immediately.
pub fn spawn_annunciation(annunciator: Arc<dyn Annunciator>, notice: AlertNotice) {
    tokio::task::spawn_blocking(move || match annunciator.annunciate(&notice) {
        Ok(()) => debug!(msg_id = %notice.msg_id, src = %notice.src, "Annunciation complete"),
        Err(e) => warn!(msg_id = %notice.msg_id, src = %notice.src, error = %e, "Annunciation failed"),
    });
}
