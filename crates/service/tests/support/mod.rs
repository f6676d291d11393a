#![forbid(unsafe_code)]
#![allow(dead_code)]

use soi_core::token::{PresentedToken, Token};
use soi_service::{Service, ServiceConfig};
use soi_storage::SqliteStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

pub(crate) fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("soi_service_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// Hand-driven clock shared between a test and the service it drives.
#[derive(Clone, Debug)]
pub(crate) struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub(crate) fn at(ms: i64) -> Self {
        Self(Arc::new(AtomicI64::new(ms)))
    }

    pub(crate) fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }

    pub(crate) fn reading(&self) -> impl Fn() -> i64 + use<> {
        let inner = Arc::clone(&self.0);
        move || inner.load(Ordering::SeqCst)
    }
}

pub(crate) fn open_service(test_name: &str) -> (Service<impl Fn() -> i64>, ManualClock, PathBuf) {
    let dir = temp_dir(test_name);
    let store = SqliteStore::open(&dir).expect("open store");
    let clock = ManualClock::at(1_700_000_000_000);
    let service = Service::new(store, clock.reading());
    (service, clock, dir)
}

pub(crate) fn open_system_service(dir: &std::path::Path) -> Service {
    Service::open(&ServiceConfig::in_dir(dir)).expect("open service")
}

pub(crate) fn presented(token: &Token) -> PresentedToken {
    PresentedToken::from(token.clone())
}
