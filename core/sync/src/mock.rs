//! Scripted remote service and sleeper for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::remote::{
    Connector, NewExhibitsRequest, NewExhibitsResponse, NewMapImagesRequest,
    NewMapImagesResponse, RawReport, RemoteSession,
};
use crate::retry::Sleeper;
use nubz_common::{Error, Result, ServerReportId};

#[derive(Default)]
struct Script {
    connect_failures: AtomicU32,
    connect_attempts: AtomicU32,
    opened: AtomicU32,
    closed: AtomicU32,
    id_calls: AtomicU32,
    next_server_id: AtomicU32,
    /// Outcome of successive `save_report` calls; success once drained.
    save_results: Mutex<VecDeque<Result<()>>>,
    saved: Mutex<Vec<RawReport>>,
    map_response: Mutex<Option<NewMapImagesResponse>>,
    map_requests: Mutex<Vec<NewMapImagesRequest>>,
    exhibits_response: Mutex<Option<NewExhibitsResponse>>,
    exhibits_requests: Mutex<Vec<NewExhibitsRequest>>,
}

/// Connector to an in-memory remote service following a script.
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    script: Arc<Script>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` connection attempts.
    pub fn fail_connects(&self, count: u32) {
        self.script.connect_failures.store(count, Ordering::SeqCst);
    }

    /// Remote ids handed out start at `first`.
    pub fn next_server_ids_from(&self, first: i32) {
        self.script
            .next_server_id
            .store(first as u32, Ordering::SeqCst);
    }

    /// Queue the outcome of the next `save_report` call.
    pub fn push_save_result(&self, result: Result<()>) {
        self.script.save_results.lock().unwrap().push_back(result);
    }

    pub fn set_map_response(&self, response: NewMapImagesResponse) {
        *self.script.map_response.lock().unwrap() = Some(response);
    }

    pub fn set_exhibits_response(&self, response: NewExhibitsResponse) {
        *self.script.exhibits_response.lock().unwrap() = Some(response);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.script.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> u32 {
        self.script.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> u32 {
        self.script.closed.load(Ordering::SeqCst)
    }

    pub fn id_calls(&self) -> u32 {
        self.script.id_calls.load(Ordering::SeqCst)
    }

    pub fn saved(&self) -> Vec<RawReport> {
        self.script.saved.lock().unwrap().clone()
    }

    pub fn map_requests(&self) -> Vec<NewMapImagesRequest> {
        self.script.map_requests.lock().unwrap().clone()
    }

    pub fn exhibits_requests(&self) -> Vec<NewExhibitsRequest> {
        self.script.exhibits_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open_session(&self) -> Result<Box<dyn RemoteSession>> {
        self.script.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .script
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Network("connection refused".to_string()));
        }
        self.script.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            script: self.script.clone(),
        }))
    }
}

struct MockSession {
    script: Arc<Script>,
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn get_new_map_images(
        &mut self,
        request: NewMapImagesRequest,
    ) -> Result<NewMapImagesResponse> {
        self.script.map_requests.lock().unwrap().push(request);
        self.script
            .map_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Remote("no maps".to_string()))
    }

    async fn get_new_exhibits(
        &mut self,
        request: NewExhibitsRequest,
    ) -> Result<NewExhibitsResponse> {
        self.script.exhibits_requests.lock().unwrap().push(request);
        self.script
            .exhibits_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Remote("no exhibits".to_string()))
    }

    async fn get_id_for_new_report(&mut self) -> Result<ServerReportId> {
        self.script.id_calls.fetch_add(1, Ordering::SeqCst);
        // Let other sessions run while the call is in flight.
        tokio::task::yield_now().await;
        let id = self.script.next_server_id.fetch_add(1, Ordering::SeqCst);
        Ok(ServerReportId::new(id as i32))
    }

    async fn save_report(&mut self, report: RawReport) -> Result<()> {
        tokio::task::yield_now().await;
        let result = self
            .script
            .save_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()));
        if result.is_ok() {
            self.script.saved.lock().unwrap().push(report);
        }
        result
    }

    async fn close(&mut self) {
        self.script.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sleeper recording the waits it was asked for and returning at once.
#[derive(Default)]
pub(crate) struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}
