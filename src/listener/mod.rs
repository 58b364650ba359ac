//! Live listener: the foreground API over the background packet reader

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::buffer::EventBuffer;
use crate::config::ListenerConfig;
use crate::driver::{Driver, DriverHandle};
use crate::instrument::{InstrumentLoader, XmlInstrumentLoader};
use crate::protocol::ClientHelloPacket;
use crate::state::ListenerState;
use crate::{ListenerError, Result, RunStatus, Timestamp};


/// Client for a live ADARA stream.
///
/// Call [`connect`](Self::connect) then [`start`](Self::start), then poll
/// [`extract_data`](Self::extract_data) and [`run_status`](Self::run_status)
/// from one consumer. Errors raised on the background reader are returned by
/// the next foreground call; after that every call reports
/// [`ListenerError::Disconnected`].
pub struct LiveListener {
    config: ListenerConfig,
    state: Arc<Mutex<ListenerState>>,
    /// Socket between `connect` and `start`; the reader owns it afterwards
    stream: Option<TcpStream>,
    address: Option<String>,
    driver: Option<DriverHandle>,
}

impl LiveListener {
    /// Create a listener using `loader` to resolve instrument layouts.
    ///
    /// Environment overrides are applied here, once.
    pub fn new(config: ListenerConfig, loader: impl InstrumentLoader + 'static) -> Self {
        let config = config.with_env_overrides();
        let state = ListenerState::new(config.keep_paused_events, Arc::new(loader));
        Self { config, state: Arc::new(Mutex::new(state)), stream: None, address: None, driver: None }
    }

    /// Create a listener that reads detector ids straight from the geometry XML.
    pub fn with_default_loader(config: ListenerConfig) -> Self {
        Self::new(config, XmlInstrumentLoader)
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Open the connection to the stream service. A single attempt; callers own retries.
    pub async fn connect(&mut self, address: &str) -> Result<()> {
        self.config.validate()?;
        if self.stream.is_some() || self.driver.is_some() {
            return Err(ListenerError::invalid_state("listener is already connected"));
        }

        info!(address, timeout = ?self.config.connect_timeout(), "Connecting to stream service");
        let stream = match tokio::time::timeout(self.config.connect_timeout(), TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(address, error = %e, "Connection failed");
                return Err(ListenerError::connection_failed_with_source(address, e.to_string(), Box::new(e)));
            }
            Err(_) => {
                warn!(address, "Connection timed out");
                return Err(ListenerError::connection_failed(
                    address,
                    format!("timed out after {:?}", self.config.connect_timeout()),
                ));
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Could not disable Nagle on stream socket");
        }

        self.stream = Some(stream);
        self.address = Some(address.to_string());
        self.state.lock().connected = true;
        info!(address, "Connected to stream service");
        Ok(())
    }

    /// Request data from `start_time` onward and start the background reader.
    ///
    /// [`Timestamp::ZERO`] streams from now, [`Timestamp::START_OF_RUN`]
    /// discards data until the next run starts.
    pub async fn start(&mut self, start_time: Timestamp) -> Result<()> {
        if self.driver.is_some() {
            return Err(ListenerError::invalid_state("listener is already streaming"));
        }
        let Some(mut stream) = self.stream.take() else {
            return Err(ListenerError::invalid_state("connect must succeed before start"));
        };

        self.state.lock().begin_streaming(start_time);

        let hello = ClientHelloPacket::new(start_time).encode(Timestamp::now());
        if let Err(e) = stream.write_all(&hello).await {
            self.state.lock().connected = false;
            return Err(ListenerError::io("sending client hello", e));
        }
        debug!(bytes = hello.len(), %start_time, "Client hello sent");

        self.driver = Some(Driver::spawn(stream, self.state.clone(), self.config.clone()));
        info!(address = ?self.address, "Background reader started");
        Ok(())
    }

    /// Detach the accumulated data, leaving an empty successor buffer in place.
    ///
    /// Waits up to the configured extract wait for the buffer to be
    /// initialized. Returns [`ListenerError::NotReady`] (retryable) if it still
    /// is not, or while data before the requested start is being discarded.
    pub async fn extract_data(&self) -> Result<EventBuffer> {
        {
            let mut state = self.state.lock();
            state.check_background()?;
            if !state.started {
                return Err(ListenerError::invalid_state("start must be called before extracting data"));
            }
        }

        let deadline = Instant::now() + self.config.extract_wait();
        loop {
            let initialized = {
                let mut state = self.state.lock();
                state.check_background()?;
                state.buffer.is_initialized()
            };
            if initialized || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(self.config.extract_poll()).await;
        }

        let buffer = self.state.lock().try_extract()?;
        debug!(events = buffer.total_events(), "Extracted event buffer");
        Ok(buffer)
    }

    /// Current run status; observing a boundary resets per-run state and resumes reads.
    pub fn run_status(&self) -> Result<RunStatus> {
        self.state.lock().advance_run_status()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Stop the background reader and close the connection.
    pub async fn stop(&mut self) -> Result<()> {
        self.stream = None;
        let result = match self.driver.take() {
            Some(driver) => driver.shutdown(self.config.join_timeout()).await,
            None => Ok(()),
        };
        self.state.lock().mark_stopped();
        info!(address = ?self.address, "Listener stopped");
        result
    }
}

impl Drop for LiveListener {
    fn drop(&mut self) {
        if let Some(driver) = &self.driver {
            debug!("Dropping live listener");
            driver.cancel();
        }
    }
}
