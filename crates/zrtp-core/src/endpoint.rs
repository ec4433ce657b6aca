//! Composition root for ZRTP transports
//!
//! A [`ZrtpEndpoint`] owns the configuration and the timer service shared by
//! all transports it creates. There is no process-wide state: two endpoints
//! run two independent timer threads.

use std::sync::Arc;

use tracing::debug;

use crate::config::ZrtpConfig;
use crate::engine::ZrtpEngine;
use crate::timer::TimerService;
use crate::transport::MediaTransport;
use crate::zrtp_transport::ZrtpTransport;
use crate::Result;

/// Factory for [`ZrtpTransport`]s sharing one timer service
pub struct ZrtpEndpoint {
    config: ZrtpConfig,
    timers: Arc<TimerService>,
}

impl ZrtpEndpoint {
    /// Create an endpoint with a threaded timer service
    pub fn new(config: ZrtpConfig) -> Result<Self> {
        config.validate()?;
        let timers = TimerService::new(config.timer);
        Ok(Self { config, timers })
    }

    /// Create an endpoint around an existing timer service
    pub fn with_timer_service(config: ZrtpConfig, timers: Arc<TimerService>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, timers })
    }

    pub fn config(&self) -> &ZrtpConfig {
        &self.config
    }

    pub fn timer_service(&self) -> &Arc<TimerService> {
        &self.timers
    }

    /// Wrap `slave` with ZRTP using the endpoint configuration
    pub fn create_transport(
        &self,
        slave: Arc<dyn MediaTransport>,
        engine: Box<dyn ZrtpEngine>,
        close_slave: bool,
    ) -> Result<ZrtpTransport> {
        self.create_transport_with_config(slave, engine, self.config.clone(), close_slave)
    }

    /// Wrap `slave` with ZRTP using a per-stream configuration
    pub fn create_transport_with_config(
        &self,
        slave: Arc<dyn MediaTransport>,
        engine: Box<dyn ZrtpEngine>,
        config: ZrtpConfig,
        close_slave: bool,
    ) -> Result<ZrtpTransport> {
        let transport = ZrtpTransport::new(slave, engine, config, &self.timers, close_slave)?;
        debug!(
            "ZRTP endpoint now has {} transports",
            self.timers.instance_count()
        );
        Ok(transport)
    }
}

impl std::fmt::Debug for ZrtpEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZrtpEndpoint")
            .field("config", &self.config)
            .field("transports", &self.timers.instance_count())
            .finish()
    }
}
