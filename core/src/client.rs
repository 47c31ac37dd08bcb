//! Entry point bundling configuration, routes and dispatcher.
//!
//! # Design
//! `DisClient` holds no per-call state. Constructing one registers (or
//! reuses) the process-wide transport for its configuration; cloning it is
//! cheap and shares that transport. Callers build a URL from `routes()`,
//! supply their signed headers and call `dispatcher().exchange::<R>(..)`.

use crate::config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::routes::Routes;
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct DisClient {
    config: ClientConfig,
    routes: Routes,
    dispatcher: Dispatcher,
}

impl DisClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = Transport::instance(&config)?;
        Ok(Self {
            routes: Routes::new(&config.endpoint, &config.project_id),
            dispatcher: Dispatcher::new(transport),
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Drop this configuration's transport from the registry.
    ///
    /// Other clones keep working until they are dropped.
    pub fn close(self) {
        Transport::close(&self.config);
    }
}
