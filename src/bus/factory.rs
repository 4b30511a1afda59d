use ::config::Config;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;

use super::{is_bus_scheme, service_name, BusMessaging};
use crate::dispatch::ListenerDispatcher;
use crate::error::Error;
use crate::factory::{Messaging, MessagingFactory, MultiSubjectMessaging};
use crate::native::{BusConnector, BusMode, BusTransport, ServiceConfig};

/// Creates bus messaging for `rv`, `rv+ipc` and `rv+cm` addresses.
///
/// # Configuration Keys
///
/// Looked up under the service name of the address (`{service}.{key}`, then
/// `{key}`):
///
/// - `network`: Network interface to join (optional)
/// - `daemon`: Daemon to connect through (optional)
/// - `cm_name`: Correspondent name, required for `rv+cm`
pub struct BusMessagingFactory {
    config: Config,
    connector: Arc<dyn BusConnector>,
}

impl BusMessagingFactory {
    pub fn new(config: &Config, connector: Arc<dyn BusConnector>) -> Self {
        Self {
            config: config.clone(),
            connector,
        }
    }

    /// Builds the connection settings for an address. `Ok(None)` if the
    /// address is not a bus address.
    pub fn service_config(&self, address: &Url) -> Result<Option<ServiceConfig>, Error> {
        let scheme = address.scheme();
        if !is_bus_scheme(scheme) {
            return Ok(None);
        }
        let service = service_name(address);
        let mode = match scheme {
            "rv" => BusMode::Reliable,
            "rv+ipc" => BusMode::Ipc,
            "rv+cm" => {
                let Some(name) = crate::config::optional_string(&self.config, &service, "cm_name")? else {
                    return Err(Error::NotSupported(format!(
                        "certified messaging on '{service}' requires a cm_name"
                    )));
                };
                BusMode::Certified { name }
            }
            other => return Err(Error::NotSupported(format!("bus scheme '{other}'"))),
        };
        Ok(Some(ServiceConfig {
            network: crate::config::optional_string(&self.config, &service, "network")?,
            daemon: crate::config::optional_string(&self.config, &service, "daemon")?,
            mode,
        }))
    }

    fn connect(&self, address: &Url) -> Result<Option<Arc<dyn BusTransport>>, Error> {
        let Some(settings) = self.service_config(address)? else {
            return Ok(None);
        };
        let service = service_name(address);
        let transport = self.connector.connect(&service, &settings)?;
        info!(service = %service, mode = ?settings.mode, "Connected to bus");
        Ok(Some(transport))
    }
}

impl MessagingFactory for BusMessagingFactory {
    #[instrument(skip(self), fields(address = %address))]
    fn try_create(&self, address: &Url) -> Result<Option<Box<dyn Messaging>>, Error> {
        let Some(transport) = self.connect(address)? else {
            debug!("Not a bus address");
            return Ok(None);
        };
        Ok(Some(Box::new(BusMessaging::new(address.clone(), transport))))
    }

    #[instrument(skip(self), fields(address = %address))]
    fn try_create_multi_subject(&self, address: &Url) -> Result<Option<Box<dyn MultiSubjectMessaging>>, Error> {
        let Some(transport) = self.connect(address)? else {
            debug!("Not a bus address");
            return Ok(None);
        };
        Ok(Some(Box::new(ListenerDispatcher::new(address.clone(), transport))))
    }
}
