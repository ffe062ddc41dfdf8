use std::sync::Arc;

use indi::{
    client::{Client, ClientError, Update},
    BlobEnable, Command, Parameter, ToCommand,
};
use tokio::sync::broadcast;

/// The parts of an INDI session a flat run relies on.
#[allow(async_fn_in_trait)]
pub trait Session {
    async fn has_device(&self, name: &str) -> bool;

    /// A snapshot of the named parameter, `None` until the server defines it.
    async fn parameter(&self, device: &str, name: &str) -> Option<Parameter>;

    /// Queues a command for the server without waiting for it to be written.
    fn submit(&self, command: Command) -> Result<(), ClientError>;

    fn subscribe(&self) -> broadcast::Receiver<Arc<Update>>;

    fn enable_blob(&self, device: &str, name: &str, enabled: BlobEnable) -> Result<(), ClientError>;

    async fn disconnect(&mut self) -> Result<(), ClientError>;

    fn change<V: ToCommand>(&self, device: &str, name: &str, values: V) -> Result<(), ClientError> {
        self.submit(values.to_command(device.to_string(), name.to_string()))
    }
}

impl Session for Client {
    async fn has_device(&self, name: &str) -> bool {
        Client::has_device(self, name).await
    }

    async fn parameter(&self, device: &str, name: &str) -> Option<Parameter> {
        self.get_parameter(device, name).await
    }

    fn submit(&self, command: Command) -> Result<(), ClientError> {
        self.send(command)
    }

    fn subscribe(&self) -> broadcast::Receiver<Arc<Update>> {
        Client::subscribe(self)
    }

    fn enable_blob(
        &self,
        device: &str,
        name: &str,
        enabled: BlobEnable,
    ) -> Result<(), ClientError> {
        Client::enable_blob(self, device, Some(name), enabled)
    }

    async fn disconnect(&mut self) -> Result<(), ClientError> {
        self.shutdown().await
    }
}
