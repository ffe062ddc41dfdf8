pub mod device;
pub mod tcpstream;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpStream, ToSocketAddrs},
    sync::{broadcast, mpsc, Notify, RwLock},
    task::JoinHandle,
};

use self::{
    device::{DeviceStore, MemoryDeviceStore},
    tcpstream::{AsyncIndiReader, AsyncIndiWriter},
};
use crate::{
    serialization, BlobEnable, Command, DeError, EnableBlob, GetProperties, Parameter,
    ToCommand, INDI_PROTOCOL_VERSION,
};

/// Number of updates a slow subscriber may fall behind before it starts missing them.
pub const UPDATE_BUFFER: usize = 1024;

#[derive(Debug)]
pub enum ClientError {
    Io(std::io::Error),
    DeError(serialization::DeError),
    Disconnected,
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Io(e) => write!(f, "io error: {}", e),
            ClientError::DeError(e) => write!(f, "protocol error: {}", e),
            ClientError::Disconnected => write!(f, "client is disconnected"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(value: std::io::Error) -> Self {
        ClientError::Io(value)
    }
}

impl From<DeError> for ClientError {
    fn from(value: DeError) -> Self {
        ClientError::DeError(value)
    }
}

impl<T> From<mpsc::error::SendError<T>> for ClientError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        ClientError::Disconnected
    }
}

/// A single image (or other binary) payload delivered by a `setBLOBVector`.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobPayload {
    pub name: String,
    pub size: u64,
    pub format: String,
    pub data: Arc<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    Defined(Parameter),
    Changed(Parameter),
    Blobs(Vec<BlobPayload>),
    Deleted,
}

/// Notification sent to subscribers for every parameter the server touches.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub device: String,
    pub name: String,
    pub kind: UpdateKind,
}

pub trait AsyncClientConnection {
    type Read: AsyncRead + Unpin + Send + 'static;
    type Write: AsyncWrite + Unpin + Send + 'static;

    fn to_indi(self) -> (AsyncIndiWriter<Self::Write>, AsyncIndiReader<Self::Read>);
}

/// Connects to the INDI server at `addr` and starts tracking every device it exposes.
pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Client, ClientError> {
    let connection = TcpStream::connect(addr).await?;
    Ok(new(connection, None, None))
}

/// Create a new Client object that will stay in sync with the INDI server
/// on the other end of `connection`.
///
/// # Arguments
/// * `connection` - An object implementing `AsyncClientConnection` (such as TcpStream)
///   that will be used to communicate with an INDI server.
/// * `device` - An optional name for a specific device to track.
/// * `parameter` - An optional name for the given `device`'s parameter to track.
pub fn new<T: AsyncClientConnection>(
    connection: T,
    device: Option<&str>,
    parameter: Option<&str>,
) -> Client {
    let (mut writer, mut reader) = connection.to_indi();
    let (commands, mut incoming_commands) = mpsc::unbounded_channel::<Command>();
    let (thread_updates, _) = broadcast::channel(UPDATE_BUFFER);
    let updates = Arc::new(Mutex::new(Some(thread_updates.clone())));
    let devices = Arc::new(RwLock::new(MemoryDeviceStore::new()));
    let shutdown = Arc::new(Notify::new());

    // Queued before the writer starts so it is always the first thing sent.
    let _ = commands.send(Command::GetProperties(GetProperties {
        version: INDI_PROTOCOL_VERSION.to_string(),
        device: device.map(String::from),
        name: parameter.map(String::from),
    }));

    let writer_shutdown = shutdown.clone();
    let writer_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                command = incoming_commands.recv() => {
                    let Some(command) = command else { break };
                    tracing::debug!(
                        device = ?command.device_name(),
                        name = ?command.param_name(),
                        "sending"
                    );
                    writer.write(&command).await?;
                }
                _ = writer_shutdown.notified() => break,
            }
        }
        writer.shutdown().await
    });

    let thread_devices = devices.clone();
    let reader_updates = updates.clone();
    let reader_task = tokio::spawn(async move {
        loop {
            let command = match reader.read().await {
                Some(Ok(command)) => command,
                Some(Err(DeError::XmlError(quick_xml::Error::Io(e)))) => {
                    tracing::error!("Connection to INDI server failed: {}", e);
                    break;
                }
                Some(Err(e)) => {
                    tracing::debug!("Skipping unparsable command: {}", e);
                    continue;
                }
                None => {
                    tracing::info!("INDI server closed the connection");
                    break;
                }
            };
            if let Command::Message(message) = &command {
                if let Some(text) = &message.message {
                    tracing::info!(device = ?message.device, "{}", text);
                }
            }

            let changes = {
                let mut locked_devices = thread_devices.write().await;
                locked_devices.update(command)
            };
            match changes {
                Ok(changes) => {
                    for change in changes {
                        // No subscribers is fine.
                        let _ = thread_updates.send(Arc::new(change));
                    }
                }
                Err(e) => tracing::debug!("Unable to apply update: {:?}", e),
            }
        }
        close_updates(&reader_updates);
    });

    Client {
        devices,
        updates,
        commands,
        shutdown,
        workers: Some((reader_task, writer_task)),
    }
}

/// Drops the shared sender.  Subscribers see `Closed` once the reader task's copy is gone too.
fn close_updates(updates: &Mutex<Option<broadcast::Sender<Arc<Update>>>>) {
    if let Ok(mut updates) = updates.lock() {
        updates.take();
    }
}

/// Struct used to keep track of a the devices and their properties.
pub struct Client {
    devices: Arc<RwLock<MemoryDeviceStore>>,
    updates: Arc<Mutex<Option<broadcast::Sender<Arc<Update>>>>>,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: Arc<Notify>,
    workers: Option<(JoinHandle<()>, JoinHandle<Result<(), DeError>>)>,
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown.notify_one();
        if let Some((reader, _)) = &self.workers {
            reader.abort();
        }
    }
}

impl Client {
    pub async fn device_names(&self) -> Vec<String> {
        self.devices.read().await.keys().cloned().collect()
    }

    pub async fn has_device(&self, name: &str) -> bool {
        self.devices.read().await.contains_key(name)
    }

    /// Returns a snapshot of the named parameter, if the server has defined it.
    pub async fn get_parameter(&self, device: &str, name: &str) -> Option<Parameter> {
        self.devices
            .read()
            .await
            .get(device)?
            .get_parameter(name)
            .cloned()
    }

    /// Queues `command` for the server.  Never blocks, so it is safe to call from `Drop`.
    pub fn send(&self, command: Command) -> Result<(), ClientError> {
        Ok(self.commands.send(command)?)
    }

    pub fn change<V: ToCommand>(
        &self,
        device: &str,
        name: &str,
        values: V,
    ) -> Result<(), ClientError> {
        self.send(values.to_command(device.to_string(), name.to_string()))
    }

    /// Subscribe to every update applied to the device store from now on.  The receiver
    /// reports `Closed` once the connection to the server is gone.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Update>> {
        let subscribed = self
            .updates
            .lock()
            .ok()
            .and_then(|updates| updates.as_ref().map(|sender| sender.subscribe()));
        // A receiver whose sender is already gone reports `Closed` straight away.
        subscribed.unwrap_or_else(|| broadcast::channel(1).1)
    }

    /// Sends an `EnableBlob` command for the named parameter.  This must be called with
    /// [BlobEnable::Also] or [BlobEnable::Only] for the server to send image data.
    pub fn enable_blob(
        &self,
        device: &str,
        name: Option<&str>,
        enabled: BlobEnable,
    ) -> Result<(), ClientError> {
        self.send(Command::EnableBlob(EnableBlob {
            device: device.to_string(),
            name: name.map(String::from),
            enabled,
        }))
    }

    /// Flushes queued commands, closes the connection and waits for the worker tasks.
    pub async fn shutdown(&mut self) -> Result<(), ClientError> {
        self.shutdown.notify_one();
        let Some((reader, writer)) = self.workers.take() else {
            return Ok(());
        };

        let written = match tokio::time::timeout(Duration::from_secs(5), writer).await {
            Ok(Ok(result)) => result.map_err(ClientError::from),
            Ok(Err(e)) => {
                tracing::error!("Writer task failed: {:?}", e);
                Err(ClientError::Disconnected)
            }
            Err(_) => {
                tracing::warn!("Timed out flushing commands to the INDI server");
                Err(ClientError::Disconnected)
            }
        };
        reader.abort();
        let _ = reader.await;
        close_updates(&self.updates);
        written
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
    use tracing_test::traced_test;

    use super::*;
    use crate::PropertyState;

    async fn next_update(updates: &mut broadcast::Receiver<Arc<Update>>) -> Arc<Update> {
        tokio::time::timeout(Duration::from_secs(1), updates.recv())
            .await
            .expect("update in time")
            .expect("update")
    }

    #[tokio::test]
    #[traced_test]
    async fn test_client_tracks_server() {
        let (server, connection) = tokio::io::duplex(64 * 1024);
        let (server_read, mut server_write) = tokio::io::split(server);
        let mut server_lines = tokio::io::BufReader::new(server_read).lines();

        let client = new(connection, None, None);
        let mut updates = client.subscribe();

        let hello = server_lines.next_line().await.unwrap().unwrap();
        assert_eq!(hello, r#"<getProperties version="1.7"/>"#);

        server_write
            .write_all(
                br#"<defSwitchVector device="EQMod Mount" name="TELESCOPE_PARK" state="Idle" perm="rw" rule="OneOfMany">
<defSwitch name="PARK">Off</defSwitch>
<defSwitch name="UNPARK">On</defSwitch>
</defSwitchVector>
<message device="EQMod Mount" message="Mount is unparked."/>
"#,
            )
            .await
            .unwrap();

        let update = next_update(&mut updates).await;
        assert_eq!(update.device, "EQMod Mount");
        assert!(matches!(update.kind, UpdateKind::Defined(_)));
        assert!(client.has_device("EQMod Mount").await);

        client
            .change(
                "EQMod Mount",
                "TELESCOPE_PARK",
                vec![("PARK", true), ("UNPARK", false)],
            )
            .unwrap();
        let sent = server_lines.next_line().await.unwrap().unwrap();
        assert!(sent.starts_with(r#"<newSwitchVector device="EQMod Mount" name="TELESCOPE_PARK""#));

        server_write
            .write_all(
                br#"<setSwitchVector device="EQMod Mount" name="TELESCOPE_PARK" state="Ok">
<oneSwitch name="PARK">On</oneSwitch>
<oneSwitch name="UNPARK">Off</oneSwitch>
</setSwitchVector>
"#,
            )
            .await
            .unwrap();

        let update = next_update(&mut updates).await;
        assert!(matches!(update.kind, UpdateKind::Changed(_)));
        let park = client
            .get_parameter("EQMod Mount", "TELESCOPE_PARK")
            .await
            .unwrap();
        assert_eq!(park.get_state(), &PropertyState::Ok);
        assert_eq!(park.switch("PARK"), Ok(Some(true)));
        assert!(logs_contain("Mount is unparked."));
    }

    #[tokio::test]
    async fn test_client_delivers_blobs() {
        let (server, connection) = tokio::io::duplex(64 * 1024);
        let (_server_read, mut server_write) = tokio::io::split(server);

        let client = new(connection, None, None);
        let mut updates = client.subscribe();

        server_write
            .write_all(
                br#"<defBLOBVector device="Canon DSLR EOS 1500D" name="CCD1" state="Idle" perm="ro">
<defBLOB name="CCD1"/>
</defBLOBVector>
<setBLOBVector device="Canon DSLR EOS 1500D" name="CCD1" state="Ok">
<oneBLOB name="CCD1" size="3" format=".fits">
AQID
</oneBLOB>
</setBLOBVector>
"#,
            )
            .await
            .unwrap();

        assert!(matches!(
            next_update(&mut updates).await.kind,
            UpdateKind::Defined(_)
        ));
        match &next_update(&mut updates).await.kind {
            UpdateKind::Blobs(payloads) => {
                assert_eq!(payloads.len(), 1);
                assert_eq!(payloads[0].data.as_slice(), &[1, 2, 3]);
                assert_eq!(payloads[0].format, ".fits");
            }
            k => panic!("Unexpected update: {:?}", k),
        }
    }

    #[tokio::test]
    async fn test_subscribers_see_server_hang_up() {
        let (server, connection) = tokio::io::duplex(64 * 1024);
        let client = new(connection, None, None);
        let mut updates = client.subscribe();

        drop(server);

        let received = tokio::time::timeout(Duration::from_secs(2), updates.recv())
            .await
            .expect("subscriber told about the hang up");
        assert!(matches!(received, Err(broadcast::error::RecvError::Closed)));

        let mut late = client.subscribe();
        assert!(matches!(
            late.try_recv(),
            Err(broadcast::error::TryRecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_flushes_queued_commands() {
        let (server, connection) = tokio::io::duplex(64 * 1024);
        let (server_read, _server_write) = tokio::io::split(server);
        let mut server_lines = tokio::io::BufReader::new(server_read).lines();

        let mut client = new(connection, None, None);
        client
            .change(
                "Gastro Flatcap",
                "FLAT_LIGHT_CONTROL",
                vec![("FLAT_LIGHT_ON", false), ("FLAT_LIGHT_OFF", true)],
            )
            .unwrap();
        client.shutdown().await.unwrap();

        assert!(server_lines
            .next_line()
            .await
            .unwrap()
            .unwrap()
            .starts_with("<getProperties"));
        assert!(server_lines
            .next_line()
            .await
            .unwrap()
            .unwrap()
            .contains(r#"name="FLAT_LIGHT_CONTROL""#));
        assert_eq!(server_lines.next_line().await.unwrap(), None);

        assert!(matches!(
            client.send(Command::GetProperties(GetProperties {
                version: INDI_PROTOCOL_VERSION.to_string(),
                device: None,
                name: None,
            })),
            Err(ClientError::Disconnected)
        ));
    }
}
