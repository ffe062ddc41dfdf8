use std::num::Wrapping;

use indi::{Parameter, ParameterKind, PropertyState};

use crate::{
    config::Config,
    resolve,
    retry::{PollError, Status},
    session::Session,
    FlatError,
};

pub const CONNECTION: &str = "CONNECTION";
pub const CONNECT: &str = "CONNECT";

fn is_connected(param: &Parameter) -> bool {
    param.switch(CONNECT) == Ok(Some(true))
        && !matches!(param.get_state(), PropertyState::Alert | PropertyState::Busy)
}

/// Makes sure `device` reports itself connected, asking it to connect when it isn't.
///
/// Each request is followed by polling `CONNECTION` under the connect policy.  A device
/// that never confirms fails with [FlatError::NotConnected] once `reconnect_attempts`
/// requests have been made.
#[tracing::instrument(skip(session, config))]
pub async fn ensure_connected<S: Session>(
    session: &S,
    config: &Config,
    device: &str,
) -> Result<(), FlatError> {
    let policy = config.resolve_policy();
    let connection =
        resolve::property(session, &policy, device, CONNECTION, ParameterKind::Switch).await?;
    if is_connected(&connection) {
        tracing::debug!("{} already connected", device);
        return Ok(());
    }

    let connect_policy = config.connect_policy();
    for attempt in 1..=config.reconnect_attempts {
        let connection =
            resolve::property(session, &policy, device, CONNECTION, ParameterKind::Switch).await?;
        let submitted: Wrapping<usize> = connection.gen();
        tracing::info!(
            "Connecting {} (attempt {}/{})",
            device,
            attempt,
            config.reconnect_attempts
        );
        session.change(device, CONNECTION, resolve::select(device, &connection, CONNECT)?)?;

        let confirmed = connect_policy
            .poll_fn(|| async move {
                match session.parameter(device, CONNECTION).await {
                    Some(param) if is_connected(&param) => Ok(Status::Complete(())),
                    Some(param)
                        if param.gen() != submitted
                            && *param.get_state() == PropertyState::Alert =>
                    {
                        Err(())
                    }
                    _ => Ok(Status::Pending),
                }
            })
            .await;
        match confirmed {
            Ok(()) => {
                tracing::info!("{} connected", device);
                return Ok(());
            }
            Err(PollError::Abort(())) => tracing::warn!("{} refused to connect", device),
            Err(PollError::Exhausted { attempts }) => tracing::warn!(
                "{} did not confirm connection after {} polls",
                device,
                attempts
            ),
        }
    }

    Err(FlatError::NotConnected {
        device: device.to_string(),
        attempts: config.reconnect_attempts,
    })
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::sim::{SimOptions, SimSession};

    #[tokio::test(start_paused = true)]
    async fn test_connects_disconnected_device() {
        let session = SimSession::new(SimOptions::default());
        ensure_connected(&session, &Config::default(), "EQMod Mount")
            .await
            .unwrap();

        assert_eq!(session.log(), vec!["EQMod Mount.CONNECTION CONNECT"]);
        let connection = session.parameter("EQMod Mount", CONNECTION).await.unwrap();
        assert!(is_connected(&connection));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_device_is_left_alone() {
        let session = SimSession::new(SimOptions::default());
        let config = Config::default();
        ensure_connected(&session, &config, "EQMod Mount").await.unwrap();
        ensure_connected(&session, &config, "EQMod Mount").await.unwrap();

        assert_eq!(session.log().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_reconnect_is_bounded() {
        let session = SimSession::new(SimOptions {
            never_connects: vec![String::from("Gastro Flatcap")],
            ..Default::default()
        });
        let config = Config {
            reconnect_attempts: 2,
            ..Default::default()
        };

        let result = ensure_connected(&session, &config, "Gastro Flatcap").await;
        assert!(matches!(
            result,
            Err(FlatError::NotConnected { attempts: 2, .. })
        ));
        assert_eq!(session.log().len(), 2);
        assert!(logs_contain("Gastro Flatcap refused to connect"));
    }
}
