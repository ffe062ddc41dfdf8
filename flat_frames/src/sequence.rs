use std::num::Wrapping;

use indi::{ParameterKind, PropertyState};

use crate::{
    config::Config,
    resolve,
    retry::{PollError, RetryPolicy, Status},
    session::Session,
    FlatError,
};

pub const TELESCOPE_PARK: &str = "TELESCOPE_PARK";
pub const CAP_PARK: &str = "CAP_PARK";
pub const PARK: &str = "PARK";
pub const FLAT_LIGHT_CONTROL: &str = "FLAT_LIGHT_CONTROL";
pub const FLAT_LIGHT_ON: &str = "FLAT_LIGHT_ON";
pub const FLAT_LIGHT_OFF: &str = "FLAT_LIGHT_OFF";
pub const FLAT_LIGHT_INTENSITY: &str = "FLAT_LIGHT_INTENSITY";
pub const FLAT_LIGHT_INTENSITY_VALUE: &str = "FLAT_LIGHT_INTENSITY_VALUE";

/// Polls until `element` of the switch `property` is on and the vector is `Ok`.
/// An `Alert` that arrives after `submitted` aborts the wait.
async fn wait_for_switch<S: Session>(
    session: &S,
    policy: &RetryPolicy,
    device: &str,
    property: &str,
    element: &str,
    submitted: Wrapping<usize>,
) -> Result<(), PollError<()>> {
    policy
        .poll_fn(|| async move {
            let Some(param) = session.parameter(device, property).await else {
                return Ok(Status::Pending);
            };
            match param.get_state() {
                PropertyState::Alert if param.gen() != submitted => Err(()),
                PropertyState::Ok if param.switch(element) == Ok(Some(true)) => {
                    Ok(Status::Complete(()))
                }
                _ => Ok(Status::Pending),
            }
        })
        .await
}

/// Parks `device` through its `property` switch and waits until it reports parked.
#[tracing::instrument(skip(session, config))]
pub async fn park<S: Session>(
    session: &S,
    config: &Config,
    device: &str,
    property: &str,
) -> Result<(), FlatError> {
    let current = resolve::property(
        session,
        &config.resolve_policy(),
        device,
        property,
        ParameterKind::Switch,
    )
    .await?;
    tracing::info!("Parking {}", device);
    session.change(device, property, resolve::select(device, &current, PARK)?)?;

    let policy = config.park_policy();
    wait_for_switch(session, &policy, device, property, PARK, current.gen())
        .await
        .map_err(|e| match e {
            PollError::Abort(()) => FlatError::ParkFailed {
                device: device.to_string(),
            },
            PollError::Exhausted { .. } => FlatError::ParkTimeout {
                device: device.to_string(),
                timeout: policy.interval * policy.max_attempts as u32,
            },
        })?;

    tracing::info!("{} parked", device);
    tokio::time::sleep(config.settle()).await;
    Ok(())
}

/// Turns the flat light on, setting its brightness first when one is configured.
#[tracing::instrument(skip_all)]
pub async fn light_on<S: Session>(session: &S, config: &Config) -> Result<(), FlatError> {
    let device = config.flat_cap.as_str();
    let policy = config.resolve_policy();

    if let Some(intensity) = config.light_intensity {
        resolve::property(
            session,
            &policy,
            device,
            FLAT_LIGHT_INTENSITY,
            ParameterKind::Number,
        )
        .await?;
        tracing::info!("Setting light intensity to {}", intensity);
        session.change(
            device,
            FLAT_LIGHT_INTENSITY,
            vec![(FLAT_LIGHT_INTENSITY_VALUE, intensity)],
        )?;
    }

    let current =
        resolve::property(session, &policy, device, FLAT_LIGHT_CONTROL, ParameterKind::Switch)
            .await?;
    tracing::info!("Turning on light");
    session.change(
        device,
        FLAT_LIGHT_CONTROL,
        resolve::select(device, &current, FLAT_LIGHT_ON)?,
    )?;

    wait_for_switch(
        session,
        &config.park_policy(),
        device,
        FLAT_LIGHT_CONTROL,
        FLAT_LIGHT_ON,
        current.gen(),
    )
    .await
    .map_err(|_| FlatError::LightFailed {
        device: device.to_string(),
    })?;

    tokio::time::sleep(config.settle()).await;
    Ok(())
}

/// Asks the flat cap to turn its light off.  Safe to call when it is already off.
pub fn light_off<S: Session>(session: &S, device: &str) {
    tracing::info!("Turning off light");
    if let Err(e) = session.change(
        device,
        FLAT_LIGHT_CONTROL,
        vec![(FLAT_LIGHT_OFF, true), (FLAT_LIGHT_ON, false)],
    ) {
        tracing::error!("Unable to turn off light on {}: {}", device, e);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::sim::{SimOptions, SimSession};

    #[tokio::test(start_paused = true)]
    async fn test_park_waits_for_confirmation() {
        let session = SimSession::new(SimOptions::default());
        let config = Config::default();
        let started = tokio::time::Instant::now();

        park(&session, &config, "EQMod Mount", TELESCOPE_PARK)
            .await
            .unwrap();

        let parked = session
            .parameter("EQMod Mount", TELESCOPE_PARK)
            .await
            .unwrap();
        assert_eq!(parked.switch(PARK), Ok(Some(true)));
        assert_eq!(parked.get_state(), &PropertyState::Ok);
        // Two polls while busy, then the settle margin.
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert_eq!(session.log(), vec!["EQMod Mount.TELESCOPE_PARK PARK"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_park_alert() {
        let session = SimSession::new(SimOptions {
            park_alert: vec![String::from("EQMod Mount")],
            ..Default::default()
        });
        let result = park(&session, &Config::default(), "EQMod Mount", TELESCOPE_PARK).await;
        assert!(matches!(result, Err(FlatError::ParkFailed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_park_timeout() {
        let session = SimSession::new(SimOptions {
            park_stalls: true,
            ..Default::default()
        });
        let config = Config {
            park_timeout: 5.0,
            ..Default::default()
        };
        let result = park(&session, &config, "Gastro Flatcap", CAP_PARK).await;
        match result {
            Err(FlatError::ParkTimeout { device, timeout }) => {
                assert_eq!(device, "Gastro Flatcap");
                assert_eq!(timeout, Duration::from_secs(5));
            }
            r => panic!("Unexpected result: {:?}", r),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_light_refused_while_cap_open() {
        let session = SimSession::new(SimOptions::default());
        let result = light_on(&session, &Config::default()).await;
        assert!(matches!(result, Err(FlatError::LightFailed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_light_on_with_intensity() {
        let session = SimSession::new(SimOptions::default());
        let config = Config {
            light_intensity: Some(128.0),
            ..Default::default()
        };
        park(&session, &config, "Gastro Flatcap", CAP_PARK)
            .await
            .unwrap();
        light_on(&session, &config).await.unwrap();
        light_off(&session, "Gastro Flatcap");

        assert_eq!(
            session.log(),
            vec![
                "Gastro Flatcap.CAP_PARK PARK",
                "Gastro Flatcap.FLAT_LIGHT_INTENSITY FLAT_LIGHT_INTENSITY_VALUE=128",
                "Gastro Flatcap.FLAT_LIGHT_CONTROL FLAT_LIGHT_ON",
                "Gastro Flatcap.FLAT_LIGHT_CONTROL FLAT_LIGHT_OFF",
            ]
        );
        let light = session
            .parameter("Gastro Flatcap", FLAT_LIGHT_CONTROL)
            .await
            .unwrap();
        assert_eq!(light.switch(FLAT_LIGHT_OFF), Ok(Some(true)));
    }
}
