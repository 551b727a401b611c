// Copyright 2026 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

//! UPower client: the daemon's device list and per-device change streams.

use std::{fmt::Debug, hash::Hash, time::Duration};

use cosmic::{
    iced::{self, Subscription},
    iced_futures::stream,
};
use futures::{FutureExt, SinkExt, StreamExt, channel::mpsc::Sender};
use futures_util::stream::select_all;
use zbus::{
    Connection,
    proxy::CacheProperties,
    zvariant::{ObjectPath, OwnedObjectPath},
};

use crate::device::Device;

#[zbus::proxy(
    interface = "org.freedesktop.UPower",
    default_service = "org.freedesktop.UPower",
    default_path = "/org/freedesktop/UPower"
)]
trait UPower {
    fn enumerate_devices(&self) -> zbus::Result<Vec<OwnedObjectPath>>;

    #[zbus(signal)]
    fn device_added(&self, device: ObjectPath<'_>) -> zbus::Result<()>;

    #[zbus(signal)]
    fn device_removed(&self, device: ObjectPath<'_>) -> zbus::Result<()>;
}

#[zbus::proxy(
    interface = "org.freedesktop.UPower.Device",
    default_service = "org.freedesktop.UPower",
    assume_defaults = false
)]
trait UPowerDevice {
    #[zbus(property, name = "Type")]
    fn kind(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn model(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn update_time(&self) -> zbus::Result<u64>;

    #[zbus(property)]
    fn percentage(&self) -> zbus::Result<f64>;

    #[zbus(property)]
    fn is_present(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn state(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn warning_level(&self) -> zbus::Result<u32>;
}

async fn device_proxy<'a>(
    conn: &Connection,
    path: &'a str,
    cache: CacheProperties,
) -> zbus::Result<UPowerDeviceProxy<'a>> {
    UPowerDeviceProxy::builder(conn)
        .path(path)?
        .cache_properties(cache)
        .build()
        .await
}

/// Reads every property the applet uses. Properties the daemon refuses to
/// report fall back to their defaults.
async fn read_device(path: &str, proxy: &UPowerDeviceProxy<'_>) -> Device {
    Device {
        path: path.to_string(),
        model: proxy.model().await.ok(),
        kind: proxy.kind().await.map(Into::into).unwrap_or_default(),
        percentage: proxy.percentage().await.ok(),
        is_present: proxy.is_present().await.unwrap_or_default(),
        state: proxy.state().await.map(Into::into).unwrap_or_default(),
        warning_level: proxy
            .warning_level()
            .await
            .map(Into::into)
            .unwrap_or_default(),
    }
}

async fn enumerate(conn: &Connection, upower: &UPowerProxy<'_>) -> zbus::Result<Vec<Device>> {
    let paths = upower.enumerate_devices().await?;
    let mut devices = Vec::with_capacity(paths.len());
    for path in paths {
        match device_proxy(conn, path.as_str(), CacheProperties::No).await {
            Ok(proxy) => devices.push(read_device(path.as_str(), &proxy).await),
            Err(err) => tracing::warn!(?err, device = %path.as_str(), "skipping device"),
        }
    }
    Ok(devices)
}

#[derive(Debug, Clone)]
pub enum UpowerEvent {
    Connected(Connection),
    Devices(Vec<Device>),
    ServiceAvailable,
    ServiceLost,
    Error(String),
}

pub fn upower_subscription<I: 'static + Hash + Copy + Send + Sync + Debug>(
    id: I,
) -> iced::Subscription<UpowerEvent> {
    Subscription::run_with_id(
        id,
        stream::channel(50, move |mut output| async move {
            let mut state = State::Ready;

            loop {
                state = start_listening(state, &mut output).await;
            }
        }),
    )
}

pub enum State {
    Ready,
    Waiting(Connection),
    Finished,
}

async fn start_listening(
    state: State,
    output: &mut Sender<UpowerEvent>,
) -> State {
    match state {
        State::Ready => {
            let conn = match Connection::system().await {
                Ok(conn) => conn,
                Err(err) => {
                    _ = output
                        .send(UpowerEvent::Error(format!(
                            "failed to connect to the system bus: {err}"
                        )))
                        .await;
                    return State::Finished;
                }
            };
            _ = output.send(UpowerEvent::Connected(conn.clone())).await;
            State::Waiting(conn)
        }
        State::Waiting(conn) => {
            if let Err(err) = listen(&conn, output).await {
                _ = output
                    .send(UpowerEvent::Error(format!("UPower: {err}")))
                    .await;
            }
            State::Finished
        }
        State::Finished => iced::futures::future::pending().await,
    }
}

/// Sends the device list on start, after every batch of added/removed
/// signals and whenever the daemon comes back. Signals that pile up while a
/// list is being read are folded into one enumeration.
async fn listen(
    conn: &Connection,
    output: &mut Sender<UpowerEvent>,
) -> zbus::Result<()> {
    let upower = UPowerProxy::new(conn).await?;
    let mut added = upower.receive_device_added().await?;
    let mut removed = upower.receive_device_removed().await?;
    let mut owner = upower.inner().receive_owner_changed().await?;

    let mut enumerate_now = true;
    loop {
        if enumerate_now {
            match enumerate(conn, &upower).await {
                Ok(devices) => {
                    _ = output.send(UpowerEvent::Devices(devices)).await;
                }
                Err(err) => {
                    _ = output
                        .send(UpowerEvent::Error(format!("failed to list devices: {err}")))
                        .await;
                }
            }
        }

        // `Some(true)` when the daemon reappeared, `Some(false)` when it left
        let owner_change: Option<bool> = tokio::select! {
            signal = added.next() => {
                if signal.is_none() {
                    return Ok(());
                }
                None
            }
            signal = removed.next() => {
                if signal.is_none() {
                    return Ok(());
                }
                None
            }
            new_owner = owner.next() => match new_owner {
                Some(new_owner) => Some(new_owner.is_some()),
                None => return Ok(()),
            },
        };

        match owner_change {
            Some(false) => {
                tracing::warn!("UPower left the bus");
                _ = output.send(UpowerEvent::ServiceLost).await;
                enumerate_now = false;
                continue;
            }
            Some(true) => {
                tracing::info!("UPower is back");
                _ = output.send(UpowerEvent::ServiceAvailable).await;
            }
            None => {}
        }

        while let Some(Some(_)) = added.next().now_or_never() {}
        while let Some(Some(_)) = removed.next().now_or_never() {}
        enumerate_now = true;
    }
}

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Changed(Device),
    Error(String),
}

const WATCH_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Follows the properties of one device. Dropping the subscription ends it.
pub fn device_subscription(conn: Connection, path: String) -> iced::Subscription<DeviceEvent> {
    Subscription::run_with_id(
        path.clone(),
        stream::channel(10, move |output| async move {
            watch_with_retry(WATCH_RETRY_DELAY, output, |output| {
                watch_device(&conn, &path, output)
            })
            .await;

            iced::futures::future::pending().await
        }),
    )
}

/// Runs `watch` until it ends cleanly or the receiver is gone, reporting each
/// failure and waiting `delay` before the next attempt.
async fn watch_with_retry<W, F>(delay: Duration, mut output: Sender<DeviceEvent>, mut watch: W)
where
    W: FnMut(Sender<DeviceEvent>) -> F,
    F: Future<Output = zbus::Result<()>>,
{
    loop {
        let Err(err) = watch(output.clone()).await else {
            return;
        };
        tracing::warn!(?err, "watching device failed, retrying");
        if output
            .send(DeviceEvent::Error(err.to_string()))
            .await
            .is_err()
        {
            return;
        }
        tokio::time::sleep(delay).await;
    }
}

async fn watch_device(
    conn: &Connection,
    path: &str,
    mut output: Sender<DeviceEvent>,
) -> zbus::Result<()> {
    let proxy = device_proxy(conn, path, CacheProperties::Lazily).await?;

    let mut changes = select_all([
        proxy.receive_update_time_changed().await.map(|_| ()).boxed(),
        proxy.receive_percentage_changed().await.map(|_| ()).boxed(),
        proxy.receive_is_present_changed().await.map(|_| ()).boxed(),
        proxy.receive_state_changed().await.map(|_| ()).boxed(),
        proxy.receive_warning_level_changed().await.map(|_| ()).boxed(),
    ]);

    while changes.next().await.is_some() {
        // Several properties usually change together
        while let Some(Some(())) = changes.next().now_or_never() {}

        let device = read_device(path, &proxy).await;
        if output.send(DeviceEvent::Changed(device)).await.is_err() {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn failed_watch_is_retried_until_it_ends() {
        let (output, mut events) = futures::channel::mpsc::channel(10);
        let attempts = Cell::new(0);

        watch_with_retry(Duration::ZERO, output, |_| {
            attempts.set(attempts.get() + 1);
            let attempt = attempts.get();
            async move {
                if attempt < 3 {
                    Err(zbus::Error::Failure("no such device".into()))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(attempts.get(), 3);
        let mut errors = 0;
        while let Ok(Some(event)) = events.try_next() {
            assert!(matches!(event, DeviceEvent::Error(_)));
            errors += 1;
        }
        assert_eq!(errors, 2);
    }

    #[tokio::test]
    async fn retrying_stops_once_nobody_listens() {
        let (output, events) = futures::channel::mpsc::channel(10);
        drop(events);
        let attempts = Cell::new(0);

        watch_with_retry(Duration::ZERO, output, |_| {
            attempts.set(attempts.get() + 1);
            async { Err(zbus::Error::Failure("gone".into())) }
        })
        .await;

        assert_eq!(attempts.get(), 1);
    }
}
