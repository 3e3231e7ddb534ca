//! Remote networked speaker interface and the playback fallback chain.

use async_trait::async_trait;
use deck_proto::protocol::Favorite;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{PlayerError, PlayerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Playing,
    Paused,
    Stopped,
    Transitioning,
}

/// A speaker reachable on the network.  Every call is a network round trip
/// and may fail.
#[async_trait]
pub trait SpeakerDevice: Send + Sync {
    fn name(&self) -> String;
    async fn favorites(&self) -> anyhow::Result<Vec<Favorite>>;
    async fn clear_queue(&self) -> anyhow::Result<()>;
    async fn add_to_queue(&self, favorite: &Favorite) -> anyhow::Result<()>;
    async fn add_uri_to_queue(&self, uri: &str) -> anyhow::Result<()>;
    async fn play_from_queue(&self, index: usize) -> anyhow::Result<()>;
    async fn play_uri(&self, uri: &str) -> anyhow::Result<()>;
    async fn play(&self) -> anyhow::Result<()>;
    async fn pause(&self) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
    async fn next(&self) -> anyhow::Result<()>;
    async fn previous(&self) -> anyhow::Result<()>;
    /// Percent, 0..=100.
    async fn set_volume(&self, volume: u8) -> anyhow::Result<()>;
    async fn transport_state(&self) -> anyhow::Result<TransportState>;
}

#[async_trait]
pub trait SpeakerDiscovery: Send + Sync {
    async fn discover(&self) -> anyhow::Result<Vec<Arc<dyn SpeakerDevice>>>;
}

/// Discovery over a fixed device list.  Empty by default, which is what the
/// daemon runs with when no network speaker backend is built in.
#[derive(Default, Clone)]
pub struct StaticDiscovery {
    devices: Vec<Arc<dyn SpeakerDevice>>,
}

impl StaticDiscovery {
    pub fn new(devices: Vec<Arc<dyn SpeakerDevice>>) -> Self {
        Self { devices }
    }
}

#[async_trait]
impl SpeakerDiscovery for StaticDiscovery {
    async fn discover(&self) -> anyhow::Result<Vec<Arc<dyn SpeakerDevice>>> {
        Ok(self.devices.clone())
    }
}

/// Pick the speaker named `preferred`, or the first one found.
pub async fn connect(
    discovery: &dyn SpeakerDiscovery,
    preferred: Option<&str>,
) -> PlayerResult<Arc<dyn SpeakerDevice>> {
    let devices = discovery
        .discover()
        .await
        .map_err(|e| PlayerError::DeviceUnavailable(format!("speaker discovery failed: {}", e)))?;

    let chosen = match preferred {
        Some(name) => devices.into_iter().find(|d| d.name() == name),
        None => devices.into_iter().next(),
    };
    match chosen {
        Some(device) => {
            info!("speaker: using {}", device.name());
            Ok(device)
        }
        None => Err(PlayerError::DeviceUnavailable(match preferred {
            Some(name) => format!("speaker {} not found", name),
            None => "no speakers discovered".to_string(),
        })),
    }
}

type AttemptFn = Box<
    dyn for<'a> Fn(&'a dyn SpeakerDevice, &'a Favorite) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync,
>;

/// One way of starting a favorite on a device.
pub struct Attempt {
    pub name: &'static str,
    run: AttemptFn,
}

impl Attempt {
    pub fn new<F>(name: &'static str, run: F) -> Self
    where
        F: for<'a> Fn(&'a dyn SpeakerDevice, &'a Favorite) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name,
            run: Box::new(run),
        }
    }

    pub fn run<'a>(
        &self,
        device: &'a dyn SpeakerDevice,
        favorite: &'a Favorite,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        (self.run)(device, favorite)
    }
}

fn queue_favorite<'a>(
    device: &'a dyn SpeakerDevice,
    favorite: &'a Favorite,
) -> BoxFuture<'a, anyhow::Result<()>> {
    Box::pin(async move {
        device.add_to_queue(favorite).await?;
        device.play_from_queue(0).await
    })
}

fn queue_uri<'a>(
    device: &'a dyn SpeakerDevice,
    favorite: &'a Favorite,
) -> BoxFuture<'a, anyhow::Result<()>> {
    Box::pin(async move {
        device.add_uri_to_queue(&favorite.uri).await?;
        device.play_from_queue(0).await
    })
}

fn direct_uri<'a>(
    device: &'a dyn SpeakerDevice,
    favorite: &'a Favorite,
) -> BoxFuture<'a, anyhow::Result<()>> {
    Box::pin(async move { device.play_uri(&favorite.uri).await })
}

/// Queue the favorite, then queue its URI, then play the URI directly.
/// Devices differ in which of these they support.
pub fn default_attempts() -> Vec<Attempt> {
    vec![
        Attempt::new("queue favorite", queue_favorite),
        Attempt::new("queue uri", queue_uri),
        Attempt::new("direct uri", direct_uri),
    ]
}

#[derive(Debug, Error)]
#[error("all {} playback methods failed", failures.len())]
pub struct FallbackExhausted {
    pub failures: Vec<(&'static str, String)>,
}

/// Try `attempts` in order; the first that succeeds wins.
pub async fn run_fallback_chain(
    attempts: &[Attempt],
    device: &dyn SpeakerDevice,
    favorite: &Favorite,
) -> Result<&'static str, FallbackExhausted> {
    let mut failures = Vec::new();
    for attempt in attempts {
        match attempt.run(device, favorite).await {
            Ok(()) => {
                debug!("speaker: {} started via {}", favorite.title, attempt.name);
                return Ok(attempt.name);
            }
            Err(e) => {
                debug!("speaker: {} failed: {}", attempt.name, e);
                failures.push((attempt.name, e.to_string()));
            }
        }
    }
    warn!("speaker: could not start {}", favorite.title);
    Err(FallbackExhausted { failures })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedDevice {
        broken: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedDevice {
        fn call(&self, name: &'static str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(name.to_string());
            if self.broken.contains(&name) {
                anyhow::bail!("{} not supported", name);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SpeakerDevice for ScriptedDevice {
        fn name(&self) -> String {
            "Kitchen".into()
        }
        async fn favorites(&self) -> anyhow::Result<Vec<Favorite>> {
            Ok(Vec::new())
        }
        async fn clear_queue(&self) -> anyhow::Result<()> {
            self.call("clear_queue")
        }
        async fn add_to_queue(&self, _favorite: &Favorite) -> anyhow::Result<()> {
            self.call("add_to_queue")
        }
        async fn add_uri_to_queue(&self, _uri: &str) -> anyhow::Result<()> {
            self.call("add_uri_to_queue")
        }
        async fn play_from_queue(&self, _index: usize) -> anyhow::Result<()> {
            self.call("play_from_queue")
        }
        async fn play_uri(&self, _uri: &str) -> anyhow::Result<()> {
            self.call("play_uri")
        }
        async fn play(&self) -> anyhow::Result<()> {
            self.call("play")
        }
        async fn pause(&self) -> anyhow::Result<()> {
            self.call("pause")
        }
        async fn stop(&self) -> anyhow::Result<()> {
            self.call("stop")
        }
        async fn next(&self) -> anyhow::Result<()> {
            self.call("next")
        }
        async fn previous(&self) -> anyhow::Result<()> {
            self.call("previous")
        }
        async fn set_volume(&self, _volume: u8) -> anyhow::Result<()> {
            self.call("set_volume")
        }
        async fn transport_state(&self) -> anyhow::Result<TransportState> {
            Ok(TransportState::Playing)
        }
    }

    fn favorite() -> Favorite {
        Favorite {
            title: "Jazz".into(),
            uri: "x-rincon:jazz".into(),
        }
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let device = ScriptedDevice::default();
        let used = run_fallback_chain(&default_attempts(), &device, &favorite())
            .await
            .unwrap();
        assert_eq!(used, "queue favorite");
        assert_eq!(*device.calls.lock().unwrap(), vec!["add_to_queue", "play_from_queue"]);
    }

    #[tokio::test]
    async fn test_falls_through_to_direct_uri() {
        let device = ScriptedDevice {
            broken: vec!["add_to_queue", "add_uri_to_queue"],
            ..Default::default()
        };
        let used = run_fallback_chain(&default_attempts(), &device, &favorite())
            .await
            .unwrap();
        assert_eq!(used, "direct uri");
    }

    #[tokio::test]
    async fn test_exhausted_reports_every_failure() {
        let device = ScriptedDevice {
            broken: vec!["add_to_queue", "add_uri_to_queue", "play_uri"],
            ..Default::default()
        };
        let err = run_fallback_chain(&default_attempts(), &device, &favorite())
            .await
            .unwrap_err();
        let names: Vec<_> = err.failures.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["queue favorite", "queue uri", "direct uri"]);
    }

    #[tokio::test]
    async fn test_connect_without_devices_is_unavailable() {
        let result = connect(&StaticDiscovery::default(), None).await;
        assert!(matches!(result, Err(PlayerError::DeviceUnavailable(_))));
    }
}
