pub(crate) mod config;
pub(crate) mod effects;
pub(crate) mod error;
pub(crate) mod hub;
pub(crate) mod intervaltimer;
pub(crate) mod mqtt;
pub(crate) mod operation;
pub(crate) mod osc;
pub(crate) mod pixel;
pub(crate) mod registry;
pub(crate) mod renderer;
pub(crate) mod shutdown;
pub(crate) mod viewerserver;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Context;
use clap::Parser;

use crate::config::{Cli, Config};
use crate::hub::BroadcastHub;
use crate::mqtt::MqttClient;
use crate::osc::OscReceiver;
use crate::registry::ParameterRegistry;
use crate::renderer::Renderer;
use crate::shutdown::Shutdown;
use crate::viewerserver::ViewerServer;

/// Starts a named thread and adds it to `threads`. If the thread cannot be
/// created, everything already running is stopped and joined first.
fn spawn(
    threads: &mut Vec<JoinHandle<()>>,
    name: &str,
    shutdown: &Shutdown,
    f: impl FnOnce() + Send + 'static,
) -> anyhow::Result<()> {
    spawn_with(threads, thread::Builder::new().name(name.to_string()), shutdown, f)
        .with_context(|| format!("Failed to create thread {name}"))
}

fn spawn_with(
    threads: &mut Vec<JoinHandle<()>>,
    builder: thread::Builder,
    shutdown: &Shutdown,
    f: impl FnOnce() + Send + 'static,
) -> std::io::Result<()> {
    match builder.spawn(f) {
        Ok(handle) => {
            threads.push(handle);
            Ok(())
        }
        Err(err) => {
            shutdown.request();
            join_all(threads.drain(..));
            Err(err)
        }
    }
}

fn join_all(threads: impl IntoIterator<Item = JoinHandle<()>>) {
    for handle in threads {
        if let Err(err) = handle.join() {
            log::error!("Thread panicked: {err:?}");
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();
    let config = match args.config.as_deref() {
        Some(path) => Config::load(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?,
        None => Config::default(),
    }
    .apply_cli(&args);
    config.validate()?;

    let pipeline = Arc::new(effects::build_pipeline(&config.pipeline, config.fps)?);
    let registry = Arc::new(ParameterRegistry::new(&pipeline)?);
    let hub = Arc::new(BroadcastHub::new());

    let shutdown = Shutdown::new();
    shutdown
        .install_handler()
        .context("Cannot install signal handler")?;

    let viewer_server = ViewerServer::bind(config.viewer.listen, Arc::clone(&hub))
        .with_context(|| format!("Cannot listen for viewers on {}", config.viewer.listen))?;

    let mqtt_client = if config.mqtt.enabled {
        let client = MqttClient::new(
            &config.mqtt.broker,
            &config.mqtt.client_id,
            &config.mqtt.topic_prefix,
            Arc::clone(&registry),
        )
        .with_context(|| format!("Cannot set up MQTT with {}", config.mqtt.broker))?;
        Some(client)
    } else {
        log::info!("MQTT disabled");
        None
    };

    let osc_receiver = match config.osc.listen {
        Some(addr) => Some(
            OscReceiver::new(addr, Arc::clone(&registry))
                .with_context(|| format!("Cannot listen for OSC on {addr}"))?,
        ),
        None => None,
    };

    let mut threads = Vec::new();

    let stop = shutdown.clone();
    spawn(&mut threads, "Viewers", &shutdown, move || viewer_server.run(&stop))?;

    if let Some(mqtt_client) = mqtt_client {
        let stop = shutdown.clone();
        spawn(&mut threads, "MQTT", &shutdown, move || mqtt_client.run(&stop))?;
    }

    if let Some(osc_receiver) = osc_receiver {
        let stop = shutdown.clone();
        spawn(&mut threads, "OSC", &shutdown, move || osc_receiver.run(&stop))?;
    }

    let mut renderer = Renderer::new(config.pixel_count, pipeline, hub, config.fps);
    let stop = shutdown.clone();
    spawn(&mut threads, "Renderer", &shutdown, move || renderer.run(&stop))?;

    join_all(threads);

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn failed_spawn_stops_and_joins_running_threads() {
        let shutdown = Shutdown::new();
        let finished = Arc::new(AtomicBool::new(false));
        let mut threads = Vec::new();

        let stop = shutdown.clone();
        let done = Arc::clone(&finished);
        spawn(&mut threads, "Worker", &shutdown, move || {
            while !stop.is_requested() {
                thread::sleep(Duration::from_millis(5));
            }
            done.store(true, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(threads.len(), 1);

        // No system can map a stack this large.
        let builder = thread::Builder::new().stack_size(usize::MAX / 4);
        assert!(spawn_with(&mut threads, builder, &shutdown, || {}).is_err());

        assert!(shutdown.is_requested());
        assert!(threads.is_empty());
        assert!(finished.load(Ordering::SeqCst));
    }
}
