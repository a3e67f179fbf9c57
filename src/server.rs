//! The connection loop.
//!
//! One `select!` drives the whole server: accept new sockets, feed
//! connection events through the dispatcher, tick the liveness timer,
//! and watch for shutdown signals. The loop owns the [`World`]; every
//! state mutation happens here, in event order.

use std::io;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use reef_proto::Message;

use crate::config::Config;
use crate::error::HandlerError;
use crate::handlers::{Context, Registry};
use crate::network::{spawn_connection, Event};
use crate::state::{PingProbe, Uid, World, SENDQ_LINES};

/// Liveness sweep cadence.
const TICK_PERIOD: Duration = Duration::from_secs(5);

pub struct Server {
    config: Config,
    listener: TcpListener,
}

impl Server {
    /// Bind the listening socket. Failure here maps to exit code 2.
    pub async fn bind(config: Config) -> io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
        Ok(Self { config, listener })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let mut world = World::new();
        let registry = Registry::new();
        let (events_tx, mut events_rx) = mpsc::channel::<Event>(1024);

        let mut tick = tokio::time::interval(TICK_PERIOD);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        info!(
            server = %self.config.server_name,
            port = self.config.port,
            "listening"
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        self.accept(&mut world, &events_tx, stream, addr.ip().to_string());
                    }
                    Err(err) => warn!(error = %err, "accept failed"),
                },
                Some(event) = events_rx.recv() => {
                    self.handle_event(&mut world, &registry, event);
                    sweep_doomed(&mut world);
                }
                _ = tick.tick() => {
                    self.sweep_liveness(&mut world);
                    sweep_doomed(&mut world);
                }
                _ = sigint.recv() => break,
                _ = sigterm.recv() => break,
            }
        }

        self.shutdown(world).await;
        Ok(())
    }

    fn accept(
        &self,
        world: &mut World,
        events_tx: &mpsc::Sender<Event>,
        stream: TcpStream,
        host: String,
    ) {
        let (out_tx, out_rx) = mpsc::channel(SENDQ_LINES);
        let uid = world.add_session(host.clone(), out_tx, self.config.password_required());
        info!(uid = %uid, addr = %host, "client connected");
        spawn_connection(uid, stream, events_tx.clone(), out_rx);
    }

    fn handle_event(&self, world: &mut World, registry: &Registry, event: Event) {
        match event {
            Event::Line { uid, message } => {
                let Some(user) = world.user_mut(uid) else {
                    return;
                };
                // Any complete line is proof of life.
                user.last_activity = Instant::now();
                user.probe = None;

                let mut ctx = Context {
                    world,
                    config: &self.config,
                    uid,
                };
                registry.dispatch(&mut ctx, &message);
            }
            Event::BadToken { uid, token } => {
                let Some(user) = world.user_mut(uid) else {
                    return;
                };
                user.last_activity = Instant::now();
                user.probe = None;
                let registered = user.is_registered();

                let mut ctx = Context {
                    world,
                    config: &self.config,
                    uid,
                };
                let err = if registered {
                    HandlerError::UnknownCommand(token)
                } else {
                    HandlerError::NotRegistered
                };
                ctx.fail(&err);
            }
            Event::Fault { uid, reason } => {
                world.doom(uid, reason);
            }
            Event::Closed { uid } => {
                if world.user(uid).is_some() {
                    info!(uid = %uid, "connection closed");
                    world.remove_user(uid, "Connection closed");
                }
            }
        }
    }

    /// Probe idle connections and reap the unresponsive.
    fn sweep_liveness(&self, world: &mut World) {
        let now = Instant::now();
        let mut timed_out = Vec::new();
        let mut to_probe = Vec::new();

        for uid in world.uids() {
            let Some(user) = world.user(uid) else {
                continue;
            };
            match &user.probe {
                Some(probe) if now >= probe.deadline => {
                    timed_out.push((uid, probe.cookie.clone()));
                }
                Some(_) => {}
                None if now.duration_since(user.last_activity) >= self.config.ping_interval => {
                    to_probe.push(uid);
                }
                None => {}
            }
        }

        for (uid, cookie) in timed_out {
            info!(uid = %uid, cookie = %cookie, "ping timeout");
            world.doom(uid, "Ping timeout");
        }
        for uid in to_probe {
            let cookie: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(8)
                .map(char::from)
                .collect();
            world.send(uid, Message::cmd("PING").trailing(&cookie));
            if let Some(user) = world.user_mut(uid) {
                user.probe = Some(PingProbe {
                    cookie,
                    deadline: now + self.config.ping_grace,
                });
            }
        }
    }

    /// Orderly shutdown: tell every client, then let the writers drain.
    async fn shutdown(&self, mut world: World) {
        info!(users = world.user_count(), "shutting down");
        let notice = Message::cmd("QUIT")
            .trailing("Server shutting down")
            .with_prefix(self.config.server_name.clone());
        for uid in world.uids() {
            world.send(uid, notice.clone());
        }
        // Dropping the world drops every send-q sender; writer tasks
        // flush what is queued and close their sockets.
        drop(world);
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Remove sessions marked for teardown. Broadcasting a QUIT can overflow
/// a peer's send-q and doom it in turn, so sweep to a fixed point.
fn sweep_doomed(world: &mut World) {
    loop {
        let doomed: Vec<(Uid, String)> = world.take_doomed();
        if doomed.is_empty() {
            return;
        }
        for (uid, reason) in doomed {
            info!(uid = %uid, reason = %reason, "tearing down session");
            world.remove_user(uid, &reason);
        }
    }
}
