//! WebSocket transport and the single-threaded dispatch loop.
//!
//! Every connection gets a reader task (decoding frames into [`ServerEvent`]s)
//! and a writer task (draining a per-session outbound queue). All state
//! mutation happens on one `tokio::select!` loop that consumes events and
//! timer ticks strictly one at a time, so the world store never sees
//! interleaved handlers and needs no locks.

use crate::combat;
use crate::registry::SessionRegistry;
use crate::world::WorldState;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{ClientMessage, ObjectId, ServerMessage, SessionId, TankType};
use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Runtime configuration. The defaults are the production arena rules; tests
/// slow the spawn timers down to keep resource traffic out of the way.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub host: String,
    /// Port to listen on; 0 picks an ephemeral port.
    pub port: u16,
    pub power_up_interval: Duration,
    pub health_box_interval: Duration,
    pub health_box_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            power_up_interval: Duration::from_secs(10),
            health_box_interval: Duration::from_secs(2),
            health_box_ttl: Duration::from_secs(15),
        }
    }
}

/// Events flowing from connection tasks and deferred timers into the
/// dispatch loop.
#[derive(Debug)]
pub enum ServerEvent {
    SessionOpened {
        id: SessionId,
        sender: mpsc::UnboundedSender<Message>,
    },
    MessageReceived {
        id: SessionId,
        message: ClientMessage,
    },
    SessionClosed {
        id: SessionId,
    },
    /// A health box's deferred expiry timer fired. The box may already be
    /// gone; the handler re-checks before emitting anything.
    HealthBoxExpired {
        box_id: ObjectId,
    },
}

/// The authoritative arena server.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    registry: SessionRegistry,
    world: WorldState,
    rng: StdRng,
    next_session_id: SessionId,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    /// Binds the listening socket. This is the only failure that is fatal to
    /// the process.
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let address = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&address).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            config,
            registry: SessionRegistry::new(),
            world: WorldState::new(),
            rng: StdRng::from_entropy(),
            next_session_id: 0,
            event_tx,
            event_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Main loop: accepts connections, dispatches session events, and runs
    /// the resource spawn timers. One arm completes fully before the next
    /// event is taken.
    pub async fn run(mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut power_interval = interval(self.config.power_up_interval);
        let mut health_interval = interval(self.config.health_box_interval);
        power_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        health_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Consume the immediate first tick of each interval.
        power_interval.tick().await;
        health_interval.tick().await;

        info!("arena server started");

        loop {
            tokio::select! {
                result = self.listener.accept() => match result {
                    Ok((stream, addr)) => self.handle_new_connection(stream, addr),
                    Err(e) => error!("failed to accept connection: {}", e),
                },

                event = self.event_rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },

                _ = power_interval.tick() => self.power_up_tick(),

                _ = health_interval.tick() => self.health_box_tick(),
            }
        }

        Ok(())
    }

    fn handle_new_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        self.next_session_id += 1;
        let id = self.next_session_id;
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            if let Err(e) = drive_connection(stream, addr, id, event_tx).await {
                debug!("session {} ({}) ended: {}", id, addr, e);
            }
        });
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::SessionOpened { id, sender } => self.handle_session_opened(id, sender),
            ServerEvent::MessageReceived { id, message } => self.handle_message(id, message),
            ServerEvent::SessionClosed { id } => self.handle_session_closed(id),
            ServerEvent::HealthBoxExpired { box_id } => self.handle_health_box_expired(box_id),
        }
    }

    /// Routes one decoded client message to the owning component.
    fn handle_message(&mut self, id: SessionId, message: ClientMessage) {
        match message {
            ClientMessage::SetName { name, tank_type } => {
                self.handle_set_name(id, name, tank_type.unwrap_or_default())
            }
            ClientMessage::Move { x, y, z, rot_y } => self.handle_move(id, x, y, z, rot_y),
            ClientMessage::Shoot {
                x,
                y,
                z,
                dir_x,
                dir_z,
            } => self.handle_shoot(id, x, y, z, dir_x, dir_z),
            ClientMessage::Hit {
                target_id,
                shooter_id,
            } => self.handle_hit(shooter_id, target_id),
            ClientMessage::Respawn { tank_type } => {
                self.handle_respawn(id, tank_type.unwrap_or_default())
            }
        }
    }

    fn handle_session_opened(&mut self, id: SessionId, sender: mpsc::UnboundedSender<Message>) {
        let (x, z) = self.world.add_player(id, &mut self.rng);
        self.registry.insert(id, sender);
        info!(
            "player {} connected at ({:.1}, {:.1}), total players: {}",
            id,
            x,
            z,
            self.world.player_count()
        );
    }

    fn handle_session_closed(&mut self, id: SessionId) {
        // Double-close is a no-op; only the first removal broadcasts.
        if self.registry.remove(id) {
            self.world.remove_player(id);
            info!(
                "player {} disconnected, total players: {}",
                id,
                self.world.player_count()
            );
            self.broadcast(&ServerMessage::RemovePlayer { id }, Some(id));
        }
    }

    fn handle_set_name(&mut self, id: SessionId, name: String, tank_type: TankType) {
        let player = match self.world.apply_handshake(id, name, tank_type) {
            Some(player) => player,
            None => return,
        };

        let init = ServerMessage::Init {
            id,
            players: self.world.player_snapshots(),
            power_ups: self.world.power_up_snapshots(),
            health_boxes: self.world.health_box_snapshots(),
        };
        self.send_to(id, &init);

        self.broadcast(
            &ServerMessage::NewPlayer {
                id,
                x: player.x,
                y: player.y,
                z: player.z,
                rot_y: player.rot_y,
                hp: player.hp,
                name: player.name.clone(),
                tank_type,
                max_hp: player.max_hp,
                damage: player.damage,
            },
            Some(id),
        );
        self.broadcast(
            &ServerMessage::PlayerUpdate {
                id,
                name: player.name,
                tank_type,
                max_hp: player.max_hp,
                damage: player.damage,
                x: player.x,
                y: player.y,
                z: player.z,
                rot_y: player.rot_y,
                hp: player.hp,
            },
            Some(id),
        );
    }

    fn handle_move(&mut self, id: SessionId, x: f32, y: f32, z: f32, rot_y: f32) {
        let outcome = match self.world.apply_move(id, x, y, z, rot_y) {
            Some(outcome) => outcome,
            None => return,
        };

        for pickup in &outcome.pickups {
            info!(
                "player {} collected health box {}, hp now {}",
                id, pickup.box_id, pickup.hp
            );
            self.broadcast(
                &ServerMessage::HealthBoxCollected {
                    box_id: pickup.box_id,
                    player_id: id,
                    hp: pickup.hp,
                },
                None,
            );
        }

        self.broadcast(
            &ServerMessage::Move {
                id,
                x,
                y,
                z,
                rot_y,
                hp: outcome.hp,
            },
            Some(id),
        );
    }

    fn handle_shoot(&mut self, id: SessionId, x: f32, y: f32, z: f32, dir_x: f32, dir_z: f32) {
        // Projectile spawn announcement only; there are no server-side
        // ballistics. Pre-handshake sessions are ignored.
        if let Some(tank_type) = self.world.tank_type(id) {
            self.broadcast(
                &ServerMessage::Shoot {
                    id,
                    x,
                    y,
                    z,
                    dir_x,
                    dir_z,
                    tank_type,
                },
                Some(id),
            );
        }
    }

    fn handle_hit(&mut self, shooter_id: SessionId, target_id: SessionId) {
        let applied = match combat::apply_hit(&mut self.world, shooter_id, target_id) {
            Some(applied) => applied,
            None => return,
        };

        self.broadcast(
            &ServerMessage::UpdateHp {
                id: target_id,
                hp: applied.hp,
            },
            None,
        );

        if let Some(kill) = applied.kill {
            self.broadcast(
                &ServerMessage::Kill {
                    killer_id: kill.killer_id,
                    victim_id: kill.victim_id,
                    killer_name: kill.killer_name,
                    killer_kills: kill.killer_kills,
                    victim_kills: kill.victim_kills,
                },
                None,
            );
        }
    }

    fn handle_respawn(&mut self, id: SessionId, tank_type: TankType) {
        let player = match self.world.apply_respawn(id, tank_type, &mut self.rng) {
            Some(player) => player,
            None => return,
        };
        info!("player {} respawned as {:?}", id, tank_type);

        let message = ServerMessage::Respawn {
            id,
            x: player.x,
            y: player.y,
            z: player.z,
            rot_y: player.rot_y,
            hp: player.hp,
            kills: player.kills,
            name: player.name,
            tank_type,
            max_hp: player.max_hp,
            damage: player.damage,
        };
        self.send_to(id, &message);
        self.broadcast(&message, Some(id));
    }

    fn handle_health_box_expired(&mut self, box_id: ObjectId) {
        if self.world.expire_health_box(box_id) {
            self.broadcast(&ServerMessage::HealthBoxDespawn { id: box_id }, None);
        }
    }

    fn health_box_tick(&mut self) {
        let spawned = match self.world.spawn_health_box(&mut self.rng) {
            Some(spawned) => spawned,
            None => return,
        };
        debug!(
            "spawned health box {} at ({:.1}, {:.1}), total: {}",
            spawned.id,
            spawned.x,
            spawned.z,
            self.world.health_box_count()
        );
        self.broadcast(
            &ServerMessage::HealthBoxSpawn {
                id: spawned.id,
                x: spawned.x,
                z: spawned.z,
            },
            None,
        );

        // Deferred expiry with no cancellation handle: the event re-enters
        // the dispatch queue and the handler checks whether a pickup won.
        let event_tx = self.event_tx.clone();
        let ttl = self.config.health_box_ttl;
        let box_id = spawned.id;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let _ = event_tx.send(ServerEvent::HealthBoxExpired { box_id });
        });
    }

    fn power_up_tick(&mut self) {
        if let Some(spawned) = self.world.spawn_power_up(&mut self.rng) {
            debug!(
                "spawned {:?} power-up {} at ({:.1}, {:.1}), total: {}",
                spawned.kind,
                spawned.id,
                spawned.x,
                spawned.z,
                self.world.power_up_count()
            );
            self.broadcast(
                &ServerMessage::PowerUpSpawn {
                    id: spawned.id,
                    x: spawned.x,
                    z: spawned.z,
                    kind: spawned.kind,
                },
                None,
            );
        }
    }

    /// Delivers one message to a single session. Failures are logged and
    /// swallowed.
    fn send_to(&self, id: SessionId, message: &ServerMessage) {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                error!("failed to serialize outbound message: {}", e);
                return;
            }
        };
        if let Some(session) = self.registry.get(id) {
            if !session.send(Message::Text(text.into())) {
                debug!("dropping message for closed session {}", id);
            }
        }
    }

    /// Serializes once and fans out to every registered session except the
    /// excluded one. Dead sessions are skipped, never retried, and never
    /// block delivery to the rest.
    fn broadcast(&self, message: &ServerMessage, exclude: Option<SessionId>) {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                error!("failed to serialize broadcast: {}", e);
                return;
            }
        };
        for (session_id, session) in self.registry.iter() {
            if Some(*session_id) == exclude {
                continue;
            }
            if !session.send(Message::Text(text.clone().into())) {
                debug!("skipping closed session {} during broadcast", session_id);
            }
        }
    }
}

/// Per-connection task: performs the websocket handshake, spawns the writer
/// half, and decodes inbound frames into dispatch events. Malformed payloads
/// are dropped without closing the connection.
async fn drive_connection(
    stream: TcpStream,
    addr: SocketAddr,
    id: SessionId,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let ws = accept_async(stream).await?;
    debug!("session {} websocket established from {}", id, addr);

    let (mut ws_sink, mut ws_stream) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    // Writer half: drains the outbound queue until the registry drops its
    // sender, then lets the socket close.
    tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if ws_sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    event_tx.send(ServerEvent::SessionOpened { id, sender: out_tx })?;

    let mut malformed = 0u32;
    while let Some(frame) = ws_stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!("session {} read error: {}", id, e);
                break;
            }
        };
        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    if event_tx
                        .send(ServerEvent::MessageReceived { id, message })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    malformed += 1;
                    warn!(
                        "session {} sent malformed message ({} so far): {}",
                        id, malformed, e
                    );
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    let _ = event_tx.send(ServerEvent::SessionClosed { id });
    Ok(())
}
