//! Per-window event loop.
//!
//! One tokio task owns everything a window holds: the engine with its
//! canonical state, the state store, the sync channel, connectivity,
//! and the cue engine. Hosts talk to it through a [`TimerHandle`]:
//! commands in over an mpsc channel, snapshots out over a watch
//! channel, events out over a broadcast channel. All timing lives
//! here -- the 1 s tick, the 2 s heartbeat, the lease watchdog, the
//! connectivity probe cadence, and the hourly sweep -- never inside
//! the state machines.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::audio::{Cue, CueEngine};
use crate::connectivity::{ConnectivityChange, ConnectivityMonitor, HttpProbe};
use crate::events::Event;
use crate::schedule::{BlindLevel, BlindSchedule, GameId};
use crate::storage::{Config, StateStore};
use crate::sync::{
    self, SyncBus, SyncChannel, SyncMessage, SyncUpdate, WindowId, HEARTBEAT_INTERVAL_MS,
};
use crate::timer::{self, AlertEvaluator, Tick, TimerEngine, TimerPhase};

/// Steady-state broadcasts go out every Nth tick; control actions and
/// level transitions broadcast immediately.
const BROADCAST_EVERY_TICKS: u32 = 10;
/// Lease watchdog wake-up cadence.
const LEASE_WATCH_MS: u64 = 500;
/// Idle persisted entries are swept this often.
const SWEEP_INTERVAL_SECS: u64 = 3_600;
/// Event fanout capacity per window.
const EVENT_CAPACITY: usize = 256;

/// Everything a host supplies to mount one window.
pub struct WindowOptions {
    pub game_id: GameId,
    pub schedule: BlindSchedule,
    /// `None` degrades to single-window always-leader mode.
    pub bus: Option<SyncBus>,
    pub config: Config,
}

/// Control surface, cheap to clone.
#[derive(Debug, Clone)]
pub enum Command {
    Start,
    Pause,
    Reset,
    NextLevel,
    PreviousLevel,
    Seek(f64),
    ToggleSound,
    OpenInNewWindow,
    ToggleFullScreen,
    /// Window focus: re-claim leadership.
    Focus,
    ClearEmergency,
    TestAudio,
    /// Host-observed connectivity transition (native online/offline
    /// events); complements the periodic probe.
    Connectivity(bool),
    Shutdown,
}

/// Full read model, published after every applied mutation.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub game_id: GameId,
    pub window_id: WindowId,
    pub phase: TimerPhase,
    pub is_running: bool,
    pub current_level_index: usize,
    pub level_count: usize,
    pub elapsed_in_level: u64,
    pub total_elapsed: u64,
    pub current_level: BlindLevel,
    pub next_level: Option<BlindLevel>,
    pub time_remaining_in_level: u64,
    pub progress_percentage: f64,
    pub show_alert: bool,
    pub is_alert_time: bool,
    pub is_final_countdown: bool,
    pub is_new_blind_alert: bool,
    pub is_master_window: bool,
    pub is_emergency_mode: bool,
    pub is_online: bool,
    pub sound_enabled: bool,
    pub full_screen: bool,
}

/// Host-side handle to a spawned window.
#[derive(Clone)]
pub struct TimerHandle {
    cmds: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Snapshot>,
    events: broadcast::Sender<Event>,
}

impl TimerHandle {
    pub fn start(&self) {
        self.send(Command::Start);
    }

    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    pub fn reset(&self) {
        self.send(Command::Reset);
    }

    pub fn next_level(&self) {
        self.send(Command::NextLevel);
    }

    pub fn previous_level(&self) {
        self.send(Command::PreviousLevel);
    }

    pub fn seek(&self, percentage: f64) {
        self.send(Command::Seek(percentage));
    }

    pub fn toggle_sound(&self) {
        self.send(Command::ToggleSound);
    }

    pub fn open_in_new_window(&self) {
        self.send(Command::OpenInNewWindow);
    }

    pub fn toggle_full_screen(&self) {
        self.send(Command::ToggleFullScreen);
    }

    pub fn focus(&self) {
        self.send(Command::Focus);
    }

    pub fn clear_emergency(&self) {
        self.send(Command::ClearEmergency);
    }

    pub fn test_audio(&self) {
        self.send(Command::TestAudio);
    }

    pub fn observe_connectivity(&self, online: bool) {
        self.send(Command::Connectivity(online));
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    /// Latest published read model.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch stream of read models.
    pub fn snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    fn send(&self, cmd: Command) {
        if self.cmds.send(cmd).is_err() {
            tracing::warn!("timer window task is gone; command dropped");
        }
    }
}

/// Monotonic protocol clock: wall epoch at spawn plus tokio time since,
/// so the sync protocol stays deterministic under paused-time tests.
struct WindowClock {
    wall_epoch_ms: u64,
    started: Instant,
}

impl WindowClock {
    fn new() -> Self {
        Self {
            wall_epoch_ms: sync::now_ms(),
            started: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.wall_epoch_ms + self.started.elapsed().as_millis() as u64
    }
}

/// One window instance of the timer.
pub struct TimerWindow;

impl TimerWindow {
    /// Mount a window: load persisted state, attach to the bus, and
    /// spawn the event-loop task.
    pub fn spawn(opts: WindowOptions, store: StateStore) -> TimerHandle {
        let clock = WindowClock::new();
        let window_id = WindowId::new();
        let state = store.load(&opts.game_id, &opts.schedule);
        let engine = TimerEngine::with_state(opts.schedule, state);
        let (channel, bus_rx) = SyncChannel::connect(
            opts.bus.as_ref(),
            opts.game_id.clone(),
            window_id,
            clock.now_ms(),
        );

        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        // The probe runs in its own task so a slow HEAD request can
        // never stall the tick loop.
        if opts.config.connectivity.probe_interval_secs > 0 {
            match HttpProbe::new(
                &opts.config.connectivity.probe_url,
                Duration::from_secs(opts.config.connectivity.probe_timeout_secs),
            ) {
                Ok(probe) => {
                    let interval = Duration::from_secs(opts.config.connectivity.probe_interval_secs);
                    tokio::spawn(probe_loop(probe, interval, cmd_tx.clone()));
                }
                Err(e) => tracing::warn!(error = %e, "connectivity probe disabled"),
            }
        }

        let mut task = WindowTask {
            game_id: opts.game_id,
            engine,
            store,
            channel,
            monitor: ConnectivityMonitor::new(),
            cues: CueEngine::new(opts.config.audio.volume),
            evaluator: AlertEvaluator::new(),
            companion_base: opts.config.companion.base_url.clone(),
            events: events_tx.clone(),
            snapshots: None,
            clock,
            full_screen: false,
            ticks_since_broadcast: 0,
        };

        let (snap_tx, snap_rx) = watch::channel(task.build_snapshot());
        task.snapshots = Some(snap_tx);

        tokio::spawn(task.run(cmd_rx, bus_rx));

        TimerHandle {
            cmds: cmd_tx,
            snapshots: snap_rx,
            events: events_tx,
        }
    }
}

struct WindowTask {
    game_id: GameId,
    engine: TimerEngine,
    store: StateStore,
    channel: SyncChannel,
    monitor: ConnectivityMonitor,
    cues: CueEngine,
    evaluator: AlertEvaluator,
    companion_base: String,
    events: broadcast::Sender<Event>,
    snapshots: Option<watch::Sender<Snapshot>>,
    clock: WindowClock,
    full_screen: bool,
    ticks_since_broadcast: u32,
}

impl WindowTask {
    async fn run(
        mut self,
        mut cmds: mpsc::UnboundedReceiver<Command>,
        mut bus_rx: Option<broadcast::Receiver<SyncMessage>>,
    ) {
        let second = Duration::from_secs(1);
        let mut tick = interval_at(Instant::now() + second, second);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let hb_period = Duration::from_millis(HEARTBEAT_INTERVAL_MS);
        let mut heartbeat = interval_at(Instant::now() + hb_period, hb_period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let watch_period = Duration::from_millis(LEASE_WATCH_MS);
        let mut lease_watch = interval_at(Instant::now() + watch_period, watch_period);
        lease_watch.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let sweep_period = Duration::from_secs(SWEEP_INTERVAL_SECS);
        let mut sweep_timer = interval_at(Instant::now() + sweep_period, sweep_period);
        sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Polled unconditionally so no backlog builds up while
                // idle; eligibility is checked per tick.
                _ = tick.tick() => {
                    if self.engine.is_running() && self.channel.is_leader() {
                        self.on_tick();
                    }
                }
                _ = heartbeat.tick(), if self.channel.is_leader() => {
                    self.channel.heartbeat(self.clock.now_ms());
                }
                _ = lease_watch.tick(), if !self.channel.is_leader() => {
                    if let Some(SyncUpdate::BecameLeader) =
                        self.channel.check_expiry(self.clock.now_ms())
                    {
                        self.emit(Event::LeadershipAcquired {
                            window_id: self.channel.window_id(),
                            at: Utc::now(),
                        });
                    }
                }
                _ = sweep_timer.tick() => {
                    self.store.sweep();
                }
                msg = recv_bus(&mut bus_rx) => {
                    if let Some(msg) = msg {
                        self.on_bus_message(&msg);
                    }
                }
                cmd = cmds.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.on_command(cmd) {
                                break;
                            }
                        }
                        // All handles dropped: detach like a closed window,
                        // no handoff; followers heal via lease timeout.
                        None => break,
                    }
                }
            }
        }

        if self.channel.is_leader() {
            self.persist_and_broadcast();
        }
    }

    // ── Tick path ────────────────────────────────────────────────────

    fn on_tick(&mut self) {
        match self.engine.tick() {
            Some(Tick::Progress) => {
                self.play_due_cues();
                self.ticks_since_broadcast += 1;
                if self.ticks_since_broadcast >= BROADCAST_EVERY_TICKS {
                    self.persist_and_broadcast();
                } else {
                    self.publish_snapshot();
                }
            }
            Some(Tick::Advanced(event)) => {
                self.play_cue(Cue::LevelComplete);
                self.play_due_cues();
                self.emit(event);
                self.persist_and_broadcast();
            }
            Some(Tick::Finished(event)) => {
                self.emit(event);
                self.persist_and_broadcast();
            }
            None => {}
        }
    }

    // ── Command path ─────────────────────────────────────────────────

    /// Returns `true` on shutdown.
    fn on_command(&mut self, cmd: Command) -> bool {
        if Self::is_leader_gated(&cmd) && !self.channel.is_leader() {
            tracing::warn!(
                game_id = %self.game_id,
                window_id = %self.channel.window_id(),
                ?cmd,
                "control action ignored: this window is not the leader"
            );
            return false;
        }

        match cmd {
            Command::Start => {
                // First gesture: acquire the audio device.
                self.cues.unlock();
                if let Some(event) = self.engine.start() {
                    self.emit(event);
                    self.persist_and_broadcast();
                }
            }
            Command::Pause => {
                if let Some(event) = self.engine.pause() {
                    self.emit(event);
                    self.persist_and_broadcast();
                }
            }
            Command::Reset => {
                if let Some(event) = self.engine.reset() {
                    self.emit(event);
                    // Reset clears the persisted copy instead of saving
                    // zeroes; mirrors still get the zeroed broadcast.
                    self.store.clear(&self.game_id);
                    self.channel
                        .broadcast_state(self.engine.state(), self.clock.now_ms());
                    self.ticks_since_broadcast = 0;
                    self.publish_snapshot();
                }
            }
            Command::NextLevel => {
                if let Some(event) = self.engine.next_level_jump() {
                    self.play_cue(Cue::LevelComplete);
                    self.emit(event);
                    self.persist_and_broadcast();
                }
            }
            Command::PreviousLevel => {
                if let Some(event) = self.engine.previous_level_jump() {
                    self.emit(event);
                    self.persist_and_broadcast();
                }
            }
            Command::Seek(percentage) => {
                if let Some(event) = self.engine.seek(percentage) {
                    self.emit(event);
                    self.persist_and_broadcast();
                }
            }
            Command::ToggleSound => {
                if let Some(event) = self.engine.toggle_sound() {
                    self.emit(event);
                    self.persist_and_broadcast();
                }
            }
            Command::OpenInNewWindow => self.open_companion_window(),
            Command::ToggleFullScreen => {
                self.full_screen = !self.full_screen;
                self.emit(Event::FullScreenToggled {
                    full_screen: self.full_screen,
                    at: Utc::now(),
                });
            }
            Command::Focus => {
                let was_leader = self.channel.is_leader();
                self.channel.announce_claim(self.clock.now_ms());
                if !was_leader {
                    self.emit(Event::LeadershipAcquired {
                        window_id: self.channel.window_id(),
                        at: Utc::now(),
                    });
                }
            }
            Command::ClearEmergency => {
                self.monitor.clear_emergency();
                self.publish_snapshot();
            }
            Command::TestAudio => {
                self.cues.unlock();
                if self.engine.state().sound_enabled {
                    self.cues.test_audio();
                }
            }
            Command::Connectivity(online) => self.on_connectivity(online),
            Command::Shutdown => return true,
        }
        false
    }

    fn is_leader_gated(cmd: &Command) -> bool {
        matches!(
            cmd,
            Command::Start
                | Command::Pause
                | Command::Reset
                | Command::NextLevel
                | Command::PreviousLevel
                | Command::Seek(_)
                | Command::ToggleSound
        )
    }

    // ── Sync path ────────────────────────────────────────────────────

    fn on_bus_message(&mut self, msg: &SyncMessage) {
        let now = self.clock.now_ms();
        match self.channel.handle(msg, now) {
            Some(SyncUpdate::StateReceived(state)) => {
                let event = self.engine.apply_external_update(state);
                self.emit(event);
                // Followers voice the same cues the leader does.
                self.play_due_cues();
            }
            Some(SyncUpdate::LeadershipYielded) => {
                self.ticks_since_broadcast = 0;
                self.emit(Event::LeadershipYielded {
                    window_id: self.channel.window_id(),
                    at: Utc::now(),
                });
            }
            Some(SyncUpdate::SnapshotRequested) => {
                self.channel.broadcast_state(self.engine.state(), now);
            }
            Some(SyncUpdate::BecameLeader) | None => {}
        }
    }

    // ── Connectivity path ────────────────────────────────────────────

    fn on_connectivity(&mut self, online: bool) {
        let Some(change) = self.monitor.observe(online) else {
            return;
        };
        if let Some(event) = self.engine.set_online(online) {
            self.emit(event);
        }
        if change == ConnectivityChange::WentOffline
            && self.engine.is_running()
            && self.channel.is_leader()
        {
            if self.engine.pause().is_some() {
                self.emit(Event::EmergencyPaused { at: Utc::now() });
            }
        }
        if self.channel.is_leader() {
            self.persist_and_broadcast();
        } else {
            self.publish_snapshot();
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn open_companion_window(&mut self) {
        let url = format!(
            "{}/timer/{}",
            self.companion_base.trim_end_matches('/'),
            self.game_id
        );
        match url::Url::parse(&url).map_err(|e| e.to_string()).and_then(
            |parsed| {
                open::that(parsed.as_str()).map_err(|e| e.to_string())
            },
        ) {
            Ok(()) => self.emit(Event::CompanionWindowOpened {
                url,
                at: Utc::now(),
            }),
            Err(message) => {
                tracing::warn!(url = %url, error = %message, "failed to open companion window");
                self.emit(Event::CompanionWindowFailed {
                    message,
                    at: Utc::now(),
                });
            }
        }
    }

    fn play_due_cues(&mut self) {
        let state = self.engine.state();
        if !state.sound_enabled {
            return;
        }
        let cues = self.evaluator.cues_for(state, self.engine.schedule());
        for cue in cues {
            self.cues.play(cue);
        }
    }

    fn play_cue(&self, cue: Cue) {
        if self.engine.state().sound_enabled {
            self.cues.play(cue);
        }
    }

    /// Mutate→persist→broadcast, serialized by this event loop.
    fn persist_and_broadcast(&mut self) {
        self.store.save(&self.game_id, self.engine.state_mut());
        self.channel
            .broadcast_state(self.engine.state(), self.clock.now_ms());
        self.ticks_since_broadcast = 0;
        self.publish_snapshot();
    }

    fn emit(&mut self, event: Event) {
        let _ = self.events.send(event);
        self.publish_snapshot();
    }

    fn publish_snapshot(&mut self) {
        let snapshot = self.build_snapshot();
        if let Some(tx) = &self.snapshots {
            let _ = tx.send(snapshot);
        }
    }

    fn build_snapshot(&self) -> Snapshot {
        let state = self.engine.state();
        let flags = timer::evaluate(state, self.engine.schedule());
        Snapshot {
            game_id: self.game_id.clone(),
            window_id: self.channel.window_id(),
            phase: self.engine.phase(),
            is_running: state.is_running,
            current_level_index: state.current_level_index,
            level_count: self.engine.schedule().len(),
            elapsed_in_level: state.elapsed_in_level,
            total_elapsed: state.total_elapsed,
            current_level: self.engine.current_level().clone(),
            next_level: self.engine.next_level().cloned(),
            time_remaining_in_level: self.engine.time_remaining_in_level(),
            progress_percentage: self.engine.progress_percentage(),
            show_alert: state.show_alert,
            is_alert_time: flags.is_alert_time,
            is_final_countdown: flags.is_final_countdown,
            is_new_blind_alert: flags.is_new_blind_alert,
            is_master_window: self.channel.is_leader(),
            is_emergency_mode: self.monitor.is_emergency_mode(),
            is_online: state.is_online,
            sound_enabled: state.sound_enabled,
            full_screen: self.full_screen,
        }
    }
}

async fn probe_loop(
    probe: HttpProbe,
    period: Duration,
    cmds: mpsc::UnboundedSender<Command>,
) {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        timer.tick().await;
        let online = probe.check().await;
        if cmds.send(Command::Connectivity(online)).is_err() {
            return;
        }
    }
}

async fn recv_bus(rx: &mut Option<broadcast::Receiver<SyncMessage>>) -> Option<SyncMessage> {
    match rx {
        Some(rx) => match rx.recv().await {
            Ok(msg) => Some(msg),
            // Lagged receivers just skip; the next STATE_UPDATE heals
            // the mirror. Closed cannot happen while the bus lives.
            Err(broadcast::error::RecvError::Lagged(_)) => None,
            Err(broadcast::error::RecvError::Closed) => None,
        },
        None => std::future::pending().await,
    }
}
