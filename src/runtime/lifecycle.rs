//! lifecycle.rs
//! Start/stop state for the acquisition and control tasks.
//!
//! - At most one live instance per task. `start` on a running task and `stop` on an idle
//!   one are no-ops.
//! - Every start gets a fresh `CancelToken`; a stopped instance is never resumed.
//! - A task is `StopRequested` from cancellation until its thread exits, then `Idle`.
//! - The sample buffer, setpoint, session clock, schedules and health records belong to
//!   the manager and survive restarts.
//! - The controller is built from the current selection on each control start; a missing
//!   configuration table fails the start and leaves the task idle.
//! - Manual commands go through one actuator worker owned by the manager, under the control
//!   slot lock. Control refuses to start while a manual call is still inside the actuator.

use std::{
    fmt,
    sync::{Arc, Mutex as StdMutex, OnceLock},
    thread::{self, JoinHandle},
    time::Instant,
};

use crossbeam::channel::{Receiver, bounded};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::acquisition::{
    acquisition_task::{AcquisitionTask, WindowSink},
    sample_buffer::{Sample, SharedBuffer},
    sensor::TemperatureSensor,
    window::{WindowUpdate, WindowView},
};
use crate::control::{
    actuator::{Actuator, ActuatorCommand},
    control_task::ControlTask,
    controller::{Controller, ControllerKind},
};
use crate::runtime::{
    cancel::CancelToken, guarded_io::GuardedIo, schedule::Cadence, setpoint::Setpoint,
};
use crate::utils::{
    config::EngineConfig,
    error::{EngineError, Result},
    metrics::{SharedHealth, TaskHealth, lock_health},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Acquisition,
    Control,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Acquisition => f.write_str("Acquisition"),
            TaskKind::Control => f.write_str("Control"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Running,
    StopRequested,
}

/// The live instance of one task, if any.
#[derive(Default)]
struct TaskSlot {
    token: Option<CancelToken>,
    handle: Option<JoinHandle<()>>,
}

impl TaskSlot {
    /// Current state; reaps the thread if it has already exited on its own.
    fn state(&mut self) -> LifecycleState {
        let finished = match &self.handle {
            None => return LifecycleState::Idle,
            Some(handle) => handle.is_finished(),
        };
        if finished {
            self.join();
            return LifecycleState::Idle;
        }
        match &self.token {
            Some(token) if token.is_cancelled() => LifecycleState::StopRequested,
            _ => LifecycleState::Running,
        }
    }

    fn cancel(&self) {
        if let Some(token) = &self.token {
            token.cancel();
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let name = handle.thread().name().unwrap_or("task").to_string();
            if handle.join().is_err() {
                error!("[Lifecycle] {} thread panicked", name);
            }
        }
        self.token = None;
    }
}

/// Per-task resources that outlive any single instance.
struct TaskResources {
    slot: Mutex<TaskSlot>,
    cadence: Cadence,
    health: SharedHealth,
}

impl TaskResources {
    fn new(cadence: Cadence) -> Self {
        Self {
            slot: Mutex::new(TaskSlot::default()),
            cadence,
            health: Arc::new(StdMutex::new(TaskHealth::default())),
        }
    }
}

type ManualIo = GuardedIo<ActuatorCommand, Result<()>>;

pub struct LifecycleManager {
    config: EngineConfig,
    sensor: Arc<dyn TemperatureSensor>,
    actuator: Arc<dyn Actuator>,
    buffer: SharedBuffer,
    setpoint: Setpoint,
    selection: Mutex<ControllerKind>,
    session_start: OnceLock<Instant>,
    acquisition: TaskResources,
    control: TaskResources,
    manual: Mutex<ManualIo>,
    sink: WindowSink,
}

impl LifecycleManager {
    pub fn new(
        config: EngineConfig,
        sensor: Arc<dyn TemperatureSensor>,
        actuator: Arc<dyn Actuator>,
    ) -> Result<Self> {
        config.validate()?;
        let buffer = SharedBuffer::new(config.engine.initial_capacity)?;
        let setpoint = Setpoint::new(config.engine.initial_setpoint);
        let (tx, rx) = bounded(config.engine.window_channel_capacity);
        let manual_actuator = actuator.clone();
        let manual = GuardedIo::spawn(
            "manual command",
            config.engine.io_timeout(),
            move |cmd: ActuatorCommand| manual_actuator.apply(cmd),
        )?;

        info!(
            "[Lifecycle] engine ready: setpoint={:.1} acquisition={:?} control={:?}",
            config.engine.initial_setpoint,
            config.engine.acquisition_interval(),
            config.engine.control_interval()
        );

        Ok(Self {
            acquisition: TaskResources::new(Cadence::new(config.engine.acquisition_interval())),
            control: TaskResources::new(Cadence::new(config.engine.control_interval())),
            config,
            sensor,
            actuator,
            buffer,
            setpoint,
            selection: Mutex::new(ControllerKind::default()),
            session_start: OnceLock::new(),
            manual: Mutex::new(manual),
            sink: WindowSink { tx, evict: rx },
        })
    }

    fn resources(&self, kind: TaskKind) -> &TaskResources {
        match kind {
            TaskKind::Acquisition => &self.acquisition,
            TaskKind::Control => &self.control,
        }
    }

    pub fn state(&self, kind: TaskKind) -> LifecycleState {
        self.resources(kind).slot.lock().state()
    }

    /// Starts `kind` unless it is already running.
    ///
    /// An instance still shutting down is joined first, on the caller's thread. That wait is
    /// bounded by one tick plus one I/O timeout. Starting control fails with a lifecycle error
    /// while a manual command is still pending on the actuator.
    pub fn start(&self, kind: TaskKind) -> Result<()> {
        let resources = self.resources(kind);
        let mut slot = resources.slot.lock();
        match slot.state() {
            LifecycleState::Running => {
                debug!("[Lifecycle] {} already running", kind);
                return Ok(());
            }
            LifecycleState::StopRequested => {
                info!("[Lifecycle] waiting for previous {} instance to exit", kind);
                slot.join();
            }
            LifecycleState::Idle => {}
        }
        if kind == TaskKind::Control && !self.manual.lock().settle() {
            return Err(EngineError::Lifecycle(
                "manual command still pending on the actuator".into(),
            ));
        }

        lock_health(&resources.health).faulted = false;
        let token = CancelToken::new();
        let handle = match kind {
            TaskKind::Acquisition => self.spawn_acquisition(token.clone())?,
            TaskKind::Control => self.spawn_control(token.clone())?,
        };
        slot.token = Some(token);
        slot.handle = Some(handle);
        info!("[Lifecycle] {} started", kind);
        Ok(())
    }

    /// Requests cancellation; returns without waiting for the thread.
    pub fn stop(&self, kind: TaskKind) {
        let mut slot = self.resources(kind).slot.lock();
        match slot.state() {
            LifecycleState::Idle => debug!("[Lifecycle] {} already idle", kind),
            LifecycleState::StopRequested => debug!("[Lifecycle] {} stop already requested", kind),
            LifecycleState::Running => {
                slot.cancel();
                info!("[Lifecycle] {} stop requested", kind);
            }
        }
    }

    /// Stops `kind` and blocks until its thread has exited.
    pub fn stop_and_wait(&self, kind: TaskKind) {
        let mut slot = self.resources(kind).slot.lock();
        if slot.handle.is_some() {
            slot.cancel();
            slot.join();
            info!("[Lifecycle] {} stopped", kind);
        }
    }

    /// Stops both tasks and waits for them. Control goes first so its safe command is
    /// applied while the vessel is still being sampled.
    pub fn shutdown(&self) {
        self.stop_and_wait(TaskKind::Control);
        self.stop_and_wait(TaskKind::Acquisition);
    }

    fn spawn_acquisition(&self, token: CancelToken) -> Result<JoinHandle<()>> {
        let engine = &self.config.engine;
        let task = AcquisitionTask {
            sensor: self.sensor.clone(),
            buffer: self.buffer.clone(),
            setpoint: self.setpoint.clone(),
            session_start: *self.session_start.get_or_init(Instant::now),
            cadence: self.acquisition.cadence.clone(),
            horizon_secs: engine.horizon_secs,
            io_timeout: engine.io_timeout(),
            sink: self.sink.clone(),
            health: self.acquisition.health.clone(),
        };
        let handle = thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || task.run(token))?;
        Ok(handle)
    }

    fn spawn_control(&self, token: CancelToken) -> Result<JoinHandle<()>> {
        let kind = *self.selection.lock();
        let controller = Controller::build(kind, &self.config.controller).inspect_err(|e| {
            error!("[Lifecycle] cannot start {} controller: {}", kind, e);
        })?;

        let engine = &self.config.engine;
        let task = ControlTask {
            controller,
            actuator: self.actuator.clone(),
            buffer: self.buffer.clone(),
            setpoint: self.setpoint.clone(),
            session_start: *self.session_start.get_or_init(Instant::now),
            stale_after: engine.acquisition_interval_secs + engine.io_timeout_secs,
            cadence: self.control.cadence.clone(),
            history_secs: engine.control_history_secs,
            io_timeout: engine.io_timeout(),
            safe_command: ActuatorCommand::Level(self.config.controller.output_min),
            health: self.control.health.clone(),
        };
        let handle = thread::Builder::new()
            .name("control".into())
            .spawn_with_priority(ThreadPriority::Max, move |priority| {
                if let Err(e) = priority {
                    warn!("[Control] running at default priority: {:?}", e);
                }
                task.run(token)
            })?;
        Ok(handle)
    }

    pub fn set_setpoint(&self, value: f64) -> Result<()> {
        self.setpoint.set(value)?;
        info!("[Lifecycle] setpoint set to {:.2}", value);
        Ok(())
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint.get()
    }

    /// Changes the controller used by the next control start. A running instance keeps
    /// the controller it was started with.
    pub fn select_controller(&self, kind: ControllerKind) {
        *self.selection.lock() = kind;
        if self.state(TaskKind::Control) == LifecycleState::Idle {
            info!("[Lifecycle] controller {} selected", kind);
        } else {
            info!("[Lifecycle] controller {} selected, applies on next control start", kind);
        }
    }

    pub fn selected_controller(&self) -> ControllerKind {
        *self.selection.lock()
    }

    /// Sends an operator command to the actuator and waits for it, at most one I/O timeout.
    /// Refused unless the control task is idle. The control slot stays locked for the call,
    /// so a concurrent control start waits for it instead of racing it.
    pub fn apply_manual(&self, command: ActuatorCommand) -> Result<()> {
        let mut slot = self.control.slot.lock();
        let state = slot.state();
        if state != LifecycleState::Idle {
            return Err(EngineError::Lifecycle(format!(
                "manual {command:?} refused: control task is {state:?}"
            )));
        }

        match self.manual.lock().call(command) {
            Ok(Ok(())) => {
                info!("[Lifecycle] manual {:?} applied", command);
                Ok(())
            }
            Ok(Err(e)) | Err(e) => {
                warn!("[Lifecycle] manual {:?} failed: {}", command, e);
                Err(e)
            }
        }
    }

    /// Snapshot of the health record for `kind`.
    pub fn health(&self, kind: TaskKind) -> TaskHealth {
        lock_health(&self.resources(kind).health).clone()
    }

    /// Current display window, computed on demand.
    pub fn window(&self) -> WindowView {
        let horizon = self.config.engine.horizon_secs;
        self.buffer.with_read(|b| WindowView::from_buffer(b, horizon))
    }

    /// Receiving end of the per-tick window updates.
    pub fn window_updates(&self) -> Receiver<WindowUpdate> {
        self.sink.evict.clone()
    }

    pub fn history(&self) -> Vec<Sample> {
        self.buffer.snapshot()
    }

    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
