mod common;

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use brewpi::{
    acquisition::sample_buffer::Sample,
    control::{actuator::ActuatorCommand, controller::ControllerKind},
    runtime::lifecycle::{LifecycleManager, LifecycleState, TaskKind},
    utils::error::EngineError,
};

use common::{MockSensor, RecordingActuator, fast_config, unit_lqr, wait_for};

fn engine_with(
    config: brewpi::utils::config::EngineConfig,
) -> (LifecycleManager, Arc<MockSensor>, Arc<RecordingActuator>) {
    let sensor = Arc::new(MockSensor::new(60.0));
    let actuator = Arc::new(RecordingActuator::default());
    let engine = LifecycleManager::new(config, sensor.clone(), actuator.clone()).unwrap();
    (engine, sensor, actuator)
}

fn assert_strictly_increasing(samples: &[Sample]) {
    for pair in samples.windows(2) {
        assert!(pair[1].time > pair[0].time, "{:?} then {:?}", pair[0], pair[1]);
    }
}

#[test]
fn stop_on_idle_task_is_a_no_op() {
    let (engine, _, _) = engine_with(fast_config(20));
    engine.stop(TaskKind::Acquisition);
    engine.stop(TaskKind::Control);
    assert_eq!(engine.state(TaskKind::Acquisition), LifecycleState::Idle);
    assert_eq!(engine.state(TaskKind::Control), LifecycleState::Idle);
}

#[test]
fn double_start_runs_a_single_instance() {
    let (engine, _, _) = engine_with(fast_config(50));
    engine.start(TaskKind::Acquisition).unwrap();
    engine.start(TaskKind::Acquisition).unwrap();
    assert_eq!(engine.state(TaskKind::Acquisition), LifecycleState::Running);

    thread::sleep(Duration::from_millis(320));
    engine.stop_and_wait(TaskKind::Acquisition);

    let samples = engine.history();
    assert_strictly_increasing(&samples);
    // One instance at 50 ms gives about seven samples; two would give about fourteen.
    assert!(samples.len() >= 3 && samples.len() <= 10, "got {}", samples.len());
}

#[test]
fn double_stop_equals_single_stop() {
    let (engine, _, _) = engine_with(fast_config(20));
    engine.start(TaskKind::Acquisition).unwrap();
    engine.stop(TaskKind::Acquisition);
    engine.stop(TaskKind::Acquisition);
    assert!(wait_for(Duration::from_secs(2), || {
        engine.state(TaskKind::Acquisition) == LifecycleState::Idle
    }));
    engine.stop(TaskKind::Acquisition);
    assert_eq!(engine.state(TaskKind::Acquisition), LifecycleState::Idle);
}

#[test]
fn stop_requested_until_the_thread_exits() {
    let (engine, sensor, _) = engine_with(fast_config(20));
    sensor.set_delay(Duration::from_millis(150));
    engine.start(TaskKind::Acquisition).unwrap();
    thread::sleep(Duration::from_millis(30));

    engine.stop(TaskKind::Acquisition);
    assert_eq!(engine.state(TaskKind::Acquisition), LifecycleState::StopRequested);
    assert!(wait_for(Duration::from_secs(2), || {
        engine.state(TaskKind::Acquisition) == LifecycleState::Idle
    }));
}

#[test]
fn start_while_stopping_waits_a_bounded_time() {
    let (engine, sensor, _) = engine_with(fast_config(20));
    sensor.set_delay(Duration::from_millis(150));
    engine.start(TaskKind::Acquisition).unwrap();
    thread::sleep(Duration::from_millis(30));
    engine.stop(TaskKind::Acquisition);
    assert_eq!(engine.state(TaskKind::Acquisition), LifecycleState::StopRequested);

    // Joins the exiting instance: one read (under the 200 ms I/O timeout) plus a tick.
    let started = Instant::now();
    engine.start(TaskKind::Acquisition).unwrap();
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(engine.state(TaskKind::Acquisition), LifecycleState::Running);
    engine.shutdown();
}

#[test]
fn restart_keeps_the_rhythm() {
    let period = 0.05;
    let (engine, _, _) = engine_with(fast_config(50));
    engine.start(TaskKind::Acquisition).unwrap();
    thread::sleep(Duration::from_millis(170));
    let stopped_at = Instant::now();
    engine.stop_and_wait(TaskKind::Acquisition);
    let before = engine.history().len();

    engine.start(TaskKind::Acquisition).unwrap();
    let stopped_for = stopped_at.elapsed().as_secs_f64();
    thread::sleep(Duration::from_millis(170));
    engine.stop_and_wait(TaskKind::Acquisition);

    let samples = engine.history();
    assert!(samples.len() > before, "no samples after restart");
    assert_strictly_increasing(&samples);
    let gaps: Vec<f64> = samples.windows(2).map(|p| p[1].time - p[0].time).collect();
    let min_gap = gaps.iter().copied().fold(f64::INFINITY, f64::min);
    assert!(min_gap > 0.03, "duplicate tick: samples {min_gap:.3}s apart");

    // The first tick after the restart lands at most one period after the stop window.
    let across = gaps[before - 1];
    assert!(
        across <= 2.0 * period + stopped_for,
        "skipped tick: {across:.3}s across the restart ({stopped_for:.3}s stopped)"
    );
    let max_gap = gaps.iter().copied().fold(0.0, f64::max);
    assert!(max_gap <= 2.0 * period + stopped_for, "skipped tick: {max_gap:.3}s gap");
}

#[test]
fn sensor_failures_keep_the_task_running() {
    let (engine, sensor, _) = engine_with(fast_config(20));
    sensor.set_failing(true);
    engine.start(TaskKind::Acquisition).unwrap();

    assert!(wait_for(Duration::from_secs(2), || {
        engine.health(TaskKind::Acquisition).sensor_failures >= 3
    }));
    assert_eq!(engine.state(TaskKind::Acquisition), LifecycleState::Running);
    assert!(engine.history().is_empty());

    sensor.set_failing(false);
    assert!(wait_for(Duration::from_secs(2), || engine.history().len() >= 2));
    let health = engine.health(TaskKind::Acquisition);
    assert!(health.is_healthy());
    assert!(health.last_error.is_some());
    engine.shutdown();
}

#[test]
fn hung_sensor_is_bounded_by_the_io_timeout() {
    let mut config = fast_config(20);
    config.engine.io_timeout_secs = 0.05;
    let (engine, sensor, _) = engine_with(config);
    let release = sensor.hang();
    engine.start(TaskKind::Acquisition).unwrap();

    assert!(wait_for(Duration::from_secs(2), || {
        engine.health(TaskKind::Acquisition).io_timeouts >= 3
    }));
    assert_eq!(engine.state(TaskKind::Acquisition), LifecycleState::Running);
    // Later ticks fail fast instead of queueing more reads behind the stuck one.
    assert_eq!(sensor.reads(), 1);

    let started = Instant::now();
    engine.stop_and_wait(TaskKind::Acquisition);
    assert!(started.elapsed() < Duration::from_millis(500));
    drop(release);
}

#[test]
fn non_monotonic_time_faults_the_instance_only() {
    let (engine, _, _) = engine_with(fast_config(20));
    engine.buffer().append(Sample::new(1.0e9, 67.0, 20.0)).unwrap();
    engine.start(TaskKind::Acquisition).unwrap();

    assert!(wait_for(Duration::from_secs(2), || {
        engine.state(TaskKind::Acquisition) == LifecycleState::Idle
    }));
    let health = engine.health(TaskKind::Acquisition);
    assert!(health.faulted);
    assert!(health.last_error.unwrap_or_default().contains("invariant"));
    assert_eq!(engine.history().len(), 1);
}

#[test]
fn control_applies_commands_and_a_safe_command_on_stop() {
    let mut config = fast_config(20);
    unit_lqr(&mut config);
    let (engine, _, actuator) = engine_with(config);
    engine.select_controller(ControllerKind::Lqr);
    engine.start(TaskKind::Acquisition).unwrap();
    engine.start(TaskKind::Control).unwrap();

    // Sensor reads 60 °C against a 67 °C setpoint.
    assert!(wait_for(Duration::from_secs(2), || {
        actuator.commands().contains(&ActuatorCommand::Level(7.0))
    }));
    engine.shutdown();

    let commands = actuator.commands();
    assert_eq!(commands.last(), Some(&ActuatorCommand::Level(0.0)));
    assert!(engine.health(TaskKind::Control).last_command.is_some());
}

#[test]
fn control_holds_off_while_readings_are_stale() {
    let mut config = fast_config(20);
    config.engine.io_timeout_secs = 0.05;
    unit_lqr(&mut config);
    let (engine, sensor, actuator) = engine_with(config);
    engine.select_controller(ControllerKind::Lqr);
    engine.start(TaskKind::Acquisition).unwrap();
    engine.start(TaskKind::Control).unwrap();
    assert!(wait_for(Duration::from_secs(2), || {
        actuator.commands().contains(&ActuatorCommand::Level(7.0))
    }));

    // Dead probe: one safe command, then nothing until readings come back.
    sensor.set_failing(true);
    let idle = engine.health(TaskKind::Control).idle_ticks;
    assert!(wait_for(Duration::from_secs(2), || {
        engine.health(TaskKind::Control).idle_ticks >= idle + 3
    }));
    let held = actuator.commands();
    assert_eq!(held.last(), Some(&ActuatorCommand::Level(0.0)));
    thread::sleep(Duration::from_millis(150));
    assert_eq!(actuator.commands().len(), held.len());
    assert!(engine.health(TaskKind::Acquisition).sensor_failures > 0);

    sensor.set_failing(false);
    let resumed = held.len();
    assert!(wait_for(Duration::from_secs(2), || {
        actuator.commands()[resumed..].contains(&ActuatorCommand::Level(7.0))
    }));

    // Acquisition stopped: same behaviour on the last stored sample.
    engine.stop_and_wait(TaskKind::Acquisition);
    let idle = engine.health(TaskKind::Control).idle_ticks;
    assert!(wait_for(Duration::from_secs(2), || {
        engine.health(TaskKind::Control).idle_ticks >= idle + 3
    }));
    let held = actuator.commands();
    assert_eq!(held.last(), Some(&ActuatorCommand::Level(0.0)));
    thread::sleep(Duration::from_millis(150));
    assert_eq!(actuator.commands().len(), held.len());
    assert_eq!(engine.state(TaskKind::Control), LifecycleState::Running);
    engine.shutdown();
}

#[test]
fn control_without_history_stays_idle() {
    let mut config = fast_config(20);
    unit_lqr(&mut config);
    let (engine, _, actuator) = engine_with(config);
    engine.select_controller(ControllerKind::Lqr);
    engine.start(TaskKind::Control).unwrap();

    assert!(wait_for(Duration::from_secs(2), || {
        engine.health(TaskKind::Control).idle_ticks >= 2
    }));
    engine.stop_and_wait(TaskKind::Control);
    assert_eq!(actuator.commands(), vec![ActuatorCommand::Level(0.0)]);
}

#[test]
fn missing_gains_fail_the_control_start() {
    let (engine, _, _) = engine_with(fast_config(20));
    let err = engine.start(TaskKind::Control).unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
    assert_eq!(engine.state(TaskKind::Control), LifecycleState::Idle);
}

#[test]
fn controller_selection_applies_on_next_start() {
    let mut config = fast_config(20);
    unit_lqr(&mut config);
    let (engine, _, _) = engine_with(config);
    engine.select_controller(ControllerKind::Lqr);
    engine.start(TaskKind::Control).unwrap();

    // No MPC table is configured; the running LQR instance is unaffected.
    engine.select_controller(ControllerKind::Mpc);
    assert_eq!(engine.selected_controller(), ControllerKind::Mpc);
    thread::sleep(Duration::from_millis(60));
    assert_eq!(engine.state(TaskKind::Control), LifecycleState::Running);

    engine.stop_and_wait(TaskKind::Control);
    assert!(matches!(
        engine.start(TaskKind::Control),
        Err(EngineError::Config(_))
    ));
}

#[test]
fn manual_command_is_refused_while_control_runs() {
    let mut config = fast_config(20);
    unit_lqr(&mut config);
    let (engine, _, actuator) = engine_with(config);

    engine.apply_manual(ActuatorCommand::Switch(true)).unwrap();
    assert!(wait_for(Duration::from_secs(1), || {
        actuator.commands().contains(&ActuatorCommand::Switch(true))
    }));

    engine.select_controller(ControllerKind::Lqr);
    engine.start(TaskKind::Control).unwrap();
    assert!(matches!(
        engine.apply_manual(ActuatorCommand::Switch(false)),
        Err(EngineError::Lifecycle(_))
    ));
    engine.shutdown();
    assert!(!actuator.commands().contains(&ActuatorCommand::Switch(false)));
}

#[test]
fn control_start_waits_out_a_pending_manual_command() {
    let mut config = fast_config(20);
    config.engine.io_timeout_secs = 0.05;
    unit_lqr(&mut config);
    let (engine, _, actuator) = engine_with(config);
    engine.select_controller(ControllerKind::Lqr);
    actuator.set_delay(Duration::from_millis(300));

    let err = engine.apply_manual(ActuatorCommand::Switch(true)).unwrap_err();
    assert!(matches!(err, EngineError::IoTimeout { .. }));
    // A second command does not queue behind the stuck one.
    assert!(engine.apply_manual(ActuatorCommand::Switch(false)).is_err());
    assert!(matches!(
        engine.start(TaskKind::Control),
        Err(EngineError::Lifecycle(_))
    ));
    assert_eq!(engine.state(TaskKind::Control), LifecycleState::Idle);

    actuator.set_delay(Duration::ZERO);
    assert!(wait_for(Duration::from_secs(2), || {
        engine.start(TaskKind::Control).is_ok()
    }));
    engine.shutdown();

    let commands = actuator.commands();
    assert_eq!(commands.first(), Some(&ActuatorCommand::Switch(true)));
    assert!(!commands.contains(&ActuatorCommand::Switch(false)));
}

#[test]
fn full_window_channel_drops_the_oldest_update() {
    let mut config = fast_config(10);
    config.engine.window_channel_capacity = 2;
    let (engine, _, _) = engine_with(config);
    let updates = engine.window_updates();
    engine.start(TaskKind::Acquisition).unwrap();

    assert!(wait_for(Duration::from_secs(2), || {
        engine.health(TaskKind::Acquisition).dropped_updates >= 3
    }));
    engine.stop_and_wait(TaskKind::Acquisition);

    let queued: Vec<_> = updates.try_iter().collect();
    assert!(queued.len() <= 2);
    let newest = engine.buffer().latest().unwrap();
    assert_eq!(queued.last().map(|u| u.time), Some(newest.time));
}

#[test]
fn window_tracks_the_latest_samples() {
    let (engine, sensor, _) = engine_with(fast_config(20));
    engine.start(TaskKind::Acquisition).unwrap();
    assert!(wait_for(Duration::from_secs(2), || engine.history().len() >= 2));
    sensor.set_value(61.5);
    engine.set_setpoint(70.0).unwrap();
    assert!(wait_for(Duration::from_secs(2), || {
        engine.window().latest() == Some((70.0, 61.5))
    }));
    engine.shutdown();

    let view = engine.window();
    assert_eq!(view.elapsed.last(), Some(&0.0));
    assert!(view.elapsed.iter().all(|&t| t > -1.0 && t <= 0.0));
    assert!(engine.set_setpoint(f64::NAN).is_err());
    assert_eq!(engine.setpoint(), 70.0);
}
