// 50 Hz control loop with reference watchdog
//
// One cycle: take the newest telemetry line (if any), decode it, run the
// anti-corruption check, compute the PID (+ optional feed-forward) command,
// apply the safety overrides, and emit the motor frame. The serial read never
// blocks; with no new line the cycle runs on the previous state.

use std::time::{Duration, Instant};

use nalgebra::{DVector, Vector3};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{
    CMD_TIMEOUT, LOOP_HZ, MAX_LOOP_HZ, MCU_ENABLED, RuntimeConfig, TOPIC_CMD_JOINTS, TOPIC_FAULTS,
    TOPIC_HEALTH, TOPIC_STATE_JOINTS,
};
use crate::control::{Pid, PidError};
use crate::dynamics::{self, DynamicsError};
use crate::mcu::ArmDriver;
use crate::messages::{FaultReport, JointReference, JointReport, JointState, RuntimeHealth};
use crate::model::spatial::Twist;
use crate::model::{ConfigError, Robot};
use crate::telemetry::frame::parse_frame_bytes;
use crate::telemetry::{
    Coupling, LayoutError, MotorCommand, SafetyFault, TelemetryState, check_comm_faults, enforce,
    quantize,
};

/// Invalid runtime configuration
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Robot description: {0}")]
    Model(#[from] ConfigError),

    #[error("Telemetry layout: {0}")]
    Layout(#[from] LayoutError),

    #[error("PID gains: {0}")]
    Pid(#[from] PidError),

    #[error("PID has {pid} axes but the robot has {joints} joints")]
    PidAxes { pid: usize, joints: usize },
}

/// What one cycle wants done on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutput {
    /// Motor frame to send; `None` when the cycle's telemetry was malformed
    pub commands: Option<Vec<MotorCommand>>,
    /// Discard buffered serial input
    pub flush: bool,
    pub faults: Vec<SafetyFault>,
}

impl CycleOutput {
    pub fn fault_reports(&self) -> Vec<FaultReport> {
        self.faults.iter().map(FaultReport::from).collect()
    }
}

pub struct Runtime {
    robot: Robot,
    telemetry: TelemetryState,
    pid: Pid,
    gravity: Vector3<f64>,
    max_speed: u16,
    feed_forward_gain: f64,
    latest_ref: Option<JointReference>,
    ref_received_at: Instant,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new(config: &RuntimeConfig) -> Result<Self, SetupError> {
        let robot = config.robot.build()?;
        let coupling = Coupling::new(&config.telemetry, &robot)?;
        let pid = Pid::from_gains(&config.pid)?;
        if pid.axes() != robot.dof() {
            return Err(SetupError::PidAxes {
                pid: pid.axes(),
                joints: robot.dof(),
            });
        }

        Ok(Self {
            robot,
            telemetry: TelemetryState::new(coupling),
            pid,
            gravity: Vector3::from(config.gravity),
            max_speed: config.max_speed,
            feed_forward_gain: config.feed_forward_gain,
            latest_ref: None,
            ref_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first reference
        })
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn channels(&self) -> usize {
        self.telemetry.coupling().channels()
    }

    pub fn telemetry(&self) -> &TelemetryState {
        &self.telemetry
    }

    /// Process incoming joint reference
    pub fn on_reference(&mut self, reference: JointReference) {
        if reference.angles.len() != self.robot.dof() {
            warn!(
                "Ignoring reference with {} angles, robot has {} joints",
                reference.angles.len(),
                self.robot.dof()
            );
            return;
        }
        debug!("Received reference: {:?}", &reference);
        self.latest_ref = Some(reference);
        self.ref_received_at = Instant::now();
    }

    /// Run one control cycle at time `now`, `dt` seconds after the previous one
    pub fn step(&mut self, line: Option<&[u8]>, dt: f64, now: Instant) -> CycleOutput {
        let mut faults = Vec::new();

        // 1. Decode telemetry, or keep the previous state
        if let Some(line) = line {
            let decoded = parse_frame_bytes(line, self.channels())
                .and_then(|segments| self.telemetry.decode(&segments, dt));
            if let Err(e) = decoded {
                warn!("Malformed telemetry, flushing input: {}", e);
                self.health = RuntimeHealth::TelemetryError;
                return CycleOutput {
                    commands: None,
                    flush: true,
                    faults,
                };
            }
            faults.extend(check_comm_faults(&mut self.telemetry));
        }

        // 2. Control law (includes watchdog logic)
        self.health = self.compute_commands(dt, now);

        // 3. Safety overrides
        faults.extend(enforce(&mut self.telemetry));
        if self.health == RuntimeHealth::Ok && !faults.is_empty() {
            self.health = RuntimeHealth::SafetyStop;
        }

        CycleOutput {
            commands: Some(self.telemetry.motor_commands(self.max_speed)),
            flush: false,
            faults,
        }
    }

    fn compute_commands(&mut self, dt: f64, now: Instant) -> RuntimeHealth {
        let ref_age = now.saturating_duration_since(self.ref_received_at);

        let reference = match &self.latest_ref {
            Some(reference) if ref_age <= CMD_TIMEOUT => reference.clone(),
            _ => {
                // Watchdog triggered - stop the arm
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Reference stale ({:?} old), stopping arm", ref_age);
                }
                self.pid.reset();
                self.telemetry.stop_all();
                return RuntimeHealth::CmdStale;
            }
        };

        if self.telemetry.frames() == 0 {
            if self.health != RuntimeHealth::AwaitingTelemetry {
                info!("Waiting for first telemetry frame");
            }
            self.telemetry.stop_all();
            return RuntimeHealth::AwaitingTelemetry;
        }

        let effort = match self.joint_effort(&reference, dt) {
            Ok(effort) => effort,
            Err(e) => {
                warn!("Control failed, stopping arm: {}", e);
                self.pid.reset();
                self.telemetry.stop_all();
                return RuntimeHealth::ControlError;
            }
        };

        self.telemetry
            .set_joint_commands(&effort, self.max_speed, reference.homing);
        let (speed, direction) = quantize(reference.gripper, self.max_speed);
        for channel in self.robot.dof()..self.channels() {
            self.telemetry.set_terminal_command(
                channel,
                MotorCommand {
                    speed,
                    direction,
                    homing: reference.homing as u8,
                },
            );
        }
        RuntimeHealth::Ok
    }

    /// PID output plus scaled feed-forward torque, in joint space
    fn joint_effort(
        &mut self,
        reference: &JointReference,
        dt: f64,
    ) -> Result<DVector<f64>, Box<dyn std::error::Error + Send + Sync>> {
        let angles = self.telemetry.joint_angles();
        let target = DVector::from_column_slice(&reference.angles);
        let mut effort = self.pid.execute(&target, &angles, dt)?;

        if self.feed_forward_gain != 0.0 {
            let tau = self.feed_forward_torque()?;
            effort += tau * self.feed_forward_gain;
        }
        Ok(effort)
    }

    /// Torque to hold the current motion against gravity, plus drive-train losses
    fn feed_forward_torque(&self) -> Result<DVector<f64>, DynamicsError> {
        let n = self.robot.dof();
        let angles = self.telemetry.joint_angles();
        let velocities = self.telemetry.joint_velocities();
        let tau = dynamics::feed_forward(
            &self.robot,
            &angles,
            &velocities,
            &DVector::zeros(n),
            &self.gravity,
            &Twist::zeros(),
        )?;
        let losses = dynamics::friction_torques(&self.robot, &tau, &velocities)?;
        Ok(tau + losses)
    }

    /// Snapshot of the decoded state for publishing
    pub fn joint_state(&self) -> JointState {
        let joints = self
            .telemetry
            .channels()
            .iter()
            .enumerate()
            .map(|(i, ch)| {
                let mut report = JointReport::from(ch);
                if let (Some(joint), Some(current)) = (self.robot.joints().get(i), ch.current) {
                    report.torque = Some(joint.current_to_torque(current));
                }
                report
            })
            .collect();

        JointState {
            frames: self.telemetry.frames(),
            joints,
        }
    }
}

/// Options from the command line
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub port: String,
    pub baudrate: u32,
    pub config: RuntimeConfig,
    /// Run without the serial link
    pub dry_run: bool,
    pub hz: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            port: crate::config::MCU_PORT.to_string(),
            baudrate: crate::config::MCU_BAUDRATE,
            config: RuntimeConfig::default(),
            dry_run: false,
            hz: LOOP_HZ,
        }
    }
}

/// Tick period for a loop rate, with the rate clamped to 1..=MAX_LOOP_HZ
pub fn loop_period(hz: u64) -> Duration {
    Duration::from_secs_f64(1.0 / hz.clamp(1, MAX_LOOP_HZ) as f64)
}

pub async fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut runtime = Runtime::new(&options.config)?;

    let mut driver = if options.dry_run || !MCU_ENABLED {
        info!("Dry run: serial link disabled");
        None
    } else {
        Some(ArmDriver::new(&options.port, options.baudrate, runtime.channels())?)
    };

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_JOINTS).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE_JOINTS).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;
    let pub_faults = session.declare_publisher(TOPIC_FAULTS).await?;

    let hz = options.hz.clamp(1, MAX_LOOP_HZ);
    let period = loop_period(hz);
    let mut tick = interval(period);

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        hz,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_JOINTS);
    info!(
        "Publishing to: {}, {}, {}",
        TOPIC_STATE_JOINTS, TOPIC_HEALTH, TOPIC_FAULTS
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut last_tick = Instant::now();

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Stop requested");
                break;
            }
        }

        let now = Instant::now();
        let measured = now.duration_since(last_tick).as_secs_f64();
        let dt = if measured > 0.0 { measured } else { period.as_secs_f64() };
        last_tick = now;

        // 1. Drain all pending references (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<JointReference>(&payload) {
                Ok(reference) => runtime.on_reference(reference),
                Err(e) => warn!("Failed to parse reference: {}", e),
            }
        }

        // 2. Newest telemetry line, if any
        let line = match driver.as_mut() {
            Some(driver) => driver.poll_telemetry().unwrap_or_else(|e| {
                warn!("Telemetry read failed: {}", e);
                None
            }),
            None => None,
        };

        // 3. Run the cycle
        let output = runtime.step(line.as_deref(), dt, now);

        // 4. Act on the wire
        if let Some(driver) = driver.as_mut() {
            if output.flush {
                if let Err(e) = driver.flush() {
                    warn!("Failed to flush MCU input: {}", e);
                }
            }
            if let Some(commands) = &output.commands {
                if let Err(e) = driver.send_commands(commands) {
                    warn!("Failed to send motor commands: {}", e);
                }
            }
        }

        // 5. Publish state, health and this cycle's faults
        let state_json = serde_json::to_string(&runtime.joint_state())?;
        pub_state.put(state_json).await?;

        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;

        if !output.faults.is_empty() {
            let faults_json = serde_json::to_string(&output.fault_reports())?;
            pub_faults.put(faults_json).await?;
        }
    }

    // Dropping the driver sends the zero-speed, zero-homing frame
    drop(driver);
    info!("Runtime stopped");
    Ok(())
}
