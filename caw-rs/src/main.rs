//! `caw` - inspect and control Windows audio endpoints and sessions.

use anyhow::Result;
use caw::{BindingConfig, DataFlow, DeviceRole};
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Flow {
    Render,
    Capture,
    All,
}

impl From<Flow> for DataFlow {
    fn from(flow: Flow) -> Self {
        match flow {
            Flow::Render => DataFlow::Render,
            Flow::Capture => DataFlow::Capture,
            Flow::All => DataFlow::All,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Role {
    Console,
    Multimedia,
    Communications,
}

impl From<Role> for DeviceRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Console => DeviceRole::Console,
            Role::Multimedia => DeviceRole::Multimedia,
            Role::Communications => DeviceRole::Communications,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MuteAction {
    On,
    Off,
    Toggle,
}

/// Which endpoint a command acts on.
#[derive(Debug, Clone, Args)]
struct Target {
    /// Endpoint ID; defaults to the default endpoint of --flow.
    #[arg(long)]
    device: Option<String>,

    /// Flow used to pick the default endpoint.
    #[arg(long, value_enum, default_value_t = Flow::Render)]
    flow: Flow,

    /// Role used to pick the default endpoint.
    #[arg(long, value_enum, default_value_t = Role::Multimedia)]
    role: Role,
}

#[derive(Debug, Parser)]
#[command(name = "caw", version)]
#[command(about = "Inspect and control Windows audio endpoints and sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter (tracing-subscriber EnvFilter syntax). RUST_LOG wins when set.
    #[arg(long, global = true)]
    log_filter: Option<String>,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List endpoints.
    Devices {
        #[arg(long, value_enum, default_value_t = Flow::All)]
        flow: Flow,

        /// Include disabled, unplugged and absent endpoints.
        #[arg(long)]
        all_states: bool,
    },

    /// Show the default endpoint for a flow and role.
    Default {
        #[arg(long, value_enum, default_value_t = Flow::Render)]
        flow: Flow,

        #[arg(long, value_enum, default_value_t = Role::Multimedia)]
        role: Role,
    },

    /// Show or set endpoint volume.
    Volume {
        #[command(flatten)]
        target: Target,

        /// New level, 0.0 to 1.0 (or decibels with --db).
        #[arg(allow_negative_numbers = true)]
        level: Option<f32>,

        /// Read and write decibels instead of the scalar level.
        #[arg(long)]
        db: bool,

        /// Act on one channel instead of the master level.
        #[arg(long)]
        channel: Option<u32>,
    },

    /// Show or change endpoint mute.
    Mute {
        #[command(flatten)]
        target: Target,

        #[arg(value_enum)]
        action: Option<MuteAction>,
    },

    /// List audio sessions, or control the session of one process.
    Sessions {
        #[arg(long, value_enum, default_value_t = Flow::Render)]
        flow: Flow,

        /// Only sessions that are currently playing or recording.
        #[arg(long)]
        active: bool,

        /// Process whose session --volume and --mute act on.
        #[arg(long)]
        pid: Option<u32>,

        /// New session volume, 0.0 to 1.0.
        #[arg(long, requires = "pid")]
        volume: Option<f32>,

        #[arg(long, value_enum, requires = "pid")]
        mute: Option<MuteAction>,
    },

    /// Print notifications as they arrive.
    Watch {
        #[command(flatten)]
        target: Target,

        /// Also watch sessions of the endpoint.
        #[arg(long)]
        sessions: bool,

        /// Exit after this many notifications.
        #[arg(long)]
        count: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = BindingConfig {
        log_filter: cli.log_filter.clone(),
        ..BindingConfig::default()
    };
    caw::logging::init(config.log_filter.as_deref());
    run(cli, config)
}

#[cfg(not(windows))]
fn run(_cli: Cli, _config: BindingConfig) -> Result<()> {
    anyhow::bail!("caw talks to Windows Core Audio and only runs on Windows")
}

#[cfg(windows)]
fn run(cli: Cli, config: BindingConfig) -> Result<()> {
    commands::run(cli, config)
}

#[cfg(windows)]
mod commands {
    use super::*;
    use anyhow::{bail, Context};
    use caw::audio::{
        AudioDevice, AudioEvent, ComGuard, DeviceEnumerator, DeviceInfo, EventContext, Listener,
        NotificationRegistry, SessionControlApi, SessionInfo, SessionState, StateFilter,
    };
    use serde::Serialize;
    use std::sync::mpsc;

    pub fn run(cli: Cli, config: BindingConfig) -> Result<()> {
        let _com = ComGuard::new(config.apartment).context("COM initialization failed")?;
        let enumerator = DeviceEnumerator::with_context(config.activation)?;
        let json = cli.json;

        match cli.command {
            Commands::Devices { flow, all_states } => {
                let filter = if all_states {
                    StateFilter::all()
                } else {
                    StateFilter::ACTIVE
                };
                let devices = enumerator
                    .endpoints(flow.into(), filter)?
                    .map(|device| device?.info())
                    .collect::<Result<Vec<DeviceInfo>, _>>()?;
                if json {
                    print_json(&devices)?;
                } else {
                    for device in &devices {
                        print_device(device);
                    }
                }
            }

            Commands::Default { flow, role } => {
                match enumerator.default_device_id(flow.into(), role.into())? {
                    Some(id) => {
                        let info = enumerator.device(&id)?.info()?;
                        if json {
                            print_json(&info)?;
                        } else {
                            print_device(&info);
                        }
                    }
                    None => bail!("no default {:?} endpoint for the {:?} role", flow, role),
                }
            }

            Commands::Volume {
                target,
                level,
                db,
                channel,
            } => {
                let volume = resolve(&enumerator, &target)?.endpoint_volume()?;
                let context = EventContext::generate();
                match (level, channel, db) {
                    (Some(level), None, false) => volume.set_master_volume(level, context)?,
                    (Some(level), None, true) => volume.set_master_volume_db(level, context)?,
                    (Some(level), Some(ch), false) => volume.set_channel_volume(ch, level, context)?,
                    (Some(level), Some(ch), true) => {
                        volume.set_channel_volume_db(ch, level, context)?
                    }
                    (None, _, _) => {}
                }

                let value = match (channel, db) {
                    (None, false) => volume.master_volume()?,
                    (None, true) => volume.master_volume_db()?,
                    (Some(ch), false) => volume.channel_volume(ch)?,
                    (Some(ch), true) => volume.channel_volume_db(ch)?,
                };
                if json {
                    print_json(&serde_json::json!({
                        "channel": channel,
                        "db": db,
                        "value": value,
                        "range": volume.volume_range()?,
                    }))?;
                } else if db {
                    println!("{value:.2} dB");
                } else {
                    println!("{:.0}%", value * 100.0);
                }
            }

            Commands::Mute { target, action } => {
                let volume = resolve(&enumerator, &target)?.endpoint_volume()?;
                let context = EventContext::generate();
                let muted = match action {
                    Some(MuteAction::On) => {
                        volume.set_mute(true, context)?;
                        true
                    }
                    Some(MuteAction::Off) => {
                        volume.set_mute(false, context)?;
                        false
                    }
                    Some(MuteAction::Toggle) => volume.toggle_mute(context)?,
                    None => volume.mute()?,
                };
                if json {
                    print_json(&serde_json::json!({ "muted": muted }))?;
                } else {
                    println!("{}", if muted { "muted" } else { "unmuted" });
                }
            }

            Commands::Sessions {
                flow,
                active,
                pid,
                volume,
                mute,
            } => {
                let state = active.then_some(SessionState::Active);
                if let Some(pid) = pid {
                    let session = enumerator
                        .sessions(flow.into(), state)?
                        .into_iter()
                        .find(|s| s.process_id().ok() == Some(pid))
                        .with_context(|| format!("no audio session for process {pid}"))?;
                    let control = session.volume()?;
                    let context = EventContext::generate();
                    if let Some(level) = volume {
                        control.set_volume(level, context)?;
                    }
                    match mute {
                        Some(MuteAction::On) => control.set_mute(true, context)?,
                        Some(MuteAction::Off) => control.set_mute(false, context)?,
                        Some(MuteAction::Toggle) => {
                            control.toggle_mute(context)?;
                        }
                        None => {}
                    }
                    let info = session.info()?;
                    if json {
                        print_json(&serde_json::json!({
                            "session": info,
                            "volume": control.volume()?,
                            "muted": control.mute()?,
                        }))?;
                    } else {
                        println!(
                            "{info}\tvolume {:.0}%{}",
                            control.volume()? * 100.0,
                            if control.mute()? { "\tmuted" } else { "" }
                        );
                    }
                } else {
                    let sessions = enumerator
                        .sessions(flow.into(), state)?
                        .iter()
                        .map(|s| s.info())
                        .collect::<Result<Vec<SessionInfo>, _>>()?;
                    if json {
                        print_json(&sessions)?;
                    } else {
                        for session in &sessions {
                            let state = session
                                .state
                                .map(|s| format!("{s:?}"))
                                .unwrap_or_else(|| "?".into());
                            println!("{session}\t{state}\t{}", session.instance_id);
                        }
                    }
                }
            }

            Commands::Watch {
                target,
                sessions,
                count,
            } => watch(&enumerator, &target, sessions, count, json)?,
        }

        Ok(())
    }

    fn watch(
        enumerator: &DeviceEnumerator,
        target: &Target,
        with_sessions: bool,
        count: Option<usize>,
        json: bool,
    ) -> Result<()> {
        let device = resolve(enumerator, target)?;
        let volume = device.endpoint_volume()?;
        let (sender, receiver) = mpsc::channel();
        let registry = NotificationRegistry::new();

        registry.register(enumerator, Listener::from(sender.clone()))?;
        registry.register(&volume, Listener::from(sender.clone()))?;
        if with_sessions {
            let manager = device.session_manager()?;
            registry.register(&manager, Listener::from(sender.clone()))?;
            for session in manager.sessions()? {
                registry.register(&session, Listener::from(sender.clone()))?;
            }
        }
        drop(sender);

        eprintln!("Watching {} ({} registrations)", device.info()?, registry.len());
        let mut seen = 0;
        for notification in receiver.iter() {
            if json {
                println!("{}", serde_json::to_string(&notification)?);
            } else {
                println!("{} {}", notification.registration, describe(&notification.event));
            }
            seen += 1;
            if count.is_some_and(|n| seen >= n) {
                break;
            }
        }

        registry.unregister_all()?;
        Ok(())
    }

    fn resolve(enumerator: &DeviceEnumerator, target: &Target) -> Result<AudioDevice> {
        let device = match &target.device {
            Some(id) => enumerator.device(id)?,
            None => enumerator.default_endpoint(target.flow.into(), target.role.into())?,
        };
        Ok(device)
    }

    fn print_device(info: &DeviceInfo) {
        let state = info
            .state
            .map(|s| format!("{s:?}"))
            .unwrap_or_else(|| "?".into());
        let flow = info.flow.map(|f| f.name()).unwrap_or("?");
        println!("{info}\t{flow}\t{state}\t{}", info.id);
    }

    fn describe(event: &AudioEvent) -> String {
        match event {
            AudioEvent::EndpointVolumeChanged {
                muted,
                master_volume,
                ..
            } => format!(
                "endpoint volume {:.0}%{}",
                master_volume * 100.0,
                if *muted { " (muted)" } else { "" }
            ),
            AudioEvent::SessionVolumeChanged { volume, muted, .. } => format!(
                "session volume {:.0}%{}",
                volume * 100.0,
                if *muted { " (muted)" } else { "" }
            ),
            other => format!("{other:?}"),
        }
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}
