use std::{fs::File, net::SocketAddr, path::PathBuf, sync::Mutex, time::Duration};

use anyhow::Context;
use app::App;
use clap::Parser;
use facetrack::{
    Bridge, ClientBoundMessage, Config, DroneLink, DryRunLink, FfmpegCapture, FlightSession, Hub,
    NoDetector, ServerBoundMessage,
};
use tello::CommandChannel;
use tracing_subscriber::EnvFilter;

mod app;
mod ui;

/// Keep a face centered in a Tello's camera
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Track with a local camera and send no commands
    #[arg(long)]
    dummy: bool,

    /// Camera index used with --dummy
    #[arg(long)]
    camera: Option<u32>,

    /// Local UDP endpoint that receives drone responses
    #[arg(long)]
    local: Option<SocketAddr>,

    /// Drone command endpoint
    #[arg(long)]
    drone: Option<SocketAddr>,

    /// Video stream URL (derived from --drone when omitted)
    #[arg(long)]
    video_url: Option<String>,

    /// How long to wait for acknowledgements, in milliseconds
    #[arg(long)]
    ack_timeout_ms: Option<u64>,

    /// Initial climb after takeoff, in centimeters (0 to skip)
    #[arg(long)]
    climb: Option<u16>,

    /// Print events instead of drawing the dashboard
    #[arg(long)]
    non_interactive: bool,

    /// Where logs go while the dashboard owns the terminal
    #[arg(long, default_value = "facetrack.log")]
    log_file: PathBuf,
}

impl Args {
    fn apply(&self, mut config: Config) -> Config {
        config.dummy |= self.dummy;
        if let Some(camera) = self.camera {
            config.camera_index = camera;
        }
        if let Some(local) = self.local {
            config.local_addr = local;
        }
        if let Some(drone) = self.drone {
            config.drone_addr = drone;
        }
        if let Some(video_url) = &self.video_url {
            config.video_url = Some(video_url.clone());
        }
        if let Some(ack_timeout_ms) = self.ack_timeout_ms {
            config.ack_timeout = Duration::from_millis(ack_timeout_ms);
        }
        if let Some(climb) = self.climb {
            config.initial_climb_cm = climb;
        }
        config
    }
}

fn init_tracing(args: &Args) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("facetrack=info,facetrack_term=info,tello=info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if args.non_interactive {
        subscriber.with_writer(std::io::stderr).init();
    } else {
        let file = File::create(&args.log_file)
            .with_context(|| format!("failed to create {}", args.log_file.display()))?;
        subscriber.with_ansi(false).with_writer(Mutex::new(file)).init();
    }

    Ok(())
}

fn fly<L: DroneLink>(config: Config, bridge: Bridge, open: impl FnOnce() -> tello::Result<L>) {
    let mut session = FlightSession::new(config.clone(), bridge);

    let result = session
        .connect(open)
        .and_then(|_| {
            session.take_off(FfmpegCapture::open(
                config.capture_source(),
                config.frame_size,
            ))
        })
        .and_then(|_| session.run(&mut NoDetector));

    match result {
        Ok(()) => {}
        Err(facetrack::Error::Cancelled) => tracing::info!("flight cancelled on the ground"),
        Err(e) => tracing::error!(error = %e, "flight failed"),
    }

    if let Err(e) = session.end() {
        tracing::warn!(error = %e, "failed to end session");
    }

    session.observer().send(ServerBoundMessage::Shutdown);
}

fn print_events(bridge: Bridge) {
    loop {
        match bridge.recv() {
            ClientBoundMessage::Shutdown => break,
            ClientBoundMessage::UpdateTracking(update) if update.movements.is_empty() => {}
            message => println!("{:?}", message),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    let config = args.apply(Config::from_env());
    tracing::info!(?config, "starting");

    let mut hub = Hub::new();

    {
        let config = config.clone();
        hub.spawn_client("session", move |bridge| {
            if config.dummy {
                fly(config, bridge, || Ok(DryRunLink::new()));
            } else {
                let (local, drone, ack_timeout) =
                    (config.local_addr, config.drone_addr, config.ack_timeout);
                fly(config, bridge, move || {
                    CommandChannel::open(local, drone).map(|c| c.with_ack_timeout(ack_timeout))
                });
            }
        });
    }

    let non_interactive = args.non_interactive;
    hub.spawn_client("app", move |bridge| {
        if non_interactive {
            print_events(bridge);
        } else if let Err(e) = App::new(&config).run(bridge) {
            tracing::error!(error = %e, "dashboard failed");
        }
    });

    hub.run();

    Ok(())
}
