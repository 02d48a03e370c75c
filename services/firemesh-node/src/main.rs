use anyhow::{bail, Context, Result};
use firemesh_base::{backend, BaseStationReceiver, TerminalAnnunciator};
use firemesh_core::{logging, Config, NodeRole};
use firemesh_mesh::{
    CleanupScheduler, FileSensorSource, HeuristicRiskModel, LogIndicator, MeshNode, MessageCache,
    Payload, RelayRole, SentryRole, SentrySettings, TcpUplink, UdpBroadcast,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Debug)]
struct Args {
    config: PathBuf,
    hello: bool,
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let args = parse_args(&args)?;

    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if args.json_logs {
        logging::init_json(&config.logging.level);
    } else {
        logging::init_from_config(&config.logging);
    }

    info!(
        node = %config.node.id,
        role = ?config.node.role,
        version = env!("CARGO_PKG_VERSION"),
        "Starting firemesh node"
    );

    let result = match config.node.role {
        NodeRole::Sentry => run_sentry(&config, args.hello).await,
        NodeRole::Relay => run_relay(&config, args.hello).await,
        NodeRole::Base => run_base(&config).await,
    };
    if let Err(e) = &result {
        error!(error = %e, "Node stopped");
    }
    result
}

fn mesh_node(config: &Config) -> Arc<MeshNode> {
    let cache = Arc::new(MessageCache::new());
    CleanupScheduler::new(
        Arc::clone(&cache),
        config.cleanup_interval(),
        config.seen_expiry(),
    )
    .spawn();
    Arc::new(MeshNode::from_config(config, cache))
}

fn broadcast_medium(config: &Config) -> Result<Arc<UdpBroadcast>> {
    let bind = config.broadcast_bind()?;
    let target = config.broadcast_target()?;
    let medium = UdpBroadcast::bind(bind, target, config.broadcast.max_datagram_bytes)
        .with_context(|| format!("binding broadcast socket {}", bind))?;
    info!(%bind, %target, "Broadcast medium ready");
    Ok(Arc::new(medium))
}

async fn run_sentry(config: &Config, hello: bool) -> Result<()> {
    let role = SentryRole::new(
        mesh_node(config),
        broadcast_medium(config)?,
        Arc::new(FileSensorSource::new(&config.sentry.sensor_path)),
        Arc::new(HeuristicRiskModel),
        Arc::new(LogIndicator),
        SentrySettings::from_config(config),
    );
    if hello {
        let text = format!("node {} online", config.node.id);
        role.originate(Payload::hello(text), None).await?;
    }
    role.run().await?;
    Ok(())
}

async fn run_relay(config: &Config, hello: bool) -> Result<()> {
    let destination = config.uplink_destination()?;
    let role = RelayRole::new(
        mesh_node(config),
        broadcast_medium(config)?,
        Arc::new(TcpUplink::new(destination, config.uplink_timeout())),
    );
    if hello {
        role.announce().await?;
    }
    role.run().await?;
    Ok(())
}

async fn run_base(config: &Config) -> Result<()> {
    let listen = config.base_listen()?;
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding uplink listener {}", listen))?;

    let receiver = Arc::new(BaseStationReceiver::from_config(
        config,
        backend::from_config(config),
        Arc::new(TerminalAnnunciator::default()),
    ));
    receiver.run(listener).await?;
    Ok(())
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut config = None;
    let mut hello = false;
    let mut json_logs = false;

    let mut args_iter = args.iter().skip(1);
    while let Some(arg) = args_iter.next() {
        match arg.as_str() {
            "--config" => match args_iter.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => bail!("--config was provided without a path"),
            },
            "--hello" => hello = true,
            "--json-logs" => json_logs = true,
            other => bail!("unrecognized argument {:?}", other),
        }
    }

    let Some(config) = config else {
        bail!("missing required --config <path> argument");
    };
    Ok(Args {
        config,
        hello,
        json_logs,
    })
}
