//! pairpad-server: document sync, presence and shared code execution for
//! collaborative editing rooms.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use pairpad_exec::{Interpreter, Toolchain};
use pairpad_server::{Gateway, ServerConfig, StaticRegistry};

#[derive(Parser, Debug)]
#[command(name = "pairpad-server", about = "Realtime backend for pairpad rooms")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "PAIRPAD_BIND", default_value = "127.0.0.1:1234")]
    bind: String,

    /// Only host these rooms (comma separated). All rooms if unset.
    #[arg(long = "room", env = "PAIRPAD_ROOMS", value_delimiter = ',')]
    rooms: Vec<String>,

    /// Seconds a room's execution session survives without viewers.
    #[arg(long, env = "PAIRPAD_IDLE_GRACE", default_value_t = 30)]
    idle_grace_secs: u64,

    /// Wall-clock limit per run, in seconds.
    #[arg(long, env = "PAIRPAD_RUN_TIMEOUT", default_value_t = 10)]
    run_timeout_secs: u64,

    /// Seconds before an unrefreshed presence state is dropped.
    #[arg(long, env = "PAIRPAD_PRESENCE_TIMEOUT", default_value_t = 30)]
    presence_timeout_secs: u64,

    /// Directory for per-room work dirs. System temp dir if unset.
    #[arg(long, env = "PAIRPAD_WORK_ROOT")]
    work_root: Option<PathBuf>,

    #[arg(long, env = "PAIRPAD_PYTHON", default_value = "python3")]
    python: String,

    #[arg(long, env = "PAIRPAD_NODE", default_value = "node")]
    node: String,

    /// TypeScript compiler used to emit main.js.
    #[arg(long, env = "PAIRPAD_TSC", default_value = "tsc")]
    tsc: String,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let mut config = ServerConfig::with_bind_addr(self.bind);
        config.hub.presence_timeout = Duration::from_secs(self.presence_timeout_secs);
        config.exec.idle_grace = Duration::from_secs(self.idle_grace_secs);
        config.exec.run_timeout = Duration::from_secs(self.run_timeout_secs);
        config.exec.work_root = self.work_root;

        let defaults = Toolchain::default();
        config.exec.toolchain = Toolchain {
            python: Interpreter {
                program: self.python,
                ..defaults.python
            },
            node: Interpreter {
                program: self.node,
                ..defaults.node
            },
            transpiler: Interpreter {
                program: self.tsc,
                ..defaults.transpiler
            },
            path: defaults.path,
        };
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let rooms = args.rooms.clone();
    let config = args.into_config();

    let gateway = if rooms.is_empty() {
        Gateway::new(config)
    } else {
        let registry = StaticRegistry::from_keys(&rooms)?;
        log::info!("Hosting {} room(s)", registry.len());
        Gateway::with_registry(config, registry)
    };

    tokio::select! {
        result = gateway.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, shutting down");
        }
    }

    gateway.shutdown().await;
    Ok(())
}
