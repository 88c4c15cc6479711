//! OMNIFS Request Server
//!
//! Serves one container over newline delimited JSON and HTTP, on the same port.
//!
//! Configuration comes from the environment (or `.env`):
//!
//! * `OMNI_PATH` -- the container file
//! * `OMNI_PORT` -- port, 8080 by default
//! * `OMNI_ADDR` -- address, 0.0.0.0 by default
//!
//! Flags override the environment.
//!
//! Ctrl-C (or SIGTERM) stops the server: whatever is queued is answered, then the container is
//! unmounted.
use std::{net::SocketAddr, path::PathBuf};

use failure::{format_err, Error};
use log::{debug, error, info};
use pretty_env_logger;
use structopt::StructOpt;

use omnifs::{OmniFileSystem, OmniServer, ServerConfig, DEFAULT_PORT};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "omni-server",
    about = "serve an omnifs container",
    global_settings(&[structopt::clap::AppSettings::ColoredHelp])
)]
struct Opt {
    /// Container file, instead of OMNI_PATH
    #[structopt(short = "c", long = "container", parse(from_os_str))]
    container: Option<PathBuf>,
    /// Listening port, instead of OMNI_PORT
    #[structopt(short = "p", long = "port")]
    port: Option<u16>,
}

fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    debug!("running with options {:?}", opt);

    let mut config = match (ServerConfig::from_env(), &opt.container) {
        (Ok(config), _) => config,
        (Err(_), Some(path)) => ServerConfig::new(
            path.clone(),
            SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
        ),
        (Err(e), None) => {
            error!("OMNI_PATH must name the container file, or pass --container");
            return Err(e.into());
        }
    };
    if let Some(path) = opt.container {
        config.container_path = path;
    }
    if let Some(port) = opt.port {
        config.bind.set_port(port);
    }

    let fs = OmniFileSystem::mount(&config.container_path)?;
    info!("serving {:?} on {}", config.container_path, config.bind);

    let handle = OmniServer::new(fs, config).start()?;
    let stopper = handle.stopper();
    ctrlc::set_handler(move || {
        info!("stop requested");
        stopper.stop();
    })?;
    println!(
        "omni-server listening on {} (ctrl-c to stop)",
        handle.local_addr()
    );

    handle
        .wait()
        .map_err(|e| format_err!("final unmount failed: {}", e))
}
