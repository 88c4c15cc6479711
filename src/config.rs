//! Container and Server Configuration
//!
//! Format parameters are fixed for the life of a container. Server settings come from the
//! environment (and an optional `.env` file), and the binaries let command line flags override
//! them.
use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use dotenv::dotenv;
use log::debug;

use crate::error::{OmniErrorKind, Result};

/// Default container size: 100 MiB
pub const DEFAULT_TOTAL_SIZE: u64 = 104_857_600;
/// Default header region size
pub const DEFAULT_HEADER_SIZE: u64 = 512;
/// Default block size: 4 KiB
pub const DEFAULT_BLOCK_SIZE: u64 = 4096;
/// Default number of user slots
pub const DEFAULT_MAX_USERS: u32 = 50;
/// Default number of trailing blocks reserved for the file table
pub const DEFAULT_FILE_TABLE_BLOCKS: u64 = 64;
/// Default listening port
pub const DEFAULT_PORT: u16 = 8080;

/// Parameters used when formatting a new container
#[derive(Clone, Debug, PartialEq)]
pub struct FormatOptions {
    /// Requested size of the container, in bytes
    pub total_size: u64,
    /// Bytes reserved for the superblock at offset 0
    pub header_size: u64,
    /// Size of a content block
    pub block_size: u64,
    /// Number of user slots
    pub max_users: u32,
    /// How many blocks at the end of the block region hold the file table
    pub file_table_blocks: u64,
    /// Free-form volume label, truncated to 31 bytes
    pub label: String,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            total_size: DEFAULT_TOTAL_SIZE,
            header_size: DEFAULT_HEADER_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            max_users: DEFAULT_MAX_USERS,
            file_table_blocks: DEFAULT_FILE_TABLE_BLOCKS,
            label: "omnifs".to_string(),
        }
    }
}

/// Where the server finds its container, and where it listens
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    /// Path to the container file
    pub container_path: PathBuf,
    /// Address the listener binds to
    pub bind: SocketAddr,
}

impl ServerConfig {
    /// Build a config by hand
    pub fn new<P: Into<PathBuf>>(container_path: P, bind: SocketAddr) -> Self {
        ServerConfig {
            container_path: container_path.into(),
            bind,
        }
    }

    /// Read the configuration from the environment
    ///
    /// * `OMNI_PATH` -- the container file (required)
    /// * `OMNI_PORT` -- listening port, defaults to 8080
    /// * `OMNI_ADDR` -- listening address, defaults to 0.0.0.0
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let container_path = match env::var("OMNI_PATH") {
            Ok(path) => PathBuf::from(path),
            Err(_) => return Err(OmniErrorKind::InvalidConfig.into()),
        };

        let port = match env::var("OMNI_PORT") {
            Ok(port) => port
                .parse::<u16>()
                .map_err(|_| OmniErrorKind::InvalidConfig)?,
            Err(_) => DEFAULT_PORT,
        };

        let addr = match env::var("OMNI_ADDR") {
            Ok(addr) => addr
                .parse::<IpAddr>()
                .map_err(|_| OmniErrorKind::InvalidConfig)?,
            Err(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let config = ServerConfig::new(container_path, SocketAddr::new(addr, port));
        debug!("server config from environment: {:?}", config);
        Ok(config)
    }
}
