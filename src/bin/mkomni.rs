use std::path::PathBuf;

use failure::Error;
use log::debug;
use pretty_env_logger;
use structopt::StructOpt;

use omnifs::{FormatOptions, OmniFileSystem, DEFAULT_HEADER_SIZE};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "mkomni",
    about = "create an omnifs container",
    global_settings(&[structopt::clap::AppSettings::ColoredHelp])
)]
struct Opt {
    /// Container file
    #[structopt(parse(from_os_str))]
    path: PathBuf,
    /// Container size, in bytes
    #[structopt(short = "s", long = "size", default_value = "104857600")]
    size: u64,
    /// Block size
    #[structopt(short = "b", long = "block-size", default_value = "4096")]
    block_size: u64,
    /// Number of user slots
    #[structopt(short = "u", long = "max-users", default_value = "50")]
    max_users: u32,
    /// Blocks reserved for the file table
    #[structopt(short = "t", long = "table-blocks", default_value = "64")]
    table_blocks: u64,
    /// Volume label
    #[structopt(short = "l", long = "label", default_value = "omnifs")]
    label: String,
}

fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    debug!("running with options {:?}", opt);

    let opts = FormatOptions {
        total_size: opt.size,
        header_size: DEFAULT_HEADER_SIZE,
        block_size: opt.block_size,
        max_users: opt.max_users,
        file_table_blocks: opt.table_blocks,
        label: opt.label,
    };

    match OmniFileSystem::format(&opt.path, &opts) {
        Ok(()) => {
            let fs = OmniFileSystem::mount(&opt.path)?;
            let stat = fs.stat();
            println!(
                "Created omnifs container at {:?}: {} blocks of {} bytes ({} free), {} user slots.",
                opt.path, stat.block_count, stat.block_size, stat.free_blocks, stat.max_users
            );
            fs.unmount()?;
            Ok(())
        }
        Err(e) => {
            println!("Problem creating container at {:?}.", opt.path);
            Err(e.into())
        }
    }
}
