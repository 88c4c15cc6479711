use std::path::PathBuf;

use log::debug;
use pretty_env_logger;
use structopt::StructOpt;

use omnifs::OmniFileSystem;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "omni-inspect",
    about = "describe an omnifs container",
    global_settings(&[structopt::clap::AppSettings::ColoredHelp])
)]
struct Opt {
    /// Container file
    #[structopt(parse(from_os_str))]
    path: PathBuf,
}

fn main() -> Result<(), failure::Error> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    debug!("running with options {:?}", opt);

    let fs = OmniFileSystem::mount(&opt.path)?;
    let sb = fs.superblock();
    let stat = fs.stat();

    println!("container:       {:?}", opt.path);
    println!("label:           {}", sb.label());
    println!(
        "version:         {}.{}",
        sb.version() >> 16,
        sb.version() & 0xffff
    );
    println!("formatted:       {} ({})", sb.format_date(), sb.format_time());
    println!("total size:      {}", sb.total_size());
    println!("header size:     {}", sb.header_size());
    println!("block size:      {}", sb.block_size());
    println!(
        "user table:      0x{:x}, {} slots",
        sb.user_table_offset(),
        sb.max_users()
    );
    println!(
        "file table:      0x{:x} .. 0x{:x}",
        sb.file_state_storage_offset(),
        sb.change_log_offset()
    );
    let digest = sb
        .layout_digest()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    println!("layout digest:   {}", digest);
    println!();
    println!(
        "blocks:          {} total, {} free, {} reserved",
        stat.block_count, stat.free_blocks, stat.reserved_blocks
    );
    println!(
        "users:           {} of {}",
        stat.active_users, stat.max_users
    );
    println!("entries:         {}", stat.entries);

    fs.unmount()?;
    Ok(())
}
