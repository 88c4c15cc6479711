use std::{
    io::{self, Write},
    path::PathBuf,
};

use {log::debug, pretty_env_logger, structopt::StructOpt};

use omnifs::{OmniFileSystem, UserRole};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "omni-useradd",
    about = "add a user to an omnifs container",
    global_settings(&[structopt::clap::AppSettings::ColoredHelp])
)]
struct Opt {
    /// Container file
    #[structopt(parse(from_os_str))]
    path: PathBuf,
    /// List existing users
    #[structopt(short = "l", long = "list")]
    list: bool,
    /// Make the new user an admin
    #[structopt(short = "a", long = "admin")]
    admin: bool,
    /// Admin to act as, once the container has users
    #[structopt(long = "as")]
    acting: Option<String>,
}

fn prompt(label: &str) -> io::Result<String> {
    io::stdout().write_all(label.as_bytes())?;
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn main() -> Result<(), failure::Error> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    debug!("running with options {:?}", opt);

    let mut fs = OmniFileSystem::mount(&opt.path)?;

    let session = if fs.stat().active_users == 0 {
        println!("Container has no users; creating the first one.");
        None
    } else {
        let admin = match opt.acting {
            Some(ref name) => name.clone(),
            None => prompt("admin user: ")?,
        };
        let password = rpassword::read_password_from_tty(Some("admin password: "))?;
        Some(fs.login(&admin, &password)?)
    };

    if opt.list {
        for user in fs.list_users(session.as_ref())? {
            println!(" - '{}' ({})", user.username, user.role);
        }
    } else {
        let user = prompt("new user: ")?;
        let password = rpassword::read_password_from_tty(Some("password: "))?;
        let password2 = rpassword::read_password_from_tty(Some("confirm password: "))?;
        if password != password2 {
            return Err(failure::format_err!("Passwords do not match."));
        }

        let role = if opt.admin || session.is_none() {
            UserRole::Admin
        } else {
            UserRole::Normal
        };
        let info = fs.create_user(session.as_ref(), &user, &password, role)?;
        println!("Created {} user '{}'.", info.role, info.username);
    }

    fs.unmount()?;
    Ok(())
}
