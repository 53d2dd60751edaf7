//! skymount - mount cloud storage as a local filesystem.
//!
//! Parses the mount flags, wires the selected backend into the engine,
//! mounts through FUSE, and relays signals: SIGINT/SIGTERM unmount,
//! SIGHUP logs engine statistics, SIGUSR1 forces a refresh.

mod driver;

use std::{
    path::PathBuf,
    process::Stdio,
    sync::Arc,
};

use anyhow::Context;
use clap::Parser;
use fuser::MountOption;
use skymount_core::config::{parse_refresh_interval, MountConfig};
use skymount_fuse::{CloudFs, FsState};
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Set on the re-executed child so it does not detach again.
const DAEMON_ENV: &str = "SKYMOUNT_DAEMONIZED";

/// Mount cloud storage (Google Drive) as a local filesystem.
#[derive(Debug, Parser)]
#[command(name = "skymount", version, about)]
struct Cli {
    /// Which cloud service to use
    #[arg(short = 't', long = "type", value_name = "TYPE", default_value = "gdrive")]
    backend: String,

    /// Run in background
    #[arg(short = 'd')]
    daemonize: bool,

    /// Verbose log (repeat for more)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Work dir, path that holds credential files
    #[arg(short = 'w', value_name = "DIR")]
    workdir: Option<PathBuf>,

    /// Change-poll interval (e.g. 30s, 5m)
    #[arg(short = 'r', value_name = "DURATION")]
    refresh: Option<String>,

    /// Mount options: uid=<n>,gid=<n>,ro
    #[arg(short = 'o', value_name = "OPTS")]
    options: Option<String>,

    /// [SOURCE] MOUNTPOINT
    #[arg(value_name = "PATH", num_args = 1..=2, required = true)]
    paths: Vec<PathBuf>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<MountConfig> {
        let (source, mountpoint) = match self.paths.as_slice() {
            [mountpoint] => (None, mountpoint.clone()),
            [source, mountpoint] => (Some(source.clone()), mountpoint.clone()),
            _ => unreachable!("clap enforces 1..=2 positionals"),
        };

        let mut config = MountConfig::new(self.backend, mountpoint);
        if let Some(workdir) = self.workdir {
            config.workdir = workdir;
        }
        config.source = source.unwrap_or_else(|| config.default_source());
        if let Some(refresh) = &self.refresh {
            config.refresh_interval = parse_refresh_interval(refresh)?;
        }
        if let Some(options) = &self.options {
            config.apply_mount_options(options)?;
        }
        config.verbose = self.verbose;
        config.daemonize = self.daemonize;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;
    init_logging(config.verbose);

    if config.daemonize && std::env::var_os(DAEMON_ENV).is_none() {
        return detach();
    }
    run(config)
}

fn run(config: MountConfig) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let backend = driver::new_backend(&config)?;

    let fs = CloudFs::new(rt.handle().clone(), backend, &config);
    let state = fs.state();
    fs.start();

    let session = fuser::spawn_mount2(fs, &config.mountpoint, &mount_options(&config))
        .with_context(|| format!("failed to mount at {}", config.mountpoint.display()))?;

    info!(
        mountpoint = %config.mountpoint.display(),
        backend = %config.backend,
        refresh = ?config.refresh_interval,
        "filesystem mounted"
    );

    rt.block_on(relay_signals(&state))?;

    state.shutdown();
    drop(session); // Unmounts.
    info!("unmounted cleanly");
    Ok(())
}

/// Block until a terminating signal arrives, servicing the informational
/// ones on the way.
async fn relay_signals(state: &Arc<FsState>) -> anyhow::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut user1 = signal(SignalKind::user_defined1())?;

    loop {
        tokio::select! {
            _ = interrupt.recv() => {
                info!("interrupt received, unmounting");
                return Ok(());
            }
            _ = terminate.recv() => {
                info!("termination requested, unmounting");
                return Ok(());
            }
            _ = hangup.recv() => {
                info!(
                    entries = state.entry_count(),
                    handles = state.handle_count(),
                    "engine statistics"
                );
            }
            _ = user1.recv() => {
                info!("immediate refresh requested");
                state.request_refresh();
            }
        }
    }
}

fn mount_options(config: &MountConfig) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::FSName(config.source.display().to_string()),
        MountOption::Subtype("skymount".to_string()),
        MountOption::AutoUnmount,
    ];
    if config.read_only {
        options.push(MountOption::RO);
    }
    options
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Re-execute detached from the terminal; the parent exits immediately.
fn detach() -> anyhow::Result<()> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe().context("cannot locate own executable")?;
    let mut command = std::process::Command::new(exe);
    command
        .args(std::env::args_os().skip(1))
        .env(DAEMON_ENV, "1")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    // Detach from the controlling terminal before exec.
    unsafe {
        command.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }
    let child = command.spawn().context("failed to re-execute in background")?;
    println!("skymount running in background (pid {})", child.id());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn parse(args: &[&str]) -> MountConfig {
        Cli::try_parse_from(args.iter().copied())
            .unwrap()
            .into_config()
            .unwrap()
    }

    #[test]
    fn single_positional_is_the_mountpoint() {
        let config = parse(&["skymount", "/mnt/drive"]);
        assert_eq!(config.mountpoint, PathBuf::from("/mnt/drive"));
        assert_eq!(config.backend, "gdrive");
        assert!(config.source.ends_with("gdrive.yaml"));
    }

    #[test]
    fn two_positionals_set_source_and_mountpoint() {
        let config = parse(&["skymount", "/etc/creds.json", "/mnt/drive"]);
        assert_eq!(config.source, PathBuf::from("/etc/creds.json"));
        assert_eq!(config.mountpoint, PathBuf::from("/mnt/drive"));
    }

    #[test]
    fn workdir_drives_the_default_source() {
        let config = parse(&["skymount", "-w", "/var/lib/sky", "-t", "gdrive", "/mnt/d"]);
        assert_eq!(config.source, PathBuf::from("/var/lib/sky/gdrive.yaml"));
    }

    #[test]
    fn mount_options_and_interval_are_honored() {
        let config = parse(&[
            "skymount", "-r", "2m", "-o", "uid=1000,gid=100,ro", "/mnt/d",
        ]);
        assert_eq!(config.refresh_interval, Duration::from_secs(120));
        assert_eq!(config.uid, 1000);
        assert_eq!(config.gid, 100);
        assert!(config.read_only);
    }

    #[test]
    fn missing_mountpoint_is_an_error() {
        assert!(Cli::try_parse_from(["skymount"]).is_err());
    }

    #[test]
    fn verbosity_accumulates() {
        let config = parse(&["skymount", "-v", "-v", "/mnt/d"]);
        assert_eq!(config.verbose, 2);
    }

    #[test]
    fn read_only_mounts_pass_the_ro_option() {
        let config = parse(&["skymount", "-o", "ro", "/mnt/d"]);
        assert!(mount_options(&config)
            .iter()
            .any(|o| matches!(o, MountOption::RO)));
    }
}
