//! Command line surface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::error::{SyncError, SyncResult};
use crate::remote::ssh::{SshAuth, SshConfig};

/// Internal test targets; never downloadable
pub const IGNORED_IDENTIFIERS: [&str; 2] = ["testbed", "playground3d"];

#[derive(Parser, Debug)]
#[command(name = "demosync")]
#[command(about = "Reconcile the demo catalog and sync assets to the remote store")]
pub struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile, transfer missing assets and write the catalog
    Sync(SyncArgs),
    /// Reconcile and write the catalog of assets already on the remote store
    Catalog(CatalogArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Asset identifiers (folder, id, short id or download URL); all syncable assets when empty
    pub ids: Vec<String>,

    #[arg(long, default_value = "games")]
    pub download_dir: PathBuf,

    #[arg(long, default_value = "games.json")]
    pub output: PathBuf,

    /// New transfers allowed in this run
    #[arg(long)]
    pub max_transfers: Option<usize>,

    #[arg(long, default_value = "assets/metadata.json")]
    pub metadata: PathBuf,

    #[arg(long, default_value = "assets/blacklist.json")]
    pub denylist: PathBuf,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

#[derive(Args, Debug, Clone)]
pub struct CatalogArgs {
    #[arg(long, default_value = "games.json")]
    pub output: PathBuf,

    #[arg(long, default_value = "assets/metadata.json")]
    pub metadata: PathBuf,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RemoteArgs {
    /// `user@host`; defaults to `$SSH_USER@$SSH_HOST`
    #[arg(long)]
    pub scp_server: Option<String>,

    /// Remote base directory; defaults to `$SSH_PATH`
    #[arg(long)]
    pub scp_path: Option<String>,

    /// Defaults to `$SSH_PORT`
    #[arg(long)]
    pub scp_port: Option<u16>,

    /// Use a local directory as the store instead of ssh
    #[arg(long, conflicts_with_all = ["scp_server", "scp_path", "scp_port"])]
    pub local_store: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum RemoteTarget {
    Ssh(SshConfig),
    Local(PathBuf),
}

impl RemoteArgs {
    pub fn resolve(&self) -> SyncResult<RemoteTarget> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve against an environment lookup
    pub fn resolve_with(&self, env: impl Fn(&str) -> Option<String>) -> SyncResult<RemoteTarget> {
        if let Some(dir) = &self.local_store {
            return Ok(RemoteTarget::Local(dir.clone()));
        }
        let env = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let server = match &self.scp_server {
            Some(server) => server.clone(),
            None => match (env("SSH_USER"), env("SSH_HOST")) {
                (Some(user), Some(host)) => format!("{}@{}", user, host),
                (None, Some(host)) => host,
                _ => {
                    return Err(SyncError::config(
                        "No remote server: pass --scp-server or set SSH_USER and SSH_HOST",
                    ))
                }
            },
        };

        let base_path = self
            .scp_path
            .clone()
            .or_else(|| env("SSH_PATH"))
            .ok_or_else(|| SyncError::config("No remote path: pass --scp-path or set SSH_PATH"))?;

        let port = match self.scp_port {
            Some(port) => Some(port),
            None => env("SSH_PORT")
                .map(|raw| {
                    raw.parse::<u16>()
                        .map_err(|_| SyncError::config(format!("Invalid SSH_PORT '{}'", raw)))
                })
                .transpose()?,
        };

        let auth = match (env("SSH_KEY_PATH"), env("SSH_PASSWORD")) {
            (Some(key), _) => SshAuth::KeyFile(PathBuf::from(key)),
            (None, Some(password)) => SshAuth::Password(password),
            (None, None) => SshAuth::Agent,
        };

        Ok(RemoteTarget::Ssh(SshConfig {
            server,
            base_path,
            port,
            auth,
        }))
    }
}

/// Operator identifiers with internal test targets and blanks removed
pub fn requested_ids(ids: &[String]) -> Vec<String> {
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && !IGNORED_IDENTIFIERS.contains(id))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_sync_defaults() {
        let cli = Cli::try_parse_from(["demosync", "sync", "scumm:ft", "demo1"]).unwrap();
        let Command::Sync(args) = cli.cmd else {
            panic!("expected sync");
        };
        assert_eq!(args.ids, vec!["scumm:ft", "demo1"]);
        assert_eq!(args.download_dir, PathBuf::from("games"));
        assert_eq!(args.output, PathBuf::from("games.json"));
        assert_eq!(args.metadata, PathBuf::from("assets/metadata.json"));
        assert_eq!(args.denylist, PathBuf::from("assets/blacklist.json"));
        assert_eq!(args.max_transfers, None);
    }

    #[test]
    fn test_parse_catalog_with_remote() {
        let cli = Cli::try_parse_from([
            "demosync",
            "--verbose",
            "catalog",
            "--scp-server",
            "me@host",
            "--scp-path",
            "/srv/demos",
            "--scp-port",
            "2200",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::Catalog(args) = cli.cmd else {
            panic!("expected catalog");
        };
        let RemoteTarget::Ssh(config) = args.remote.resolve_with(env(&[])).unwrap() else {
            panic!("expected ssh");
        };
        assert_eq!(config.server, "me@host");
        assert_eq!(config.port, Some(2200));
        assert_eq!(config.auth, SshAuth::Agent);
    }

    #[test]
    fn test_remote_from_environment() {
        let args = RemoteArgs::default();
        let target = args
            .resolve_with(env(&[
                ("SSH_USER", "deploy"),
                ("SSH_HOST", "files.example.org"),
                ("SSH_PATH", "/srv/demos"),
                ("SSH_PORT", "22"),
                ("SSH_PASSWORD", "hunter2"),
            ]))
            .unwrap();
        let RemoteTarget::Ssh(config) = target else {
            panic!("expected ssh");
        };
        assert_eq!(config.server, "deploy@files.example.org");
        assert_eq!(config.base_path, "/srv/demos");
        assert_eq!(config.port, Some(22));
        assert_eq!(config.auth, SshAuth::Password("hunter2".into()));
    }

    #[test]
    fn test_missing_remote_is_config_error() {
        let err = RemoteArgs::default().resolve_with(env(&[])).unwrap_err();
        assert_eq!(err.code, ErrorCode::Config);

        let err = RemoteArgs::default()
            .resolve_with(env(&[("SSH_HOST", "h"), ("SSH_PATH", "/p"), ("SSH_PORT", "abc")]))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Config);
    }

    #[test]
    fn test_requested_ids_drop_test_targets() {
        let ids = vec![
            "testbed".to_string(),
            " demo1 ".to_string(),
            "".to_string(),
            "playground3d".to_string(),
        ];
        assert_eq!(requested_ids(&ids), vec!["demo1"]);
    }
}
