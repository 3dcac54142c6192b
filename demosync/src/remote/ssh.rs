//! Remote store reached over `ssh`/`scp`
//!
//! One ControlMaster connection is opened per run; every later command
//! multiplexes over its socket.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{RemoteError, RemoteNode, RemoteResult, RemoteStore};
use crate::logger;

/// Listing and existence checks
const CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Recursive walks of the whole store
const WALK_TIMEOUT: Duration = Duration::from_secs(300);

const CONTROL_PATH: &str = "/tmp/demosync-ssh-%r@%h:%p";

/// stderr fragments that mean the transport itself failed
const CONNECTION_PATTERNS: [&str; 6] = [
    "connection refused",
    "no route to host",
    "connection timed out",
    "permission denied",
    "authentication failed",
    "could not resolve hostname",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshAuth {
    /// Whatever the ssh agent or default identity provides
    Agent,
    KeyFile(PathBuf),
    /// Passed through `sshpass -e`
    Password(String),
}

#[derive(Debug, Clone)]
pub struct SshConfig {
    /// `user@host`
    pub server: String,
    pub base_path: String,
    pub port: Option<u16>,
    pub auth: SshAuth,
}

struct CommandOutput {
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

pub struct SshStore {
    config: SshConfig,
}

impl SshStore {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn remote_path(&self, name: &str) -> String {
        let base = self.config.base_path.trim_end_matches('/');
        if name.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, name)
        }
    }

    /// Options shared by ssh and scp
    fn common_options(&self) -> Vec<String> {
        let mut options = vec![
            "-o".to_string(),
            format!("ControlPath={}", CONTROL_PATH),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
        ];
        match &self.config.auth {
            SshAuth::Password(_) => {}
            SshAuth::KeyFile(path) => {
                options.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
                options.extend(["-i".to_string(), path.display().to_string()]);
            }
            SshAuth::Agent => {
                options.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
            }
        }
        options
    }

    /// `ssh` or `sshpass -e ssh`, depending on auth
    fn base_command(&self, program: &str) -> Command {
        let mut cmd = match &self.config.auth {
            SshAuth::Password(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg(program).env("SSHPASS", password);
                cmd
            }
            _ => Command::new(program),
        };
        cmd.kill_on_drop(true);
        cmd
    }

    fn ssh_args(&self, extra: &[&str], remote_command: Option<&str>) -> Vec<String> {
        let mut args = self.common_options();
        if let Some(port) = self.config.port {
            args.extend(["-p".to_string(), port.to_string()]);
        }
        args.extend(extra.iter().map(|s| s.to_string()));
        args.push(self.config.server.clone());
        if let Some(command) = remote_command {
            args.push(command.to_string());
        }
        args
    }

    fn scp_args(&self, local: &Path, remote: &str) -> Vec<String> {
        let mut args = self.common_options();
        if let Some(port) = self.config.port {
            args.extend(["-P".to_string(), port.to_string()]);
        }
        args.push("-r".to_string());
        args.push(local.display().to_string());
        args.push(format!("{}:{}", self.config.server, remote));
        args
    }

    async fn exec(
        &self,
        mut cmd: Command,
        stdin: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> RemoteResult<CommandOutput> {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() });

        let mut child = cmd.spawn()?;
        if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(bytes).await?;
            pipe.shutdown().await?;
        }

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| RemoteError::Timeout(limit.as_secs()))??,
            None => child.wait_with_output().await?,
        };

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn ssh(
        &self,
        remote_command: &str,
        stdin: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> RemoteResult<CommandOutput> {
        crate::log_debug!(&format!("ssh {}: {}", self.config.server, remote_command), "ssh");
        let mut cmd = self.base_command("ssh");
        cmd.args(self.ssh_args(&[], Some(remote_command)));
        self.exec(cmd, stdin, timeout).await
    }

    /// Remote `find` for every non-hidden node, and its time limit
    fn walk_command(&self) -> (String, Duration) {
        let command = format!(
            "find {} -mindepth 1 -name '.*' -prune -o -printf '%y\\t%s\\t%T@\\t%P\\n'",
            shell_quote(&self.remote_path(""))
        );
        (command, WALK_TIMEOUT)
    }

    /// Run a command that must succeed
    async fn ssh_ok(&self, remote_command: &str, timeout: Option<Duration>) -> RemoteResult<String> {
        let output = self.ssh(remote_command, None, timeout).await?;
        match output.code {
            Some(0) => Ok(output.stdout),
            code => Err(classify(code, &output.stderr)),
        }
    }
}

/// Map a failed command to an error kind
pub fn classify(code: Option<i32>, stderr: &str) -> RemoteError {
    let lower = stderr.to_lowercase();
    let connection_message = CONNECTION_PATTERNS.iter().any(|p| lower.contains(p));
    match code {
        Some(255) if connection_message || stderr.is_empty() => {
            RemoteError::Connection(if stderr.is_empty() {
                "ssh exited with status 255".to_string()
            } else {
                stderr.to_string()
            })
        }
        Some(code) => RemoteError::CommandFailed {
            code,
            stderr: stderr.to_string(),
        },
        None => RemoteError::Connection(format!("ssh terminated by signal: {}", stderr)),
    }
}

/// Single-quote a string for the remote shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Parse `find -printf '%y\t%s\t%T@\t%P\n'` output; symlinks are dropped
fn parse_walk(output: &str) -> Vec<RemoteNode> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(4, '\t');
            let kind = fields.next()?;
            let size = fields.next()?.parse::<u64>().ok()?;
            let mtime = fields.next()?.parse::<f64>().ok()?;
            let path = fields.next()?;
            if path.is_empty() {
                return None;
            }
            let is_dir = match kind {
                "d" => true,
                "f" => false,
                _ => return None,
            };
            Some(RemoteNode {
                path: path.to_string(),
                is_dir,
                size: if is_dir { 0 } else { size },
                mtime,
            })
        })
        .collect()
}

#[async_trait]
impl RemoteStore for SshStore {
    async fn open_session(&self) -> RemoteResult<()> {
        logger::log_info(
            &format!("Opening control connection to {}", self.config.server),
            Some("ssh"),
        );
        let mut cmd = self.base_command("ssh");
        cmd.args(self.ssh_args(
            &["-MNf", "-o", "ControlMaster=auto", "-o", "ControlPersist=600"],
            None,
        ));
        // The backgrounded master keeps any pipe open, so only the status is read
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        let status = tokio::time::timeout(CHECK_TIMEOUT, cmd.status())
            .await
            .map_err(|_| RemoteError::Timeout(CHECK_TIMEOUT.as_secs()))??;
        if status.success() {
            Ok(())
        } else {
            Err(RemoteError::Connection(format!(
                "could not open control connection to {} ({})",
                self.config.server, status
            )))
        }
    }

    async fn close_session(&self) -> RemoteResult<()> {
        let mut cmd = self.base_command("ssh");
        cmd.args(self.ssh_args(&["-O", "exit"], None));
        let output = self.exec(cmd, None, Some(CHECK_TIMEOUT)).await?;
        if output.code != Some(0) {
            crate::log_debug!(
                &format!("Control connection close reported: {}", output.stderr),
                "ssh"
            );
        }
        Ok(())
    }

    async fn list_dirs(&self) -> RemoteResult<BTreeSet<String>> {
        let command = format!(
            "find {} -mindepth 1 -maxdepth 1 -type d -printf '%f\\n'",
            shell_quote(&self.remote_path(""))
        );
        let stdout = self.ssh_ok(&command, Some(CHECK_TIMEOUT)).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn dir_exists(&self, name: &str) -> RemoteResult<bool> {
        let command = format!("test -d {}", shell_quote(&self.remote_path(name)));
        let output = self.ssh(&command, None, Some(CHECK_TIMEOUT)).await?;
        match output.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            code => Err(classify(code, &output.stderr)),
        }
    }

    async fn upload_dir(&self, local: &Path, name: &str) -> RemoteResult<()> {
        let remote = self.remote_path(name);
        logger::log_info(
            &format!("Uploading {:?} to {}:{}", local, self.config.server, remote),
            Some("ssh"),
        );
        let mut cmd = self.base_command("scp");
        cmd.args(self.scp_args(local, &remote));
        let output = self.exec(cmd, None, None).await?;
        match output.code {
            Some(0) => Ok(()),
            code => Err(classify(code, &output.stderr)),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> RemoteResult<()> {
        let command = format!(
            "mv -T {} {}",
            shell_quote(&self.remote_path(from)),
            shell_quote(&self.remote_path(to))
        );
        self.ssh_ok(&command, Some(CHECK_TIMEOUT)).await.map(|_| ())
    }

    async fn remove(&self, name: &str) -> RemoteResult<()> {
        let command = format!("rm -rf {}", shell_quote(&self.remote_path(name)));
        self.ssh_ok(&command, Some(CHECK_TIMEOUT)).await.map(|_| ())
    }

    async fn walk(&self) -> RemoteResult<Vec<RemoteNode>> {
        let (command, timeout) = self.walk_command();
        let stdout = self.ssh_ok(&command, Some(timeout)).await?;
        Ok(parse_walk(&stdout))
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> RemoteResult<()> {
        let command = format!("cat > {}", shell_quote(&self.remote_path(path)));
        let output = self.ssh(&command, Some(contents), Some(CHECK_TIMEOUT)).await?;
        match output.code {
            Some(0) => Ok(()),
            code => Err(classify(code, &output.stderr)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(auth: SshAuth) -> SshStore {
        SshStore::new(SshConfig {
            server: "deploy@files.example.org".into(),
            base_path: "/srv/demos/".into(),
            port: Some(2222),
            auth,
        })
    }

    #[test]
    fn test_classify_connection_errors() {
        let err = classify(Some(255), "ssh: connect to host x port 22: Connection refused");
        assert!(err.is_connection_level());
        let err = classify(Some(255), "");
        assert!(err.is_connection_level());
        // A remote command that itself exits 255
        let err = classify(Some(255), "custom failure");
        assert!(!err.is_connection_level());
        let err = classify(Some(1), "mv: cannot stat 'a': No such file or directory");
        assert!(matches!(err, RemoteError::CommandFailed { code: 1, .. }));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_parse_walk() {
        let output = "d\t4096\t1700000000.5\tdemo1\n\
                      f\t12\t1700000001.0\tdemo1/readme.txt\n\
                      l\t7\t1700000001.0\tdemo1/link\n\
                      garbage line\n";
        let nodes = parse_walk(output);
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].is_dir);
        assert_eq!(nodes[0].size, 0);
        assert_eq!(nodes[1].path, "demo1/readme.txt");
        assert_eq!(nodes[1].size, 12);
    }

    #[test]
    fn test_ssh_args_with_key() {
        let store = store(SshAuth::KeyFile(PathBuf::from("/keys/id")));
        let args = store.ssh_args(&[], Some("true"));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.windows(2).any(|w| w == ["-i", "/keys/id"]));
        assert!(args.windows(2).any(|w| w == ["-p", "2222"]));
        assert_eq!(args[args.len() - 2], "deploy@files.example.org");
        assert_eq!(args[args.len() - 1], "true");
        assert_eq!(store.remote_path("demo1"), "/srv/demos/demo1");
    }

    #[test]
    fn test_walk_is_bounded() {
        let store = store(SshAuth::Agent);
        let (command, timeout) = store.walk_command();
        assert!(command.starts_with("find '/srv/demos' "));
        assert!(command.contains("-prune"));
        assert_eq!(timeout, WALK_TIMEOUT);
        assert!(timeout > CHECK_TIMEOUT);
    }

    #[test]
    fn test_scp_args_use_capital_port() {
        let store = store(SshAuth::Password("secret".into()));
        let args = store.scp_args(Path::new("/tmp/demo1"), "/srv/demos/demo1.uploading");
        assert!(args.windows(2).any(|w| w == ["-P", "2222"]));
        assert!(!args.contains(&"BatchMode=yes".to_string()));
        assert_eq!(
            args.last().unwrap(),
            "deploy@files.example.org:/srv/demos/demo1.uploading"
        );
    }
}
