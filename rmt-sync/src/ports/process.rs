//! Port implementations that spawn external tools.
//!
//! Uses `tokio::process::Command` with explicit argument vectors, so no
//! local shell is involved. The one place a shell does get involved is the
//! command string `ssh` hands to the remote side; every path in it goes
//! through [`shell_path`].

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use rmt_types::{RemoteSpec, BASE_DIR_NAME};
use tokio::process::Command;

use super::{
    Comparison, DiffOracle, MergeOracle, MergeOutcome, RemoteExec, ToolError, Transfer,
    TransferError,
};

/// Default location of the diff/merge tool.
pub const DEFAULT_COMP: &str = "/usr/local/bin/comp";

/// Quote `s` as a single word for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r#"'"'"'"#))
}

/// Quote a remote path for a POSIX shell, leaving a leading `~` or `~/`
/// unquoted so the remote shell still expands it to the home directory.
pub fn shell_path(path: &str) -> String {
    if path == "~" {
        return "~".to_string();
    }
    match path.strip_prefix("~/") {
        Some("") => "~/".to_string(),
        Some(rest) => format!("~/{}", shell_quote(rest)),
        None => shell_quote(path),
    }
}

async fn run(program: &Path, args: &[OsString]) -> io::Result<Output> {
    tracing::debug!("exec {} {:?}", program.display(), args);
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn tool_name(program: &Path) -> String {
    program.display().to_string()
}

/// Local directory as an rsync source/destination (trailing slash).
fn dir_arg(path: &Path) -> OsString {
    let mut arg = path.as_os_str().to_owned();
    if !arg.to_string_lossy().ends_with('/') {
        arg.push("/");
    }
    arg
}

/// File names from `--out-format=%n` output, directories dropped.
fn transferred_files(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with('/'))
        .map(str::to_string)
        .collect()
}

/// [`Transfer`] over `rsync`.
#[derive(Debug, Clone)]
pub struct Rsync {
    program: PathBuf,
}

impl Default for Rsync {
    fn default() -> Self {
        Self::new("rsync")
    }
}

impl Rsync {
    /// Use the given `rsync` binary.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn mirror_args(&self, src: OsString, dst: OsString, dry_run: bool) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-az".into(),
            "--protect-args".into(),
            format!("--exclude={}/", BASE_DIR_NAME).into(),
            "--out-format=%n".into(),
        ];
        if dry_run {
            args.push("--dry-run".into());
        }
        args.push(src);
        args.push(dst);
        args
    }

    async fn mirror(&self, args: Vec<OsString>, target: &str) -> Result<Vec<String>, TransferError> {
        let output = run(&self.program, &args)
            .await
            .map_err(|source| TransferError::Spawn {
                tool: tool_name(&self.program),
                source,
            })?;
        if !output.status.success() {
            return Err(TransferError::Failed {
                tool: tool_name(&self.program),
                target: target.to_string(),
                code: output.status.code(),
                stderr: stderr_of(&output),
            });
        }
        Ok(transferred_files(&output.stdout))
    }
}

#[async_trait]
impl Transfer for Rsync {
    async fn fetch_tree(
        &self,
        remote: &RemoteSpec,
        dest: &Path,
        dry_run: bool,
    ) -> Result<Vec<String>, TransferError> {
        let args = self.mirror_args(remote.tree_address().into(), dir_arg(dest), dry_run);
        self.mirror(args, &remote.to_string()).await
    }

    async fn publish_tree(
        &self,
        src: &Path,
        remote: &RemoteSpec,
        dry_run: bool,
    ) -> Result<Vec<String>, TransferError> {
        let args = self.mirror_args(dir_arg(src), remote.tree_address().into(), dry_run);
        self.mirror(args, &remote.to_string()).await
    }

    async fn push_file(
        &self,
        src: &Path,
        remote: &RemoteSpec,
        rel: &str,
    ) -> Result<(), TransferError> {
        let target = remote.address_of(rel);
        let args: Vec<OsString> = vec![
            "-az".into(),
            "--protect-args".into(),
            src.as_os_str().to_owned(),
            target.clone().into(),
        ];
        self.mirror(args, &target).await.map(|_| ())
    }
}

/// [`RemoteExec`] over `ssh`.
#[derive(Debug, Clone)]
pub struct Ssh {
    program: PathBuf,
    options: Vec<String>,
}

impl Default for Ssh {
    fn default() -> Self {
        Self::new("ssh")
    }
}

impl Ssh {
    /// Use the given `ssh` binary, non-interactively.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            options: vec!["-o".into(), "BatchMode=yes".into()],
        }
    }

    fn command_args(&self, remote: &RemoteSpec, command: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.options.iter().map(OsString::from).collect();
        args.push(remote.authority().into());
        args.push(command.into());
        args
    }

    async fn exec(&self, remote: &RemoteSpec, command: String) -> Result<(), TransferError> {
        let args = self.command_args(remote, &command);
        let output = run(&self.program, &args)
            .await
            .map_err(|source| TransferError::Spawn {
                tool: tool_name(&self.program),
                source,
            })?;
        if !output.status.success() {
            return Err(TransferError::Failed {
                tool: tool_name(&self.program),
                target: format!("{} ({})", remote.authority(), command),
                code: output.status.code(),
                stderr: stderr_of(&output),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteExec for Ssh {
    async fn create_dir_all(
        &self,
        remote: &RemoteSpec,
        rel_dir: &str,
    ) -> Result<(), TransferError> {
        let path = remote.remote_path(rel_dir);
        self.exec(remote, format!("mkdir -p -- {}", shell_path(&path)))
            .await
    }

    async fn remove_file(&self, remote: &RemoteSpec, rel: &str) -> Result<(), TransferError> {
        let path = remote.remote_path(rel);
        self.exec(remote, format!("rm -f -- {}", shell_path(&path)))
            .await
    }
}

/// [`DiffOracle`] and [`MergeOracle`] over the `comp` tool
/// (`comp diff a b`, `comp merge base ours theirs out`).
#[derive(Debug, Clone)]
pub struct Comp {
    program: PathBuf,
}

impl Default for Comp {
    fn default() -> Self {
        Self::new(DEFAULT_COMP)
    }
}

impl Comp {
    /// Use the given `comp` binary.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn invoke(&self, args: &[&OsStr]) -> Result<Output, ToolError> {
        let args: Vec<OsString> = args.iter().map(|a| a.to_os_string()).collect();
        run(&self.program, &args)
            .await
            .map_err(|source| ToolError::Spawn {
                tool: tool_name(&self.program),
                source,
            })
    }

    fn unexpected(&self, output: &Output) -> ToolError {
        ToolError::UnexpectedExit {
            tool: tool_name(&self.program),
            code: output.status.code(),
            stderr: stderr_of(output),
        }
    }
}

#[async_trait]
impl DiffOracle for Comp {
    async fn compare(&self, a: &Path, b: &Path) -> Result<Comparison, ToolError> {
        let output = self
            .invoke(&[OsStr::new("diff"), a.as_os_str(), b.as_os_str()])
            .await?;
        Comparison::from_exit_code(output.status.code()).ok_or_else(|| self.unexpected(&output))
    }
}

#[async_trait]
impl MergeOracle for Comp {
    async fn merge(
        &self,
        base: &Path,
        ours: &Path,
        theirs: &Path,
        out: &Path,
    ) -> Result<MergeOutcome, ToolError> {
        let output = self
            .invoke(&[
                OsStr::new("merge"),
                base.as_os_str(),
                ours.as_os_str(),
                theirs.as_os_str(),
                out.as_os_str(),
            ])
            .await?;
        MergeOutcome::from_exit_code(output.status.code()).ok_or_else(|| self.unexpected(&output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r#"'it'"'"'s'"#);
        assert_eq!(shell_quote("$(rm -rf ~)"), "'$(rm -rf ~)'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn shell_path_leaves_home_prefix_unquoted() {
        assert_eq!(shell_path("/srv/a b"), "'/srv/a b'");
        assert_eq!(shell_path("~"), "~");
        assert_eq!(shell_path("~/"), "~/");
        assert_eq!(shell_path("~/proj/it's"), r#"~/'proj/it'"'"'s'"#);
        assert_eq!(shell_path("/srv/~/x"), "'/srv/~/x'");
    }

    /// An `ssh` stand-in that runs the remote command locally with `home`
    /// as `$HOME` and `/` as the working directory.
    #[cfg(unix)]
    fn fake_ssh(dir: &Path, home: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("ssh");
        std::fs::write(
            &path,
            format!(
                "#!/bin/sh\ncd /\nexport HOME={}\nexec sh -c \"$4\"\n",
                shell_quote(&home.display().to_string())
            ),
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ssh_commands_expand_home_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        std::fs::create_dir_all(&home).unwrap();
        let ssh = Ssh::new(fake_ssh(dir.path(), &home));
        let remote = RemoteSpec::parse("me@box:~/proj").unwrap();

        ssh.create_dir_all(&remote, "sub dir").await.unwrap();
        assert!(home.join("proj/sub dir").is_dir());

        std::fs::write(home.join("proj/sub dir/a.txt"), "a").unwrap();
        ssh.remove_file(&remote, "sub dir/a.txt").await.unwrap();
        assert!(!home.join("proj/sub dir/a.txt").exists());
    }

    #[test]
    fn mirror_args_exclude_base_dir() {
        let rsync = Rsync::default();
        let args = rsync.mirror_args("h:/data/".into(), "/tmp/x/".into(), true);
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"--exclude=.rmt-base/".to_string()));
        assert!(args.contains(&"--dry-run".to_string()));
        assert_eq!(&args[args.len() - 2..], ["h:/data/", "/tmp/x/"]);
    }

    #[test]
    fn dir_arg_has_single_trailing_slash() {
        assert_eq!(dir_arg(Path::new("/a/b")), OsString::from("/a/b/"));
        assert_eq!(dir_arg(Path::new("/a/b/")), OsString::from("/a/b/"));
    }

    #[test]
    fn transferred_files_skips_directories() {
        let out = b"./\nsub/\nsub/a.txt\nb.txt\n\n";
        assert_eq!(transferred_files(out), vec!["sub/a.txt", "b.txt"]);
    }

    #[test]
    fn ssh_command_puts_authority_before_command() {
        let ssh = Ssh::default();
        let remote = RemoteSpec::parse("me@box:/srv").unwrap();
        let args = ssh.command_args(&remote, "rm -f -- '/srv/a'");
        assert_eq!(
            args,
            vec![
                OsString::from("-o"),
                OsString::from("BatchMode=yes"),
                OsString::from("me@box"),
                OsString::from("rm -f -- '/srv/a'"),
            ]
        );
    }

    #[tokio::test]
    async fn missing_tool_is_a_spawn_error() {
        let comp = Comp::new("/nonexistent/rmt-test-comp");
        let err = comp
            .compare(Path::new("/a"), Path::new("/b"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[cfg(unix)]
    fn fake_tool(dir: &Path, exit_code: i32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(format!("comp-exit-{}", exit_code));
        std::fs::write(&path, format!("#!/bin/sh\nexit {}\n", exit_code)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn comp_exit_codes_map_to_results() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (Path::new("/a"), Path::new("/b"));

        let same = Comp::new(fake_tool(dir.path(), 0));
        assert_eq!(same.compare(a, b).await.unwrap(), Comparison::Identical);
        assert_eq!(same.merge(a, a, b, b).await.unwrap(), MergeOutcome::Clean);

        let differ = Comp::new(fake_tool(dir.path(), 1));
        assert_eq!(differ.compare(a, b).await.unwrap(), Comparison::Different);
        assert_eq!(differ.merge(a, a, b, b).await.unwrap(), MergeOutcome::Conflict);

        let broken = Comp::new(fake_tool(dir.path(), 2));
        assert!(matches!(
            broken.compare(a, b).await,
            Err(ToolError::UnexpectedExit { code: Some(2), .. })
        ));
        assert!(broken.merge(a, a, b, b).await.is_err());
    }
}
