//! 子进程执行器
//!
//! 脚本写入 `<scratch_root>/run-<uuid>/<script_name>`，以运行目录为 cwd 启动解释器；
//! 子进程独占一个进程组，超时时整组 SIGKILL 并回收，正常退出后也清理残留的后台进程。

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::ExecutorSection;
use crate::core::preview;
use crate::executor::{CodeExecutor, ExecutionOutcome, ExecutorError, ResourceLimits, TIMEOUT_REASON};

/// 传给脚本的数据文件路径（换行分隔）
pub const DATA_FILES_ENV: &str = "ANALYST_DATA_FILES";

/// 审计日志中 reason 的最大字符数
const REASON_PREVIEW_CHARS: usize = 200;

/// 子进程退出后的原始输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// 被信号终止时为 None
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stderr 为空时的失败描述
    fn status_text(&self) -> String {
        match (self.exit_code, self.signal) {
            (Some(code), _) => format!("Process exited with code {}", code),
            (None, Some(sig)) => format!("Process terminated by signal {}", sig),
            (None, None) => "Process terminated abnormally".to_string(),
        }
    }
}

/// 底层运行结果：正常退出或超时
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Exited(RunOutput),
    TimedOut,
}

impl From<RunStatus> for ExecutionOutcome {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Exited(out) if out.success() => ExecutionOutcome::Success {
                stdout: out.stdout.trim().to_string(),
            },
            RunStatus::Exited(out) => {
                let reason = if out.stderr.trim().is_empty() {
                    out.status_text()
                } else {
                    out.stderr
                };
                ExecutionOutcome::Failure { reason }
            }
            RunStatus::TimedOut => ExecutionOutcome::Failure {
                reason: TIMEOUT_REASON.to_string(),
            },
        }
    }
}

/// 子进程执行器：解释器 + 超时 + 资源限制
#[derive(Debug, Clone)]
pub struct SubprocessExecutor {
    interpreter: String,
    interpreter_args: Vec<String>,
    script_name: String,
    timeout: Duration,
    limits: ResourceLimits,
    clear_env: bool,
    env: Vec<(String, String)>,
}

impl SubprocessExecutor {
    pub fn new(interpreter: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            interpreter: interpreter.into(),
            interpreter_args: Vec::new(),
            script_name: "analysis.py".to_string(),
            timeout: Duration::from_secs(timeout_secs),
            limits: ResourceLimits::default(),
            clear_env: false,
            env: Vec::new(),
        }
    }

    pub fn from_config(section: &ExecutorSection) -> Self {
        let env = section
            .env
            .iter()
            .filter_map(|entry| match entry.split_once('=') {
                Some((k, v)) if !k.trim().is_empty() => Some((k.trim().to_string(), v.to_string())),
                _ => {
                    tracing::warn!(entry = %entry, "ignoring executor.env entry without KEY=VALUE");
                    None
                }
            })
            .collect();

        Self {
            interpreter: section.interpreter.clone(),
            interpreter_args: section.interpreter_args.clone(),
            script_name: section.script_name.clone(),
            timeout: Duration::from_secs(section.timeout_secs),
            limits: section.limits,
            clear_env: section.clear_env,
            env,
        }
    }

    pub fn with_script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = name.into();
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_clear_env(mut self, clear_env: bool) -> Self {
        self.clear_env = clear_env;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self, script_path: &Path, work_dir: &Path, data_files: &[PathBuf]) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.args(&self.interpreter_args)
            .arg(script_path)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if self.clear_env {
            cmd.env_clear();
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        let data_env = data_files
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        cmd.env("HOME", work_dir)
            .env("TMPDIR", work_dir)
            .env(DATA_FILES_ENV, data_env);

        #[cfg(unix)]
        {
            cmd.process_group(0);
            let limits = self.limits;
            if !limits.is_empty() {
                // SAFETY: 闭包只调用 setrlimit（async-signal-safe），不分配内存、不加锁
                unsafe {
                    cmd.pre_exec(move || limits.apply());
                }
            }
        }

        cmd
    }

    /// 将 script_text 写入 work_dir 并运行，返回原始退出信息或超时
    pub async fn run_script(
        &self,
        script_text: &str,
        work_dir: &Path,
        data_files: &[PathBuf],
    ) -> Result<RunStatus, ExecutorError> {
        let script_path = work_dir.join(&self.script_name);
        tokio::fs::write(&script_path, script_text)
            .await
            .map_err(ExecutorError::Workspace)?;

        let mut child = self
            .command(&script_path, work_dir, data_files)
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                interpreter: self.interpreter.clone(),
                source,
            })?;
        let group = ProcessGroupGuard::new(child.id());

        let mut stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
        let mut stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

        // 截止时间同时覆盖等待退出和读完管道：换了会话的孙进程可能一直占着管道
        let run = async {
            let status = child.wait().await?;
            // 脚本留下的后台进程同属一个进程组，一并清理，避免占住管道
            group.kill();
            let stdout = (&mut stdout_task).await.unwrap_or_default();
            let stderr = (&mut stderr_task).await.unwrap_or_default();
            Ok::<_, std::io::Error>((status, stdout, stderr))
        };
        let finished = timeout(self.timeout, run).await;

        match finished {
            Ok(Ok((status, stdout, stderr))) => {
                group.disarm();
                Ok(RunStatus::Exited(RunOutput {
                    exit_code: status.code(),
                    signal: exit_signal(&status),
                    stdout,
                    stderr,
                }))
            }
            Ok(Err(e)) => Err(ExecutorError::Io(e)),
            Err(_) => {
                group.kill();
                // kill() 会等待子进程退出，保证不留僵尸进程
                if let Err(e) = child.kill().await {
                    tracing::debug!(error = %e, "timed out script already exited");
                }
                stdout_task.abort();
                stderr_task.abort();
                Ok(RunStatus::TimedOut)
            }
        }
    }
}

/// 子进程所在进程组的守卫：执行 future 被中途丢弃（如 HTTP 客户端断开）时整组 SIGKILL。
/// kill_on_drop 只能杀掉直接子进程。
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn kill(&self) {
        kill_process_group(self.pgid);
    }

    /// 子进程已回收、管道已读完后调用，之后 drop 不再发信号
    fn disarm(mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        kill_process_group(self.pgid);
    }
}

#[async_trait]
impl CodeExecutor for SubprocessExecutor {
    async fn execute(
        &self,
        code: &str,
        data_files: &[PathBuf],
        scratch_root: &Path,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let run_dir = scratch_root.join(format!("run-{}", Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&run_dir)
            .await
            .map_err(ExecutorError::Workspace)?;

        let start = Instant::now();
        let status = self.run_script(code, &run_dir, data_files).await?;
        let exit_code = match &status {
            RunStatus::Exited(out) => out.exit_code,
            RunStatus::TimedOut => None,
        };
        let outcome = ExecutionOutcome::from(status);

        let (ok, detail) = match &outcome {
            ExecutionOutcome::Success { stdout } => (true, preview(stdout, REASON_PREVIEW_CHARS)),
            ExecutionOutcome::Failure { reason } => (false, preview(reason, REASON_PREVIEW_CHARS)),
        };
        let audit = serde_json::json!({
            "event": "code_audit",
            "interpreter": self.interpreter,
            "run_dir": run_dir.display().to_string(),
            "ok": ok,
            "exit_code": exit_code,
            "duration_ms": start.elapsed().as_millis() as u64,
            "detail_preview": detail,
        });
        tracing::info!(audit = %audit, "code_audit");

        Ok(outcome)
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            tracing::debug!(error = %e, "pipe read interrupted");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: 仅发送信号；进程组已不存在时返回 ESRCH，忽略即可
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(timeout_secs: u64) -> SubprocessExecutor {
        SubprocessExecutor::new("sh", timeout_secs).with_script_name("analysis.sh")
    }

    fn run_dirs(root: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.is_dir())
            .collect()
    }

    #[tokio::test]
    async fn test_success_stdout_is_trimmed() {
        let root = tempfile::tempdir().unwrap();
        let outcome = sh(10)
            .execute("printf '  {\"a\":1}\\n'", &[], root.path())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Success {
                stdout: "{\"a\":1}".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_reports_stderr() {
        let root = tempfile::tempdir().unwrap();
        let outcome = sh(10)
            .execute("echo 'NameError: df' >&2\nexit 3", &[], root.path())
            .await
            .unwrap();
        match outcome {
            ExecutionOutcome::Failure { reason } => assert!(reason.contains("NameError: df")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_silent_failure_reports_exit_code() {
        let root = tempfile::tempdir().unwrap();
        let outcome = sh(10).execute("exit 4", &[], root.path()).await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Failure {
                reason: "Process exited with code 4".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_each_call_gets_fresh_directory() {
        let root = tempfile::tempdir().unwrap();
        let executor = sh(10);
        let first = executor.execute("pwd", &[], root.path()).await.unwrap();
        let second = executor.execute("pwd", &[], root.path()).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(run_dirs(root.path()).len(), 2);
        for dir in run_dirs(root.path()) {
            assert!(dir.join("analysis.sh").exists());
        }
    }

    #[tokio::test]
    async fn test_data_files_are_exposed_to_script() {
        let root = tempfile::tempdir().unwrap();
        let files = vec![PathBuf::from("/data/a.csv"), PathBuf::from("/data/b.csv")];
        let outcome = sh(10)
            .execute("printf '%s' \"$ANALYST_DATA_FILES\"", &files, root.path())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Success {
                stdout: "/data/a.csv\n/data/b.csv".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let root = tempfile::tempdir().unwrap();
        let start = Instant::now();
        let outcome = sh(1)
            .execute("echo $$ > pid\nsleep 30", &[], root.path())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Failure {
                reason: TIMEOUT_REASON.to_string()
            }
        );
        assert!(start.elapsed() < Duration::from_secs(10));

        let dir = run_dirs(root.path()).pop().unwrap();
        let pid: libc::pid_t = std::fs::read_to_string(dir.join("pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        // SAFETY: 信号 0 只做存在性检查
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        assert!(!alive, "timed out script {} is still running", pid);
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_infrastructure_error() {
        let root = tempfile::tempdir().unwrap();
        let executor = SubprocessExecutor::new("analyst-no-such-interpreter", 5);
        let err = executor.execute("print(1)", &[], root.path()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_file_size_limit_is_enforced() {
        let root = tempfile::tempdir().unwrap();
        let executor = sh(10).with_limits(ResourceLimits {
            file_size_bytes: Some(1024),
            ..Default::default()
        });
        let outcome = executor
            .execute("head -c 65536 /dev/zero > big.bin\necho done", &[], root.path())
            .await
            .unwrap();
        let dir = run_dirs(root.path()).pop().unwrap();
        let written = std::fs::metadata(dir.join("big.bin")).map(|m| m.len()).unwrap_or(0);
        assert!(written <= 1024);
        // head 被 SIGXFSZ 终止，但 sh 继续执行 echo
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_clear_env_keeps_explicit_vars() {
        let root = tempfile::tempdir().unwrap();
        let executor = SubprocessExecutor::new("/bin/sh", 10)
            .with_script_name("analysis.sh")
            .with_clear_env(true)
            .with_env("ANALYST_MARKER", "kept");
        let outcome = executor
            .execute("printf '%s|%s' \"$ANALYST_MARKER\" \"$CARGO_PKG_NAME\"", &[], root.path())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Success {
                stdout: "kept|".to_string()
            }
        );
    }

    /// 进程仍在运行（僵尸进程不算）
    #[cfg(target_os = "linux")]
    fn is_running(pid: libc::pid_t) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
                .map(|state| state != 'Z' && state != 'X')
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    fn read_pid(path: &Path) -> libc::pid_t {
        std::fs::read_to_string(path).unwrap().trim().parse().unwrap()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_deadline_covers_pipes_held_by_detached_grandchild() {
        let root = tempfile::tempdir().unwrap();
        // 新会话里的 sleep 不在脚本的进程组内，killpg 杀不到，却继承了 stdout 管道
        let script = "setsid sh -c 'echo $$ > detached.pid; exec sleep 6' &\nsleep 0.3\necho {}";
        let start = Instant::now();
        let outcome = sh(1).execute(script, &[], root.path()).await.unwrap();
        let took = start.elapsed();

        let dir = run_dirs(root.path()).pop().unwrap();
        if let Ok(pid) = std::fs::read_to_string(dir.join("detached.pid")) {
            if let Ok(pid) = pid.trim().parse::<libc::pid_t>() {
                // SAFETY: 只向测试自己启动的进程发信号
                unsafe {
                    libc::kill(pid, libc::SIGKILL);
                }
            }
        }

        assert!(took < Duration::from_secs(3), "execute took {:?}", took);
        assert_eq!(
            outcome,
            ExecutionOutcome::Failure {
                reason: TIMEOUT_REASON.to_string()
            }
        );
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropping_execution_kills_background_processes() {
        let root = tempfile::tempdir().unwrap();
        let executor = sh(30);
        let script = "sleep 30 &\necho $! > background.pid\nwait";

        let dropped = tokio::time::timeout(
            Duration::from_secs(1),
            executor.execute(script, &[], root.path()),
        )
        .await;
        assert!(dropped.is_err());

        let dir = run_dirs(root.path()).pop().unwrap();
        let pid = read_pid(&dir.join("background.pid"));
        let deadline = Instant::now() + Duration::from_secs(3);
        while is_running(pid) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!is_running(pid), "background process {} survived", pid);
    }
}
