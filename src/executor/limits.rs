//! 子进程资源限制
//!
//! 通过 setrlimit 在 fork 之后、exec 之前作用于子进程（不影响服务进程本身）。
//! 全部字段可选，未配置的维度保持继承值。

use serde::Deserialize;

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type Resource = libc::__rlimit_resource_t;
#[cfg(all(unix, not(all(target_os = "linux", target_env = "gnu"))))]
type Resource = libc::c_int;

/// 生成脚本的资源上限
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// CPU 时间（秒），超出后内核发送 SIGXCPU / SIGKILL
    pub cpu_secs: Option<u64>,
    /// 虚拟地址空间（字节）；pandas / numpy 需要较大的虚拟内存，设置过小会导致 import 失败
    pub memory_bytes: Option<u64>,
    /// 单个文件的最大写入大小（字节）
    pub file_size_bytes: Option<u64>,
    /// 进程数上限（注意 RLIMIT_NPROC 按用户计数）
    pub max_processes: Option<u64>,
    pub open_files: Option<u64>,
}

impl ResourceLimits {
    pub fn is_empty(&self) -> bool {
        self.cpu_secs.is_none()
            && self.memory_bytes.is_none()
            && self.file_size_bytes.is_none()
            && self.max_processes.is_none()
            && self.open_files.is_none()
    }

    /// 在子进程中调用：只使用 async-signal-safe 的 setrlimit
    #[cfg(unix)]
    pub fn apply(&self) -> std::io::Result<()> {
        let pairs = [
            (libc::RLIMIT_CPU, self.cpu_secs),
            (libc::RLIMIT_AS, self.memory_bytes),
            (libc::RLIMIT_FSIZE, self.file_size_bytes),
            (libc::RLIMIT_NPROC, self.max_processes),
            (libc::RLIMIT_NOFILE, self.open_files),
        ];
        for (resource, value) in pairs {
            if let Some(value) = value {
                set_limit(resource, value)?;
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn set_limit(resource: Resource, value: u64) -> std::io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: value as libc::rlim_t,
        rlim_max: value as libc::rlim_t,
    };
    // SAFETY: limit 是有效的栈上结构体，setrlimit 不保留指针
    let rc = unsafe { libc::setrlimit(resource, &limit) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
