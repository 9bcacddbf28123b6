//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ANALYST__*` 覆盖（双下划线表示嵌套，如 `ANALYST__LLM__MODEL=gpt-4o`）。
//! 凭据只在这里从进程环境读取一次；之后配置不可变，按引用传给各组件。

use std::path::PathBuf;

use serde::Deserialize;

use crate::executor::ResourceLimits;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub executor: ExecutorSection,
    pub pipeline: PipelineSection,
    pub server: ServerSection,
}

/// [llm] 段：后端、模型、凭据与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / deepseek（均为 OpenAI 兼容协议）
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未配置时由 load_config 从 OPENAI_API_KEY / DEEPSEEK_API_KEY 补齐
    pub api_key: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次补全请求的等待上限（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 120 }
    }
}

/// [executor] 段：解释器、脚本名、执行超时、资源限制
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    pub interpreter: String,
    /// 解释器参数（置于脚本路径之前，如 ["-u"]）
    pub interpreter_args: Vec<String>,
    pub script_name: String,
    pub timeout_secs: u64,
    /// 每次调用工作区的父目录，未设置时用系统临时目录下的 analyst/
    pub work_root: Option<PathBuf>,
    /// 是否清空子进程继承的环境变量（仅保留 env 中显式列出的）
    pub clear_env: bool,
    /// 额外环境变量，形如 "KEY=VALUE"（config 会把表键转小写，故不用 map）
    pub env: Vec<String>,
    pub limits: ResourceLimits,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            interpreter_args: Vec::new(),
            script_name: "analysis.py".to_string(),
            timeout_secs: 100,
            work_root: None,
            clear_env: false,
            env: Vec::new(),
            limits: ResourceLimits::default(),
        }
    }
}

impl ExecutorSection {
    pub fn work_root(&self) -> PathBuf {
        self.work_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("analyst"))
    }
}

/// [pipeline] 段：分析器选择、重试预算、Prompt 覆盖
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// agentic（规划 + 生成 + 执行 + 修复）或 stats（固定公式统计）
    pub analyzer: String,
    /// 修复并重新执行的最大轮数
    pub max_retries: usize,
    /// 调试用：保留每次调用的工作区
    pub keep_workspace: bool,
    /// 含 plan.txt / generate.txt / repair.txt 的目录，缺失的文件回退到内置模板
    pub prompts_dir: Option<PathBuf>,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            analyzer: "agentic".to_string(),
            max_retries: 3,
            keep_workspace: false,
            prompts_dir: None,
        }
    }
}

/// [server] 段：HTTP 监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 ANALYST__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 ANALYST__*（双下划线表示嵌套键）
/// 4. api_key 仍为空时从 OPENAI_API_KEY（provider = deepseek 时优先 DEEPSEEK_API_KEY）补齐
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ANALYST")
            .separator("__")
            .try_parsing(true),
    );

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
    if cfg.llm.api_key.is_none() {
        cfg.llm.api_key = credential_from_env(&cfg.llm.provider);
    }
    Ok(cfg)
}

fn credential_from_env(provider: &str) -> Option<String> {
    let openai = || std::env::var("OPENAI_API_KEY").ok();
    if provider.eq_ignore_ascii_case("deepseek") {
        std::env::var("DEEPSEEK_API_KEY").ok().or_else(openai)
    } else {
        openai()
    }
    .filter(|k| !k.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_observed_design() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert_eq!(cfg.executor.timeout_secs, 100);
        assert_eq!(cfg.pipeline.max_retries, 3);
        assert_eq!(cfg.pipeline.analyzer, "agentic");
        assert!(cfg.executor.limits.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[executor]\ninterpreter = \"sh\"\n\n[executor.limits]\ncpu_secs = 5\n\n[pipeline]\nmax_retries = 1\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.executor.interpreter, "sh");
        assert_eq!(cfg.executor.script_name, "analysis.py");
        assert_eq!(cfg.executor.limits.cpu_secs, Some(5));
        assert_eq!(cfg.pipeline.max_retries, 1);
        assert_eq!(cfg.llm.timeouts.request, 120);
    }

    #[test]
    fn test_work_root_defaults_under_temp_dir() {
        let section = ExecutorSection::default();
        assert!(section.work_root().ends_with("analyst"));
    }
}
