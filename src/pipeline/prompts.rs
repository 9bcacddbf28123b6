//! Prompt 模板
//!
//! 内置三套模板（规划 / 生成 / 修复），可由 prompts_dir 下的 plan.txt、generate.txt、repair.txt 覆盖。
//! 占位符为 `{name}`，单遍替换：被替换进来的文本（问题、代码、报错）不会再被展开。

use std::path::Path;

pub const PLAN_TEMPLATE: &str = "You are a data analyst. Split the analysis task below into a short, numbered list of concrete steps \
(loading, cleaning, computing, plotting, answering). Do not write code.

TASK:
{question}";

pub const GENERATE_TEMPLATE: &str = "Write one self-contained Python 3 script (pandas, numpy and matplotlib are available) that follows these steps:

{steps}

Inputs:
- Question file: {question_file}
- Data files (absolute paths, also listed one per line in the ANALYST_DATA_FILES environment variable):
{data_files}

Rules:
1. Read the inputs from the paths above; the script runs in an empty scratch directory.
2. Perform the analysis and any requested visualization. Encode images as base64 data URIs inside the result.
3. Print exactly one JSON document to standard output and nothing else: no logging, no progress text.
4. Reply with the raw script only, without Markdown fences or explanations.";

pub const REPAIR_TEMPLATE: &str = "The Python script below failed. Return a corrected version that performs the same task \
and still prints exactly one JSON document to standard output and nothing else.
Reply with the raw script only, without Markdown fences or explanations.

SCRIPT:
{code}

FAILURE:
{error}";

/// 三个 LLM 调用各自的模板
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub plan: String,
    pub generate: String,
    pub repair: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            plan: PLAN_TEMPLATE.to_string(),
            generate: GENERATE_TEMPLATE.to_string(),
            repair: REPAIR_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplates {
    /// 从目录加载覆盖模板；目录缺失或文件不可读时回退到内置模板
    pub fn load(dir: Option<&Path>) -> Self {
        let defaults = Self::default();
        let Some(dir) = dir else {
            return defaults;
        };
        let read = |name: &str, fallback: String| {
            match std::fs::read_to_string(dir.join(name)) {
                Ok(text) if !text.trim().is_empty() => {
                    tracing::info!(template = name, "loaded prompt override");
                    text
                }
                _ => fallback,
            }
        };
        Self {
            plan: read("plan.txt", defaults.plan),
            generate: read("generate.txt", defaults.generate),
            repair: read("repair.txt", defaults.repair),
        }
    }
}

/// 单遍替换 `{name}` 占位符；未知占位符原样保留
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let matched = after.find('}').and_then(|end| {
            let name = &after[..end];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end))
        });
        match matched {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
