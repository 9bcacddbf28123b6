//! AnalysisRequest：一次调用的不可变输入

use std::path::{Path, PathBuf};

use crate::core::AnalystError;

/// 问题文本 + 数据文件路径；路径在构造时转为绝对路径，因为脚本在别的目录里运行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub question_file: PathBuf,
    pub question_text: String,
    pub data_files: Vec<PathBuf>,
}

impl AnalysisRequest {
    /// 读取问题文件（UTF-8）；读取失败是致命错误
    pub async fn load(question_file: &Path, data_files: &[PathBuf]) -> Result<Self, AnalystError> {
        let question_file = std::path::absolute(question_file)?;
        let question_text = tokio::fs::read_to_string(&question_file)
            .await
            .map_err(|source| AnalystError::QuestionRead {
                path: question_file.clone(),
                source,
            })?;
        let data_files = data_files
            .iter()
            .map(std::path::absolute)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            question_file,
            question_text,
            data_files,
        })
    }

    pub fn new(question_file: PathBuf, question_text: impl Into<String>, data_files: Vec<PathBuf>) -> Self {
        Self {
            question_file,
            question_text: question_text.into(),
            data_files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_reads_question_and_absolutizes_paths() {
        let dir = tempfile::tempdir().unwrap();
        let question = dir.path().join("questions.txt");
        std::fs::write(&question, "compute row count").unwrap();

        let request = AnalysisRequest::load(&question, &[PathBuf::from("data/sales.csv")])
            .await
            .unwrap();
        assert_eq!(request.question_text, "compute row count");
        assert!(request.question_file.is_absolute());
        assert!(request.data_files[0].is_absolute());
        assert!(request.data_files[0].ends_with("data/sales.csv"));
    }

    #[tokio::test]
    async fn test_missing_question_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = AnalysisRequest::load(&dir.path().join("nope.txt"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AnalystError::QuestionRead { .. }));
    }
}
