use std::path::Path;

use crate::config::PromptConfig;
use crate::error::AppError;
use crate::provider::TaskKind;

const DEFAULT_REWRITE_PROMPT: &str = "你是一名小红书内容创作者。请把用户提供的原文改写成一篇小红书风格的笔记：\
口语化、分段清晰、适当使用表情符号，保留原文的关键信息，不要编造事实。只输出改写后的正文。";

const DEFAULT_TITLE_PROMPT: &str = "你是一名擅长写爆款标题的编辑。请为用户提供的笔记正文生成一个吸引人的标题，\
不超过20个字。只输出标题本身，不要加引号或任何解释。";

/// System prompts for both task kinds, loaded once at startup.
#[derive(Debug, Clone)]
pub struct PromptSet {
    rewrite: String,
    title: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            rewrite: DEFAULT_REWRITE_PROMPT.to_string(),
            title: DEFAULT_TITLE_PROMPT.to_string(),
        }
    }
}

impl PromptSet {
    pub fn new(rewrite: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            rewrite: rewrite.into(),
            title: title.into(),
        }
    }

    /// Read configured templates; unset entries fall back to the built-in text.
    pub fn load(config: &PromptConfig) -> Result<Self, AppError> {
        let defaults = Self::default();
        Ok(Self {
            rewrite: match &config.rewrite {
                Some(path) => read_template(path)?,
                None => defaults.rewrite,
            },
            title: match &config.title {
                Some(path) => read_template(path)?,
                None => defaults.title,
            },
        })
    }

    pub fn for_task(&self, kind: TaskKind) -> &str {
        match kind {
            TaskKind::Rewrite => &self.rewrite,
            TaskKind::Title => &self.title,
        }
    }
}

fn read_template(path: &Path) -> Result<String, AppError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!("cannot read prompt template {}: {e}", path.display()))
    })?;
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::Config(format!(
            "prompt template {} is empty",
            path.display()
        )));
    }
    Ok(text.to_string())
}
