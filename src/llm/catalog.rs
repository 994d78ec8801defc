//! 模型目录展示
//!
//! 只影响日志输出，不改变返回给调用方的模型列表。

use std::collections::BTreeMap;

use super::types::ModelDescriptor;
use crate::logging::Logger;

/// 模型分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModelCategory {
    Chat,
    Image,
    Audio,
    Embedding,
    Other,
}

impl ModelCategory {
    pub fn title(&self) -> &'static str {
        match self {
            ModelCategory::Chat => "Chat Models",
            ModelCategory::Image => "Image Models",
            ModelCategory::Audio => "Audio Models",
            ModelCategory::Embedding => "Embedding Models",
            ModelCategory::Other => "Other",
        }
    }
}

/// 按模型 ID 子串归类，越具体的规则越先匹配
///
/// 例如 `gpt-4o-mini-tts` 归为音频而不是对话模型。
pub fn categorize(model_id: &str) -> ModelCategory {
    let id = model_id.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| id.contains(n));

    if has(&["embedding"]) {
        ModelCategory::Embedding
    } else if has(&["dall-e", "image"]) {
        ModelCategory::Image
    } else if has(&["tts", "whisper", "audio", "transcribe"]) {
        ModelCategory::Audio
    } else if ["gpt-", "chatgpt", "o1", "o3", "o4"]
        .iter()
        .any(|prefix| id.starts_with(prefix))
    {
        ModelCategory::Chat
    } else {
        ModelCategory::Other
    }
}

/// 日志中的一个分组
#[derive(Debug, Clone)]
pub struct CatalogGroup<'a> {
    pub title: String,
    pub models: Vec<&'a ModelDescriptor>,
}

/// 不分组，整体作为一组
pub fn single_group<'a>(title: &str, models: &'a [ModelDescriptor]) -> Vec<CatalogGroup<'a>> {
    if models.is_empty() {
        return Vec::new();
    }
    vec![CatalogGroup {
        title: title.to_string(),
        models: models.iter().collect(),
    }]
}

/// 按用途分组（空组省略）
pub fn group_by_category(models: &[ModelDescriptor]) -> Vec<CatalogGroup<'_>> {
    let mut groups: BTreeMap<ModelCategory, Vec<&ModelDescriptor>> = BTreeMap::new();
    for model in models {
        groups.entry(categorize(&model.id)).or_default().push(model);
    }

    groups
        .into_iter()
        .map(|(category, models)| CatalogGroup {
            title: category.title().to_string(),
            models,
        })
        .collect()
}

/// 按模型厂商分组
pub fn group_by_vendor(models: &[ModelDescriptor]) -> Vec<CatalogGroup<'_>> {
    let mut groups: BTreeMap<&str, Vec<&ModelDescriptor>> = BTreeMap::new();
    for model in models {
        groups
            .entry(model.provider.as_deref().unwrap_or("Unknown"))
            .or_default()
            .push(model);
    }

    groups
        .into_iter()
        .map(|(vendor, models)| CatalogGroup {
            title: vendor.to_string(),
            models,
        })
        .collect()
}

/// 单个模型的展示文本
pub fn describe(model: &ModelDescriptor) -> String {
    let mut line = model.id.clone();
    if let Some(name) = model.display_name.as_deref().filter(|n| *n != model.id) {
        line.push_str(&format!(" | {name}"));
    }
    if let Some(provider) = &model.provider {
        line.push_str(&format!(" ({provider})"));
    }
    if let Some(size) = model.size_bytes {
        line.push_str(&format!(" | Size: {size}"));
    }
    if let Some(created) = model.created_at {
        line.push_str(&format!(" | Created: {}", created.format("%Y-%m-%d")));
    }
    line
}

/// 输出编号列表
pub fn log_catalog(logger: &Logger, heading: &str, groups: &[CatalogGroup<'_>]) {
    if !logger.is_verbose() {
        return;
    }

    logger.info(format!("{heading} models:"));
    for group in groups {
        logger.info(format!(" {}:", group.title));
        for (index, model) in group.models.iter().enumerate() {
            logger.info(format!("   {:2}. {}", index + 1, describe(model)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_most_specific_first() {
        assert_eq!(categorize("gpt-4o"), ModelCategory::Chat);
        assert_eq!(categorize("o3-mini"), ModelCategory::Chat);
        assert_eq!(categorize("gpt-4o-mini-tts"), ModelCategory::Audio);
        assert_eq!(categorize("gpt-image-1"), ModelCategory::Image);
        assert_eq!(categorize("dall-e-3"), ModelCategory::Image);
        assert_eq!(categorize("whisper-1"), ModelCategory::Audio);
        assert_eq!(categorize("text-embedding-3-small"), ModelCategory::Embedding);
        assert_eq!(categorize("babbage-002"), ModelCategory::Other);
    }

    #[test]
    fn test_grouping_keeps_every_model() {
        let models = vec![
            ModelDescriptor::new("whisper-1"),
            ModelDescriptor::new("gpt-4o"),
            ModelDescriptor::new("text-embedding-3-large"),
            ModelDescriptor::new("gpt-4.1"),
        ];
        let before = models.clone();

        let groups = group_by_category(&models);
        let titles: Vec<&str> = groups.iter().map(|g| g.title.as_str()).collect();
        assert_eq!(titles, vec!["Chat Models", "Audio Models", "Embedding Models"]);
        assert_eq!(groups[0].models.len(), 2);
        assert_eq!(groups.iter().map(|g| g.models.len()).sum::<usize>(), models.len());
        assert_eq!(models, before);
    }

    #[test]
    fn test_group_by_vendor() {
        let models = vec![
            ModelDescriptor::new("meta.llama3").with_provider("Meta"),
            ModelDescriptor::new("anthropic.claude").with_provider("Anthropic"),
            ModelDescriptor::new("mystery"),
        ];
        let groups = group_by_vendor(&models);
        let titles: Vec<&str> = groups.iter().map(|g| g.title.as_str()).collect();
        assert_eq!(titles, vec!["Anthropic", "Meta", "Unknown"]);
    }

    #[test]
    fn test_describe() {
        let model = ModelDescriptor::new("anthropic.claude-v2")
            .with_display_name("Claude")
            .with_provider("Anthropic");
        assert_eq!(describe(&model), "anthropic.claude-v2 | Claude (Anthropic)");
        assert_eq!(describe(&ModelDescriptor::new("x")), "x");
    }

    #[test]
    fn test_single_group_empty() {
        assert!(single_group("Groq", &[]).is_empty());
    }
}
