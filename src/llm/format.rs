//! 端点 URL 构建工具

/// 修复 base_url
///
/// - 移除末尾斜杠
/// - 修复双斜杠（保留协议部分）
pub fn fix_base_url(base_url: &str) -> String {
    let mut url = base_url.trim().trim_end_matches('/').to_string();

    // 修复双斜杠（跳过协议部分）
    if let Some(pos) = url.find("://") {
        let (protocol, rest) = url.split_at(pos + 3);
        let fixed_rest = rest.replace("//", "/");
        url = format!("{}{}", protocol, fixed_rest);
    }

    url
}

/// 在 `/v1` 前缀下拼接路径，base 已带 `/v1` 时不重复
fn under_v1(base_url: &str, path: &str) -> String {
    let url = fix_base_url(base_url);

    if url.ends_with(path) {
        url
    } else if url.ends_with("/v1") {
        format!("{}{}", url, path)
    } else {
        format!("{}/v1{}", url, path)
    }
}

/// 构建 OpenAI Chat Completions 端点
pub fn build_openai_endpoint(base_url: &str) -> String {
    under_v1(base_url, "/chat/completions")
}

/// 构建 OpenAI 兼容的模型列表端点
pub fn build_openai_models_endpoint(base_url: &str) -> String {
    under_v1(base_url, "/models")
}

/// 构建 Anthropic Messages 端点
pub fn build_anthropic_endpoint(base_url: &str) -> String {
    under_v1(base_url, "/messages")
}

/// 构建 Anthropic 模型列表端点
pub fn build_anthropic_models_endpoint(base_url: &str) -> String {
    under_v1(base_url, "/models")
}

/// Azure 资源地址：缺少协议时补 `https://`，去掉末尾斜杠
pub fn normalize_azure_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    let with_scheme = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    };
    fix_base_url(&with_scheme)
}

/// Azure 部署对话端点（`api-version` 由调用方作为查询参数附加）
pub fn build_azure_chat_endpoint(endpoint: &str, deployment: &str) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions",
        normalize_azure_endpoint(endpoint),
        deployment
    )
}

/// Azure 模型列表端点
pub fn build_azure_models_endpoint(endpoint: &str) -> String {
    format!("{}/openai/models", normalize_azure_endpoint(endpoint))
}

/// Bedrock 运行时地址
pub fn bedrock_runtime_base(region: &str) -> String {
    format!("https://bedrock-runtime.{}.amazonaws.com", region.trim())
}

/// Bedrock 控制面地址（模型目录）
pub fn bedrock_control_base(region: &str) -> String {
    format!("https://bedrock.{}.amazonaws.com", region.trim())
}

/// Ollama 端点
pub fn build_ollama_endpoint(base_url: &str, path: &str) -> String {
    let url = fix_base_url(base_url);
    let url = url.strip_suffix("/api").unwrap_or(&url);
    format!("{}/api/{}", url, path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_base_url() {
        assert_eq!(fix_base_url("https://api.openai.com/"), "https://api.openai.com");
        assert_eq!(fix_base_url("https://api.openai.com//v1"), "https://api.openai.com/v1");
    }

    #[test]
    fn test_build_openai_endpoint() {
        assert_eq!(
            build_openai_endpoint("https://api.openai.com"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            build_openai_endpoint("https://api.groq.com/openai/v1"),
            "https://api.groq.com/openai/v1/chat/completions"
        );
        assert_eq!(
            build_openai_endpoint("https://api.openai.com/v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            build_openai_models_endpoint("https://api.mistral.ai/v1/"),
            "https://api.mistral.ai/v1/models"
        );
    }

    #[test]
    fn test_build_anthropic_endpoint() {
        assert_eq!(
            build_anthropic_endpoint("https://api.anthropic.com"),
            "https://api.anthropic.com/v1/messages"
        );
        assert_eq!(
            build_anthropic_models_endpoint("https://api.anthropic.com/v1"),
            "https://api.anthropic.com/v1/models"
        );
    }

    #[test]
    fn test_azure_endpoint_normalization() {
        assert_eq!(
            normalize_azure_endpoint("myres.openai.azure.com/"),
            "https://myres.openai.azure.com"
        );
        assert_eq!(
            normalize_azure_endpoint("http://localhost:8080"),
            "http://localhost:8080"
        );
        assert_eq!(
            build_azure_chat_endpoint("myres.openai.azure.com", "gpt4o-prod"),
            "https://myres.openai.azure.com/openai/deployments/gpt4o-prod/chat/completions"
        );
        assert_eq!(
            build_azure_models_endpoint("https://myres.openai.azure.com/"),
            "https://myres.openai.azure.com/openai/models"
        );
    }

    #[test]
    fn test_bedrock_and_ollama_endpoints() {
        assert_eq!(
            bedrock_runtime_base("us-east-1"),
            "https://bedrock-runtime.us-east-1.amazonaws.com"
        );
        assert_eq!(bedrock_control_base("eu-west-3"), "https://bedrock.eu-west-3.amazonaws.com");
        assert_eq!(
            build_ollama_endpoint("http://localhost:11434/", "generate"),
            "http://localhost:11434/api/generate"
        );
        assert_eq!(
            build_ollama_endpoint("http://gpu-box:11434/api", "tags"),
            "http://gpu-box:11434/api/tags"
        );
    }
}
